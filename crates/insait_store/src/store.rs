//! Embedded encrypted document store.
//!
//! Collections live in a single redb file. Every document is serialized
//! with postcard and sealed with ChaCha20-Poly1305 under a subkey of the
//! store password, so neither field values nor structure are readable at
//! rest. Secondary indexes map `(value, id)` composite keys to ids and are
//! maintained in the same transaction as the document they describe.
//!
//! # Example
//!
//! ```
//! use insait_store::{DocumentStore, EncryptionKey, HistoryRecord, KeySource};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let key = EncryptionKey::from_bytes([7; 32], KeySource::Generated);
//! let store = DocumentStore::open(tmp.path().join("sessions.db"), &key).unwrap();
//!
//! let mut record = HistoryRecord {
//!     id: 0,
//!     file_path: "blob".into(),
//!     path_tag: [1; 32],
//!     watched_at: 10,
//!     last_position: 0.5,
//!     last_time: 1_000,
//! };
//! let id = store.insert(&mut record).unwrap();
//! assert_eq!(store.get::<HistoryRecord>(id).unwrap(), Some(record));
//! ```

use crate::documents::{CollectionDef, Document, IndexDef, COLLECTIONS};
use crate::error::{Result, StoreError};
use crate::key_provider::EncryptionKey;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use redb::{
    Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Store schema version for migration support.
pub const STORE_SCHEMA_VERSION: u64 = 1;

const METADATA_TABLE: TableDefinition<&str, u64> = TableDefinition::new("metadata");
const KEYCHECK_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("keycheck");

const VERSION_KEY: &str = "schema_version";
const KEYCHECK_KEY: &str = "sentinel";
const KEYCHECK_SENTINEL: &[u8] = b"insait-store key check";
const SEAL_CONTEXT: &str = "insait-store 2026 document seal v1";

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Encode index key: value_len (u16 BE) + value + id (u64 BE).
///
/// The length prefix keeps `"ab"` from matching a lookup for `"a"`; the
/// big-endian id keeps equal values in insertion order.
fn encode_index_key(value: &[u8], id: u64) -> Vec<u8> {
    let mut key = encode_index_prefix(value);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn encode_index_prefix(value: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + value.len() + 8);
    key.extend_from_slice(&(value.len() as u16).to_be_bytes());
    key.extend_from_slice(value);
    key
}

fn seq_key(collection: &CollectionDef) -> String {
    format!("seq:{}", collection.name)
}

fn index_def<T: Document>(field: &str) -> Result<&'static IndexDef> {
    T::COLLECTION
        .index(field)
        .ok_or_else(|| StoreError::UnknownIndex {
            collection: T::COLLECTION.name,
            field: field.to_string(),
        })
}

/// Lock contention is reported apart from damage so callers never delete a
/// store that another handle is using.
fn open_error(path: &Path, e: redb::DatabaseError) -> StoreError {
    match e {
        redb::DatabaseError::DatabaseAlreadyOpen => StoreError::Locked(path.display().to_string()),
        redb::DatabaseError::Storage(redb::StorageError::Io(io))
            if io.kind() == std::io::ErrorKind::WouldBlock =>
        {
            StoreError::Locked(path.display().to_string())
        }
        other => other.into(),
    }
}

/// AEAD wrapper for document bytes.
struct Sealer {
    cipher: ChaCha20Poly1305,
}

impl Sealer {
    fn new(password: &EncryptionKey) -> Result<Self> {
        let subkey = Zeroizing::new(blake3::derive_key(SEAL_CONTEXT, password.as_bytes()));
        let cipher = ChaCha20Poly1305::new_from_slice(&subkey[..])
            .map_err(|e| StoreError::Encryption(format!("failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Output: `[nonce:12][ciphertext + tag]`.
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        {
            use rand::TryRngCore as _;
            let mut rng = rand::rngs::OsRng;
            rng.try_fill_bytes(&mut nonce)
                .map_err(|e| StoreError::Encryption(format!("secure random failed: {}", e)))?;
        }
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| StoreError::Encryption("document encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Returns `None` when the bytes were not sealed under this key.
    fn open(&self, sealed: &[u8]) -> Option<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return None;
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()
    }

    fn encode<T: Document>(&self, doc: &T) -> Result<Vec<u8>> {
        let bytes = postcard::to_allocvec(doc)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.seal(&bytes)
    }

    fn decode<T: Document>(&self, id: u64, sealed: &[u8]) -> Result<T> {
        let corrupted = |reason: String| StoreError::CorruptedDocument {
            collection: T::COLLECTION.name,
            id,
            reason,
        };
        let bytes = self
            .open(sealed)
            .ok_or_else(|| corrupted("authentication failed".to_string()))?;
        let doc: T = postcard::from_bytes(&bytes).map_err(|e| corrupted(e.to_string()))?;
        if doc.id() != id {
            return Err(corrupted(format!("stored under id {}", doc.id())));
        }
        Ok(doc)
    }
}

// Read helpers shared by read and write transactions.

fn load_doc<T: Document>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    sealer: &Sealer,
    id: u64,
) -> Result<Option<T>> {
    match table.get(id)? {
        Some(guard) => Ok(Some(sealer.decode(id, guard.value())?)),
        None => Ok(None),
    }
}

fn scan_docs<T: Document>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    sealer: &Sealer,
    mut keep: impl FnMut(&T) -> bool,
) -> Result<Vec<T>> {
    let mut docs = Vec::new();
    for entry in table.iter()? {
        let (id, sealed) = entry?;
        let doc: T = sealer.decode(id.value(), sealed.value())?;
        if keep(&doc) {
            docs.push(doc);
        }
    }
    Ok(docs)
}

fn scan_index(
    table: &impl ReadableTable<&'static [u8], u64>,
    prefix: Option<&[u8]>,
    limit: Option<usize>,
) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    if limit == Some(0) {
        return Ok(ids);
    }
    let range = match prefix {
        Some(p) => table.range(p..)?,
        None => table.iter()?,
    };
    for entry in range {
        let (key, id) = entry?;
        if let Some(p) = prefix {
            if !key.value().starts_with(p) {
                break;
            }
        }
        ids.push(id.value());
        if limit.is_some_and(|l| ids.len() >= l) {
            break;
        }
    }
    Ok(ids)
}

fn resolve_ids<T: Document>(
    data: &impl ReadableTable<u64, &'static [u8]>,
    sealer: &Sealer,
    index: &IndexDef,
    ids: Vec<u64>,
) -> Result<Vec<T>> {
    let mut docs = Vec::with_capacity(ids.len());
    for id in ids {
        let doc = load_doc(data, sealer, id)?.ok_or_else(|| StoreError::IndexCorrupted {
            collection: T::COLLECTION.name,
            index: index.field,
            reason: format!("entry points at missing document {}", id),
        })?;
        docs.push(doc);
    }
    Ok(docs)
}

/// Embedded encrypted document store.
pub struct DocumentStore {
    db: Database,
    path: PathBuf,
    sealer: Sealer,
}

impl DocumentStore {
    /// Open or create the store at `path` with `password`.
    ///
    /// Fails with [`StoreError::WrongPassword`] when the file was created
    /// with a different key, [`StoreError::SchemaMismatch`] for an
    /// unsupported version and [`StoreError::Database`] when the file is not
    /// a store at all.
    pub fn open(path: impl AsRef<Path>, password: &EncryptionKey) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| open_error(&path, e))?;
        let store = Self {
            db,
            path,
            sealer: Sealer::new(password)?,
        };
        store.initialize()?;

        // Counting only proves the tables are readable. Documents are
        // authenticated when they are first loaded.
        let counts = store.read(|r| {
            let mut counts = Vec::with_capacity(COLLECTIONS.len());
            for def in COLLECTIONS {
                let table = r.txn.open_table(def.data)?;
                counts.push((def.name, table.len()?));
            }
            Ok(counts)
        })?;
        debug!(path = %store.path.display(), ?counts, "Opened document store");
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut meta = txn.open_table(METADATA_TABLE)?;
            let version = meta.get(VERSION_KEY)?.map(|v| v.value());
            match version {
                Some(found) if found != STORE_SCHEMA_VERSION => {
                    return Err(StoreError::SchemaMismatch {
                        found,
                        expected: STORE_SCHEMA_VERSION,
                    });
                }
                Some(_) => {}
                None => {
                    meta.insert(VERSION_KEY, STORE_SCHEMA_VERSION)?;
                }
            }

            let mut check = txn.open_table(KEYCHECK_TABLE)?;
            let sealed = check.get(KEYCHECK_KEY)?.map(|v| v.value().to_vec());
            match sealed {
                Some(sealed) => {
                    let opened = self.sealer.open(&sealed);
                    if opened.as_deref() != Some(KEYCHECK_SENTINEL) {
                        return Err(StoreError::WrongPassword);
                    }
                }
                None if version.is_some() => {
                    return Err(StoreError::CorruptedDocument {
                        collection: "keycheck",
                        id: 0,
                        reason: "key check record missing".to_string(),
                    });
                }
                None => {
                    let sealed = self.sealer.seal(KEYCHECK_SENTINEL)?;
                    check.insert(KEYCHECK_KEY, sealed.as_slice())?;
                }
            }

            for def in COLLECTIONS {
                txn.open_table(def.data)?;
                for idx in def.indexes {
                    txn.open_table(idx.table)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside a read transaction.
    pub fn read<R>(&self, f: impl FnOnce(&StoreReader<'_>) -> Result<R>) -> Result<R> {
        let reader = StoreReader {
            txn: self.db.begin_read()?,
            sealer: &self.sealer,
        };
        f(&reader)
    }

    /// Run `f` inside a write transaction.
    ///
    /// Commits when `f` returns `Ok`, aborts when it returns `Err`; nothing
    /// `f` wrote is visible after an abort.
    pub fn write<R>(&self, f: impl FnOnce(&mut StoreWriter<'_>) -> Result<R>) -> Result<R> {
        let mut writer = StoreWriter {
            txn: self.db.begin_write()?,
            sealer: &self.sealer,
        };
        match f(&mut writer) {
            Ok(value) => {
                writer.txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = writer.txn.abort() {
                    warn!(error = %abort_err, "Failed to abort store transaction");
                }
                Err(e)
            }
        }
    }

    /// Number of documents in `T`'s collection.
    pub fn count<T: Document>(&self) -> Result<u64> {
        self.read(|r| r.count::<T>())
    }

    /// Document by id.
    pub fn get<T: Document>(&self, id: u64) -> Result<Option<T>> {
        self.read(|r| r.get(id))
    }

    /// Every document, in id order.
    pub fn find_all<T: Document>(&self) -> Result<Vec<T>> {
        self.read(|r| r.find_all())
    }

    /// Documents matching `predicate`, in id order.
    pub fn find<T: Document>(&self, predicate: impl FnMut(&T) -> bool) -> Result<Vec<T>> {
        self.read(|r| r.find(predicate))
    }

    /// Documents whose indexed `field` equals `value`.
    pub fn find_by_index<T: Document>(&self, field: &str, value: &[u8]) -> Result<Vec<T>> {
        self.read(|r| r.find_by_index(field, value))
    }

    /// Insert `doc`, assigning and returning a fresh id.
    pub fn insert<T: Document>(&self, doc: &mut T) -> Result<u64> {
        self.write(|w| w.insert(doc))
    }

    /// Replace the stored document with `doc.id()`.
    pub fn update<T: Document>(&self, doc: &T) -> Result<()> {
        self.write(|w| w.update(doc))
    }

    /// Delete by id; returns whether a document was removed.
    pub fn delete<T: Document>(&self, id: u64) -> Result<bool> {
        self.write(|w| w.delete::<T>(id))
    }

    /// Delete every document matching `predicate`; returns the count.
    pub fn delete_many<T: Document>(&self, predicate: impl FnMut(&T) -> bool) -> Result<usize> {
        self.write(|w| w.delete_many(predicate))
    }

    /// Empty the collection; returns the count removed.
    pub fn delete_all<T: Document>(&self) -> Result<usize> {
        self.write(|w| w.delete_all::<T>())
    }
}

/// Read-only view of the store inside one transaction.
pub struct StoreReader<'s> {
    txn: ReadTransaction,
    sealer: &'s Sealer,
}

impl StoreReader<'_> {
    pub fn count<T: Document>(&self) -> Result<u64> {
        Ok(self.txn.open_table(T::COLLECTION.data)?.len()?)
    }

    pub fn get<T: Document>(&self, id: u64) -> Result<Option<T>> {
        let table = self.txn.open_table(T::COLLECTION.data)?;
        load_doc(&table, self.sealer, id)
    }

    pub fn find_all<T: Document>(&self) -> Result<Vec<T>> {
        self.find(|_| true)
    }

    pub fn find<T: Document>(&self, predicate: impl FnMut(&T) -> bool) -> Result<Vec<T>> {
        let table = self.txn.open_table(T::COLLECTION.data)?;
        scan_docs(&table, self.sealer, predicate)
    }

    pub fn find_by_index<T: Document>(&self, field: &str, value: &[u8]) -> Result<Vec<T>> {
        let def = index_def::<T>(field)?;
        let index = self.txn.open_table(def.table)?;
        let ids = scan_index(&index, Some(encode_index_prefix(value).as_slice()), None)?;
        let data = self.txn.open_table(T::COLLECTION.data)?;
        resolve_ids(&data, self.sealer, def, ids)
    }

    /// Documents ordered by indexed `field` ascending, at most `limit`.
    pub fn ordered_by<T: Document>(&self, field: &str, limit: Option<usize>) -> Result<Vec<T>> {
        let def = index_def::<T>(field)?;
        let index = self.txn.open_table(def.table)?;
        let ids = scan_index(&index, None, limit)?;
        let data = self.txn.open_table(T::COLLECTION.data)?;
        resolve_ids(&data, self.sealer, def, ids)
    }
}

/// Read-write view of the store inside one transaction.
///
/// redb refuses to open a table twice in one write transaction, so every
/// method opens what it needs and releases it before returning.
pub struct StoreWriter<'s> {
    txn: WriteTransaction,
    sealer: &'s Sealer,
}

impl StoreWriter<'_> {
    pub fn count<T: Document>(&self) -> Result<u64> {
        Ok(self.txn.open_table(T::COLLECTION.data)?.len()?)
    }

    pub fn get<T: Document>(&self, id: u64) -> Result<Option<T>> {
        let table = self.txn.open_table(T::COLLECTION.data)?;
        load_doc(&table, self.sealer, id)
    }

    pub fn find<T: Document>(&self, predicate: impl FnMut(&T) -> bool) -> Result<Vec<T>> {
        let table = self.txn.open_table(T::COLLECTION.data)?;
        scan_docs(&table, self.sealer, predicate)
    }

    pub fn find_by_index<T: Document>(&self, field: &str, value: &[u8]) -> Result<Vec<T>> {
        let def = index_def::<T>(field)?;
        let ids = {
            let index = self.txn.open_table(def.table)?;
            scan_index(&index, Some(encode_index_prefix(value).as_slice()), None)?
        };
        let data = self.txn.open_table(T::COLLECTION.data)?;
        resolve_ids(&data, self.sealer, def, ids)
    }

    /// Ids ordered by indexed `field` ascending, at most `limit`.
    pub fn ids_ordered_by<T: Document>(&self, field: &str, limit: Option<usize>) -> Result<Vec<u64>> {
        let def = index_def::<T>(field)?;
        let index = self.txn.open_table(def.table)?;
        scan_index(&index, None, limit)
    }

    pub fn insert<T: Document>(&mut self, doc: &mut T) -> Result<u64> {
        let id = self.next_id(T::COLLECTION)?;
        doc.set_id(id);
        self.put(doc)?;
        Ok(id)
    }

    pub fn update<T: Document>(&mut self, doc: &T) -> Result<()> {
        if self.remove::<T>(doc.id())?.is_none() {
            return Err(StoreError::DocumentNotFound {
                collection: T::COLLECTION.name,
                id: doc.id(),
            });
        }
        self.put(doc)
    }

    pub fn delete<T: Document>(&mut self, id: u64) -> Result<bool> {
        Ok(self.remove::<T>(id)?.is_some())
    }

    pub fn delete_many<T: Document>(&mut self, predicate: impl FnMut(&T) -> bool) -> Result<usize> {
        let doomed = self.find(predicate)?;
        for doc in &doomed {
            self.remove::<T>(doc.id())?;
        }
        Ok(doomed.len())
    }

    pub fn delete_all<T: Document>(&mut self) -> Result<usize> {
        self.delete_many::<T>(|_| true)
    }

    fn next_id(&mut self, collection: &CollectionDef) -> Result<u64> {
        let key = seq_key(collection);
        let mut meta = self.txn.open_table(METADATA_TABLE)?;
        let next = meta.get(key.as_str())?.map(|v| v.value()).unwrap_or(0) + 1;
        meta.insert(key.as_str(), next)?;
        Ok(next)
    }

    fn put<T: Document>(&mut self, doc: &T) -> Result<()> {
        let id = doc.id();
        let sealed = self.sealer.encode(doc)?;
        {
            let mut data = self.txn.open_table(T::COLLECTION.data)?;
            data.insert(id, sealed.as_slice())?;
        }
        for (def, value) in T::COLLECTION.indexes.iter().zip(doc.index_values()) {
            let mut index = self.txn.open_table(def.table)?;
            index.insert(encode_index_key(&value, id).as_slice(), id)?;
        }
        Ok(())
    }

    fn remove<T: Document>(&mut self, id: u64) -> Result<Option<T>> {
        let old: Option<T> = {
            let mut data = self.txn.open_table(T::COLLECTION.data)?;
            let sealed = data.remove(id)?.map(|v| v.value().to_vec());
            match sealed {
                Some(sealed) => Some(self.sealer.decode(id, &sealed)?),
                None => None,
            }
        };
        if let Some(doc) = &old {
            for (def, value) in T::COLLECTION.indexes.iter().zip(doc.index_values()) {
                let mut index = self.txn.open_table(def.table)?;
                index.remove(encode_index_key(&value, id).as_slice())?;
            }
        }
        Ok(old)
    }
}
