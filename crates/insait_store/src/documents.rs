//! Stored document types and the plaintext views handed to callers.
//!
//! `*Record` types are what the store persists: file paths inside them are
//! cipher blobs. The view types ([`SessionDocument`], [`SavedTabState`],
//! [`HistoryItem`]) carry plaintext and never touch disk.

use redb::TableDefinition;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the singleton session document.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Data table of a collection: document id to sealed document bytes.
pub type DataTable = TableDefinition<'static, u64, &'static [u8]>;

/// Secondary index table: composite key (value, id) to document id.
pub type IndexTable = TableDefinition<'static, &'static [u8], u64>;

/// A secondary index over one document field.
pub struct IndexDef {
    /// Field name used in lookups.
    pub field: &'static str,
    /// Backing table.
    pub table: IndexTable,
}

/// Static description of a collection.
pub struct CollectionDef {
    /// Collection name, also the id sequence name.
    pub name: &'static str,
    /// Backing data table.
    pub data: DataTable,
    /// Secondary indexes, in the order [`Document::index_values`] yields them.
    pub indexes: &'static [IndexDef],
}

impl CollectionDef {
    /// Looks up an index by field name.
    pub fn index(&self, field: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|idx| idx.field == field)
    }
}

/// A document storable in a [`DocumentStore`](crate::DocumentStore) collection.
pub trait Document: Serialize + DeserializeOwned {
    /// Collection this document type lives in.
    const COLLECTION: &'static CollectionDef;

    /// Document id; 0 until the first insert assigns one.
    fn id(&self) -> u64;

    /// Sets the id assigned by the store.
    fn set_id(&mut self, id: u64);

    /// Indexed values, one per entry of `COLLECTION.indexes`, same order.
    fn index_values(&self) -> Vec<Vec<u8>>;
}

/// Encodes a timestamp so that byte order matches numeric order.
pub fn timestamp_index_value(millis: i64) -> Vec<u8> {
    ((millis as u64) ^ (1 << 63)).to_be_bytes().to_vec()
}

const SESSIONS: CollectionDef = CollectionDef {
    name: "sessions",
    data: TableDefinition::new("sessions"),
    indexes: &[IndexDef {
        field: "session_id",
        table: TableDefinition::new("sessions.session_id"),
    }],
};

const HISTORY: CollectionDef = CollectionDef {
    name: "history",
    data: TableDefinition::new("history"),
    indexes: &[
        IndexDef {
            field: "path_tag",
            table: TableDefinition::new("history.path_tag"),
        },
        IndexDef {
            field: "watched_at",
            table: TableDefinition::new("history.watched_at"),
        },
    ],
};

/// All collections the store creates on open.
pub const COLLECTIONS: &[&CollectionDef] = &[&SESSIONS, &HISTORY];

/// Stored form of the session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: u64,
    pub session_id: String,
    pub snapshot_id: Uuid,
    pub tabs: Vec<TabRecord>,
    pub active_tab_order: i32,
    pub volume: i32,
    pub selected_audio_device_id: Option<String>,
    pub selected_language_code: Option<String>,
    pub last_saved: i64,
}

/// Stored form of one tab. `file_path` is a cipher blob, empty for no file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRecord {
    pub id: i32,
    pub file_path: String,
    pub title: String,
    pub tab_order: i32,
}

impl Document for SessionRecord {
    const COLLECTION: &'static CollectionDef = &SESSIONS;

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn index_values(&self) -> Vec<Vec<u8>> {
        vec![self.session_id.as_bytes().to_vec()]
    }
}

/// Stored form of a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    /// Cipher blob of the plaintext path.
    pub file_path: String,
    /// Keyed digest of the plaintext path.
    pub path_tag: [u8; 32],
    pub watched_at: i64,
    pub last_position: f32,
    pub last_time: i64,
}

impl Document for HistoryRecord {
    const COLLECTION: &'static CollectionDef = &HISTORY;

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn index_values(&self) -> Vec<Vec<u8>> {
        vec![
            self.path_tag.to_vec(),
            timestamp_index_value(self.watched_at),
        ]
    }
}

/// Tab as supplied by the UI layer when saving a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSnapshot {
    pub id: i32,
    pub file_path: Option<String>,
    pub title: String,
}

impl TabSnapshot {
    pub fn new(id: i32, file_path: Option<&str>, title: impl Into<String>) -> Self {
        Self {
            id,
            file_path: file_path.map(str::to_string),
            title: title.into(),
        }
    }
}

/// Decrypted session state returned by
/// [`SessionManager::load_session`](crate::SessionManager::load_session).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDocument {
    pub session_id: String,
    pub snapshot_id: Uuid,
    pub tabs: Vec<SavedTabState>,
    pub active_tab_order: i32,
    pub volume: i32,
    pub selected_audio_device_id: Option<String>,
    pub selected_language_code: Option<String>,
    /// Unix milliseconds.
    pub last_saved: i64,
}

/// One restored tab. `file_path` is `None` for an empty tab or a path that
/// no longer decrypts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedTabState {
    pub id: i32,
    pub file_path: Option<String>,
    pub title: String,
    pub tab_order: i32,
}

/// Decrypted history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub id: u64,
    pub file_path: String,
    /// Unix milliseconds.
    pub watched_at: i64,
    pub last_position: f32,
    /// Playback time in milliseconds.
    pub last_time: i64,
}

impl HistoryItem {
    /// Final path component, accepting both `/` and `\` separators.
    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_path)
    }

    /// Case-insensitive substring match over file name and full path.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        self.file_name().to_lowercase().contains(&needle)
            || self.file_path.to_lowercase().contains(&needle)
    }
}
