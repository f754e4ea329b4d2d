//! Error types for insait_store operations.

use thiserror::Error;

/// Core error type for store operations.
///
/// None of these reach the UI: [`SessionManager`](crate::SessionManager)
/// recovers from every variant locally. They exist so the lower layers can
/// use `?` and so logs say what actually went wrong.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the embedded database engine.
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    /// The store was opened with a key that does not match the one it was
    /// created with.
    #[error("store password rejected")]
    WrongPassword,

    /// Another handle, in this process or another, holds the store's lock.
    #[error("store is in use by another handle: {0}")]
    Locked(String),

    /// The store file has a schema version this build does not understand.
    #[error("store schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch {
        /// Version found in the file
        found: u64,
        /// Version this build writes
        expected: u64,
    },

    /// A stored document could not be decrypted or decoded.
    #[error("corrupted document in '{collection}' (id {id}): {reason}")]
    CorruptedDocument {
        /// Collection the document lives in
        collection: &'static str,
        /// Document id
        id: u64,
        /// Description of the corruption
        reason: String,
    },

    /// A secondary index points at a document that does not exist.
    #[error("index '{index}' on '{collection}' is inconsistent: {reason}")]
    IndexCorrupted {
        /// Collection owning the index
        collection: &'static str,
        /// Indexed field
        index: &'static str,
        /// Description of the inconsistency
        reason: String,
    },

    /// Lookup on a field that has no index.
    #[error("collection '{collection}' has no index on '{field}'")]
    UnknownIndex {
        /// Collection queried
        collection: &'static str,
        /// Field requested
        field: String,
    },

    /// Update or delete addressed a document id that is not stored.
    #[error("document {id} not found in '{collection}'")]
    DocumentNotFound {
        /// Collection queried
        collection: &'static str,
        /// Missing id
        id: u64,
    },

    /// Serialization error while encoding a document.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Encryption primitive failed (bad key length, RNG failure, ...).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The OS key protection facility is missing or refused the request.
    #[error("key protection unavailable: {0}")]
    KeyUnavailable(String),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns true when the error means the store file itself can no longer
    /// be trusted, as opposed to a transient I/O problem.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::WrongPassword
                | Self::SchemaMismatch { .. }
                | Self::CorruptedDocument { .. }
                | Self::IndexCorrupted { .. }
        )
    }

    /// Returns true when the store is held open elsewhere. The file is
    /// healthy and must not be deleted.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Database(e.into())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Database(e.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        Self::Database(e.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        Self::Database(e.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        Self::Database(e.into())
    }
}

/// Convenience Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
