//! Insait Store Library
//!
//! Encrypted local persistence for the Insait video player:
//! - A per-user 256-bit key, wrapped by the OS where possible
//! - Field-level string encryption for file paths
//! - An embedded encrypted document store (session + watch history)
//! - A [`SessionManager`] façade that recovers from corruption on its own
//!
//! # Quick Start
//!
//! ```
//! use insait_store::{SessionManager, StoreConfig};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let mut manager = SessionManager::open(StoreConfig::in_dir(tmp.path()));
//!
//! manager.add_to_history("/videos/a.mp4", 0.25, 30_000);
//! manager.add_to_history("/videos/a.mp4", 0.50, 60_000);
//!
//! // Same path, one entry
//! let history = manager.get_history();
//! assert_eq!(history.len(), 1);
//! assert_eq!(history[0].last_time, 60_000);
//! ```
//!
//! # Field Encryption
//!
//! Paths are encrypted with a fresh IV each time, so the same input never
//! produces the same blob twice:
//!
//! ```
//! use insait_store::{cipher, EncryptionKey, KeySource};
//!
//! let key = EncryptionKey::from_bytes([3; 32], KeySource::Generated);
//! let a = cipher::encrypt("/videos/a.mp4", &key);
//! let b = cipher::encrypt("/videos/a.mp4", &key);
//! assert_ne!(a, b);
//! assert_eq!(cipher::decrypt(&a, &key), "/videos/a.mp4");
//! assert_eq!(cipher::decrypt("garbage", &key), "");
//! ```

pub mod cipher;
mod clock;
mod config;
mod documents;
mod error;
mod key_provider;
mod manager;
mod store;

pub use clock::{SystemClock, TimeProvider};
pub use config::{
    default_data_dir, HistoryConfig, StorageConfig, StoreConfig, APP_DIR_NAME, CONFIG_FILE_NAME,
};
pub use documents::{
    CollectionDef, Document, HistoryItem, HistoryRecord, IndexDef, SavedTabState,
    SessionDocument, SessionRecord, TabRecord, TabSnapshot, DEFAULT_SESSION_ID,
};
pub use error::{Result, StoreError};
pub use key_provider::{
    fallback_key, platform_protector, EncryptionKey, KeyProtector, KeyProvider, KeySource,
    UnavailableProtector, KEY_SIZE,
};
pub use manager::{SessionManager, StoreStatus};
pub use store::{DocumentStore, StoreReader, StoreWriter, STORE_SCHEMA_VERSION};

#[cfg(windows)]
pub use key_provider::DpapiProtector;
