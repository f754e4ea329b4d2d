//! Session and watch-history façade.
//!
//! [`SessionManager`] owns the key and the store handle. Callers never see
//! an error: whenever the store misbehaves the manager deletes the store
//! file and the key file, acquires a fresh key and reopens once. If that
//! also fails, persistence is disabled for the rest of the process and
//! every call becomes a no-op returning empty results.
//!
//! A store that another handle holds open is left alone: the manager goes
//! straight to disabled and touches neither the store nor the key file.

use crate::cipher;
use crate::clock::{SystemClock, TimeProvider};
use crate::config::StoreConfig;
use crate::documents::{
    HistoryItem, HistoryRecord, SavedTabState, SessionDocument, SessionRecord, TabRecord,
    TabSnapshot, DEFAULT_SESSION_ID,
};
use crate::error::{Result, StoreError};
use crate::key_provider::{platform_protector, EncryptionKey, KeyProtector, KeyProvider, KeySource};
use crate::store::DocumentStore;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Volume bounds accepted on save.
const VOLUME_RANGE: (i32, i32) = (0, 100);

/// Whether persistence is currently working.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// Store is open; operations persist.
    Open,
    /// Recovery failed; operations are no-ops until restart.
    Disabled,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

enum StoreState {
    Open(DocumentStore),
    Disabled,
}

/// Encrypted session and history persistence.
///
/// # Example
///
/// ```
/// use insait_store::{SessionManager, StoreConfig, TabSnapshot};
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let mut manager = SessionManager::open(StoreConfig::in_dir(tmp.path()));
///
/// manager.add_to_history("/videos/intro.mp4", 0.4, 12_000);
/// assert_eq!(manager.get_history()[0].file_path, "/videos/intro.mp4");
///
/// let tabs = [TabSnapshot::new(1, Some("/videos/intro.mp4"), "Intro")];
/// manager.save_session(&tabs, Some(1), 65, None, Some("en"));
/// assert_eq!(manager.load_session().unwrap().volume, 65);
/// ```
pub struct SessionManager {
    config: StoreConfig,
    key_provider: KeyProvider,
    key: Option<EncryptionKey>,
    state: StoreState,
    locked: bool,
    clock: Box<dyn TimeProvider>,
}

impl SessionManager {
    /// Opens the store described by `config` using the platform's key
    /// protection.
    pub fn open(config: StoreConfig) -> Self {
        Self::with_protector(config, platform_protector())
    }

    /// Opens the store with an explicit key protector.
    pub fn with_protector(config: StoreConfig, protector: Box<dyn KeyProtector>) -> Self {
        let key_provider = KeyProvider::new(config.key_path(), protector);
        let mut manager = Self {
            config,
            key_provider,
            key: None,
            state: StoreState::Disabled,
            locked: false,
            clock: Box::new(SystemClock),
        };

        match manager.try_open() {
            Ok(()) => {}
            Err(e) if e.is_locked() => manager.stand_down(&e),
            Err(e) => {
                warn!(
                    path = %manager.config.database_path().display(),
                    error = %e,
                    corruption = e.is_corruption(),
                    "Session store unusable, recreating"
                );
                manager.recreate();
            }
        }
        manager
    }

    /// Replaces the clock used for history and session timestamps.
    pub fn with_time_provider(mut self, clock: impl TimeProvider + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current persistence status.
    pub fn status(&self) -> StoreStatus {
        match self.state {
            StoreState::Open(_) => StoreStatus::Open,
            StoreState::Disabled => StoreStatus::Disabled,
        }
    }

    /// Whether persistence is disabled because another handle holds the
    /// store open.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Where the current key came from, if one is held.
    pub fn key_source(&self) -> Option<KeySource> {
        self.key.as_ref().map(EncryptionKey::source)
    }

    /// Non-secret key identifier for diagnostics.
    pub fn key_fingerprint(&self) -> Option<String> {
        self.key.as_ref().map(EncryptionKey::fingerprint)
    }

    /// Replaces the stored session with the given tabs and settings.
    ///
    /// `active_tab_id` selects the tab whose position becomes the active tab
    /// order; an unknown or missing id selects position 0. `volume` is
    /// clamped to 0..=100.
    pub fn save_session(
        &mut self,
        tabs: &[TabSnapshot],
        active_tab_id: Option<i32>,
        volume: i32,
        audio_device_id: Option<&str>,
        language_code: Option<&str>,
    ) {
        let now = self.clock.now_millis();
        self.with_store("save_session", |store, key| {
            let active_tab_order = active_tab_id
                .and_then(|id| tabs.iter().position(|tab| tab.id == id))
                .unwrap_or(0) as i32;

            let mut record = SessionRecord {
                id: 0,
                session_id: DEFAULT_SESSION_ID.to_string(),
                snapshot_id: Uuid::new_v4(),
                tabs: tabs
                    .iter()
                    .enumerate()
                    .map(|(order, tab)| TabRecord {
                        id: tab.id,
                        file_path: cipher::encrypt(tab.file_path.as_deref().unwrap_or(""), key),
                        title: tab.title.clone(),
                        tab_order: order as i32,
                    })
                    .collect(),
                active_tab_order,
                volume: volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1),
                selected_audio_device_id: audio_device_id.map(str::to_string),
                selected_language_code: language_code.map(str::to_string),
                last_saved: now,
            };

            store.write(|w| {
                let previous: Vec<SessionRecord> =
                    w.find_by_index("session_id", DEFAULT_SESSION_ID.as_bytes())?;
                for doc in &previous {
                    w.delete::<SessionRecord>(doc.id)?;
                }
                w.insert(&mut record)?;
                Ok(())
            })?;

            debug!(tabs = tabs.len(), snapshot = %record.snapshot_id, "Saved session");
            Ok(())
        });
    }

    /// Loads the stored session with file paths decrypted.
    pub fn load_session(&mut self) -> Option<SessionDocument> {
        self.with_store("load_session", |store, key| {
            let found: Vec<SessionRecord> =
                store.find_by_index("session_id", DEFAULT_SESSION_ID.as_bytes())?;
            Ok(found.into_iter().next().map(|record| {
                let mut tabs: Vec<SavedTabState> = record
                    .tabs
                    .into_iter()
                    .map(|tab| {
                        let path = cipher::decrypt(&tab.file_path, key);
                        SavedTabState {
                            id: tab.id,
                            file_path: (!path.is_empty()).then_some(path),
                            title: tab.title,
                            tab_order: tab.tab_order,
                        }
                    })
                    .collect();
                tabs.sort_by_key(|tab| tab.tab_order);

                SessionDocument {
                    session_id: record.session_id,
                    snapshot_id: record.snapshot_id,
                    tabs,
                    active_tab_order: record.active_tab_order,
                    volume: record.volume,
                    selected_audio_device_id: record.selected_audio_device_id,
                    selected_language_code: record.selected_language_code,
                    last_saved: record.last_saved,
                }
            }))
        })
    }

    /// Removes the stored session.
    pub fn clear_session(&mut self) {
        self.with_store("clear_session", |store, _| {
            store.delete_many::<SessionRecord>(|doc| doc.session_id == DEFAULT_SESSION_ID)?;
            Ok(())
        });
    }

    /// Records that `file_path` was watched.
    ///
    /// An already-known path is updated in place; a new one is inserted and
    /// the oldest entries beyond the configured cap are evicted in the same
    /// transaction. Empty paths are ignored.
    pub fn add_to_history(&mut self, file_path: &str, position: f32, time: i64) {
        if file_path.is_empty() {
            return;
        }
        let now = self.clock.now_millis();
        let cap = self.config.history.max_items;

        self.with_store("add_to_history", |store, key| {
            let tag = cipher::lookup_tag(file_path, key);
            let evicted = store.write(|w| {
                let mut existing: Vec<HistoryRecord> = w.find_by_index("path_tag", &tag)?;
                if !existing.is_empty() {
                    let mut entry = existing.remove(0);
                    for duplicate in &existing {
                        w.delete::<HistoryRecord>(duplicate.id)?;
                    }
                    entry.watched_at = now;
                    entry.last_position = position;
                    entry.last_time = time;
                    w.update(&entry)?;
                    return Ok(0);
                }

                let mut record = HistoryRecord {
                    id: 0,
                    file_path: cipher::encrypt(file_path, key),
                    path_tag: tag,
                    watched_at: now,
                    last_position: position,
                    last_time: time,
                };
                w.insert(&mut record)?;

                let count = w.count::<HistoryRecord>()? as usize;
                if count <= cap {
                    return Ok(0);
                }
                let oldest = w.ids_ordered_by::<HistoryRecord>("watched_at", Some(count - cap))?;
                for id in &oldest {
                    w.delete::<HistoryRecord>(*id)?;
                }
                Ok(oldest.len())
            })?;

            if evicted > 0 {
                debug!(evicted, cap, "Trimmed watch history");
            }
            Ok(())
        });
    }

    /// History entries, newest first. Entries whose path no longer decrypts
    /// are left out.
    pub fn get_history(&mut self) -> Vec<HistoryItem> {
        self.with_store("get_history", |store, key| {
            let records = store.read(|r| r.ordered_by::<HistoryRecord>("watched_at", None))?;
            Ok(records
                .into_iter()
                .rev()
                .filter_map(|record| {
                    let file_path = cipher::decrypt(&record.file_path, key);
                    if file_path.is_empty() {
                        return None;
                    }
                    Some(HistoryItem {
                        id: record.id,
                        file_path,
                        watched_at: record.watched_at,
                        last_position: record.last_position,
                        last_time: record.last_time,
                    })
                })
                .collect())
        })
    }

    /// History entries whose file name or path contains `query`, ignoring
    /// case. A blank query returns everything.
    pub fn search_history(&mut self, query: &str) -> Vec<HistoryItem> {
        self.get_history()
            .into_iter()
            .filter(|item| item.matches(query))
            .collect()
    }

    /// Number of stored history entries.
    pub fn history_len(&mut self) -> usize {
        self.with_store("history_len", |store, _| {
            Ok(store.count::<HistoryRecord>()? as usize)
        })
    }

    /// Deletes one history entry; returns whether it existed.
    pub fn delete_history_item(&mut self, id: u64) -> bool {
        self.with_store("delete_history_item", |store, _| {
            store.delete::<HistoryRecord>(id)
        })
    }

    /// Deletes every history entry.
    pub fn clear_history(&mut self) {
        self.with_store("clear_history", |store, _| {
            let removed = store.delete_all::<HistoryRecord>()?;
            debug!(removed, "Cleared watch history");
            Ok(())
        });
    }

    /// Discards the store and the key and starts over.
    ///
    /// Does nothing while another handle still holds the store open.
    pub fn reset(&mut self) {
        info!("Session store reset requested");
        if self.locked {
            if let Err(e) = self.try_open() {
                if e.is_locked() {
                    warn!(error = %e, "Session store in use elsewhere, reset skipped");
                    return;
                }
            }
        }
        self.recreate();
    }

    fn try_open(&mut self) -> Result<()> {
        let key = self.key_provider.get_or_create_key();
        let opened = DocumentStore::open(self.config.database_path(), &key);
        self.key = Some(key);
        self.state = StoreState::Open(opened?);
        self.locked = false;
        Ok(())
    }

    /// Disables persistence without touching any file.
    fn stand_down(&mut self, e: &StoreError) {
        self.state = StoreState::Disabled;
        self.locked = true;
        warn!(
            path = %self.config.database_path().display(),
            error = %e,
            "Session store in use by another handle, persistence disabled"
        );
    }

    fn recreate(&mut self) {
        // Release the file lock before deleting.
        self.state = StoreState::Disabled;

        remove_if_present(&self.config.database_path());
        for aux in self.config.auxiliary_paths() {
            remove_if_present(&aux);
        }
        self.key_provider.discard_key_file();
        self.key = None;

        match self.try_open() {
            Ok(()) => info!(
                path = %self.config.database_path().display(),
                key_source = ?self.key_source(),
                "Recreated session store"
            ),
            Err(e) if e.is_locked() => self.stand_down(&e),
            Err(e) => {
                self.state = StoreState::Disabled;
                error!(
                    path = %self.config.database_path().display(),
                    error = %e,
                    "Session persistence disabled"
                );
            }
        }
    }

    /// Runs `f` against the open store. Under Disabled, or when `f` fails,
    /// returns `R::default()`; a failure also triggers a recreate.
    fn with_store<R: Default>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&DocumentStore, &EncryptionKey) -> Result<R>,
    ) -> R {
        let (store, key) = match (&self.state, &self.key) {
            (StoreState::Open(store), Some(key)) => (store, key),
            _ => return R::default(),
        };

        match f(store, key) {
            Ok(value) => value,
            Err(e) if e.is_locked() => {
                self.stand_down(&e);
                R::default()
            }
            Err(e) => {
                warn!(
                    operation,
                    error = %e,
                    corruption = e.is_corruption(),
                    "Session store operation failed, recreating"
                );
                self.recreate();
                R::default()
            }
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("data_dir", &self.config.data_dir)
            .field("status", &self.status())
            .field("locked", &self.locked)
            .field("key_source", &self.key_source())
            .finish()
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed store file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove store file"),
    }
}
