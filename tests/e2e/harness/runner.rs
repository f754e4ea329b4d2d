use super::assertions::Assertion;
use super::clock::MockClock;
use super::steps::{ScenarioStep, TabSpec};
use super::workspace::{noise, TestWorkspace};
use anyhow::{anyhow, ensure, Context, Result};
use insait_store::{SessionManager, StoreConfig, StoreStatus, TabSnapshot};
use std::fs;
use std::time::Duration;

/// Executes scenarios against a real SessionManager
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    config: StoreConfig,
    manager: Option<SessionManager>,
    clock: MockClock,
    crashed: bool,
    current_step: usize,
    initial_fingerprint: Option<String>,
}

impl ScenarioRunner {
    /// Create a new runner, optionally capping history via config.toml
    pub fn new(history_cap: Option<usize>) -> Result<Self> {
        let workspace = match history_cap {
            Some(cap) => TestWorkspace::with_history_cap(cap)?,
            None => TestWorkspace::empty()?,
        };
        let config = workspace.config()?;
        let clock = MockClock::new();
        let manager = workspace
            .open_manager()?
            .with_time_provider(clock.as_provider());
        let initial_fingerprint = manager.key_fingerprint();

        Ok(Self {
            workspace,
            config,
            manager: Some(manager),
            clock,
            crashed: false,
            current_step: 0,
            initial_fingerprint,
        })
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    /// Execute a single step
    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Play {
                path,
                position,
                time,
            } => {
                self.clock.advance_secs(1);
                self.manager()?.add_to_history(path, *position, *time);
                Ok(())
            }
            ScenarioStep::PlayMany { prefix, count } => self.handle_play_many(prefix, *count),
            ScenarioStep::SaveSession {
                tabs,
                active_tab_id,
                volume,
                audio_device_id,
                language_code,
            } => self.handle_save_session(
                tabs,
                *active_tab_id,
                *volume,
                audio_device_id.as_deref(),
                language_code.as_deref(),
            ),
            ScenarioStep::ClearSession => {
                self.manager()?.clear_session();
                Ok(())
            }
            ScenarioStep::DeleteHistoryEntry { path } => self.handle_delete_entry(path),
            ScenarioStep::ClearHistory => {
                self.manager()?.clear_history();
                Ok(())
            }
            ScenarioStep::Reset => {
                self.manager()?.reset();
                Ok(())
            }

            ScenarioStep::Wait { duration } => self.handle_wait(*duration),

            ScenarioStep::Crash => self.handle_crash(),
            ScenarioStep::Restart => self.handle_restart(),
            ScenarioStep::CorruptStoreFile { seed } => {
                self.require_crashed()?;
                let name = self.config.storage.database_file.clone();
                self.workspace.write_file(&name, &noise(32 * 1024, *seed))
            }
            ScenarioStep::CorruptHistoryDocuments => {
                self.require_crashed()?;
                let name = self.config.storage.database_file.clone();
                let tampered = self.workspace.tamper_history_documents(&name)?;
                ensure!(tampered > 0, "No history documents to corrupt");
                Ok(())
            }
            ScenarioStep::CorruptKeyFile => {
                self.require_crashed()?;
                let name = self.config.storage.key_file.clone();
                self.workspace.write_file(&name, b"not a protected key")
            }
            ScenarioStep::DeleteKeyFile => {
                self.require_crashed()?;
                let name = self.config.storage.key_file.clone();
                self.workspace.remove_file(&name)
            }
            ScenarioStep::CreateAuxiliaryFiles => {
                for path in self.config.auxiliary_paths() {
                    fs::write(&path, b"stale")
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
                Ok(())
            }
            ScenarioStep::BlockStoreFile => {
                self.require_crashed()?;
                let path = self.config.database_path();
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                // A directory in place of the file can be neither opened nor
                // removed as a file.
                fs::create_dir_all(path.join("blocked"))?;
                Ok(())
            }

            ScenarioStep::OpenSecondHandle => self.handle_second_handle(),

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    fn manager(&mut self) -> Result<&mut SessionManager> {
        self.manager
            .as_mut()
            .ok_or_else(|| anyhow!("SessionManager not available (crashed?)"))
    }

    fn require_crashed(&self) -> Result<()> {
        ensure!(self.crashed, "Files can only be tampered with while crashed");
        Ok(())
    }

    // ===== Player action handlers =====

    fn handle_play_many(&mut self, prefix: &str, count: usize) -> Result<()> {
        for i in 0..count {
            self.clock.advance_secs(1);
            let path = format!("{}{:04}.mp4", prefix, i);
            self.manager()?.add_to_history(&path, 0.0, 0);
        }
        Ok(())
    }

    fn handle_save_session(
        &mut self,
        tabs: &[TabSpec],
        active_tab_id: Option<i32>,
        volume: i32,
        audio_device_id: Option<&str>,
        language_code: Option<&str>,
    ) -> Result<()> {
        let snapshots: Vec<TabSnapshot> = tabs
            .iter()
            .map(|tab| TabSnapshot::new(tab.id, tab.file_path.as_deref(), tab.title.clone()))
            .collect();
        self.clock.advance_secs(1);
        self.manager()?.save_session(
            &snapshots,
            active_tab_id,
            volume,
            audio_device_id,
            language_code,
        );
        Ok(())
    }

    fn handle_delete_entry(&mut self, path: &str) -> Result<()> {
        let manager = self.manager()?;
        let id = manager
            .get_history()
            .into_iter()
            .find(|item| item.file_path == path)
            .map(|item| item.id)
            .ok_or_else(|| anyhow!("No history entry for {}", path))?;
        ensure!(manager.delete_history_item(id), "Entry {} vanished", id);
        Ok(())
    }

    // ===== Time control =====

    fn handle_wait(&mut self, duration: Duration) -> Result<()> {
        self.clock.advance(duration);
        Ok(())
    }

    // ===== Failure simulation =====

    fn handle_crash(&mut self) -> Result<()> {
        // Drop the manager; redb releases its lock with the handle
        self.manager = None;
        self.crashed = true;
        Ok(())
    }

    fn handle_restart(&mut self) -> Result<()> {
        if !self.crashed {
            return Err(anyhow!("Cannot restart - not crashed"));
        }

        let manager = self
            .workspace
            .open_manager()?
            .with_time_provider(self.clock.as_provider());

        self.manager = Some(manager);
        self.crashed = false;
        Ok(())
    }

    // ===== Concurrency =====

    fn handle_second_handle(&mut self) -> Result<()> {
        ensure!(!self.crashed, "A second handle needs a running first one");
        let mut second = self.workspace.open_manager()?;
        ensure!(
            second.status() == StoreStatus::Disabled && second.is_locked(),
            "Second handle opened a store that is already in use ({})",
            second.status()
        );
        second.add_to_history("/second-handle.mp4", 0.0, 0);
        second.reset();
        ensure!(second.is_locked(), "Second handle reset a store in use");
        Ok(())
    }

    // ===== Assertions =====

    fn handle_assertion(&mut self, assertion: &Assertion) -> Result<()> {
        match assertion {
            Assertion::FileExists(name) => {
                ensure!(self.workspace.file_exists(name), "Expected {} to exist", name);
                return Ok(());
            }
            Assertion::FileMissing(name) => {
                ensure!(!self.workspace.file_exists(name), "Expected {} to be absent", name);
                return Ok(());
            }
            Assertion::NotOnDisk { file, text } => {
                let content = self.workspace.read_file(file)?;
                let needle = text.as_bytes();
                ensure!(
                    !content.windows(needle.len()).any(|w| w == needle),
                    "{:?} found in plaintext in {}",
                    text,
                    file
                );
                return Ok(());
            }
            _ => {}
        }

        let initial_fingerprint = self.initial_fingerprint.clone();
        let manager = self.manager()?;
        match assertion {
            Assertion::HistoryLen(expected) => {
                let actual = manager.get_history().len();
                ensure!(actual == *expected, "Expected {} history entries, found {}", expected, actual);
            }
            Assertion::HistoryContains { path } => {
                ensure!(
                    manager.get_history().iter().any(|h| &h.file_path == path),
                    "History does not contain {}",
                    path
                );
            }
            Assertion::HistoryMissing { path } => {
                ensure!(
                    !manager.get_history().iter().any(|h| &h.file_path == path),
                    "History unexpectedly contains {}",
                    path
                );
            }
            Assertion::HistoryNewestFirst(expected) => {
                let actual: Vec<String> =
                    manager.get_history().into_iter().map(|h| h.file_path).collect();
                ensure!(&actual == expected, "History order {:?}, expected {:?}", actual, expected);
            }
            Assertion::HistoryEntry {
                path,
                position,
                time,
            } => {
                let entry = manager
                    .get_history()
                    .into_iter()
                    .find(|h| &h.file_path == path)
                    .ok_or_else(|| anyhow!("No history entry for {}", path))?;
                ensure!(
                    entry.last_position == *position && entry.last_time == *time,
                    "Entry {} has position {} / time {}",
                    path,
                    entry.last_position,
                    entry.last_time
                );
            }
            Assertion::SearchFinds { query, count } => {
                let found = manager.search_history(query).len();
                ensure!(found == *count, "Search {:?} found {}, expected {}", query, found, count);
            }
            Assertion::NoSession => {
                ensure!(manager.load_session().is_none(), "Expected no saved session");
            }
            Assertion::SessionTabCount(expected) => {
                let session = manager
                    .load_session()
                    .ok_or_else(|| anyhow!("No saved session"))?;
                ensure!(
                    session.tabs.len() == *expected,
                    "Expected {} tabs, found {}",
                    expected,
                    session.tabs.len()
                );
            }
            Assertion::SessionTitles(expected) => {
                let session = manager
                    .load_session()
                    .ok_or_else(|| anyhow!("No saved session"))?;
                let titles: Vec<String> = session.tabs.into_iter().map(|t| t.title).collect();
                ensure!(&titles == expected, "Tab titles {:?}, expected {:?}", titles, expected);
            }
            Assertion::SessionPaths(expected) => {
                let session = manager
                    .load_session()
                    .ok_or_else(|| anyhow!("No saved session"))?;
                let paths: Vec<Option<String>> =
                    session.tabs.into_iter().map(|t| t.file_path).collect();
                ensure!(&paths == expected, "Tab paths {:?}, expected {:?}", paths, expected);
            }
            Assertion::SessionVolume(expected) => {
                let session = manager
                    .load_session()
                    .ok_or_else(|| anyhow!("No saved session"))?;
                ensure!(session.volume == *expected, "Volume {}, expected {}", session.volume, expected);
            }
            Assertion::SessionActiveTab(expected) => {
                let session = manager
                    .load_session()
                    .ok_or_else(|| anyhow!("No saved session"))?;
                ensure!(
                    session.active_tab_order == *expected,
                    "Active tab order {}, expected {}",
                    session.active_tab_order,
                    expected
                );
            }
            Assertion::Status(expected) => {
                let actual = manager.status();
                ensure!(actual == *expected, "Store status {}, expected {}", actual, expected);
            }
            Assertion::KeySource(expected) => {
                let actual = manager.key_source();
                ensure!(actual == Some(*expected), "Key source {:?}, expected {}", actual, expected);
            }
            Assertion::KeyChanged => {
                ensure!(
                    manager.key_fingerprint() != initial_fingerprint,
                    "Key fingerprint unchanged"
                );
            }
            Assertion::Custom(check) => check(manager)?,
            Assertion::FileExists(_) | Assertion::FileMissing(_) | Assertion::NotOnDisk { .. } => {}
        }
        Ok(())
    }
}
