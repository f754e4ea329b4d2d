use anyhow::Result;
use insait_store::{KeySource, SessionManager, StoreStatus};

/// Declarative assertions on store state
pub enum Assertion {
    // History
    HistoryLen(usize),
    HistoryContains {
        path: String,
    },
    HistoryMissing {
        path: String,
    },
    HistoryNewestFirst(Vec<String>),
    HistoryEntry {
        path: String,
        position: f32,
        time: i64,
    },
    SearchFinds {
        query: String,
        count: usize,
    },

    // Session
    NoSession,
    SessionTabCount(usize),
    SessionTitles(Vec<String>),
    SessionPaths(Vec<Option<String>>),
    SessionVolume(i32),
    SessionActiveTab(i32),

    // Store
    Status(StoreStatus),
    KeySource(KeySource),
    KeyChanged,
    FileExists(String),
    FileMissing(String),
    NotOnDisk {
        file: String,
        text: String,
    },

    // Custom (takes mutable reference since every manager call may recover)
    Custom(Box<dyn Fn(&mut SessionManager) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HistoryLen(n) => write!(f, "HistoryLen({})", n),
            Self::HistoryContains { path } => write!(f, "HistoryContains {{ path: {:?} }}", path),
            Self::HistoryMissing { path } => write!(f, "HistoryMissing {{ path: {:?} }}", path),
            Self::HistoryNewestFirst(paths) => write!(f, "HistoryNewestFirst({:?})", paths),
            Self::HistoryEntry {
                path,
                position,
                time,
            } => write!(
                f,
                "HistoryEntry {{ path: {:?}, position: {}, time: {} }}",
                path, position, time
            ),
            Self::SearchFinds { query, count } => {
                write!(f, "SearchFinds {{ query: {:?}, count: {} }}", query, count)
            }
            Self::NoSession => write!(f, "NoSession"),
            Self::SessionTabCount(n) => write!(f, "SessionTabCount({})", n),
            Self::SessionTitles(titles) => write!(f, "SessionTitles({:?})", titles),
            Self::SessionPaths(paths) => write!(f, "SessionPaths({:?})", paths),
            Self::SessionVolume(v) => write!(f, "SessionVolume({})", v),
            Self::SessionActiveTab(n) => write!(f, "SessionActiveTab({})", n),
            Self::Status(s) => write!(f, "Status({})", s),
            Self::KeySource(s) => write!(f, "KeySource({})", s),
            Self::KeyChanged => write!(f, "KeyChanged"),
            Self::FileExists(name) => write!(f, "FileExists({:?})", name),
            Self::FileMissing(name) => write!(f, "FileMissing({:?})", name),
            Self::NotOnDisk { file, text } => {
                write!(f, "NotOnDisk {{ file: {:?}, text: {:?} }}", file, text)
            }
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}
