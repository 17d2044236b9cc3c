//! Store persistence
//!
//! Loading never fails hard: a missing or unreadable store is an empty store
//! plus a warning. Saving replaces the whole store atomically, so a reader
//! sees either the old contents or the new ones, never a torn write.

use crate::config::{StoreBackend, StoreConfig};
use crate::models::TradeRecord;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait TradeStore: Send + Sync {
    fn describe(&self) -> String;

    fn load(&self) -> StoreLoad;

    /// Replace the persisted store with `records` (already sorted newest first)
    fn save(&self, records: &[TradeRecord]) -> Result<(), StoreError>;
}

/// Result of a load: the records (possibly empty) and why they might be empty
#[derive(Debug, Default)]
pub struct StoreLoad {
    pub records: Vec<TradeRecord>,
    pub warning: Option<StoreError>,
}

impl StoreLoad {
    pub(crate) fn empty_with(warning: StoreError) -> Self {
        warn!("⚠️ Starting from an empty store: {}", warning);
        Self {
            records: Vec::new(),
            warning: Some(warning),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    Missing(PathBuf),
    Corrupt(String),
    Io(std::io::Error),
    Sqlite(rusqlite::Error),
    Serialization(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "store not found at {}", path.display()),
            Self::Corrupt(e) => write!(f, "store is unreadable: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Sqlite(e) => write!(f, "SQLite error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

/// JSON array on disk, newest first; the format the dashboard reads directly
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file, unique per writer so overlapping runs never share one
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.temp_path();
        let written = (|| -> Result<(), std::io::Error> {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(contents)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            drop(writer);
            fs::rename(&temp_path, &self.path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        self.sync_parent_dir()
    }

    /// Persist the rename itself; without this a crash can resurrect the old file
    #[cfg(unix)]
    fn sync_parent_dir(&self) -> Result<(), StoreError> {
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        File::open(parent)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent_dir(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl TradeStore for JsonFileStore {
    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    fn load(&self) -> StoreLoad {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return StoreLoad::empty_with(StoreError::Missing(self.path.clone()))
            }
            Err(e) => return StoreLoad::empty_with(StoreError::Io(e)),
        };

        match serde_json::from_str::<Vec<TradeRecord>>(&contents) {
            Ok(records) => {
                debug!("Loaded {} records from {}", records.len(), self.path.display());
                StoreLoad {
                    records,
                    warning: None,
                }
            }
            Err(e) => StoreLoad::empty_with(StoreError::Corrupt(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&self, records: &[TradeRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)?;
        self.write_atomic(&json)?;
        info!("💾 Saved {} trades to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Build the configured store backend
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn TradeStore>, StoreError> {
    match config.backend {
        StoreBackend::Json => Ok(Box::new(JsonFileStore::new(&config.path))),
        StoreBackend::Sqlite => Ok(Box::new(super::SqliteTradeStore::open(&config.path)?)),
    }
}
