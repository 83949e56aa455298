use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use monitor_core::Event;
use monitor_logging::monitor_warn;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("history directory missing or not writable: {0}")]
    HistoryDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("history is not a JSON array: {0}")]
    Corrupt(String),
    #[error("failed to serialize history: {0}")]
    Serialize(String),
    #[error("store unavailable")]
    Unavailable,
}

/// Durable backing for the event history.
///
/// Each `save` replaces the whole record.
pub trait EventStore: Send {
    fn load(&self) -> Result<Vec<Event>, PersistError>;
    fn save(&self, events: &[Event]) -> Result<(), PersistError>;
    fn clear(&self) -> Result<(), PersistError>;
}

/// Ensure the history directory exists; create if missing.
pub fn ensure_history_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::HistoryDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::HistoryDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::HistoryDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_history_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// History kept as a JSON array in a single file.
pub struct FileEventStore {
    path: PathBuf,
    writer: AtomicFileWriter,
    filename: String,
}

impl FileEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "history.json".to_string());
        Self {
            path,
            writer: AtomicFileWriter::new(dir),
            filename,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventStore for FileEventStore {
    fn load(&self) -> Result<Vec<Event>, PersistError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| PersistError::Corrupt(e.to_string()))?;
        let total = entries.len();
        let events: Vec<Event> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<Event>(entry).ok())
            .filter(|event| !event.is_pong())
            .collect();
        if events.len() < total {
            monitor_warn!(
                "Skipped {} unreadable entries in {:?}",
                total - events.len(),
                self.path
            );
        }
        Ok(events)
    }

    fn save(&self, events: &[Event]) -> Result<(), PersistError> {
        let content =
            serde_json::to_string(events).map_err(|e| PersistError::Serialize(e.to_string()))?;
        self.writer.write(&self.filename, &content)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryRecord {
    events: Option<Vec<Event>>,
    failing: bool,
}

/// In-memory store. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    record: Arc<Mutex<MemoryRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        let store = Self::default();
        store.lock().events = Some(events);
        store
    }

    /// Contents of the durable record, `None` when erased or never written.
    pub fn stored(&self) -> Option<Vec<Event>> {
        self.lock().events.clone()
    }

    /// Make every subsequent operation fail with `PersistError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRecord> {
        // A poisoned record is still plain data.
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventStore for MemoryEventStore {
    fn load(&self) -> Result<Vec<Event>, PersistError> {
        let record = self.lock();
        if record.failing {
            return Err(PersistError::Unavailable);
        }
        Ok(record.events.clone().unwrap_or_default())
    }

    fn save(&self, events: &[Event]) -> Result<(), PersistError> {
        let mut record = self.lock();
        if record.failing {
            return Err(PersistError::Unavailable);
        }
        record.events = Some(events.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        let mut record = self.lock();
        if record.failing {
            return Err(PersistError::Unavailable);
        }
        record.events = None;
        Ok(())
    }
}
