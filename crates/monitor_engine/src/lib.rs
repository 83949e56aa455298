//! Monitor engine: socket driver, event buffer and effect execution.
mod buffer;
mod client;
mod persist;
mod probe;
mod settings;

pub use buffer::{EventBuffer, DEFAULT_DURABLE_CAPACITY, DEFAULT_LIVE_CAPACITY};
pub use client::{MonitorHandle, MonitorSnapshot};
pub use persist::{
    ensure_history_dir, AtomicFileWriter, EventStore, FileEventStore, MemoryEventStore,
    PersistError,
};
pub use probe::{wait_until_ready, HealthProbe, ReqwestHealthProbe};
pub use settings::{ClientSettings, SetupError};
