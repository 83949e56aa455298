//! Monitor core: wire event model, status reducer and pure state machines.
mod backoff;
pub mod connection;
mod event;
mod reconciler;
mod reducer;
mod status;

pub use backoff::BackoffPolicy;
pub use connection::{
    update, ConnEffect, ConnMsg, Connection, ConnectionConfig, ConnectionState, Generation,
    NORMAL_CLOSE,
};
pub use event::{Event, FrameError, LogLevel, Phase};
pub use reconciler::{BufferView, Reconciliation, VisibilityReconciler};
pub use reducer::{completion_message, reduce, replay, starting_message};
pub use status::{ProcessStatus, Progress, READY_MESSAGE};
