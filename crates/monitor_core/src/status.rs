use chrono::{DateTime, FixedOffset};

use crate::Phase;

pub const READY_MESSAGE: &str = "Ready";

/// Status derived from the event history; never stored on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStatus {
    pub is_running: bool,
    pub phase: Phase,
    pub status_message: String,
    pub current_item: Option<String>,
    pub progress: Option<Progress>,
    pub last_finished_phase: Option<Phase>,
}

impl ProcessStatus {
    pub fn initial() -> Self {
        Self {
            is_running: false,
            phase: Phase::Idle,
            status_message: READY_MESSAGE.to_string(),
            current_item: None,
            progress: None,
            last_finished_phase: None,
        }
    }
}

impl Default for ProcessStatus {
    fn default() -> Self {
        Self::initial()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub current: f64,
    pub total: f64,
    pub percentage: f64,
    /// Seconds remaining at the observed rate.
    pub eta: Option<f64>,
    /// Items per second since the total was announced.
    pub speed: Option<f64>,
    /// Timestamp of the `progress_total` frame, when it carried one.
    pub started_at: Option<DateTime<FixedOffset>>,
}

impl Progress {
    pub fn new(total: f64, started_at: Option<DateTime<FixedOffset>>) -> Self {
        Self {
            current: 0.0,
            total,
            percentage: 0.0,
            eta: None,
            speed: None,
            started_at,
        }
    }
}
