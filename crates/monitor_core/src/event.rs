use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Named stage of backend work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Scraping,
    Analysis,
    BatchAnalysis,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Scraping => "scraping",
            Phase::Analysis => "analysis",
            Phase::BatchAnalysis => "batch_analysis",
        }
    }

    fn parse(raw: &str) -> Result<Self, FrameError> {
        match raw {
            "idle" => Ok(Phase::Idle),
            "scraping" => Ok(Phase::Scraping),
            "analysis" => Ok(Phase::Analysis),
            "batch_analysis" => Ok(Phase::BatchAnalysis),
            other => Err(FrameError::UnknownPhase(other.to_string())),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    // Unrecognized levels are treated as absent rather than failing the frame.
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// One frame of the backend event stream.
///
/// Serializes to and from the wire shape, so persisted history uses the same
/// format as the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame", into = "RawFrame")]
pub enum Event {
    Log {
        level: Option<LogLevel>,
        message: Option<String>,
        timestamp: Option<String>,
    },
    PhaseChange {
        phase: Phase,
        message: Option<String>,
        timestamp: Option<String>,
    },
    PhaseEnd {
        phase: Option<Phase>,
        message: Option<String>,
        timestamp: Option<String>,
    },
    /// Older backends signal completion without naming the phase.
    Finished { timestamp: Option<String> },
    StatusUpdate {
        current_item: Option<String>,
        app: Option<String>,
        model: Option<String>,
        timestamp: Option<String>,
    },
    ProgressTotal {
        value: f64,
        timestamp: Option<String>,
    },
    ProgressCurrent {
        value: f64,
        timestamp: Option<String>,
    },
    Ping,
    Pong,
    /// Any frame type this client does not know; kept for display, ignored by the reducer.
    ///
    /// Every field other than `type`, `message` and `timestamp` is kept in
    /// `fields`, so stored history writes the frame back as received.
    Unknown {
        kind: String,
        message: Option<String>,
        timestamp: Option<String>,
        fields: Map<String, Value>,
    },
}

impl Event {
    pub fn kind(&self) -> &str {
        match self {
            Event::Log { .. } => "log",
            Event::PhaseChange { .. } => "phase_change",
            Event::PhaseEnd { .. } => "phase_end",
            Event::Finished { .. } => "finished",
            Event::StatusUpdate { .. } => "status_update",
            Event::ProgressTotal { .. } => "progress_total",
            Event::ProgressCurrent { .. } => "progress_current",
            Event::Ping => "ping",
            Event::Pong => "pong",
            Event::Unknown { kind, .. } => kind,
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Event::Log { timestamp, .. }
            | Event::PhaseChange { timestamp, .. }
            | Event::PhaseEnd { timestamp, .. }
            | Event::Finished { timestamp }
            | Event::StatusUpdate { timestamp, .. }
            | Event::ProgressTotal { timestamp, .. }
            | Event::ProgressCurrent { timestamp, .. }
            | Event::Unknown { timestamp, .. } => timestamp.as_deref(),
            Event::Ping | Event::Pong => None,
        }
    }

    /// Unknown frame with no payload besides its type.
    pub fn unknown(kind: impl Into<String>) -> Self {
        Event::Unknown {
            kind: kind.into(),
            message: None,
            timestamp: None,
            fields: Map::new(),
        }
    }

    pub fn is_pong(&self) -> bool {
        matches!(self, Event::Pong)
    }

    /// Keepalive frame sent by the client.
    pub fn ping_frame() -> String {
        r#"{"type":"ping"}"#.to_string()
    }

    /// Parse one text frame from the socket.
    pub fn parse_frame(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|err| FrameError::Malformed(err.to_string()))?;
        Event::try_from(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("frame of type {kind} is missing field {field}")]
    MissingField { kind: String, field: &'static str },
    #[error("unknown phase {0:?}")]
    UnknownPhase(String),
}

/// Flat wire representation shared by every frame type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phase: Option<String>,
    #[serde(default, skip_serializing)]
    process_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    /// Fields no known frame type uses.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl RawFrame {
    fn with_kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    fn phase(&self) -> Result<Option<Phase>, FrameError> {
        self.phase
            .as_deref()
            .or(self.process_type.as_deref())
            .map(Phase::parse)
            .transpose()
    }

    /// Everything except `type`, `message` and `timestamp`, as received.
    fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.extra;
        let strings = [
            ("level", self.level),
            ("phase", self.phase),
            ("process_type", self.process_type),
            ("current_item", self.current_item),
            ("app", self.app),
            ("model", self.model),
        ];
        for (name, value) in strings {
            if let Some(value) = value {
                fields.insert(name.to_string(), Value::String(value));
            }
        }
        if let Some(value) = self.value {
            fields.insert("value".to_string(), Value::from(value));
        }
        fields
    }

    fn value(&self) -> Result<f64, FrameError> {
        self.value.ok_or_else(|| FrameError::MissingField {
            kind: self.kind.clone(),
            field: "value",
        })
    }
}

impl TryFrom<RawFrame> for Event {
    type Error = FrameError;

    fn try_from(mut raw: RawFrame) -> Result<Self, Self::Error> {
        let event = match raw.kind.as_str() {
            "log" => Event::Log {
                level: raw.level.as_deref().and_then(LogLevel::parse),
                message: raw.message,
                timestamp: raw.timestamp,
            },
            "phase_change" | "analysis_started" | "process_type_change" => {
                let phase = raw.phase()?.ok_or_else(|| FrameError::MissingField {
                    kind: raw.kind.clone(),
                    field: "phase",
                })?;
                Event::PhaseChange {
                    phase,
                    message: raw.message,
                    timestamp: raw.timestamp,
                }
            }
            "phase_end" => Event::PhaseEnd {
                phase: raw.phase()?,
                message: raw.message,
                timestamp: raw.timestamp,
            },
            "finished" | "analysis_finished" => Event::Finished {
                timestamp: raw.timestamp,
            },
            "status_update" => Event::StatusUpdate {
                current_item: raw.current_item,
                app: raw.app,
                model: raw.model,
                timestamp: raw.timestamp,
            },
            "progress_total" | "progress_apps_total" | "progress_reviews_total" => {
                Event::ProgressTotal {
                    value: raw.value()?,
                    timestamp: raw.timestamp,
                }
            }
            "progress_current" | "progress_apps_current" | "progress_reviews_current" => {
                Event::ProgressCurrent {
                    value: raw.value()?,
                    timestamp: raw.timestamp,
                }
            }
            "ping" => Event::Ping,
            "pong" => Event::Pong,
            _ => {
                let kind = std::mem::take(&mut raw.kind);
                let message = raw.message.take();
                let timestamp = raw.timestamp.take();
                Event::Unknown {
                    kind,
                    message,
                    timestamp,
                    fields: raw.into_fields(),
                }
            }
        };
        Ok(event)
    }
}

impl From<Event> for RawFrame {
    fn from(event: Event) -> Self {
        let mut raw = RawFrame::with_kind(event.kind());
        match event {
            Event::Log {
                level,
                message,
                timestamp,
            } => {
                raw.level = level.map(|level| level.as_str().to_string());
                raw.message = message;
                raw.timestamp = timestamp;
            }
            Event::PhaseChange {
                phase,
                message,
                timestamp,
            } => {
                raw.phase = Some(phase.as_str().to_string());
                raw.message = message;
                raw.timestamp = timestamp;
            }
            Event::PhaseEnd {
                phase,
                message,
                timestamp,
            } => {
                raw.phase = phase.map(|phase| phase.as_str().to_string());
                raw.message = message;
                raw.timestamp = timestamp;
            }
            Event::Finished { timestamp } => raw.timestamp = timestamp,
            Event::StatusUpdate {
                current_item,
                app,
                model,
                timestamp,
            } => {
                raw.current_item = current_item;
                raw.app = app;
                raw.model = model;
                raw.timestamp = timestamp;
            }
            Event::ProgressTotal { value, timestamp }
            | Event::ProgressCurrent { value, timestamp } => {
                raw.value = Some(value);
                raw.timestamp = timestamp;
            }
            Event::Unknown {
                message,
                timestamp,
                fields,
                ..
            } => {
                raw.message = message;
                raw.timestamp = timestamp;
                raw.extra = fields;
            }
            Event::Ping | Event::Pong => {}
        }
        raw
    }
}
