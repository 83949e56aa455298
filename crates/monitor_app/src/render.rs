//! Plain-text rendering of monitor snapshots.

use chrono::DateTime;
use monitor_core::{ConnectionState, Event, ProcessStatus};
use monitor_engine::MonitorSnapshot;

/// Tracks what has already been printed so each snapshot only adds new lines.
#[derive(Debug, Default)]
pub struct Renderer {
    last_status: Option<String>,
    printed_seq: u64,
    clear_count: u64,
}

impl Renderer {
    pub fn render(&mut self, snapshot: &MonitorSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if snapshot.clear_count != self.clear_count {
            lines.push("-- history cleared --".to_string());
            self.clear_count = snapshot.clear_count;
            self.printed_seq = 0;
        }
        let appended = snapshot.end_seq.saturating_sub(self.printed_seq);
        let fresh = usize::try_from(appended)
            .unwrap_or(usize::MAX)
            .min(snapshot.messages.len());
        let start = snapshot.messages.len() - fresh;
        lines.extend(snapshot.messages[start..].iter().map(event_line));
        self.printed_seq = snapshot.end_seq;

        let status = status_line(snapshot.connection_state, &snapshot.status);
        if self.last_status.as_ref() != Some(&status) {
            lines.push(status.clone());
            self.last_status = Some(status);
        }
        lines
    }
}

pub fn status_line(connection: ConnectionState, status: &ProcessStatus) -> String {
    let mut line = format!("[{connection}] ");
    if status.is_running {
        line.push_str(&format!("{}: ", status.phase));
    }
    line.push_str(&status.status_message);
    if let Some(progress) = &status.progress {
        line.push_str(&format!(
            " | {}/{} ({:.1}%)",
            progress.current, progress.total, progress.percentage
        ));
        if let Some(eta) = progress.eta {
            line.push_str(&format!(" eta {}s", eta.round()));
        }
    }
    line
}

pub fn event_line(event: &Event) -> String {
    let time = event
        .timestamp()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let detail = match event {
        Event::Log { level, message, .. } => format!(
            "{}: {}",
            level.map_or("log", |level| level.as_str()),
            message.as_deref().unwrap_or("")
        ),
        Event::PhaseChange { phase, message, .. } => match message {
            Some(message) => format!("phase {phase}: {message}"),
            None => format!("phase {phase}"),
        },
        Event::PhaseEnd { phase, .. } => match phase {
            Some(phase) => format!("phase {phase} ended"),
            None => "phase ended".to_string(),
        },
        Event::Finished { .. } => "finished".to_string(),
        Event::StatusUpdate {
            current_item,
            app,
            model,
            ..
        } => format!(
            "item {}",
            current_item
                .as_deref()
                .or(app.as_deref())
                .or(model.as_deref())
                .unwrap_or("?")
        ),
        Event::ProgressTotal { value, .. } => format!("total {value}"),
        Event::ProgressCurrent { value, .. } => format!("progress {value}"),
        Event::Ping | Event::Pong => event.kind().to_string(),
        Event::Unknown { kind, message, .. } => match message {
            Some(message) => format!("({kind}) {message}"),
            None => format!("({kind})"),
        },
    };
    format!("{time} {detail}")
}
