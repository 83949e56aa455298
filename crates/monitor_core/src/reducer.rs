use chrono::{DateTime, FixedOffset};

use crate::{Event, Phase, ProcessStatus, Progress};

/// Pure reducer: applies one event to a status.
///
/// Total over every event kind; kinds without a status meaning leave the
/// status untouched.
pub fn reduce(mut status: ProcessStatus, event: &Event) -> ProcessStatus {
    match event {
        Event::PhaseChange {
            phase: Phase::Idle, ..
        } => {
            status.is_running = false;
            status.phase = Phase::Idle;
        }
        Event::PhaseChange { phase, .. } => {
            status.is_running = true;
            status.phase = *phase;
            status.status_message = starting_message(*phase).to_string();
            status.current_item = None;
            status.progress = None;
        }
        Event::PhaseEnd { phase, .. } => {
            let finished = phase.unwrap_or(status.phase);
            finish(&mut status, finished);
        }
        Event::Finished { .. } => {
            let finished = status.phase;
            finish(&mut status, finished);
        }
        Event::StatusUpdate {
            current_item,
            app,
            model,
            ..
        } => {
            if let Some(label) = item_label(current_item.as_deref(), app.as_deref(), model.as_deref())
            {
                status.status_message = format!("Processing {label}");
                status.current_item = Some(label);
            }
        }
        Event::ProgressTotal { value, timestamp } => {
            status.progress = Some(Progress::new(*value, parse_timestamp(timestamp.as_deref())));
        }
        Event::ProgressCurrent { value, timestamp } => {
            if let Some(progress) = status.progress.as_mut() {
                advance(progress, *value, parse_timestamp(timestamp.as_deref()));
            }
        }
        Event::Log {
            message: Some(message),
            ..
        } if status.is_running => {
            status.status_message = message.clone();
        }
        Event::Log { .. } | Event::Ping | Event::Pong | Event::Unknown { .. } => {}
    }
    status
}

/// Folds the reducer over a history, starting from the initial status.
pub fn replay<'a, I>(events: I) -> ProcessStatus
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .fold(ProcessStatus::initial(), |status, event| reduce(status, event))
}

pub fn starting_message(phase: Phase) -> &'static str {
    match phase {
        Phase::Scraping => "Starting scraping...",
        Phase::Analysis => "Starting analysis...",
        Phase::BatchAnalysis => "Starting batch analysis...",
        Phase::Idle => crate::status::READY_MESSAGE,
    }
}

pub fn completion_message(phase: Phase) -> &'static str {
    match phase {
        Phase::Scraping => "Scraping complete",
        Phase::Analysis => "Analysis complete",
        Phase::BatchAnalysis => "Batch analysis complete",
        Phase::Idle => "Process complete",
    }
}

fn finish(status: &mut ProcessStatus, finished: Phase) {
    status.is_running = false;
    status.phase = Phase::Idle;
    status.status_message = completion_message(finished).to_string();
    status.last_finished_phase = Some(finished);
}

fn item_label(current_item: Option<&str>, app: Option<&str>, model: Option<&str>) -> Option<String> {
    if let Some(item) = current_item {
        return Some(item.to_string());
    }
    match (app, model) {
        (Some(app), Some(model)) => Some(format!("{app} ({model})")),
        (Some(app), None) => Some(app.to_string()),
        (None, Some(model)) => Some(model.to_string()),
        (None, None) => None,
    }
}

fn advance(progress: &mut Progress, current: f64, at: Option<DateTime<FixedOffset>>) {
    progress.current = current;
    progress.percentage = if progress.total > 0.0 {
        current / progress.total * 100.0
    } else {
        0.0
    };

    // Rate is derived from frame timestamps only, so replays agree with live folds.
    let elapsed_secs = match (progress.started_at, at) {
        (Some(start), Some(at)) => (at - start).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    if elapsed_secs > 0.0 && current > 0.0 {
        let speed = current / elapsed_secs;
        progress.speed = Some(speed);
        progress.eta = Some((progress.total - current).max(0.0) / speed);
    } else {
        progress.speed = None;
        progress.eta = None;
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    raw.and_then(|text| DateTime::parse_from_rfc3339(text).ok())
}
