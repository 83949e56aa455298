use std::time::Duration;

use crate::{reduce, replay, Event, ProcessStatus};

/// Read-only window over the buffered events.
///
/// Sequence numbers are assigned on append and never reused within a
/// session, so `first_seq` tells how much of the history has been evicted.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    pub events: &'a [Event],
    pub first_seq: u64,
}

impl<'a> BufferView<'a> {
    pub fn new(events: &'a [Event], first_seq: u64) -> Self {
        Self { events, first_seq }
    }

    /// One past the sequence number of the newest event.
    pub fn end_seq(&self) -> u64 {
        self.first_seq + self.events.len() as u64
    }

    fn since(&self, seq: u64) -> &'a [Event] {
        let offset = seq.saturating_sub(self.first_seq) as usize;
        self.events.get(offset..).unwrap_or(&[])
    }
}

/// How the last input was folded into the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Unchanged,
    Incremental { applied: usize },
    Rebuilt { events: usize },
}

/// Keeps the derived status in step with the buffer across hide/show cycles.
#[derive(Debug, Clone)]
pub struct VisibilityReconciler {
    debounce: Duration,
    status: ProcessStatus,
    cursor: Option<u64>,
    last_rebuild_ms: Option<u64>,
    visible: bool,
}

impl VisibilityReconciler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            status: ProcessStatus::initial(),
            cursor: None,
            last_rebuild_ms: None,
            visible: true,
        }
    }

    pub fn status(&self) -> &ProcessStatus {
        &self.status
    }

    /// Sequence number of the last event folded into the status.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    pub fn last_rebuild_ms(&self) -> Option<u64> {
        self.last_rebuild_ms
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Called after one or more events were appended to the buffer.
    pub fn on_appended(&mut self, view: BufferView<'_>, now_ms: u64) -> Reconciliation {
        if self.is_stale(view) {
            return self.rebuild(view, now_ms);
        }
        if !self.visible {
            return Reconciliation::Unchanged;
        }

        let pending = view.since(self.next_seq());
        for event in pending {
            self.status = reduce(std::mem::take(&mut self.status), event);
            self.cursor = Some(self.next_seq());
        }
        if pending.is_empty() {
            Reconciliation::Unchanged
        } else {
            Reconciliation::Incremental {
                applied: pending.len(),
            }
        }
    }

    pub fn set_visible(
        &mut self,
        visible: bool,
        view: BufferView<'_>,
        now_ms: u64,
    ) -> Reconciliation {
        let was_visible = std::mem::replace(&mut self.visible, visible);
        if !visible || was_visible {
            return Reconciliation::Unchanged;
        }

        let debounce_elapsed = match self.last_rebuild_ms {
            Some(last) => now_ms.saturating_sub(last) > self.debounce.as_millis() as u64,
            None => true,
        };
        if debounce_elapsed || self.is_stale(view) {
            return self.rebuild(view, now_ms);
        }

        // Events that arrived while hidden land in one replacement.
        let pending = view.since(self.next_seq());
        if pending.is_empty() {
            return Reconciliation::Unchanged;
        }
        self.status = pending
            .iter()
            .fold(self.status.clone(), |status, event| reduce(status, event));
        self.cursor = Some(view.end_seq() - 1);
        Reconciliation::Incremental {
            applied: pending.len(),
        }
    }

    /// Replace the status with a full fold over the buffer in one step.
    pub fn rebuild(&mut self, view: BufferView<'_>, now_ms: u64) -> Reconciliation {
        self.status = replay(view.events);
        self.cursor = view.end_seq().checked_sub(1).filter(|_| !view.events.is_empty());
        self.last_rebuild_ms = Some(now_ms);
        Reconciliation::Rebuilt {
            events: view.events.len(),
        }
    }

    /// Forget all derived state, e.g. after the history was cleared.
    pub fn reset(&mut self) {
        self.status = ProcessStatus::initial();
        self.cursor = None;
    }

    fn next_seq(&self) -> u64 {
        self.cursor.map_or(0, |cursor| cursor + 1)
    }

    // The cursor ran past the buffer (cleared) or unseen events were evicted.
    fn is_stale(&self, view: BufferView<'_>) -> bool {
        match self.cursor {
            Some(cursor) => cursor >= view.end_seq() || cursor + 1 < view.first_seq,
            None => view.first_seq > 0,
        }
    }
}
