use std::sync::Once;
use std::time::Duration;

use monitor_core::{
    replay, BufferView, Event, Phase, ProcessStatus, Reconciliation, VisibilityReconciler,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

const DEBOUNCE: Duration = Duration::from_secs(5);

/// Sliding window over an append-only history, like the live buffer.
struct Window {
    events: Vec<Event>,
    first_seq: u64,
    cap: usize,
}

impl Window {
    fn new(cap: usize) -> Self {
        Self {
            events: Vec::new(),
            first_seq: 0,
            cap,
        }
    }

    fn push(&mut self, event: Event) {
        self.events.push(event);
        if self.events.len() > self.cap {
            self.events.remove(0);
            self.first_seq += 1;
        }
    }

    fn view(&self) -> BufferView<'_> {
        BufferView::new(&self.events, self.first_seq)
    }
}

fn log(message: &str) -> Event {
    Event::Log {
        level: None,
        message: Some(message.to_string()),
        timestamp: None,
    }
}

fn scraping() -> Event {
    Event::PhaseChange {
        phase: Phase::Scraping,
        message: None,
        timestamp: None,
    }
}

#[test]
fn visible_appends_dispatch_incrementally() {
    init_logging();
    let mut window = Window::new(50);
    let mut reconciler = VisibilityReconciler::new(DEBOUNCE);

    window.push(scraping());
    assert_eq!(
        reconciler.on_appended(window.view(), 0),
        Reconciliation::Incremental { applied: 1 }
    );
    window.push(log("working"));
    assert_eq!(
        reconciler.on_appended(window.view(), 10),
        Reconciliation::Incremental { applied: 1 }
    );

    assert_eq!(reconciler.cursor(), Some(1));
    assert_eq!(reconciler.status().status_message, "working");
    assert_eq!(reconciler.last_rebuild_ms(), None);
}

#[test]
fn sliding_eviction_keeps_incremental_path() {
    init_logging();
    let mut window = Window::new(3);
    let mut reconciler = VisibilityReconciler::new(DEBOUNCE);
    window.push(scraping());
    reconciler.on_appended(window.view(), 0);
    for index in 0..10 {
        window.push(log(&format!("step {index}")));
        assert_eq!(
            reconciler.on_appended(window.view(), index),
            Reconciliation::Incremental { applied: 1 }
        );
    }
    assert_eq!(reconciler.cursor(), Some(10));
    // Incremental state still remembers the evicted phase change.
    assert!(reconciler.status().is_running);
    assert_eq!(reconciler.status().status_message, "step 9");
}

#[test]
fn hidden_appends_are_deferred() {
    init_logging();
    let mut window = Window::new(50);
    let mut reconciler = VisibilityReconciler::new(DEBOUNCE);
    reconciler.set_visible(false, window.view(), 0);

    window.push(scraping());
    assert_eq!(
        reconciler.on_appended(window.view(), 100),
        Reconciliation::Unchanged
    );
    assert_eq!(reconciler.status(), &ProcessStatus::initial());
    assert_eq!(reconciler.cursor(), None);
}

#[test]
fn regaining_visibility_after_debounce_rebuilds() {
    init_logging();
    let mut window = Window::new(50);
    let mut reconciler = VisibilityReconciler::new(DEBOUNCE);
    window.push(scraping());
    reconciler.rebuild(window.view(), 0);

    reconciler.set_visible(false, window.view(), 1_000);
    window.push(log("a"));
    window.push(log("b"));
    reconciler.on_appended(window.view(), 2_000);

    assert_eq!(
        reconciler.set_visible(true, window.view(), 6_000),
        Reconciliation::Rebuilt { events: 3 }
    );
    assert_eq!(reconciler.status(), &replay(&window.events));
    assert_eq!(reconciler.cursor(), Some(2));
    assert_eq!(reconciler.last_rebuild_ms(), Some(6_000));
}

#[test]
fn regaining_visibility_within_debounce_catches_up_in_one_step() {
    init_logging();
    let mut window = Window::new(50);
    let mut reconciler = VisibilityReconciler::new(DEBOUNCE);
    window.push(scraping());
    reconciler.rebuild(window.view(), 0);

    reconciler.set_visible(false, window.view(), 1_000);
    window.push(log("a"));
    window.push(log("b"));

    assert_eq!(
        reconciler.set_visible(true, window.view(), 3_000),
        Reconciliation::Incremental { applied: 2 }
    );
    assert_eq!(reconciler.status().status_message, "b");
    assert_eq!(reconciler.cursor(), Some(2));
    assert_eq!(reconciler.last_rebuild_ms(), Some(0));
}

#[test]
fn eviction_of_unseen_events_forces_rebuild() {
    init_logging();
    let mut window = Window::new(3);
    let mut reconciler = VisibilityReconciler::new(Duration::from_secs(3600));
    window.push(scraping());
    reconciler.rebuild(window.view(), 0);

    reconciler.set_visible(false, window.view(), 1);
    for index in 0..5 {
        window.push(log(&format!("hidden {index}")));
    }
    assert_eq!(
        reconciler.set_visible(true, window.view(), 2),
        Reconciliation::Rebuilt { events: 3 }
    );
    // The phase change was evicted, so the rebuilt status is idle.
    assert_eq!(reconciler.status(), &replay(&window.events));
    assert!(!reconciler.status().is_running);
}

#[test]
fn cursor_past_end_forces_rebuild() {
    init_logging();
    let mut window = Window::new(50);
    let mut reconciler = VisibilityReconciler::new(DEBOUNCE);
    window.push(scraping());
    window.push(log("a"));
    reconciler.on_appended(window.view(), 0);
    assert_eq!(reconciler.cursor(), Some(1));

    // History restarted from scratch without a reset.
    let mut fresh = Window::new(50);
    fresh.push(log("only"));
    assert_eq!(
        reconciler.on_appended(fresh.view(), 1),
        Reconciliation::Rebuilt { events: 1 }
    );
    assert_eq!(reconciler.status(), &ProcessStatus::initial());
    assert_eq!(reconciler.cursor(), Some(0));
}

#[test]
fn rebuild_equals_incremental_result() {
    init_logging();
    let mut window = Window::new(50);
    let mut incremental = VisibilityReconciler::new(DEBOUNCE);
    for event in [
        scraping(),
        Event::ProgressTotal {
            value: 8.0,
            timestamp: None,
        },
        Event::ProgressCurrent {
            value: 2.0,
            timestamp: None,
        },
        log("halfway"),
    ] {
        window.push(event);
        incremental.on_appended(window.view(), 0);
    }

    let mut rebuilt = VisibilityReconciler::new(DEBOUNCE);
    rebuilt.rebuild(window.view(), 0);
    assert_eq!(incremental.status(), rebuilt.status());
    assert_eq!(incremental.cursor(), rebuilt.cursor());
}

#[test]
fn reset_returns_to_initial() {
    init_logging();
    let mut window = Window::new(50);
    let mut reconciler = VisibilityReconciler::new(DEBOUNCE);
    window.push(scraping());
    reconciler.on_appended(window.view(), 0);

    reconciler.reset();
    assert_eq!(reconciler.status(), &ProcessStatus::initial());
    assert_eq!(reconciler.cursor(), None);

    let empty = Window::new(50);
    assert_eq!(
        reconciler.on_appended(empty.view(), 1),
        Reconciliation::Unchanged
    );
}
