use monitor_core::{BufferView, Event};
use monitor_logging::{monitor_error, monitor_info, monitor_warn};

use crate::EventStore;

pub const DEFAULT_LIVE_CAPACITY: usize = 50;
pub const DEFAULT_DURABLE_CAPACITY: usize = 100;

/// Ordered, bounded record of the event stream.
///
/// Keeps a short live window for display and a longer durable window that is
/// written to the store on every append. Both evict from the oldest end only.
/// Persistence failures are logged and never interrupt the live window.
pub struct EventBuffer {
    store: Box<dyn EventStore>,
    live: Vec<Event>,
    durable: Vec<Event>,
    live_capacity: usize,
    durable_capacity: usize,
    next_seq: u64,
}

impl EventBuffer {
    pub fn new(store: Box<dyn EventStore>, live_capacity: usize, durable_capacity: usize) -> Self {
        Self {
            store,
            live: Vec::new(),
            durable: Vec::new(),
            live_capacity: live_capacity.max(1),
            durable_capacity: durable_capacity.max(1),
            next_seq: 0,
        }
    }

    pub fn with_default_capacity(store: Box<dyn EventStore>) -> Self {
        Self::new(store, DEFAULT_LIVE_CAPACITY, DEFAULT_DURABLE_CAPACITY)
    }

    /// Hydrate from the store. Unreadable history counts as empty.
    pub fn load(&mut self) {
        let mut events = match self.store.load() {
            Ok(events) => events,
            Err(err) => {
                monitor_warn!("Failed to load event history: {}", err);
                Vec::new()
            }
        };
        events.retain(|event| !event.is_pong());
        trim_front(&mut events, self.durable_capacity);

        self.durable = events;
        self.live = self.durable.clone();
        trim_front(&mut self.live, self.live_capacity);
        self.next_seq = self.durable.len() as u64;
        monitor_info!("Loaded {} events from history", self.durable.len());
    }

    pub fn append(&mut self, event: Event) {
        if event.is_pong() {
            return;
        }
        self.live.push(event.clone());
        trim_front(&mut self.live, self.live_capacity);
        self.durable.push(event);
        trim_front(&mut self.durable, self.durable_capacity);
        self.next_seq += 1;

        if let Err(err) = self.store.save(&self.durable) {
            monitor_error!("Failed to persist event history: {}", err);
        }
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.durable.clear();
        self.next_seq = 0;
        if let Err(err) = self.store.clear() {
            monitor_error!("Failed to erase event history: {}", err);
        }
    }

    /// Live window, oldest first.
    pub fn messages(&self) -> &[Event] {
        &self.live
    }

    /// Durable window, oldest first.
    pub fn durable(&self) -> &[Event] {
        &self.durable
    }

    /// Sequence number of the oldest live event.
    pub fn first_seq(&self) -> u64 {
        self.next_seq - self.live.len() as u64
    }

    pub fn view(&self) -> BufferView<'_> {
        BufferView::new(&self.live, self.first_seq())
    }
}

fn trim_front(events: &mut Vec<Event>, capacity: usize) {
    if events.len() > capacity {
        let excess = events.len() - capacity;
        events.drain(..excess);
    }
}
