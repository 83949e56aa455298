//! Connection lifecycle as a pure state machine.
//!
//! The engine feeds socket, timer and user inputs in as [`ConnMsg`] and
//! executes the returned [`ConnEffect`]s. Every connect attempt gets a new
//! generation; inputs tagged with an older generation are ignored, which is
//! what keeps superseded timers and sockets from acting.
use std::fmt;
use std::time::Duration;

use crate::{BackoffPolicy, Event, FrameError};

/// Close code for an intentional shutdown.
pub const NORMAL_CLOSE: u16 = 1000;

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    fn is_down(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub reconnect: BackoffPolicy,
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect: BackoffPolicy::reconnect(),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnMsg {
    /// Start connecting unless already connecting or connected.
    Connect,
    ProbeFinished { generation: Generation, ready: bool },
    Opened { generation: Generation },
    FrameReceived { generation: Generation, text: String },
    Closed { generation: Generation, code: Option<u16> },
    Failed { generation: Generation, reason: String },
    HeartbeatTick { generation: Generation },
    ReconnectDue { generation: Generation },
    VisibilityChanged(bool),
    /// User-requested reconnect; bypasses backoff.
    ManualReconnect,
    Send(String),
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnEffect {
    StateChanged(ConnectionState),
    /// Run the readiness probe, then report `ProbeFinished`.
    Probe { generation: Generation },
    OpenSocket { generation: Generation },
    CloseSocket { code: u16 },
    StartHeartbeat { generation: Generation, interval: Duration },
    StopHeartbeat,
    ScheduleReconnect { generation: Generation, delay: Duration },
    CancelReconnect,
    Transmit(String),
    /// Append to the event buffer.
    Deliver(Event),
    FrameDropped(FrameError),
    SendDropped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    config: ConnectionConfig,
    state: ConnectionState,
    attempt: u32,
    generation: Generation,
    visible: bool,
    reconnect_pending: bool,
    active: bool,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            attempt: 0,
            generation: 0,
            visible: true,
            reconnect_pending: false,
            active: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    fn set_state(&mut self, next: ConnectionState, effects: &mut Vec<ConnEffect>) {
        if self.state != next {
            self.state = next;
            effects.push(ConnEffect::StateChanged(next));
        }
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.active && generation == self.generation
    }

    fn cancel_reconnect(&mut self, effects: &mut Vec<ConnEffect>) {
        self.reconnect_pending = false;
        effects.push(ConnEffect::CancelReconnect);
    }

    fn begin_connect(&mut self, effects: &mut Vec<ConnEffect>) {
        self.active = true;
        self.cancel_reconnect(effects);
        effects.push(ConnEffect::StopHeartbeat);
        self.generation += 1;
        self.set_state(ConnectionState::Connecting, effects);
        effects.push(ConnEffect::Probe {
            generation: self.generation,
        });
    }

    fn schedule_reconnect(&mut self, effects: &mut Vec<ConnEffect>) {
        if !self.visible || self.reconnect_pending {
            return;
        }
        self.attempt = self.attempt.saturating_add(1);
        self.reconnect_pending = true;
        effects.push(ConnEffect::ScheduleReconnect {
            generation: self.generation,
            delay: self.config.reconnect.delay(self.attempt),
        });
    }

    fn lose_connection(
        &mut self,
        next: ConnectionState,
        abnormal: bool,
        effects: &mut Vec<ConnEffect>,
    ) {
        effects.push(ConnEffect::StopHeartbeat);
        self.set_state(next, effects);
        if abnormal {
            self.schedule_reconnect(effects);
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

/// Pure update function: applies a lifecycle input and returns the effects to run.
pub fn update(mut conn: Connection, msg: ConnMsg) -> (Connection, Vec<ConnEffect>) {
    let mut effects = Vec::new();
    match msg {
        ConnMsg::Connect => {
            if conn.state.is_down() {
                conn.begin_connect(&mut effects);
            }
        }
        ConnMsg::ProbeFinished { generation, .. } => {
            // Opening proceeds whether or not the backend reported ready.
            if conn.is_current(generation) && conn.state == ConnectionState::Connecting {
                effects.push(ConnEffect::OpenSocket { generation });
            }
        }
        ConnMsg::Opened { generation } => {
            if conn.is_current(generation) {
                conn.attempt = 0;
                conn.set_state(ConnectionState::Connected, &mut effects);
                effects.push(ConnEffect::StartHeartbeat {
                    generation,
                    interval: conn.config.heartbeat_interval,
                });
            }
        }
        ConnMsg::FrameReceived { generation, text } => {
            if conn.is_current(generation) {
                match Event::parse_frame(&text) {
                    Ok(Event::Pong) => {}
                    Ok(event) => effects.push(ConnEffect::Deliver(event)),
                    Err(err) => effects.push(ConnEffect::FrameDropped(err)),
                }
            }
        }
        ConnMsg::Closed { generation, code } => {
            if conn.is_current(generation) {
                let abnormal = code != Some(NORMAL_CLOSE);
                conn.lose_connection(ConnectionState::Disconnected, abnormal, &mut effects);
            }
        }
        ConnMsg::Failed { generation, .. } => {
            if conn.is_current(generation) {
                conn.lose_connection(ConnectionState::Error, true, &mut effects);
            }
        }
        ConnMsg::HeartbeatTick { generation } => {
            if conn.is_current(generation) && conn.state.is_connected() && conn.visible {
                effects.push(ConnEffect::Transmit(Event::ping_frame()));
            }
        }
        ConnMsg::ReconnectDue { generation } => {
            if conn.is_current(generation) && conn.reconnect_pending {
                conn.reconnect_pending = false;
                // Hidden viewers wait for the next visibility change instead.
                if conn.visible && conn.state.is_down() {
                    conn.begin_connect(&mut effects);
                }
            }
        }
        ConnMsg::VisibilityChanged(visible) => {
            let was_visible = std::mem::replace(&mut conn.visible, visible);
            // Only a hidden to visible transition may reconnect.
            if visible
                && !was_visible
                && conn.active
                && conn.state.is_down()
                && !conn.reconnect_pending
            {
                conn.begin_connect(&mut effects);
            }
        }
        ConnMsg::ManualReconnect => {
            conn.attempt = 0;
            effects.push(ConnEffect::CloseSocket { code: NORMAL_CLOSE });
            conn.begin_connect(&mut effects);
        }
        ConnMsg::Send(payload) => {
            if conn.state.is_connected() {
                effects.push(ConnEffect::Transmit(payload));
            } else {
                effects.push(ConnEffect::SendDropped(payload));
            }
        }
        ConnMsg::Teardown => {
            conn.active = false;
            conn.cancel_reconnect(&mut effects);
            effects.push(ConnEffect::StopHeartbeat);
            effects.push(ConnEffect::CloseSocket { code: NORMAL_CLOSE });
            conn.generation += 1;
            conn.set_state(ConnectionState::Disconnected, &mut effects);
        }
    }
    (conn, effects)
}
