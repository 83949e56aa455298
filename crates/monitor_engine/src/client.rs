use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use monitor_core::{
    update, BackoffPolicy, ConnEffect, ConnMsg, Connection, ConnectionState, Event, Generation,
    ProcessStatus, Reconciliation, VisibilityReconciler,
};
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::{
    wait_until_ready, ClientSettings, EventBuffer, EventStore, FileEventStore, HealthProbe,
    MemoryEventStore, ReqwestHealthProbe, SetupError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read-only view handed to consumers after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub messages: Vec<Event>,
    pub connection_state: ConnectionState,
    pub status: ProcessStatus,
    /// Sequence number one past the newest message; restarts at zero on clear.
    pub end_seq: u64,
    /// Number of times the history was cleared since start.
    pub clear_count: u64,
}

enum Command {
    Send(String),
    Reconnect,
    Clear,
    SetVisible(bool),
    Shutdown,
}

enum Input {
    Conn(ConnMsg),
    SocketOpened {
        generation: Generation,
        stream: Box<WsStream>,
    },
}

/// Client-facing handle to the status monitor.
///
/// The driver task owns the socket, the buffer and the derived status;
/// callers only see snapshots. Dropping the handle tears the client down.
pub struct MonitorHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<MonitorSnapshot>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Start the client on the current tokio runtime.
    pub fn start(
        settings: &ClientSettings,
        store: Box<dyn EventStore>,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<Self, SetupError> {
        let socket_url = settings.socket_url()?;

        let mut buffer =
            EventBuffer::new(store, settings.live_capacity, settings.durable_capacity);
        buffer.load();
        let mut reconciler = VisibilityReconciler::new(settings.rebuild_debounce());
        reconciler.rebuild(buffer.view(), 0);

        let (snapshot_tx, snapshot_rx) = watch::channel(MonitorSnapshot {
            messages: buffer.messages().to_vec(),
            connection_state: ConnectionState::Disconnected,
            status: reconciler.status().clone(),
            end_seq: buffer.view().end_seq(),
            clear_count: 0,
        });
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            conn: Connection::new(settings.connection_config()),
            buffer,
            reconciler,
            probe,
            probe_policy: settings.probe_policy(),
            probe_attempts: settings.probe_attempts,
            probe_timeout: settings.probe_timeout(),
            socket_url,
            input_tx,
            snapshot_tx,
            sink: None,
            tasks: Tasks::default(),
            started: Instant::now(),
            clear_count: 0,
        };
        let task = tokio::spawn(driver.run(cmd_rx, input_rx));

        Ok(Self {
            cmd_tx,
            snapshot_rx,
            task,
        })
    }

    /// Start with the store and probe described by `settings`.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, SetupError> {
        let store: Box<dyn EventStore> = match &settings.history_path {
            Some(path) => Box::new(FileEventStore::new(path.clone())),
            None => Box::new(MemoryEventStore::new()),
        };
        let probe = ReqwestHealthProbe::new(settings.health_url()?, settings.probe_timeout())?;
        Self::start(settings, store, Arc::new(probe))
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Event> {
        self.snapshot_rx.borrow().messages.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot_rx.borrow().connection_state
    }

    pub fn status(&self) -> ProcessStatus {
        self.snapshot_rx.borrow().status.clone()
    }

    /// Receiver that is notified whenever the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Send a JSON payload; dropped with a warning unless connected.
    pub fn send<T: Serialize>(&self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(text) => self.command(Command::Send(text)),
            Err(err) => monitor_warn!("Failed to serialize outgoing payload: {}", err),
        }
    }

    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    pub fn clear_messages(&self) {
        self.command(Command::Clear);
    }

    /// Report whether the viewer is currently looking at the status.
    pub fn set_visible(&self, visible: bool) {
        self.command(Command::SetVisible(visible));
    }

    /// Close the connection, cancel timers and wait for the driver to stop.
    pub async fn shutdown(self) {
        self.command(Command::Shutdown);
        if let Err(err) = self.task.await {
            monitor_warn!("Monitor driver ended abnormally: {}", err);
        }
    }

    fn command(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            monitor_debug!("Monitor driver already stopped");
        }
    }
}

#[derive(Default)]
struct Tasks {
    probe: Option<JoinHandle<()>>,
    open: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for slot in [
            &mut self.probe,
            &mut self.open,
            &mut self.reader,
            &mut self.heartbeat,
            &mut self.reconnect,
        ] {
            replace_task(slot, None);
        }
    }
}

fn replace_task(slot: &mut Option<JoinHandle<()>>, next: Option<JoinHandle<()>>) {
    if let Some(previous) = slot.take() {
        previous.abort();
    }
    *slot = next;
}

struct Driver {
    conn: Connection,
    buffer: EventBuffer,
    reconciler: VisibilityReconciler,
    probe: Arc<dyn HealthProbe>,
    probe_policy: BackoffPolicy,
    probe_attempts: u32,
    probe_timeout: Duration,
    socket_url: Url,
    input_tx: mpsc::UnboundedSender<Input>,
    snapshot_tx: watch::Sender<MonitorSnapshot>,
    sink: Option<SplitSink<WsStream, Message>>,
    tasks: Tasks,
    started: Instant,
    clear_count: u64,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inputs: mpsc::UnboundedReceiver<Input>,
    ) {
        monitor_info!("Monitor client starting, socket {}", self.socket_url);
        self.dispatch(ConnMsg::Connect).await;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(input) = inputs.recv() => self.handle_input(input).await,
            }
        }
        self.dispatch(ConnMsg::Teardown).await;
        self.tasks.abort_all();
        monitor_info!("Monitor client stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(text) => self.dispatch(ConnMsg::Send(text)).await,
            Command::Reconnect => {
                monitor_info!("Manual reconnect requested");
                self.dispatch(ConnMsg::ManualReconnect).await;
            }
            Command::Clear => {
                self.buffer.clear();
                self.clear_count += 1;
                self.reconciler.reset();
                self.publish();
            }
            Command::SetVisible(visible) => {
                let now = self.now_ms();
                let outcome = self
                    .reconciler
                    .set_visible(visible, self.buffer.view(), now);
                log_reconciliation(outcome);
                self.dispatch(ConnMsg::VisibilityChanged(visible)).await;
                self.publish();
            }
            Command::Shutdown => {}
        }
    }

    async fn handle_input(&mut self, input: Input) {
        match input {
            Input::Conn(msg) => self.dispatch(msg).await,
            Input::SocketOpened { generation, stream } => {
                if generation != self.conn.generation()
                    || self.conn.state() != ConnectionState::Connecting
                {
                    monitor_debug!("Discarding socket from superseded attempt {}", generation);
                    return;
                }
                let (sink, reader) = (*stream).split();
                self.sink = Some(sink);
                let reader = spawn_reader(self.input_tx.clone(), generation, reader);
                replace_task(&mut self.tasks.reader, Some(reader));
                self.dispatch(ConnMsg::Opened { generation }).await;
            }
        }
    }

    async fn dispatch(&mut self, msg: ConnMsg) {
        let (conn, effects) = update(std::mem::take(&mut self.conn), msg);
        self.conn = conn;
        for effect in effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&mut self, effect: ConnEffect) {
        match effect {
            ConnEffect::StateChanged(state) => {
                monitor_info!("Connection {}", state);
                self.publish();
            }
            ConnEffect::Probe { generation } => {
                // Anything left from the previous attempt is superseded.
                replace_task(&mut self.tasks.open, None);
                replace_task(&mut self.tasks.reader, None);
                self.sink = None;

                let probe = Arc::clone(&self.probe);
                let (policy, attempts, timeout) =
                    (self.probe_policy, self.probe_attempts, self.probe_timeout);
                let tx = self.input_tx.clone();
                let task = tokio::spawn(async move {
                    let ready = wait_until_ready(probe.as_ref(), policy, attempts, timeout).await;
                    let _ = tx.send(Input::Conn(ConnMsg::ProbeFinished { generation, ready }));
                });
                replace_task(&mut self.tasks.probe, Some(task));
            }
            ConnEffect::OpenSocket { generation } => {
                let url = self.socket_url.to_string();
                let tx = self.input_tx.clone();
                let task = tokio::spawn(async move {
                    let input = match tokio_tungstenite::connect_async(url.as_str()).await {
                        Ok((stream, _response)) => Input::SocketOpened {
                            generation,
                            stream: Box::new(stream),
                        },
                        Err(err) => Input::Conn(ConnMsg::Failed {
                            generation,
                            reason: err.to_string(),
                        }),
                    };
                    let _ = tx.send(input);
                });
                replace_task(&mut self.tasks.open, Some(task));
            }
            ConnEffect::CloseSocket { code } => self.close_socket(code).await,
            ConnEffect::StartHeartbeat {
                generation,
                interval,
            } => {
                let tx = self.input_tx.clone();
                let task = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                    loop {
                        ticker.tick().await;
                        if tx
                            .send(Input::Conn(ConnMsg::HeartbeatTick { generation }))
                            .is_err()
                        {
                            break;
                        }
                    }
                });
                replace_task(&mut self.tasks.heartbeat, Some(task));
            }
            ConnEffect::StopHeartbeat => replace_task(&mut self.tasks.heartbeat, None),
            ConnEffect::ScheduleReconnect { generation, delay } => {
                monitor_info!(
                    "Reconnecting in {:?} (attempt {})",
                    delay,
                    self.conn.attempt()
                );
                let tx = self.input_tx.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Input::Conn(ConnMsg::ReconnectDue { generation }));
                });
                replace_task(&mut self.tasks.reconnect, Some(task));
            }
            ConnEffect::CancelReconnect => replace_task(&mut self.tasks.reconnect, None),
            ConnEffect::Transmit(text) => self.transmit(text).await,
            ConnEffect::Deliver(event) => {
                monitor_debug!("Received {} event", event.kind());
                self.buffer.append(event);
                let now = self.now_ms();
                let outcome = self.reconciler.on_appended(self.buffer.view(), now);
                log_reconciliation(outcome);
                self.publish();
            }
            ConnEffect::FrameDropped(err) => monitor_warn!("Dropped frame: {}", err),
            ConnEffect::SendDropped(payload) => monitor_warn!(
                "Not connected ({}); dropped outgoing frame of {} bytes",
                self.conn.state(),
                payload.len()
            ),
        }
    }

    async fn transmit(&mut self, text: String) {
        match self.sink.as_mut() {
            Some(sink) => {
                if let Err(err) = sink.send(Message::Text(text.into())).await {
                    monitor_warn!("Failed to send frame: {}", err);
                }
            }
            None => monitor_warn!("No open socket; dropped outgoing frame"),
        }
    }

    async fn close_socket(&mut self, code: u16) {
        replace_task(&mut self.tasks.open, None);
        replace_task(&mut self.tasks.reader, None);
        if let Some(mut sink) = self.sink.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            };
            if let Err(err) = sink.send(Message::Close(Some(frame))).await {
                monitor_debug!("Close frame not delivered: {}", err);
            }
        }
    }

    fn publish(&self) {
        let snapshot = MonitorSnapshot {
            messages: self.buffer.messages().to_vec(),
            connection_state: self.conn.state(),
            status: self.reconciler.status().clone(),
            end_seq: self.buffer.view().end_seq(),
            clear_count: self.clear_count,
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

fn spawn_reader(
    tx: mpsc::UnboundedSender<Input>,
    generation: Generation,
    mut reader: SplitStream<WsStream>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = reader.next().await {
            let msg = match message {
                Ok(Message::Text(text)) => ConnMsg::FrameReceived {
                    generation,
                    text: text.as_str().to_owned(),
                },
                Ok(Message::Close(frame)) => {
                    let code = frame.map(|frame| u16::from(frame.code));
                    let _ = tx.send(Input::Conn(ConnMsg::Closed { generation, code }));
                    return;
                }
                // Protocol-level ping/pong is answered by tungstenite itself.
                Ok(_) => continue,
                Err(err) => {
                    let _ = tx.send(Input::Conn(ConnMsg::Failed {
                        generation,
                        reason: err.to_string(),
                    }));
                    return;
                }
            };
            if tx.send(Input::Conn(msg)).is_err() {
                return;
            }
        }
        let _ = tx.send(Input::Conn(ConnMsg::Closed {
            generation,
            code: None,
        }));
    })
}

fn log_reconciliation(outcome: Reconciliation) {
    match outcome {
        Reconciliation::Rebuilt { events } => {
            monitor_debug!("Rebuilt status from {} buffered events", events)
        }
        Reconciliation::Incremental { applied } if applied > 1 => {
            monitor_debug!("Caught up on {} deferred events", applied)
        }
        Reconciliation::Incremental { .. } | Reconciliation::Unchanged => {}
    }
}
