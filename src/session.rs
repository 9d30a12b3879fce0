// src/session.rs
//
// Terminal session lifecycle: connect, pause/resume, disconnect.
// Owns the log store, the frequency meter, the read loop, and the
// transmitter for one connection at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::decoder::Utf8StreamDecoder;
use crate::error::TermError;
use crate::log_store::{EntryKind, LogEntry, LogStore};
use crate::meter::FrequencyMeter;
use crate::read_loop::{ReadLoop, ReadLoopState};
use crate::transmit::Transmitter;
use crate::transport::{PortConfig, PortTransport};

// ============================================================================
// Types
// ============================================================================

/// Connection lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    ConnectedPaused,
}

/// Presentation sink. Called with the current authoritative scrollback and
/// the lines/sec gauge on every relevant state change; must not block.
pub trait Renderer: Send + Sync {
    fn render(&self, entries: &[LogEntry], lines_per_sec: usize);
}

/// State shared between the session, the read loop, and send tasks.
/// Pause/cancel are consulted live at chunk boundaries, never snapshotted.
pub(crate) struct Shared {
    pub(crate) store: Mutex<LogStore>,
    pub(crate) meter: FrequencyMeter,
    pub(crate) connected: AtomicBool,
    pub(crate) paused: AtomicBool,
    renderer: Arc<dyn Renderer>,
}

impl Shared {
    fn new(renderer: Arc<dyn Renderer>) -> Self {
        Shared {
            store: Mutex::new(LogStore::new()),
            meter: FrequencyMeter::new(),
            connected: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            renderer,
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        if !self.connected.load(Ordering::Relaxed) {
            ConnectionState::Disconnected
        } else if self.paused.load(Ordering::Relaxed) {
            ConnectionState::ConnectedPaused
        } else {
            ConnectionState::Connected
        }
    }

    /// Append an entry and notify observers. Receive appends also feed the
    /// frequency meter.
    pub(crate) fn append(&self, kind: EntryKind, raw: Vec<u8>, text: String) {
        if kind == EntryKind::Receive {
            self.meter.record_text(&text);
        }
        if let Ok(mut store) = self.store.lock() {
            store.append(kind, raw, text);
        }
        self.notify_render();
    }

    /// Push the current scrollback and gauge to the renderer.
    pub(crate) fn notify_render(&self) {
        let snapshot = match self.store.lock() {
            Ok(store) => store.snapshot(),
            Err(_) => return,
        };
        self.renderer.render(&snapshot, self.meter.lines_per_sec());
    }
}

// ============================================================================
// Terminal Session
// ============================================================================

/// One interactive terminal over one port at a time.
pub struct TerminalSession {
    shared: Arc<Shared>,
    transport: Arc<dyn PortTransport>,
    read_loop: Option<ReadLoop>,
    meter_task: Option<JoinHandle<()>>,
    transmitter: Option<Transmitter>,
}

impl TerminalSession {
    pub fn new(transport: Arc<dyn PortTransport>, renderer: Arc<dyn Renderer>) -> Self {
        TerminalSession {
            shared: Arc::new(Shared::new(renderer)),
            transport,
            read_loop: None,
            meter_task: None,
            transmitter: None,
        }
    }

    /// Open the port and start streaming. Any prior connection is fully
    /// stopped first; the decoder is always fresh for a new connection.
    pub async fn connect(&mut self, config: &PortConfig) -> Result<(), TermError> {
        self.disconnect().await;

        let (reader, writer) = match self.transport.open(config).await {
            Ok(pair) => pair,
            Err(e) => {
                tlog!("[session] {}", e);
                return Err(e);
            }
        };

        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.connected.store(true, Ordering::Relaxed);
        self.shared.meter.reset();
        self.shared.append(
            EntryKind::System,
            Vec::new(),
            format!("Connected to {} at {} baud", config.port, config.baud_rate),
        );

        self.transmitter = Some(Transmitter::new(
            self.shared.clone(),
            Arc::new(AsyncMutex::new(writer)),
        ));
        self.read_loop = Some(ReadLoop::spawn(
            reader,
            self.shared.clone(),
            Utf8StreamDecoder::new(),
        ));
        self.meter_task = Some(spawn_meter_task(self.shared.clone()));

        Ok(())
    }

    /// Close the connection. Cancels the outstanding inbound read
    /// immediately and flags any file transfer to abort at its next chunk
    /// boundary.
    pub async fn disconnect(&mut self) {
        let was_connected = self.shared.connected.swap(false, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);

        if let Some(tx) = self.transmitter.take() {
            tx.stop_repeat();
            tx.signal_transfer_abort();
        }
        if let Some(rl) = self.read_loop.take() {
            rl.stop().await;
        }
        if let Some(handle) = self.meter_task.take() {
            handle.abort();
        }
        self.shared.meter.reset();

        if was_connected {
            tlog!("[session] Disconnected");
            self.shared
                .append(EntryKind::System, Vec::new(), "Disconnected".to_string());
        }
    }

    /// Pause: inbound chunks are discarded (not buffered) and sends are
    /// rejected until resume.
    pub fn pause(&self) {
        if self.shared.connection_state() == ConnectionState::Connected {
            self.shared.paused.store(true, Ordering::Relaxed);
            tlog!("[session] Paused");
        }
    }

    pub fn resume(&self) {
        if self.shared.connection_state() == ConnectionState::ConnectedPaused {
            self.shared.paused.store(false, Ordering::Relaxed);
            tlog!("[session] Resumed");
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// Lifecycle state of the inbound pump. Idle when no loop exists.
    pub fn read_loop_state(&self) -> ReadLoopState {
        self.read_loop
            .as_ref()
            .map(|rl| rl.state())
            .unwrap_or(ReadLoopState::Idle)
    }

    /// The transmitter for the current connection, if any. Clones share the
    /// same write handle, so sends stay serialized.
    pub fn transmitter(&self) -> Option<Transmitter> {
        self.transmitter.clone()
    }

    /// Current scrollback snapshot (for export and stats).
    pub fn log_snapshot(&self) -> Vec<LogEntry> {
        self.shared
            .store
            .lock()
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    /// Byte totals over the current scrollback: (received, transmitted).
    pub fn byte_totals(&self) -> (usize, usize) {
        self.shared
            .store
            .lock()
            .map(|s| s.byte_totals())
            .unwrap_or((0, 0))
    }

    pub fn lines_per_sec(&self) -> usize {
        self.shared.meter.lines_per_sec()
    }

    /// Toggle "forced per-packet line break" framing for inbound data.
    pub fn set_force_line_break(&self, on: bool) {
        if let Ok(mut store) = self.shared.store.lock() {
            store.set_force_line_break(on);
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        // Tasks poll the connected flag and wind down on their own
        self.shared.connected.store(false, Ordering::Relaxed);
        if let Some(tx) = self.transmitter.take() {
            tx.stop_repeat();
            tx.signal_transfer_abort();
        }
        if let Some(handle) = self.meter_task.take() {
            handle.abort();
        }
    }
}

/// Wall-clock-anchored 1 s tick that publishes the lines/sec gauge.
/// Delayed ticks do not burst to catch up.
fn spawn_meter_task(shared: Arc<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first tick which fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if !shared.connected.load(Ordering::Relaxed) {
                break;
            }
            shared.meter.tick();
            shared.notify_render();
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
