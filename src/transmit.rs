// src/transmit.rs
//
// Outbound paths: immediate text/hex sends, fixed-interval repeat sends,
// and throttled chunked file transfer with pause/cancel semantics.
// All paths share one rule: at most one write stream is open on the
// transport at a time, enforced by the async mutex around the writer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::error::TermError;
use crate::log_store::EntryKind;
use crate::session::ConnectionState;
use crate::session::Shared;
use crate::transport::PortWriter;

// ============================================================================
// Payload Types
// ============================================================================

/// How the user's input string becomes bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    Text,
    Hex,
}

impl Default for PayloadMode {
    fn default() -> Self {
        PayloadMode::Text
    }
}

/// Line terminator appended to text-mode sends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminator {
    None,
    Lf,
    Cr,
    CrLf,
}

impl Default for Terminator {
    fn default() -> Self {
        Terminator::None
    }
}

impl Terminator {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::None => b"",
            Terminator::Lf => b"\n",
            Terminator::Cr => b"\r",
            Terminator::CrLf => b"\r\n",
        }
    }
}

/// One send request: input string plus its interpretation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendPayload {
    pub data: String,
    #[serde(default)]
    pub mode: PayloadMode,
    /// Applied in text mode only; hex payloads are sent verbatim
    #[serde(default)]
    pub terminator: Terminator,
}

impl SendPayload {
    pub fn text(data: impl Into<String>) -> Self {
        SendPayload {
            data: data.into(),
            mode: PayloadMode::Text,
            terminator: Terminator::None,
        }
    }

    pub fn hex(data: impl Into<String>) -> Self {
        SendPayload {
            data: data.into(),
            mode: PayloadMode::Hex,
            terminator: Terminator::None,
        }
    }
}

/// File transfer variant selector. YModem is accepted but carries no
/// protocol handshake; the transfer is the same raw chunked stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferProtocol {
    Raw,
    YModem,
}

impl Default for TransferProtocol {
    fn default() -> Self {
        TransferProtocol::Raw
    }
}

/// Throttling parameters for a file send
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSendOptions {
    /// Bytes per chunk
    pub chunk_size: usize,
    /// Delay inserted between chunks (none after the final chunk)
    pub inter_chunk_delay: Duration,
    #[serde(default)]
    pub protocol: TransferProtocol,
}

impl Default for FileSendOptions {
    fn default() -> Self {
        FileSendOptions {
            chunk_size: 512,
            inter_chunk_delay: Duration::from_millis(10),
            protocol: TransferProtocol::Raw,
        }
    }
}

/// Source of raw bytes for a file send
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Name used in log entries
    fn name(&self) -> String;
    /// Read the whole file into memory
    async fn read_all(&self) -> Result<Vec<u8>, TermError>;
}

/// `FileSource` backed by a path on disk
pub struct DiskFileSource {
    path: std::path::PathBuf,
}

impl DiskFileSource {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        DiskFileSource { path: path.into() }
    }
}

#[async_trait]
impl FileSource for DiskFileSource {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    async fn read_all(&self) -> Result<Vec<u8>, TermError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| TermError::File(format!("{}: {}", self.path.display(), e)))
    }
}

// ============================================================================
// Hex Parsing
// ============================================================================

/// Parse a separator-tolerant hex string into bytes.
/// Accepts whitespace, commas, colons and dashes between bytes and an
/// optional `0x` prefix per token. Fails on odd digit count or non-hex
/// characters after stripping separators.
pub fn parse_hex_payload(input: &str) -> Result<Vec<u8>, TermError> {
    let mut cleaned = String::with_capacity(input.len());
    for token in input.split(|c: char| c.is_whitespace() || c == ',' || c == ':' || c == '-') {
        let t = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        cleaned.push_str(t);
    }

    if cleaned.is_empty() {
        return Err(TermError::InvalidHexFormat("no hex digits".to_string()));
    }
    if cleaned.len() % 2 != 0 {
        return Err(TermError::InvalidHexFormat(format!(
            "odd number of hex digits ({})",
            cleaned.len()
        )));
    }
    hex::decode(&cleaned).map_err(|e| TermError::InvalidHexFormat(e.to_string()))
}

/// Encode a payload to wire bytes. Terminator applies to text mode only.
pub fn encode_payload(payload: &SendPayload) -> Result<Vec<u8>, TermError> {
    match payload.mode {
        PayloadMode::Text => {
            let mut bytes = payload.data.clone().into_bytes();
            bytes.extend_from_slice(payload.terminator.as_bytes());
            Ok(bytes)
        }
        PayloadMode::Hex => parse_hex_payload(&payload.data),
    }
}

/// Uppercase hex with spaces, for display of binary payloads
fn display_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02X}", b));
    }
    out
}

// ============================================================================
// Transmitter
// ============================================================================

struct RepeatHandle {
    cancel: Arc<AtomicBool>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

/// Bookkeeping for one in-flight file transfer. Lives for the duration of a
/// single `send_file` call; never persisted.
struct TransferSession {
    total_bytes: usize,
    sent_bytes: usize,
    aborted: bool,
    /// Set externally (disconnect) to abort at the next chunk boundary
    abort: Arc<AtomicBool>,
}

impl TransferSession {
    fn new(total_bytes: usize, abort: Arc<AtomicBool>) -> Self {
        TransferSession {
            total_bytes,
            sent_bytes: 0,
            aborted: false,
            abort,
        }
    }

    fn progress(&self) -> u8 {
        ((self.sent_bytes as f64 / self.total_bytes as f64) * 100.0).round() as u8
    }
}

/// Send paths for one open connection. Clones share the same write handle,
/// so overlapping sends serialize on acquisition by construction.
#[derive(Clone)]
pub struct Transmitter {
    shared: Arc<Shared>,
    writer: Arc<AsyncMutex<Box<dyn PortWriter>>>,
    repeat: Arc<Mutex<Option<RepeatHandle>>>,
    /// Abort flag of the in-flight file transfer, if any
    transfer_abort: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl Transmitter {
    pub(crate) fn new(shared: Arc<Shared>, writer: Arc<AsyncMutex<Box<dyn PortWriter>>>) -> Self {
        Transmitter {
            shared,
            writer,
            repeat: Arc::new(Mutex::new(None)),
            transfer_abort: Arc::new(Mutex::new(None)),
        }
    }

    /// Refuse to operate unless the connection is Connected.
    /// The refusal is both logged and returned.
    fn gate(&self) -> Result<(), TermError> {
        match self.shared.connection_state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::ConnectedPaused => {
                let err = TermError::PausedRejection;
                self.shared
                    .append(EntryKind::Error, Vec::new(), err.to_string());
                Err(err)
            }
            ConnectionState::Disconnected => {
                let err = TermError::NotConnected;
                self.shared
                    .append(EntryKind::Error, Vec::new(), err.to_string());
                Err(err)
            }
        }
    }

    /// Encode and write a payload once, logging a Transmit entry.
    pub async fn send(&self, payload: &SendPayload) -> Result<(), TermError> {
        self.gate()?;
        Self::send_inner(&self.shared, &self.writer, payload).await
    }

    async fn send_inner(
        shared: &Arc<Shared>,
        writer: &Arc<AsyncMutex<Box<dyn PortWriter>>>,
        payload: &SendPayload,
    ) -> Result<(), TermError> {
        let bytes = match encode_payload(payload) {
            Ok(b) => b,
            Err(e) => {
                tlog!("[transmit] {}", e);
                shared.append(EntryKind::Error, Vec::new(), e.to_string());
                return Err(e);
            }
        };
        if bytes.is_empty() {
            return Ok(());
        }

        {
            // Single outstanding write stream; released on every exit path
            let mut w = writer.lock().await;
            if let Err(e) = w.write_all(&bytes).await {
                tlog!("[transmit] {}", e);
                shared.append(EntryKind::Error, Vec::new(), e.to_string());
                return Err(e);
            }
        }

        let text = match payload.mode {
            PayloadMode::Text => String::from_utf8_lossy(&bytes).to_string(),
            PayloadMode::Hex => display_hex(&bytes),
        };
        shared.append(EntryKind::Transmit, bytes, text);
        Ok(())
    }

    /// Re-send `payload` every `interval` while the connection stays open
    /// and unpaused. The first send happens immediately; any prior repeat
    /// for this transmitter is stopped first.
    pub fn start_repeat(&self, payload: SendPayload, interval: Duration) -> Result<(), TermError> {
        // Sub-millisecond intervals would spin; clamp to 1ms
        let interval = interval.max(Duration::from_millis(1));
        self.gate()?;
        // Validate the payload up front so a bad hex string fails here,
        // not on every tick
        let encoded = encode_payload(&payload).map_err(|e| {
            self.shared
                .append(EntryKind::Error, Vec::new(), e.to_string());
            e
        })?;
        if encoded.is_empty() {
            return Ok(());
        }

        self.stop_repeat();

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_clone = cancel.clone();
        let shared = self.shared.clone();
        let writer = self.writer.clone();

        let handle = tokio::spawn(async move {
            // First send before starting the interval timer so startup
            // delays don't affect the regular interval timing
            if cancel_clone.load(Ordering::Relaxed) {
                return;
            }
            if Self::repeat_should_stop(&shared) {
                return;
            }
            let _ = Self::send_inner(&shared, &writer, &payload).await;

            let mut interval_timer = tokio::time::interval(interval);
            // Skip the first tick which fires immediately
            interval_timer.tick().await;

            loop {
                interval_timer.tick().await;
                if cancel_clone.load(Ordering::Relaxed) {
                    break;
                }
                if Self::repeat_should_stop(&shared) {
                    tlog!("[transmit] Repeat stopped: connection closed or paused");
                    break;
                }
                let _ = Self::send_inner(&shared, &writer, &payload).await;
            }
        });

        if let Ok(mut guard) = self.repeat.lock() {
            *guard = Some(RepeatHandle { cancel, handle });
        }
        Ok(())
    }

    fn repeat_should_stop(shared: &Arc<Shared>) -> bool {
        shared.connection_state() != ConnectionState::Connected
    }

    /// Stop the repeat task, if any. The task sees the flag at its next tick.
    pub fn stop_repeat(&self) {
        if let Ok(mut guard) = self.repeat.lock() {
            if let Some(task) = guard.take() {
                task.cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Flag the in-flight file transfer (if any) to abort at its next
    /// chunk boundary. Called on disconnect.
    pub(crate) fn signal_transfer_abort(&self) {
        if let Ok(guard) = self.transfer_abort.lock() {
            if let Some(flag) = guard.as_ref() {
                flag.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Send a whole file in throttled chunks. Progress (0–100) is reported
    /// after each chunk. Pausing or disconnecting aborts at the next chunk
    /// boundary; the remaining bytes are never sent.
    pub async fn send_file<F>(
        &self,
        source: &dyn FileSource,
        opts: &FileSendOptions,
        mut on_progress: F,
    ) -> Result<(), TermError>
    where
        F: FnMut(u8) + Send,
    {
        self.gate()?;

        let data = match source.read_all().await {
            Ok(d) => d,
            Err(e) => {
                tlog!("[transmit] {}", e);
                self.shared
                    .append(EntryKind::Error, Vec::new(), e.to_string());
                return Err(e);
            }
        };
        if data.is_empty() {
            return Ok(());
        }
        let chunk_size = opts.chunk_size.max(1);
        let total = data.len();
        let name = source.name();

        if opts.protocol == TransferProtocol::YModem {
            // Selector only - no handshake is implemented
            self.shared.append(
                EntryKind::System,
                Vec::new(),
                "YModem selected: no protocol handshake, sending raw chunks".to_string(),
            );
        }
        tlog!(
            "[transmit] Sending '{}' ({} bytes, {} per chunk, {:?} between chunks)",
            name,
            total,
            chunk_size,
            opts.inter_chunk_delay
        );

        let abort = Arc::new(AtomicBool::new(false));
        if let Ok(mut guard) = self.transfer_abort.lock() {
            *guard = Some(abort.clone());
        }
        let mut xfer = TransferSession::new(total, abort);

        // Hold the write handle for the whole transfer: no other send can
        // interleave, and the guard releases it on every exit path
        let mut w = self.writer.lock().await;
        let mut result = Ok(());

        for chunk in data.chunks(chunk_size) {
            if xfer.sent_bytes > 0 && !opts.inter_chunk_delay.is_zero() {
                tokio::time::sleep(opts.inter_chunk_delay).await;
            }

            // Pause/cancel are consulted immediately before each write, so a
            // pause engaged during the delay stops the transfer here
            if xfer.abort.load(Ordering::Relaxed)
                || self.shared.connection_state() != ConnectionState::Connected
            {
                xfer.aborted = true;
                tlog!(
                    "[transmit] File send aborted at {} of {} bytes",
                    xfer.sent_bytes,
                    xfer.total_bytes
                );
                self.shared.append(
                    EntryKind::System,
                    Vec::new(),
                    format!(
                        "File send aborted: '{}' ({} of {} bytes sent)",
                        name, xfer.sent_bytes, xfer.total_bytes
                    ),
                );
                result = Err(
                    if self.shared.connection_state() == ConnectionState::ConnectedPaused {
                        TermError::PausedRejection
                    } else {
                        TermError::NotConnected
                    },
                );
                break;
            }

            if let Err(e) = w.write_all(chunk).await {
                xfer.aborted = true;
                tlog!("[transmit] {}", e);
                self.shared.append(
                    EntryKind::Error,
                    Vec::new(),
                    format!("File send failed: {}", e),
                );
                result = Err(e);
                break;
            }

            xfer.sent_bytes += chunk.len();
            on_progress(xfer.progress());
        }
        drop(w);

        if let Ok(mut guard) = self.transfer_abort.lock() {
            *guard = None;
        }

        if !xfer.aborted {
            tlog!("[transmit] File send complete: '{}' ({} bytes)", name, total);
            self.shared.append(
                EntryKind::Transmit,
                data,
                format!("Sent file '{}' ({} bytes)", name, total),
            );
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_tolerates_separators() {
        assert_eq!(parse_hex_payload("DE AD BE EF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(parse_hex_payload("de:ad,be-ef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(parse_hex_payload("0xDE 0xAD").unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(parse_hex_payload("deadbeef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_parse_hex_rejects_odd_length() {
        assert!(matches!(
            parse_hex_payload("FF 1"),
            Err(TermError::InvalidHexFormat(_))
        ));
    }

    #[test]
    fn test_parse_hex_rejects_non_hex() {
        assert!(matches!(
            parse_hex_payload("FF GG"),
            Err(TermError::InvalidHexFormat(_))
        ));
    }

    #[test]
    fn test_parse_hex_rejects_empty() {
        assert!(matches!(
            parse_hex_payload("   "),
            Err(TermError::InvalidHexFormat(_))
        ));
    }

    #[test]
    fn test_encode_text_with_terminator() {
        let payload = SendPayload {
            data: "AT".to_string(),
            mode: PayloadMode::Text,
            terminator: Terminator::CrLf,
        };
        assert_eq!(encode_payload(&payload).unwrap(), b"AT\r\n");
    }

    #[test]
    fn test_encode_hex_ignores_terminator() {
        let payload = SendPayload {
            data: "FF0A".to_string(),
            mode: PayloadMode::Hex,
            terminator: Terminator::CrLf,
        };
        assert_eq!(encode_payload(&payload).unwrap(), vec![0xFF, 0x0A]);
    }

    #[test]
    fn test_display_hex() {
        assert_eq!(display_hex(&[0xFF, 0x0A, 0x00]), "FF 0A 00");
        assert_eq!(display_hex(&[]), "");
    }
}
