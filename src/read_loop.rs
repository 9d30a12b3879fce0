// src/read_loop.rs
//
// Inbound pump: pulls chunks from the port reader, decodes them, and
// appends Receive entries. The only reader of the inbound stream; torn
// down on disconnect by cancelling the outstanding pull.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::decoder::Utf8StreamDecoder;
use crate::log_store::EntryKind;
use crate::session::Shared;
use crate::transport::PortReader;

/// Read loop lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadLoopState {
    Idle,
    Reading,
    Draining,
    Stopped,
}

/// Handle to a running read loop. Exactly one instance is active per open
/// connection; the session stops it fully before starting another.
pub(crate) struct ReadLoop {
    handle: JoinHandle<()>,
    cancel: Arc<Notify>,
    state: Arc<Mutex<ReadLoopState>>,
}

impl ReadLoop {
    pub(crate) fn spawn(
        mut reader: Box<dyn PortReader>,
        shared: Arc<Shared>,
        mut decoder: Utf8StreamDecoder,
    ) -> Self {
        let cancel = Arc::new(Notify::new());
        let state = Arc::new(Mutex::new(ReadLoopState::Reading));

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            let state = state.clone();
            async move {
                loop {
                    let pulled = tokio::select! {
                        _ = cancel.notified() => {
                            set_state(&state, ReadLoopState::Draining);
                            break;
                        }
                        res = reader.read_chunk() => res,
                    };

                    match pulled {
                        Ok(Some(bytes)) => {
                            if shared.paused.load(Ordering::Relaxed) {
                                // Received-while-paused data is dropped, not buffered
                                continue;
                            }
                            let text = decoder.decode(&bytes);
                            shared.append(EntryKind::Receive, bytes, text);
                        }
                        Ok(None) => {
                            tlog!("[read] Stream ended");
                            break;
                        }
                        Err(e) => {
                            tlog!("[read] {}", e);
                            shared.append(EntryKind::Error, Vec::new(), e.to_string());
                            break;
                        }
                    }
                }

                // A dangling partial sequence can never be completed now
                let tail = decoder.flush();
                if !tail.is_empty() && !shared.paused.load(Ordering::Relaxed) {
                    shared.append(EntryKind::Receive, Vec::new(), tail);
                }

                // Releasing the reader cancels/closes the inbound handle
                drop(reader);

                shared.connected.store(false, Ordering::Relaxed);
                shared.paused.store(false, Ordering::Relaxed);
                shared.meter.reset();
                shared.notify_render();
                set_state(&state, ReadLoopState::Stopped);
            }
        });

        ReadLoop {
            handle,
            cancel,
            state,
        }
    }

    /// Cancel the outstanding pull and wait for the loop to wind down.
    pub(crate) async fn stop(self) {
        self.cancel.notify_one();
        let _ = self.handle.await;
    }

    pub(crate) fn state(&self) -> ReadLoopState {
        self.state.lock().map(|s| *s).unwrap_or(ReadLoopState::Stopped)
    }
}

fn set_state(state: &Mutex<ReadLoopState>, new: ReadLoopState) {
    if let Ok(mut guard) = state.lock() {
        *guard = new;
    }
}
