// src/lib.rs
//
// serimon: interactive terminal engine for byte-stream serial connections.
// Streams inbound bytes into a bounded scrollback log, sends text/hex
// payloads or whole files, and reports live throughput statistics. UI
// concerns stay behind the PortTransport/Renderer/PersistedList/FileSource
// interfaces.

#[macro_use]
pub(crate) mod logging;

mod decoder;
mod error;
mod export;
mod log_store;
mod meter;
mod quick_send;
mod read_loop;
mod session;
mod transmit;
mod transport;

pub use decoder::Utf8StreamDecoder;
pub use error::TermError;
pub use export::{to_receive_bytes, to_transcript, write_receive_bytes, write_transcript};
pub use log_store::{EntryKind, LogEntry, LogStore, MAX_LOG_ENTRIES};
pub use logging::{init_file_logging, stop_file_logging};
pub use meter::FrequencyMeter;
pub use quick_send::{JsonQuickSendStore, PersistedList, QuickSendItem};
pub use read_loop::ReadLoopState;
pub use session::{ConnectionState, Renderer, TerminalSession};
pub use transmit::{
    encode_payload, parse_hex_payload, DiskFileSource, FileSendOptions, FileSource, PayloadMode,
    SendPayload, Terminator, TransferProtocol, Transmitter,
};
pub use transport::{
    list_ports, FlowControl, Parity, PortConfig, PortInfo, PortReader, PortTransport, PortWriter,
    SerialTransport,
};
