// src/error.rs
//
// Error taxonomy for the terminal engine. Every failure is local to the
// operation that raised it: nothing here is retried automatically and
// nothing propagates as a panic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TermError {
    /// Port could not be opened. The connection stays Disconnected.
    #[error("Failed to open port: {0}")]
    TransportOpen(String),

    /// Inbound stream failed. The read loop logs this and stops gracefully.
    #[error("Read error: {0}")]
    TransportRead(String),

    /// Outbound write failed. Aborts the in-flight send only.
    #[error("Write error: {0}")]
    TransportWrite(String),

    /// Hex payload could not be parsed (odd length or non-hex characters).
    #[error("Invalid hex payload: {0}")]
    InvalidHexFormat(String),

    /// Send attempted while the connection is paused.
    #[error("Send rejected: connection is paused")]
    PausedRejection,

    /// Send attempted without an open connection.
    #[error("Not connected")]
    NotConnected,

    /// File source could not be read.
    #[error("File error: {0}")]
    File(String),

    /// Quick-send list could not be loaded or saved.
    #[error("Persistence error: {0}")]
    Persist(String),
}
