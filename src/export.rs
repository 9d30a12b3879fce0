// src/export.rs
//
// Flatten the scrollback into a plain-text transcript or a binary blob
// of the received payloads only.

use std::path::Path;

use crate::error::TermError;
use crate::log_store::{EntryKind, LogEntry};

fn direction_prefix(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Receive => "<<",
        EntryKind::Transmit => ">>",
        EntryKind::System => "--",
        EntryKind::Error => "!!",
    }
}

/// One `time prefix text` line per entry.
pub fn to_transcript(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        out.push_str(&format!(
            "{} {} {}\n",
            e.timestamp.format("%H:%M:%S%.3f"),
            direction_prefix(e.kind),
            e.text.trim_end_matches(['\r', '\n'])
        ));
    }
    out
}

/// Concatenated raw bytes of Receive entries only, in order.
pub fn to_receive_bytes(entries: &[LogEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for e in entries {
        if e.kind == EntryKind::Receive {
            out.extend_from_slice(&e.raw);
        }
    }
    out
}

pub fn write_transcript(path: &Path, entries: &[LogEntry]) -> Result<(), TermError> {
    std::fs::write(path, to_transcript(entries))
        .map_err(|e| TermError::File(format!("{}: {}", path.display(), e)))?;
    tlog!("[export] Wrote transcript ({} entries) to {}", entries.len(), path.display());
    Ok(())
}

pub fn write_receive_bytes(path: &Path, entries: &[LogEntry]) -> Result<(), TermError> {
    let bytes = to_receive_bytes(entries);
    std::fs::write(path, &bytes)
        .map_err(|e| TermError::File(format!("{}: {}", path.display(), e)))?;
    tlog!("[export] Wrote {} received byte(s) to {}", bytes.len(), path.display());
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_store::LogStore;

    fn sample_entries() -> Vec<LogEntry> {
        let mut store = LogStore::new();
        store.set_force_line_break(true);
        store.append(EntryKind::System, Vec::new(), "Connected".to_string());
        store.append(EntryKind::Transmit, b"AT\r\n".to_vec(), "AT\r\n".to_string());
        store.append(EntryKind::Receive, b"OK\r\n".to_vec(), "OK\r\n".to_string());
        store.append(EntryKind::Receive, vec![0x01, 0x02], "\u{1}\u{2}".to_string());
        store.snapshot()
    }

    #[test]
    fn test_transcript_one_line_per_entry() {
        let entries = sample_entries();
        let transcript = to_transcript(&entries);
        assert_eq!(transcript.lines().count(), entries.len());
        assert!(transcript.contains("-- Connected"));
        assert!(transcript.contains(">> AT"));
        assert!(transcript.contains("<< OK"));
    }

    #[test]
    fn test_receive_bytes_concatenates_receive_only() {
        let entries = sample_entries();
        assert_eq!(to_receive_bytes(&entries), b"OK\r\n\x01\x02".to_vec());
    }

    #[test]
    fn test_empty_log_exports_empty() {
        assert_eq!(to_transcript(&[]), "");
        assert_eq!(to_receive_bytes(&[]), Vec::<u8>::new());
    }
}
