// src/log_store.rs
//
// Bounded scrollback log for a terminal session.
// Owns the merge-or-append policy for inbound data and the hard-cap eviction.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on stored entries. Older entries are evicted from the front.
pub const MAX_LOG_ENTRIES: usize = 3000;

/// What produced a log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Receive,
    Transmit,
    System,
    Error,
}

/// One scrollback row. Append-only, except that the most recent Receive
/// entry may grow in place when consecutive Receive chunks are merged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Local>,
    pub kind: EntryKind,
    /// Raw payload bytes as they crossed the wire (empty for System entries)
    pub raw: Vec<u8>,
    /// Decoded/display text
    pub text: String,
    /// Always equals `raw.len()`
    pub byte_count: usize,
}

impl LogEntry {
    fn new(kind: EntryKind, raw: Vec<u8>, text: String) -> Self {
        let byte_count = raw.len();
        LogEntry {
            id: Uuid::new_v4(),
            timestamp: Local::now(),
            kind,
            raw,
            text,
            byte_count,
        }
    }
}

/// Ordered, bounded collection of log entries.
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    /// When true ("forced per-packet line break" framing), every Receive
    /// chunk becomes its own entry instead of coalescing into the last one.
    force_line_break: bool,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore {
    pub fn new() -> Self {
        LogStore {
            entries: VecDeque::with_capacity(256),
            force_line_break: false,
        }
    }

    pub fn set_force_line_break(&mut self, on: bool) {
        self.force_line_break = on;
    }

    pub fn force_line_break(&self) -> bool {
        self.force_line_break
    }

    /// Append an entry, merging consecutive Receive chunks when framing is
    /// off, then evict from the front past the hard cap.
    pub fn append(&mut self, kind: EntryKind, raw: Vec<u8>, text: String) {
        let merged = if kind == EntryKind::Receive && !self.force_line_break {
            match self.entries.back_mut() {
                Some(last) if last.kind == EntryKind::Receive => {
                    last.raw.extend_from_slice(&raw);
                    last.text.push_str(&text);
                    last.byte_count = last.raw.len();
                    true
                }
                _ => false,
            }
        } else {
            false
        };

        if !merged {
            self.entries.push_back(LogEntry::new(kind, raw, text));
        }

        while self.entries.len() > MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone the current entries in order (for renderers and export).
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Byte totals over the current store: (received, transmitted).
    /// Evicted entries naturally stop counting; there is no lifetime counter.
    pub fn byte_totals(&self) -> (usize, usize) {
        let mut rx = 0usize;
        let mut tx = 0usize;
        for e in &self.entries {
            match e.kind {
                EntryKind::Receive => rx += e.byte_count,
                EntryKind::Transmit => tx += e.byte_count,
                _ => {}
            }
        }
        (rx, tx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_count_matches_raw() {
        let mut store = LogStore::new();
        store.append(EntryKind::Transmit, vec![1, 2, 3], "...".to_string());
        let last = store.last().unwrap();
        assert_eq!(last.byte_count, last.raw.len());
    }

    #[test]
    fn test_receive_chunks_merge_when_framing_off() {
        let mut store = LogStore::new();
        for _ in 0..5 {
            store.append(EntryKind::Receive, vec![0x41, 0x42], "AB".to_string());
        }
        assert_eq!(store.len(), 1);
        let last = store.last().unwrap();
        assert_eq!(last.raw.len(), 10);
        assert_eq!(last.byte_count, 10);
        assert_eq!(last.text, "ABABABABAB");
    }

    #[test]
    fn test_receive_chunks_split_when_framing_on() {
        let mut store = LogStore::new();
        store.set_force_line_break(true);
        for _ in 0..5 {
            store.append(EntryKind::Receive, vec![0x41], "A".to_string());
        }
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_transmit_entry_breaks_receive_merge() {
        let mut store = LogStore::new();
        store.append(EntryKind::Receive, vec![1], "a".to_string());
        store.append(EntryKind::Transmit, vec![2], "b".to_string());
        store.append(EntryKind::Receive, vec![3], "c".to_string());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_eviction_never_exceeds_cap() {
        let mut store = LogStore::new();
        store.set_force_line_break(true);
        for i in 0..(MAX_LOG_ENTRIES + 500) {
            store.append(EntryKind::Receive, vec![i as u8], "x".to_string());
        }
        assert_eq!(store.len(), MAX_LOG_ENTRIES);
        // Oldest 500 were dropped from the front
        assert_eq!(store.snapshot()[0].raw, vec![500usize as u8]);
    }

    #[test]
    fn test_eviction_updates_byte_totals() {
        let mut store = LogStore::new();
        store.set_force_line_break(true);
        for _ in 0..(MAX_LOG_ENTRIES + 100) {
            store.append(EntryKind::Receive, vec![0; 2], String::new());
        }
        let (rx, _) = store.byte_totals();
        assert_eq!(rx, MAX_LOG_ENTRIES * 2);
    }

    #[test]
    fn test_merged_entry_keeps_original_id_and_timestamp() {
        let mut store = LogStore::new();
        store.append(EntryKind::Receive, vec![1], "a".to_string());
        let first_id = store.last().unwrap().id;
        store.append(EntryKind::Receive, vec![2], "b".to_string());
        assert_eq!(store.last().unwrap().id, first_id);
    }
}
