// src/meter.rs
//
// Tumbling-window lines/sec gauge for received text.
// A 1-second wall-clock tick publishes the in-flight newline count and
// resets the accumulator; there is no backlog catch-up after a stall.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Cheap clonable handle; all clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct FrequencyMeter {
    inner: Arc<MeterInner>,
}

#[derive(Debug, Default)]
struct MeterInner {
    /// Newlines seen since the last tick
    pending: AtomicUsize,
    /// Value published at the last tick (0 before the first tick)
    published: AtomicUsize,
}

impl FrequencyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the newline characters in a received text fragment.
    pub fn record_text(&self, text: &str) {
        let n = text.bytes().filter(|&b| b == b'\n').count();
        if n > 0 {
            self.inner.pending.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Publish the accumulated count and reset it. Returns the new value.
    /// Driven by the session's 1 s interval task.
    pub fn tick(&self) -> usize {
        let n = self.inner.pending.swap(0, Ordering::Relaxed);
        self.inner.published.store(n, Ordering::Relaxed);
        n
    }

    /// The most recently published lines/sec value.
    pub fn lines_per_sec(&self) -> usize {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Zero both counters. Called on disconnect.
    pub fn reset(&self) {
        self.inner.pending.store(0, Ordering::Relaxed);
        self.inner.published.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero_before_first_tick() {
        let meter = FrequencyMeter::new();
        meter.record_text("a\nb\n");
        assert_eq!(meter.lines_per_sec(), 0);
    }

    #[test]
    fn test_tick_publishes_window_count() {
        let meter = FrequencyMeter::new();
        meter.record_text("one\ntwo\nthree\n");
        assert_eq!(meter.tick(), 3);
        assert_eq!(meter.lines_per_sec(), 3);
    }

    #[test]
    fn test_second_tick_without_appends_publishes_zero() {
        let meter = FrequencyMeter::new();
        meter.record_text("line\n");
        assert_eq!(meter.tick(), 1);
        assert_eq!(meter.tick(), 0);
        assert_eq!(meter.lines_per_sec(), 0);
    }

    #[test]
    fn test_text_without_newlines_counts_nothing() {
        let meter = FrequencyMeter::new();
        meter.record_text("no terminator here");
        assert_eq!(meter.tick(), 0);
    }

    #[test]
    fn test_reset_clears_pending_and_published() {
        let meter = FrequencyMeter::new();
        meter.record_text("\n\n");
        meter.tick();
        meter.record_text("\n");
        meter.reset();
        assert_eq!(meter.lines_per_sec(), 0);
        assert_eq!(meter.tick(), 0);
    }
}
