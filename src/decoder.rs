// src/decoder.rs
//
// Incremental UTF-8 decoder for the inbound byte stream.
// A multi-byte sequence split across chunk boundaries is buffered and emitted
// once the rest of it arrives; malformed interior sequences become U+FFFD.

/// Stateful byte-to-text decoder. One instance per connection; state is
/// never shared across two connections, so a stale partial sequence cannot
/// leak into a new session.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    /// Trailing bytes of an incomplete multi-byte sequence (at most 3).
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning the text fragment it completes.
    /// No chunk is ever dropped: bytes that do not yet form a complete
    /// character are carried into the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        if chunk.is_empty() && self.pending.is_empty() {
            return String::new();
        }

        let carried;
        let bytes: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            carried = joined;
            &carried
        };

        let mut out = String::with_capacity(bytes.len());
        let mut input = bytes;
        loop {
            match std::str::from_utf8(input) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&input[..valid]) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(len) => {
                            // Malformed interior sequence: substitute and move on
                            out.push('\u{FFFD}');
                            input = &input[valid + len..];
                        }
                        None => {
                            // Truncated trailing sequence: keep for the next chunk
                            self.pending = input[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush any dangling partial sequence as a replacement character.
    /// Called at stream end, when no further bytes can complete it.
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            "\u{FFFD}".to_string()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(b"hello"), "hello");
        assert_eq!(dec.flush(), "");
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        // "é" is 0xC3 0xA9
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(&[0x61, 0xC3]), "a");
        assert_eq!(dec.decode(&[0xA9, 0x62]), "éb");
    }

    #[test]
    fn test_three_byte_sequence_split_three_ways() {
        // "€" is 0xE2 0x82 0xAC
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(&[0xE2]), "");
        assert_eq!(dec.decode(&[0x82]), "");
        assert_eq!(dec.decode(&[0xAC]), "€");
    }

    #[test]
    fn test_malformed_byte_replaced() {
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(&[0x61, 0xFF, 0x62]), "a\u{FFFD}b");
    }

    #[test]
    fn test_chunking_transparency() {
        let text = "añ€😀 newline\nmore";
        let bytes = text.as_bytes();

        // Decoding byte-at-a-time must equal decoding the whole buffer
        let mut dec = Utf8StreamDecoder::new();
        let mut reassembled = String::new();
        for b in bytes {
            reassembled.push_str(&dec.decode(std::slice::from_ref(b)));
        }
        assert_eq!(reassembled, text);

        let mut whole = Utf8StreamDecoder::new();
        assert_eq!(whole.decode(bytes), text);
    }

    #[test]
    fn test_flush_replaces_dangling_partial() {
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(&[0xE2, 0x82]), "");
        assert_eq!(dec.flush(), "\u{FFFD}");
        // Flushed state is gone
        assert_eq!(dec.flush(), "");
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut dec = Utf8StreamDecoder::new();
        assert_eq!(dec.decode(&[]), "");
        assert_eq!(dec.decode(&[0xC3]), "");
        assert_eq!(dec.decode(&[]), "");
        assert_eq!(dec.decode(&[0xA9]), "é");
    }
}
