//! Incremental UTF-8 decoding for chunked stream bodies.
//!
//! Network chunk boundaries do not respect character boundaries, so a
//! decoder has to carry an incomplete trailing sequence over to the next
//! chunk. Invalid sequences are replaced with U+FFFD rather than failing:
//! a malformed byte must never crash the stream consumer.

/// Stateful decoder that turns a sequence of byte chunks into text.
#[derive(Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that became complete with
    /// it. An incomplete multi-byte sequence at the end of the chunk is
    /// held back until more bytes arrive.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[..valid_up_to]) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + invalid_len);
                        }
                        None => {
                            // Incomplete sequence at the tail; keep it for
                            // the next chunk.
                            self.pending.drain(..valid_up_to);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flush the decoder at end of stream. A dangling incomplete sequence
    /// becomes a single replacement character.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}
