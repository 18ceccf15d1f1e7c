//! Splits an inbound byte stream into `\n`-terminated lines across
//! arbitrary chunk boundaries, using a single growable accumulation buffer
//! (`spec.md` §4.D).
//!
//! Grounded on the single-buffer accumulate-then-drain idiom of
//! `t51core/src/net/buffer.rs::Buffer`, simplified from that type's
//! chunk-pool-backed design to the one bounded scratch buffer §9 calls for.

/// Accumulates partial lines and emits complete ones via `feed`.
#[derive(Default)]
pub struct LineFramer {
    scratch: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> LineFramer {
        LineFramer { scratch: Vec::new() }
    }

    /// Feeds a chunk of newly received bytes, calling `on_line` once per
    /// complete line (the line content, without the trailing `\n`).
    pub fn feed(&mut self, chunk: &[u8], mut on_line: impl FnMut(&[u8])) {
        let mut rest = chunk;

        if !self.scratch.is_empty() {
            match find_newline(rest) {
                Some(pos) => {
                    self.scratch.extend_from_slice(&rest[..pos]);
                    let line = std::mem::take(&mut self.scratch);
                    on_line(&line);
                    rest = &rest[pos + 1..];
                }
                None => {
                    self.scratch.extend_from_slice(rest);
                    return;
                }
            }
        }

        loop {
            match find_newline(rest) {
                Some(pos) => {
                    on_line(&rest[..pos]);
                    rest = &rest[pos + 1..];
                }
                None => {
                    self.scratch.extend_from_slice(rest);
                    break;
                }
            }
        }
    }

    /// True when a partial, unterminated line is pending.
    pub fn has_pending(&self) -> bool {
        !self.scratch.is_empty()
    }
}

fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}
