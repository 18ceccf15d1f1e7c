//! The optional HIDE confidentiality layer (`spec.md` §4.G): salted,
//! padded AES-128-CBC encryption of each sequence's payload, chained via
//! the previous sequence's last ciphertext block.

use crate::crypto::cipher::{self, BLOCK_SIZE, KEY_SIZE};
use crate::crypto::random::RandomSource;

/// Per-session HIDE state: the derived session key and the CBC IV chain.
pub struct Hide {
    session_key: [u8; KEY_SIZE],
    iv: [u8; BLOCK_SIZE],
}

impl Hide {
    /// Derives the session key from the shared key and the server token
    /// (hex string), starting the IV chain at zero for the first sequence.
    pub fn new(shared_key: &[u8; KEY_SIZE], token_hex: &str) -> Hide {
        Hide {
            session_key: cipher::derive_session_key(shared_key, token_hex),
            iv: [0u8; BLOCK_SIZE],
        }
    }

    /// Generates a salt (8-15 random non-`\n` bytes plus a `\n`
    /// terminator) to prefix the next sequence payload. Excluded from the
    /// HMAC.
    pub fn generate_salt<R: RandomSource>(&self, rng: &mut R) -> Vec<u8> {
        crate::crypto::random::generate_salt(rng)
    }

    /// Pads `payload` with 1-15 `\n` bytes to the next 16-byte multiple
    /// (always pads, never leaves it already-aligned with zero pad), then
    /// encrypts it in place, chaining the IV for next call.
    ///
    /// Returns the pad that was appended, so callers can fold it into the
    /// HMAC before this call (§4.G: "folds the pad into the HMAC before
    /// signing").
    pub fn pad_len_for(&self, payload_len: usize) -> usize {
        let remainder = payload_len % BLOCK_SIZE;
        BLOCK_SIZE - remainder
    }

    pub fn encrypt(&mut self, payload: &mut Vec<u8>) {
        let pad = self.pad_len_for(payload.len());
        payload.extend(std::iter::repeat(b'\n').take(pad));
        self.encrypt_no_pad(payload);
    }

    /// Encrypts an already block-aligned buffer in place, chaining the IV.
    ///
    /// Used by the engine's sequence close (`engine.rs`), which must fold
    /// the pad into the running HMAC *before* the `SIG:` line is appended,
    /// so it computes the pad length itself (via `pad_len_for`, accounting
    /// for the fixed `SIG:` line length) and appends it ahead of time
    /// instead of letting `encrypt` pick its own trailing pad.
    pub fn encrypt_no_pad(&mut self, payload: &mut [u8]) {
        debug_assert_eq!(payload.len() % BLOCK_SIZE, 0);
        let last_block = cipher::encrypt_in_place(&self.session_key, &self.iv, payload);
        self.iv = last_block;
    }
}
