//! HMAC-SHA256 over the canonical 64-byte block-size inner/outer pad
//! construction (RFC 2104).
//!
//! The `hmac`/`sha2` crates already implement RFC 2104 correctly (including
//! pre-hashing of over-long keys); this module exists to give the sequence
//! accumulator a resumable incremental HMAC it can feed one line at a time.
//! The legacy `johny_bug` flag (`spec.md` §9) turns out, on inspection of
//! `create_session_key` in `examples/original_source/app/modules/s4pp.c`, to
//! affect only the HIDE session-key AES derivation's key-length clamp, not
//! HMAC keying at all — see `crypto::cipher::shared_aes_key` and
//! `DESIGN.md`. Every HMAC in this crate (`AUTH:` and the per-sequence
//! signature) always uses the plain RFC 2104 construction below.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const BLOCK_SIZE: usize = 64;
pub const DIGEST_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Computes HMAC-SHA256 in one shot.
pub fn compute(key: &[u8], message: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("Hmac accepts any key length");
    mac.update(message);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(&result);
    out
}

/// An incremental HMAC-SHA256 accumulator: `update` may be called any
/// number of times before `finalize`.
pub struct Incremental {
    mac: HmacSha256,
}

impl Incremental {
    pub fn new(key: &[u8]) -> Incremental {
        Incremental {
            mac: HmacSha256::new_from_slice(key).expect("Hmac accepts any key length"),
        }
    }

    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    pub fn finalize(self) -> [u8; DIGEST_SIZE] {
        let result = self.mac.finalize().into_bytes();
        let mut out = [0u8; DIGEST_SIZE];
        out.copy_from_slice(&result);
        out
    }
}
