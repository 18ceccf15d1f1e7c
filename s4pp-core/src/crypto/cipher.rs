//! AES-128-CBC streaming encryption for the HIDE layer.
//!
//! The HIDE layer (`hide.rs`) needs two properties the plain `cbc` crate
//! encryptor doesn't expose directly: in-place encryption of a caller buffer
//! whose length is already a multiple of 16, and the ability to recover the
//! last ciphertext block afterwards so it can seed the IV of the next
//! sequence (`app/modules/s4pp.c`'s session carries `last_block` across
//! `SEQ`s within one connection).

use aes::Aes128;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 16;

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Encrypts `buf` in place under CBC with the given key/iv. `buf.len()` must
/// be a non-zero multiple of 16. Returns the last ciphertext block, to be
/// used as the IV for the next call in the same session.
pub fn encrypt_in_place(key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE], buf: &mut [u8]) -> [u8; BLOCK_SIZE] {
    assert!(!buf.is_empty() && buf.len() % BLOCK_SIZE == 0, "buffer must be a non-zero multiple of 16 bytes");

    let enc = Encryptor::new(key.into(), iv.into());
    encrypt_blocks(enc, buf);

    let mut last = [0u8; BLOCK_SIZE];
    last.copy_from_slice(&buf[buf.len() - BLOCK_SIZE..]);
    last
}

fn encrypt_blocks(mut enc: Encryptor, buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
        let block = cbc::cipher::generic_array::GenericArray::from_mut_slice(chunk);
        enc.encrypt_block_mut(block);
    }
}

/// Decrypts `buf` in place under CBC with the given key/iv, the inverse of
/// `encrypt_in_place`. Used by tests and by hosts that want to verify a
/// HIDE payload end to end (invariant 6 in `SPEC_FULL.md` §8).
pub fn decrypt_in_place(key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE], buf: &mut [u8]) {
    use cbc::cipher::BlockDecryptMut;
    assert!(!buf.is_empty() && buf.len() % BLOCK_SIZE == 0, "buffer must be a non-zero multiple of 16 bytes");

    let mut dec = Decryptor::new(key.into(), iv.into());
    for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
        let block = cbc::cipher::generic_array::GenericArray::from_mut_slice(chunk);
        dec.decrypt_block_mut(block);
    }
}

/// Derives the HIDE session key: AES-128-CBC-encrypt (zero IV, shared key)
/// a single 16-byte block built from the first up-to-16 hex-decoded bytes of
/// the server token, right-padded with `\n`.
pub fn derive_session_key(shared_key: &[u8; KEY_SIZE], token_hex: &str) -> [u8; KEY_SIZE] {
    let mut block = [b'\n'; BLOCK_SIZE];
    let decoded = decode_hex_prefix(token_hex, BLOCK_SIZE);
    block[..decoded.len()].copy_from_slice(&decoded);

    let zero_iv = [0u8; BLOCK_SIZE];
    encrypt_in_place(shared_key, &zero_iv, &mut block);
    block
}

/// Reduces the configured shared key (arbitrary length, as entered by the
/// operator) to the 16-byte AES-128 key `derive_session_key` needs.
///
/// Mirrors `create_session_key` in
/// `examples/original_source/app/modules/s4pp.c`, whose `enc.keylen>16 &&
/// !sud->johny_bug` gate truncates an over-long key to 16 bytes by default.
/// Setting `johny_bug` true reproduces the named regression: the clamp is
/// skipped, so a key longer than 16 bytes is passed to the AES-CBC
/// primitive unchanged and, since this crate (like the original's
/// `mech->run`) cannot encrypt with a key of the wrong size, derivation
/// fails instead — silently disabling HIDE for the session rather than
/// erroring it, matching `sud->hide_wanted = false`. A key shorter than 16
/// bytes always fails this way regardless of `johny_bug`, since AES-128
/// needs exactly 16 key bytes either way.
pub fn shared_aes_key(key: &[u8], johny_bug: bool) -> Option<[u8; KEY_SIZE]> {
    if key.len() == KEY_SIZE {
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(key);
        return Some(out);
    }
    if key.len() > KEY_SIZE && !johny_bug {
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(&key[..KEY_SIZE]);
        return Some(out);
    }
    None
}

fn decode_hex_prefix(hex_str: &str, max_bytes: usize) -> Vec<u8> {
    let bytes = hex_str.as_bytes();
    let mut out = Vec::with_capacity(max_bytes);
    let mut i = 0;
    while i + 1 < bytes.len() && out.len() < max_bytes {
        let hi = hex_digit(bytes[i]);
        let lo = hex_digit(bytes[i + 1]);
        if let (Some(hi), Some(lo)) = (hi, lo) {
            out.push((hi << 4) | lo);
        } else {
            break;
        }
        i += 2;
    }
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_and_decrypt() {
        let key = [0x42u8; KEY_SIZE];
        let iv = [0x01u8; BLOCK_SIZE];
        let mut buf = b"0123456789abcdef0123456789abcdef".to_vec();
        let plain = buf.clone();

        let last_block = encrypt_in_place(&key, &iv, &mut buf);
        assert_eq!(&last_block[..], &buf[buf.len() - BLOCK_SIZE..]);
        assert_ne!(buf, plain);

        decrypt_in_place(&key, &iv, &mut buf);
        assert_eq!(buf, plain);
    }

    #[test]
    fn chained_iv_continues_across_sequences() {
        let key = [0x11u8; KEY_SIZE];
        let iv1 = [0u8; BLOCK_SIZE];
        let mut first = b"aaaaaaaaaaaaaaaa".to_vec();
        let last_block = encrypt_in_place(&key, &iv1, &mut first);

        let mut second = b"bbbbbbbbbbbbbbbb".to_vec();
        encrypt_in_place(&key, &last_block, &mut second);
        decrypt_in_place(&key, &last_block, &mut second);
        assert_eq!(second, b"bbbbbbbbbbbbbbbb");
    }

    #[test]
    fn shared_aes_key_truncates_long_keys_to_sixteen_bytes() {
        let long_key = b"0123456789abcdefEXTRA";
        let short = shared_aes_key(long_key, false).unwrap();
        assert_eq!(&short, b"0123456789abcdef");
    }

    #[test]
    fn shared_aes_key_rejects_keys_under_sixteen_bytes() {
        assert_eq!(shared_aes_key(b"tooshort", false), None);
        assert_eq!(shared_aes_key(b"tooshort", true), None);
    }

    #[test]
    fn johny_bug_skips_the_truncation_and_fails_long_keys() {
        let long_key = b"0123456789abcdefEXTRA";
        assert!(shared_aes_key(long_key, true).is_none());
    }

    #[test]
    fn exact_length_key_is_unaffected_by_johny_bug() {
        let key = b"0123456789abcdef";
        assert_eq!(shared_aes_key(key, false).unwrap(), shared_aes_key(key, true).unwrap());
    }

    #[test]
    fn session_key_derivation_pads_short_tokens_with_newline() {
        let key = [0x77u8; KEY_SIZE];
        let short = derive_session_key(&key, "abcd");
        let long = derive_session_key(&key, "abcd0000000000000000000000000000");
        assert_ne!(short, long);
    }

    #[test]
    #[should_panic(expected = "multiple of 16")]
    fn rejects_unaligned_buffer() {
        let key = [0u8; KEY_SIZE];
        let iv = [0u8; BLOCK_SIZE];
        let mut buf = vec![0u8; 5];
        encrypt_in_place(&key, &iv, &mut buf);
    }
}
