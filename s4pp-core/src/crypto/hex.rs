//! Lower-case ASCII-hex encoding, safe for in-place expansion when `dst`
//! and `src` overlap at the same base address (`dst.len() == 2 * src.len()`).
//!
//! Grounded on `crypto_encode_asciihex` in
//! `examples/original_source/components/s4pp/glue.c`: the original walks the
//! source buffer from the last byte to the first so that widening the
//! buffer in place never overwrites a byte before it has been read.

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Encodes `src` as lower-case hex into a freshly allocated `String`.
pub fn encode(src: &[u8]) -> String {
    let mut out = vec![0u8; src.len() * 2];
    encode_into(src, &mut out);
    // SAFETY-free: every byte written is one of `DIGITS`, which is ASCII.
    String::from_utf8(out).expect("hex digits are valid utf8")
}

/// Encodes `src` into `dst`, right-to-left, so that `dst` may alias the same
/// backing storage as `src` as long as `dst.len() == 2 * src.len()`.
///
/// Panics if `dst.len() != 2 * src.len()`.
pub fn encode_into(src: &[u8], dst: &mut [u8]) {
    assert_eq!(dst.len(), src.len() * 2, "destination must be exactly 2x source length");
    for i in (0..src.len()).rev() {
        let byte = src[i];
        dst[i * 2] = DIGITS[(byte >> 4) as usize];
        dst[i * 2 + 1] = DIGITS[(byte & 0x0f) as usize];
    }
}
