//! The sample record (`spec.md` §3/§4.B) and the format-1 real/imaginary
//! pairing rule.

use std::fmt;

/// Duration value meaning "instant" (no meaningful span), per the packed
/// record word in `flashfifo.c` (`DURATION_SHIFT`).
pub const DURATION_INSTANT: u32 = 0x00ff_ffff;

/// A single time-stamped sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: u32,
    pub value: Value,
    pub decimals: u8,
    /// Present only in format 1; `DURATION_INSTANT` means "instant".
    pub duration: u32,
    pub tag: Tag,
    pub source_id: Option<String>,
}

/// Numeric payload of a sample. The protocol formats values as
/// fixed-point decimal text (`decimals` places after the point), so the
/// value is carried as an integer mantissa rather than a float to keep
/// formatting exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value(pub i32);

/// Up to 4 ASCII bytes identifying a sensor, zero-padded on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; 4]);

impl Tag {
    pub fn new(bytes: &[u8]) -> Tag {
        assert!(bytes.len() <= 4, "tag must be at most 4 bytes");
        let mut buf = [0u8; 4];
        buf[..bytes.len()].copy_from_slice(bytes);
        Tag(buf)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Whether this tag's fixed fourth byte (index 3) is `'R'`. A tag
    /// shorter than 4 bytes is zero-padded on the right, so its index 3 is
    /// `0` and never matches — it reads the literal byte position, not
    /// "whichever byte happens to be last occupied" (`tag_char_at_pos` in
    /// `examples/original_source/app/include/rtc/fifo.h`).
    pub fn is_real_suffixed(&self) -> bool {
        self.0[3] == b'R'
    }

    /// Whether this tag's fixed fourth byte (index 3) is `'I'`.
    pub fn is_imag_suffixed(&self) -> bool {
        self.0[3] == b'I'
    }

    /// The tag with its fixed fourth byte replaced by `replacement`.
    fn with_suffix(&self, replacement: u8) -> Tag {
        let mut buf = self.0;
        buf[3] = replacement;
        Tag(buf)
    }

    /// The tag with its fixed fourth byte cleared, as used for the
    /// dictionary entry of a paired complex sample (§4.B: "tag truncated
    /// to the first three characters").
    pub fn without_suffix(&self) -> Tag {
        let mut buf = self.0;
        buf[3] = 0;
        Tag(buf)
    }

    fn matching_real_tag(&self) -> Tag {
        self.with_suffix(b'R')
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            if b == 0 {
                break;
            }
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl Sample {
    pub fn new(
        timestamp: u32,
        value: i32,
        decimals: u8,
        duration: u32,
        tag: &[u8],
        source_id: Option<String>,
    ) -> Sample {
        assert!(decimals <= 15, "decimals must fit in 4 bits");
        Sample {
            timestamp,
            value: Value(value),
            decimals,
            duration,
            tag: Tag::new(tag),
            source_id,
        }
    }
}

/// Attempts to pair `first` (already known to be `'R'`-suffixed) with
/// `second`. Returns `Some((real, imag, combined_tag))` when `second` is
/// `'I'`-suffixed with an identical timestamp and decimals; otherwise
/// `None`, meaning `first` was unmatched and should be emitted alone (or
/// dropped, per the caller's policy — see `engine.rs`).
pub fn try_pair_complex<'a>(first: &'a Sample, second: &'a Sample) -> Option<(&'a Sample, &'a Sample, Tag)> {
    if !first.tag.is_real_suffixed() || !second.tag.is_imag_suffixed() {
        return None;
    }
    if first.timestamp != second.timestamp || first.decimals != second.decimals {
        return None;
    }
    if first.tag.matching_real_tag() != second.tag.with_suffix(b'R') {
        return None;
    }
    Some((first, second, first.tag.without_suffix()))
}
