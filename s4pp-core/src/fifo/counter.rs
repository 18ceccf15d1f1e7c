//! Monotone counters encoded as leading-zero-bits over an erased
//! (all-ones) flash region, per `spec.md` §3/§4.C and
//! `examples/original_source/components/modules/flashfifo.c`.
//!
//! Reading scans 32-bit little-endian words from the start of the region,
//! summing `32 - popcount(word)` until the first non-saturated (not
//! all-zero) word — that word's cleared bits mark the fractional remainder
//! of the count. Incrementing clears exactly one more bit via a single
//! flash write (`~(1 << (v & 31))` at the word the next bit lives in),
//! which is idempotent and needs no erase.

use byteorder::{ByteOrder, LittleEndian};

use super::flash::Flash;
use std::io;

/// Reads the counter value stored in `region_len` bytes starting at
/// `sector_index * SECTOR_SIZE + offset`.
pub fn read(flash: &dyn Flash, sector_index: usize, offset: usize, region_len: usize) -> io::Result<u32> {
    let mut buf = vec![0u8; region_len];
    flash.read(sector_index, offset, &mut buf)?;

    let mut count = 0u32;
    for word_bytes in buf.chunks_exact(4) {
        let word = LittleEndian::read_u32(word_bytes);
        if word == 0 {
            count += 32;
            continue;
        }
        count += 32 - word.count_ones();
        break;
    }
    Ok(count)
}

/// Advances the counter at `sector_index`/`offset` from `current` to
/// `current + 1` by clearing a single bit.
pub fn increment(
    flash: &mut dyn Flash,
    sector_index: usize,
    offset: usize,
    current: u32,
) -> io::Result<()> {
    let word_offset = (current / 32) as usize * 4;
    let bit = current % 32;
    let mask = !(1u32 << bit);
    let mut mask_bytes = [0u8; 4];
    LittleEndian::write_u32(&mut mask_bytes, mask);
    flash.write(sector_index, offset + word_offset, &mask_bytes)
}
