//! The flash-backed persistent sample FIFO (`spec.md` §4.C): a sector-based
//! circular queue that survives power loss, amortizes erases to sector
//! granularity, and tolerates overflow by dropping whole sectors.
//!
//! Grounded on `examples/original_source/components/modules/flashfifo.c`.

pub mod counter;
pub mod flash;
pub mod layout;

use byteorder::{ByteOrder, LittleEndian};
use std::io;

use crate::sample::{Sample, DURATION_INSTANT};
use flash::Flash;
use layout::Header;

/// Duration sentinel as persisted in the 20-bit on-flash duration field.
/// The wire-level sentinel (`DURATION_INSTANT`, 24 bits of ones) does not
/// fit in the 20 bits `flashfifo.c`'s `DURATION_SHIFT`/`DICTIONARY_SHIFT`
/// layout reserves for it once the 8-bit dictionary index shares the same
/// word (see `DESIGN.md`); this is the local analogue used only for the
/// persisted record.
const PERSISTED_DURATION_INSTANT: u32 = 0x000f_ffff;
const DURATION_MASK: u32 = 0x000f_ffff;
const DECIMALS_MASK: u32 = 0x0000_000f;
const DECIMALS_SHIFT: u32 = 0;
const DURATION_SHIFT: u32 = 4;
const DICT_INDEX_SHIFT: u32 = 24;

fn pack_word(decimals: u8, duration: u32, dict_index: u8) -> u32 {
    let duration_field = if duration == DURATION_INSTANT {
        PERSISTED_DURATION_INSTANT
    } else {
        duration.min(DURATION_MASK - 1)
    };
    ((decimals as u32 & DECIMALS_MASK) << DECIMALS_SHIFT)
        | ((duration_field & DURATION_MASK) << DURATION_SHIFT)
        | ((dict_index as u32) << DICT_INDEX_SHIFT)
}

fn unpack_word(word: u32) -> (u8, u32, u8) {
    let decimals = ((word >> DECIMALS_SHIFT) & DECIMALS_MASK) as u8;
    let duration_field = (word >> DURATION_SHIFT) & DURATION_MASK;
    let duration = if duration_field == PERSISTED_DURATION_INSTANT {
        DURATION_INSTANT
    } else {
        duration_field
    };
    let dict_index = (word >> DICT_INDEX_SHIFT) as u8;
    (decimals, duration, dict_index)
}

/// A slot addressing one 16-byte sample record in the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    sector_index: usize,
    entry_index: usize,
}

/// The flash-backed FIFO. `sector_count` is the total number of data
/// sectors (sectors 4.. in the partition); the fixed sectors 0-3 (header,
/// head counter, tail counter, dictionary) are implied.
pub struct Fifo<F: Flash> {
    flash: F,
    data_sector_count: usize,
}

impl<F: Flash> Fifo<F> {
    /// Wraps an already-initialized flash partition. Use `prepare` to
    /// initialize a fresh one.
    pub fn open(flash: F) -> io::Result<Fifo<F>> {
        let header = Header::read(&flash)?;
        let data_sector_count = if header.is_valid() {
            header.data_sector_count as usize
        } else {
            flash.sector_count().saturating_sub(layout::FIRST_DATA_SECTOR)
        };
        Ok(Fifo { flash, data_sector_count })
    }

    pub fn check_magic(&self) -> io::Result<bool> {
        Ok(Header::read(&self.flash)?.is_valid())
    }

    /// Erases the head/tail counters, the dictionary, and the first data
    /// sector, then writes a fresh header. Fails only on a flash I/O error.
    pub fn prepare(&mut self) -> io::Result<()> {
        let entries_per_sector = layout::DATA_ENTRIES_PER_SECTOR as u32;
        let data_sector_count = self.data_sector_count as u32;
        assert!(
            entries_per_sector <= 253,
            "data_entries_per_sector must stay below the all-zero counter boundary"
        );
        assert!(
            data_sector_count < 8 * layout::SECTOR_SIZE as u32,
            "data_sector_count must stay below the all-zero counter boundary"
        );

        self.flash.erase_sector(layout::SECTOR_HEAD_COUNTER)?;
        self.flash.erase_sector(layout::SECTOR_TAIL_COUNTER)?;
        self.flash.erase_sector(layout::SECTOR_DICTIONARY)?;
        self.flash.erase_sector(layout::FIRST_DATA_SECTOR)?;
        self.flash.flush_cache()?;

        let header = Header::new(data_sector_count);
        header.write(&mut self.flash)?;
        self.flash.flush_cache()
    }

    fn head_sector_counter(&self) -> io::Result<u32> {
        counter::read(&self.flash, layout::SECTOR_HEAD_COUNTER, 0, layout::SECTOR_SIZE)
    }

    fn tail_sector_counter(&self) -> io::Result<u32> {
        counter::read(&self.flash, layout::SECTOR_TAIL_COUNTER, 0, layout::SECTOR_SIZE)
    }

    fn sector_for(&self, counter_value: u32) -> usize {
        (counter_value as usize) % self.data_sector_count
    }

    fn in_sector_counter(&self, sector: usize, offset: usize) -> io::Result<u32> {
        counter::read(&self.flash, layout::FIRST_DATA_SECTOR + sector, offset, layout::DATA_ENTRIES_OFFSET)
    }

    fn head_slot(&self) -> io::Result<Slot> {
        let sector = self.sector_for(self.head_sector_counter()?);
        let entry_index = self.in_sector_counter(sector, layout::DATA_HEAD_COUNTER_OFFSET)? as usize;
        Ok(Slot { sector_index: sector, entry_index })
    }

    fn tail_slot(&self) -> io::Result<Slot> {
        let sector = self.sector_for(self.tail_sector_counter()?);
        let entry_index = self.in_sector_counter(sector, layout::DATA_TAIL_COUNTER_OFFSET)? as usize;
        Ok(Slot { sector_index: sector, entry_index })
    }

    /// Current occupancy: `(tail_pos - head_pos) mod (data_sectors * entries_per_sector)`.
    pub fn count(&self) -> io::Result<u32> {
        let entries_per_sector = layout::DATA_ENTRIES_PER_SECTOR as u64;
        let total_slots = entries_per_sector * self.data_sector_count as u64;

        let head = self.head_sector_counter()? as u64 * entries_per_sector
            + self.in_sector_counter(self.sector_for(self.head_sector_counter()?), layout::DATA_HEAD_COUNTER_OFFSET)? as u64;
        let tail = self.tail_sector_counter()? as u64 * entries_per_sector
            + self.in_sector_counter(self.sector_for(self.tail_sector_counter()?), layout::DATA_TAIL_COUNTER_OFFSET)? as u64;

        Ok((((tail + total_slots) - head) % total_slots) as u32)
    }

    /// Occupancy guaranteed to survive regardless of sector-boundary
    /// overflow loss: one sector's worth less than the absolute maximum.
    pub fn guaranteed_size(&self) -> u32 {
        let entries_per_sector = layout::DATA_ENTRIES_PER_SECTOR as u32;
        (self.data_sector_count as u32 * entries_per_sector).saturating_sub(entries_per_sector)
    }

    /// Absolute maximum occupancy (one less than the total slot count, so
    /// the tail can never catch up to the head and look "empty").
    pub fn max_size(&self) -> u32 {
        (self.data_sector_count as u32 * layout::DATA_ENTRIES_PER_SECTOR as u32).saturating_sub(1)
    }

    /// The value a caller should treat as "no meaningful bound" on a raw
    /// sample value, per `flash_fifo_get_maxval` in `flashfifo.c`.
    pub fn max_value(&self) -> u32 {
        0xffff_ffff
    }

    /// Looks up `name` in the dictionary, installing a new slot if absent.
    /// Returns `Err` if the 15-byte name limit is exceeded, or clears the
    /// whole FIFO and starts over if the dictionary is full.
    pub fn dictionary_index(&mut self, name: &str) -> io::Result<u8> {
        if name.len() > 15 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "dictionary name exceeds 15 bytes"));
        }

        for idx in 0..layout::DICT_ENTRIES_PER_SECTOR {
            let mut entry = [0u8; layout::DICT_ENTRY_SIZE];
            self.flash.read(layout::SECTOR_DICTIONARY, idx * layout::DICT_ENTRY_SIZE, &mut entry)?;
            if entry[layout::DICT_ENTRY_SIZE - 1] != 0 {
                // Unwritten slot: dictionary exhausted here.
                return self.install_dictionary_entry(idx, name);
            }
            let valid_len = entry.iter().position(|&b| b == 0).unwrap_or(layout::DICT_ENTRY_SIZE);
            if &entry[..valid_len] == name.as_bytes() {
                return Ok(idx as u8);
            }
        }

        // Dictionary sector full of distinct entries: clear and retry.
        self.clear()?;
        self.install_dictionary_entry(0, name)
    }

    fn install_dictionary_entry(&mut self, idx: usize, name: &str) -> io::Result<u8> {
        let mut entry = [0u8; layout::DICT_ENTRY_SIZE];
        entry[..name.len()].copy_from_slice(name.as_bytes());
        self.flash.write(layout::SECTOR_DICTIONARY, idx * layout::DICT_ENTRY_SIZE, &entry)?;
        Ok(idx as u8)
    }

    fn clear(&mut self) -> io::Result<()> {
        self.prepare()
    }

    /// Appends one sample. `source_id` becomes (or reuses) a dictionary
    /// entry whose index is packed into the record.
    pub fn store(&mut self, sample: &Sample, source_id: &str) -> io::Result<()> {
        let dict_index = self.dictionary_index(source_id)?;
        let word = pack_word(sample.decimals, sample.duration, dict_index);

        let tail = self.tail_slot()?;
        let mut record = [0u8; layout::SAMPLE_ENTRY_SIZE];
        LittleEndian::write_u32(&mut record[0..4], sample.timestamp);
        LittleEndian::write_u32(&mut record[4..8], sample.value.0 as u32);
        LittleEndian::write_u32(&mut record[8..12], word);
        LittleEndian::write_u32(&mut record[12..16], u32::from_le_bytes(*sample.tag.as_bytes()));

        let entry_offset = layout::DATA_ENTRIES_OFFSET + tail.entry_index * layout::SAMPLE_ENTRY_SIZE;
        self.flash.write(layout::FIRST_DATA_SECTOR + tail.sector_index, entry_offset, &record)?;

        counter::increment(
            &mut self.flash,
            layout::FIRST_DATA_SECTOR + tail.sector_index,
            layout::DATA_TAIL_COUNTER_OFFSET,
            tail.entry_index as u32,
        )?;

        if tail.entry_index + 1 == layout::DATA_ENTRIES_PER_SECTOR {
            self.advance_tail_sector()?;
        }
        self.flash.flush_cache()
    }

    fn advance_tail_sector(&mut self) -> io::Result<()> {
        let current = self.tail_sector_counter()?;
        let next = (current + 1) % self.data_sector_count as u32;

        // If the next sector is the current head sector, the head loses
        // one sector's worth of entries: advance it first.
        let head = self.head_sector_counter()?;
        if self.data_sector_count > 1 && next == head {
            self.advance_head_sector()?;
        }

        self.flash.erase_sector(layout::FIRST_DATA_SECTOR + self.sector_for(next))?;

        if next == 0 {
            self.flash.erase_sector(layout::SECTOR_TAIL_COUNTER)?;
        } else {
            counter::increment(&mut self.flash, layout::SECTOR_TAIL_COUNTER, 0, current)?;
        }
        Ok(())
    }

    fn advance_head_sector(&mut self) -> io::Result<()> {
        let current = self.head_sector_counter()?;
        let next = (current + 1) % self.data_sector_count as u32;
        if next == 0 {
            self.flash.erase_sector(layout::SECTOR_HEAD_COUNTER)?;
        } else {
            counter::increment(&mut self.flash, layout::SECTOR_HEAD_COUNTER, 0, current)?;
        }
        Ok(())
    }

    /// Returns the sample `offset` positions after the head, or `None`
    /// when `offset >= count()`.
    pub fn peek(&self, offset: u32) -> io::Result<Option<Sample>> {
        if offset >= self.count()? {
            return Ok(None);
        }

        let entries_per_sector = layout::DATA_ENTRIES_PER_SECTOR as u32;
        let head = self.head_sector_counter()?;
        let head_entry = self.in_sector_counter(self.sector_for(head), layout::DATA_HEAD_COUNTER_OFFSET)?;
        let absolute = head as u64 * entries_per_sector as u64 + head_entry as u64 + offset as u64;

        let sector = (absolute / entries_per_sector as u64) as usize % self.data_sector_count;
        let entry_index = (absolute % entries_per_sector as u64) as usize;

        let mut record = [0u8; layout::SAMPLE_ENTRY_SIZE];
        let entry_offset = layout::DATA_ENTRIES_OFFSET + entry_index * layout::SAMPLE_ENTRY_SIZE;
        self.flash.read(layout::FIRST_DATA_SECTOR + sector, entry_offset, &mut record)?;

        let timestamp = LittleEndian::read_u32(&record[0..4]);
        let value = LittleEndian::read_u32(&record[4..8]) as i32;
        let word = LittleEndian::read_u32(&record[8..12]);
        let tag_bytes = LittleEndian::read_u32(&record[12..16]).to_le_bytes();
        let (decimals, duration, dict_index) = unpack_word(word);
        let source_id = self.dictionary_name(dict_index)?;

        Ok(Some(Sample {
            timestamp,
            value: crate::sample::Value(value),
            decimals,
            duration,
            tag: crate::sample::Tag::new(strip_trailing_zeros(&tag_bytes)),
            source_id,
        }))
    }

    fn dictionary_name(&self, index: u8) -> io::Result<Option<String>> {
        let mut entry = [0u8; layout::DICT_ENTRY_SIZE];
        self.flash.read(layout::SECTOR_DICTIONARY, index as usize * layout::DICT_ENTRY_SIZE, &mut entry)?;
        let valid_len = entry.iter().position(|&b| b == 0).unwrap_or(layout::DICT_ENTRY_SIZE);
        if valid_len == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&entry[..valid_len]).into_owned()))
    }

    /// Peeks the head sample and drops it in one call.
    pub fn pop(&mut self) -> io::Result<Option<Sample>> {
        let sample = self.peek(0)?;
        if sample.is_some() {
            self.drop_n(1)?;
        }
        Ok(sample)
    }

    /// Advances the head marker past `n` entries.
    pub fn drop_n(&mut self, n: u32) -> io::Result<()> {
        for _ in 0..n {
            let head_sector_counter = self.head_sector_counter()?;
            let sector = self.sector_for(head_sector_counter);
            let entry_index = self.in_sector_counter(sector, layout::DATA_HEAD_COUNTER_OFFSET)?;

            counter::increment(
                &mut self.flash,
                layout::FIRST_DATA_SECTOR + sector,
                layout::DATA_HEAD_COUNTER_OFFSET,
                entry_index,
            )?;

            if entry_index as usize + 1 == layout::DATA_ENTRIES_PER_SECTOR {
                self.advance_head_sector()?;
            }
        }
        self.flash.flush_cache()
    }
}

fn strip_trailing_zeros(bytes: &[u8; 4]) -> &[u8] {
    let len = bytes.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
    &bytes[..len]
}
