//! Flash partition layout (`spec.md` §6, `flashfifo.c`'s header comment
//! block): a fixed-role sector prefix followed by a ring of data sectors.

use byteorder::{ByteOrder, LittleEndian};
use std::io;

use super::flash::{Flash, SECTOR_SIZE};

pub const MAGIC: u32 = 0x6469_5573;
pub const DICT_ENTRY_SIZE: usize = 16;
pub const SAMPLE_ENTRY_SIZE: usize = 16;
pub const DICT_ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DICT_ENTRY_SIZE; // 256

/// Byte offset of the in-sector head counter within a data sector.
pub const DATA_HEAD_COUNTER_OFFSET: usize = 0;
/// Byte offset of the in-sector tail counter within a data sector.
pub const DATA_TAIL_COUNTER_OFFSET: usize = 32;
/// Byte offset where sample entries begin within a data sector.
pub const DATA_ENTRIES_OFFSET: usize = 64;
pub const DATA_ENTRIES_PER_SECTOR: usize = (SECTOR_SIZE - DATA_ENTRIES_OFFSET) / SAMPLE_ENTRY_SIZE; // 252

pub const SECTOR_HEADER: usize = 0;
pub const SECTOR_HEAD_COUNTER: usize = 1;
pub const SECTOR_TAIL_COUNTER: usize = 2;
pub const SECTOR_DICTIONARY: usize = 3;
pub const FIRST_DATA_SECTOR: usize = 4;

const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4;

/// On-flash FIFO header, persisted in sector 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub sector_size: u32,
    pub head_counter_sector: u32,
    pub tail_counter_sector: u32,
    pub dictionary_sector: u32,
    pub first_data_sector: u32,
    pub tail_counter_offset: u32,
    pub data_offset: u32,
    pub data_entries_per_sector: u32,
    pub counter_sector_count: u32,
    pub data_sector_count: u32,
}

impl Header {
    pub fn new(data_sector_count: u32) -> Header {
        Header {
            magic: MAGIC,
            sector_size: SECTOR_SIZE as u32,
            head_counter_sector: SECTOR_HEAD_COUNTER as u32,
            tail_counter_sector: SECTOR_TAIL_COUNTER as u32,
            dictionary_sector: SECTOR_DICTIONARY as u32,
            first_data_sector: FIRST_DATA_SECTOR as u32,
            tail_counter_offset: DATA_TAIL_COUNTER_OFFSET as u32,
            data_offset: DATA_ENTRIES_OFFSET as u32,
            data_entries_per_sector: DATA_ENTRIES_PER_SECTOR as u32,
            counter_sector_count: 2,
            data_sector_count,
        }
    }

    pub fn write(&self, flash: &mut dyn Flash) -> io::Result<()> {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        LittleEndian::write_u32(&mut buf[4..8], self.sector_size);
        LittleEndian::write_u32(&mut buf[8..12], self.head_counter_sector);
        LittleEndian::write_u32(&mut buf[12..16], self.tail_counter_sector);
        LittleEndian::write_u32(&mut buf[16..20], self.dictionary_sector);
        LittleEndian::write_u32(&mut buf[20..24], self.first_data_sector);
        LittleEndian::write_u32(&mut buf[24..28], self.tail_counter_offset);
        LittleEndian::write_u32(&mut buf[28..32], self.data_offset);
        LittleEndian::write_u32(&mut buf[32..36], self.data_entries_per_sector);
        LittleEndian::write_u32(&mut buf[36..40], self.counter_sector_count);
        LittleEndian::write_u32(&mut buf[40..44], self.data_sector_count);
        flash.write(SECTOR_HEADER, 0, &buf)
    }

    pub fn read(flash: &dyn Flash) -> io::Result<Header> {
        let mut buf = [0u8; HEADER_LEN];
        flash.read(SECTOR_HEADER, 0, &mut buf)?;
        Ok(Header {
            magic: LittleEndian::read_u32(&buf[0..4]),
            sector_size: LittleEndian::read_u32(&buf[4..8]),
            head_counter_sector: LittleEndian::read_u32(&buf[8..12]),
            tail_counter_sector: LittleEndian::read_u32(&buf[12..16]),
            dictionary_sector: LittleEndian::read_u32(&buf[16..20]),
            first_data_sector: LittleEndian::read_u32(&buf[20..24]),
            tail_counter_offset: LittleEndian::read_u32(&buf[24..28]),
            data_offset: LittleEndian::read_u32(&buf[28..32]),
            data_entries_per_sector: LittleEndian::read_u32(&buf[32..36]),
            counter_sector_count: LittleEndian::read_u32(&buf[36..40]),
            data_sector_count: LittleEndian::read_u32(&buf[40..44]),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::flash::MemoryFlash;

    #[test]
    fn header_round_trips_through_flash() {
        let mut flash = MemoryFlash::new(8);
        let header = Header::new(4);
        header.write(&mut flash).unwrap();
        let read_back = Header::read(&flash).unwrap();
        assert_eq!(header, read_back);
        assert!(read_back.is_valid());
    }

    #[test]
    fn fresh_erased_header_is_invalid() {
        let flash = MemoryFlash::new(8);
        let header = Header::read(&flash).unwrap();
        assert!(!header.is_valid());
    }
}
