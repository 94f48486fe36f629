//! Region file header.
//!
//! The first 4096 bytes hold one 4-byte location per chunk: a 3-byte sector
//! offset followed by a 1-byte sector count, both big-endian. An all-zero
//! entry means the chunk was never written. The second 4096 bytes
//! (timestamps) are not used.

use byteorder::{BigEndian, ByteOrder};

use super::{CHUNKS_PER_REGION, sector_to_offset};

/// Where a chunk lives in the file, in 4 KiB sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: u32,
    pub sectors: u8,
}

impl Location {
    pub fn new(offset: u32, sectors: u8) -> Self {
        Self { offset, sectors }
    }

    /// `None` for an all-zero (absent) entry.
    pub fn parse(entry: [u8; 4]) -> Option<Self> {
        if entry == [0; 4] {
            return None;
        }
        Some(Self {
            offset: BigEndian::read_u24(&entry[..3]),
            sectors: entry[3],
        })
    }

    pub fn encode(self) -> [u8; 4] {
        let mut entry = [0u8; 4];
        BigEndian::write_u24(&mut entry[..3], self.offset & 0x00ff_ffff);
        entry[3] = self.sectors;
        entry
    }

    /// Byte position of the chunk payload.
    #[inline]
    pub fn byte_offset(self) -> usize {
        sector_to_offset(self.offset)
    }
}

/// Location table lookup over the raw file bytes.
pub struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Location of chunk `index` (0..1024). Entries cut off by a short file
    /// read as absent.
    pub fn location(&self, index: usize) -> Option<Location> {
        if index >= CHUNKS_PER_REGION {
            return None;
        }
        let start = index * 4;
        let entry: [u8; 4] = self.data.get(start..start + 4)?.try_into().ok()?;
        Location::parse(entry)
    }

    /// Indices of all chunks with a location entry.
    pub fn present(&self) -> impl Iterator<Item = usize> + '_ {
        (0..CHUNKS_PER_REGION).filter(move |&i| self.location(i).is_some())
    }
}
