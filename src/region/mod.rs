//! Minecraft Anvil region file format (.mca).
//!
//! Region files contain 32x32 chunks in a specific binary format:
//! - Bytes 0-4095: Location table (1024 entries × 4 bytes)
//! - Bytes 4096-8191: Timestamp table (1024 entries × 4 bytes)
//! - Bytes 8192+: Chunk data (variable size sectors)
//!
//! Each chunk payload starts with a big-endian `u32` length, then one
//! compression byte, then `length - 1` bytes of compressed NBT.

mod header;
mod journal;

pub use header::{Header, Location};
pub use journal::{JOURNAL_BYTES, Journal};

use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::bytes::{Reader, zlib_decompress};
use crate::chunk::Chunk;
use crate::error::{Error, Result};

/// Size of one sector in bytes (4 KB).
pub const SECTOR_SIZE: usize = 4096;

/// Total header size (location table + timestamp table).
pub const HEADER_SIZE: usize = SECTOR_SIZE * 2; // 8192 bytes

/// Number of chunks per region dimension.
pub const REGION_SIZE: i32 = 32;

pub const CHUNKS_PER_REGION: usize = (REGION_SIZE * REGION_SIZE) as usize;

/// Chunk rows per band handed out by [`Region::bands_mut`].
pub const BAND_ROWS: i32 = 8;

const COMPRESSION_ZLIB: u8 = 2;

/// Convert chunk coordinates to local region coordinates (0-31).
#[inline]
pub fn chunk_to_local(chunk_coord: i32) -> i32 {
    chunk_coord.rem_euclid(REGION_SIZE)
}

/// Calculate linear index for a chunk within a region (0-1023).
#[inline]
pub fn local_to_index(local_x: i32, local_z: i32) -> usize {
    (local_z * REGION_SIZE + local_x) as usize
}

/// Calculate local coordinates from linear index.
#[inline]
pub fn index_to_local(index: usize) -> (i32, i32) {
    let local_x = (index % REGION_SIZE as usize) as i32;
    let local_z = (index / REGION_SIZE as usize) as i32;
    (local_x, local_z)
}

/// Calculate file offset for a chunk given its sector number.
#[inline]
pub fn sector_to_offset(sector: u32) -> usize {
    sector as usize * SECTOR_SIZE
}

/// Region file coordinates (parsed from filename like "r.0.-1.mca").
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Parse region position from filename (e.g., "r.0.-1.mca").
    pub fn from_filename(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() == 4 && parts[0] == "r" && parts[3] == "mca" {
            let x = parts[1].parse().ok()?;
            let z = parts[2].parse().ok()?;
            Some(Self { x, z })
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        Self::from_filename(path.file_name()?.to_str()?)
    }

    /// Convert local chunk coordinates to world chunk coordinates.
    pub fn local_to_world(&self, local_x: i32, local_z: i32) -> (i32, i32) {
        (
            self.x * REGION_SIZE + local_x,
            self.z * REGION_SIZE + local_z,
        )
    }
}

impl fmt::Display for RegionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}.mca", self.x, self.z)
    }
}

/// Result of a dirty check.
#[derive(Debug)]
pub enum ChunkStatus {
    /// No chunk in this slot.
    Absent,
    /// The journal already holds this chunk's `LastUpdate` or a later one.
    Unchanged,
    /// New or modified since the journal entry was written; the entry has
    /// been updated.
    Dirty(Chunk),
}

/// One region file held in memory, with an optional journal.
pub struct Region {
    data: Vec<u8>,
    pos: Option<RegionPos>,
    journal: Option<Journal>,
}

impl Region {
    /// Read a region file without a journal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        log::info!("Region: opened {} ({} bytes)", path.display(), data.len());
        Ok(Self {
            data,
            pos: RegionPos::from_path(path),
            journal: None,
        })
    }

    /// Read a region file and load (or create) its journal in `journal_dir`.
    pub fn open_with_journal(
        path: impl AsRef<Path>,
        journal_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let region = Self::open(path)?;
        let journal = Journal::open(Journal::path_for(path, journal_dir.as_ref()))?;
        Ok(region.with_journal(journal))
    }

    /// Wrap bytes already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: None,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Position parsed from the file name, if it follows `r.<x>.<z>.mca`.
    pub fn pos(&self) -> Option<RegionPos> {
        self.pos
    }

    pub fn header(&self) -> Header<'_> {
        Header::new(&self.data)
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    /// Decompressed NBT document of a chunk, or `None` when the slot is
    /// empty or points outside the file. Chunk coordinates may be world
    /// coordinates; only their position inside the region matters.
    pub fn chunk_data(&self, chunk_x: i32, chunk_z: i32) -> Result<Option<Vec<u8>>> {
        read_chunk_data(&self.data, chunk_x, chunk_z)
    }

    /// The chunk at the given coordinates, undecoded until queried.
    pub fn get_chunk(&self, chunk_x: i32, chunk_z: i32) -> Result<Option<Chunk>> {
        Ok(self.chunk_data(chunk_x, chunk_z)?.map(Chunk::new))
    }

    /// Compare the chunk's `LastUpdate` against the journal and record it
    /// when newer. Without a journal every present chunk is dirty.
    pub fn get_chunk_if_dirty(&mut self, chunk_x: i32, chunk_z: i32) -> Result<ChunkStatus> {
        let Some(data) = self.chunk_data(chunk_x, chunk_z)? else {
            return Ok(ChunkStatus::Absent);
        };
        let mut chunk = Chunk::new(data);
        let Some(journal) = self.journal.as_mut() else {
            return Ok(ChunkStatus::Dirty(chunk));
        };

        let index = local_to_index(chunk_to_local(chunk_x), chunk_to_local(chunk_z));
        match newer_tick(journal.get(index), &mut chunk)? {
            Some(tick) => {
                journal.set(index, tick);
                Ok(ChunkStatus::Dirty(chunk))
            }
            None => Ok(ChunkStatus::Unchanged),
        }
    }

    /// Write journal changes to disk. No-op without a journal.
    pub fn flush_journal(&mut self) -> Result<()> {
        match self.journal.as_mut() {
            Some(journal) => journal.flush(),
            None => Ok(()),
        }
    }

    /// Split the region into four bands of 8 chunk rows each. Every band
    /// owns its rows of the journal, so bands can be processed on separate
    /// threads without sharing mutable state.
    pub fn bands_mut(&mut self) -> Vec<RegionBand<'_>> {
        let data = self.data.as_slice();
        let band_len = (BAND_ROWS * REGION_SIZE) as usize;
        let band_count = (REGION_SIZE / BAND_ROWS) as usize;

        match self.journal.as_mut() {
            Some(journal) => journal
                .entries_mut()
                .chunks_mut(band_len)
                .enumerate()
                .map(|(i, rows)| RegionBand::new(data, i as i32 * BAND_ROWS, Some(rows)))
                .collect(),
            None => (0..band_count)
                .map(|i| RegionBand::new(data, i as i32 * BAND_ROWS, None))
                .collect(),
        }
    }
}

/// Rows `z_start..z_start + 8` of a region, borrowed from [`Region::bands_mut`].
pub struct RegionBand<'a> {
    data: &'a [u8],
    z_start: i32,
    journal: Option<&'a mut [u64]>,
}

impl<'a> RegionBand<'a> {
    fn new(data: &'a [u8], z_start: i32, journal: Option<&'a mut [u64]>) -> Self {
        Self {
            data,
            z_start,
            journal,
        }
    }

    /// Local chunk z coordinates covered by this band.
    pub fn z_range(&self) -> Range<i32> {
        self.z_start..self.z_start + BAND_ROWS
    }

    /// Same as [`Region::get_chunk_if_dirty`]. Chunks outside the band are
    /// reported `Absent`.
    pub fn get_chunk_if_dirty(&mut self, chunk_x: i32, chunk_z: i32) -> Result<ChunkStatus> {
        let local_z = chunk_to_local(chunk_z);
        if !self.z_range().contains(&local_z) {
            return Ok(ChunkStatus::Absent);
        }
        let Some(data) = read_chunk_data(self.data, chunk_x, chunk_z)? else {
            return Ok(ChunkStatus::Absent);
        };
        let mut chunk = Chunk::new(data);
        let Some(rows) = self.journal.as_deref_mut() else {
            return Ok(ChunkStatus::Dirty(chunk));
        };

        let index = local_to_index(chunk_to_local(chunk_x), local_z - self.z_start);
        match newer_tick(rows[index], &mut chunk)? {
            Some(tick) => {
                rows[index] = tick;
                Ok(ChunkStatus::Dirty(chunk))
            }
            None => Ok(ChunkStatus::Unchanged),
        }
    }
}

/// The chunk's `LastUpdate` if it is newer than `stored`.
fn newer_tick(stored: u64, chunk: &mut Chunk) -> Result<Option<u64>> {
    let last_update = chunk.last_update()?;
    if stored >= last_update {
        log::debug!("chunk unchanged since tick {}", stored);
        return Ok(None);
    }
    Ok(Some(last_update))
}

fn read_chunk_data(data: &[u8], chunk_x: i32, chunk_z: i32) -> Result<Option<Vec<u8>>> {
    let index = local_to_index(chunk_to_local(chunk_x), chunk_to_local(chunk_z));
    let Some(location) = Header::new(data).location(index) else {
        log::debug!("Region: chunk ({}, {}) absent", chunk_x, chunk_z);
        return Ok(None);
    };

    let offset = location.byte_offset();
    let mut reader = Reader::at(data, offset);
    let (length, compression) = match (reader.read_u32(), reader.read_u8()) {
        (Ok(length), Ok(compression)) if length > 0 => (length as usize, compression),
        _ => {
            log::warn!(
                "Region: chunk ({}, {}) has no valid payload header at offset {}",
                chunk_x,
                chunk_z,
                offset
            );
            return Ok(None);
        }
    };

    let Ok(compressed) = reader.read_bytes(length - 1) else {
        log::warn!(
            "Region: chunk ({}, {}) length {} exceeds the file",
            chunk_x,
            chunk_z,
            length
        );
        return Ok(None);
    };

    // gzip (1) and anything newer are rejected
    match compression {
        COMPRESSION_ZLIB => Ok(Some(zlib_decompress(compressed)?)),
        other => Err(Error::UnsupportedCompression(other)),
    }
}
