//! Dirty-chunk journal.
//!
//! One `u64` per chunk slot of a region, in `z * 32 + x` order, holding the
//! `LastUpdate` tick seen the last time that chunk was processed. The file is
//! exactly 1024 host-endian integers and lives next to other journals as
//! `<journal dir>/<region file name>.journal`.

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, NativeEndian};

use crate::error::Result;

use super::CHUNKS_PER_REGION;

/// Size of a journal file in bytes.
pub const JOURNAL_BYTES: usize = CHUNKS_PER_REGION * 8;

#[derive(Debug)]
pub struct Journal {
    path: Option<PathBuf>,
    entries: Vec<u64>,
    /// Entries as last loaded from or written to disk.
    saved: Vec<u64>,
}

impl Journal {
    /// A journal that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: vec![0; CHUNKS_PER_REGION],
            saved: vec![0; CHUNKS_PER_REGION],
        }
    }

    /// Journal path for `region_path` inside `journal_dir`.
    pub fn path_for(region_path: &Path, journal_dir: &Path) -> PathBuf {
        let mut name = region_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".journal");
        journal_dir.join(name)
    }

    /// Load the journal at `path`, creating a zero-filled one if it does not
    /// exist. A file of the wrong size is reset to zeros.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut journal = Self {
            path: Some(path.clone()),
            entries: vec![0; CHUNKS_PER_REGION],
            saved: vec![0; CHUNKS_PER_REGION],
        };

        match fs::read(&path) {
            Ok(bytes) if bytes.len() == JOURNAL_BYTES => {
                NativeEndian::read_u64_into(&bytes, &mut journal.entries);
                journal.saved.copy_from_slice(&journal.entries);
                log::info!("Journal: loaded {}", path.display());
            }
            Ok(bytes) => {
                log::warn!(
                    "Journal: {} has {} bytes, expected {}; resetting",
                    path.display(),
                    bytes.len(),
                    JOURNAL_BYTES
                );
                journal.write()?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir)?;
                }
                log::info!("Journal: creating {}", path.display());
                journal.write()?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(journal)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[inline]
    pub fn get(&self, index: usize) -> u64 {
        self.entries[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: u64) {
        self.entries[index] = value;
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [u64] {
        &mut self.entries
    }

    /// Whether any entry differs from the copy on disk.
    pub fn is_modified(&self) -> bool {
        self.entries != self.saved
    }

    /// Write the entries back if anything changed.
    pub fn flush(&mut self) -> Result<()> {
        if !self.is_modified() {
            return Ok(());
        }
        self.write()?;
        self.saved.copy_from_slice(&self.entries);
        Ok(())
    }

    fn write(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut bytes = vec![0u8; JOURNAL_BYTES];
        NativeEndian::write_u64_into(&self.entries, &mut bytes);
        fs::write(path, bytes)?;
        log::debug!("Journal: wrote {}", path.display());
        Ok(())
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Journal: flush on drop failed: {}", e);
        }
    }
}
