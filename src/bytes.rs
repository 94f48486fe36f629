//! Byte-order and decompression helpers.
//!
//! Everything on disk is big-endian. `Reader` checks bounds before every
//! read, so a truncated or lying length field turns into
//! [`Error::BufferExhausted`] instead of a panic.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder};
use flate2::read::{GzDecoder, ZlibDecoder};

use crate::error::{Error, Result};

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Forward-only cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start reading at `pos`. Nothing is checked until the first read.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Fails without moving if `needed` bytes are not available.
    #[inline]
    pub fn ensure(&self, needed: usize) -> Result<()> {
        match self.pos.checked_add(needed) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(Error::BufferExhausted {
                offset: self.pos,
                needed,
                len: self.data.len(),
            }),
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.read_bytes(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.read_bytes(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.read_bytes(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.read_bytes(8)?))
    }

    /// NBT string: `u16` length followed by that many bytes.
    ///
    /// Names and values are nominally modified UTF-8; anything that does not
    /// decode is replaced rather than rejected.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Inflate a complete zlib stream.
pub fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(Error::Decompress)?;
    Ok(decompressed)
}

/// Inflate a gzip stream.
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(Error::Decompress)?;
    Ok(decompressed)
}

/// Standalone NBT files (`level.dat`, player data) are usually gzipped.
/// Inflate when the magic bytes say so, otherwise hand the bytes back as-is.
pub fn maybe_gunzip(data: Vec<u8>) -> Result<Vec<u8>> {
    if data.starts_with(&GZIP_MAGIC) {
        gzip_decompress(&data)
    } else {
        Ok(data)
    }
}
