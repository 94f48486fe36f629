//! anvil-lookup: block, biome and height lookups over Minecraft Anvil
//! region files (.mca), with a per-region journal for detecting chunks that
//! changed since they were last processed.
//!
//! Layers, bottom up:
//! - [`bytes`]: bounds-checked big-endian reads and decompression
//! - [`nbt`]: pull parser and owned tag tree
//! - [`chunk`]: lazy chunk decoder
//! - [`region`]: region container and dirty-chunk journal

pub mod bytes;
pub mod chunk;
pub mod error;
pub mod nbt;
pub mod region;

#[cfg(test)]
mod fixtures;

pub use chunk::{AIR, Chunk};
pub use error::{Error, Result};
pub use region::{ChunkStatus, Journal, Region, RegionBand, RegionPos};
