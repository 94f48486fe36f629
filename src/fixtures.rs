//! Test fixtures.
//!
//! Chunk documents are serde structs written with fastnbt, in the legacy
//! (pre-1.18) layout the decoder reads. `RegionBuilder` wraps them into an
//! in-memory `.mca` image.

use std::collections::HashMap;
use std::io::Write;

use fastnbt::{ByteArray, IntArray, LongArray};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use serde::Serialize;

use crate::chunk::block_states::{BLOCKS_PER_SECTION, PackingScheme, bits_per_block, block_index};
use crate::region::{Location, SECTOR_SIZE, chunk_to_local, local_to_index};

/// Root of a chunk document. `Level` is written before `DataVersion`, so the
/// decoder has to pick the version up after the sections.
#[derive(Debug, Serialize)]
pub struct ChunkData {
    #[serde(rename = "Level")]
    pub level: Level,

    #[serde(rename = "DataVersion", skip_serializing_if = "Option::is_none")]
    pub data_version: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct Level {
    #[serde(rename = "xPos")]
    pub x_pos: i32,
    #[serde(rename = "zPos")]
    pub z_pos: i32,

    #[serde(rename = "LastUpdate", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,

    // Never read by the decoder; has to be skipped.
    #[serde(rename = "Entities")]
    pub entities: Vec<Entity>,

    #[serde(rename = "Biomes", skip_serializing_if = "Option::is_none")]
    pub biomes: Option<BiomeData>,

    #[serde(rename = "Sections")]
    pub sections: Vec<Section>,
}

#[derive(Debug, Serialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "Pos")]
    pub pos: Vec<f64>,
    #[serde(rename = "Tags")]
    pub tags: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BiomeData {
    Ints(IntArray),
    Bytes(ByteArray),
}

// --- Section (16x16x16 Cube) ---
#[derive(Debug, Serialize)]
pub struct Section {
    #[serde(rename = "Y")]
    pub y: i8,

    #[serde(rename = "BlockLight", skip_serializing_if = "Option::is_none")]
    pub block_light: Option<ByteArray>,

    #[serde(rename = "Palette", skip_serializing_if = "Vec::is_empty")]
    pub palette: Vec<BlockState>,

    #[serde(rename = "BlockStates", skip_serializing_if = "Option::is_none")]
    pub block_states: Option<LongArray>,
}

#[derive(Debug, Serialize)]
pub struct BlockState {
    #[serde(rename = "Properties", skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,

    #[serde(rename = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChunkData {
    pub fn new(data_version: Option<i32>, last_update: i64) -> Self {
        Self {
            level: Level {
                x_pos: 0,
                z_pos: 0,
                last_update: Some(last_update),
                entities: vec![Entity {
                    id: "minecraft:cow".into(),
                    pos: vec![1.5, 64.0, -3.25],
                    tags: vec![vec!["a".into()], vec![]],
                }],
                biomes: None,
                sections: Vec::new(),
            },
            data_version,
        }
    }

    /// Add a section whose blocks are all palette index 0 except `blocks`,
    /// given as `(x, y_in_section, z, palette_index)`.
    pub fn section(
        mut self,
        y: i8,
        palette: &[&str],
        blocks: &[(usize, usize, usize, u64)],
    ) -> Self {
        let mut indices = vec![0u64; BLOCKS_PER_SECTION];
        for &(x, y_in_section, z, index) in blocks {
            indices[block_index(x, y_in_section, z)] = index;
        }
        let scheme = PackingScheme::for_data_version(self.data_version);
        let words = pack(&indices, bits_per_block(palette.len()), scheme);

        let mut properties = HashMap::new();
        properties.insert("snowy".to_string(), "false".to_string());

        self.level.sections.push(Section {
            y,
            block_light: Some(ByteArray::new(vec![0; 2048])),
            palette: palette
                .iter()
                .map(|name| BlockState {
                    properties: Some(properties.clone()),
                    name: Some(name.to_string()),
                })
                .collect(),
            block_states: Some(LongArray::new(words)),
        });
        self
    }

    pub fn biomes(mut self, biomes: BiomeData) -> Self {
        self.level.biomes = Some(biomes);
        self
    }

    pub fn to_nbt(&self) -> Vec<u8> {
        fastnbt::to_bytes(self).expect("fixture serializes")
    }
}

/// Inverse of `palette_index`.
pub fn pack(indices: &[u64], bits: u32, scheme: PackingScheme) -> Vec<i64> {
    let bits = bits as usize;
    let words = match scheme {
        PackingScheme::Stretched => {
            let mut words = vec![0u64; (indices.len() * bits).div_ceil(64)];
            for (i, &value) in indices.iter().enumerate() {
                let bit = i * bits;
                let (word, shift) = (bit / 64, bit % 64);
                words[word] |= value << shift;
                if shift + bits > 64 {
                    words[word + 1] |= value >> (64 - shift);
                }
            }
            words
        }
        PackingScheme::Aligned => {
            let per_word = 64 / bits;
            let mut words = vec![0u64; indices.len().div_ceil(per_word)];
            for (i, &value) in indices.iter().enumerate() {
                words[i / per_word] |= value << ((i % per_word) * bits);
            }
            words
        }
    };
    words.into_iter().map(|w| w as i64).collect()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory write")
}

/// Builds a region image one chunk at a time, each in its own sectors.
pub struct RegionBuilder {
    data: Vec<u8>,
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; SECTOR_SIZE * 2],
        }
    }

    /// Zlib chunk.
    pub fn chunk(self, chunk_x: i32, chunk_z: i32, nbt: &[u8]) -> Self {
        self.raw(chunk_x, chunk_z, 2, &zlib(nbt))
    }

    /// Arbitrary compression byte and payload.
    pub fn raw(mut self, chunk_x: i32, chunk_z: i32, compression: u8, payload: &[u8]) -> Self {
        let sector = self.data.len() / SECTOR_SIZE;
        let length = payload.len() as u32 + 1;
        self.data.extend_from_slice(&length.to_be_bytes());
        self.data.push(compression);
        self.data.extend_from_slice(payload);
        let padded = self.data.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        self.data.resize(padded, 0);

        let sectors = padded / SECTOR_SIZE - sector;
        self.location(chunk_x, chunk_z, Location::new(sector as u32, sectors as u8))
    }

    /// Overwrite a header entry without writing a payload.
    pub fn location(mut self, chunk_x: i32, chunk_z: i32, location: Location) -> Self {
        let index = local_to_index(chunk_to_local(chunk_x), chunk_to_local(chunk_z));
        self.data[index * 4..index * 4 + 4].copy_from_slice(&location.encode());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
