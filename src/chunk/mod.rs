//! Lazy chunk decoder.
//!
//! A `Chunk` owns the decompressed NBT document of one chunk and walks it
//! with a [`PullParser`] only as far as the current query needs. Fields are
//! recorded in a bitmask as they are met; the cursor never moves back, so a
//! field passed on the way to another one is captured right away.
//!
//! Fields read:
//! - `DataVersion` (root)
//! - `Level/Sections`, `Level/LastUpdate`, `Level/Biomes`
//!
//! Everything else is skipped without being decoded.

pub mod block_states;

use std::fmt;

use crate::error::{Error, Result};
use crate::nbt::{Event, PullParser, TagType};

use block_states::{PackingScheme, bits_per_block, block_index, palette_index};

/// Returned for every position without a mapped block.
pub const AIR: &str = "minecraft:air";

/// Vertical sections in a pre-1.18 chunk.
pub const SECTION_COUNT: usize = 16;

const FIELD_SECTIONS: u8 = 1;
const FIELD_LAST_UPDATE: u8 = 1 << 1;
const FIELD_BIOMES: u8 = 1 << 2;
const FIELD_DATA_VERSION: u8 = 1 << 3;

enum Visit {
    Descend,
    Level,
    Field(u8),
    Skip,
}

fn classify(path: &[String], tag_type: Option<TagType>) -> Visit {
    let is_compound = tag_type == Some(TagType::Compound);
    match path {
        [_root] if is_compound => Visit::Descend,
        [_, level] if level == "Level" && is_compound => Visit::Level,
        [_, name] if name == "DataVersion" => Visit::Field(FIELD_DATA_VERSION),
        [_, level, name] if level == "Level" => match name.as_str() {
            "Sections" => Visit::Field(FIELD_SECTIONS),
            "LastUpdate" => Visit::Field(FIELD_LAST_UPDATE),
            "Biomes" => Visit::Field(FIELD_BIOMES),
            _ => Visit::Skip,
        },
        _ => Visit::Skip,
    }
}

pub struct Chunk {
    parser: PullParser<Vec<u8>>,
    /// Names of the open tags down to the current one.
    path: Vec<String>,
    loaded: u8,
    finished: bool,
    seen_level: bool,

    palettes: [Vec<String>; SECTION_COUNT],
    block_states: [Vec<u64>; SECTION_COUNT],
    biomes: Vec<i32>,
    last_update: u64,
    data_version: Option<i32>,
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("loaded", &format_args!("{:#06b}", self.loaded))
            .field("finished", &self.finished)
            .field("last_update", &self.last_update)
            .field("data_version", &self.data_version)
            .finish_non_exhaustive()
    }
}

impl Chunk {
    /// Wrap a decompressed chunk document. Nothing is parsed yet.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            parser: PullParser::new(data),
            path: Vec::with_capacity(4),
            loaded: 0,
            finished: false,
            seen_level: false,
            palettes: Default::default(),
            block_states: Default::default(),
            biomes: Vec::new(),
            last_update: 0,
            data_version: None,
        }
    }

    /// `Level/LastUpdate`, in game ticks.
    pub fn last_update(&mut self) -> Result<u64> {
        self.require(FIELD_LAST_UPDATE, "LastUpdate")?;
        Ok(self.last_update)
    }

    /// `None` when the chunk carries no `DataVersion`.
    pub fn data_version(&mut self) -> Result<Option<i32>> {
        self.ensure(FIELD_DATA_VERSION)?;
        Ok(self.data_version)
    }

    /// Block names of section `y`, or `None` for missing or empty sections.
    pub fn palette(&mut self, y: usize) -> Result<Option<&[String]>> {
        if y >= SECTION_COUNT {
            return Ok(None);
        }
        self.require(FIELD_SECTIONS, "Sections")?;
        let palette = &self.palettes[y];
        Ok((!palette.is_empty()).then_some(palette.as_slice()))
    }

    /// Raw biome array, empty if the chunk has none.
    pub fn biomes(&mut self) -> Result<&[i32]> {
        self.ensure(FIELD_BIOMES)?;
        Ok(&self.biomes)
    }

    /// Block name at chunk-local `x`, `z` in `0..16` and `y` in `0..256`.
    ///
    /// Positions outside the chunk, missing sections and unmapped palette
    /// indices all read as [`AIR`]. Palette index 0 is treated as air even
    /// when the palette names something else there.
    pub fn get_block(&mut self, x: i32, y: i32, z: i32) -> Result<&str> {
        if !(0..16).contains(&x) || !(0..256).contains(&y) || !(0..16).contains(&z) {
            return Ok(AIR);
        }
        self.require(FIELD_SECTIONS, "Sections")?;
        self.ensure(FIELD_DATA_VERSION)?;

        let section = (y / 16) as usize;
        let palette = &self.palettes[section];
        if palette.is_empty() {
            return Ok(AIR);
        }

        let bits = bits_per_block(palette.len());
        let index = block_index(x as usize, (y % 16) as usize, z as usize);
        let scheme = PackingScheme::for_data_version(self.data_version);

        match palette_index(&self.block_states[section], index, bits, scheme) {
            Some(id) if id > 0 && (id as usize) < palette.len() => {
                Ok(palette[id as usize].as_str())
            }
            _ => Ok(AIR),
        }
    }

    /// Biome id at chunk-local coordinates. Chunks store either one id per
    /// 2x2 column (256 entries) or one per 4x4x4 cell (1024 entries); any
    /// other shape reads as biome 0.
    pub fn get_biome(&mut self, x: i32, y: i32, z: i32) -> Result<i32> {
        self.ensure(FIELD_BIOMES)?;
        if !(0..16).contains(&x) || !(0..256).contains(&y) || !(0..16).contains(&z) {
            return Ok(0);
        }

        let index = match self.biomes.len() {
            256 => (z / 2) * 16 + (x / 2),
            1024 => (y / 64) * 256 + (z / 4) * 4 + (x / 4),
            _ => return Ok(0),
        };
        Ok(self.biomes.get(index as usize).copied().unwrap_or(0))
    }

    /// Top block y of the highest section that has a palette, or 0.
    pub fn get_max_height(&mut self) -> Result<i32> {
        self.require(FIELD_SECTIONS, "Sections")?;
        Ok(self
            .palettes
            .iter()
            .rposition(|palette| !palette.is_empty())
            .map_or(0, |y| (y as i32 + 1) * 16 - 1))
    }

    /// Parse forward until `field` is loaded or the document ends.
    /// Returns whether the field exists.
    fn ensure(&mut self, field: u8) -> Result<bool> {
        if self.loaded & field == 0 && !self.finished {
            self.parse_until(field)?;
        }
        Ok(self.loaded & field != 0)
    }

    fn require(&mut self, field: u8, name: &'static str) -> Result<()> {
        if self.ensure(field)? {
            return Ok(());
        }
        if self.seen_level {
            Err(Error::MissingField(name))
        } else {
            Err(Error::MissingField("Level"))
        }
    }

    fn parse_until(&mut self, field: u8) -> Result<()> {
        while self.loaded & field == 0 {
            match self.parser.next()? {
                Event::DocumentStart | Event::Data => {}
                Event::DocumentEnd => {
                    self.finished = true;
                    break;
                }
                Event::TagEnd => {
                    self.path.pop();
                }
                Event::TagStart => {
                    let name = self.parser.tag_name().unwrap_or_default().to_string();
                    self.path.push(name);
                    self.visit()?;
                }
            }
        }
        Ok(())
    }

    /// Called on every `TagStart` the walk reaches. Descends into the root
    /// and `Level`, reads known fields, skips the rest.
    fn visit(&mut self) -> Result<()> {
        let field = match classify(&self.path, self.parser.tag_type()) {
            Visit::Descend => return Ok(()),
            Visit::Level => {
                self.seen_level = true;
                return Ok(());
            }
            Visit::Skip => {
                log::trace!("skipping {}", self.path.join("/"));
                self.parser.skip()?;
                self.path.pop();
                return Ok(());
            }
            Visit::Field(field) => field,
        };

        match field {
            FIELD_DATA_VERSION => self.data_version = Some(self.read_int()?),
            FIELD_LAST_UPDATE => self.last_update = self.read_long()?.max(0) as u64,
            FIELD_BIOMES => self.read_biomes()?,
            _ => self.read_sections()?,
        }
        // the reader stopped on the field's TagEnd
        self.path.pop();
        self.loaded |= field;
        Ok(())
    }

    fn expect_type(&self, expected: TagType) -> Result<()> {
        match self.parser.tag_type() {
            Some(found) if found == expected => Ok(()),
            found => Err(Error::TypeMismatch {
                expected,
                found: found.unwrap_or(TagType::End),
            }),
        }
    }

    /// Positioned on `TagStart` of an Int; leaves the parser on its `TagEnd`.
    fn read_int(&mut self) -> Result<i32> {
        self.expect_type(TagType::Int)?;
        self.parser.next()?;
        let value = self.parser.get_int()?;
        self.parser.next()?;
        Ok(value)
    }

    fn read_long(&mut self) -> Result<i64> {
        self.expect_type(TagType::Long)?;
        self.parser.next()?;
        let value = self.parser.get_long()?;
        self.parser.next()?;
        Ok(value)
    }

    fn read_biomes(&mut self) -> Result<()> {
        let mut biomes = Vec::with_capacity(1024);
        match self.parser.tag_type() {
            Some(TagType::IntArray) => {
                while self.parser.next()? == Event::Data {
                    biomes.push(self.parser.get_int()?);
                }
            }
            // pre-1.13 worlds store one unsigned byte per column
            Some(TagType::ByteArray) => {
                while self.parser.next()? == Event::Data {
                    biomes.push(self.parser.get_byte()? as u8 as i32);
                }
            }
            _ => self.expect_type(TagType::IntArray)?,
        }
        self.biomes = biomes;
        Ok(())
    }

    /// Positioned on `TagStart` of `Sections`.
    fn read_sections(&mut self) -> Result<()> {
        self.expect_type(TagType::List)?;
        match self.parser.list_element_type() {
            Some(TagType::Compound) | Some(TagType::End) => {}
            found => {
                return Err(Error::TypeMismatch {
                    expected: TagType::Compound,
                    found: found.unwrap_or(TagType::End),
                });
            }
        }

        loop {
            match self.parser.next()? {
                Event::TagStart => self.read_section()?,
                Event::TagEnd => return Ok(()),
                _ => return Err(Error::malformed(self.parser.position(), "broken Sections list")),
            }
        }
    }

    /// Positioned on `TagStart` of one section compound; leaves the parser
    /// on its `TagEnd`.
    fn read_section(&mut self) -> Result<()> {
        let mut y: Option<i8> = None;
        let mut palette: Option<Vec<String>> = None;
        let mut states: Option<Vec<u64>> = None;

        loop {
            match self.parser.next()? {
                Event::TagEnd => break,
                Event::TagStart => {}
                _ => return Err(Error::malformed(self.parser.position(), "broken section")),
            }

            match self.parser.tag_name().unwrap_or_default() {
                "Y" => {
                    self.expect_type(TagType::Byte)?;
                    self.parser.next()?;
                    let value = self.parser.get_byte()?;
                    self.parser.next()?;
                    y = Some(value);

                    // nothing of an out-of-range section is kept
                    if !(0..SECTION_COUNT as i8).contains(&value) {
                        log::debug!("ignoring section with Y={value}");
                        return self.parser.skip();
                    }
                }
                "Palette" => palette = Some(self.read_palette()?),
                "BlockStates" => {
                    self.expect_type(TagType::LongArray)?;
                    let mut words = Vec::with_capacity(256);
                    while self.parser.next()? == Event::Data {
                        words.push(self.parser.get_long()? as u64);
                    }
                    states = Some(words);
                }
                _ => self.parser.skip()?,
            }
        }

        match y {
            Some(y) if (0..SECTION_COUNT as i8).contains(&y) => {
                let y = y as usize;
                self.palettes[y] = palette.unwrap_or_default();
                self.block_states[y] = states.unwrap_or_default();
            }
            Some(y) => log::debug!("ignoring section with Y={y}"),
            None => log::debug!("ignoring section without Y"),
        }
        Ok(())
    }

    /// Positioned on `TagStart` of `Palette`. Entries without a `Name` are
    /// kept as air so that later indices stay aligned.
    fn read_palette(&mut self) -> Result<Vec<String>> {
        self.expect_type(TagType::List)?;
        match self.parser.list_element_type() {
            Some(TagType::Compound) | Some(TagType::End) => {}
            found => {
                return Err(Error::TypeMismatch {
                    expected: TagType::Compound,
                    found: found.unwrap_or(TagType::End),
                });
            }
        }
        let mut palette = Vec::new();

        // one compound per entry
        while self.parser.next()? == Event::TagStart {
            let mut name = None;
            while self.parser.next()? == Event::TagStart {
                let is_name = self.parser.tag_name() == Some("Name")
                    && self.parser.tag_type() == Some(TagType::String);
                if is_name {
                    self.parser.next()?;
                    name = Some(self.parser.get_string()?.to_string());
                    self.parser.next()?;
                } else {
                    self.parser.skip()?;
                }
            }
            palette.push(name.unwrap_or_else(|| AIR.to_string()));
        }
        Ok(palette)
    }
}
