//! anvil-lookup: command-line access to blocks, biomes and raw NBT in
//! Minecraft region files (.mca).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use anvil_lookup::bytes::maybe_gunzip;
use anvil_lookup::nbt::{NbtPath, Tag, json};
use anvil_lookup::region::REGION_SIZE;
use anvil_lookup::{ChunkStatus, Region};

#[derive(Parser)]
#[command(
    name = "anvil-lookup",
    about = "Block, biome and height lookups over Minecraft Anvil region files"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Block name at region-local block coordinates (x, z in 0..512)
    Block {
        region: PathBuf,
        x: i32,
        y: i32,
        z: i32,
    },

    /// Biome id at region-local block coordinates
    Biome {
        region: PathBuf,
        x: i32,
        y: i32,
        z: i32,
    },

    /// Highest block y covered by a section of one chunk
    Height {
        region: PathBuf,
        chunk_x: i32,
        chunk_z: i32,
    },

    /// Print a chunk as JSON, or write its raw NBT
    Dump {
        region: PathBuf,
        chunk_x: i32,
        chunk_z: i32,

        /// Path expression such as "//Level/Sections<0>/Y" (the chunk root is unnamed)
        #[arg(short, long)]
        query: Option<String>,

        /// Write the decompressed NBT to this file instead
        #[arg(long)]
        raw: Option<PathBuf>,
    },

    /// Print a standalone NBT file (gzipped or not) as JSON
    Nbt {
        file: PathBuf,

        #[arg(short, long)]
        query: Option<String>,
    },

    /// Dirty-check every chunk of a region against its journal
    Scan {
        region: PathBuf,

        #[arg(long, env = "ANVIL_JOURNAL_DIR", default_value = "journal")]
        journal_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Block { region, x, y, z } => {
            let (chunk_x, chunk_z) = (x.div_euclid(16), z.div_euclid(16));
            let mut chunk = open(&region)?
                .get_chunk(chunk_x, chunk_z)?
                .with_context(|| format!("chunk ({}, {}) is not present", chunk_x, chunk_z))?;
            println!("{}", chunk.get_block(x.rem_euclid(16), y, z.rem_euclid(16))?);
        }
        Command::Biome { region, x, y, z } => {
            let (chunk_x, chunk_z) = (x.div_euclid(16), z.div_euclid(16));
            let mut chunk = open(&region)?
                .get_chunk(chunk_x, chunk_z)?
                .with_context(|| format!("chunk ({}, {}) is not present", chunk_x, chunk_z))?;
            println!("{}", chunk.get_biome(x.rem_euclid(16), y, z.rem_euclid(16))?);
        }
        Command::Height { region, chunk_x, chunk_z } => {
            let mut chunk = open(&region)?
                .get_chunk(chunk_x, chunk_z)?
                .with_context(|| format!("chunk ({}, {}) is not present", chunk_x, chunk_z))?;
            println!("{}", chunk.get_max_height()?);
        }
        Command::Dump { region, chunk_x, chunk_z, query, raw } => {
            let data = open(&region)?
                .chunk_data(chunk_x, chunk_z)?
                .with_context(|| format!("chunk ({}, {}) is not present", chunk_x, chunk_z))?;
            match raw {
                Some(out) => {
                    fs::write(&out, &data).with_context(|| format!("writing {}", out.display()))?;
                    log::info!("Wrote {} bytes to {}", data.len(), out.display());
                }
                None => print_json(&data, query.as_deref())?,
            }
        }
        Command::Nbt { file, query } => {
            let data = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            print_json(&maybe_gunzip(data)?, query.as_deref())?;
        }
        Command::Scan { region, journal_dir } => scan(&region, &journal_dir)?,
    }
    Ok(())
}

fn open(path: &Path) -> Result<Region> {
    Region::open(path).with_context(|| format!("opening region {}", path.display()))
}

fn print_json(data: &[u8], query: Option<&str>) -> Result<()> {
    let tag = Tag::parse(data)?;
    let value = match query {
        Some(query) => {
            let path = NbtPath::compile(query)?;
            let payload = tag
                .query(&path)
                .with_context(|| format!("nothing at {}", path))?;
            json::to_json(&payload)
        }
        None => json::tag_to_json(&tag),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[derive(Debug, Default)]
struct ScanCounts {
    dirty: usize,
    unchanged: usize,
    absent: usize,
    failed: usize,
}

fn scan(path: &Path, journal_dir: &Path) -> Result<()> {
    let mut region = Region::open_with_journal(path, journal_dir)
        .with_context(|| format!("opening region {}", path.display()))?;
    let pos = region.pos();
    let present = region.header().present().count();
    log::info!("Scanning {} ({} chunks present)", path.display(), present);

    let mut bands = region.bands_mut();
    let counts: Vec<ScanCounts> = std::thread::scope(|s| {
        let handles: Vec<_> = bands
            .iter_mut()
            .map(|band| {
                s.spawn(move || {
                    let mut counts = ScanCounts::default();
                    for z in band.z_range() {
                        for x in 0..REGION_SIZE {
                            match band.get_chunk_if_dirty(x, z) {
                                Ok(ChunkStatus::Dirty(_)) => counts.dirty += 1,
                                Ok(ChunkStatus::Unchanged) => counts.unchanged += 1,
                                Ok(ChunkStatus::Absent) => counts.absent += 1,
                                Err(e) => {
                                    let (world_x, world_z) = match pos {
                                        Some(pos) => pos.local_to_world(x, z),
                                        None => (x, z),
                                    };
                                    log::warn!("Chunk ({}, {}) failed: {}", world_x, world_z, e);
                                    counts.failed += 1;
                                }
                            }
                        }
                    }
                    counts
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .collect::<std::thread::Result<Vec<_>>>()
    })
    .map_err(|_| anyhow::anyhow!("scan thread panicked"))?;
    drop(bands);

    let total = counts.iter().fold(ScanCounts::default(), |mut acc, c| {
        acc.dirty += c.dirty;
        acc.unchanged += c.unchanged;
        acc.absent += c.absent;
        acc.failed += c.failed;
        acc
    });
    println!(
        "dirty: {}, unchanged: {}, absent: {}, failed: {}",
        total.dirty, total.unchanged, total.absent, total.failed
    );

    region.flush_journal()?;
    Ok(())
}
