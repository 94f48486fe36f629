//! Bit-packed palette indices.
//!
//! A section stores 4096 palette indices in a `LongArray`. Two layouts exist:
//! - [`PackingScheme::Stretched`]: indices are laid end to end and may
//!   straddle two words
//! - [`PackingScheme::Aligned`]: each word holds `64 / bits` indices, the
//!   leftover high bits are padding

/// First data version that stores block states without straddling words.
pub const STRETCH_DATA_VERSION_THRESHOLD: i32 = 2529;

/// Blocks in one 16x16x16 section.
pub const BLOCKS_PER_SECTION: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingScheme {
    Stretched,
    Aligned,
}

impl PackingScheme {
    /// Chunks without a data version predate the threshold.
    pub fn for_data_version(data_version: Option<i32>) -> Self {
        match data_version {
            Some(v) if v >= STRETCH_DATA_VERSION_THRESHOLD => PackingScheme::Aligned,
            _ => PackingScheme::Stretched,
        }
    }
}

/// Width of one packed index: at least 4, otherwise just enough bits for the
/// largest index `palette_len - 1`.
pub fn bits_per_block(palette_len: usize) -> u32 {
    let max_index = palette_len.saturating_sub(1);
    if max_index <= 15 {
        4
    } else {
        usize::BITS - max_index.leading_zeros()
    }
}

/// Linear index of a block inside its section.
#[inline]
pub fn block_index(x: usize, y_in_section: usize, z: usize) -> usize {
    y_in_section * 256 + z * 16 + x
}

/// Unpack the palette index stored at `index`, or `None` if the words do
/// not reach that far.
pub fn palette_index(words: &[u64], index: usize, bits: u32, scheme: PackingScheme) -> Option<u64> {
    if bits == 0 || bits > 64 {
        return None;
    }
    let bits = bits as usize;
    let mask = u64::MAX >> (64 - bits);

    let value = match scheme {
        PackingScheme::Stretched => {
            let bit = index.checked_mul(bits)?;
            let word = bit / 64;
            let shift = bit % 64;
            let mut value = *words.get(word)? >> shift;
            if 64 - shift < bits {
                value |= *words.get(word + 1)? << (64 - shift);
            }
            value
        }
        PackingScheme::Aligned => {
            let per_word = 64 / bits;
            let word = index / per_word;
            let shift = (index % per_word) * bits;
            *words.get(word)? >> shift
        }
    };
    Some(value & mask)
}
