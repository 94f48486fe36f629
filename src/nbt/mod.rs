//! NBT (Named Binary Tag) decoding.
//!
//! Two readers share the same grammar:
//! - [`PullParser`]: forward-only event stream, used on the block lookup path
//! - [`Tag`]: owned tree with path queries, used by inspection tools

pub mod json;
mod path;
mod pull;
mod tag;

pub use path::{NbtPath, PathSpec};
pub use pull::{Event, PullParser};
pub use tag::{Compound, List, Payload, Tag};

use std::fmt;

/// Type id of a tag on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl TagType {
    /// `None` for ids above 12.
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => TagType::End,
            1 => TagType::Byte,
            2 => TagType::Short,
            3 => TagType::Int,
            4 => TagType::Long,
            5 => TagType::Float,
            6 => TagType::Double,
            7 => TagType::ByteArray,
            8 => TagType::String,
            9 => TagType::List,
            10 => TagType::Compound,
            11 => TagType::IntArray,
            12 => TagType::LongArray,
            _ => return None,
        })
    }

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Element width for the three array types.
    pub fn array_element_size(self) -> Option<usize> {
        match self {
            TagType::ByteArray => Some(1),
            TagType::IntArray => Some(4),
            TagType::LongArray => Some(8),
            _ => None,
        }
    }

    /// Fixed payload width of scalar types.
    pub fn scalar_size(self) -> Option<usize> {
        match self {
            TagType::Byte => Some(1),
            TagType::Short => Some(2),
            TagType::Int | TagType::Float => Some(4),
            TagType::Long | TagType::Double => Some(8),
            _ => None,
        }
    }

    #[inline]
    pub fn is_array(self) -> bool {
        self.array_element_size().is_some()
    }

    /// Lists, compounds and arrays.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, TagType::List | TagType::Compound) || self.is_array()
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagType::End => "TAG_End",
            TagType::Byte => "TAG_Byte",
            TagType::Short => "TAG_Short",
            TagType::Int => "TAG_Int",
            TagType::Long => "TAG_Long",
            TagType::Float => "TAG_Float",
            TagType::Double => "TAG_Double",
            TagType::ByteArray => "TAG_Byte_Array",
            TagType::String => "TAG_String",
            TagType::List => "TAG_List",
            TagType::Compound => "TAG_Compound",
            TagType::IntArray => "TAG_Int_Array",
            TagType::LongArray => "TAG_Long_Array",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip_and_out_of_range() {
        for id in 0..=12u8 {
            assert_eq!(TagType::from_id(id).map(TagType::id), Some(id));
        }
        assert_eq!(TagType::from_id(13), None);
        assert_eq!(TagType::from_id(0xff), None);
    }

    #[test]
    fn test_container_kinds() {
        assert!(TagType::LongArray.is_array());
        assert!(!TagType::List.is_array());
        assert!(TagType::List.is_container());
        assert!(!TagType::String.is_container());
        assert_eq!(TagType::IntArray.array_element_size(), Some(4));
        assert_eq!(TagType::Double.scalar_size(), Some(8));
    }
}
