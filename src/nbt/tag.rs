//! Owned NBT tree.
//!
//! Payloads are read through a table of thirteen factories indexed by the
//! wire type id. The tree is only used by inspection tools; block lookups go
//! through the pull parser.

use byteorder::{BigEndian, ByteOrder};

use crate::bytes::Reader;
use crate::error::{Error, Result};

use super::TagType;

/// Deepest nesting accepted before the document is rejected.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(List),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

/// Homogeneous list. Every item has `element_type`; an empty list read from
/// disk may declare `End`.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub element_type: TagType,
    pub items: Vec<Payload>,
}

/// Named children in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    entries: Vec<Tag>,
}

impl Tag {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Parse the first tag of a document.
    pub fn parse(data: &[u8]) -> Result<Tag> {
        let mut reader = Reader::new(data);
        Self::read(&mut reader)
    }

    /// Read one named tag.
    pub fn read(reader: &mut Reader<'_>) -> Result<Tag> {
        let offset = reader.position();
        let id = reader.read_u8()?;
        if id == TagType::End.id() {
            return Err(Error::malformed(offset, "document holds no tag"));
        }
        let name = reader.read_string()?;
        let payload = read_payload(id, reader, 0)?;
        Ok(Tag { name, payload })
    }
}

impl Payload {
    pub fn tag_type(&self) -> TagType {
        match self {
            Payload::Byte(_) => TagType::Byte,
            Payload::Short(_) => TagType::Short,
            Payload::Int(_) => TagType::Int,
            Payload::Long(_) => TagType::Long,
            Payload::Float(_) => TagType::Float,
            Payload::Double(_) => TagType::Double,
            Payload::ByteArray(_) => TagType::ByteArray,
            Payload::String(_) => TagType::String,
            Payload::List(_) => TagType::List,
            Payload::Compound(_) => TagType::Compound,
            Payload::IntArray(_) => TagType::IntArray,
            Payload::LongArray(_) => TagType::LongArray,
        }
    }

    /// Any integer scalar, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Payload::Byte(v) => Some(v.into()),
            Payload::Short(v) => Some(v.into()),
            Payload::Int(v) => Some(v.into()),
            Payload::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Payload::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Payload::List(l) => Some(l),
            _ => None,
        }
    }
}

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Payload> {
        self.entries
            .iter()
            .find(|tag| tag.name == name)
            .map(|tag| &tag.payload)
    }

    /// Insert or replace. A replaced entry keeps its original position and
    /// the old payload is returned.
    pub fn insert(&mut self, name: impl Into<String>, payload: Payload) -> Option<Payload> {
        let name = name.into();
        match self.entries.iter_mut().find(|tag| tag.name == name) {
            Some(tag) => Some(std::mem::replace(&mut tag.payload, payload)),
            None => {
                self.entries.push(Tag { name, payload });
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type Factory = fn(&mut Reader<'_>, usize) -> Result<Payload>;

const FACTORIES: [Factory; 13] = [
    read_end,
    read_byte,
    read_short,
    read_int,
    read_long,
    read_float,
    read_double,
    read_byte_array,
    read_string,
    read_list,
    read_compound,
    read_int_array,
    read_long_array,
];

fn read_payload(id: u8, reader: &mut Reader<'_>, depth: usize) -> Result<Payload> {
    let factory = FACTORIES
        .get(id as usize)
        .ok_or_else(|| Error::malformed(reader.position(), format!("unknown tag type {id}")))?;
    factory(reader, depth)
}

fn read_end(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Err(Error::malformed(reader.position(), "End tag used as a value"))
}

fn read_byte(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Ok(Payload::Byte(reader.read_i8()?))
}

fn read_short(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Ok(Payload::Short(reader.read_i16()?))
}

fn read_int(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Ok(Payload::Int(reader.read_i32()?))
}

fn read_long(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Ok(Payload::Long(reader.read_i64()?))
}

fn read_float(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Ok(Payload::Float(reader.read_f32()?))
}

fn read_double(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Ok(Payload::Double(reader.read_f64()?))
}

fn read_string(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    Ok(Payload::String(reader.read_string()?))
}

fn read_count(reader: &mut Reader<'_>) -> Result<usize> {
    let offset = reader.position();
    let count = reader.read_i32()?;
    usize::try_from(count).map_err(|_| Error::malformed(offset, format!("negative length {count}")))
}

/// Array payload bytes, bounds-checked before anything is allocated.
fn array_bytes<'a>(reader: &mut Reader<'a>, width: usize) -> Result<(&'a [u8], usize)> {
    let count = read_count(reader)?;
    let len = count.checked_mul(width).ok_or(Error::BufferExhausted {
        offset: reader.position(),
        needed: usize::MAX,
        len: reader.len(),
    })?;
    Ok((reader.read_bytes(len)?, count))
}

fn read_byte_array(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    let (bytes, _) = array_bytes(reader, 1)?;
    Ok(Payload::ByteArray(bytes.iter().map(|&b| b as i8).collect()))
}

fn read_int_array(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    let (bytes, count) = array_bytes(reader, 4)?;
    let mut values = vec![0i32; count];
    BigEndian::read_i32_into(bytes, &mut values);
    Ok(Payload::IntArray(values))
}

fn read_long_array(reader: &mut Reader<'_>, _depth: usize) -> Result<Payload> {
    let (bytes, count) = array_bytes(reader, 8)?;
    let mut values = vec![0i64; count];
    BigEndian::read_i64_into(bytes, &mut values);
    Ok(Payload::LongArray(values))
}

fn check_depth(reader: &Reader<'_>, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(Error::malformed(
            reader.position(),
            format!("nesting deeper than {MAX_DEPTH}"),
        ));
    }
    Ok(())
}

fn read_list(reader: &mut Reader<'_>, depth: usize) -> Result<Payload> {
    check_depth(reader, depth)?;

    let offset = reader.position();
    let id = reader.read_u8()?;
    let element_type = TagType::from_id(id)
        .ok_or_else(|| Error::malformed(offset, format!("unknown list element type {id}")))?;
    let count = read_count(reader)?;

    if element_type == TagType::End {
        return Ok(Payload::List(List {
            element_type,
            items: Vec::new(),
        }));
    }

    // every element takes at least one byte
    reader.ensure(count)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read_payload(id, reader, depth + 1)?);
    }
    Ok(Payload::List(List {
        element_type,
        items,
    }))
}

fn read_compound(reader: &mut Reader<'_>, depth: usize) -> Result<Payload> {
    check_depth(reader, depth)?;

    let mut compound = Compound::new();
    loop {
        if reader.is_exhausted() {
            return Err(Error::malformed(
                reader.position(),
                "compound is missing its End tag",
            ));
        }
        let id = reader.read_u8()?;
        if id == TagType::End.id() {
            break;
        }
        let name = reader.read_string()?;
        let payload = read_payload(id, reader, depth + 1)?;
        compound.insert(name, payload);
    }
    Ok(Payload::Compound(compound))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: u8, name: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![id];
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_parse_nested_document() {
        // {"root": {"xPos": 5, "Heights": int[2], "Tags": ["a", "b"]}}
        let mut body = named(3, "xPos", &5i32.to_be_bytes());
        let mut heights = 2i32.to_be_bytes().to_vec();
        heights.extend_from_slice(&64i32.to_be_bytes());
        heights.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend(named(11, "Heights", &heights));
        let mut tags = vec![8u8];
        tags.extend_from_slice(&2i32.to_be_bytes());
        tags.extend_from_slice(&[0, 1, b'a', 0, 1, b'b']);
        body.extend(named(9, "Tags", &tags));
        body.push(0);

        let tag = Tag::parse(&named(10, "root", &body)).unwrap();
        assert_eq!(tag.name, "root");
        let root = tag.payload.as_compound().unwrap();
        assert_eq!(root.len(), 3);
        assert_eq!(root.get("xPos"), Some(&Payload::Int(5)));
        assert_eq!(root.get("Heights"), Some(&Payload::IntArray(vec![64, -1])));

        let list = root.get("Tags").and_then(Payload::as_list).unwrap();
        assert_eq!(list.element_type, TagType::String);
        assert_eq!(list.items[1].as_str(), Some("b"));

        let names: Vec<_> = root.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["xPos", "Heights", "Tags"]);
    }

    #[test]
    fn test_duplicate_name_last_write_wins_in_place() {
        let mut body = named(1, "a", &[1]);
        body.extend(named(1, "b", &[2]));
        body.extend(named(1, "a", &[3]));
        body.push(0);

        let tag = Tag::parse(&named(10, "", &body)).unwrap();
        let root = tag.payload.as_compound().unwrap();
        assert_eq!(root.len(), 2);
        assert_eq!(root.get("a"), Some(&Payload::Byte(3)));
        assert_eq!(root.iter().next().map(|t| t.name.as_str()), Some("a"));
    }

    #[test]
    fn test_unknown_type_id_fails_enclosing_tag() {
        let mut body = named(1, "ok", &[1]);
        body.extend(named(13, "bad", &[]));
        body.push(0);
        assert!(matches!(
            Tag::parse(&named(10, "", &body)),
            Err(Error::MalformedTag { .. })
        ));
    }

    #[test]
    fn test_missing_end_and_negative_count() {
        let body = named(1, "a", &[1]);
        assert!(matches!(
            Tag::parse(&named(10, "", &body)),
            Err(Error::MalformedTag { .. })
        ));

        assert!(matches!(
            Tag::parse(&named(7, "a", &(-4i32).to_be_bytes())),
            Err(Error::MalformedTag { .. })
        ));
    }

    #[test]
    fn test_lying_array_count_does_not_allocate() {
        let doc = named(12, "a", &i32::MAX.to_be_bytes());
        assert!(matches!(
            Tag::parse(&doc),
            Err(Error::BufferExhausted { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        // lists of lists, one level deeper than allowed
        let mut doc = named(9, "deep", &[]);
        for _ in 0..MAX_DEPTH {
            doc.push(9);
            doc.extend_from_slice(&1i32.to_be_bytes());
        }
        doc.push(0);
        doc.extend_from_slice(&0i32.to_be_bytes());

        assert!(matches!(Tag::parse(&doc), Err(Error::MalformedTag { .. })));
    }

    #[test]
    fn test_empty_list_of_end() {
        let mut payload = vec![0u8];
        payload.extend_from_slice(&3i32.to_be_bytes());
        let tag = Tag::parse(&named(9, "l", &payload)).unwrap();
        let list = tag.payload.as_list().unwrap();
        assert_eq!(list.element_type, TagType::End);
        assert!(list.items.is_empty());
    }
}
