//! Forward-only NBT event parser.
//!
//! The parser walks the byte buffer one step per [`PullParser::next`] call
//! and keeps one [`Frame`] per open tag. Nothing is materialized beyond the
//! current value, so a consumer that only wants one subtree pays for the
//! bytes it skips and nothing else.
//!
//! Event shapes:
//! - scalar or string: `TagStart`, `Data`, `TagEnd`
//! - byte/int/long array: `TagStart`, one `Data` per element, `TagEnd`
//! - list: `TagStart`, then every element as an unnamed tag, `TagEnd`
//! - compound: `TagStart`, every child tag, `TagEnd`

use crate::bytes::Reader;
use crate::error::{Error, Result};

use super::TagType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DocumentStart,
    TagStart,
    Data,
    TagEnd,
    DocumentEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String,
}

/// One open tag.
///
/// `len` is the declared element count for arrays and lists and `1` for
/// scalars and strings; `index` counts how many of those were consumed.
/// Compounds ignore both and end on their `End` byte.
#[derive(Debug)]
struct Frame {
    tag_type: TagType,
    name: String,
    element_type: TagType,
    len: usize,
    index: usize,
}

impl Frame {
    #[inline]
    fn is_done(&self) -> bool {
        self.index >= self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    InDocument,
    Finished,
}

pub struct PullParser<B> {
    buf: B,
    pos: usize,
    state: State,
    event: Event,
    stack: Vec<Frame>,
    value: Scalar,
    string: String,
    last_type: TagType,
    last_name: String,
}

impl<B: AsRef<[u8]>> PullParser<B> {
    pub fn new(buf: B) -> Self {
        Self {
            buf,
            pos: 0,
            state: State::NotStarted,
            event: Event::DocumentStart,
            stack: Vec::with_capacity(16),
            value: Scalar::Byte(0),
            string: String::new(),
            last_type: TagType::End,
            last_name: String::new(),
        }
    }

    /// Advance exactly one step.
    ///
    /// The first call returns `DocumentStart`. Once the root tag is closed
    /// (or the buffer is empty) every further call returns `DocumentEnd`.
    pub fn next(&mut self) -> Result<Event> {
        let event = self.step()?;
        self.event = event;
        Ok(event)
    }

    /// Event returned by the last successful [`next`](Self::next).
    #[inline]
    pub fn event(&self) -> Event {
        self.event
    }

    /// Number of currently open tags. The root tag is depth 1.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Type of the current tag, or of the tag just closed after `TagEnd`.
    pub fn tag_type(&self) -> Option<TagType> {
        match self.event {
            Event::TagEnd => Some(self.last_type),
            _ => self.stack.last().map(|f| f.tag_type),
        }
    }

    /// Name of the current tag, or of the tag just closed after `TagEnd`.
    /// List elements have an empty name.
    pub fn tag_name(&self) -> Option<&str> {
        match self.event {
            Event::TagEnd => Some(&self.last_name),
            _ => self.stack.last().map(|f| f.name.as_str()),
        }
    }

    /// Element type of the current list.
    pub fn list_element_type(&self) -> Option<TagType> {
        self.stack
            .last()
            .filter(|f| f.tag_type == TagType::List)
            .map(|f| f.element_type)
    }

    /// Valid for `Byte` and `ByteArray` elements.
    pub fn get_byte(&self) -> Result<i8> {
        match self.current()? {
            Scalar::Byte(v) => Ok(v),
            _ => Err(self.mismatch(TagType::Byte)),
        }
    }

    pub fn get_short(&self) -> Result<i16> {
        match self.current()? {
            Scalar::Short(v) => Ok(v),
            _ => Err(self.mismatch(TagType::Short)),
        }
    }

    /// Valid for `Int` and `IntArray` elements.
    pub fn get_int(&self) -> Result<i32> {
        match self.current()? {
            Scalar::Int(v) => Ok(v),
            _ => Err(self.mismatch(TagType::Int)),
        }
    }

    /// Valid for `Long` and `LongArray` elements.
    pub fn get_long(&self) -> Result<i64> {
        match self.current()? {
            Scalar::Long(v) => Ok(v),
            _ => Err(self.mismatch(TagType::Long)),
        }
    }

    pub fn get_float(&self) -> Result<f32> {
        match self.current()? {
            Scalar::Float(v) => Ok(v),
            _ => Err(self.mismatch(TagType::Float)),
        }
    }

    pub fn get_double(&self) -> Result<f64> {
        match self.current()? {
            Scalar::Double(v) => Ok(v),
            _ => Err(self.mismatch(TagType::Double)),
        }
    }

    pub fn get_string(&self) -> Result<&str> {
        match self.current()? {
            Scalar::String => Ok(&self.string),
            _ => Err(self.mismatch(TagType::String)),
        }
    }

    /// Skip whatever remains of the innermost open tag, leaving the parser on
    /// that tag's `TagEnd`. Called right after `TagStart` this skips the
    /// whole tag.
    ///
    /// Nesting is tracked with a counter of starts and ends, so no subtree is
    /// built. Array payloads and lists of fixed-width scalars are jumped over
    /// in one bounds-checked step.
    pub fn skip(&mut self) -> Result<()> {
        if self.stack.is_empty() {
            return Ok(());
        }

        let mut depth = 1usize;
        self.fast_forward()?;
        while depth > 0 {
            match self.next()? {
                Event::TagStart => {
                    depth += 1;
                    self.fast_forward()?;
                }
                Event::TagEnd => depth -= 1,
                Event::Data => {}
                Event::DocumentStart | Event::DocumentEnd => {
                    return Err(Error::malformed(
                        self.pos,
                        "document ended inside a skipped tag",
                    ));
                }
            }
        }
        Ok(())
    }

    fn current(&self) -> Result<Scalar> {
        if self.event != Event::Data {
            return Err(Error::NotOnValue);
        }
        Ok(self.value)
    }

    fn mismatch(&self, expected: TagType) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.tag_type().unwrap_or(TagType::End),
        }
    }

    fn read<T>(&mut self, f: impl FnOnce(&mut Reader<'_>) -> Result<T>) -> Result<T> {
        let mut reader = Reader::at(self.buf.as_ref(), self.pos);
        let value = f(&mut reader)?;
        self.pos = reader.position();
        Ok(value)
    }

    fn remaining(&self) -> usize {
        self.buf.as_ref().len().saturating_sub(self.pos)
    }

    fn step(&mut self) -> Result<Event> {
        let Some(top) = self.stack.last_mut() else {
            return self.step_document();
        };

        match top.tag_type {
            TagType::Compound => self.step_compound(),
            TagType::List => {
                if top.is_done() {
                    return Ok(self.close());
                }
                top.index += 1;
                let element_type = top.element_type;
                self.open(element_type, String::new())
            }
            tag_type => {
                if top.is_done() {
                    return Ok(self.close());
                }
                top.index += 1;
                self.read_value(tag_type)?;
                Ok(Event::Data)
            }
        }
    }

    fn step_document(&mut self) -> Result<Event> {
        match self.state {
            State::NotStarted => {
                self.state = State::InDocument;
                Ok(Event::DocumentStart)
            }
            State::Finished => Ok(Event::DocumentEnd),
            State::InDocument => {
                if self.remaining() == 0 {
                    self.state = State::Finished;
                    return Ok(Event::DocumentEnd);
                }
                let tag_type = self.read_type_id()?;
                if tag_type == TagType::End {
                    self.state = State::Finished;
                    return Ok(Event::DocumentEnd);
                }
                let name = self.read(|r| r.read_string())?;
                self.open(tag_type, name)
            }
        }
    }

    fn step_compound(&mut self) -> Result<Event> {
        if self.remaining() == 0 {
            return Err(Error::malformed(
                self.pos,
                "compound is missing its End tag",
            ));
        }
        let tag_type = self.read_type_id()?;
        if tag_type == TagType::End {
            return Ok(self.close());
        }
        let name = self.read(|r| r.read_string())?;
        self.open(tag_type, name)
    }

    fn read_type_id(&mut self) -> Result<TagType> {
        let offset = self.pos;
        let id = self.read(|r| r.read_u8())?;
        TagType::from_id(id)
            .ok_or_else(|| Error::malformed(offset, format!("unknown tag type {id}")))
    }

    fn read_count(&mut self) -> Result<usize> {
        let offset = self.pos;
        let count = self.read(|r| r.read_i32())?;
        usize::try_from(count)
            .map_err(|_| Error::malformed(offset, format!("negative length {count}")))
    }

    /// Read the container header (if any) and push a frame.
    fn open(&mut self, tag_type: TagType, name: String) -> Result<Event> {
        let (element_type, len) = match tag_type {
            TagType::ByteArray | TagType::IntArray | TagType::LongArray => {
                (TagType::End, self.read_count()?)
            }
            TagType::List => {
                let element_type = self.read_type_id()?;
                let count = self.read_count()?;
                if element_type == TagType::End {
                    (element_type, 0)
                } else {
                    (element_type, count)
                }
            }
            TagType::Compound => (TagType::End, 0),
            TagType::End => {
                return Err(Error::malformed(self.pos, "End tag used as a value"));
            }
            _ => (TagType::End, 1),
        };

        self.stack.push(Frame {
            tag_type,
            name,
            element_type,
            len,
            index: 0,
        });
        Ok(Event::TagStart)
    }

    fn close(&mut self) -> Event {
        if let Some(frame) = self.stack.pop() {
            self.last_type = frame.tag_type;
            self.last_name = frame.name;
        }
        if self.stack.is_empty() {
            self.state = State::Finished;
        }
        Event::TagEnd
    }

    fn read_value(&mut self, tag_type: TagType) -> Result<()> {
        self.value = match tag_type {
            TagType::Byte | TagType::ByteArray => Scalar::Byte(self.read(|r| r.read_i8())?),
            TagType::Short => Scalar::Short(self.read(|r| r.read_i16())?),
            TagType::Int | TagType::IntArray => Scalar::Int(self.read(|r| r.read_i32())?),
            TagType::Long | TagType::LongArray => Scalar::Long(self.read(|r| r.read_i64())?),
            TagType::Float => Scalar::Float(self.read(|r| r.read_f32())?),
            TagType::Double => Scalar::Double(self.read(|r| r.read_f64())?),
            TagType::String => {
                self.string = self.read(|r| r.read_string())?;
                Scalar::String
            }
            other => {
                return Err(Error::malformed(
                    self.pos,
                    format!("{other} carries no inline value"),
                ));
            }
        };
        Ok(())
    }

    /// Consume the unread payload of the top frame without events, when its
    /// size is known up front.
    fn fast_forward(&mut self) -> Result<()> {
        let Some(top) = self.stack.last() else {
            return Ok(());
        };
        if top.is_done() {
            return Ok(());
        }
        let remaining = top.len - top.index;

        let bytes = match top.tag_type {
            TagType::String => {
                let len = self.read(|r| r.read_u16())?;
                len as usize
            }
            TagType::List => match top.element_type.scalar_size() {
                Some(size) => self.payload_bytes(remaining, size)?,
                None => return Ok(()),
            },
            TagType::Compound => return Ok(()),
            tag_type => {
                let size = tag_type
                    .array_element_size()
                    .or_else(|| tag_type.scalar_size())
                    .unwrap_or(0);
                self.payload_bytes(remaining, size)?
            }
        };

        self.read(|r| r.skip(bytes))?;
        if let Some(top) = self.stack.last_mut() {
            top.index = top.len;
        }
        Ok(())
    }

    fn payload_bytes(&self, count: usize, size: usize) -> Result<usize> {
        count.checked_mul(size).ok_or(Error::BufferExhausted {
            offset: self.pos,
            needed: usize::MAX,
            len: self.buf.as_ref().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(tag_type: TagType, name: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag_type.id()];
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn expect_scalar(buf: Vec<u8>, tag_type: TagType) -> PullParser<Vec<u8>> {
        let mut p = PullParser::new(buf);
        assert_eq!(p.next().unwrap(), Event::DocumentStart);
        assert_eq!(p.next().unwrap(), Event::TagStart);
        assert_eq!(p.tag_name(), Some("foo"));
        assert_eq!(p.tag_type(), Some(tag_type));
        assert_eq!(p.next().unwrap(), Event::Data);
        p
    }

    fn finish(p: &mut PullParser<Vec<u8>>, tag_type: TagType) {
        assert_eq!(p.next().unwrap(), Event::TagEnd);
        assert_eq!(p.tag_name(), Some("foo"));
        assert_eq!(p.tag_type(), Some(tag_type));
        assert_eq!(p.next().unwrap(), Event::DocumentEnd);
        assert_eq!(p.next().unwrap(), Event::DocumentEnd);
    }

    #[test]
    fn test_scalar_tags() {
        let mut p = expect_scalar(named(TagType::Byte, "foo", &[0xfe]), TagType::Byte);
        assert_eq!(p.get_byte().unwrap(), -2);
        finish(&mut p, TagType::Byte);

        let mut p = expect_scalar(named(TagType::Short, "foo", &[0x01, 0x00]), TagType::Short);
        assert_eq!(p.get_short().unwrap(), 256);
        finish(&mut p, TagType::Short);

        let mut p = expect_scalar(
            named(TagType::Int, "foo", &[0xff, 0xff, 0xff, 0xfd]),
            TagType::Int,
        );
        assert_eq!(p.get_int().unwrap(), -3);
        finish(&mut p, TagType::Int);

        let mut p = expect_scalar(
            named(TagType::Long, "foo", &0x0102_0304_0506_0708i64.to_be_bytes()),
            TagType::Long,
        );
        assert_eq!(p.get_long().unwrap(), 0x0102_0304_0506_0708);
        finish(&mut p, TagType::Long);

        let mut p = expect_scalar(
            named(TagType::Float, "foo", &[0x40, 0xa0, 0x00, 0x00]),
            TagType::Float,
        );
        assert_eq!(p.get_float().unwrap(), 5.0);
        finish(&mut p, TagType::Float);

        let mut p = expect_scalar(
            named(TagType::Double, "foo", &(-0.25f64).to_be_bytes()),
            TagType::Double,
        );
        assert_eq!(p.get_double().unwrap(), -0.25);
        finish(&mut p, TagType::Double);

        let mut p = expect_scalar(
            named(TagType::String, "foo", &[0x00, 0x03, b'b', b'a', b'r']),
            TagType::String,
        );
        assert_eq!(p.get_string().unwrap(), "bar");
        finish(&mut p, TagType::String);
    }

    #[test]
    fn test_typed_getter_mismatch() {
        let p = expect_scalar(
            named(TagType::Float, "foo", &[0x40, 0xa0, 0x00, 0x00]),
            TagType::Float,
        );
        match p.get_int() {
            Err(Error::TypeMismatch { expected, found }) => {
                assert_eq!(expected, TagType::Int);
                assert_eq!(found, TagType::Float);
            }
            other => panic!("Expected `TypeMismatch` but got `{:?}`", other),
        }
    }

    #[test]
    fn test_getter_before_data() {
        let mut p = PullParser::new(named(TagType::Int, "foo", &[0, 0, 0, 1]));
        p.next().unwrap();
        p.next().unwrap();
        assert!(matches!(p.get_int(), Err(Error::NotOnValue)));
    }

    #[test]
    fn test_arrays_emit_one_data_per_element() {
        let mut payload = 3i32.to_be_bytes().to_vec();
        for v in [7i64, -1, 42] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        let mut p = PullParser::new(named(TagType::LongArray, "foo", &payload));
        p.next().unwrap();
        assert_eq!(p.next().unwrap(), Event::TagStart);

        let mut values = Vec::new();
        while p.next().unwrap() == Event::Data {
            values.push(p.get_long().unwrap());
        }
        assert_eq!(values, vec![7, -1, 42]);
        assert_eq!(p.event(), Event::TagEnd);
        assert_eq!(p.tag_type(), Some(TagType::LongArray));
    }

    #[test]
    fn test_compound_with_list_of_compounds() {
        // {"": {"Palette": [{"Name": "a"}, {"Name": "b"}], "Y": 3b}}
        let mut palette = vec![TagType::Compound.id()];
        palette.extend_from_slice(&2i32.to_be_bytes());
        for name in ["a", "b"] {
            palette.extend(named(TagType::String, "Name", &[0, 1, name.as_bytes()[0]]));
            palette.push(0);
        }
        let mut body = named(TagType::List, "Palette", &palette);
        body.extend(named(TagType::Byte, "Y", &[3]));
        body.push(0);
        let doc = named(TagType::Compound, "", &body);

        let mut p = PullParser::new(doc);
        let mut trace = Vec::new();
        loop {
            let event = p.next().unwrap();
            let name = p.tag_name().unwrap_or("-").to_string();
            trace.push(match event {
                Event::Data => match p.tag_type() {
                    Some(TagType::String) => format!("data:{}", p.get_string().unwrap()),
                    _ => format!("data:{}", p.get_byte().unwrap()),
                },
                Event::TagStart => format!("start:{name}"),
                Event::TagEnd => format!("end:{name}"),
                Event::DocumentStart => "doc".to_string(),
                Event::DocumentEnd => break,
            });
        }
        assert_eq!(
            trace,
            vec![
                "doc", "start:", "start:Palette", "start:", "start:Name", "data:a", "end:Name",
                "end:", "start:", "start:Name", "data:b", "end:Name", "end:", "end:Palette",
                "start:Y", "data:3", "end:Y", "end:",
            ]
        );
    }

    #[test]
    fn test_skip_sibling_subtree() {
        // {"": {"Entities": [[1,2],[3]], "Blob": byte[4], "Want": 9}}
        let mut entities = vec![TagType::IntArray.id()];
        entities.extend_from_slice(&2i32.to_be_bytes());
        entities.extend_from_slice(&2i32.to_be_bytes());
        entities.extend_from_slice(&1i32.to_be_bytes());
        entities.extend_from_slice(&2i32.to_be_bytes());
        entities.extend_from_slice(&1i32.to_be_bytes());
        entities.extend_from_slice(&3i32.to_be_bytes());

        let mut body = named(TagType::List, "Entities", &entities);
        body.extend(named(TagType::ByteArray, "Blob", &[0, 0, 0, 4, 1, 2, 3, 4]));
        body.extend(named(TagType::Int, "Want", &9i32.to_be_bytes()));
        body.push(0);
        let doc = named(TagType::Compound, "", &body);

        let mut p = PullParser::new(doc);
        p.next().unwrap();
        p.next().unwrap();

        assert_eq!(p.next().unwrap(), Event::TagStart);
        assert_eq!(p.tag_name(), Some("Entities"));
        p.skip().unwrap();
        assert_eq!(p.event(), Event::TagEnd);
        assert_eq!(p.tag_name(), Some("Entities"));

        assert_eq!(p.next().unwrap(), Event::TagStart);
        assert_eq!(p.tag_name(), Some("Blob"));
        p.skip().unwrap();

        assert_eq!(p.next().unwrap(), Event::TagStart);
        assert_eq!(p.tag_name(), Some("Want"));
        p.next().unwrap();
        assert_eq!(p.get_int().unwrap(), 9);
        p.next().unwrap();
        assert_eq!(p.next().unwrap(), Event::TagEnd);
        assert_eq!(p.depth(), 0);
        assert_eq!(p.next().unwrap(), Event::DocumentEnd);
    }

    #[test]
    fn test_skip_rest_of_array_mid_way() {
        let doc = named(TagType::ByteArray, "foo", &[0, 0, 0, 3, 1, 2, 3]);
        let mut p = PullParser::new(doc);
        p.next().unwrap();
        p.next().unwrap();
        assert_eq!(p.next().unwrap(), Event::Data);
        assert_eq!(p.get_byte().unwrap(), 1);
        p.skip().unwrap();
        assert_eq!(p.event(), Event::TagEnd);
        assert_eq!(p.next().unwrap(), Event::DocumentEnd);
    }

    #[test]
    fn test_unterminated_compound_is_malformed() {
        let body = named(TagType::Byte, "a", &[1]);
        let doc = named(TagType::Compound, "root", &body);

        let mut p = PullParser::new(doc);
        let err = loop {
            match p.next() {
                Ok(Event::DocumentEnd) => panic!("Expected an error before the document end"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, Error::MalformedTag { .. }), "{err:?}");
    }

    #[test]
    fn test_negative_count_is_malformed() {
        let doc = named(TagType::IntArray, "foo", &(-1i32).to_be_bytes());
        let mut p = PullParser::new(doc);
        p.next().unwrap();
        assert!(matches!(p.next(), Err(Error::MalformedTag { .. })));
    }

    #[test]
    fn test_unknown_type_id_is_malformed() {
        let mut p = PullParser::new(vec![13u8, 0, 0]);
        p.next().unwrap();
        assert!(matches!(p.next(), Err(Error::MalformedTag { .. })));
    }

    #[test]
    fn test_list_of_end_is_empty() {
        let mut payload = vec![TagType::End.id()];
        payload.extend_from_slice(&5i32.to_be_bytes());
        let mut p = PullParser::new(named(TagType::List, "foo", &payload));
        p.next().unwrap();
        assert_eq!(p.next().unwrap(), Event::TagStart);
        assert_eq!(p.list_element_type(), Some(TagType::End));
        assert_eq!(p.next().unwrap(), Event::TagEnd);
        assert_eq!(p.next().unwrap(), Event::DocumentEnd);
    }

    #[test]
    fn test_lying_array_length() {
        // declares 1000 longs, carries one
        let mut payload = 1000i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&1i64.to_be_bytes());
        let doc = named(TagType::LongArray, "foo", &payload);

        let mut p = PullParser::new(doc.clone());
        p.next().unwrap();
        p.next().unwrap();
        assert_eq!(p.next().unwrap(), Event::Data);
        assert!(matches!(p.next(), Err(Error::BufferExhausted { .. })));

        let mut p = PullParser::new(doc);
        p.next().unwrap();
        p.next().unwrap();
        assert!(matches!(p.skip(), Err(Error::BufferExhausted { .. })));
    }

    #[test]
    fn test_empty_buffer() {
        let mut p = PullParser::new(Vec::new());
        assert_eq!(p.next().unwrap(), Event::DocumentStart);
        assert_eq!(p.next().unwrap(), Event::DocumentEnd);
        assert_eq!(p.tag_name(), None);
    }
}
