//! Path expressions over the owned tree.
//!
//! ```text
//! /name   compound child (backslash escapes the next character)
//! [n]     element n of a byte, int or long array
//! <n>     element n of a list
//! ```
//!
//! Indices are zero-based. The container kind is part of the path: `[n]`
//! never matches a list and `<n>` never matches an array.

use std::borrow::Cow;
use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

use crate::error::{Error, Result};

use super::tag::{Payload, Tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSpec {
    Key(String),
    ArrayIndex(usize),
    ListIndex(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NbtPath {
    specs: Vec<PathSpec>,
}

impl NbtPath {
    pub fn compile(path: &str) -> Result<Self> {
        let invalid = |position: usize| Error::InvalidPath {
            path: path.to_string(),
            position,
        };

        let mut specs = Vec::new();
        let mut chars = path.char_indices().peekable();
        while let Some((pos, c)) = chars.next() {
            let spec = match c {
                '/' => PathSpec::Key(parse_key(&mut chars)),
                '[' => {
                    let index = parse_index(&mut chars, ']').ok_or_else(|| invalid(pos))?;
                    PathSpec::ArrayIndex(index)
                }
                '<' => {
                    let index = parse_index(&mut chars, '>').ok_or_else(|| invalid(pos))?;
                    PathSpec::ListIndex(index)
                }
                _ => return Err(invalid(pos)),
            };
            specs.push(spec);
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[PathSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn parse_key(chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut key = String::new();
    while let Some(&(_, c)) = chars.peek() {
        match c {
            '/' | '[' | '<' => break,
            '\\' => {
                chars.next();
                // a trailing backslash stands for itself
                key.push(chars.next().map_or('\\', |(_, c)| c));
            }
            _ => {
                key.push(c);
                chars.next();
            }
        }
    }
    key
}

fn parse_index(chars: &mut Peekable<CharIndices<'_>>, close: char) -> Option<usize> {
    let mut index: Option<usize> = None;
    while let Some(&(_, c)) = chars.peek() {
        let Some(digit) = c.to_digit(10) else {
            break;
        };
        index = Some(index.unwrap_or(0).checked_mul(10)?.checked_add(digit as usize)?);
        chars.next();
    }
    match chars.next() {
        Some((_, c)) if c == close => index,
        _ => None,
    }
}

impl FromStr for NbtPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::compile(s)
    }
}

impl fmt::Display for NbtPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for spec in &self.specs {
            match spec {
                PathSpec::Key(key) => {
                    f.write_str("/")?;
                    for c in key.chars() {
                        if matches!(c, '/' | '[' | '<' | '\\') {
                            f.write_str("\\")?;
                        }
                        write!(f, "{c}")?;
                    }
                }
                PathSpec::ArrayIndex(i) => write!(f, "[{i}]")?,
                PathSpec::ListIndex(i) => write!(f, "<{i}>")?,
            }
        }
        Ok(())
    }
}

impl Tag {
    /// The first component must name this tag itself, so a chunk root
    /// (named `""`) is queried as `//Level/xPos`.
    ///
    /// Array elements come back owned, everything else borrowed.
    pub fn query(&self, path: &NbtPath) -> Option<Cow<'_, Payload>> {
        match path.specs.split_first() {
            None => Some(Cow::Borrowed(&self.payload)),
            Some((PathSpec::Key(name), rest)) if *name == self.name => {
                query_specs(&self.payload, rest)
            }
            Some(_) => None,
        }
    }
}

impl Payload {
    /// Query starting below this payload.
    pub fn query(&self, path: &NbtPath) -> Option<Cow<'_, Payload>> {
        query_specs(self, &path.specs)
    }
}

fn query_specs<'a>(payload: &'a Payload, specs: &[PathSpec]) -> Option<Cow<'a, Payload>> {
    let Some((first, rest)) = specs.split_first() else {
        return Some(Cow::Borrowed(payload));
    };

    match (first, payload) {
        (PathSpec::Key(key), Payload::Compound(compound)) => query_specs(compound.get(key)?, rest),
        (PathSpec::ListIndex(i), Payload::List(list)) => query_specs(list.items.get(*i)?, rest),
        (PathSpec::ArrayIndex(i), array) if rest.is_empty() => {
            array_element(array, *i).map(Cow::Owned)
        }
        _ => None,
    }
}

fn array_element(payload: &Payload, index: usize) -> Option<Payload> {
    match payload {
        Payload::ByteArray(values) => values.get(index).map(|&v| Payload::Byte(v)),
        Payload::IntArray(values) => values.get(index).map(|&v| Payload::Int(v)),
        Payload::LongArray(values) => values.get(index).map(|&v| Payload::Long(v)),
        _ => None,
    }
}
