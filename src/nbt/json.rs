use serde_json::{Map, Number, Value as JsonValue};

use super::tag::{Payload, Tag};

/// `{name: payload}`.
pub fn tag_to_json(tag: &Tag) -> JsonValue {
    let mut map = Map::new();
    map.insert(tag.name.clone(), to_json(&tag.payload));
    JsonValue::Object(map)
}

/// Arrays are wrapped in a single-key object (`__byte_array`, `__int_array`,
/// `__long_array`) so they stay distinguishable from lists.
pub fn to_json(payload: &Payload) -> JsonValue {
    match payload {
        Payload::Compound(c) => {
            let mut map = Map::new();
            for tag in c.iter() {
                map.insert(tag.name.clone(), to_json(&tag.payload));
            }
            JsonValue::Object(map)
        }
        Payload::List(l) => JsonValue::Array(l.items.iter().map(to_json).collect()),
        Payload::String(s) => JsonValue::String(s.clone()),
        Payload::Byte(b) => JsonValue::Number((*b).into()),
        Payload::Short(s) => JsonValue::Number((*s).into()),
        Payload::Int(i) => JsonValue::Number((*i).into()),
        Payload::Long(l) => JsonValue::Number((*l).into()),
        Payload::Float(f) => float(*f as f64),
        Payload::Double(d) => float(*d),
        Payload::ByteArray(ba) => tagged_array(
            "__byte_array",
            ba.iter().map(|&b| JsonValue::Number(b.into())),
        ),
        Payload::IntArray(ia) => tagged_array(
            "__int_array",
            ia.iter().map(|&i| JsonValue::Number(i.into())),
        ),
        Payload::LongArray(la) => tagged_array(
            "__long_array",
            la.iter().map(|&l| JsonValue::Number(l.into())),
        ),
    }
}

/// NaN and infinities have no JSON form and become 0.
fn float(value: f64) -> JsonValue {
    JsonValue::Number(Number::from_f64(value).unwrap_or(Number::from(0)))
}

fn tagged_array(key: &str, values: impl Iterator<Item = JsonValue>) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), JsonValue::Array(values.collect()));
    JsonValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nbt::{Compound, List, TagType};

    #[test]
    fn test_tree_to_json() {
        let mut level = Compound::new();
        level.insert("xPos", Payload::Int(-3));
        level.insert("BlockStates", Payload::LongArray(vec![1, 2, 4096]));
        level.insert(
            "Tags",
            Payload::List(List {
                element_type: TagType::String,
                items: vec![Payload::String("a".into())],
            }),
        );
        level.insert("Light", Payload::Float(0.5));
        let tag = Tag::new("", Payload::Compound(level));

        let json = tag_to_json(&tag);
        assert_eq!(
            json,
            serde_json::json!({
                "": {
                    "xPos": -3,
                    "BlockStates": { "__long_array": [1, 2, 4096] },
                    "Tags": ["a"],
                    "Light": 0.5
                }
            })
        );
    }

    #[test]
    fn test_keys_keep_document_order() {
        let mut root = Compound::new();
        for name in ["zPos", "xPos", "Sections", "DataVersion", "LastUpdate"] {
            root.insert(name, Payload::Int(0));
        }
        let json = to_json(&Payload::Compound(root));
        let keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["zPos", "xPos", "Sections", "DataVersion", "LastUpdate"]);
    }

    #[test]
    fn test_non_finite_float_becomes_zero() {
        assert_eq!(to_json(&Payload::Double(f64::NAN)), serde_json::json!(0));
    }
}
