//! JSON nesting depth guard
//!
//! Walks the document with a serde visitor that keeps nothing but the
//! current depth, so deeply nested payloads are refused without ever
//! building a `serde_json::Value`.

use super::SecurityError;
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::cell::Cell;
use std::fmt;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// True when the first significant byte opens a JSON object or array
pub fn looks_like_json(data: &[u8]) -> bool {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    matches!(
        data.iter().find(|b| !b.is_ascii_whitespace()),
        Some(b'{') | Some(b'[')
    )
}

/// Fail when objects/arrays nest deeper than `max_depth`
///
/// Malformed JSON is reported as [`SecurityError::InvalidJson`].
pub fn check_json_depth(data: &[u8], max_depth: usize) -> Result<(), SecurityError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let exceeded = Cell::new(false);
    let probe = DepthProbe {
        depth: 0,
        max: max_depth,
        exceeded: &exceeded,
    };

    let mut deserializer = serde_json::Deserializer::from_slice(data);
    let result = probe
        .deserialize(&mut deserializer)
        .and_then(|_| deserializer.end());

    match result {
        Ok(()) => Ok(()),
        Err(_) if exceeded.get() => Err(SecurityError::JsonTooDeep { max: max_depth }),
        Err(e) => Err(SecurityError::InvalidJson(e.to_string())),
    }
}

#[derive(Clone, Copy)]
struct DepthProbe<'a> {
    depth: usize,
    max: usize,
    exceeded: &'a Cell<bool>,
}

impl<'a> DepthProbe<'a> {
    fn descend<E: de::Error>(self) -> Result<Self, E> {
        let depth = self.depth + 1;
        if depth > self.max {
            self.exceeded.set(true);
            return Err(E::custom("maximum nesting depth exceeded"));
        }
        Ok(Self { depth, ..self })
    }
}

impl<'de, 'a> DeserializeSeed<'de> for DepthProbe<'a> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, 'a> Visitor<'de> for DepthProbe<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E>(self, _: bool) -> Result<(), E> {
        Ok(())
    }

    fn visit_i64<E>(self, _: i64) -> Result<(), E> {
        Ok(())
    }

    fn visit_u64<E>(self, _: u64) -> Result<(), E> {
        Ok(())
    }

    fn visit_f64<E>(self, _: f64) -> Result<(), E> {
        Ok(())
    }

    fn visit_str<E>(self, _: &str) -> Result<(), E> {
        Ok(())
    }

    fn visit_unit<E>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let child = self.descend()?;
        while seq.next_element_seed(child)?.is_some() {}
        Ok(())
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let child = self.descend()?;
        while map.next_key::<IgnoredAny>()?.is_some() {
            map.next_value_seed(child)?;
        }
        Ok(())
    }
}
