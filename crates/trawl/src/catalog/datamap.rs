// ABOUTME: FieldMap: the ordered, recursive template of fields, nested maps and literals.
// ABOUTME: Deserializes from JSON objects, rejecting duplicate keys at every level.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::document::Documents;
use crate::error::HarvestError;
use crate::extractors::field::{FieldExtractor, FieldSpec};

/// One entry of a field map.
#[derive(Debug, Clone)]
pub enum FieldNode {
    Field(FieldExtractor),
    Nested(FieldMap),
    Literal(Value),
}

/// Ordered key → node mapping. Keys are unique within one level.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<(String, FieldNode)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, rejecting a key already present at this level.
    pub fn insert(mut self, key: impl Into<String>, node: FieldNode) -> Result<Self, HarvestError> {
        let key = key.into();
        if self.entries.iter().any(|(k, _)| *k == key) {
            return Err(HarvestError::configuration(
                "FieldMap",
                format!("duplicate key {:?}", key),
            ));
        }
        self.entries.push((key, node));
        Ok(self)
    }

    pub fn field(self, key: impl Into<String>, field: FieldExtractor) -> Result<Self, HarvestError> {
        self.insert(key, FieldNode::Field(field))
    }

    pub fn nested(self, key: impl Into<String>, map: FieldMap) -> Result<Self, HarvestError> {
        self.insert(key, FieldNode::Nested(map))
    }

    pub fn literal(self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, HarvestError> {
        self.insert(key, FieldNode::Literal(value.into()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&FieldNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    /// Checks every field at every level names the document it reads from.
    pub fn validate_sources(&self) -> Result<(), HarvestError> {
        for (key, node) in &self.entries {
            match node {
                FieldNode::Field(f) if f.source_key().is_none() => {
                    return Err(HarvestError::configuration(
                        "FieldMap",
                        format!("field {:?} has no source", key),
                    ));
                }
                FieldNode::Nested(map) => map.validate_sources()?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Materializes the map against `docs`. A field that cannot be evaluated is null.
    pub fn evaluate(&self, docs: &Documents) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, node) in &self.entries {
            let value = match node {
                FieldNode::Field(f) => match f.evaluate_named(docs) {
                    Ok(data) => data.to_json(),
                    Err(e) => {
                        warn!(field = %key, error = %e, "field skipped");
                        Value::Null
                    }
                },
                FieldNode::Nested(map) => Value::Object(map.evaluate(docs)),
                FieldNode::Literal(v) => v.clone(),
            };
            out.insert(key.clone(), value);
        }
        out
    }

    fn from_raw(entries: Vec<(String, RawValue)>) -> Result<Self, HarvestError> {
        let mut map = FieldMap::new();
        for (key, raw) in entries {
            let node = match raw {
                RawValue::Object(fields) if fields.iter().any(|(k, _)| k == "selectors") => {
                    let spec: FieldSpec = serde_json::from_value(raw_object_to_json(fields))
                        .map_err(|e| HarvestError::configuration(format!("field {}", key), e))?;
                    FieldNode::Field(FieldExtractor::from_spec(key.as_str(), &spec)?)
                }
                RawValue::Object(mut fields) if fields.len() == 1 && fields[0].0 == "literal" => {
                    let (_, value) = fields.remove(0);
                    FieldNode::Literal(value.into_json())
                }
                RawValue::Object(fields) => FieldNode::Nested(FieldMap::from_raw(fields)?),
                RawValue::Scalar(v) => FieldNode::Literal(v),
            };
            map = map.insert(key, node)?;
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawValue::deserialize(deserializer)? {
            RawValue::Object(entries) => FieldMap::from_raw(entries).map_err(de::Error::custom),
            RawValue::Scalar(_) => Err(de::Error::custom("a field map must be an object")),
        }
    }
}

/// JSON with object keys kept as an ordered list, so duplicates can be seen.
enum RawValue {
    Object(Vec<(String, RawValue)>),
    Scalar(Value),
}

impl RawValue {
    fn into_json(self) -> Value {
        match self {
            RawValue::Object(fields) => raw_object_to_json(fields),
            RawValue::Scalar(v) => v,
        }
    }
}

fn raw_object_to_json(fields: Vec<(String, RawValue)>) -> Value {
    Value::Object(fields.into_iter().map(|(k, v)| (k, v.into_json())).collect())
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawValueVisitor)
    }
}

struct RawValueVisitor;

impl<'de> Visitor<'de> for RawValueVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::from(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::String(v.to_string())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::String(v)))
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::Null))
    }

    fn visit_none<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Scalar(Value::Null))
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<RawValue, D::Error> {
        RawValue::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<RawValue>()? {
            items.push(item.into_json());
        }
        Ok(RawValue::Scalar(Value::Array(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawValue, A::Error> {
        let mut fields: Vec<(String, RawValue)> = Vec::new();
        while let Some(key) = access.next_key::<String>()? {
            if fields.iter().any(|(k, _)| *k == key) {
                return Err(de::Error::custom(format!("duplicate key {:?}", key)));
            }
            let value = access.next_value::<RawValue>()?;
            fields.push((key, value));
        }
        Ok(RawValue::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, SourceKey};
    use crate::extractors::select::SelectorSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const TEASER: &str = r#"<div class="teaser"><a href="/p/1">Lamp</a><span class="tag">new</span></div>"#;
    const DETAIL: &str = r#"<html><body><h1>Desk Lamp</h1><p class="price"> 19.99 </p></body></html>"#;

    fn docs() -> Documents {
        Documents::new(Document::fragment(TEASER)).with_child(Document::parse(DETAIL))
    }

    #[test]
    fn evaluates_in_key_order_with_nesting() {
        let map: FieldMap = serde_json::from_value(json!({
            "title": {"selectors": ["h1::text"], "source": "child"},
            "meta": {
                "tag": {"selectors": ["span.tag::text"], "source": "parent"},
                "shop": {"literal": "example"}
            },
            "currency": "EUR",
            "price": {"selectors": ["p.price::text"], "source": "child"}
        }))
        .unwrap();

        let out = map.evaluate(&docs());
        assert_eq!(
            Value::Object(out.clone()),
            json!({
                "title": "Desk Lamp",
                "meta": {"tag": "new", "shop": "example"},
                "currency": "EUR",
                "price": "19.99"
            })
        );
        let keys: Vec<&String> = out.keys().collect();
        assert_eq!(keys, vec!["title", "meta", "currency", "price"]);
        assert!(map.validate_sources().is_ok());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = serde_json::from_str::<FieldMap>(r#"{"a": "x", "a": "y"}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));

        let err = serde_json::from_str::<FieldMap>(r#"{"outer": {"b": 1, "b": 2}}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));

        let field = FieldExtractor::new("t", SelectorSpec::one("h1").unwrap());
        let err = FieldMap::new()
            .field("t", field.clone())
            .unwrap()
            .field("t", field)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn fields_without_source_fail_validation_and_evaluate_null() {
        let map = FieldMap::new()
            .nested(
                "inner",
                FieldMap::new()
                    .field("t", FieldExtractor::new("t", SelectorSpec::one("h1::text").unwrap()))
                    .unwrap(),
            )
            .unwrap();
        assert!(map.validate_sources().unwrap_err().is_configuration());
        assert_eq!(Value::Object(map.evaluate(&docs())), json!({"inner": {"t": null}}));
    }

    #[test]
    fn invalid_field_spec_is_an_error() {
        let err = serde_json::from_value::<FieldMap>(json!({
            "t": {"selectors": ["h1::text"], "source": "child", "bogus": true}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));

        let map: FieldMap = serde_json::from_value(json!({
            "t": {"selectors": ["h1::text"], "source": "child"}
        }))
        .unwrap();
        match map.get("t") {
            Some(FieldNode::Field(f)) => assert_eq!(f.source_key(), Some(SourceKey::Child)),
            other => panic!("unexpected node {:?}", other),
        }
    }
}
