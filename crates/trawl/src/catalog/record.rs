// ABOUTME: Harvested records and the validators that check them.
// ABOUTME: Validation failures flag the record as bad data instead of raising.

use std::fmt;
use std::marker::PhantomData;

use anyhow::{anyhow, bail};
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// The structured output of one item.
///
/// Valid records serialize as their data object. Bad-data records serialize with
/// their URL, the validation error and the raw data for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub url: String,
    pub data: Map<String, Value>,
    pub bad_data: bool,
    pub error: Option<String>,
}

impl Record {
    pub fn valid(url: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            url: url.into(),
            data,
            bad_data: false,
            error: None,
        }
    }

    pub fn bad_data(url: impl Into<String>, data: Map<String, Value>, error: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            data,
            bad_data: true,
            error: Some(error.to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.bad_data
    }

    /// Field lookup by top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.bad_data {
            return self.data.serialize(serializer);
        }
        let mut s = serializer.serialize_struct("Record", 4)?;
        s.serialize_field("url", &self.url)?;
        s.serialize_field("bad_data", &true)?;
        s.serialize_field("error", &self.error)?;
        s.serialize_field("data", &self.data)?;
        s.end()
    }
}

/// Checks an assembled record, returning the value to keep.
pub trait RecordValidator: Send + Sync {
    fn validate(&self, record: &Value) -> anyhow::Result<Value>;
}

/// Validates by deserializing into `T`; the kept value is `T` serialized back.
pub struct TypedValidator<T> {
    _model: PhantomData<fn() -> T>,
}

impl<T> TypedValidator<T> {
    pub fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<T> Default for TypedValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecordValidator for TypedValidator<T>
where
    T: DeserializeOwned + Serialize,
{
    fn validate(&self, record: &Value) -> anyhow::Result<Value> {
        let model: T = serde_json::from_value(record.clone())?;
        Ok(serde_json::to_value(model)?)
    }
}

/// Requires the named top-level keys to be present and non-null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredFields {
    keys: Vec<String>,
}

impl RequiredFields {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl RecordValidator for RequiredFields {
    fn validate(&self, record: &Value) -> anyhow::Result<Value> {
        let Some(object) = record.as_object() else {
            bail!("record is not an object");
        };
        let missing: Vec<&str> = self
            .keys
            .iter()
            .filter(|k| object.get(k.as_str()).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!("missing required fields: {}", missing.join(", ")));
        }
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Product {
        title: String,
        #[serde(default)]
        price: Option<String>,
    }

    #[test]
    fn required_fields_reject_null_and_missing() {
        let v = RequiredFields::new(["title", "price"]);
        assert!(v.validate(&json!({"title": "a", "price": "1"})).is_ok());

        let err = v.validate(&json!({"title": "a", "price": null})).unwrap_err();
        assert_eq!(err.to_string(), "missing required fields: price");
        assert!(v.validate(&json!({})).is_err());
    }

    #[test]
    fn typed_validator_returns_model_json() {
        let v = TypedValidator::<Product>::new();
        let out = v.validate(&json!({"title": "Lamp"})).unwrap();
        assert_eq!(out, json!({"title": "Lamp", "price": null}));
        assert!(v.validate(&json!({"price": "3"})).is_err());
    }

    #[test]
    fn valid_record_serializes_as_data() {
        let data = json!({"title": "Lamp"}).as_object().cloned().unwrap();
        let record = Record::valid("https://example.com/1", data.clone());
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"title": "Lamp"}));

        let bad = Record::bad_data("https://example.com/1", data, "missing price");
        assert_eq!(
            serde_json::to_value(&bad).unwrap(),
            json!({
                "url": "https://example.com/1",
                "bad_data": true,
                "error": "missing price",
                "data": {"title": "Lamp"}
            })
        );
    }
}
