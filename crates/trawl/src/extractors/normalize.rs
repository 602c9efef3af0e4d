// ABOUTME: NormalizationTable maps raw string variants onto canonical values.
// ABOUTME: Entries keep configuration order; the first canonical whose variants match wins.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical value → raw variants, in configuration order.
///
/// A raw string equal to a variant, or to the canonical value itself, resolves to
/// the canonical value. When a variant is listed under several canonical values the
/// earliest entry wins. Unmatched strings pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizationTable {
    entries: Vec<(String, Vec<String>)>,
}

impl NormalizationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Empty canonical values or variants are rejected.
    pub fn entry<I, S>(mut self, canonical: impl Into<String>, variants: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let canonical = canonical.into();
        if canonical.is_empty() {
            return Err("normalization canonical value is empty".to_string());
        }
        let variants: Vec<String> = variants.into_iter().map(Into::into).collect();
        if variants.iter().any(String::is_empty) {
            return Err(format!("normalization variants of {:?} contain an empty string", canonical));
        }
        self.entries.push((canonical, variants));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `raw` to its canonical form.
    pub fn normalize<'a>(&'a self, raw: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(canonical, variants)| canonical == raw || variants.iter().any(|v| v == raw))
            .map(|(canonical, _)| canonical.as_str())
            .unwrap_or(raw)
    }
}

impl Serialize for NormalizationTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (canonical, variants) in &self.entries {
            map.serialize_entry(canonical, variants)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NormalizationTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = NormalizationTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of canonical value to a list of variants")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = NormalizationTable::new();
                while let Some((canonical, variants)) =
                    access.next_entry::<String, Vec<String>>()?
                {
                    table = table
                        .entry(canonical, variants)
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}
