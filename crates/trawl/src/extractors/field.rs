// ABOUTME: FieldSpec (serde configuration) and FieldExtractor (compiled, evaluable field).
// ABOUTME: Evaluation never aborts a document: query and parser failures log a warning and yield Null.

//! Declarative field extraction.
//!
//! Pipeline for one evaluation:
//!
//! 1. query the selector union (values arrive trimmed, empty strings dropped);
//! 2. no match → `Null`; single mode → first value; array mode → all values;
//! 3. declarative transforms, then the custom parser hook;
//! 4. normalization of every string value.
//!
//! Any failure in 1 or 3–4 is logged and the field resolves to `Null`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::{Document, Documents, Extracted, SourceKey, Value};
use crate::error::HarvestError;
use crate::extractors::normalize::NormalizationTable;
use crate::extractors::select::{query, SelectorSpec};
use crate::extractors::transform::{ParserFn, Transform, TransformSpec};

/// Configuration for extracting a single field, as written in site files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// Path expressions joined by OR
    pub selectors: SelectorSpec,
    /// Named document to read from when evaluated against an item's documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKey>,
    /// Canonical value → raw variants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<NormalizationTable>,
    /// Return every match instead of the first
    #[serde(default, alias = "allow_multiple")]
    pub array: bool,
    /// Transforms applied before normalization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformSpec>,
}

/// A compiled field, ready to evaluate. Immutable once built and cheap to clone.
#[derive(Clone)]
pub struct FieldExtractor {
    name: String,
    selectors: SelectorSpec,
    source: Option<SourceKey>,
    normalize: Option<NormalizationTable>,
    array: bool,
    transforms: Vec<Transform>,
    parser: Option<ParserFn>,
}

impl fmt::Debug for FieldExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldExtractor")
            .field("name", &self.name)
            .field("selectors", &self.selectors.to_string())
            .field("source", &self.source)
            .field("array", &self.array)
            .field("transforms", &self.transforms.len())
            .field("parser", &self.parser.is_some())
            .finish()
    }
}

impl FieldExtractor {
    /// A single-value field with no source, normalization or transforms.
    pub fn new(name: impl Into<String>, selectors: SelectorSpec) -> Self {
        Self {
            name: name.into(),
            selectors,
            source: None,
            normalize: None,
            array: false,
            transforms: Vec::new(),
            parser: None,
        }
    }

    /// Compiles a field from its configuration.
    pub fn from_spec(name: impl Into<String>, spec: &FieldSpec) -> Result<Self, HarvestError> {
        let name = name.into();
        let transforms = spec
            .transforms
            .iter()
            .map(Transform::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HarvestError::configuration(format!("field {}", name), e))?;
        Ok(Self {
            name,
            selectors: spec.selectors.clone(),
            source: spec.source,
            normalize: spec.normalize.clone(),
            array: spec.array,
            transforms,
            parser: None,
        })
    }

    pub fn array(mut self, array: bool) -> Self {
        self.array = array;
        self
    }

    pub fn source(mut self, source: SourceKey) -> Self {
        self.source = Some(source);
        self
    }

    pub fn normalize(mut self, table: NormalizationTable) -> Self {
        self.normalize = Some(table);
        self
    }

    pub fn transform(mut self, spec: &TransformSpec) -> Result<Self, HarvestError> {
        let t = Transform::compile(spec)
            .map_err(|e| HarvestError::configuration(format!("field {}", self.name), e))?;
        self.transforms.push(t);
        Ok(self)
    }

    /// Installs a custom parser run after the declarative transforms.
    pub fn with_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(Extracted) -> anyhow::Result<Extracted> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selectors(&self) -> &SelectorSpec {
        &self.selectors
    }

    pub fn source_key(&self) -> Option<SourceKey> {
        self.source
    }

    pub fn is_array(&self) -> bool {
        self.array
    }

    /// Evaluates against a single document.
    pub fn evaluate(&self, doc: &Document) -> Extracted {
        let values = match query(doc, &self.selectors) {
            Ok(values) => values,
            Err(e) => {
                warn!(field = %self.name, selector = %self.selectors, error = %e, "selector query failed");
                return Extracted::Null;
            }
        };

        let mut values = values.into_iter();
        let data = if self.array {
            let all: Vec<Value> = values.collect();
            if all.is_empty() {
                Extracted::Null
            } else {
                Extracted::List(all)
            }
        } else {
            values.next().map(Extracted::Single).unwrap_or_default()
        };

        match self.post_process(data, doc) {
            Ok(data) => data,
            Err(e) => {
                warn!(field = %self.name, error = %e, "field was not processed");
                Extracted::Null
            }
        }
    }

    /// Evaluates against the document named by this field's source key.
    ///
    /// A field without a source key cannot pick a document; that is a configuration
    /// error. A source whose document has not been loaded resolves to `Null`.
    pub fn evaluate_named(&self, docs: &Documents) -> Result<Extracted, HarvestError> {
        let Some(key) = self.source else {
            return Err(HarvestError::configuration(
                format!("field {}", self.name),
                "evaluating against named documents requires a source key",
            ));
        };
        match docs.get(key) {
            Some(doc) => Ok(self.evaluate(doc)),
            None => {
                warn!(field = %self.name, source = ?key, "source document is not loaded");
                Ok(Extracted::Null)
            }
        }
    }

    fn post_process(&self, mut data: Extracted, doc: &Document) -> anyhow::Result<Extracted> {
        for t in &self.transforms {
            data = t.apply(data, doc.base())?;
        }
        if let Some(parser) = &self.parser {
            data = parser(data)?;
        }
        data = drop_empty(data);

        if !self.array {
            data = match data {
                Extracted::List(vs) => vs.into_iter().next().map(Extracted::Single).unwrap_or_default(),
                other => other,
            };
        }

        if let Some(table) = &self.normalize {
            data = normalize_all(data, table);
        }
        Ok(data)
    }
}

fn drop_empty(data: Extracted) -> Extracted {
    let keep = |v: &Value| !matches!(v, Value::Text(s) if s.is_empty());
    match data {
        Extracted::Single(v) if !keep(&v) => Extracted::Null,
        Extracted::List(vs) => {
            let vs: Vec<Value> = vs.into_iter().filter(keep).collect();
            if vs.is_empty() {
                Extracted::Null
            } else {
                Extracted::List(vs)
            }
        }
        other => other,
    }
}

fn normalize_all(data: Extracted, table: &NormalizationTable) -> Extracted {
    let norm = |v: Value| match v {
        Value::Text(s) => Value::Text(table.normalize(&s).to_string()),
        node => node,
    };
    match data {
        Extracted::Null => Extracted::Null,
        Extracted::Single(v) => Extracted::Single(norm(v)),
        Extracted::List(vs) => Extracted::List(vs.into_iter().map(norm).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"
        <html><body>
            <h1> Trail Runner  X </h1>
            <ul>
                <li class="spec">км/г</li>
                <li class="spec">kg</li>
                <li class="spec">mi/h</li>
            </ul>
            <span class="price">1 299 UAH</span>
        </body></html>
    "#;

    fn spec(selectors: &[&str]) -> SelectorSpec {
        SelectorSpec::new(selectors).unwrap()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn single_mode_returns_first_value() {
        let doc = Document::parse(PAGE);
        let field = FieldExtractor::new("spec", spec(&["li.spec::text"]));
        assert_eq!(field.evaluate(&doc), Extracted::Single(text("км/г")));
    }

    #[test]
    fn array_mode_returns_all_values() {
        let doc = Document::parse(PAGE);
        let field = FieldExtractor::new("spec", spec(&["li.spec::text"])).array(true);
        assert_eq!(
            field.evaluate(&doc),
            Extracted::List(vec![text("км/г"), text("kg"), text("mi/h")])
        );
    }

    #[test]
    fn no_match_is_null() {
        let doc = Document::parse(PAGE);
        let field = FieldExtractor::new("missing", spec(&["table td::text"])).array(true);
        assert!(field.evaluate(&doc).is_null());
    }

    #[test]
    fn normalization_applies_to_each_value() {
        let doc = Document::parse(PAGE);
        let table = NormalizationTable::new()
            .entry("km/h", ["км/г"])
            .unwrap()
            .entry("mph", ["mi/h"])
            .unwrap();
        let field = FieldExtractor::new("spec", spec(&["li.spec::text"]))
            .array(true)
            .normalize(table);
        assert_eq!(
            field.evaluate(&doc),
            Extracted::List(vec![text("km/h"), text("kg"), text("mph")])
        );
    }

    #[test]
    fn parser_error_resolves_to_null() {
        let doc = Document::parse(PAGE);
        let field = FieldExtractor::new("title", spec(&["h1::text"]))
            .with_parser(|_| Err(anyhow::anyhow!("boom")));
        assert!(field.evaluate(&doc).is_null());
    }

    #[test]
    fn parser_list_is_coerced_in_single_mode() {
        let doc = Document::parse(PAGE);
        let field = FieldExtractor::new("title", spec(&["h1::text"]))
            .with_parser(|data| Ok(Extracted::List(data.into_values())));
        let out = field.evaluate(&doc);
        assert_eq!(out, Extracted::Single(text("Trail Runner X")));
    }

    #[test]
    fn parser_empty_string_becomes_null() {
        let doc = Document::parse(PAGE);
        let field = FieldExtractor::new("title", spec(&["h1::text"]))
            .with_parser(|_| Ok(Extracted::Single(Value::Text(String::new()))));
        assert!(field.evaluate(&doc).is_null());
    }

    #[test]
    fn transforms_run_before_normalization() {
        let doc = Document::parse(PAGE);
        let field_spec: FieldSpec = serde_json::from_str(
            r#"{
                "selectors": ["span.price::text"],
                "transforms": [
                    {"type": "replace", "pattern": "\\s+", "with": ""},
                    {"type": "regex", "pattern": "(\\d+)UAH"}
                ],
                "normalize": {"free": ["0"]}
            }"#,
        )
        .unwrap();
        let field = FieldExtractor::from_spec("price", &field_spec).unwrap();
        assert_eq!(field.evaluate(&doc), Extracted::Single(text("1299")));
    }

    #[test]
    fn named_evaluation_requires_source() {
        let docs = Documents::new(Document::parse(PAGE));
        let field = FieldExtractor::new("title", spec(&["h1::text"]));
        let err = field.evaluate_named(&docs).unwrap_err();
        assert!(err.is_configuration());

        let field = field.source(SourceKey::Parent);
        assert_eq!(
            field.evaluate_named(&docs).unwrap(),
            Extracted::Single(text("Trail Runner X"))
        );
    }

    #[test]
    fn named_evaluation_with_missing_document_is_null() {
        let docs = Documents::new(Document::parse(PAGE));
        let field = FieldExtractor::new("title", spec(&["h1::text"])).source(SourceKey::Child);
        assert!(field.evaluate_named(&docs).unwrap().is_null());
    }

    #[test]
    fn spec_rejects_unknown_keys_and_bad_transforms() {
        assert!(serde_json::from_str::<FieldSpec>(r#"{"selectors": ["h1"], "arary": true}"#).is_err());
        let spec: FieldSpec = serde_json::from_str(
            r#"{"selectors": ["h1"], "transforms": [{"type": "regex", "pattern": "("}]}"#,
        )
        .unwrap();
        assert!(FieldExtractor::from_spec("bad", &spec).unwrap_err().is_configuration());
    }

    #[test]
    fn spec_accepts_allow_multiple_alias() {
        let spec: FieldSpec =
            serde_json::from_str(r#"{"selectors": ["li"], "allow_multiple": true}"#).unwrap();
        assert!(spec.array);
    }
}
