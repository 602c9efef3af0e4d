// ABOUTME: Declarative value transforms applied to extracted values before normalization.
// ABOUTME: Covers node-to-text, regex capture/replace, list joining and URL resolution.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::document::{Extracted, Value};

/// A custom parser hook run after the declarative transforms.
pub type ParserFn = Arc<dyn Fn(Extracted) -> anyhow::Result<Extracted> + Send + Sync>;

/// Specifies a transformation to apply to extracted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Replace node handles with their normalized text
    Text,
    /// Replace node handles with their inner markup
    InnerHtml,
    /// Keep capture group `group` of `pattern`; values that do not match are dropped
    Regex {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
    },
    /// Replace every match of `pattern` with `with`
    Replace {
        pattern: String,
        #[serde(default)]
        with: String,
    },
    /// Join a list into one string
    Join {
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Resolve relative URLs against the page the value came from
    AbsoluteUrl,
}

fn default_group() -> usize {
    1
}

fn default_separator() -> String {
    " ".to_string()
}

/// A compiled transform.
#[derive(Debug, Clone)]
pub enum Transform {
    Text,
    InnerHtml,
    Regex { re: Regex, group: usize },
    Replace { re: Regex, with: String },
    Join { separator: String },
    AbsoluteUrl,
}

impl Transform {
    pub fn compile(spec: &TransformSpec) -> Result<Self, String> {
        let compile_re = |pattern: &str| {
            Regex::new(pattern).map_err(|e| format!("invalid transform pattern {:?}: {}", pattern, e))
        };
        Ok(match spec {
            TransformSpec::Text => Transform::Text,
            TransformSpec::InnerHtml => Transform::InnerHtml,
            TransformSpec::Regex { pattern, group } => {
                let re = compile_re(pattern)?;
                if *group >= re.captures_len() {
                    return Err(format!(
                        "transform pattern {:?} has no capture group {}",
                        pattern, group
                    ));
                }
                Transform::Regex { re, group: *group }
            }
            TransformSpec::Replace { pattern, with } => Transform::Replace {
                re: compile_re(pattern)?,
                with: with.clone(),
            },
            TransformSpec::Join { separator } => Transform::Join {
                separator: separator.clone(),
            },
            TransformSpec::AbsoluteUrl => Transform::AbsoluteUrl,
        })
    }

    /// Applies the transform. `base` is the URL of the document the values came from.
    pub fn apply(&self, data: Extracted, base: Option<&Url>) -> anyhow::Result<Extracted> {
        if let Transform::Join { separator } = self {
            return Ok(join(data, separator));
        }
        Ok(match data {
            Extracted::Null => Extracted::Null,
            Extracted::Single(v) => self
                .apply_value(v, base)?
                .map(Extracted::Single)
                .unwrap_or(Extracted::Null),
            Extracted::List(vs) => {
                let mut out = Vec::with_capacity(vs.len());
                for v in vs {
                    if let Some(v) = self.apply_value(v, base)? {
                        out.push(v);
                    }
                }
                if out.is_empty() {
                    Extracted::Null
                } else {
                    Extracted::List(out)
                }
            }
        })
    }

    fn apply_value(&self, value: Value, base: Option<&Url>) -> anyhow::Result<Option<Value>> {
        let out = match (self, value) {
            (Transform::Text, Value::Node(n)) => Value::Text(n.text()),
            (Transform::InnerHtml, Value::Node(n)) => Value::Text(n.inner_html().trim().to_string()),
            (Transform::Regex { re, group }, Value::Text(s)) => {
                match re.captures(&s).and_then(|c| c.get(*group)) {
                    Some(m) => Value::Text(m.as_str().trim().to_string()),
                    None => return Ok(None),
                }
            }
            (Transform::Replace { re, with }, Value::Text(s)) => {
                Value::Text(re.replace_all(&s, with.as_str()).trim().to_string())
            }
            (Transform::AbsoluteUrl, Value::Text(s)) => match base {
                Some(b) => Value::Text(b.join(&s)?.to_string()),
                None => Value::Text(s),
            },
            (_, v) => v,
        };
        match out {
            Value::Text(ref s) if s.is_empty() => Ok(None),
            v => Ok(Some(v)),
        }
    }
}

fn join(data: Extracted, separator: &str) -> Extracted {
    let parts: Vec<String> = data
        .into_values()
        .into_iter()
        .map(|v| match v {
            Value::Text(s) => s,
            Value::Node(n) => n.text(),
        })
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        Extracted::Null
    } else {
        Extracted::Single(Value::Text(parts.join(separator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn regex_keeps_group_and_drops_misses() {
        let t = Transform::compile(&TransformSpec::Regex {
            pattern: r"(\d+)\s*UAH".to_string(),
            group: 1,
        })
        .unwrap();
        let out = t
            .apply(Extracted::List(vec![text("1200 UAH"), text("n/a")]), None)
            .unwrap();
        assert_eq!(out, Extracted::List(vec![text("1200")]));

        let out = t.apply(Extracted::Single(text("free")), None).unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn regex_rejects_missing_group() {
        let spec = TransformSpec::Regex {
            pattern: r"\d+".to_string(),
            group: 1,
        };
        assert!(Transform::compile(&spec).is_err());
    }

    #[test]
    fn replace_then_trim() {
        let t = Transform::compile(&TransformSpec::Replace {
            pattern: r"\s*€".to_string(),
            with: String::new(),
        })
        .unwrap();
        let out = t.apply(Extracted::Single(text("19.99 €")), None).unwrap();
        assert_eq!(out, Extracted::Single(text("19.99")));
    }

    #[test]
    fn join_collapses_list() {
        let t = Transform::compile(&TransformSpec::Join {
            separator: ", ".to_string(),
        })
        .unwrap();
        let out = t
            .apply(Extracted::List(vec![text("red"), text("blue")]), None)
            .unwrap();
        assert_eq!(out, Extracted::Single(text("red, blue")));
        assert!(t.apply(Extracted::Null, None).unwrap().is_null());
    }

    #[test]
    fn text_converts_nodes() {
        let node = Node::parse("<p> Hello <b>world</b> </p>").unwrap();
        let out = Transform::Text
            .apply(Extracted::Single(Value::Node(node)), None)
            .unwrap();
        assert_eq!(out, Extracted::Single(text("Hello world")));
    }

    #[test]
    fn absolute_url_resolves_against_base() {
        let base = Url::parse("https://shop.example.com/search?q=x").unwrap();
        let out = Transform::AbsoluteUrl
            .apply(Extracted::Single(text("/item/7")), Some(&base))
            .unwrap();
        assert_eq!(out, Extracted::Single(text("https://shop.example.com/item/7")));

        let untouched = Transform::AbsoluteUrl
            .apply(Extracted::Single(text("/item/7")), None)
            .unwrap();
        assert_eq!(untouched, Extracted::Single(text("/item/7")));
    }

    #[test]
    fn spec_deserializes_tagged() {
        let specs: Vec<TransformSpec> = serde_json::from_str(
            r#"[{"type": "text"}, {"type": "regex", "pattern": "(\\d+)"}, {"type": "join"}]"#,
        )
        .unwrap();
        assert_eq!(specs[0], TransformSpec::Text);
        assert_eq!(
            specs[1],
            TransformSpec::Regex {
                pattern: r"(\d+)".to_string(),
                group: 1
            }
        );
        assert_eq!(
            specs[2],
            TransformSpec::Join {
                separator: " ".to_string()
            }
        );
    }
}
