// ABOUTME: Path expressions (CSS plus ::text / ::attr(name) projections) and SelectorSpec unions.
// ABOUTME: Evaluates a SelectorSpec against a Document, returning values in document order.

//! Selector-based querying.
//!
//! A path expression is a CSS selector with an optional projection suffix:
//!
//! - `li.teaser` returns the matched element nodes;
//! - `h1.title::text` returns whitespace-normalized text;
//! - `a.next::attr(href)` returns trimmed attribute values.
//!
//! A [`SelectorSpec`] is an ordered, non-empty set of expressions evaluated as
//! one union: elements come back in document order. When several expressions
//! match the same element, each of them projects it in configuration order, so
//! `["a::attr(data-href)", "a::attr(href)"]` falls back to `href`. Identical
//! projections of one element are returned once. Empty strings are never returned.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::{normalize_whitespace, Document, Node, Value};
use crate::extractors::compiled::{get_or_compile, precompile_selectors};

static ATTR_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"::attr\(\s*([^()\s]+)\s*\)\s*$").expect("valid regex"));

const TEXT_SUFFIX: &str = "::text";

/// A failed query: the expression does not compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector {expr:?}: {message}")]
pub struct QueryError {
    pub expr: String,
    pub message: String,
}

/// What a path expression yields for each matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Node,
    Text,
    Attr(String),
}

/// One parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    raw: String,
    css: String,
    projection: Projection,
}

impl PathExpr {
    /// Parses and compiles a path expression.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let fail = |message: &str| QueryError {
            expr: raw.to_string(),
            message: message.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(fail("empty expression"));
        }

        let (css, projection) = if let Some(css) = trimmed.strip_suffix(TEXT_SUFFIX) {
            (css, Projection::Text)
        } else if let Some(caps) = ATTR_SUFFIX_RE.captures(trimmed) {
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(trimmed.len());
            (&trimmed[..whole], Projection::Attr(caps[1].to_string()))
        } else {
            (trimmed, Projection::Node)
        };

        let css = css.trim();
        if css.is_empty() {
            return Err(fail("projection without a selector"));
        }
        get_or_compile(css).map_err(|message| fail(&message))?;

        Ok(Self {
            raw: raw.to_string(),
            css: css.to_string(),
            projection,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The CSS part, without projection.
    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }
}

/// An ordered, non-empty disjunction of path expressions. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SelectorSpec {
    exprs: Vec<PathExpr>,
    union: String,
}

impl SelectorSpec {
    /// Builds a spec, rejecting empty sets and invalid members.
    pub fn new<I, S>(exprs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let exprs = exprs
            .into_iter()
            .map(|s| PathExpr::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if exprs.is_empty() {
            return Err(QueryError {
                expr: String::new(),
                message: "selector set is empty".to_string(),
            });
        }
        let union = exprs
            .iter()
            .map(|e| e.css.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        precompile_selectors([union.as_str()]);
        Ok(Self { exprs, union })
    }

    /// Single-expression convenience.
    pub fn one(expr: &str) -> Result<Self, QueryError> {
        Self::new([expr])
    }

    pub fn exprs(&self) -> &[PathExpr] {
        &self.exprs
    }

    /// Combined CSS selector list used to match the union in one pass.
    pub fn union_css(&self) -> &str {
        &self.union
    }
}

impl TryFrom<Vec<String>> for SelectorSpec {
    type Error = QueryError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SelectorSpec> for Vec<String> {
    fn from(spec: SelectorSpec) -> Self {
        spec.exprs.into_iter().map(|e| e.raw).collect()
    }
}

impl fmt::Display for SelectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .exprs
            .iter()
            .map(|e| e.raw.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        write!(f, "{}", joined)
    }
}

/// Evaluates `spec` against `doc`, returning every value in document order.
pub fn query(doc: &Document, spec: &SelectorSpec) -> Result<Vec<Value>, QueryError> {
    let compile = |css: &str| {
        get_or_compile(css).map_err(|message| QueryError {
            expr: css.to_string(),
            message,
        })
    };

    let union = compile(spec.union_css())?;
    let members = spec
        .exprs
        .iter()
        .map(|e| compile(&e.css).map(|sel| (sel, &e.projection)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for el in doc.tree().select(&union) {
        let mut seen: Vec<&Projection> = Vec::new();
        for (_, projection) in members.iter().filter(|(sel, _)| sel.matches(&el)) {
            if seen.contains(projection) {
                continue;
            }
            seen.push(projection);
            match projection {
                Projection::Node => out.push(Value::Node(Node::from_element(&el, doc.base()))),
                Projection::Text => {
                    let text = normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "));
                    if !text.is_empty() {
                        out.push(Value::Text(text));
                    }
                }
                Projection::Attr(name) => {
                    if let Some(v) = el.value().attr(name) {
                        let trimmed = v.trim();
                        if !trimmed.is_empty() {
                            out.push(Value::Text(trimmed.to_string()));
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Counts elements matching the CSS part of `expr`. Used by drivers for presence checks.
pub fn count_matches(doc: &Document, expr: &str) -> Result<usize, QueryError> {
    let parsed = PathExpr::parse(expr)?;
    let sel = get_or_compile(parsed.css()).map_err(|message| QueryError {
        expr: expr.to_string(),
        message,
    })?;
    Ok(doc.tree().select(&sel).count())
}
