// ABOUTME: Parsed documents, owned node handles, extracted values and teaser transport encoding.
// ABOUTME: Node markup travels between tasks as owned strings; trees are parsed on demand.

//! Documents and values.
//!
//! A [`Document`] is a parsed `scraper` tree. Trees are not `Send`, so anything
//! that crosses a task boundary (teasers, rendered pages, record values) is kept
//! as owned markup and re-parsed where it is queried.

use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use url::Url;

/// A parsed, queryable document tree.
#[derive(Debug)]
pub struct Document {
    html: Html,
    base: Option<Url>,
}

impl Document {
    /// Parses a complete page.
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
            base: None,
        }
    }

    /// Parses a markup fragment such as a serialized teaser node.
    ///
    /// Table parts and list options are wrapped in the parents the HTML parser
    /// needs to keep them, so `<tr>` or `<option>` teasers stay queryable.
    pub fn fragment(markup: &str) -> Self {
        Self {
            html: parse_in_context(markup),
            base: None,
        }
    }

    /// Attaches the URL relative links in this document resolve against.
    pub fn with_base(mut self, base: Option<Url>) -> Self {
        self.base = base;
        self
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub(crate) fn tree(&self) -> &Html {
        &self.html
    }

    /// Serializes the whole tree back to markup.
    pub fn html(&self) -> String {
        self.html.html()
    }
}

/// An owned handle to one element: its serialized outer markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    markup: String,
    base: Option<Url>,
}

impl Node {
    pub(crate) fn from_element(el: &ElementRef<'_>, base: Option<&Url>) -> Self {
        Self {
            markup: el.html(),
            base: base.cloned(),
        }
    }

    /// Parses `markup` and keeps its first top-level element.
    pub fn parse(markup: &str) -> anyhow::Result<Self> {
        let fragment = parse_in_context(markup);
        let first = leading_element(&fragment, markup)
            .ok_or_else(|| anyhow!("markup contains no element"))?;
        Ok(Self::from_element(&first, None))
    }

    /// Serialized outer markup of the element.
    pub fn html(&self) -> &str {
        &self.markup
    }

    /// The page this node was harvested from, when known.
    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub fn with_base(mut self, base: Option<Url>) -> Self {
        self.base = base;
        self
    }

    /// Parses the node into its own document for further queries.
    pub fn document(&self) -> Document {
        Document::fragment(&self.markup).with_base(self.base.clone())
    }

    /// Whitespace-normalized text content.
    pub fn text(&self) -> String {
        let doc = parse_in_context(&self.markup);
        let text = leading_element(&doc, &self.markup)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        normalize_whitespace(&text)
    }

    /// Inner markup of the element.
    pub fn inner_html(&self) -> String {
        let doc = parse_in_context(&self.markup);
        leading_element(&doc, &self.markup)
            .map(|el| el.inner_html())
            .unwrap_or_default()
    }

    /// Trimmed value of an attribute on the element itself.
    pub fn attr(&self, name: &str) -> Option<String> {
        let doc = parse_in_context(&self.markup);
        leading_element(&doc, &self.markup)
            .and_then(|el| el.value().attr(name).map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty())
    }
}

/// One extracted value: a trimmed string or a node handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Node(Node),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            Value::Text(_) => None,
        }
    }

    /// A URL-like reading: text as is, a node through its `href` attribute.
    pub fn link(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Node(n) => n.attr("href"),
        }
    }

    /// JSON form: strings stay strings, nodes serialize to their markup.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Node(n) => serde_json::Value::String(n.html().to_string()),
        }
    }
}

/// The result of evaluating a field: nothing, one value, or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Extracted {
    #[default]
    Null,
    Single(Value),
    List(Vec<Value>),
}

impl Extracted {
    pub fn is_null(&self) -> bool {
        matches!(self, Extracted::Null)
    }

    /// The single value, if this is one.
    pub fn single(&self) -> Option<&Value> {
        match self {
            Extracted::Single(v) => Some(v),
            _ => None,
        }
    }

    /// The single value as text, if this is a single string.
    pub fn text(&self) -> Option<&str> {
        self.single().and_then(Value::as_text)
    }

    /// Flattens into a list; `Null` becomes empty.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Extracted::Null => Vec::new(),
            Extracted::Single(v) => vec![v],
            Extracted::List(vs) => vs,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Extracted::Null => serde_json::Value::Null,
            Extracted::Single(v) => v.to_json(),
            Extracted::List(vs) => serde_json::Value::Array(vs.iter().map(Value::to_json).collect()),
        }
    }
}

/// Which named document a field reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKey {
    /// The teaser taken from the listing page.
    Parent,
    /// The item's own detail page.
    Child,
}

/// The named documents an item's field map is evaluated against.
pub struct Documents {
    parent: Document,
    child: Option<Document>,
}

impl Documents {
    pub fn new(parent: Document) -> Self {
        Self {
            parent,
            child: None,
        }
    }

    pub fn with_child(mut self, child: Document) -> Self {
        self.child = Some(child);
        self
    }

    pub fn get(&self, key: SourceKey) -> Option<&Document> {
        match key {
            SourceKey::Parent => Some(&self.parent),
            SourceKey::Child => self.child.as_ref(),
        }
    }
}

/// A teaser handle: the node itself, or its base64 transport form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeaserReference {
    Node(Node),
    Encoded(String),
}

impl TeaserReference {
    /// The base64 transport form.
    pub fn encode(&self) -> String {
        match self {
            TeaserReference::Node(n) => encode_node(n),
            TeaserReference::Encoded(s) => s.clone(),
        }
    }

    /// Resolves to a node, decoding the transport form if needed.
    pub fn resolve(&self) -> anyhow::Result<Node> {
        match self {
            TeaserReference::Node(n) => Ok(n.clone()),
            TeaserReference::Encoded(s) => decode_node(s),
        }
    }
}

impl From<Node> for TeaserReference {
    fn from(node: Node) -> Self {
        TeaserReference::Node(node)
    }
}

impl From<String> for TeaserReference {
    fn from(encoded: String) -> Self {
        TeaserReference::Encoded(encoded)
    }
}

impl From<&str> for TeaserReference {
    fn from(encoded: &str) -> Self {
        TeaserReference::Encoded(encoded.to_string())
    }
}

/// Base64 of the node's serialized markup.
pub fn encode_node(node: &Node) -> String {
    STANDARD.encode(node.html().as_bytes())
}

/// Decodes a base64 teaser back into a node.
pub fn decode_node(encoded: &str) -> anyhow::Result<Node> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .context("teaser is not valid base64")?;
    let markup = String::from_utf8(bytes).context("teaser is not valid UTF-8")?;
    Node::parse(&markup).context("teaser is not valid markup")
}

/// Name of the first tag in `markup`, lowercased.
fn leading_tag(markup: &str) -> Option<String> {
    let rest = markup.trim_start().strip_prefix('<')?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

/// Open and close tags the parser needs around a fragment starting with `tag`.
fn fragment_context(tag: &str) -> Option<(&'static str, &'static str)> {
    match tag {
        "tr" => Some(("<table><tbody>", "</tbody></table>")),
        "td" | "th" => Some(("<table><tbody><tr>", "</tr></tbody></table>")),
        "tbody" | "thead" | "tfoot" | "caption" | "colgroup" => Some(("<table>", "</table>")),
        "col" => Some(("<table><colgroup>", "</colgroup></table>")),
        "option" | "optgroup" => Some(("<select>", "</select>")),
        _ => None,
    }
}

/// Parses a fragment inside whatever parents its leading tag requires.
fn parse_in_context(markup: &str) -> Html {
    match leading_tag(markup).as_deref().and_then(fragment_context) {
        Some((open, close)) => Html::parse_fragment(&format!("{}{}{}", open, markup, close)),
        None => Html::parse_fragment(markup),
    }
}

/// The element `markup` starts with, looked up in its parsed fragment.
fn leading_element<'a>(fragment: &'a Html, markup: &str) -> Option<ElementRef<'a>> {
    let root = fragment.root_element();
    let wrapped = leading_tag(markup).filter(|tag| fragment_context(tag).is_some());
    match wrapped {
        Some(tag) => root
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == tag),
        None => root.children().find_map(ElementRef::wrap),
    }
}

/// Collapses runs of whitespace into single spaces and trims.
pub(crate) fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
