// ABOUTME: ItemPage configuration and the ItemAggregator that turns one teaser into a Record.
// ABOUTME: Decodes the teaser, resolves and loads the detail page, applies the field map, validates.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::catalog::datamap::FieldMap;
use crate::catalog::record::{Record, RecordValidator};
use crate::document::{Documents, Node, TeaserReference};
use crate::error::HarvestError;
use crate::extractors::field::FieldExtractor;
use crate::loader::driver::DriverFactory;
use crate::loader::options::LoaderConfig;
use crate::loader::page::{fetch_page, RenderedPage};

/// How an item's detail page is found and mined.
#[derive(Clone)]
pub struct ItemPage {
    name: String,
    child: FieldExtractor,
    datamap: FieldMap,
    validator: Option<Arc<dyn RecordValidator>>,
    base_url: Option<Url>,
}

impl fmt::Debug for ItemPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemPage")
            .field("name", &self.name)
            .field("child", &self.child)
            .field("datamap", &self.datamap)
            .field("validator", &self.validator.is_some())
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ItemPage {
    /// Checks the child field is single-valued and every mapped field has a source.
    pub fn new(
        name: impl Into<String>,
        child: FieldExtractor,
        datamap: FieldMap,
    ) -> Result<Self, HarvestError> {
        let page = Self {
            name: name.into(),
            child,
            datamap,
            validator: None,
            base_url: None,
        };
        page.validate()?;
        Ok(page)
    }

    pub fn with_validator(mut self, validator: Arc<dyn RecordValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Base for relative child URLs when the teaser carries none.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datamap(&self) -> &FieldMap {
        &self.datamap
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.child.is_array() {
            return Err(HarvestError::configuration(
                format!("item {}", self.name),
                "the child field must return a single value",
            ));
        }
        self.datamap.validate_sources()
    }

    /// Resolves the detail page URL from the teaser.
    fn target(&self, teaser: &Node) -> Result<Url, HarvestError> {
        let extracted = self.child.evaluate(&teaser.document());
        let raw = extracted.single().and_then(|v| v.link()).ok_or_else(|| {
            let reason = match extracted.single() {
                Some(_) => anyhow!("child field {} matched an element without href", self.child.name()),
                None => anyhow!("child field {} is empty", self.child.name()),
            };
            HarvestError::unresolved_target(
                teaser.base().map(Url::as_str).unwrap_or_default(),
                self.name.as_str(),
                Some(reason),
            )
        })?;

        let base = teaser.base().or(self.base_url.as_ref());
        let joined = match base {
            Some(base) => base.join(&raw),
            None => Url::parse(&raw),
        };
        joined.map_err(|e| {
            HarvestError::invalid_url(
                raw.as_str(),
                self.name.as_str(),
                Some(anyhow!("cannot resolve child URL: {}", e)),
            )
        })
    }

    /// Applies the field map to the teaser and the loaded page, then validates.
    fn assemble(&self, teaser: &Node, page: &RenderedPage) -> Record {
        let docs = Documents::new(teaser.document()).with_child(page.document());
        let data = self.datamap.evaluate(&docs);

        let Some(validator) = &self.validator else {
            return Record::valid(page.url.as_str(), data);
        };
        match validator.validate(&Value::Object(data.clone())) {
            Ok(Value::Object(validated)) => Record::valid(page.url.as_str(), validated),
            Ok(other) => Record::bad_data(
                page.url.as_str(),
                data,
                format!("validator returned a non-object: {}", other),
            ),
            Err(e) => {
                warn!(item = %self.name, url = %page.url, error = %e, "record failed validation");
                Record::bad_data(page.url.as_str(), data, e)
            }
        }
    }
}

/// Builds records for one site. Clones share configuration.
#[derive(Clone)]
pub struct ItemAggregator {
    page: Arc<ItemPage>,
    loader: Arc<LoaderConfig>,
    drivers: Arc<dyn DriverFactory>,
}

impl ItemAggregator {
    pub fn new(page: Arc<ItemPage>, loader: Arc<LoaderConfig>, drivers: Arc<dyn DriverFactory>) -> Self {
        Self {
            page,
            loader,
            drivers,
        }
    }

    pub fn name(&self) -> &str {
        self.page.name()
    }

    /// Builds one record.
    ///
    /// A teaser that does not decode is a `MalformedReference` error tagged with the
    /// aggregator name. An empty child URL is `UnresolvedTarget`. A record that fails
    /// validation comes back flagged as bad data.
    pub async fn build(&self, teaser: &TeaserReference) -> Result<Record, HarvestError> {
        let node = teaser
            .resolve()
            .map_err(|e| HarvestError::malformed_reference(self.page.name.as_str(), Some(e)))?;
        let url = self.page.target(&node)?;
        debug!(item = %self.page.name, url = %url, "loading item");

        let page = fetch_page(Arc::clone(&self.loader), Arc::clone(&self.drivers), url.as_str()).await?;
        Ok(self.page.assemble(&node, &page))
    }
}
