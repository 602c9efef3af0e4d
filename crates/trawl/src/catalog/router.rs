// ABOUTME: Router: maps a catalog URL to the site bundle configured for it.
// ABOUTME: Patterns are tried in order and anchored at the start of the URL; first match wins.

use std::sync::Arc;

use anyhow::anyhow;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::catalog::item::{ItemAggregator, ItemPage};
use crate::catalog::walker::{CatalogPage, CatalogWalker};
use crate::error::HarvestError;
use crate::loader::driver::DriverFactory;
use crate::loader::options::LoaderConfig;

/// Everything needed to mine one site.
#[derive(Debug, Clone)]
pub struct SiteBundle {
    pub name: String,
    pub catalog_loader: Arc<LoaderConfig>,
    pub item_loader: Arc<LoaderConfig>,
    pub catalog: Arc<CatalogPage>,
    pub item: Arc<ItemPage>,
}

impl SiteBundle {
    pub fn validate(&self) -> Result<(), HarvestError> {
        let tag = |e: HarvestError| {
            HarvestError::configuration(format!("site {}", self.name), e)
        };
        self.catalog_loader.validate().map_err(tag)?;
        self.item_loader.validate().map_err(tag)?;
        self.catalog.validate().map_err(tag)?;
        self.item.validate().map_err(tag)
    }
}

/// Ordered pattern → bundle table.
#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<(Regex, SiteBundle)>,
}

impl Router {
    /// Validates every bundle up front.
    pub fn new(routes: Vec<(Regex, SiteBundle)>) -> Result<Self, HarvestError> {
        for (_, bundle) in &routes {
            bundle.validate()?;
        }
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn site_names(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(_, b)| b.name.as_str())
    }

    /// The bundle for the first pattern matching `url`.
    pub fn route(&self, url: &str) -> Result<&SiteBundle, HarvestError> {
        check_url(url)?;
        let bundle = self
            .routes
            .iter()
            .find(|(pattern, _)| pattern.find(url).is_some_and(|m| m.start() == 0))
            .map(|(_, bundle)| bundle)
            .ok_or_else(|| HarvestError::routing(url, "Route"))?;
        debug!(url, site = %bundle.name, "routed");
        Ok(bundle)
    }

    /// A walker for the catalog at `url`.
    pub fn catalog(
        &self,
        url: &str,
        depth: u32,
        drivers: Arc<dyn DriverFactory>,
    ) -> Result<CatalogWalker, HarvestError> {
        let bundle = self.route(url)?;
        CatalogWalker::new(
            Arc::clone(&bundle.catalog),
            Arc::clone(&bundle.catalog_loader),
            drivers,
            depth,
        )
    }

    /// The aggregator for items of the catalog at `url`.
    pub fn aggregator(
        &self,
        url: &str,
        drivers: Arc<dyn DriverFactory>,
    ) -> Result<ItemAggregator, HarvestError> {
        let bundle = self.route(url)?;
        Ok(ItemAggregator::new(
            Arc::clone(&bundle.item),
            Arc::clone(&bundle.item_loader),
            drivers,
        ))
    }
}

fn check_url(url: &str) -> Result<(), HarvestError> {
    let parsed = Url::parse(url)
        .map_err(|e| HarvestError::invalid_url(url, "Route", Some(anyhow!("invalid URL: {}", e))))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HarvestError::invalid_url(
            url,
            "Route",
            Some(anyhow!("scheme must be http or https")),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(HarvestError::invalid_url(
            url,
            "Route",
            Some(anyhow!("URL has no host")),
        ));
    }
    Ok(())
}
