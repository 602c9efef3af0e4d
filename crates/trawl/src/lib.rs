// ABOUTME: Main library entry point for the trawl catalog extraction engine.
// ABOUTME: Re-exports the public API: fields, loaders, walkers, aggregators, the router and errors.

//! Trawl - declarative extraction of structured records from web catalogs.
//!
//! A listing page yields teasers, each teaser links to a detail page, and both are
//! mined with declarative field definitions instead of per-site parsing code.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trawl::{config, HarvestError, HttpDriverFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HarvestError> {
//!     let url = "https://shop.example.com/search?q=lamp";
//!     let router = config::load_router("sites.json")?;
//!     let drivers = Arc::new(
//!         HttpDriverFactory::new().map_err(|e| HarvestError::driver("", "Open", Some(e.into())))?,
//!     );
//!     let mut walker = router.catalog(url, 0, drivers.clone())?;
//!     walker.walk(url).await?;
//!     let records = walker.mine(&router.aggregator(url, drivers)?, 4).await?;
//!     println!("{}", records.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod extractors;
pub mod loader;

pub use crate::catalog::{
    harvest, harvest_report, CatalogPage, CatalogWalker, FieldMap, FieldNode, HarvestReport,
    ItemAggregator, ItemPage, Record, RecordValidator, RequiredFields, Router, SiteBundle,
    TypedValidator,
};
pub use crate::document::{
    decode_node, encode_node, Document, Documents, Extracted, Node, SourceKey, TeaserReference,
    Value,
};
pub use crate::error::{ErrorCode, HarvestError, Result};
pub use crate::extractors::field::{FieldExtractor, FieldSpec};
pub use crate::extractors::normalize::NormalizationTable;
pub use crate::extractors::select::{PathExpr, SelectorSpec};
pub use crate::extractors::transform::TransformSpec;
pub use crate::loader::{
    fetch_page, Driver, DriverError, DriverFactory, HttpDriverFactory, LoadState, LoaderConfig,
    LoaderConfigBuilder, MemorySite, Method, PageLoader, RenderOptions, RenderedPage,
};
