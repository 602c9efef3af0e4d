// ABOUTME: CatalogWalker: follows listing pages to the configured depth and collects teasers in order.
// ABOUTME: Harvests items concurrently on a bounded JoinSet, keeping whatever succeeds.

//! Pagination and harvesting.
//!
//! `depth` bounds the number of listing pages: `1` loads only the start page,
//! `n > 1` follows the next pointer up to `n` pages in total, and `0` follows it
//! until the pointer is absent. A catalog without a next pointer only accepts
//! depth 1.
//!
//! Item harvesting is best effort. [`CatalogWalker::mine`] returns records in
//! completion order and leaves out items that failed or came back as bad data;
//! [`CatalogWalker::items`] runs sequentially and reports every outcome in order.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::item::ItemAggregator;
use crate::catalog::record::Record;
use crate::document::{encode_node, Node, TeaserReference, Value};
use crate::error::HarvestError;
use crate::extractors::field::FieldExtractor;
use crate::loader::driver::DriverFactory;
use crate::loader::options::LoaderConfig;
use crate::loader::page::{fetch_page, RenderedPage};

/// How a listing page is read: the teaser list and the optional next pointer.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    name: String,
    items: FieldExtractor,
    next: Option<FieldExtractor>,
}

impl CatalogPage {
    pub fn new(
        name: impl Into<String>,
        items: FieldExtractor,
        next: Option<FieldExtractor>,
    ) -> Result<Self, HarvestError> {
        let page = Self {
            name: name.into(),
            items,
            next,
        };
        page.validate()?;
        Ok(page)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        let op = format!("catalog {}", self.name);
        if !self.items.is_array() {
            return Err(HarvestError::configuration(
                op,
                "the items field must return every match",
            ));
        }
        if self.next.as_ref().is_some_and(FieldExtractor::is_array) {
            return Err(HarvestError::configuration(
                op,
                "the next field must return a single value",
            ));
        }
        Ok(())
    }

    /// Teasers tagged with the page URL, and the resolved next page if any.
    fn harvest(&self, page: &RenderedPage) -> (Vec<Node>, Option<String>) {
        let doc = page.document();
        let base = doc.base().cloned();

        let mut teasers = Vec::new();
        for value in self.items.evaluate(&doc).into_values() {
            match value {
                Value::Node(node) => teasers.push(node.with_base(base.clone())),
                Value::Text(text) => {
                    warn!(url = %page.url, value = %text, "items field returned text, skipping");
                }
            }
        }

        let next = self
            .next
            .as_ref()
            .and_then(|f| {
                let link = f.evaluate(&doc).single()?.link();
                if link.is_none() {
                    warn!(url = %page.url, "next field matched an element without href");
                }
                link
            })
            .and_then(|raw| {
                let resolved = match &base {
                    Some(base) => base.join(&raw),
                    None => Url::parse(&raw),
                };
                match resolved {
                    Ok(url) => Some(url.to_string()),
                    Err(e) => {
                        warn!(url = %page.url, next = %raw, error = %e, "next pointer is not a URL");
                        None
                    }
                }
            });
        (teasers, next)
    }
}

/// Walks one catalog and harvests its items.
pub struct CatalogWalker {
    page: Arc<CatalogPage>,
    loader: Arc<LoaderConfig>,
    drivers: Arc<dyn DriverFactory>,
    depth: u32,
    teasers: Vec<Node>,
    visited: Vec<String>,
}

impl CatalogWalker {
    /// Fails when `depth` asks for pagination the catalog cannot follow.
    pub fn new(
        page: Arc<CatalogPage>,
        loader: Arc<LoaderConfig>,
        drivers: Arc<dyn DriverFactory>,
        depth: u32,
    ) -> Result<Self, HarvestError> {
        if !page.has_next() && depth != 1 {
            return Err(HarvestError::configuration(
                format!("catalog {}", page.name),
                format!("depth {} needs a next field; only depth 1 is allowed", depth),
            ));
        }
        Ok(Self {
            page,
            loader,
            drivers,
            depth,
            teasers: Vec::new(),
            visited: Vec::new(),
        })
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Listing pages loaded so far, in order.
    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    /// Loads listing pages from `start_url` and appends their teasers.
    ///
    /// A failure on the first page is returned. A failure on a later page stops the
    /// walk and keeps what was collected.
    pub async fn walk(&mut self, start_url: &str) -> Result<&[Node], HarvestError> {
        let first = self.teasers.len();
        let mut url = start_url.to_string();
        let mut pages: u32 = 0;

        loop {
            let page = match fetch_page(
                Arc::clone(&self.loader),
                Arc::clone(&self.drivers),
                &url,
            )
            .await
            {
                Ok(page) => page,
                Err(e) if pages == 0 => return Err(e),
                Err(e) => {
                    warn!(url = %url, error = %e, "listing page failed, stopping walk");
                    break;
                }
            };
            pages += 1;
            self.visited.push(url.clone());

            let (teasers, next) = self.page.harvest(&page);
            info!(url = %url, page = pages, teasers = teasers.len(), "listing page harvested");
            self.teasers.extend(teasers);

            if self.depth != 0 && pages >= self.depth {
                break;
            }
            match next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(&self.teasers[first..])
    }

    /// Every teaser collected so far, optionally in transport form.
    pub fn list_teasers(&self, base64: bool) -> Vec<TeaserReference> {
        self.teasers
            .iter()
            .map(|node| {
                if base64 {
                    TeaserReference::Encoded(encode_node(node))
                } else {
                    TeaserReference::Node(node.clone())
                }
            })
            .collect()
    }

    /// Harvests every collected teaser on `workers` concurrent tasks.
    pub async fn mine(
        &self,
        aggregator: &ItemAggregator,
        workers: usize,
    ) -> Result<Vec<Record>, HarvestError> {
        harvest(aggregator, self.list_teasers(false), workers).await
    }

    /// Harvests every collected teaser one at a time, in order.
    pub async fn items(&self, aggregator: &ItemAggregator) -> Vec<Result<Record, HarvestError>> {
        let mut out = Vec::with_capacity(self.teasers.len());
        for node in &self.teasers {
            out.push(aggregator.build(&TeaserReference::Node(node.clone())).await);
        }
        out
    }
}

/// What a batch produced: the records kept, and how many items were left out.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub records: Vec<Record>,
    pub failed: usize,
}

/// Builds records for `teasers` on at most `workers` concurrent tasks.
///
/// Records arrive in completion order. Failed items, panicked tasks and bad-data
/// records are logged and left out; only `workers == 0` is an error.
pub async fn harvest(
    aggregator: &ItemAggregator,
    teasers: Vec<TeaserReference>,
    workers: usize,
) -> Result<Vec<Record>, HarvestError> {
    harvest_report(aggregator, teasers, workers)
        .await
        .map(|report| report.records)
}

/// Like [`harvest`], also counting the items that were left out.
pub async fn harvest_report(
    aggregator: &ItemAggregator,
    teasers: Vec<TeaserReference>,
    workers: usize,
) -> Result<HarvestReport, HarvestError> {
    if workers == 0 {
        return Err(HarvestError::configuration(
            format!("harvest {}", aggregator.name()),
            "worker count must be at least 1",
        ));
    }

    let started = Instant::now();
    let total = teasers.len();
    let slots = Arc::new(Semaphore::new(workers));
    let mut join_set = JoinSet::new();

    for (index, teaser) in teasers.into_iter().enumerate() {
        let aggregator = aggregator.clone();
        let slots = Arc::clone(&slots);
        join_set.spawn(async move {
            let _permit = slots
                .acquire_owned()
                .await
                .map_err(|e| HarvestError::invalid_state("", "Harvest", e))?;
            debug!(index, "item started");
            aggregator.build(&teaser).await
        });
    }

    let mut records = Vec::with_capacity(total);
    let mut failed = 0usize;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(record)) if record.is_valid() => records.push(record),
            Ok(Ok(record)) => {
                failed += 1;
                warn!(
                    url = %record.url,
                    error = record.error.as_deref().unwrap_or_default(),
                    "bad data excluded"
                );
            }
            Ok(Err(e)) => {
                failed += 1;
                warn!(url = %e.url, error = %e, "item failed");
            }
            Err(join_err) => {
                failed += 1;
                warn!(error = %join_err, "item task aborted");
            }
        }
    }

    info!(
        aggregator = aggregator.name(),
        total,
        harvested = records.len(),
        failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "harvest finished"
    );
    Ok(HarvestReport { records, failed })
}
