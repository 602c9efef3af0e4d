// ABOUTME: In-memory driver serving fixed markup per URL, with click-driven page transitions.
// ABOUTME: Used for offline runs and tests; counts opened and closed sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::trace;

use crate::document::Document;
use crate::extractors::select::count_matches;
use crate::loader::driver::{Driver, DriverError, DriverFactory, ElementHandle, Key};
use crate::loader::options::RenderOptions;

#[derive(Debug, Default)]
struct SessionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

/// A site held in memory. Cloning shares the session counters.
#[derive(Debug, Clone, Default)]
pub struct MemorySite {
    pages: HashMap<String, String>,
    transitions: HashMap<(String, String), Vec<String>>,
    latency: Duration,
    stats: Arc<SessionStats>,
}

impl MemorySite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `markup` at `url`.
    pub fn page(mut self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        self.pages.insert(url.into(), markup.into());
        self
    }

    /// Each action on `selector` while at `url` replaces the page with the next of `states`.
    /// Actions past the last state leave the page unchanged.
    pub fn on_click(
        mut self,
        url: impl Into<String>,
        selector: impl Into<String>,
        states: Vec<String>,
    ) -> Self {
        self.transitions.insert((url.into(), selector.into()), states);
        self
    }

    /// Delay applied to every navigation and action.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn opened_sessions(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in order, across all sessions.
    pub fn navigations(&self) -> Vec<String> {
        self.stats
            .navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl DriverFactory for MemorySite {
    async fn open(&self, _options: &RenderOptions) -> Result<Box<dyn Driver>, DriverError> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryDriver {
            site: self.clone(),
            current: None,
            actions: HashMap::new(),
            closed: false,
        }))
    }
}

/// One session against a [`MemorySite`].
pub struct MemoryDriver {
    site: MemorySite,
    current: Option<(String, String)>,
    actions: HashMap<String, usize>,
    closed: bool,
}

fn contains(markup: &str, selector: &str) -> Result<bool, DriverError> {
    let doc = Document::parse(markup);
    let count = count_matches(&doc, selector).map_err(|e| DriverError::Other(anyhow!(e)))?;
    Ok(count > 0)
}

impl MemoryDriver {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    fn markup(&self) -> Result<&str, DriverError> {
        self.check_open()?;
        self.current
            .as_ref()
            .map(|(_, markup)| markup.as_str())
            .ok_or(DriverError::NoPage)
    }

    async fn wait(&mut self, selector: &str, timeout: Duration) -> Result<ElementHandle, DriverError> {
        if contains(self.markup()?, selector)? {
            return Ok(ElementHandle(selector.to_string()));
        }
        // Pages only change through actions, so a miss stays a miss.
        tokio::time::sleep(timeout).await;
        Err(DriverError::Timeout {
            selector: selector.to_string(),
            waited: timeout,
        })
    }

    async fn act(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.markup()?;
        tokio::time::sleep(self.site.latency).await;
        let Some((url, markup)) = self.current.as_mut() else {
            return Err(DriverError::NoPage);
        };
        let key = (url.clone(), element.0.clone());
        if let Some(states) = self.site.transitions.get(&key) {
            let done = self.actions.entry(element.0.clone()).or_insert(0);
            if let Some(next) = states.get(*done) {
                *markup = next.clone();
                *done += 1;
            }
        }
        trace!(url = %key.0, selector = %key.1, "memory action");
        Ok(())
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.check_open()?;
        tokio::time::sleep(self.site.latency).await;
        self.site
            .stats
            .navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        let markup = self
            .site
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| DriverError::Navigation {
                url: url.to_string(),
                message: "404 not found".to_string(),
            })?;
        self.current = Some((url.to_string(), markup));
        self.actions.clear();
        Ok(())
    }

    async fn wait_for_clickable(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        self.wait(selector, timeout).await
    }

    async fn wait_for_presence(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        self.wait(selector, timeout).await
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.act(element).await
    }

    async fn send_key(&mut self, element: &ElementHandle, _key: Key) -> Result<(), DriverError> {
        self.act(element).await
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        self.markup().map(str::to_string)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.check_open()?;
        self.closed = true;
        self.site.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
