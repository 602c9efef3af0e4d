// ABOUTME: PageLoader state machine: navigate, dismiss banners, await required content, interact, capture.
// ABOUTME: Each phase draws on a deadline of the configured budget; only required presence is fatal.

//! Page acquisition.
//!
//! States advance strictly forward:
//! `Created → Requested → Dismissing → AwaitingPresence → Interacting → Ready`,
//! and any state may move to `Closed`. Optional phases with nothing configured
//! are passed through. Once closed, every call fails with a `Closed` error.
//!
//! Each phase starts its own [`Deadline`] of `LoaderConfig::timeout`. Waits inside
//! a phase get whatever remains (zero once spent, which polls once). In the dismiss
//! and interact phases a step that starts after the deadline still runs, is logged
//! and counts toward [`PageLoader::late_steps`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::document::Document;
use crate::error::HarvestError;
use crate::loader::driver::{Driver, DriverError, DriverFactory, Key};
use crate::loader::options::{LoaderConfig, Method};

/// Page loader lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    Created,
    Requested,
    Dismissing,
    AwaitingPresence,
    Interacting,
    Ready,
    Closed,
}

/// A budget measured against the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Time left, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Runs the method-specific action on the first element matching `selector`.
async fn act(
    driver: &mut dyn Driver,
    method: Method,
    selector: &str,
    wait: Duration,
) -> Result<(), DriverError> {
    let element = driver.wait_for_clickable(selector, wait).await?;
    match method {
        Method::Mouse => driver.click(&element).await,
        Method::Enter => driver.send_key(&element, Key::Enter).await,
        Method::Space => driver.send_key(&element, Key::Space).await,
    }
}

/// Loads one page through one driver session.
pub struct PageLoader {
    config: Arc<LoaderConfig>,
    drivers: Arc<dyn DriverFactory>,
    driver: Option<Box<dyn Driver>>,
    state: LoadState,
    url: String,
    source: Option<String>,
    completed: Vec<u32>,
    late_steps: usize,
}

impl PageLoader {
    pub fn new(config: Arc<LoaderConfig>, drivers: Arc<dyn DriverFactory>) -> Self {
        Self {
            config,
            drivers,
            driver: None,
            state: LoadState::Created,
            url: String::new(),
            source: None,
            completed: Vec::new(),
            late_steps: 0,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Successful repetitions of each interaction step, in configuration order.
    pub fn interaction_counts(&self) -> &[u32] {
        &self.completed
    }

    /// Optional steps that started after their phase budget was spent.
    pub fn late_steps(&self) -> usize {
        self.late_steps
    }

    fn enter(&mut self, op: &str, from: &[LoadState], to: LoadState) -> Result<(), HarvestError> {
        if self.state == LoadState::Closed {
            return Err(HarvestError::closed(&self.url, op));
        }
        if !from.contains(&self.state) {
            return Err(HarvestError::invalid_state(
                &self.url,
                op,
                format!("cannot enter {:?} from {:?}", to, self.state),
            ));
        }
        self.state = to;
        Ok(())
    }

    fn session(&mut self, op: &str) -> Result<&mut (dyn Driver + 'static), HarvestError> {
        let url = self.url.clone();
        self.driver
            .as_deref_mut()
            .ok_or_else(|| HarvestError::invalid_state(url, op, "no driver session"))
    }

    /// Opens a session and navigates to `url`. Failure is fatal for this load.
    pub async fn request(&mut self, url: &str) -> Result<(), HarvestError> {
        self.enter("Request", &[LoadState::Created], LoadState::Requested)?;
        self.url = url.to_string();

        let driver = self
            .drivers
            .open(&self.config.render)
            .await
            .map_err(|e| HarvestError::driver(url, "Request", Some(e.into())))?;
        let driver = self.driver.insert(driver);

        driver
            .navigate(url)
            .await
            .map_err(|e| HarvestError::navigation(url, "Request", Some(e.into())))?;
        debug!(url, "navigated");
        Ok(())
    }

    /// Dismisses configured banners. Failures are logged and skipped.
    pub async fn dismiss(&mut self) -> Result<(), HarvestError> {
        self.enter("Dismiss", &[LoadState::Requested], LoadState::Dismissing)?;
        let config = Arc::clone(&self.config);
        let url = self.url.clone();
        let driver = self.session("Dismiss")?;

        let deadline = Deadline::after(config.timeout);
        let mut late = 0;
        for step in &config.dismiss {
            if deadline.expired() {
                late += 1;
                warn!(url = %url, selector = %step.selector, "dismiss budget exhausted, step runs without waiting");
            }
            match act(driver, step.method, &step.selector, deadline.remaining()).await {
                Ok(()) => info!(url = %url, method = %step.method, selector = %step.selector, "dismissed"),
                Err(e) => info!(
                    url = %url,
                    selector = %step.selector,
                    error = %e,
                    "dismiss step failed"
                ),
            }
        }
        self.late_steps += late;
        Ok(())
    }

    /// Waits for every required selector. Exhausting the budget fails the load.
    pub async fn await_presence(&mut self) -> Result<(), HarvestError> {
        self.enter(
            "AwaitPresence",
            &[LoadState::Requested, LoadState::Dismissing],
            LoadState::AwaitingPresence,
        )?;
        let config = Arc::clone(&self.config);
        let url = self.url.clone();
        let driver = self.session("AwaitPresence")?;

        let deadline = Deadline::after(config.timeout);
        for selector in &config.presence {
            match driver.wait_for_presence(selector, deadline.remaining()).await {
                Ok(_) => debug!(url = %url, selector = %selector, "required element present"),
                Err(e) if e.is_timeout() => {
                    warn!(url = %url, selector = %selector, "required element missing");
                    return Err(HarvestError::presence_timeout(
                        url,
                        "AwaitPresence",
                        Some(e.into()),
                    ));
                }
                Err(e) => {
                    return Err(HarvestError::driver(url, "AwaitPresence", Some(e.into())));
                }
            }
        }
        Ok(())
    }

    /// Runs the configured interactions, counting successful repetitions.
    pub async fn interact(&mut self) -> Result<(), HarvestError> {
        self.enter(
            "Interact",
            &[
                LoadState::Requested,
                LoadState::Dismissing,
                LoadState::AwaitingPresence,
            ],
            LoadState::Interacting,
        )?;
        let config = Arc::clone(&self.config);
        let url = self.url.clone();
        let driver = self.session("Interact")?;

        let mut completed = Vec::with_capacity(config.interactions.len());
        let deadline = Deadline::after(config.timeout);
        let mut late = 0;
        for step in &config.interactions {
            if deadline.expired() {
                late += 1;
                warn!(url = %url, selector = %step.selector, "interaction budget exhausted, step runs without waiting");
            }
            let mut done: u32 = 0;
            while step.repeat == 0 || done < step.repeat {
                match act(driver, step.method, &step.selector, deadline.remaining()).await {
                    Ok(()) => {
                        done += 1;
                        debug!(url = %url, method = %step.method, selector = %step.selector, done, "interaction done");
                    }
                    Err(e) => {
                        if done == 0 {
                            warn!(
                                url = %url,
                                selector = %step.selector,
                                error = %e,
                                "interaction stopped before any success"
                            );
                        } else if step.repeat > 0 {
                            info!(
                                url = %url,
                                selector = %step.selector,
                                done,
                                of = step.repeat,
                                error = %e,
                                "interaction partially done"
                            );
                        } else {
                            debug!(url = %url, selector = %step.selector, done, "interaction repeated until failure");
                        }
                        break;
                    }
                }
            }
            completed.push(done);
        }
        self.completed = completed;
        self.late_steps += late;
        Ok(())
    }

    /// Captures the rendered source. The loader is `Ready` afterwards.
    pub async fn capture(&mut self) -> Result<(), HarvestError> {
        self.enter(
            "Capture",
            &[
                LoadState::Requested,
                LoadState::Dismissing,
                LoadState::AwaitingPresence,
                LoadState::Interacting,
            ],
            LoadState::Ready,
        )?;
        let url = self.url.clone();
        let source = self
            .session("Capture")?
            .page_source()
            .await
            .map_err(|e| HarvestError::driver(&url, "Capture", Some(e.into())))?;
        info!(url = %url, bytes = source.len(), "page ready");
        self.source = Some(source);
        Ok(())
    }

    /// Runs every phase for `url`, skipping optional phases with nothing configured.
    pub async fn load(&mut self, url: &str) -> Result<(), HarvestError> {
        self.request(url).await?;
        if !self.config.dismiss.is_empty() {
            self.dismiss().await?;
        }
        if !self.config.presence.is_empty() {
            self.await_presence().await?;
        }
        if !self.config.interactions.is_empty() {
            self.interact().await?;
        }
        self.capture().await
    }

    /// The captured source.
    pub fn source(&self) -> Result<&str, HarvestError> {
        match (self.state, &self.source) {
            (LoadState::Closed, _) => Err(HarvestError::closed(&self.url, "Source")),
            (LoadState::Ready, Some(source)) => Ok(source),
            (state, _) => Err(HarvestError::invalid_state(
                &self.url,
                "Source",
                format!("page is not ready ({:?})", state),
            )),
        }
    }

    /// Parses the captured source. Every call parses the same captured markup.
    pub fn document(&self) -> Result<Document, HarvestError> {
        let base = Url::parse(&self.url).ok();
        Ok(Document::parse(self.source()?).with_base(base))
    }

    /// Releases the driver session. Any later call fails with `Closed`.
    pub async fn close(&mut self) -> Result<(), HarvestError> {
        if self.state == LoadState::Closed {
            return Err(HarvestError::closed(&self.url, "Close"));
        }
        self.state = LoadState::Closed;
        self.source = None;
        if let Some(mut driver) = self.driver.take() {
            driver
                .close()
                .await
                .map_err(|e| HarvestError::driver(&self.url, "Close", Some(e.into())))?;
        }
        Ok(())
    }
}

/// The captured source of a fully loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: String,
    pub source: String,
}

impl RenderedPage {
    /// Parses the page with its URL as base.
    pub fn document(&self) -> Document {
        Document::parse(&self.source).with_base(Url::parse(&self.url).ok())
    }
}

/// Loads `url` with a fresh loader and always releases its session.
pub async fn fetch_page(
    config: Arc<LoaderConfig>,
    drivers: Arc<dyn DriverFactory>,
    url: &str,
) -> Result<RenderedPage, HarvestError> {
    let mut loader = PageLoader::new(config, drivers);
    let loaded = loader.load(url).await;
    let page = loaded.and_then(|()| {
        Ok(RenderedPage {
            url: url.to_string(),
            source: loader.source()?.to_string(),
        })
    });
    if let Err(e) = loader.close().await {
        warn!(url, error = %e, "failed to release driver session");
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::memory::MemorySite;
    use crate::loader::options::LoaderConfig;

    const URL: &str = "https://shop.example.com/search";

    fn listing(items: usize, more: bool) -> String {
        let lis: String = (0..items)
            .map(|i| format!("<li class=\"teaser\">item {}</li>", i))
            .collect();
        let button = if more {
            "<button class=\"more\">More</button>"
        } else {
            ""
        };
        format!("<html><body><ul>{}</ul>{}</body></html>", lis, button)
    }

    fn site() -> MemorySite {
        let banner = "<div id=\"cookies\"><button class=\"accept\">OK</button></div>";
        MemorySite::new()
            .page(URL, listing(2, true).replace("<body>", &format!("<body>{}", banner)))
            .on_click(URL, "button.accept", vec![listing(2, true)])
            .on_click(URL, "button.more", vec![listing(4, true), listing(6, false)])
    }

    fn loader(config: LoaderConfig, site: &MemorySite) -> PageLoader {
        PageLoader::new(Arc::new(config), Arc::new(site.clone()))
    }

    fn short(builder: crate::loader::options::LoaderConfigBuilder) -> LoaderConfig {
        builder.timeout(Duration::from_millis(50)).build().unwrap()
    }

    #[tokio::test]
    async fn load_runs_all_phases_and_captures() {
        let site = site();
        let config = short(
            LoaderConfig::builder()
                .dismiss(Method::Mouse, "button.accept")
                .require("li.teaser")
                .interact(Method::Mouse, 0, "button.more"),
        );
        let mut loader = loader(config, &site);
        loader.load(URL).await.unwrap();

        assert_eq!(loader.state(), LoadState::Ready);
        assert_eq!(loader.interaction_counts(), &[2]);
        let doc = loader.document().unwrap();
        assert!(doc.html().contains("item 5"));
        assert!(!doc.html().contains("cookies"));
    }

    #[tokio::test]
    async fn missing_banner_is_not_fatal() {
        let site = site();
        let config = short(LoaderConfig::builder().dismiss(Method::Mouse, "div.ad button"));
        let mut loader = loader(config, &site);
        loader.load(URL).await.unwrap();
        assert_eq!(loader.state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn missing_required_element_fails_load() {
        let site = site();
        let config = short(LoaderConfig::builder().require("table.results"));
        let mut loader = loader(config, &site);
        let err = loader.load(URL).await.unwrap_err();
        assert!(err.is_presence_timeout());
    }

    #[tokio::test]
    async fn bounded_interaction_counts_partial_success() {
        let site = site();
        let config = short(LoaderConfig::builder().interact(Method::Enter, 5, "button.more"));
        let mut loader = loader(config, &site);
        loader.load(URL).await.unwrap();
        assert_eq!(loader.interaction_counts(), &[2]);
    }

    #[tokio::test]
    async fn interaction_with_no_success_continues() {
        let site = site();
        let config = short(
            LoaderConfig::builder()
                .interact(Method::Mouse, 1, "button.absent")
                .interact(Method::Space, 1, "button.more"),
        );
        let mut loader = loader(config, &site);
        loader.load(URL).await.unwrap();
        assert_eq!(loader.interaction_counts(), &[0, 1]);
        assert!(loader.document().unwrap().html().contains("item 3"));
    }

    #[tokio::test]
    async fn exhausted_budget_still_attempts_later_steps() {
        let site = site().with_latency(Duration::from_millis(40));
        let config = short(
            LoaderConfig::builder()
                .dismiss(Method::Mouse, "button.missing")
                .dismiss(Method::Mouse, "button.accept"),
        );
        let mut loader = loader(config, &site);
        loader.load(URL).await.unwrap();
        assert!(!loader.document().unwrap().html().contains("cookies"));
        assert_eq!(loader.late_steps(), 1);
    }

    #[tokio::test]
    async fn steps_within_budget_are_not_late() {
        let site = site();
        let config = short(
            LoaderConfig::builder()
                .dismiss(Method::Mouse, "button.accept")
                .interact(Method::Mouse, 1, "button.more"),
        );
        let mut loader = loader(config, &site);
        loader.load(URL).await.unwrap();
        assert_eq!(loader.late_steps(), 0);
    }

    #[tokio::test]
    async fn navigation_failure_is_fatal() {
        let site = site();
        let mut loader = loader(LoaderConfig::default(), &site);
        let err = loader.load("https://shop.example.com/nowhere").await.unwrap_err();
        assert!(err.is_navigation());
        loader.close().await.unwrap();
        assert_eq!(site.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn document_is_reparsed_from_captured_source() {
        let site = site();
        let mut loader = loader(LoaderConfig::default(), &site);
        loader.load(URL).await.unwrap();
        let first = loader.document().unwrap();
        let second = loader.document().unwrap();
        assert_eq!(first.html(), second.html());
    }

    #[tokio::test]
    async fn calls_after_close_fail_with_closed() {
        let site = site();
        let mut loader = loader(LoaderConfig::default(), &site);
        loader.load(URL).await.unwrap();
        loader.close().await.unwrap();

        assert!(loader.document().unwrap_err().is_closed());
        assert!(loader.source().unwrap_err().is_closed());
        assert!(loader.capture().await.unwrap_err().is_closed());
        assert!(loader.close().await.unwrap_err().is_closed());
        assert_eq!(site.opened_sessions(), 1);
        assert_eq!(site.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn phases_must_run_in_order() {
        let site = site();
        let mut loader = loader(LoaderConfig::default(), &site);
        assert!(loader.capture().await.unwrap_err().is_invalid_state());
        assert!(loader.document().unwrap_err().is_invalid_state());

        loader.request(URL).await.unwrap();
        loader.interact().await.unwrap();
        assert!(loader.dismiss().await.unwrap_err().is_invalid_state());
    }

    #[tokio::test]
    async fn fetch_page_releases_session() {
        let site = site();
        let page = fetch_page(Arc::new(LoaderConfig::default()), Arc::new(site.clone()), URL)
            .await
            .unwrap();
        assert!(page.source.contains("item 1"));
        assert_eq!(site.opened_sessions(), 1);
        assert_eq!(site.closed_sessions(), 1);

        let err = fetch_page(
            Arc::new(short(LoaderConfig::builder().require("table"))),
            Arc::new(site.clone()),
            URL,
        )
        .await
        .unwrap_err();
        assert!(err.is_presence_timeout());
        assert_eq!(site.closed_sessions(), 2);
    }

    #[test]
    fn deadline_saturates() {
        let deadline = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.expired());
    }
}
