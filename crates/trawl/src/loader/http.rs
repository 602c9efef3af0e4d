// ABOUTME: Static HTTP driver: fetches markup with reqwest and answers waits against the fetched source.
// ABOUTME: Pages are not scripted, so clicks and key presses report Unsupported.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use tracing::debug;

use crate::document::Document;
use crate::extractors::select::count_matches;
use crate::loader::driver::{Driver, DriverError, DriverFactory, ElementHandle, Key};
use crate::loader::options::RenderOptions;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens [`HttpDriver`] sessions sharing one connection pool and cookie jar.
#[derive(Debug, Clone)]
pub struct HttpDriverFactory {
    client: reqwest::Client,
}

impl HttpDriverFactory {
    /// Builds a client with cookies and compressed transfer enabled.
    pub fn new() -> Result<Self, DriverError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| DriverError::Other(anyhow!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Uses an existing client as is.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn open(&self, options: &RenderOptions) -> Result<Box<dyn Driver>, DriverError> {
        Ok(Box::new(HttpDriver {
            client: self.client.clone(),
            user_agent: options.user_agent.clone(),
            source: None,
            closed: false,
        }))
    }
}

/// One static session: the last fetched body stands in for the rendered page.
pub struct HttpDriver {
    client: reqwest::Client,
    user_agent: String,
    source: Option<String>,
    closed: bool,
}

impl HttpDriver {
    fn source(&self) -> Result<&str, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.source.as_deref().ok_or(DriverError::NoPage)
    }

    fn find(&self, selector: &str) -> Result<ElementHandle, DriverError> {
        let doc = Document::parse(self.source()?);
        let count = count_matches(&doc, selector).map_err(|e| DriverError::Other(anyhow!(e)))?;
        if count == 0 {
            return Err(DriverError::Timeout {
                selector: selector.to_string(),
                waited: Duration::ZERO,
            });
        }
        Ok(ElementHandle(selector.to_string()))
    }
}

#[async_trait]
impl Driver for HttpDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let fail = |message: String| DriverError::Navigation {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fail(format!("failed to read body: {}", e)))?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "fetched");
        self.source = Some(body);
        Ok(())
    }

    async fn wait_for_clickable(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        self.find(selector)
    }

    async fn wait_for_presence(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        self.find(selector)
    }

    async fn click(&mut self, _element: &ElementHandle) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("click"))
    }

    async fn send_key(&mut self, _element: &ElementHandle, _key: Key) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("key press"))
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        self.source().map(str::to_string)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.closed = true;
        self.source = None;
        Ok(())
    }
}
