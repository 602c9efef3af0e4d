// ABOUTME: The browser-driver capability the page loader runs against.
// ABOUTME: Defines Driver (one session), DriverFactory (opens sessions), Key, ElementHandle and DriverError.

use std::time::Duration;

use async_trait::async_trait;

use crate::loader::options::RenderOptions;

/// Errors reported by a driver session.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out after {waited:?} waiting for {selector}")]
    Timeout { selector: String, waited: Duration },

    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),

    #[error("no page has been loaded")]
    NoPage,

    #[error("driver session is closed")]
    Closed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

/// Keys that can be sent to a focused element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Space,
}

/// Opaque reference to an element found by a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// One browser session. Owned by exactly one page loader.
#[async_trait]
pub trait Driver: Send {
    /// Navigate to `url` and wait for the initial render.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Wait up to `timeout` for an element matching `selector` to become clickable.
    async fn wait_for_clickable(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError>;

    /// Wait up to `timeout` for an element matching `selector` to be present.
    async fn wait_for_presence(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn send_key(&mut self, element: &ElementHandle, key: Key) -> Result<(), DriverError>;

    /// The current rendered markup.
    async fn page_source(&mut self) -> Result<String, DriverError>;

    /// Release the session.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens driver sessions. Shared read-only across concurrent workers.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self, options: &RenderOptions) -> Result<Box<dyn Driver>, DriverError>;
}
