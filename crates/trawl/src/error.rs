// ABOUTME: Error types for trawl including the ErrorCode enum and HarvestError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

/// Error codes representing the categories of fatal harvesting failures.
///
/// Field-level extraction failures, degraded page interactions and schema
/// validation failures are not errors: they are logged and degrade the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed selector, field map, loader config or router bundle.
    Configuration,
    /// No configured pattern matches the URL.
    Routing,
    /// The input is not a well-formed http(s) URL.
    InvalidUrl,
    /// The driver could not navigate to the page.
    Navigation,
    /// A required element did not appear within the budget.
    PresenceTimeout,
    /// A teaser reference is not valid base64 or markup.
    MalformedReference,
    /// A Child/Next field resolved to nothing where a URL was required.
    UnresolvedTarget,
    /// The page loader session was already released.
    Closed,
    /// A page loader operation was called out of order.
    InvalidState,
    /// Any other driver failure.
    Driver,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Configuration => "configuration error",
            ErrorCode::Routing => "no route",
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Navigation => "navigation error",
            ErrorCode::PresenceTimeout => "presence timeout",
            ErrorCode::MalformedReference => "malformed reference",
            ErrorCode::UnresolvedTarget => "unresolved target",
            ErrorCode::Closed => "closed",
            ErrorCode::InvalidState => "invalid state",
            ErrorCode::Driver => "driver error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for harvesting operations.
#[derive(Debug, thiserror::Error)]
pub struct HarvestError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for HarvestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trawl: {}", self.op)?;
        if !self.url.is_empty() {
            write!(f, " {}", self.url)?;
        }
        write!(f, ": {}", self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = HarvestError> = std::result::Result<T, E>;

impl HarvestError {
    fn new(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create a Configuration error. Configuration errors carry no URL.
    pub fn configuration(op: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Configuration,
            "",
            op,
            Some(anyhow::anyhow!("{}", message)),
        )
    }

    /// Create a Routing error naming the unmatched URL.
    pub fn routing(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::new(ErrorCode::Routing, url, op, None)
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Navigation error.
    pub fn navigation(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Navigation, url, op, source)
    }

    /// Create a PresenceTimeout error.
    pub fn presence_timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::PresenceTimeout, url, op, source)
    }

    /// Create a MalformedReference error tagged with the aggregator name in `op`.
    pub fn malformed_reference(op: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self::new(ErrorCode::MalformedReference, "", op, source)
    }

    /// Create an UnresolvedTarget error.
    pub fn unresolved_target(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::UnresolvedTarget, url, op, source)
    }

    /// Create a Closed error.
    pub fn closed(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Closed,
            url,
            op,
            Some(anyhow::anyhow!("driver session already released")),
        )
    }

    /// Create an InvalidState error.
    pub fn invalid_state(
        url: impl Into<String>,
        op: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::new(
            ErrorCode::InvalidState,
            url,
            op,
            Some(anyhow::anyhow!("{}", message)),
        )
    }

    /// Create a Driver error.
    pub fn driver(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Driver, url, op, source)
    }

    /// Returns true if this is a Configuration error.
    pub fn is_configuration(&self) -> bool {
        self.code == ErrorCode::Configuration
    }

    /// Returns true if this is a Routing error.
    pub fn is_routing(&self) -> bool {
        self.code == ErrorCode::Routing
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    /// Returns true if this is a Navigation error.
    pub fn is_navigation(&self) -> bool {
        self.code == ErrorCode::Navigation
    }

    /// Returns true if this is a PresenceTimeout error.
    pub fn is_presence_timeout(&self) -> bool {
        self.code == ErrorCode::PresenceTimeout
    }

    /// Returns true if this is a MalformedReference error.
    pub fn is_malformed_reference(&self) -> bool {
        self.code == ErrorCode::MalformedReference
    }

    /// Returns true if this is an UnresolvedTarget error.
    pub fn is_unresolved_target(&self) -> bool {
        self.code == ErrorCode::UnresolvedTarget
    }

    /// Returns true if this is a Closed error.
    pub fn is_closed(&self) -> bool {
        self.code == ErrorCode::Closed
    }

    /// Returns true if this is an InvalidState error.
    pub fn is_invalid_state(&self) -> bool {
        self.code == ErrorCode::InvalidState
    }

    /// Returns true if this is a Driver error.
    pub fn is_driver(&self) -> bool {
        self.code == ErrorCode::Driver
    }
}
