// ABOUTME: Loader configuration: render options, interaction steps and the shared timeout budget.
// ABOUTME: LoaderConfigBuilder provides a fluent API and validates every selector eagerly.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::HarvestError;
use crate::extractors::select::PathExpr;

/// How to interact with an element while loading a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Mouse click on the element
    Mouse,
    /// Press Enter with the element focused
    Enter,
    /// Press Space with the element focused
    Space,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Mouse => "mouse",
            Method::Enter => "enter",
            Method::Space => "space",
        };
        write!(f, "{}", s)
    }
}

/// Dismisses one interstitial banner (cookie notice, ad overlay).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DismissStep {
    pub method: Method,
    pub selector: String,
}

/// Repeats an interaction; `repeat` 0 means until the action fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InteractionStep {
    pub method: Method,
    #[serde(default)]
    pub repeat: u32,
    pub selector: String,
}

/// Options handed to the driver factory when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub headless: bool,
    /// Browser binary
    pub binary: String,
    /// Extra browser flags
    pub args: Vec<String>,
    pub user_agent: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            headless: true,
            binary: "/usr/bin/google-chrome-stable".to_string(),
            args: vec![
                "start-maximized".to_string(),
                "--disable-default-apps".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--no-sandbox".to_string(),
                "--enable-features=AllowAllCookies".to_string(),
            ],
            user_agent: concat!("trawl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RenderOptions {
    /// Defaults with `CHROME_PATH`, `WINDOW_WIDTH` and `WINDOW_HEIGHT` applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Unparseable sizes are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CHROME_PATH").filter(|p| !p.is_empty()) {
            self.binary = path;
        }
        if let Some(width) = lookup("WINDOW_WIDTH").and_then(|v| v.trim().parse().ok()) {
            self.width = width;
        }
        if let Some(height) = lookup("WINDOW_HEIGHT").and_then(|v| v.trim().parse().ok()) {
            self.height = height;
        }
        self
    }

    /// Full browser argument list: configured flags, window size and headless mode.
    pub fn browser_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(format!("--window-size={},{}", self.width, self.height));
        if self.headless {
            args.push("--headless".to_string());
        }
        args
    }
}

/// How a page is acquired: render options, budget and the interaction protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    #[serde(default)]
    pub render: RenderOptions,
    /// Budget per phase, in seconds in configuration files
    #[serde(
        default = "default_timeout",
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub timeout: Duration,
    #[serde(default)]
    pub dismiss: Vec<DismissStep>,
    /// Selectors that must be present before the page is trusted
    #[serde(default)]
    pub presence: Vec<String>,
    #[serde(default)]
    pub interactions: Vec<InteractionStep>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn deserialize_secs<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(d)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            render: RenderOptions::default(),
            timeout: default_timeout(),
            dismiss: Vec::new(),
            presence: Vec::new(),
            interactions: Vec::new(),
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::new()
    }

    /// Checks the budget is positive and every selector is a valid path expression.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.timeout.is_zero() {
            return Err(HarvestError::configuration(
                "LoaderConfig",
                "timeout must be greater than zero",
            ));
        }
        let selectors = self
            .dismiss
            .iter()
            .map(|s| s.selector.as_str())
            .chain(self.presence.iter().map(String::as_str))
            .chain(self.interactions.iter().map(|s| s.selector.as_str()));
        for selector in selectors {
            PathExpr::parse(selector).map_err(|e| HarvestError::configuration("LoaderConfig", e))?;
        }
        Ok(())
    }
}

/// Builder for constructing validated LoaderConfig values.
#[derive(Debug, Clone, Default)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-phase timeout budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the options passed to the driver factory.
    pub fn render(mut self, render: RenderOptions) -> Self {
        self.config.render = render;
        self
    }

    /// Add a banner to dismiss after navigation.
    pub fn dismiss(mut self, method: Method, selector: impl Into<String>) -> Self {
        self.config.dismiss.push(DismissStep {
            method,
            selector: selector.into(),
        });
        self
    }

    /// Require an element to be present before the page is trusted.
    pub fn require(mut self, selector: impl Into<String>) -> Self {
        self.config.presence.push(selector.into());
        self
    }

    /// Add an interaction repeated `repeat` times (0 = until it fails).
    pub fn interact(mut self, method: Method, repeat: u32, selector: impl Into<String>) -> Self {
        self.config.interactions.push(InteractionStep {
            method,
            repeat,
            selector: selector.into(),
        });
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<LoaderConfig, HarvestError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
