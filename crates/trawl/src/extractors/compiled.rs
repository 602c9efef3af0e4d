// ABOUTME: Pre-compiled CSS selector cache shared by every extractor and driver check.
// ABOUTME: Compiles each selector string once, caching failures as well as successes.

//! Selector caching for repeated DOM queries.
//!
//! Site configurations are evaluated against every listing and item page of a
//! run, so the same handful of selectors is parsed thousands of times. This
//! cache compiles each string once and hands out clones.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use scraper::Selector;

/// Compiled selectors keyed by their source text. Invalid selectors keep their parse error.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Result<Selector, String>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns the parse error message for invalid selectors; the failure is cached too.
pub fn get_or_compile(css: &str) -> Result<Selector, String> {
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Selector::parse(css).map_err(|e| e.to_string());
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    cache
        .entry(css.to_string())
        .or_insert(compiled)
        .clone()
}

/// Precompiles a batch of selectors into the cache.
pub fn precompile_selectors<I, S>(selectors: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    for css in selectors {
        let css = css.as_ref();
        if !cache.contains_key(css) {
            let compiled = Selector::parse(css).map_err(|e| e.to_string());
            cache.insert(css.to_string(), compiled);
        }
    }
}
