// ABOUTME: Site configuration files: JSON descriptions of sites compiled into a Router.
// ABOUTME: Every problem with a file is reported as a Configuration error.

//! Site files.
//!
//! ```json
//! {
//!   "sites": [{
//!     "name": "shop",
//!     "pattern": "https://shop\\.example\\.com/search",
//!     "catalog_loader": {"timeout": 5, "presence": ["ul.results"]},
//!     "item_loader": {},
//!     "catalog": {
//!       "items": {"selectors": ["ul.results > li"], "array": true},
//!       "next": {"selectors": ["a.next::attr(href)"]}
//!     },
//!     "item": {
//!       "child": {"selectors": ["a::attr(href)"]},
//!       "datamap": {"title": {"selectors": ["h1::text"], "source": "child"}},
//!       "required": ["title"]
//!     }
//!   }]
//! }
//! ```
//!
//! Render options of both loaders pick up `CHROME_PATH`, `WINDOW_WIDTH` and
//! `WINDOW_HEIGHT` from the environment.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::catalog::datamap::FieldMap;
use crate::catalog::item::ItemPage;
use crate::catalog::record::RequiredFields;
use crate::catalog::router::{Router, SiteBundle};
use crate::catalog::walker::CatalogPage;
use crate::error::HarvestError;
use crate::extractors::field::{FieldExtractor, FieldSpec};
use crate::loader::options::LoaderConfig;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SiteFile {
    sites: Vec<SiteSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SiteSpec {
    name: String,
    pattern: String,
    #[serde(default)]
    catalog_loader: LoaderConfig,
    #[serde(default)]
    item_loader: LoaderConfig,
    catalog: CatalogSpec,
    item: ItemSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogSpec {
    items: FieldSpec,
    #[serde(default)]
    next: Option<FieldSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemSpec {
    child: FieldSpec,
    datamap: FieldMap,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    base_url: Option<String>,
}

/// Reads and compiles a site file.
pub fn load_router(path: impl AsRef<Path>) -> Result<Router, HarvestError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        HarvestError::configuration("LoadRouter", format!("cannot read {}: {}", path.display(), e))
    })?;
    router_from_json(&text)
}

/// Compiles a site file already in memory.
pub fn router_from_json(text: &str) -> Result<Router, HarvestError> {
    let file: SiteFile = serde_json::from_str(text)
        .map_err(|e| HarvestError::configuration("LoadRouter", e))?;
    let routes = file
        .sites
        .into_iter()
        .map(compile_site)
        .collect::<Result<Vec<_>, _>>()?;
    Router::new(routes)
}

fn compile_site(spec: SiteSpec) -> Result<(Regex, SiteBundle), HarvestError> {
    let op = format!("site {}", spec.name);
    let pattern = Regex::new(&spec.pattern)
        .map_err(|e| HarvestError::configuration(op.as_str(), e))?;

    let items = FieldExtractor::from_spec("items", &spec.catalog.items)?;
    let next = spec
        .catalog
        .next
        .as_ref()
        .map(|next| FieldExtractor::from_spec("next", next))
        .transpose()?;
    let catalog = CatalogPage::new(spec.name.as_str(), items, next)?;

    let child = FieldExtractor::from_spec("child", &spec.item.child)?;
    let mut item = ItemPage::new(spec.name.as_str(), child, spec.item.datamap)?;
    if !spec.item.required.is_empty() {
        item = item.with_validator(Arc::new(RequiredFields::new(spec.item.required)));
    }
    if let Some(base) = spec.item.base_url {
        let base = Url::parse(&base).map_err(|e| {
            HarvestError::configuration(op.as_str(), format!("invalid base_url {:?}: {}", base, e))
        })?;
        item = item.with_base_url(base);
    }

    Ok((
        pattern,
        SiteBundle {
            name: spec.name,
            catalog_loader: Arc::new(with_env(spec.catalog_loader)),
            item_loader: Arc::new(with_env(spec.item_loader)),
            catalog: Arc::new(catalog),
            item: Arc::new(item),
        },
    ))
}

fn with_env(mut loader: LoaderConfig) -> LoaderConfig {
    loader.render = loader.render.with_env_overrides(|key| std::env::var(key).ok());
    loader
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const SITES: &str = r#"{
        "sites": [
            {
                "name": "search",
                "pattern": "https://shop\\.example\\.com/search",
                "catalog_loader": {"timeout": 5, "presence": ["ul.results"]},
                "catalog": {
                    "items": {"selectors": ["ul.results > li"], "array": true},
                    "next": {"selectors": ["a.next::attr(href)"]}
                },
                "item": {
                    "child": {"selectors": ["a::attr(href)"]},
                    "datamap": {
                        "title": {"selectors": ["h1::text"], "source": "child"},
                        "site": "shop"
                    },
                    "required": ["title"],
                    "base_url": "https://shop.example.com/"
                }
            },
            {
                "name": "blog",
                "pattern": "https://blog\\.example\\.com/",
                "catalog": {"items": {"selectors": ["article"], "array": true}},
                "item": {
                    "child": {"selectors": ["a::attr(href)"]},
                    "datamap": {"title": {"selectors": ["h2::text"], "source": "parent"}}
                }
            }
        ]
    }"#;

    #[test]
    fn compiles_sites_in_order() {
        let router = router_from_json(SITES).unwrap();
        assert_eq!(router.site_names().collect::<Vec<_>>(), vec!["search", "blog"]);

        let bundle = router.route("https://shop.example.com/search?q=lamp").unwrap();
        assert_eq!(bundle.catalog_loader.timeout, Duration::from_secs(5));
        assert_eq!(bundle.catalog_loader.presence, vec!["ul.results"]);
        assert_eq!(bundle.item_loader.timeout, Duration::from_secs(3));
        assert!(bundle.catalog.has_next());

        assert!(!router.route("https://blog.example.com/").unwrap().catalog.has_next());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SITES.as_bytes()).unwrap();
        let router = load_router(file.path()).unwrap();
        assert_eq!(router.len(), 2);

        let err = load_router("/nonexistent/sites.json").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn configuration_mistakes_are_rejected() {
        let cases = [
            r#"{"sites": [{"name": "x", "pattern": "(", "catalog": {"items": {"selectors": ["li"], "array": true}}, "item": {"child": {"selectors": ["a"]}, "datamap": {}}}]}"#,
            r#"{"sites": [{"name": "x", "pattern": "https://", "catalog": {"items": {"selectors": ["li"]}}, "item": {"child": {"selectors": ["a"]}, "datamap": {}}}]}"#,
            r#"{"sites": [{"name": "x", "pattern": "https://", "catalog": {"items": {"selectors": ["li"], "array": true}}, "item": {"child": {"selectors": ["a"]}, "datamap": {"t": {"selectors": ["h1"]}}}}]}"#,
            r#"{"sites": [{"name": "x", "pattern": "https://", "catalog": {"items": {"selectors": [], "array": true}}, "item": {"child": {"selectors": ["a"]}, "datamap": {}}}]}"#,
            r#"{"sites": [{"name": "x", "pattern": "https://", "catalog_loader": {"timeout": 0}, "catalog": {"items": {"selectors": ["li"], "array": true}}, "item": {"child": {"selectors": ["a"]}, "datamap": {}}}]}"#,
            r#"{"sites": [{"name": "x", "pattern": "https://", "catalog": {"items": {"selectors": ["li"], "array": true}}, "item": {"child": {"selectors": ["a"]}, "datamap": {}, "base_url": "relative/path"}}]}"#,
            r#"{"sites": [], "extra": 1}"#,
        ];
        for case in cases {
            let err = router_from_json(case).unwrap_err();
            assert!(err.is_configuration(), "{}: {}", case, err);
        }
    }
}
