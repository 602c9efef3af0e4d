// ABOUTME: Catalog mining: field maps, records, item aggregation, pagination and routing.
// ABOUTME: Builds on the loader for page acquisition and on extractors for field values.

pub mod datamap;
pub mod item;
pub mod record;
pub mod router;
pub mod walker;

pub use datamap::{FieldMap, FieldNode};
pub use item::{ItemAggregator, ItemPage};
pub use record::{Record, RecordValidator, RequiredFields, TypedValidator};
pub use router::{Router, SiteBundle};
pub use walker::{harvest, harvest_report, CatalogPage, CatalogWalker, HarvestReport};
