// ABOUTME: Page acquisition: driver capability, loader configuration and the PageLoader state machine.
// ABOUTME: Ships an in-memory driver and a static HTTP driver.

pub mod driver;
pub mod http;
pub mod memory;
pub mod options;
pub mod page;

pub use driver::{Driver, DriverError, DriverFactory, ElementHandle, Key};
pub use http::{HttpDriver, HttpDriverFactory};
pub use memory::{MemoryDriver, MemorySite};
pub use options::{
    DismissStep, InteractionStep, LoaderConfig, LoaderConfigBuilder, Method, RenderOptions,
};
pub use page::{fetch_page, Deadline, LoadState, PageLoader, RenderedPage};
