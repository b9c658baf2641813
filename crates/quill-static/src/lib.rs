//! Page processing and static builds for quill.
//!
//! Renders `data-markup="md"` and `data-markup="tex"` elements inside HTML
//! pages, either one page at a time or over a whole directory.

pub mod assets;
pub mod builder;
pub mod document;
pub mod processor;
pub mod templates;

pub use builder::{is_page, BuildConfig, BuildError, BuildResult, StaticBuilder};
pub use document::{next_element_sibling, scan_elements, Attribute, Element, Sibling};
pub use processor::{
    ElementOutcome, ElementReport, Markup, PageProcessor, ProcessError, ProcessorConfig,
    RenderReport, RenderedPage,
};
