//! Markdown rendering for marked page elements.
//!
//! This crate turns the escaped text content of `data-markup="md"` elements
//! back into Markdown source and renders it to HTML with a fixed option set.

pub mod autolink;
pub mod markdown;
pub mod unescape;

pub use autolink::{find_links, LinkMatch};
pub use markdown::{MarkdownOptions, MarkdownRenderer};
pub use unescape::{decode_entities, escape_html, percent_unescape, unescape_markup};
