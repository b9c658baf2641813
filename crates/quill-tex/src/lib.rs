//! LaTeX to HTML generation.
//!
//! This crate provides the generator seam used for `data-markup="tex"`
//! elements and a built-in generator covering the everyday subset of LaTeX
//! documents: sectioning, paragraphs, font commands, lists, quotations,
//! footnotes, cross references and KaTeX-rendered math.

pub mod html;
pub mod lexer;
pub mod math;
pub mod styles;
pub mod traits;

pub use html::HtmlGenerator;
pub use lexer::{Lexer, Spanned, Token};
pub use styles::{styles_and_scripts, ARTICLE_CSS, DEFAULT_KATEX_STYLESHEET};
pub use traits::{GeneratorOptions, TexError, TexGenerator, TexOutput};
