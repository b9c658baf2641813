//! Trait definitions for LaTeX generators.

use serde::Deserialize;

use crate::styles::DEFAULT_KATEX_STYLESHEET;

/// Options shared by LaTeX generators.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Let the browser hyphenate body text
    pub hyphenate: bool,

    /// Base URL the article stylesheet is published under.
    /// When unset the stylesheet is inlined into the bundle.
    pub asset_base: Option<String>,

    /// URL of the KaTeX stylesheet math output depends on
    pub katex_stylesheet: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            hyphenate: false,
            asset_base: None,
            katex_stylesheet: DEFAULT_KATEX_STYLESHEET.to_string(),
        }
    }
}

/// Output of a LaTeX generator.
#[derive(Debug, Clone, PartialEq)]
pub struct TexOutput {
    /// Generated HTML fragment
    pub fragment: String,

    /// `<link>`, `<style>` and `<script>` elements the fragment needs
    pub styles_and_scripts: String,

    /// Document title from `\title{}`, as plain text
    pub title: Option<String>,
}

/// Errors that can occur while generating HTML from LaTeX.
///
/// The `Display` text is what a reader sees in place of a failed element.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TexError {
    #[error("undefined control sequence \\{name} on line {line}")]
    UnknownMacro { name: String, line: usize },

    #[error("unknown environment {name} on line {line}")]
    UnknownEnvironment { name: String, line: usize },

    #[error("\\end{{{found}}} on line {line} does not match \\begin{{{expected}}}")]
    MismatchedEnd {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("\\end{{{name}}} on line {line} has no matching \\begin")]
    UnexpectedEnd { name: String, line: usize },

    #[error("unterminated {what} starting on line {line}")]
    Unterminated { what: String, line: usize },

    #[error("missing argument for \\{command} on line {line}")]
    MissingArgument { command: String, line: usize },

    #[error("{message} on line {line}")]
    Misplaced { message: String, line: usize },

    #[error("math error on line {line}: {message}")]
    Math { message: String, line: usize },
}

/// Trait for LaTeX to HTML generators.
pub trait TexGenerator: Send + Sync {
    /// Generator identifier (e.g., "html")
    fn name(&self) -> &'static str;

    /// Generate HTML from a LaTeX document or fragment.
    fn generate(&self, source: &str) -> Result<TexOutput, TexError>;
}
