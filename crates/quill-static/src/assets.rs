//! Asset pipeline for the stylesheets frames link to.

use std::fs;
use std::path::{Path, PathBuf};

use quill_tex::ARTICLE_CSS;

/// Directory under the output root that quill's own assets are written to.
pub const ASSET_DIR: &str = "assets/quill";

/// Asset pipeline utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// Generate the article stylesheet used by LaTeX frames.
    pub fn article_css() -> String {
        ARTICLE_CSS.to_string()
    }

    /// Minify CSS using lightningcss.
    pub fn minify_css(css: &str) -> Result<String, String> {
        use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};

        let stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| format!("CSS parse error: {}", e))?;

        let minified = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        Ok(minified.code)
    }

    /// Write `article.css` under `output_dir`, returning its path.
    ///
    /// Falls back to the unminified stylesheet if minification fails.
    pub fn write_article_css(output_dir: &Path, minify: bool) -> std::io::Result<PathBuf> {
        let dir = output_dir.join(ASSET_DIR);
        fs::create_dir_all(&dir)?;

        let css = Self::article_css();
        let css = if minify {
            Self::minify_css(&css).unwrap_or_else(|e| {
                tracing::warn!("Failed to minify article.css: {}", e);
                css
            })
        } else {
            css
        };

        let path = dir.join("article.css");
        fs::write(&path, css)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_article_css() {
        let css = AssetPipeline::article_css();
        assert!(css.contains(".quill-tex"));
        assert!(css.contains("hyphens: auto"));
    }

    #[test]
    fn minifies_css() {
        let css = r#"
.quill-tex p {
    margin: 0 0 0.75em;
    text-indent: 1.5em;
}
        "#;

        let minified = AssetPipeline::minify_css(css).unwrap();

        assert!(!minified.contains('\n'));
        assert!(minified.contains(".quill-tex p"));
    }

    #[test]
    fn minifies_article_css() {
        let css = AssetPipeline::article_css();
        let minified = AssetPipeline::minify_css(&css).unwrap();

        assert!(minified.len() < css.len());
        assert!(!minified.contains("quill article layout"));
    }

    #[test]
    fn writes_article_css() {
        let temp = tempdir().unwrap();

        let path = AssetPipeline::write_article_css(temp.path(), false).unwrap();

        assert_eq!(path, temp.path().join("assets/quill/article.css"));
        assert_eq!(fs::read_to_string(path).unwrap(), ARTICLE_CSS);
    }
}
