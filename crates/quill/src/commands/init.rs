//! Initialize quill in a project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing quill...");

    init(Path::new("."), config_path, yes)?;

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'quill dev' to start the development server.");

    Ok(())
}

fn init(root: &Path, config_path: &Path, yes: bool) -> Result<()> {
    let pages_dir = root.join("pages");

    // Check if pages already exists
    if pages_dir.exists() {
        if !yes {
            tracing::warn!("pages/ directory already exists. Use --yes to overwrite.");
            return Ok(());
        }
    } else {
        fs::create_dir_all(&pages_dir).context("Failed to create pages directory")?;
    }

    // Create default config
    let config_path = root.join(config_path);
    if !config_path.exists() || yes {
        fs::write(&config_path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        tracing::info!("Created {}", config_path.display());
    }

    // Create sample page
    let index_path = pages_dir.join("index.html");
    if !index_path.exists() || yes {
        fs::write(&index_path, DEFAULT_INDEX).context("Failed to write index.html")?;
        tracing::info!("Created pages/index.html");
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Quill Configuration

[site]
# Source directory for pages
source = "pages"

# Output directory for built site
output = "dist"

# Base URL (for deployment)
base_url = "/"

[markdown]
# Pass raw HTML through
html = true

# Smart quotes and dashes
typographer = true

[tex]
# Let the browser hyphenate article text
hyphenate = false

[frame]
# Milliseconds between a frame loading and its first resize
settle_delay_ms = 10

# Milliseconds to wait after a resize before measuring again
resize_debounce_ms = 50

[build]
# Enable minification
minify = true
"#;

const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Quill</title>
<style>
iframe { width: 100%; border: 0; }
</style>
</head>
<body>
<div data-markup="md">
# Welcome

This page is written in **Markdown**. Links such as https://commonmark.org
become clickable, and "quotes" -- and dashes -- are typeset.

```rust
fn main() {
    println!("rendered by quill");
}
```
</div>

<div data-markup="tex">
\documentclass{article}
\title{A Small Article}
\author{Quill}
\begin{document}
\maketitle

\section{Introduction}
LaTeX elements render into the frame that follows them.
Inline math such as $e^{i\pi} + 1 = 0$ and displays work too:
\begin{equation}
\label{eq:sum}
\sum_{k=1}^{n} k = \frac{n(n+1)}{2}
\end{equation}
Equation \eqref{eq:sum} is numbered.
\end{document}
</div>
<iframe></iframe>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use quill_static::{PageProcessor, ProcessorConfig};
    use tempfile::tempdir;

    #[test]
    fn creates_config_and_sample_page() {
        let temp = tempdir().unwrap();

        init(temp.path(), Path::new("quill.toml"), false).unwrap();

        let config = fs::read_to_string(temp.path().join("quill.toml")).unwrap();
        assert!(config.contains("[site]"));
        assert!(temp.path().join("pages/index.html").exists());
    }

    #[test]
    fn keeps_existing_pages_without_yes() {
        let temp = tempdir().unwrap();
        let pages = temp.path().join("pages");
        fs::create_dir_all(&pages).unwrap();
        fs::write(pages.join("index.html"), "<p>mine</p>").unwrap();

        init(temp.path(), Path::new("quill.toml"), false).unwrap();
        assert_eq!(
            fs::read_to_string(pages.join("index.html")).unwrap(),
            "<p>mine</p>"
        );
        assert!(!temp.path().join("quill.toml").exists());

        init(temp.path(), Path::new("quill.toml"), true).unwrap();
        assert_eq!(
            fs::read_to_string(pages.join("index.html")).unwrap(),
            DEFAULT_INDEX
        );
    }

    #[test]
    fn sample_config_parses() {
        let config: crate::config::ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.processor_config(), ProcessorConfig::default());
    }

    #[test]
    fn sample_page_renders_cleanly() {
        let page = PageProcessor::new(ProcessorConfig::default())
            .process(DEFAULT_INDEX)
            .unwrap();

        assert!(page.report.is_clean(), "{:?}", page.report);
        assert_eq!(page.report.elements.len(), 2);
        assert!(page.html.contains("<h1>Welcome</h1>"));
    }
}
