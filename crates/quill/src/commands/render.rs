//! Single page render command.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quill_static::{ElementOutcome, PageProcessor, RenderedPage};

use crate::config::load_config;

/// Run the render command.
pub async fn run(config_path: &Path, file: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let processor = PageProcessor::new(load_config(config_path)?.processor_config());
    let page = render_file(&processor, &file)?;

    match output {
        Some(path) => {
            fs::write(&path, &page.html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(page.html.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Render one page, logging every element that did not render.
fn render_file(processor: &PageProcessor, file: &Path) -> Result<RenderedPage> {
    let html =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let page = processor
        .process(&html)
        .with_context(|| format!("Failed to render {}", file.display()))?;

    for element in &page.report.elements {
        match &element.outcome {
            ElementOutcome::Rendered => {}
            ElementOutcome::Failed(message) => tracing::warn!(
                "{}:{}: {} element failed: {}",
                file.display(),
                element.line,
                element.markup,
                message
            ),
            ElementOutcome::Skipped(reason) => tracing::warn!(
                "{}:{}: {} element skipped: {}",
                file.display(),
                element.line,
                element.markup,
                reason
            ),
        }
    }

    tracing::debug!(
        "Rendered {} of {} marked elements",
        page.report.rendered(),
        page.report.elements.len()
    );

    Ok(page)
}
