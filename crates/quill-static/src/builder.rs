//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::assets::{AssetPipeline, ASSET_DIR};
use crate::processor::{PageProcessor, ProcessorConfig};

/// Configuration for building a static site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory holding the source pages
    pub source_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Minify generated CSS
    pub minify: bool,

    /// Base URL the site is served from
    pub base_url: String,

    /// Page processing options
    pub processor: ProcessorConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("pages"),
            output_dir: PathBuf::from("dist"),
            minify: true,
            base_url: "/".to_string(),
            processor: ProcessorConfig::default(),
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of pages processed
    pub pages: usize,

    /// Number of marked elements rendered
    pub rendered: usize,

    /// Number of marked elements that failed or were skipped
    pub failed: usize,

    /// Number of other files copied
    pub copied: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read source directory: {0}")]
    ReadError(String),

    #[error("Failed to process page: {path}: {message}")]
    ProcessError { path: String, message: String },

    #[error("Failed to write output: {0}")]
    WriteError(String),
}

/// A source file and where it goes.
#[derive(Debug)]
struct SourceFile {
    source_path: PathBuf,
    output_path: PathBuf,
}

/// Element counts for one page.
#[derive(Debug, Default)]
struct PageStats {
    rendered: usize,
    failed: usize,
}

/// Static site builder.
pub struct StaticBuilder {
    config: BuildConfig,
    processor: PageProcessor,
}

impl StaticBuilder {
    /// Create a new static builder.
    ///
    /// Frames link the published article stylesheet unless an asset base is
    /// already configured.
    pub fn new(config: BuildConfig) -> Self {
        let mut processor_config = config.processor.clone();
        if processor_config.tex.asset_base.is_none() {
            processor_config.tex.asset_base = Some(format!("{}{}/", config.base_url, ASSET_DIR));
        }

        Self {
            processor: PageProcessor::new(processor_config),
            config,
        }
    }

    /// Build the static site.
    pub async fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        if !self.config.source_dir.is_dir() {
            return Err(BuildError::ReadError(format!(
                "Source directory not found: {}",
                self.config.source_dir.display()
            )));
        }

        // Ensure output directory exists
        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        let (pages, others) = self.discover_files()?;

        // Render pages in parallel
        let stats: Vec<Result<PageStats, BuildError>> = pages
            .par_iter()
            .map(|page| self.build_page(page))
            .collect();

        let mut rendered = 0;
        let mut failed = 0;
        for result in stats {
            let page = result?;
            rendered += page.rendered;
            failed += page.failed;
        }

        // Copy everything else as-is
        others
            .par_iter()
            .map(copy_file)
            .collect::<Result<Vec<_>, _>>()?;

        AssetPipeline::write_article_css(&self.config.output_dir, self.config.minify)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        let duration = start.elapsed();

        tracing::info!(
            pages = pages.len(),
            rendered,
            failed,
            copied = others.len(),
            "Built site in {}ms",
            duration.as_millis()
        );

        Ok(BuildResult {
            pages: pages.len(),
            rendered,
            failed,
            copied: others.len(),
            duration_ms: duration.as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Split the source tree into pages and other files.
    fn discover_files(&self) -> Result<(Vec<SourceFile>, Vec<SourceFile>), BuildError> {
        let mut pages = Vec::new();
        let mut others = Vec::new();

        // The output directory may live inside the source tree.
        let output_dir = self.config.output_dir.canonicalize().ok();

        let walker = WalkDir::new(&self.config.source_dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                !entry.file_type().is_dir()
                    || output_dir.as_deref().map_or(true, |out| {
                        entry.path().canonicalize().map_or(true, |p| p != out)
                    })
            });

        for entry in walker {
            let entry = entry.map_err(|e| BuildError::ReadError(e.to_string()))?;
            let path = entry.path();

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = path
                .strip_prefix(&self.config.source_dir)
                .unwrap_or(path)
                .to_path_buf();

            let file = SourceFile {
                source_path: path.to_path_buf(),
                output_path: self.config.output_dir.join(&relative),
            };

            if is_page(path) {
                pages.push(file);
            } else {
                others.push(file);
            }
        }

        Ok((pages, others))
    }

    /// Render a single page.
    fn build_page(&self, page: &SourceFile) -> Result<PageStats, BuildError> {
        let html = fs::read_to_string(&page.source_path).map_err(|e| {
            BuildError::ReadError(format!("{}: {}", page.source_path.display(), e))
        })?;

        let rendered = self
            .processor
            .process(&html)
            .map_err(|e| BuildError::ProcessError {
                path: page.source_path.display().to_string(),
                message: e.to_string(),
            })?;

        let report = &rendered.report;
        if !report.is_clean() {
            tracing::warn!(
                "{}: {} of {} marked elements did not render",
                page.source_path.display(),
                report.failed() + report.skipped(),
                report.elements.len()
            );
        }

        ensure_parent(&page.output_path)?;
        fs::write(&page.output_path, &rendered.html)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        tracing::debug!("Rendered {}", page.source_path.display());

        Ok(PageStats {
            rendered: report.rendered(),
            failed: report.failed() + report.skipped(),
        })
    }
}

/// Whether a file is an HTML page whose marked elements get rendered.
pub fn is_page(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

fn copy_file(file: &SourceFile) -> Result<(), BuildError> {
    ensure_parent(&file.output_path)?;
    fs::copy(&file.source_path, &file.output_path)
        .map(|_| ())
        .map_err(|e| BuildError::WriteError(format!("{}: {}", file.source_path.display(), e)))
}

fn ensure_parent(path: &Path) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::WriteError(e.to_string()))?;
    }
    Ok(())
}
