//! Configuration file handling (quill.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quill_markup::MarkdownOptions;
use quill_server::DevServerConfig;
use quill_static::{BuildConfig, ProcessorConfig};
use quill_tex::GeneratorOptions;
use serde::Deserialize;

/// Configuration file structure.
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub site: SiteConfig,
    pub markdown: MarkdownOptions,
    pub tex: GeneratorOptions,
    pub frame: FrameSettings,
    pub build: BuildSettings,
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Directory holding the source pages
    pub source: PathBuf,
    /// Output directory for built pages
    pub output: PathBuf,
    /// Base URL (for deployment)
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("pages"),
            output: PathBuf::from("dist"),
            base_url: "/".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub settle_delay_ms: u64,
    pub resize_debounce_ms: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        let processor = ProcessorConfig::default();
        Self {
            settle_delay_ms: processor.settle_delay_ms,
            resize_debounce_ms: processor.resize_debounce_ms,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub minify: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self { minify: true }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

impl ConfigFile {
    /// Page processing options.
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            markdown: self.markdown.clone(),
            tex: self.tex.clone(),
            settle_delay_ms: self.frame.settle_delay_ms,
            resize_debounce_ms: self.frame.resize_debounce_ms,
        }
    }

    /// Static build options, with command line overrides applied.
    pub fn build_config(&self, output: Option<PathBuf>, minify: Option<bool>) -> BuildConfig {
        BuildConfig {
            source_dir: self.site.source.clone(),
            output_dir: output.unwrap_or_else(|| self.site.output.clone()),
            minify: minify.unwrap_or(self.build.minify),
            base_url: self.site.base_url.clone(),
            processor: self.processor_config(),
        }
    }

    /// Development server options.
    pub fn server_config(&self, port: u16, open: bool) -> DevServerConfig {
        DevServerConfig {
            source_dir: self.site.source.clone(),
            port,
            open,
            processor: self.processor_config(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let temp = tempdir().unwrap();
        let config = load_config(&temp.path().join("quill.toml")).unwrap();

        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.processor_config(), ProcessorConfig::default());
        assert_eq!(config.site.source, PathBuf::from("pages"));
        assert!(config.build.minify);
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("quill.toml");
        fs::write(
            &path,
            r#"
[site]
source = "content"

[markdown]
typographer = false

[tex]
hyphenate = true

[frame]
resize_debounce_ms = 120
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        let processor = config.processor_config();

        assert_eq!(config.site.source, PathBuf::from("content"));
        assert_eq!(config.site.output, PathBuf::from("dist"));
        assert!(!processor.markdown.typographer);
        assert!(processor.markdown.linkify);
        assert!(processor.tex.hyphenate);
        assert_eq!(processor.tex.asset_base, None);
        assert_eq!(processor.settle_delay_ms, 10);
        assert_eq!(processor.resize_debounce_ms, 120);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("quill.toml");
        fs::write(&path, "[site\nsource = ").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse"));
    }

    #[test]
    fn command_line_overrides_build_settings() {
        let config = ConfigFile {
            build: BuildSettings { minify: true },
            ..Default::default()
        };

        let build = config.build_config(Some(PathBuf::from("public")), Some(false));
        assert_eq!(build.output_dir, PathBuf::from("public"));
        assert!(!build.minify);

        let build = config.build_config(None, None);
        assert_eq!(build.output_dir, PathBuf::from("dist"));
        assert!(build.minify);
    }

    #[test]
    fn server_config_serves_source_pages() {
        let config = ConfigFile::default();
        let server = config.server_config(8080, false);

        assert_eq!(server.source_dir, PathBuf::from("pages"));
        assert_eq!(server.port, 8080);
        assert!(!server.open);
        assert_eq!(server.host, "127.0.0.1");
    }
}
