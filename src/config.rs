// ABOUTME: Configuration module for the big-export application
// ABOUTME: Provides export settings and environment variable handling

use crate::errors::{ExportError, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_IMAGE_FORMAT: &str = "png";
const DEFAULT_BASE_NAME: &str = "slide";

/// Global configuration for the application
pub struct Config {
    pub html_template_path: Option<PathBuf>,
    pub image_format: String,
    pub feed_base_uri: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            html_template_path: None,
            image_format: DEFAULT_IMAGE_FORMAT.to_string(),
            feed_base_uri: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl Config {
    /// Create a new configuration instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let html_template_path = env::var("HTML_TEMPLATE_PATH").ok().map(PathBuf::from);
        let image_format = env::var("EXPORT_IMAGE_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_FORMAT.to_string());
        let feed_base_uri = env::var("FEED_BASE_URI").ok().filter(|s| !s.is_empty());
        let width = env::var("EXPORT_WIDTH")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_WIDTH);
        let height = env::var("EXPORT_HEIGHT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_HEIGHT);

        Self {
            html_template_path,
            image_format,
            feed_base_uri,
            width,
            height,
        }
    }

    /// Get an export configuration with defaults from this config
    #[allow(clippy::too_many_arguments)]
    pub fn get_export_config(
        &self,
        output_dir: PathBuf,
        base_name: Option<String>,
        image_format: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        emit_slide_pages: bool,
        emit_index_pages: bool,
        feed_base_uri: Option<String>,
    ) -> ExportConfig {
        ExportConfig {
            output_dir,
            base_name: base_name.unwrap_or_else(|| DEFAULT_BASE_NAME.to_string()),
            image_format: image_format.unwrap_or_else(|| self.image_format.clone()),
            width: width.unwrap_or(self.width),
            height: height.unwrap_or(self.height),
            emit_slide_pages,
            emit_index_pages,
            feed_base_uri: feed_base_uri.or_else(|| self.feed_base_uri.clone()),
            template_path: self.html_template_path.clone(),
        }
    }
}

/// Settings for one export run
#[derive(Clone, Debug)]
pub struct ExportConfig {
    /// Directory receiving the site
    pub output_dir: PathBuf,
    /// Prefix of every numbered file, e.g. `slide` for `slide1.html`
    pub base_name: String,
    /// Image type written for each slide, e.g. `png` or `jpg`
    pub image_format: String,
    pub width: u32,
    pub height: u32,
    /// Write one HTML page per slide
    pub emit_slide_pages: bool,
    /// Write the index (overview) pages
    pub emit_index_pages: bool,
    /// Enables the RSS feed when set
    pub feed_base_uri: Option<String>,
    /// Custom HTML template; the built-in one is used when unset
    pub template_path: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            base_name: DEFAULT_BASE_NAME.to_string(),
            image_format: DEFAULT_IMAGE_FORMAT.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            emit_slide_pages: true,
            emit_index_pages: false,
            feed_base_uri: None,
            template_path: None,
        }
    }
}

impl ExportConfig {
    /// Base name including the output directory, as used for filenames
    pub fn base_path(&self) -> String {
        self.output_dir
            .join(&self.base_name)
            .to_string_lossy()
            .into_owned()
    }

    pub fn feed_enabled(&self) -> bool {
        self.feed_base_uri.is_some()
    }

    /// Check the settings before anything is written
    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(ExportError::ConfigError("Base name must not be empty".to_string()));
        }
        if self.base_name.contains(['/', '\\']) {
            return Err(ExportError::ConfigError(format!(
                "Base name must not contain a path separator: {:?}",
                self.base_name
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ExportError::ConfigError(format!(
                "Invalid page size: {}x{}",
                self.width, self.height
            )));
        }
        if image::ImageFormat::from_extension(crate::naming::normalize_image_type(
            &self.image_format,
        ))
        .is_none()
        {
            return Err(ExportError::ConfigError(format!(
                "Unsupported image format: {}",
                self.image_format
            )));
        }
        if let Some(uri) = &self.feed_base_uri {
            url::Url::parse(uri).map_err(|e| {
                ExportError::ConfigError(format!("Invalid feed base URI {:?}: {}", uri, e))
            })?;
        }
        Ok(())
    }
}
