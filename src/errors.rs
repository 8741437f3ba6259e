// ABOUTME: Error types for the big-export application
// ABOUTME: Provides structured error handling for rendering, site generation and feeds

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write file: {0}")]
    FileWriteError(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Can't find HTML template: {0}")]
    MissingTemplate(PathBuf),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Can't allocate color: {0}")]
    ColorAllocation(String),

    #[error("RSS feed is unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Feed XML error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Text markup error: {0}")]
    MarkupError(String),

    #[error("Font error: {0}")]
    FontError(String),

    #[error("Page {page} has not been rendered")]
    PageNotRendered { page: usize },

    #[error("A render or print job is already running")]
    RenderBusy,

    #[error("No printable backend is available")]
    PrintUnavailable,

    #[error("Render thread panicked")]
    RenderThreadPanicked,

    #[error("Drawing error: {0}")]
    DrawError(String),

    #[error("Input validation error: {0}")]
    ValidationError(String),

    #[error("Path not found: {0}")]
    PathNotFoundError(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Watch error: {0}")]
    WatchError(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;
