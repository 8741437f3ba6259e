// ABOUTME: HTML page template for exported slides
// ABOUTME: Loads and parses the template once, then renders it per page from a PageView

use crate::errors::{ExportError, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Template shipped with the crate
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/slide.html");

/// Value of the generator meta tag
pub const GENERATOR: &str = concat!("big-export ", env!("CARGO_PKG_VERSION"));

/// Everything a page template can refer to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Title,
    RssLink,
    Navi,
    ToggleModeNavi,
    Content,
    Generator,
}

impl Slot {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Slot::Title),
            "rss_link" => Some(Slot::RssLink),
            "navi" => Some(Slot::Navi),
            "toggle_mode_navi" => Some(Slot::ToggleModeNavi),
            "content" => Some(Slot::Content),
            "generator" => Some(Slot::Generator),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Slot(Slot),
}

/// Values substituted into the template for one page; all already HTML
#[derive(Clone, Debug, Default)]
pub struct PageView {
    pub title: String,
    pub rss_link: String,
    pub navi: String,
    pub toggle_mode_navi: String,
    pub content: String,
}

/// A parsed page template
#[derive(Clone, Debug)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Load the template from `path`, or the built-in one when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ExportError::MissingTemplate(path.to_path_buf()));
                }
                info!("Loading HTML template: {:?}", path);
                let source = fs::read_to_string(path)?;
                Self::parse(&source)
            }
            None => Self::parse(DEFAULT_TEMPLATE),
        }
    }

    /// Parse `{{ name }}` placeholders out of a template source
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                ExportError::TemplateError("Unterminated {{ placeholder".to_string())
            })?;
            let name = after[..end].trim();
            let slot = Slot::from_name(name).ok_or_else(|| {
                ExportError::TemplateError(format!("Unknown placeholder: {}", name))
            })?;
            segments.push(Segment::Slot(slot));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render a page
    pub fn render(&self, view: &PageView) -> String {
        let mut html = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => html.push_str(text),
                Segment::Slot(Slot::Title) => html.push_str(&view.title),
                Segment::Slot(Slot::RssLink) => html.push_str(&view.rss_link),
                Segment::Slot(Slot::Navi) => html.push_str(&view.navi),
                Segment::Slot(Slot::ToggleModeNavi) => html.push_str(&view.toggle_mode_navi),
                Segment::Slot(Slot::Content) => html.push_str(&view.content),
                Segment::Slot(Slot::Generator) => html.push_str(GENERATOR),
            }
        }
        html
    }
}
