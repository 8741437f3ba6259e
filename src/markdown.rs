// ABOUTME: Markdown slide deck, the reference Deck implementation
// ABOUTME: Parses big-style markdown with comrak and draws slides and index pages

use crate::deck::{Deck, HtmlLinks, RenderMode};
use crate::errors::{ExportError, Result};
use crate::fonts::{FontLayoutEngine, TextStyle};
use crate::site::THUMBNAIL_SUFFIX;
use crate::surface::{Canvas, ColorSource};
use crate::utils::{escape_html, unescape_title};
use comrak::nodes::{AstNode, NodeValue};
use comrak::{Arena, ComrakOptions, markdown_to_html, parse_document};
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Slides shown on one index page
pub const SLIDES_PER_INDEX_PAGE: usize = 4;

const INDEX_COLUMNS: usize = 2;

/// Colors a deck is drawn with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub background: &'static str,
    pub foreground: &'static str,
    pub accent: &'static str,
}

/// Themes available to markdown decks
pub const THEMES: &[Theme] = &[
    Theme {
        name: "default",
        background: "white",
        foreground: "black",
        accent: "#3366cc",
    },
    Theme {
        name: "dark",
        background: "#1e1e1e",
        foreground: "#f0f0f0",
        accent: "#ffcc00",
    },
    Theme {
        name: "paper",
        background: "#fdf6e3",
        foreground: "#586e75",
        accent: "#cb4b16",
    },
];

/// Look up a theme by name
pub fn find_theme(name: &str) -> Option<&'static Theme> {
    THEMES.iter().find(|theme| theme.name == name)
}

/// Frontmatter in the format: % Title\n% Author\n% Date
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frontmatter {
    pub title: String,
    pub author: String,
    pub date: String,
}

/// One slide of a markdown deck
#[derive(Clone, Debug, PartialEq)]
pub struct Slide {
    /// Heading text as written, escapes included
    pub title: String,
    /// Markdown below the heading
    pub body: String,
}

impl Slide {
    fn body_html(&self) -> String {
        markdown_to_html(&self.body, &comrak_options())
    }

    fn body_text(&self) -> String {
        plain_text(&self.body)
    }
}

/// A deck read from big-style markdown: `%` frontmatter, one slide per `#` heading
pub struct MarkdownDeck {
    source: String,
    frontmatter: Frontmatter,
    slides: Vec<Slide>,
    mode: RenderMode,
    theme: &'static Theme,
    modified: bool,
}

impl Default for MarkdownDeck {
    fn default() -> Self {
        Self {
            source: String::new(),
            frontmatter: Frontmatter::default(),
            slides: Vec::new(),
            mode: RenderMode::Slide,
            theme: &THEMES[0],
            modified: false,
        }
    }
}

impl MarkdownDeck {
    /// An empty deck with the default theme
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a deck from markdown source
    pub fn parse(source: &str) -> Self {
        let mut deck = Self::new();
        deck.load(source);
        deck
    }

    /// Read and parse a markdown file
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Reading markdown deck: {:?}", path);

        // Validate input file exists
        if !path.exists() {
            return Err(ExportError::PathNotFoundError(path.to_path_buf()));
        }

        let source = fs::read_to_string(path)?;
        Ok(Self::parse(&source))
    }

    pub fn frontmatter(&self) -> &Frontmatter {
        &self.frontmatter
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn theme(&self) -> &'static Theme {
        self.theme
    }

    /// Replace the source without parsing it; the deck is marked modified
    pub fn set_source(&mut self, source: &str) {
        if self.source != source {
            self.source = source.to_string();
            self.modified = true;
        }
    }

    fn load(&mut self, source: &str) {
        let (frontmatter, content) = parse_frontmatter(source);
        self.slides = split_slides(&content, &frontmatter.title);
        self.frontmatter = frontmatter;
        self.source = source.to_string();
        self.modified = false;
        debug!("Parsed {} slides", self.slides.len());
    }

    /// Slides shown on an index page
    fn index_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = (index * SLIDES_PER_INDEX_PAGE).min(self.slides.len());
        let end = (start + SLIDES_PER_INDEX_PAGE).min(self.slides.len());
        start..end
    }

    fn draw_slide(&self, index: usize, canvas: &mut dyn Canvas, fonts: &FontLayoutEngine) -> Result<()> {
        let slide = self
            .slides
            .get(index)
            .ok_or_else(|| ExportError::DrawError(format!("No slide {}", index)))?;
        let (width, height) = (canvas.width() as f32, canvas.height() as f32);
        let margin = height / 16.0;

        let title = escape_html(&unescape_title(&slide.title));
        let body = slide.body_text();

        if body.is_empty() {
            // Title-only slides get the big centered treatment
            let style = text_style(fonts, height / 6.0, self.theme.foreground, true);
            let (layout, w, h) = fonts.measure_with(&title, &style)?;
            let x = ((width - w as f32) / 2.0).max(margin);
            let y = ((height - h as f32) / 2.0).max(margin);
            return canvas.draw_text_layout(&layout, x, y, ColorSource::Spec(self.theme.foreground));
        }

        let title_style = text_style(fonts, height / 10.0, self.theme.foreground, true);
        let (title_layout, title_width, title_height) = fonts.measure_with(&title, &title_style)?;
        let title_x = ((width - title_width as f32) / 2.0).max(margin);
        canvas.draw_text_layout(
            &title_layout,
            title_x,
            margin,
            ColorSource::Spec(self.theme.foreground),
        )?;

        let rule_y = margin * 1.5 + title_height as f32;
        canvas.draw_line(
            margin,
            rule_y,
            width - margin,
            rule_y,
            ColorSource::Spec(self.theme.accent),
        )?;

        let body_style = text_style(fonts, height / 20.0, self.theme.foreground, false);
        let (body_layout, _, _) = fonts.measure_with(&escape_html(&body), &body_style)?;
        canvas.draw_text_layout(
            &body_layout,
            margin * 2.0,
            rule_y + margin,
            ColorSource::Spec(self.theme.foreground),
        )
    }

    fn draw_index(&self, index: usize, canvas: &mut dyn Canvas, fonts: &FontLayoutEngine) -> Result<()> {
        let (width, height) = (canvas.width() as f32, canvas.height() as f32);
        let rows = (SLIDES_PER_INDEX_PAGE + INDEX_COLUMNS - 1) / INDEX_COLUMNS;
        let cell_width = width / INDEX_COLUMNS as f32;
        let cell_height = height / rows as f32;
        let padding = cell_height / 10.0;
        let style = text_style(fonts, cell_height / 8.0, self.theme.foreground, true);

        for (position, slide_number) in self.index_range(index).enumerate() {
            let x = (position % INDEX_COLUMNS) as f32 * cell_width + padding;
            let y = (position / INDEX_COLUMNS) as f32 * cell_height + padding;
            let (box_width, box_height) = (cell_width - 2.0 * padding, cell_height - 2.0 * padding);
            canvas.draw_rect(
                false,
                x,
                y,
                box_width,
                box_height,
                ColorSource::Spec(self.theme.accent),
            )?;

            let title = escape_html(&unescape_title(&self.slides[slide_number].title));
            let (layout, w, h) = fonts.measure_with(&title, &style)?;
            canvas.draw_text_layout(
                &layout,
                x + ((box_width - w as f32) / 2.0).max(0.0),
                y + ((box_height - h as f32) / 2.0).max(0.0),
                ColorSource::Spec(self.theme.foreground),
            )?;
        }
        Ok(())
    }
}

impl Deck for MarkdownDeck {
    fn slide_count(&self, mode: RenderMode) -> usize {
        match mode {
            RenderMode::Slide => self.slides.len(),
            RenderMode::Index => (self.slides.len() + SLIDES_PER_INDEX_PAGE - 1) / SLIDES_PER_INDEX_PAGE,
        }
    }

    fn mode(&self) -> RenderMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    fn slide_title(&self, index: usize) -> String {
        match self.mode {
            RenderMode::Slide => self
                .slides
                .get(index)
                .map(|slide| slide.title.clone())
                .unwrap_or_default(),
            RenderMode::Index => self.frontmatter.title.clone(),
        }
    }

    fn draw_page(&self, index: usize, canvas: &mut dyn Canvas, fonts: &FontLayoutEngine) -> Result<()> {
        let (width, height) = (canvas.width() as f32, canvas.height() as f32);
        canvas.set_foreground(ColorSource::Spec(self.theme.foreground))?;
        canvas.set_background(ColorSource::Spec(self.theme.background))?;
        canvas.draw_rect(true, 0.0, 0.0, width, height, ColorSource::Spec(self.theme.background))?;

        match self.mode {
            RenderMode::Slide => self.draw_slide(index, canvas, fonts),
            RenderMode::Index => self.draw_index(index, canvas, fonts),
        }
    }

    fn to_raw_text(&self, index: usize) -> String {
        match self.mode {
            RenderMode::Slide => match self.slides.get(index) {
                Some(slide) => {
                    let title = unescape_title(&slide.title);
                    let body = slide.body_text();
                    if body.is_empty() {
                        title
                    } else {
                        format!("{}\n{}", title, body)
                    }
                }
                None => String::new(),
            },
            RenderMode::Index => self
                .index_range(index)
                .map(|n| unescape_title(&self.slides[n].title))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn to_html_body(&self, index: usize, links: &dyn HtmlLinks) -> String {
        match self.mode {
            RenderMode::Slide => match self.slides.get(index) {
                Some(slide) => format!(
                    "<h1>{}</h1>\n{}",
                    escape_html(&unescape_title(&slide.title)),
                    slide.body_html()
                ),
                None => String::new(),
            },
            RenderMode::Index => {
                let mut html = String::from("<div class=\"index\">\n<ul>\n");
                for slide_number in self.index_range(index) {
                    html.push_str(&format!(
                        "<li><a href=\"{}\"><img title=\"{}\" src=\"{}\" /></a></li>\n",
                        links.slide_href(slide_number),
                        links.slide_image_title(slide_number),
                        links.image_src(slide_number, Some(THUMBNAIL_SUFFIX))
                    ));
                }
                html.push_str("</ul>\n</div>");
                html
            }
        }
    }

    fn theme_name(&self) -> String {
        self.theme.name.to_string()
    }

    fn apply_theme(&mut self, name: &str) -> Result<()> {
        self.theme = find_theme(name)
            .ok_or_else(|| ExportError::ValidationError(format!("Unknown theme: {}", name)))?;
        info!("Applied theme {:?}", name);
        Ok(())
    }

    fn source(&self) -> String {
        self.source.clone()
    }

    fn reparse(&mut self, source: &str) -> Result<()> {
        self.load(source);
        Ok(())
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn blank(&self) -> Box<dyn Deck> {
        Box::new(MarkdownDeck::new())
    }
}

fn comrak_options() -> ComrakOptions {
    let mut options = ComrakOptions::default();
    options.render.unsafe_ = true; // Allow raw HTML
    options
}

fn text_style(fonts: &FontLayoutEngine, size: f32, foreground: &str, bold: bool) -> TextStyle {
    TextStyle {
        size,
        bold,
        foreground: Some(foreground.to_string()),
        ..fonts.base_style().clone()
    }
}

/// Parse leading `% ` lines as title, author and date
pub fn parse_frontmatter(content: &str) -> (Frontmatter, String) {
    let lines: Vec<&str> = content.lines().collect();
    let mut values = Vec::new();
    let mut start_idx = 0;

    while start_idx < lines.len() && values.len() < 3 {
        match lines[start_idx].strip_prefix("% ") {
            Some(value) => values.push(value.trim().to_string()),
            None => break,
        }
        start_idx += 1;
    }

    if values.is_empty() {
        return (
            Frontmatter {
                title: "Presentation".to_string(),
                ..Frontmatter::default()
            },
            content.to_string(),
        );
    }

    // Skip optional blank lines after the frontmatter
    while start_idx < lines.len() && lines[start_idx].trim().is_empty() {
        start_idx += 1;
    }

    let mut values = values.into_iter();
    let frontmatter = Frontmatter {
        title: values.next().unwrap_or_default(),
        author: values.next().unwrap_or_default(),
        date: values.next().unwrap_or_default(),
    };
    (frontmatter, lines[start_idx..].join("\n"))
}

/// Heading text if `line` starts a slide: `# Text` or `#Text`, not `##`
fn slide_heading(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('#')?;
    if rest.starts_with('#') {
        return None;
    }
    Some(rest.trim())
}

/// Split content into slides at each top-level heading.
///
/// Text before the first heading becomes a slide titled `deck_title`.
/// Headings inside fenced code blocks are ignored.
pub fn split_slides(content: &str, deck_title: &str) -> Vec<Slide> {
    let mut slides = Vec::new();
    let mut title: Option<String> = None;
    let mut body = String::new();
    let mut in_fence = false;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        match slide_heading(line).filter(|_| !in_fence) {
            Some(heading) => {
                push_slide(&mut slides, title.take(), &body, deck_title);
                title = Some(heading.to_string());
                body.clear();
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    push_slide(&mut slides, title, &body, deck_title);
    slides
}

fn push_slide(slides: &mut Vec<Slide>, title: Option<String>, body: &str, deck_title: &str) {
    let body = body.trim();
    match title {
        Some(title) => slides.push(Slide {
            title,
            body: body.to_string(),
        }),
        None if !body.is_empty() => slides.push(Slide {
            title: deck_title.to_string(),
            body: body.to_string(),
        }),
        None => {}
    }
}

/// Text content of a markdown fragment, one line per block
pub fn plain_text(markdown: &str) -> String {
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &comrak_options());
    let mut text = String::new();
    collect_text(root, &mut text);
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text<'a>(node: &'a AstNode<'a>, out: &mut String) {
    let block = {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::Text(text) => out.push_str(text),
            NodeValue::Code(code) => out.push_str(&code.literal),
            NodeValue::CodeBlock(code) => out.push_str(&code.literal),
            NodeValue::SoftBreak => out.push(' '),
            NodeValue::LineBreak => out.push('\n'),
            _ => {}
        }
        matches!(
            data.value,
            NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::Item(_) | NodeValue::CodeBlock(_)
        )
    };

    for child in node.children() {
        collect_text(child, out);
    }
    if block {
        out.push('\n');
    }
}
