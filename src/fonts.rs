// ABOUTME: Font layout engine used to measure and rasterize slide text
// ABOUTME: Parses inline markup into styled spans and lays glyphs out against a font context

use crate::errors::{ExportError, Result};
use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use fontdue::{Font, FontSettings};
use log::{debug, info, warn};
use parking_lot::Mutex;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Default text size in pixels
pub const DEFAULT_FONT_SIZE: f32 = 24.0;

/// Style attached to a run of text
#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    pub family: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub size: f32,
    pub foreground: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            family: None,
            bold: false,
            italic: false,
            size: DEFAULT_FONT_SIZE,
            foreground: None,
        }
    }
}

/// A run of text sharing one style
#[derive(Clone, Debug, PartialEq)]
pub struct StyledSpan {
    pub text: String,
    pub style: TextStyle,
}

/// Source of font faces and family names
pub trait FontContext: Send + Sync {
    /// Every family name the context knows about
    fn list_families(&self) -> Vec<String>;

    /// The face best matching a style, if any face is available
    fn face(&self, style: &TextStyle) -> Option<Arc<Font>>;
}

/// Font context backed by the fonts installed on this system
pub struct SystemFontContext {
    db: Database,
    faces: Mutex<HashMap<fontdb::ID, Arc<Font>>>,
}

impl SystemFontContext {
    /// Load every font installed on the system
    pub fn new() -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        info!("Loaded {} system font faces", db.len());
        Self::from_database(db)
    }

    /// Build a context from an already populated font database
    pub fn from_database(db: Database) -> Self {
        Self {
            db,
            faces: Mutex::new(HashMap::new()),
        }
    }

    /// Build a context holding a single font file
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut db = Database::new();
        db.load_font_file(path)
            .map_err(|e| ExportError::FontError(format!("Failed to load {:?}: {}", path, e)))?;
        Ok(Self::from_database(db))
    }

    fn load_face(&self, id: fontdb::ID) -> Option<Arc<Font>> {
        if let Some(font) = self.faces.lock().get(&id) {
            return Some(font.clone());
        }

        let loaded = self.db.with_face_data(id, |data, index| {
            let settings = FontSettings {
                collection_index: index,
                ..FontSettings::default()
            };
            Font::from_bytes(data, settings)
        })?;

        match loaded {
            Ok(font) => {
                let font = Arc::new(font);
                self.faces.lock().insert(id, font.clone());
                Some(font)
            }
            Err(e) => {
                warn!("Failed to parse font face {:?}: {}", id, e);
                None
            }
        }
    }
}

impl Default for SystemFontContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FontContext for SystemFontContext {
    fn list_families(&self) -> Vec<String> {
        let mut families = Vec::new();
        for face in self.db.faces() {
            for (name, _) in &face.families {
                families.push(name.clone());
            }
        }
        families
    }

    fn face(&self, style: &TextStyle) -> Option<Arc<Font>> {
        let mut families = Vec::with_capacity(2);
        if let Some(name) = &style.family {
            families.push(Family::Name(name));
        }
        families.push(Family::SansSerif);

        let query = Query {
            families: &families,
            weight: if style.bold { Weight::BOLD } else { Weight::NORMAL },
            stretch: Stretch::Normal,
            style: if style.italic { Style::Italic } else { Style::Normal },
        };

        let id = self
            .db
            .query(&query)
            .or_else(|| self.db.faces().into_iter().next().map(|face| face.id))?;
        self.load_face(id)
    }
}

/// Font context without any faces; text is measured with synthetic metrics
/// and not drawn. Useful on headless machines and in tests.
#[derive(Debug, Default)]
pub struct MetricsOnlyContext;

impl FontContext for MetricsOnlyContext {
    fn list_families(&self) -> Vec<String> {
        Vec::new()
    }

    fn face(&self, _style: &TextStyle) -> Option<Arc<Font>> {
        None
    }
}

/// A glyph placed relative to the top-left corner of its layout
#[derive(Clone)]
pub struct PositionedGlyph {
    pub ch: char,
    pub x: f32,
    /// Baseline position
    pub y: f32,
    pub size: f32,
    pub font: Option<Arc<Font>>,
    pub foreground: Option<String>,
}

/// Laid-out text ready to be drawn onto a surface
#[derive(Clone, Default)]
pub struct TextLayout {
    pub glyphs: Vec<PositionedGlyph>,
    pub width: u32,
    pub height: u32,
    pub lines: usize,
}

impl TextLayout {
    /// The characters of the layout, without line breaks
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.ch).collect()
    }
}

#[derive(Default)]
struct LineBuilder {
    glyphs: Vec<PositionedGlyph>,
    width: f32,
    ascent: f32,
    height: f32,
}

impl LineBuilder {
    fn grow(&mut self, ascent: f32, height: f32) {
        self.ascent = self.ascent.max(ascent);
        self.height = self.height.max(height);
    }
}

/// Measures styled text and builds glyph layouts against a shared font context
pub struct FontLayoutEngine {
    context: Arc<dyn FontContext>,
    families: Mutex<BTreeSet<String>>,
    base_style: TextStyle,
}

impl FontLayoutEngine {
    pub fn new(context: Arc<dyn FontContext>) -> Self {
        Self {
            context,
            families: Mutex::new(BTreeSet::new()),
            base_style: TextStyle::default(),
        }
    }

    /// Engine over the fonts installed on this system
    pub fn system() -> Self {
        Self::new(Arc::new(SystemFontContext::new()))
    }

    /// Engine that only measures text, with no font faces
    pub fn metrics_only() -> Self {
        Self::new(Arc::new(MetricsOnlyContext))
    }

    /// Use a different style for text outside any markup span
    pub fn with_base_style(mut self, style: TextStyle) -> Self {
        self.base_style = style;
        self
    }

    pub fn base_style(&self) -> &TextStyle {
        &self.base_style
    }

    /// Lay out inline markup and return the layout with its pixel size
    pub fn measure(&self, markup: &str) -> Result<(TextLayout, u32, u32)> {
        self.measure_with(markup, &self.base_style)
    }

    /// Lay out inline markup starting from an explicit base style
    pub fn measure_with(&self, markup: &str, base: &TextStyle) -> Result<(TextLayout, u32, u32)> {
        let spans = parse_markup(markup, base)?;
        let layout = self.layout_spans(&spans);
        let (width, height) = (layout.width, layout.height);
        Ok((layout, width, height))
    }

    /// Family names available to this engine.
    ///
    /// The list is enumerated on first use and cached. An empty result is
    /// treated as "not enumerated yet" and retried on the next call.
    pub fn list_families(&self) -> BTreeSet<String> {
        let mut families = self.families.lock();
        if families.is_empty() {
            families.extend(self.context.list_families());
            debug!("Enumerated {} font families", families.len());
        }
        families.clone()
    }

    fn layout_spans(&self, spans: &[StyledSpan]) -> TextLayout {
        let mut layout = TextLayout::default();
        let mut line = LineBuilder::default();
        let mut top = 0.0f32;
        let mut width = 0.0f32;
        let mut last_style = self.base_style.clone();

        let mut finish_line = |line: &mut LineBuilder, style: &TextStyle, layout: &mut TextLayout| {
            if line.height == 0.0 {
                // Empty lines still take the height of the current style
                let (ascent, height) = synthetic_line_metrics(style.size);
                line.grow(ascent, height);
            }
            for mut glyph in line.glyphs.drain(..) {
                glyph.y += top + line.ascent;
                layout.glyphs.push(glyph);
            }
            width = width.max(line.width);
            top += line.height;
            layout.lines += 1;
            *line = LineBuilder::default();
        };

        for span in spans {
            let font = self.context.face(&span.style);
            let size = span.style.size;
            let (ascent, height) = match font.as_ref().and_then(|f| f.horizontal_line_metrics(size)) {
                Some(metrics) => (metrics.ascent, metrics.new_line_size),
                None => synthetic_line_metrics(size),
            };

            for ch in span.text.chars() {
                if ch == '\n' {
                    finish_line(&mut line, &span.style, &mut layout);
                    continue;
                }
                line.grow(ascent, height);
                let advance = match &font {
                    Some(font) => font.metrics(ch, size).advance_width,
                    None => size * 0.6,
                };
                line.glyphs.push(PositionedGlyph {
                    ch,
                    x: line.width,
                    y: 0.0,
                    size,
                    font: font.clone(),
                    foreground: span.style.foreground.clone(),
                });
                line.width += advance;
            }
            last_style = span.style.clone();
        }
        finish_line(&mut line, &last_style, &mut layout);

        layout.width = width.ceil() as u32;
        layout.height = top.ceil() as u32;
        layout
    }
}

fn synthetic_line_metrics(size: f32) -> (f32, f32) {
    (size * 0.8, size * 1.2)
}

/// Parse the inline markup subset into styled spans.
///
/// Supported tags: `<b>`, `<i>`, `<big>`, `<small>` and `<span>` with
/// `size`, `weight`, `style`, `font_family`/`face` and `foreground`/`color`.
pub fn parse_markup(markup: &str, base: &TextStyle) -> Result<Vec<StyledSpan>> {
    let wrapped = format!("<markup>{}</markup>", markup);
    let mut reader = Reader::from_str(&wrapped);
    let mut stack: Vec<TextStyle> = Vec::new();
    let mut spans: Vec<StyledSpan> = Vec::new();

    let markup_error = |e: quick_xml::Error| ExportError::MarkupError(format!("{}", e));

    loop {
        match reader.read_event().map_err(markup_error)? {
            Event::Start(tag) => {
                let parent = stack.last().unwrap_or(base).clone();
                let style = if tag.name().as_ref() == b"markup" && stack.is_empty() {
                    parent
                } else {
                    apply_tag(&tag, parent)?
                };
                stack.push(style);
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(markup_error)?;
                push_text(&mut spans, &text, stack.last().unwrap_or(base));
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                push_text(&mut spans, &text, stack.last().unwrap_or(base));
            }
            Event::Empty(tag) => {
                if tag.name().as_ref() == b"br" {
                    push_text(&mut spans, "\n", stack.last().unwrap_or(base));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(spans)
}

fn push_text(spans: &mut Vec<StyledSpan>, text: &str, style: &TextStyle) {
    if text.is_empty() {
        return;
    }
    match spans.last_mut() {
        Some(last) if last.style == *style => last.text.push_str(text),
        _ => spans.push(StyledSpan {
            text: text.to_string(),
            style: style.clone(),
        }),
    }
}

fn apply_tag(tag: &BytesStart<'_>, mut style: TextStyle) -> Result<TextStyle> {
    match tag.name().as_ref() {
        b"b" => style.bold = true,
        b"i" => style.italic = true,
        b"big" => style.size *= 1.2,
        b"small" => style.size /= 1.2,
        b"span" => {
            for attr in tag.attributes() {
                let attr = attr.map_err(|e| ExportError::MarkupError(e.to_string()))?;
                let value = attr
                    .unescape_value()
                    .map_err(|e| ExportError::MarkupError(e.to_string()))?;
                match attr.key.as_ref() {
                    b"size" => style.size = parse_size(&value, style.size)?,
                    b"weight" => style.bold = matches!(value.as_ref(), "bold" | "heavy" | "ultrabold"),
                    b"style" => style.italic = matches!(value.as_ref(), "italic" | "oblique"),
                    b"font_family" | b"face" => style.family = Some(value.into_owned()),
                    b"foreground" | b"color" => style.foreground = Some(value.into_owned()),
                    other => {
                        debug!(
                            "Ignoring span attribute {:?}",
                            String::from_utf8_lossy(other)
                        );
                    }
                }
            }
        }
        other => {
            return Err(ExportError::MarkupError(format!(
                "Unsupported tag <{}>",
                String::from_utf8_lossy(other)
            )));
        }
    }
    Ok(style)
}

/// Parse a span size: a keyword, `NNpx`, `NNpt` or a number in 1/1024 points
fn parse_size(value: &str, current: f32) -> Result<f32> {
    let scale = match value {
        "xx-small" => Some(0.5787),
        "x-small" => Some(0.6944),
        "small" => Some(0.8333),
        "medium" => Some(1.0),
        "large" => Some(1.2),
        "x-large" => Some(1.44),
        "xx-large" => Some(1.728),
        _ => None,
    };
    if let Some(scale) = scale {
        return Ok(DEFAULT_FONT_SIZE * scale);
    }
    match value {
        "larger" => return Ok(current * 1.2),
        "smaller" => return Ok(current / 1.2),
        _ => {}
    }

    let invalid = || ExportError::MarkupError(format!("Invalid size: {:?}", value));
    let size = if let Some(px) = value.strip_suffix("px") {
        px.trim().parse::<f32>().map_err(|_| invalid())?
    } else if let Some(pt) = value.strip_suffix("pt") {
        pt.trim().parse::<f32>().map_err(|_| invalid())?
    } else {
        value.parse::<f32>().map_err(|_| invalid())? / 1024.0
    };

    if size <= 0.0 {
        return Err(invalid());
    }
    Ok(size)
}
