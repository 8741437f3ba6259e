// ABOUTME: Color table shared by every drawing surface
// ABOUTME: Resolves textual color specs once per process into graphics contexts

use crate::errors::{ExportError, Result};
use log::debug;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tiny_skia::{Color, FilterQuality, Paint, Pattern, Pixmap, SpreadMode, Transform};

/// How a graphics context fills the shapes drawn with it
#[derive(Clone, Debug)]
pub enum Fill {
    Solid,
    /// Repeat the pixmap across the whole page
    Tiled(Arc<Pixmap>),
}

/// A resolved drawing state: a color and a fill rule
#[derive(Clone, Debug)]
pub struct GraphicsContext {
    pub color: Color,
    pub fill: Fill,
}

impl GraphicsContext {
    pub fn solid(color: Color) -> Self {
        Self {
            color,
            fill: Fill::Solid,
        }
    }

    /// Build the tiny-skia paint for this context
    pub fn paint(&self) -> Paint<'_> {
        let mut paint = Paint::default();
        paint.anti_alias = true;
        match &self.fill {
            Fill::Solid => paint.set_color(self.color),
            Fill::Tiled(tile) => {
                paint.shader = Pattern::new(
                    (**tile).as_ref(),
                    SpreadMode::Repeat,
                    FilterQuality::Nearest,
                    1.0,
                    Transform::identity(),
                );
            }
        }
        paint
    }
}

/// Process-wide mapping from color specs to allocated colors.
///
/// A spec is allocated at most once; later lookups return the same color.
/// A spec that could not be allocated keeps failing for the cache lifetime.
pub struct ColorCache {
    colors: RwLock<HashMap<String, Color>>,
    failed: RwLock<HashSet<String>>,
    capacity: Option<usize>,
}

impl Default for ColorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorCache {
    /// Create an unbounded color table
    pub fn new() -> Self {
        Self {
            colors: RwLock::new(HashMap::new()),
            failed: RwLock::new(HashSet::new()),
            capacity: None,
        }
    }

    /// Create a table that can hold at most `capacity` allocated colors,
    /// like a display with a small colormap
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// The table shared by every surface in this process
    pub fn global() -> Arc<ColorCache> {
        static GLOBAL: OnceLock<Arc<ColorCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ColorCache::new())).clone()
    }

    /// Resolve a color spec, allocating it on first use
    pub fn resolve(&self, spec: &str) -> Result<Color> {
        if let Some(color) = self.colors.read().get(spec) {
            return Ok(*color);
        }
        if self.failed.read().contains(spec) {
            return Err(ExportError::ColorAllocation(spec.to_string()));
        }

        let mut colors = self.colors.write();
        // Someone else may have won the race while we waited for the lock
        if let Some(color) = colors.get(spec) {
            return Ok(*color);
        }

        let full = self.capacity.is_some_and(|capacity| colors.len() >= capacity);
        match parse_color(spec) {
            Some(color) if !full => {
                debug!("Allocated color {:?}", spec);
                colors.insert(spec.to_string(), color);
                Ok(color)
            }
            _ => {
                drop(colors);
                self.failed.write().insert(spec.to_string());
                Err(ExportError::ColorAllocation(spec.to_string()))
            }
        }
    }

    /// Resolve a color spec into a solid graphics context
    pub fn context(&self, spec: &str) -> Result<GraphicsContext> {
        self.resolve(spec).map(GraphicsContext::solid)
    }

    /// Number of colors allocated so far
    pub fn len(&self) -> usize {
        self.colors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse a color name or a `#rgb`, `#rrggbb`, `#rrggbbaa` or `#rrrrggggbbbb` spec
pub fn parse_color(spec: &str) -> Option<Color> {
    let spec = spec.trim();
    if let Some(hex) = spec.strip_prefix('#') {
        return parse_hex(hex);
    }

    let (r, g, b) = match spec.to_ascii_lowercase().as_str() {
        "white" => (255, 255, 255),
        "black" => (0, 0, 0),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" | "aqua" => (0, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255),
        "gray" | "grey" => (190, 190, 190),
        "darkgray" | "darkgrey" => (169, 169, 169),
        "lightgray" | "lightgrey" => (211, 211, 211),
        "silver" => (192, 192, 192),
        "orange" => (255, 165, 0),
        "purple" => (160, 32, 240),
        "brown" => (165, 42, 42),
        "pink" => (255, 192, 203),
        "navy" => (0, 0, 128),
        "maroon" => (176, 48, 96),
        "olive" => (128, 128, 0),
        "teal" => (0, 128, 128),
        "transparent" => return Some(Color::TRANSPARENT),
        _ => return None,
    };
    Some(Color::from_rgba8(r, g, b, 255))
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |start: usize, len: usize| -> Option<u8> {
        let value = u32::from_str_radix(&hex[start..start + len], 16).ok()?;
        let max = (1u32 << (4 * len)) - 1;
        Some(((value * 255 + max / 2) / max) as u8)
    };

    match hex.len() {
        3 => Some(Color::from_rgba8(channel(0, 1)?, channel(1, 1)?, channel(2, 1)?, 255)),
        6 => Some(Color::from_rgba8(channel(0, 2)?, channel(2, 2)?, channel(4, 2)?, 255)),
        8 => Some(Color::from_rgba8(
            channel(0, 2)?,
            channel(2, 2)?,
            channel(4, 2)?,
            channel(6, 2)?,
        )),
        12 => Some(Color::from_rgba8(channel(0, 4)?, channel(4, 4)?, channel(8, 4)?, 255)),
        _ => None,
    }
}
