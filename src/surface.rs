// ABOUTME: Offscreen drawing surface that rasterizes slide pages into pixel buffers
// ABOUTME: Provides the Canvas drawing primitives decks draw with, backed by tiny-skia

use crate::color::{ColorCache, Fill, GraphicsContext};
use crate::deck::RenderMode;
use crate::errors::{ExportError, Result};
use crate::fonts::TextLayout;
use image::RgbaImage;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{
    Color, FillRule, IntSize, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8, Rect,
    Stroke, Transform,
};

/// Pixel buffer handed out by the surface: non-premultiplied RGBA, 8 bits per channel
pub type PixelBuffer = RgbaImage;

/// Where a primitive takes its color from
#[derive(Clone, Copy)]
pub enum ColorSource<'a> {
    /// The surface's current default context
    Default,
    /// A textual color spec resolved through the shared color table
    Spec(&'a str),
    /// An already resolved context
    Context(&'a GraphicsContext),
}

impl<'a> From<&'a str> for ColorSource<'a> {
    fn from(spec: &'a str) -> Self {
        ColorSource::Spec(spec)
    }
}

impl<'a> From<&'a GraphicsContext> for ColorSource<'a> {
    fn from(context: &'a GraphicsContext) -> Self {
        ColorSource::Context(context)
    }
}

/// Options for image blits
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageOptions {
    /// Scale the image to this width
    pub width: Option<u32>,
    /// Scale the image to this height
    pub height: Option<u32>,
    /// Opacity in 0.0..=1.0, defaults to opaque
    pub opacity: Option<f32>,
}

/// Drawing primitives available to a deck while it draws one page
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Change the default foreground context
    fn set_foreground(&mut self, color: ColorSource<'_>) -> Result<()>;

    /// Change the default background context
    fn set_background(&mut self, color: ColorSource<'_>) -> Result<()>;

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: ColorSource<'_>)
        -> Result<()>;

    fn draw_rect(
        &mut self,
        filled: bool,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: ColorSource<'_>,
    ) -> Result<()>;

    /// Draw an arc inside the given box. Angles are in degrees, counter-clockwise
    /// from three o'clock. A filled arc is a pie slice.
    #[allow(clippy::too_many_arguments)]
    fn draw_arc(
        &mut self,
        filled: bool,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        start_angle: f32,
        sweep_angle: f32,
        color: ColorSource<'_>,
    ) -> Result<()>;

    fn draw_circle(
        &mut self,
        filled: bool,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: ColorSource<'_>,
    ) -> Result<()> {
        self.draw_arc(filled, x, y, width, height, 0.0, 360.0, color)
    }

    fn draw_text_layout(
        &mut self,
        layout: &TextLayout,
        x: f32,
        y: f32,
        color: ColorSource<'_>,
    ) -> Result<()>;

    fn draw_image(&mut self, image: &RgbaImage, x: f32, y: f32, options: &ImageOptions)
        -> Result<()>;
}

/// Offscreen canvas holding one pixmap per rendered page
pub struct DrawingSurface {
    width: u32,
    height: u32,
    colors: Arc<ColorCache>,
    foreground: GraphicsContext,
    background: GraphicsContext,
    pages: HashMap<(RenderMode, usize), Pixmap>,
}

impl DrawingSurface {
    /// Create a surface with a black foreground and a white background
    pub fn new(width: u32, height: u32, colors: Arc<ColorCache>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ExportError::ValidationError(format!(
                "Surface size must be positive, got {}x{}",
                width, height
            )));
        }
        let foreground = colors.context("black")?;
        let background = colors.context("white")?;
        Ok(Self {
            width,
            height,
            colors,
            foreground,
            background,
            pages: HashMap::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn colors(&self) -> &Arc<ColorCache> {
        &self.colors
    }

    /// Allocate (or clear) the buffer for a page and return a drawing handle for it
    pub fn begin_page(&mut self, mode: RenderMode, page: usize) -> Result<Page<'_>> {
        let mut pixmap = Pixmap::new(self.width, self.height).ok_or_else(|| {
            ExportError::DrawError(format!("Can't allocate {}x{} pixmap", self.width, self.height))
        })?;
        let rect = full_rect(self.width, self.height)?;
        pixmap.fill_rect(rect, &self.background.paint(), Transform::identity(), None);

        debug!("Begin {:?} page {}", mode, page);
        self.pages.insert((mode, page), pixmap);
        let pixmap = self
            .pages
            .get_mut(&(mode, page))
            .ok_or(ExportError::PageNotRendered { page })?;

        Ok(Page {
            width: self.width,
            height: self.height,
            pixmap,
            colors: &self.colors,
            foreground: &mut self.foreground,
            background: &mut self.background,
        })
    }

    /// Whether a buffer is held for this page
    pub fn has_page(&self, mode: RenderMode, page: usize) -> bool {
        self.pages.contains_key(&(mode, page))
    }

    /// Number of page buffers held
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Drop every held page buffer, e.g. after a theme change or a reparse
    pub fn clear_pages(&mut self) {
        debug!("Clearing {} cached page buffers", self.pages.len());
        self.pages.clear();
    }

    pub fn set_foreground(&mut self, color: ColorSource<'_>) -> Result<()> {
        self.foreground = resolve(&self.colors, color, &self.foreground)?;
        Ok(())
    }

    pub fn set_background(&mut self, color: ColorSource<'_>) -> Result<()> {
        self.background = resolve(&self.colors, color, &self.background)?;
        Ok(())
    }

    /// Tile an image, composited over the background color, into the background context
    pub fn set_background_image(&mut self, image: &RgbaImage) -> Result<()> {
        let source = pixmap_from_image(image)?;
        let mut tile = Pixmap::new(source.width(), source.height())
            .ok_or_else(|| ExportError::DrawError("Can't allocate background tile".to_string()))?;
        tile.fill(self.background.color);
        tile.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        self.background.fill = Fill::Tiled(Arc::new(tile));
        Ok(())
    }

    /// Snapshot a page's buffer into a caller-owned pixel buffer
    pub fn export_pixels(&self, mode: RenderMode, page: usize) -> Result<PixelBuffer> {
        let pixmap = self
            .pages
            .get(&(mode, page))
            .ok_or(ExportError::PageNotRendered { page })?;
        Ok(image_from_pixmap(pixmap))
    }
}

/// Drawing handle for one page of a [`DrawingSurface`]
pub struct Page<'a> {
    width: u32,
    height: u32,
    pixmap: &'a mut Pixmap,
    colors: &'a ColorCache,
    foreground: &'a mut GraphicsContext,
    background: &'a mut GraphicsContext,
}

impl Page<'_> {
    fn context(&self, color: ColorSource<'_>) -> Result<GraphicsContext> {
        resolve(self.colors, color, &*self.foreground)
    }
}

impl Canvas for Page<'_> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_foreground(&mut self, color: ColorSource<'_>) -> Result<()> {
        *self.foreground = resolve(self.colors, color, &*self.foreground)?;
        Ok(())
    }

    fn set_background(&mut self, color: ColorSource<'_>) -> Result<()> {
        *self.background = resolve(self.colors, color, &*self.background)?;
        Ok(())
    }

    fn draw_line(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: ColorSource<'_>,
    ) -> Result<()> {
        let context = self.context(color)?;
        let mut builder = PathBuilder::new();
        builder.move_to(x1, y1);
        builder.line_to(x2, y2);
        let path = builder
            .finish()
            .ok_or_else(|| ExportError::DrawError("Empty line path".to_string()))?;
        self.pixmap.stroke_path(
            &path,
            &context.paint(),
            &Stroke::default(),
            Transform::identity(),
            None,
        );
        Ok(())
    }

    fn draw_rect(
        &mut self,
        filled: bool,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: ColorSource<'_>,
    ) -> Result<()> {
        let context = self.context(color)?;
        let rect = Rect::from_xywh(x, y, width, height).ok_or_else(|| {
            ExportError::DrawError(format!("Invalid rectangle {}x{} at {},{}", width, height, x, y))
        })?;
        let paint = context.paint();
        if filled {
            self.pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        } else {
            let path = PathBuilder::from_rect(rect);
            self.pixmap
                .stroke_path(&path, &paint, &Stroke::default(), Transform::identity(), None);
        }
        Ok(())
    }

    fn draw_arc(
        &mut self,
        filled: bool,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        start_angle: f32,
        sweep_angle: f32,
        color: ColorSource<'_>,
    ) -> Result<()> {
        let context = self.context(color)?;
        let path = arc_path(filled, x, y, width, height, start_angle, sweep_angle)
            .ok_or_else(|| ExportError::DrawError("Empty arc path".to_string()))?;
        let paint = context.paint();
        if filled {
            self.pixmap
                .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        } else {
            self.pixmap
                .stroke_path(&path, &paint, &Stroke::default(), Transform::identity(), None);
        }
        Ok(())
    }

    fn draw_text_layout(
        &mut self,
        layout: &TextLayout,
        x: f32,
        y: f32,
        color: ColorSource<'_>,
    ) -> Result<()> {
        let default = self.context(color)?.color;
        for glyph in &layout.glyphs {
            let Some(font) = &glyph.font else {
                continue;
            };
            let color = match &glyph.foreground {
                Some(spec) => self.colors.resolve(spec)?,
                None => default,
            };
            let (metrics, coverage) = font.rasterize(glyph.ch, glyph.size);
            let left = (x + glyph.x).round() as i32 + metrics.xmin;
            let top = (y + glyph.y).round() as i32 - metrics.ymin - metrics.height as i32;
            blend_coverage(
                self.pixmap,
                &coverage,
                metrics.width,
                metrics.height,
                left,
                top,
                color,
            );
        }
        Ok(())
    }

    fn draw_image(
        &mut self,
        image: &RgbaImage,
        x: f32,
        y: f32,
        options: &ImageOptions,
    ) -> Result<()> {
        let width = options.width.unwrap_or(image.width());
        let height = options.height.unwrap_or(image.height());
        let scaled;
        let image = if width != image.width() || height != image.height() {
            scaled = image::imageops::resize(
                image,
                width,
                height,
                image::imageops::FilterType::Triangle,
            );
            &scaled
        } else {
            image
        };

        let source = pixmap_from_image(image)?;
        let paint = PixmapPaint {
            opacity: options.opacity.unwrap_or(1.0).clamp(0.0, 1.0),
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            x.round() as i32,
            y.round() as i32,
            source.as_ref(),
            &paint,
            Transform::identity(),
            None,
        );
        Ok(())
    }
}

fn resolve(
    colors: &ColorCache,
    color: ColorSource<'_>,
    default: &GraphicsContext,
) -> Result<GraphicsContext> {
    match color {
        ColorSource::Default => Ok(default.clone()),
        ColorSource::Spec(spec) => colors.context(spec),
        ColorSource::Context(context) => Ok(context.clone()),
    }
}

fn full_rect(width: u32, height: u32) -> Result<Rect> {
    Rect::from_xywh(0.0, 0.0, width as f32, height as f32)
        .ok_or_else(|| ExportError::DrawError(format!("Invalid page size {}x{}", width, height)))
}

/// Build an arc path as a polyline; filled arcs are closed through the center
fn arc_path(
    filled: bool,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    start_angle: f32,
    sweep_angle: f32,
) -> Option<tiny_skia::Path> {
    let (rx, ry) = (width / 2.0, height / 2.0);
    let (cx, cy) = (x + rx, y + ry);
    let sweep = sweep_angle.clamp(-360.0, 360.0);
    let full = sweep.abs() >= 360.0;
    let steps = ((sweep.abs() / 4.0).ceil() as usize).max(2);

    let point = |degrees: f32| {
        let radians = degrees.to_radians();
        // Screen y grows downwards, angles go counter-clockwise
        (cx + rx * radians.cos(), cy - ry * radians.sin())
    };

    let mut builder = PathBuilder::new();
    if filled && !full {
        builder.move_to(cx, cy);
        let (px, py) = point(start_angle);
        builder.line_to(px, py);
    } else {
        let (px, py) = point(start_angle);
        builder.move_to(px, py);
    }
    for step in 1..=steps {
        let angle = start_angle + sweep * step as f32 / steps as f32;
        let (px, py) = point(angle);
        builder.line_to(px, py);
    }
    if filled || full {
        builder.close();
    }
    builder.finish()
}

/// Source-over blend of a glyph coverage bitmap in a solid color
fn blend_coverage(
    pixmap: &mut Pixmap,
    coverage: &[u8],
    width: usize,
    height: usize,
    left: i32,
    top: i32,
    color: Color,
) {
    let (pw, ph) = (pixmap.width() as i32, pixmap.height() as i32);
    let pixels = pixmap.pixels_mut();
    for row in 0..height {
        let py = top + row as i32;
        if py < 0 || py >= ph {
            continue;
        }
        for col in 0..width {
            let px = left + col as i32;
            if px < 0 || px >= pw {
                continue;
            }
            let alpha = coverage[row * width + col] as f32 / 255.0 * color.alpha();
            if alpha <= 0.0 {
                continue;
            }
            let index = (py * pw + px) as usize;
            let dst = pixels[index];
            let inverse = 1.0 - alpha;
            let mix = |src: f32, dst: u8| (src * 255.0 * alpha + dst as f32 * inverse).round() as u8;
            let a = (alpha * 255.0 + dst.alpha() as f32 * inverse).round() as u8;
            let r = mix(color.red(), dst.red()).min(a);
            let g = mix(color.green(), dst.green()).min(a);
            let b = mix(color.blue(), dst.blue()).min(a);
            if let Some(blended) = PremultipliedColorU8::from_rgba(r, g, b, a) {
                pixels[index] = blended;
            }
        }
    }
}

/// Convert an RGBA image into a premultiplied tiny-skia pixmap
pub fn pixmap_from_image(image: &RgbaImage) -> Result<Pixmap> {
    let mut data = Vec::with_capacity((image.width() * image.height() * 4) as usize);
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let premultiply = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        data.extend_from_slice(&[premultiply(r), premultiply(g), premultiply(b), a]);
    }
    let size = IntSize::from_wh(image.width(), image.height())
        .ok_or_else(|| ExportError::DrawError("Can't draw an empty image".to_string()))?;
    Pixmap::from_vec(data, size)
        .ok_or_else(|| ExportError::DrawError("Invalid image buffer".to_string()))
}

/// Convert a premultiplied pixmap into a plain RGBA image
pub fn image_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    // Length always matches width * height * 4
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .unwrap_or_else(|| RgbaImage::new(pixmap.width(), pixmap.height()))
}
