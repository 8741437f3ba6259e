// ABOUTME: Static site generation for exported decks
// ABOUTME: Writes slide images, slide pages and index pages, and collects feed entries

use crate::config::ExportConfig;
use crate::deck::{RenderMode, SharedDeck, with_mode};
use crate::errors::{ExportError, Result};
use crate::feed::{FeedBuilder, RssEntry};
use crate::naming::FilenameScheme;
use crate::navigation::{Navigator, PageLinks};
use crate::render::RenderOrchestrator;
use crate::surface::PixelBuffer;
use crate::template::{PageView, Template};
use crate::utils::{self, unescape_title};
use image::{DynamicImage, ImageFormat};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest edge of the thumbnails shown on index pages
pub const THUMBNAIL_SIZE: u32 = 240;

/// Name suffix of thumbnail images
pub const THUMBNAIL_SUFFIX: &str = "thumb";

/// Where an export run is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportPhase {
    Idle,
    Exporting(RenderMode),
    FeedPending,
    Done,
}

/// Files produced by an export run
#[derive(Clone, Debug, Default)]
pub struct ExportSummary {
    pub images: Vec<PathBuf>,
    pub slide_pages: Vec<PathBuf>,
    pub index_pages: Vec<PathBuf>,
    pub feed: Option<PathBuf>,
}

impl ExportSummary {
    /// Every file written, in the order it was written
    pub fn files(&self) -> Vec<&PathBuf> {
        self.images
            .iter()
            .chain(&self.slide_pages)
            .chain(&self.index_pages)
            .chain(&self.feed)
            .collect()
    }
}

/// Turns rendered pages into a cross-linked static site
pub struct SiteGenerator<'a> {
    orchestrator: &'a RenderOrchestrator,
    template: &'a Template,
    base_name: String,
    image_type: String,
    output_html: bool,
    output_index_html: bool,
    feed: Option<FeedBuilder>,
    rss_entries: Vec<RssEntry>,
    phase: ExportPhase,
}

impl<'a> SiteGenerator<'a> {
    pub fn new(
        orchestrator: &'a RenderOrchestrator,
        template: &'a Template,
        config: &ExportConfig,
    ) -> Self {
        Self {
            orchestrator,
            template,
            base_name: config.base_path(),
            image_type: config.image_format.clone(),
            output_html: config.emit_slide_pages,
            output_index_html: config.emit_index_pages,
            feed: config.feed_base_uri.as_deref().map(FeedBuilder::new),
            rss_entries: Vec::new(),
            phase: ExportPhase::Idle,
        }
    }

    pub fn phase(&self) -> ExportPhase {
        self.phase
    }

    /// Feed entries collected so far
    pub fn rss_entries(&self) -> &[RssEntry] {
        &self.rss_entries
    }

    pub fn rss_available(&self) -> bool {
        self.feed.is_some()
    }

    fn transition(&mut self, phase: ExportPhase) {
        debug!("Export phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run the whole export: slide phase, index phase, then the feed.
    ///
    /// Any page failure aborts the run; files already written stay on disk.
    /// Feed failures only produce a warning.
    pub fn save(&mut self) -> Result<ExportSummary> {
        let deck = self.orchestrator.deck().clone();

        // Sample both modes' page counts up front
        let (slide_size, index_slide_size) = {
            let deck = deck.lock();
            (
                deck.slide_count(RenderMode::Slide),
                deck.slide_count(RenderMode::Index),
            )
        };
        let slide_titles: Vec<String> = with_mode(&deck, RenderMode::Slide, || {
            let deck = deck.lock();
            (0..slide_size).map(|i| deck.slide_title(i)).collect()
        });
        info!(
            "Exporting {} slides ({} index pages) to {:?}",
            slide_size, index_slide_size, self.base_name
        );

        let scheme =
            FilenameScheme::new(&self.base_name, &self.image_type).with_sizes(slide_size, index_slide_size);
        utils::ensure_directory_exists(&scheme.base_dir_path())?;
        let navigator = Navigator::new(scheme, self.output_html, self.output_index_html);
        let mut summary = ExportSummary::default();
        self.rss_entries.clear();

        self.transition(ExportPhase::Exporting(RenderMode::Slide));
        with_mode(&deck, RenderMode::Slide, || {
            navigator.with_outputting(RenderMode::Slide, || {
                self.export_slides(&deck, &navigator, &slide_titles, &mut summary)
            })
        })?;

        if self.output_index_html {
            self.transition(ExportPhase::Exporting(RenderMode::Index));
            with_mode(&deck, RenderMode::Index, || {
                navigator.with_outputting(RenderMode::Index, || {
                    self.export_index(&deck, &navigator, &slide_titles, &mut summary)
                })
            })?;
        }

        self.transition(ExportPhase::FeedPending);
        summary.feed = self.save_rss(navigator.scheme());

        self.transition(ExportPhase::Done);
        info!("Export finished: {} files written", summary.files().len());
        Ok(summary)
    }

    fn export_slides(
        &mut self,
        deck: &SharedDeck,
        navigator: &Navigator,
        slide_titles: &[String],
        summary: &mut ExportSummary,
    ) -> Result<()> {
        let scheme = navigator.scheme();
        let links = PageLinks {
            navigator,
            slide_titles,
        };
        let pages = self
            .orchestrator
            .render_all_to_pixel_buffers(RenderMode::Slide)?;

        for page in pages {
            let (slide_number, pixels) = page?;

            let image_path = scheme.path(&navigator.image_filename(slide_number, None));
            save_image(&pixels, &image_path, scheme.image_type())?;
            summary.images.push(image_path);

            if self.output_index_html {
                let thumb_width = THUMBNAIL_SIZE.min(pixels.width());
                let thumb_height = (thumb_width * pixels.height() / pixels.width().max(1)).max(1);
                let thumbnail = image::imageops::thumbnail(&pixels, thumb_width, thumb_height);
                let thumb_name = navigator.image_filename(slide_number, Some(THUMBNAIL_SUFFIX));
                let thumb_path = scheme.path(&thumb_name);
                save_image(&thumbnail, &thumb_path, scheme.image_type())?;
                summary.images.push(thumb_path);
            }

            let filename = navigator.slide_filename(slide_number);
            let raw_title = slide_titles.get(slide_number).cloned().unwrap_or_default();
            let needs_body = self.output_html || self.rss_available();
            let (text, body) = if needs_body {
                let deck = deck.lock();
                (
                    deck.to_raw_text(slide_number),
                    deck.to_html_body(slide_number, &links),
                )
            } else {
                (String::new(), String::new())
            };

            if self.output_html {
                let content = format!(
                    "<div class=\"slide\">{}</div>",
                    slide_image(navigator, slide_number, &raw_title)
                );
                let path = scheme.path(&filename);
                self.output_page(navigator, slide_number, &raw_title, content, &path)?;
                summary.slide_pages.push(path);
            }

            if self.rss_available() {
                self.rss_entries.push(RssEntry {
                    filename,
                    title: unescape_title(&raw_title),
                    text,
                    html: body,
                });
            }
        }
        Ok(())
    }

    fn export_index(
        &mut self,
        deck: &SharedDeck,
        navigator: &Navigator,
        slide_titles: &[String],
        summary: &mut ExportSummary,
    ) -> Result<()> {
        let scheme = navigator.scheme();
        let links = PageLinks {
            navigator,
            slide_titles,
        };

        for slide_number in 0..scheme.size(RenderMode::Index) {
            let (raw_title, text, body) = {
                let deck = deck.lock();
                (
                    deck.slide_title(slide_number),
                    deck.to_raw_text(slide_number),
                    deck.to_html_body(slide_number, &links),
                )
            };

            let filename = navigator.slide_filename(slide_number);
            let path = scheme.path(&filename);
            self.output_page(navigator, slide_number, &raw_title, body.clone(), &path)?;
            summary.index_pages.push(path);

            if self.rss_available() {
                self.rss_entries.push(RssEntry {
                    filename,
                    title: unescape_title(&raw_title),
                    text,
                    html: body,
                });
            }
        }
        Ok(())
    }

    fn output_page(
        &self,
        navigator: &Navigator,
        slide_number: usize,
        raw_title: &str,
        content: String,
        path: &Path,
    ) -> Result<()> {
        let view = PageView {
            title: navigator.image_title(slide_number, raw_title),
            rss_link: self.feed.as_ref().map(FeedBuilder::link_tag).unwrap_or_default(),
            navi: navigator.navi(slide_number),
            toggle_mode_navi: navigator.toggle_mode_navi(),
            content,
        };
        debug!("Writing page {:?}", path);
        fs::write(path, self.template.render(&view))?;
        Ok(())
    }

    /// Write the feed; failures are logged and the site stays valid without it
    fn save_rss(&self, scheme: &FilenameScheme) -> Option<PathBuf> {
        let feed = self.feed.as_ref()?;
        let path = scheme.path(&scheme.rss_filename());
        match feed.write(&self.rss_entries, &path) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("can't generate RSS: {}", e);
                None
            }
        }
    }
}

/// Slide image, linked to the next page unless it is the last one
fn slide_image(navigator: &Navigator, slide_number: usize, raw_title: &str) -> String {
    let img = format!(
        "<img title=\"{}\" src=\"{}\" />",
        navigator.image_title(slide_number, raw_title),
        navigator.image_src(slide_number, None)
    );
    if navigator.last_slide(slide_number) {
        img
    } else {
        format!(
            "<a href=\"{}\">\n{}\n</a>",
            navigator.next_href(slide_number),
            img
        )
    }
}

/// Encode a pixel buffer in the given image type
pub fn save_image(pixels: &PixelBuffer, path: &Path, image_type: &str) -> Result<()> {
    let format = ImageFormat::from_extension(image_type)
        .ok_or_else(|| ExportError::ConfigError(format!("Unsupported image format: {}", image_type)))?;
    match format {
        // These encoders don't take an alpha channel
        ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Pnm => {
            DynamicImage::ImageRgba8(pixels.clone())
                .to_rgb8()
                .save_with_format(path, format)?;
        }
        _ => pixels.save_with_format(path, format)?,
    }
    Ok(())
}
