// ABOUTME: Render orchestration for the big-export application
// ABOUTME: Renders deck pages to pixel buffers or a print target on a background thread

use crate::color::ColorCache;
use crate::deck::{Deck, RenderMode, SharedDeck, with_mode_locked};
use crate::errors::{ExportError, Result};
use crate::fonts::FontLayoutEngine;
use crate::surface::{Canvas, DrawingSurface, PixelBuffer};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A printable backend, such as a printer driver or a document writer
pub trait PrintTarget: Send {
    /// Page size in pixels
    fn size(&self) -> (u32, u32);

    /// Set up one page and let `draw` paint it
    fn print_page(
        &mut self,
        page: usize,
        draw: &mut dyn FnMut(&mut dyn Canvas) -> Result<()>,
    ) -> Result<()>;

    /// Flush the job once every page is printed
    fn finish(&mut self) -> Result<()>;
}

/// Builds a throwaway print target of the given size
pub type PrintFactory = Arc<dyn Fn(u32, u32) -> Result<Box<dyn PrintTarget>> + Send + Sync>;

/// What the deck is currently drawn on
pub enum Backend {
    /// Offscreen pixel surface; can hand out pixel buffers directly
    Offscreen(DrawingSurface),
    /// On-screen display; pixels must be rendered on a throwaway surface
    Interactive { width: u32, height: u32 },
    /// Print backend
    Printable(Box<dyn PrintTarget>),
}

impl Backend {
    pub fn size(&self) -> (u32, u32) {
        match self {
            Backend::Offscreen(surface) => (surface.width(), surface.height()),
            Backend::Interactive { width, height } => (*width, *height),
            Backend::Printable(target) => target.size(),
        }
    }

    pub fn can_create_pixels(&self) -> bool {
        matches!(self, Backend::Offscreen(_))
    }

    pub fn printable(&self) -> bool {
        matches!(self, Backend::Printable(_))
    }
}

/// Clears the orchestrator's busy flag when the job ends, even on panic
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type PageResult = Result<(usize, PixelBuffer)>;

/// Pages rendered by a background job, yielded in ascending order.
///
/// The producer renders a page only once the previous one was taken.
/// Dropping the stream stops the job after the current page and waits for
/// it, so the orchestrator is free again once the stream is gone.
pub struct PageStream {
    receiver: Option<Receiver<PageResult>>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PageStream {
    /// Ask the producer to stop after the page it is working on
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Iterator for PageStream {
    type Item = PageResult;

    fn next(&mut self) -> Option<Self::Item> {
        let received = self.receiver.as_ref()?.recv();
        match received {
            Ok(item) => Some(item),
            Err(_) => {
                self.receiver = None;
                let handle = self.handle.take()?;
                match handle.join() {
                    Ok(()) => None,
                    Err(_) => Some(Err(ExportError::RenderThreadPanicked)),
                }
            }
        }
    }
}

impl Drop for PageStream {
    fn drop(&mut self) {
        self.cancel();
        // A producer blocked in `send` fails once the receiver is gone
        self.receiver = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Render thread panicked after its stream was dropped");
            }
        }
    }
}

/// A print job running in the background
pub struct PrintJob {
    handle: JoinHandle<Result<usize>>,
}

impl PrintJob {
    /// Wait for the job and return the number of printed pages
    pub fn wait(self) -> Result<usize> {
        self.handle
            .join()
            .map_err(|_| ExportError::RenderThreadPanicked)?
    }
}

/// Drives rendering of a deck's pages on background threads
pub struct RenderOrchestrator {
    deck: SharedDeck,
    backend: Arc<Mutex<Backend>>,
    fonts: Arc<FontLayoutEngine>,
    colors: Arc<ColorCache>,
    print_factory: Option<PrintFactory>,
    busy: Arc<AtomicBool>,
}

impl RenderOrchestrator {
    pub fn new(deck: SharedDeck, backend: Backend, fonts: Arc<FontLayoutEngine>) -> Self {
        Self {
            deck,
            backend: Arc::new(Mutex::new(backend)),
            fonts,
            colors: ColorCache::global(),
            print_factory: None,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Orchestrator drawing on a fresh offscreen surface
    pub fn offscreen(
        deck: SharedDeck,
        width: u32,
        height: u32,
        fonts: Arc<FontLayoutEngine>,
        colors: Arc<ColorCache>,
    ) -> Result<Self> {
        let surface = DrawingSurface::new(width, height, colors.clone())?;
        Ok(Self::new(deck, Backend::Offscreen(surface), fonts).with_colors(colors))
    }

    /// Color table used by throwaway surfaces
    pub fn with_colors(mut self, colors: Arc<ColorCache>) -> Self {
        self.colors = colors;
        self
    }

    /// Factory for throwaway print targets when the backend can't print
    pub fn with_print_factory(mut self, factory: PrintFactory) -> Self {
        self.print_factory = Some(factory);
        self
    }

    pub fn deck(&self) -> &SharedDeck {
        &self.deck
    }

    pub fn fonts(&self) -> &Arc<FontLayoutEngine> {
        &self.fonts
    }

    pub fn backend(&self) -> &Arc<Mutex<Backend>> {
        &self.backend
    }

    /// Whether a render or print job is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Number of page buffers held by the offscreen backend
    pub fn cached_pages(&self) -> usize {
        match &*self.backend.lock() {
            Backend::Offscreen(surface) => surface.page_count(),
            _ => 0,
        }
    }

    /// Apply a theme to the deck; cached page buffers are dropped
    pub fn apply_theme(&self, name: &str) -> Result<()> {
        self.deck.lock().apply_theme(name)?;
        self.invalidate();
        Ok(())
    }

    /// Re-parse the deck from `source`; cached page buffers are dropped
    pub fn reparse(&self, source: &str) -> Result<()> {
        self.deck.lock().reparse(source)?;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        if let Backend::Offscreen(surface) = &mut *self.backend.lock() {
            surface.clear_pages();
        }
    }

    fn acquire(&self) -> Result<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ExportError::RenderBusy)?;
        Ok(BusyGuard(self.busy.clone()))
    }

    /// Render every page of `mode` to a pixel buffer on a background thread.
    ///
    /// When the backend can't produce pixels, the deck is re-parsed into a
    /// throwaway copy drawn on an offscreen surface of the same size.
    pub fn render_all_to_pixel_buffers(&self, mode: RenderMode) -> Result<PageStream> {
        let busy = self.acquire()?;
        let (sender, receiver) = sync_channel::<PageResult>(0);
        let cancelled = Arc::new(AtomicBool::new(false));

        let job = RenderJob {
            deck: self.deck.clone(),
            backend: self.backend.clone(),
            fonts: self.fonts.clone(),
            colors: self.colors.clone(),
            cancelled: cancelled.clone(),
            mode,
        };

        let handle = thread::Builder::new()
            .name("big-export-render".to_string())
            .spawn(move || {
                let _busy = busy;
                if let Err(e) = job.run(&sender) {
                    let _ = sender.send(Err(e));
                }
            })?;

        Ok(PageStream {
            receiver: Some(receiver),
            cancelled,
            handle: Some(handle),
        })
    }

    /// Print every slide on a background thread, calling `progress` per page.
    ///
    /// Uses the backend when it is printable, otherwise a throwaway target
    /// from the print factory drawing a re-parsed copy of the deck.
    pub fn print<F>(&self, mut progress: F) -> Result<PrintJob>
    where
        F: FnMut(usize) + Send + 'static,
    {
        let printable = self.backend.lock().printable();
        if !printable && self.print_factory.is_none() {
            return Err(ExportError::PrintUnavailable);
        }
        let busy = self.acquire()?;

        let deck = self.deck.clone();
        let backend = self.backend.clone();
        let fonts = self.fonts.clone();
        let factory = self.print_factory.clone();

        let handle = thread::Builder::new()
            .name("big-export-print".to_string())
            .spawn(move || {
                let _busy = busy;
                let started = Instant::now();
                let printed = if printable {
                    let mut backend = backend.lock();
                    let Backend::Printable(target) = &mut *backend else {
                        return Err(ExportError::PrintUnavailable);
                    };
                    let mut deck = deck.lock();
                    print_pages(&mut *deck, target.as_mut(), &fonts, &mut progress)?
                } else {
                    let (width, height) = backend.lock().size();
                    let factory = factory.ok_or(ExportError::PrintUnavailable)?;
                    let mut copy = throwaway_copy(&deck)?;
                    let mut target = factory(width, height)?;
                    print_pages(copy.as_mut(), target.as_mut(), &fonts, &mut progress)?
                };
                info!(
                    "Printing complete. Printed {} pages in {:.2} seconds",
                    printed,
                    started.elapsed().as_secs_f64()
                );
                Ok(printed)
            })?;

        Ok(PrintJob { handle })
    }
}

/// State moved into a pixel render thread
struct RenderJob {
    deck: SharedDeck,
    backend: Arc<Mutex<Backend>>,
    fonts: Arc<FontLayoutEngine>,
    colors: Arc<ColorCache>,
    cancelled: Arc<AtomicBool>,
    mode: RenderMode,
}

impl RenderJob {
    fn run(&self, sender: &SyncSender<PageResult>) -> Result<()> {
        let started = Instant::now();
        let can_create_pixels = self.backend.lock().can_create_pixels();

        let rendered = if can_create_pixels {
            let count = self.deck.lock().slide_count(self.mode);
            announce(count, self.mode);
            let mut rendered = 0;
            for page in 0..count {
                if self.cancelled.load(Ordering::Acquire) {
                    info!("Rendering cancelled after {} pages", rendered);
                    break;
                }
                let buffer = {
                    let mut backend = self.backend.lock();
                    let Backend::Offscreen(surface) = &mut *backend else {
                        return Err(ExportError::DrawError(
                            "Backend changed during rendering".to_string(),
                        ));
                    };
                    let mut deck = self.deck.lock();
                    render_page(surface, &mut *deck, self.mode, page, &self.fonts)?
                };
                if sender.send(Ok((page, buffer))).is_err() {
                    debug!("Page consumer went away, stopping");
                    break;
                }
                rendered += 1;
            }
            rendered
        } else {
            let (width, height) = self.backend.lock().size();
            debug!("Backend can't create pixels, rendering a {}x{} offscreen copy", width, height);
            let mut copy = throwaway_copy(&self.deck)?;
            let mut surface = DrawingSurface::new(width, height, self.colors.clone())?;
            let count = copy.slide_count(self.mode);
            announce(count, self.mode);
            let mut rendered = 0;
            for page in 0..count {
                if self.cancelled.load(Ordering::Acquire) {
                    info!("Rendering cancelled after {} pages", rendered);
                    break;
                }
                let buffer = render_page(&mut surface, copy.as_mut(), self.mode, page, &self.fonts)?;
                if sender.send(Ok((page, buffer))).is_err() {
                    debug!("Page consumer went away, stopping");
                    break;
                }
                rendered += 1;
            }
            rendered
        };

        info!(
            "Rendering complete. Rendered {} pages in {:.2} seconds",
            rendered,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

fn announce(count: usize, mode: RenderMode) {
    info!("Ready to render {} {} pages", count, mode);
    let estimated_seconds = (count as f64) * 0.05;
    info!(
        "It will probably take about {:.2} seconds to render the pages.",
        estimated_seconds
    );
}

/// Draw one page (unless its buffer is cached) and snapshot it
fn render_page(
    surface: &mut DrawingSurface,
    deck: &mut dyn Deck,
    mode: RenderMode,
    page: usize,
    fonts: &FontLayoutEngine,
) -> Result<PixelBuffer> {
    if surface.has_page(mode, page) {
        debug!("Reusing cached {} page {}", mode, page);
    } else {
        info!("Rendering {} page {}", mode, page);
        with_mode_locked(deck, mode, |deck| -> Result<()> {
            let mut canvas = surface.begin_page(mode, page)?;
            deck.draw_page(page, &mut canvas, fonts)
        })?;
    }
    surface.export_pixels(mode, page)
}

fn print_pages(
    deck: &mut dyn Deck,
    target: &mut dyn PrintTarget,
    fonts: &FontLayoutEngine,
    progress: &mut dyn FnMut(usize),
) -> Result<usize> {
    with_mode_locked(deck, RenderMode::Slide, |deck| -> Result<usize> {
        let count = deck.slide_count(RenderMode::Slide);
        for page in 0..count {
            info!("Printing page {}", page);
            target.print_page(page, &mut |canvas| deck.draw_page(page, canvas, fonts))?;
            progress(page);
        }
        target.finish()?;
        Ok(count)
    })
}

/// Re-parse the deck into a fresh copy with the same theme.
///
/// Only reads from the original, so its modification state is untouched.
fn throwaway_copy(deck: &SharedDeck) -> Result<Box<dyn Deck>> {
    let original = deck.lock();
    let mut copy = original.blank();
    let theme = original.theme_name();
    if let Err(e) = copy.apply_theme(&theme) {
        warn!("Failed to apply theme {:?} to render copy: {}", theme, e);
    }
    copy.reparse(&original.source())?;
    copy.set_mode(original.mode());
    Ok(copy)
}
