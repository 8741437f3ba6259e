// ABOUTME: Interface to the slide deck being exported
// ABOUTME: Defines render modes, the Deck trait and scoped mode overrides

use crate::errors::Result;
use crate::fonts::FontLayoutEngine;
use crate::surface::Canvas;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// One of the two views of a deck
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// One page per slide
    #[default]
    Slide,
    /// Overview pages, possibly several slides per page
    Index,
}

impl RenderMode {
    /// The other mode
    pub fn toggled(self) -> Self {
        match self {
            RenderMode::Slide => RenderMode::Index,
            RenderMode::Index => RenderMode::Slide,
        }
    }

    pub fn is_index(self) -> bool {
        self == RenderMode::Index
    }

    pub fn from_index_flag(index: bool) -> Self {
        if index {
            RenderMode::Index
        } else {
            RenderMode::Slide
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Slide => write!(f, "slide"),
            RenderMode::Index => write!(f, "index"),
        }
    }
}

/// Links a deck may need while rendering a page's HTML body
pub trait HtmlLinks {
    /// Href of a slide-mode page
    fn slide_href(&self, slide_number: usize) -> String;

    /// Href of an index-mode page
    fn index_href(&self, slide_number: usize) -> String;

    /// Src of a slide's image, with an optional name suffix such as `thumb`
    fn image_src(&self, slide_number: usize, optional: Option<&str>) -> String;

    /// HTML-escaped title of a slide, with its position
    fn slide_image_title(&self, slide_number: usize) -> String;
}

/// The in-memory deck being exported.
///
/// Page indices and titles are always interpreted in the deck's current mode.
pub trait Deck: Send {
    /// Number of pages in a mode
    fn slide_count(&self, mode: RenderMode) -> usize;

    fn mode(&self) -> RenderMode;

    fn set_mode(&mut self, mode: RenderMode);

    /// Title of a page, still carrying markup escapes
    fn slide_title(&self, index: usize) -> String;

    /// Draw a page onto a canvas
    fn draw_page(&self, index: usize, canvas: &mut dyn Canvas, fonts: &FontLayoutEngine)
        -> Result<()>;

    /// Plain-text rendition of a page
    fn to_raw_text(&self, index: usize) -> String;

    /// HTML body of a page
    fn to_html_body(&self, index: usize, links: &dyn HtmlLinks) -> String;

    fn theme_name(&self) -> String;

    fn apply_theme(&mut self, name: &str) -> Result<()>;

    /// Current markup source of the deck
    fn source(&self) -> String;

    /// Replace the deck's content by parsing `source`
    fn reparse(&mut self, source: &str) -> Result<()>;

    /// Whether the source changed since the last parse
    fn is_modified(&self) -> bool;

    /// An empty deck of the same kind, used for throwaway render copies
    fn blank(&self) -> Box<dyn Deck>;
}

/// Deck shared between the caller and background render jobs
pub type SharedDeck = Arc<Mutex<dyn Deck>>;

/// Wrap a deck so it can be shared with render jobs
pub fn share<D: Deck + 'static>(deck: D) -> SharedDeck {
    Arc::new(Mutex::new(deck))
}

/// Restores a deck's previous mode when dropped
struct ModeGuard<'a> {
    deck: &'a SharedDeck,
    previous: RenderMode,
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.deck.lock().set_mode(self.previous);
    }
}

/// Run `f` with the deck switched to `mode`, restoring the previous mode on
/// every exit path, including errors and panics.
///
/// The deck is only locked while switching, so `f` may lock it again.
pub fn with_mode<T>(deck: &SharedDeck, mode: RenderMode, f: impl FnOnce() -> T) -> T {
    let previous = {
        let mut locked = deck.lock();
        let previous = locked.mode();
        locked.set_mode(mode);
        previous
    };
    let _guard = ModeGuard { deck, previous };
    f()
}

/// Run `f` with the deck in index mode (`true`) or slide mode (`false`)
pub fn with_index_mode<T>(deck: &SharedDeck, index: bool, f: impl FnOnce() -> T) -> T {
    with_mode(deck, RenderMode::from_index_flag(index), f)
}

/// Same as [`with_mode`] for a deck already borrowed mutably
pub fn with_mode_locked<T>(
    deck: &mut dyn Deck,
    mode: RenderMode,
    f: impl FnOnce(&mut dyn Deck) -> T,
) -> T {
    struct Restore<'a> {
        deck: &'a mut dyn Deck,
        previous: RenderMode,
    }
    impl Drop for Restore<'_> {
        fn drop(&mut self) {
            self.deck.set_mode(self.previous);
        }
    }

    let previous = deck.mode();
    deck.set_mode(mode);
    let mut restore = Restore { deck, previous };
    f(&mut *restore.deck)
}
