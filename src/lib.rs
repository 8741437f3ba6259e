// ABOUTME: Library module for the big-export program.
// ABOUTME: Renders slide decks offscreen and exports them as a static site with an RSS feed.

// Reexport modules
pub mod color;
pub mod config;
pub mod deck;
pub mod errors;
pub mod feed;
pub mod fonts;
pub mod markdown;
pub mod naming;
pub mod navigation;
pub mod render;
pub mod session;
pub mod site;
pub mod surface;
pub mod template;
pub mod utils;
pub mod watch;

// Reexport common types and functions
pub use color::{ColorCache, GraphicsContext};
pub use config::{Config, ExportConfig};
pub use deck::{Deck, HtmlLinks, RenderMode, SharedDeck, share, with_index_mode, with_mode};
pub use errors::{ExportError, Result};
pub use feed::{FeedBuilder, RssEntry};
pub use fonts::{FontContext, FontLayoutEngine, MetricsOnlyContext, SystemFontContext, TextLayout};
pub use markdown::MarkdownDeck;
pub use naming::FilenameScheme;
pub use navigation::Navigator;
pub use render::{Backend, PageStream, PrintFactory, PrintJob, PrintTarget, RenderOrchestrator};
pub use session::ExportSession;
pub use site::{ExportPhase, ExportSummary, SiteGenerator};
pub use surface::{Canvas, ColorSource, DrawingSurface, PixelBuffer};
pub use template::{PageView, Template};
pub use watch::{WatchConfig, watch_deck};

#[cfg(test)]
mod tests;
