// ABOUTME: Export session tying configuration, rendering and site generation together
// ABOUTME: Validates settings and loads the template before any file is written

use crate::color::ColorCache;
use crate::config::ExportConfig;
use crate::deck::SharedDeck;
use crate::errors::Result;
use crate::fonts::FontLayoutEngine;
use crate::render::RenderOrchestrator;
use crate::site::{ExportSummary, SiteGenerator};
use crate::template::Template;
use log::info;
use std::sync::Arc;
use std::time::Instant;

/// One export run: configuration plus the parsed page template
pub struct ExportSession {
    config: ExportConfig,
    template: Template,
}

impl ExportSession {
    /// Create a session; fails with `MissingTemplate` when a configured
    /// template does not exist
    pub fn new(config: ExportConfig) -> Result<Self> {
        config.validate()?;
        let template = Template::load(config.template_path.as_deref())?;
        Ok(Self { config, template })
    }

    /// Use an already parsed template instead of the configured one
    pub fn with_template(config: ExportConfig, template: Template) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, template })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Export the orchestrator's deck into the configured output directory
    pub fn export(&self, orchestrator: &RenderOrchestrator) -> Result<ExportSummary> {
        let started = Instant::now();
        info!("Starting export to {:?}", self.config.output_dir);

        let mut generator = SiteGenerator::new(orchestrator, &self.template, &self.config);
        let summary = generator.save()?;

        info!(
            "Export complete. Wrote {} images and {} pages in {:.2} seconds",
            summary.images.len(),
            summary.slide_pages.len() + summary.index_pages.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Build an offscreen orchestrator at the configured size for `deck`
    pub fn orchestrator(
        &self,
        deck: SharedDeck,
        fonts: Arc<FontLayoutEngine>,
        colors: Arc<ColorCache>,
    ) -> Result<RenderOrchestrator> {
        RenderOrchestrator::offscreen(deck, self.config.width, self.config.height, fonts, colors)
    }

    /// Render and export `deck` on a fresh offscreen surface
    pub fn export_deck(
        &self,
        deck: SharedDeck,
        fonts: Arc<FontLayoutEngine>,
    ) -> Result<ExportSummary> {
        let orchestrator = self.orchestrator(deck, fonts, ColorCache::global())?;
        self.export(&orchestrator)
    }
}
