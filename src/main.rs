// ABOUTME: Main entry point for the big-export program.
// ABOUTME: Provides CLI interface and executes commands from the library.

use anyhow::Context;
use big_export::{
    Config, Deck, ExportSession, FontLayoutEngine, MarkdownDeck, WatchConfig, share, watch_deck,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a markdown deck into a static site
    Export(ExportArgs),

    /// List the font families available for rendering
    Fonts,

    /// Export a markdown deck and re-export it on every change
    Watch(WatchArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Path to the markdown file
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving the site
    #[arg(short, long)]
    output: PathBuf,

    /// Prefix of the numbered files
    #[arg(long)]
    base_name: Option<String>,

    /// Image type for slide images, e.g. png or jpg
    #[arg(long)]
    image_format: Option<String>,

    /// Page width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Page height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Don't write one HTML page per slide
    #[arg(long)]
    no_slide_pages: bool,

    /// Also write index (overview) pages
    #[arg(long)]
    index_pages: bool,

    /// Base URI of the published site; enables the RSS feed
    #[arg(long)]
    feed_base_uri: Option<String>,

    /// Theme to draw the deck with
    #[arg(long)]
    theme: Option<String>,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    export: ExportArgs,

    /// Serve the site on a local web server
    #[arg(long)]
    serve: bool,

    /// Port for the local web server
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Debounce time in milliseconds
    #[arg(long, default_value_t = 500)]
    debounce_ms: u64,
}

impl ExportArgs {
    fn export_config(&self, config: &Config) -> big_export::ExportConfig {
        config.get_export_config(
            self.output.clone(),
            self.base_name.clone(),
            self.image_format.clone(),
            self.width,
            self.height,
            !self.no_slide_pages,
            self.index_pages,
            self.feed_base_uri.clone(),
        )
    }
}

fn export(args: &ExportArgs, config: &Config) -> anyhow::Result<()> {
    let session = ExportSession::new(args.export_config(config))
        .context("Failed to set up export session")?;

    let mut deck = MarkdownDeck::from_file(&args.input)
        .with_context(|| format!("Failed to read deck {:?}", args.input))?;
    if let Some(theme) = &args.theme {
        deck.apply_theme(theme)?;
    }

    let fonts = Arc::new(FontLayoutEngine::system());
    let summary = session
        .export_deck(share(deck), fonts)
        .context("Export failed")?;

    println!(
        "Site exported successfully: {} files in {:?}",
        summary.files().len(),
        args.output
    );
    Ok(())
}

fn list_fonts() -> anyhow::Result<()> {
    let fonts = FontLayoutEngine::system();
    for family in fonts.list_families() {
        println!("{}", family);
    }
    Ok(())
}

fn watch(args: &WatchArgs, config: &Config) -> anyhow::Result<()> {
    let watch_config = WatchConfig {
        markdown_path: args.export.input.clone(),
        export: args.export.export_config(config),
        theme: args.export.theme.clone(),
        debounce_ms: args.debounce_ms,
        serve: args.serve,
        port: args.port,
    };
    watch_deck(watch_config, Arc::new(FontLayoutEngine::system()))?;
    Ok(())
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let result = match &cli.command {
        Some(Commands::Export(args)) => {
            println!("Executing export command...");
            export(args, &config)
        }
        Some(Commands::Fonts) => list_fonts(),
        Some(Commands::Watch(args)) => {
            println!("Executing watch command...");
            watch(args, &config)
        }
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
