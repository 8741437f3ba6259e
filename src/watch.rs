// ABOUTME: Watch module for monitoring deck changes and re-exporting the site
// ABOUTME: Provides file watching, re-export on change and a local preview server

use log::{debug, error, info};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use percent_encoding::percent_decode_str;
use tiny_http::{Header, Response, Server, StatusCode};

use crate::color::ColorCache;
use crate::config::ExportConfig;
use crate::deck::{Deck, share};
use crate::errors::{ExportError, Result};
use crate::fonts::FontLayoutEngine;
use crate::markdown::MarkdownDeck;
use crate::render::RenderOrchestrator;
use crate::session::ExportSession;
use crate::utils;

/// Configuration for watch mode
pub struct WatchConfig {
    /// Path to the markdown deck to watch
    pub markdown_path: PathBuf,

    /// Export settings used for every run
    pub export: ExportConfig,

    /// Theme applied to the deck
    pub theme: Option<String>,

    /// Debounce time in milliseconds
    pub debounce_ms: u64,

    /// Whether to serve the site using a local web server
    pub serve: bool,

    /// Port for local web server
    pub port: u16,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            markdown_path: PathBuf::new(),
            export: ExportConfig::default(),
            theme: None,
            debounce_ms: 500,
            serve: false,
            port: 8080,
        }
    }
}

/// Content type served for a file
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "rdf" => "application/rdf+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Map a request URL onto a file below `root`; `None` for paths escaping it.
///
/// Decoded bytes are used as-is, so links to filenames in a non-UTF-8
/// filename encoding resolve to the files on disk.
pub fn resolve_request_path(root: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let decoded: Vec<u8> = percent_decode_str(path).collect();
    let start = decoded.iter().take_while(|&&b| b == b'/').count();
    let bytes = &decoded[start..];
    if bytes.is_empty() {
        return Some(root.join("index.html"));
    }

    #[cfg(unix)]
    let relative = {
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
    };
    #[cfg(not(unix))]
    let relative = PathBuf::from(std::str::from_utf8(bytes).ok()?);

    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Start a simple HTTP server over the exported site
fn start_server(site_dir: PathBuf, port: u16) -> Result<()> {
    let server = Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| ExportError::WatchError(format!("Failed to start HTTP server: {}", e)))?;

    let server_arc = Arc::new(server);
    let server_thread = server_arc.clone();

    thread::spawn(move || {
        info!("HTTP server listening on http://localhost:{}", port);
        println!("HTTP server listening on http://localhost:{}", port);

        for request in server_thread.incoming_requests() {
            let file_path = resolve_request_path(&site_dir, request.url());
            debug!("Request for {:?} -> {:?}", request.url(), file_path);

            let file_path = match file_path {
                Some(path) if path.is_file() => path,
                _ => {
                    let response =
                        Response::from_string("404 Not Found").with_status_code(StatusCode(404));
                    let _ = request.respond(response);
                    continue;
                }
            };

            match fs::read(&file_path) {
                Ok(content) => {
                    let mut response = Response::from_data(content);
                    if let Ok(header) =
                        Header::from_bytes("Content-Type", content_type(&file_path))
                    {
                        response = response.with_header(header);
                    }
                    if let Err(e) = request.respond(response) {
                        error!("Failed to send response: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to read file {:?}: {}", file_path, e);
                    let response = Response::from_string(format!("Failed to read file: {}", e))
                        .with_status_code(StatusCode(500));
                    let _ = request.respond(response);
                }
            }
        }
    });

    Ok(())
}

/// Exports a markdown deck, then re-exports it whenever the file changes
pub fn watch_deck(config: WatchConfig, fonts: Arc<FontLayoutEngine>) -> Result<()> {
    // Validate input file exists
    utils::validate_file_exists(&config.markdown_path)?;
    utils::ensure_directory_exists(&config.export.output_dir)?;
    utils::validate_directory_writable(&config.export.output_dir)?;

    let session = ExportSession::new(config.export.clone())?;
    let mut deck = MarkdownDeck::from_file(&config.markdown_path)?;
    if let Some(theme) = &config.theme {
        deck.apply_theme(theme)?;
    }
    let orchestrator = session.orchestrator(share(deck), fonts, ColorCache::global())?;

    // Initial export
    session.export(&orchestrator)?;

    // Start local server if requested
    if config.serve {
        start_server(config.export.output_dir.clone(), config.port)?;
    }

    // Create a channel to receive file system events
    let (tx, rx) = mpsc::channel::<DebounceEventResult>();

    // Create debouncer for file system events
    let mut debouncer = new_debouncer(Duration::from_millis(config.debounce_ms), None, tx)
        .map_err(|e| ExportError::WatchError(format!("Failed to create file watcher: {}", e)))?;

    // Get the directory containing the markdown file
    let watch_path = match config.markdown_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let abs_watch_path = utils::get_absolute_path(watch_path)?;
    let abs_markdown_path = utils::get_absolute_path(&config.markdown_path)?;

    debouncer
        .watcher()
        .watch(&abs_watch_path, RecursiveMode::NonRecursive)
        .map_err(|e| {
            ExportError::WatchError(format!(
                "Failed to start watching directory {:?}: {}",
                abs_watch_path, e
            ))
        })?;

    info!("Watching for changes in {:?}", config.markdown_path);
    println!(
        "Watching for changes in {:?} (Press Ctrl+C to stop)",
        config.markdown_path
    );

    let mut last_processed = Instant::now();

    for result in rx {
        match result {
            Ok(events) => {
                let relevant = events.iter().any(|event| {
                    event
                        .paths
                        .iter()
                        .any(|path| is_deck_path(path, &abs_markdown_path))
                });

                let now = Instant::now();
                if relevant
                    && now.duration_since(last_processed) > Duration::from_millis(config.debounce_ms)
                {
                    match reexport(&config.markdown_path, &session, &orchestrator) {
                        Ok(()) => {
                            info!("Re-exported site successfully");
                            last_processed = now;
                        }
                        Err(e) => error!("Failed to re-export site: {}", e),
                    }
                }
            }
            Err(errors) => {
                for e in errors {
                    error!("Watch error: {:?}", e);
                }
            }
        }
    }

    Ok(())
}

fn is_deck_path(path: &Path, markdown_path: &Path) -> bool {
    match utils::get_absolute_path(path) {
        Ok(abs) => abs == markdown_path,
        Err(_) => path == markdown_path,
    }
}

/// Re-parse the deck from disk and export it again
fn reexport(markdown_path: &Path, session: &ExportSession, orchestrator: &RenderOrchestrator) -> Result<()> {
    info!("Deck changed, re-exporting...");
    let source = fs::read_to_string(markdown_path)?;
    orchestrator.reparse(&source)?;
    session.export(orchestrator)?;
    Ok(())
}
