use super::*;
use crate::color::parse_color;
use crate::feed::{normalize_base_uri, normalize_html_reference};
use crate::fonts::{TextStyle, parse_markup};
use crate::markdown::{parse_frontmatter, plain_text, split_slides};
use crate::naming::{normalize_image_type, number_of_places};
use crate::navigation::PageLinks;
use crate::surface::ImageOptions;
use crate::utils::{
    FILENAME_ENCODING_VAR, charset_encoding, escape_html, filename_encoding, locale_charset,
    to_filename_encoding, unescape_title, url_encode,
};
use chrono::{DateTime, TimeZone, Utc};
use encoding_rs::{EUC_JP, EUC_KR, GBK, SHIFT_JIS, UTF_8};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const FIVE_SLIDES: &str = "% Five Slides\n% Tester\n% Today\n\n\
# One\n\nFirst body.\n\n\
# Two\n\nSecond body.\n\n\
# Three\n\n\
# Four\n\n- a\n- b\n\n\
# Five\n\nLast body.\n";

fn five_slide_navigator(output_slide_html: bool, output_index_html: bool) -> Navigator {
    let scheme = FilenameScheme::new("out/slide", "png").with_sizes(5, 2);
    Navigator::new(scheme, output_slide_html, output_index_html)
}

fn metrics_fonts() -> Arc<FontLayoutEngine> {
    Arc::new(FontLayoutEngine::metrics_only())
}

fn offscreen(deck: MarkdownDeck) -> RenderOrchestrator {
    RenderOrchestrator::offscreen(share(deck), 64, 48, metrics_fonts(), Arc::new(ColorCache::new()))
        .expect("Failed to create orchestrator")
}

// Filename synthesis

#[test]
fn test_number_of_places() {
    assert_eq!(number_of_places(0), 1);
    assert_eq!(number_of_places(9), 1);
    assert_eq!(number_of_places(10), 2);
    assert_eq!(number_of_places(99), 2);
    assert_eq!(number_of_places(100), 3);
    assert_eq!(number_of_places(1000), 4);
}

#[test]
fn test_padding_width_follows_page_count() {
    let scheme = FilenameScheme::new("site/deck", "png").with_sizes(12, 3);
    assert_eq!(
        scheme.make_filename(RenderMode::Slide, 3, "html", None),
        "site/deck03.html"
    );
    assert_eq!(
        scheme.make_filename(RenderMode::Index, 2, "html", None),
        "site/deck-index2.html"
    );
    assert_eq!(
        scheme.image_filename(RenderMode::Slide, 11, Some("thumb")),
        "site/deck11-thumb.png"
    );
}

#[test]
fn test_page_zero_is_index_html() {
    let scheme = FilenameScheme::new("site/deck", "png").with_sizes(3, 1);
    assert_eq!(scheme.slide_filename(RenderMode::Slide, 0), "site/index.html");
    assert_eq!(scheme.slide_filename(RenderMode::Slide, 1), "site/deck1.html");
    // Index mode never takes over index.html
    assert_eq!(scheme.slide_filename(RenderMode::Index, 0), "site/deck-index0.html");
    assert_eq!(scheme.rss_filename(), "site/index.rdf");
}

#[test]
fn test_modes_never_collide() {
    let scheme = FilenameScheme::new("slide", "png").with_sizes(8, 8);
    for n in 0..8 {
        assert_ne!(
            scheme.slide_filename(RenderMode::Slide, n),
            scheme.slide_filename(RenderMode::Index, n)
        );
        assert_ne!(
            scheme.image_filename(RenderMode::Slide, n, None),
            scheme.image_filename(RenderMode::Index, n, None)
        );
    }
}

#[test]
fn test_base_name_without_directory() {
    let scheme = FilenameScheme::new("slide", "PNG").with_sizes(2, 1);
    assert_eq!(scheme.base_dir(), ".");
    assert_eq!(scheme.image_type(), "png");
    assert_eq!(scheme.slide_filename(RenderMode::Slide, 0), "./index.html");
}

#[test]
fn test_normalize_image_type() {
    assert_eq!(normalize_image_type("jpg"), "jpeg");
    assert_eq!(normalize_image_type("JPG"), "jpeg");
    assert_eq!(normalize_image_type("jpeg"), "jpeg");
    assert_eq!(normalize_image_type("PNG"), "png");
}

// Navigation

#[test]
fn test_navigation_first_page() {
    let nav = five_slide_navigator(true, false);
    assert_eq!(nav.first_link(0), "&lt;&lt;");
    assert_eq!(nav.previous_link(0), "&lt;");
    assert_eq!(nav.next_link(0), "<a href=\"slide1.html\">&gt;</a>");
    assert_eq!(nav.last_link(0), "<a href=\"slide4.html\">&gt;&gt;</a>");
}

#[test]
fn test_navigation_middle_page() {
    let nav = five_slide_navigator(true, false);
    assert_eq!(nav.first_href(), "index.html");
    assert_eq!(nav.previous_href(2), "slide1.html");
    assert_eq!(nav.next_href(2), "slide3.html");
    assert_eq!(nav.last_href(), "slide4.html");
    assert_eq!(nav.previous_href(1), "index.html");
    assert_eq!(
        nav.navi(2),
        "<div class=\"navi\">\
         <a href=\"index.html\">&lt;&lt;</a>\
         <a href=\"slide1.html\">&lt;</a>\
         <a href=\"slide3.html\">&gt;</a>\
         <a href=\"slide4.html\">&gt;&gt;</a>\
         </div>"
    );
}

#[test]
fn test_navigation_last_page() {
    let nav = five_slide_navigator(true, false);
    assert!(nav.last_slide(4));
    assert_eq!(nav.previous_link(4), "<a href=\"slide3.html\">&lt;</a>");
    assert_eq!(nav.next_link(4), "&gt;");
    assert_eq!(nav.last_link(4), "&gt;&gt;");
}

#[test]
fn test_navigation_uses_outputting_mode() {
    let nav = five_slide_navigator(true, true);
    nav.with_outputting(RenderMode::Index, || {
        assert_eq!(nav.slide_size(), 2);
        assert_eq!(nav.first_href(), "slide-index0.html");
        assert!(nav.last_slide(1));
        assert_eq!(nav.image_title(1, "Overview"), "Overview(1/1)");
    });
    assert_eq!(nav.outputting(), RenderMode::Slide);
}

#[test]
fn test_toggle_mode_round_trip() {
    let nav = five_slide_navigator(true, true);
    assert_eq!(nav.toggle_mode_href(), "slide-index0.html");
    assert_eq!(nav.outputting(), RenderMode::Slide);
    assert_eq!(
        nav.toggle_mode_navi(),
        "<div class=\"toggle-mode\">\n<a href=\"slide-index0.html\">Index</a>\n</div>"
    );
    assert_eq!(nav.outputting(), RenderMode::Slide);

    nav.with_outputting(RenderMode::Index, || {
        assert_eq!(nav.toggle_mode_href(), "index.html");
        assert!(nav.toggle_mode_navi().contains("<a href=\"index.html\">Slide</a>"));
        assert_eq!(nav.outputting(), RenderMode::Index);
    });
}

#[test]
fn test_toggle_mode_label_only_when_disabled() {
    let nav = five_slide_navigator(true, false);
    assert_eq!(nav.toggle_mode_navi(), "<div class=\"toggle-mode\">\nIndex\n</div>");

    let nav = five_slide_navigator(false, false);
    assert_eq!(nav.toggle_mode_navi(), "");
}

#[test]
fn test_outputting_restored_after_panic() {
    let nav = five_slide_navigator(true, true);
    let result = catch_unwind(AssertUnwindSafe(|| {
        nav.with_outputting(RenderMode::Index, || panic!("boom"))
    }));
    assert!(result.is_err());
    assert_eq!(nav.outputting(), RenderMode::Slide);
}

#[test]
fn test_image_title_unescapes_then_escapes() {
    let nav = five_slide_navigator(true, false);
    assert_eq!(nav.image_title(2, "A \\<b\\> \\& C\nD"), "A &lt;b&gt; &amp; C D(2/4)");
}

#[test]
fn test_hrefs_are_percent_encoded() {
    let scheme = FilenameScheme::new("out/my slide", "png").with_sizes(3, 1);
    let nav = Navigator::new(scheme, true, false);
    assert_eq!(nav.href(1), "my%20slide1.html");
    assert_eq!(nav.image_src(1, None), "my%20slide1.png");
}

// Deck modes

#[test]
fn test_with_mode_restores_previous_mode() {
    let deck = share(MarkdownDeck::parse(FIVE_SLIDES));
    let count = with_mode(&deck, RenderMode::Index, || {
        let locked = deck.lock();
        locked.slide_count(locked.mode())
    });
    assert_eq!(count, 2);
    assert_eq!(deck.lock().mode(), RenderMode::Slide);

    with_index_mode(&deck, true, || {
        assert_eq!(deck.lock().mode(), RenderMode::Index);
        with_index_mode(&deck, false, || {
            assert_eq!(deck.lock().mode(), RenderMode::Slide);
        });
        assert_eq!(deck.lock().mode(), RenderMode::Index);
    });
    assert_eq!(deck.lock().mode(), RenderMode::Slide);
}

#[test]
fn test_with_mode_restores_on_error_and_panic() {
    let deck = share(MarkdownDeck::parse(FIVE_SLIDES));
    let result: Result<()> = with_mode(&deck, RenderMode::Index, || {
        Err(ExportError::DrawError("failed".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(deck.lock().mode(), RenderMode::Slide);

    let panicked = catch_unwind(AssertUnwindSafe(|| {
        with_mode(&deck, RenderMode::Index, || panic!("boom"))
    }));
    assert!(panicked.is_err());
    assert_eq!(deck.lock().mode(), RenderMode::Slide);
}

// Feed

fn feed_entries(count: usize) -> Vec<RssEntry> {
    (0..count)
        .map(|i| RssEntry {
            filename: format!("out/slide{}.html", i),
            title: format!("Slide {}", i),
            text: format!("Text {}", i),
            html: format!("<h1>Slide {}</h1><img src=\"slide{}.png\" />", i, i),
        })
        .collect()
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("Invalid date")
}

fn dc_dates(document: &str) -> Vec<DateTime<Utc>> {
    document
        .split("<dc:date>")
        .skip(1)
        .filter_map(|rest| rest.split("</dc:date>").next())
        .map(|date| {
            DateTime::parse_from_rfc3339(date.trim())
                .expect("Failed to parse dc:date")
                .with_timezone(&Utc)
        })
        .collect()
}

#[test]
fn test_feed_item_dates_strictly_decrease() {
    let feed = FeedBuilder::new("http://example.com/deck");
    let document = feed
        .build(&feed_entries(4), fixed_now())
        .expect("Failed to build feed");

    let dates = dc_dates(&document);
    assert_eq!(dates.len(), 5, "channel date plus one per item");
    assert_eq!(dates[0], fixed_now());
    let items = &dates[1..];
    assert_eq!(items[0], fixed_now());
    for pair in items.windows(2) {
        assert!(pair[0] > pair[1], "dates must strictly decrease: {:?}", pair);
    }
}

#[test]
fn test_feed_channel_and_item_links() {
    let feed = FeedBuilder::new("http://example.com/deck///");
    assert_eq!(feed.base_uri(), "http://example.com/deck/");
    assert_eq!(feed.rss_uri(), "http://example.com/deck/index.rdf");

    let document = feed
        .build(&feed_entries(2), fixed_now())
        .expect("Failed to build feed");
    assert!(document.contains("rdf:about=\"http://example.com/deck/index.rdf\""));
    assert!(document.contains("<title>Slide 0</title>"));
    assert!(document.contains("<description>Text 0</description>"));
    assert!(document.contains("<link>http://example.com/deck/slide1.html</link>"));
    assert!(document.contains("rdf:resource=\"http://example.com/deck/slide0.html\""));
}

#[test]
fn test_feed_without_entries_is_unavailable() {
    let feed = FeedBuilder::new("http://example.com/");
    let result = feed.build(&[], fixed_now());
    assert!(matches!(result, Err(ExportError::FeedUnavailable(_))));
}

#[test]
fn test_feed_link_tag() {
    let feed = FeedBuilder::new("http://example.com/deck");
    assert_eq!(
        feed.link_tag(),
        "<link rel=\"alternate\" type=\"application/rss+xml\" title=\"RSS\" \
         href=\"http://example.com/deck/index.rdf\" />"
    );
}

#[test]
fn test_normalize_base_uri() {
    assert_eq!(normalize_base_uri("http://a/b"), "http://a/b/");
    assert_eq!(normalize_base_uri("http://a/b/"), "http://a/b/");
    assert_eq!(normalize_base_uri("http://a/b//"), "http://a/b/");
}

#[test]
fn test_relative_references_rewritten_once() {
    let base = "http://example.com/deck/";
    let html = "<a href=\"slide1.html\"><img src='slide1.png' /></a>";
    let rewritten = normalize_html_reference(html, base);
    assert_eq!(
        rewritten,
        "<a href=\"http://example.com/deck/slide1.html\">\
         <img src='http://example.com/deck/slide1.png' /></a>"
    );
    assert_eq!(rewritten.matches(base).count(), 2);
}

#[test]
fn test_absolute_and_empty_references_untouched() {
    let base = "http://example.com/deck/";
    let html = "<a href=\"http://other.org/x\">x</a><a href=\"\">e</a>\
                <a href=\"mailto:me@example.com\">m</a><a href=plain>p</a>";
    assert_eq!(normalize_html_reference(html, base), html);
}

// Colors

#[test]
fn test_color_resolution_is_idempotent() {
    let colors = ColorCache::new();
    let first = colors.resolve("#ff8000").expect("Failed to resolve color");
    let second = colors.resolve("#ff8000").expect("Failed to resolve color");
    assert_eq!(first, second);
    assert_eq!(colors.len(), 1);

    colors.resolve("navy").expect("Failed to resolve color");
    assert_eq!(colors.len(), 2);
}

#[test]
fn test_color_failure_is_sticky() {
    let colors = ColorCache::new();
    assert!(matches!(colors.resolve("no-such-color"), Err(ExportError::ColorAllocation(_))));
    assert!(matches!(colors.resolve("no-such-color"), Err(ExportError::ColorAllocation(_))));
    assert!(colors.is_empty());
}

#[test]
fn test_color_capacity_limit() {
    let colors = ColorCache::with_capacity_limit(1);
    colors.resolve("red").expect("Failed to resolve color");
    assert!(colors.resolve("blue").is_err());
    // Already allocated colors keep resolving
    assert!(colors.resolve("red").is_ok());
    // A failed spec keeps failing
    assert!(colors.resolve("blue").is_err());
    assert_eq!(colors.len(), 1);
}

#[test]
fn test_parse_color_forms() {
    let red = parse_color("#f00").expect("short hex");
    assert_eq!(red.to_color_u8().red(), 255);
    let long = parse_color("#ffff00000000").expect("long hex");
    assert_eq!(long.to_color_u8().red(), 255);
    assert_eq!(long.to_color_u8().green(), 0);
    let translucent = parse_color("#0000ff80").expect("hex with alpha");
    assert_eq!(translucent.to_color_u8().alpha(), 128);
    assert!(parse_color("#12").is_none());
    assert!(parse_color("#gggggg").is_none());
}

// Drawing surface

#[test]
fn test_surface_draws_filled_rect() {
    let mut surface =
        DrawingSurface::new(10, 10, Arc::new(ColorCache::new())).expect("Failed to create surface");
    {
        let mut page = surface
            .begin_page(RenderMode::Slide, 0)
            .expect("Failed to begin page");
        page.draw_rect(true, 0.0, 0.0, 5.0, 5.0, ColorSource::Spec("red"))
            .expect("Failed to draw rect");
    }

    let pixels = surface
        .export_pixels(RenderMode::Slide, 0)
        .expect("Failed to export pixels");
    assert_eq!(pixels.dimensions(), (10, 10));
    assert_eq!(pixels.get_pixel(1, 1).0, [255, 0, 0, 255]);
    assert_eq!(pixels.get_pixel(8, 8).0, [255, 255, 255, 255]);
}

#[test]
fn test_surface_unknown_page_not_rendered() {
    let surface =
        DrawingSurface::new(4, 4, Arc::new(ColorCache::new())).expect("Failed to create surface");
    assert!(matches!(
        surface.export_pixels(RenderMode::Slide, 3),
        Err(ExportError::PageNotRendered { page: 3 })
    ));
}

#[test]
fn test_surface_bad_color_fails_only_that_call() {
    let mut surface =
        DrawingSurface::new(4, 4, Arc::new(ColorCache::new())).expect("Failed to create surface");
    {
        let mut page = surface
            .begin_page(RenderMode::Slide, 0)
            .expect("Failed to begin page");
        let result = page.draw_line(0.0, 0.0, 3.0, 3.0, ColorSource::Spec("bogus"));
        assert!(matches!(result, Err(ExportError::ColorAllocation(_))));
        page.draw_rect(true, 0.0, 0.0, 4.0, 4.0, ColorSource::Spec("blue"))
            .expect("Drawing must keep working");
    }
    let pixels = surface
        .export_pixels(RenderMode::Slide, 0)
        .expect("Failed to export pixels");
    assert_eq!(pixels.get_pixel(2, 2).0, [0, 0, 255, 255]);
}

#[test]
fn test_surface_background_and_image_blit() {
    let mut surface =
        DrawingSurface::new(8, 8, Arc::new(ColorCache::new())).expect("Failed to create surface");
    surface
        .set_background(ColorSource::Spec("black"))
        .expect("Failed to set background");
    let stamp = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]));
    {
        let mut page = surface
            .begin_page(RenderMode::Index, 0)
            .expect("Failed to begin page");
        page.draw_image(&stamp, 4.0, 4.0, &ImageOptions::default())
            .expect("Failed to draw image");
    }
    let pixels = surface
        .export_pixels(RenderMode::Index, 0)
        .expect("Failed to export pixels");
    assert_eq!(pixels.get_pixel(0, 0).0, [0, 0, 0, 255]);
    assert_eq!(pixels.get_pixel(5, 5).0, [0, 255, 0, 255]);
    assert!(!surface.has_page(RenderMode::Slide, 0));
}

#[test]
fn test_surface_rejects_empty_size() {
    assert!(DrawingSurface::new(0, 10, Arc::new(ColorCache::new())).is_err());
}

// Fonts

#[test]
fn test_parse_markup_spans() {
    let base = TextStyle::default();
    let spans = parse_markup("<b>Bold</b> and <span size=\"48px\" foreground=\"red\">big</span>", &base)
        .expect("Failed to parse markup");
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[0].text, "Bold");
    assert!(spans[0].style.bold);
    assert_eq!(spans[1].text, " and ");
    assert!(!spans[1].style.bold);
    assert_eq!(spans[2].style.size, 48.0);
    assert_eq!(spans[2].style.foreground.as_deref(), Some("red"));
}

#[test]
fn test_parse_markup_rejects_unknown_tags() {
    let result = parse_markup("<blink>no</blink>", &TextStyle::default());
    assert!(matches!(result, Err(ExportError::MarkupError(_))));
}

#[test]
fn test_measure_with_synthetic_metrics() {
    let fonts = FontLayoutEngine::metrics_only();
    let (layout, width, height) = fonts.measure("ab\ncd").expect("Failed to measure");
    // 2 glyphs at 0.6 * 24px, 2 lines at 1.2 * 24px
    assert_eq!(width, 29);
    assert_eq!(height, 58);
    assert_eq!(layout.lines, 2);
    assert_eq!(layout.text(), "abcd");
}

#[test]
fn test_measure_escaped_text() {
    let fonts = FontLayoutEngine::metrics_only();
    let (layout, _, _) = fonts
        .measure(&escape_html("a < b & 'c'"))
        .expect("Failed to measure");
    assert_eq!(layout.text(), "a < b & 'c'");
}

struct LateFonts {
    calls: AtomicUsize,
}

impl FontContext for LateFonts {
    fn list_families(&self) -> Vec<String> {
        // Nothing is found on the first call
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Vec::new()
        } else {
            vec!["Sans".to_string(), "Mono".to_string()]
        }
    }

    fn face(&self, _style: &TextStyle) -> Option<Arc<fontdue::Font>> {
        None
    }
}

#[test]
fn test_list_families_retries_empty_result() {
    let context = Arc::new(LateFonts {
        calls: AtomicUsize::new(0),
    });
    let fonts = FontLayoutEngine::new(context.clone());

    assert!(fonts.list_families().is_empty());
    let families = fonts.list_families();
    assert!(families.contains("Sans"));
    assert_eq!(families.len(), 2);

    fonts.list_families();
    assert_eq!(context.calls.load(Ordering::SeqCst), 2, "cached after first success");
}

// Template

#[test]
fn test_template_renders_slots() {
    let template = Template::parse("<title>{{ title }}</title>{{rss_link}}{{ navi }}|{{ toggle_mode_navi }}|{{ content }}{{ generator }}")
        .expect("Failed to parse template");
    let view = PageView {
        title: "T".to_string(),
        rss_link: "R".to_string(),
        navi: "N".to_string(),
        toggle_mode_navi: "M".to_string(),
        content: "C".to_string(),
    };
    let html = template.render(&view);
    assert!(html.starts_with("<title>T</title>RN|M|C"));
    assert!(html.ends_with(crate::template::GENERATOR));
}

#[test]
fn test_template_errors() {
    assert!(matches!(Template::parse("{{ nope }}"), Err(ExportError::TemplateError(_))));
    assert!(matches!(Template::parse("{{ title"), Err(ExportError::TemplateError(_))));

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let missing = temp_dir.path().join("missing.html");
    assert!(matches!(
        Template::load(Some(&missing)),
        Err(ExportError::MissingTemplate(_))
    ));
}

#[test]
fn test_default_template_has_every_slot() {
    let template = Template::load(None).expect("Failed to load default template");
    let html = template.render(&PageView {
        title: "TITLE".to_string(),
        rss_link: "RSS".to_string(),
        navi: "NAVI".to_string(),
        toggle_mode_navi: "TOGGLE".to_string(),
        content: "CONTENT".to_string(),
    });
    for needle in ["TITLE", "RSS", "NAVI", "TOGGLE", "CONTENT"] {
        assert!(html.contains(needle), "missing {}", needle);
    }
    assert_eq!(html.matches("NAVI").count(), 2);
}

// Configuration

#[test]
fn test_export_config_validation() {
    let config = ExportConfig::default();
    assert!(config.validate().is_ok());

    let zero = ExportConfig {
        width: 0,
        ..ExportConfig::default()
    };
    assert!(matches!(zero.validate(), Err(ExportError::ConfigError(_))));

    let nested = ExportConfig {
        base_name: "a/b".to_string(),
        ..ExportConfig::default()
    };
    assert!(nested.validate().is_err());

    let format = ExportConfig {
        image_format: "xyz".to_string(),
        ..ExportConfig::default()
    };
    assert!(format.validate().is_err());

    let jpg = ExportConfig {
        image_format: "JPG".to_string(),
        ..ExportConfig::default()
    };
    assert!(jpg.validate().is_ok());

    let feed = ExportConfig {
        feed_base_uri: Some("not a uri".to_string()),
        ..ExportConfig::default()
    };
    assert!(feed.validate().is_err());
}

#[test]
fn test_get_export_config_defaults() {
    let config = Config::new();
    let export = config.get_export_config(
        "out".into(),
        None,
        None,
        Some(320),
        None,
        true,
        false,
        None,
    );
    assert_eq!(export.base_name, "slide");
    assert_eq!(export.image_format, "png");
    assert_eq!(export.width, 320);
    assert_eq!(export.height, 720);
    assert!(!export.feed_enabled());
    assert!(export.base_path().ends_with("slide"));
}

#[test]
fn test_session_rejects_missing_template_before_writing() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output_dir = temp_dir.path().join("site");
    let config = ExportConfig {
        output_dir: output_dir.clone(),
        template_path: Some(temp_dir.path().join("nope.html")),
        ..ExportConfig::default()
    };
    assert!(matches!(
        ExportSession::new(config),
        Err(ExportError::MissingTemplate(_))
    ));
    assert!(!output_dir.exists());
}

// Markdown deck

#[test]
fn test_parse_frontmatter() {
    let (frontmatter, rest) = parse_frontmatter("% Title\n% Author\n% Date\n\n# One");
    assert_eq!(frontmatter.title, "Title");
    assert_eq!(frontmatter.author, "Author");
    assert_eq!(frontmatter.date, "Date");
    assert_eq!(rest, "# One");

    let (frontmatter, rest) = parse_frontmatter("# No frontmatter");
    assert_eq!(frontmatter.title, "Presentation");
    assert_eq!(rest, "# No frontmatter");
}

#[test]
fn test_split_slides() {
    let content = "intro text\n\n# One\nbody\n## Sub\n#Two\n\\# not a slide\n```\n# in code\n```\n";
    let slides = split_slides(content, "Deck");
    let titles: Vec<&str> = slides.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["Deck", "One", "Two"]);
    assert!(slides[1].body.contains("## Sub"));
    assert!(slides[2].body.contains("# in code"));
}

#[test]
fn test_plain_text() {
    let text = plain_text("Some *emphasis* and `code`.\n\n- item one\n- item two");
    assert_eq!(text, "Some emphasis and code.\nitem one\nitem two");
}

#[test]
fn test_markdown_deck_modes() {
    let mut deck = MarkdownDeck::parse(FIVE_SLIDES);
    assert_eq!(deck.slide_count(RenderMode::Slide), 5);
    assert_eq!(deck.slide_count(RenderMode::Index), 2);
    assert_eq!(deck.slide_title(2), "Three");
    assert_eq!(deck.to_raw_text(0), "One\nFirst body.");
    assert_eq!(deck.to_raw_text(2), "Three");

    deck.set_mode(RenderMode::Index);
    assert_eq!(deck.slide_title(0), "Five Slides");
    assert_eq!(deck.to_raw_text(1), "Five");
}

#[test]
fn test_markdown_deck_index_html_links_thumbnails() {
    let mut deck = MarkdownDeck::parse(FIVE_SLIDES);
    deck.set_mode(RenderMode::Index);
    let nav = five_slide_navigator(true, true);
    let titles: Vec<String> = ["One", "Two", "Three", "Four", "Five"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let links = PageLinks {
        navigator: &nav,
        slide_titles: &titles,
    };

    let html = nav.with_outputting(RenderMode::Index, || deck.to_html_body(1, &links));
    assert!(html.contains("<a href=\"slide4.html\">"));
    assert!(html.contains("src=\"slide4-thumb.png\""));
    assert!(html.contains("title=\"Five(4/4)\""));
    assert_eq!(nav.outputting(), RenderMode::Slide);
}

#[test]
fn test_markdown_deck_themes() {
    let mut deck = MarkdownDeck::parse(FIVE_SLIDES);
    assert_eq!(deck.theme_name(), "default");
    deck.apply_theme("dark").expect("Failed to apply theme");
    assert_eq!(deck.theme_name(), "dark");
    assert!(deck.apply_theme("neon").is_err());
    assert_eq!(deck.theme_name(), "dark");
}

#[test]
fn test_markdown_deck_modified_state() {
    let mut deck = MarkdownDeck::parse(FIVE_SLIDES);
    assert!(!deck.is_modified());
    deck.set_source("# Changed");
    assert!(deck.is_modified());
    assert_eq!(deck.slide_count(RenderMode::Slide), 5, "not parsed yet");
    deck.reparse("# Changed").expect("Failed to reparse");
    assert!(!deck.is_modified());
    assert_eq!(deck.slide_count(RenderMode::Slide), 1);
}

// Rendering

#[test]
fn test_render_all_yields_pages_in_order() {
    let orchestrator = offscreen(MarkdownDeck::parse(FIVE_SLIDES));
    let pages: Vec<(usize, PixelBuffer)> = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Failed to start render")
        .collect::<Result<_>>()
        .expect("Failed to render page");

    let numbers: Vec<usize> = pages.iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, [0, 1, 2, 3, 4]);
    assert_eq!(pages[0].1.dimensions(), (64, 48));
    // Default theme background
    assert_eq!(pages[0].1.get_pixel(0, 0).0, [255, 255, 255, 255]);
    assert_eq!(orchestrator.cached_pages(), 5);
    assert!(!orchestrator.is_busy());
    assert_eq!(orchestrator.deck().lock().mode(), RenderMode::Slide);
}

#[test]
fn test_render_index_mode_restores_deck_mode() {
    let orchestrator = offscreen(MarkdownDeck::parse(FIVE_SLIDES));
    let pages = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Index)
        .expect("Failed to start render")
        .collect::<Result<Vec<_>>>()
        .expect("Failed to render page");
    assert_eq!(pages.len(), 2);
    assert_eq!(orchestrator.deck().lock().mode(), RenderMode::Slide);
}

#[test]
fn test_second_job_while_busy_fails() {
    let orchestrator = offscreen(MarkdownDeck::parse(FIVE_SLIDES));
    let mut stream = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Failed to start render");
    assert!(orchestrator.is_busy());
    assert!(matches!(
        orchestrator.render_all_to_pixel_buffers(RenderMode::Slide),
        Err(ExportError::RenderBusy)
    ));

    // Finish the first job; the flag clears once the producer exits
    assert!(stream.next().is_some());
    for page in stream.by_ref() {
        page.expect("Failed to render page");
    }
    assert!(!orchestrator.is_busy());
    assert!(orchestrator.render_all_to_pixel_buffers(RenderMode::Slide).is_ok());
}

#[test]
fn test_dropped_stream_frees_orchestrator() {
    let orchestrator = offscreen(MarkdownDeck::parse(FIVE_SLIDES));
    let mut stream = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Failed to start render");
    let (first, _) = stream
        .next()
        .expect("Stream ended early")
        .expect("Failed to render page");
    assert_eq!(first, 0);
    drop(stream);

    assert!(!orchestrator.is_busy());
    assert!(orchestrator.cached_pages() < 5);
    let pages = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Orchestrator still busy after the stream was dropped")
        .collect::<Result<Vec<_>>>()
        .expect("Failed to render page");
    assert_eq!(pages.len(), 5);
}

#[test]
fn test_cancelled_stream_stops_early() {
    let orchestrator = offscreen(MarkdownDeck::parse(FIVE_SLIDES));
    let mut stream = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Failed to start render");
    stream.cancel();
    let rendered = stream.by_ref().count();
    assert!(rendered < 5, "rendered {} pages after cancel", rendered);
    drop(stream);
    assert!(!orchestrator.is_busy());
}

#[test]
fn test_theme_change_invalidates_cache() {
    let orchestrator = offscreen(MarkdownDeck::parse(FIVE_SLIDES));
    let first: Vec<(usize, PixelBuffer)> = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Failed to start render")
        .collect::<Result<_>>()
        .expect("Failed to render page");
    assert_eq!(orchestrator.cached_pages(), 5);

    orchestrator.apply_theme("dark").expect("Failed to apply theme");
    assert_eq!(orchestrator.cached_pages(), 0);

    let second: Vec<(usize, PixelBuffer)> = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Failed to start render")
        .collect::<Result<_>>()
        .expect("Failed to render page");
    assert_ne!(first[0].1.get_pixel(0, 0), second[0].1.get_pixel(0, 0));
}

#[test]
fn test_non_pixel_backend_renders_throwaway_copy() {
    let mut deck = MarkdownDeck::parse(FIVE_SLIDES);
    deck.set_source("# Edited\n\nBody\n\n# Second\n");
    let deck = share(deck);
    let orchestrator = RenderOrchestrator::new(
        deck.clone(),
        Backend::Interactive {
            width: 32,
            height: 24,
        },
        metrics_fonts(),
    )
    .with_colors(Arc::new(ColorCache::new()));

    let pages: Vec<(usize, PixelBuffer)> = orchestrator
        .render_all_to_pixel_buffers(RenderMode::Slide)
        .expect("Failed to start render")
        .collect::<Result<_>>()
        .expect("Failed to render page");

    // The copy re-parses the edited source
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].1.dimensions(), (32, 24));
    // The original is left exactly as it was
    let original = deck.lock();
    assert!(original.is_modified());
    assert_eq!(original.slide_count(RenderMode::Slide), 5);
}

struct RecordingPrinter {
    surface: DrawingSurface,
    printed: Arc<Mutex<Vec<usize>>>,
    finished: Arc<Mutex<bool>>,
}

impl PrintTarget for RecordingPrinter {
    fn size(&self) -> (u32, u32) {
        (self.surface.width(), self.surface.height())
    }

    fn print_page(
        &mut self,
        page: usize,
        draw: &mut dyn FnMut(&mut dyn Canvas) -> Result<()>,
    ) -> Result<()> {
        let mut canvas = self.surface.begin_page(RenderMode::Slide, page)?;
        draw(&mut canvas)?;
        self.printed.lock().push(page);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        *self.finished.lock() = true;
        Ok(())
    }
}

#[test]
fn test_print_through_factory() {
    let printed = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::new(Mutex::new(false));
    let factory: PrintFactory = {
        let printed = printed.clone();
        let finished = finished.clone();
        Arc::new(move |width: u32, height: u32| -> Result<Box<dyn PrintTarget>> {
            Ok(Box::new(RecordingPrinter {
                surface: DrawingSurface::new(width, height, Arc::new(ColorCache::new()))?,
                printed: printed.clone(),
                finished: finished.clone(),
            }) as Box<dyn PrintTarget>)
        })
    };

    let orchestrator = RenderOrchestrator::new(
        share(MarkdownDeck::parse(FIVE_SLIDES)),
        Backend::Interactive {
            width: 40,
            height: 30,
        },
        metrics_fonts(),
    )
    .with_print_factory(factory);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let job = {
        let progress = progress.clone();
        orchestrator
            .print(move |page| progress.lock().push(page))
            .expect("Failed to start print job")
    };
    assert_eq!(job.wait().expect("Print job failed"), 5);
    assert_eq!(*printed.lock(), [0, 1, 2, 3, 4]);
    assert_eq!(*progress.lock(), [0, 1, 2, 3, 4]);
    assert!(*finished.lock());
    assert!(!orchestrator.is_busy());
}

#[test]
fn test_print_without_printable_backend_fails() {
    let orchestrator = offscreen(MarkdownDeck::parse(FIVE_SLIDES));
    assert!(matches!(
        orchestrator.print(|_| {}),
        Err(ExportError::PrintUnavailable)
    ));
}

// Utilities

#[test]
fn test_unescape_title() {
    assert_eq!(unescape_title("a\\#b"), "a#b");
    assert_eq!(unescape_title("line\none"), "line one");
    assert_eq!(unescape_title("crlf\r\nend"), "crlf end");
    assert_eq!(unescape_title("escaped\\nbreak"), "escaped break");
}

#[test]
fn test_locale_charset() {
    assert_eq!(locale_charset("ja_JP.EUC-JP@euro"), Some("EUC-JP"));
    assert_eq!(locale_charset("en_US.UTF-8"), Some("UTF-8"));
    assert_eq!(locale_charset("C"), None);
}

#[test]
fn test_url_encode() {
    assert_eq!(url_encode("slide-1_a.html"), "slide-1_a.html");
    assert_eq!(url_encode("my slide.html"), "my%20slide.html");
    assert_eq!(url_encode("a~b.html"), "a~b.html");
}

// Filename encoding

// Process environment is shared by every test thread
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

const ENCODING_VARS: [&str; 4] = [FILENAME_ENCODING_VAR, "LC_ALL", "LC_CTYPE", "LANG"];

/// Run `f` with only the given encoding variables set, restoring them afterwards
fn with_encoding_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    struct Restore(Vec<(&'static str, Option<std::ffi::OsString>)>);

    impl Drop for Restore {
        fn drop(&mut self) {
            for (name, value) in &self.0 {
                match value {
                    Some(value) => std::env::set_var(name, value),
                    None => std::env::remove_var(name),
                }
            }
        }
    }

    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _restore = Restore(
        ENCODING_VARS
            .iter()
            .map(|&name| (name, std::env::var_os(name)))
            .collect(),
    );
    for name in ENCODING_VARS {
        std::env::remove_var(name);
    }
    for (name, value) in vars {
        std::env::set_var(name, value);
    }
    f()
}

#[cfg(unix)]
fn os_bytes(path: &std::path::Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[test]
fn test_charset_encoding_accepts_glibc_names() {
    assert_eq!(charset_encoding("EUC-JP"), Some(EUC_JP));
    assert_eq!(charset_encoding("eucJP"), Some(EUC_JP));
    assert_eq!(charset_encoding("eucKR"), Some(EUC_KR));
    assert_eq!(charset_encoding("eucCN"), Some(GBK));
    assert_eq!(charset_encoding("SJIS"), Some(SHIFT_JIS));
    assert_eq!(charset_encoding("utf8"), Some(UTF_8));
    assert_eq!(charset_encoding("euc"), None);
    assert_eq!(charset_encoding("no-such-charset"), None);
}

#[cfg(unix)]
#[test]
fn test_explicit_filename_encoding() {
    with_encoding_env(
        &[(FILENAME_ENCODING_VAR, "EUC-JP"), ("LANG", "en_US.UTF-8")],
        || {
            assert_eq!(filename_encoding(), Some(EUC_JP));
            let (expected, _, _) = EUC_JP.encode("スライド1.html");
            assert_eq!(os_bytes(&to_filename_encoding("スライド1.html")), &*expected);
            assert_ne!(os_bytes(&to_filename_encoding("スライド1.html")), "スライド1.html".as_bytes());
        },
    );
}

#[test]
fn test_locale_filename_encoding() {
    with_encoding_env(&[(FILENAME_ENCODING_VAR, "@locale"), ("LANG", "ja_JP.eucJP")], || {
        assert_eq!(filename_encoding(), Some(EUC_JP));
    });
    with_encoding_env(&[("LC_ALL", "ko_KR.eucKR"), ("LANG", "ja_JP.eucJP")], || {
        assert_eq!(filename_encoding(), Some(EUC_KR));
    });
    with_encoding_env(&[(FILENAME_ENCODING_VAR, "no-such-charset"), ("LANG", "ja_JP.EUC-JP")], || {
        assert_eq!(filename_encoding(), Some(EUC_JP));
    });
}

#[cfg(unix)]
#[test]
fn test_glibc_locale_matches_canonical_name() {
    let glibc = with_encoding_env(&[("LANG", "ja_JP.eucJP")], || to_filename_encoding("スライド1.html"));
    let canonical = with_encoding_env(&[("LANG", "ja_JP.EUC-JP")], || to_filename_encoding("スライド1.html"));
    assert_eq!(os_bytes(&glibc), os_bytes(&canonical));
}

#[test]
fn test_utf8_filenames_pass_through() {
    with_encoding_env(&[("LANG", "C")], || {
        assert_eq!(filename_encoding(), None);
        assert_eq!(to_filename_encoding("スライド1.html"), PathBuf::from("スライド1.html"));
    });
    with_encoding_env(&[("LANG", "en_US.UTF-8")], || {
        assert_eq!(filename_encoding(), Some(UTF_8));
        assert_eq!(to_filename_encoding("スライド1.html"), PathBuf::from("スライド1.html"));
    });
}

#[test]
fn test_unrepresentable_filename_stays_utf8() {
    with_encoding_env(&[(FILENAME_ENCODING_VAR, "EUC-JP")], || {
        assert_eq!(to_filename_encoding("😀.html"), PathBuf::from("😀.html"));
    });
}

#[cfg(unix)]
#[test]
fn test_hrefs_name_converted_files() {
    with_encoding_env(&[(FILENAME_ENCODING_VAR, "EUC-JP")], || {
        let scheme = FilenameScheme::new("out/スライド", "png").with_sizes(3, 1);
        let on_disk = scheme.path(&scheme.slide_filename(RenderMode::Slide, 1));
        let nav = Navigator::new(scheme, true, false);

        let href = nav.href(1);
        assert!(href.starts_with("%A5%B9"), "unexpected href {}", href);
        let decoded: Vec<u8> = percent_encoding::percent_decode_str(&href).collect();
        let file_name = on_disk.file_name().expect("No file name");
        assert_eq!(decoded, os_bytes(std::path::Path::new(file_name)));
    });
}

// Preview server

#[test]
fn test_resolve_request_path() {
    use crate::watch::resolve_request_path;
    use std::path::Path;

    let root = Path::new("/srv/site");
    assert_eq!(resolve_request_path(root, "/"), Some(root.join("index.html")));
    assert_eq!(
        resolve_request_path(root, "/slide1.html?reload=1#top"),
        Some(root.join("slide1.html"))
    );
    assert_eq!(
        resolve_request_path(root, "/my%20slide.png"),
        Some(root.join("my slide.png"))
    );
    assert_eq!(resolve_request_path(root, "/../etc/passwd"), None);
    assert_eq!(resolve_request_path(root, "/a/%2e%2e/b"), None);

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        let name = std::ffi::OsStr::from_bytes(b"\xa5\xb9.png");
        assert_eq!(resolve_request_path(root, "/%A5%B9.png"), Some(root.join(name)));
    }
}

#[test]
fn test_content_type() {
    use crate::watch::content_type;
    use std::path::Path;

    assert_eq!(content_type(Path::new("index.html")), "text/html; charset=utf-8");
    assert_eq!(content_type(Path::new("slide0.JPEG")), "image/jpeg");
    assert_eq!(content_type(Path::new("index.rdf")), "application/rdf+xml");
    assert_eq!(content_type(Path::new("notes")), "application/octet-stream");
}
