// ABOUTME: Navigation links between exported pages
// ABOUTME: Computes first/previous/next/last links, titles and the mode toggle for each page

use crate::deck::{HtmlLinks, RenderMode};
use crate::naming::{FilenameScheme, basename};
use crate::utils::{escape_html, unescape_title, url_encode};
use std::cell::Cell;

/// Link computation for one export run.
///
/// The navigator tracks which mode is currently being written out; every
/// href and filename is resolved against that mode.
pub struct Navigator {
    scheme: FilenameScheme,
    output_slide_html: bool,
    output_index_html: bool,
    outputting: Cell<RenderMode>,
}

/// Restores the outputting mode when dropped
struct OutputtingGuard<'a> {
    cell: &'a Cell<RenderMode>,
    previous: RenderMode,
}

impl Drop for OutputtingGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

impl Navigator {
    pub fn new(scheme: FilenameScheme, output_slide_html: bool, output_index_html: bool) -> Self {
        Self {
            scheme,
            output_slide_html,
            output_index_html,
            outputting: Cell::new(RenderMode::Slide),
        }
    }

    pub fn scheme(&self) -> &FilenameScheme {
        &self.scheme
    }

    /// Mode currently being written out
    pub fn outputting(&self) -> RenderMode {
        self.outputting.get()
    }

    pub fn outputting_index(&self) -> bool {
        self.outputting().is_index()
    }

    /// Run `f` while outputting `mode`; the previous mode is restored on
    /// every exit path
    pub fn with_outputting<T>(&self, mode: RenderMode, f: impl FnOnce() -> T) -> T {
        let previous = self.outputting.replace(mode);
        let _guard = OutputtingGuard {
            cell: &self.outputting,
            previous,
        };
        f()
    }

    /// Whether HTML is written for the mode being output
    pub fn output_html_for(&self, mode: RenderMode) -> bool {
        match mode {
            RenderMode::Slide => self.output_slide_html,
            RenderMode::Index => self.output_index_html,
        }
    }

    /// Page count of the mode being output
    pub fn slide_size(&self) -> usize {
        self.scheme.size(self.outputting())
    }

    pub fn slide_filename(&self, slide_number: usize) -> String {
        self.scheme.slide_filename(self.outputting(), slide_number)
    }

    pub fn image_filename(&self, slide_number: usize, optional: Option<&str>) -> String {
        self.scheme
            .image_filename(self.outputting(), slide_number, optional)
    }

    pub fn href(&self, slide_number: usize) -> String {
        url_encode(&basename(&self.slide_filename(slide_number)))
    }

    pub fn first_slide(&self, slide_number: usize) -> bool {
        slide_number == 0
    }

    pub fn last_slide(&self, slide_number: usize) -> bool {
        let size = self.slide_size();
        size == 0 || slide_number == size - 1
    }

    pub fn first_index(&self) -> usize {
        0
    }

    pub fn previous_index(&self, slide_number: usize) -> usize {
        slide_number.saturating_sub(1)
    }

    pub fn next_index(&self, slide_number: usize) -> usize {
        slide_number + 1
    }

    pub fn last_index(&self) -> usize {
        self.slide_size().saturating_sub(1)
    }

    pub fn first_href(&self) -> String {
        self.href(self.first_index())
    }

    pub fn previous_href(&self, slide_number: usize) -> String {
        self.href(self.previous_index(slide_number))
    }

    pub fn next_href(&self, slide_number: usize) -> String {
        self.href(self.next_index(slide_number))
    }

    pub fn last_href(&self) -> String {
        self.href(self.last_index())
    }

    /// An anchor to a page, or just the label when the link is disabled
    pub fn a_link(&self, slide_number: usize, label: &str, label_only: bool) -> String {
        if label_only {
            label.to_string()
        } else {
            format!("<a href=\"{}\">{}</a>", self.href(slide_number), label)
        }
    }

    pub fn first_link(&self, slide_number: usize) -> String {
        self.a_link(
            self.first_index(),
            &escape_html("<<"),
            self.first_slide(slide_number),
        )
    }

    pub fn previous_link(&self, slide_number: usize) -> String {
        self.a_link(
            self.previous_index(slide_number),
            &escape_html("<"),
            self.first_slide(slide_number),
        )
    }

    pub fn next_link(&self, slide_number: usize) -> String {
        self.a_link(
            self.next_index(slide_number),
            &escape_html(">"),
            self.last_slide(slide_number),
        )
    }

    pub fn last_link(&self, slide_number: usize) -> String {
        self.a_link(
            self.last_index(),
            &escape_html(">>"),
            self.last_slide(slide_number),
        )
    }

    /// The navigation bar of a page
    pub fn navi(&self, slide_number: usize) -> String {
        let mut result = String::from("<div class=\"navi\">");
        result.push_str(&self.first_link(slide_number));
        result.push_str(&self.previous_link(slide_number));
        result.push_str(&self.next_link(slide_number));
        result.push_str(&self.last_link(slide_number));
        result.push_str("</div>");
        result
    }

    /// Href of the first page of the other mode
    pub fn toggle_mode_href(&self) -> String {
        self.with_outputting(self.outputting().toggled(), || self.first_href())
    }

    /// Control linking to the first page of the other mode; the label is
    /// shown without a link when that mode's HTML is not written
    pub fn toggle_mode_navi(&self) -> String {
        if !self.output_slide_html && !self.output_index_html {
            return String::new();
        }

        let target = self.outputting().toggled();
        let label = match target {
            RenderMode::Slide => "Slide",
            RenderMode::Index => "Index",
        };
        let link = self.with_outputting(target, || {
            self.a_link(
                self.first_index(),
                &escape_html(label),
                !self.output_html_for(target),
            )
        });
        format!("<div class=\"toggle-mode\">\n{}\n</div>", link)
    }

    /// Escaped display title of a page with its position, e.g. `Intro(0/4)`
    pub fn image_title(&self, slide_number: usize, raw_title: &str) -> String {
        let mut title = escape_html(&unescape_title(raw_title));
        title.push_str(&format!(
            "({}/{})",
            slide_number,
            self.slide_size() as isize - 1
        ));
        title
    }

    /// `src` of a slide image
    pub fn image_src(&self, slide_number: usize, optional: Option<&str>) -> String {
        url_encode(&basename(&self.image_filename(slide_number, optional)))
    }

    /// Href of a page in a given mode, whatever mode is being output
    pub fn href_in(&self, mode: RenderMode, slide_number: usize) -> String {
        self.with_outputting(mode, || self.href(slide_number))
    }
}

/// Link provider handed to decks while they render HTML bodies
pub struct PageLinks<'a> {
    pub navigator: &'a Navigator,
    /// Raw slide-mode titles, indexed by slide number
    pub slide_titles: &'a [String],
}

impl HtmlLinks for PageLinks<'_> {
    fn slide_href(&self, slide_number: usize) -> String {
        self.navigator.href_in(RenderMode::Slide, slide_number)
    }

    fn index_href(&self, slide_number: usize) -> String {
        self.navigator.href_in(RenderMode::Index, slide_number)
    }

    fn image_src(&self, slide_number: usize, optional: Option<&str>) -> String {
        self.navigator.with_outputting(RenderMode::Slide, || {
            self.navigator.image_src(slide_number, optional)
        })
    }

    fn slide_image_title(&self, slide_number: usize) -> String {
        let raw = self
            .slide_titles
            .get(slide_number)
            .map(String::as_str)
            .unwrap_or("");
        self.navigator.with_outputting(RenderMode::Slide, || {
            self.navigator.image_title(slide_number, raw)
        })
    }
}
