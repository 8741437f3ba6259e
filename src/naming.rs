// ABOUTME: Filename synthesis for exported slide pages, images and the feed
// ABOUTME: Keeps slide-mode and index-mode names zero-padded, stable and collision free

use crate::deck::RenderMode;
use crate::utils;
use std::path::{Path, PathBuf};

/// Suffix used for every HTML page
pub const HTML_SUFFIX: &str = "html";

/// Name of the feed document inside the base directory
pub const RSS_FILENAME: &str = "index.rdf";

/// Number of decimal digits needed to print `num`
pub fn number_of_places(num: usize) -> usize {
    let mut places = 1;
    let mut target = num;
    while target >= 10 {
        target /= 10;
        places += 1;
    }
    places
}

/// Normalize an image type into the name image encoders expect
pub fn normalize_image_type(image_type: &str) -> String {
    let lower = image_type.to_lowercase();
    if lower.contains("jpg") {
        "jpeg".to_string()
    } else {
        lower
    }
}

/// Naming rules for one export run.
///
/// Names are built as UTF-8 strings; use [`FilenameScheme::path`] to get the
/// on-disk path in the platform's filename encoding.
#[derive(Clone, Debug)]
pub struct FilenameScheme {
    base_name: String,
    base_dir: String,
    image_type: String,
    slide_size: usize,
    index_slide_size: usize,
}

impl FilenameScheme {
    /// `base_name` may include a directory, e.g. `site/slide`
    pub fn new(base_name: &str, image_type: &str) -> Self {
        let base_dir = match Path::new(base_name).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
            _ => ".".to_string(),
        };
        Self {
            base_name: base_name.to_string(),
            base_dir,
            image_type: normalize_image_type(image_type),
            slide_size: 0,
            index_slide_size: 0,
        }
    }

    /// Record the page counts sampled for each mode
    pub fn with_sizes(mut self, slide_size: usize, index_slide_size: usize) -> Self {
        self.slide_size = slide_size;
        self.index_slide_size = index_slide_size;
        self
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn image_type(&self) -> &str {
        &self.image_type
    }

    /// Page count of a mode
    pub fn size(&self, mode: RenderMode) -> usize {
        match mode {
            RenderMode::Slide => self.slide_size,
            RenderMode::Index => self.index_slide_size,
        }
    }

    /// Zero-padding width used for a mode's page numbers
    pub fn places(&self, mode: RenderMode) -> usize {
        number_of_places(self.size(mode))
    }

    /// `<base>[-index]<NNN>[-optional].<suffix>`
    pub fn make_filename(
        &self,
        mode: RenderMode,
        slide_number: usize,
        suffix: &str,
        optional: Option<&str>,
    ) -> String {
        let mut name = self.base_name.clone();
        if mode.is_index() {
            name.push_str("-index");
        }
        name.push_str(&format!(
            "{:0width$}",
            slide_number,
            width = self.places(mode)
        ));
        if let Some(optional) = optional {
            name.push('-');
            name.push_str(optional);
        }
        name.push('.');
        name.push_str(suffix);
        name
    }

    /// HTML page of a slide; slide-mode page 0 is the site's `index.html`
    pub fn slide_filename(&self, mode: RenderMode, slide_number: usize) -> String {
        if !mode.is_index() && slide_number == 0 {
            join(&self.base_dir, &format!("index.{}", HTML_SUFFIX))
        } else {
            self.make_filename(mode, slide_number, HTML_SUFFIX, None)
        }
    }

    /// Image of a slide
    pub fn image_filename(
        &self,
        mode: RenderMode,
        slide_number: usize,
        optional: Option<&str>,
    ) -> String {
        self.make_filename(mode, slide_number, &self.image_type, optional)
    }

    /// Location of the feed document
    pub fn rss_filename(&self) -> String {
        join(&self.base_dir, RSS_FILENAME)
    }

    /// Convert a generated name into an on-disk path
    pub fn path(&self, name: &str) -> PathBuf {
        utils::to_filename_encoding(name)
    }

    /// Output directory as an on-disk path
    pub fn base_dir_path(&self) -> PathBuf {
        utils::to_filename_encoding(&self.base_dir)
    }
}

/// Final path component of a generated name
pub fn basename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

fn join(dir: &str, name: &str) -> String {
    Path::new(dir).join(name).to_string_lossy().into_owned()
}
