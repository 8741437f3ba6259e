// ABOUTME: Utility functions for the big-export application
// ABOUTME: Provides path validation, filename encoding and HTML/URL escaping helpers

use crate::errors::{ExportError, Result};
use encoding_rs::Encoding;
use log::{debug, warn};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use std::env;
use std::path::{Path, PathBuf};

/// Characters left untouched when a filename is used inside an href
const HREF_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Environment variable naming the charset used for on-disk filenames
pub const FILENAME_ENCODING_VAR: &str = "BIG_FILENAME_ENCODING";

/// Validate that a file exists
pub fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ExportError::PathNotFoundError(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ExportError::ValidationError(format!(
            "Path is not a file: {:?}",
            path
        )));
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(ExportError::ValidationError(format!(
            "Path exists but is not a directory: {:?}",
            path
        )));
    }
    Ok(())
}

/// Validate write permissions for a directory
pub fn validate_directory_writable(path: &Path) -> Result<()> {
    ensure_directory_exists(path)?;

    // Try to create a temporary file to test write permissions
    let test_file = path.join(format!("test_write_{}.tmp", uuid::Uuid::new_v4()));
    match std::fs::File::create(&test_file) {
        Ok(_) => {
            if let Err(e) = std::fs::remove_file(&test_file) {
                warn!("Failed to clean up test file {:?}: {}", test_file, e);
            }
            Ok(())
        }
        Err(e) => Err(ExportError::ValidationError(format!(
            "Directory is not writable: {:?} - {}",
            path, e
        ))),
    }
}

/// Get the absolute path
pub fn get_absolute_path(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| {
        ExportError::ValidationError(format!("Failed to get absolute path for {:?}: {}", path, e))
    })
}

/// Convert a UTF-8 filename into the platform's filename encoding.
///
/// Resolution order: an explicit `BIG_FILENAME_ENCODING` charset, then the
/// charset of the current locale, then plain UTF-8.
pub fn to_filename_encoding(utf8_filename: &str) -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(encoding) = filename_encoding() {
            if encoding != encoding_rs::UTF_8 {
                let (bytes, _, had_errors) = encoding.encode(utf8_filename);
                if !had_errors {
                    use std::os::unix::ffi::OsStrExt;
                    return PathBuf::from(std::ffi::OsStr::from_bytes(&bytes));
                }
                warn!(
                    "Filename {:?} can't be represented in {}, keeping UTF-8",
                    utf8_filename,
                    encoding.name()
                );
            }
        }
    }

    // Windows paths are UTF-16 natively, so the conversion is done by std
    PathBuf::from(utf8_filename)
}

/// Charset used for filenames on this system, if it is not plain UTF-8
pub fn filename_encoding() -> Option<&'static Encoding> {
    // Explicit setting first; `@locale` defers to the locale
    if let Ok(value) = env::var(FILENAME_ENCODING_VAR) {
        let first = value.split(',').next().unwrap_or("").trim();
        if !first.is_empty() && first != "@locale" {
            match Encoding::for_label(first.as_bytes()) {
                Some(encoding) => return Some(encoding),
                None => warn!("Unknown filename encoding {:?}, ignoring", first),
            }
        }
    }

    locale_encoding()
}

/// Charset named by the current locale (LC_ALL, LC_CTYPE, LANG)
fn locale_encoding() -> Option<&'static Encoding> {
    let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.is_empty())?;

    let charset = locale_charset(&locale)?;
    let encoding = charset_encoding(charset);
    match encoding {
        Some(encoding) => debug!("Locale {:?} uses filename charset {}", locale, encoding.name()),
        None => warn!(
            "Unknown charset {:?} in locale {:?}, keeping UTF-8 filenames",
            charset, locale
        ),
    }
    encoding
}

/// Resolve a locale codeset, accepting the glibc spellings such as `eucJP`
pub fn charset_encoding(charset: &str) -> Option<&'static Encoding> {
    if let Some(encoding) = Encoding::for_label(charset.as_bytes()) {
        return Some(encoding);
    }

    let lower = charset.to_ascii_lowercase();
    let label = match lower.as_str() {
        "euccn" | "euc-cn" => "gb2312".to_string(),
        "sjis" | "shiftjis" => "shift_jis".to_string(),
        "big5hkscs" => "big5-hkscs".to_string(),
        _ => match lower.strip_prefix("euc") {
            Some(rest) if !rest.starts_with('-') => format!("euc-{}", rest),
            _ => return None,
        },
    };
    Encoding::for_label(label.as_bytes())
}

/// Extract the charset part of a locale name such as `ja_JP.EUC-JP@euro`
pub fn locale_charset(locale: &str) -> Option<&str> {
    let (_, rest) = locale.split_once('.')?;
    let charset = rest.split('@').next().unwrap_or(rest);
    if charset.is_empty() {
        None
    } else {
        Some(charset)
    }
}

/// Escape text for embedding into HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encode a filename for use in an href or src attribute.
///
/// The name is converted to the filename encoding first, so the link names
/// the bytes actually written to disk.
pub fn url_encode(name: &str) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        let on_disk = to_filename_encoding(name);
        percent_encoding::percent_encode(on_disk.as_os_str().as_bytes(), HREF_SAFE).to_string()
    }

    #[cfg(not(unix))]
    {
        percent_encoding::utf8_percent_encode(name, HREF_SAFE).to_string()
    }
}

/// Undo the backslash escapes slide titles carry in deck markup.
///
/// `\x` becomes `x`, and line breaks become single spaces.
pub fn unescape_title(title: &str) -> String {
    let mut result = String::with_capacity(title.len());
    let mut chars = title.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => result.push(' '),
                Some(next) => result.push(next),
                None => result.push('\\'),
            },
            '\r' => {}
            '\n' => result.push(' '),
            _ => result.push(c),
        }
    }
    result
}
