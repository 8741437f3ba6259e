// ABOUTME: RSS 1.0 feed generation for exported decks
// ABOUTME: Builds the index.rdf document from per-page entries, rewriting relative links

use crate::errors::{ExportError, Result};
use crate::naming::{RSS_FILENAME, basename};
use crate::utils::url_encode;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::info;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs;
use std::io::Write;
use std::path::Path;

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const RSS_NS: &str = "http://purl.org/rss/1.0/";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Metadata recorded for one exported page
#[derive(Clone, Debug, PartialEq)]
pub struct RssEntry {
    pub filename: String,
    pub title: String,
    /// Plain-text summary
    pub text: String,
    /// Rendered HTML body
    pub html: String,
}

/// Make sure a base URI ends with exactly one slash
pub fn normalize_base_uri(uri: &str) -> String {
    format!("{}/", uri.trim_end_matches('/'))
}

/// Prefix every relative `href=` and `src=` value with `base_uri`.
///
/// Values containing a `:` are treated as absolute and left alone, as are
/// empty and unquoted values.
pub fn normalize_html_reference(html: &str, base_uri: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut rest = html;

    while let Some((pos, len)) = find_reference(rest) {
        let value_start = pos + len;
        result.push_str(&rest[..value_start]);
        rest = &rest[value_start..];

        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => continue,
        };
        let Some(end) = rest[1..].find(quote) else {
            continue;
        };
        let value = &rest[1..1 + end];
        if value.is_empty() || value.contains(':') {
            continue;
        }

        result.push(quote);
        result.push_str(base_uri);
        result.push_str(value);
        result.push(quote);
        rest = &rest[end + 2..];
    }
    result.push_str(rest);
    result
}

/// Position and length of the next `href=` or `src=`
fn find_reference(text: &str) -> Option<(usize, usize)> {
    let href = text.find("href=").map(|pos| (pos, "href=".len()));
    let src = text.find("src=").map(|pos| (pos, "src=".len()));
    match (href, src) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Builds the feed document for one export run
#[derive(Clone, Debug)]
pub struct FeedBuilder {
    base_uri: String,
}

impl FeedBuilder {
    pub fn new(base_uri: &str) -> Self {
        Self {
            base_uri: normalize_base_uri(base_uri),
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Public location of the feed document
    pub fn rss_uri(&self) -> String {
        format!("{}{}", self.base_uri, RSS_FILENAME)
    }

    /// `<link>` tag advertising the feed from a page head
    pub fn link_tag(&self) -> String {
        format!(
            "<link rel=\"alternate\" type=\"application/rss+xml\" title=\"RSS\" href=\"{}\" />",
            crate::utils::escape_html(&self.rss_uri())
        )
    }

    /// Build the feed and write it to `path`
    pub fn write(&self, entries: &[RssEntry], path: &Path) -> Result<()> {
        let document = self.build(entries, Utc::now())?;
        fs::write(path, document)?;
        info!("RSS feed written: {:?} ({} items)", path, entries.len());
        Ok(())
    }

    /// Build the feed document with `now` as the channel date
    #[cfg(feature = "feed")]
    pub fn build(&self, entries: &[RssEntry], now: DateTime<Utc>) -> Result<String> {
        let channel = entries
            .first()
            .ok_or_else(|| ExportError::FeedUnavailable("no pages were exported".to_string()))?;

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("rdf:RDF").with_attributes([
            ("xmlns", RSS_NS),
            ("xmlns:rdf", RDF_NS),
            ("xmlns:dc", DC_NS),
            ("xmlns:content", CONTENT_NS),
        ])))?;

        let links: Vec<String> = entries.iter().map(|entry| self.item_link(entry)).collect();

        let about = self.rss_uri();
        writer.write_event(Event::Start(
            BytesStart::new("channel").with_attributes([("rdf:about", about.as_str())]),
        ))?;
        text_element(&mut writer, "title", &channel.title)?;
        text_element(&mut writer, "link", &self.base_uri)?;
        text_element(&mut writer, "description", &channel.text)?;
        text_element(&mut writer, "dc:date", &w3c_date(now))?;
        writer.write_event(Event::Start(BytesStart::new("items")))?;
        writer.write_event(Event::Start(BytesStart::new("rdf:Seq")))?;
        for link in &links {
            writer.write_event(Event::Empty(
                BytesStart::new("rdf:li").with_attributes([("rdf:resource", link.as_str())]),
            ))?;
        }
        writer.write_event(Event::End(BytesEnd::new("rdf:Seq")))?;
        writer.write_event(Event::End(BytesEnd::new("items")))?;
        writer.write_event(Event::End(BytesEnd::new("channel")))?;

        for (i, (entry, link)) in entries.iter().zip(&links).enumerate() {
            // Strictly decreasing dates keep readers that sort by date in order
            let date = now - Duration::seconds(i as i64);
            writer.write_event(Event::Start(
                BytesStart::new("item").with_attributes([("rdf:about", link.as_str())]),
            ))?;
            text_element(&mut writer, "title", &entry.title)?;
            text_element(&mut writer, "link", link)?;
            text_element(&mut writer, "description", &entry.text)?;
            text_element(
                &mut writer,
                "content:encoded",
                &normalize_html_reference(&entry.html, &self.base_uri),
            )?;
            text_element(&mut writer, "dc:date", &w3c_date(date))?;
            writer.write_event(Event::End(BytesEnd::new("item")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("rdf:RDF")))?;

        let mut document = writer.into_inner();
        document.push(b'\n');
        String::from_utf8(document)
            .map_err(|e| ExportError::FeedUnavailable(format!("Feed is not UTF-8: {}", e)))
    }

    /// Build the feed document with `now` as the channel date
    #[cfg(not(feature = "feed"))]
    pub fn build(&self, _entries: &[RssEntry], _now: DateTime<Utc>) -> Result<String> {
        Err(ExportError::FeedUnavailable(
            "built without the `feed` feature".to_string(),
        ))
    }

    fn item_link(&self, entry: &RssEntry) -> String {
        format!("{}{}", self.base_uri, url_encode(&basename(&entry.filename)))
    }
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// W3C-DTF timestamp as used by Dublin Core dates
pub fn w3c_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}
