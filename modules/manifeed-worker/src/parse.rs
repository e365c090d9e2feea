use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

use manifeed_common::payloads::FeedSource;
use manifeed_common::time::parse_datetime;

static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid regex"));
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
static PUNCT_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").expect("valid regex"));

const ENTRY_PUBLISHED_AT_FIELDS: &[&str] = &["pubdate", "published", "updated", "date"];
const LAST_MODIFIED_FIELDS: &[&str] = &["updated", "lastbuilddate", "pubdate"];
const RSS_LAST_MODIFIED_FIELDS: &[&str] = &["lastbuilddate", "pubdate", "updated"];

#[derive(Error, Debug)]
pub enum FeedParseError {
    #[error("Empty feed content")]
    Empty,

    #[error("Invalid XML: {0}")]
    InvalidXml(String),
}

/// Parse RSS/Atom content into raw feed sources plus the channel-level
/// last-modified timestamp. Entries without a title or URL are skipped;
/// normalization (dedup, floor rule) happens downstream.
pub fn parse_feed_entries(
    content: &str,
) -> Result<(Vec<FeedSource>, Option<DateTime<Utc>>), FeedParseError> {
    if content.trim().is_empty() {
        return Err(FeedParseError::Empty);
    }

    let root = read_document(content)?;
    let last_modified = extract_last_modified(&root);
    let entries = extract_entry_nodes(&root)
        .into_iter()
        .filter_map(extract_entry_payload)
        .collect();
    Ok((entries, last_modified))
}

// --- Permissive element tree ---
//
// Matching is on lowercased local names, so namespaces, prefixes, and tag
// case never matter. Attribute keys get the same treatment.

#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn first_child(&self, names: &[&str]) -> Option<&XmlElement> {
        self.children
            .iter()
            .find(|child| names.contains(&child.name.as_str()))
    }

    /// First non-blank collected text among children with one of `names`.
    fn first_text(&self, names: &[&str]) -> Option<String> {
        for child in &self.children {
            if !names.contains(&child.name.as_str()) {
                continue;
            }
            if let Some(text) = clean_text(&child.collected_text()) {
                return Some(text);
            }
        }
        None
    }

    /// All text content of this element and its descendants.
    fn collected_text(&self) -> String {
        let mut out = String::new();
        self.collect_text_into(&mut out);
        out
    }

    fn collect_text_into(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.children {
            child.collect_text_into(out);
        }
    }

    /// Pre-order descendants, excluding this element.
    fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        for child in &self.children {
            child.push_subtree(&mut out);
        }
        out
    }

    fn push_subtree<'a>(&'a self, out: &mut Vec<&'a XmlElement>) {
        out.push(self);
        for child in &self.children {
            child.push_subtree(out);
        }
    }
}

fn read_document(content: &str) -> Result<XmlElement, FeedParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().check_end_names = false;

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut roots: Vec<XmlElement> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(element_from_tag(&start));
            }
            Ok(Event::Empty(start)) => {
                attach(element_from_tag(&start), &mut stack, &mut roots);
            }
            Ok(Event::End(_)) => {
                if let Some(element) = stack.pop() {
                    attach(element, &mut stack, &mut roots);
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    match text.unescape() {
                        Ok(unescaped) => current.text.push_str(&unescaped),
                        Err(_) => current
                            .text
                            .push_str(&String::from_utf8_lossy(text.as_ref())),
                    }
                }
            }
            Ok(Event::CData(cdata)) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(FeedParseError::InvalidXml(err.to_string())),
        }
    }

    // Unclosed elements at EOF still attach, outermost last.
    while let Some(element) = stack.pop() {
        attach(element, &mut stack, &mut roots);
    }

    roots
        .into_iter()
        .next()
        .ok_or_else(|| FeedParseError::InvalidXml("no root element".to_string()))
}

fn element_from_tag(start: &quick_xml::events::BytesStart<'_>) -> XmlElement {
    let name = local_name(&String::from_utf8_lossy(start.name().as_ref()));
    let mut attrs = Vec::new();
    for attr in start.attributes().with_checks(false).flatten() {
        let key = local_name(&String::from_utf8_lossy(attr.key.as_ref()));
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push((key, value));
    }
    XmlElement {
        name,
        attrs,
        text: String::new(),
        children: Vec::new(),
    }
}

fn attach(element: XmlElement, stack: &mut Vec<XmlElement>, roots: &mut Vec<XmlElement>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => roots.push(element),
    }
}

fn local_name(tag: &str) -> String {
    let after_brace = tag.rsplit('}').next().unwrap_or(tag);
    let after_colon = after_brace.rsplit(':').next().unwrap_or(after_brace);
    after_colon.to_ascii_lowercase()
}

// --- Entry extraction ---

fn extract_entry_nodes(root: &XmlElement) -> Vec<&XmlElement> {
    match root.name.as_str() {
        "rss" => match root.first_child(&["channel"]) {
            Some(channel) => channel
                .children
                .iter()
                .filter(|child| child.name == "item")
                .collect(),
            None => Vec::new(),
        },
        "feed" => root
            .children
            .iter()
            .filter(|child| child.name == "entry")
            .collect(),
        _ => root
            .descendants()
            .into_iter()
            .filter(|node| node.name == "item" || node.name == "entry")
            .collect(),
    }
}

fn extract_last_modified(root: &XmlElement) -> Option<DateTime<Utc>> {
    if root.name == "rss" {
        if let Some(channel) = root.first_child(&["channel"]) {
            if let Some(last_modified) = parse_first_datetime(channel, RSS_LAST_MODIFIED_FIELDS) {
                return Some(last_modified);
            }
        }
    }
    parse_first_datetime(root, LAST_MODIFIED_FIELDS)
}

fn extract_entry_payload(entry: &XmlElement) -> Option<FeedSource> {
    let title = entry.first_text(&["title"])?;
    let url = extract_entry_url(entry)?;

    Some(FeedSource {
        title,
        url,
        summary: extract_entry_summary(entry),
        author: extract_entry_author(entry),
        published_at: parse_first_datetime(entry, ENTRY_PUBLISHED_AT_FIELDS),
        image_url: extract_entry_image_url(entry),
    })
}

fn extract_entry_url(entry: &XmlElement) -> Option<String> {
    if let Some(link_text) = entry.first_text(&["link"]) {
        return Some(link_text);
    }

    // Atom-style links: prefer rel="alternate" (or no rel), keep the first
    // other href as a fallback.
    let mut fallback_url = None;
    for link in &entry.children {
        if link.name != "link" {
            continue;
        }
        let Some(href) = link.attr("href").and_then(clean_text) else {
            continue;
        };
        match link.attr("rel").and_then(clean_text) {
            None => return Some(href),
            Some(rel) if rel == "alternate" => return Some(href),
            Some(_) => {
                if fallback_url.is_none() {
                    fallback_url = Some(href);
                }
            }
        }
    }
    fallback_url
}

fn extract_entry_summary(entry: &XmlElement) -> Option<String> {
    if let Some(summary) = entry.first_text(&["summary", "description"]) {
        return Some(summary);
    }
    for field_name in ["encoded", "content"] {
        if let Some(summary) = strip_html_text(entry.first_text(&[field_name]).as_deref()) {
            return Some(summary);
        }
    }
    None
}

fn extract_entry_author(entry: &XmlElement) -> Option<String> {
    if let Some(author_node) = entry.first_child(&["author"]) {
        if let Some(name) = strip_html_text(author_node.first_text(&["name"]).as_deref()) {
            return Some(name);
        }
        if let Some(inline) = strip_html_text(Some(&author_node.collected_text())) {
            return Some(inline);
        }
    }
    for field_name in ["creator", "author"] {
        if let Some(author) = strip_html_text(entry.first_text(&[field_name]).as_deref()) {
            return Some(author);
        }
    }
    None
}

fn parse_first_datetime(node: &XmlElement, field_names: &[&str]) -> Option<DateTime<Utc>> {
    for field_name in field_names {
        if let Some(parsed) = node.first_text(&[field_name]).and_then(|t| parse_datetime(&t)) {
            return Some(parsed);
        }
    }
    None
}

// --- Image candidate selection ---
//
// Candidates are gathered from media nodes, inline <img> elements, and image
// tags inside HTML-bearing text fields. The candidate with the greatest
// known width wins (height breaks ties); otherwise the first one seen.

struct ImageCandidates {
    candidates: Vec<(String, Option<u32>, Option<u32>)>,
    seen: HashMap<String, usize>,
}

impl ImageCandidates {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            seen: HashMap::new(),
        }
    }

    fn add(
        &mut self,
        image_url: Option<&str>,
        width: Option<&str>,
        height: Option<&str>,
        srcset: Option<&str>,
    ) {
        if let Some(cleaned_url) = image_url.map(decode_entities).as_deref().and_then(clean_text) {
            let (query_width, query_height) = dimensions_from_query(&cleaned_url);
            let candidate_width = max_dimension(width.and_then(parse_dimension), query_width);
            let candidate_height = max_dimension(height.and_then(parse_dimension), query_height);

            match self.seen.get(&cleaned_url) {
                Some(&index) => {
                    let existing = &mut self.candidates[index];
                    existing.1 = max_dimension(existing.1, candidate_width);
                    existing.2 = max_dimension(existing.2, candidate_height);
                }
                None => {
                    self.seen.insert(cleaned_url.clone(), self.candidates.len());
                    self.candidates
                        .push((cleaned_url, candidate_width, candidate_height));
                }
            }
        }

        let Some(cleaned_srcset) = srcset.map(decode_entities).as_deref().and_then(clean_text)
        else {
            return;
        };
        for raw_candidate in cleaned_srcset.split(',') {
            let Some(cleaned_candidate) = clean_text(raw_candidate) else {
                continue;
            };
            let mut parts = cleaned_candidate.splitn(2, char::is_whitespace);
            let Some(candidate_url) = parts.next() else {
                continue;
            };
            let descriptor_width = parts.next().and_then(parse_srcset_width);
            self.add(
                Some(candidate_url),
                descriptor_width.map(|w| w.to_string()).as_deref(),
                height,
                None,
            );
        }
    }

    fn add_from_html(&mut self, value: Option<&str>) {
        let Some(html) = value.and_then(clean_text) else {
            return;
        };
        for image_tag in IMG_TAG_RE.find_iter(&html) {
            let tag = image_tag.as_str();
            self.add(
                extract_html_attribute(tag, "src").as_deref(),
                extract_html_attribute(tag, "width").as_deref(),
                extract_html_attribute(tag, "height").as_deref(),
                extract_html_attribute(tag, "srcset").as_deref(),
            );
        }
    }

    fn best(self) -> Option<String> {
        let best_with_width = self
            .candidates
            .iter()
            .filter(|(_, width, _)| width.is_some())
            .max_by_key(|(_, width, height)| (width.unwrap_or(0), height.unwrap_or(0)));
        if let Some((url, _, _)) = best_with_width {
            return Some(url.clone());
        }
        self.candidates.into_iter().next().map(|(url, _, _)| url)
    }
}

fn extract_entry_image_url(entry: &XmlElement) -> Option<String> {
    let mut candidates = ImageCandidates::new();

    for node in entry.descendants() {
        match node.name.as_str() {
            "img" => candidates.add(
                node.attr("src"),
                node.attr("width"),
                node.attr("height"),
                node.attr("srcset"),
            ),
            "thumbnail" | "content" | "enclosure" | "image" => candidates.add(
                node.attr("url").or_else(|| node.attr("href")),
                node.attr("width"),
                node.attr("height"),
                node.attr("srcset"),
            ),
            "link" => {
                let is_image_enclosure = node.attr("rel").map(str::trim) == Some("enclosure")
                    && node
                        .attr("type")
                        .is_some_and(|t| t.trim().starts_with("image/"));
                if is_image_enclosure {
                    candidates.add(node.attr("href"), None, None, None);
                }
            }
            _ => {}
        }
    }

    for field_name in ["encoded", "content", "description", "summary"] {
        candidates.add_from_html(entry.first_text(&[field_name]).as_deref());
    }

    candidates.best()
}

fn extract_html_attribute(tag: &str, attribute_name: &str) -> Option<String> {
    static SRC_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("src"));
    static WIDTH_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("width"));
    static HEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("height"));
    static SRCSET_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("srcset"));

    let pattern: &Regex = match attribute_name {
        "src" => &SRC_RE,
        "width" => &WIDTH_RE,
        "height" => &HEIGHT_RE,
        "srcset" => &SRCSET_RE,
        _ => return None,
    };

    let captures = pattern.captures(tag)?;
    for group in [1, 2, 3] {
        if let Some(value) = captures.get(group) {
            return clean_text(&decode_entities(value.as_str()));
        }
    }
    None
}

fn attr_regex(attribute_name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)\b{attribute_name}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#
    ))
    .expect("valid attribute regex")
}

fn dimensions_from_query(image_url: &str) -> (Option<u32>, Option<u32>) {
    let Some(query_start) = image_url.find('?') else {
        return (None, None);
    };
    let query = &image_url[query_start + 1..];
    let query = query.split('#').next().unwrap_or(query);

    let mut width = None;
    let mut height = None;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "w" | "width" => width = max_dimension(width, parse_dimension(value)),
            "h" | "height" => height = max_dimension(height, parse_dimension(value)),
            _ => {}
        }
    }
    (width, height)
}

fn parse_srcset_width(descriptor: &str) -> Option<u32> {
    let descriptor = clean_text(descriptor)?.to_ascii_lowercase();
    let stripped = descriptor.strip_suffix('w')?;
    parse_dimension(stripped)
}

fn parse_dimension(value: &str) -> Option<u32> {
    let digits = DIGITS_RE.find(value)?;
    let parsed: u32 = digits.as_str().parse().ok()?;
    if parsed == 0 {
        None
    } else {
        Some(parsed)
    }
}

fn max_dimension(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (value, None) | (None, value) => value,
    }
}

// --- Text helpers ---

fn clean_text(value: &str) -> Option<String> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Drop HTML tags from a text field, keeping readable spacing.
fn strip_html_text(value: Option<&str>) -> Option<String> {
    let cleaned = clean_text(value?)?;
    let decoded = decode_entities(&cleaned);
    let without_tags = HTML_TAG_RE.replace_all(&decoded, " ");
    let collapsed = without_tags.split_whitespace().collect::<Vec<_>>().join(" ");
    let tightened = PUNCT_SPACE_RE.replace_all(&collapsed, "$1");
    clean_text(&tightened)
}

/// Decode the HTML entities that appear in feed markup: the named core set
/// plus numeric references.
fn decode_entities(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';') {
            Some(semi) if semi > 1 && semi <= 12 => {
                let entity = &tail[1..semi];
                match decode_entity(entity) {
                    Some(decoded) => out.push_str(&decoded),
                    None => out.push_str(&tail[..=semi]),
                }
                rest = &tail[semi + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<String> {
    match entity {
        "amp" => return Some("&".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "quot" => return Some("\"".to_string()),
        "apos" => return Some("'".to_string()),
        "nbsp" => return Some(" ".to_string()),
        _ => {}
    }
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse().ok()?
    } else {
        return None;
    };
    char::from_u32(code).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example News</title>
    <lastBuildDate>Sun, 01 Feb 2026 08:00:00 GMT</lastBuildDate>
    <item>
      <title>First article</title>
      <link>https://example.com/a</link>
      <description>Summary of the first article</description>
      <dc:creator>Jane Doe</dc:creator>
      <pubDate>Sun, 01 Feb 2026 07:30:00 GMT</pubDate>
    </item>
    <item>
      <title>No link here</title>
      <description>Dropped</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <updated>2026-02-02T12:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <link rel="self" href="https://example.com/self"/>
    <link rel="alternate" href="https://example.com/entry"/>
    <author><name>Alice</name></author>
    <published>2026-02-02T11:00:00Z</published>
    <content type="html">&lt;p&gt;Hello &amp;amp; welcome&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn rejects_empty_content() {
        assert!(matches!(parse_feed_entries("   "), Err(FeedParseError::Empty)));
    }

    #[test]
    fn rejects_content_without_elements() {
        assert!(matches!(
            parse_feed_entries("just text, no markup"),
            Err(FeedParseError::InvalidXml(_))
        ));
    }

    #[test]
    fn parses_rss_items_and_channel_last_modified() {
        let (entries, last_modified) = parse_feed_entries(RSS_SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "First article");
        assert_eq!(entries[0].url, "https://example.com/a");
        assert_eq!(entries[0].summary.as_deref(), Some("Summary of the first article"));
        assert_eq!(entries[0].author.as_deref(), Some("Jane Doe"));
        assert_eq!(
            entries[0].published_at.unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 7, 30, 0).unwrap()
        );
        assert_eq!(
            last_modified.unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn parses_atom_entries_preferring_alternate_links() {
        let (entries, last_modified) = parse_feed_entries(ATOM_SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/entry");
        assert_eq!(entries[0].author.as_deref(), Some("Alice"));
        assert_eq!(entries[0].summary.as_deref(), Some("Hello & welcome"));
        assert_eq!(
            last_modified.unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn atom_link_without_rel_wins_over_other_rels() {
        let xml = r#"<feed><entry>
            <title>T</title>
            <link rel="self" href="https://example.com/self"/>
            <link href="https://example.com/plain"/>
        </entry></feed>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(entries[0].url, "https://example.com/plain");
    }

    #[test]
    fn falls_back_to_any_item_descendants() {
        let xml = r#"<rdf><whatever><item>
            <title>Deep item</title>
            <link>https://example.com/deep</link>
        </item></whatever></rdf>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/deep");
    }

    #[test]
    fn media_thumbnail_with_explicit_width_wins() {
        let xml = r#"<rss><channel><item xmlns:media="http://search.yahoo.com/mrss/">
            <title>T</title>
            <link>https://example.com/a</link>
            <media:thumbnail url="https://img.example.com/small.jpg" width="150"/>
            <media:thumbnail url="https://img.example.com/large.jpg" width="960" height="540"/>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(
            entries[0].image_url.as_deref(),
            Some("https://img.example.com/large.jpg")
        );
    }

    #[test]
    fn image_width_from_query_parameters() {
        let xml = r#"<rss><channel><item>
            <title>T</title>
            <link>https://example.com/a</link>
            <enclosure url="https://img.example.com/a.jpg?w=320" type="image/jpeg"/>
            <enclosure url="https://img.example.com/b.jpg?width=1200" type="image/jpeg"/>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(
            entries[0].image_url.as_deref(),
            Some("https://img.example.com/b.jpg?width=1200")
        );
    }

    #[test]
    fn srcset_descriptor_widths_are_parsed() {
        let xml = r#"<rss><channel><item>
            <title>T</title>
            <link>https://example.com/a</link>
            <description>&lt;img src="https://img.example.com/base.jpg" srcset="https://img.example.com/s.jpg 480w, https://img.example.com/l.jpg 1600w"&gt;</description>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(
            entries[0].image_url.as_deref(),
            Some("https://img.example.com/l.jpg")
        );
    }

    #[test]
    fn first_candidate_wins_without_dimensions() {
        let xml = r#"<rss><channel><item>
            <title>T</title>
            <link>https://example.com/a</link>
            <media:content xmlns:media="http://search.yahoo.com/mrss/" url="https://img.example.com/one.jpg"/>
            <media:content xmlns:media="http://search.yahoo.com/mrss/" url="https://img.example.com/two.jpg"/>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(
            entries[0].image_url.as_deref(),
            Some("https://img.example.com/one.jpg")
        );
    }

    #[test]
    fn link_rel_enclosure_image_is_a_candidate() {
        let xml = r#"<feed><entry>
            <title>T</title>
            <link rel="alternate" href="https://example.com/entry"/>
            <link rel="enclosure" type="image/png" href="https://img.example.com/cover.png"/>
        </entry></feed>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(
            entries[0].image_url.as_deref(),
            Some("https://img.example.com/cover.png")
        );
    }

    #[test]
    fn duplicate_candidate_urls_merge_dimensions() {
        let xml = r#"<rss><channel><item>
            <title>T</title>
            <link>https://example.com/a</link>
            <media:thumbnail xmlns:media="http://search.yahoo.com/mrss/" url="https://img.example.com/x.jpg"/>
            <media:content xmlns:media="http://search.yahoo.com/mrss/" url="https://img.example.com/x.jpg" width="800"/>
            <media:content xmlns:media="http://search.yahoo.com/mrss/" url="https://img.example.com/y.jpg" width="400"/>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(
            entries[0].image_url.as_deref(),
            Some("https://img.example.com/x.jpg")
        );
    }

    #[test]
    fn summary_falls_back_to_stripped_content() {
        let xml = r#"<rss xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel><item>
            <title>T</title>
            <link>https://example.com/a</link>
            <content:encoded><![CDATA[<p>Plain <b>bold</b> text , done.</p>]]></content:encoded>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(entries[0].summary.as_deref(), Some("Plain bold text, done."));
    }

    #[test]
    fn author_falls_back_from_name_to_inline_to_creator() {
        let inline = r#"<rss><channel><item>
            <title>T</title><link>https://e.com/a</link>
            <author>editor@example.com (Ed Itor)</author>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(inline).unwrap();
        assert_eq!(entries[0].author.as_deref(), Some("editor@example.com (Ed Itor)"));
    }

    #[test]
    fn entry_date_field_priority() {
        let xml = r#"<feed><entry>
            <title>T</title>
            <link rel="alternate" href="https://e.com/a"/>
            <updated>2026-03-01T00:00:00Z</updated>
            <published>2026-02-01T00:00:00Z</published>
        </entry></feed>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        // published outranks updated
        assert_eq!(
            entries[0].published_at.unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn naive_entry_dates_are_coerced_to_utc() {
        let xml = r#"<rss><channel><item>
            <title>T</title><link>https://e.com/a</link>
            <pubDate>2026-02-01T09:00:00</pubDate>
        </item></channel></rss>"#;
        let (entries, _) = parse_feed_entries(xml).unwrap();
        assert_eq!(
            entries[0].published_at.unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn decode_entities_handles_named_and_numeric() {
        assert_eq!(decode_entities("a &amp; b &#233; &#x41;"), "a & b é A");
        assert_eq!(decode_entities("no entities"), "no entities");
        assert_eq!(decode_entities("dangling &"), "dangling &");
    }
}
