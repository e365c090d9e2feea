use chrono::{DateTime, TimeZone, Utc};

use manifeed_common::payloads::FeedSource;

/// Launch cutoff for ingested articles. Entries published earlier (or with
/// no parsable date at all) are discarded so parser fixes cannot re-flood
/// the article table with history.
pub fn article_published_floor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .expect("valid floor timestamp")
}

/// Normalize parsed entries: trim text fields, drop blank titles/URLs,
/// deduplicate by URL (first occurrence wins), and apply the publication
/// floor. Idempotent.
pub fn normalize_feed_sources(entries: Vec<FeedSource>) -> Vec<FeedSource> {
    let floor = article_published_floor();
    let mut normalized: Vec<FeedSource> = Vec::with_capacity(entries.len());
    let mut seen_urls: std::collections::HashSet<String> = std::collections::HashSet::new();

    for entry in entries {
        let Some(title) = normalize_text(Some(&entry.title)) else {
            continue;
        };
        let Some(url) = normalize_text(Some(&entry.url)) else {
            continue;
        };
        if seen_urls.contains(&url) {
            continue;
        }
        let Some(published_at) = entry.published_at else {
            continue;
        };
        if published_at < floor {
            continue;
        }

        seen_urls.insert(url.clone());
        normalized.push(FeedSource {
            title,
            url,
            summary: normalize_text(entry.summary.as_deref()),
            author: normalize_text(entry.author.as_deref()),
            published_at: Some(published_at),
            image_url: normalize_text(entry.image_url.as_deref()),
        });
    }

    normalized
}

fn normalize_text(value: Option<&str>) -> Option<String> {
    let cleaned = value?.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, url: &str, published_at: Option<DateTime<Utc>>) -> FeedSource {
        FeedSource {
            title: title.to_string(),
            url: url.to_string(),
            summary: None,
            author: None,
            published_at,
            image_url: None,
        }
    }

    fn after_floor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn drops_blank_titles_and_urls() {
        let out = normalize_feed_sources(vec![
            entry("  ", "https://e.com/a", Some(after_floor())),
            entry("ok", "   ", Some(after_floor())),
            entry("  kept  ", " https://e.com/b ", Some(after_floor())),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "kept");
        assert_eq!(out[0].url, "https://e.com/b");
    }

    #[test]
    fn deduplicates_by_url_first_wins() {
        let out = normalize_feed_sources(vec![
            entry("first", "https://e.com/a", Some(after_floor())),
            entry("second", "https://e.com/a", Some(after_floor())),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "first");
    }

    #[test]
    fn floor_boundary_is_inclusive() {
        let floor = article_published_floor();
        let just_before = floor - chrono::Duration::seconds(1);

        let out = normalize_feed_sources(vec![
            entry("at floor", "https://e.com/a", Some(floor)),
            entry("before floor", "https://e.com/b", Some(just_before)),
            entry("undated", "https://e.com/c", None),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "at floor");
    }

    #[test]
    fn normalization_is_idempotent() {
        let input = vec![
            entry(" spaced ", " https://e.com/a ", Some(after_floor())),
            entry("dup", "https://e.com/a", Some(after_floor())),
            entry("old", "https://e.com/b", Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())),
        ];
        let once = normalize_feed_sources(input);
        let twice = normalize_feed_sources(once.clone());
        assert_eq!(once, twice);
    }
}
