use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Stand-in publication date when a feed entry has none, so the
/// `(url, published_at)` key stays total.
pub fn epoch_sentinel() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Coerce an optional timestamp to UTC, substituting the epoch sentinel.
pub fn published_at_or_sentinel(value: Option<DateTime<Utc>>) -> DateTime<Utc> {
    value.unwrap_or_else(epoch_sentinel)
}

/// Parse a feed timestamp: RFC 5322 first, then ISO 8601 (trailing `Z`
/// accepted), then a naive ISO datetime coerced to UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&trimmed.replace('Z', "+00:00")) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&parsed));
    }
    None
}

/// Format a timestamp as an RFC 5322 HTTP date (`If-Modified-Since`).
pub fn format_http_date(value: DateTime<Utc>) -> String {
    value.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP `Last-Modified` / `ETag`-adjacent date header.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(trimmed)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Trim a header value, mapping blank to `None`.
pub fn clean_header_value(value: &str) -> Option<String> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_rfc2822_dates() {
        let parsed = parse_datetime("Sun, 01 Feb 2026 10:30:00 +0200").unwrap();
        assert_eq!(parsed.hour(), 8);
    }

    #[test]
    fn parses_iso_with_trailing_z() {
        let parsed = parse_datetime("2026-02-01T10:30:00Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn naive_iso_is_coerced_to_utc() {
        let parsed = parse_datetime("2026-02-01T10:30:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("not a date").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn http_date_round_trip() {
        let original = Utc.with_ymd_and_hms(2026, 3, 15, 7, 45, 10).unwrap();
        let formatted = format_http_date(original);
        assert!(formatted.ends_with("GMT"));
        assert_eq!(parse_http_date(&formatted).unwrap(), original);
    }

    #[test]
    fn sentinel_substitution() {
        assert_eq!(published_at_or_sentinel(None), epoch_sentinel());
        let real = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(published_at_or_sentinel(Some(real)), real);
    }
}
