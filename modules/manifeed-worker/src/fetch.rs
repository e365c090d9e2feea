use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;

use manifeed_common::payloads::{FeedPayload, FeedSource};
use manifeed_common::time::{clean_header_value, format_http_date, parse_http_date};
use manifeed_common::types::{FetchProtection, ResultStatus};

use crate::normalize::normalize_feed_sources;
use crate::parse::parse_feed_entries;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Browser-like header set used at fetch protection level 2.
/// Accept-Encoding and Connection are left to the HTTP client.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (X11; Linux x86_64; rv:140.0) Gecko/20100101 Firefox/140.0",
    ),
    (
        "Accept",
        "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5",
    ),
    ("Accept-Language", "en-US,en;q=0.9,fr;q=0.8"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
];

/// Outcome of fetching one feed, before job enrichment.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: ResultStatus,
    pub error_message: Option<String>,
    pub new_etag: Option<String>,
    pub new_last_update: Option<DateTime<Utc>>,
    pub sources: Vec<FeedSource>,
}

impl FetchOutcome {
    fn error(message: String) -> Self {
        Self {
            status: ResultStatus::Error,
            error_message: Some(message),
            new_etag: None,
            new_last_update: None,
            sources: Vec::new(),
        }
    }

    fn error_with_validators(
        message: String,
        etag: Option<String>,
        last_update: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status: ResultStatus::Error,
            error_message: Some(message),
            new_etag: etag,
            new_last_update: last_update,
            sources: Vec::new(),
        }
    }

    fn not_modified(etag: Option<String>, last_update: Option<DateTime<Utc>>) -> Self {
        Self {
            status: ResultStatus::NotModified,
            error_message: None,
            new_etag: etag,
            new_last_update: last_update,
            sources: Vec::new(),
        }
    }
}

enum RequestFailure {
    Timeout,
    Transport(String),
}

impl RequestFailure {
    fn message(self) -> String {
        match self {
            RequestFailure::Timeout => "Request timeout".to_string(),
            RequestFailure::Transport(detail) => format!("Request error: {detail}"),
        }
    }
}

/// Fetch one feed, honoring fetch protection, conditional validators, and
/// retries. Never fails: every path collapses into a typed outcome.
pub async fn fetch_feed_result(http: &reqwest::Client, feed: &FeedPayload) -> FetchOutcome {
    if feed.fetchprotection == FetchProtection::Blocked {
        return FetchOutcome::error("Blocked by fetch protection".to_string());
    }

    let headers = build_request_headers(feed);
    let response = match perform_request_with_retry(http, &feed.feed_url, headers).await {
        Ok(response) => response,
        Err(failure) => return FetchOutcome::error(failure.message()),
    };

    let response_etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|value| value.to_str().ok())
        .and_then(clean_header_value);
    let response_last_modified = response
        .headers()
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date);

    if response.status() == StatusCode::NOT_MODIFIED {
        return FetchOutcome::not_modified(response_etag, response_last_modified);
    }

    if is_same_version(feed, response_etag.as_deref(), response_last_modified) {
        return FetchOutcome::not_modified(response_etag, response_last_modified);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => return FetchOutcome::error(format!("Unknown fetch error: {err}")),
    };

    match parse_feed_entries(&body) {
        Ok((entries, parsed_last_modified)) => FetchOutcome {
            status: ResultStatus::Success,
            error_message: None,
            new_etag: response_etag,
            new_last_update: response_last_modified.or(parsed_last_modified),
            sources: normalize_feed_sources(entries),
        },
        Err(err) => FetchOutcome::error_with_validators(
            format!("Feed parse error: {err}"),
            response_etag,
            response_last_modified,
        ),
    }
}

/// Conditional validators always; browser headers only at protection level 2.
pub fn build_request_headers(feed: &FeedPayload) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if feed.fetchprotection == FetchProtection::Browser {
        for (name, value) in BROWSER_HEADERS {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        if let Some(host) = feed
            .host_header
            .as_deref()
            .map(|host| host.trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
        {
            let origin = format!("https://{host}");
            insert_header(&mut headers, "Host", &host);
            insert_header(&mut headers, "Origin", &origin);
            insert_header(&mut headers, "Referer", &format!("{origin}/"));
        }
    }

    if let Some(etag) = feed.etag.as_deref().and_then(clean_header_value) {
        insert_header(&mut headers, "If-None-Match", &etag);
    }
    if let Some(last_update) = feed.last_update {
        insert_header(&mut headers, "If-Modified-Since", &format_http_date(last_update));
    }

    headers
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

async fn perform_request_with_retry(
    http: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<reqwest::Response, RequestFailure> {
    let mut last_failure = RequestFailure::Transport("Request failed".to_string());

    for attempt in 1..=MAX_ATTEMPTS {
        let result = http.get(url).headers(headers.clone()).send().await;
        match result {
            Ok(response)
                if response.status() == StatusCode::OK
                    || response.status() == StatusCode::NOT_MODIFIED =>
            {
                return Ok(response);
            }
            Ok(response) => {
                last_failure = RequestFailure::Transport(format!(
                    "HTTP {} while checking {url}",
                    response.status().as_u16()
                ));
            }
            Err(err) if err.is_timeout() => {
                last_failure = RequestFailure::Timeout;
            }
            Err(err) => {
                last_failure = RequestFailure::Transport(err.to_string());
            }
        }

        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(BACKOFF_STEP * attempt).await;
        }
    }

    Err(last_failure)
}

/// A 200 response whose validators match the stored ones carries nothing
/// new; collapse it to not_modified.
fn is_same_version(
    feed: &FeedPayload,
    response_etag: Option<&str>,
    response_last_modified: Option<DateTime<Utc>>,
) -> bool {
    if let (Some(stored), Some(received)) = (feed.last_update, response_last_modified) {
        if stored == received {
            return true;
        }
    }
    if let (Some(stored), Some(received)) = (feed.etag.as_deref(), response_etag) {
        if stored.trim() == received {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED_BODY: &str = r#"<rss><channel>
        <lastBuildDate>Mon, 02 Feb 2026 09:00:00 GMT</lastBuildDate>
        <item>
            <title>Fresh article</title>
            <link>https://example.com/fresh</link>
            <pubDate>Mon, 02 Feb 2026 08:00:00 GMT</pubDate>
        </item>
    </channel></rss>"#;

    fn feed_payload(url: &str) -> FeedPayload {
        FeedPayload {
            feed_id: 1,
            feed_url: url.to_string(),
            company_id: Some(4),
            host_header: None,
            fetchprotection: FetchProtection::Default,
            etag: None,
            last_update: None,
            last_db_article_published_at: None,
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn blocked_protection_never_touches_the_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rss.xml")
            .expect(0)
            .create_async()
            .await;

        let mut feed = feed_payload(&format!("{}/rss.xml", server.url()));
        feed.fetchprotection = FetchProtection::Blocked;

        let outcome = fetch_feed_result(&client(), &feed).await;
        assert_eq!(outcome.status, ResultStatus::Error);
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("Blocked by fetch protection")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn success_carries_sources_and_validators() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rss.xml")
            .with_status(200)
            .with_header("etag", "\"v2\"")
            .with_header("last-modified", "Mon, 02 Feb 2026 09:00:00 GMT")
            .with_body(FEED_BODY)
            .create_async()
            .await;

        let feed = feed_payload(&format!("{}/rss.xml", server.url()));
        let outcome = fetch_feed_result(&client(), &feed).await;

        assert_eq!(outcome.status, ResultStatus::Success);
        assert_eq!(outcome.new_etag.as_deref(), Some("\"v2\""));
        assert_eq!(
            outcome.new_last_update.unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap()
        );
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.sources[0].url, "https://example.com/fresh");
    }

    #[tokio::test]
    async fn status_304_yields_not_modified() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rss.xml")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .with_header("etag", "\"v1\"")
            .create_async()
            .await;

        let mut feed = feed_payload(&format!("{}/rss.xml", server.url()));
        feed.etag = Some("\"v1\"".to_string());

        let outcome = fetch_feed_result(&client(), &feed).await;
        assert_eq!(outcome.status, ResultStatus::NotModified);
        assert_eq!(outcome.new_etag.as_deref(), Some("\"v1\""));
        assert!(outcome.sources.is_empty());
    }

    #[tokio::test]
    async fn matching_etag_on_200_collapses_to_not_modified() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rss.xml")
            .with_status(200)
            .with_header("etag", "\"same\"")
            .with_body(FEED_BODY)
            .create_async()
            .await;

        let mut feed = feed_payload(&format!("{}/rss.xml", server.url()));
        feed.etag = Some("\"same\"".to_string());

        let outcome = fetch_feed_result(&client(), &feed).await;
        assert_eq!(outcome.status, ResultStatus::NotModified);
        assert!(outcome.sources.is_empty());
    }

    #[tokio::test]
    async fn parse_failure_preserves_observed_validators() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rss.xml")
            .with_status(200)
            .with_header("etag", "\"broken\"")
            .with_body("   ")
            .create_async()
            .await;

        let feed = feed_payload(&format!("{}/rss.xml", server.url()));
        let outcome = fetch_feed_result(&client(), &feed).await;

        assert_eq!(outcome.status, ResultStatus::Error);
        assert!(outcome
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Feed parse error:"));
        assert_eq!(outcome.new_etag.as_deref(), Some("\"broken\""));
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries_then_report() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rss.xml")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let feed = feed_payload(&format!("{}/rss.xml", server.url()));
        let outcome = fetch_feed_result(&client(), &feed).await;

        assert_eq!(outcome.status, ResultStatus::Error);
        let message = outcome.error_message.unwrap();
        assert!(message.starts_with("Request error: HTTP 503"), "{message}");
        mock.assert_async().await;
    }

    #[test]
    fn browser_headers_only_at_level_two() {
        let mut feed = feed_payload("https://news.example.com/rss.xml");
        feed.fetchprotection = FetchProtection::Browser;
        feed.host_header = Some("News.Example.COM".to_string());
        feed.etag = Some("\"abc\"".to_string());
        feed.last_update = Some(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());

        let headers = build_request_headers(&feed);
        assert!(headers.contains_key("user-agent"));
        assert_eq!(headers.get("host").unwrap(), "news.example.com");
        assert_eq!(headers.get("origin").unwrap(), "https://news.example.com");
        assert_eq!(headers.get("referer").unwrap(), "https://news.example.com/");
        assert_eq!(headers.get("if-none-match").unwrap(), "\"abc\"");
        assert_eq!(
            headers.get("if-modified-since").unwrap(),
            "Thu, 15 Jan 2026 12:00:00 GMT"
        );

        feed.fetchprotection = FetchProtection::Default;
        let plain = build_request_headers(&feed);
        assert!(!plain.contains_key("user-agent"));
        assert!(plain.contains_key("if-none-match"));
    }

    #[test]
    fn conditional_headers_absent_without_stored_validators() {
        let feed = feed_payload("https://e.com/rss.xml");
        let headers = build_request_headers(&feed);
        assert!(headers.is_empty());
    }
}
