use std::path::Path;

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;

use manifeed_common::types::FetchProtection;

use crate::db::companies::{get_company_id_by_name, upsert_company, CompanyUpsert};
use crate::db::feeds::{delete_company_feeds_not_in_urls, upsert_catalog_feed, FeedUpsert};
use crate::db::tags::{dedupe_tags, get_or_create_tags, replace_feed_tags};
use crate::error::ApiError;
use crate::util::normalize_host;

const MAX_SECTION_LEN: usize = 50;

/// One company's catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_fetchprotection")]
    pub fetchprotection: i64,
    #[serde(default)]
    pub feeds: Vec<CatalogFeedEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogFeedEntry {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_trust_score")]
    pub trust_score: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_fetchprotection() -> i64 {
    1
}

fn default_trust_score() -> f64 {
    0.5
}

fn default_enabled() -> bool {
    true
}

/// Apply every changed catalog file in one transaction. Deleted files
/// remove the corresponding company's feeds; present files upsert the
/// company, its feeds, and their tags, then drop feeds no longer listed.
pub async fn apply_catalog_sync(
    pool: &PgPool,
    repository_path: &Path,
    changed_files: &[String],
) -> Result<(), ApiError> {
    if changed_files.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for relative_path in changed_files {
        sync_catalog_file(&mut *tx, repository_path, relative_path).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn sync_catalog_file(
    conn: &mut PgConnection,
    repository_path: &Path,
    relative_path: &str,
) -> Result<(), ApiError> {
    let fallback_company_name = company_name_from_filename(relative_path)?;
    let catalog_file_path = repository_path.join(relative_path);

    if !catalog_file_path.exists() {
        // File removed from the catalog: drop that company's feeds.
        if let Some(company_id) = get_company_id_by_name(conn, &fallback_company_name).await? {
            let removed = delete_company_feeds_not_in_urls(conn, company_id, &[]).await?;
            info!(company = %fallback_company_name, removed, "Catalog file deleted, feeds removed");
        }
        return Ok(());
    }

    let catalog = load_catalog_file(&catalog_file_path)?;

    let company_name = {
        let trimmed = catalog.company.trim();
        if trimmed.is_empty() {
            fallback_company_name.clone()
        } else {
            trimmed.to_string()
        }
    };

    let company_id = upsert_company(
        conn,
        &CompanyUpsert {
            name: company_name.clone(),
            host: normalize_host(catalog.host.as_deref()),
            icon_url: normalize_optional(catalog.img.as_deref()),
            country: normalize_country_code(catalog.country.as_deref()),
            language: normalize_country_code(catalog.language.as_deref()),
            fetchprotection: FetchProtection::clamped(catalog.fetchprotection).as_i16(),
        },
    )
    .await?;

    let upserts: Vec<FeedUpsert> = catalog
        .feeds
        .iter()
        .map(|entry| normalize_catalog_feed_entry(entry, relative_path))
        .collect::<Result<_, _>>()?;

    let expected_urls: Vec<String> = upserts.iter().map(|feed| feed.url.clone()).collect();
    for feed in &upserts {
        let feed_id = upsert_catalog_feed(conn, company_id, feed).await?;
        let tag_ids = get_or_create_tags(conn, &feed.tags).await?;
        replace_feed_tags(conn, feed_id, &tag_ids).await?;
    }

    delete_company_feeds_not_in_urls(conn, company_id, &expected_urls).await?;
    info!(company = %company_name, feeds = upserts.len(), "Catalog file applied");
    Ok(())
}

fn load_catalog_file(path: &Path) -> Result<CatalogFile, ApiError> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        ApiError::CatalogParse(format!("Unable to read catalog file {}: {err}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|err| {
        ApiError::CatalogParse(format!(
            "Invalid catalog file {}: {err}",
            path.display()
        ))
    })
}

/// Company name fallback: file stem with underscores as spaces, whitespace
/// collapsed.
pub fn company_name_from_filename(relative_path: &str) -> Result<String, ApiError> {
    let stem = Path::new(relative_path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    let collapsed = stem.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(ApiError::CatalogParse(format!(
            "Could not derive company name from file path: {relative_path}"
        )));
    }
    Ok(collapsed)
}

pub fn normalize_catalog_feed_entry(
    entry: &CatalogFeedEntry,
    relative_path: &str,
) -> Result<FeedUpsert, ApiError> {
    let url = entry.url.trim().to_string();
    if url.is_empty() || url.len() > 500 {
        return Err(ApiError::CatalogParse(format!(
            "Invalid feed url in catalog file {relative_path}"
        )));
    }
    if !(0.0..=1.0).contains(&entry.trust_score) {
        return Err(ApiError::CatalogParse(format!(
            "trust_score out of range for {url} in catalog file {relative_path}"
        )));
    }

    Ok(FeedUpsert {
        url,
        section: normalize_section(&entry.title),
        enabled: entry.enabled,
        trust_score: entry.trust_score,
        tags: dedupe_tags(&entry.tags),
    })
}

fn normalize_section(title: &str) -> Option<String> {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(MAX_SECTION_LEN).collect())
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    let cleaned = value?.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Two-letter country/language codes, lowercased and truncated.
fn normalize_country_code(value: Option<&str>) -> Option<String> {
    let cleaned = value?.trim().to_ascii_lowercase();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.chars().take(2).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_name_from_filenames() {
        assert_eq!(
            company_name_from_filename("acme_daily_news.json").unwrap(),
            "acme daily news"
        );
        assert_eq!(
            company_name_from_filename("catalogs/Le_Monde.json").unwrap(),
            "Le Monde"
        );
        assert!(company_name_from_filename("___.json").is_err());
    }

    #[test]
    fn section_is_collapsed_and_truncated() {
        assert_eq!(normalize_section("  World   News  "), Some("World News".to_string()));
        assert_eq!(normalize_section("   "), None);
        let long = "x".repeat(80);
        assert_eq!(normalize_section(&long).unwrap().len(), MAX_SECTION_LEN);
    }

    #[test]
    fn country_codes_are_lowercased_and_truncated() {
        assert_eq!(normalize_country_code(Some(" FRA ")), Some("fr".to_string()));
        assert_eq!(normalize_country_code(Some("")), None);
        assert_eq!(normalize_country_code(None), None);
    }

    #[test]
    fn feed_entry_normalization_validates_bounds() {
        let entry = CatalogFeedEntry {
            url: " https://example.com/rss ".to_string(),
            title: "Front  Page".to_string(),
            tags: vec![" news ".to_string(), "news".to_string()],
            trust_score: 0.8,
            enabled: true,
        };
        let upsert = normalize_catalog_feed_entry(&entry, "acme.json").unwrap();
        assert_eq!(upsert.url, "https://example.com/rss");
        assert_eq!(upsert.section.as_deref(), Some("Front Page"));
        assert_eq!(upsert.tags, vec!["news"]);

        let bad_score = CatalogFeedEntry {
            url: "https://example.com/rss".to_string(),
            title: "t".to_string(),
            tags: Vec::new(),
            trust_score: 1.5,
            enabled: true,
        };
        assert!(normalize_catalog_feed_entry(&bad_score, "acme.json").is_err());
    }

    #[test]
    fn catalog_json_defaults_apply() {
        let parsed: CatalogFile = serde_json::from_str(
            r#"{
                "company": "Acme",
                "feeds": [{"url": "https://a/rss", "title": "Main"}]
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.fetchprotection, 1);
        assert_eq!(parsed.feeds[0].trust_score, 0.5);
        assert!(parsed.feeds[0].enabled);
    }
}
