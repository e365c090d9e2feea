use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use manifeed_common::payloads::FeedPayload;
use manifeed_common::types::FetchProtection;

use crate::util::normalize_host;

/// A feed joined with its owning company, as served by the API.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FeedRead {
    pub id: i32,
    pub url: String,
    pub section: Option<String>,
    pub enabled: bool,
    pub trust_score: f64,
    pub company_id: Option<i32>,
    pub company_name: Option<String>,
    pub company_enabled: Option<bool>,
}

pub async fn list_feed_reads(pool: &PgPool) -> Result<Vec<FeedRead>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT
            f.id,
            f.url,
            f.section,
            f.enabled,
            f.trust_score,
            f.company_id,
            c.name AS company_name,
            c.enabled AS company_enabled
        FROM rss_feeds f
        LEFT JOIN rss_company c ON c.id = f.company_id
        ORDER BY f.id ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_feed_read_by_id(
    pool: &PgPool,
    feed_id: i32,
) -> Result<Option<FeedRead>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT
            f.id,
            f.url,
            f.section,
            f.enabled,
            f.trust_score,
            f.company_id,
            c.name AS company_name,
            c.enabled AS company_enabled
        FROM rss_feeds f
        LEFT JOIN rss_company c ON c.id = f.company_id
        WHERE f.id = $1
        "#,
    )
    .bind(feed_id)
    .fetch_optional(pool)
    .await
}

pub async fn set_feed_enabled(
    pool: &PgPool,
    feed_id: i32,
    enabled: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE rss_feeds SET enabled = $1 WHERE id = $2")
        .bind(enabled)
        .bind(feed_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct FeedPayloadRow {
    feed_id: i32,
    feed_url: String,
    company_id: Option<i32>,
    company_host: Option<String>,
    fetchprotection: i16,
    etag: Option<String>,
    last_update: Option<DateTime<Utc>>,
    last_db_article_published_at: Option<DateTime<Utc>>,
}

/// Build the worker payload for each selected feed: feed × company ×
/// scraping state × the latest stored article date per feed. The
/// fetch-protection level resolves scraping state first, then company, then
/// the default.
pub async fn list_feed_scrape_payloads(
    pool: &PgPool,
    feed_ids: Option<&[i32]>,
    enabled_only: bool,
) -> Result<Vec<FeedPayload>, sqlx::Error> {
    let id_filter: Option<Vec<i32>> = match feed_ids {
        Some(ids) => {
            let mut unique: Vec<i32> = ids.iter().copied().filter(|id| *id > 0).collect();
            unique.sort_unstable();
            unique.dedup();
            if unique.is_empty() {
                return Ok(Vec::new());
            }
            Some(unique)
        }
        None => None,
    };

    let rows: Vec<FeedPayloadRow> = sqlx::query_as(
        r#"
        SELECT
            f.id AS feed_id,
            f.url AS feed_url,
            f.company_id,
            c.host AS company_host,
            COALESCE(fs.fetchprotection, c.fetchprotection, 1)::smallint AS fetchprotection,
            fs.etag,
            fs.last_update,
            latest.last_db_article_published_at
        FROM rss_feeds f
        LEFT JOIN rss_company c ON c.id = f.company_id
        LEFT JOIN feeds_scraping fs ON fs.feed_id = f.id
        LEFT JOIN (
            SELECT feed_id, MAX(published_at) AS last_db_article_published_at
            FROM rss_source_feeds
            GROUP BY feed_id
        ) latest ON latest.feed_id = f.id
        WHERE (NOT $1 OR f.enabled)
          AND ($2::int[] IS NULL OR f.id = ANY($2))
        ORDER BY f.id ASC
        "#,
    )
    .bind(enabled_only)
    .bind(&id_filter)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| FeedPayload {
            feed_id: row.feed_id,
            feed_url: row.feed_url,
            company_id: row.company_id,
            host_header: normalize_host(row.company_host.as_deref()),
            fetchprotection: FetchProtection::clamped(row.fetchprotection as i64),
            etag: row.etag,
            last_update: row.last_update,
            last_db_article_published_at: row.last_db_article_published_at,
        })
        .collect())
}

/// Catalog-sourced feed attributes applied during sync.
#[derive(Debug, Clone)]
pub struct FeedUpsert {
    pub url: String,
    pub section: Option<String>,
    pub enabled: bool,
    pub trust_score: f64,
    pub tags: Vec<String>,
}

pub async fn upsert_catalog_feed(
    conn: &mut PgConnection,
    company_id: i32,
    feed: &FeedUpsert,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO rss_feeds (url, section, enabled, trust_score, company_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (url) DO UPDATE SET
            section = EXCLUDED.section,
            enabled = EXCLUDED.enabled,
            trust_score = EXCLUDED.trust_score,
            company_id = EXCLUDED.company_id
        RETURNING id
        "#,
    )
    .bind(&feed.url)
    .bind(&feed.section)
    .bind(feed.enabled)
    .bind(feed.trust_score)
    .bind(company_id)
    .fetch_one(conn)
    .await
}

/// Drop the company's feeds that are no longer present in its catalog file.
pub async fn delete_company_feeds_not_in_urls(
    conn: &mut PgConnection,
    company_id: i32,
    expected_urls: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM rss_feeds
        WHERE company_id = $1
          AND NOT (url = ANY($2))
        "#,
    )
    .bind(company_id)
    .bind(expected_urls)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
