use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use manifeed_common::time::epoch_sentinel;

#[derive(Debug, Clone, Serialize)]
pub struct SourceRead {
    pub id: i32,
    pub title: String,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub company_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceDetailRead {
    #[serde(flatten)]
    pub source: SourceRead,
    pub feed_sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourcePageRead {
    pub items: Vec<SourceRead>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: i32,
    title: String,
    summary: Option<String>,
    author: Option<String>,
    url: String,
    published_at: DateTime<Utc>,
    image_url: Option<String>,
    company_names: Vec<String>,
}

impl SourceRow {
    fn into_read(self) -> SourceRead {
        SourceRead {
            id: self.id,
            title: self.title,
            summary: self.summary,
            author: self.author,
            url: self.url,
            published_at: public_published_at(self.published_at),
            image_url: self.image_url,
            company_names: self.company_names,
        }
    }
}

/// The epoch sentinel is a storage artifact; readers see `null`.
fn public_published_at(published_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if published_at == epoch_sentinel() {
        None
    } else {
        Some(published_at)
    }
}

/// Paginated article listing, optionally filtered to one feed or one
/// company. Ordered newest-first with the sentinel (unknown date) last.
pub async fn list_source_reads(
    pool: &PgPool,
    limit: i64,
    offset: i64,
    feed_id: Option<i32>,
    company_id: Option<i32>,
) -> Result<SourcePageRead, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM (
            SELECT s.id
            FROM rss_sources s
            JOIN rss_source_feeds sf
                ON sf.source_id = s.id AND sf.published_at = s.published_at
            JOIN rss_feeds f ON f.id = sf.feed_id
            WHERE ($1::int IS NULL OR sf.feed_id = $1)
              AND ($2::int IS NULL OR f.company_id = $2)
            GROUP BY s.id
        ) matched
        "#,
    )
    .bind(feed_id)
    .bind(company_id)
    .fetch_one(pool)
    .await?;

    if total == 0 {
        return Ok(SourcePageRead {
            items: Vec::new(),
            total: 0,
            limit,
            offset,
        });
    }

    let paged_ids: Vec<i32> = sqlx::query_scalar(
        r#"
        SELECT s.id
        FROM rss_sources s
        JOIN rss_source_feeds sf
            ON sf.source_id = s.id AND sf.published_at = s.published_at
        JOIN rss_feeds f ON f.id = sf.feed_id
        WHERE ($1::int IS NULL OR sf.feed_id = $1)
          AND ($2::int IS NULL OR f.company_id = $2)
        GROUP BY s.id
        ORDER BY MAX(s.published_at) DESC, s.id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(feed_id)
    .bind(company_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    if paged_ids.is_empty() {
        return Ok(SourcePageRead {
            items: Vec::new(),
            total,
            limit,
            offset,
        });
    }

    let rows: Vec<SourceRow> = sqlx::query_as(
        r#"
        SELECT
            s.id,
            s.title,
            s.summary,
            s.author,
            s.url,
            s.published_at,
            s.image_url,
            COALESCE(
                array_agg(DISTINCT c.name) FILTER (WHERE c.name IS NOT NULL),
                '{}'
            ) AS company_names
        FROM rss_sources s
        LEFT JOIN rss_source_feeds sf
            ON sf.source_id = s.id AND sf.published_at = s.published_at
        LEFT JOIN rss_feeds f ON f.id = sf.feed_id
        LEFT JOIN rss_company c ON c.id = f.company_id
        WHERE s.id = ANY($1)
        GROUP BY s.id, s.title, s.summary, s.author, s.url, s.published_at, s.image_url
        "#,
    )
    .bind(&paged_ids)
    .fetch_all(pool)
    .await?;

    let mut by_id: HashMap<i32, SourceRead> = rows
        .into_iter()
        .map(|row| (row.id, row.into_read()))
        .collect();
    let items = paged_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();

    Ok(SourcePageRead {
        items,
        total,
        limit,
        offset,
    })
}

#[derive(sqlx::FromRow)]
struct SourceDetailRow {
    id: i32,
    title: String,
    summary: Option<String>,
    author: Option<String>,
    url: String,
    published_at: DateTime<Utc>,
    image_url: Option<String>,
    company_names: Vec<String>,
    feed_sections: Vec<String>,
}

pub async fn get_source_detail_read(
    pool: &PgPool,
    source_id: i32,
) -> Result<Option<SourceDetailRead>, sqlx::Error> {
    let row: Option<SourceDetailRow> = sqlx::query_as(
        r#"
        SELECT
            s.id,
            s.title,
            s.summary,
            s.author,
            s.url,
            s.published_at,
            s.image_url,
            COALESCE(
                array_agg(DISTINCT c.name) FILTER (WHERE c.name IS NOT NULL),
                '{}'
            ) AS company_names,
            COALESCE(
                array_agg(DISTINCT f.section) FILTER (WHERE f.section IS NOT NULL),
                '{}'
            ) AS feed_sections
        FROM rss_sources s
        LEFT JOIN rss_source_feeds sf
            ON sf.source_id = s.id AND sf.published_at = s.published_at
        LEFT JOIN rss_feeds f ON f.id = sf.feed_id
        LEFT JOIN rss_company c ON c.id = f.company_id
        WHERE s.id = $1
        GROUP BY s.id, s.title, s.summary, s.author, s.url, s.published_at, s.image_url
        "#,
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| SourceDetailRead {
        source: SourceRead {
            id: row.id,
            title: row.title,
            summary: row.summary,
            author: row.author,
            url: row.url,
            published_at: public_published_at(row.published_at),
            image_url: row.image_url,
            company_names: row.company_names,
        },
        feed_sections: row.feed_sections,
    }))
}
