use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use manifeed_common::payloads::WorkerResult;
use manifeed_common::time::published_at_or_sentinel;
use manifeed_common::types::{JobStatus, QueueKind, ResultStatus};

/// Apply one worker result inside an open transaction.
///
/// Returns `false` when the result was a duplicate or referenced an unknown
/// job; in that case nothing else is written and the message still counts as
/// fully processed.
pub async fn persist_worker_result(
    conn: &mut PgConnection,
    payload: &WorkerResult,
    queue_kind: QueueKind,
) -> Result<bool, sqlx::Error> {
    if !insert_job_result_if_new(conn, payload, queue_kind).await? {
        return Ok(false);
    }

    upsert_feed_scraping_state(conn, payload).await?;

    if queue_kind == QueueKind::Ingest {
        upsert_sources_for_feed(conn, payload).await?;
    }

    refresh_scrape_job_status(conn, &payload.job_id).await?;
    Ok(true)
}

/// Idempotent insert keyed on `(job_id, feed_id)`, guarded so results for
/// unknown jobs are dropped rather than orphaned.
async fn insert_job_result_if_new(
    conn: &mut PgConnection,
    payload: &WorkerResult,
    queue_kind: QueueKind,
) -> Result<bool, sqlx::Error> {
    let inserted: Option<String> = sqlx::query_scalar(
        r#"
        INSERT INTO rss_scrape_job_results (
            job_id,
            feed_id,
            status,
            queue_kind,
            error_message,
            fetchprotection,
            new_etag,
            new_last_update
        )
        SELECT $1, $2, $3, $4, $5, $6, $7, $8
        WHERE EXISTS (
            SELECT 1
            FROM rss_scrape_jobs
            WHERE job_id = $1
        )
        ON CONFLICT (job_id, feed_id) DO NOTHING
        RETURNING job_id
        "#,
    )
    .bind(&payload.job_id)
    .bind(payload.feed_id)
    .bind(payload.status.as_str())
    .bind(queue_kind.as_str())
    .bind(&payload.error_message)
    .bind(payload.fetchprotection.as_i16())
    .bind(&payload.new_etag)
    .bind(payload.new_last_update)
    .fetch_optional(conn)
    .await?;

    Ok(inserted.is_some())
}

/// Upsert the per-feed scraping state. Validators are sticky (COALESCE with
/// the stored value); the error counter bumps only on error results, and the
/// error message is cleared on success/not_modified.
async fn upsert_feed_scraping_state(
    conn: &mut PgConnection,
    payload: &WorkerResult,
) -> Result<(), sqlx::Error> {
    let is_error = payload.status == ResultStatus::Error;
    sqlx::query(
        r#"
        INSERT INTO feeds_scraping (
            feed_id,
            fetchprotection,
            last_update,
            etag,
            error_nbr,
            error_msg
        ) VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (feed_id) DO UPDATE SET
            fetchprotection = EXCLUDED.fetchprotection,
            last_update = COALESCE(EXCLUDED.last_update, feeds_scraping.last_update),
            etag = COALESCE(EXCLUDED.etag, feeds_scraping.etag),
            error_nbr = CASE
                WHEN $7 THEN feeds_scraping.error_nbr + 1
                ELSE feeds_scraping.error_nbr
            END,
            error_msg = CASE
                WHEN $7 THEN $6
                ELSE NULL
            END
        "#,
    )
    .bind(payload.feed_id)
    .bind(payload.fetchprotection.as_i16())
    .bind(payload.new_last_update)
    .bind(&payload.new_etag)
    .bind(if is_error { 1i32 } else { 0i32 })
    .bind(if is_error {
        payload.error_message.clone()
    } else {
        None
    })
    .bind(is_error)
    .execute(conn)
    .await?;
    Ok(())
}

/// Upsert every article carried by a successful ingest result and link it to
/// the feed. Idempotent on `(url, published_at)`.
async fn upsert_sources_for_feed(
    conn: &mut PgConnection,
    payload: &WorkerResult,
) -> Result<(), sqlx::Error> {
    if payload.status != ResultStatus::Success {
        return Ok(());
    }

    for source in &payload.sources {
        let published_at = published_at_or_sentinel(source.published_at);

        let upserted: Option<(i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            INSERT INTO rss_sources (
                title,
                summary,
                author,
                url,
                published_at,
                image_url
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (url, published_at) DO UPDATE SET
                title = EXCLUDED.title,
                summary = COALESCE(EXCLUDED.summary, rss_sources.summary),
                author = COALESCE(EXCLUDED.author, rss_sources.author),
                image_url = COALESCE(EXCLUDED.image_url, rss_sources.image_url)
            RETURNING id, published_at
            "#,
        )
        .bind(&source.title)
        .bind(&source.summary)
        .bind(&source.author)
        .bind(&source.url)
        .bind(published_at)
        .bind(&source.image_url)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((source_id, stored_published_at)) = upserted else {
            continue;
        };

        sqlx::query(
            r#"
            INSERT INTO rss_source_feeds (source_id, feed_id, published_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_id, feed_id, published_at) DO NOTHING
            "#,
        )
        .bind(source_id)
        .bind(payload.feed_id)
        .bind(stored_published_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Recompute the parent job's aggregate status from its result counts.
async fn refresh_scrape_job_status(
    conn: &mut PgConnection,
    job_id: &str,
) -> Result<(), sqlx::Error> {
    let feed_count: Option<i32> =
        sqlx::query_scalar("SELECT feed_count FROM rss_scrape_jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some(feed_count) = feed_count else {
        return Ok(());
    };

    let (processed, errors): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE status = 'error')
        FROM rss_scrape_job_results
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_one(&mut *conn)
    .await?;

    let status = derive_job_status(feed_count as i64, processed, errors);

    sqlx::query("UPDATE rss_scrape_jobs SET status = $1, updated_at = now() WHERE job_id = $2")
        .bind(status.as_str())
        .bind(job_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// The aggregate status is a pure function of `(feed_count, processed,
/// errors)`.
pub fn derive_job_status(feed_count: i64, processed: i64, errors: i64) -> JobStatus {
    if feed_count == 0 {
        JobStatus::Completed
    } else if processed == 0 {
        JobStatus::Queued
    } else if processed < feed_count {
        JobStatus::Processing
    } else if errors > 0 {
        JobStatus::CompletedWithErrors
    } else {
        JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_jobs_complete_immediately() {
        assert_eq!(derive_job_status(0, 0, 0), JobStatus::Completed);
    }

    #[test]
    fn unprocessed_jobs_stay_queued() {
        assert_eq!(derive_job_status(5, 0, 0), JobStatus::Queued);
    }

    #[test]
    fn partial_progress_is_processing() {
        assert_eq!(derive_job_status(5, 3, 1), JobStatus::Processing);
    }

    #[test]
    fn full_progress_splits_on_errors() {
        assert_eq!(derive_job_status(5, 5, 0), JobStatus::Completed);
        assert_eq!(derive_job_status(5, 5, 2), JobStatus::CompletedWithErrors);
    }

    #[test]
    fn terminal_states_exactly_when_all_feeds_processed() {
        for feed_count in 1..=4i64 {
            for processed in 0..=feed_count {
                for errors in 0..=processed {
                    let status = derive_job_status(feed_count, processed, errors);
                    let terminal = matches!(
                        status,
                        JobStatus::Completed | JobStatus::CompletedWithErrors
                    );
                    assert_eq!(terminal, processed == feed_count);
                }
            }
        }
    }
}
