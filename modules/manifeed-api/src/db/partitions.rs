use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use manifeed_common::time::epoch_sentinel;

/// Outcome of one partition maintenance run.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionMaintenanceRead {
    pub source_default_rows_repartitioned: i64,
    pub source_feed_default_rows_repartitioned: i64,
    pub source_weekly_partitions_created: i64,
    pub source_feed_weekly_partitions_created: i64,
    pub weeks_covered: i64,
}

/// Move rows that accumulated in the default partitions into weekly range
/// partitions, creating any missing partitions along the way.
///
/// The default rows are buffered in temp tables first because Postgres
/// refuses to attach a range partition whose bounds overlap rows still
/// sitting in the default partition. Sentinel-dated rows stay in the
/// default partition. Runs as a single transaction.
pub async fn repartition_default_sources(
    pool: &PgPool,
) -> Result<PartitionMaintenanceRead, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TEMP TABLE tmp_rss_sources_default_buffer ON COMMIT DROP AS
        SELECT id, title, summary, author, url, published_at, image_url
        FROM rss_sources_default
        "#,
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        r#"
        CREATE TEMP TABLE tmp_rss_source_feeds_default_buffer ON COMMIT DROP AS
        SELECT source_id, feed_id, published_at
        FROM rss_source_feeds_default
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let source_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tmp_rss_sources_default_buffer")
            .fetch_one(&mut *tx)
            .await?;
    let source_feed_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tmp_rss_source_feeds_default_buffer")
            .fetch_one(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM rss_source_feeds_default")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM rss_sources_default")
        .execute(&mut *tx)
        .await?;

    let week_starts = list_week_starts(&mut *tx).await?;

    let mut source_partitions_created = 0i64;
    let mut source_feed_partitions_created = 0i64;
    for week_start in &week_starts {
        let week_end = *week_start + Duration::days(7);
        if create_weekly_partition(&mut *tx, "rss_sources", *week_start, week_end).await? {
            source_partitions_created += 1;
        }
        if create_weekly_partition(&mut *tx, "rss_source_feeds", *week_start, week_end).await? {
            source_feed_partitions_created += 1;
        }
    }

    sqlx::query(
        r#"
        INSERT INTO rss_sources (id, title, summary, author, url, published_at, image_url)
        SELECT id, title, summary, author, url, published_at, image_url
        FROM tmp_rss_sources_default_buffer
        ON CONFLICT DO NOTHING
        "#,
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        r#"
        INSERT INTO rss_source_feeds (source_id, feed_id, published_at)
        SELECT source_id, feed_id, published_at
        FROM tmp_rss_source_feeds_default_buffer
        ON CONFLICT DO NOTHING
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT setval(
            'rss_sources_id_seq',
            COALESCE((SELECT MAX(id) FROM rss_sources), 1),
            (SELECT EXISTS(SELECT 1 FROM rss_sources))
        )
        "#,
    )
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(PartitionMaintenanceRead {
        source_default_rows_repartitioned: source_rows,
        source_feed_default_rows_repartitioned: source_feed_rows,
        source_weekly_partitions_created: source_partitions_created,
        source_feed_weekly_partitions_created: source_feed_partitions_created,
        weeks_covered: week_starts.len() as i64,
    })
}

/// Every distinct week touched by non-sentinel article dates, in both the
/// live table and the buffered default rows.
async fn list_week_starts(conn: &mut PgConnection) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT date_trunc('week', published_at) AS week_start
        FROM (
            SELECT published_at FROM rss_sources WHERE published_at > $1
            UNION ALL
            SELECT published_at FROM tmp_rss_sources_default_buffer WHERE published_at > $1
        ) AS all_sources
        ORDER BY week_start ASC
        "#,
    )
    .bind(epoch_sentinel())
    .fetch_all(conn)
    .await
}

/// Create one weekly partition if it does not already exist. Returns true
/// when a table was created.
async fn create_weekly_partition(
    conn: &mut PgConnection,
    parent: &str,
    week_start: DateTime<Utc>,
    week_end: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let partition_name = format!("{parent}_{}", week_start.format("%Y%m%d"));

    let exists: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
        .bind(&partition_name)
        .fetch_one(&mut *conn)
        .await?;
    if exists.is_some() {
        return Ok(false);
    }

    // Partition bounds cannot be parameterized; the values come from
    // date_trunc output, not user input.
    let ddl = format!(
        "CREATE TABLE {partition_name} PARTITION OF {parent} FOR VALUES FROM ('{}') TO ('{}')",
        week_start.format("%Y-%m-%d %H:%M:%S+00"),
        week_end.format("%Y-%m-%d %H:%M:%S+00"),
    );
    sqlx::query(&ddl).execute(conn).await?;
    Ok(true)
}
