use sqlx::PgConnection;

/// Tag names are case-sensitive; deduplication is whitespace-trim plus
/// first-occurrence-wins.
pub fn dedupe_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for tag in tags {
        let cleaned = tag.trim();
        if cleaned.is_empty() || !seen.insert(cleaned.to_string()) {
            continue;
        }
        deduped.push(cleaned.to_string());
    }
    deduped
}

pub async fn get_or_create_tags(
    conn: &mut PgConnection,
    names: &[String],
) -> Result<Vec<i32>, sqlx::Error> {
    let mut tag_ids = Vec::with_capacity(names.len());
    for name in names {
        // DO UPDATE rather than DO NOTHING so RETURNING yields the existing id.
        let tag_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO rss_tags (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
        tag_ids.push(tag_id);
    }
    Ok(tag_ids)
}

pub async fn replace_feed_tags(
    conn: &mut PgConnection,
    feed_id: i32,
    tag_ids: &[i32],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM rss_feed_tags WHERE feed_id = $1")
        .bind(feed_id)
        .execute(&mut *conn)
        .await?;

    for tag_id in tag_ids {
        sqlx::query(
            r#"
            INSERT INTO rss_feed_tags (feed_id, tag_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(feed_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
