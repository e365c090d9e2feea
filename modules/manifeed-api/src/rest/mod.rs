pub mod health;
pub mod internal;
pub mod jobs;
pub mod rss;
pub mod sources;

use serde::Deserialize;

/// Comma-separated feed id filter shared by the check and ingest endpoints.
/// Non-numeric and non-positive entries are dropped.
#[derive(Debug, Default, Deserialize)]
pub struct FeedIdsParams {
    pub feed_ids: Option<String>,
}

impl FeedIdsParams {
    pub fn parsed(&self) -> Option<Vec<i32>> {
        let raw = self.feed_ids.as_deref()?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(
            raw.split(',')
                .filter_map(|part| part.trim().parse::<i32>().ok())
                .filter(|id| *id > 0)
                .collect(),
        )
    }
}
