use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use sqlx::{Connection, PgConnection};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ApiError;

/// Stable advisory-lock ids for job names that coordinate cluster-wide.
/// Names without an id rely on the in-process layer only.
const PG_LOCK_IDS: &[(&str, i64)] = &[
    ("rss_patch_feed_enabled", 83001),
    ("rss_patch_company_enabled", 83002),
    ("rss_sync", 83003),
];

fn pg_lock_id(name: &str) -> Option<i64> {
    PG_LOCK_IDS
        .iter()
        .find(|(lock_name, _)| *lock_name == name)
        .map(|(_, id)| *id)
}

/// Two-layer guard against concurrent runs of the same named job.
///
/// Layer 1 is a per-name in-process mutex acquired non-blocking. Layer 2 is
/// a Postgres advisory lock taken on a dedicated connection, so the business
/// transaction can roll back independently of the lock's release. Contention
/// on either layer fails fast.
pub struct JobLocks {
    database_url: String,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JobLocks {
    pub fn new(database_url: String) -> Self {
        Self {
            database_url,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Run `action` while holding the named lock. The advisory-lock
    /// connection is always closed, and the local mutex always released, on
    /// every exit path.
    pub async fn run<T, F, Fut>(&self, name: &str, already_running: &str, action: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let local_lock = self.local_lock(name);
        let Ok(_guard) = local_lock.try_lock() else {
            return Err(ApiError::AlreadyRunning(already_running.to_string()));
        };

        let mut pg_lock = None;
        if let Some(lock_id) = pg_lock_id(name) {
            match self.acquire_pg_lock(lock_id).await {
                Ok(Some(conn)) => pg_lock = Some((conn, lock_id)),
                Ok(None) => {
                    return Err(ApiError::AlreadyRunning(already_running.to_string()));
                }
                // The cluster layer is best-effort: without a lock
                // connection the in-process layer still applies.
                Err(err) => {
                    warn!(name, error = %err, "Advisory lock connection unavailable");
                }
            }
        }

        let result = action().await;

        if let Some((mut conn, lock_id)) = pg_lock {
            if let Err(err) = sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(lock_id)
                .execute(&mut conn)
                .await
            {
                warn!(name, error = %err, "Advisory unlock failed");
            }
            if let Err(err) = conn.close().await {
                warn!(name, error = %err, "Advisory lock connection close failed");
            }
        }

        result
    }

    fn local_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("job lock registry poisoned");
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Open a dedicated connection and try the advisory lock.
    /// `Ok(None)` means another holder has it.
    async fn acquire_pg_lock(&self, lock_id: i64) -> Result<Option<PgConnection>, sqlx::Error> {
        let mut conn = PgConnection::connect(&self.database_url).await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(lock_id)
            .fetch_one(&mut conn)
            .await?;
        if acquired {
            Ok(Some(conn))
        } else {
            conn.close().await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // "unnamed_job" has no advisory-lock id, so these tests exercise the
    // in-process layer without a database.

    #[tokio::test]
    async fn sequential_runs_succeed() {
        let locks = JobLocks::new(String::new());
        for _ in 0..2 {
            let value = locks
                .run("unnamed_job", "already running", || async { Ok(7) })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
    }

    #[tokio::test]
    async fn concurrent_run_conflicts() {
        let locks = Arc::new(JobLocks::new(String::new()));

        let held = Arc::clone(&locks);
        let holder = tokio::spawn(async move {
            held.run("unnamed_job", "already running", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let contender = locks
            .run("unnamed_job", "already running", || async { Ok(()) })
            .await;
        assert!(matches!(contender, Err(ApiError::AlreadyRunning(_))));

        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn lock_released_after_error() {
        let locks = JobLocks::new(String::new());
        let failed: Result<(), ApiError> = locks
            .run("unnamed_job", "already running", || async {
                Err(ApiError::NotFound("missing".to_string()))
            })
            .await;
        assert!(failed.is_err());

        // A failed run must not leave the name locked.
        let ok = locks
            .run("unnamed_job", "already running", || async { Ok(1) })
            .await
            .unwrap();
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn distinct_names_do_not_contend() {
        let locks = Arc::new(JobLocks::new(String::new()));

        let held = Arc::clone(&locks);
        let holder = tokio::spawn(async move {
            held.run("job_a", "already running", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(locks
            .run("job_b", "already running", || async { Ok(()) })
            .await
            .is_ok());
        holder.await.unwrap().unwrap();
    }
}
