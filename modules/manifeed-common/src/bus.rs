use redis::aio::MultiplexedConnection;
use redis::streams::StreamReadReply;
use redis::Cmd;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::BusError;

pub const CHECK_RESULTS_STREAM: &str = "rss_check_results";
pub const INGEST_RESULTS_STREAM: &str = "rss_ingest_results";
pub const ERROR_RESULTS_STREAM: &str = "error_feeds_parsing";

pub const WORKER_GROUP: &str = "worker_rss_scrapper_group";
pub const DB_MANAGER_GROUP: &str = "db_manager_group";

const COMMAND_MAX_ATTEMPTS: usize = 2;

/// A message read from a stream via a consumer group.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub stream: String,
    pub id: String,
    pub payload: String,
}

/// Redis-streams client shared by one process.
///
/// Holds a single lazily-created multiplexed connection. On a transport
/// error the connection is dropped and the command retried once; a second
/// consecutive failure surfaces as `BusError`.
pub struct StreamBus {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl StreamBus {
    pub fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url).map_err(BusError::Connect)?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    /// Append a JSON payload to a stream. Returns the message id.
    pub async fn publish(&self, stream: &str, payload: &str) -> Result<String, BusError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*").arg("payload").arg(payload);
        self.run("xadd", cmd).await
    }

    /// Create a consumer group at the stream tail, creating the stream if
    /// needed. An already-existing group (`BUSYGROUP`) is not an error.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), BusError> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(stream).arg(group).arg("$").arg("MKSTREAM");
        match self.run::<String>("xgroup_create", cmd).await {
            Ok(_) => Ok(()),
            Err(BusError::Command { source, .. }) if source.to_string().contains("BUSYGROUP") => {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Read new messages for a consumer group across one or more streams,
    /// blocking up to `block_ms`. Callers must `ack` after processing.
    ///
    /// Fails with an error satisfying `is_missing_group()` when the group
    /// does not exist; callers recreate it and retry on the next pass.
    pub async fn read_group(
        &self,
        streams: &[&str],
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamMessage>, BusError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS");
        for stream in streams {
            cmd.arg(stream);
        }
        for _ in streams {
            cmd.arg(">");
        }

        let reply: Option<StreamReadReply> = self.run("xreadgroup", cmd).await?;
        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let Some(value) = entry.map.get("payload") else {
                    warn!(stream = %key.key, id = %entry.id, "Stream entry without payload field");
                    continue;
                };
                match redis::from_redis_value::<String>(value) {
                    Ok(payload) => messages.push(StreamMessage {
                        stream: key.key.clone(),
                        id: entry.id,
                        payload,
                    }),
                    Err(err) => {
                        warn!(stream = %key.key, id = %entry.id, error = %err, "Unreadable stream payload");
                    }
                }
            }
        }
        Ok(messages)
    }

    /// Acknowledge a processed message.
    pub async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), BusError> {
        let mut cmd = redis::cmd("XACK");
        cmd.arg(stream).arg(group).arg(id);
        self.run::<i64>("xack", cmd).await?;
        Ok(())
    }

    async fn run<T: redis::FromRedisValue>(
        &self,
        command: &'static str,
        cmd: Cmd,
    ) -> Result<T, BusError> {
        let mut last_err = None;
        for _ in 0..COMMAND_MAX_ATTEMPTS {
            let mut conn = self.connection().await?;
            let result: Result<T, redis::RedisError> = cmd.query_async(&mut conn).await;
            match result {
                Ok(value) => return Ok(value),
                Err(err) if is_transport_error(&err) => {
                    warn!(command, error = %err, "Redis transport error, resetting connection");
                    self.reset().await;
                    last_err = Some(err);
                }
                Err(err) => return Err(BusError::Command { command, source: err }),
            }
        }
        Err(BusError::Transport {
            command,
            source: last_err.expect("retry loop always records an error"),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BusError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(BusError::Connect)?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        let mut guard = self.conn.lock().await;
        *guard = None;
    }
}

fn is_transport_error(err: &redis::RedisError) -> bool {
    err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
}
