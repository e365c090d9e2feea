use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{error, info, warn};

use manifeed_common::bus::{
    StreamBus, StreamMessage, CHECK_RESULTS_STREAM, DB_MANAGER_GROUP, ERROR_RESULTS_STREAM,
    INGEST_RESULTS_STREAM,
};
use manifeed_common::payloads::WorkerResult;
use manifeed_common::types::QueueKind;

use crate::error::DbManagerError;
use crate::store::persist_worker_result;

const RESULT_STREAMS: [&str; 3] = [
    CHECK_RESULTS_STREAM,
    INGEST_RESULTS_STREAM,
    ERROR_RESULTS_STREAM,
];
const READ_COUNT: usize = 10;
const QUEUE_BLOCK_MS: usize = 5000;
const LOOP_BACKOFF: Duration = Duration::from_secs(1);
const CONSUMER_NAME: &str = "db_manager_1";

/// Consumes the three result streams with one consumer group and applies
/// each message to Postgres in its own transaction.
pub struct ResultConsumer {
    bus: Arc<StreamBus>,
    pool: PgPool,
}

impl ResultConsumer {
    pub fn new(bus: Arc<StreamBus>, pool: PgPool) -> Self {
        Self { bus, pool }
    }

    pub async fn ensure_groups(&self) -> Result<(), DbManagerError> {
        for stream in RESULT_STREAMS {
            self.bus.ensure_group(stream, DB_MANAGER_GROUP).await?;
        }
        Ok(())
    }

    pub async fn run(&self) -> Result<(), DbManagerError> {
        self.ensure_groups().await?;
        info!("db_manager started");

        loop {
            if let Err(err) = self.tick().await {
                warn!(error = %err, "db_manager loop error");
                tokio::time::sleep(LOOP_BACKOFF).await;
            }
        }
    }

    async fn tick(&self) -> Result<(), DbManagerError> {
        let messages = match self
            .bus
            .read_group(
                &RESULT_STREAMS,
                DB_MANAGER_GROUP,
                CONSUMER_NAME,
                READ_COUNT,
                QUEUE_BLOCK_MS,
            )
            .await
        {
            Ok(messages) => messages,
            Err(err) if err.is_missing_group() => {
                self.ensure_groups().await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        for message in messages {
            self.process_message(&message).await?;
        }
        Ok(())
    }

    /// Persist one result message. Commit precedes ACK; a persistence error
    /// rolls back and leaves the message pending for redelivery. Messages
    /// that fail schema validation are poison: logged and ACK'd without any
    /// write.
    async fn process_message(&self, message: &StreamMessage) -> Result<(), DbManagerError> {
        let payload: WorkerResult = match serde_json::from_str(&message.payload) {
            Ok(payload) => payload,
            Err(err) => {
                error!(id = %message.id, stream = %message.stream, error = %err, "Invalid worker result payload");
                return self.ack(message).await;
            }
        };
        if let Err(err) = payload.validate() {
            error!(id = %message.id, stream = %message.stream, error = %err, "Invalid worker result payload");
            return self.ack(message).await;
        }

        let queue_kind = QueueKind::from_stream(&message.stream);

        let mut tx = self.pool.begin().await?;
        match persist_worker_result(&mut *tx, &payload, queue_kind).await {
            Ok(_) => {
                tx.commit().await?;
            }
            Err(err) => {
                drop(tx);
                error!(
                    id = %message.id,
                    job_id = %payload.job_id,
                    feed_id = payload.feed_id,
                    error = %err,
                    "Failed to persist worker result"
                );
                return Ok(());
            }
        }

        self.ack(message).await
    }

    async fn ack(&self, message: &StreamMessage) -> Result<(), DbManagerError> {
        self.bus
            .ack(&message.stream, DB_MANAGER_GROUP, &message.id)
            .await?;
        Ok(())
    }
}
