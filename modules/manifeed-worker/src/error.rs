use manifeed_common::BusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker queue unavailable: {0}")]
    Queue(#[from] BusError),

    #[error("Worker authentication unavailable: {0}")]
    Auth(String),

    #[error("Result serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
