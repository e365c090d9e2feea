use manifeed_common::BusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbManagerError {
    #[error("db_manager queue unavailable: {0}")]
    Queue(#[from] BusError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
