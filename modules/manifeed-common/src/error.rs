use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Redis connection failed: {0}")]
    Connect(#[source] redis::RedisError),

    #[error("Redis command '{command}' failed after reconnect: {source}")]
    Transport {
        command: &'static str,
        #[source]
        source: redis::RedisError,
    },

    #[error("Redis command '{command}' failed: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: redis::RedisError,
    },
}

impl BusError {
    /// True when the server rejected a group read because the consumer group
    /// does not exist yet (`NOGROUP`). Callers recreate the group and retry.
    pub fn is_missing_group(&self) -> bool {
        match self {
            BusError::Command { source, .. } => source.to_string().contains("NOGROUP"),
            _ => false,
        }
    }
}

/// A bus payload that failed schema validation.
#[derive(Error, Debug)]
#[error("invalid payload: {0}")]
pub struct PayloadError(pub String);
