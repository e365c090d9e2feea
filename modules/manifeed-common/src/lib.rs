pub mod bus;
pub mod config;
pub mod error;
pub mod payloads;
pub mod time;
pub mod types;

pub use bus::{StreamBus, StreamMessage};
pub use config::Config;
pub use error::BusError;
pub use payloads::{FeedPayload, FeedSource, ScrapeJobRequest, WorkerResult};
pub use types::{FetchProtection, JobStatus, QueueKind, ResultStatus};
