pub mod auth;
pub mod consumer;
pub mod error;
pub mod fetch;
pub mod limiter;
pub mod normalize;
pub mod parse;

pub use consumer::ScrapeWorker;
pub use error::WorkerError;
