use std::env;
use std::path::PathBuf;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Redis
    pub redis_url: String,
    pub requests_stream: String,

    // API server
    pub api_host: String,
    pub api_port: u16,
    pub cors_origins: Vec<String>,

    // Feed catalog repository (git)
    pub repository_url: String,
    pub repository_branch: String,
    pub repository_path: PathBuf,

    // Worker credentials and tokens
    pub worker_id: String,
    pub worker_secret: String,
    /// Extra `id:secret` pairs accepted by the token endpoint.
    pub worker_credentials: Vec<(String, String)>,
    pub worker_token_secret: String,
    pub worker_token_ttl_seconds: u64,

    // Worker tuning
    pub queue_read_count: usize,
    pub company_max_requests_per_second: usize,
    pub queue_batch_size: usize,

    /// Backend base URL the worker authenticates against.
    pub api_url: String,
}

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
pub const DEFAULT_REQUESTS_STREAM: &str = "rss_scrape_requests";
pub const DEFAULT_WORKER_ID: &str = "worker_rss_scrapper";
pub const DEFAULT_WORKER_SECRET: &str = "change-me";
pub const DEFAULT_QUEUE_READ_COUNT: usize = 20;
pub const DEFAULT_COMPANY_MAX_REQUESTS_PER_SECOND: usize = 4;
pub const DEFAULT_QUEUE_BATCH_SIZE: usize = 50;
pub const DEFAULT_WORKER_TOKEN_TTL_SECONDS: u64 = 3600;

impl Config {
    /// Load configuration for the API backend.
    /// Panics with a clear message if required vars are missing.
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            requests_stream: requests_stream_from_env(),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("API_PORT must be a number"),
            cors_origins: cors_origins_from_env(),
            repository_url: env::var("RSS_FEEDS_REPOSITORY_URL").unwrap_or_default(),
            repository_branch: env::var("RSS_FEEDS_REPOSITORY_BRANCH")
                .unwrap_or_else(|_| "main".to_string()),
            repository_path: PathBuf::from(
                env::var("RSS_FEEDS_REPOSITORY_PATH")
                    .unwrap_or_else(|_| "./data/rss-feeds".to_string()),
            ),
            worker_id: env::var("WORKER_ID").unwrap_or_else(|_| DEFAULT_WORKER_ID.to_string()),
            worker_secret: env::var("WORKER_SECRET")
                .unwrap_or_else(|_| DEFAULT_WORKER_SECRET.to_string()),
            worker_credentials: worker_credentials_from_env(),
            worker_token_secret: env::var("WORKER_TOKEN_SECRET")
                .unwrap_or_else(|_| "manifeed-worker-token-secret".to_string()),
            worker_token_ttl_seconds: parsed_env(
                "WORKER_TOKEN_TTL_SECONDS",
                DEFAULT_WORKER_TOKEN_TTL_SECONDS,
            )
            .max(60),
            queue_read_count: DEFAULT_QUEUE_READ_COUNT,
            company_max_requests_per_second: DEFAULT_COMPANY_MAX_REQUESTS_PER_SECOND,
            queue_batch_size: positive_env("RSS_SCRAPE_QUEUE_BATCH_SIZE", DEFAULT_QUEUE_BATCH_SIZE),
            api_url: String::new(),
        }
    }

    /// Load configuration for a scrape worker (no Postgres access).
    pub fn worker_from_env() -> Self {
        Self {
            database_url: String::new(),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            requests_stream: requests_stream_from_env(),
            api_host: String::new(),
            api_port: 0,
            cors_origins: Vec::new(),
            repository_url: String::new(),
            repository_branch: String::new(),
            repository_path: PathBuf::new(),
            worker_id: env::var("WORKER_ID").unwrap_or_else(|_| DEFAULT_WORKER_ID.to_string()),
            worker_secret: env::var("WORKER_SECRET")
                .unwrap_or_else(|_| DEFAULT_WORKER_SECRET.to_string()),
            worker_credentials: Vec::new(),
            worker_token_secret: String::new(),
            worker_token_ttl_seconds: DEFAULT_WORKER_TOKEN_TTL_SECONDS,
            queue_read_count: positive_env("WORKER_QUEUE_READ_COUNT", DEFAULT_QUEUE_READ_COUNT),
            company_max_requests_per_second: positive_env(
                "WORKER_COMPANY_MAX_REQUESTS_PER_SECOND",
                DEFAULT_COMPANY_MAX_REQUESTS_PER_SECOND,
            ),
            queue_batch_size: DEFAULT_QUEUE_BATCH_SIZE,
            api_url: env::var("MANIFEED_API_URL")
                .unwrap_or_else(|_| "http://backend:8000".to_string()),
        }
    }

    /// Load configuration for the result persistence service.
    pub fn db_manager_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            requests_stream: requests_stream_from_env(),
            api_host: String::new(),
            api_port: 0,
            cors_origins: Vec::new(),
            repository_url: String::new(),
            repository_branch: String::new(),
            repository_path: PathBuf::new(),
            worker_id: String::new(),
            worker_secret: String::new(),
            worker_credentials: Vec::new(),
            worker_token_secret: String::new(),
            worker_token_ttl_seconds: DEFAULT_WORKER_TOKEN_TTL_SECONDS,
            queue_read_count: DEFAULT_QUEUE_READ_COUNT,
            company_max_requests_per_second: DEFAULT_COMPANY_MAX_REQUESTS_PER_SECOND,
            queue_batch_size: DEFAULT_QUEUE_BATCH_SIZE,
            api_url: String::new(),
        }
    }
}

fn requests_stream_from_env() -> String {
    env::var("REDIS_QUEUE_REQUESTS").unwrap_or_else(|_| DEFAULT_REQUESTS_STREAM.to_string())
}

fn cors_origins_from_env() -> Vec<String> {
    env::var("CORS_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

/// Parse `WORKER_CREDENTIALS` as comma-separated `id:secret` pairs.
fn worker_credentials_from_env() -> Vec<(String, String)> {
    let raw = env::var("WORKER_CREDENTIALS").unwrap_or_default();
    let mut credentials = Vec::new();
    for chunk in raw.split(',') {
        let Some((worker_id, worker_secret)) = chunk.trim().split_once(':') else {
            continue;
        };
        let worker_id = worker_id.trim();
        let worker_secret = worker_secret.trim();
        if !worker_id.is_empty() && !worker_secret.is_empty() {
            credentials.push((worker_id.to_string(), worker_secret.to_string()));
        }
    }
    credentials
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Like `parsed_env` but rejects zero, falling back to the default.
fn positive_env(key: &str, default: usize) -> usize {
    match parsed_env(key, default) {
        0 => default,
        value => value,
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
