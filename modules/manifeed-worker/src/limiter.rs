use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

const TOKEN_RETURN_DELAY: Duration = Duration::from_secs(1);

/// Token bucket bounding requests per second against one company.
///
/// `acquire` takes a token and schedules its return one second later, so at
/// most `capacity` requests start within any one-second window. Limiters are
/// process-local; aggregate rates scale with worker replicas.
pub struct CompanyRateLimiter {
    tokens: Arc<Semaphore>,
}

impl CompanyRateLimiter {
    pub fn new(max_requests_per_second: usize) -> Self {
        Self {
            tokens: Arc::new(Semaphore::new(max_requests_per_second.max(1))),
        }
    }

    /// Block until a token is available.
    pub async fn acquire(&self) {
        let permit = self
            .tokens
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore closed");
        permit.forget();

        let tokens = Arc::clone(&self.tokens);
        tokio::spawn(async move {
            tokio::time::sleep(TOKEN_RETURN_DELAY).await;
            tokens.add_permits(1);
        });
    }
}

/// Lazily-created limiters keyed by company, retained for the process
/// lifetime.
pub struct RateLimiterMap {
    max_requests_per_second: usize,
    limiters: Mutex<HashMap<String, Arc<CompanyRateLimiter>>>,
}

impl RateLimiterMap {
    pub fn new(max_requests_per_second: usize) -> Self {
        Self {
            max_requests_per_second,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, company_key: &str) -> Arc<CompanyRateLimiter> {
        let mut limiters = self.limiters.lock().expect("rate limiter map poisoned");
        Arc::clone(limiters.entry(company_key.to_string()).or_insert_with(|| {
            Arc::new(CompanyRateLimiter::new(self.max_requests_per_second))
        }))
    }
}
