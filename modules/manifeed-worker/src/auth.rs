use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use manifeed_common::Config;

use crate::error::WorkerError;

const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WorkerTokenResponse {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Backend token client with an in-memory cache. The token is reused until
/// it is within 60 s of expiry, then refreshed.
pub struct WorkerAuth {
    http: reqwest::Client,
    token_endpoint: String,
    worker_id: String,
    worker_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl WorkerAuth {
    pub fn new(config: &Config) -> Result<Self, WorkerError> {
        if config.worker_id.trim().is_empty() || config.worker_secret.trim().is_empty() {
            return Err(WorkerError::Auth(
                "Worker credentials are not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| WorkerError::Auth(format!("HTTP client build failed: {err}")))?;
        Ok(Self {
            http,
            token_endpoint: format!(
                "{}/internal/workers/token",
                config.api_url.trim_end_matches('/')
            ),
            worker_id: config.worker_id.clone(),
            worker_secret: config.worker_secret.clone(),
            cached: Mutex::new(None),
        })
    }

    /// Return a valid access token, requesting a fresh one when the cached
    /// token is absent or about to expire.
    pub async fn ensure_authenticated(&self) -> Result<String, WorkerError> {
        let mut cached = self.cached.lock().await;

        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if now + chrono::Duration::seconds(TOKEN_REFRESH_BUFFER_SECS) < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn request_token(&self) -> Result<CachedToken, WorkerError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .json(&serde_json::json!({
                "worker_id": self.worker_id,
                "worker_secret": self.worker_secret,
            }))
            .send()
            .await
            .map_err(|err| WorkerError::Auth(format!("Token request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(WorkerError::Auth(format!(
                "Token request failed: HTTP {}",
                response.status()
            )));
        }

        let payload: WorkerTokenResponse = response
            .json()
            .await
            .map_err(|err| WorkerError::Auth(format!("Invalid token response: {err}")))?;
        if payload.access_token.is_empty() {
            return Err(WorkerError::Auth(
                "Token response does not contain a valid access_token".to_string(),
            ));
        }

        Ok(CachedToken {
            token: payload.access_token,
            expires_at: payload.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(url: &str) -> Config {
        let mut config = Config::worker_from_env();
        config.api_url = url.to_string();
        config.worker_id = "worker_rss_scrapper".to_string();
        config.worker_secret = "secret".to_string();
        config
    }

    #[tokio::test]
    async fn fetches_and_caches_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/internal/workers/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token": "tok-1", "expires_at": "2100-01-01T00:00:00Z"}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let auth = WorkerAuth::new(&config_for(&server.url())).unwrap();
        assert_eq!(auth.ensure_authenticated().await.unwrap(), "tok-1");
        // Second call is served from cache; the mock allows one hit only.
        assert_eq!(auth.ensure_authenticated().await.unwrap(), "tok-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/internal/workers/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token": "tok-2", "expires_at": "2000-01-01T00:00:00Z"}"#,
            )
            .expect(2)
            .create_async()
            .await;

        let auth = WorkerAuth::new(&config_for(&server.url())).unwrap();
        auth.ensure_authenticated().await.unwrap();
        auth.ensure_authenticated().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/internal/workers/token")
            .with_status(401)
            .create_async()
            .await;

        let auth = WorkerAuth::new(&config_for(&server.url())).unwrap();
        let err = auth.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, WorkerError::Auth(_)));
    }
}
