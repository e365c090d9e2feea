use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use manifeed_common::Config;

use crate::error::ApiError;

/// Claims carried by a worker access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub scope: String,
}

/// A freshly issued worker token.
#[derive(Debug, Serialize)]
pub struct IssuedWorkerToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 worker tokens against configured credentials.
#[derive(Clone)]
pub struct WorkerTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    credentials: HashMap<String, String>,
}

impl WorkerTokenService {
    pub fn new(config: &Config) -> Self {
        let mut credentials: HashMap<String, String> =
            config.worker_credentials.iter().cloned().collect();
        if credentials.is_empty() {
            credentials.insert(config.worker_id.clone(), config.worker_secret.clone());
        }

        Self {
            encoding_key: EncodingKey::from_secret(config.worker_token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.worker_token_secret.as_bytes()),
            ttl: Duration::seconds(config.worker_token_ttl_seconds.max(60) as i64),
            credentials,
        }
    }

    /// Issue a token when the presented credentials match a configured pair.
    pub fn issue(
        &self,
        worker_id: &str,
        worker_secret: &str,
    ) -> Result<IssuedWorkerToken, ApiError> {
        let matches = self
            .credentials
            .get(worker_id)
            .is_some_and(|expected| expected == worker_secret);
        if !matches {
            return Err(ApiError::InvalidWorkerCredentials);
        }

        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = WorkerClaims {
            sub: worker_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            scope: "worker".to_string(),
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::Internal(err.into()))?;
        Ok(IssuedWorkerToken {
            access_token,
            expires_at,
        })
    }

    /// Verify and decode a worker token.
    pub fn verify(&self, token: &str) -> Result<WorkerClaims, ApiError> {
        decode::<WorkerClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::InvalidWorkerCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> WorkerTokenService {
        let mut config = Config::worker_from_env();
        config.worker_id = "worker_rss_scrapper".to_string();
        config.worker_secret = "secret".to_string();
        config.worker_token_secret = "test-token-secret".to_string();
        config.worker_token_ttl_seconds = 3600;
        WorkerTokenService::new(&config)
    }

    #[test]
    fn issued_token_round_trips() {
        let service = test_service();
        let issued = service.issue("worker_rss_scrapper", "secret").unwrap();
        let claims = service.verify(&issued.access_token).unwrap();
        assert_eq!(claims.sub, "worker_rss_scrapper");
        assert_eq!(claims.scope, "worker");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let service = test_service();
        assert!(matches!(
            service.issue("worker_rss_scrapper", "nope"),
            Err(ApiError::InvalidWorkerCredentials)
        ));
    }

    #[test]
    fn unknown_worker_is_rejected() {
        let service = test_service();
        assert!(matches!(
            service.issue("someone_else", "secret"),
            Err(ApiError::InvalidWorkerCredentials)
        ));
    }

    #[test]
    fn extra_credential_pairs_are_accepted() {
        let mut config = Config::worker_from_env();
        config.worker_credentials = vec![
            ("scraper_a".to_string(), "sa".to_string()),
            ("scraper_b".to_string(), "sb".to_string()),
        ];
        config.worker_token_secret = "test-token-secret".to_string();
        let service = WorkerTokenService::new(&config);
        assert!(service.issue("scraper_b", "sb").is_ok());
        assert!(service.issue("scraper_a", "sb").is_err());
    }
}
