//! OAuth access-token exchange and caching.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use admitbot_shared::{AdmitBotError, Result};

/// Tokens this close to expiry (seconds) are refreshed instead of reused.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token endpoint response. `expires_at` is epoch milliseconds.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Exchanges the authorization key for access tokens and caches them.
pub(crate) struct TokenProvider {
    auth_url: String,
    credentials: String,
    scope: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub(crate) fn new(auth_url: String, credentials: String, scope: String) -> Self {
        Self {
            auth_url,
            credentials,
            scope,
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, fetching a new one if needed.
    pub(crate) async fn token(&self, http: &Client) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.request_token(http).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Forget the cached token (after the API rejected it).
    pub(crate) async fn invalidate(&self) {
        debug!("invalidating cached access token");
        *self.cached.lock().await = None;
    }

    async fn request_token(&self, http: &Client) -> Result<AccessToken> {
        let response = http
            .post(&self.auth_url)
            .header("Authorization", format!("Basic {}", self.credentials))
            .header("RqUID", Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| AdmitBotError::Completion(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdmitBotError::Completion(format!(
                "token request rejected: HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AdmitBotError::Completion(format!("invalid token response: {e}")))?;

        let expires_at = DateTime::from_timestamp_millis(parsed.expires_at).ok_or_else(|| {
            AdmitBotError::Completion(format!("invalid token expiry: {}", parsed.expires_at))
        })?;

        info!(%expires_at, "obtained access token");
        Ok(AccessToken {
            value: parsed.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_freshness_respects_margin() {
        let now = Utc::now();
        let fresh = AccessToken {
            value: "t".into(),
            expires_at: now + TimeDelta::minutes(30),
        };
        let stale = AccessToken {
            value: "t".into(),
            expires_at: now + TimeDelta::seconds(30),
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[tokio::test]
    async fn token_is_cached_until_invalidated() {
        let server = wiremock::MockServer::start().await;
        let expires_at = Utc::now().timestamp_millis() + 30 * 60 * 1000;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/v2/oauth"))
            .and(wiremock::matchers::header("Authorization", "Basic c2VjcmV0"))
            .and(wiremock::matchers::header_exists("RqUID"))
            .and(wiremock::matchers::body_string_contains("scope=GIGACHAT_API_PERS"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "access_token": "tok-1", "expires_at": expires_at }),
            ))
            .expect(2)
            .mount(&server)
            .await;

        let provider = TokenProvider::new(
            format!("{}/api/v2/oauth", server.uri()),
            "c2VjcmV0".into(),
            "GIGACHAT_API_PERS".into(),
        );
        let http = Client::new();

        assert_eq!(provider.token(&http).await.unwrap(), "tok-1");
        assert_eq!(provider.token(&http).await.unwrap(), "tok-1");
        provider.invalidate().await;
        assert_eq!(provider.token(&http).await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn rejected_credentials_are_reported() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = TokenProvider::new(server.uri(), "bad".into(), "GIGACHAT_API_PERS".into());
        let err = provider.token(&Client::new()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
