//! Secret-for-token exchange.
//!
//! Wire contract:
//! `POST {base_url}/v1/auth/token` with `{"secret": "...", "expiresInMinutes": N}`,
//! answered by `{"accessToken": "...", "expiresIn": <seconds, optional>}`.
//! The exchanger never retries; callers decide what a failure means.

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::store::Secret;
use super::token::{now_unix, Token};
use crate::config::Config;
use crate::error::AuthError;

const EXCHANGE_PATH: &str = "/v1/auth/token";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    secret: &'a str,
    expires_in_minutes: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeResponse {
    #[serde(default)]
    access_token: String,
    expires_in: Option<u64>,
}

/// Trades the API secret for an access token.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct TokenExchanger {
    client: Client,
    base_url: String,
}

impl TokenExchanger {
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn exchange(&self, secret: &Secret, validity_minutes: u32) -> Result<Token, AuthError> {
        self.exchange_at(secret, validity_minutes, now_unix()).await
    }

    /// Exchange using `now` as the reference time for the expiry.
    pub(crate) async fn exchange_at(
        &self,
        secret: &Secret,
        validity_minutes: u32,
        now: i64,
    ) -> Result<Token, AuthError> {
        let url = format!("{}{}", self.base_url, EXCHANGE_PATH);
        info!(url = %url, validity_minutes, "Exchanging API secret for access token");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&ExchangeRequest {
                secret: secret.expose(),
                expires_in_minutes: validity_minutes,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::exchange_failed(status, &body));
        }

        let parsed: ExchangeResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::ExchangeProtocol(format!("malformed response body: {}", e)))?;

        if parsed.access_token.is_empty() {
            return Err(AuthError::ExchangeProtocol(
                "response does not contain accessToken".to_string(),
            ));
        }

        let validity_secs = parsed
            .expires_in
            .unwrap_or(u64::from(validity_minutes) * 60);
        if validity_secs == 0 {
            return Err(AuthError::ExchangeProtocol(
                "token validity must be positive".to_string(),
            ));
        }
        let validity_secs = i64::try_from(validity_secs).unwrap_or(i64::MAX);

        let token = Token::new(parsed.access_token, now.saturating_add(validity_secs));
        info!(validity_secs, expires_at = token.expires_at, "Obtained access token");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{short_timeout_config, silent_server};
    use mockito::Matcher;

    const NOW: i64 = 1_700_000_000;

    fn exchanger(server: &mockito::ServerGuard) -> TokenExchanger {
        TokenExchanger::with_client(Client::new(), &server.url())
    }

    #[tokio::test]
    async fn test_exchange_uses_server_validity() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", EXCHANGE_PATH)
            .match_body(Matcher::Json(serde_json::json!({
                "secret": "abc",
                "expiresInMinutes": 30
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accessToken": "tok1", "expiresIn": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let token = exchanger(&server)
            .exchange_at(&Secret::new("abc"), 30, NOW)
            .await
            .unwrap();

        assert_eq!(token, Token::new("tok1", NOW + 3600));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_falls_back_to_requested_validity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", EXCHANGE_PATH)
            .with_status(200)
            .with_body(r#"{"accessToken": "tok1"}"#)
            .create_async()
            .await;

        let token = exchanger(&server)
            .exchange_at(&Secret::new("abc"), 15, NOW)
            .await
            .unwrap();

        assert_eq!(token.expires_at, NOW + 15 * 60);
    }

    #[tokio::test]
    async fn test_exchange_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", EXCHANGE_PATH)
            .with_status(403)
            .with_body(r#"{"error": "secret revoked"}"#)
            .create_async()
            .await;

        let err = exchanger(&server)
            .exchange_at(&Secret::new("abc"), 15, NOW)
            .await
            .unwrap_err();

        match err {
            AuthError::ExchangeFailed { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("secret revoked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_empty_token_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", EXCHANGE_PATH)
            .with_status(200)
            .with_body(r#"{"accessToken": "", "expiresIn": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let err = exchanger(&server)
            .exchange_at(&Secret::new("abc"), 15, NOW)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::ExchangeProtocol(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_malformed_body_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", EXCHANGE_PATH)
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let err = exchanger(&server)
            .exchange_at(&Secret::new("abc"), 15, NOW)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::ExchangeProtocol(_)));
    }

    #[tokio::test]
    async fn test_exchange_zero_validity_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", EXCHANGE_PATH)
            .with_status(200)
            .with_body(r#"{"accessToken": "tok1", "expiresIn": 0}"#)
            .create_async()
            .await;

        let err = exchanger(&server)
            .exchange_at(&Secret::new("abc"), 15, NOW)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::ExchangeProtocol(_)));
    }

    #[tokio::test]
    async fn test_exchange_gives_up_after_request_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = short_timeout_config(dir.path(), &silent_server());

        let err = TokenExchanger::new(&config)
            .unwrap()
            .exchange(&Secret::new("abc"), 15)
            .await
            .unwrap_err();

        match err {
            AuthError::Network(e) => assert!(e.is_timeout()),
            other => panic!("expected network timeout, got {:?}", other),
        }
    }
}
