//! Authenticated API client.
//!
//! Every request carries the current bearer token. A 401 answer triggers at
//! most one recovery: the configured `TokenRefresher` forces a new exchange
//! and the identical request is sent again with the new token. A second 401,
//! or a 401 with no refresher configured, is returned as `ApiError::Unauthorized`.

use std::sync::{Arc, Mutex};

use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{get_auth_token, token_refresher, SecretStore, TokenRefresher};
use crate::config::Config;

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Mutex<String>,
    refresher: Option<TokenRefresher>,
}

impl ApiClient {
    /// Create a client for the configured API using `token`, without
    /// self-healing. See [`ApiClient::with_refresher`].
    pub fn new(config: &Config, token: String) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, &config.base_url, token))
    }

    pub fn with_client(client: Client, base_url: &str, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(token),
            refresher: None,
        }
    }

    /// Enable the single retry on 401 using `refresher` to obtain a new token.
    pub fn with_refresher(mut self, refresher: TokenRefresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Client with a token from the session cache (or a fresh exchange) and a
    /// refresher bound to the same store and config.
    pub async fn authenticated<S>(store: Arc<S>, config: &Config) -> Result<Self, ApiError>
    where
        S: SecretStore + 'static,
    {
        let token = get_auth_token(&*store, config, false).await?;
        Ok(Self::new(config, token)?.with_refresher(token_refresher(store, config.clone())))
    }

    /// The token the next request will carry.
    pub fn token(&self) -> String {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_token(&self, token: String) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request against `path` relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json")
    }

    /// Send `request` with the current token, retrying once with a refreshed
    /// token if the server rejects it. Any non-401 response is returned as-is.
    pub async fn send(&self, request: Request) -> Result<Response, ApiError> {
        let retry = request.try_clone();
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self.execute(request, &self.token()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(refresher) = self.refresher.as_ref() else {
            debug!(method = %method, url = %url, "Access token rejected, no refresher configured");
            return Err(Self::rejection(response).await);
        };
        let Some(retry) = retry else {
            warn!(method = %method, url = %url, "Access token rejected, request body cannot be resent");
            return Err(Self::rejection(response).await);
        };

        warn!(method = %method, url = %url, "Access token rejected, refreshing and retrying once");
        let token = refresher().await?;
        self.set_token(token.clone());

        let response = self.execute(retry, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(method = %method, url = %url, "Refreshed access token rejected");
            return Err(Self::rejection(response).await);
        }
        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path).build()?;
        Self::parse_json(self.send(request).await?).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.request(Method::POST, path).json(body).build()?;
        Self::parse_json(self.send(request).await?).await
    }

    async fn execute(&self, mut request: Request, token: &str) -> Result<Response, ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::InvalidToken)?;
        value.set_sensitive(true);
        request.headers_mut().insert(header::AUTHORIZATION, value);

        let response = self.client.execute(request).await?;
        debug!(status = %response.status(), "Received API response");
        Ok(response)
    }

    async fn rejection(response: Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ApiError::from_status(status, &body)
    }

    /// Check if response is successful and decode it, returning an error with body if not.
    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}
