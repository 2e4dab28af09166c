use thiserror::Error;

use crate::auth::store::StoreError;

/// Environment variable that can supply the API secret instead of the keychain.
pub const SECRET_ENV_VAR: &str = "TRADEKIT_API_SECRET";

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Errors that escape token acquisition.
///
/// Cache absence, expiry and corruption never show up here; the session
/// provider recovers from them by exchanging the secret again.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(
        "No API secret configured. Run `tradekit auth set-secret` or set {}",
        SECRET_ENV_VAR
    )]
    SecretNotConfigured,

    #[error("Secret store unavailable: {0}")]
    SecretBackend(String),

    #[error("Token exchange failed with status {status}: {body}")]
    ExchangeFailed { status: u16, body: String },

    #[error("Invalid token exchange response: {0}")]
    ExchangeProtocol(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to clear token cache: {0}")]
    CacheClearFailed(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    pub fn exchange_failed(status: reqwest::StatusCode, body: &str) -> Self {
        AuthError::ExchangeFailed {
            status: status.as_u16(),
            body: truncate_body(body),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::SecretNotConfigured,
            StoreError::Backend(msg) => AuthError::SecretBackend(msg),
        }
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}
