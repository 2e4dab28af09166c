//! tradekit-core - credential and session handling for the tradekit CLI.
//!
//! This crate turns a long-lived API secret into short-lived bearer tokens
//! and keeps them usable:
//! - `auth`: secret storage, token exchange, the on-disk token cache and the
//!   `SessionProvider` that decides when to reuse or re-exchange a token
//! - `api`: `ApiClient`, which sends authenticated requests and retries once
//!   with a freshly exchanged token when the server rejects the current one
//! - `config`: base URL, token validity and the per-user config root

pub mod api;
pub mod auth;
pub mod config;
pub mod error;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError};
pub use auth::{get_auth_token, token_refresher, SessionProvider, Token, TokenRefresher};
pub use config::Config;
pub use error::AuthError;
