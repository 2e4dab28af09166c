//! REST API client module.
//!
//! `ApiClient` attaches the bearer token to every request and, when the
//! server answers 401, asks its `TokenRefresher` for a new token and resends
//! the request once. Endpoint-specific request and response shapes live with
//! the commands that use them.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
