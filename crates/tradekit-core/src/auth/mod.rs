//! Authentication module for obtaining and caching API access tokens.
//!
//! This module provides:
//! - `SecretStore`: keychain-backed secret storage with an environment override
//! - `TokenExchanger`: trades the long-lived secret for a short-lived token
//! - `TokenCache`: single-token cache on disk with an absolute expiry
//! - `SessionProvider`: reuses the cached token or exchanges a new one
//!
//! Other commands only need `get_auth_token` and `token_refresher`.

pub mod cache;
pub mod exchange;
pub mod session;
pub mod store;
pub mod token;

pub use cache::{CacheError, TokenCache};
pub use exchange::TokenExchanger;
pub use session::{get_auth_token, token_refresher, SessionProvider, SessionStatus, TokenRefresher};
pub use store::{
    EnvOverrideStore, KeyringStore, MemoryStore, Secret, SecretStore, StoreError, SECRET_KEY,
    SERVICE_NAME,
};
pub use token::{now_unix, Token};
