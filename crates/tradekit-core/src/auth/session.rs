use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use super::cache::{CacheError, TokenCache};
use super::exchange::TokenExchanger;
use super::store::{SecretStore, SECRET_KEY, SERVICE_NAME};
use super::token::{now_unix, Token};
use crate::config::Config;
use crate::error::AuthError;

/// Zero-argument callback returning a freshly exchanged access token.
/// Handed to the API client so it can recover from a rejected token.
pub type TokenRefresher = Arc<dyn Fn() -> BoxFuture<'static, Result<String, AuthError>> + Send + Sync>;

/// State of the cached token, as seen without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    NotAuthenticated,
    Valid { seconds_remaining: i64, expires_at: i64 },
    Expired { expires_at: i64 },
    Corrupt,
}

/// Decides whether the cached token can be used or a new one must be
/// exchanged for the stored secret.
pub struct SessionProvider<S> {
    store: S,
    exchanger: TokenExchanger,
    cache: TokenCache,
    validity_minutes: u32,
    clock: fn() -> i64,
}

impl<S: SecretStore> SessionProvider<S> {
    pub fn new(store: S, config: &Config) -> Result<Self, AuthError> {
        Ok(Self::from_parts(
            store,
            TokenExchanger::new(config)?,
            TokenCache::new(config.token_cache_path()),
            config.token_validity_minutes,
        ))
    }

    pub fn from_parts(
        store: S,
        exchanger: TokenExchanger,
        cache: TokenCache,
        validity_minutes: u32,
    ) -> Self {
        Self {
            store,
            exchanger,
            cache,
            validity_minutes,
            clock: now_unix,
        }
    }

    /// Replace the time source used for validity checks and expiry computation.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Return a usable token.
    ///
    /// Unless `force_refresh` is set, a valid cached token is returned without
    /// any network call. A missing, expired or unreadable cache, or a forced
    /// refresh, exchanges the secret for a new token and caches it.
    pub async fn get_token(&self, force_refresh: bool) -> Result<Token, AuthError> {
        let now = (self.clock)();

        if !force_refresh {
            match self.cache.load() {
                Ok(token) if token.is_valid(now) => {
                    debug!(expires_at = token.expires_at, "Using cached access token");
                    return Ok(token);
                }
                Ok(token) => debug!(expires_at = token.expires_at, "Cached access token expired"),
                Err(CacheError::Missing) => debug!("No cached access token"),
                Err(e) => debug!(error = %e, "Ignoring unreadable token cache"),
            }
        } else {
            debug!("Forced token refresh, bypassing cache");
        }

        let secret = self.store.get(SERVICE_NAME, SECRET_KEY)?;
        let token = self
            .exchanger
            .exchange_at(&secret, self.validity_minutes, now)
            .await?;

        if let Err(e) = self.cache.save(&token) {
            warn!(
                path = %self.cache.path().display(),
                error = %e,
                "Failed to cache access token"
            );
        }

        Ok(token)
    }

    /// Inspect the cached token without exchanging anything.
    pub fn status(&self) -> SessionStatus {
        let now = (self.clock)();
        match self.cache.load() {
            Ok(token) if token.is_valid(now) => SessionStatus::Valid {
                seconds_remaining: token.seconds_remaining(now),
                expires_at: token.expires_at,
            },
            Ok(token) => SessionStatus::Expired {
                expires_at: token.expires_at,
            },
            Err(CacheError::Missing) => SessionStatus::NotAuthenticated,
            Err(_) => SessionStatus::Corrupt,
        }
    }

    pub fn clear_cache(&self) -> Result<(), AuthError> {
        self.cache.clear().map_err(AuthError::CacheClearFailed)
    }
}

/// Obtain a bearer token for the configured API, exchanging the stored secret
/// when the cache cannot be used or `force_refresh` is set.
pub async fn get_auth_token<S: SecretStore>(
    store: &S,
    config: &Config,
    force_refresh: bool,
) -> Result<String, AuthError> {
    let provider = SessionProvider::new(store, config)?;
    Ok(provider.get_token(force_refresh).await?.access_token)
}

/// Build a [`TokenRefresher`] that always forces a new exchange.
pub fn token_refresher<S>(store: Arc<S>, config: Config) -> TokenRefresher
where
    S: SecretStore + 'static,
{
    Arc::new(move || {
        let store = Arc::clone(&store);
        let config = config.clone();
        async move { get_auth_token(&*store, &config, true).await }.boxed()
    })
}
