//! Secret storage backends.
//!
//! All backends implement [`SecretStore`]:
//! - [`KeyringStore`]: the OS keychain
//! - [`EnvOverrideStore`]: wraps another store so `TRADEKIT_API_SECRET` wins
//!   over it for the secret key only
//! - [`MemoryStore`]: in-process store with injectable failures, for tests

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use keyring::Entry;
use thiserror::Error;
use tracing::debug;

use crate::error::SECRET_ENV_VAR;

/// Keychain service the secret is stored under
pub const SERVICE_NAME: &str = "tradekit";

/// Keychain key holding the API secret
pub const SECRET_KEY: &str = "api-secret";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("secret not found")]
    NotFound,

    #[error("secret store backend error: {0}")]
    Backend(String),
}

/// Long-lived API credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

pub trait SecretStore: Send + Sync {
    fn get(&self, service: &str, key: &str) -> Result<Secret, StoreError>;

    fn set(&self, service: &str, key: &str, value: &Secret) -> Result<(), StoreError>;

    /// Deleting an absent key succeeds.
    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError>;
}

impl<T: SecretStore + ?Sized> SecretStore for &T {
    fn get(&self, service: &str, key: &str) -> Result<Secret, StoreError> {
        (**self).get(service, key)
    }

    fn set(&self, service: &str, key: &str, value: &Secret) -> Result<(), StoreError> {
        (**self).set(service, key, value)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(service, key)
    }
}

impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    fn get(&self, service: &str, key: &str) -> Result<Secret, StoreError> {
        (**self).get(service, key)
    }

    fn set(&self, service: &str, key: &str, value: &Secret) -> Result<(), StoreError> {
        (**self).set(service, key, value)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(service, key)
    }
}

// ============================================================================
// Keychain
// ============================================================================

/// OS keychain backend: macOS Keychain, Windows Credential Manager, and on
/// Linux the Secret Service fronted by the kernel keyring, so stored secrets
/// survive a reboot.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry(service: &str, key: &str) -> Result<Entry, StoreError> {
        Entry::new(service, key).map_err(backend_error)
    }

    fn read(entry: &Entry) -> Result<Secret, StoreError> {
        match entry.get_password() {
            Ok(value) => Ok(Secret::new(value)),
            Err(keyring::Error::NoEntry) => Err(StoreError::NotFound),
            Err(e) => Err(backend_error(e)),
        }
    }

    fn write(entry: &Entry, value: &Secret) -> Result<(), StoreError> {
        entry.set_password(value.expose()).map_err(backend_error)
    }

    fn remove(entry: &Entry) -> Result<(), StoreError> {
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(backend_error(e)),
        }
    }
}

fn backend_error(err: keyring::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl SecretStore for KeyringStore {
    fn get(&self, service: &str, key: &str) -> Result<Secret, StoreError> {
        Self::read(&Self::entry(service, key)?)
    }

    fn set(&self, service: &str, key: &str, value: &Secret) -> Result<(), StoreError> {
        Self::write(&Self::entry(service, key)?, value)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        Self::remove(&Self::entry(service, key)?)
    }
}

// ============================================================================
// Environment override
// ============================================================================

/// Lets an environment variable pre-empt the inner store when reading the
/// secret key. Writes, deletes and every other key go straight to `inner`.
pub struct EnvOverrideStore<S> {
    inner: S,
    secret_key: String,
    env_var: String,
}

impl<S: SecretStore> EnvOverrideStore<S> {
    /// Override [`SECRET_KEY`] with `TRADEKIT_API_SECRET`.
    pub fn new(inner: S) -> Self {
        Self::with_env_var(inner, SECRET_KEY, SECRET_ENV_VAR)
    }

    pub fn with_env_var(inner: S, secret_key: &str, env_var: &str) -> Self {
        Self {
            inner,
            secret_key: secret_key.to_string(),
            env_var: env_var.to_string(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn override_value(&self) -> Option<Secret> {
        std::env::var(&self.env_var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Secret::new)
    }
}

impl<S: SecretStore> SecretStore for EnvOverrideStore<S> {
    fn get(&self, service: &str, key: &str) -> Result<Secret, StoreError> {
        if key == self.secret_key {
            if let Some(secret) = self.override_value() {
                debug!(env_var = %self.env_var, "Using secret from environment");
                return Ok(secret);
            }
        }
        self.inner.get(service, key)
    }

    fn set(&self, service: &str, key: &str, value: &Secret) -> Result<(), StoreError> {
        self.inner.set(service, key, value)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        self.inner.delete(service, key)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-process store. Each operation can be configured to fail with a backend
/// error, and `get` calls are counted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), String>>,
    get_calls: AtomicUsize,
    pub fail_get: Option<String>,
    pub fail_set: Option<String>,
    pub fail_delete: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the API secret under the default service/key.
    pub fn with_secret(secret: &str) -> Self {
        let store = Self::new();
        store
            .lock()
            .insert((SERVICE_NAME.to_string(), SECRET_KEY.to_string()), secret.to_string());
        store
    }

    pub fn with_get_error(mut self, msg: &str) -> Self {
        self.fail_get = Some(msg.to_string());
        self
    }

    pub fn with_set_error(mut self, msg: &str) -> Self {
        self.fail_set = Some(msg.to_string());
        self
    }

    pub fn with_delete_error(mut self, msg: &str) -> Self {
        self.fail_delete = Some(msg.to_string());
        self
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, service: &str, key: &str) -> Result<Secret, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref msg) = self.fail_get {
            return Err(StoreError::Backend(msg.clone()));
        }
        self.lock()
            .get(&(service.to_string(), key.to_string()))
            .map(|v| Secret::new(v.clone()))
            .ok_or(StoreError::NotFound)
    }

    fn set(&self, service: &str, key: &str, value: &Secret) -> Result<(), StoreError> {
        if let Some(ref msg) = self.fail_set {
            return Err(StoreError::Backend(msg.clone()));
        }
        self.lock()
            .insert((service.to_string(), key.to_string()), value.expose().to_string());
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        if let Some(ref msg) = self.fail_delete {
            return Err(StoreError::Backend(msg.clone()));
        }
        self.lock().remove(&(service.to_string(), key.to_string()));
        Ok(())
    }
}
