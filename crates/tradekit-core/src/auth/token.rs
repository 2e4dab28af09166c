use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short-lived bearer token with an absolute expiry in Unix seconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub expires_at: i64,
}

impl Token {
    pub fn new(access_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// A token expiring exactly at `now` is already expired.
    pub fn is_valid(&self, now: i64) -> bool {
        self.expires_at > now
    }

    pub fn seconds_remaining(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Current time in Unix seconds
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}
