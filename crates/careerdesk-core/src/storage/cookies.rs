use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{KeyValueStore, MemoryStore, StoreError};

/// Name of the cookie mirroring the bearer token
pub const TOKEN_COOKIE: &str = "token";

/// Expiry written when a cookie is cleared: `Thu, 01 Jan 1970 00:00:01 GMT`
const CLEARED_EXPIRY_SECS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at <= now).unwrap_or(false)
    }

    /// An empty value reads the same as no cookie at all
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.value.is_empty() && !self.is_expired(now)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; path={}", self.name, self.value, self.path)?;
        if let Some(expires) = self.expires {
            write!(f, "; expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        Ok(())
    }
}

/// Cookie jar with browser semantics: writing a cookie whose expiry has
/// already passed deletes it.
pub struct CookieJar {
    backing: Box<dyn KeyValueStore>,
}

impl CookieJar {
    pub fn new(backing: Box<dyn KeyValueStore>) -> Self {
        Self { backing }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Set a cookie living for `max_age` from `now`
    pub fn set(
        &mut self,
        name: &str,
        value: &str,
        path: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store(
            Cookie {
                name: name.to_string(),
                value: value.to_string(),
                path: path.to_string(),
                expires: Some(now + max_age),
            },
            now,
        )
    }

    /// Overwrite a cookie with an empty, already-expired one
    pub fn expire(&mut self, name: &str, path: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let expires = DateTime::from_timestamp(CLEARED_EXPIRY_SECS, 0);
        self.store(
            Cookie {
                name: name.to_string(),
                value: String::new(),
                path: path.to_string(),
                expires,
            },
            now,
        )
    }

    /// The stored cookie, live or not
    pub fn get(&self, name: &str) -> Result<Option<Cookie>, StoreError> {
        match self.backing.get(name)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    /// Value of a live cookie. Unreadable cookies count as absent.
    pub fn value(&self, name: &str, now: DateTime<Utc>) -> Option<String> {
        match self.get(name) {
            Ok(Some(cookie)) if cookie.is_live(now) => Some(cookie.value),
            Ok(_) => None,
            Err(e) => {
                warn!(cookie = name, error = %e, "Unreadable cookie treated as absent");
                None
            }
        }
    }

    fn store(&mut self, cookie: Cookie, now: DateTime<Utc>) -> Result<(), StoreError> {
        debug!(cookie = %cookie.name, path = %cookie.path, expires = ?cookie.expires, "Writing cookie");
        if cookie.is_expired(now) {
            return self.backing.remove(&cookie.name);
        }
        let raw = serde_json::to_string(&cookie).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.backing.set(&cookie.name, &raw)
    }
}
