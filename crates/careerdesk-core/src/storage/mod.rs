//! Storage for the persisted session.
//!
//! The session lives in three places, mirroring what a browser offers:
//! - a durable key-value store that survives restarts (`user`, `token`, `tokenExpiry`)
//! - a session-scoped store that is gone when the process exits (`user` when
//!   "remember me" was not selected)
//! - a cookie jar holding the `token` mirror the route guard reads
//!
//! The durable store and the cookie jar are JSON files in the cache directory,
//! optionally encrypted at rest with a key kept in the OS keychain.

pub mod cipher;
pub mod cookies;
pub mod file;
pub mod keychain;
pub mod store;

use std::path::Path;

pub use cipher::StoreCipher;
pub use cookies::{Cookie, CookieJar, TOKEN_COOKIE};
pub use file::FileStore;
pub use keychain::Keychain;
pub use store::{KeyValueStore, MemoryStore, StoreError};

/// Key holding the serialized user record
pub const USER_KEY: &str = "user";

/// Key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// Key holding the token expiry as epoch milliseconds
pub const TOKEN_EXPIRY_KEY: &str = "tokenExpiry";

/// Durable store file name in the cache directory
const DURABLE_FILE: &str = "session.json";

/// Cookie jar file name in the cache directory
const COOKIE_FILE: &str = "cookies.json";

/// Every store the session manager owns keys in.
pub struct SessionStores {
    pub durable: Box<dyn KeyValueStore>,
    pub session: Box<dyn KeyValueStore>,
    pub cookies: CookieJar,
}

impl SessionStores {
    pub fn new(
        durable: Box<dyn KeyValueStore>,
        session: Box<dyn KeyValueStore>,
        cookies: CookieJar,
    ) -> Self {
        Self {
            durable,
            session,
            cookies,
        }
    }

    /// All stores in memory. Nothing outlives the process.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
            CookieJar::in_memory(),
        )
    }

    /// File-backed durable store and cookie jar under `cache_dir`,
    /// with an in-memory session-scoped store.
    pub fn open(cache_dir: &Path, cipher: Option<StoreCipher>) -> Self {
        let durable_path = cache_dir.join(DURABLE_FILE);
        let cookie_path = cache_dir.join(COOKIE_FILE);

        let (durable, cookie_backing) = match cipher {
            Some(cipher) => (
                FileStore::encrypted(durable_path, cipher.clone()),
                FileStore::encrypted(cookie_path, cipher),
            ),
            None => (FileStore::new(durable_path), FileStore::new(cookie_path)),
        };

        Self::new(
            Box::new(durable),
            Box::new(MemoryStore::new()),
            CookieJar::new(Box::new(cookie_backing)),
        )
    }
}
