//! Core library for careerdesk.
//!
//! careerdesk is the session layer of a recruitment back office: it keeps the
//! signed-in user and bearer token, persists them across restarts, tears them
//! down when the token expires, and decides which routes a visitor may reach.
//!
//! - [`auth`]: session lifecycle, token claims, route guard, sign-in, watcher
//! - [`storage`]: durable and session-scoped key-value stores, cookie jar
//! - [`api`]: bearer-authenticated REST client
//! - [`config`]: on-disk configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod storage;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{
    RouteGuard, Session, SessionManager, SessionWatcher, SharedSession, SignIn, User, Validity,
};
pub use config::Config;
pub use storage::{CookieJar, FileStore, KeyValueStore, MemoryStore, SessionStores};

/// URL type used by the route guard
pub use reqwest::Url;
