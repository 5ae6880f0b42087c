//! Sign-in: the one writer of a fresh persisted session.
//!
//! On success the user record goes to the durable store ("remember me") or
//! the session-scoped store, the token goes to the durable store and to a
//! 7-day `token` cookie, and the token's expiry is written alongside when it
//! carries one. The session manager then re-reads what was written.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::claims;
use super::guard::callback_path;
use super::session::SharedSession;
use crate::api::{ApiClient, LoginResponse};
use crate::storage::{KeyValueStore, SessionStores, TOKEN_COOKIE, TOKEN_EXPIRY_KEY, TOKEN_KEY, USER_KEY};

/// Path the token cookie is scoped to
const COOKIE_PATH: &str = "/";

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Keep the user record across restarts
    pub remember: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("remember", &self.remember)
            .finish()
    }
}

pub struct SignIn {
    api: ApiClient,
    cookie_max_age: Duration,
}

impl SignIn {
    pub fn new(api: ApiClient, cookie_max_age: Duration) -> Self {
        Self {
            api,
            cookie_max_age,
        }
    }

    /// Exchange credentials, persist the session, and navigate to the
    /// callback page (or home). Returns where it navigated.
    pub async fn submit(
        &self,
        session: &SharedSession,
        credentials: &Credentials,
        callback: Option<&str>,
    ) -> Result<String> {
        let login = self
            .api
            .login(&credentials.email, &credentials.password)
            .await?;

        let mut manager = session.lock().await;
        let now = manager.now();
        persist_session(
            manager.stores_mut(),
            &login,
            credentials.remember,
            now,
            self.cookie_max_age,
        )
        .context("Failed to store session")?;

        manager.reload();
        if !manager.is_authenticated() {
            bail!("Server issued a token that is expired or unreadable");
        }

        let destination = callback_path(callback);
        info!(email = %login.user.email, remember = credentials.remember, "Signed in");
        manager.navigate(&destination);
        Ok(destination)
    }
}

/// Write a successful login into the stores.
///
/// The user record goes in last, so a session is never readable before its
/// token. If any write fails, whatever was written is removed again.
pub fn persist_session(
    stores: &mut SessionStores,
    login: &LoginResponse,
    remember: bool,
    now: DateTime<Utc>,
    cookie_max_age: Duration,
) -> Result<()> {
    let result = write_session(stores, login, remember, now, cookie_max_age);
    if result.is_err() {
        discard_partial_session(stores, now);
    }
    result
}

fn write_session(
    stores: &mut SessionStores,
    login: &LoginResponse,
    remember: bool,
    now: DateTime<Utc>,
    cookie_max_age: Duration,
) -> Result<()> {
    let user = serde_json::to_string(&login.user)?;

    stores.durable.set(TOKEN_KEY, &login.token)?;
    stores
        .cookies
        .set(TOKEN_COOKIE, &login.token, COOKIE_PATH, cookie_max_age, now)?;

    match claims::token_expiry(&login.token) {
        Ok(expiry) => {
            stores
                .durable
                .set(TOKEN_EXPIRY_KEY, &expiry.timestamp_millis().to_string())?;
        }
        Err(e) => warn!(error = %e, "Token carries no expiry"),
    }

    if remember {
        stores.durable.set(USER_KEY, &user)?;
    } else {
        stores.session.set(USER_KEY, &user)?;
    }

    Ok(())
}

fn discard_partial_session(stores: &mut SessionStores, now: DateTime<Utc>) {
    let removals = [
        stores.durable.remove(USER_KEY),
        stores.session.remove(USER_KEY),
        stores.durable.remove(TOKEN_KEY),
        stores.durable.remove(TOKEN_EXPIRY_KEY),
        stores.cookies.expire(TOKEN_COOKIE, COOKIE_PATH, now),
    ];
    for e in removals.into_iter().filter_map(Result::err) {
        warn!(error = %e, "Failed to discard partial session");
    }
}
