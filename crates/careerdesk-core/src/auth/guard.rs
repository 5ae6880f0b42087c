//! Cookie-only route guard.
//!
//! Runs before a page is served and looks at nothing but the `token` cookie.
//! It does not know whether the token has expired; the session manager
//! enforces that once the page loads.

use chrono::{DateTime, Utc};
use reqwest::Url;
use tracing::debug;

use crate::config::Config;
use crate::storage::{CookieJar, TOKEN_COOKIE};

/// Sign-in entry point
pub const SIGN_IN_PATH: &str = "/auth/sign-in";

pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";

/// Where signed-in visitors land
pub const HOME_PATH: &str = "/";

/// Query parameter carrying the page to return to after sign-in
pub const CALLBACK_PARAM: &str = "callbackUrl";

/// Path prefixes the guard never looks at: API routes, build assets, images.
const UNGUARDED_PREFIXES: &[&str] = &["api", "_next/static", "_next/image", "favicon.ico", "images"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Continue,
    Redirect(Url),
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    public_paths: Vec<String>,
    sign_in_path: String,
    home_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self {
            public_paths: vec![SIGN_IN_PATH.to_string(), FORGOT_PASSWORD_PATH.to_string()],
            sign_in_path: SIGN_IN_PATH.to_string(),
            home_path: HOME_PATH.to_string(),
        }
    }
}

impl RouteGuard {
    pub fn new(public_paths: Vec<String>, sign_in_path: String, home_path: String) -> Self {
        Self {
            public_paths,
            sign_in_path,
            home_path,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.public_paths.clone(),
            config.sign_in_path.clone(),
            config.home_path.clone(),
        )
    }

    /// Whether the guard applies to `path` at all
    pub fn is_guarded(&self, path: &str) -> bool {
        let rest = path.strip_prefix('/').unwrap_or(path);
        !UNGUARDED_PREFIXES.iter().any(|prefix| rest.starts_with(prefix))
    }

    /// Prefix match against the public allow-list
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|public| path.starts_with(public.as_str()))
    }

    /// Decide what to do with a request given the token cookie value.
    /// An empty cookie is the same as none.
    pub fn check(&self, request: &Url, token_cookie: Option<&str>) -> GuardDecision {
        let path = request.path();
        if !self.is_guarded(path) {
            return GuardDecision::Continue;
        }

        let has_token = token_cookie.map(|t| !t.is_empty()).unwrap_or(false);
        let is_public = self.is_public(path);

        if is_public && has_token {
            debug!(path, "Signed-in visitor on public page, sending home");
            return GuardDecision::Redirect(self.redirect_to(request, &self.home_path));
        }

        if !is_public && !has_token {
            debug!(path, "No token cookie, sending to sign-in");
            let mut target = self.redirect_to(request, &self.sign_in_path);
            target.query_pairs_mut().append_pair(CALLBACK_PARAM, path);
            return GuardDecision::Redirect(target);
        }

        GuardDecision::Continue
    }

    /// [`check`](Self::check) with the cookie read from `jar`
    pub fn check_jar(&self, request: &Url, jar: &CookieJar, now: DateTime<Utc>) -> GuardDecision {
        let token = jar.value(TOKEN_COOKIE, now);
        self.check(request, token.as_deref())
    }

    fn redirect_to(&self, request: &Url, path: &str) -> Url {
        let mut target = request.clone();
        target.set_path(path);
        target.set_query(None);
        target.set_fragment(None);
        target
    }
}

/// Where to go after a successful sign-in.
///
/// Only same-site paths are honored; anything else falls back to home.
pub fn callback_path(callback: Option<&str>) -> String {
    match callback {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => HOME_PATH.to_string(),
    }
}

/// The callback carried by a sign-in URL, if any
pub fn callback_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == CALLBACK_PARAM)
        .map(|(_, value)| value.into_owned())
}
