use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::claims;
use super::guard::SIGN_IN_PATH;
use super::navigator::Navigator;
use crate::storage::{
    KeyValueStore, SessionStores, StoreError, TOKEN_COOKIE, TOKEN_EXPIRY_KEY, TOKEN_KEY, USER_KEY,
};
use crate::utils::{Clock, SystemClock};

/// Path the token cookie is scoped to
const COOKIE_PATH: &str = "/";

/// The signed-in principal, as returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// The in-memory session. A token never exists without its user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Unauthenticated,
    Authenticated {
        user: User,
        token: String,
        expiry: DateTime<Utc>,
    },
}

impl Session {
    pub fn user(&self) -> Option<&User> {
        match self {
            Session::Authenticated { user, .. } => Some(user),
            Session::Unauthenticated => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Session::Authenticated { token, .. } => Some(token),
            Session::Unauthenticated => None,
        }
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        match self {
            Session::Authenticated { expiry, .. } => Some(*expiry),
            Session::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    /// Expired means the expiry instant has been reached, not just passed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().map(|expiry| expiry <= now).unwrap_or(false)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiry().map(|expiry| expiry - now)
    }
}

/// Outcome of an expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
}

/// The application's single session instance, shared with the watcher
/// and anything else that needs the token.
pub type SharedSession = Arc<Mutex<SessionManager>>;

/// Owns the authenticated session: loads it from the stores at startup,
/// tears it down on expiry or sign-out, and redirects to sign-in whenever
/// it does.
///
/// Nothing here returns an error. Unreadable or expired state ends up as
/// [`Session::Unauthenticated`] plus a navigation to the sign-in page.
pub struct SessionManager {
    stores: SessionStores,
    clock: Arc<dyn Clock>,
    navigator: Box<dyn Navigator>,
    sign_in_path: String,
    state: Session,
    loading: bool,
    changes: watch::Sender<Session>,
}

impl SessionManager {
    pub fn new(stores: SessionStores, navigator: Box<dyn Navigator>) -> Self {
        let (changes, _) = watch::channel(Session::Unauthenticated);
        Self {
            stores,
            clock: Arc::new(SystemClock),
            navigator,
            sign_in_path: SIGN_IN_PATH.to_string(),
            state: Session::Unauthenticated,
            loading: true,
            changes,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sign_in_path(mut self, path: impl Into<String>) -> Self {
        self.sign_in_path = path.into();
        self
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Load the persisted session. Call once at startup, before anything
    /// reads the user or token.
    pub fn initialize(&mut self) {
        self.populate();
        if self.loading {
            self.loading = false;
            debug!(authenticated = self.state.is_authenticated(), "Initial session check complete");
        }
    }

    /// Re-read the persisted session after sign-in wrote a new one
    pub fn reload(&mut self) {
        self.populate();
    }

    /// Tear the session down if its token has expired.
    ///
    /// Without a session there is nothing to check and nothing to clear.
    pub fn check_expiration(&mut self) -> Validity {
        let Some(expiry) = self.state.expiry() else {
            return Validity::Invalid;
        };

        let now = self.clock.now();
        if expiry <= now {
            info!(%expiry, "Session expired");
            self.sign_out();
            return Validity::Invalid;
        }

        Validity::Valid
    }

    /// Periodic check: [`check_expiration`](Self::check_expiration), then
    /// compare the in-memory token with the stored one.
    ///
    /// A stored token that disappeared means another process signed out, so
    /// this one signs out too. A different stored token means another sign-in
    /// replaced the session, which is reloaded.
    pub fn revalidate(&mut self) -> Validity {
        if self.check_expiration() == Validity::Invalid {
            return Validity::Invalid;
        }

        match read_present(self.stores.durable.as_ref(), TOKEN_KEY) {
            Ok(Some(stored)) if Some(stored.as_str()) == self.state.token() => Validity::Valid,
            Ok(Some(_)) => {
                info!("Stored session was replaced, reloading");
                self.reload();
                if self.is_authenticated() {
                    Validity::Valid
                } else {
                    Validity::Invalid
                }
            }
            Ok(None) => {
                info!("Session ended elsewhere");
                self.sign_out();
                Validity::Invalid
            }
            Err(e) => {
                warn!(error = %e, "Persisted session is unreadable");
                self.sign_out();
                Validity::Invalid
            }
        }
    }

    /// Clear every trace of the session and go to sign-in. Safe to repeat.
    pub fn sign_out(&mut self) {
        self.clear_persisted();
        self.set_state(Session::Unauthenticated);
        info!(to = %self.sign_in_path, "Signed out");
        self.navigator.navigate(&self.sign_in_path);
    }

    /// Send the front end somewhere other than sign-in (e.g. after login)
    pub fn navigate(&self, to: &str) {
        self.navigator.navigate(to);
    }

    pub fn session(&self) -> &Session {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        self.state.user()
    }

    pub fn token(&self) -> Option<&str> {
        self.state.token()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.state.expiry()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// True until the first `initialize` completes
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Watch session changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.changes.subscribe()
    }

    pub fn stores(&self) -> &SessionStores {
        &self.stores
    }

    /// Write access for the sign-in flow
    pub fn stores_mut(&mut self) -> &mut SessionStores {
        &mut self.stores
    }

    fn populate(&mut self) {
        let stored_user = self.read_user();
        let stored_token = read_present(self.stores.durable.as_ref(), TOKEN_KEY);

        let (raw_user, token) = match (stored_user, stored_token) {
            (Ok(Some(user)), Ok(Some(token))) => (user, token),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Persisted session is unreadable");
                self.sign_out();
                return;
            }
            _ => {
                debug!("No persisted session");
                self.set_state(Session::Unauthenticated);
                return;
            }
        };

        let user: User = match serde_json::from_str(&raw_user) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Persisted user record is malformed");
                self.sign_out();
                return;
            }
        };

        let expiry = match claims::token_expiry(&token) {
            Ok(expiry) => expiry,
            Err(e) => {
                warn!(error = %e, "Persisted token has no readable expiry");
                self.sign_out();
                return;
            }
        };

        if expiry <= self.clock.now() {
            info!(%expiry, "Persisted session has expired");
            self.sign_out();
            return;
        }

        self.set_state(Session::Authenticated {
            user,
            token,
            expiry,
        });
    }

    /// Durable store first, then the session-scoped one
    fn read_user(&self) -> Result<Option<String>, StoreError> {
        match read_present(self.stores.durable.as_ref(), USER_KEY)? {
            Some(user) => Ok(Some(user)),
            None => read_present(self.stores.session.as_ref(), USER_KEY),
        }
    }

    fn clear_persisted(&mut self) {
        remove_logged(self.stores.durable.as_mut(), "durable", USER_KEY);
        remove_logged(self.stores.session.as_mut(), "session", USER_KEY);
        remove_logged(self.stores.durable.as_mut(), "durable", TOKEN_KEY);
        remove_logged(self.stores.durable.as_mut(), "durable", TOKEN_EXPIRY_KEY);

        let now = self.clock.now();
        if let Err(e) = self.stores.cookies.expire(TOKEN_COOKIE, COOKIE_PATH, now) {
            warn!(error = %e, "Failed to expire token cookie");
        }
    }

    fn set_state(&mut self, state: Session) {
        if self.state != state {
            self.state = state.clone();
            self.changes.send_replace(state);
        }
    }
}

/// Empty strings count as missing, as they do for browser storage
fn read_present(store: &dyn KeyValueStore, key: &str) -> Result<Option<String>, StoreError> {
    Ok(store.get(key)?.filter(|value| !value.is_empty()))
}

fn remove_logged(store: &mut dyn KeyValueStore, scope: &str, key: &str) {
    if let Err(e) = store.remove(key) {
        warn!(scope, key, error = %e, "Failed to clear stored key");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigator::RecordingNavigator;
    use crate::storage::MemoryStore;
    use crate::utils::ManualClock;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    const USER_JSON: &str = r#"{"name":"Ada Admin","email":"ada@example.com","role":"admin"}"#;

    fn token_expiring_at(at: DateTime<Utc>) -> String {
        let payload = format!(r#"{{"sub":"1","exp":{}}}"#, at.timestamp());
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    struct Fixture {
        manager: SessionManager,
        clock: ManualClock,
        nav: RecordingNavigator,
    }

    fn fixture(stores: SessionStores) -> Fixture {
        let clock = ManualClock::new(Utc::now());
        let nav = RecordingNavigator::new();
        let manager = SessionManager::new(stores, Box::new(nav.clone()))
            .with_clock(Arc::new(clock.clone()));
        Fixture { manager, clock, nav }
    }

    fn persisted(user: &str, token: &str) -> SessionStores {
        let mut stores = SessionStores::in_memory();
        stores.durable.set(USER_KEY, user).unwrap();
        stores.durable.set(TOKEN_KEY, token).unwrap();
        stores
    }

    fn assert_both_or_neither(manager: &SessionManager) {
        assert_eq!(manager.user().is_some(), manager.token().is_some());
    }

    fn assert_cleared(manager: &SessionManager) {
        let stores = manager.stores();
        assert_eq!(stores.durable.get(USER_KEY).unwrap(), None);
        assert_eq!(stores.durable.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(stores.durable.get(TOKEN_EXPIRY_KEY).unwrap(), None);
        assert_eq!(stores.session.get(USER_KEY).unwrap(), None);
        assert!(stores.cookies.get(TOKEN_COOKIE).unwrap().is_none());
    }

    #[test]
    fn test_session_accessors() {
        let now = Utc::now();
        let session = Session::Authenticated {
            user: serde_json::from_str(USER_JSON).unwrap(),
            token: "t".to_string(),
            expiry: now + Duration::minutes(5),
        };
        assert!(session.is_authenticated());
        assert_eq!(session.user().unwrap().role, "admin");
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::minutes(5)));
        assert_eq!(session.time_until_expiry(now), Some(Duration::minutes(5)));

        assert!(!Session::Unauthenticated.is_expired_at(now));
        assert_eq!(Session::Unauthenticated.time_until_expiry(now), None);
    }

    #[test]
    fn test_loading_clears_once() {
        let Fixture { mut manager, .. } = fixture(SessionStores::in_memory());
        assert!(manager.is_loading());
        manager.initialize();
        assert!(!manager.is_loading());
        manager.reload();
        manager.initialize();
        assert!(!manager.is_loading());
    }

    #[test]
    fn test_user_falls_back_to_session_store() {
        let now = Utc::now();
        let mut stores = SessionStores::in_memory();
        stores.session.set(USER_KEY, USER_JSON).unwrap();
        stores
            .durable
            .set(TOKEN_KEY, &token_expiring_at(now + Duration::hours(1)))
            .unwrap();

        let Fixture { mut manager, clock, nav } = fixture(stores);
        clock.set(now);
        manager.initialize();

        assert!(manager.is_authenticated());
        assert_eq!(manager.user().unwrap().email, "ada@example.com");
        assert_eq!(nav.count(), 0);
    }

    #[test]
    fn test_user_without_token_is_not_a_session() {
        let mut stores = SessionStores::in_memory();
        stores.durable.set(USER_KEY, USER_JSON).unwrap();

        let Fixture { mut manager, nav, .. } = fixture(stores);
        manager.initialize();

        assert!(!manager.is_authenticated());
        assert_both_or_neither(&manager);
        assert_eq!(nav.count(), 0);
        // Nothing was torn down.
        assert!(manager.stores().durable.get(USER_KEY).unwrap().is_some());
    }

    #[test]
    fn test_empty_strings_count_as_missing() {
        let Fixture { mut manager, nav, .. } = fixture(persisted("", ""));
        manager.initialize();
        assert!(!manager.is_authenticated());
        assert_eq!(nav.count(), 0);
    }

    #[test]
    fn test_malformed_user_fails_closed() {
        let now = Utc::now();
        let token = token_expiring_at(now + Duration::hours(1));
        for bad in ["{not json", "null", r#"{"name":"x"}"#, "[]"] {
            let Fixture { mut manager, clock, nav } = fixture(persisted(bad, &token));
            clock.set(now);
            manager.initialize();

            assert!(!manager.is_authenticated(), "accepted user record {bad:?}");
            assert_both_or_neither(&manager);
            assert_cleared(&manager);
            assert_eq!(nav.visits(), vec![SIGN_IN_PATH]);
        }
    }

    #[test]
    fn test_undecodable_token_fails_closed() {
        for bad in ["abc", "a.b", "e30.!!!.sig", "e30.e30.sig"] {
            let Fixture { mut manager, nav, .. } = fixture(persisted(USER_JSON, bad));
            manager.initialize();

            assert!(!manager.is_authenticated(), "accepted token {bad:?}");
            assert_cleared(&manager);
            assert_eq!(nav.count(), 1);
        }
    }

    #[test]
    fn test_unreadable_store_fails_closed() {
        let mut cookie_backing = MemoryStore::new();
        cookie_backing.set(TOKEN_COOKIE, "garbage").unwrap();

        struct Broken;
        impl KeyValueStore for Broken {
            fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
                Err(StoreError::Corrupt("unreadable".into()))
            }
            fn set(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
                Ok(())
            }
            fn remove(&mut self, _key: &str) -> Result<(), StoreError> {
                Ok(())
            }
        }

        let stores = SessionStores::new(
            Box::new(Broken),
            Box::new(MemoryStore::new()),
            crate::storage::CookieJar::new(Box::new(cookie_backing)),
        );
        let Fixture { mut manager, nav, .. } = fixture(stores);
        manager.initialize();

        assert!(!manager.is_authenticated());
        assert!(!manager.is_loading());
        assert_eq!(nav.count(), 1);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let expiry = now + Duration::minutes(10);
        let Fixture { mut manager, clock, nav } =
            fixture(persisted(USER_JSON, &token_expiring_at(expiry)));
        clock.set(now);
        manager.initialize();
        assert!(manager.is_authenticated());

        // Claims carry whole seconds.
        let expiry = manager.expiry().unwrap();
        clock.set(expiry - Duration::seconds(1));
        assert_eq!(manager.check_expiration(), Validity::Valid);
        assert!(manager.is_authenticated());

        clock.set(expiry);
        assert_eq!(manager.check_expiration(), Validity::Invalid);
        assert!(!manager.is_authenticated());
        assert_cleared(&manager);
        assert_eq!(nav.count(), 1);
    }

    #[test]
    fn test_check_without_session_has_no_side_effects() {
        let Fixture { mut manager, nav, .. } = fixture(SessionStores::in_memory());
        manager.initialize();
        assert_eq!(manager.check_expiration(), Validity::Invalid);
        assert_eq!(manager.check_expiration(), Validity::Invalid);
        assert_eq!(nav.count(), 0);
    }

    #[test]
    fn test_revalidate_follows_the_stored_token() {
        let now = Utc::now();
        let Fixture { mut manager, clock, nav } =
            fixture(persisted(USER_JSON, &token_expiring_at(now + Duration::hours(1))));
        clock.set(now);
        manager.initialize();
        assert_eq!(manager.revalidate(), Validity::Valid);

        // Another sign-in wrote a newer token.
        let newer = token_expiring_at(now + Duration::hours(2));
        manager.stores_mut().durable.set(TOKEN_KEY, &newer).unwrap();
        assert_eq!(manager.revalidate(), Validity::Valid);
        assert_eq!(manager.token(), Some(newer.as_str()));
        assert_eq!(nav.count(), 0);

        // Another process signed out.
        manager.stores_mut().durable.remove(TOKEN_KEY).unwrap();
        assert_eq!(manager.revalidate(), Validity::Invalid);
        assert!(!manager.is_authenticated());
        assert_cleared(&manager);
        assert_eq!(nav.visits(), vec![SIGN_IN_PATH]);

        // Nothing left to end.
        assert_eq!(manager.revalidate(), Validity::Invalid);
        assert_eq!(nav.count(), 1);
    }

    #[test]
    fn test_subscribers_see_teardown() {
        let now = Utc::now();
        let Fixture { mut manager, clock, .. } =
            fixture(persisted(USER_JSON, &token_expiring_at(now + Duration::minutes(1))));
        clock.set(now);
        manager.initialize();

        let rx = manager.subscribe();
        assert!(rx.borrow().is_authenticated());

        manager.sign_out();
        assert_eq!(*rx.borrow(), Session::Unauthenticated);
    }

    #[test]
    fn test_custom_sign_in_path() {
        let Fixture { manager, nav, .. } = fixture(SessionStores::in_memory());
        let mut manager = manager.with_sign_in_path("/login");
        manager.sign_out();
        assert_eq!(nav.last().as_deref(), Some("/login"));
    }
}
