use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::session::SharedSession;

/// How often the session's expiry is re-checked
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Bounds applied to the period passed to [`SessionWatcher::spawn`]
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(86_400);

/// Background task revalidating the session on a fixed period.
///
/// Each tick runs [`SessionManager::revalidate`](super::SessionManager::revalidate):
/// the expiry check, then a look at the stored token in case another process
/// signed out. The first check happens one full period after spawning, so
/// the caller's own `initialize` always runs first. Dropping the watcher
/// cancels it.
pub struct SessionWatcher {
    handle: Option<JoinHandle<()>>,
}

impl SessionWatcher {
    pub fn spawn(session: SharedSession, period: Duration) -> Self {
        let period = period.clamp(MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let validity = session.lock().await.revalidate();
                trace!(?validity, "Periodic session check");
            }
        });

        debug!(period_secs = period.as_secs(), "Session watcher started");
        Self {
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Session watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigator::RecordingNavigator;
    use crate::auth::session::SessionManager;
    use crate::storage::{KeyValueStore, SessionStores, TOKEN_KEY, USER_KEY};
    use crate::utils::ManualClock;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    fn shared_session(expires_in: chrono::Duration) -> (SharedSession, ManualClock, RecordingNavigator) {
        let now = DateTime::from_timestamp(1_800_000_000, 0).unwrap();
        let clock = ManualClock::new(now);
        let nav = RecordingNavigator::new();

        let payload = format!(r#"{{"exp":{}}}"#, (now + expires_in).timestamp());
        let token = format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload));
        let mut stores = SessionStores::in_memory();
        stores
            .durable
            .set(USER_KEY, r#"{"name":"Ada","email":"ada@example.com","role":"admin"}"#)
            .unwrap();
        stores.durable.set(TOKEN_KEY, &token).unwrap();

        let mut manager = SessionManager::new(stores, Box::new(nav.clone()))
            .with_clock(Arc::new(clock.clone()));
        manager.initialize();
        assert!(manager.is_authenticated());
        (manager.into_shared(), clock, nav)
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_tears_down_expired_session() {
        let (session, clock, nav) = shared_session(chrono::Duration::seconds(30));
        let _watcher = SessionWatcher::spawn(session.clone(), DEFAULT_CHECK_INTERVAL);

        clock.advance(chrono::Duration::seconds(31));
        time::sleep(Duration::from_secs(61)).await;

        assert!(!session.lock().await.is_authenticated());
        assert_eq!(nav.count(), 1);

        // Later ticks find nothing to tear down.
        time::sleep(Duration::from_secs(180)).await;
        assert_eq!(nav.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_leaves_valid_session_alone() {
        let (session, _clock, nav) = shared_session(chrono::Duration::hours(1));
        let watcher = SessionWatcher::spawn(session.clone(), DEFAULT_CHECK_INTERVAL);

        time::sleep(Duration::from_secs(300)).await;
        assert!(session.lock().await.is_authenticated());
        assert_eq!(nav.count(), 0);
        assert!(watcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_watcher_stops_checking() {
        let (session, clock, nav) = shared_session(chrono::Duration::seconds(30));
        let mut watcher = SessionWatcher::spawn(session.clone(), DEFAULT_CHECK_INTERVAL);
        watcher.stop();
        assert!(!watcher.is_running());
        drop(watcher);

        clock.advance(chrono::Duration::minutes(5));
        time::sleep(Duration::from_secs(300)).await;

        assert!(session.lock().await.is_authenticated());
        assert_eq!(nav.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_notices_sign_out_elsewhere() {
        let (session, _clock, nav) = shared_session(chrono::Duration::hours(1));
        let _watcher = SessionWatcher::spawn(session.clone(), DEFAULT_CHECK_INTERVAL);

        // Another process cleared the shared durable store.
        session
            .lock()
            .await
            .stores_mut()
            .durable
            .remove(TOKEN_KEY)
            .unwrap();

        time::sleep(Duration::from_secs(61)).await;
        assert!(!session.lock().await.is_authenticated());
        assert_eq!(nav.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_period_is_clamped() {
        let (session, _clock, _nav) = shared_session(chrono::Duration::hours(1));
        let watcher = SessionWatcher::spawn(session, Duration::MAX);
        time::sleep(Duration::from_secs(1)).await;
        assert!(watcher.is_running());
    }
}
