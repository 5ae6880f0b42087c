//! Authentication: the session lifecycle and everything around it.
//!
//! This module provides:
//! - `SessionManager`: the single source of truth for "signed in right now",
//!   loaded from storage, torn down on expiry or sign-out
//! - `SessionWatcher`: re-checks expiry every 60 seconds
//! - `RouteGuard`: cookie-only redirect policy applied before pages load
//! - `SignIn`: credential exchange that writes a fresh session
//!
//! Expiry comes from the `exp` claim of the bearer token. An unreadable
//! token or user record is treated exactly like an expired one.

pub mod claims;
pub mod guard;
pub mod navigator;
pub mod session;
pub mod signin;
pub mod watcher;

pub use claims::{token_expiry, ClaimsError, TokenClaims};
pub use guard::{GuardDecision, RouteGuard};
pub use navigator::{ChannelNavigator, Navigator, RecordingNavigator};
pub use session::{Session, SessionManager, SharedSession, User, Validity};
pub use signin::{Credentials, SignIn};
pub use watcher::SessionWatcher;
