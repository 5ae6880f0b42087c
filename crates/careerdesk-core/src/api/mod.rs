//! REST API client for the back-office API.
//!
//! Every page of the back office talks to the same API with the session's
//! bearer token. This module provides the `ApiClient` for those calls and
//! for the credential exchange at sign-in.

pub mod client;
pub mod error;

pub use client::{ApiClient, LoginResponse};
pub use error::ApiError;
