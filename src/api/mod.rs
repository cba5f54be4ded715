//! Authenticated transport module for the backend API.
//!
//! Provides the `ApiClient` used for every outbound call: it attaches the
//! current bearer credential at dispatch time and globally intercepts 401
//! responses as session invalidation signals.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
