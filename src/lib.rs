//! Client-side session core: credential persistence, profile resolution,
//! and an authenticated transport for backend API calls.
//!
//! The lifecycle lives in [`auth::SessionStore`]: restore the persisted
//! credential at startup, resolve it to a [`models::Profile`], and expose
//! the session to the rest of the application. Outbound requests go through
//! [`api::ApiClient`], which attaches the credential and treats any 401 as
//! an invalidation signal; a [`coordinator::SessionCoordinator`] reacts to
//! lifecycle events by redirecting the user agent to the login page.
//!
//! ```no_run
//! # async fn wire() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use sessionkit::{Config, Navigator, SessionCoordinator, SessionStore};
//!
//! struct Shell;
//! impl Navigator for Shell {
//!     fn redirect(&self, location: &str) {
//!         // hand the location to the host shell
//!         let _ = location;
//!     }
//! }
//!
//! let config = Config::from_env()?;
//! let (session, events) = SessionStore::open(&config)?;
//! tokio::spawn(SessionCoordinator::new(events, Arc::new(Shell)).run());
//! session.initialize().await;
//!
//! let api = session.transport();
//! # let _ = api;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionError, SessionState, SessionStore, TokenStore};
pub use config::Config;
pub use coordinator::{Navigator, SessionCoordinator, SessionEvent, LOGIN_PATH};
pub use models::Profile;
