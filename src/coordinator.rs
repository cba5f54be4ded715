//! Top-level session coordination.
//!
//! The session store and transport surface lifecycle changes as typed events
//! instead of navigating themselves; this module owns the reaction. An
//! application hands the coordinator the event receiver returned by
//! [`SessionStore::open`](crate::auth::SessionStore::open) together with a
//! [`Navigator`], then drives [`SessionCoordinator::run`] as a background
//! task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

/// Unauthenticated entry point the user agent is sent to on teardown.
pub const LOGIN_PATH: &str = "/login";

/// Session lifecycle events consumed by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend signaled that the credential is no longer valid.
    Invalidated,
    /// The user explicitly ended the session.
    LoggedOut,
}

/// Owner of the navigation side effect.
///
/// Implementations set the user agent's location: a browser shell assigns
/// `window.location`, a desktop shell swaps views, tests record the call.
pub trait Navigator: Send + Sync {
    fn redirect(&self, location: &str);
}

pub struct SessionCoordinator {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    navigator: Arc<dyn Navigator>,
}

impl SessionCoordinator {
    pub fn new(
        events: mpsc::UnboundedReceiver<SessionEvent>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self { events, navigator }
    }

    /// Consume lifecycle events until the session store is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.dispatch(event);
        }
    }

    fn dispatch(&self, event: SessionEvent) {
        match event {
            SessionEvent::Invalidated => {
                info!("Session invalidated; redirecting to the login page");
                self.navigator.redirect(LOGIN_PATH);
            }
            SessionEvent::LoggedOut => {
                info!("Session ended; redirecting to the login page");
                self.navigator.redirect(LOGIN_PATH);
            }
        }
    }
}
