//! Session lifecycle management.
//!
//! `SessionStore` is the single source of truth for the session: it restores
//! the persisted credential at startup, resolves it to a profile through the
//! authenticated transport, and mediates every transition. All mutations
//! (initialize/login/logout) serialize on one lock, so a login submitted
//! during the restore window applies only after the restore settles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::auth::store::TokenStore;
use crate::config::Config;
use crate::coordinator::SessionEvent;
use crate::models::Profile;

/// Read model of the session, exposed to the rest of the application.
///
/// `profile` is present only when `credential` is present and was resolved.
/// While `loading` is true the session is still restoring; consumers should
/// defer access-control decisions until it settles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub credential: Option<String>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl SessionState {
    fn anonymous() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Resolution failed, or the backend rejected the credential. The session
    /// has been torn down to Anonymous; no further detail is surfaced.
    #[error("not authenticated")]
    NotAuthenticated,

    /// `login` requires a non-empty opaque bearer token.
    #[error("credential must be a non-empty token")]
    EmptyCredential,
}

/// State shared between the session store and the transport.
///
/// The transport needs teardown access so a 401 observed on any request can
/// invalidate the session without going through the mutation lock — the
/// request that observed it may itself be the profile lookup holding that
/// lock.
pub(crate) struct SessionShared {
    tokens: TokenStore,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionShared {
    /// Credential as currently persisted; read at request-dispatch time.
    pub(crate) fn credential(&self) -> Option<String> {
        self.tokens.get()
    }

    /// Forced teardown on an invalidation signal. Reentrant-safe: concurrent
    /// 401s clear the credential and emit the event exactly once.
    pub(crate) fn invalidate(&self) {
        let cleared = self.tokens.clear();

        let mut had_session = false;
        self.state.send_if_modified(|state| {
            had_session = state.credential.is_some() || state.profile.is_some();
            if had_session || state.loading {
                *state = SessionState::anonymous();
                true
            } else {
                false
            }
        });

        if cleared || had_session {
            info!("Session invalidated; credential cleared");
            self.emit(SessionEvent::Invalidated);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "Session event dropped - no coordinator listening");
        }
    }
}

/// Single source of truth for the session.
pub struct SessionStore {
    shared: Arc<SessionShared>,
    api: ApiClient,
    /// Serializes initialize/login/logout so resolutions never interleave.
    mutation: Mutex<()>,
    initialized: AtomicBool,
}

impl SessionStore {
    /// Open the session store: restore any persisted credential into memory
    /// and wire up the transport. Returns the store together with the
    /// lifecycle event receiver a [`SessionCoordinator`] should consume.
    ///
    /// The state starts with `loading = true`; call
    /// [`initialize`](Self::initialize) once at startup to settle it.
    ///
    /// [`SessionCoordinator`]: crate::coordinator::SessionCoordinator
    pub fn open(config: &Config) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let tokens = TokenStore::open(config.storage_dir.clone())?;
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState {
            loading: true,
            ..SessionState::anonymous()
        });

        let shared = Arc::new(SessionShared {
            tokens,
            state,
            events,
        });
        let api = ApiClient::new(config, Arc::clone(&shared))?;

        Ok((
            Self {
                shared,
                api,
                mutation: Mutex::new(()),
                initialized: AtomicBool::new(false),
            },
            events_rx,
        ))
    }

    /// The authenticated transport. Clones are cheap and share the underlying
    /// connection pool; the rest of the application should issue every API
    /// call through one of these.
    pub fn transport(&self) -> ApiClient {
        self.api.clone()
    }

    /// Snapshot of the current session state.
    pub fn current_state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Restore-and-resolve at process startup.
    ///
    /// Runs the restore exactly once per process lifetime; later calls are
    /// no-ops. A persisted credential that fails to resolve is cleared and
    /// the session settles Anonymous.
    pub async fn initialize(&self) {
        let _guard = self.mutation.lock().await;

        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Session already initialized; ignoring");
            return;
        }

        match self.shared.tokens.get() {
            None => {
                debug!("No persisted credential; session starts anonymous");
                self.shared.state.send_modify(|state| {
                    *state = SessionState::anonymous();
                });
            }
            Some(token) => {
                debug!("Persisted credential found; resolving profile");
                self.shared.state.send_modify(|state| {
                    state.credential = Some(token.clone());
                    state.profile = None;
                    state.loading = true;
                });

                if let Err(e) = self.resolve(&token).await {
                    warn!(error = %e, "Restored credential did not resolve");
                }
            }
        }
    }

    /// Start a session with a freshly issued credential.
    ///
    /// The credential is persisted before the profile lookup, so a process
    /// restart mid-resolution still finds it. Overwrites whatever session
    /// existed. Returns after the resolution attempt settles: the resolved
    /// profile on success, [`SessionError::NotAuthenticated`] after forced
    /// teardown.
    pub async fn login(&self, credential: &str) -> Result<Profile> {
        if credential.is_empty() {
            return Err(SessionError::EmptyCredential.into());
        }

        let _guard = self.mutation.lock().await;
        info!("Login requested");

        self.shared.tokens.set(credential)?;
        self.shared.state.send_modify(|state| {
            state.credential = Some(credential.to_string());
            state.profile = None;
        });

        self.resolve(credential).await
    }

    /// End the session. Idempotent and infallible: storage errors are logged
    /// and swallowed. Emits [`SessionEvent::LoggedOut`] so the coordinator
    /// redirects to the unauthenticated entry point.
    pub async fn logout(&self) {
        let _guard = self.mutation.lock().await;

        self.shared.tokens.clear();
        self.shared.state.send_if_modified(|state| {
            if *state == SessionState::anonymous() {
                false
            } else {
                *state = SessionState::anonymous();
                true
            }
        });

        info!("Logged out");
        self.shared.emit(SessionEvent::LoggedOut);
    }

    /// Resolve the credential to a profile and apply the outcome.
    ///
    /// The lookup is never cancelled; if the persisted credential changed
    /// while it was in flight (an invalidation raced us), the result is
    /// discarded instead of resurrecting a stale session.
    async fn resolve(&self, credential: &str) -> Result<Profile> {
        match self.api.fetch_profile().await {
            Ok(profile) => {
                if self.shared.tokens.get().as_deref() != Some(credential) {
                    debug!("Credential changed during resolution; discarding result");
                    self.shared.state.send_if_modified(|state| {
                        if state.loading {
                            state.loading = false;
                            true
                        } else {
                            false
                        }
                    });
                    return Err(SessionError::NotAuthenticated.into());
                }

                self.shared.state.send_modify(|state| {
                    state.credential = Some(credential.to_string());
                    state.profile = Some(profile.clone());
                    state.loading = false;
                });
                info!(username = %profile.username, "Profile resolved");
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, "Profile resolution failed; tearing down session");
                self.shared.invalidate();
                Err(SessionError::NotAuthenticated.into())
            }
        }
    }
}
