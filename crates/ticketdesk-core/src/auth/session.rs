//! Session lifecycle.
//!
//! `SessionController` owns the transitions between
//! `Uninitialized → Loading → Authenticated | Unauthenticated`, publishes
//! them on a watch channel, and hands out access credentials to the
//! resource layer. It is an explicit handle: construct one, clone it into
//! whatever needs it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::User;

use super::credentials::CredentialStore;
use super::token::{self, Claims};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Authenticated(User),
    Unauthenticated,
}

/// Derived view of the session for UI consumers
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl From<&SessionState> for Session {
    fn from(state: &SessionState) -> Self {
        match state {
            SessionState::Authenticated(user) => Session {
                user: Some(user.clone()),
                is_authenticated: true,
                is_loading: false,
            },
            SessionState::Uninitialized | SessionState::Loading => Session {
                user: None,
                is_authenticated: false,
                is_loading: true,
            },
            SessionState::Unauthenticated => Session {
                user: None,
                is_authenticated: false,
                is_loading: false,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("{0}")]
    AuthFailure(String),

    /// The refresh credential was rejected; the session has been signed out
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The refresh exchange could not complete (network, server error)
    #[error("Could not refresh session: {0}")]
    RefreshUnavailable(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone)]
struct RefreshFailure {
    message: String,
    signed_out: bool,
}

impl From<RefreshFailure> for SessionError {
    fn from(failure: RefreshFailure) -> Self {
        if failure.signed_out {
            SessionError::SessionExpired(failure.message)
        } else {
            SessionError::RefreshUnavailable(failure.message)
        }
    }
}

type RefreshFlight = Shared<BoxFuture<'static, Result<String, RefreshFailure>>>;

type SignOutHook = Box<dyn Fn() + Send + Sync>;

struct Inner {
    api: ApiClient,
    store: Arc<CredentialStore>,
    refresh_buffer_secs: i64,
    state: watch::Sender<SessionState>,
    /// In-flight refresh, tagged with its flight id
    refresh_flight: Mutex<Option<(u64, RefreshFlight)>>,
    next_flight: AtomicU64,
    sign_out_hooks: Mutex<Vec<SignOutHook>>,
    /// Bumped whenever a session starts or ends, so a refresh that
    /// completes after logout does not resurrect the credential.
    epoch: AtomicU64,
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        debug!(?state, "Session state changed");
        self.state.send_replace(state);
    }

    fn flight_slot(&self) -> MutexGuard<'_, Option<(u64, RefreshFlight)>> {
        self.refresh_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_sign_out_hooks(&self) {
        let hooks = self
            .sign_out_hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for hook in hooks.iter() {
            hook();
        }
    }

    fn logout(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // Callers arriving after this start a new exchange instead of
        // joining one that belongs to the ended session
        self.flight_slot().take();
        self.store.clear();
        self.set_state(SessionState::Unauthenticated);
        self.run_sign_out_hooks();
        info!("Signed out");
    }

    async fn run_refresh(self: Arc<Self>, flight_id: u64) -> Result<String, RefreshFailure> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let exchanged = match self.store.refresh() {
            None => Err(RefreshFailure {
                message: "No refresh credential stored".to_string(),
                signed_out: true,
            }),
            Some(refresh_token) => self
                .api
                .refresh_access(&refresh_token)
                .await
                .map_err(|e| RefreshFailure {
                    signed_out: !is_transient(&e),
                    message: e.to_string(),
                }),
        };

        let still_current = self.epoch.load(Ordering::SeqCst) == epoch;
        let outcome = match exchanged {
            Ok(access) if still_current => {
                self.store.set_access(&access);
                info!("Access credential refreshed");
                Ok(access)
            }
            Ok(_) => Err(RefreshFailure {
                message: "Session ended while refreshing".to_string(),
                signed_out: true,
            }),
            Err(failure) => {
                if failure.signed_out && still_current {
                    error!(error = %failure.message, "Refresh rejected, signing out");
                    self.logout();
                } else {
                    warn!(error = %failure.message, "Refresh could not complete");
                }
                Err(failure)
            }
        };

        // Logout may already have emptied the slot, and a newer flight may
        // have taken it since
        let mut slot = self.flight_slot();
        if matches!(slot.as_ref(), Some((id, _)) if *id == flight_id) {
            slot.take();
        }
        drop(slot);
        outcome
    }
}

/// Errors that say nothing about the refresh credential itself
fn is_transient(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::NetworkError(_) | ApiError::ServerError(_) | ApiError::RateLimited
    )
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(api: ApiClient, store: Arc<CredentialStore>, refresh_buffer_secs: i64) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                refresh_buffer_secs,
                state,
                refresh_flight: Mutex::new(None),
                next_flight: AtomicU64::new(0),
                sign_out_hooks: Mutex::new(Vec::new()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Run `hook` whenever the session ends, whether by `logout` or forced
    /// by a rejected credential, and when a different user signs in. Hooks
    /// must not call back into the controller.
    pub fn on_sign_out(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner
            .sign_out_hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    // ===== State =====

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn session(&self) -> Session {
        Session::from(&*self.inner.state.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        match &*self.inner.state.borrow() {
            SessionState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.inner.state.borrow(), SessionState::Authenticated(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            *self.inner.state.borrow(),
            SessionState::Uninitialized | SessionState::Loading
        )
    }

    /// Claims of the stored access credential, if it is still valid
    pub fn claims(&self) -> Option<Claims> {
        self.inner.store.access().and_then(|t| token::valid_claims(&t))
    }

    // ===== Transitions =====

    /// Restore a session from stored credentials.
    ///
    /// An absent or expired access credential clears storage without any
    /// network call. The cached user record is used when it matches the
    /// credential's subject; otherwise it is fetched once.
    pub async fn boot(&self) -> SessionState {
        let inner = &self.inner;
        inner.set_state(SessionState::Loading);

        let Some(access) = inner.store.access() else {
            debug!("No stored access credential");
            inner.store.clear();
            inner.set_state(SessionState::Unauthenticated);
            return self.state();
        };

        let Some(claims) = token::valid_claims(&access) else {
            info!("Stored access credential is invalid or expired");
            inner.store.clear();
            inner.set_state(SessionState::Unauthenticated);
            return self.state();
        };

        let user = match inner.store.user() {
            Some(user) if user.id == claims.sub => user,
            _ => match inner.api.me(&access).await {
                Ok(user) => {
                    inner.store.set_user(&user);
                    user
                }
                Err(e) => {
                    warn!(error = %e, "Could not load user for stored credential");
                    inner.store.clear();
                    inner.set_state(SessionState::Unauthenticated);
                    return self.state();
                }
            },
        };

        info!(user_id = %user.id, tenant = %claims.company_id, "Session restored");
        inner.set_state(SessionState::Authenticated(user));
        self.state()
    }

    /// Sign in. Credentials and the user record are persisted before the
    /// authenticated state is published. Failures are returned, never retried.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let inner = &self.inner;
        let previous = self.user();

        match inner.api.login(email, password).await {
            Ok(data) => {
                inner.epoch.fetch_add(1, Ordering::SeqCst);
                if previous.is_some_and(|p| p.id != data.user.id) {
                    info!("Different user signing in");
                    inner.run_sign_out_hooks();
                }
                inner.store.set_access(&data.access_token);
                inner.store.set_refresh(&data.refresh_token);
                inner.store.set_user(&data.user);

                info!(user_id = %data.user.id, "Login successful");
                inner.set_state(SessionState::Authenticated(data.user.clone()));
                Ok(data.user)
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                if !self.is_authenticated() {
                    inner.set_state(SessionState::Unauthenticated);
                }
                Err(SessionError::AuthFailure(login_failure_message(&e)))
            }
        }
    }

    /// Sign out locally. Never waits on the network.
    pub fn logout(&self) {
        self.inner.logout();
    }

    /// Exchange the refresh credential for a new access credential.
    ///
    /// Concurrent callers share a single exchange. A rejected refresh
    /// credential signs the session out.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        let flight = {
            let mut slot = self.inner.flight_slot();
            match slot.as_ref() {
                Some((_, flight)) => {
                    debug!("Joining in-flight refresh");
                    flight.clone()
                }
                None => {
                    let id = self.inner.next_flight.fetch_add(1, Ordering::SeqCst);
                    let flight = Arc::clone(&self.inner).run_refresh(id).boxed().shared();
                    *slot = Some((id, flight.clone()));
                    // Driven independently so it completes even if every caller goes away
                    tokio::spawn(flight.clone());
                    flight
                }
            }
        };

        flight.await.map_err(SessionError::from)
    }

    /// A usable access credential, refreshed first when it is missing,
    /// expired, or inside the refresh buffer.
    pub async fn access_token(&self) -> Result<String, SessionError> {
        let store = &self.inner.store;
        let buffer = self.inner.refresh_buffer_secs;

        let access = store.access();
        if let Some(ref access) = access {
            if !token::is_expiring_soon(access, buffer) {
                return Ok(access.clone());
            }
        }

        if store.refresh().is_some() {
            match self.refresh().await {
                Ok(fresh) => return Ok(fresh),
                Err(SessionError::RefreshUnavailable(message)) => {
                    // Still usable for now; try again on the next call
                    if let Some(access) = access.filter(|a| token::valid_claims(a).is_some()) {
                        debug!(error = %message, "Proactive refresh failed, using current credential");
                        return Ok(access);
                    }
                    return Err(SessionError::RefreshUnavailable(message));
                }
                Err(e) => return Err(e),
            }
        }

        match access.filter(|a| token::valid_claims(a).is_some()) {
            Some(access) => Ok(access),
            None => {
                if self.is_authenticated() {
                    self.logout();
                }
                Err(SessionError::NotAuthenticated)
            }
        }
    }

    /// Run `request` with an access credential. A 401 triggers one refresh
    /// and one replay; a second 401 signs the session out.
    pub async fn authorized<T, F, Fut>(&self, request: F) -> Result<T, SessionError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let used = self.access_token().await?;

        match request(used.clone()).await {
            Err(e) if e.is_unauthorized() => {
                debug!("Request rejected as unauthorized, refreshing once");

                // Another request may already have refreshed past the credential we used
                let retry_token = match self.inner.store.access() {
                    Some(current) if current != used && token::valid_claims(&current).is_some() => current,
                    _ => self.refresh().await?,
                };

                match request(retry_token).await {
                    Err(e) if e.is_unauthorized() => {
                        warn!("Request still unauthorized after refresh, signing out");
                        self.logout();
                        Err(SessionError::SessionExpired(
                            "Credential rejected after refresh".to_string(),
                        ))
                    }
                    other => other.map_err(SessionError::from),
                }
            }
            other => other.map_err(SessionError::from),
        }
    }
}

fn login_failure_message(error: &ApiError) -> String {
    if let Some(message) = error.server_message() {
        return message;
    }
    match error {
        ApiError::Unauthorized | ApiError::AccessDenied(_) => "Invalid email or password".to_string(),
        ApiError::NetworkError(e) if e.is_timeout() => "Connection timed out. Please try again.".to_string(),
        ApiError::NetworkError(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        other => format!("Login failed: {}", other),
    }
}
