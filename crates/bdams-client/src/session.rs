//! Signed-in identity and its profile, published as one observable state.
//!
//! ```text
//! SignedOut ──identity──▶ ProfileLoading ──profile──▶ Ready
//!     ▲                        │
//!     │                        └──timeout / error──▶ ProfileLoadFailed
//!     └────────────── sign-out (from any state) ─────────────┘
//! ```
//!
//! Every identity change bumps a generation counter; fetches and timers
//! started for an older generation are discarded when they complete.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bdams_domain::user::{Profile, ProfileUpdate};
use bdams_domain::wire::FieldError;

use crate::domain::provider::IdentityProvider;
use crate::domain::types::Identity;
use crate::error::ClientError;
use crate::gateway::ApiGateway;
use crate::identity::{IdentityClient, ListenerId};
use crate::lock;

/// Why a profile load ended without a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    Timeout,
    Error { kind: &'static str, message: String },
}

impl LoadFailure {
    fn from_error(err: &ClientError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn to_error(&self) -> ClientError {
        match self {
            Self::Timeout => ClientError::ProfileLoadTimeout,
            Self::Error { message, .. } => ClientError::ProfileLoadFailed(message.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    ProfileLoading {
        identity: Identity,
    },
    Ready {
        identity: Identity,
        profile: Profile,
    },
    /// Terminal for this identity; the only way out is signing out.
    ProfileLoadFailed {
        identity: Identity,
        failure: LoadFailure,
    },
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedOut => None,
            Self::ProfileLoading { identity }
            | Self::Ready { identity, .. }
            | Self::ProfileLoadFailed { identity, .. } => Some(identity),
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Self::Ready { profile, .. } => Some(profile),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::ProfileLoading { .. })
    }

    /// The profile, or the error explaining why there is none.
    pub fn into_result(self) -> Result<Profile, ClientError> {
        match self {
            Self::Ready { profile, .. } => Ok(profile),
            other => Err(other.not_ready()),
        }
    }

    fn not_ready(&self) -> ClientError {
        match self {
            Self::SignedOut => ClientError::NotSignedIn,
            Self::ProfileLoading { .. } => ClientError::ProfileLoading,
            Self::ProfileLoadFailed { failure, .. } => failure.to_error(),
            Self::Ready { .. } => ClientError::Internal(anyhow::anyhow!("profile already loaded")),
        }
    }
}

/// Aborts the wrapped task when dropped.
struct Task(JoinHandle<()>);

impl Drop for Task {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One-shot, cancellable timer. Dropping it cancels the pending expiry.
pub(crate) struct ProfileLoadTimer {
    _task: Task,
}

impl ProfileLoadTimer {
    pub(crate) fn start<F>(after: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_expire();
        });
        Self {
            _task: Task(handle),
        }
    }
}

#[derive(Default)]
struct Inner {
    generation: u64,
    timer: Option<ProfileLoadTimer>,
    fetch: Option<Task>,
}

/// Owns the session. Shared by `Arc`; there is no global instance.
pub struct SessionStore<P: IdentityProvider> {
    identity: Arc<IdentityClient<P>>,
    gateway: Arc<ApiGateway<P>>,
    profile_load_timeout: Duration,
    state: watch::Sender<SessionState>,
    inner: Mutex<Inner>,
    listener: ListenerId,
    me: Weak<Self>,
}

impl<P: IdentityProvider> SessionStore<P> {
    /// Create the store and attach it to `identity` and `gateway`.
    ///
    /// If an identity is already signed in, its profile load starts
    /// immediately, which requires a Tokio runtime.
    pub fn new(
        identity: Arc<IdentityClient<P>>,
        gateway: Arc<ApiGateway<P>>,
        profile_load_timeout: Duration,
    ) -> Arc<Self> {
        let store = Arc::new_cyclic(|me: &Weak<Self>| {
            let on_change = me.clone();
            let listener = identity.on_identity_change(move |current| {
                if let Some(store) = on_change.upgrade() {
                    store.handle_identity_change(current.cloned());
                }
            });

            let on_unauthorized = me.clone();
            gateway.set_unauthorized_hook(Arc::new(move || {
                if let Some(store) = on_unauthorized.upgrade() {
                    store.invalidate();
                }
            }));

            let (state, _) = watch::channel(SessionState::SignedOut);
            Self {
                identity: Arc::clone(&identity),
                gateway: Arc::clone(&gateway),
                profile_load_timeout,
                state,
                inner: Mutex::new(Inner::default()),
                listener,
                me: me.clone(),
            }
        });

        if let Some(current) = store.identity.current() {
            store.handle_identity_change(Some(current));
        }
        store
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile().cloned()
    }

    /// The loaded profile, or why it is unavailable right now.
    pub fn require_profile(&self) -> Result<Profile, ClientError> {
        self.state().into_result()
    }

    /// Wait until the session leaves `ProfileLoading`.
    pub async fn wait_ready(&self) -> Result<Profile, ClientError> {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(SessionState::is_settled)
            .await
            .map_err(|e| ClientError::Internal(e.into()))?
            .clone();
        settled.into_result()
    }

    /// Sign out and clear the profile.
    pub fn logout(&self) {
        self.identity.sign_out();
        self.clear();
    }

    /// Forced logout after the backend rejected our token.
    pub fn invalidate(&self) {
        if self.state.borrow().identity().is_some() {
            warn!("session invalidated by backend");
        }
        self.logout();
    }

    /// Refetch the profile while `Ready`.
    pub async fn refresh_profile(&self) -> Result<Profile, ClientError> {
        let (generation, identity, _) = self.ready_snapshot()?;
        let profile = self.gateway.fetch_profile().await?;
        self.apply_profile(generation, &identity, profile)
    }

    /// `PUT /profile`, then adopt the returned profile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ClientError> {
        validate_update(update)?;
        let (generation, identity, current) = self.ready_snapshot()?;
        let profile = self.gateway.update_profile(update).await?;
        if profile.role != current.role {
            return Err(ClientError::Internal(anyhow::anyhow!(
                "backend changed role from {} to {}",
                current.role,
                profile.role
            )));
        }
        let profile = self.apply_profile(generation, &identity, profile)?;
        info!(user_id = %profile.id, "profile updated");
        Ok(profile)
    }

    fn handle_identity_change(&self, identity: Option<Identity>) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        let generation = inner.generation;
        inner.timer = None;
        inner.fetch = None;

        let Some(identity) = identity else {
            debug!(generation, "identity cleared");
            self.state.send_replace(SessionState::SignedOut);
            return;
        };

        debug!(generation, user_id = %identity.id, "loading profile");
        self.state.send_replace(SessionState::ProfileLoading { identity });

        let expire = self.me.clone();
        inner.timer = Some(ProfileLoadTimer::start(
            self.profile_load_timeout,
            move || {
                if let Some(store) = expire.upgrade() {
                    store.expire_load(generation);
                }
            },
        ));
        let gateway = Arc::clone(&self.gateway);
        let finish = self.me.clone();
        inner.fetch = Some(Task(tokio::spawn(async move {
            let result = gateway.fetch_profile().await;
            if let Some(store) = finish.upgrade() {
                store.finish_load(generation, result);
            }
        })));
    }

    fn finish_load(&self, generation: u64, result: Result<Profile, ClientError>) {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            debug!(generation, "discarding stale profile fetch");
            return;
        }
        let identity = match &*self.state.borrow() {
            SessionState::ProfileLoading { identity } => identity.clone(),
            _ => return,
        };
        inner.timer = None;
        inner.fetch = None;

        let next = match result {
            Ok(profile) if profile.id == identity.id => {
                debug!(generation, user_id = %identity.id, role = %profile.role, "profile ready");
                SessionState::Ready { identity, profile }
            }
            Ok(profile) => {
                warn!(expected = %identity.id, got = %profile.id, "profile belongs to another user");
                SessionState::ProfileLoadFailed {
                    identity,
                    failure: LoadFailure::Error {
                        kind: "PROFILE_MISMATCH",
                        message: "profile does not belong to the signed-in user".to_owned(),
                    },
                }
            }
            Err(err) => {
                warn!(generation, error = %err, kind = err.kind(), "profile load failed");
                SessionState::ProfileLoadFailed {
                    identity,
                    failure: LoadFailure::from_error(&err),
                }
            }
        };
        self.state.send_replace(next);
    }

    fn expire_load(&self, generation: u64) {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return;
        }
        let identity = match &*self.state.borrow() {
            SessionState::ProfileLoading { identity } => identity.clone(),
            _ => return,
        };
        inner.fetch = None;
        inner.timer = None;
        warn!(
            user_id = %identity.id,
            timeout_ms = self.profile_load_timeout.as_millis() as u64,
            "profile load timed out"
        );
        self.state.send_replace(SessionState::ProfileLoadFailed {
            identity,
            failure: LoadFailure::Timeout,
        });
    }

    fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.timer = None;
        inner.fetch = None;
        self.state.send_if_modified(|state| {
            if matches!(state, SessionState::SignedOut) {
                false
            } else {
                *state = SessionState::SignedOut;
                true
            }
        });
    }

    fn ready_snapshot(&self) -> Result<(u64, Identity, Profile), ClientError> {
        let inner = lock(&self.inner);
        match self.state() {
            SessionState::Ready { identity, profile } => Ok((inner.generation, identity, profile)),
            other => Err(other.not_ready()),
        }
    }

    fn apply_profile(
        &self,
        generation: u64,
        identity: &Identity,
        profile: Profile,
    ) -> Result<Profile, ClientError> {
        let inner = lock(&self.inner);
        if inner.generation != generation {
            return Err(ClientError::SessionChanged);
        }
        if profile.id != identity.id {
            return Err(ClientError::Internal(anyhow::anyhow!(
                "profile {} does not belong to {}",
                profile.id,
                identity.id
            )));
        }
        self.state.send_replace(SessionState::Ready {
            identity: identity.clone(),
            profile: profile.clone(),
        });
        Ok(profile)
    }
}

impl<P: IdentityProvider> Drop for SessionStore<P> {
    fn drop(&mut self) {
        self.identity.remove_listener(self.listener);
    }
}

fn validate_update(update: &ProfileUpdate) -> Result<(), ClientError> {
    if update.is_empty() {
        return Err(ClientError::Validation {
            message: "nothing to update".to_owned(),
            fields: Vec::new(),
        });
    }
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ClientError::Validation {
            message: "invalid input".to_owned(),
            fields: vec![FieldError::new("name", "must not be empty")],
        });
    }
    Ok(())
}
