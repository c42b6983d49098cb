//! Identity-provider wrapper: sign-in/up/out, change notifications, tokens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use bdams_domain::user::{Profile, Registration};

use crate::domain::provider::IdentityProvider;
use crate::domain::types::{Credential, Identity};
use crate::error::ClientError;
use crate::gateway::ApiGateway;
use crate::lock;

/// Handle returned by [`IdentityClient::on_identity_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(Option<&Identity>) + Send + Sync>;

/// The single authenticated session of this process, as seen by the
/// identity provider.
pub struct IdentityClient<P> {
    provider: P,
    current: Mutex<Option<Credential>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl<P: IdentityProvider> IdentityClient<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            current: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn current(&self) -> Option<Identity> {
        lock(&self.current).as_ref().map(|c| c.identity.clone())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ClientError> {
        let credential = self.provider.sign_in(email, password).await?;
        let identity = credential.identity.clone();
        info!(user_id = %identity.id, "signed in");
        self.establish(credential);
        Ok(identity)
    }

    /// Register a new account, then sign in as it.
    ///
    /// The profile is persisted first; if that fails no identity session
    /// is created.
    pub async fn sign_up(
        &self,
        gateway: &ApiGateway<P>,
        registration: &Registration,
    ) -> Result<Profile, ClientError> {
        let profile = gateway.register(registration).await?;
        debug!(user_id = %profile.id, role = %profile.role, "profile registered");
        self.sign_in(&registration.email, &registration.password)
            .await?;
        Ok(profile)
    }

    /// Drop the local session. No-op (and no notification) when signed out.
    pub fn sign_out(&self) {
        let previous = lock(&self.current).take();
        if let Some(credential) = previous {
            info!(user_id = %credential.identity.id, "signed out");
            self.notify(None);
        }
    }

    /// Register `callback` for transitions into and out of the authenticated
    /// state (and switches between users). The new identity is already
    /// current when the callback runs.
    pub fn on_identity_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(Option<&Identity>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(callback)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// A fresh token for the current identity, or `None` when signed out.
    ///
    /// Always asks the provider; tokens are short-lived and never cached here.
    pub async fn get_token(&self) -> Result<Option<String>, ClientError> {
        let Some(credential) = lock(&self.current).clone() else {
            return Ok(None);
        };
        let token = self.provider.fetch_token(&credential).await?;

        // Signed out or switched user while the token was being minted.
        let still_current = lock(&self.current)
            .as_ref()
            .is_some_and(|c| c.identity.id == credential.identity.id);
        Ok(still_current.then_some(token))
    }

    fn establish(&self, credential: Credential) {
        let identity = credential.identity.clone();
        let changed = {
            let mut current = lock(&self.current);
            let changed = current.as_ref().map(|c| &c.identity.id) != Some(&identity.id);
            *current = Some(credential);
            changed
        };
        if changed {
            self.notify(Some(&identity));
        }
    }

    fn notify(&self, identity: Option<&Identity>) {
        // Snapshot so callbacks may (un)register listeners or sign out.
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(identity);
        }
    }
}
