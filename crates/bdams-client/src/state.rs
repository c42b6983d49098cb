use std::sync::Arc;

use bdams_domain::user::{Profile, Registration};

use crate::config::ClientConfig;
use crate::domain::provider::IdentityProvider;
use crate::error::ClientError;
use crate::gateway::ApiGateway;
use crate::identity::IdentityClient;
use crate::session::SessionStore;
use crate::workflow::RequestWorkflowController;

/// One wired-up client: identity, gateway, session and workflow sharing
/// a single provider.
pub struct ClientState<P: IdentityProvider> {
    pub identity: Arc<IdentityClient<P>>,
    pub gateway: Arc<ApiGateway<P>>,
    pub session: Arc<SessionStore<P>>,
    pub workflow: Arc<RequestWorkflowController<P>>,
}

impl<P: IdentityProvider> Clone for ClientState<P> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            gateway: Arc::clone(&self.gateway),
            session: Arc::clone(&self.session),
            workflow: Arc::clone(&self.workflow),
        }
    }
}

impl<P: IdentityProvider> ClientState<P> {
    pub fn new(config: &ClientConfig, provider: P) -> Result<Self, ClientError> {
        let identity = Arc::new(IdentityClient::new(provider));
        let gateway = Arc::new(ApiGateway::new(config, Arc::clone(&identity))?);
        let session = SessionStore::new(
            Arc::clone(&identity),
            Arc::clone(&gateway),
            config.profile_load_timeout,
        );
        let workflow = Arc::new(RequestWorkflowController::new(
            Arc::clone(&gateway),
            Arc::clone(&session),
        ));
        Ok(Self {
            identity,
            gateway,
            session,
            workflow,
        })
    }

    /// Sign in and wait for the profile to load.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Profile, ClientError> {
        self.identity.sign_in(email, password).await?;
        self.session.wait_ready().await
    }

    /// Register, sign in as the new account and wait for its profile.
    pub async fn sign_up(&self, registration: &Registration) -> Result<Profile, ClientError> {
        self.identity.sign_up(&self.gateway, registration).await?;
        self.session.wait_ready().await
    }

    pub fn logout(&self) {
        self.session.logout();
    }
}
