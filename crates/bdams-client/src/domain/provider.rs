use std::future::Future;

use crate::domain::types::Credential;
use crate::error::ClientError;

/// Port to the external identity provider.
///
/// Futures are `Send` so provider calls can run inside spawned tasks
/// (the session store fetches profiles in the background).
pub trait IdentityProvider: Send + Sync + 'static {
    /// Exchange email + password for a credential.
    /// Fails with [`ClientError::InvalidCredentials`] on a bad pair.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Credential, ClientError>> + Send;

    /// Mint a fresh short-lived token for `credential`.
    /// Fails with [`ClientError::Unauthorized`] once the credential is revoked.
    fn fetch_token(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;
}
