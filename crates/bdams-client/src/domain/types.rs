use std::fmt;

use bdams_domain::id::UserId;

/// An authenticated user as reported by the identity provider.
///
/// Issued and invalidated only by the provider; the rest of the client holds
/// read-only copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
}

/// Provider-side session material: the identity plus whatever the provider
/// needs to mint fresh tokens for it.
#[derive(Clone)]
pub struct Credential {
    pub identity: Identity,
    pub refresh_token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}
