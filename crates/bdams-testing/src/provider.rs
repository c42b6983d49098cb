//! In-memory identity provider minting HS256 tokens the mock backend accepts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bdams_auth_types::token::{JwtClaims, issue_token};
use bdams_client::{ClientError, Credential, Identity, IdentityProvider};
use uuid::Uuid;

use crate::TEST_JWT_SECRET;
use crate::accounts::AccountDirectory;

const TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct MockIdentityProvider {
    accounts: AccountDirectory,
    secret: Arc<str>,
    issued: Arc<AtomicU64>,
}

impl MockIdentityProvider {
    pub fn new(accounts: AccountDirectory) -> Self {
        Self {
            accounts,
            secret: Arc::from(TEST_JWT_SECRET),
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn tokens_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for MockIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, ClientError> {
        let account = self
            .accounts
            .verify(email, password)
            .ok_or(ClientError::InvalidCredentials)?;
        Ok(Credential {
            identity: Identity {
                id: account.user_id,
                email: account.email,
                display_name: None,
            },
            refresh_token: Uuid::new_v4().to_string(),
        })
    }

    async fn fetch_token(&self, credential: &Credential) -> Result<String, ClientError> {
        let account = self
            .accounts
            .find(&credential.identity.id)
            .ok_or(ClientError::Unauthorized)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClientError::Internal(e.into()))?
            .as_secs();
        let claims = JwtClaims {
            sub: account.user_id.to_string(),
            email: account.email,
            iat: now,
            exp: now + TOKEN_TTL.as_secs(),
            jti: Uuid::now_v7().to_string(),
        };
        let token =
            issue_token(&claims, &self.secret).map_err(|e| ClientError::Internal(e.into()))?;
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(token)
    }
}
