//! Unit-test doubles. Integration tests use `bdams-testing` instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bdams_domain::id::UserId;

use crate::domain::provider::IdentityProvider;
use crate::domain::types::{Credential, Identity};
use crate::error::ClientError;

pub struct StubProvider {
    accounts: HashMap<String, (String, Identity)>,
    issued: AtomicU64,
    pub revoked: AtomicBool,
}

impl StubProvider {
    pub fn with_accounts(accounts: &[(&str, &str, &str)]) -> Self {
        let accounts = accounts
            .iter()
            .map(|(id, email, password)| {
                let identity = Identity {
                    id: UserId::from(*id),
                    email: (*email).to_owned(),
                    display_name: None,
                };
                ((*email).to_owned(), ((*password).to_owned(), identity))
            })
            .collect();
        Self {
            accounts,
            issued: AtomicU64::new(0),
            revoked: AtomicBool::new(false),
        }
    }

    pub fn tokens_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for StubProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, ClientError> {
        match self.accounts.get(email) {
            Some((expected, identity)) if expected == password => Ok(Credential {
                identity: identity.clone(),
                refresh_token: format!("refresh-{}", identity.id),
            }),
            _ => Err(ClientError::InvalidCredentials),
        }
    }

    async fn fetch_token(&self, credential: &Credential) -> Result<String, ClientError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(ClientError::Unauthorized);
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{}-{n}", credential.identity.id))
    }
}
