//! Identity-provider accounts, shared by the mock provider and backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bdams_domain::id::UserId;
use uuid::Uuid;

use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    pub email: String,
    pub password: String,
}

/// Email → account, behind a shared lock. Cloning shares the directory.
#[derive(Clone, Default)]
pub struct AccountDirectory {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account. `None` when the email is taken.
    pub fn create(&self, email: &str, password: &str) -> Option<Account> {
        let mut accounts = lock(&self.accounts);
        let key = email.to_lowercase();
        if accounts.contains_key(&key) {
            return None;
        }
        let account = Account {
            user_id: UserId(Uuid::now_v7().to_string()),
            email: email.to_owned(),
            password: password.to_owned(),
        };
        accounts.insert(key, account.clone());
        Some(account)
    }

    pub fn verify(&self, email: &str, password: &str) -> Option<Account> {
        lock(&self.accounts)
            .get(&email.to_lowercase())
            .filter(|a| a.password == password)
            .cloned()
    }

    pub fn find(&self, user_id: &UserId) -> Option<Account> {
        lock(&self.accounts)
            .values()
            .find(|a| &a.user_id == user_id)
            .cloned()
    }

    /// Delete the account; its credentials stop minting tokens.
    pub fn remove(&self, user_id: &UserId) -> bool {
        let mut accounts = lock(&self.accounts);
        let before = accounts.len();
        accounts.retain(|_, a| &a.user_id != user_id);
        accounts.len() != before
    }
}
