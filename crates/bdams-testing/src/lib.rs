//! Test utilities for the BDAMS client.
//!
//! Provides an in-process mock backend (axum on `127.0.0.1:0`), an in-memory
//! identity provider that mints real HS256 tokens, and registration fixtures.
//! Use from tests only.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod accounts;
pub mod backend;
pub mod error;
pub mod fixtures;
pub mod provider;

pub use accounts::AccountDirectory;
pub use backend::MockBackend;
pub use provider::MockIdentityProvider;

/// HMAC secret shared by [`MockIdentityProvider`] and [`MockBackend`].
pub const TEST_JWT_SECRET: &str = "bdams-test-secret";

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
