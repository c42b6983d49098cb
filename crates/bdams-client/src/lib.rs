//! Session, authorization and request-workflow core of the BDAMS client.
//!
//! Components, leaves first:
//!
//! - [`identity::IdentityClient`] wraps the external identity provider.
//! - [`gateway::ApiGateway`] talks to the backend with a fresh bearer token per call.
//! - [`session::SessionStore`] owns the signed-in identity and profile.
//! - [`workflow::RequestWorkflowController`] drives blood requests through their lifecycle.
//!
//! Role checks go through [`bdams_domain::policy::AccessPolicy`].
//! [`state::ClientState`] wires one instance of each together.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod infra;
pub mod session;
pub mod state;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use domain::provider::IdentityProvider;
pub use domain::types::{Credential, Identity};
pub use error::ClientError;
pub use state::ClientState;

/// Lock a mutex, recovering the data if a previous holder panicked.
/// Critical sections in this crate never leave state half-written.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
