//! Auth types shared across BDAMS crates.
//!
//! Provides the bearer header helpers used by the API client, JWT claim
//! validation, and (behind features) token issuance and an axum extractor.

pub mod bearer;
#[cfg(feature = "server")]
pub mod identity;
pub mod token;
