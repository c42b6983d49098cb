//! Domain types shared across BDAMS crates.
//!
//! This crate contains only pure types with no framework dependencies:
//! identifiers, profiles, blood requests and their lifecycle, the access
//! policy table, and the JSON envelopes exchanged with the backend.

pub mod id;
pub mod policy;
pub mod request;
pub mod user;
pub mod wire;
