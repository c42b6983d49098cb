//! Ambient plumbing shared by BDAMS binaries and libraries: tracing setup
//! and environment-variable configuration helpers.

pub mod config;
pub mod tracing;
