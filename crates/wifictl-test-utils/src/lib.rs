#![deny(unsafe_code)]

//! Shared test utilities for the wifictl workspace.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! wifictl-test-utils = { workspace = true }
//! ```
//!
//! [`peer`] only uses std types, so it is safe to use from `wifictl-core`'s
//! own unit tests. [`daemon`] and [`config`] hand out `wifictl-core` /
//! `wifictl-config` types and belong in integration tests.

pub mod config;
pub mod daemon;
pub mod peer;
pub mod tracing_setup;
