//! Toolchain host operator
//!
//! Wires the member cluster registry, the account counter and the
//! MasterUserRecord, ToolchainCluster and RegistrationService controllers
//! into one process.

#![deny(missing_docs)]

/// Layered operator configuration (file, environment, defaults)
pub mod config;
/// Controller futures for each watched resource
pub mod controller_runner;
/// One-shot startup tasks run before the controllers
pub mod startup;
