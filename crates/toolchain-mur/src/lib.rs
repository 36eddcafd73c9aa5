//! MasterUserRecord reconciler
//!
//! For each MasterUserRecord, provisions the embedded UserAccounts on their
//! target member clusters, one create or update per pass, and reports the
//! outcome as the record's `Ready` condition.

#![deny(missing_docs)]

pub mod controller;
pub mod error;
pub mod status;

pub use controller::{
    error_policy, reconcile, reconcile_key, MurContext, MurKubeClient, MurKubeClientImpl,
    ReconcileOutcome,
};
pub use error::ReconcileError;
