//! Common types for the toolchain host operator: CRDs, conditions, errors and utilities

#![deny(missing_docs)]

pub mod condition;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod metrics;
pub mod telemetry;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of every toolchain resource
pub const TOOLCHAIN_API_GROUP: &str = "toolchain.dev.openshift.com";

/// Namespace the host operator runs in and watches by default
pub const HOST_OPERATOR_NAMESPACE: &str = "toolchain-host-operator";

/// Namespace the member operator runs in on each member cluster
pub const MEMBER_OPERATOR_NAMESPACE: &str = "toolchain-member-operator";

/// Label on a UserAccount naming the MasterUserRecord it was provisioned from
pub const OWNER_LABEL_KEY: &str = "toolchain.dev.openshift.com/owner";

/// Annotation on a UserAccount carrying the sync index of the last applied spec
pub const SYNC_INDEX_ANNOTATION: &str = "toolchain.dev.openshift.com/sync-index";

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "toolchain-host-operator";
