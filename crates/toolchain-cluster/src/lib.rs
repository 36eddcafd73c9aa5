//! Member cluster registry for the toolchain host operator
//!
//! The [`registry`] maps logical cluster names to live handles; the
//! [`controller`] keeps it populated from ToolchainCluster resources.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod error;
pub mod registry;

pub use client::{KubeUserAccountClient, UserAccountClient};
pub use controller::{ClusterContext, CLUSTER_FINALIZER};
pub use error::ClusterError;
pub use registry::{ClusterRegistry, MemberCluster, MemberClusterCache};
