//! Errors of the ToolchainCluster controller

use thiserror::Error;

use toolchain_common::crd::KUBECONFIG_SECRET_KEY;

/// Error raised while reconciling a ToolchainCluster
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The referenced secret is missing or has no kubeconfig
    #[error("secret {secret} has no {key} key", key = KUBECONFIG_SECRET_KEY)]
    MissingKubeconfig {
        /// Name of the referenced secret
        secret: String,
    },

    /// Host API or client construction failure
    #[error(transparent)]
    Common(#[from] toolchain_common::Error),
}

impl ClusterError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ClusterError::MissingKubeconfig { .. } => true,
            ClusterError::Common(e) => e.is_retryable(),
        }
    }
}
