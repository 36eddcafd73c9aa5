//! Errors of the MasterUserRecord reconciler

use thiserror::Error;

use toolchain_common::crd::reason;

/// Error raised while reconciling a MasterUserRecord
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No member cluster of that name is registered
    #[error("the member cluster {cluster} not found in the registry")]
    TargetClusterNotFound {
        /// Logical cluster name
        cluster: String,
    },

    /// The member cluster is registered but failed its last health check
    #[error("the member cluster {cluster} is not ready")]
    TargetClusterNotReady {
        /// Logical cluster name
        cluster: String,
    },

    /// A UserAccount operation on a member cluster failed
    #[error("{action}: {source}")]
    Action {
        /// What was attempted, e.g. "failed to create UserAccount for user john"
        action: String,
        /// Condition reason reported for this failure
        reason: &'static str,
        /// Underlying failure
        #[source]
        source: toolchain_common::Error,
    },

    /// Writing the record status failed
    #[error("unable to update status: {0}")]
    StatusWrite(#[source] toolchain_common::Error),

    /// Reporting `cause` on the record status failed as well
    #[error("{cause}; unable to update status: {source}")]
    StatusUpdate {
        /// Error the status write was meant to report
        cause: Box<ReconcileError>,
        /// Status write failure
        #[source]
        source: toolchain_common::Error,
    },

    /// Host API failure outside any UserAccount operation
    #[error(transparent)]
    Common(#[from] toolchain_common::Error),
}

impl ReconcileError {
    /// Condition reason this error is reported under
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::TargetClusterNotFound { .. }
            | ReconcileError::TargetClusterNotReady { .. } => reason::TARGET_CLUSTER_NOT_READY,
            ReconcileError::Action { reason, .. } => *reason,
            ReconcileError::StatusUpdate { cause, .. } => cause.reason(),
            ReconcileError::StatusWrite(_) | ReconcileError::Common(_) => {
                reason::UNABLE_TO_RECONCILE
            }
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Action { source, .. } => source.is_retryable(),
            ReconcileError::Common(e) => e.is_retryable(),
            _ => true,
        }
    }
}
