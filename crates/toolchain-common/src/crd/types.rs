//! Supporting types shared by the toolchain CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type every toolchain resource reports its overall state under
pub const READY_CONDITION: &str = "Ready";

/// Machine-readable condition reasons
pub mod reason {
    /// A UserAccount was created or updated and is awaiting confirmation
    pub const PROVISIONING: &str = "Provisioning";
    /// Every UserAccount of the record matches its embedded spec
    pub const PROVISIONED: &str = "Provisioned";
    /// The target member cluster is unknown or not ready
    pub const TARGET_CLUSTER_NOT_READY: &str = "TargetClusterNotReady";
    /// Reading the UserAccount from the member cluster failed
    pub const UNABLE_TO_GET_USER_ACCOUNT: &str = "UnableToGetUserAccount";
    /// Creating the UserAccount on the member cluster failed
    pub const UNABLE_TO_CREATE_USER_ACCOUNT: &str = "UnableToCreateUserAccount";
    /// Updating the UserAccount on the member cluster failed
    pub const UNABLE_TO_UPDATE_USER_ACCOUNT: &str = "UnableToUpdateUserAccount";
    /// Reconciliation failed outside any UserAccount operation
    pub const UNABLE_TO_RECONCILE: &str = "UnableToReconcile";
    /// The member cluster API answered its health check
    pub const CLUSTER_READY: &str = "ClusterReady";
    /// The member cluster API could not be reached
    pub const CLUSTER_NOT_REACHABLE: &str = "ClusterNotReachable";
    /// Every registration service object was applied
    pub const DEPLOYED: &str = "Deployed";
    /// Applying a registration service object failed
    pub const DEPLOYMENT_FAILED: &str = "DeploymentFailed";
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// `Ready=True` with the given reason
    pub fn ready(reason: impl Into<String>) -> Self {
        Self::new(READY_CONDITION, ConditionStatus::True, reason, "")
    }

    /// `Ready=False` with the given reason and message
    pub fn not_ready(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(READY_CONDITION, ConditionStatus::False, reason, message)
    }

    /// True when type, status, reason and message match, ignoring the timestamp
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
