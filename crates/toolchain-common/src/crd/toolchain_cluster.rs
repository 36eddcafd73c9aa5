//! ToolchainCluster CRD types
//!
//! A `ToolchainCluster` registers a member cluster with the host: where its
//! API server is, which Secret holds credentials for it, and which namespace
//! the member operator (and so every UserAccount) lives in.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus, READY_CONDITION};

/// Key in the referenced Secret holding the member kubeconfig
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

/// Reference to a Secret in the ToolchainCluster's namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SecretRef {
    /// Secret name
    pub name: String,
}

/// Registration of a member cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "toolchain.dev.openshift.com",
    version = "v1alpha1",
    kind = "ToolchainCluster",
    plural = "toolchainclusters",
    shortname = "tc",
    namespaced,
    status = "ToolchainClusterStatus",
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".spec.apiEndpoint"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainClusterSpec {
    /// API server URL of the member cluster
    pub api_endpoint: String,

    /// Secret holding the member kubeconfig under the `kubeconfig` key
    pub secret_ref: SecretRef,

    /// Namespace of the member operator on that cluster
    #[serde(default = "default_operator_namespace")]
    pub operator_namespace: String,
}

fn default_operator_namespace() -> String {
    crate::MEMBER_OPERATOR_NAMESPACE.to_string()
}

/// Observed state of a member cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainClusterStatus {
    /// Current conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ToolchainClusterStatus {
    /// True when the last health check succeeded
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == READY_CONDITION && c.status == ConditionStatus::True)
    }
}
