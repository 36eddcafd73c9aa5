//! ToolchainStatus CRD types
//!
//! `ToolchainStatus` is the durable publication point of capacity usage:
//! how many MasterUserRecords exist and how many UserAccounts each member
//! cluster hosts. The account counter rebuilds itself from it on startup.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Well-known name of the singleton ToolchainStatus in the host namespace
pub const TOOLCHAIN_STATUS_NAME: &str = "toolchain-status";

/// ToolchainStatus carries no desired state
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "toolchain.dev.openshift.com",
    version = "v1alpha1",
    kind = "ToolchainStatus",
    plural = "toolchainstatuses",
    namespaced,
    status = "ToolchainStatusStatus",
    printcolumn = r#"{"name":"MURs","type":"integer","jsonPath":".status.hostOperator.masterUserRecordCount"}"#
)]
pub struct ToolchainStatusSpec {}

/// Published capacity usage of the host and its members
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainStatusStatus {
    /// Host operator usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_operator: Option<HostOperatorStatus>,

    /// Per-member usage
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Host operator section of the status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostOperatorStatus {
    /// Capacity usage on the host
    #[serde(default)]
    pub capacity_usage: CapacityUsageHost,
}

/// Host-wide capacity usage
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityUsageHost {
    /// Number of MasterUserRecords
    #[serde(default)]
    pub master_user_record_count: usize,
}

/// One member cluster's section of the status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Logical cluster name
    pub cluster_name: String,

    /// Capacity usage on the member
    #[serde(default)]
    pub capacity_usage: CapacityUsageMember,
}

/// Capacity usage of a single member cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityUsageMember {
    /// Number of UserAccounts attributed to the member
    #[serde(default)]
    pub user_account_count: usize,
}

impl ToolchainStatusStatus {
    /// Published MasterUserRecord count, zero when never published
    pub fn master_user_record_count(&self) -> usize {
        self.host_operator
            .as_ref()
            .map(|h| h.capacity_usage.master_user_record_count)
            .unwrap_or(0)
    }
}
