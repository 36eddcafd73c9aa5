//! MasterUserRecord CRD types
//!
//! The `MasterUserRecord` (MUR) is the tenant-level aggregate in the host
//! cluster. It lists one embedded account spec per member cluster the tenant
//! should be provisioned on.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, READY_CONDITION};
use super::user_account::UserAccountSpec;

/// Desired UserAccount for one target cluster, embedded in a MasterUserRecord
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountEmbedded {
    /// Logical name of the member cluster, resolved through the cluster registry
    pub target_cluster: String,

    /// Opaque version token of the embedded spec
    #[serde(default)]
    pub sync_index: String,

    /// Full desired state of the remote UserAccount
    pub spec: UserAccountSpec,
}

/// Tenant-level record listing the desired per-cluster accounts
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "toolchain.dev.openshift.com",
    version = "v1alpha1",
    kind = "MasterUserRecord",
    plural = "masteruserrecords",
    shortname = "mur",
    namespaced,
    status = "MasterUserRecordStatus",
    printcolumn = r#"{"name":"User ID","type":"string","jsonPath":".spec.userID"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MasterUserRecordSpec {
    /// Opaque identifier of the tenant
    #[serde(rename = "userID")]
    pub user_id: String,

    /// One entry per target cluster, in provisioning order
    #[serde(default)]
    pub user_accounts: Vec<UserAccountEmbedded>,
}

/// Observed state of a MasterUserRecord
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterUserRecordStatus {
    /// Current conditions, at most one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl MasterUserRecord {
    /// Conditions currently recorded on the status, empty when there is no status
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// The `Ready` condition, if one has been recorded
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.type_ == READY_CONDITION)
    }

    /// Names of the clusters this record targets, in spec order
    pub fn target_clusters(&self) -> impl Iterator<Item = &str> {
        self.spec
            .user_accounts
            .iter()
            .map(|ua| ua.target_cluster.as_str())
    }
}
