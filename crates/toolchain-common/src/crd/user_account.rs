//! UserAccount CRD types
//!
//! A `UserAccount` is the per-cluster account provisioned on a member
//! cluster. Its spec is copied verbatim from the matching entry of the
//! owning `MasterUserRecord`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// A namespace generated for the user from a tier template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceTemplate {
    /// Namespace type within the tier (e.g., ide, cicd, stage)
    #[serde(rename = "type")]
    pub type_: String,

    /// Revision of the template the namespace is generated from
    pub revision: String,

    /// Inline template, empty when the tier default applies
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,
}

/// Set of namespaces generated for a user from a namespace-template tier
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NSTemplateSetSpec {
    /// Name of the tier the namespaces are generated from
    pub tier_name: String,

    /// Namespaces to generate
    #[serde(default)]
    pub namespaces: Vec<NamespaceTemplate>,
}

/// Desired state of a user account on a member cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "toolchain.dev.openshift.com",
    version = "v1alpha1",
    kind = "UserAccount",
    plural = "useraccounts",
    shortname = "ua",
    namespaced,
    status = "UserAccountStatus",
    printcolumn = r#"{"name":"User ID","type":"string","jsonPath":".spec.userID"}"#,
    printcolumn = r#"{"name":"Tier","type":"string","jsonPath":".spec.nsTemplateSet.tierName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountSpec {
    /// Opaque identifier of the tenant
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Namespace limit applied to the user
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ns_limit: String,

    /// Namespaces to provision for the user
    #[serde(default)]
    pub ns_template_set: NSTemplateSetSpec,
}

/// Observed state of a user account, written by the member operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountStatus {
    /// Current conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
