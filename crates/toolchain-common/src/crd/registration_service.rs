//! RegistrationService CRD types
//!
//! Desired state of the registration service deployment run next to the
//! host operator.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Settings of the authentication client served to the registration UI
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthClientConfig {
    /// URL of the auth client library
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub library_url: String,

    /// Raw auth client configuration (JSON)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config: String,

    /// URL the public keys are fetched from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_keys_url: String,
}

/// Deployment settings of the registration service
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "toolchain.dev.openshift.com",
    version = "v1alpha1",
    kind = "RegistrationService",
    plural = "registrationservices",
    namespaced,
    status = "RegistrationServiceStatus",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Environment","type":"string","jsonPath":".spec.environment"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationServiceSpec {
    /// Container image reference
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Environment name (prod, stage, dev, e2e-tests, ...)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,

    /// Replica count, zero means the template default
    #[serde(default)]
    pub replicas: i32,

    /// Authentication client settings
    #[serde(default)]
    pub auth_client: AuthClientConfig,
}

/// Observed state of the registration service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationServiceStatus {
    /// Current conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
