//! Custom Resource Definitions for the toolchain host operator
//!
//! All resources live in the `toolchain.dev.openshift.com/v1alpha1` group.

mod master_user_record;
mod registration_service;
mod toolchain_cluster;
mod toolchain_status;
mod types;
mod user_account;

pub use master_user_record::{
    MasterUserRecord, MasterUserRecordSpec, MasterUserRecordStatus, UserAccountEmbedded,
};
pub use registration_service::{
    AuthClientConfig, RegistrationService, RegistrationServiceSpec, RegistrationServiceStatus,
};
pub use toolchain_cluster::{
    SecretRef, ToolchainCluster, ToolchainClusterSpec, ToolchainClusterStatus,
    KUBECONFIG_SECRET_KEY,
};
pub use toolchain_status::{
    CapacityUsageHost, CapacityUsageMember, HostOperatorStatus, Member, ToolchainStatus,
    ToolchainStatusSpec, ToolchainStatusStatus, TOOLCHAIN_STATUS_NAME,
};
pub use types::{reason, Condition, ConditionStatus, READY_CONDITION};
pub use user_account::{
    NSTemplateSetSpec, NamespaceTemplate, UserAccount, UserAccountSpec, UserAccountStatus,
};
