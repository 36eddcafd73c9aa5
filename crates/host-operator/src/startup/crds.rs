//! CRD installation

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use tracing::info;

use toolchain_common::crd::{
    MasterUserRecord, RegistrationService, ToolchainCluster, ToolchainStatus, UserAccount,
};
use toolchain_common::FIELD_MANAGER;

/// CRDs served by the host cluster
pub fn host_crds() -> Vec<CustomResourceDefinition> {
    vec![
        MasterUserRecord::crd(),
        ToolchainStatus::crd(),
        ToolchainCluster::crd(),
        RegistrationService::crd(),
    ]
}

/// Render the host CRDs and the member-side UserAccount CRD as a YAML stream
pub fn print_crds() -> anyhow::Result<String> {
    let mut out = String::new();
    for crd in host_crds().into_iter().chain([UserAccount::crd()]) {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}

/// Install or upgrade the host CRDs with server-side apply
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in host_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        info!(crd = %name, "installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {name} CRD: {e}"))?;
    }
    info!("host CRDs installed/updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_crds_are_named_in_the_toolchain_group() {
        let names: Vec<_> = host_crds()
            .into_iter()
            .filter_map(|crd| crd.metadata.name)
            .collect();

        assert_eq!(
            names,
            vec![
                "masteruserrecords.toolchain.dev.openshift.com",
                "toolchainstatuses.toolchain.dev.openshift.com",
                "toolchainclusters.toolchain.dev.openshift.com",
                "registrationservices.toolchain.dev.openshift.com",
            ]
        );
    }

    #[test]
    fn printed_crds_include_user_account() {
        let yaml = print_crds().unwrap();
        assert_eq!(yaml.matches("kind: CustomResourceDefinition").count(), 5);
        assert!(yaml.contains("useraccounts.toolchain.dev.openshift.com"));
    }
}
