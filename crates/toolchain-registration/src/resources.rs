//! Creating the RegistrationService resource at startup

use tracing::{info, instrument};

use toolchain_common::crd::{RegistrationService, RegistrationServiceSpec};
use toolchain_common::kube_utils::ObjectManifest;
use toolchain_common::Error;

use crate::controller::RegistrationKubeClient;
use crate::error::RegistrationError;

/// Name of the RegistrationService managed by the host operator
pub const REGISTRATION_SERVICE_NAME: &str = "registration-service";

/// The RegistrationService resource for `namespace` with `spec`
pub fn registration_service(namespace: &str, spec: RegistrationServiceSpec) -> RegistrationService {
    let mut service = RegistrationService::new(REGISTRATION_SERVICE_NAME, spec);
    service.metadata.namespace = Some(namespace.to_string());
    service
}

/// Create the RegistrationService in `namespace`, or bring an existing one
/// in line with `spec`
#[instrument(skip(kube, spec))]
pub async fn create_or_update_resources(
    kube: &dyn RegistrationKubeClient,
    namespace: &str,
    spec: RegistrationServiceSpec,
) -> Result<(), RegistrationError> {
    let service = registration_service(namespace, spec);
    let manifest = ObjectManifest::parse(serde_json::to_value(&service).map_err(Error::from)?)?;
    kube.apply(&manifest)
        .await
        .map_err(|source| RegistrationError::Apply {
            object: manifest.describe(),
            source,
        })?;
    info!(name = REGISTRATION_SERVICE_NAME, "registration service resource applied");
    Ok(())
}
