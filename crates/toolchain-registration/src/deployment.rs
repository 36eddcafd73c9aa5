//! Rendering the registration service objects

use kube::{Resource, ResourceExt};
use tracing::debug;

use toolchain_common::crd::RegistrationService;
use toolchain_common::kube_utils::ObjectManifest;
use toolchain_common::template::{Template, TemplateError};
use toolchain_common::Error;

use crate::error::RegistrationError;
use crate::vars::template_vars;

const DEPLOYMENT_TEMPLATE: &str = include_str!("../templates/registration-service.yaml");

/// Parse the embedded registration service template
pub fn deployment_template() -> Result<Template, TemplateError> {
    Template::parse(DEPLOYMENT_TEMPLATE)
}

/// Render every object of `template` for `service`
///
/// Each object is owned by `service` when it has been persisted (has a uid),
/// so deleting the RegistrationService garbage collects the deployment.
pub fn render_objects(
    template: &Template,
    service: &RegistrationService,
) -> Result<Vec<ObjectManifest>, RegistrationError> {
    let owner = service.controller_owner_ref(&());
    if owner.is_none() {
        debug!(name = %service.name_any(), "registration service has no uid, objects are unowned");
    }

    template
        .process(&template_vars(service))?
        .into_iter()
        .map(|mut object| -> Result<ObjectManifest, RegistrationError> {
            if let Some(owner) = &owner {
                let owner = serde_json::to_value(owner).map_err(Error::from)?;
                object["metadata"]["ownerReferences"] = serde_json::Value::Array(vec![owner]);
            }
            Ok(ObjectManifest::parse(object)?)
        })
        .collect()
}
