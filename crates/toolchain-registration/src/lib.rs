//! Registration service deployment
//!
//! A RegistrationService resource describes how the registration service
//! should run next to the host operator. The controller renders the embedded
//! deployment template from its spec and applies every object with the
//! RegistrationService as owner.

#![deny(missing_docs)]

mod controller;
mod deployment;
mod error;
mod resources;
mod vars;

pub use controller::{
    error_policy, reconcile, reconcile_key, KubeRegistrationClient, RegistrationContext,
    RegistrationKubeClient,
};
pub use deployment::{deployment_template, render_objects};
pub use error::RegistrationError;
pub use resources::{create_or_update_resources, registration_service, REGISTRATION_SERVICE_NAME};
pub use vars::template_vars;
