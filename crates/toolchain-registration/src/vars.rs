//! Template variables for the registration service deployment

use std::collections::BTreeMap;

use kube::ResourceExt;

use toolchain_common::crd::RegistrationService;

/// Template variables derived from a RegistrationService
///
/// Empty spec fields are left out so the template defaults apply. `REPLICAS`
/// is set for any non-zero replica count.
pub fn template_vars(service: &RegistrationService) -> BTreeMap<String, String> {
    let spec = &service.spec;
    let mut vars = BTreeMap::new();
    let mut set = |key: &str, value: &str| {
        if !value.is_empty() {
            vars.insert(key.to_string(), value.to_string());
        }
    };

    set("NAMESPACE", service.namespace().as_deref().unwrap_or_default());
    set("IMAGE", &spec.image);
    set("ENVIRONMENT", &spec.environment);
    set("AUTH_CLIENT_LIBRARY_URL", &spec.auth_client.library_url);
    set("AUTH_CLIENT_CONFIG_RAW", &spec.auth_client.config);
    set("AUTH_CLIENT_PUBLIC_KEYS_URL", &spec.auth_client.public_keys_url);
    if spec.replicas != 0 {
        set("REPLICAS", &spec.replicas.to_string());
    }
    vars
}
