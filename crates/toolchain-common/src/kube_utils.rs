//! Kubernetes client helpers

use std::fmt;
use std::path::Path;
use std::time::Duration;

use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config, Resource, ResourceExt};

use crate::{Error, FIELD_MANAGER};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Namespace + name identifying a namespaced resource
///
/// This is the only payload of a reconciliation request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Resource namespace
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced resource, or a validation error when it has no namespace
    pub fn of<K: Resource>(obj: &K) -> Result<Self, Error> {
        let name = obj.name_any();
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "resource has no namespace"))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Create a kube client from an optional kubeconfig path with default timeouts
///
/// Without a path the config is inferred (in-cluster, then `KUBECONFIG`).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {}", e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Create a kube client for a remote cluster from raw kubeconfig bytes
pub async fn client_from_kubeconfig(kubeconfig_data: &[u8]) -> Result<Client, Error> {
    let kubeconfig_str = std::str::from_utf8(kubeconfig_data).map_err(|e| {
        Error::internal_with_context("kubeconfig", format!("invalid kubeconfig UTF-8: {e}"))
    })?;

    let kubeconfig: Kubeconfig = serde_yaml::from_str(kubeconfig_str).map_err(|e| {
        Error::internal_with_context("kubeconfig", format!("invalid kubeconfig YAML: {e}"))
    })?;

    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::internal_with_context("kubeconfig", format!("failed to build config: {e}"))
        })?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("kubeconfig", format!("failed to create client: {e}"))
    })
}

/// Split an apiVersion into group and version; the core group is empty
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Lowercase plural resource name of a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{lower}es")
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{lower}s")
    }
}

/// Build an ApiResource from apiVersion and kind without discovery
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// A rendered object ready to be applied
#[derive(Clone, Debug)]
pub struct ObjectManifest {
    /// Full object
    pub value: serde_json::Value,
    /// Object name
    pub name: String,
    /// Object namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Resource the object belongs to
    pub api_resource: ApiResource,
}

impl ObjectManifest {
    /// Extract name, namespace and resource type from an object
    pub fn parse(value: serde_json::Value) -> Result<Self, Error> {
        let field = |pointer: &str| value.pointer(pointer).and_then(|v| v.as_str());
        let api_version = field("/apiVersion")
            .ok_or_else(|| Error::serialization("object missing apiVersion"))?;
        let kind = field("/kind").ok_or_else(|| Error::serialization("object missing kind"))?;
        let name = field("/metadata/name")
            .ok_or_else(|| Error::serialization_for_kind(kind, "object missing metadata.name"))?
            .to_string();
        let namespace = field("/metadata/namespace").map(str::to_string);
        let api_resource = build_api_resource(api_version, kind);
        Ok(Self {
            value,
            name,
            namespace,
            api_resource,
        })
    }

    /// `Kind/name` for logs and errors
    pub fn describe(&self) -> String {
        format!("{}/{}", self.api_resource.kind, self.name)
    }
}

/// Server-side apply an object, taking ownership of conflicting fields
pub async fn apply_object(client: &Client, manifest: &ObjectManifest) -> Result<(), Error> {
    let api: Api<DynamicObject> = match &manifest.namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &manifest.api_resource),
        None => Api::all_with(client.clone(), &manifest.api_resource),
    };
    api.patch(
        &manifest.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&manifest.value),
    )
    .await
    .map_err(|e| {
        Error::internal_with_context(
            "apply_object",
            format!("failed to apply {}: {}", manifest.describe(), e),
        )
    })?;
    Ok(())
}
