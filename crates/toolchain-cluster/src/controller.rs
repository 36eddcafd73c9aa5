//! ToolchainCluster controller
//!
//! Keeps the member cluster registry in step with the registered
//! ToolchainClusters: every pass reads the member kubeconfig, checks the API
//! server and upserts the handle with the check result. The outcome is
//! reported as the `Ready` condition and the pass requeues itself, so health
//! is polled even when nothing changes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use toolchain_common::condition;
use toolchain_common::crd::{
    reason, Condition, ToolchainCluster, ToolchainClusterStatus, KUBECONFIG_SECRET_KEY,
};
use toolchain_common::kube_utils::client_from_kubeconfig;
use toolchain_common::{Error, FIELD_MANAGER};

use crate::client::{KubeUserAccountClient, UserAccountClient};
use crate::error::ClusterError;
use crate::registry::{MemberCluster, MemberClusterCache};

/// Finalizer keeping a ToolchainCluster until its handle is unregistered
pub const CLUSTER_FINALIZER: &str = "toolchain.dev.openshift.com/member-cluster";

/// Default interval between health checks of a member cluster
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(10);

/// Host-side operations on ToolchainClusters and their secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterKubeClient: Send + Sync {
    /// Read the kubeconfig key of a secret, `None` when the secret or key is missing
    async fn get_kubeconfig(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Option<Vec<u8>>, Error>;

    /// Merge-patch the status of a ToolchainCluster
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ToolchainClusterStatus,
    ) -> Result<(), Error>;

    /// Add a finalizer to a ToolchainCluster
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer from a ToolchainCluster
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;
}

/// Health check of a member API server
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MemberHealthCheck: Send + Sync {
    /// `None` when the API server answered, the failure message otherwise
    async fn check(&self) -> Option<String>;
}

/// Clients for one member cluster
#[derive(Clone)]
pub struct MemberConnection {
    /// UserAccount operations on the member
    pub accounts: Arc<dyn UserAccountClient>,
    /// Health check of the member API server
    pub health: Arc<dyn MemberHealthCheck>,
}

/// Builds clients for member clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MemberConnector: Send + Sync {
    /// Build clients from the given kubeconfig
    ///
    /// Fails only when no client can be built; reachability is left to
    /// [`MemberHealthCheck::check`].
    async fn connect(&self, kubeconfig: &[u8]) -> Result<MemberConnection, Error>;
}

/// Real Kubernetes client implementation
pub struct ClusterKubeClientImpl {
    client: Client,
}

impl ClusterKubeClientImpl {
    /// Create a new ClusterKubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let api: Api<ToolchainCluster> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterKubeClient for ClusterKubeClientImpl {
    async fn get_kubeconfig(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get_opt(secret_name).await?;
        Ok(secret
            .and_then(|s| s.data)
            .and_then(|mut data| data.remove(KUBECONFIG_SECRET_KEY))
            .map(|bytes| bytes.0))
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ToolchainClusterStatus,
    ) -> Result<(), Error> {
        let api: Api<ToolchainCluster> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api: Api<ToolchainCluster> = Api::namespaced(self.client.clone(), namespace);
        let cluster = api.get(name).await?;
        let mut finalizers = cluster.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.patch_finalizers(namespace, name, finalizers).await
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api: Api<ToolchainCluster> = Api::namespaced(self.client.clone(), namespace);
        let cluster = api.get(name).await?;
        let finalizers = cluster
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();
        self.patch_finalizers(namespace, name, finalizers).await
    }
}

/// [`MemberHealthCheck`] asking the API server for its version
pub struct KubeMemberHealthCheck {
    client: Client,
}

#[async_trait]
impl MemberHealthCheck for KubeMemberHealthCheck {
    async fn check(&self) -> Option<String> {
        match self.client.apiserver_version().await {
            Ok(version) => {
                debug!(version = %version.git_version, "member API server answered");
                None
            }
            Err(e) => Some(e.to_string()),
        }
    }
}

/// [`MemberConnector`] building kube clients from kubeconfig bytes
pub struct KubeMemberConnector;

#[async_trait]
impl MemberConnector for KubeMemberConnector {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<MemberConnection, Error> {
        let client = client_from_kubeconfig(kubeconfig).await?;
        Ok(MemberConnection {
            accounts: Arc::new(KubeUserAccountClient::new(client.clone())),
            health: Arc::new(KubeMemberHealthCheck { client }),
        })
    }
}

/// A connection together with the inputs it was built from
struct CachedConnection {
    kubeconfig: Vec<u8>,
    operator_namespace: String,
    connection: MemberConnection,
}

/// Shared state of the ToolchainCluster controller
pub struct ClusterContext {
    /// Host-side API operations
    pub kube: Arc<dyn ClusterKubeClient>,
    /// Member client factory
    pub connector: Arc<dyn MemberConnector>,
    /// Registry the controller keeps up to date
    pub registry: Arc<MemberClusterCache>,
    /// Name of the host cluster, recorded as owner on every handle
    pub host_cluster_name: String,
    /// Interval between health checks
    pub health_interval: Duration,
    connections: Mutex<BTreeMap<String, CachedConnection>>,
}

impl ClusterContext {
    /// Create a context talking to the host through `client`
    pub fn new(
        client: Client,
        registry: Arc<MemberClusterCache>,
        host_cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            kube: Arc::new(ClusterKubeClientImpl::new(client)),
            connector: Arc::new(KubeMemberConnector),
            registry,
            host_cluster_name: host_cluster_name.into(),
            health_interval: DEFAULT_HEALTH_INTERVAL,
            connections: Mutex::default(),
        }
    }

    /// Override the health check interval
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn ClusterKubeClient>,
        connector: Arc<dyn MemberConnector>,
        registry: Arc<MemberClusterCache>,
    ) -> Self {
        Self {
            kube,
            connector,
            registry,
            host_cluster_name: "host".to_string(),
            health_interval: DEFAULT_HEALTH_INTERVAL,
            connections: Mutex::default(),
        }
    }
}

/// Reconcile a ToolchainCluster
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(
    cluster: Arc<ToolchainCluster>,
    ctx: Arc<ClusterContext>,
) -> Result<Action, ClusterError> {
    let name = cluster.name_any();
    let namespace = cluster
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "ToolchainCluster has no namespace"))?;

    if cluster.metadata.deletion_timestamp.is_some() {
        ctx.connections.lock().remove(&name);
        if ctx.registry.remove(&name) {
            info!("member cluster unregistered");
        }
        if has_finalizer(&cluster) {
            ctx.kube
                .remove_finalizer(&namespace, &name, CLUSTER_FINALIZER)
                .await?;
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer(&cluster) {
        info!("adding finalizer");
        ctx.kube
            .add_finalizer(&namespace, &name, CLUSTER_FINALIZER)
            .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let condition = match connect_member(&cluster, &namespace, &ctx).await {
        Ok((connection, reused)) => {
            let health_error = connection.health.check().await;
            let ready = health_error.is_none();
            // a reused connection is already registered unless the handle was dropped
            if !(reused && ctx.registry.set_ready(&name, ready)) {
                ctx.registry.upsert(MemberCluster {
                    name: name.clone(),
                    client: connection.accounts,
                    operator_namespace: cluster.spec.operator_namespace.clone(),
                    owner_cluster_name: ctx.host_cluster_name.clone(),
                    ready,
                });
            }
            match health_error {
                None => Condition::ready(reason::CLUSTER_READY),
                Some(message) => {
                    warn!(%message, "member cluster health check failed");
                    Condition::not_ready(reason::CLUSTER_NOT_REACHABLE, message)
                }
            }
        }
        Err(ClusterError::Common(e)) if !is_connection_failure(&e) => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "member cluster unusable");
            ctx.connections.lock().remove(&name);
            ctx.registry.set_ready(&name, false);
            Condition::not_ready(reason::CLUSTER_NOT_REACHABLE, e.to_string())
        }
    };

    update_status(&cluster, &namespace, condition, &ctx).await?;
    Ok(Action::requeue(ctx.health_interval))
}

/// Error policy for the ToolchainCluster controller
pub fn error_policy(
    cluster: Arc<ToolchainCluster>,
    error: &ClusterError,
    _ctx: Arc<ClusterContext>,
) -> Action {
    error!(
        ?error,
        cluster = %cluster.name_any(),
        "member cluster reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}

fn has_finalizer(cluster: &ToolchainCluster) -> bool {
    cluster.finalizers().iter().any(|f| f == CLUSTER_FINALIZER)
}

// Client construction failures come back as Internal errors from
// `client_from_kubeconfig`; host API errors (secret reads) stay Kube errors.
fn is_connection_failure(error: &Error) -> bool {
    matches!(error, Error::Internal { .. })
}

/// Connection to the member, reused while its kubeconfig and operator
/// namespace are unchanged; the flag tells whether it was reused
async fn connect_member(
    cluster: &ToolchainCluster,
    namespace: &str,
    ctx: &ClusterContext,
) -> Result<(MemberConnection, bool), ClusterError> {
    let name = cluster.name_any();
    let secret = &cluster.spec.secret_ref.name;
    let kubeconfig = ctx
        .kube
        .get_kubeconfig(namespace, secret)
        .await?
        .ok_or_else(|| ClusterError::MissingKubeconfig {
            secret: secret.clone(),
        })?;

    let cached = {
        let connections = ctx.connections.lock();
        connections
            .get(&name)
            .filter(|c| {
                c.kubeconfig == kubeconfig
                    && c.operator_namespace == cluster.spec.operator_namespace
            })
            .map(|c| c.connection.clone())
    };
    if let Some(connection) = cached {
        return Ok((connection, true));
    }

    let connection = ctx.connector.connect(&kubeconfig).await?;
    debug!("built new member cluster client");
    ctx.connections.lock().insert(
        name,
        CachedConnection {
            kubeconfig,
            operator_namespace: cluster.spec.operator_namespace.clone(),
            connection: connection.clone(),
        },
    );
    Ok((connection, false))
}

async fn update_status(
    cluster: &ToolchainCluster,
    namespace: &str,
    new: Condition,
    ctx: &ClusterContext,
) -> Result<(), Error> {
    let current = cluster
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    if condition::is_unchanged(current, &new) {
        debug!("status unchanged, skipping update");
        return Ok(());
    }
    let status = ToolchainClusterStatus {
        conditions: condition::apply(current, new),
    };
    ctx.kube
        .patch_status(namespace, &cluster.name_any(), &status)
        .await
}
