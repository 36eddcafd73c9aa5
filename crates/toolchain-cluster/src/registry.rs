//! Member cluster registry
//!
//! Maps a logical cluster name to a [`MemberCluster`] handle. Lookups read an
//! atomically swapped snapshot and never block; writers serialize on a mutex
//! and publish a fresh snapshot after every change.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

#[cfg(test)]
use mockall::automock;

use crate::client::UserAccountClient;

/// Handle to a registered member cluster
#[derive(Clone)]
pub struct MemberCluster {
    /// Logical cluster name
    pub name: String,
    /// UserAccount operations against this cluster
    pub client: Arc<dyn UserAccountClient>,
    /// Namespace UserAccounts live in on this cluster
    pub operator_namespace: String,
    /// Name of the host cluster that registered this member
    pub owner_cluster_name: String,
    /// Result of the last health check
    pub ready: bool,
}

impl fmt::Debug for MemberCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberCluster")
            .field("name", &self.name)
            .field("operator_namespace", &self.operator_namespace)
            .field("owner_cluster_name", &self.owner_cluster_name)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

/// Lookup of member clusters by logical name
///
/// `None` means no cluster of that name is registered. Readiness is reported
/// on the handle; callers branch on both explicitly.
#[cfg_attr(test, automock)]
pub trait ClusterRegistry: Send + Sync {
    /// Resolve a logical cluster name to its current handle
    fn resolve(&self, name: &str) -> Option<MemberCluster>;
}

/// In-memory registry refreshed by the ToolchainCluster controller
#[derive(Default)]
pub struct MemberClusterCache {
    snapshot: ArcSwap<BTreeMap<String, MemberCluster>>,
    members: Mutex<BTreeMap<String, MemberCluster>>,
}

impl MemberClusterCache {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster, replacing any handle of the same name
    pub fn upsert(&self, cluster: MemberCluster) {
        let mut members = self.members.lock();
        members.insert(cluster.name.clone(), cluster);
        self.publish(&members);
    }

    /// Unregister a cluster; returns whether it was registered
    pub fn remove(&self, name: &str) -> bool {
        let mut members = self.members.lock();
        let removed = members.remove(name).is_some();
        if removed {
            self.publish(&members);
        }
        removed
    }

    /// Flip the readiness of a registered cluster, keeping its client
    ///
    /// Returns false when no cluster of that name is registered.
    pub fn set_ready(&self, name: &str, ready: bool) -> bool {
        let mut members = self.members.lock();
        let Some(cluster) = members.get_mut(name) else {
            return false;
        };
        if cluster.ready != ready {
            cluster.ready = ready;
            self.publish(&members);
        }
        true
    }

    /// Names of all registered clusters
    pub fn names(&self) -> Vec<String> {
        self.snapshot.load().keys().cloned().collect()
    }

    fn publish(&self, members: &BTreeMap<String, MemberCluster>) {
        self.snapshot.store(Arc::new(members.clone()));
    }
}

impl ClusterRegistry for MemberClusterCache {
    fn resolve(&self, name: &str) -> Option<MemberCluster> {
        self.snapshot.load().get(name).cloned()
    }
}
