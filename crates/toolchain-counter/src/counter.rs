//! In-memory account counts per member cluster

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use toolchain_common::crd::{
    CapacityUsageHost, CapacityUsageMember, HostOperatorStatus, MasterUserRecord, Member,
    ToolchainStatusStatus,
};
use toolchain_common::metrics;

/// Point-in-time view of the counter
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    /// Number of MasterUserRecords
    pub master_user_record_count: usize,
    /// Number of UserAccounts per member cluster
    pub user_accounts_per_cluster: BTreeMap<String, usize>,
}

impl Counts {
    /// UserAccounts attributed to `cluster`, zero when unknown
    pub fn user_accounts(&self, cluster: &str) -> usize {
        self.user_accounts_per_cluster
            .get(cluster)
            .copied()
            .unwrap_or(0)
    }

    /// Counts published on a ToolchainStatus
    pub fn from_status(status: &ToolchainStatusStatus) -> Self {
        Self {
            master_user_record_count: status.master_user_record_count(),
            user_accounts_per_cluster: status
                .members
                .iter()
                .map(|m| (m.cluster_name.clone(), m.capacity_usage.user_account_count))
                .collect(),
        }
    }

    /// Counts derived from the records themselves: one per record, one per
    /// embedded account on its target cluster
    pub fn from_records(records: &[MasterUserRecord]) -> Self {
        let mut user_accounts_per_cluster = BTreeMap::new();
        for cluster in records.iter().flat_map(|r| r.target_clusters()) {
            *user_accounts_per_cluster
                .entry(cluster.to_string())
                .or_insert(0) += 1;
        }
        Self {
            master_user_record_count: records.len(),
            user_accounts_per_cluster,
        }
    }

    /// Capacity usage section of a ToolchainStatus carrying these counts
    pub fn to_status(&self) -> ToolchainStatusStatus {
        ToolchainStatusStatus {
            host_operator: Some(HostOperatorStatus {
                capacity_usage: CapacityUsageHost {
                    master_user_record_count: self.master_user_record_count,
                },
            }),
            members: self
                .user_accounts_per_cluster
                .iter()
                .map(|(cluster, count)| Member {
                    cluster_name: cluster.clone(),
                    capacity_usage: CapacityUsageMember {
                        user_account_count: *count,
                    },
                })
                .collect(),
        }
    }
}

/// Process-wide account counter
///
/// Every operation takes the same lock, so increments from concurrent
/// reconciliations and a resynchronization never interleave.
#[derive(Debug, Default)]
pub struct AccountCounter {
    counts: Mutex<Counts>,
}

impl AccountCounter {
    /// Create a counter starting from zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a UserAccount created on `cluster`
    pub fn increment(&self, cluster: &str) {
        let mut counts = self.counts.lock();
        let count = counts
            .user_accounts_per_cluster
            .entry(cluster.to_string())
            .or_insert(0);
        *count += 1;
        debug!(cluster, count = *count, "user account counted");
        metrics::record_user_accounts(cluster, *count);
    }

    /// Uncount a UserAccount removed from `cluster`, never going below zero
    pub fn decrement(&self, cluster: &str) {
        let mut counts = self.counts.lock();
        let count = counts
            .user_accounts_per_cluster
            .entry(cluster.to_string())
            .or_insert(0);
        if *count == 0 {
            warn!(cluster, "user account count is already zero");
        } else {
            *count -= 1;
        }
        metrics::record_user_accounts(cluster, *count);
    }

    /// Count a new MasterUserRecord
    pub fn increment_master_user_record(&self) {
        let mut counts = self.counts.lock();
        counts.master_user_record_count += 1;
        metrics::record_master_user_records(counts.master_user_record_count);
    }

    /// Uncount a deleted MasterUserRecord, never going below zero
    pub fn decrement_master_user_record(&self) {
        let mut counts = self.counts.lock();
        match counts.master_user_record_count.checked_sub(1) {
            Some(count) => counts.master_user_record_count = count,
            None => warn!("master user record count is already zero"),
        }
        metrics::record_master_user_records(counts.master_user_record_count);
    }

    /// Discard the current counts and take those of `status`
    pub fn resynchronize(&self, status: &ToolchainStatusStatus) {
        self.replace(Counts::from_status(status));
    }

    /// Discard the current counts and take `counts`
    pub fn replace(&self, counts: Counts) {
        let mut current = self.counts.lock();
        metrics::record_master_user_records(counts.master_user_record_count);
        for (cluster, count) in &counts.user_accounts_per_cluster {
            metrics::record_user_accounts(cluster, *count);
        }
        // clusters that disappeared must not keep reporting their old gauge
        for cluster in current.user_accounts_per_cluster.keys() {
            if !counts.user_accounts_per_cluster.contains_key(cluster) {
                metrics::record_user_accounts(cluster, 0);
            }
        }
        *current = counts;
    }

    /// Copy of the current counts
    pub fn snapshot(&self) -> Counts {
        self.counts.lock().clone()
    }
}
