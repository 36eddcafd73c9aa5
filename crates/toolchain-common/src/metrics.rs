//! Metrics for toolchain observability
//!
//! OpenTelemetry instruments for capacity usage and reconciliation outcomes.
//! They are no-ops until a meter provider is installed by
//! [`crate::telemetry::init_telemetry`].

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("toolchain"));

/// Gauge of MasterUserRecords currently tracked by the account counter
pub static MASTER_USER_RECORDS: Lazy<Gauge<u64>> = Lazy::new(|| {
    METER
        .u64_gauge("toolchain_master_user_records")
        .with_description("Number of MasterUserRecords tracked by the host operator")
        .with_unit("{records}")
        .build()
});

/// Gauge of UserAccounts per member cluster
///
/// Labels:
/// - `cluster`: member cluster name
pub static USER_ACCOUNTS: Lazy<Gauge<u64>> = Lazy::new(|| {
    METER
        .u64_gauge("toolchain_user_accounts")
        .with_description("Number of UserAccounts attributed to a member cluster")
        .with_unit("{accounts}")
        .build()
});

/// Counter of MasterUserRecord reconciliations
///
/// Labels:
/// - `result`: provisioned, provisioning, not_found, error
pub static MUR_RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("toolchain_mur_reconcile_total")
        .with_description("Total number of MasterUserRecord reconciliations by result")
        .with_unit("{reconciliations}")
        .build()
});

/// Record the MasterUserRecord gauge
pub fn record_master_user_records(count: usize) {
    MASTER_USER_RECORDS.record(count as u64, &[]);
}

/// Record the UserAccount gauge for one cluster
pub fn record_user_accounts(cluster: &str, count: usize) {
    USER_ACCOUNTS.record(count as u64, &[KeyValue::new("cluster", cluster.to_string())]);
}

/// Count one MasterUserRecord reconciliation
pub fn record_mur_reconcile(result: &'static str) {
    MUR_RECONCILE_TOTAL.add(1, &[KeyValue::new("result", result)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_provider_is_a_noop() {
        record_master_user_records(3);
        record_user_accounts("member-1", 2);
        record_mur_reconcile("provisioned");
    }
}
