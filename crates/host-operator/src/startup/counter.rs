//! Account counter bootstrap and publication

use std::time::Duration;

use tracing::{info, warn};

use toolchain_counter::{publish, synchronize, AccountCounter, CountsSource};

/// Rebuild the account counter before any MasterUserRecord is reconciled
pub async fn synchronize_counter(
    counter: &AccountCounter,
    source: &dyn CountsSource,
) -> anyhow::Result<()> {
    let counts = synchronize(counter, source)
        .await
        .map_err(|e| anyhow::anyhow!("failed to synchronize the account counter: {e}"))?;
    info!(
        master_user_records = counts.master_user_record_count,
        clusters = counts.user_accounts_per_cluster.len(),
        "account counter ready"
    );
    Ok(())
}

/// Publish the counter to the ToolchainStatus every `interval`, forever
///
/// A failed publication is logged and retried on the next tick.
pub async fn run_counter_publisher(
    counter: &AccountCounter,
    source: &dyn CountsSource,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = publish(counter, source).await {
            warn!(error = %e, "failed to publish account counts");
        }
    }
}
