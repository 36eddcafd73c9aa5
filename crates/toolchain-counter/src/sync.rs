//! Rebuilding the counter from durable state and publishing it back

use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use toolchain_common::crd::{
    MasterUserRecord, ToolchainStatus, ToolchainStatusSpec, ToolchainStatusStatus,
    TOOLCHAIN_STATUS_NAME,
};
use toolchain_common::{Error, FIELD_MANAGER};

use crate::counter::{AccountCounter, Counts};

/// Durable state the counter is rebuilt from and published to
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CountsSource: Send + Sync {
    /// Status of the ToolchainStatus singleton, `None` when it does not exist
    async fn toolchain_status(&self) -> Result<Option<ToolchainStatusStatus>, Error>;

    /// Every MasterUserRecord in the host namespace
    async fn list_master_user_records(&self) -> Result<Vec<MasterUserRecord>, Error>;

    /// Write capacity usage to the ToolchainStatus singleton, creating it if needed
    async fn publish(&self, status: &ToolchainStatusStatus) -> Result<(), Error>;
}

/// [`CountsSource`] backed by the host cluster API
pub struct KubeCountsSource {
    client: Client,
    namespace: String,
}

impl KubeCountsSource {
    /// Read and write resources in `namespace` of the host cluster
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn statuses(&self) -> Api<ToolchainStatus> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl CountsSource for KubeCountsSource {
    async fn toolchain_status(&self) -> Result<Option<ToolchainStatusStatus>, Error> {
        let status = self.statuses().get_opt(TOOLCHAIN_STATUS_NAME).await?;
        Ok(status.map(|s| s.status.unwrap_or_default()))
    }

    async fn list_master_user_records(&self) -> Result<Vec<MasterUserRecord>, Error> {
        let api: Api<MasterUserRecord> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn publish(&self, status: &ToolchainStatusStatus) -> Result<(), Error> {
        let api = self.statuses();
        if api.get_opt(TOOLCHAIN_STATUS_NAME).await?.is_none() {
            let toolchain_status =
                ToolchainStatus::new(TOOLCHAIN_STATUS_NAME, ToolchainStatusSpec::default());
            api.create(&PostParams::default(), &toolchain_status).await?;
            info!(name = TOOLCHAIN_STATUS_NAME, "created ToolchainStatus");
        }
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            TOOLCHAIN_STATUS_NAME,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }
}

/// Rebuild `counter` from durable state
///
/// A published ToolchainStatus with a non-zero record count is trusted as
/// is. Otherwise the counts are derived by listing every MasterUserRecord.
#[instrument(skip_all)]
pub async fn synchronize(
    counter: &AccountCounter,
    source: &dyn CountsSource,
) -> Result<Counts, Error> {
    let published = source.toolchain_status().await?.unwrap_or_default();
    if published.master_user_record_count() > 0 {
        counter.resynchronize(&published);
        info!(
            master_user_records = published.master_user_record_count(),
            "account counter synchronized from ToolchainStatus"
        );
    } else {
        let records = source.list_master_user_records().await?;
        counter.replace(Counts::from_records(&records));
        info!(
            master_user_records = records.len(),
            "account counter synchronized from MasterUserRecords"
        );
    }
    Ok(counter.snapshot())
}

/// Write the current counts to the ToolchainStatus
pub async fn publish(counter: &AccountCounter, source: &dyn CountsSource) -> Result<(), Error> {
    let counts = counter.snapshot();
    debug!(
        master_user_records = counts.master_user_record_count,
        "publishing capacity usage"
    );
    source.publish(&counts.to_status()).await
}
