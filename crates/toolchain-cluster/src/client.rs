//! UserAccount operations against a member cluster

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use toolchain_common::crd::UserAccount;
use toolchain_common::Error;

/// Capability to read and write UserAccounts on one member cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserAccountClient: Send + Sync {
    /// Get a UserAccount, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<UserAccount>, Error>;

    /// Create a UserAccount in its metadata namespace
    async fn create(&self, account: &UserAccount) -> Result<(), Error>;

    /// Replace a UserAccount
    ///
    /// `account` must carry the resourceVersion it was read at; a concurrent
    /// writer makes this fail with a conflict.
    async fn update(&self, account: &UserAccount) -> Result<(), Error>;
}

/// [`UserAccountClient`] backed by a kube client for the member cluster
pub struct KubeUserAccountClient {
    client: Client,
}

impl KubeUserAccountClient {
    /// Wrap a client connected to the member cluster
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_for(&self, account: &UserAccount) -> Result<Api<UserAccount>, Error> {
        let namespace = account.namespace().ok_or_else(|| {
            Error::validation_for(account.name_any(), "UserAccount has no namespace")
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl UserAccountClient for KubeUserAccountClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<UserAccount>, Error> {
        let api: Api<UserAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create(&self, account: &UserAccount) -> Result<(), Error> {
        self.api_for(account)?
            .create(&PostParams::default(), account)
            .await?;
        Ok(())
    }

    async fn update(&self, account: &UserAccount) -> Result<(), Error> {
        self.api_for(account)?
            .replace(&account.name_any(), &PostParams::default(), account)
            .await?;
        Ok(())
    }
}
