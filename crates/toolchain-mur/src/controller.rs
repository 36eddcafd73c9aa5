//! MasterUserRecord controller
//!
//! A pass walks the embedded accounts in order. Each target cluster is
//! resolved through the registry and its UserAccount fetched; the first
//! account that is missing or differs from its embedded spec is created or
//! updated, the record is marked `Provisioning` and the pass ends there. Only
//! when every account matches is the record marked `Provisioned`.
//!
//! Convergence relies on redelivery: a `Provisioning` pass asks to be
//! requeued, failures are returned to the controller's error policy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use mockall::automock;

use toolchain_cluster::{ClusterRegistry, MemberCluster};
use toolchain_common::crd::{
    reason, Condition, MasterUserRecord, MasterUserRecordStatus, UserAccount, UserAccountEmbedded,
};
use toolchain_common::kube_utils::ObjectKey;
use toolchain_common::{metrics, Error, FIELD_MANAGER, OWNER_LABEL_KEY, SYNC_INDEX_ANNOTATION};
use toolchain_counter::AccountCounter;

use crate::error::ReconcileError;
use crate::status::{set_status, set_status_and_return_error};

/// Delay before the pass following a create or update
pub const DEFAULT_PROVISIONING_REQUEUE: Duration = Duration::from_secs(5);

/// Host-side operations on MasterUserRecords
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MurKubeClient: Send + Sync {
    /// Get a MasterUserRecord, `None` when it does not exist
    async fn get_master_user_record(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<MasterUserRecord>, Error>;

    /// Replace the status of a MasterUserRecord
    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &MasterUserRecordStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct MurKubeClientImpl {
    client: Client,
}

impl MurKubeClientImpl {
    /// Create a new MurKubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<MasterUserRecord> {
        Api::namespaced(self.client.clone(), &key.namespace)
    }
}

#[async_trait]
impl MurKubeClient for MurKubeClientImpl {
    async fn get_master_user_record(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<MasterUserRecord>, Error> {
        Ok(self.api(key).get_opt(&key.name).await?)
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &MasterUserRecordStatus,
    ) -> Result<(), Error> {
        let status_patch = serde_json::json!({ "status": status });
        self.api(key)
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&status_patch),
            )
            .await?;
        Ok(())
    }
}

/// Shared state of the MasterUserRecord controller
pub struct MurContext {
    /// Host-side API operations
    pub kube: Arc<dyn MurKubeClient>,
    /// Member cluster lookup
    pub registry: Arc<dyn ClusterRegistry>,
    /// Account counter updated on every UserAccount creation
    pub counter: Arc<AccountCounter>,
    /// Delay before the pass following a create or update
    pub provisioning_requeue: Duration,
}

impl MurContext {
    /// Create a context talking to the host through `client`
    pub fn new(
        client: Client,
        registry: Arc<dyn ClusterRegistry>,
        counter: Arc<AccountCounter>,
    ) -> Self {
        Self::with_kube(Arc::new(MurKubeClientImpl::new(client)), registry, counter)
    }

    /// Create a context over any host client implementation
    pub fn with_kube(
        kube: Arc<dyn MurKubeClient>,
        registry: Arc<dyn ClusterRegistry>,
        counter: Arc<AccountCounter>,
    ) -> Self {
        Self {
            kube,
            registry,
            counter,
            provisioning_requeue: DEFAULT_PROVISIONING_REQUEUE,
        }
    }
}

/// Result of one successful reconciliation pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record no longer exists
    NotFound,
    /// A UserAccount was created or updated on `cluster`
    Provisioning {
        /// Cluster the mutation happened on
        cluster: String,
    },
    /// Every UserAccount matches its embedded spec
    Provisioned,
}

impl ReconcileOutcome {
    fn metric_label(&self) -> &'static str {
        match self {
            ReconcileOutcome::NotFound => "not_found",
            ReconcileOutcome::Provisioning { .. } => "provisioning",
            ReconcileOutcome::Provisioned => "provisioned",
        }
    }
}

enum AccountState {
    Created,
    Updated,
    UpToDate,
}

/// Run one reconciliation pass for the record identified by `key`
pub async fn reconcile_key(
    key: &ObjectKey,
    ctx: &MurContext,
) -> Result<ReconcileOutcome, ReconcileError> {
    let Some(mur) = ctx.kube.get_master_user_record(key).await? else {
        debug!(%key, "MasterUserRecord not found, nothing to do");
        return Ok(ReconcileOutcome::NotFound);
    };

    for embedded in &mur.spec.user_accounts {
        let state = match ensure_user_account(&mur, embedded, ctx).await {
            Ok(state) => state,
            Err(err) => {
                return Err(set_status_and_return_error(ctx.kube.as_ref(), key, &mur, err).await)
            }
        };
        match state {
            AccountState::UpToDate => continue,
            AccountState::Created | AccountState::Updated => {
                set_status(
                    ctx.kube.as_ref(),
                    key,
                    &mur,
                    Condition::not_ready(reason::PROVISIONING, ""),
                )
                .await
                .map_err(ReconcileError::StatusWrite)?;
                return Ok(ReconcileOutcome::Provisioning {
                    cluster: embedded.target_cluster.clone(),
                });
            }
        }
    }

    set_status(
        ctx.kube.as_ref(),
        key,
        &mur,
        Condition::ready(reason::PROVISIONED),
    )
    .await
    .map_err(ReconcileError::StatusWrite)?;
    Ok(ReconcileOutcome::Provisioned)
}

async fn ensure_user_account(
    mur: &MasterUserRecord,
    embedded: &UserAccountEmbedded,
    ctx: &MurContext,
) -> Result<AccountState, ReconcileError> {
    let cluster = resolve_ready_cluster(ctx.registry.as_ref(), &embedded.target_cluster)?;
    let name = mur.name_any();

    let existing = cluster
        .client
        .get(&cluster.operator_namespace, &name)
        .await
        .map_err(|source| ReconcileError::Action {
            action: format!("failed to get UserAccount for user {name}"),
            reason: reason::UNABLE_TO_GET_USER_ACCOUNT,
            source,
        })?;

    match existing {
        None => {
            let account = new_user_account(&name, &cluster.operator_namespace, embedded);
            cluster
                .client
                .create(&account)
                .await
                .map_err(|source| ReconcileError::Action {
                    action: format!("failed to create UserAccount for user {name}"),
                    reason: reason::UNABLE_TO_CREATE_USER_ACCOUNT,
                    source,
                })?;
            ctx.counter.increment(&cluster.name);
            info!(cluster = %cluster.name, "UserAccount created");
            Ok(AccountState::Created)
        }
        Some(mut account) if account.spec != embedded.spec => {
            account.spec = embedded.spec.clone();
            account
                .annotations_mut()
                .insert(SYNC_INDEX_ANNOTATION.to_string(), embedded.sync_index.clone());
            cluster
                .client
                .update(&account)
                .await
                .map_err(|source| ReconcileError::Action {
                    action: format!("failed to update UserAccount for user {name}"),
                    reason: reason::UNABLE_TO_UPDATE_USER_ACCOUNT,
                    source,
                })?;
            info!(cluster = %cluster.name, "UserAccount updated");
            Ok(AccountState::Updated)
        }
        Some(_) => Ok(AccountState::UpToDate),
    }
}

fn resolve_ready_cluster(
    registry: &dyn ClusterRegistry,
    name: &str,
) -> Result<MemberCluster, ReconcileError> {
    let cluster = registry
        .resolve(name)
        .ok_or_else(|| ReconcileError::TargetClusterNotFound {
            cluster: name.to_string(),
        })?;
    if !cluster.ready {
        return Err(ReconcileError::TargetClusterNotReady {
            cluster: name.to_string(),
        });
    }
    Ok(cluster)
}

fn new_user_account(name: &str, namespace: &str, embedded: &UserAccountEmbedded) -> UserAccount {
    UserAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                OWNER_LABEL_KEY.to_string(),
                name.to_string(),
            )])),
            annotations: Some(BTreeMap::from([(
                SYNC_INDEX_ANNOTATION.to_string(),
                embedded.sync_index.clone(),
            )])),
            ..Default::default()
        },
        spec: embedded.spec.clone(),
        status: None,
    }
}

/// Reconcile a MasterUserRecord delivered by the controller runtime
#[instrument(skip(mur, ctx), fields(mur = %mur.name_any()))]
pub async fn reconcile(
    mur: Arc<MasterUserRecord>,
    ctx: Arc<MurContext>,
) -> Result<Action, ReconcileError> {
    let key = ObjectKey::of(mur.as_ref())?;
    let outcome = reconcile_key(&key, &ctx).await;
    metrics::record_mur_reconcile(match &outcome {
        Ok(outcome) => outcome.metric_label(),
        Err(_) => "error",
    });

    match outcome? {
        // the status may not change, so no watch event would trigger the next pass
        ReconcileOutcome::Provisioning { .. } => Ok(Action::requeue(ctx.provisioning_requeue)),
        ReconcileOutcome::Provisioned | ReconcileOutcome::NotFound => Ok(Action::await_change()),
    }
}

/// Error policy for the MasterUserRecord controller
pub fn error_policy(
    mur: Arc<MasterUserRecord>,
    error: &ReconcileError,
    _ctx: Arc<MurContext>,
) -> Action {
    error!(
        ?error,
        mur = %mur.name_any(),
        retryable = error.is_retryable(),
        "MasterUserRecord reconciliation failed"
    );
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(5))
    } else {
        Action::requeue(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use toolchain_cluster::{MemberClusterCache, UserAccountClient};
    use toolchain_common::crd::{
        ConditionStatus, MasterUserRecordSpec, NSTemplateSetSpec, NamespaceTemplate,
        UserAccountSpec,
    };
    use toolchain_common::{condition, MEMBER_OPERATOR_NAMESPACE};

    const HOST_NAMESPACE: &str = "toolchain-host-operator";
    const MEMBER: &str = "member-cluster";

    // =========================================================================
    // In-memory stores
    // =========================================================================

    /// Host store holding MasterUserRecords, optionally rejecting status writes
    #[derive(Default)]
    struct FakeHost {
        records: Mutex<BTreeMap<ObjectKey, MasterUserRecord>>,
        status_error: Option<String>,
        status_writes: Mutex<usize>,
    }

    impl FakeHost {
        fn with(mur: MasterUserRecord) -> Self {
            let host = Self::default();
            let key = ObjectKey::of(&mur).unwrap();
            host.records.lock().unwrap().insert(key, mur);
            host
        }

        fn rejecting_status(mut self, message: &str) -> Self {
            self.status_error = Some(message.to_string());
            self
        }

        fn conditions(&self) -> Vec<Condition> {
            let records = self.records.lock().unwrap();
            records
                .get(&key())
                .map(|mur| mur.conditions().to_vec())
                .unwrap_or_default()
        }

        fn ready(&self) -> Condition {
            condition::find(&self.conditions(), toolchain_common::crd::READY_CONDITION)
                .expect("ready condition")
                .clone()
        }

        fn status_writes(&self) -> usize {
            *self.status_writes.lock().unwrap()
        }
    }

    #[async_trait]
    impl MurKubeClient for FakeHost {
        async fn get_master_user_record(
            &self,
            key: &ObjectKey,
        ) -> Result<Option<MasterUserRecord>, Error> {
            Ok(self.records.lock().unwrap().get(key).cloned())
        }

        async fn update_status(
            &self,
            key: &ObjectKey,
            status: &MasterUserRecordStatus,
        ) -> Result<(), Error> {
            if let Some(message) = &self.status_error {
                return Err(Error::internal(message.clone()));
            }
            *self.status_writes.lock().unwrap() += 1;
            let mut records = self.records.lock().unwrap();
            let mur = records
                .get_mut(key)
                .ok_or_else(|| Error::internal("status update of missing record"))?;
            mur.status = Some(status.clone());
            Ok(())
        }
    }

    /// Member store holding UserAccounts, optionally rejecting creates
    #[derive(Default)]
    struct FakeMember {
        accounts: Mutex<BTreeMap<ObjectKey, UserAccount>>,
        create_error: Option<String>,
        creates: Mutex<usize>,
        updates: Mutex<usize>,
    }

    impl FakeMember {
        fn rejecting_create(message: &str) -> Self {
            Self {
                create_error: Some(message.to_string()),
                ..Default::default()
            }
        }

        fn insert(&self, account: UserAccount) {
            let key = ObjectKey::of(&account).unwrap();
            self.accounts.lock().unwrap().insert(key, account);
        }

        fn account(&self, name: &str) -> Option<UserAccount> {
            let key = ObjectKey::new(MEMBER_OPERATOR_NAMESPACE, name);
            self.accounts.lock().unwrap().get(&key).cloned()
        }

        fn mutations(&self) -> usize {
            *self.creates.lock().unwrap() + *self.updates.lock().unwrap()
        }
    }

    #[async_trait]
    impl UserAccountClient for FakeMember {
        async fn get(&self, namespace: &str, name: &str) -> Result<Option<UserAccount>, Error> {
            let key = ObjectKey::new(namespace, name);
            Ok(self.accounts.lock().unwrap().get(&key).cloned())
        }

        async fn create(&self, account: &UserAccount) -> Result<(), Error> {
            if let Some(message) = &self.create_error {
                return Err(Error::internal(message.clone()));
            }
            *self.creates.lock().unwrap() += 1;
            let mut stored = account.clone();
            stored.metadata.resource_version = Some("1".to_string());
            self.insert(stored);
            Ok(())
        }

        async fn update(&self, account: &UserAccount) -> Result<(), Error> {
            *self.updates.lock().unwrap() += 1;
            self.insert(account.clone());
            Ok(())
        }
    }

    mockall::mock! {
        Accounts {}

        #[async_trait]
        impl UserAccountClient for Accounts {
            async fn get(&self, namespace: &str, name: &str) -> Result<Option<UserAccount>, Error>;
            async fn create(&self, account: &UserAccount) -> Result<(), Error>;
            async fn update(&self, account: &UserAccount) -> Result<(), Error>;
        }
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn key() -> ObjectKey {
        ObjectKey::new(HOST_NAMESPACE, "john")
    }

    fn account_spec() -> UserAccountSpec {
        UserAccountSpec {
            user_id: "12345abcdef".to_string(),
            ns_limit: "basic".to_string(),
            ns_template_set: NSTemplateSetSpec {
                tier_name: "basic".to_string(),
                namespaces: ["ide", "ci/cd", "staging"]
                    .iter()
                    .map(|t| NamespaceTemplate {
                        type_: t.to_string(),
                        revision: "123abc".to_string(),
                        template: String::new(),
                    })
                    .collect(),
            },
        }
    }

    fn master_user_record(clusters: &[&str]) -> MasterUserRecord {
        let mut mur = MasterUserRecord::new(
            "john",
            MasterUserRecordSpec {
                user_id: "12345abcdef".to_string(),
                user_accounts: clusters
                    .iter()
                    .map(|c| UserAccountEmbedded {
                        target_cluster: c.to_string(),
                        sync_index: "0".to_string(),
                        spec: account_spec(),
                    })
                    .collect(),
            },
        );
        mur.metadata.namespace = Some(HOST_NAMESPACE.to_string());
        mur
    }

    fn existing_account(spec: UserAccountSpec) -> UserAccount {
        let mut account = new_user_account(
            "john",
            MEMBER_OPERATOR_NAMESPACE,
            &UserAccountEmbedded {
                target_cluster: MEMBER.to_string(),
                sync_index: "0".to_string(),
                spec,
            },
        );
        account.metadata.resource_version = Some("7".to_string());
        account
    }

    fn register(
        registry: &MemberClusterCache,
        name: &str,
        client: Arc<dyn UserAccountClient>,
        ready: bool,
    ) {
        registry.upsert(MemberCluster {
            name: name.to_string(),
            client,
            operator_namespace: MEMBER_OPERATOR_NAMESPACE.to_string(),
            owner_cluster_name: "host-cluster".to_string(),
            ready,
        });
    }

    struct Harness {
        host: Arc<FakeHost>,
        registry: Arc<MemberClusterCache>,
        counter: Arc<AccountCounter>,
    }

    impl Harness {
        fn new(host: FakeHost) -> Self {
            Self {
                host: Arc::new(host),
                registry: Arc::new(MemberClusterCache::new()),
                counter: Arc::new(AccountCounter::new()),
            }
        }

        fn member(&self, name: &str, member: &Arc<FakeMember>, ready: bool) -> &Self {
            register(&self.registry, name, member.clone(), ready);
            self
        }

        fn context(&self) -> MurContext {
            MurContext::with_kube(
                self.host.clone(),
                self.registry.clone(),
                self.counter.clone(),
            )
        }

        async fn run(&self) -> Result<ReconcileOutcome, ReconcileError> {
            reconcile_key(&key(), &self.context()).await
        }
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    mod provisioning {
        use super::*;

        #[tokio::test]
        async fn missing_account_is_created_and_record_marked_provisioning() {
            let member = Arc::new(FakeMember::default());
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            harness.member(MEMBER, &member, true);

            let outcome = harness.run().await.unwrap();

            assert_eq!(
                outcome,
                ReconcileOutcome::Provisioning {
                    cluster: MEMBER.to_string()
                }
            );
            let account = member.account("john").expect("UserAccount created");
            assert_eq!(account.spec, account_spec());
            assert_eq!(
                account.labels().get(OWNER_LABEL_KEY).map(String::as_str),
                Some("john")
            );
            assert_eq!(
                account.annotations().get(SYNC_INDEX_ANNOTATION).map(String::as_str),
                Some("0")
            );

            let ready = harness.host.ready();
            assert_eq!(ready.status, ConditionStatus::False);
            assert_eq!(ready.reason, reason::PROVISIONING);
            assert_eq!(ready.message, "");
        }

        #[tokio::test]
        async fn creation_is_counted_for_the_target_cluster() {
            let member = Arc::new(FakeMember::default());
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            harness.member(MEMBER, &member, true);

            harness.run().await.unwrap();

            assert_eq!(harness.counter.snapshot().user_accounts(MEMBER), 1);
        }

        #[tokio::test]
        async fn only_the_first_missing_account_is_created_per_pass() {
            let members: Vec<_> = (0..3).map(|_| Arc::new(FakeMember::default())).collect();
            let harness = Harness::new(FakeHost::with(master_user_record(&[
                "member-0", "member-1", "member-2",
            ])));
            for (i, member) in members.iter().enumerate() {
                harness.member(&format!("member-{i}"), member, true);
            }

            let outcome = harness.run().await.unwrap();

            assert_eq!(
                outcome,
                ReconcileOutcome::Provisioning {
                    cluster: "member-0".to_string()
                }
            );
            assert!(members[0].account("john").is_some());
            assert!(members[1].account("john").is_none());
            assert!(members[2].account("john").is_none());
            assert_eq!(harness.host.ready().reason, reason::PROVISIONING);
        }

        #[tokio::test]
        async fn repeated_passes_converge_one_account_at_a_time() {
            let members: Vec<_> = (0..3).map(|_| Arc::new(FakeMember::default())).collect();
            let harness = Harness::new(FakeHost::with(master_user_record(&[
                "member-0", "member-1", "member-2",
            ])));
            for (i, member) in members.iter().enumerate() {
                harness.member(&format!("member-{i}"), member, true);
            }

            for expected in ["member-0", "member-1", "member-2"] {
                let outcome = harness.run().await.unwrap();
                assert_eq!(
                    outcome,
                    ReconcileOutcome::Provisioning {
                        cluster: expected.to_string()
                    }
                );
            }
            assert_eq!(harness.run().await.unwrap(), ReconcileOutcome::Provisioned);

            assert!(members.iter().all(|m| m.mutations() == 1));
            let ready = harness.host.ready();
            assert_eq!(ready.status, ConditionStatus::True);
            assert_eq!(ready.reason, reason::PROVISIONED);
        }

        #[tokio::test]
        async fn drifted_account_is_updated_in_place() {
            let member = Arc::new(FakeMember::default());
            let mut drifted = account_spec();
            drifted.ns_template_set.tier_name = "advanced".to_string();
            member.insert(existing_account(drifted));
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            harness.member(MEMBER, &member, true);

            let outcome = harness.run().await.unwrap();

            assert!(matches!(outcome, ReconcileOutcome::Provisioning { .. }));
            let account = member.account("john").expect("UserAccount kept");
            assert_eq!(account.spec, account_spec());
            assert_eq!(account.resource_version().as_deref(), Some("7"));
            assert_eq!(*member.updates.lock().unwrap(), 1);
            assert_eq!(harness.counter.snapshot().user_accounts(MEMBER), 0);
        }
    }

    // =========================================================================
    // Up to date
    // =========================================================================

    mod up_to_date {
        use super::*;

        #[tokio::test]
        async fn matching_accounts_mark_record_provisioned_without_mutation() {
            let member = Arc::new(FakeMember::default());
            member.insert(existing_account(account_spec()));
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            harness.member(MEMBER, &member, true);

            let outcome = harness.run().await.unwrap();

            assert_eq!(outcome, ReconcileOutcome::Provisioned);
            assert_eq!(member.mutations(), 0);
            let ready = harness.host.ready();
            assert_eq!(ready.status, ConditionStatus::True);
            assert_eq!(ready.reason, reason::PROVISIONED);
        }

        #[tokio::test]
        async fn repeating_the_pass_changes_nothing() {
            let member = Arc::new(FakeMember::default());
            member.insert(existing_account(account_spec()));
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            harness.member(MEMBER, &member, true);

            harness.run().await.unwrap();
            let conditions = harness.host.conditions();
            harness.run().await.unwrap();

            assert_eq!(harness.host.conditions(), conditions);
            assert_eq!(harness.host.status_writes(), 1);
            assert_eq!(member.mutations(), 0);
        }

        #[tokio::test]
        async fn record_without_accounts_is_provisioned() {
            let harness = Harness::new(FakeHost::with(master_user_record(&[])));

            assert_eq!(harness.run().await.unwrap(), ReconcileOutcome::Provisioned);
            assert_eq!(harness.host.ready().reason, reason::PROVISIONED);
        }
    }

    // =========================================================================
    // Failures
    // =========================================================================

    mod failures {
        use super::*;

        #[tokio::test]
        async fn deleted_record_is_a_no_op() {
            let harness = Harness::new(FakeHost::default());

            let outcome = harness.run().await.unwrap();

            assert_eq!(outcome, ReconcileOutcome::NotFound);
            assert_eq!(harness.host.status_writes(), 0);
            assert_eq!(harness.counter.snapshot(), Default::default());
        }

        #[tokio::test]
        async fn unregistered_cluster_fails_without_creating_anything() {
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));

            let err = harness.run().await.unwrap_err();

            let message = "the member cluster member-cluster not found in the registry";
            assert!(err.to_string().contains(message));
            let ready = harness.host.ready();
            assert_eq!(ready.status, ConditionStatus::False);
            assert_eq!(ready.reason, reason::TARGET_CLUSTER_NOT_READY);
            assert_eq!(ready.message, message);
        }

        #[tokio::test]
        async fn unready_cluster_fails_without_creating_anything() {
            let member = Arc::new(FakeMember::default());
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            harness.member(MEMBER, &member, false);

            let err = harness.run().await.unwrap_err();

            let message = "the member cluster member-cluster is not ready";
            assert!(err.to_string().contains(message));
            assert!(member.account("john").is_none());
            let ready = harness.host.ready();
            assert_eq!(ready.reason, reason::TARGET_CLUSTER_NOT_READY);
            assert_eq!(ready.message, message);
        }

        #[tokio::test]
        async fn failing_entry_stops_the_pass_after_earlier_entries() {
            let member = Arc::new(FakeMember::default());
            member.insert(existing_account(account_spec()));
            let harness = Harness::new(FakeHost::with(master_user_record(&[
                MEMBER,
                "unknown-cluster",
            ])));
            harness.member(MEMBER, &member, true);

            let err = harness.run().await.unwrap_err();

            assert!(matches!(err, ReconcileError::TargetClusterNotFound { ref cluster } if cluster == "unknown-cluster"));
            assert_eq!(member.mutations(), 0);
        }

        #[tokio::test]
        async fn create_failure_is_wrapped_and_reported() {
            let member = Arc::new(FakeMember::rejecting_create("oopsy woopsy"));
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            harness.member(MEMBER, &member, true);

            let err = harness.run().await.unwrap_err();

            assert!(err
                .to_string()
                .starts_with("failed to create UserAccount for user john: "));
            assert!(err.to_string().contains("oopsy woopsy"));
            let ready = harness.host.ready();
            assert_eq!(ready.reason, reason::UNABLE_TO_CREATE_USER_ACCOUNT);
            assert_eq!(ready.message, err.to_string());
            assert_eq!(harness.counter.snapshot().user_accounts(MEMBER), 0);
        }

        #[tokio::test]
        async fn get_failure_is_reported_with_its_own_reason() {
            let mut accounts = MockAccounts::new();
            accounts
                .expect_get()
                .returning(|_, _| Err(Error::internal("connection reset")));
            accounts.expect_create().never();
            let harness = Harness::new(FakeHost::with(master_user_record(&[MEMBER])));
            register(&harness.registry, MEMBER, Arc::new(accounts), true);

            let err = harness.run().await.unwrap_err();

            assert!(err
                .to_string()
                .contains("failed to get UserAccount for user john"));
            assert_eq!(harness.host.ready().reason, reason::UNABLE_TO_GET_USER_ACCOUNT);
        }

        #[tokio::test]
        async fn status_write_failure_is_composed_and_conditions_kept() {
            let member = Arc::new(FakeMember::rejecting_create("oopsy woopsy"));
            let mut mur = master_user_record(&[MEMBER]);
            let previous = Condition::not_ready(reason::PROVISIONING, "");
            mur.status = Some(MasterUserRecordStatus {
                conditions: vec![previous.clone()],
            });
            let harness =
                Harness::new(FakeHost::with(mur).rejecting_status("unable to update status"));
            harness.member(MEMBER, &member, true);

            let err = harness.run().await.unwrap_err();

            let message = err.to_string();
            assert!(message.contains("failed to create UserAccount for user john"));
            assert!(message.contains("oopsy woopsy"));
            assert!(message.contains("unable to update status"));
            assert_eq!(harness.host.conditions(), vec![previous]);
        }

        #[tokio::test]
        async fn status_write_failure_after_creation_is_returned() {
            let member = Arc::new(FakeMember::default());
            let harness = Harness::new(
                FakeHost::with(master_user_record(&[MEMBER])).rejecting_status("etcd timeout"),
            );
            harness.member(MEMBER, &member, true);

            let err = harness.run().await.unwrap_err();

            assert!(matches!(err, ReconcileError::StatusWrite(_)));
            assert!(err.to_string().contains("etcd timeout"));
            assert!(member.account("john").is_some());
        }
    }

    // =========================================================================
    // Controller adapter
    // =========================================================================

    mod adapter {
        use super::*;

        #[tokio::test]
        async fn provisioning_pass_requeues_shortly() {
            let member = Arc::new(FakeMember::default());
            let mur = master_user_record(&[MEMBER]);
            let harness = Harness::new(FakeHost::with(mur.clone()));
            harness.member(MEMBER, &member, true);

            let action = reconcile(Arc::new(mur), Arc::new(harness.context()))
                .await
                .unwrap();

            assert_eq!(action, Action::requeue(DEFAULT_PROVISIONING_REQUEUE));
        }

        #[tokio::test]
        async fn provisioned_pass_waits_for_changes() {
            let member = Arc::new(FakeMember::default());
            member.insert(existing_account(account_spec()));
            let mur = master_user_record(&[MEMBER]);
            let harness = Harness::new(FakeHost::with(mur.clone()));
            harness.member(MEMBER, &member, true);

            let action = reconcile(Arc::new(mur), Arc::new(harness.context()))
                .await
                .unwrap();

            assert_eq!(action, Action::await_change());
        }

        #[tokio::test]
        async fn record_without_namespace_is_rejected() {
            let harness = Harness::new(FakeHost::default());
            let mur = MasterUserRecord::new("john", MasterUserRecordSpec::default());

            let err = reconcile(Arc::new(mur), Arc::new(harness.context()))
                .await
                .unwrap_err();

            assert!(matches!(err, ReconcileError::Common(_)));
        }

        #[test]
        fn non_retryable_errors_back_off_longer() {
            let harness = Harness::new(FakeHost::default());
            let ctx = Arc::new(harness.context());
            let mur = Arc::new(master_user_record(&[MEMBER]));

            let retryable = ReconcileError::TargetClusterNotReady {
                cluster: MEMBER.to_string(),
            };
            let permanent = ReconcileError::Common(Error::validation("no namespace"));

            assert_eq!(
                error_policy(mur.clone(), &retryable, ctx.clone()),
                Action::requeue(Duration::from_secs(5))
            );
            assert_eq!(
                error_policy(mur, &permanent, ctx),
                Action::requeue(Duration::from_secs(60))
            );
        }
    }
}
