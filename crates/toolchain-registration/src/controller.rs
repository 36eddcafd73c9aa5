//! RegistrationService controller

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use toolchain_common::condition;
use toolchain_common::crd::{
    reason, Condition, RegistrationService, RegistrationServiceStatus,
};
use toolchain_common::kube_utils::{apply_object, ObjectKey, ObjectManifest};
use toolchain_common::template::Template;
use toolchain_common::{Error, FIELD_MANAGER};

use crate::deployment::{deployment_template, render_objects};
use crate::error::RegistrationError;

/// Host-side operations of the registration service controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegistrationKubeClient: Send + Sync {
    /// Get a RegistrationService, `None` when it does not exist
    async fn get_registration_service(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<RegistrationService>, Error>;

    /// Server-side apply an object
    async fn apply(&self, manifest: &ObjectManifest) -> Result<(), Error>;

    /// Replace the status of a RegistrationService
    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &RegistrationServiceStatus,
    ) -> Result<(), Error>;
}

/// [`RegistrationKubeClient`] backed by the host cluster API
pub struct KubeRegistrationClient {
    client: Client,
}

impl KubeRegistrationClient {
    /// Wrap a host cluster client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegistrationKubeClient for KubeRegistrationClient {
    async fn get_registration_service(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<RegistrationService>, Error> {
        let api: Api<RegistrationService> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn apply(&self, manifest: &ObjectManifest) -> Result<(), Error> {
        apply_object(&self.client, manifest).await
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &RegistrationServiceStatus,
    ) -> Result<(), Error> {
        let api: Api<RegistrationService> = Api::namespaced(self.client.clone(), &key.namespace);
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }
}

/// Shared state of the RegistrationService controller
pub struct RegistrationContext {
    /// Host-side API operations
    pub kube: Arc<dyn RegistrationKubeClient>,
    /// Parsed deployment template
    pub template: Template,
}

impl RegistrationContext {
    /// Create a context talking to the host through `client`
    pub fn new(client: Client) -> Result<Self, RegistrationError> {
        Self::with_kube(Arc::new(KubeRegistrationClient::new(client)))
    }

    /// Create a context over any host client implementation
    pub fn with_kube(kube: Arc<dyn RegistrationKubeClient>) -> Result<Self, RegistrationError> {
        Ok(Self {
            kube,
            template: deployment_template()?,
        })
    }
}

/// Deploy the registration service described by the resource at `key`
///
/// Returns the number of applied objects, zero when the resource is gone.
/// Objects are applied in template order and the first failure stops the
/// pass. The outcome is reported as the `Ready` condition.
pub async fn reconcile_key(
    key: &ObjectKey,
    ctx: &RegistrationContext,
) -> Result<usize, RegistrationError> {
    let Some(service) = ctx.kube.get_registration_service(key).await? else {
        debug!(%key, "RegistrationService not found, nothing to do");
        return Ok(0);
    };

    let deployed = deploy(&service, ctx).await;
    let condition = match &deployed {
        Ok(_) => Condition::ready(reason::DEPLOYED),
        Err(err) => Condition::not_ready(reason::DEPLOYMENT_FAILED, err.to_string()),
    };
    if let Err(status_err) = update_status(ctx.kube.as_ref(), key, &service, condition).await {
        if deployed.is_ok() {
            return Err(status_err.into());
        }
        warn!(error = %status_err, "unable to report deployment failure on status");
    }
    deployed
}

async fn deploy(
    service: &RegistrationService,
    ctx: &RegistrationContext,
) -> Result<usize, RegistrationError> {
    let objects = render_objects(&ctx.template, service)?;
    for object in &objects {
        ctx.kube
            .apply(object)
            .await
            .map_err(|source| RegistrationError::Apply {
                object: object.describe(),
                source,
            })?;
        debug!(object = %object.describe(), "applied");
    }
    Ok(objects.len())
}

async fn update_status(
    kube: &dyn RegistrationKubeClient,
    key: &ObjectKey,
    service: &RegistrationService,
    new: Condition,
) -> Result<(), Error> {
    let current = service
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    if condition::is_unchanged(current, &new) {
        return Ok(());
    }
    let status = RegistrationServiceStatus {
        conditions: condition::apply(current, new),
    };
    kube.patch_status(key, &status).await
}

/// Reconcile a RegistrationService delivered by the controller runtime
#[instrument(skip(service, ctx), fields(registration_service = %service.name_any()))]
pub async fn reconcile(
    service: Arc<RegistrationService>,
    ctx: Arc<RegistrationContext>,
) -> Result<Action, RegistrationError> {
    let key = ObjectKey::of(service.as_ref())?;
    let applied = reconcile_key(&key, &ctx).await?;
    if applied > 0 {
        info!(objects = applied, "registration service deployed");
    }
    Ok(Action::await_change())
}

/// Error policy for the RegistrationService controller
pub fn error_policy(
    service: Arc<RegistrationService>,
    error: &RegistrationError,
    _ctx: Arc<RegistrationContext>,
) -> Action {
    error!(
        ?error,
        registration_service = %service.name_any(),
        "registration service reconciliation failed"
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
    use std::sync::Mutex;

    use toolchain_common::crd::{ConditionStatus, RegistrationServiceSpec};

    const NAMESPACE: &str = "toolchain-host-operator";

    /// Host double that stores written status back on the resource
    #[derive(Default)]
    struct FakeHost {
        service: Mutex<Option<RegistrationService>>,
        applied: Mutex<Vec<String>>,
        status_writes: Mutex<usize>,
        failing_kind: Option<&'static str>,
    }

    impl FakeHost {
        fn with_service(spec: RegistrationServiceSpec) -> Self {
            let mut service = RegistrationService::new("registration-service", spec);
            service.metadata.namespace = Some(NAMESPACE.to_string());
            service.metadata.uid = Some("0a1b2c".to_string());
            Self {
                service: Mutex::new(Some(service)),
                ..Default::default()
            }
        }

        fn failing_on(mut self, kind: &'static str) -> Self {
            self.failing_kind = Some(kind);
            self
        }

        fn ready_condition(&self) -> Condition {
            let service = self.service.lock().unwrap();
            let status = service.as_ref().unwrap().status.clone().unwrap();
            status.conditions[0].clone()
        }
    }

    #[async_trait]
    impl RegistrationKubeClient for FakeHost {
        async fn get_registration_service(
            &self,
            _key: &ObjectKey,
        ) -> Result<Option<RegistrationService>, Error> {
            Ok(self.service.lock().unwrap().clone())
        }

        async fn apply(&self, manifest: &ObjectManifest) -> Result<(), Error> {
            if self.failing_kind == Some(manifest.api_resource.kind.as_str()) {
                return Err(Error::internal("admission webhook denied the request"));
            }
            self.applied.lock().unwrap().push(manifest.describe());
            Ok(())
        }

        async fn patch_status(
            &self,
            _key: &ObjectKey,
            status: &RegistrationServiceStatus,
        ) -> Result<(), Error> {
            *self.status_writes.lock().unwrap() += 1;
            if let Some(service) = self.service.lock().unwrap().as_mut() {
                service.status = Some(status.clone());
            }
            Ok(())
        }
    }

    fn key() -> ObjectKey {
        ObjectKey::new(NAMESPACE, "registration-service")
    }

    fn context(host: Arc<FakeHost>) -> RegistrationContext {
        RegistrationContext::with_kube(host).unwrap()
    }

    #[tokio::test]
    async fn missing_resource_is_a_no_op() {
        let host = Arc::new(FakeHost::default());
        let ctx = context(Arc::clone(&host));

        assert_eq!(reconcile_key(&key(), &ctx).await.unwrap(), 0);
        assert!(host.applied.lock().unwrap().is_empty());
        assert_eq!(*host.status_writes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn every_rendered_object_is_applied() {
        let host = Arc::new(FakeHost::with_service(RegistrationServiceSpec {
            image: "quay.io/cr/registration-service:123".to_string(),
            ..Default::default()
        }));
        let ctx = context(Arc::clone(&host));

        let applied = reconcile_key(&key(), &ctx).await.unwrap();

        let names = host.applied.lock().unwrap().clone();
        assert_eq!(applied, names.len());
        assert!(names.contains(&"Deployment/registration-service".to_string()));
        let ready = host.ready_condition();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.reason, reason::DEPLOYED);
    }

    #[tokio::test]
    async fn repeated_reconciles_succeed_without_rewriting_status() {
        let host = Arc::new(FakeHost::with_service(Default::default()));
        let ctx = context(Arc::clone(&host));

        let first = reconcile_key(&key(), &ctx).await.unwrap();
        let second = reconcile_key(&key(), &ctx).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(host.applied.lock().unwrap().len(), first * 2);
        assert_eq!(*host.status_writes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn apply_failure_stops_the_pass_and_is_reported() {
        let host = Arc::new(FakeHost::with_service(Default::default()).failing_on("Deployment"));
        let ctx = context(Arc::clone(&host));

        let err = reconcile_key(&key(), &ctx).await.unwrap_err();

        assert!(matches!(err, RegistrationError::Apply { ref object, .. } if object == "Deployment/registration-service"));
        let applied = host.applied.lock().unwrap().clone();
        assert!(!applied.iter().any(|o| o.starts_with("Service/")));
        let ready = host.ready_condition();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, reason::DEPLOYMENT_FAILED);
        assert!(ready.message.contains("admission webhook denied the request"));
    }

    #[tokio::test]
    async fn status_write_failure_after_success_is_returned() {
        let mut kube = MockRegistrationKubeClient::new();
        kube.expect_get_registration_service().returning(|_| {
            let mut service = RegistrationService::new("registration-service", Default::default());
            service.metadata.namespace = Some(NAMESPACE.to_string());
            Ok(Some(service))
        });
        kube.expect_apply().returning(|_| Ok(()));
        kube.expect_patch_status()
            .returning(|_, _| Err(Error::internal("conflict")));
        let ctx = RegistrationContext::with_kube(Arc::new(kube)).unwrap();

        let err = reconcile_key(&key(), &ctx).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Common(_)));
    }

    #[tokio::test]
    async fn status_write_failure_keeps_the_apply_error() {
        let mut kube = MockRegistrationKubeClient::new();
        kube.expect_get_registration_service().returning(|_| {
            let mut service = RegistrationService::new("registration-service", Default::default());
            service.metadata.namespace = Some(NAMESPACE.to_string());
            Ok(Some(service))
        });
        kube.expect_apply()
            .returning(|_| Err(Error::internal("connection refused")));
        kube.expect_patch_status()
            .times(1)
            .returning(|_, _| Err(Error::internal("conflict")));
        let ctx = RegistrationContext::with_kube(Arc::new(kube)).unwrap();

        let err = reconcile_key(&key(), &ctx).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Apply { .. }));
    }
}
