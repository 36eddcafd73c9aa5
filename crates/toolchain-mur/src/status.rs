//! Persisting the `Ready` condition of a MasterUserRecord

use tracing::{debug, warn};

use toolchain_common::condition;
use toolchain_common::crd::{Condition, MasterUserRecord, MasterUserRecordStatus};
use toolchain_common::kube_utils::ObjectKey;
use toolchain_common::Error;

use crate::controller::MurKubeClient;
use crate::error::ReconcileError;

/// Apply `new` to the record's conditions and persist the result
///
/// Nothing is written when the record already carries an equal condition.
pub async fn set_status(
    kube: &dyn MurKubeClient,
    key: &ObjectKey,
    mur: &MasterUserRecord,
    new: Condition,
) -> Result<(), Error> {
    if condition::is_unchanged(mur.conditions(), &new) {
        debug!(reason = %new.reason, "condition unchanged, skipping status update");
        return Ok(());
    }
    let status = MasterUserRecordStatus {
        conditions: condition::apply(mur.conditions(), new),
    };
    kube.update_status(key, &status).await
}

/// Report `err` as a `Ready=False` condition and hand it back
///
/// When the status write fails too, both failures are returned together so
/// neither message is lost.
pub async fn set_status_and_return_error(
    kube: &dyn MurKubeClient,
    key: &ObjectKey,
    mur: &MasterUserRecord,
    err: ReconcileError,
) -> ReconcileError {
    let condition = Condition::not_ready(err.reason(), err.to_string());
    match set_status(kube, key, mur, condition).await {
        Ok(()) => err,
        Err(status_err) => {
            warn!(error = %status_err, "unable to report failure on status");
            ReconcileError::StatusUpdate {
                cause: Box::new(err),
                source: status_err,
            }
        }
    }
}
