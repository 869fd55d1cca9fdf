//! Long-running operations returned by delete calls.

use nuke_core::poll::{PollStatus, poll_until};
use nuke_core::{BackendError, Result, TeardownConfig};
use serde::Deserialize;

use crate::GcpClient;

/// A compute or container operation.
///
/// Both APIs report `status` (`PENDING`, `RUNNING`, `DONE`) and a `selfLink`
/// the operation can be re-read from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorItem>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == "DONE"
    }

    /// The error a finished operation carries, if any.
    pub fn failure(&self) -> Option<BackendError> {
        let error = self.error.as_ref()?;
        let first = error.errors.first();
        let message = first
            .map(|e| e.message.clone())
            .or_else(|| error.message.clone())
            .or_else(|| self.status_message.clone())
            .unwrap_or_default();

        Some(BackendError::Operation {
            operation: self.name.clone(),
            code: first.and_then(|e| e.code.clone()),
            message,
        })
    }
}

/// Poll `operation` until it is `DONE`, failing with its error if it has one.
pub async fn wait(
    client: &GcpClient,
    config: &TeardownConfig,
    item: &str,
    operation: Operation,
) -> Result<()> {
    if operation.is_done() {
        return operation.failure().map_or(Ok(()), Err);
    }

    let self_link = operation.self_link.clone().ok_or_else(|| {
        BackendError::Decode(format!("operation {} has no selfLink", operation.name))
    })?;

    poll_until(config.poll_config(), &config.cancel, item, || async {
        let current: Operation = client.get(&self_link).await?;
        if !current.is_done() {
            return Ok(PollStatus::Pending);
        }
        match current.failure() {
            Some(error) => Err(error),
            None => Ok(PollStatus::Ready(())),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuke_core::{ErrorClass, TransientReason, classify};
    use serde_json::json;

    #[test]
    fn test_compute_operation_error() {
        let op: Operation = serde_json::from_value(json!({
            "kind": "compute#operation",
            "name": "operation-1712-delete",
            "status": "DONE",
            "selfLink": "https://compute.googleapis.com/compute/v1/projects/p/global/operations/operation-1712-delete",
            "error": {
                "errors": [{
                    "code": "RESOURCE_IN_USE_BY_ANOTHER_RESOURCE",
                    "message": "The subnetwork resource is already being used by 'instance-1'"
                }]
            }
        }))
        .unwrap();

        assert!(op.is_done());
        let err = op.failure().unwrap();
        assert_eq!(classify(&err), ErrorClass::Transient(TransientReason::InUse));
        assert!(err.to_string().contains("already being used"));
    }

    #[test]
    fn test_container_operation_error() {
        let op: Operation = serde_json::from_value(json!({
            "name": "operation-123",
            "operationType": "DELETE_CLUSTER",
            "status": "DONE",
            "statusMessage": "Cluster is being repaired",
            "error": {"code": 9, "message": "Cluster is running incompatible operation"}
        }))
        .unwrap();

        let err = op.failure().unwrap();
        assert!(matches!(
            err,
            BackendError::Operation { code: None, ref message, .. }
                if message == "Cluster is running incompatible operation"
        ));
    }

    #[test]
    fn test_running_operation_has_no_failure() {
        let op: Operation = serde_json::from_value(json!({
            "name": "operation-1",
            "status": "RUNNING",
            "selfLink": "http://compute.test/operations/operation-1"
        }))
        .unwrap();

        assert!(!op.is_done());
        assert!(op.failure().is_none());
    }

    #[tokio::test]
    async fn test_done_operation_needs_no_polling() {
        let client = GcpClient::with_endpoints(
            crate::AccessToken::new("t"),
            crate::Endpoints::default(),
        );
        let op: Operation =
            serde_json::from_value(json!({"name": "operation-1", "status": "DONE"})).unwrap();

        wait(&client, &TeardownConfig::new("p"), "vm-1", op)
            .await
            .unwrap();
    }
}
