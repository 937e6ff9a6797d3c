use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use super::{Orchestrator, app_error_from_store_error};
use crate::errors::AppError;
use crate::models::AuditEventType;
use crate::repos::UpdateStoreFields;
use crate::state_machine::StoreStatus;

impl Orchestrator {
    /// Spec 4.11.4. Only a FAILED store under its retry cap can be retried;
    /// a best-effort teardown of anything the failed attempt left behind
    /// runs before the store goes back to REQUESTED.
    pub async fn retry_store(self: &Arc<Self>, store_id: &str) -> Result<(), AppError> {
        let record = self.get_store(store_id).await?;
        if !record.status.can_retry() {
            return Err(AppError::invalid_state_transition(record.status.as_str(), StoreStatus::Requested.as_str()));
        }
        if record.retry_count >= self.config.provisioning_max_retries as i32 {
            return Err(AppError::validation(format!("store {store_id} has exhausted its retry budget")));
        }

        self.pre_retry_cleanup(&record.namespace, &record.helm_release).await;

        let transitioned = self
            .store
            .update_store(
                store_id,
                &UpdateStoreFields {
                    status: Some(StoreStatus::Requested),
                    retry_count: Some(record.retry_count + 1),
                    failure_reason: Some(String::new()),
                    provisioning_started_at: Some(chrono::Utc::now()),
                    provisioning_completed_at: None,
                    ..Default::default()
                },
                Some(StoreStatus::Failed),
            )
            .await
            .map_err(app_error_from_store_error)?;

        let Some(_) = transitioned else {
            return Err(AppError::conflict("store left FAILED before the retry could begin"));
        };

        self.store
            .record_audit_event(
                Some(store_id),
                AuditEventType::StatusChange,
                Some(StoreStatus::Failed.as_str()),
                Some(StoreStatus::Requested.as_str()),
                "retry requested",
                json!({ "retryCount": record.retry_count + 1 }),
            )
            .await;

        let orchestrator = Arc::clone(self);
        let worker_store_id = store_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.provision_store(&worker_store_id).await {
                warn!(store_id = %worker_store_id, error = %err, "retry's provisioning worker could not start");
            }
        });

        Ok(())
    }

    /// Up to 15s total; never surfaces an error, since the store is about
    /// to be re-provisioned from scratch regardless of whether this
    /// cleanup fully lands.
    async fn pre_retry_cleanup(&self, namespace: &str, helm_release: &str) {
        let budget = Duration::from_secs(15);
        let start = std::time::Instant::now();

        if let Ok(Some(_)) = self.installer.status(helm_release, namespace).await {
            let _ = self.installer.uninstall(helm_release, namespace).await;
        }

        if start.elapsed() < budget {
            let _ = self.cluster.delete_namespace(namespace).await;
        }

        if start.elapsed() < budget {
            let _ = self.cluster.verify_cleanup(namespace).await;
        }
    }
}
