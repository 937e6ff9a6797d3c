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
    /// Spec 4.11.3. Only READY or FAILED stores can be deleted; the caller
    /// gets a 202 the instant the optimistic transition lands and the
    /// actual teardown runs fire-and-forget.
    pub async fn delete_store(self: &Arc<Self>, store_id: &str) -> Result<(), AppError> {
        let record = self.get_store(store_id).await?;
        if !record.status.can_delete() {
            return Err(AppError::invalid_state_transition(record.status.as_str(), StoreStatus::Deleting.as_str()));
        }

        let transitioned = self
            .store
            .update_store(
                store_id,
                &UpdateStoreFields {
                    status: Some(StoreStatus::Deleting),
                    ..Default::default()
                },
                Some(record.status),
            )
            .await
            .map_err(app_error_from_store_error)?;

        let Some(_) = transitioned else {
            return Err(AppError::conflict("store status changed before deletion could begin"));
        };

        self.store
            .record_audit_event(Some(store_id), AuditEventType::StatusChange, Some(record.status.as_str()), Some(StoreStatus::Deleting.as_str()), "deletion requested", json!({}))
            .await;

        let orchestrator = Arc::clone(self);
        let worker_store_id = store_id.to_string();
        tokio::spawn(async move {
            orchestrator.run_deletion_workflow(&worker_store_id).await;
        });

        Ok(())
    }

    /// Re-enters the deletion workflow for a store recovery found already
    /// sitting in DELETING; deletion is idempotent so simply resuming is
    /// safe regardless of how far the previous attempt got.
    pub(crate) async fn resume_deletion(self: &Arc<Self>, store_id: &str) {
        self.run_deletion_workflow(store_id).await;
    }

    /// Uses a permissive queue: a timed-out wait marks the store FAILED
    /// rather than rejecting the caller, since the caller already got its
    /// 202 and there's nobody left to hand a rejection to.
    async fn run_deletion_workflow(self: &Arc<Self>, store_id: &str) {
        if !self.begin_operation(store_id) {
            return;
        }

        let permit = match self.delete_limiter.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                warn!(store_id, error = %err, "deletion queue rejected store, marking failed");
                let _ = self
                    .store
                    .update_store(
                        store_id,
                        &UpdateStoreFields {
                            status: Some(StoreStatus::Failed),
                            failure_reason: Some(format!("deletion could not be scheduled: {err}")),
                            ..Default::default()
                        },
                        Some(StoreStatus::Deleting),
                    )
                    .await;
                self.end_operation(store_id);
                return;
            }
        };

        let record = match self.store.find_store_by_id(store_id).await {
            Ok(Some(record)) => record,
            _ => {
                drop(permit);
                self.end_operation(store_id);
                return;
            }
        };

        let mut cleanup_failed_reason: Option<String> = None;

        match self.installer.status(&record.helm_release, &record.namespace).await {
            Ok(Some(_)) => {
                if let Err(err) = self.installer.uninstall(&record.helm_release, &record.namespace).await {
                    cleanup_failed_reason = Some(format!("helm uninstall failed: {err}"));
                }
            }
            Ok(None) => {}
            Err(err) => cleanup_failed_reason = Some(format!("helm status check failed: {err}")),
        }

        if let Err(err) = self.cluster.delete_namespace(&record.namespace).await {
            cleanup_failed_reason.get_or_insert_with(|| format!("namespace deletion failed: {err}"));
        }

        if !self.wait_for_cleanup(&record.namespace).await {
            warn!(store_id, "cleanup did not verify clean within 120s, proceeding to DELETED anyway");
        }

        if let Some(reason) = cleanup_failed_reason {
            self.store
                .record_audit_event(Some(store_id), AuditEventType::Warning, None, None, &reason, json!({}))
                .await;
        }

        let finalized = self
            .store
            .update_store(
                store_id,
                &UpdateStoreFields {
                    status: Some(StoreStatus::Deleted),
                    deleted_at: Some(chrono::Utc::now()),
                    ..Default::default()
                },
                Some(StoreStatus::Deleting),
            )
            .await;

        match finalized {
            Ok(Some(_)) => {
                self.store
                    .record_audit_event(
                        Some(store_id),
                        AuditEventType::StatusChange,
                        Some(StoreStatus::Deleting.as_str()),
                        Some(StoreStatus::Deleted.as_str()),
                        "store deleted",
                        json!({}),
                    )
                    .await;
            }
            Ok(None) => warn!(store_id, "store left DELETING before finalize could land"),
            Err(err) => warn!(store_id, error = %err, "failed to record DELETED status"),
        }

        drop(permit);
        self.end_operation(store_id);
    }

    /// Polls up to 120s for a clean namespace. Returns false on timeout,
    /// which is non-fatal: deletion still finalizes either way.
    async fn wait_for_cleanup(&self, namespace: &str) -> bool {
        let deadline = Duration::from_secs(120);
        let start = std::time::Instant::now();
        loop {
            if let Ok(result) = self.cluster.verify_cleanup(namespace).await {
                if result.clean {
                    return true;
                }
            }
            if start.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}
