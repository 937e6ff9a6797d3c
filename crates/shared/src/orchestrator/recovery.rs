use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::{Orchestrator, app_error_from_store_error};
use crate::models::AuditEventType;
use crate::repos::UpdateStoreFields;
use crate::state_machine::StoreStatus;

impl Orchestrator {
    /// Spec 4.11.5. Run once at startup, before the HTTP listener binds: a
    /// crash mid-provisioning or mid-deletion leaves stores stuck in an
    /// in-progress status with no worker left to finish the job.
    /// REQUESTED/PROVISIONING stores can't be resumed safely (the
    /// in-memory workflow state is gone), so they're marked FAILED for the
    /// operator to retry; DELETING stores are simply re-enqueued since
    /// deletion is naturally idempotent.
    pub async fn recover_stuck_stores(self: &Arc<Self>) -> usize {
        let stuck = match self.store.find_stuck_stores().await {
            Ok(stores) => stores,
            Err(err) => {
                warn!(error = %err, "failed to query stuck stores during recovery");
                return 0;
            }
        };

        let mut recovered = 0;
        for record in stuck {
            match record.status {
                StoreStatus::Requested | StoreStatus::Provisioning => {
                    let result = self
                        .store
                        .update_store(
                            &record.id,
                            &UpdateStoreFields {
                                status: Some(StoreStatus::Failed),
                                failure_reason: Some("Backend restarted during provisioning. Safe to retry.".to_string()),
                                provisioning_completed_at: Some(chrono::Utc::now()),
                                ..Default::default()
                            },
                            Some(record.status),
                        )
                        .await
                        .map_err(app_error_from_store_error);

                    match result {
                        Ok(Some(_)) => {
                            self.store
                                .record_audit_event(
                                    Some(&record.id),
                                    AuditEventType::Recovery,
                                    Some(record.status.as_str()),
                                    Some(StoreStatus::Failed.as_str()),
                                    "recovered from a stuck in-progress state at startup",
                                    json!({}),
                                )
                                .await;
                            recovered += 1;
                        }
                        Ok(None) => {}
                        Err(err) => warn!(store_id = %record.id, error = %err, "failed to recover stuck store"),
                    }
                }
                StoreStatus::Deleting => {
                    self.store
                        .record_audit_event(
                            Some(&record.id),
                            AuditEventType::Recovery,
                            Some(StoreStatus::Deleting.as_str()),
                            Some(StoreStatus::Deleting.as_str()),
                            "re-enqueuing deletion after a restart",
                            json!({}),
                        )
                        .await;
                    let orchestrator = Arc::clone(self);
                    let store_id = record.id.clone();
                    tokio::spawn(async move {
                        orchestrator.resume_deletion(&store_id).await;
                    });
                    recovered += 1;
                }
                _ => {}
            }
        }

        info!(recovered, "stuck store recovery complete");
        recovered
    }
}
