use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::{Orchestrator, app_error_from_store_error};
use crate::errors::AppError;
use crate::models::{AuditEventType, Engine, StoreRecord, Theme};
use crate::naming;
use crate::state_machine::StoreStatus;

impl Orchestrator {
    /// Spec 4.11.1. Persists the store in REQUESTED and fires the async
    /// provisioning worker; the caller sees the record immediately and
    /// the HTTP layer turns that into a 202.
    pub async fn create_store(self: &Arc<Self>, name: &str, engine: Engine, theme: Option<Theme>, owner_id: Uuid, is_admin: bool) -> Result<StoreRecord, AppError> {
        if let Some(existing) = self
            .store
            .find_store_by_name_and_owner(name, owner_id)
            .await
            .map_err(app_error_from_store_error)?
        {
            if existing.status == StoreStatus::Failed {
                self.store
                    .update_store(
                        &existing.id,
                        &crate::repos::UpdateStoreFields {
                            status: Some(StoreStatus::Deleted),
                            deleted_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        },
                        Some(StoreStatus::Failed),
                    )
                    .await
                    .map_err(app_error_from_store_error)?;
            } else {
                return Err(AppError::conflict(format!("a store named {name} already exists")));
            }
        }

        let active_count = self.store.count_active_stores_by_owner(owner_id).await.map_err(app_error_from_store_error)?;
        if active_count >= self.config.max_stores_per_user as i64 {
            return Err(AppError::store_limit_exceeded(self.config.max_stores_per_user));
        }

        if !is_admin {
            self.cooldown.check(owner_id)?;
        }

        let store_id = naming::generate_store_id();
        let namespace = naming::store_id_to_namespace(&store_id);
        let helm_release = naming::store_id_to_helm_release(&store_id);

        let record = self
            .store
            .create_store(&store_id, name, engine, theme, owner_id, &namespace, &helm_release)
            .await
            .map_err(app_error_from_store_error)?;

        self.store
            .record_audit_event(
                Some(&store_id),
                AuditEventType::StoreCreated,
                None,
                Some(StoreStatus::Requested.as_str()),
                &format!("store {name} created for engine {}", engine.as_str()),
                json!({ "ownerId": owner_id, "engine": engine.as_str() }),
            )
            .await;

        let orchestrator = Arc::clone(self);
        let worker_store_id = store_id.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.provision_store(&worker_store_id).await {
                // `run_provisioning_workflow` already marks genuine workflow
                // failures FAILED and counts them under
                // `store_provisioning_failures_total`. Only admission
                // failures (the limiter rejecting before a worker could even
                // start, spec 4.11.1 step 5) are rejections here.
                if !matches!(err.code, "PROVISIONING_QUEUE_FULL" | "PROVISIONING_QUEUE_TIMEOUT") {
                    return;
                }
                warn!(store_id = %worker_store_id, error = %err, "provisioning rejected before it could start");
                orchestrator
                    .metrics
                    .incr_counter("provisioning_rejections_total", "rejections before a provisioning worker could run", vec![("reason", err.code.to_string())]);
                let _ = orchestrator
                    .store
                    .update_store(
                        &worker_store_id,
                        &crate::repos::UpdateStoreFields {
                            status: Some(StoreStatus::Failed),
                            failure_reason: Some(err.message.clone()),
                            provisioning_completed_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        },
                        None,
                    )
                    .await;
            }
        });

        Ok(record)
    }
}
