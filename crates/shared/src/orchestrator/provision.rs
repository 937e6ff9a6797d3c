use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use rand::RngCore;
use serde_json::json;
use tracing::{info, warn};

use super::{Orchestrator, app_error_from_store_error};
use crate::chart_installer::InstallRequest;
use crate::engine_setup::{medusa, woocommerce};
use crate::errors::AppError;
use crate::models::{AdminCredentials, AuditEventType, Engine};
use crate::repos::UpdateStoreFields;
use crate::retry::retry_with_backoff;
use crate::state_machine::StoreStatus;

fn random_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

impl Orchestrator {
    /// A per-store mutex (`active_operations`) ensures at most one worker
    /// runs per store at a time; a permit from the global limiter bounds
    /// how many stores provision concurrently cluster-wide (spec 4.11.2).
    pub async fn provision_store(self: &Arc<Self>, store_id: &str) -> Result<(), AppError> {
        if !self.begin_operation(store_id) {
            return Ok(());
        }

        let permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                self.end_operation(store_id);
                return Err(err);
            }
        };

        let result = self.run_provisioning_workflow(store_id).await;
        drop(permit);
        self.end_operation(store_id);
        result
    }

    async fn run_provisioning_workflow(self: &Arc<Self>, store_id: &str) -> Result<(), AppError> {
        let started_at = chrono::Utc::now();

        let transitioned = self
            .store
            .update_store(
                store_id,
                &UpdateStoreFields {
                    status: Some(StoreStatus::Provisioning),
                    provisioning_started_at: Some(started_at),
                    ..Default::default()
                },
                Some(StoreStatus::Requested),
            )
            .await
            .map_err(app_error_from_store_error)?;

        let Some(record) = transitioned else {
            return Err(AppError::conflict("store left REQUESTED before provisioning could begin"));
        };

        self.store
            .record_audit_event(
                Some(store_id),
                AuditEventType::StatusChange,
                Some(StoreStatus::Requested.as_str()),
                Some(StoreStatus::Provisioning.as_str()),
                "provisioning started",
                json!({}),
            )
            .await;

        match self.provision_steps(store_id, record.engine, record.theme, &record.namespace, &record.helm_release, &record.name, record.owner_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.metrics.incr_counter(
                    "store_provisioning_failures_total",
                    "provisioning failures by engine and step",
                    vec![("engine", record.engine.as_str().to_string()), ("step", "workflow".to_string())],
                );
                self.store
                    .update_store(
                        store_id,
                        &UpdateStoreFields {
                            status: Some(StoreStatus::Failed),
                            failure_reason: Some(err.message.clone()),
                            provisioning_completed_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        },
                        None,
                    )
                    .await
                    .map_err(app_error_from_store_error)?;
                self.store
                    .record_audit_event(Some(store_id), AuditEventType::Error, None, Some(StoreStatus::Failed.as_str()), &err.message, json!({ "code": err.code }))
                    .await;
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn provision_steps(
        self: &Arc<Self>,
        store_id: &str,
        engine: Engine,
        theme: Option<crate::models::Theme>,
        namespace: &str,
        helm_release: &str,
        store_name: &str,
        owner_id: uuid::Uuid,
    ) -> Result<(), AppError> {
        self.timed_step(engine, "namespace_create", || async {
            retry_with_backoff(
                || self.cluster.create_namespace(namespace, &[("engine", engine.as_str()), ("storeName", store_name)]),
                2,
                self.config.provisioning_retry_base_delay,
                Duration::from_secs(30),
                |_, _| true,
            )
            .await
        })
        .await?;

        let admin_email = self.admin_email_for(engine).to_string();
        let admin_username = "admin".to_string();
        let admin_password = random_token(12);
        let db_password = random_token(16);

        let mut set_values = vec![
            ("adminEmail".to_string(), admin_email.clone()),
            ("adminUsername".to_string(), admin_username.clone()),
            ("adminPassword".to_string(), admin_password.clone()),
            ("dbPassword".to_string(), db_password.clone()),
        ];
        match engine {
            Engine::Woocommerce => set_values.push(("dbRootPassword".to_string(), random_token(16))),
            Engine::Medusa => {
                set_values.push(("jwtSecret".to_string(), random_token(24)));
                set_values.push(("cookieSecret".to_string(), random_token(24)));
            }
        }

        let existing_release = self.installer.status(helm_release, namespace).await?;
        if let Some(release) = &existing_release {
            if release.status != "deployed" {
                self.installer.uninstall(helm_release, namespace).await?;
            }
        }

        if existing_release.as_ref().is_none_or(|r| r.status != "deployed") {
            self.timed_step(engine, "helm_install", || async {
                retry_with_backoff(
                    || {
                        self.installer.install(InstallRequest {
                            release_name: helm_release,
                            namespace,
                            engine: engine.as_str(),
                            set_values: set_values.clone(),
                        })
                    },
                    1,
                    self.config.provisioning_retry_base_delay,
                    Duration::from_secs(30),
                    |_, _| true,
                )
                .await
            })
            .await?;
        }

        self.timed_step(engine, "pod_readiness", || async {
            let quick = self.cluster.check_pods_ready(namespace).await?;
            if quick.ready {
                return Ok(());
            }
            let poll = self.cluster.poll_for_readiness(namespace, Duration::from_secs(30), self.config.provisioning_poll_interval).await;
            if poll.ready {
                Ok(())
            } else {
                Err(AppError::provisioning_error(poll.error.unwrap_or_else(|| "pods did not become ready in time".to_string()), poll.timed_out))
            }
        })
        .await?;

        match self.cluster.verify_resource_boundaries(namespace).await {
            Ok(boundaries) => {
                self.store
                    .record_audit_event(
                        Some(store_id),
                        AuditEventType::Info,
                        None,
                        None,
                        "resource boundary check",
                        json!({ "quotaEnforced": boundaries.quota_enforced, "limitRangeEnforced": boundaries.limit_range_enforced }),
                    )
                    .await;
            }
            Err(err) => warn!(store_id, error = %err, "resource boundary verification failed, continuing"),
        }

        let pod_selector = format!("app={namespace}");
        let outcomes = match engine {
            Engine::Woocommerce => {
                let input = woocommerce::WoocommerceSetupInput {
                    namespace,
                    pod_selector: &pod_selector,
                    site_url: &format!("http://{namespace}{}", self.config.store_domain_suffix),
                    admin_email: &admin_email,
                    admin_username: &admin_username,
                    admin_password: &admin_password,
                    theme: theme.map(|t| t.as_str()).unwrap_or("storefront"),
                };
                woocommerce::run(&self.cluster, &input).await
            }
            Engine::Medusa => {
                let input = medusa::MedusaSetupInput {
                    namespace,
                    pod_selector: &pod_selector,
                    admin_email: &admin_email,
                    admin_password: &admin_password,
                };
                medusa::run(&self.cluster, &input).await
            }
        };
        for outcome in &outcomes {
            if !outcome.succeeded {
                self.store
                    .record_audit_event(
                        Some(store_id),
                        AuditEventType::Warning,
                        None,
                        None,
                        &format!("engine setup step {} failed", outcome.step),
                        json!({ "step": outcome.step, "detail": outcome.detail }),
                    )
                    .await;
            }
        }

        let (storefront_url, admin_url) = self.store_url_for(store_id, engine);
        let credentials = AdminCredentials {
            email: admin_email,
            username: admin_username,
            password: admin_password,
        };

        let started_at = self
            .get_store(store_id)
            .await
            .ok()
            .and_then(|record| record.provisioning_started_at)
            .unwrap_or_else(chrono::Utc::now);
        let completed_at = chrono::Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0);

        self.store
            .update_store(
                store_id,
                &UpdateStoreFields {
                    status: Some(StoreStatus::Ready),
                    storefront_url: Some(storefront_url),
                    admin_url: Some(admin_url),
                    admin_credentials: Some(credentials),
                    provisioning_completed_at: Some(completed_at),
                    provisioning_duration_ms: Some(duration_ms),
                    ..Default::default()
                },
                Some(StoreStatus::Provisioning),
            )
            .await
            .map_err(app_error_from_store_error)?;

        self.metrics.observe_histogram("store_provisioning_duration_ms", "end-to-end provisioning duration", vec![("engine", engine.as_str().to_string())], duration_ms as f64);

        self.store
            .record_audit_event(
                Some(store_id),
                AuditEventType::StatusChange,
                Some(StoreStatus::Provisioning.as_str()),
                Some(StoreStatus::Ready.as_str()),
                "provisioning completed",
                json!({ "durationMs": duration_ms }),
            )
            .await;

        info!(store_id, owner_id = %owner_id, duration_ms, "store provisioned");
        Ok(())
    }

    async fn timed_step<F, Fut, T>(&self, engine: Engine, step: &'static str, operation: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let start = Instant::now();
        let result = operation().await;
        let elapsed_ms = start.elapsed().as_millis() as f64;
        self.metrics.observe_histogram(
            "store_provisioning_step_duration_ms",
            "per-step provisioning duration",
            vec![("engine", engine.as_str().to_string()), ("step", step.to_string())],
            elapsed_ms,
        );
        if result.is_err() {
            self.metrics.incr_counter(
                "store_provisioning_failures_total",
                "provisioning failures by engine and step",
                vec![("engine", engine.as_str().to_string()), ("step", step.to_string())],
            );
        }
        result
    }
}
