//! Post-install engine configuration (spec 4.10). Each procedure is a
//! sequence of idempotent steps run through the cluster adapter's
//! pod-exec channel; every step's failure becomes a logged `warning`
//! audit event rather than a fatal orchestrator error — the store is
//! usable even if setup partially fails.

pub mod medusa;
pub mod woocommerce;

use std::time::Duration;

use crate::cluster_adapter::ClusterAdapter;

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: &'static str,
    pub succeeded: bool,
    pub detail: String,
}

async fn run_step(adapter: &ClusterAdapter, namespace: &str, selector: &str, step: &'static str, command: &[&str], timeout: Duration) -> StepOutcome {
    match adapter.exec_in_pod(namespace, selector, command, timeout).await {
        Ok(detail) => StepOutcome {
            step,
            succeeded: true,
            detail,
        },
        Err(err) => StepOutcome {
            step,
            succeeded: false,
            detail: err.to_string(),
        },
    }
}
