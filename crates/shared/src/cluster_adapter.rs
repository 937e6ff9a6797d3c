//! Subprocess wrapper around the `kubectl` binary (spec 4.8, 6). Every
//! invocation is an explicit argument vector through
//! `tokio::process::Command`, never a shell string, and captured output
//! is bounded to 5 MiB so a misbehaving pod can't exhaust memory.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::circuit_breaker::{self, Breaker, BreakerConfig};
use crate::errors::AppError;
use std::sync::Arc;

const MAX_OUTPUT_BYTES: usize = 5 * 1024 * 1024;

pub struct ClusterAdapter {
    kubectl_bin: String,
    kubeconfig: Option<String>,
    kube_context: Option<String>,
    breaker: Arc<Breaker>,
}

#[derive(Debug)]
pub struct PodStatus {
    pub name: String,
    pub phase: String,
    pub ready: bool,
}

#[derive(Debug)]
pub struct PodsReadyResult {
    pub ready: bool,
    pub failed: bool,
    pub failed_pods: Vec<String>,
    pub total: usize,
    pub ready_count: usize,
    pub pods: Vec<PodStatus>,
}

#[derive(Debug)]
pub struct JobsStatus {
    pub complete: bool,
    pub failed: bool,
}

#[derive(Debug)]
pub struct PollResult {
    pub ready: bool,
    pub timed_out: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct CleanupResult {
    pub clean: bool,
    pub remaining: Vec<String>,
}

#[derive(Debug)]
pub struct ResourceBoundaries {
    pub quota_enforced: bool,
    pub limit_range_enforced: bool,
}

#[derive(Debug)]
pub struct HealthStatus {
    pub connected: bool,
    pub context: Option<String>,
    pub server: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct PodList {
    items: Vec<PodItem>,
}

#[derive(Deserialize)]
struct PodItem {
    metadata: ObjectMeta,
    status: PodStatusSpec,
}

#[derive(Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Deserialize)]
struct PodStatusSpec {
    phase: String,
    #[serde(default)]
    conditions: Vec<PodCondition>,
}

#[derive(Deserialize)]
struct PodCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

impl ClusterAdapter {
    pub fn new(kubectl_bin: impl Into<String>, kubeconfig: Option<String>, kube_context: Option<String>, breaker_config: BreakerConfig) -> Self {
        Self {
            kubectl_bin: kubectl_bin.into(),
            kubeconfig,
            kube_context,
            breaker: circuit_breaker::registry().named("cluster", breaker_config),
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.kube_context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args
    }

    async fn run(&self, args: &[&str]) -> Result<(bool, String, String), AppError> {
        let mut full_args: Vec<String> = self.base_args();
        full_args.extend(args.iter().map(|a| a.to_string()));

        let mut command = Command::new(&self.kubectl_bin);
        command.args(&full_args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(kubeconfig) = &self.kubeconfig {
            command.env("KUBECONFIG", kubeconfig);
        }

        debug!(args = ?full_args, "invoking kubectl");

        let mut child = command
            .spawn()
            .map_err(|err| AppError::kubernetes_error(format!("failed to spawn kubectl: {err}"), true))?;

        let stdout = read_bounded(child.stdout.take().expect("piped stdout")).await;
        let stderr = read_bounded(child.stderr.take().expect("piped stderr")).await;

        let status = child
            .wait()
            .await
            .map_err(|err| AppError::kubernetes_error(format!("kubectl did not exit cleanly: {err}"), true))?;

        Ok((status.success(), stdout, stderr))
    }

    /// A mutating call gated by the named circuit breaker. 4xx codes
    /// other than 408/425/429 never count as cluster failures.
    async fn run_mutating(&self, args: &[&str]) -> Result<(bool, String, String), AppError> {
        match self.breaker.before_call() {
            circuit_breaker::CallDecision::Admit => {}
            circuit_breaker::CallDecision::RejectOpen { retry_after } => {
                return Err(AppError::circuit_open(retry_after.as_secs()));
            }
        }

        let result = self.run(args).await;
        match &result {
            Ok((true, _, _)) => self.breaker.on_success(),
            Ok((false, _, stderr)) => {
                if circuit_breaker::is_cluster_failure(extract_http_status(stderr)) {
                    self.breaker.on_failure();
                }
            }
            Err(_) => self.breaker.on_failure(),
        }
        result
    }

    pub async fn create_namespace(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), AppError> {
        let label_args: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut args = vec!["create".to_string(), "namespace".to_string(), name.to_string()];
        if !label_args.is_empty() {
            args.push("--labels".to_string());
            args.push(label_args.join(","));
        }
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();

        let (success, _stdout, stderr) = self.run_mutating(&args_ref).await?;
        if success || stderr.to_lowercase().contains("already exists") {
            Ok(())
        } else {
            Err(AppError::kubernetes_error(format!("failed to create namespace {name}: {stderr}"), true))
        }
    }

    pub async fn delete_namespace(&self, name: &str) -> Result<(), AppError> {
        let (success, _stdout, stderr) = self.run_mutating(&["delete", "namespace", name, "--ignore-not-found"]).await?;
        if success || stderr.to_lowercase().contains("not found") {
            Ok(())
        } else {
            Err(AppError::kubernetes_error(format!("failed to delete namespace {name}: {stderr}"), true))
        }
    }

    pub async fn check_pods_ready(&self, namespace: &str) -> Result<PodsReadyResult, AppError> {
        let (success, stdout, stderr) = self.run(&["get", "pods", "-n", namespace, "-o", "json"]).await?;
        if !success {
            return Err(AppError::kubernetes_error(format!("failed to list pods in {namespace}: {stderr}"), true));
        }

        let list: PodList = serde_json::from_str(&stdout)
            .map_err(|err| AppError::kubernetes_error(format!("failed to parse pod list: {err}"), false))?;

        let failed_pods: Vec<String> = list.items.iter().filter(|pod| pod.status.phase == "Failed").map(|pod| pod.metadata.name.clone()).collect();

        let relevant: Vec<&PodItem> = list.items.iter().filter(|pod| !matches!(pod.status.phase.as_str(), "Succeeded" | "Failed")).collect();

        let pods: Vec<PodStatus> = relevant
            .iter()
            .map(|pod| PodStatus {
                name: pod.metadata.name.clone(),
                phase: pod.status.phase.clone(),
                ready: pod.status.conditions.iter().any(|c| c.kind == "Ready" && c.status == "True"),
            })
            .collect();

        let ready_count = pods.iter().filter(|p| p.ready).count();
        let total = pods.len();

        Ok(PodsReadyResult {
            ready: total > 0 && ready_count == total,
            failed: !failed_pods.is_empty(),
            failed_pods,
            total,
            ready_count,
            pods,
        })
    }

    pub async fn check_jobs_complete(&self, namespace: &str) -> Result<JobsStatus, AppError> {
        let (success, stdout, stderr) = self.run(&["get", "pods", "-n", namespace, "-l", "job-name", "-o", "json"]).await?;
        if !success {
            return Err(AppError::kubernetes_error(format!("failed to list job pods in {namespace}: {stderr}"), true));
        }
        let list: PodList = serde_json::from_str(&stdout)
            .map_err(|err| AppError::kubernetes_error(format!("failed to parse job pod list: {err}"), false))?;
        Ok(JobsStatus {
            complete: list.items.iter().all(|pod| pod.status.phase == "Succeeded"),
            failed: list.items.iter().any(|pod| pod.status.phase == "Failed"),
        })
    }

    pub async fn poll_for_readiness(&self, namespace: &str, timeout: Duration, interval: Duration) -> PollResult {
        let start = Instant::now();
        loop {
            match (self.check_pods_ready(namespace).await, self.check_jobs_complete(namespace).await) {
                (Ok(pods), Ok(jobs)) => {
                    if pods.failed {
                        return PollResult {
                            ready: false,
                            timed_out: false,
                            duration: start.elapsed(),
                            error: Some(format!("pod(s) entered Failed phase: {}", pods.failed_pods.join(", "))),
                        };
                    }
                    if jobs.failed {
                        return PollResult {
                            ready: false,
                            timed_out: false,
                            duration: start.elapsed(),
                            error: Some("job pod entered Failed phase".to_string()),
                        };
                    }
                    if pods.ready && jobs.complete {
                        return PollResult {
                            ready: true,
                            timed_out: false,
                            duration: start.elapsed(),
                            error: None,
                        };
                    }
                }
                (Err(err), _) | (_, Err(err)) => {
                    warn!(namespace, error = %err, "readiness check failed, will retry until timeout");
                }
            }

            if start.elapsed() >= timeout {
                return PollResult {
                    ready: false,
                    timed_out: true,
                    duration: start.elapsed(),
                    error: None,
                };
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn verify_cleanup(&self, namespace: &str) -> Result<CleanupResult, AppError> {
        let (success, stdout, _stderr) = self.run(&["get", "namespace", namespace, "-o", "name"]).await?;
        if !success || stdout.trim().is_empty() {
            return Ok(CleanupResult {
                clean: true,
                remaining: Vec::new(),
            });
        }

        let (_, pods_stdout, _) = self.run(&["get", "pods", "-n", namespace, "-o", "name"]).await?;
        let (_, pvcs_stdout, _) = self.run(&["get", "pvc", "-n", namespace, "-o", "name"]).await?;

        let mut remaining: Vec<String> = Vec::new();
        remaining.extend(pods_stdout.lines().filter(|l| !l.trim().is_empty()).map(|s| s.to_string()));
        remaining.extend(pvcs_stdout.lines().filter(|l| !l.trim().is_empty()).map(|s| s.to_string()));

        Ok(CleanupResult {
            clean: remaining.is_empty(),
            remaining,
        })
    }

    pub async fn verify_resource_boundaries(&self, namespace: &str) -> Result<ResourceBoundaries, AppError> {
        let (quota_ok, quota_stdout, _) = self.run(&["get", "resourcequota", "-n", namespace, "-o", "name"]).await?;
        let (range_ok, range_stdout, _) = self.run(&["get", "limitrange", "-n", namespace, "-o", "name"]).await?;

        Ok(ResourceBoundaries {
            quota_enforced: quota_ok && !quota_stdout.trim().is_empty(),
            limit_range_enforced: range_ok && !range_stdout.trim().is_empty(),
        })
    }

    /// Finds the first pod matching `selector` and runs `command` inside
    /// it via `kubectl exec`. Used by engine setup as its pod-exec
    /// channel; bounded by `timeout` on top of the shared output cap.
    pub async fn exec_in_pod(&self, namespace: &str, selector: &str, command: &[&str], timeout: Duration) -> Result<String, AppError> {
        let (found, pod_list_stdout, pod_list_stderr) = self.run(&["get", "pods", "-n", namespace, "-l", selector, "-o", "name"]).await?;
        if !found {
            return Err(AppError::kubernetes_error(format!("failed to locate pod matching {selector} in {namespace}: {pod_list_stderr}"), true));
        }
        let pod_name = pod_list_stdout
            .lines()
            .next()
            .ok_or_else(|| AppError::kubernetes_error(format!("no pod matches selector {selector} in {namespace}"), true))?
            .trim_start_matches("pod/")
            .to_string();

        let mut args: Vec<String> = vec!["exec".to_string(), "-n".to_string(), namespace.to_string(), pod_name, "--".to_string()];
        args.extend(command.iter().map(|s| s.to_string()));
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();

        let run = self.run(&args_ref);
        match tokio::time::timeout(timeout, run).await {
            Ok(Ok((true, stdout, _stderr))) => Ok(stdout),
            Ok(Ok((false, _stdout, stderr))) => Err(AppError::kubernetes_error(format!("exec in pod failed: {stderr}"), true)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AppError::kubernetes_error(format!("exec step timed out after {timeout:?}"), true)),
        }
    }

    pub async fn health_check(&self) -> HealthStatus {
        match self.run(&["cluster-info"]).await {
            Ok((true, stdout, _)) => HealthStatus {
                connected: true,
                context: self.kube_context.clone(),
                server: stdout.lines().next().map(|s| s.to_string()),
                error: None,
            },
            Ok((false, _, stderr)) => HealthStatus {
                connected: false,
                context: self.kube_context.clone(),
                server: None,
                error: Some(stderr),
            },
            Err(err) => HealthStatus {
                connected: false,
                context: self.kube_context.clone(),
                server: None,
                error: Some(err.to_string()),
            },
        }
    }
}

async fn read_bounded(mut reader: impl AsyncRead + Unpin) -> String {
    let mut buffer = vec![0u8; 8192];
    let mut collected = Vec::new();
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                let remaining = MAX_OUTPUT_BYTES.saturating_sub(collected.len());
                collected.extend_from_slice(&buffer[..n.min(remaining)]);
                if collected.len() >= MAX_OUTPUT_BYTES {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&collected).to_string()
}

fn extract_http_status(stderr: &str) -> Option<u16> {
    stderr
        .split_whitespace()
        .find_map(|token| token.trim_matches(|c: char| !c.is_ascii_digit()).parse::<u16>().ok().filter(|code| (100..600).contains(code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_extraction_finds_an_embedded_http_style_code() {
        assert_eq!(extract_http_status("Error from server (NotFound): namespaces \"x\" not found (404)"), Some(404));
        assert_eq!(extract_http_status("connection refused"), None);
    }
}
