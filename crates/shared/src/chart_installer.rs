//! Subprocess wrapper around `helm` (spec 4.9), the same process-invocation
//! idiom as the cluster adapter: explicit argument vectors, no shell
//! interpolation, output bounded to 10 MiB.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::errors::AppError;

const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
const HARD_TIMEOUT: Duration = Duration::from_secs(720);

pub struct ChartInstaller {
    helm_bin: String,
    chart_path: String,
    kubeconfig: Option<String>,
}

pub struct InstallRequest<'a> {
    pub release_name: &'a str,
    pub namespace: &'a str,
    pub engine: &'a str,
    pub set_values: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct ReleaseStatus {
    pub name: String,
    pub namespace: String,
    pub status: String,
}

impl ChartInstaller {
    pub fn new(helm_bin: impl Into<String>, chart_path: impl Into<String>, kubeconfig: Option<String>) -> Self {
        Self {
            helm_bin: helm_bin.into(),
            chart_path: chart_path.into(),
            kubeconfig,
        }
    }

    async fn run(&self, args: &[String]) -> Result<(bool, String, String), AppError> {
        let mut command = Command::new(&self.helm_bin);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(kubeconfig) = &self.kubeconfig {
            command.env("KUBECONFIG", kubeconfig);
        }

        debug!(args = ?redact_args(args), "invoking helm");

        let mut child = command
            .spawn()
            .map_err(|err| AppError::helm_error(format!("failed to spawn helm: {err}"), true))?;

        let run = async {
            let stdout = read_bounded(child.stdout.take().expect("piped stdout")).await;
            let stderr = read_bounded(child.stderr.take().expect("piped stderr")).await;
            let status = child
                .wait()
                .await
                .map_err(|err| AppError::helm_error(format!("helm did not exit cleanly: {err}"), true))?;
            Ok::<_, AppError>((status.success(), stdout, stderr))
        };

        match tokio::time::timeout(HARD_TIMEOUT, run).await {
            Ok(result) => result,
            Err(_) => Err(AppError::helm_error("helm invocation exceeded the 720s hard cap", true)),
        }
    }

    /// upgrade --install gives idempotent-on-identity semantics: a second
    /// call against the same release name converges rather than fails.
    pub async fn install(&self, request: InstallRequest<'_>) -> Result<ReleaseStatus, AppError> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            request.release_name.to_string(),
            self.chart_path.clone(),
            "--namespace".to_string(),
            request.namespace.to_string(),
            "--set".to_string(),
            format!("engine={}", request.engine),
            "--wait".to_string(),
            "--timeout".to_string(),
            "5m".to_string(),
        ];
        for (key, value) in &request.set_values {
            args.push("--set".to_string());
            args.push(format!("{key}={value}"));
        }

        let (success, _stdout, stderr) = self.run(&args).await?;
        if !success {
            return Err(classify_error(&stderr));
        }

        Ok(ReleaseStatus {
            name: request.release_name.to_string(),
            namespace: request.namespace.to_string(),
            status: "deployed".to_string(),
        })
    }

    pub async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<bool, AppError> {
        let args = vec!["uninstall".to_string(), release_name.to_string(), "--namespace".to_string(), namespace.to_string()];
        let (success, _stdout, stderr) = self.run(&args).await?;
        if success {
            Ok(true)
        } else if stderr.to_lowercase().contains("not found") {
            Ok(false)
        } else {
            Err(classify_error(&stderr))
        }
    }

    pub async fn status(&self, release_name: &str, namespace: &str) -> Result<Option<ReleaseStatus>, AppError> {
        let args = vec![
            "status".to_string(),
            release_name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        let (success, stdout, stderr) = self.run(&args).await?;
        if !success {
            if stderr.to_lowercase().contains("not found") {
                return Ok(None);
            }
            return Err(classify_error(&stderr));
        }

        let parsed: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|err| AppError::helm_error(format!("failed to parse helm status: {err}"), false))?;
        let status = parsed
            .get("info")
            .and_then(|info| info.get("status"))
            .and_then(|s| s.as_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Some(ReleaseStatus {
            name: release_name.to_string(),
            namespace: namespace.to_string(),
            status,
        }))
    }

    pub async fn rollback(&self, release_name: &str, namespace: &str) -> Result<(), AppError> {
        let args = vec!["rollback".to_string(), release_name.to_string(), "--namespace".to_string(), namespace.to_string()];
        let (success, _stdout, stderr) = self.run(&args).await?;
        if success { Ok(()) } else { Err(classify_error(&stderr)) }
    }

    pub async fn list(&self, namespace: &str) -> Result<Vec<String>, AppError> {
        let args = vec!["list".to_string(), "--namespace".to_string(), namespace.to_string(), "-o".to_string(), "json".to_string()];
        let (success, stdout, stderr) = self.run(&args).await?;
        if !success {
            return Err(classify_error(&stderr));
        }
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&stdout)
            .map_err(|err| AppError::helm_error(format!("failed to parse helm list: {err}"), false))?;
        Ok(parsed.iter().filter_map(|release| release.get("name").and_then(|n| n.as_str()).map(str::to_string)).collect())
    }
}

fn classify_error(stderr: &str) -> AppError {
    let lower = stderr.to_lowercase();
    let retryable = lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("tls handshake")
        || lower.contains("too many requests")
        || lower.contains("temporarily unavailable");
    AppError::helm_error(stderr.to_string(), retryable)
}

fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, _)) if key.to_ascii_lowercase().contains("password") || key.to_ascii_lowercase().contains("secret") => {
                format!("{key}=[REDACTED]")
            }
            _ => arg.clone(),
        })
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_marks_timeouts_and_connection_refused_as_retryable() {
        assert!(classify_error("Error: timeout while waiting").retryable);
        assert!(classify_error("dial tcp: connection refused").retryable);
        assert!(!classify_error("Error: chart not found").retryable);
    }

    #[test]
    fn redact_args_hides_password_and_secret_set_values() {
        let args = vec!["--set".to_string(), "adminPassword=hunter2".to_string(), "--set".to_string(), "engine=medusa".to_string()];
        let redacted = redact_args(&args);
        assert_eq!(redacted[1], "adminPassword=[REDACTED]");
        assert_eq!(redacted[3], "engine=medusa");
    }
}
