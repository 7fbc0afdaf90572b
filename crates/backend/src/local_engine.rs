// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LocalEngineBackendDriver: a [`BackendDriver`] that shells out to a
//! container-engine CLI (`docker`/`podman`-compatible) on the local
//! machine, for single-node development and CI use (spec §9).

use crate::driver::{
    BackendDriver, BackendError, BackendEvent, ContainerObservation, ContainerSpec, ContainerState,
    WorkloadHandle, WorkloadSpec,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tyger_core::RunId;

/// Default timeout for engine CLI invocations (create/inspect/remove).
pub const ENGINE_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

async fn run_with_timeout(mut cmd: Command, timeout: Duration, description: &str) -> Result<Output, BackendError> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(BackendError::Transient(format!("{description} failed: {io_err}"))),
        Err(_elapsed) => Err(BackendError::Transient(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Shells out to a binary implementing the common `run`/`inspect`/`ps`/
/// `logs`/`rm`/`kill` surface (mirrors `docker`/`podman`/`nerdctl`).
pub struct LocalEngineBackendDriver {
    binary: String,
}

impl LocalEngineBackendDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn container_name(run_id: RunId, container: &ContainerSpec) -> String {
        format!("tyger-run-{}-{}", run_id, container.name)
    }

    async fn create_one(&self, run_id: RunId, container: &ContainerSpec) -> Result<(), BackendError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run").arg("-d").arg("--name").arg(Self::container_name(run_id, container));
        for (key, value) in &container.labels {
            cmd.arg("--label").arg(format!("{key}={value}"));
        }
        for (key, value) in &container.env {
            cmd.arg("--env").arg(format!("{key}={value}"));
        }
        for mount in &container.mounts {
            let mode = if mount.read_only { "ro" } else { "rw" };
            cmd.arg("--volume").arg(format!("{}:{}:{mode}", mount.volume_name, mount.mount_path));
        }
        for port in &container.ports {
            cmd.arg("--publish").arg(format!("127.0.0.1::{port}"));
        }
        if container.gpu_request > 0 {
            cmd.arg("--gpus").arg(container.gpu_request.to_string());
        }
        cmd.arg(&container.image);
        cmd.args(&container.command);
        cmd.args(&container.args);

        let output = run_with_timeout(cmd, ENGINE_COMMAND_TIMEOUT, "container create").await?;
        if !output.status.success() {
            return Err(BackendError::Fatal(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(())
    }

    async fn inspect_one(&self, name: &str, role: &str) -> Result<ContainerObservation, BackendError> {
        let format = "{{.State.Status}}|{{.State.ExitCode}}|{{.State.StartedAt}}|{{.State.FinishedAt}}";
        let mut cmd = Command::new(&self.binary);
        cmd.arg("inspect").arg("--format").arg(format).arg(name);
        let output = run_with_timeout(cmd, ENGINE_COMMAND_TIMEOUT, "container inspect").await?;
        if !output.status.success() {
            return Err(BackendError::NotFound(RunId::new(0)));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let mut parts = text.trim().splitn(4, '|');
        let status = parts.next().unwrap_or("");
        let exit_code: i32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let started_at = parts.next().and_then(parse_engine_timestamp);
        let finished_at = parts.next().and_then(parse_engine_timestamp);

        let state = match status {
            "running" => ContainerState::Running,
            "exited" | "dead" => ContainerState::Exited { exit_code },
            _ => ContainerState::Pending,
        };

        Ok(ContainerObservation {
            name: name.to_string(),
            role: role.to_string(),
            state,
            started_at,
            finished_at,
        })
    }
}

fn parse_engine_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Sends SIGTERM to every running container of a Run (spec §5: per-Run
/// `timeoutSeconds` enforcement and `cancel` share this).
async fn kill_by_label(binary: &str, run_id: RunId) -> Result<(), BackendError> {
    let mut list_cmd = Command::new(binary);
    list_cmd
        .arg("ps")
        .arg("--filter")
        .arg(format!("label=run={run_id}"))
        .arg("--format")
        .arg("{{.Names}}");
    let output = run_with_timeout(list_cmd, ENGINE_COMMAND_TIMEOUT, "container list for cancel").await?;
    for name in String::from_utf8_lossy(&output.stdout).lines() {
        let mut kill_cmd = Command::new(binary);
        kill_cmd.arg("kill").arg("--signal").arg("SIGTERM").arg(name);
        if let Err(err) = run_with_timeout(kill_cmd, ENGINE_COMMAND_TIMEOUT, "container kill").await {
            warn!(run = run_id.get(), container = name, error = %err, "kill failed, continuing");
        }
    }
    Ok(())
}

#[async_trait]
impl BackendDriver for LocalEngineBackendDriver {
    async fn create_workload(&self, spec: WorkloadSpec) -> Result<WorkloadHandle, BackendError> {
        self.create_one(spec.run_id, &spec.main).await?;
        for sidecar in &spec.sidecars {
            self.create_one(spec.run_id, sidecar).await?;
        }
        for replica in &spec.worker_replicas {
            self.create_one(spec.run_id, replica).await?;
        }
        debug!(run = spec.run_id.get(), "local engine workload created");

        if let Some(timeout_seconds) = spec.timeout_seconds {
            let binary = self.binary.clone();
            let run_id = spec.run_id;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(timeout_seconds.max(0) as u64)).await;
                warn!(run = run_id.get(), timeout_seconds, "run timeout elapsed, cancelling");
                if let Err(err) = kill_by_label(&binary, run_id).await {
                    warn!(run = run_id.get(), error = %err, "timeout cancellation failed");
                }
            });
        }

        Ok(WorkloadHandle { run_id: spec.run_id.get(), relay_ports: Default::default() })
    }

    async fn inspect_workload(&self, run_id: RunId) -> Result<Vec<ContainerObservation>, BackendError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("ps").arg("--all").arg("--filter").arg(format!("label=run={run_id}")).arg("--format").arg("{{.Names}}");
        let output = run_with_timeout(cmd, ENGINE_COMMAND_TIMEOUT, "container list").await?;
        if !output.status.success() {
            return Err(BackendError::Transient(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        let mut observations = Vec::new();
        for name in String::from_utf8_lossy(&output.stdout).lines() {
            let role = name.rsplit('-').next().unwrap_or("main").to_string();
            observations.push(self.inspect_one(name, &role).await?);
        }
        Ok(observations)
    }

    async fn list_terminal_groups(&self) -> Result<Vec<RunId>, BackendError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("ps").arg("--all").arg("--filter").arg("status=exited").arg("--filter").arg("label=tyger-run").arg("--format").arg("{{.Label \"tyger-run\"}}");
        let output = run_with_timeout(cmd, ENGINE_COMMAND_TIMEOUT, "container list terminal").await?;
        if !output.status.success() {
            return Err(BackendError::Transient(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        let mut ids: Vec<RunId> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<i64>().ok())
            .map(RunId::new)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn watch_by_label(
        &self,
        run_id: RunId,
        _resource_version: Option<String>,
    ) -> Result<mpsc::Receiver<BackendEvent>, BackendError> {
        let (tx, rx) = mpsc::channel(16);
        let binary = self.binary.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(2));
            loop {
                interval.tick().await;
                if tx
                    .send(BackendEvent { run_id, resource_version: String::new() })
                    .await
                    .is_err()
                {
                    break;
                }
                let _ = &binary;
            }
        });
        Ok(rx)
    }

    async fn stream_logs(
        &self,
        run_id: RunId,
        container_name: &str,
        since: Option<DateTime<Utc>>,
        follow: bool,
    ) -> Result<mpsc::Receiver<Result<Vec<u8>, BackendError>>, BackendError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("logs").arg("--timestamps");
        if follow {
            cmd.arg("--follow");
        }
        if let Some(since) = since {
            cmd.arg("--since").arg(since.to_rfc3339());
        }
        cmd.arg(format!("tyger-run-{run_id}-{container_name}"));
        cmd.stdout(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError::Transient(format!("spawn logs: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Fatal("no stdout on logs child".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, BufReader};
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let mut bytes = line.into_bytes();
                        bytes.push(b'\n');
                        if tx.send(Ok(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(BackendError::Transient(e.to_string()))).await;
                        break;
                    }
                }
            }
            let _ = child.wait().await;
        });
        Ok(rx)
    }

    async fn remove_workload(&self, run_id: RunId) -> Result<(), BackendError> {
        let mut list_cmd = Command::new(&self.binary);
        list_cmd
            .arg("ps")
            .arg("--all")
            .arg("--filter")
            .arg(format!("label=run={run_id}"))
            .arg("--format")
            .arg("{{.Names}}");
        let output = run_with_timeout(list_cmd, ENGINE_COMMAND_TIMEOUT, "container list for removal").await?;
        for name in String::from_utf8_lossy(&output.stdout).lines() {
            let mut rm_cmd = Command::new(&self.binary);
            rm_cmd.arg("rm").arg("--force").arg(name);
            if let Err(e) = run_with_timeout(rm_cmd, ENGINE_COMMAND_TIMEOUT, "container remove").await {
                warn!(run = run_id.get(), container = name, error = %e, "failed to remove container");
            }
        }
        Ok(())
    }

    async fn check_gpu(&self, _cluster: Option<&str>, _pool_name: Option<&str>) -> Result<bool, BackendError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("info").arg("--format").arg("{{.Runtimes.nvidia}}");
        let output = run_with_timeout(cmd, ENGINE_COMMAND_TIMEOUT, "container info").await?;
        Ok(output.status.success() && !String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    async fn cancel(&self, run_id: RunId) -> Result<bool, BackendError> {
        kill_by_label(&self.binary, run_id).await?;
        Ok(true)
    }
}
