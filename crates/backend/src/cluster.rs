// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ClusterBackendDriver: a [`BackendDriver`] speaking to a
//! Kubernetes-style cluster API server over HTTPS (spec §9).

use crate::driver::{
    BackendDriver, BackendError, BackendEvent, ContainerObservation, ContainerState, WorkloadHandle, WorkloadSpec,
};
use crate::retry::Backoff;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tyger_core::RunId;

/// Maximum reconnect attempts for a watch before giving up (spec §4.2:
/// "reconnects with exponential backoff up to ~20 attempts").
const MAX_WATCH_RECONNECTS: u32 = 20;

pub struct ClusterBackendDriver {
    client: Client,
    api_base_url: String,
}

impl ClusterBackendDriver {
    pub fn new(client: Client, api_base_url: impl Into<String>) -> Self {
        Self { client, api_base_url: api_base_url.into() }
    }

    fn label_selector_url(&self, path: &str, run_id: RunId) -> String {
        format!("{}/{}?labelSelector=run={}", self.api_base_url, path, run_id)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, BackendError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status.as_u16(), body));
        }
        response.json().await.map_err(|e| BackendError::Fatal(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ClusterContainerStatus {
    name: String,
    role: String,
    state: ClusterRawState,
    #[serde(rename = "startedAt")]
    started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
enum ClusterRawState {
    Pending,
    Running,
    Exited { #[serde(rename = "exitCode")] exit_code: i32 },
}

#[derive(Debug, Deserialize)]
struct PodList {
    containers: Vec<ClusterContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct RunIdList {
    runs: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct GpuCapability {
    #[serde(rename = "gpuEnabled")]
    gpu_enabled: bool,
}

fn classify_reqwest_error(err: &reqwest::Error) -> BackendError {
    if err.is_timeout() || err.is_connect() {
        BackendError::Transient(err.to_string())
    } else {
        BackendError::Fatal(err.to_string())
    }
}

fn classify_http_status(status: u16, body: String) -> BackendError {
    match status {
        404 => BackendError::NotFound(RunId::new(0)),
        429 | 502 | 503 | 504 => BackendError::Transient(body),
        _ => BackendError::Fatal(body),
    }
}

#[async_trait]
impl BackendDriver for ClusterBackendDriver {
    async fn create_workload(&self, spec: WorkloadSpec) -> Result<WorkloadHandle, BackendError> {
        let url = format!("{}/workloads", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .json(&spec)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!(run = spec.run_id.get(), "workload already exists, treating create as idempotent success");
            return Ok(WorkloadHandle { run_id: spec.run_id.get(), relay_ports: Default::default() });
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status.as_u16(), body));
        }
        Ok(WorkloadHandle { run_id: spec.run_id.get(), relay_ports: Default::default() })
    }

    async fn inspect_workload(&self, run_id: RunId) -> Result<Vec<ContainerObservation>, BackendError> {
        let list: PodList = self.get_json(&self.label_selector_url("pods", run_id)).await?;
        Ok(list
            .containers
            .into_iter()
            .map(|c| ContainerObservation {
                name: c.name,
                role: c.role,
                state: match c.state {
                    ClusterRawState::Pending => ContainerState::Pending,
                    ClusterRawState::Running => ContainerState::Running,
                    ClusterRawState::Exited { exit_code } => ContainerState::Exited { exit_code },
                },
                started_at: c.started_at,
                finished_at: c.finished_at,
            })
            .collect())
    }

    async fn list_terminal_groups(&self) -> Result<Vec<RunId>, BackendError> {
        let url = format!("{}/pods/terminal-groups", self.api_base_url);
        let list: RunIdList = self.get_json(&url).await?;
        Ok(list.runs.into_iter().map(RunId::new).collect())
    }

    async fn watch_by_label(
        &self,
        run_id: RunId,
        resource_version: Option<String>,
    ) -> Result<mpsc::Receiver<BackendEvent>, BackendError> {
        let (tx, rx) = mpsc::channel(32);
        let client = self.client.clone();
        let url = self.label_selector_url("pods/watch", run_id);
        tokio::spawn(async move {
            let mut backoff = Backoff::default();
            let mut attempts = 0u32;
            let mut resource_version = resource_version;
            loop {
                let request_url = match &resource_version {
                    Some(rv) => format!("{url}&resourceVersion={rv}"),
                    None => url.clone(),
                };
                match client.get(&request_url).send().await {
                    Ok(response) if response.status().is_success() => {
                        backoff.reset();
                        attempts = 0;
                        if let Ok(event) = response.json::<BackendEvent>().await {
                            resource_version = Some(event.resource_version.clone());
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    _ => {
                        attempts += 1;
                        if attempts > MAX_WATCH_RECONNECTS {
                            warn!(run = run_id.get(), "giving up on cluster watch after max reconnect attempts");
                            break;
                        }
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
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
        let mut url = format!(
            "{}/pods/{}/containers/{}/logs?follow={}",
            self.api_base_url, run_id, container_name, follow
        );
        if let Some(since) = since {
            url.push_str(&format!("&sinceTime={}", since.to_rfc3339()));
        }

        let response = self.client.get(&url).send().await.map_err(|e| classify_reqwest_error(&e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status.as_u16(), body));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            use futures_util::StreamExt;
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        if tx.send(Ok(bytes.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(classify_reqwest_error(&e))).await;
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn remove_workload(&self, run_id: RunId) -> Result<(), BackendError> {
        let url = self.label_selector_url("workloads", run_id);
        let response = self.client.delete(&url).send().await.map_err(|e| classify_reqwest_error(&e))?;
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(classify_http_status(status.as_u16(), body))
        }
    }

    async fn check_gpu(&self, cluster: Option<&str>, pool_name: Option<&str>) -> Result<bool, BackendError> {
        let cluster = cluster.unwrap_or("primary");
        let pool = pool_name.unwrap_or_default();
        let url = format!("{}/clusters/{cluster}/nodepools/{pool}/gpu", self.api_base_url);
        let capability: GpuCapability = self.get_json(&url).await?;
        Ok(capability.gpu_enabled)
    }

    async fn cancel(&self, run_id: RunId) -> Result<bool, BackendError> {
        let url = format!("{}/workloads/{}/cancel", self.api_base_url, run_id);
        let response = self.client.post(&url).send().await.map_err(|e| classify_reqwest_error(&e))?;
        if response.status().is_success() {
            // The controller propagates termination asynchronously.
            Ok(false)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(classify_http_status(status.as_u16(), body))
        }
    }
}
