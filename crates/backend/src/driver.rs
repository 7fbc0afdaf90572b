// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `BackendDriver` capability set (spec §9): `CreateWorkload`,
//! `InspectWorkload`, `ListByLabel`, `WatchByLabel`, `StreamLogs`,
//! `RemoveWorkload`, `CheckGpu`. Both the cluster driver and the
//! local-engine driver implement this trait; `RunCreator`/`RunReader`/
//! `RunSweeper` depend only on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tyger_core::RunId;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transient backend error: {0}")]
    Transient(String),
    #[error("fatal backend error: {0}")]
    Fatal(String),
    #[error("workload not found for run {0}")]
    NotFound(RunId),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// A single container to create as part of a Run's workload graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    /// Host-mounted/emptyDir volume mount points shared with sibling
    /// containers (FIFOs, secrets, tombstone) — spec §4.1.1.
    pub mounts: Vec<VolumeMount>,
    pub ports: Vec<u16>,
    pub labels: HashMap<String, String>,
    pub gpu_request: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub volume_name: String,
    pub mount_path: String,
    pub read_only: bool,
}

/// Everything needed to submit one Run's workload graph to a backend
/// (spec §4.1.1): the main container, its sidecars, optional worker
/// replicas, and pod-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub run_id: RunId,
    pub cluster: Option<String>,
    pub node_pool: Option<String>,
    pub main: ContainerSpec,
    pub sidecars: Vec<ContainerSpec>,
    pub worker_replicas: Vec<ContainerSpec>,
    /// Present iff the codespec declared >=1 socket — all socket sidecars
    /// and the main container join this Layer-3 network (spec §4.1.1).
    pub shared_network: Option<String>,
    pub timeout_seconds: Option<i64>,
    pub labels: HashMap<String, String>,
}

/// Observed runtime state of a single container (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Pending,
    Running,
    Exited { exit_code: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerObservation {
    pub name: String,
    pub role: String,
    pub state: ContainerState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Opaque handle returned by `create_workload`, carrying whatever the
/// backend needs to address the objects it just created (e.g. the
/// host-assigned TCP port for an ephemeral-buffer relay, spec §4.1.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadHandle {
    pub run_id: i64,
    /// Host port assigned to each ephemeral-buffer relay's TCP listener,
    /// keyed by buffer parameter name (spec §8 boundary: "the bound host
    /// port matches backend-assigned port").
    pub relay_ports: HashMap<String, u16>,
}

/// A backend event, used to drive `WatchRun`'s reconnecting subscription
/// (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEvent {
    pub run_id: RunId,
    pub resource_version: String,
}

/// The capability set every backend variant implements (spec §9).
///
/// No shared base state: a cluster driver and a local-engine driver carry
/// entirely different internals, so this is a trait object boundary, not
/// a struct with an enum discriminant.
#[async_trait]
pub trait BackendDriver: Send + Sync + 'static {
    /// Create every object in the workload graph. Must be safe to retry:
    /// if the Run ID's objects already exist, creation is a no-op success
    /// (spec §5: "multiple creators must never attempt to reuse a Run
    /// ID", i.e. creation is keyed by the Run ID label and is naturally
    /// idempotent under at-most-once semantics).
    async fn create_workload(&self, spec: WorkloadSpec) -> Result<WorkloadHandle, BackendError>;

    /// Fetch the current observation for every container labeled
    /// `run=<id>`.
    async fn inspect_workload(&self, run_id: RunId) -> Result<Vec<ContainerObservation>, BackendError>;

    /// List every Run ID that currently has backend objects in one of
    /// `exited | removing | dead` (spec §4.3 step 2).
    async fn list_terminal_groups(&self) -> Result<Vec<RunId>, BackendError>;

    /// Subscribe to backend events for `run=<id>`, resuming from
    /// `resource_version` if given. Reconnects internally with capped
    /// backoff (spec §4.2); the returned channel closes only when the
    /// subscription is permanently abandoned (consumer dropped the
    /// receiver) — transient disconnects are invisible to the caller.
    async fn watch_by_label(
        &self,
        run_id: RunId,
        resource_version: Option<String>,
    ) -> Result<mpsc::Receiver<BackendEvent>, BackendError>;

    /// Stream raw log bytes (with leading RFC3339 timestamps, spec §4.5)
    /// for one named container belonging to the Run.
    async fn stream_logs(
        &self,
        run_id: RunId,
        container_name: &str,
        since: Option<DateTime<Utc>>,
        follow: bool,
    ) -> Result<mpsc::Receiver<Result<Vec<u8>, BackendError>>, BackendError>;

    /// Remove every object labeled `run=<id>` (idempotent).
    async fn remove_workload(&self, run_id: RunId) -> Result<(), BackendError>;

    /// Whether `pool_name` on `cluster` (or the backend's sole pool, for
    /// drivers without node pools) supports GPU workloads (spec §4.1
    /// step 2).
    async fn check_gpu(&self, cluster: Option<&str>, pool_name: Option<&str>) -> Result<bool, BackendError>;

    /// Send an interrupt/cancel signal to the Run's main object (spec
    /// §4.4): on the cluster backend this annotates the job for a
    /// controller to propagate; on the local backend it kills containers
    /// directly. Returns `true` iff cancellation is complete by the time
    /// this call returns (the local backend's synchronous kill), `false`
    /// if it was only requested and a controller will propagate it
    /// asynchronously (the cluster backend's annotation).
    async fn cancel(&self, run_id: RunId) -> Result<bool, BackendError>;
}
