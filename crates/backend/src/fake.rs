// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backend driver for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::driver::{
    BackendDriver, BackendError, BackendEvent, ContainerObservation, ContainerState, WorkloadHandle, WorkloadSpec,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tyger_core::RunId;

/// Recorded backend call, for assertions in engine-level tests.
#[derive(Debug, Clone)]
pub enum BackendCall {
    CreateWorkload { run_id: RunId },
    InspectWorkload { run_id: RunId },
    RemoveWorkload { run_id: RunId },
    Cancel { run_id: RunId },
}

#[derive(Debug, Clone, Default)]
struct FakeWorkload {
    observations: Vec<ContainerObservation>,
    removed: bool,
    canceled: bool,
}

struct FakeBackendState {
    workloads: HashMap<RunId, FakeWorkload>,
    calls: Vec<BackendCall>,
    gpu_pools: HashMap<String, bool>,
    terminal_groups: Vec<RunId>,
    create_failure: Option<String>,
    synchronous_cancel: bool,
    log_lines: HashMap<RunId, Vec<Vec<u8>>>,
}

/// In-memory [`BackendDriver`] double. Mirrors this codebase's
/// `FakeSessionAdapter`: an `Arc<Mutex<..>>` of recorded state plus
/// setter methods the test calls to script backend behavior.
#[derive(Clone)]
pub struct FakeBackendDriver {
    inner: Arc<Mutex<FakeBackendState>>,
}

impl Default for FakeBackendDriver {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeBackendState {
                workloads: HashMap::new(),
                calls: Vec::new(),
                gpu_pools: HashMap::new(),
                terminal_groups: Vec::new(),
                create_failure: None,
                synchronous_cancel: true,
                log_lines: HashMap::new(),
            })),
        }
    }
}

impl FakeBackendDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Sets the containers `inspect_workload` will return for `run_id`.
    pub fn set_observations(&self, run_id: RunId, observations: Vec<ContainerObservation>) {
        self.inner.lock().workloads.entry(run_id).or_default().observations = observations;
    }

    pub fn set_container_state(&self, run_id: RunId, container_name: &str, state: ContainerState) {
        let mut inner = self.inner.lock();
        let workload = inner.workloads.entry(run_id).or_default();
        if let Some(observation) = workload.observations.iter_mut().find(|o| o.name == container_name) {
            observation.state = state;
        }
    }

    pub fn set_gpu_pool(&self, pool_name: &str, gpu_enabled: bool) {
        self.inner.lock().gpu_pools.insert(pool_name.to_string(), gpu_enabled);
    }

    pub fn push_terminal_group(&self, run_id: RunId) {
        self.inner.lock().terminal_groups.push(run_id);
    }

    pub fn is_removed(&self, run_id: RunId) -> bool {
        self.inner.lock().workloads.get(&run_id).map(|w| w.removed).unwrap_or(false)
    }

    pub fn is_canceled(&self, run_id: RunId) -> bool {
        self.inner.lock().workloads.get(&run_id).map(|w| w.canceled).unwrap_or(false)
    }

    /// Makes the next `create_workload` call fail fatally, for testing
    /// the sweeper's orphan-reclaim path.
    pub fn fail_next_create(&self, message: impl Into<String>) {
        self.inner.lock().create_failure = Some(message.into());
    }

    /// Scripts whether `cancel` reports synchronous completion (the
    /// local-engine backend's behavior) or async propagation (the
    /// cluster backend's). Defaults to synchronous.
    pub fn set_synchronous_cancel(&self, synchronous: bool) {
        self.inner.lock().synchronous_cancel = synchronous;
    }

    /// Scripts the raw byte lines `stream_logs` replays for `run_id`,
    /// regardless of which container name is requested.
    pub fn set_log_lines(&self, run_id: RunId, lines: Vec<&str>) {
        self.inner.lock().log_lines.insert(run_id, lines.into_iter().map(|l| l.as_bytes().to_vec()).collect());
    }
}

#[async_trait]
impl BackendDriver for FakeBackendDriver {
    async fn create_workload(&self, spec: WorkloadSpec) -> Result<WorkloadHandle, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::CreateWorkload { run_id: spec.run_id });
        if let Some(message) = inner.create_failure.take() {
            return Err(BackendError::Fatal(message));
        }
        let now = Utc::now();
        let mut observations = vec![ContainerObservation {
            name: format!("tyger-run-{}-main", spec.run_id),
            role: "main".to_string(),
            state: ContainerState::Running,
            started_at: Some(now),
            finished_at: None,
        }];
        for sidecar in &spec.sidecars {
            observations.push(ContainerObservation {
                name: format!("tyger-run-{}-{}", spec.run_id, sidecar.name),
                role: sidecar.name.clone(),
                state: ContainerState::Running,
                started_at: Some(now),
                finished_at: None,
            });
        }
        inner.workloads.entry(spec.run_id).or_default().observations = observations;
        Ok(WorkloadHandle { run_id: spec.run_id.get(), relay_ports: Default::default() })
    }

    async fn inspect_workload(&self, run_id: RunId) -> Result<Vec<ContainerObservation>, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::InspectWorkload { run_id });
        inner
            .workloads
            .get(&run_id)
            .map(|w| w.observations.clone())
            .ok_or(BackendError::NotFound(run_id))
    }

    async fn list_terminal_groups(&self) -> Result<Vec<RunId>, BackendError> {
        Ok(self.inner.lock().terminal_groups.clone())
    }

    async fn watch_by_label(
        &self,
        _run_id: RunId,
        _resource_version: Option<String>,
    ) -> Result<mpsc::Receiver<BackendEvent>, BackendError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn stream_logs(
        &self,
        run_id: RunId,
        _container_name: &str,
        _since: Option<DateTime<Utc>>,
        _follow: bool,
    ) -> Result<mpsc::Receiver<Result<Vec<u8>, BackendError>>, BackendError> {
        let lines = self.inner.lock().log_lines.get(&run_id).cloned().unwrap_or_default();
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            let _ = tx.try_send(Ok(line));
        }
        Ok(rx)
    }

    async fn remove_workload(&self, run_id: RunId) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::RemoveWorkload { run_id });
        inner.workloads.entry(run_id).or_default().removed = true;
        Ok(())
    }

    async fn check_gpu(&self, _cluster: Option<&str>, pool_name: Option<&str>) -> Result<bool, BackendError> {
        let pool = pool_name.unwrap_or_default();
        Ok(self.inner.lock().gpu_pools.get(pool).copied().unwrap_or(false))
    }

    async fn cancel(&self, run_id: RunId) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Cancel { run_id });
        inner.workloads.entry(run_id).or_default().canceled = true;
        Ok(inner.synchronous_cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_workload_records_call_and_seeds_main_container() {
        let fake = FakeBackendDriver::new();
        let spec = WorkloadSpec {
            run_id: RunId::new(1),
            cluster: None,
            node_pool: None,
            main: crate::driver::ContainerSpec {
                name: "main".to_string(),
                image: "busybox".to_string(),
                command: vec![],
                args: vec![],
                env: Default::default(),
                working_dir: None,
                mounts: vec![],
                ports: vec![],
                labels: Default::default(),
                gpu_request: 0,
            },
            sidecars: vec![],
            worker_replicas: vec![],
            shared_network: None,
            timeout_seconds: None,
            labels: Default::default(),
        };
        fake.create_workload(spec).await.unwrap();
        let observations = fake.inspect_workload(RunId::new(1)).await.unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].state, ContainerState::Running);
        assert!(matches!(fake.calls()[0], BackendCall::CreateWorkload { .. }));
    }

    #[tokio::test]
    async fn fail_next_create_surfaces_fatal_error_once() {
        let fake = FakeBackendDriver::new();
        fake.fail_next_create("boom");
        let spec = WorkloadSpec {
            run_id: RunId::new(2),
            cluster: None,
            node_pool: None,
            main: crate::driver::ContainerSpec {
                name: "main".to_string(),
                image: "busybox".to_string(),
                command: vec![],
                args: vec![],
                env: Default::default(),
                working_dir: None,
                mounts: vec![],
                ports: vec![],
                labels: Default::default(),
                gpu_request: 0,
            },
            sidecars: vec![],
            worker_replicas: vec![],
            shared_network: None,
            timeout_seconds: None,
            labels: Default::default(),
        };
        assert!(fake.create_workload(spec.clone()).await.is_err());
        assert!(fake.create_workload(spec).await.is_ok());
    }
}
