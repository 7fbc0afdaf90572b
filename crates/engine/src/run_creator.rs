// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RunCreator: validates a `NewRun`, resolves Codespecs, allocates
//! buffers, assembles the workload graph, and launches it (spec §4.1).

use crate::error::EngineError;
use crate::workload_graph::{self, ResolvedBuffer, WorkloadGraphInput};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use tyger_backend::{BackendDriver, BufferManager, RelayEndpoint, SigningService};
use tyger_core::{BufferDirection, BufferId, Clock, Codespec, CodespecRef, NewRun, NotFoundError, Run, ValidationError};
use tyger_storage::Repository;

/// Static description of one cluster and its node pools (spec §4.1 step
/// 2). In production this is sourced from cloud-infrastructure
/// provisioning, which is out of scope here (spec §1 non-goals) — the
/// engine only needs the resolved shape. GPU support itself is not
/// carried here: it is queried live from the `BackendDriver` (spec §9),
/// since a node pool's GPU capability is a backend fact, not topology.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub name: String,
    pub is_primary: bool,
    pub node_pools: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    clusters: Vec<ClusterInfo>,
}

impl ClusterTopology {
    pub fn new(clusters: Vec<ClusterInfo>) -> Self {
        Self { clusters }
    }

    fn find(&self, name: &str) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|c| c.name == name)
    }

    fn primary(&self) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|c| c.is_primary)
    }

    /// Resolves the named (or default primary) cluster and, if given,
    /// confirms a node pool exists on it (spec §4.1 step 2). GPU support
    /// is checked separately, against the live `BackendDriver`.
    pub fn resolve(&self, cluster: Option<&str>, node_pool: Option<&str>) -> Result<(String, Option<String>), ValidationError> {
        let cluster_info = match cluster {
            Some(name) => self.find(name).ok_or_else(|| ValidationError::UnknownCluster(name.to_string()))?,
            None => self.primary().ok_or_else(|| ValidationError::UnknownCluster("<none>".to_string()))?,
        };

        if let Some(pool) = node_pool {
            if !cluster_info.node_pools.iter().any(|p| p == pool) {
                return Err(ValidationError::UnknownNodePool(pool.to_string(), cluster_info.name.clone()));
            }
        }

        Ok((cluster_info.name.clone(), node_pool.map(|p| p.to_string())))
    }
}

pub struct RunCreator<R, B, C> {
    repository: Arc<R>,
    backend: Arc<B>,
    signing: Arc<SigningService>,
    topology: ClusterTopology,
    relay_endpoint: RelayEndpoint,
    clock: C,
}

impl<R, B, C> RunCreator<R, B, C>
where
    R: Repository,
    B: BackendDriver,
    C: Clock,
{
    pub fn new(
        repository: Arc<R>,
        backend: Arc<B>,
        signing: Arc<SigningService>,
        topology: ClusterTopology,
        relay_endpoint: RelayEndpoint,
        clock: C,
    ) -> Self {
        Self { repository, backend, signing, topology, relay_endpoint, clock }
    }

    async fn resolve_codespec(&self, codespec_ref: &str) -> Result<Codespec, EngineError> {
        match CodespecRef::parse(codespec_ref)? {
            CodespecRef::Latest(name) => self
                .repository
                .get_latest_codespec(&name)
                .await?
                .ok_or_else(|| NotFoundError::CodespecName(name.clone()).into()),
            CodespecRef::Exact(name, version) => {
                if let Some(codespec) = self.repository.get_codespec_at_version(&name, version).await? {
                    Ok(codespec)
                } else {
                    let latest = self.repository.get_latest_codespec(&name).await?;
                    match latest {
                        Some(latest) => {
                            Err(NotFoundError::CodespecVersion { name, requested: version, latest: latest.version }
                                .into())
                        }
                        None => Err(NotFoundError::CodespecName(name).into()),
                    }
                }
            }
        }
    }

    /// Checks provided buffer parameters against the codespec's declared
    /// shape (spec §4.1 step 1): every declared input/output must be
    /// bound, and no extra parameter may be supplied. Run before
    /// `Repository::create_run` so a bad buffer argument, like a bad GPU
    /// request, never orphans a Run row (spec §7/§8).
    fn validate_buffer_shape(codespec: &Codespec, provided: &HashMap<String, BufferId>) -> Result<(), EngineError> {
        for param in provided.keys() {
            if !codespec.buffers.contains(param) {
                return Err(ValidationError::ExtraBufferArgument(param.clone()).into());
            }
        }
        for param in codespec.buffers.inputs.iter().chain(codespec.buffers.outputs.iter()) {
            if !provided.contains_key(param) {
                return Err(ValidationError::MissingBufferParameter(param.clone()).into());
            }
        }
        Ok(())
    }

    /// Builds the resolved buffer map for a Job codespec (spec §4.1 step
    /// 3): rewrites ephemeral `temp-` ids and mints a signed access URL
    /// for each. Parameter shape is assumed already validated by
    /// [`Self::validate_buffer_shape`].
    fn resolve_buffers(
        &self,
        codespec: &Codespec,
        provided: &HashMap<String, BufferId>,
        run_id: tyger_core::RunId,
        prefer_tcp: bool,
    ) -> Result<(HashMap<String, BufferId>, HashMap<String, ResolvedBuffer>), EngineError> {
        let mut persisted = HashMap::new();
        let mut resolved = HashMap::new();
        let now = self.clock.now();

        for (param, buffer_id) in provided {
            let direction = if codespec.buffers.inputs.iter().any(|p| p == param) {
                BufferDirection::Input
            } else {
                BufferDirection::Output
            };

            let (materialized, access_url, is_ephemeral) = if buffer_id.is_ephemeral_request() {
                let materialized = buffer_id.materialize_ephemeral(run_id);
                let manager = BufferManager::new(&self.signing);
                let url = manager.sign_ephemeral_buffer_url(
                    &materialized,
                    direction,
                    &self.relay_endpoint,
                    prefer_tcp,
                    None,
                    now,
                )?;
                (materialized, url, true)
            } else {
                let manager = BufferManager::new(&self.signing);
                let url = manager.sign_persistent_buffer_url(
                    buffer_id,
                    direction,
                    &format!("https://tygerdata.blob.core.example/{buffer_id}"),
                    Some(Duration::minutes(60)),
                    now,
                )?;
                (buffer_id.clone(), url, false)
            };

            persisted.insert(param.clone(), materialized.clone());
            resolved.insert(param.clone(), ResolvedBuffer { buffer_id: materialized, access_url, is_ephemeral });
        }

        Ok((persisted, resolved))
    }

    #[instrument(skip(self, new_run), fields(component = "run_creator"))]
    pub async fn create(&self, mut new_run: NewRun) -> Result<Run, EngineError> {
        if new_run.job.replicas < 1 {
            return Err(ValidationError::InvalidReplicaCount(new_run.job.replicas).into());
        }

        let codespec = self.resolve_codespec(&new_run.job.codespec_ref).await?;
        let worker_codespec = match &new_run.worker {
            Some(worker) => Some(self.resolve_codespec(&worker.codespec_ref).await?),
            None => None,
        };

        Self::validate_buffer_shape(&codespec, &new_run.job.buffers)?;

        let (cluster, node_pool) = self.topology.resolve(new_run.cluster.as_deref(), new_run.job.node_pool.as_deref())?;
        new_run.job.node_pool = node_pool.clone();

        if codespec.resources.gpu > 0 {
            if let Some(pool) = node_pool.as_deref() {
                let gpu_capable = self.backend.check_gpu(Some(&cluster), Some(pool)).await?;
                if !gpu_capable {
                    return Err(ValidationError::GpuMismatch { pool: pool.to_string(), requested: codespec.resources.gpu }.into());
                }
            }
        }

        let mut run = self.repository.create_run(new_run.clone()).await?;

        let (persisted_buffers, resolved_buffers) =
            self.resolve_buffers(&codespec, &new_run.job.buffers, run.id, new_run.job.prefer_tcp_buffers)?;
        self.repository.set_run_buffers(run.id, persisted_buffers.clone()).await?;
        new_run.job.buffers = persisted_buffers.clone();
        run.job.buffers = persisted_buffers;

        let worker_dns_names: Vec<String> = match &new_run.worker {
            Some(worker) => (0..worker.replicas)
                .map(|i| format!("tyger-run-{}-worker-{}.tyger-run-{}.internal", run.id, i, run.id))
                .collect(),
            None => vec![],
        };

        let workload = workload_graph::assemble(WorkloadGraphInput {
            run_id: run.id,
            codespec: &codespec,
            job: &new_run.job,
            worker: new_run.worker.as_ref(),
            worker_codespec: worker_codespec.as_ref(),
            cluster: Some(cluster),
            resolved_buffers: &resolved_buffers,
            worker_dns_names,
            timeout_seconds: new_run.timeout_seconds,
        });

        match self.backend.create_workload(workload).await {
            Ok(_) => {
                self.repository.update_run(run.id, Some(true), None, None, None).await?;
                info!(run = run.id.get(), "run resources created");
            }
            Err(err) => {
                // Step 5 failure (spec §4.1): leave resources_created=false.
                // RunSweeper's orphan drain will reconcile it.
                return Err(err.into());
            }
        }

        Ok(run)
    }
}

#[cfg(test)]
#[path = "run_creator_tests.rs"]
mod tests;
