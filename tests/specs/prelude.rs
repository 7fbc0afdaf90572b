//! Test helpers for end-to-end behavioral specifications.
//!
//! Provides a harness that wires `RunCreator`/`RunReader`/`RunUpdater`/
//! `RunSweeper` against an `InMemoryRepository` and a `FakeBackendDriver`,
//! the same components `tyger-server::startup` assembles for a real
//! process.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use std::collections::HashMap;
use std::sync::Arc;
use tyger_backend::{FakeBackendDriver, RelayEndpoint, SigningService};
use tyger_core::{BufferParameters, Codespec, CodespecKind, FakeClock, JobTarget, NewRun, Resources};
use tyger_engine::run_creator::{ClusterInfo, ClusterTopology};
use tyger_engine::{InMemoryLogArchive, RunCreator, RunReader, RunSweeper, RunUpdater, SweepConfig};
use tyger_storage::{InMemoryRepository, Repository};

pub type Repo = InMemoryRepository<FakeClock>;

pub struct Harness {
    pub clock: FakeClock,
    pub repository: Arc<Repo>,
    pub backend: Arc<FakeBackendDriver>,
    pub archive: Arc<InMemoryLogArchive>,
    pub creator: RunCreator<Repo, FakeBackendDriver, FakeClock>,
    pub reader: RunReader<Repo, FakeBackendDriver>,
    pub updater: RunUpdater<Repo, FakeBackendDriver>,
    pub sweeper: RunSweeper<Repo, FakeBackendDriver, InMemoryLogArchive, FakeClock>,
}

pub fn signing_service() -> Arc<SigningService> {
    let mut rng = OsRng;
    let key = RsaPrivateKey::new(&mut rng, 2048).expect("generate test signing key");
    Arc::new(SigningService::new(key, None))
}

/// A single primary cluster with one GPU-labeled pool and one CPU-only
/// pool, matching the node pools named in spec §8's scenarios. Whether
/// "gpunp" actually reports GPU-capable is a `BackendDriver::check_gpu`
/// fact, set on the harness's `FakeBackendDriver` via `set_gpu_pool`.
pub fn single_cluster_topology() -> ClusterTopology {
    ClusterTopology::new(vec![ClusterInfo {
        name: "primary".to_string(),
        is_primary: true,
        node_pools: vec!["cpunp".to_string(), "gpunp".to_string()],
    }])
}

pub fn relay_endpoint() -> RelayEndpoint {
    RelayEndpoint { socket_path: "/run/tyger/relay.sock".to_string(), host: "127.0.0.1".to_string(), port: 9876 }
}

pub fn harness() -> Harness {
    harness_at("2026-01-01T00:00:00Z")
}

pub fn harness_at(start: &str) -> Harness {
    let clock = FakeClock::new(start.parse().expect("valid RFC3339 instant"));
    let repository = Arc::new(InMemoryRepository::new(clock.clone()));
    let backend = Arc::new(FakeBackendDriver::new());
    backend.set_gpu_pool("gpunp", true);
    let archive = Arc::new(InMemoryLogArchive::default());
    let signing = signing_service();

    let creator = RunCreator::new(
        repository.clone(),
        backend.clone(),
        signing.clone(),
        single_cluster_topology(),
        relay_endpoint(),
        clock.clone(),
    );
    let reader = RunReader::new(repository.clone(), backend.clone());
    let updater = RunUpdater::new(repository.clone(), backend.clone());
    let sweeper = RunSweeper::new(
        repository.clone(),
        backend.clone(),
        archive.clone(),
        SweepConfig {
            interval: std::time::Duration::from_millis(10),
            orphan_grace: chrono::Duration::zero(),
            min_archive_lag_before_delete: chrono::Duration::zero(),
        },
        clock.clone(),
    );

    Harness { clock, repository, backend, archive, creator, reader, updater, sweeper }
}

/// Inserts a Job-kind codespec at version 1 with the given GPU request
/// and buffer parameter declarations.
pub async fn put_job_codespec(repository: &Repo, name: &str, gpu: u32, buffers: BufferParameters) {
    repository
        .put_codespec(Codespec {
            name: name.to_string(),
            version: 1,
            kind: CodespecKind::Job,
            image: "busybox".to_string(),
            command: vec!["echo".to_string(), "hi".to_string()],
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            resources: Resources { cpu: None, memory: None, gpu },
            buffers,
            sockets: vec![],
        })
        .await
        .expect("insert codespec");
}

pub fn new_run(codespec_ref: &str, node_pool: Option<&str>) -> NewRun {
    NewRun {
        job: JobTarget {
            codespec_ref: codespec_ref.to_string(),
            replicas: 1,
            node_pool: node_pool.map(str::to_string),
            buffers: HashMap::new(),
            tags: HashMap::new(),
            prefer_tcp_buffers: false,
        },
        worker: None,
        cluster: None,
        tags: HashMap::new(),
        timeout_seconds: None,
    }
}
