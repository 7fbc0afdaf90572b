// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles the engine components from a [`ServerConfig`]: the
//! Repository, the chosen `BackendDriver`, the `SigningService`, and the
//! `RunSweeper` (spec §10.1/§10.5 composition root).

use crate::config::{BackendKind, ServerConfig};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use std::sync::Arc;
use thiserror::Error;
use tyger_backend::{ClusterBackendDriver, LocalEngineBackendDriver, RelayEndpoint, SigningService};
use tyger_core::SystemClock;
use tyger_engine::{InMemoryLogArchive, RunReader, RunSweeper, RunUpdater, SweepConfig};
use tyger_storage::InMemoryRepository;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to create state directory {path}: {source}")]
    StateDir { path: String, source: std::io::Error },
    #[error("failed to read signing key {path}: {source}")]
    ReadSigningKey { path: String, source: std::io::Error },
    #[error("malformed signing key {path}: {source}")]
    MalformedSigningKey { path: String, source: rsa::pkcs1::Error },
    #[error("failed to generate an ephemeral signing key: {0}")]
    GenerateSigningKey(rsa::Error),
    #[error("TYGER_CLUSTER_API_URL is required when TYGER_BACKEND=cluster")]
    MissingClusterUrl,
}

/// Every engine-facing component, generic over the concrete
/// `BackendDriver` chosen at startup (spec §9: no shared base state
/// between backend variants, so the server binds to one concrete type
/// for the lifetime of the process rather than boxing a trait object).
pub struct Runtime<B> {
    pub repository: Arc<InMemoryRepository<SystemClock>>,
    pub backend: Arc<B>,
    pub signing: Arc<SigningService>,
    pub reader: RunReader<InMemoryRepository<SystemClock>, B>,
    pub updater: RunUpdater<InMemoryRepository<SystemClock>, B>,
    pub sweeper: RunSweeper<InMemoryRepository<SystemClock>, B, InMemoryLogArchive, SystemClock>,
}

/// Loads a PEM-encoded PKCS#1 RSA private key from disk (spec §4.6
/// "loads the primary... public signing keys"), or mints a fresh
/// in-process keypair when no path is configured — acceptable for local
/// development since key rotation is already modeled as a process
/// restart (spec §5), not a live reload.
fn load_or_generate_signing_key(path: Option<&std::path::Path>) -> Result<RsaPrivateKey, StartupError> {
    match path {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .map_err(|source| StartupError::ReadSigningKey { path: path.display().to_string(), source })?;
            RsaPrivateKey::from_pkcs1_pem(&pem)
                .map_err(|source| StartupError::MalformedSigningKey { path: path.display().to_string(), source })
        }
        None => {
            tracing::warn!("TYGER_SIGNING_KEY_PATH not set, generating an ephemeral signing key for this process");
            let mut rng = rsa::rand_core::OsRng;
            RsaPrivateKey::new(&mut rng, 2048).map_err(StartupError::GenerateSigningKey)
        }
    }
}

/// Builds every component the server composition root needs, per
/// `config.backend`. RunCreator is intentionally not constructed here:
/// it additionally needs a `ClusterTopology`, which is sourced from
/// cloud-infrastructure provisioning (out of scope, spec §1) and left
/// to the caller (an HTTP adapter, also out of scope) to supply from its
/// own topology source.
pub fn build(config: &ServerConfig) -> Result<RuntimeKind, StartupError> {
    std::fs::create_dir_all(&config.state_dir)
        .map_err(|source| StartupError::StateDir { path: config.state_dir.display().to_string(), source })?;

    let signing_key = load_or_generate_signing_key(config.signing_key_path.as_deref())?;
    let signing = Arc::new(SigningService::new(signing_key, None));

    let repository = Arc::new(InMemoryRepository::new(SystemClock));
    let log_archive = Arc::new(InMemoryLogArchive::default());

    match config.backend {
        BackendKind::Local => {
            let backend = Arc::new(LocalEngineBackendDriver::new(config.local_engine_binary.clone()));
            let reader = RunReader::new(repository.clone(), backend.clone());
            let updater = RunUpdater::new(repository.clone(), backend.clone());
            let sweeper = RunSweeper::new(
                repository.clone(),
                backend.clone(),
                log_archive,
                SweepConfig { interval: config.sweep_interval, ..SweepConfig::default() },
                SystemClock,
            );
            Ok(RuntimeKind::Local(Runtime { repository, backend, signing, reader, updater, sweeper }))
        }
        BackendKind::Cluster => {
            let url = config.cluster_api_url.clone().ok_or(StartupError::MissingClusterUrl)?;
            let backend = Arc::new(ClusterBackendDriver::new(reqwest::Client::new(), url));
            let reader = RunReader::new(repository.clone(), backend.clone());
            let updater = RunUpdater::new(repository.clone(), backend.clone());
            let sweeper = RunSweeper::new(
                repository.clone(),
                backend.clone(),
                log_archive,
                SweepConfig { interval: config.sweep_interval, ..SweepConfig::default() },
                SystemClock,
            );
            Ok(RuntimeKind::Cluster(Runtime { repository, backend, signing, reader, updater, sweeper }))
        }
    }
}

/// Which concrete `BackendDriver` this process bound to (spec §9).
pub enum RuntimeKind {
    Local(Runtime<LocalEngineBackendDriver>),
    Cluster(Runtime<ClusterBackendDriver>),
}

pub fn default_relay_endpoint(config: &ServerConfig) -> RelayEndpoint {
    RelayEndpoint {
        socket_path: config.state_dir.join("data-plane").join("relay.sock").display().to_string(),
        host: "127.0.0.1".to_string(),
        port: 8080,
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
