// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved configuration for the server binary (spec §10.3: reading
//! already-resolved values from the environment, not parsing a config
//! file — configuration-file parsing is out of scope per spec §1).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no state directory: set TYGER_STATE_DIR, XDG_STATE_HOME, or HOME")]
    NoStateDir,
    #[error("TYGER_BACKEND must be \"local\" or \"cluster\", got {0:?}")]
    UnknownBackend(String),
    #[error("TYGER_CLUSTER_API_URL is required when TYGER_BACKEND=cluster")]
    MissingClusterUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Cluster,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub state_dir: PathBuf,
    pub backend: BackendKind,
    pub cluster_api_url: Option<String>,
    pub local_engine_binary: String,
    pub sweep_interval: Duration,
    pub signing_key_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Resolves configuration from the environment: `TYGER_STATE_DIR` >
    /// `XDG_STATE_HOME/tyger` > `$HOME/.local/state/tyger`, mirroring this
    /// codebase's existing `state_dir` resolution order.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;

        let backend = match std::env::var("TYGER_BACKEND").as_deref() {
            Ok("cluster") => BackendKind::Cluster,
            Ok("local") | Err(_) => BackendKind::Local,
            Ok(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let cluster_api_url = std::env::var("TYGER_CLUSTER_API_URL").ok();
        if backend == BackendKind::Cluster && cluster_api_url.is_none() {
            return Err(ConfigError::MissingClusterUrl);
        }

        let local_engine_binary = std::env::var("TYGER_ENGINE_BINARY").unwrap_or_else(|_| "docker".to_string());

        let sweep_interval = std::env::var("TYGER_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let signing_key_path = std::env::var("TYGER_SIGNING_KEY_PATH").ok().map(PathBuf::from);

        Ok(Self { state_dir, backend, cluster_api_url, local_engine_binary, sweep_interval, signing_key_path })
    }
}

fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("TYGER_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("tyger"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/tyger"))
}
