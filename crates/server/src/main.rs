// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tyger-server: the long-running process that hosts the RunSweeper
//! reconciliation loop against a chosen backend (spec §4.3, §10.1,
//! §10.5). Serving the Run CRUD surface itself is an HTTP-adapter
//! concern outside this core (spec §6).

use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tyger_server::config::ServerConfig;
use tyger_server::startup::{self, RuntimeKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("TYGER_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::load()?;
    info!(state_dir = %config.state_dir.display(), backend = ?config.backend, "starting tyger-server");

    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone());

    match startup::build(&config)? {
        RuntimeKind::Local(runtime) => run(runtime.sweeper, shutdown).await,
        RuntimeKind::Cluster(runtime) => run(runtime.sweeper, shutdown).await,
    }

    info!("tyger-server shut down cleanly");
    Ok(())
}

/// Runs one reconciliation pass immediately (spec §10.5: a restart
/// shouldn't wait a full 30s interval to re-establish invariants I2/I3),
/// then hands off to the sweeper's own ticking loop until shutdown.
async fn run<R, B, A, C>(sweeper: tyger_engine::RunSweeper<R, B, A, C>, shutdown: CancellationToken)
where
    R: tyger_storage::Repository,
    B: tyger_backend::BackendDriver,
    A: tyger_engine::LogArchive,
    C: tyger_core::Clock,
{
    sweeper.sweep_once().await;
    sweeper.run(shutdown).await;
}

fn spawn_signal_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutdown signal received, draining sweeper");
        shutdown.cancel();
        // Give the in-flight cycle a moment to finish its current Run
        // before the process exits out from under it.
        tokio::time::sleep(Duration::from_millis(50)).await;
    });
}
