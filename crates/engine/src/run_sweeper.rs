// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RunSweeper: the 30s background reconciliation loop (spec §4.3).

use crate::log_pipeline::{LogArchive, LogLine};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use tyger_backend::BackendDriver;
use tyger_core::{Clock, RunId};
use tyger_storage::Repository;

/// Tunables for a sweep cycle (spec §4.3: 30 s cadence, 30 s archive-to-
/// delete lag). Exposed as fields rather than constants so tests can run
/// a cycle without waiting on real wall-clock windows.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    pub orphan_grace: ChronoDuration,
    pub min_archive_lag_before_delete: ChronoDuration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            orphan_grace: ChronoDuration::minutes(5),
            min_archive_lag_before_delete: ChronoDuration::seconds(30),
        }
    }
}

pub struct RunSweeper<R, B, A, C> {
    repository: Arc<R>,
    backend: Arc<B>,
    log_archive: Arc<A>,
    config: SweepConfig,
    clock: C,
}

impl<R, B, A, C> RunSweeper<R, B, A, C>
where
    R: Repository,
    B: BackendDriver,
    A: LogArchive,
    C: Clock,
{
    pub fn new(repository: Arc<R>, backend: Arc<B>, log_archive: Arc<A>, config: SweepConfig, clock: C) -> Self {
        Self { repository, backend, log_archive, config, clock }
    }

    /// Runs sweep cycles on `config.interval` until `shutdown` fires.
    /// Each cycle is independently committed per Run (spec §5: "Cancellation
    /// semantics... leaves the Repository consistent"), so an interruption
    /// mid-cycle just resumes cleanly on the next tick.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => self.sweep_once().await,
            }
        }
    }

    /// Runs exactly one sweep cycle: orphan drain, then terminal-group
    /// reconciliation (spec §4.3 steps 1-2).
    #[instrument(skip(self), fields(component = "run_sweeper"))]
    pub async fn sweep_once(&self) {
        self.drain_orphans().await;
        self.reconcile_terminal_groups().await;
    }

    async fn drain_orphans(&self) {
        let orphans = match self.repository.get_page_of_runs_where_resources_not_created().await {
            Ok(runs) => runs,
            Err(err) => {
                warn!(error = %err, "failed to page orphan runs");
                return;
            }
        };

        let now = self.clock.now();
        for run in orphans {
            if now - run.created_at < self.config.orphan_grace {
                continue;
            }
            if let Err(err) = self.backend.remove_workload(run.id).await {
                warn!(run = run.id.get(), error = %err, "orphan backend cleanup failed, continuing");
            }
            if let Err(err) = self.repository.delete_run(run.id).await {
                warn!(run = run.id.get(), error = %err, "orphan run record deletion failed");
                continue;
            }
            info!(run = run.id.get(), "drained orphan run");
        }
    }

    async fn reconcile_terminal_groups(&self) {
        let groups = match self.backend.list_terminal_groups().await {
            Ok(groups) => groups,
            Err(err) => {
                warn!(error = %err, "failed to list terminal backend groups");
                return;
            }
        };

        let now = self.clock.now();
        for run_id in groups {
            if let Err(err) = self.reconcile_one(run_id, now).await {
                warn!(run = run_id.get(), error = %err, "terminal group reconciliation failed, continuing");
            }
        }
    }

    /// One Run's share of step 2 (spec §4.3). A failure here is logged by
    /// the caller and never blocks the rest of the cycle.
    async fn reconcile_one(&self, run_id: RunId, now: DateTime<Utc>) -> Result<(), String> {
        let Some(record) = self.repository.get_run(run_id).await.map_err(|e| e.to_string())? else {
            return self.backend.remove_workload(run_id).await.map_err(|e| e.to_string());
        };

        if !record.run.status.is_terminal() {
            return Ok(());
        }

        if record.logs_archived_at.is_none() {
            let lines = self.collect_logs(run_id).await?;
            self.log_archive.archive(run_id, lines).await.map_err(|e| e.to_string())?;
            self.repository
                .update_run(run_id, None, Some(now), None, None)
                .await
                .map_err(|e| e.to_string())?;
            return Ok(());
        }

        let Some(archived_at) = record.logs_archived_at else {
            return Ok(());
        };
        if now - archived_at >= self.config.min_archive_lag_before_delete {
            self.backend.remove_workload(run_id).await.map_err(|e| e.to_string())?;
            self.repository
                .update_run(run_id, None, None, Some(true), None)
                .await
                .map_err(|e| e.to_string())?;
            info!(run = run_id.get(), "finalized terminal run");
        }

        Ok(())
    }

    /// Fetches and merges every container's logs for a terminal Run before
    /// it is archived. A terminal Run's containers have already exited, so
    /// this reads each stream to completion rather than following.
    async fn collect_logs(&self, run_id: RunId) -> Result<Vec<LogLine>, String> {
        let observations = match self.backend.inspect_workload(run_id).await {
            Ok(observations) => observations,
            Err(tyger_backend::BackendError::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.to_string()),
        };

        let mut sources = Vec::with_capacity(observations.len());
        for observation in &observations {
            let label = (observation.role != "main").then(|| format!("[{}]", observation.role));
            let receiver = self
                .backend
                .stream_logs(run_id, &observation.name, None, false)
                .await
                .map_err(|e| e.to_string())?;
            sources.push(crate::log_pipeline::LogSource::new(label, receiver));
        }

        crate::log_pipeline::FixedLogMerger::merge(sources, &crate::log_pipeline::LogOptions::default())
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
#[path = "run_sweeper_tests.rs"]
mod tests;
