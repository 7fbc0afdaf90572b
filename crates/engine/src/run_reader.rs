// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RunReader: `GetRun`/`WatchRun` over the Repository plus live backend
//! observation (spec §4.2).

use crate::error::EngineError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::instrument;
use tyger_backend::{BackendDriver, BackendError, ContainerState};
use tyger_core::{CodespecRef, Run, RunId, RunStatus};
use tyger_storage::{Repository, RunRecord};

/// A Run with its Repository bookkeeping, returned by `GetRun` (spec §6:
/// `(run, modifiedAt, logsArchivedAt, final, tagsVersion)`).
pub struct AugmentedRun {
    pub run: Run,
    pub record: RunRecord,
}

pub struct RunReader<R, B> {
    repository: Arc<R>,
    backend: Arc<B>,
}

impl<R, B> RunReader<R, B>
where
    R: Repository,
    B: BackendDriver,
{
    pub fn new(repository: Arc<R>, backend: Arc<B>) -> Self {
        Self { repository, backend }
    }

    /// Container count the workload graph expects for this Run's job
    /// (spec §4.2 rule 2): main + one sidecar per buffer param + one
    /// sidecar per declared socket. Falls back to buffers-only (no
    /// socket term) if the codespec can't be resolved, since a Run
    /// whose codespec has vanished can still be observed, just with a
    /// less precise expected count.
    async fn expected_container_count(&self, record: &RunRecord) -> usize {
        let buffers = record.run.job.buffers.len();
        let sockets = match CodespecRef::parse(&record.run.job.codespec_ref) {
            Ok(CodespecRef::Latest(name)) => {
                self.repository.get_latest_codespec(&name).await.ok().flatten().map(|c| c.sockets.len())
            }
            Ok(CodespecRef::Exact(name, version)) => self
                .repository
                .get_codespec_at_version(&name, version)
                .await
                .ok()
                .flatten()
                .map(|c| c.sockets.len()),
            Err(_) => None,
        }
        .unwrap_or(0);
        1 + buffers + sockets
    }

    #[instrument(skip(self), fields(component = "run_reader", run = id.get()))]
    pub async fn get_run(&self, id: RunId) -> Result<Option<AugmentedRun>, EngineError> {
        let Some(record) = self.repository.get_run(id).await? else {
            return Ok(None);
        };

        if record.is_final() {
            return Ok(Some(AugmentedRun { run: record.run.clone(), record }));
        }

        let observations = match self.backend.inspect_workload(id).await {
            Ok(observations) => observations,
            Err(BackendError::NotFound(_)) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let expected = self.expected_container_count(&record).await;
        let run = augment(record.run.clone(), &observations, expected);
        Ok(Some(AugmentedRun { run, record }))
    }

    /// Yields the current Run, then the Run again each time `get_run`
    /// produces a different value, reconnecting the backend watch with
    /// capped backoff on transient disconnects (spec §4.2). Closes once
    /// the Run reaches a terminal status.
    #[instrument(skip(self), fields(component = "run_reader", run = id.get()))]
    pub async fn watch_run(&self, id: RunId) -> Result<mpsc::Receiver<Run>, EngineError> {
        let (tx, rx) = mpsc::channel(8);
        let Some(first) = self.get_run(id).await? else {
            return Ok(rx);
        };
        if tx.send(first.run.clone()).await.is_err() {
            return Ok(rx);
        }
        if first.run.status.is_terminal() {
            return Ok(rx);
        }

        let repository = self.repository.clone();
        let backend = self.backend.clone();
        let mut last = first.run;
        tokio::spawn(async move {
            let reader = RunReader { repository, backend: backend.clone() };
            // `watch_by_label` hides transient reconnects behind capped
            // backoff internally (spec §4.2); the channel here only
            // closes once that budget is exhausted or the subscription
            // is permanently abandoned.
            let mut events = match backend.watch_by_label(id, None).await {
                Ok(events) => events,
                Err(_) => return,
            };

            while let Some(_event) = events.recv().await {
                match reader.get_run(id).await {
                    Ok(Some(augmented)) => {
                        if augmented.run != last {
                            last = augmented.run.clone();
                            if tx.send(augmented.run).await.is_err() {
                                return;
                            }
                        }
                        if last.status.is_terminal() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(_) => continue,
                }
            }
        });

        Ok(rx)
    }
}

/// Applies the ordered augmentation rules (spec §4.2) against live
/// backend observations. `stored` is never mutated in place so the
/// Repository's own record stays the source of truth for everything
/// this function doesn't derive.
fn augment(mut run: Run, observations: &[tyger_backend::ContainerObservation], expected: usize) -> Run {
    if matches!(run.status, RunStatus::Canceled | RunStatus::Canceling) {
        return run;
    }

    if observations.len() != expected {
        run.status = RunStatus::Failed;
        return run;
    }

    let exited: Vec<_> = observations
        .iter()
        .filter_map(|o| match o.state {
            ContainerState::Exited { exit_code } => Some((o, exit_code)),
            _ => None,
        })
        .collect();

    if exited.iter().any(|(_, code)| *code != 0) {
        run.status = RunStatus::Failed;
        run.finished_at = latest_finish(&exited);
        return run;
    }

    if exited.len() == observations.len() {
        run.status = RunStatus::Succeeded;
        run.finished_at = latest_finish(&exited);
        return run;
    }

    let main = observations.iter().find(|o| o.role == "main");
    let main_still_running = matches!(main, Some(o) if matches!(o.state, ContainerState::Running));
    let sidecars_all_exited_cleanly = observations
        .iter()
        .filter(|o| o.role != "main")
        .all(|o| matches!(o.state, ContainerState::Exited { exit_code: 0 }));
    if main_still_running && sidecars_all_exited_cleanly && observations.len() > 1 {
        run.status = RunStatus::Succeeded;
        run.finished_at = latest_finish(&exited);
        return run;
    }

    if observations.iter().any(|o| matches!(o.state, ContainerState::Running)) {
        run.status = RunStatus::Running;
        if let Some(main) = main {
            run.started_at = run.started_at.or(main.started_at);
        }
        return run;
    }

    run.status = RunStatus::Failed;
    run
}

fn latest_finish(exited: &[(&tyger_backend::ContainerObservation, i32)]) -> Option<chrono::DateTime<chrono::Utc>> {
    exited.iter().filter_map(|(o, _)| o.finished_at).max()
}

#[cfg(test)]
#[path = "run_reader_tests.rs"]
mod tests;
