// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RunUpdater: `CancelRun` (spec §4.4).

use crate::error::EngineError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use tyger_backend::BackendDriver;
use tyger_core::{NotFoundError, Run, RunStatus};
use tyger_storage::Repository;

pub struct RunUpdater<R, B> {
    repository: Arc<R>,
    backend: Arc<B>,
}

impl<R, B> RunUpdater<R, B>
where
    R: Repository,
    B: BackendDriver,
{
    pub fn new(repository: Arc<R>, backend: Arc<B>) -> Self {
        Self { repository, backend }
    }

    /// Moves a Run toward cancellation (spec §4.4). A no-op on a Run
    /// that is already final or already in a terminal/canceling status.
    #[instrument(skip(self), fields(component = "run_updater", run = id.get()))]
    pub async fn cancel_run(&self, id: tyger_core::RunId) -> Result<Run, EngineError> {
        let record = self.repository.get_run(id).await?.ok_or(NotFoundError::Run(id))?;

        if record.is_final()
            || matches!(
                record.run.status,
                RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceling | RunStatus::Canceled
            )
        {
            return Ok(record.run);
        }

        let completed_synchronously = match self.backend.cancel(id).await {
            Ok(completed) => completed,
            Err(err) => {
                warn!(run = id.get(), error = %err, "backend cancel failed");
                false
            }
        };

        // `Canceling` is reachable from both `Pending` and `Running`
        // (spec I1); go through it even when the local backend already
        // finished the kill synchronously, then step to `Canceled`.
        self.repository.update_run(id, None, None, None, Some((RunStatus::Canceling, None))).await?;
        let mut run = record.run;
        run.status = RunStatus::Canceling;

        if completed_synchronously {
            self.repository.update_run(id, None, None, None, Some((RunStatus::Canceled, None))).await?;
            run.status = RunStatus::Canceled;
        }

        info!(run = id.get(), status = ?run.status, "run cancellation requested");
        Ok(run)
    }
}

#[cfg(test)]
#[path = "run_updater_tests.rs"]
mod tests;
