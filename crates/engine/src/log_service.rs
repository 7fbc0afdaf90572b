// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LogService: `GetLogs` (spec §4.5). Dispatches terminal, archived Runs
//! to the `LogArchive`; otherwise enumerates the Run's live containers
//! through the `BackendDriver` and merges their streams, Fixed or Live
//! depending on `opts.follow`.

use crate::error::EngineError;
use crate::log_pipeline::{split_timestamp, FixedLogMerger, LiveLogMerger, LogArchive, LogLine, LogOptions, LogSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{instrument, warn};
use tyger_backend::{BackendDriver, BackendError, Backoff, ContainerState};
use tyger_core::{NotFoundError, RunId};
use tyger_storage::Repository;

/// Maximum reconnect attempts for one container's follow-mode log stream
/// before giving up (mirrors the cluster driver's watch reconnect cap).
const MAX_LOG_RECONNECTS: u32 = 20;

/// What `get_logs` returns: a complete buffer for a read-to-end request,
/// or a channel of lines as they arrive for a follow request.
#[derive(Debug)]
pub enum LogOutput {
    Fixed(Vec<LogLine>),
    Live(mpsc::Receiver<LogLine>),
}

pub struct LogService<R, B, A> {
    repository: Arc<R>,
    backend: Arc<B>,
    archive: Arc<A>,
}

impl<R, B, A> LogService<R, B, A>
where
    R: Repository,
    B: BackendDriver,
    A: LogArchive,
{
    pub fn new(repository: Arc<R>, backend: Arc<B>, archive: Arc<A>) -> Self {
        Self { repository, backend, archive }
    }

    /// Serves `GetLogs` (spec §4.5): archived logs for a Run whose
    /// `logsArchivedAt` is set, otherwise a live merge across every
    /// container the backend currently reports for the Run.
    #[instrument(skip(self, opts), fields(component = "log_service", run = run_id.get()))]
    pub async fn get_logs(&self, run_id: RunId, opts: LogOptions) -> Result<LogOutput, EngineError> {
        let record = self.repository.get_run(run_id).await?.ok_or(NotFoundError::Run(run_id))?;

        if record.logs_archived_at.is_some() {
            let mut lines = self.archive.fetch(run_id).await?;
            if let Some(tail) = opts.tail_lines {
                let start = lines.len().saturating_sub(tail);
                lines = lines.split_off(start);
            }
            return Ok(LogOutput::Fixed(lines));
        }

        let observations = self.backend.inspect_workload(run_id).await?;
        // A single bare main container gets no role prefix (spec §4.5);
        // anything with sidecars or worker replicas does.
        let unlabeled = observations.len() <= 1;

        if opts.follow {
            let mut merger = LiveLogMerger::new(opts.clone());
            let Some(rx) = merger.take_receiver() else {
                return Err(BackendError::Fatal("log merger receiver unavailable".to_string()).into());
            };
            for observation in &observations {
                let label = (!unlabeled).then(|| format!("[{}]", observation.role));
                let receiver =
                    spawn_reconnecting_log_stream(self.backend.clone(), run_id, observation.role.clone(), opts.since);
                merger.add_source(LogSource::new(label, receiver));
            }
            let main_exited = observations
                .iter()
                .find(|o| o.role == "main")
                .is_some_and(|main| matches!(main.state, ContainerState::Exited { .. }));
            if main_exited {
                merger.signal_complete();
            }
            return Ok(LogOutput::Live(rx));
        }

        let mut sources = Vec::with_capacity(observations.len());
        for observation in &observations {
            let label = (!unlabeled).then(|| format!("[{}]", observation.role));
            let receiver = self.backend.stream_logs(run_id, &observation.role, opts.since, false).await?;
            sources.push(LogSource::new(label, receiver));
        }
        let lines = FixedLogMerger::merge(sources, &opts).await?;
        Ok(LogOutput::Fixed(lines))
    }
}

/// Parses the leading RFC3339 token off a raw log chunk, if present, so
/// a reconnect can resume with `since=<last seen timestamp>` instead of
/// replaying the whole container's history (spec §4.5).
fn leading_timestamp(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_end_matches(['\n', '\r']);
    let (ts, rest) = split_timestamp(trimmed);
    (rest != trimmed).then_some(ts)
}

/// Wraps one container's `stream_logs` in a reconnect loop: on
/// disconnect or error, waits out a capped exponential backoff and
/// refetches with `since` advanced to the last line actually seen,
/// giving up after [`MAX_LOG_RECONNECTS`] consecutive failures.
fn spawn_reconnecting_log_stream<B: BackendDriver>(
    backend: Arc<B>,
    run_id: RunId,
    container_name: String,
    since: Option<DateTime<Utc>>,
) -> mpsc::Receiver<Result<Vec<u8>, BackendError>> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut since = since;
        let mut backoff = Backoff::default();
        let mut attempts = 0u32;

        'reconnect: loop {
            let mut upstream = match backend.stream_logs(run_id, &container_name, since, true).await {
                Ok(upstream) => {
                    backoff.reset();
                    attempts = 0;
                    upstream
                }
                Err(err) => {
                    attempts += 1;
                    if attempts > MAX_LOG_RECONNECTS {
                        warn!(run = run_id.get(), container = %container_name, "giving up on log stream after max reconnect attempts");
                        let _ = tx.send(Err(err)).await;
                        break 'reconnect;
                    }
                    tokio::time::sleep(backoff.next_delay()).await;
                    continue 'reconnect;
                }
            };

            loop {
                match upstream.recv().await {
                    Some(Ok(bytes)) => {
                        if let Some(ts) = leading_timestamp(&bytes) {
                            since = Some(ts);
                        }
                        if tx.send(Ok(bytes)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }

            attempts += 1;
            if attempts > MAX_LOG_RECONNECTS {
                warn!(run = run_id.get(), container = %container_name, "giving up on log stream after max reconnect attempts");
                break 'reconnect;
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    });
    rx
}

#[cfg(test)]
#[path = "log_service_tests.rs"]
mod tests;
