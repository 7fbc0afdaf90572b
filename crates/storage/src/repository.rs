// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Repository contract (spec §6) and an in-process reference
//! implementation.

use crate::record::{CodespecStore, GetRunsQuery, RunRecord};
use crate::tags::TagChangeSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tyger_core::{Clock, Codespec, Event, NewRun, NotFoundError, Run, RunChangeKind, RunId, RunStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error("run {0} already final, cannot update")]
    AlreadyFinal(RunId),
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}

/// The durable Run/Codespec/Buffer store every other component depends on
/// (spec §6). A single source of truth: "all mutating writes go through
/// it" (spec §5).
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn create_run(&self, new_run: NewRun) -> Result<Run, RepositoryError>;

    async fn update_run(
        &self,
        id: RunId,
        resources_created: Option<bool>,
        logs_archived_at: Option<DateTime<Utc>>,
        r#final: Option<bool>,
        status: Option<(RunStatus, Option<String>)>,
    ) -> Result<(), RepositoryError>;

    /// Overwrites the Job's buffer map after creation, once ephemeral
    /// `temp-` ids have been materialized against the assigned Run id
    /// (spec §4.1 step 3 — the rewrite needs the id `create_run` mints).
    async fn set_run_buffers(
        &self,
        id: RunId,
        buffers: HashMap<String, tyger_core::BufferId>,
    ) -> Result<(), RepositoryError>;

    async fn get_run(&self, id: RunId) -> Result<Option<RunRecord>, RepositoryError>;

    async fn get_runs(&self, query: GetRunsQuery) -> Result<(Vec<Run>, Option<String>), RepositoryError>;

    /// Pages through Runs where `resources_created = false` (spec §4.3
    /// orphan drain).
    async fn get_page_of_runs_where_resources_not_created(
        &self,
    ) -> Result<Vec<Run>, RepositoryError>;

    async fn delete_run(&self, id: RunId) -> Result<(), RepositoryError>;

    async fn get_latest_codespec(&self, name: &str) -> Result<Option<Codespec>, RepositoryError>;

    async fn get_codespec_at_version(
        &self,
        name: &str,
        version: i64,
    ) -> Result<Option<Codespec>, RepositoryError>;

    async fn put_codespec(&self, codespec: Codespec) -> Result<(), RepositoryError>;

    /// Increment `tagsVersion` and publish a change event (spec §6).
    async fn update_tags(
        &self,
        id: RunId,
        tags: HashMap<String, String>,
    ) -> Result<u64, RepositoryError>;

    fn subscribe_changes(&self) -> tokio::sync::broadcast::Receiver<Event>;
}

struct Inner {
    runs: HashMap<RunId, RunRecord>,
    codespecs: CodespecStore,
}

/// In-memory [`Repository`] implementation, the reference backing store
/// used by tests and by `tyger-server` when no external database is
/// configured.
///
/// Mirrors the `MaterializedState` idiom from this codebase's storage
/// crate: a single `Mutex`-guarded state value, with reads cloning out
/// under the lock rather than holding it across an `.await`.
pub struct InMemoryRepository<C: Clock> {
    inner: Mutex<Inner>,
    next_id: AtomicI64,
    clock: C,
    changes: TagChangeSink,
}

impl<C: Clock> InMemoryRepository<C> {
    pub fn new(clock: C) -> Self {
        Self {
            inner: Mutex::new(Inner {
                runs: HashMap::new(),
                codespecs: CodespecStore::default(),
            }),
            next_id: AtomicI64::new(1),
            clock,
            changes: TagChangeSink::default(),
        }
    }
}

#[async_trait]
impl<C: Clock> Repository for InMemoryRepository<C> {
    async fn create_run(&self, new_run: NewRun) -> Result<Run, RepositoryError> {
        let id = RunId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = self.clock.now();
        let run = Run {
            id,
            status: RunStatus::Pending,
            status_reason: None,
            job: new_run.job,
            worker: new_run.worker,
            cluster: new_run.cluster,
            tags: new_run.tags,
            created_at: now,
            started_at: None,
            finished_at: None,
            running_count: None,
            timeout_seconds: new_run.timeout_seconds,
        };
        let record = RunRecord {
            run: run.clone(),
            modified_at: now,
            logs_archived_at: None,
            r#final: false,
            tags_version: 0,
            resources_created: false,
        };
        self.inner.lock().runs.insert(id, record);
        Ok(run)
    }

    async fn update_run(
        &self,
        id: RunId,
        resources_created: Option<bool>,
        logs_archived_at: Option<DateTime<Utc>>,
        r#final: Option<bool>,
        status: Option<(RunStatus, Option<String>)>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock();
        let record = inner
            .runs
            .get_mut(&id)
            .ok_or(NotFoundError::Run(id))?;

        if record.r#final && (status.is_some() || resources_created.is_some()) {
            return Err(RepositoryError::AlreadyFinal(id));
        }

        if let Some(rc) = resources_created {
            record.resources_created = rc;
        }
        if let Some(archived) = logs_archived_at {
            record.logs_archived_at = Some(archived);
        }
        if let Some(is_final) = r#final {
            record.r#final = is_final;
        }
        if let Some((new_status, reason)) = status {
            if !record.run.status.can_transition_to(new_status) {
                return Err(RepositoryError::Unavailable(format!(
                    "invalid transition {:?} -> {:?}",
                    record.run.status, new_status
                )));
            }
            record.run.status = new_status;
            record.run.status_reason = reason;
            if new_status == RunStatus::Running && record.run.started_at.is_none() {
                record.run.started_at = Some(self.clock.now());
            }
            if new_status.is_terminal() {
                record.run.finished_at = Some(self.clock.now());
            }
        }
        record.modified_at = self.clock.now();
        Ok(())
    }

    async fn set_run_buffers(
        &self,
        id: RunId,
        buffers: HashMap<String, tyger_core::BufferId>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock();
        let record = inner.runs.get_mut(&id).ok_or(NotFoundError::Run(id))?;
        record.run.job.buffers = buffers;
        record.modified_at = self.clock.now();
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<RunRecord>, RepositoryError> {
        Ok(self.inner.lock().runs.get(&id).cloned())
    }

    async fn get_runs(&self, query: GetRunsQuery) -> Result<(Vec<Run>, Option<String>), RepositoryError> {
        let inner = self.inner.lock();
        let mut runs: Vec<Run> = inner
            .runs
            .values()
            .filter(|r| query.since.map_or(true, |since| r.run.created_at >= since))
            .filter(|r| {
                query
                    .only_resources_created
                    .map_or(true, |wanted| r.resources_created == wanted)
            })
            .filter(|r| query.tags.iter().all(|(k, v)| r.run.tags.get(k) == Some(v)))
            .map(|r| r.run.clone())
            .collect();
        runs.sort_by_key(|r| r.id);
        let limit = if query.limit == 0 { runs.len() } else { query.limit };
        let truncated = runs.len() > limit;
        runs.truncate(limit);
        let token = truncated.then(|| runs.last().map(|r| r.id.to_string())).flatten();
        Ok((runs, token))
    }

    async fn get_page_of_runs_where_resources_not_created(&self) -> Result<Vec<Run>, RepositoryError> {
        let inner = self.inner.lock();
        let mut runs: Vec<Run> = inner
            .runs
            .values()
            .filter(|r| !r.resources_created)
            .map(|r| r.run.clone())
            .collect();
        runs.sort_by_key(|r| r.id);
        Ok(runs)
    }

    async fn delete_run(&self, id: RunId) -> Result<(), RepositoryError> {
        self.inner.lock().runs.remove(&id);
        Ok(())
    }

    async fn get_latest_codespec(&self, name: &str) -> Result<Option<Codespec>, RepositoryError> {
        Ok(self.inner.lock().codespecs.latest(name).cloned())
    }

    async fn get_codespec_at_version(&self, name: &str, version: i64) -> Result<Option<Codespec>, RepositoryError> {
        Ok(self.inner.lock().codespecs.at_version(name, version).cloned())
    }

    async fn put_codespec(&self, codespec: Codespec) -> Result<(), RepositoryError> {
        self.inner.lock().codespecs.insert(codespec);
        Ok(())
    }

    async fn update_tags(&self, id: RunId, tags: HashMap<String, String>) -> Result<u64, RepositoryError> {
        let version = {
            let mut inner = self.inner.lock();
            let record = inner.runs.get_mut(&id).ok_or(NotFoundError::Run(id))?;
            record.run.tags = tags;
            record.tags_version += 1;
            record.modified_at = self.clock.now();
            record.tags_version
        };
        self.changes.publish(Event::new(id, RunChangeKind::TagsUpdated { tags_version: version }));
        Ok(version)
    }

    fn subscribe_changes(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
