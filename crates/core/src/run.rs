// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run: a single submitted execution unit (spec §3).

use crate::buffer::BufferId;
use crate::id::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Run status (spec §3).
///
/// Transitions are monotone except `Canceling -> {Canceled, Failed}` and
/// `Running -> {Succeeded, Failed, Canceling}` (spec I1, enforced by
/// [`RunStatus::can_transition_to`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceling,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled)
    }

    /// Validates a status transition per spec I1 / §3 invariants.
    ///
    /// A terminal status never transitions. `Canceling` only moves to
    /// `Canceled` or `Failed`. `Running` may move to `Succeeded`, `Failed`,
    /// or `Canceling`. `Pending` moves to `Running`, `Canceling` (direct
    /// cancel before launch completes) or a terminal status via the
    /// sweeper's orphan-drain path reporting `Failed`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match self {
            RunStatus::Pending => matches!(
                next,
                RunStatus::Running | RunStatus::Canceling | RunStatus::Canceled | RunStatus::Failed
            ),
            RunStatus::Running => matches!(
                next,
                RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceling
            ),
            RunStatus::Canceling => matches!(next, RunStatus::Canceled | RunStatus::Failed),
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled => false,
        }
    }
}

/// A Job or Worker target within a Run (spec §3).
///
/// `JobTarget` carries buffer bindings; `WorkerTarget` has the same shape
/// minus buffers (workers don't declare I/O buffers, only sockets/ports
/// reached via `WORKER_NODES`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTarget {
    pub codespec_ref: String,
    #[serde(default = "default_replicas")]
    pub replicas: i64,
    pub node_pool: Option<String>,
    #[serde(default)]
    pub buffers: HashMap<String, BufferId>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Request ephemeral buffers' access URLs use the TCP relay listener
    /// instead of the default Unix-domain socket (spec §4.6).
    #[serde(default)]
    pub prefer_tcp_buffers: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerTarget {
    pub codespec_ref: String,
    #[serde(default = "default_replicas")]
    pub replicas: i64,
    pub node_pool: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_replicas() -> i64 {
    1
}

/// A Run submission, before an id has been assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub job: JobTarget,
    pub worker: Option<WorkerTarget>,
    pub cluster: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub timeout_seconds: Option<i64>,
}

/// A persisted Run record (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
    pub status_reason: Option<String>,
    pub job: JobTarget,
    pub worker: Option<WorkerTarget>,
    pub cluster: Option<String>,
    pub tags: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub running_count: Option<i64>,
    pub timeout_seconds: Option<i64>,
}

impl Run {
    /// Number of backend containers expected for this Run's job graph
    /// (spec §4.2 rule 2): main + one sidecar per buffer param + one
    /// sidecar per socket. Worker replicas are a separate stateful set and
    /// are not counted here (spec §4.2 only covers the job's own objects).
    pub fn expected_job_container_count(&self, buffer_param_count: usize, socket_count: usize) -> usize {
        1 + buffer_param_count + socket_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_never_transition() {
        for terminal in [RunStatus::Succeeded, RunStatus::Failed, RunStatus::Canceled] {
            for next in [
                RunStatus::Pending,
                RunStatus::Running,
                RunStatus::Succeeded,
                RunStatus::Failed,
                RunStatus::Canceling,
                RunStatus::Canceled,
            ] {
                if terminal == next {
                    assert!(terminal.can_transition_to(next));
                } else {
                    assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
                }
            }
        }
    }

    #[test]
    fn running_may_only_move_to_succeeded_failed_or_canceling() {
        assert!(RunStatus::Running.can_transition_to(RunStatus::Succeeded));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Canceling));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Canceled));
    }

    #[test]
    fn canceling_may_only_move_to_canceled_or_failed() {
        assert!(RunStatus::Canceling.can_transition_to(RunStatus::Canceled));
        assert!(RunStatus::Canceling.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Canceling.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn expected_container_count_is_main_plus_buffers_plus_sockets() {
        let job = JobTarget::default();
        let run = Run {
            id: RunId::new(1),
            status: RunStatus::Running,
            status_reason: None,
            job,
            worker: None,
            cluster: None,
            tags: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            running_count: None,
            timeout_seconds: None,
        };
        assert_eq!(run.expected_job_container_count(2, 1), 4);
    }
}
