// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend object labels (spec §6 "Workload labels"). Bit-exact: these
//! strings cross the backend boundary and are the sole discovery
//! mechanism for reconciliation and teardown (spec §3 "Ownership").

use crate::id::RunId;

pub const LABEL_RUN: &str = "run";
pub const LABEL_TYGER_RUN: &str = "tyger-run";
pub const LABEL_CONTAINER_NAME: &str = "tyger-run-container-name";
pub const LABEL_EPHEMERAL_BUFFER_ID: &str = "tyger-ephemeral-buffer-id";
pub const LABEL_EPHEMERAL_BUFFER_SOCKET_PATH: &str = "tyger-ephemeral-buffer-socket-path";
pub const LABEL_SOCKET_COUNT: &str = "tyger-socket-count";
pub const LABEL_MIGRATION_RANGE: &str = "tyger-migration-range";

/// The role a container plays within a Run's workload graph, used to
/// derive `tyger-run-container-name` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRole {
    Main,
    BufferSidecar(String),
    SocketSidecar(u16),
}

impl std::fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerRole::Main => write!(f, "main"),
            ContainerRole::BufferSidecar(param) => write!(f, "{param}-buffer-sidecar"),
            ContainerRole::SocketSidecar(port) => write!(f, "socket-{port}-sidecar"),
        }
    }
}

/// Build the `run=<id>` label value applied to every backend object
/// belonging to a Run, regardless of backend variant.
pub fn run_label(run_id: RunId) -> (&'static str, String) {
    (LABEL_RUN, run_id.to_string())
}

/// Build the local-engine-only `tyger-run=<id>` grouping label (spec §6:
/// "for run-scope grouping in the local backend").
pub fn local_run_label(run_id: RunId) -> (&'static str, String) {
    (LABEL_TYGER_RUN, run_id.to_string())
}

pub fn container_role_label(role: &ContainerRole) -> (&'static str, String) {
    (LABEL_CONTAINER_NAME, role.to_string())
}

pub fn ephemeral_buffer_labels(buffer_id: &str, socket_path: &str) -> [(&'static str, String); 2] {
    [
        (LABEL_EPHEMERAL_BUFFER_ID, buffer_id.to_string()),
        (LABEL_EPHEMERAL_BUFFER_SOCKET_PATH, socket_path.to_string()),
    ]
}

pub fn socket_count_label(count: usize) -> (&'static str, String) {
    (LABEL_SOCKET_COUNT, count.to_string())
}

/// Deterministic per-object name derived from the Run ID and role
/// (spec §3: "a per-object name derived deterministically from the Run ID").
pub fn object_name(run_id: RunId, role: &ContainerRole) -> String {
    format!("tyger-run-{}-{}", run_id, role)
}
