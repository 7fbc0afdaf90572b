// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffer: a named, signed I/O channel (spec §3, glossary).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Globally unique buffer identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BufferId(pub String);

impl BufferId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for request-time ephemeral buffer ids (spec §3: "prefixed
    /// `temp-` in requests").
    pub fn is_ephemeral_request(&self) -> bool {
        self.0.starts_with("temp-")
    }

    /// Rewrite a `temp-` request id to its materialized form
    /// (spec §3: "rewritten to `run-<id>-<original>` at materialization").
    pub fn materialize_ephemeral(&self, run_id: crate::RunId) -> BufferId {
        BufferId::new(format!("run-{}-{}", run_id, self.0))
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for BufferId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Direction a buffer is being accessed in (capability passed to
/// `BufferManager::mint_url`, spec §4.1 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferDirection {
    Input,
    Output,
}

/// Where a buffer's bytes actually live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BufferLocation {
    /// Backed by cloud object storage (a persistent buffer).
    StorageAccount { account: String, container: String },
    /// Backed by a per-run Unix socket + TCP relay (an ephemeral buffer).
    LocalRelaySocket { socket_path: String },
}

/// A buffer record (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    pub id: BufferId,
    pub created_at: DateTime<Utc>,
    pub active_ttl: chrono::Duration,
    pub soft_deleted_at: Option<DateTime<Utc>>,
    pub tags: HashMap<String, String>,
    pub etag: String,
    pub location: BufferLocation,
}

impl Buffer {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self.location, BufferLocation::LocalRelaySocket { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_request_ids_are_detected_by_prefix() {
        assert!(BufferId::new("temp-x").is_ephemeral_request());
        assert!(!BufferId::new("buf-123").is_ephemeral_request());
    }

    #[test]
    fn ephemeral_ids_materialize_with_run_id_prefix() {
        let id = BufferId::new("temp-x");
        let materialized = id.materialize_ephemeral(crate::RunId::new(42));
        assert_eq!(materialized.as_str(), "run-42-temp-x");
    }
}
