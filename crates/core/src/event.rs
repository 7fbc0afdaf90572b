// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event type carried on the bus between `RunUpdater` (producer) and
//! `RunReader::WatchRun` (consumer), per spec §9: "use an explicit
//! event-bus channel owned by the updater; reader registers/unregisters a
//! sink on watch start/stop. No back-references stored on the Run value."

use crate::id::RunId;
use serde::{Deserialize, Serialize};

/// What changed about a Run, as observed by whichever component produced
/// the change (RunUpdater for tags/cancel, the backend-watch loop for
/// container state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunChangeKind {
    /// `RunUpdater` incremented `tagsVersion` (spec §6: "Tag updates
    /// increment `tagsVersion`").
    TagsUpdated { tags_version: u64 },
    /// `RunUpdater::CancelRun` transitioned status.
    StatusChanged,
    /// The backend reported a new event for this Run's label group
    /// (container started/exited/removed) — a hint to re-run `GetRun`,
    /// not a status value in itself.
    BackendObserved,
}

/// A notification that `GetRun(id)` may now return something different.
/// Consumers re-run `GetRun` and only yield when the result differs from
/// what they last emitted (spec §4.2 `WatchRun`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: RunId,
    pub kind: RunChangeKind,
}

impl Event {
    pub fn new(run_id: RunId, kind: RunChangeKind) -> Self {
        Self { run_id, kind }
    }
}
