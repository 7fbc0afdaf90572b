// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shape of what the Repository stores and returns, per spec §6.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tyger_core::{Codespec, Run};

/// A Run as stored, plus the bookkeeping fields `GetRun` returns alongside
/// it (spec §6: `(Run, modifiedAt, logsArchivedAt, final, tagsVersion)`).
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run: Run,
    pub modified_at: DateTime<Utc>,
    pub logs_archived_at: Option<DateTime<Utc>>,
    pub r#final: bool,
    pub tags_version: u64,
    pub resources_created: bool,
}

impl RunRecord {
    pub fn is_final(&self) -> bool {
        self.r#final
    }
}

/// Filter parameters for `GetRuns` (spec §6).
#[derive(Debug, Clone, Default)]
pub struct GetRunsQuery {
    pub limit: usize,
    pub since: Option<DateTime<Utc>>,
    pub only_resources_created: Option<bool>,
    pub tags: HashMap<String, String>,
    pub continuation_token: Option<String>,
}

/// In-memory Codespec storage keyed by name, holding every version ever
/// created (spec §3: "a codespec version is immutable").
#[derive(Debug, Clone, Default)]
pub struct CodespecStore {
    versions: HashMap<String, Vec<Codespec>>,
}

impl CodespecStore {
    pub fn insert(&mut self, codespec: Codespec) {
        self.versions.entry(codespec.name.clone()).or_default().push(codespec);
    }

    pub fn latest(&self, name: &str) -> Option<&Codespec> {
        self.versions
            .get(name)
            .and_then(|versions| versions.iter().max_by_key(|c| c.version))
    }

    pub fn at_version(&self, name: &str, version: i64) -> Option<&Codespec> {
        self.versions
            .get(name)
            .and_then(|versions| versions.iter().find(|c| c.version == version))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.versions.contains_key(name)
    }
}
