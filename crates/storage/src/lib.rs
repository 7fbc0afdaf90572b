// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tyger-storage: the Repository contract (spec §6) and a durable,
//! in-process reference implementation.
//!
//! The relational store itself is explicitly out of scope (spec §1: "The
//! relational store is assumed as an opaque repository"). What belongs
//! here is the *contract* every other component programs against, plus
//! a materialized-state implementation in the style of this codebase's
//! `MaterializedState` (single writer lock, clone-out snapshots for
//! reads that must not hold the lock across an await) so the rest of
//! the workspace has something real to run its tests against.

mod record;
mod repository;
mod tags;

pub use record::{CodespecStore, GetRunsQuery, RunRecord};
pub use repository::{InMemoryRepository, Repository, RepositoryError};
pub use tags::TagChangeSink;
