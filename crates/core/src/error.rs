// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronously-surfaced error kinds (spec §7: "Validation and not-found
//! errors are surfaced synchronously to the caller with a stable code").
//!
//! Transient and Fatal error kinds live closer to where they occur
//! (`tyger-backend::BackendError`, `tyger-engine::Error`) since only this
//! crate's callers need a shared vocabulary for request-rejection.

use thiserror::Error;

/// A Run or Codespec request failed validation before anything was created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed codespec reference '{0}': expected '<name>' or '<name>/versions/<n>'")]
    MalformedCodespecRef(String),

    #[error("unknown cluster '{0}'")]
    UnknownCluster(String),

    #[error("unknown node pool '{0}' on cluster '{1}'")]
    UnknownNodePool(String, String),

    #[error(
        "codespec requires {requested} GPU(s) but node pool '{pool}' has no GPU support"
    )]
    GpuMismatch { pool: String, requested: u32 },

    #[error("unknown buffer parameter '{0}'")]
    UnknownBufferParameter(String),

    #[error("extra buffer argument '{0}' not declared by codespec")]
    ExtraBufferArgument(String),

    #[error("missing required buffer parameter '{0}'")]
    MissingBufferParameter(String),

    #[error("worker replicas requested but backend does not support worker targets")]
    WorkerUnsupported,

    #[error("replicas must be >= 1, got {0}")]
    InvalidReplicaCount(i64),

    #[error("mixed socket owners for buffer '{0}': sidecar socket owner must match data-plane socket owner")]
    MixedSocketOwner(String),
}

/// A requested entity does not exist.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("run {0} not found")]
    Run(crate::RunId),

    #[error("codespec '{0}' not found")]
    CodespecName(String),

    #[error(
        "codespec '{name}' version {requested} not found (latest is {latest})"
    )]
    CodespecVersion {
        name: String,
        requested: i64,
        latest: i64,
    },

    #[error("buffer '{0}' not found")]
    Buffer(String),
}
