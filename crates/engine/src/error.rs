// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the Run engine.

use crate::log_pipeline::LogArchiveError;
use thiserror::Error;
use tyger_backend::{BackendError, SigningError};
use tyger_core::{NotFoundError, ValidationError};
use tyger_storage::RepositoryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    LogArchive(#[from] LogArchiveError),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Backend(e) if e.is_transient())
    }
}
