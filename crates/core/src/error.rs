// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types originated by the launcher core.
//!
//! Per-instance failures are captured on the `Instance` record and surfaced
//! via status channels (see [`crate::status`]); only infrastructure failures
//! (storage, service-manager) and malformed input ever reach a caller as an
//! `Err` from a public [`crate::Dispatcher`] operation.

use thiserror::Error;

/// Errors the core can originate. `Runner` wraps an opaque message from the
/// external runner collaborator; the core never inspects it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("service unusable: {0}")]
    BrokenService(String),
    #[error("oci spec generation failed: {0}")]
    InvalidSpec(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("launcher is shutting down")]
    Shutdown,
    #[error("runner error: {0}")]
    Runner(String),
}

/// Tag-only variant of [`Error`] for status records and tests that only
/// care about the kind, not the annotation. Mirrors the
/// `StepStatus`/`StepStatusKind` split the teacher uses for protocol DTOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    BrokenService,
    InvalidSpec,
    Internal,
    Shutdown,
    Runner,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::BrokenService(_) => ErrorKind::BrokenService,
            Error::InvalidSpec(_) => ErrorKind::InvalidSpec,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Shutdown => ErrorKind::Shutdown,
            Error::Runner(_) => ErrorKind::Runner,
        }
    }

    /// True for failures that abort a whole reconcile cycle (storage,
    /// service-manager) rather than being recorded on a single instance.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Error::Internal(_) | Error::Shutdown)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
