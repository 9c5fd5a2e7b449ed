// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Error kinds surfaced to API callers (spec.md §6/§7).
///
/// Usage errors (misuse of the API surface) are raised synchronously to the
/// caller that made the offending call, never stored on a [`crate::Node`].
#[derive(Debug, Error)]
pub enum CommanderError {
    #[error("commander is already running")]
    AlreadyRunning,

    #[error("commander is not running")]
    NotRunning,

    #[error("unknown callback event: {name}")]
    InvalidCallbackEvent { name: String },

    #[error("task was terminated")]
    Terminated,

    #[error("value has unexpected type, expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("handler is not reusable and has already run")]
    HandlerNotReusable,

    #[error("reusable handler's children must be empty before it restarts")]
    ChildrenNotEmptyOnRestart,
}

/// The failure captured on a [`crate::Node`] whose body raised or panicked.
///
/// This is distinct from [`CommanderError`]: a `TaskError` is a *body*
/// failure (spec.md §7 taxonomy item 2), stored on the node's `exception`
/// slot, never returned directly to a caller of `put_job`/`call_handler`.
#[derive(Debug)]
pub enum TaskError {
    /// The body returned an error value.
    Failed(Box<dyn std::error::Error + Send + Sync>),
    /// The body panicked; the panic payload is preserved so it can be
    /// re-raised by a caller that wants Rust's native panic semantics,
    /// following `other_examples/…radicle-link…executor.rs`'s
    /// `JoinError::Panicked`.
    Panicked(Box<dyn Any + Send>),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Failed(e) => write!(f, "task failed: {e}"),
            TaskError::Panicked(_) => write!(f, "task panicked"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Failed(e) => Some(e.as_ref()),
            TaskError::Panicked(_) => None,
        }
    }
}

impl TaskError {
    pub fn failed<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        TaskError::Failed(Box::new(err))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }
}
