// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::any_value::AnyValue;
use crate::error::{CommanderError, TaskError};
use crate::latch::AsyncLatch;
use crate::node::Node;
use crate::scope::Scope;
use crate::state::State;

/// A directly invoked, finer unit of work, optionally restartable
/// (spec.md §3: `HandlerCoroutine`).
///
/// The spec's "reserved self-reference parameter" (the handler's own
/// node, bound as its first argument) is realized here as `ctx.node()`
/// inside [`HandlerContext`] rather than a bound positional parameter —
/// Rust closures/trait methods have no implicit self-introspection, so the
/// node is simply handed to the body through its context, the same way a
/// builder binds `self_handler` explicitly (spec.md Design Notes).
#[async_trait]
pub trait HandlerBody: Send + Sync {
    async fn call(
        &self,
        ctx: HandlerContext,
    ) -> Result<AnyValue, Box<dyn StdError + Send + Sync>>;
}

/// The `self` a running Handler body sees.
#[derive(Clone)]
pub struct HandlerContext {
    scope: Scope,
}

impl HandlerContext {
    pub(crate) fn new(scope: Scope) -> Self {
        HandlerContext { scope }
    }

    pub fn node(&self) -> &Arc<Node> {
        self.scope.node()
    }

    pub fn commander(&self) -> crate::commander::Commander {
        self.scope.commander()
    }

    pub fn with_data<R>(&self, f: impl FnOnce(Option<&AnyValue>) -> R) -> R {
        self.scope.node.with_data(f)
    }

    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut Option<AnyValue>) -> R) -> R {
        self.scope.node.with_data_mut(f)
    }

    pub fn set_data(&self, value: AnyValue) {
        self.scope.node.set_data(value);
    }

    /// Registers a callback on this Handler's own node (spec.md §6:
    /// `add_callback_functions`).
    pub fn add_callback(&self, event: crate::state::Event, descriptor: crate::callback::CallbackDescriptor) {
        self.scope.node.add_callback(event, descriptor);
    }

    pub async fn put_job(&self, job: Arc<dyn crate::job::JobBody>) {
        self.scope.put_job(job).await;
    }

    pub fn call_handler(&self, handler: Arc<dyn HandlerBody>) -> HandlerHandle {
        self.scope.call_handler(handler, false)
    }

    pub async fn exit_commander(&self, return_result: Option<AnyValue>) {
        self.scope.exit_commander(return_result).await;
    }
}

/// A handle to a running or completed [`HandlerBody`] invocation
/// (spec.md §6: "Calling the decorated function returns a HandlerCoroutine
/// that can be awaited or submitted via `call_handler`").
///
/// `completion` holds the *current cycle's* latch: restarting a reusable
/// handler (spec.md §4.3) installs a fresh one, so awaiters that attached
/// before a restart still resolve against the cycle they actually observed.
#[derive(Clone)]
pub struct HandlerHandle {
    pub(crate) node: Arc<Node>,
    pub(crate) body: Arc<dyn HandlerBody>,
    pub(crate) reusable: bool,
    pub(crate) completion: Arc<Mutex<AsyncLatch>>,
}

impl HandlerHandle {
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Waits for the handler's current run to finish, then reports success,
    /// re-surfaces its stored failure (spec.md §8: "A handler awaited from
    /// two different bodies ... raises the same `exception`"), or reports
    /// that it was cooperatively cancelled instead of running to completion
    /// (spec.md §7 taxonomy item 3: termination; §6's `TaskTerminated` error
    /// kind, concretized as [`CommanderError::Terminated`]). A terminated
    /// node's `exception` slot is never populated (spec.md §3: "`exception`:
    /// the failure object if `state == Failed`; else `null`"), so termination
    /// has to be detected from `state`, not from `exception_arc`.
    pub async fn wait(&self) -> Result<(), HandlerFailure> {
        let latch = self.completion.lock().clone();
        latch.triggered().await;
        if self.node.state() == State::Terminated {
            return Err(HandlerFailure::Terminated(CommanderError::Terminated));
        }
        match self.node.exception_arc() {
            Some(err) => Err(HandlerFailure::Failed(err)),
            None => Ok(()),
        }
    }

    pub fn with_result<R>(&self, f: impl FnOnce(Option<&AnyValue>) -> R) -> R {
        self.node.with_result(f)
    }
}

/// What [`HandlerHandle::wait`] reports when a handler's cycle did not end
/// in `Done` (spec.md §7 taxonomy items 2 and 3: body failures vs.
/// termination are kept distinct, the same way [`crate::error::CommanderError`]
/// and [`TaskError`] are kept as separate types elsewhere in this crate).
#[derive(Debug)]
pub enum HandlerFailure {
    /// The body raised or panicked; carries the same `Arc<TaskError>`
    /// stored on the node's `exception` slot.
    Failed(Arc<TaskError>),
    /// The handler was cooperatively cancelled before it returned (spec.md
    /// §4.2/§4.3: termination is a path distinct from success or failure).
    /// Wraps [`CommanderError::Terminated`] since spec.md §6 lists
    /// `TaskTerminated` among the error kinds surfaced to callers.
    Terminated(CommanderError),
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Failed(err) => write!(f, "{err}"),
            HandlerFailure::Terminated(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for HandlerFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            HandlerFailure::Failed(err) => Some(err.as_ref()),
            HandlerFailure::Terminated(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
