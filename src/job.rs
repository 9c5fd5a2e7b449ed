// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;

use crate::any_value::AnyValue;
use crate::handler::{HandlerBody, HandlerHandle};
use crate::node::Node;
use crate::scope::Scope;
use crate::state::State;

/// The literal marker a `task` body must pass to
/// [`JobContext::acknowledge_non_blocking`] (spec.md §4.2/Design Notes:
/// "the contract is surfaced by requiring a well-known marker argument ...
/// a documentation discipline, not a runtime check"). It is not a secret;
/// any caller can read it, the same way the original's "password"
/// decoration carries no authorization meaning.
pub const NO_BLOCKING_PASSWORD: &str = "i-will-not-block-the-commander-loop";

/// A coarse, queue-scheduled unit of work with a resource-owning body
/// (spec.md §3: `Job`).
///
/// Implementors provide `task`; the Commander drives it, records its
/// outcome on the owning [`Node`], and propagates completion — the
/// counterpart of subclassing a `Job` base class in a language with
/// inheritance (spec.md §6: "Subclass a `Job` base").
#[async_trait]
pub trait JobBody: Send + Sync {
    async fn task(
        &self,
        ctx: JobContext,
    ) -> Result<AnyValue, Box<dyn StdError + Send + Sync>>;
}

/// The `self` a running Job body sees: its own node plus the submission
/// surface (spec.md §6 instance attributes: `data`, `result`, `exception`,
/// `parent`, `children`, `commander`).
#[derive(Clone)]
pub struct JobContext {
    scope: Scope,
}

impl JobContext {
    pub(crate) fn new(scope: Scope) -> Self {
        JobContext { scope }
    }

    pub fn node(&self) -> &Arc<Node> {
        self.scope.node()
    }

    pub fn commander(&self) -> crate::commander::Commander {
        self.scope.commander()
    }

    pub fn state(&self) -> State {
        self.scope.node.state()
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

    /// Acknowledges the "no blocking inside `task`" contract (spec.md §4.2).
    /// The check is advisory: a mismatched password is logged, never
    /// rejected (Design Notes: "Implementations may accept any value that
    /// equals the declared constant and may log a deprecation warning
    /// otherwise; no security is implied").
    pub fn acknowledge_non_blocking(&self, password: &str) {
        if password != NO_BLOCKING_PASSWORD {
            log::warn!(
                target: "commander::job",
                "task on node {} acknowledged the non-blocking contract with an \
                 unrecognized marker; pass job::NO_BLOCKING_PASSWORD",
                self.scope.node.id()
            );
        }
    }

    /// Registers a callback on this Job's own node (spec.md §6:
    /// `add_callback_functions`).
    pub fn add_callback(&self, event: crate::state::Event, descriptor: crate::callback::CallbackDescriptor) {
        self.scope.node.add_callback(event, descriptor);
    }

    /// Enqueues `job`, parented to this Job unless `parent` is given.
    pub async fn put_job(&self, job: Arc<dyn JobBody>) {
        self.scope.put_job(job).await;
    }

    pub async fn put_job_with_parent(&self, job: Arc<dyn JobBody>, parent: &Arc<Node>) {
        self.scope.put_job_with_parent(job, parent).await;
    }

    /// Starts `handler` immediately as a concurrent task, parented to this
    /// Job unless `parent` is given.
    pub fn call_handler(&self, handler: Arc<dyn HandlerBody>) -> HandlerHandle {
        self.scope.call_handler(handler, false)
    }

    pub fn call_handler_reusable(&self, handler: Arc<dyn HandlerBody>) -> HandlerHandle {
        self.scope.call_handler(handler, true)
    }

    pub fn call_handler_with_parent(
        &self,
        handler: Arc<dyn HandlerBody>,
        parent: &Arc<Node>,
        reusable: bool,
    ) -> HandlerHandle {
        self.scope.call_handler_with_parent(handler, parent, reusable)
    }

    pub async fn exit_commander(&self, return_result: Option<AnyValue>) {
        self.scope.exit_commander(return_result).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_constant_is_stable() {
        assert_eq!(NO_BLOCKING_PASSWORD, "i-will-not-block-the-commander-loop");
    }
}
