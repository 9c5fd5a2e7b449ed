// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use crate::any_value::AnyValue;
use crate::commander::{Commander, CommanderInner};
use crate::handler::{HandlerBody, HandlerHandle};
use crate::job::JobBody;
use crate::node::Node;

/// The submission surface shared by [`crate::Commander`], [`crate::job::JobContext`]
/// and [`crate::handler::HandlerContext`] (spec.md §6: Job and Handler both expose
/// `put_job`/`call_handler`/`exit_commander`, identical to the Commander's own).
///
/// `node` is the scope's own TaskNode — the implicit `parent` a bare
/// `put_job`/`call_handler` call attaches new work under (spec.md §6:
/// `put_job(job, parent=None)` defaults to the calling instance).
#[derive(Clone)]
pub(crate) struct Scope {
    pub(crate) node: Arc<Node>,
    pub(crate) commander: Arc<CommanderInner>,
}

impl Scope {
    pub(crate) fn new(node: Arc<Node>, commander: Arc<CommanderInner>) -> Self {
        Scope { node, commander }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Hands back a full `Commander` handle, so a running body can wire an
    /// edge (spec.md §4.7) from its own node as the last thing it does
    /// before returning.
    pub fn commander(&self) -> Commander {
        Commander::from_inner(Arc::clone(&self.commander))
    }

    /// Enqueues `job` as a queued, FIFO-scheduled unit, parented to this
    /// scope's own node unless `parent` overrides it (the edge helpers use
    /// the override to re-parent successors to the Commander root).
    ///
    /// `async` because a bounded queue suspends the caller when full
    /// (spec.md §5: "`put_job` may suspend if the queue is bounded and
    /// full").
    pub async fn put_job(&self, job: Arc<dyn JobBody>) {
        self.put_job_with_parent(job, &self.node).await;
    }

    pub async fn put_job_with_parent(&self, job: Arc<dyn JobBody>, parent: &Arc<Node>) {
        self.commander.enqueue_job(job, parent).await;
    }

    /// Starts `handler` immediately as a concurrent task, parented to this
    /// scope's own node unless `parent` overrides it.
    pub fn call_handler(&self, handler: Arc<dyn HandlerBody>, reusable: bool) -> HandlerHandle {
        self.call_handler_with_parent(handler, &self.node, reusable)
    }

    pub fn call_handler_with_parent(
        &self,
        handler: Arc<dyn HandlerBody>,
        parent: &Arc<Node>,
        reusable: bool,
    ) -> HandlerHandle {
        self.commander.start_handler(handler, parent, reusable)
    }

    /// Equivalent to the owning Commander's `exit` (spec.md §5:
    /// "`exit_commander(return_result)` on a Job or Handler is equivalent to
    /// the owning body invoking `exit`").
    pub async fn exit_commander(&self, return_result: Option<AnyValue>) {
        self.commander.exit(return_result, false).await;
    }
}
