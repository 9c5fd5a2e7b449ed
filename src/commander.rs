// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//
// The Commander: the single scheduling authority (spec.md §4.1). Structured
// after the teacher's service loops (`sandboxer::SandboxerGrpc`,
// `task_executor::TaskExecutor`): one `Arc`-shared inner struct holding all
// shared state, a thin public handle cloneable by callers, and a dedicated
// loop task that owns the one piece of state nothing else may touch (the
// job queue's receiving end).
//
// `run()` drives every Job/Handler body through a `tokio::task::LocalSet`
// rather than `tokio::Handle::spawn`: spec.md §5 promises "within one
// Commander only one body runs at a time" and that `data` slots need no
// locking, which only holds if bodies never execute concurrently with each
// other. Plain `tokio::spawn` onto a multi-thread runtime does not give
// that — spawned tasks can run on different worker threads at the same
// instant. A `LocalSet` polls every task it owns from within its own single
// poll, one at a time, on whichever thread is driving it, so two bodies
// belonging to the same Commander genuinely never run simultaneously,
// matching the cooperative single-execution-context model spec.md §5
// describes (the same property the teacher's `graph`/`task_executor` crates
// get from a logical single scheduling loop, even though their process runs
// many OS threads).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::any_value::AnyValue;
use crate::bridge::ThreadsafeBridge;
use crate::error::CommanderError;
use crate::handler::{HandlerBody, HandlerHandle};
use crate::job::JobBody;
use crate::latch::AsyncLatch;
use crate::node::Node;
use crate::queue::{self, QueueItem, QueueReceiver, QueueSender};
use crate::state::{Event, State};

/// Point-in-time census of the task tree, purely for observability (not a
/// scheduling input) — additive instrumentation in the spirit of the
/// teacher's `workunit_store`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub terminal: usize,
}

pub(crate) struct CommanderInner {
    pub(crate) root: Arc<Node>,
    scope: String,
    queue_tx: QueueSender,
    queue_rx: Mutex<Option<QueueReceiver>>,
    // Cross-thread handler starts (spec.md §4.6) land here instead of being
    // started directly on the foreign thread: only the loop thread is ever
    // inside the `LocalSet`'s context, and `spawn_local` panics outside it.
    handler_tx: mpsc::UnboundedSender<HandlerHandle>,
    handler_rx: Mutex<Option<mpsc::UnboundedReceiver<HandlerHandle>>>,
    running: AtomicBool,
    shutdown: Mutex<AsyncLatch>,
    loop_finished: Mutex<AsyncLatch>,
    return_result: Mutex<Option<AnyValue>>,
    queued_count: AtomicUsize,
    bridge: ThreadsafeBridge,
    wake: Arc<Notify>,
    self_ref: Mutex<Weak<CommanderInner>>,
}

impl CommanderInner {
    pub(crate) fn shutdown_latch(&self) -> AsyncLatch {
        self.shutdown.lock().clone()
    }

    pub(crate) fn wake_loop(&self) {
        self.wake.notify_one();
    }

    fn self_arc(&self) -> Arc<CommanderInner> {
        self.self_ref
            .lock()
            .upgrade()
            .expect("CommanderInner outlives every Arc clone derived from it")
    }

    /// In-loop job enqueue (spec.md §4.1: `put_job`). Returns the freshly
    /// created node so callers that need it (the edge helpers, to assign
    /// `data`) don't have to re-derive it.
    pub(crate) async fn enqueue_job(&self, job: Arc<dyn JobBody>, parent: &Arc<Node>) -> Arc<Node> {
        let node = Node::new_child(parent);
        self.queued_count.fetch_add(1, Ordering::SeqCst);
        self.queue_tx.send(QueueItem { node: Arc::clone(&node), body: job }).await;
        self.wake_loop();
        node
    }

    /// Cross-thread job enqueue (spec.md §4.6).
    pub(crate) fn enqueue_job_threadsafe(&self, job: Arc<dyn JobBody>, parent: &Arc<Node>) {
        self.bridge.track(|| {
            let node = Node::new_child(parent);
            self.queued_count.fetch_add(1, Ordering::SeqCst);
            self.queue_tx.send_blocking(QueueItem { node, body: job });
            self.wake_loop();
        });
    }

    /// Starts `body` as a fresh Handler run (spec.md §4.1: `call_handler`,
    /// §4.6: cross-thread `call_handler_threadsafe`). Builds the node and
    /// handle right away — so the caller can act on it (e.g. register a
    /// callback, or observe it via `task_count`) the instant this returns —
    /// but hands the actual spawn off to the loop thread via `handler_tx`
    /// rather than spawning directly: `spawn_local` panics unless it is
    /// called from within the `LocalSet` the loop drives (`run()`'s module
    /// doc explains why that `LocalSet` exists at all), and neither a
    /// foreign thread nor an arbitrary caller task that merely happens to
    /// share the loop's OS thread is guaranteed to be inside that dynamic
    /// scope. Routing every start through the loop, the same way cross-
    /// thread job submissions already go through the job queue, sidesteps
    /// that entirely.
    pub(crate) fn start_handler(
        &self,
        body: Arc<dyn HandlerBody>,
        parent: &Arc<Node>,
        reusable: bool,
    ) -> HandlerHandle {
        let node = Node::new_child(parent);
        let handle = HandlerHandle {
            node,
            body,
            reusable,
            completion: Arc::new(Mutex::new(AsyncLatch::new())),
        };
        let _ = self.handler_tx.send(handle.clone());
        self.wake_loop();
        handle
    }

    /// Spawns `handle`'s body cycle onto the loop's `LocalSet`. Only ever
    /// called from the loop thread itself: either directly when restarting
    /// a reusable handler from within a dispatched callback (already inside
    /// the `LocalSet`'s dynamic scope), or from `run()`'s `handler_rx` arm
    /// for every handle `start_handler` hands off.
    pub(crate) fn spawn_handler_cycle(&self, handle: HandlerHandle) {
        let commander = self.self_arc();
        tokio::task::spawn_local(crate::runner::drive_handler(commander, handle));
    }

    /// Restarts a reusable handler that has already fully terminalized and
    /// unlinked from the tree (spec.md §4.3/Design Notes). Always used by
    /// the edge helpers; not exposed on the public API because nothing in
    /// spec.md calls for restarting a handler outside of an edge.
    pub(crate) fn restart_handler(&self, handle: &HandlerHandle) -> Result<(), CommanderError> {
        if !handle.reusable {
            return Err(CommanderError::HandlerNotReusable);
        }
        handle.node.reset_for_restart()?;
        handle.node.reattach_as_child(&self.root);
        *handle.completion.lock() = AsyncLatch::new();
        self.spawn_handler_cycle(handle.clone());
        Ok(())
    }

    pub(crate) async fn exit(&self, return_result: Option<AnyValue>, wait: bool) {
        if let Some(value) = return_result {
            *self.return_result.lock() = Some(value);
        }
        let finished = self.loop_finished.lock().clone();
        self.shutdown.lock().trigger();
        self.wake_loop();
        if wait {
            finished.triggered().await;
        }
    }

    pub(crate) async fn wait_for_exit(&self) {
        let finished = self.loop_finished.lock().clone();
        finished.triggered().await;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queued_count.load(Ordering::SeqCst) == 0
            && self.root.child_count() == 0
            && self.bridge.in_flight() == 0
    }
}

/// Root handle to a task-flow orchestrator (spec.md §4.1: `Commander`).
///
/// Cheap to clone: internally an `Arc<CommanderInner>`, the way
/// `other_examples/…lighthouse…task.rs`'s `TaskExecutor` is a thin clonable
/// wrapper over its shared runtime state.
#[derive(Clone)]
pub struct Commander {
    inner: Arc<CommanderInner>,
}

impl Commander {
    pub fn new() -> Self {
        Commander::with_scope("commander")
    }

    pub fn with_scope(scope: impl Into<String>) -> Self {
        Commander::build(scope.into(), queue::unbounded())
    }

    pub fn with_bounded_queue(scope: impl Into<String>, capacity: usize) -> Self {
        Commander::build(scope.into(), queue::bounded(capacity))
    }

    fn build(scope: String, (queue_tx, queue_rx): (QueueSender, QueueReceiver)) -> Self {
        let wake = Arc::new(Notify::new());
        let root = Node::new_root(Arc::clone(&wake));
        let (handler_tx, handler_rx) = mpsc::unbounded_channel();
        let inner = Arc::new_cyclic(|weak| CommanderInner {
            root,
            scope,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            handler_tx,
            handler_rx: Mutex::new(Some(handler_rx)),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(AsyncLatch::new()),
            loop_finished: Mutex::new(AsyncLatch::new()),
            return_result: Mutex::new(None),
            queued_count: AtomicUsize::new(0),
            bridge: ThreadsafeBridge::new(),
            wake,
            self_ref: Mutex::new(weak.clone()),
        });
        Commander { inner }
    }

    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    pub fn running_status(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn task_count(&self) -> TaskCounts {
        fn walk(node: &Arc<Node>, counts: &mut TaskCounts) {
            match node.state() {
                State::Pending => counts.pending += 1,
                State::Running => counts.running += 1,
                State::Done | State::Failed | State::Terminated => counts.terminal += 1,
            }
            for child in node.children() {
                walk(&child, counts);
            }
        }
        let mut counts = TaskCounts::default();
        for child in self.inner.root.children() {
            walk(&child, &mut counts);
        }
        counts
    }

    /// The root TaskNode every top-level submission is parented to. Edge
    /// helpers use this to re-parent successors (spec.md §4.7); callers can
    /// also register a callback directly on it (e.g. `Event::CommanderEnd`).
    pub fn root(&self) -> &Arc<Node> {
        &self.inner.root
    }

    pub(crate) fn inner(&self) -> &Arc<CommanderInner> {
        &self.inner
    }

    /// Rebuilds a `Commander` handle from a shared inner, so code that only
    /// has the `Arc<CommanderInner>` half (a running Job or Handler's
    /// [`crate::scope::Scope`]) can hand callers back a full `Commander` —
    /// used by `JobContext::commander`/`HandlerContext::commander` so a
    /// body can wire its own successor edge right before returning.
    pub(crate) fn from_inner(inner: Arc<CommanderInner>) -> Self {
        Commander { inner }
    }

    /// Starts the loop in the calling task, seeded with `initial`, and
    /// blocks until it exits (spec.md §4.1: `run`).
    pub async fn run(
        &self,
        initial: Vec<Arc<dyn JobBody>>,
        auto_exit: bool,
    ) -> Result<AnyValue, CommanderError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(CommanderError::AlreadyRunning);
        }

        *self.inner.shutdown.lock() = AsyncLatch::new();
        *self.inner.loop_finished.lock() = AsyncLatch::new();

        for job in initial {
            self.inner.enqueue_job(job, &self.inner.root).await;
        }

        let mut queue_rx = self
            .inner
            .queue_rx
            .lock()
            .take()
            .expect("commander's queue receiver is owned by exactly one concurrent `run` call");
        let mut handler_rx = self
            .inner
            .handler_rx
            .lock()
            .take()
            .expect("commander's handler receiver is owned by exactly one concurrent `run` call");

        // Every Job/Handler body is spawned onto this `LocalSet` so that, in
        // keeping with spec.md §5, no two bodies belonging to this Commander
        // ever run at the same instant (see the module doc comment above).
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                // Intake: dequeue and spawn until either the tree drains (when
                // `auto_exit`) or an explicit `exit` requests shutdown.
                let shutdown = self.inner.shutdown_latch();
                loop {
                    if auto_exit && self.inner.is_empty() {
                        break;
                    }
                    tokio::select! {
                        _ = shutdown.triggered() => { break; }
                        item = queue_rx.recv() => {
                            if let Some(item) = item {
                                self.inner.queued_count.fetch_sub(1, Ordering::SeqCst);
                                let commander = Arc::clone(&self.inner);
                                tokio::task::spawn_local(crate::runner::drive_job(commander, item.node, item.body));
                            }
                        }
                        handle = handler_rx.recv() => {
                            if let Some(handle) = handle {
                                self.inner.spawn_handler_cycle(handle);
                            }
                        }
                        _ = self.inner.wake.notified() => {}
                    }
                }

                // Drain: wait for whatever is still running — including
                // bodies a just-triggered shutdown is in the middle of
                // cancelling — before firing `at_commander_end` (Design
                // Notes, open question (a): "fire `at_commander_end` only
                // after all nodes have unlinked").
                while !self.inner.is_empty() {
                    self.inner.wake.notified().await;
                }
            })
            .await;

        *self.inner.queue_rx.lock() = Some(queue_rx);
        *self.inner.handler_rx.lock() = Some(handler_rx);

        self.inner.root.dispatch_callbacks(Event::CommanderEnd).await;

        self.inner.running.store(false, Ordering::SeqCst);
        let result = self
            .inner
            .return_result
            .lock()
            .take()
            .unwrap_or_else(AnyValue::unit);
        self.inner.loop_finished.lock().trigger();
        Ok(result)
    }

    /// If not already running, behaves as `run`; otherwise enqueues
    /// `initial` and returns immediately (spec.md §4.1: `run_auto`).
    pub async fn run_auto(
        &self,
        initial: Vec<Arc<dyn JobBody>>,
        auto_exit: bool,
    ) -> Result<Option<AnyValue>, CommanderError> {
        if self.running_status() {
            for job in initial {
                self.inner.enqueue_job(job, &self.inner.root).await;
            }
            Ok(None)
        } else {
            self.run(initial, auto_exit).await.map(Some)
        }
    }

    pub async fn put_job(&self, job: Arc<dyn JobBody>) -> Result<(), CommanderError> {
        self.put_job_with_parent(job, &self.inner.root).await
    }

    pub async fn put_job_with_parent(
        &self,
        job: Arc<dyn JobBody>,
        parent: &Arc<Node>,
    ) -> Result<(), CommanderError> {
        if !self.running_status() {
            return Err(CommanderError::NotRunning);
        }
        self.inner.enqueue_job(job, parent).await;
        Ok(())
    }

    /// Like `put_job`, but also hands back the freshly created node.
    ///
    /// The spec's Job instance doubles as its own TaskNode (spec.md §6:
    /// `put_job(job, parent=None)` takes and returns the same instance the
    /// caller can already see); splitting `JobBody` (stateless logic) from
    /// `Node` (runtime instance state) loses that handle unless `put_job`
    /// hands it back explicitly. Callers that need to attach a callback or
    /// an edge before the job starts running — impossible to do through the
    /// body alone, since a body only sees its own node from inside `task`,
    /// by which point `at_job_start` has already fired — use this instead.
    pub async fn put_job_returning_node(
        &self,
        job: Arc<dyn JobBody>,
    ) -> Result<Arc<Node>, CommanderError> {
        self.put_job_returning_node_with_parent(job, &self.inner.root).await
    }

    pub async fn put_job_returning_node_with_parent(
        &self,
        job: Arc<dyn JobBody>,
        parent: &Arc<Node>,
    ) -> Result<Arc<Node>, CommanderError> {
        if !self.running_status() {
            return Err(CommanderError::NotRunning);
        }
        Ok(self.inner.enqueue_job(job, parent).await)
    }

    pub fn put_job_threadsafe(&self, job: Arc<dyn JobBody>) -> Result<(), CommanderError> {
        if !self.running_status() {
            return Err(CommanderError::NotRunning);
        }
        self.inner.enqueue_job_threadsafe(job, &self.inner.root);
        Ok(())
    }

    pub fn call_handler(&self, handler: Arc<dyn HandlerBody>) -> Result<HandlerHandle, CommanderError> {
        self.call_handler_with_parent(handler, &self.inner.root)
    }

    pub fn call_handler_with_parent(
        &self,
        handler: Arc<dyn HandlerBody>,
        parent: &Arc<Node>,
    ) -> Result<HandlerHandle, CommanderError> {
        if !self.running_status() {
            return Err(CommanderError::NotRunning);
        }
        Ok(self.inner.start_handler(handler, parent, false))
    }

    pub fn call_handler_threadsafe(
        &self,
        handler: Arc<dyn HandlerBody>,
    ) -> Result<HandlerHandle, CommanderError> {
        if !self.running_status() {
            return Err(CommanderError::NotRunning);
        }
        Ok(self
            .inner
            .bridge
            .track(|| self.inner.start_handler(handler, &self.inner.root, false)))
    }

    pub async fn exit(&self, return_result: Option<AnyValue>, wait: bool) {
        self.inner.exit(return_result, wait).await;
    }

    pub async fn wait_for_exit(&self) {
        self.inner.wait_for_exit().await;
    }
}

impl Default for Commander {
    fn default() -> Self {
        Commander::new()
    }
}

#[cfg(test)]
mod tests;
