// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::any_value::AnyValue;
use crate::callback::CallbackRegistry;
use crate::error::TaskError;
use crate::id::TaskId;
use crate::state::State;

/// The shared base every schedulable unit is built from (spec.md §3:
/// `TaskNode`). Job and Handler hold an `Arc<Node>` rather than subclassing
/// it — Rust has no inheritance, so composition stands in, the same way
/// `LxTask<T>` (`other_examples/…lexe-tokio…task.rs`) wraps a
/// `tokio::task::JoinHandle` instead of extending it.
pub struct Node {
    id: TaskId,
    parent: Mutex<Option<Weak<Node>>>,
    children: Mutex<Vec<Arc<Node>>>,
    state: Mutex<State>,
    result: Mutex<Option<AnyValue>>,
    // Wrapped in `Arc` (rather than plain `TaskError`) so that a handler
    // awaited from several bodies (spec.md §8: "returns the same result ...
    // and raises the same exception") can hand each awaiter a cheap clone.
    exception: Mutex<Option<Arc<TaskError>>>,
    pub(crate) callbacks: Mutex<CallbackRegistry>,
    data: Mutex<Option<AnyValue>>,
    /// Set once the node's body has returned, by whatever means
    /// (success, failure, or cancellation) — invariant 2 of spec.md §3.
    body_returned: AtomicBool,
    /// Set once every terminal-phase callback for this node has fired.
    terminal_callbacks_done: AtomicBool,
    /// Wakes the owning Commander's loop whenever this node's eligibility
    /// for terminalization might have changed (spec.md §4.5).
    wake: Arc<Notify>,
}

impl Node {
    pub(crate) fn new_root(wake: Arc<Notify>) -> Arc<Node> {
        Arc::new(Node {
            id: TaskId::ROOT,
            parent: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            state: Mutex::new(State::Running),
            result: Mutex::new(None),
            exception: Mutex::new(None),
            callbacks: Mutex::new(CallbackRegistry::new()),
            data: Mutex::new(None),
            body_returned: AtomicBool::new(false),
            terminal_callbacks_done: AtomicBool::new(false),
            wake,
        })
    }

    /// Creates a new child of `parent` in `Pending` state (invariant 1 of
    /// spec.md §3: exactly one parent for the node's lifetime) and appends
    /// it to the parent's `children` (invariant 4: append-only until the
    /// parent itself is terminal).
    pub(crate) fn new_child(parent: &Arc<Node>) -> Arc<Node> {
        let child = Arc::new(Node {
            id: TaskId::next(),
            parent: Mutex::new(Some(Arc::downgrade(parent))),
            children: Mutex::new(Vec::new()),
            state: Mutex::new(State::Pending),
            result: Mutex::new(None),
            exception: Mutex::new(None),
            callbacks: Mutex::new(CallbackRegistry::new()),
            data: Mutex::new(None),
            body_returned: AtomicBool::new(false),
            terminal_callbacks_done: AtomicBool::new(false),
            wake: Arc::clone(&parent.wake),
        });
        parent.children.lock().push(Arc::clone(&child));
        child
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: State) {
        *self.state.lock() = state;
    }

    pub fn with_result<R>(&self, f: impl FnOnce(Option<&AnyValue>) -> R) -> R {
        f(self.result.lock().as_ref())
    }

    pub(crate) fn set_result(&self, value: AnyValue) {
        *self.result.lock() = Some(value);
    }

    pub fn exception_is_some(&self) -> bool {
        self.exception.lock().is_some()
    }

    pub(crate) fn set_exception(&self, err: TaskError) {
        *self.exception.lock() = Some(Arc::new(err));
    }

    pub fn with_exception<R>(&self, f: impl FnOnce(Option<&TaskError>) -> R) -> R {
        f(self.exception.lock().as_deref())
    }

    /// Cheap clone of the stored failure, for handing to multiple awaiters
    /// of the same [`crate::handler::HandlerHandle`].
    pub(crate) fn exception_arc(&self) -> Option<Arc<TaskError>> {
        self.exception.lock().clone()
    }

    pub fn set_data(&self, value: AnyValue) {
        *self.data.lock() = Some(value);
    }

    pub fn with_data<R>(&self, f: impl FnOnce(Option<&AnyValue>) -> R) -> R {
        f(self.data.lock().as_ref())
    }

    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut Option<AnyValue>) -> R) -> R {
        f(&mut self.data.lock())
    }

    pub fn children(&self) -> Vec<Arc<Node>> {
        self.children.lock().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().len()
    }

    /// Registers `descriptor` to fire on `event` (spec.md §6:
    /// `add_callback_functions`). Descriptors for one event fire in
    /// insertion order.
    pub fn add_callback(&self, event: crate::state::Event, descriptor: crate::callback::CallbackDescriptor) {
        self.callbacks.lock().add(event, descriptor);
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: &Arc<Node>) {
        *self.parent.lock() = Some(Arc::downgrade(parent));
    }

    /// Iterates parent, grandparent, ... up to (and including) the
    /// Commander's root (spec.md §3: `ancestor_chain`).
    pub fn ancestor_chain(self: &Arc<Node>) -> impl Iterator<Item = Arc<Node>> {
        let mut current = self.parent();
        std::iter::from_fn(move || {
            let next = current.clone();
            current = next.as_ref().and_then(Node::parent);
            next
        })
    }

    pub(crate) fn mark_body_returned(&self) {
        self.body_returned.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_terminal_callbacks_done(&self) {
        self.terminal_callbacks_done.store(true, Ordering::SeqCst);
    }

    /// A node is terminal iff state is terminal, every child is terminal,
    /// and its own body has returned (invariant 2 of spec.md §3).
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
            && self.body_returned.load(Ordering::SeqCst)
            && self.children.lock().iter().all(|c| c.is_terminal())
    }

    /// True once this node is eligible to unlink from its parent
    /// (spec.md §4.5): terminal, all children already unlinked (i.e. the
    /// children set is empty, since children unlink themselves first), and
    /// every terminal-phase callback has fired.
    fn eligible_for_unlink(&self) -> bool {
        self.state().is_terminal()
            && self.body_returned.load(Ordering::SeqCst)
            && self.terminal_callbacks_done.load(Ordering::SeqCst)
            && self.children.lock().is_empty()
    }

    /// Re-evaluates whether this node (and transitively its ancestors) can
    /// unlink from the tree, and wakes the Commander loop so it can
    /// re-check `is_empty()` for `auto_exit` (spec.md §4.5: "This ripples
    /// up to the Commander").
    pub(crate) fn try_unlink(self: &Arc<Node>) {
        if !self.eligible_for_unlink() {
            self.wake.notify_one();
            return;
        }
        if let Some(parent) = self.parent() {
            let mut children = parent.children.lock();
            children.retain(|c| c.id() != self.id());
            drop(children);
            parent.try_unlink();
        }
        self.wake.notify_one();
    }

    pub(crate) fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Dispatches this node's callbacks for `event`.
    ///
    /// Clones the registry out from under `self.callbacks`'s lock first:
    /// `parking_lot::MutexGuard` is not `Send`, so it cannot be held across
    /// the `await` points inside [`CallbackRegistry::dispatch`].
    pub(crate) async fn dispatch_callbacks(self: &Arc<Node>, event: crate::state::Event) {
        let registry = self.callbacks.lock().clone();
        registry.dispatch(event, self).await;
    }

    /// Resets a reusable handler node back to `Pending` before a restart
    /// (spec.md §4.3/Design Notes: "A reusable node must fully reset
    /// `state`, `result`, `exception` and the 'body returned' flag ...
    /// its child set must be empty at re-start (enforced by an
    /// assertion)").
    /// Re-appends an already-unlinked reusable node to `parent`'s children
    /// (spec.md Design Notes: "Reuse is needed for cycles"). `parent` is
    /// always the Commander root for edge-driven restarts (spec.md §4.7:
    /// "edges use the Commander as parent"), so this never changes which
    /// node the restarted instance reports as its parent.
    pub(crate) fn reattach_as_child(self: &Arc<Node>, parent: &Arc<Node>) {
        self.set_parent(parent);
        parent.children.lock().push(Arc::clone(self));
    }

    pub(crate) fn reset_for_restart(&self) -> Result<(), crate::error::CommanderError> {
        if !self.children.lock().is_empty() {
            return Err(crate::error::CommanderError::ChildrenNotEmptyOnRestart);
        }
        *self.result.lock() = None;
        *self.exception.lock() = None;
        self.body_returned.store(false, Ordering::SeqCst);
        self.terminal_callbacks_done.store(false, Ordering::SeqCst);
        self.set_state(State::Pending);
        Ok(())
    }
}
