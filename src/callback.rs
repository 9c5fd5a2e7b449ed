// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::node::Node;
use crate::state::Event;

/// Context handed to a callback when it fires.
///
/// `node` is populated only for descriptors registered with
/// `inject_task_node` (spec.md §4.4: "Each descriptor may request
/// `inject_task_node`, in which case the owning TaskNode is supplied");
/// everyone else gets `None`, matching the spec's "optional keyword
/// argument" rather than always handing out the node regardless of
/// whether the callback asked for it.
pub struct CallbackContext {
    pub event: Event,
    pub node: Option<Arc<Node>>,
}

/// The thing a [`CallbackDescriptor`] actually invokes.
///
/// Both plain synchronous closures and `async` callbacks are supported
/// (spec.md §4.4: "Callbacks may be synchronous or asynchronous"); the
/// trait unifies them behind a single async entry point, the way the
/// teacher's crates unify sync/async work behind `async_trait` at their
/// service boundaries (e.g. `sandboxer`'s `SandboxerGrpc` impl).
#[async_trait]
pub trait Callback: Send + Sync {
    async fn call(&self, ctx: CallbackContext);
}

/// Adapts any `Fn(&CallbackContext) + Send + Sync` closure into a
/// [`Callback`], for the common synchronous case.
pub struct SyncCallback<F>(pub F);

#[async_trait]
impl<F> Callback for SyncCallback<F>
where
    F: Fn(&CallbackContext) + Send + Sync,
{
    async fn call(&self, ctx: CallbackContext) {
        (self.0)(&ctx)
    }
}

/// Adapts any closure returning a boxed future into a [`Callback`], for
/// asynchronous callback bodies.
pub struct AsyncCallback<F>(pub F);

#[async_trait]
impl<F> Callback for AsyncCallback<F>
where
    F: Fn(CallbackContext) -> BoxFuture<'static, ()> + Send + Sync,
{
    async fn call(&self, ctx: CallbackContext) {
        (self.0)(ctx).await
    }
}

/// A single registered callback (spec.md §3: `CallbackDescriptor`).
#[derive(Clone)]
pub struct CallbackDescriptor {
    callback: Arc<dyn Callback>,
    inject_task_node: bool,
}

impl CallbackDescriptor {
    pub fn new(callback: Arc<dyn Callback>) -> Self {
        CallbackDescriptor {
            callback,
            inject_task_node: false,
        }
    }

    /// Requests that the owning node be injected into the callback's
    /// context (spec.md: "in which case the owning TaskNode is supplied").
    pub fn inject_task_node(mut self) -> Self {
        self.inject_task_node = true;
        self
    }

    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&CallbackContext) + Send + Sync + 'static,
    {
        CallbackDescriptor::new(Arc::new(SyncCallback(f)))
    }

    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        CallbackDescriptor::new(Arc::new(AsyncCallback(move |ctx| f(ctx).boxed())))
    }
}

/// Per-node storage of callback descriptors, keyed by lifecycle event
/// (spec.md §4.4: `CallbackRegistry`).
///
/// Cheap to clone (every descriptor holds only an `Arc`), which is how a
/// [`crate::node::Node`] dispatches without holding its registry's mutex
/// guard across an `await` point: it clones the registry out from under
/// the lock first (see `Node::dispatch_callbacks`).
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    by_event: HashMap<Event, Vec<CallbackDescriptor>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `add_callback_functions(which, functions_info)`: accepts a single
    /// descriptor or (via repeated calls) an ordered list.
    pub fn add(&mut self, event: Event, descriptor: CallbackDescriptor) {
        self.by_event.entry(event).or_default().push(descriptor);
    }

    pub fn add_many(&mut self, event: Event, descriptors: impl IntoIterator<Item = CallbackDescriptor>) {
        self.by_event.entry(event).or_default().extend(descriptors);
    }

    /// Dispatches every callback registered for `event`, in insertion order.
    ///
    /// A callback that panics is caught, logged, and does not stop sibling
    /// callbacks from running (spec.md §4.4/§7: "A callback exception is
    /// logged and suppressed").
    pub async fn dispatch(&self, event: Event, node: &Arc<Node>) {
        let Some(descriptors) = self.by_event.get(&event) else {
            return;
        };
        for descriptor in descriptors {
            let ctx = CallbackContext {
                event,
                node: descriptor.inject_task_node.then(|| Arc::clone(node)),
            };
            let node_id = node.id();
            let fut = std::panic::AssertUnwindSafe(descriptor.callback.call(ctx)).catch_unwind();
            if let Err(_panic) = fut.await {
                log::warn!(
                    target: "commander::callback",
                    "callback for {event} on node {node_id} panicked; suppressing"
                );
            }
        }
    }
}
