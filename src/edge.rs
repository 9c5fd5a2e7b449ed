// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//
// Two prebuilt constructors over the callback registry (spec.md §4.7):
// `add_edge` and `add_conditional_edge`. Both re-parent their successor to
// the Commander root rather than to `from`, so the edge overlay can form
// cycles without the parent/child tree ever doing the same (spec.md §9:
// "Cyclic graphs on a tree").

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::any_value::AnyValue;
use crate::callback::CallbackDescriptor;
use crate::commander::{Commander, CommanderInner};
use crate::handler::{HandlerBody, HandlerHandle};
use crate::job::JobBody;
use crate::node::Node;
use crate::state::Event;

/// What an edge hands off to once its source node ends.
#[derive(Clone)]
pub enum EdgeTarget {
    Job(Arc<dyn JobBody>),
    Handler(Arc<HandlerSlot>),
}

impl EdgeTarget {
    pub fn job(body: Arc<dyn JobBody>) -> Self {
        EdgeTarget::Job(body)
    }

    /// Wraps `body` in its own [`HandlerSlot`]. Build this once per edge
    /// target and reuse the same `EdgeTarget` across every `add_edge`/
    /// `add_conditional_edge` call that can reach it, so restarts
    /// (spec.md §4.3) land on the same running instance instead of each
    /// spawning an unrelated one.
    pub fn handler(body: Arc<dyn HandlerBody>) -> Self {
        EdgeTarget::Handler(HandlerSlot::new(body))
    }
}

/// Persistent per-target state for a Handler edge destination: the body to
/// run plus whichever instance is currently live, so a later firing of any
/// edge pointed at this target restarts that instance rather than starting
/// a second one alongside it.
pub struct HandlerSlot {
    body: Arc<dyn HandlerBody>,
    current: Mutex<Option<HandlerHandle>>,
}

impl HandlerSlot {
    pub fn new(body: Arc<dyn HandlerBody>) -> Arc<Self> {
        Arc::new(HandlerSlot {
            body,
            current: Mutex::new(None),
        })
    }
}

/// Submits `target`, assigning `data` to its freshly (re-)started instance
/// the first time this edge ever fires — `data` is consumed with `.take()`,
/// so later cycles leave whatever the target itself wrote to its `data`
/// slot untouched (spec.md §4.7: "if `data` is provided, assigns it to
/// `to.data`" — only the initial hop has anything to assign).
async fn fire(
    commander: &Arc<CommanderInner>,
    root: &Arc<Node>,
    target: &EdgeTarget,
    data: &Mutex<Option<AnyValue>>,
) {
    match target {
        EdgeTarget::Job(body) => {
            let node = commander.enqueue_job(Arc::clone(body), root).await;
            if let Some(value) = data.lock().take() {
                node.set_data(value);
            }
        }
        EdgeTarget::Handler(slot) => {
            let mut current = slot.current.lock();
            match current.as_ref() {
                Some(handle) => {
                    if let Err(err) = commander.restart_handler(handle) {
                        log::warn!(
                            target: "commander::edge",
                            "edge handler target could not restart: {err}"
                        );
                    }
                }
                None => {
                    let handle = commander.start_handler(Arc::clone(&slot.body), root, true);
                    if let Some(value) = data.lock().take() {
                        handle.node().set_data(value);
                    }
                    *current = Some(handle);
                }
            }
        }
    }
}

/// Installs an unconditional edge: every time `from` ends (whether it was
/// run as a Job or a Handler — only one of the two events will ever
/// actually fire for a given node), `to` is submitted under the Commander
/// (spec.md §4.7: `add_edge`).
pub fn add_edge(commander: &Commander, from: &Arc<Node>, to: EdgeTarget, data: Option<AnyValue>) {
    let commander_inner = Arc::clone(commander.inner());
    let root = Arc::clone(commander.root());
    let to = Arc::new(to);
    let data = Arc::new(Mutex::new(data));

    let descriptor = CallbackDescriptor::asynchronous(move |_ctx| {
        let commander_inner = Arc::clone(&commander_inner);
        let root = Arc::clone(&root);
        let to = Arc::clone(&to);
        let data = Arc::clone(&data);
        async move {
            fire(&commander_inner, &root, &to, &data).await;
        }
    });

    let mut callbacks = from.callbacks.lock();
    callbacks.add(Event::JobEnd, descriptor.clone());
    callbacks.add(Event::HandlerEnd, descriptor);
}

/// Installs a conditional edge: once `from` ends, its `result` is
/// downcast to `K` and looked up in `branches`; a matching entry is
/// submitted exactly as `add_edge` would, an absent key is a no-op
/// (spec.md §4.7: `add_conditional_edge`, round-trip law "B runs iff
/// `A.result == k`; absent keys yield no submission").
pub fn add_conditional_edge<K>(
    commander: &Commander,
    from: &Arc<Node>,
    branches: HashMap<K, EdgeTarget>,
    data: Option<AnyValue>,
) where
    K: Eq + Hash + Send + Sync + 'static,
{
    let commander_inner = Arc::clone(commander.inner());
    let root = Arc::clone(commander.root());
    let branches = Arc::new(branches);
    let data = Arc::new(Mutex::new(data));

    let descriptor = CallbackDescriptor::asynchronous(move |ctx| {
        let commander_inner = Arc::clone(&commander_inner);
        let root = Arc::clone(&root);
        let branches = Arc::clone(&branches);
        let data = Arc::clone(&data);
        async move {
            let Some(source) = ctx.node else {
                return;
            };
            let target = source.with_result(|result| {
                result
                    .and_then(|value| value.downcast_ref::<K>().ok())
                    .and_then(|key| branches.get(key))
                    .cloned()
            });
            if let Some(target) = target {
                fire(&commander_inner, &root, &target, &data).await;
            }
        }
    });

    let descriptor = descriptor.inject_task_node();
    let mut callbacks = from.callbacks.lock();
    callbacks.add(Event::JobEnd, descriptor.clone());
    callbacks.add(Event::HandlerEnd, descriptor);
}

#[cfg(test)]
mod tests;
