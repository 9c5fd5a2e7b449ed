// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//
// The continuations that drive a Job's `task` or a Handler's body to
// completion (spec.md §4.1 steps 3/4) and perform completion propagation
// (spec.md §4.5). Cancellation follows `other_examples/…lexe-tokio…task.rs`
// and `other_examples/…radicle-link…executor.rs`: spawn the body as its own
// task on the Commander's `LocalSet` (`commander.rs`'s module doc explains
// why it has to be `spawn_local` rather than `tokio::spawn`), then race the
// `JoinHandle` against the shutdown latch, `abort()`-ing on the losing side.

use std::sync::Arc;

use crate::commander::CommanderInner;
use crate::error::TaskError;
use crate::handler::{HandlerContext, HandlerHandle};
use crate::job::{JobBody, JobContext};
use crate::node::Node;
use crate::scope::Scope;
use crate::state::{Event, State};

/// Awaits `join`, applying its outcome to `node`: sets `result`/`state` on
/// success, fires `at_exception` on failure or panic, or fires
/// `at_terminate` if the Commander's shutdown latch wins the race first.
///
/// Returns `true` iff the node terminated via cancellation — in that case
/// the caller must NOT fire its `at_*_end` event (spec.md §4.2: "terminal
/// path distinct from success").
async fn run_to_completion(
    commander: &Arc<CommanderInner>,
    node: &Arc<Node>,
    join: tokio::task::JoinHandle<Result<crate::any_value::AnyValue, Box<dyn std::error::Error + Send + Sync>>>,
) -> bool {
    let shutdown = commander.shutdown_latch();
    tokio::select! {
        _ = shutdown.triggered() => {
            join.abort();
            node.set_state(State::Terminated);
            node.dispatch_callbacks(Event::Terminate).await;
            true
        }
        outcome = join => {
            match outcome {
                Ok(Ok(value)) => {
                    node.set_result(value);
                    node.set_state(State::Done);
                    false
                }
                Ok(Err(err)) => {
                    node.set_exception(TaskError::Failed(err));
                    node.set_state(State::Failed);
                    node.dispatch_callbacks(Event::Exception).await;
                    false
                }
                Err(join_err) if join_err.is_cancelled() => {
                    node.set_state(State::Terminated);
                    node.dispatch_callbacks(Event::Terminate).await;
                    true
                }
                Err(join_err) => {
                    node.set_exception(TaskError::Panicked(join_err.into_panic()));
                    node.set_state(State::Failed);
                    node.dispatch_callbacks(Event::Exception).await;
                    false
                }
            }
        }
    }
}

/// Finalizes a node once its body (and any `at_*_end`/`at_terminate`
/// callback dispatch) has returned: marks it terminal-complete and
/// attempts to unlink it from its parent, rippling eligibility checks up
/// the tree and waking the Commander loop (spec.md §4.5).
fn finalize(commander: &Arc<CommanderInner>, node: &Arc<Node>) {
    node.mark_body_returned();
    node.mark_terminal_callbacks_done();
    node.try_unlink();
    commander.wake_loop();
}

/// Drives a single Job from `Running` through to a terminal state
/// (spec.md §4.1 step 3).
pub(crate) async fn drive_job(commander: Arc<CommanderInner>, node: Arc<Node>, body: Arc<dyn JobBody>) {
    node.set_state(State::Running);
    node.dispatch_callbacks(Event::JobStart).await;

    let scope = Scope::new(Arc::clone(&node), Arc::clone(&commander));
    let join = tokio::task::spawn_local(async move { body.task(JobContext::new(scope)).await });

    let terminated = run_to_completion(&commander, &node, join).await;
    if !terminated {
        node.dispatch_callbacks(Event::JobEnd).await;
    }

    finalize(&commander, &node);
}

/// Drives a single run of a Handler (spec.md §4.1 step 4). Each call is
/// exactly one cycle: a reusable handler's restart (spec.md §4.3) always
/// spawns a fresh call to this function against the same node, rather than
/// looping in place, so a restart can never race the node's own
/// finalization of the cycle that triggered it.
pub(crate) async fn drive_handler(commander: Arc<CommanderInner>, handle: HandlerHandle) {
    let node = Arc::clone(&handle.node);

    node.set_state(State::Running);
    node.dispatch_callbacks(Event::HandlerStart).await;

    let scope = Scope::new(Arc::clone(&node), Arc::clone(&commander));
    let body = Arc::clone(&handle.body);
    let join = tokio::task::spawn_local(async move { body.call(HandlerContext::new(scope)).await });

    let terminated = run_to_completion(&commander, &node, join).await;
    if !terminated {
        node.dispatch_callbacks(Event::HandlerEnd).await;
    }

    // Release this cycle's awaiters before the node unlinks, so a body
    // that calls `handle.wait()` right after `call_handler` never misses
    // the wakeup (spec.md §8: a handler's completion is observable from
    // any awaiter).
    handle.completion.lock().trigger();

    finalize(&commander, &node);
}
