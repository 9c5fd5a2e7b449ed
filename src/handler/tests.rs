use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::*;
use crate::error::TaskError;
use crate::node::Node;
use crate::state::State;

struct NoopHandler;

#[async_trait::async_trait]
impl HandlerBody for NoopHandler {
    async fn call(
        &self,
        _ctx: HandlerContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        Ok(AnyValue::unit())
    }
}

fn handle(node: Arc<Node>) -> HandlerHandle {
    HandlerHandle {
        node,
        body: Arc::new(NoopHandler),
        reusable: false,
        completion: Arc::new(Mutex::new(AsyncLatch::new())),
    }
}

#[tokio::test]
async fn wait_resolves_once_the_latch_triggers() {
    let root = Node::new_root(Arc::new(Notify::new()));
    let h = handle(root);
    let latch = h.completion.lock().clone();
    let waiter = h.clone();
    let join = tokio::spawn(async move { waiter.wait().await });
    tokio::task::yield_now().await;
    assert!(!join.is_finished());
    latch.trigger();
    assert!(join.await.unwrap().is_ok());
}

#[tokio::test]
async fn wait_surfaces_the_stored_exception_to_every_awaiter() {
    let root = Node::new_root(Arc::new(Notify::new()));
    let h = handle(root);
    h.node.set_exception(TaskError::failed(std::io::Error::other("boom")));
    h.completion.lock().trigger();

    let a = h.wait().await;
    let b = h.wait().await;
    assert!(matches!(a, Err(HandlerFailure::Failed(_))));
    assert!(matches!(b, Err(HandlerFailure::Failed(_))));
}

#[tokio::test]
async fn wait_reports_termination_distinct_from_failure() {
    let root = Node::new_root(Arc::new(Notify::new()));
    let h = handle(root);
    h.node.set_state(State::Terminated);
    h.completion.lock().trigger();

    let outcome = h.wait().await;
    assert!(matches!(
        outcome,
        Err(HandlerFailure::Terminated(CommanderError::Terminated))
    ));
    // Termination never touches the exception slot (spec.md §3).
    assert!(!h.node.exception_is_some());
}
