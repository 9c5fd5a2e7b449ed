use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::commander::Commander;
use crate::job::JobContext;
use crate::node::Node;
use crate::runner::drive_job;

struct NoOp;

#[async_trait::async_trait]
impl JobBody for NoOp {
    async fn task(
        &self,
        _ctx: JobContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        Ok(AnyValue::unit())
    }
}

struct SetFlag(Arc<AtomicBool>);

#[async_trait::async_trait]
impl JobBody for SetFlag {
    async fn task(
        &self,
        _ctx: JobContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        self.0.store(true, Ordering::SeqCst);
        Ok(AnyValue::unit())
    }
}

struct ReturnsKey(&'static str);

#[async_trait::async_trait]
impl JobBody for ReturnsKey {
    async fn task(
        &self,
        _ctx: JobContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        Ok(AnyValue::new(self.0))
    }
}

struct CountingHandler(Arc<AtomicUsize>);

#[async_trait::async_trait]
impl crate::handler::HandlerBody for CountingHandler {
    async fn call(
        &self,
        _ctx: crate::handler::HandlerContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(AnyValue::unit())
    }
}

/// Spins up a Commander with an empty initial queue so that edge targets
/// fired from directly-driven nodes are still picked up and run by the
/// loop itself, matching how the Commander would dequeue them in practice.
async fn running(commander: &Commander) -> tokio::task::JoinHandle<Result<AnyValue, crate::error::CommanderError>> {
    let commander = commander.clone();
    let runner = tokio::spawn(async move { commander.run(vec![], false).await });
    tokio::task::yield_now().await;
    runner
}

#[tokio::test]
async fn unconditional_edge_submits_its_target_once_from_ends() {
    let commander = Commander::new();
    let runner = running(&commander).await;

    let flag = Arc::new(AtomicBool::new(false));
    let node_a = Node::new_child(commander.root());
    add_edge(
        &commander,
        &node_a,
        EdgeTarget::job(Arc::new(SetFlag(Arc::clone(&flag)))),
        None,
    );
    tokio::task::LocalSet::new()
        .run_until(drive_job(Arc::clone(commander.inner()), node_a, Arc::new(NoOp)))
        .await;

    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert!(flag.load(Ordering::SeqCst));

    commander.exit(None, true).await;
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn conditional_edge_runs_the_branch_matching_the_result() {
    let commander = Commander::new();
    let runner = running(&commander).await;

    let flag = Arc::new(AtomicBool::new(false));
    let mut branches: HashMap<&'static str, EdgeTarget> = HashMap::new();
    branches.insert("go", EdgeTarget::job(Arc::new(SetFlag(Arc::clone(&flag)))));

    let node_a = Node::new_child(commander.root());
    add_conditional_edge(&commander, &node_a, branches, None);
    tokio::task::LocalSet::new()
        .run_until(drive_job(
            Arc::clone(commander.inner()),
            node_a,
            Arc::new(ReturnsKey("go")),
        ))
        .await;

    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert!(flag.load(Ordering::SeqCst));

    commander.exit(None, true).await;
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn conditional_edge_is_a_no_op_for_an_unmatched_result() {
    let commander = Commander::new();
    let runner = running(&commander).await;

    let flag = Arc::new(AtomicBool::new(false));
    let mut branches: HashMap<&'static str, EdgeTarget> = HashMap::new();
    branches.insert("go", EdgeTarget::job(Arc::new(SetFlag(Arc::clone(&flag)))));

    let node_a = Node::new_child(commander.root());
    add_conditional_edge(&commander, &node_a, branches, None);
    tokio::task::LocalSet::new()
        .run_until(drive_job(
            Arc::clone(commander.inner()),
            node_a,
            Arc::new(ReturnsKey("stop")),
        ))
        .await;

    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert!(!flag.load(Ordering::SeqCst));

    commander.exit(None, true).await;
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn handler_edge_target_restarts_the_same_instance_on_a_later_firing() {
    let commander = Commander::new();
    let runner = running(&commander).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let target = EdgeTarget::handler(Arc::new(CountingHandler(Arc::clone(&calls))));

    let node_a1 = Node::new_child(commander.root());
    add_edge(&commander, &node_a1, target.clone(), None);
    tokio::task::LocalSet::new()
        .run_until(drive_job(Arc::clone(commander.inner()), node_a1, Arc::new(NoOp)))
        .await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let node_a2 = Node::new_child(commander.root());
    add_edge(&commander, &node_a2, target, None);
    tokio::task::LocalSet::new()
        .run_until(drive_job(Arc::clone(commander.inner()), node_a2, Arc::new(NoOp)))
        .await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    commander.exit(None, true).await;
    runner.await.unwrap().unwrap();
}
