use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::job::{JobBody, JobContext};
use crate::node::Node;

struct Echo(i32);

#[async_trait::async_trait]
impl JobBody for Echo {
    async fn task(
        &self,
        _ctx: JobContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        Ok(AnyValue::new(self.0))
    }
}

/// An `Echo` that also hands its own node out through a shared slot, so a
/// test can inspect `node.result`/`node.state` after `run` returns — `run`
/// only ever returns a Commander-level exit value (spec.md §8: "`run`
/// returns exactly the `return_result` supplied to the shutdown that ended
/// the loop; default is `null`"), not any particular job's own result.
struct EchoWithNode {
    value: i32,
    node: Arc<Mutex<Option<Arc<Node>>>>,
}

#[async_trait::async_trait]
impl JobBody for EchoWithNode {
    async fn task(
        &self,
        ctx: JobContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        *self.node.lock() = Some(Arc::clone(ctx.node()));
        Ok(AnyValue::new(self.value))
    }
}

#[tokio::test]
async fn a_freshly_built_commander_is_empty_and_not_running() {
    let commander = Commander::new();
    assert!(commander.is_empty());
    assert!(!commander.running_status());
}

#[tokio::test]
async fn put_job_before_run_is_rejected() {
    let commander = Commander::new();
    let err = commander.put_job(Arc::new(Echo(1))).await.unwrap_err();
    assert!(matches!(err, CommanderError::NotRunning));
}

#[tokio::test]
async fn running_a_commander_twice_concurrently_is_rejected() {
    let commander = Commander::new();
    let first = {
        let commander = commander.clone();
        tokio::spawn(async move { commander.run(vec![], false).await })
    };
    // Give the first `run` a chance to claim `running` before we try again.
    tokio::task::yield_now().await;
    let second = commander.run(vec![], true).await;
    assert!(matches!(second, Err(CommanderError::AlreadyRunning)));

    commander.exit(None, true).await;
    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn echo_job_records_its_result_and_drains_the_commander() {
    let commander = Commander::new();
    let node_slot = Arc::new(Mutex::new(None));
    commander
        .run(
            vec![Arc::new(EchoWithNode {
                value: 42,
                node: Arc::clone(&node_slot),
            })],
            true,
        )
        .await
        .unwrap();

    let node = node_slot.lock().clone().expect("task recorded its node");
    assert_eq!(node.state(), State::Done);
    assert_eq!(
        node.with_result(|r| r.unwrap().downcast_ref::<i32>().ok().copied()),
        Some(42)
    );
    assert!(commander.is_empty());
}

#[tokio::test]
async fn run_with_no_explicit_exit_defaults_to_a_unit_return_value() {
    let commander = Commander::new();
    let result = commander
        .run(vec![Arc::new(Echo(42))], true)
        .await
        .unwrap();
    assert!(result.is::<()>());
}

#[tokio::test]
async fn exit_with_a_return_result_is_what_run_reports_back() {
    let commander = Commander::new();
    let runner = {
        let commander = commander.clone();
        tokio::spawn(async move { commander.run(vec![], false).await })
    };
    tokio::task::yield_now().await;
    commander.exit(Some(AnyValue::new("bye")), true).await;
    let result = runner.await.unwrap().unwrap();
    assert_eq!(result.downcast_ref::<&str>().ok().copied(), Some("bye"));
}

struct Forever;

#[async_trait::async_trait]
impl crate::handler::HandlerBody for Forever {
    async fn call(
        &self,
        _ctx: crate::handler::HandlerContext,
    ) -> Result<AnyValue, Box<dyn std::error::Error + Send + Sync>> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

#[tokio::test]
async fn task_count_reports_a_running_handler() {
    let commander = Commander::new();
    let runner = {
        let commander = commander.clone();
        tokio::spawn(async move { commander.run(vec![], false).await })
    };
    tokio::task::yield_now().await;
    let _handle = commander.call_handler(Arc::new(Forever)).unwrap();
    // `call_handler` only hands the new node off to the loop thread over a
    // channel (see `CommanderInner::start_handler`); one extra yield lets
    // the loop pick it up and spawn its cycle before we inspect state.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let counts = commander.task_count();
    assert_eq!(counts.running, 1);

    commander.exit(None, true).await;
    runner.await.unwrap().unwrap();
}
