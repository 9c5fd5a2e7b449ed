// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//
// Adapted from the teacher's `async_latch` crate
// (`examples/pantsbuild-pants/src/rust/async_latch/src/lib.rs`): a
// trigger-once condition that releases any awaiters, built on a
// `tokio::sync::watch` channel whose `Sender` drop signals the trigger.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// A condition that can be triggered once to release anyone waiting on it.
/// Used as the Commander's shutdown latch (spec.md §4.1/§5: `exit`).
#[derive(Clone)]
pub struct AsyncLatch {
    sender: Arc<Mutex<Option<watch::Sender<()>>>>,
    receiver: watch::Receiver<()>,
}

impl AsyncLatch {
    pub fn new() -> AsyncLatch {
        let (sender, receiver) = watch::channel(());
        AsyncLatch {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    /// Marks this latch triggered. All calls after the first are no-ops.
    pub fn trigger(&self) {
        self.sender.lock().take();
    }

    /// Waits for another task/thread to trigger this latch.
    pub async fn triggered(&self) {
        let mut receiver = self.receiver.clone();
        while receiver.changed().await.is_ok() {}
    }

    pub fn poll_triggered(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Default for AsyncLatch {
    fn default() -> Self {
        AsyncLatch::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn triggered_returns_immediately_after_trigger() {
        let latch = AsyncLatch::new();
        latch.trigger();
        latch.triggered().await;
    }

    #[tokio::test]
    async fn triggered_unblocks_a_concurrent_waiter() {
        let latch = AsyncLatch::new();
        let waiter = latch.clone();
        let handle = tokio::spawn(async move {
            waiter.triggered().await;
        });
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        latch.trigger();
        handle.await.unwrap();
    }

    #[test]
    fn poll_triggered_reflects_state() {
        let latch = AsyncLatch::new();
        assert!(!latch.poll_triggered());
        latch.trigger();
        assert!(latch.poll_triggered());
    }
}
