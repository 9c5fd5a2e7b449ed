// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::job::JobBody;
use crate::node::Node;

/// A job and the node already created (and attached to its parent) for it
/// (spec.md §3: node creation happens at submission time, not at dequeue
/// time — invariant 1 requires the parent link to exist from the start).
pub(crate) struct QueueItem {
    pub node: Arc<Node>,
    pub body: Arc<dyn JobBody>,
}

/// FIFO job queue, bounded or unbounded (spec.md §2: `JobQueue`).
///
/// An unbounded sender's `send` is synchronous and callable from any
/// thread, which is what makes the threadsafe bridge possible without a
/// runtime context (spec.md §4.6). A bounded sender instead offers
/// `blocking_send`, tokio's documented escape hatch for exactly this case:
/// calling into an async channel from a plain OS thread.
pub(crate) enum QueueSender {
    Unbounded(mpsc::UnboundedSender<QueueItem>),
    Bounded(mpsc::Sender<QueueItem>),
}

pub(crate) enum QueueReceiver {
    Unbounded(mpsc::UnboundedReceiver<QueueItem>),
    Bounded(mpsc::Receiver<QueueItem>),
}

pub(crate) fn unbounded() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
}

pub(crate) fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
}

impl QueueSender {
    /// In-loop enqueue. Suspends the caller when the queue is bounded and
    /// full (spec.md §5).
    pub(crate) async fn send(&self, item: QueueItem) {
        let outcome = match self {
            QueueSender::Unbounded(tx) => tx.send(item).map_err(|_| ()),
            QueueSender::Bounded(tx) => tx.send(item).await.map_err(|_| ()),
        };
        if outcome.is_err() {
            log::debug!(target: "commander::queue", "job dropped: commander loop has exited");
        }
    }

    /// Cross-thread enqueue (spec.md §4.6). Blocks the calling OS thread
    /// when the queue is bounded and full; panics if called from inside an
    /// async task (tokio's `blocking_send` contract) — callers must only
    /// reach this through `*_threadsafe` entry points, which are documented
    /// as foreign-thread-only.
    pub(crate) fn send_blocking(&self, item: QueueItem) {
        let outcome = match self {
            QueueSender::Unbounded(tx) => tx.send(item).map_err(|_| ()),
            QueueSender::Bounded(tx) => tx.blocking_send(item).map_err(|_| ()),
        };
        if outcome.is_err() {
            log::debug!(target: "commander::queue", "job dropped: commander loop has exited");
        }
    }
}

impl QueueReceiver {
    pub(crate) async fn recv(&mut self) -> Option<QueueItem> {
        match self {
            QueueReceiver::Unbounded(rx) => rx.recv().await,
            QueueReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}
