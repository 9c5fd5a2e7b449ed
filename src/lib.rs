// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//
// An in-process task-flow orchestrator: a single cooperative Commander
// loop drives a tree of Jobs (queued, resource-owning units of work) and
// Handlers (directly invoked, optionally restartable units), propagating
// completion up the tree and dispatching a fixed set of lifecycle
// callbacks along the way. `edge` layers a small DAG/cycle overlay of
// successor wiring on top, without the parent/child tree itself ever
// becoming cyclic.
//
// Module layout mirrors the teacher's: one file per concern, `tests`
// submodules next to the code they exercise, a thin `lib.rs` that only
// declares modules and re-exports the public surface.

mod any_value;
mod bridge;
mod callback;
mod commander;
mod edge;
mod error;
mod handler;
mod id;
mod job;
mod latch;
mod node;
mod queue;
mod runner;
mod scope;
mod state;

#[cfg(feature = "logging")]
mod logging;

pub use any_value::AnyValue;
pub use callback::{
    AsyncCallback, Callback, CallbackContext, CallbackDescriptor, CallbackRegistry, SyncCallback,
};
pub use commander::{Commander, TaskCounts};
pub use edge::{add_conditional_edge, add_edge, EdgeTarget, HandlerSlot};
pub use error::{CommanderError, TaskError};
pub use handler::{HandlerBody, HandlerContext, HandlerFailure, HandlerHandle};
pub use id::TaskId;
pub use job::{JobBody, JobContext, NO_BLOCKING_PASSWORD};
pub use node::Node;
pub use state::{Event, State};

#[cfg(feature = "logging")]
pub use logging::install_default_logger;
