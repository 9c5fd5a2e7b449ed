// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//
// Ambient logging, wired the way the teacher wires its own binaries: the
// crate itself only ever calls the `log` facade (see `callback.rs`,
// `job.rs`, `queue.rs`); an application embedding a Commander picks its own
// subscriber. This module is an opt-in convenience for examples and tests
// that don't want to.

/// Installs `env_logger` as the global logger, honoring `RUST_LOG` the
/// usual way. Idempotent: a second call is a harmless no-op.
pub fn install_default_logger() {
    let _ = env_logger::try_init();
}
