// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, process-unique identifier for a [`crate::Node`].
///
/// Displayed as a fixed-width 16 hex digit string, matching the
/// `SpanId` convention in the teacher's `workunit_store` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TaskId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The id reserved for a Commander's own root node.
    pub(crate) const ROOT: TaskId = TaskId(0);
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_assigned_in_increasing_order() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
    }

    #[test]
    fn display_is_16_hex_digits() {
        let id = TaskId::next();
        let s = id.to_string();
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
