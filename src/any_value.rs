// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::any::Any;
use std::fmt;

use crate::error::CommanderError;

/// An opaque, type-erased value slot.
///
/// Realizes the spec's dynamically typed `result`/`exception`/`data` slots
/// (spec.md §3) in a statically typed host language: a boxed [`Any`] with
/// typed accessors that return [`CommanderError::TypeMismatch`] instead of
/// panicking on a mismatched downcast.
pub struct AnyValue(Box<dyn Any + Send>);

impl AnyValue {
    pub fn new<T: Any + Send>(value: T) -> Self {
        AnyValue(Box::new(value))
    }

    /// The unit value, used as the default `result` for bodies that don't
    /// produce one (spec.md: "`result`: ... `null` until completion").
    pub fn unit() -> Self {
        AnyValue::new(())
    }

    pub fn downcast<T: Any + Send>(self) -> Result<T, CommanderError> {
        self.0
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| CommanderError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn downcast_ref<T: Any + Send>(&self) -> Result<&T, CommanderError> {
        self.0
            .downcast_ref::<T>()
            .ok_or(CommanderError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn is<T: Any + Send>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AnyValue(..)")
    }
}
