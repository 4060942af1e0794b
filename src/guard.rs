// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Scoped acquisition and release of engine containers.
//!
//! Containers acquired for a single call (argument vectors, keyword maps,
//! closures) must be released on every exit path, including early returns on
//! engine failure and unwinds out of host code. These guards tie the release
//! to `Drop` so the facades cannot leak or double-free a handle.

use crate::runtime::{NativeRuntime, TraceFn};

/// Owns an engine array list for the duration of one call.
pub(crate) struct VectorGuard<'r, R: NativeRuntime> {
    runtime: &'r R,
    handle: Option<R::Vector>,
}

impl<'r, R: NativeRuntime> VectorGuard<'r, R> {
    pub(crate) fn new(runtime: &'r R) -> Self {
        Self {
            runtime,
            handle: Some(runtime.vector_new()),
        }
    }

    /// Take ownership of a vector the engine already allocated (e.g. an
    /// apply result) so it is released with the same discipline.
    pub(crate) fn adopt(runtime: &'r R, handle: R::Vector) -> Self {
        Self {
            runtime,
            handle: Some(handle),
        }
    }

    pub(crate) fn push(&mut self, value: &R::Array) {
        let handle = self.handle.as_mut().expect("vector released only on drop");
        self.runtime.vector_push(handle, value);
    }

    pub(crate) fn handle(&self) -> &R::Vector {
        self.handle.as_ref().expect("vector released only on drop")
    }

    pub(crate) fn values(&self) -> Vec<R::Array> {
        self.runtime.vector_values(self.handle())
    }
}

impl<R: NativeRuntime> Drop for VectorGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.runtime.vector_free(handle);
        }
    }
}

/// Owns an engine keyword map for the duration of one call.
pub(crate) struct MapGuard<'r, R: NativeRuntime> {
    runtime: &'r R,
    handle: Option<R::Map>,
}

impl<'r, R: NativeRuntime> MapGuard<'r, R> {
    pub(crate) fn new(runtime: &'r R) -> Self {
        Self {
            runtime,
            handle: Some(runtime.map_new()),
        }
    }

    pub(crate) fn insert(&mut self, key: &str, value: &R::Array) {
        let handle = self.handle.as_mut().expect("map released only on drop");
        self.runtime.map_insert(handle, key, value);
    }

    pub(crate) fn handle(&self) -> &R::Map {
        self.handle.as_ref().expect("map released only on drop")
    }
}

impl<R: NativeRuntime> Drop for MapGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.runtime.map_free(handle);
        }
    }
}

/// Owns an engine closure for the duration of one call.
pub(crate) struct ClosureGuard<'r, R: NativeRuntime> {
    runtime: &'r R,
    handle: Option<R::Closure>,
}

impl<'r, R: NativeRuntime> ClosureGuard<'r, R> {
    pub(crate) fn new(runtime: &'r R, function: TraceFn<R::Array>) -> Self {
        Self {
            runtime,
            handle: Some(runtime.closure_new(function)),
        }
    }

    pub(crate) fn with_keywords(
        runtime: &'r R,
        keys: &[String],
        function: TraceFn<R::Array>,
    ) -> Self {
        Self {
            runtime,
            handle: Some(runtime.closure_new_with_keywords(keys, function)),
        }
    }

    pub(crate) fn handle(&self) -> &R::Closure {
        self.handle
            .as_ref()
            .expect("closure released only on drop")
    }
}

impl<R: NativeRuntime> Drop for ClosureGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.runtime.closure_free(handle);
        }
    }
}

/// Marshal a [`crate::CallArgs`] into freshly acquired engine containers.
///
/// Positional values keep their supply order; keyword entries arrive already
/// deduplicated (first value wins). Both guards release on drop.
pub(crate) fn marshal_args<'r, R: NativeRuntime>(
    runtime: &'r R,
    args: &crate::CallArgs<R::Array>,
) -> (VectorGuard<'r, R>, MapGuard<'r, R>) {
    let mut positional = VectorGuard::new(runtime);
    for value in args.positional_values() {
        positional.push(value);
    }

    let mut keywords = MapGuard::new(runtime);
    for (key, value) in args.keyword_entries() {
        keywords.insert(key, value);
    }

    (positional, keywords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubArray, StubRuntime};
    use crate::CallArgs;
    use std::sync::Arc;

    #[test]
    fn test_guards_release_on_drop() {
        let runtime = StubRuntime::new();
        {
            let mut vector = VectorGuard::new(&runtime);
            vector.push(&StubArray::new(1));
            let mut map = MapGuard::new(&runtime);
            map.insert("k", &StubArray::new(2));
            let _closure = ClosureGuard::new(&runtime, Arc::new(|xs: &[StubArray]| xs.to_vec()));
        }
        assert_eq!(runtime.live_handles(), 0);
        assert!(runtime.counts().balanced());
    }

    #[test]
    fn test_guards_release_on_unwind() {
        let runtime = StubRuntime::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut vector = VectorGuard::new(&runtime);
            vector.push(&StubArray::new(1));
            panic!("host code unwound");
        }));
        assert!(result.is_err());
        assert_eq!(runtime.live_handles(), 0);
    }

    #[test]
    fn test_marshal_args_partitions() {
        let runtime = StubRuntime::new();
        let args = CallArgs::new()
            .positional(StubArray::new(1))
            .keyword("scale", StubArray::new(2))
            .positional(StubArray::new(3))
            .keyword("scale", StubArray::new(4));

        let (positional, _keywords) = marshal_args(&runtime, &args);
        let values = positional.values();
        assert_eq!(values, vec![StubArray::new(1), StubArray::new(3)]);
    }
}
