// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! The native array engine contract.
//!
//! ## Why This Module Exists
//!
//! The engine that actually performs tracing, graph compilation, and package
//! serialization lives behind a C interface; this crate only marshals into
//! and out of it. [`NativeRuntime`] captures that boundary as a trait so the
//! facades in [`crate::export`] and [`crate::import`] are written once and
//! run against any engine: the linked C library (`ffi` module, feature
//! `native`) or the instrumented in-process engine in [`crate::testing`].
//!
//! ## Resource Discipline
//!
//! Every handle returned by a `*_new`, `*_load`, or `*_apply` method is owned
//! by the caller and must be released through the matching `*_free` method
//! exactly once. The facades enforce this with scoped guards; engine
//! implementations must tolerate release in any order. `*_free` is
//! infallible: engines that can fail while flushing on release report it
//! out-of-band (logging), not through the call.
//!
//! Containers (vectors, maps, closures) live for a single call. Exporter and
//! function handles live for the lifetime of the facade that created them.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Host function handed to the engine for tracing.
///
/// The engine invokes it with concrete example arguments and records the
/// operations it performs. The function may be called more than once (once
/// per traced specialization) and from the engine's context, hence the
/// `Send + Sync` bounds.
pub type TraceFn<A> = Arc<dyn Fn(&[A]) -> Vec<A> + Send + Sync>;

/// Operations the native array engine exposes for function export/import.
///
/// Implementations wrap each fallible engine entry point so that a non-zero
/// status becomes [`crate::BridgeError::Native`] carrying the engine's
/// message. Array values are opaque to this layer; their memory is owned by
/// the engine and the associated `Array` type is expected to be a cheap
/// handle (`Clone` retains, drop releases).
pub trait NativeRuntime {
    /// Array value crossing the boundary.
    type Array: Clone;
    /// Ordered array list container.
    type Vector;
    /// String-to-array map container.
    type Map;
    /// Engine-side wrapper around a host [`TraceFn`].
    type Closure;
    /// Open multi-shot exporter bound to a destination.
    type Exporter;
    /// Deserialized callable loaded from a package.
    type Function;

    /// Create an empty array list.
    fn vector_new(&self) -> Self::Vector;

    /// Append a value to an array list, preserving insertion order.
    fn vector_push(&self, vector: &mut Self::Vector, value: &Self::Array);

    /// Copy the values out of an array list.
    fn vector_values(&self, vector: &Self::Vector) -> Vec<Self::Array>;

    /// Release an array list.
    fn vector_free(&self, vector: Self::Vector);

    /// Create an empty string-to-array map.
    fn map_new(&self) -> Self::Map;

    /// Insert an entry into a map. Keys are unique; the facades deduplicate
    /// before inserting.
    fn map_insert(&self, map: &mut Self::Map, key: &str, value: &Self::Array);

    /// Release a map.
    fn map_free(&self, map: Self::Map);

    /// Wrap a host function as an engine closure.
    fn closure_new(&self, function: TraceFn<Self::Array>) -> Self::Closure;

    /// Wrap a host function as a keyword-accepting engine closure.
    ///
    /// `keys` carries the deduplicated keyword names, in first-appearance
    /// order, that the engine maps onto the function's trailing parameters.
    fn closure_new_with_keywords(
        &self,
        keys: &[String],
        function: TraceFn<Self::Array>,
    ) -> Self::Closure;

    /// Release a closure.
    fn closure_free(&self, closure: Self::Closure);

    /// Trace `closure` with the given example arguments and serialize the
    /// result to `destination` in one shot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the engine rejects the
    /// trace or cannot write the package.
    fn export_function(
        &self,
        destination: &Path,
        closure: &Self::Closure,
        positional: &Self::Vector,
        keywords: &Self::Map,
        shapeless: bool,
    ) -> Result<()>;

    /// Open a multi-shot exporter for `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the destination cannot be
    /// opened for writing.
    fn exporter_new(
        &self,
        destination: &Path,
        closure: &Self::Closure,
        shapeless: bool,
    ) -> Result<Self::Exporter>;

    /// Trace one more specialization against an open exporter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the trace fails.
    fn exporter_apply(
        &self,
        exporter: &mut Self::Exporter,
        positional: &Self::Vector,
        keywords: &Self::Map,
    ) -> Result<()>;

    /// Finalize and release an exporter, flushing the package.
    fn exporter_free(&self, exporter: Self::Exporter);

    /// Deserialize a callable from a previously exported package.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if `source` is missing or the
    /// package is corrupt.
    fn function_load(&self, source: &Path) -> Result<Self::Function>;

    /// Invoke a loaded function. The returned vector is owned by the caller
    /// and must be released via [`NativeRuntime::vector_free`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the engine fails to apply
    /// the function to the given arguments.
    fn function_apply(
        &self,
        function: &Self::Function,
        positional: &Self::Vector,
        keywords: &Self::Map,
    ) -> Result<Self::Vector>;

    /// Release a loaded function.
    fn function_free(&self, function: Self::Function);
}
