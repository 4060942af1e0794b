// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Instrumented in-process engine for tests and demos.
//!
//! ## Why This Module Exists
//!
//! The real engine is a linked C library that traces and serializes
//! functions; it cannot run in unit tests and says nothing about whether
//! this layer balanced its handle bookkeeping. [`StubRuntime`] is a
//! [`NativeRuntime`] that models just enough of the engine to make the
//! marshaling layer observable:
//!
//! 1. **Handle accounting**: every container acquisition and release is
//!    counted, and live handles are tracked by id, so a leak or double-free
//!    in the facades turns into a failing assertion instead of a heisenbug.
//! 2. **Observable packages**: exports write a small JSON manifest at the
//!    destination recording the positional order, keyword keys, shapeless
//!    flag, and specialization count, so "a file appeared with the right
//!    contents" is a plain filesystem check.
//! 3. **Failure injection**: any engine entry point can be switched to fail
//!    with a chosen message, exercising the release-on-error paths.
//!
//! Downstream crates can use it the same way to test their own export
//! pipelines without an engine install.
//!
//! ## Example
//!
//! ```rust
//! use fnbridge::testing::{StubArray, StubRuntime};
//! use fnbridge::{call_args, export_function};
//!
//! let runtime = StubRuntime::new();
//! let dir = tempfile::tempdir()?;
//! let dest = dir.path().join("f.fnpkg");
//!
//! export_function(runtime.clone(), &dest, |arrays| arrays.to_vec())
//!     .export(&call_args![StubArray::new(1), StubArray::new(2)])?;
//!
//! assert!(dest.exists());
//! assert!(runtime.counts().balanced());
//! # Ok::<(), fnbridge::BridgeError>(())
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::runtime::{NativeRuntime, TraceFn};

/// Array value used by the stub engine.
///
/// Real engine arrays are opaque device buffers; for observing the
/// marshaling layer an identity is all that matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StubArray {
    /// Identity of the array, preserved through containers and results.
    pub id: u32,
}

impl StubArray {
    /// Create an array with the given identity.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self { id }
    }
}

/// Per-class acquisition/release counters.
///
/// The marshaling invariant is `created == freed` for every class once all
/// facades and guards have dropped; [`HandleCounts::balanced`] checks it in
/// one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCounts {
    /// Array lists created.
    pub vectors_created: usize,
    /// Array lists freed.
    pub vectors_freed: usize,
    /// Keyword maps created.
    pub maps_created: usize,
    /// Keyword maps freed.
    pub maps_freed: usize,
    /// Closures created.
    pub closures_created: usize,
    /// Closures freed.
    pub closures_freed: usize,
    /// Multi-shot exporters created.
    pub exporters_created: usize,
    /// Multi-shot exporters freed.
    pub exporters_freed: usize,
    /// Imported functions loaded.
    pub functions_created: usize,
    /// Imported functions freed.
    pub functions_freed: usize,
}

impl HandleCounts {
    /// Total acquisitions across all handle classes.
    #[must_use]
    pub fn created(&self) -> usize {
        self.vectors_created
            + self.maps_created
            + self.closures_created
            + self.exporters_created
            + self.functions_created
    }

    /// Total releases across all handle classes.
    #[must_use]
    pub fn freed(&self) -> usize {
        self.vectors_freed
            + self.maps_freed
            + self.closures_freed
            + self.exporters_freed
            + self.functions_freed
    }

    /// Whether every acquisition has been matched by exactly one release.
    #[must_use]
    pub fn balanced(&self) -> bool {
        self.vectors_created == self.vectors_freed
            && self.maps_created == self.maps_freed
            && self.closures_created == self.closures_freed
            && self.exporters_created == self.exporters_freed
            && self.functions_created == self.functions_freed
    }
}

/// What the stub engine saw for the most recent export or specialization.
#[derive(Debug, Clone)]
pub struct ExportRecord {
    /// Destination of the package.
    pub destination: PathBuf,
    /// Positional arguments, in the order they reached the engine vector.
    pub positional: Vec<StubArray>,
    /// Keyword entries as inserted into the engine map.
    pub keywords: Vec<(String, StubArray)>,
    /// Keyword key list handed to the engine.
    pub keyword_keys: Vec<String>,
    /// Whether shapeless tracing was requested.
    pub shapeless: bool,
    /// Specializations traced into the package so far.
    pub specializations: usize,
}

/// On-disk package format written by the stub engine.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format: String,
    specializations: usize,
    shapeless: bool,
    positional: Vec<u32>,
    keyword_keys: Vec<String>,
}

const MANIFEST_FORMAT: &str = "fnbridge-stub/1";

#[derive(Default)]
struct StubState {
    counts: HandleCounts,
    next_handle: u64,
    live: HashSet<u64>,
    fail_export: Option<String>,
    fail_apply: Option<String>,
    fail_load: Option<String>,
    canned_results: Option<Vec<StubArray>>,
    last_export: Option<ExportRecord>,
}

impl StubState {
    fn alloc(&mut self) -> u64 {
        self.next_handle += 1;
        let id = self.next_handle;
        self.live.insert(id);
        id
    }

    fn release(&mut self, id: u64, class: &str) {
        assert!(
            self.live.remove(&id),
            "stub: {class} handle {id} released twice"
        );
    }
}

/// Engine array list handle.
pub struct StubVector {
    id: u64,
    values: Vec<StubArray>,
}

/// Engine keyword map handle.
pub struct StubMap {
    id: u64,
    entries: Vec<(String, StubArray)>,
}

/// Engine closure handle wrapping a host function.
pub struct StubClosure {
    id: u64,
    keys: Vec<String>,
    function: TraceFn<StubArray>,
}

/// Open multi-shot exporter handle.
pub struct StubExporter {
    id: u64,
    destination: PathBuf,
    shapeless: bool,
    function: TraceFn<StubArray>,
    specializations: usize,
    last_positional: Vec<u32>,
    last_keyword_keys: Vec<String>,
}

/// Imported function handle.
#[derive(Debug)]
pub struct StubFunction {
    id: u64,
    source: PathBuf,
}

/// Instrumented in-process engine.
///
/// Cheaply cloneable; clones share the same counters, failure switches, and
/// records, so a test can keep one handle for assertions while facades own
/// their own copies.
#[derive(Clone, Default)]
pub struct StubRuntime {
    state: Arc<Mutex<StubState>>,
}

impl StubRuntime {
    /// Create a fresh stub engine with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the acquisition/release counters.
    #[must_use]
    pub fn counts(&self) -> HandleCounts {
        self.state().counts
    }

    /// Number of currently live engine handles across all classes.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }

    /// Make export operations (single-shot export and exporter creation)
    /// fail with `message` until cleared.
    pub fn fail_exports(&self, message: impl Into<String>) {
        self.state().fail_export = Some(message.into());
    }

    /// Make apply operations (specialization traces and imported-function
    /// invocations) fail with `message` until cleared.
    pub fn fail_applies(&self, message: impl Into<String>) {
        self.state().fail_apply = Some(message.into());
    }

    /// Make package loads fail with `message` until cleared.
    pub fn fail_loads(&self, message: impl Into<String>) {
        self.state().fail_load = Some(message.into());
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_export = None;
        state.fail_apply = None;
        state.fail_load = None;
    }

    /// Fix the result list returned by imported-function invocations.
    ///
    /// Without canned results the stub echoes the positional arguments.
    pub fn provide_results(&self, results: Vec<StubArray>) {
        self.state().canned_results = Some(results);
    }

    /// What the engine saw for the most recent export or specialization.
    #[must_use]
    pub fn last_export(&self) -> Option<ExportRecord> {
        self.state().last_export.clone()
    }

    fn write_manifest(destination: &Path, manifest: &Manifest) -> Result<()> {
        let body = serde_json::to_string_pretty(manifest).map_err(|err| {
            BridgeError::native(format!("cannot serialize package manifest: {err}"))
        })?;
        std::fs::write(destination, body).map_err(|err| {
            BridgeError::native(format!(
                "cannot write package to {}: {err}",
                destination.display()
            ))
        })
    }

    fn read_manifest(source: &Path) -> Result<Manifest> {
        let body = std::fs::read_to_string(source).map_err(|err| {
            BridgeError::native(format!(
                "no function package at {}: {err}",
                source.display()
            ))
        })?;
        let manifest: Manifest = serde_json::from_str(&body).map_err(|err| {
            BridgeError::native(format!(
                "corrupt function package at {}: {err}",
                source.display()
            ))
        })?;
        if manifest.format != MANIFEST_FORMAT {
            return Err(BridgeError::native(format!(
                "unsupported package format {:?} at {}",
                manifest.format,
                source.display()
            )));
        }
        Ok(manifest)
    }
}

impl NativeRuntime for StubRuntime {
    type Array = StubArray;
    type Vector = StubVector;
    type Map = StubMap;
    type Closure = StubClosure;
    type Exporter = StubExporter;
    type Function = StubFunction;

    fn vector_new(&self) -> StubVector {
        let mut state = self.state();
        state.counts.vectors_created += 1;
        StubVector {
            id: state.alloc(),
            values: Vec::new(),
        }
    }

    fn vector_push(&self, vector: &mut StubVector, value: &StubArray) {
        vector.values.push(value.clone());
    }

    fn vector_values(&self, vector: &StubVector) -> Vec<StubArray> {
        vector.values.clone()
    }

    fn vector_free(&self, vector: StubVector) {
        let mut state = self.state();
        state.counts.vectors_freed += 1;
        state.release(vector.id, "vector");
    }

    fn map_new(&self) -> StubMap {
        let mut state = self.state();
        state.counts.maps_created += 1;
        StubMap {
            id: state.alloc(),
            entries: Vec::new(),
        }
    }

    fn map_insert(&self, map: &mut StubMap, key: &str, value: &StubArray) {
        debug_assert!(
            map.entries.iter().all(|(existing, _)| existing != key),
            "stub: duplicate key {key:?} reached the engine map"
        );
        map.entries.push((key.to_string(), value.clone()));
    }

    fn map_free(&self, map: StubMap) {
        let mut state = self.state();
        state.counts.maps_freed += 1;
        state.release(map.id, "map");
    }

    fn closure_new(&self, function: TraceFn<StubArray>) -> StubClosure {
        let mut state = self.state();
        state.counts.closures_created += 1;
        StubClosure {
            id: state.alloc(),
            keys: Vec::new(),
            function,
        }
    }

    fn closure_new_with_keywords(
        &self,
        keys: &[String],
        function: TraceFn<StubArray>,
    ) -> StubClosure {
        let mut state = self.state();
        state.counts.closures_created += 1;
        StubClosure {
            id: state.alloc(),
            keys: keys.to_vec(),
            function,
        }
    }

    fn closure_free(&self, closure: StubClosure) {
        let mut state = self.state();
        state.counts.closures_freed += 1;
        state.release(closure.id, "closure");
    }

    fn export_function(
        &self,
        destination: &Path,
        closure: &StubClosure,
        positional: &StubVector,
        keywords: &StubMap,
        shapeless: bool,
    ) -> Result<()> {
        if let Some(message) = self.state().fail_export.clone() {
            return Err(BridgeError::native(message));
        }

        // Trace outside the state lock: the host function is arbitrary code.
        let _traced = (closure.function)(&positional.values);

        let manifest = Manifest {
            format: MANIFEST_FORMAT.to_string(),
            specializations: 1,
            shapeless,
            positional: positional.values.iter().map(|a| a.id).collect(),
            keyword_keys: closure.keys.clone(),
        };
        Self::write_manifest(destination, &manifest)?;

        self.state().last_export = Some(ExportRecord {
            destination: destination.to_path_buf(),
            positional: positional.values.clone(),
            keywords: keywords.entries.clone(),
            keyword_keys: closure.keys.clone(),
            shapeless,
            specializations: 1,
        });
        Ok(())
    }

    fn exporter_new(
        &self,
        destination: &Path,
        closure: &StubClosure,
        shapeless: bool,
    ) -> Result<StubExporter> {
        if let Some(message) = self.state().fail_export.clone() {
            return Err(BridgeError::native(message));
        }
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(BridgeError::native(format!(
                    "destination directory missing: {}",
                    parent.display()
                )));
            }
        }

        let mut state = self.state();
        state.counts.exporters_created += 1;
        Ok(StubExporter {
            id: state.alloc(),
            destination: destination.to_path_buf(),
            shapeless,
            function: Arc::clone(&closure.function),
            specializations: 0,
            last_positional: Vec::new(),
            last_keyword_keys: Vec::new(),
        })
    }

    fn exporter_apply(
        &self,
        exporter: &mut StubExporter,
        positional: &StubVector,
        keywords: &StubMap,
    ) -> Result<()> {
        if let Some(message) = self.state().fail_apply.clone() {
            return Err(BridgeError::native(message));
        }

        let _traced = (exporter.function)(&positional.values);

        exporter.specializations += 1;
        exporter.last_positional = positional.values.iter().map(|a| a.id).collect();
        exporter.last_keyword_keys = keywords
            .entries
            .iter()
            .map(|(key, _)| key.clone())
            .collect();

        self.state().last_export = Some(ExportRecord {
            destination: exporter.destination.clone(),
            positional: positional.values.clone(),
            keywords: keywords.entries.clone(),
            keyword_keys: exporter.last_keyword_keys.clone(),
            shapeless: exporter.shapeless,
            specializations: exporter.specializations,
        });
        Ok(())
    }

    fn exporter_free(&self, exporter: StubExporter) {
        // Finalize: flush the package. Release cannot fail, so flush
        // problems are reported out-of-band.
        let manifest = Manifest {
            format: MANIFEST_FORMAT.to_string(),
            specializations: exporter.specializations,
            shapeless: exporter.shapeless,
            positional: exporter.last_positional.clone(),
            keyword_keys: exporter.last_keyword_keys.clone(),
        };
        if let Err(err) = Self::write_manifest(&exporter.destination, &manifest) {
            tracing::warn!(
                destination = %exporter.destination.display(),
                error = %err,
                "failed to flush package on exporter release"
            );
        }

        let mut state = self.state();
        state.counts.exporters_freed += 1;
        state.release(exporter.id, "exporter");
    }

    fn function_load(&self, source: &Path) -> Result<StubFunction> {
        if let Some(message) = self.state().fail_load.clone() {
            return Err(BridgeError::native(message));
        }

        let _manifest = Self::read_manifest(source)?;

        let mut state = self.state();
        state.counts.functions_created += 1;
        Ok(StubFunction {
            id: state.alloc(),
            source: source.to_path_buf(),
        })
    }

    fn function_apply(
        &self,
        function: &StubFunction,
        positional: &StubVector,
        _keywords: &StubMap,
    ) -> Result<StubVector> {
        let mut state = self.state();
        if let Some(message) = state.fail_apply.clone() {
            return Err(BridgeError::native(message));
        }

        tracing::trace!(source = %function.source.display(), "stub applying function");

        let values = state
            .canned_results
            .clone()
            .unwrap_or_else(|| positional.values.clone());
        state.counts.vectors_created += 1;
        Ok(StubVector {
            id: state.alloc(),
            values,
        })
    }

    fn function_free(&self, function: StubFunction) {
        let mut state = self.state();
        state.counts.functions_freed += 1;
        state.release(function.id, "function");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_balance() {
        let runtime = StubRuntime::new();
        let vector = runtime.vector_new();
        let map = runtime.map_new();
        assert_eq!(runtime.live_handles(), 2);
        assert!(!runtime.counts().balanced());

        runtime.vector_free(vector);
        runtime.map_free(map);
        assert_eq!(runtime.live_handles(), 0);
        assert!(runtime.counts().balanced());
    }

    #[test]
    fn test_vector_preserves_order() {
        let runtime = StubRuntime::new();
        let mut vector = runtime.vector_new();
        runtime.vector_push(&mut vector, &StubArray::new(3));
        runtime.vector_push(&mut vector, &StubArray::new(1));
        runtime.vector_push(&mut vector, &StubArray::new(2));

        assert_eq!(
            runtime.vector_values(&vector),
            vec![StubArray::new(3), StubArray::new(1), StubArray::new(2)]
        );
        runtime.vector_free(vector);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_detected() {
        let runtime = StubRuntime::new();
        let vector = runtime.vector_new();
        let stolen = StubVector {
            id: vector.id,
            values: Vec::new(),
        };
        runtime.vector_free(vector);
        runtime.vector_free(stolen);
    }

    #[test]
    fn test_manifest_round_trip() {
        let runtime = StubRuntime::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("f.fnpkg");

        let closure = runtime.closure_new_with_keywords(
            &["scale".to_string()],
            Arc::new(|arrays: &[StubArray]| arrays.to_vec()),
        );
        let mut positional = runtime.vector_new();
        runtime.vector_push(&mut positional, &StubArray::new(9));
        let keywords = runtime.map_new();

        runtime
            .export_function(&dest, &closure, &positional, &keywords, true)
            .expect("export");

        let manifest = StubRuntime::read_manifest(&dest).expect("manifest");
        assert_eq!(manifest.specializations, 1);
        assert!(manifest.shapeless);
        assert_eq!(manifest.positional, vec![9]);
        assert_eq!(manifest.keyword_keys, vec!["scale".to_string()]);

        runtime.closure_free(closure);
        runtime.vector_free(positional);
        runtime.map_free(keywords);
        assert!(runtime.counts().balanced());
    }

    #[test]
    fn test_load_missing_package_fails() {
        let runtime = StubRuntime::new();
        let err = runtime
            .function_load(Path::new("/nonexistent/missing.fnpkg"))
            .expect_err("load should fail");
        assert!(matches!(err, BridgeError::Native { .. }));
    }
}
