// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Loading and invoking previously exported functions.
//!
//! Import is symmetric to export: load once, call many times. The package is
//! deserialized eagerly at construction, so a missing or corrupt source
//! fails fast instead of on the first call.
//!
//! ## Example
//!
//! ```rust
//! use fnbridge::testing::{StubArray, StubRuntime};
//! use fnbridge::{call_args, export_function, import_function};
//!
//! let runtime = StubRuntime::new();
//! let dir = tempfile::tempdir()?;
//! let dest = dir.path().join("identity.fnpkg");
//!
//! export_function(runtime.clone(), &dest, |arrays| arrays.to_vec())
//!     .export(&call_args![StubArray::new(7)])?;
//!
//! let imported = import_function(runtime, &dest)?;
//! let results = imported.call(&call_args![StubArray::new(7)])?;
//! assert_eq!(results, vec![StubArray::new(7)]);
//! # Ok::<(), fnbridge::BridgeError>(())
//! ```

use std::path::{Path, PathBuf};

use crate::args::CallArgs;
use crate::error::Result;
use crate::guard::{marshal_args, VectorGuard};
use crate::runtime::NativeRuntime;

/// A callable deserialized from an exported package.
///
/// The engine handle is owned exclusively by this value and released exactly
/// once when it drops. Invocations are independent; the callable stays
/// usable for the handle's whole lifetime.
pub struct ImportedFunction<R: NativeRuntime> {
    runtime: R,
    function: Option<R::Function>,
    source: PathBuf,
}

impl<R: NativeRuntime> std::fmt::Debug for ImportedFunction<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedFunction")
            .field("source", &self.source)
            .field("loaded", &self.function.is_some())
            .finish()
    }
}

impl<R: NativeRuntime> ImportedFunction<R> {
    /// Deserialize a callable from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the package is missing or
    /// corrupt.
    pub fn new(runtime: R, source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let function = runtime.function_load(&source)?;

        tracing::debug!(source = %source.display(), "imported function package");

        Ok(Self {
            runtime,
            function: Some(function),
            source,
        })
    }

    /// Package the callable was loaded from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Invoke the callable.
    ///
    /// The argument convention matches the exporters: empty-named entries
    /// are positional in supply order, named entries populate the keyword
    /// map with the first value winning on duplicates. Ownership of the
    /// returned arrays transfers to the caller; all engine containers used
    /// for the call (including the engine-side result list) are released
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the engine fails to apply
    /// the function to the given arguments.
    pub fn call(&self, args: &CallArgs<R::Array>) -> Result<Vec<R::Array>> {
        tracing::debug!(
            source = %self.source.display(),
            positional = args.positional_values().count(),
            keywords = args.keyword_entries().len(),
            "calling imported function"
        );

        let (positional, keywords) = marshal_args(&self.runtime, args);
        let function = self
            .function
            .as_ref()
            .expect("function released only on drop");
        let result =
            self.runtime
                .function_apply(function, positional.handle(), keywords.handle())?;
        let result = VectorGuard::adopt(&self.runtime, result);
        Ok(result.values())
    }
}

impl<R: NativeRuntime> Drop for ImportedFunction<R> {
    fn drop(&mut self) {
        if let Some(function) = self.function.take() {
            self.runtime.function_free(function);
        }
    }
}

/// Deserialize a callable from `source`.
///
/// Equivalent to [`ImportedFunction::new`]; provided as the conventional
/// entry point.
///
/// # Errors
///
/// Returns [`crate::BridgeError::Native`] if the package is missing or
/// corrupt.
pub fn import_function<R: NativeRuntime>(
    runtime: R,
    source: impl Into<PathBuf>,
) -> Result<ImportedFunction<R>> {
    ImportedFunction::new(runtime, source)
}
