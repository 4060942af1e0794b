// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Exporting traced functions to serialized packages.
//!
//! Two facades cover the engine's two export entry points:
//!
//! - [`FunctionExporter`] traces a function once and writes the package in a
//!   single shot. All engine work is deferred to [`FunctionExporter::export`],
//!   which consumes the exporter: one instance, one package.
//! - [`MultiFunctionExporter`] keeps the destination open so several traced
//!   specializations (one per argument-shape combination) accumulate in the
//!   same package. The package is finalized and flushed when the exporter is
//!   dropped.
//!
//! ## Example
//!
//! ```rust
//! use fnbridge::testing::StubRuntime;
//! use fnbridge::{call_args, export_function};
//!
//! let runtime = StubRuntime::new();
//! let dir = tempfile::tempdir()?;
//! let dest = dir.path().join("double.fnpkg");
//!
//! let exporter = export_function(runtime, &dest, |arrays| arrays.to_vec());
//! exporter.export(&call_args![fnbridge::testing::StubArray::new(1)])?;
//!
//! assert!(dest.exists());
//! # Ok::<(), fnbridge::BridgeError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::args::CallArgs;
use crate::error::Result;
use crate::guard::{marshal_args, ClosureGuard};
use crate::runtime::{NativeRuntime, TraceFn};

/// Options controlling how a function is traced and serialized.
#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    /// Trace without baking concrete argument shapes into the package, so
    /// the imported function accepts a range of shapes.
    pub shapeless: bool,
}

impl ExportConfig {
    /// Create a configuration with defaults (shape-specialized tracing).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable shapeless tracing.
    #[must_use]
    pub fn with_shapeless(mut self, shapeless: bool) -> Self {
        self.shapeless = shapeless;
        self
    }

    /// Build configuration from environment variables.
    ///
    /// `FNBRIDGE_SHAPELESS` set to `1` or `true` turns shapeless tracing on
    /// by default, which is useful for batch export jobs that cannot thread
    /// configuration through every call site.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("FNBRIDGE_SHAPELESS") {
            if val == "1" || val.eq_ignore_ascii_case("true") {
                config.shapeless = true;
            }
        }
        config
    }
}

/// Single-shot exporter: one traced specialization, one package.
///
/// Construction is infallible; the engine is only involved when
/// [`FunctionExporter::export`] runs. `export` consumes the exporter, so a
/// second trace against the same destination is a compile error rather than
/// engine-defined behavior.
pub struct FunctionExporter<R: NativeRuntime> {
    runtime: R,
    destination: PathBuf,
    config: ExportConfig,
    function: TraceFn<R::Array>,
}

impl<R: NativeRuntime> FunctionExporter<R> {
    /// Bind `function` to a destination with default options.
    pub fn new(
        runtime: R,
        destination: impl Into<PathBuf>,
        function: impl Fn(&[R::Array]) -> Vec<R::Array> + Send + Sync + 'static,
    ) -> Self {
        Self::with_config(runtime, destination, ExportConfig::default(), function)
    }

    /// Bind `function` to a destination with explicit options.
    pub fn with_config(
        runtime: R,
        destination: impl Into<PathBuf>,
        config: ExportConfig,
        function: impl Fn(&[R::Array]) -> Vec<R::Array> + Send + Sync + 'static,
    ) -> Self {
        Self {
            runtime,
            destination: destination.into(),
            config,
            function: Arc::new(function),
        }
    }

    /// Destination the package will be written to.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Trace the bound function with `args` as example arguments and write
    /// the serialized package to the destination.
    ///
    /// Entries with empty names join the positional list in supply order;
    /// named entries populate the keyword map, first value winning on
    /// duplicates. All engine containers acquired for the call are released
    /// before this returns, on success and failure alike.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the engine rejects the
    /// trace or cannot write the package.
    pub fn export(self, args: &CallArgs<R::Array>) -> Result<()> {
        tracing::debug!(
            destination = %self.destination.display(),
            positional = args.positional_values().count(),
            keywords = args.keyword_entries().len(),
            shapeless = self.config.shapeless,
            "exporting function"
        );

        let (positional, keywords) = marshal_args(&self.runtime, args);
        let keys = args.keyword_keys();
        let closure =
            ClosureGuard::with_keywords(&self.runtime, &keys, Arc::clone(&self.function));

        self.runtime.export_function(
            &self.destination,
            closure.handle(),
            positional.handle(),
            keywords.handle(),
            self.config.shapeless,
        )
    }
}

/// Multi-shot exporter: several traced specializations in one package.
///
/// Construction opens the destination through the engine and can fail.
/// Each [`MultiFunctionExporter::export`] call appends one specialization;
/// dropping the exporter finalizes and flushes the package, releasing the
/// engine handle exactly once.
pub struct MultiFunctionExporter<R: NativeRuntime> {
    runtime: R,
    exporter: Option<R::Exporter>,
    destination: PathBuf,
}

impl<R: NativeRuntime> std::fmt::Debug for MultiFunctionExporter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiFunctionExporter")
            .field("destination", &self.destination)
            .field("open", &self.exporter.is_some())
            .finish()
    }
}

impl<R: NativeRuntime> MultiFunctionExporter<R> {
    /// Open a multi-shot exporter with default options.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the engine cannot open the
    /// destination.
    pub fn new(
        runtime: R,
        destination: impl Into<PathBuf>,
        function: impl Fn(&[R::Array]) -> Vec<R::Array> + Send + Sync + 'static,
    ) -> Result<Self> {
        Self::with_config(runtime, destination, ExportConfig::default(), function)
    }

    /// Open a multi-shot exporter with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the engine cannot open the
    /// destination.
    pub fn with_config(
        runtime: R,
        destination: impl Into<PathBuf>,
        config: ExportConfig,
        function: impl Fn(&[R::Array]) -> Vec<R::Array> + Send + Sync + 'static,
    ) -> Result<Self> {
        let destination = destination.into();
        let function: TraceFn<R::Array> = Arc::new(function);

        let exporter = {
            let closure = ClosureGuard::new(&runtime, Arc::clone(&function));
            runtime.exporter_new(&destination, closure.handle(), config.shapeless)
        }?;

        tracing::debug!(
            destination = %destination.display(),
            shapeless = config.shapeless,
            "opened multi-shot exporter"
        );

        Ok(Self {
            runtime,
            exporter: Some(exporter),
            destination,
        })
    }

    /// Destination the package will be written to.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Trace one more specialization with `args` as example arguments.
    ///
    /// The argument convention matches [`FunctionExporter::export`]. The
    /// package is not flushed until the exporter drops.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Native`] if the trace fails. The
    /// exporter stays open; earlier specializations are unaffected.
    pub fn export(&mut self, args: &CallArgs<R::Array>) -> Result<()> {
        tracing::debug!(
            destination = %self.destination.display(),
            positional = args.positional_values().count(),
            keywords = args.keyword_entries().len(),
            "appending traced specialization"
        );

        let (positional, keywords) = marshal_args(&self.runtime, args);
        let exporter = self
            .exporter
            .as_mut()
            .expect("exporter released only on drop");
        self.runtime
            .exporter_apply(exporter, positional.handle(), keywords.handle())
    }
}

impl<R: NativeRuntime> Drop for MultiFunctionExporter<R> {
    fn drop(&mut self) {
        if let Some(exporter) = self.exporter.take() {
            self.runtime.exporter_free(exporter);
        }
    }
}

/// Bind `function` to a destination for single-shot export.
///
/// Equivalent to [`FunctionExporter::new`]; provided as the conventional
/// entry point.
pub fn export_function<R: NativeRuntime>(
    runtime: R,
    destination: impl Into<PathBuf>,
    function: impl Fn(&[R::Array]) -> Vec<R::Array> + Send + Sync + 'static,
) -> FunctionExporter<R> {
    FunctionExporter::new(runtime, destination, function)
}

/// Bind `function` to a destination for single-shot export with options.
pub fn export_function_with<R: NativeRuntime>(
    runtime: R,
    destination: impl Into<PathBuf>,
    config: ExportConfig,
    function: impl Fn(&[R::Array]) -> Vec<R::Array> + Send + Sync + 'static,
) -> FunctionExporter<R> {
    FunctionExporter::with_config(runtime, destination, config, function)
}

/// Export several traced specializations within a scoped block.
///
/// Opens a multi-shot exporter, hands it to `body`, and finalizes the
/// package when the block exits, including when `body` returns an error,
/// so partially written packages are still flushed and the handle released.
///
/// ```rust
/// use fnbridge::testing::{StubArray, StubRuntime};
/// use fnbridge::{call_args, export_functions, ExportConfig};
///
/// let runtime = StubRuntime::new();
/// let dir = tempfile::tempdir()?;
/// let dest = dir.path().join("norm.fnpkg");
///
/// export_functions(
///     runtime,
///     &dest,
///     ExportConfig::new(),
///     |arrays| arrays.to_vec(),
///     |exporter| {
///         exporter.export(&call_args![StubArray::new(1)])?;
///         exporter.export(&call_args![StubArray::new(1), StubArray::new(2)])?;
///         Ok(())
///     },
/// )?;
/// # Ok::<(), fnbridge::BridgeError>(())
/// ```
///
/// # Errors
///
/// Returns the error from opening the exporter or the first error `body`
/// propagates.
pub fn export_functions<R: NativeRuntime>(
    runtime: R,
    destination: impl Into<PathBuf>,
    config: ExportConfig,
    function: impl Fn(&[R::Array]) -> Vec<R::Array> + Send + Sync + 'static,
    body: impl FnOnce(&mut MultiFunctionExporter<R>) -> Result<()>,
) -> Result<()> {
    let mut exporter = MultiFunctionExporter::with_config(runtime, destination, config, function)?;
    body(&mut exporter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_config_default() {
        let config = ExportConfig::default();
        assert!(!config.shapeless);
    }

    #[test]
    fn test_export_config_builder() {
        let config = ExportConfig::new().with_shapeless(true);
        assert!(config.shapeless);
    }

    #[test]
    fn test_export_config_from_env() {
        std::env::set_var("FNBRIDGE_SHAPELESS", "true");
        let config = ExportConfig::from_env();
        assert!(config.shapeless);
        std::env::remove_var("FNBRIDGE_SHAPELESS");

        let config = ExportConfig::from_env();
        assert!(!config.shapeless);
    }
}
