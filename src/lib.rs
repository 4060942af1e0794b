// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! # fnbridge
//!
//! Export and import traced array functions from a native array engine.
//!
//! The engine compiles a host function into a serializable computation graph
//! by tracing it with example arguments, and can later reload that graph as
//! a callable, in the same process or a different one. This crate is the
//! marshaling layer on the host side: it converts positional/keyword
//! argument lists into the engine's containers, drives the export and import
//! entry points, and releases every engine resource exactly once.
//!
//! ## Design Philosophy
//!
//! **The engine owns the hard parts**: tracing, graph compilation, package
//! serialization, and array memory all live behind the
//! [`NativeRuntime`] boundary. This layer adds no policy of its own; its
//! job is faithful marshaling and airtight resource discipline, enforced
//! with scoped guards on every call path.
//!
//! ## Modules
//!
//! - [`args`] - Positional/keyword argument lists and the [`call_args!`] sugar
//! - [`export`] - Single-shot and multi-shot function exporters
//! - [`import`] - Loading and invoking exported packages
//! - [`runtime`] - The engine contract implemented by every backend
//! - [`error`] - Unified error type for the layer
//! - [`logging`] - Tracing subscriber setup for export/import diagnostics
//! - [`testing`] - Instrumented in-process engine for tests and demos
//! - `ffi` - Bindings to the engine's C interface (feature-gated with the
//!   `native` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use fnbridge::testing::{StubArray, StubRuntime};
//! use fnbridge::{call_args, export_function, import_function};
//!
//! let runtime = StubRuntime::new();
//! let dir = tempfile::tempdir()?;
//! let dest = dir.path().join("scaled_add.fnpkg");
//!
//! // Trace and serialize in one shot.
//! let exporter = export_function(runtime.clone(), &dest, |arrays| arrays.to_vec());
//! exporter.export(&call_args![
//!     StubArray::new(1),
//!     StubArray::new(2),
//!     scale = StubArray::new(3)
//! ])?;
//!
//! // Load once, call many times.
//! let imported = import_function(runtime, &dest)?;
//! let results = imported.call(&call_args![StubArray::new(1), StubArray::new(2)])?;
//! assert_eq!(results.len(), 2);
//! # Ok::<(), fnbridge::BridgeError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `native` - Bindings to the engine's C interface; requires `libarrayrt`
//!   at link time
//!
//! ## Crate Integration
//!
//! Crates that ship exported packages should depend on fnbridge and test
//! against the instrumented engine:
//!
//! ```toml
//! [dependencies]
//! fnbridge = { version = "0.1", features = ["native"] }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod args;
pub mod error;
pub mod export;
#[cfg(feature = "native")]
pub mod ffi;
mod guard;
pub mod import;
pub mod logging;
pub mod runtime;
pub mod testing;

// Re-exports for convenience
pub use args::CallArgs;
pub use error::{BridgeError, Result};
pub use export::{
    export_function, export_function_with, export_functions, ExportConfig, FunctionExporter,
    MultiFunctionExporter,
};
pub use import::{import_function, ImportedFunction};
pub use logging::{init_logging, LogConfig};
pub use runtime::{NativeRuntime, TraceFn};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
