// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Integration tests for fnbridge.
//!
//! These tests drive the public API against the instrumented stub engine and
//! verify the marshaling contract: argument ordering, keyword uniquing, and
//! the acquire/release balance on every path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fnbridge::testing::{StubArray, StubRuntime};
use fnbridge::{
    call_args, export_function, export_function_with, export_functions, import_function,
    BridgeError, CallArgs, ExportConfig, LogConfig, MultiFunctionExporter,
};

// ============================================================================
// Argument Marshaling
// ============================================================================

#[test]
fn test_positional_order_reaches_engine() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("ordered.fnpkg");

    let exporter = export_function(runtime.clone(), &dest, |arrays| arrays.to_vec());
    exporter
        .export(&call_args![
            StubArray::new(3),
            scale = StubArray::new(9),
            StubArray::new(1),
            StubArray::new(2)
        ])
        .expect("export");

    let record = runtime.last_export().expect("export recorded");
    assert_eq!(
        record.positional,
        vec![StubArray::new(3), StubArray::new(1), StubArray::new(2)]
    );
}

#[test]
fn test_duplicate_keywords_first_value_wins() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("uniqued.fnpkg");

    let exporter = export_function(runtime.clone(), &dest, |arrays| arrays.to_vec());
    exporter
        .export(&call_args![
            scale = StubArray::new(1),
            bias = StubArray::new(2),
            scale = StubArray::new(3)
        ])
        .expect("export");

    let record = runtime.last_export().expect("export recorded");
    assert_eq!(
        record.keywords,
        vec![
            ("scale".to_string(), StubArray::new(1)),
            ("bias".to_string(), StubArray::new(2)),
        ]
    );
    assert_eq!(
        record.keyword_keys,
        vec!["scale".to_string(), "bias".to_string()]
    );
}

#[test]
fn test_builder_and_macro_forms_agree() {
    let built = CallArgs::new()
        .positional(StubArray::new(1))
        .keyword("scale", StubArray::new(2));
    let sugared = call_args![StubArray::new(1), scale = StubArray::new(2)];

    assert_eq!(built.len(), sugared.len());
    assert_eq!(built.keyword_keys(), sugared.keyword_keys());
}

// ============================================================================
// Single-Shot Export
// ============================================================================

#[test]
fn test_single_shot_export_writes_package() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("empty_args.fnpkg");

    let exporter = export_function(runtime.clone(), &dest, |arrays| arrays.to_vec());
    exporter.export(&CallArgs::new()).expect("export");

    assert!(dest.exists());
    assert!(runtime.counts().balanced());
    assert_eq!(runtime.live_handles(), 0);
}

#[test]
fn test_single_shot_export_failure_reports_engine_message() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("failing.fnpkg");

    runtime.fail_exports("destination not writable");

    let exporter = export_function(runtime.clone(), &dest, |arrays| arrays.to_vec());
    let err = exporter
        .export(&call_args![StubArray::new(1)])
        .expect_err("export should fail");

    assert!(matches!(err, BridgeError::Native { .. }));
    assert!(err.to_string().contains("destination not writable"));
    assert!(!dest.exists());
    // Containers acquired for the failed call are still released.
    assert!(runtime.counts().balanced());
    assert_eq!(runtime.live_handles(), 0);
}

#[test]
fn test_shapeless_flag_reaches_engine() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("shapeless.fnpkg");

    let config = ExportConfig::new().with_shapeless(true);
    let exporter =
        export_function_with(runtime.clone(), &dest, config, |arrays| arrays.to_vec());
    exporter
        .export(&call_args![StubArray::new(1)])
        .expect("export");

    assert!(runtime.last_export().expect("record").shapeless);
}

#[test]
fn test_host_function_traced_during_export() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("traced.fnpkg");

    let traces = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&traces);

    let exporter = export_function(runtime, &dest, move |arrays| {
        counter.fetch_add(1, Ordering::SeqCst);
        arrays.to_vec()
    });
    exporter
        .export(&call_args![StubArray::new(4)])
        .expect("export");

    assert_eq!(traces.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Multi-Shot Export
// ============================================================================

#[test]
fn test_multi_shot_accumulates_specializations() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("specialized.fnpkg");

    export_functions(
        runtime.clone(),
        &dest,
        ExportConfig::new(),
        |arrays| arrays.to_vec(),
        |exporter| {
            exporter.export(&call_args![StubArray::new(1)])?;
            exporter.export(&call_args![StubArray::new(1), StubArray::new(2)])?;
            Ok(())
        },
    )
    .expect("export");

    assert!(dest.exists());
    let record = runtime.last_export().expect("record");
    assert_eq!(record.specializations, 2);

    let counts = runtime.counts();
    assert_eq!(counts.exporters_created, 1);
    assert_eq!(counts.exporters_freed, 1);
    assert!(counts.balanced());
}

#[test]
fn test_multi_shot_handle_released_once_on_drop() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("dropped.fnpkg");

    {
        let mut exporter =
            MultiFunctionExporter::new(runtime.clone(), &dest, |arrays: &[StubArray]| {
                arrays.to_vec()
            })
            .expect("open exporter");
        exporter
            .export(&call_args![StubArray::new(7)])
            .expect("specialize");
        assert_eq!(runtime.counts().exporters_freed, 0);
    }

    let counts = runtime.counts();
    assert_eq!(counts.exporters_created, 1);
    assert_eq!(counts.exporters_freed, 1);
    assert_eq!(runtime.live_handles(), 0);
}

#[test]
fn test_multi_shot_construction_failure() {
    let runtime = StubRuntime::new();
    let dest = std::path::Path::new("/nonexistent-dir/never/out.fnpkg");

    let err = MultiFunctionExporter::new(runtime.clone(), dest, |arrays: &[StubArray]| {
        arrays.to_vec()
    })
    .expect_err("construction should fail");

    assert!(matches!(err, BridgeError::Native { .. }));
    // The closure built for exporter creation was still released.
    assert!(runtime.counts().balanced());
    assert_eq!(runtime.live_handles(), 0);
}

#[test]
fn test_multi_shot_survives_failed_specialization() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("recovered.fnpkg");

    let mut exporter =
        MultiFunctionExporter::new(runtime.clone(), &dest, |arrays: &[StubArray]| {
            arrays.to_vec()
        })
        .expect("open exporter");

    runtime.fail_applies("trace failed");
    let err = exporter
        .export(&call_args![StubArray::new(1)])
        .expect_err("specialization should fail");
    assert!(err.to_string().contains("trace failed"));

    runtime.clear_failures();
    exporter
        .export(&call_args![StubArray::new(1)])
        .expect("exporter stays open after a failed trace");

    drop(exporter);
    assert!(dest.exists());
    assert!(runtime.counts().balanced());
}

#[test]
fn test_scoped_export_finalizes_on_body_error() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("aborted.fnpkg");

    let result = export_functions(
        runtime.clone(),
        &dest,
        ExportConfig::new(),
        |arrays| arrays.to_vec(),
        |exporter| {
            exporter.export(&call_args![StubArray::new(1)])?;
            Err(BridgeError::native("caller aborted"))
        },
    );

    assert!(result.is_err());
    // The handle is still finalized and the partial package flushed.
    assert!(dest.exists());
    assert_eq!(runtime.counts().exporters_freed, 1);
    assert!(runtime.counts().balanced());
}

// ============================================================================
// Import
// ============================================================================

#[test]
fn test_import_missing_package_fails() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("not_there.fnpkg");

    let err = import_function(runtime.clone(), &missing).expect_err("import should fail");
    assert!(matches!(err, BridgeError::Native { .. }));
    assert_eq!(runtime.counts().functions_created, 0);
    assert_eq!(runtime.live_handles(), 0);
}

#[test]
fn test_import_round_trip_echoes_arguments() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("echo.fnpkg");

    export_function(runtime.clone(), &dest, |arrays| arrays.to_vec())
        .export(&call_args![StubArray::new(5)])
        .expect("export");

    let imported = import_function(runtime, &dest).expect("import");
    let results = imported
        .call(&call_args![StubArray::new(10), StubArray::new(11)])
        .expect("call");

    assert_eq!(results, vec![StubArray::new(10), StubArray::new(11)]);
}

#[test]
fn test_import_returns_canned_results() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("canned.fnpkg");

    export_function(runtime.clone(), &dest, |arrays| arrays.to_vec())
        .export(&call_args![StubArray::new(1)])
        .expect("export");

    runtime.provide_results(vec![StubArray::new(42)]);

    let imported = import_function(runtime, &dest).expect("import");
    let results = imported
        .call(&call_args![StubArray::new(1)])
        .expect("call");
    assert_eq!(results, vec![StubArray::new(42)]);
}

#[test]
fn test_imported_function_is_reusable() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("reused.fnpkg");

    export_function(runtime.clone(), &dest, |arrays| arrays.to_vec())
        .export(&call_args![StubArray::new(1)])
        .expect("export");

    let imported = import_function(runtime.clone(), &dest).expect("import");
    for id in 0..3 {
        let results = imported.call(&call_args![StubArray::new(id)]).expect("call");
        assert_eq!(results, vec![StubArray::new(id)]);
    }

    drop(imported);
    let counts = runtime.counts();
    assert_eq!(counts.functions_created, 1);
    assert_eq!(counts.functions_freed, 1);
    assert!(counts.balanced());
}

#[test]
fn test_import_call_failure_releases_containers() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("failing_call.fnpkg");

    export_function(runtime.clone(), &dest, |arrays| arrays.to_vec())
        .export(&call_args![StubArray::new(1)])
        .expect("export");

    let imported = import_function(runtime.clone(), &dest).expect("import");
    runtime.fail_applies("device lost");

    let err = imported
        .call(&call_args![StubArray::new(1)])
        .expect_err("call should fail");
    assert!(err.to_string().contains("device lost"));

    drop(imported);
    assert!(runtime.counts().balanced());
    assert_eq!(runtime.live_handles(), 0);
}

// ============================================================================
// Resource Balance
// ============================================================================

#[test]
fn test_full_round_trip_is_leak_free() {
    let runtime = StubRuntime::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("leak_free.fnpkg");

    export_functions(
        runtime.clone(),
        &dest,
        ExportConfig::new().with_shapeless(true),
        |arrays| arrays.to_vec(),
        |exporter| {
            exporter.export(&call_args![StubArray::new(1)])?;
            exporter.export(&call_args![StubArray::new(1), scale = StubArray::new(2)])?;
            Ok(())
        },
    )
    .expect("export");

    let imported = import_function(runtime.clone(), &dest).expect("import");
    for _ in 0..4 {
        imported
            .call(&call_args![StubArray::new(1), scale = StubArray::new(2)])
            .expect("call");
    }
    drop(imported);

    let counts = runtime.counts();
    assert!(counts.balanced(), "unbalanced handle counts: {counts:?}");
    assert_eq!(runtime.live_handles(), 0);
}

// ============================================================================
// Error Types
// ============================================================================

#[test]
fn test_error_helper_constructors() {
    let err = BridgeError::native("trace failed");
    assert!(err.to_string().contains("trace failed"));

    let err = BridgeError::invalid_config("bad destination");
    assert!(err.to_string().contains("bad destination"));

    let err = BridgeError::io("read-only filesystem");
    assert!(err.to_string().contains("read-only filesystem"));
}

#[test]
fn test_error_from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
    let err: BridgeError = io_err.into();

    assert!(matches!(err, BridgeError::Io(_)));
    assert!(err.to_string().contains("access denied"));
}

// ============================================================================
// Logging
// ============================================================================

#[test]
fn test_init_logging_is_idempotent() {
    fnbridge::init_logging(&LogConfig::testing());
    fnbridge::init_logging(&LogConfig::testing());
}
