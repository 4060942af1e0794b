//! Example: Shape Specializations
//!
//! Uses the multi-shot exporter to trace one function several times, once
//! per argument-shape combination, accumulating all specializations in a
//! single package that is finalized when the scope exits.
//!
//! Run with:
//! ```bash
//! cargo run --example shape_specializations
//! ```

use fnbridge::testing::{StubArray, StubRuntime};
use fnbridge::{call_args, export_functions, init_logging, ExportConfig, LogConfig};

fn main() -> fnbridge::Result<()> {
    init_logging(&LogConfig::development());

    let runtime = StubRuntime::new();
    let dir = std::env::temp_dir().join("fnbridge-demo");
    std::fs::create_dir_all(&dir)?;
    let dest = dir.join("norm.fnpkg");

    export_functions(
        runtime.clone(),
        &dest,
        ExportConfig::new(),
        |arrays| arrays.to_vec(),
        |exporter| {
            // One trace per supported arity; the engine records each as a
            // separate specialization in the same package.
            exporter.export(&call_args![StubArray::new(1)])?;
            exporter.export(&call_args![StubArray::new(1), StubArray::new(2)])?;
            exporter.export(&call_args![
                StubArray::new(1),
                StubArray::new(2),
                eps = StubArray::new(3)
            ])?;
            Ok(())
        },
    )?;

    let record = runtime.last_export().expect("engine recorded the export");
    println!(
        "wrote {} with {} specializations",
        dest.display(),
        record.specializations
    );
    Ok(())
}
