//! Example: Export Round Trip
//!
//! Exports a function against the instrumented stub engine, imports the
//! package back, and calls it, then prints the handle balance to show the
//! release discipline holding.
//!
//! Run with:
//! ```bash
//! cargo run --example export_roundtrip
//! ```

use fnbridge::testing::{StubArray, StubRuntime};
use fnbridge::{call_args, export_function, import_function, init_logging, LogConfig};

fn main() -> fnbridge::Result<()> {
    init_logging(&LogConfig::development());

    let runtime = StubRuntime::new();
    let dir = std::env::temp_dir().join("fnbridge-demo");
    std::fs::create_dir_all(&dir)?;
    let dest = dir.join("scaled_add.fnpkg");

    // Trace and serialize in one shot. The trailing keyword argument is
    // matched by name at import time.
    let exporter = export_function(runtime.clone(), &dest, |arrays| arrays.to_vec());
    exporter.export(&call_args![
        StubArray::new(1),
        StubArray::new(2),
        scale = StubArray::new(3)
    ])?;
    println!("exported package to {}", dest.display());

    // Load once, call many times.
    let imported = import_function(runtime.clone(), &dest)?;
    for round in 0..3 {
        let results = imported.call(&call_args![
            StubArray::new(round),
            StubArray::new(round + 1)
        ])?;
        println!("call {round}: {} result arrays", results.len());
    }
    drop(imported);

    let counts = runtime.counts();
    println!("engine handles balanced: {}", counts.balanced());
    Ok(())
}
