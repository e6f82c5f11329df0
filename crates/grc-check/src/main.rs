//! grc-check: load a flowgraph against a block registry and report what
//! the update cycle finds.
//!
//! Prints one line per diagnostic and exits non-zero when the flowgraph is
//! invalid. Set `RUST_LOG=debug` for load details.

use grc_core::{BlockRegistry, Diagnostic, ElementRef, Flowgraph, Severity};
use std::env;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: grc-check <registry.json> <flowgraph.json>");
        return ExitCode::from(2);
    }
    let (registry_path, flowgraph_path) = (&args[1], &args[2]);

    let registry_json = match fs::read_to_string(registry_path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to read registry file '{registry_path}': {e}");
            return ExitCode::from(2);
        }
    };
    let flowgraph_json = match fs::read_to_string(flowgraph_path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to read flowgraph file '{flowgraph_path}': {e}");
            return ExitCode::from(2);
        }
    };

    let registry = match BlockRegistry::from_json(&registry_json) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("Invalid registry '{registry_path}': {e}");
            return ExitCode::from(2);
        }
    };
    log::debug!("registry holds {} block types", registry.len());

    let mut flowgraph = match Flowgraph::from_json(registry, &flowgraph_json) {
        Ok(fg) => fg,
        Err(e) => {
            eprintln!("Invalid flowgraph '{flowgraph_path}': {e}");
            return ExitCode::from(2);
        }
    };
    flowgraph.update();

    for diag in flowgraph.diagnostics() {
        println!("{}", describe(&flowgraph, diag));
    }

    let errors = count(&flowgraph, Severity::Error);
    let warnings = count(&flowgraph, Severity::Warning);
    println!(
        "{flowgraph_path}: {} blocks, {} connections, {errors} errors, {warnings} warnings",
        flowgraph.block_count(),
        flowgraph.connection_count(),
    );

    if flowgraph.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn count(flowgraph: &Flowgraph, severity: Severity) -> usize {
    flowgraph
        .diagnostics()
        .iter()
        .filter(|d| d.severity == severity)
        .count()
}

fn describe(flowgraph: &Flowgraph, diag: &Diagnostic) -> String {
    let severity = match diag.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    let element = match diag.element {
        ElementRef::Block(idx) => flowgraph
            .block(idx)
            .map_or_else(|| "?".to_string(), |b| b.name.to_string()),
        ElementRef::Connection(edge) => flowgraph.connection_data(edge).map_or_else(
            || "?".to_string(),
            |c| format!("{}:{} -> {}:{}", c.source_block, c.source_port, c.sink_block, c.sink_port),
        ),
    };
    format!("{severity}[{}] {element}: {}", diag.rule, diag.message)
}
