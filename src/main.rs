//! # nestml-core
//!
//! Command-line driver running the semantic phase and the equation
//! transformation over neuron models.
//!
//! ## Command-Line Arguments
//! - `MODEL_FILE...`: JSON files, each holding one compilation unit.
//! - `--solver <CMD>`: external solver speaking JSON on stdin and stdout.
//! - `--solver-response <FILE>`: replay a stored solver response instead.
//! - `--dev`: keep neurons with errors.
//! - `--dry-run`: stop after the checks.
//! - `--output` (`-o`): where to write the resulting JSON, stdout by default.
//! - `--verbose` (`-v`): debug logging.
//!
//! ## Usage
//! ```sh
//! nestml-core --solver "ode-toolbox --json" iaf_psc_alpha.json -o out.json
//! ```

use std::fs;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nestml_core::ir::diagnostics::Severity;
use nestml_core::solver::{ProcessSolver, ReplaySolver};
use nestml_core::{Compiler, ModelStatus};

#[derive(Parser, Debug)]
#[command(version, about = "Neuron model semantic core", long_about = None)]
struct Args {
    /// Compilation units to process
    #[arg(name = "MODEL_FILE", required = true)]
    model_files: Vec<String>,

    /// External solver command
    #[arg(long, conflicts_with = "solver_response")]
    solver: Option<String>,

    /// Stored solver response to replay
    #[arg(long)]
    solver_response: Option<String>,

    /// Keep neurons with errors for inspection
    #[arg(long)]
    dev: bool,

    /// Only run the checks
    #[arg(long)]
    dry_run: bool,

    /// Rounds of alias inlining before aliases count as cyclic
    #[arg(long, default_value_t = 32)]
    max_alias_passes: usize,

    /// Output file for the transformed models
    #[arg(short, long)]
    output: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    nestml_core::init_logger_with(if args.verbose { "debug" } else { "info" });

    let mut compiler = Compiler::new()
        .dev_mode(args.dev)
        .dry_run(args.dry_run)
        .max_alias_passes(args.max_alias_passes);

    if let Some(command) = &args.solver {
        let Some(solver) = ProcessSolver::from_command_line(command) else {
            bail!("empty solver command");
        };
        compiler = compiler.solver(solver);
    } else if let Some(path) = &args.solver_response {
        compiler = compiler.solver(ReplaySolver::from_file(path)?);
    }

    let result = compiler.compile_files(&args.model_files)?;

    for diagnostic in result.diagnostics() {
        match diagnostic.severity {
            Severity::Error => log::error!("{}", diagnostic),
            Severity::Warning => log::warn!("{}", diagnostic),
            _ => {}
        }
    }

    let json = serde_json::to_string_pretty(&result)?;
    match &args.output {
        Some(path) => fs::write(path, json).with_context(|| format!("Failed to write {}", path))?,
        None => println!("{}", json),
    }

    let dropped = result
        .models
        .iter()
        .filter(|model| model.status != ModelStatus::Included)
        .count();
    if dropped > 0 {
        bail!("{} of {} neurons were not generated", dropped, result.models.len());
    }
    Ok(())
}
