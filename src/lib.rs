//! Semantic core of a compiler for neuron models: symbol tables, unit-aware
//! typing, context conditions and the resolution of equations into
//! propagators or differential shapes.

use std::sync::Once;

pub mod compiler;
pub mod ir;
pub mod solver;

pub use compiler::{CompilationResult, Compiler, CompilerOptions, ModelResult, ModelStatus};

static INIT: Once = Once::new();

/// Install the logger once per process. `RUST_LOG` takes precedence over
/// `default_filter`.
pub fn init_logger_with(default_filter: &str) {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
            .init();
    });
}

pub fn init_logger() {
    init_logger_with("warn");
}
