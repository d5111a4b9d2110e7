//! Structural errors. Semantic problems in user models are diagnostics;
//! these are the failures that abort processing of a neuron.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("{count} base ODE equations given to the solver, at most one is supported")]
    TooManyOdes { count: usize },

    #[error("function aliases {names:?} still reference each other after {passes} passes")]
    CyclicAliases { names: Vec<String>, passes: usize },

    #[error("unknown solver classification '{0}'")]
    UnknownSolver(String),

    #[error("malformed solver response: {0}")]
    MalformedResponse(String),

    #[error("solver state variable '{found}' does not follow the naming of shape '{shape}'")]
    ShapeChainNaming { shape: String, found: String },

    #[error("solver process failed: {0}")]
    SolverProcess(String),

    #[error("no solver configured for neuron '{0}'")]
    NoSolver(String),
}
