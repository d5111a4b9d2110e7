//! Intermediate representation of neuron models and the passes over it.

pub mod analysis;
pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod parse;
pub mod printer;
pub mod transform;
pub mod visitor;
