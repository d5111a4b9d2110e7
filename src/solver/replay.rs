//! Solver answering from stored responses.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;

use crate::ir::error::IrError;
use crate::solver::{Solver, SolverRequest, SolverResponse};

/// Replays recorded solver output instead of running a solver.
///
/// A stored file holds either one response, used for every request, or an
/// object mapping the first ODE symbol of a request to its response.
#[derive(Debug, Clone)]
pub enum ReplaySolver {
    Single(Value),
    ByOde(IndexMap<String, Value>),
}

impl ReplaySolver {
    pub fn new(response: Value) -> Self {
        ReplaySolver::Single(response)
    }

    pub fn by_ode(responses: IndexMap<String, Value>) -> Self {
        ReplaySolver::ByOde(responses)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let value: Value = serde_json::from_str(&text)?;
        if value.get("solver").is_some() {
            return Ok(ReplaySolver::Single(value));
        }
        let responses: IndexMap<String, Value> = serde_json::from_value(value)?;
        Ok(ReplaySolver::ByOde(responses))
    }
}

impl Solver for ReplaySolver {
    fn solve(&self, request: &SolverRequest) -> Result<SolverResponse, IrError> {
        match self {
            ReplaySolver::Single(value) => SolverResponse::from_value(value.clone()),
            ReplaySolver::ByOde(responses) => {
                let key = request
                    .odes
                    .first()
                    .map(|ode| ode.symbol.as_str())
                    .unwrap_or_default();
                let value = responses.get(key).ok_or_else(|| {
                    IrError::MalformedResponse(format!("no stored response for ODE '{}'", key))
                })?;
                SolverResponse::from_value(value.clone())
            }
        }
    }
}
