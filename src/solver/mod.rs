//! Boundary to the external ODE solver.
//!
//! The solver receives the self-contained equation set of one neuron as
//! JSON and classifies it: linear systems come back with an exact
//! propagator solution, functional shapes that are not linear come back
//! as an expansion into first-order state variables. Everything here is
//! marshaling; the transformation that applies a response to the neuron
//! lives in `ir::transform::ode`.

pub mod process;
pub mod replay;

pub use process::ProcessSolver;
pub use replay::ReplaySolver;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ir::error::IrError;

// =============================================================================
// Request
// =============================================================================

/// One `symbol = definition` pair, the definition in surface syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverEntry {
    pub symbol: String,
    pub definition: String,
}

impl SolverEntry {
    pub fn new(symbol: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            definition: definition.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverRequest {
    pub odes: Vec<SolverEntry>,
    pub shapes: Vec<SolverEntry>,
    #[serde(default)]
    pub parameters: Vec<SolverEntry>,
}

// =============================================================================
// Response
// =============================================================================

/// Exact propagator solution of a linear system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExactSolution {
    /// Factor applied to the ODE variable per step, by internal name.
    #[serde(default)]
    pub ode_var_factor: IndexMap<String, String>,
    /// Factor applied to constant input per step, by internal name.
    #[serde(default)]
    pub const_input: IndexMap<String, String>,
    /// Propagator matrix entries, by internal name.
    #[serde(default)]
    pub propagator: IndexMap<String, String>,
    /// Assignments advancing the ODE variable by one step.
    #[serde(default)]
    pub ode_var_update_instructions: Vec<String>,
    #[serde(default)]
    pub shape_state_variables: Vec<String>,
    /// Initial values, parallel to `shape_state_variables`.
    #[serde(default)]
    pub shape_initial_values: Vec<String>,
    /// Ordered `(state variable, next value)` pairs.
    #[serde(default)]
    pub updates_to_shape_state_variables: Vec<(String, String)>,
}

/// First-order expansion of functional shapes. The three lists are
/// parallel; the variables of one shape appear contiguously as `g`,
/// `g__d`, `g__d__d`, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericSolution {
    pub shape_state_variables: Vec<String>,
    pub shape_ode_definitions: Vec<String>,
    pub shape_initial_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolverResponse {
    Analytical(ExactSolution),
    Numeric(NumericSolution),
}

impl SolverResponse {
    /// Classify a raw response by its `"solver"` tag.
    pub fn from_value(value: Value) -> Result<Self, IrError> {
        let tag = value
            .get("solver")
            .and_then(Value::as_str)
            .ok_or_else(|| IrError::MalformedResponse("missing \"solver\" tag".to_string()))?
            .to_string();
        let malformed = |err: serde_json::Error| IrError::MalformedResponse(err.to_string());
        match tag.as_str() {
            "analytical" => Ok(SolverResponse::Analytical(
                serde_json::from_value(value).map_err(malformed)?,
            )),
            "numeric" => {
                let solution: NumericSolution = serde_json::from_value(value).map_err(malformed)?;
                let count = solution.shape_state_variables.len();
                if solution.shape_ode_definitions.len() != count
                    || solution.shape_initial_values.len() != count
                {
                    return Err(IrError::MalformedResponse(format!(
                        "{} state variables, {} definitions, {} initial values",
                        count,
                        solution.shape_ode_definitions.len(),
                        solution.shape_initial_values.len()
                    )));
                }
                Ok(SolverResponse::Numeric(solution))
            }
            _ => Err(IrError::UnknownSolver(tag)),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, IrError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| IrError::MalformedResponse(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SolverResponse::Analytical(_) => "analytical",
            SolverResponse::Numeric(_) => "numeric",
        }
    }
}

/// Anything that can answer a solver request.
pub trait Solver {
    fn solve(&self, request: &SolverRequest) -> Result<SolverResponse, IrError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = SolverRequest {
            odes: vec![SolverEntry::new("V_m'", "-V_m / tau_m")],
            shapes: vec![SolverEntry::new("g", "exp(-t / tau)")],
            parameters: vec![],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "odes": [{"symbol": "V_m'", "definition": "-V_m / tau_m"}],
                "shapes": [{"symbol": "g", "definition": "exp(-t / tau)"}],
                "parameters": []
            })
        );
    }

    #[test]
    fn test_analytical_response() {
        let response = SolverResponse::from_value(json!({
            "solver": "analytical",
            "ode_var_factor": {"__ode_var_factor": "exp(-__h / tau_m)"},
            "const_input": {"__const_input": "(1 - exp(-__h / tau_m)) * I_e"},
            "propagator": {"__P11": "exp(-__h / tau)"},
            "ode_var_update_instructions": ["V_m = __ode_var_factor * V_m + __const_input"],
            "shape_state_variables": ["g"],
            "shape_initial_values": ["1"],
            "updates_to_shape_state_variables": [["g", "__P11 * g"]]
        }))
        .unwrap();
        let SolverResponse::Analytical(solution) = response else {
            panic!("expected analytical");
        };
        assert_eq!(solution.propagator["__P11"], "exp(-__h / tau)");
        assert_eq!(
            solution.updates_to_shape_state_variables,
            vec![("g".to_string(), "__P11 * g".to_string())]
        );
    }

    #[test]
    fn test_unknown_tag_and_malformed_body() {
        assert!(matches!(
            SolverResponse::from_value(json!({"solver": "heuristic"})),
            Err(IrError::UnknownSolver(tag)) if tag == "heuristic"
        ));
        assert!(matches!(
            SolverResponse::from_value(json!({"odes": []})),
            Err(IrError::MalformedResponse(_))
        ));
        assert!(matches!(
            SolverResponse::from_value(json!({
                "solver": "numeric",
                "shape_state_variables": ["g"],
                "shape_ode_definitions": [],
                "shape_initial_values": ["1"]
            })),
            Err(IrError::MalformedResponse(_))
        ));
        assert!(matches!(
            SolverResponse::from_json("not json"),
            Err(IrError::MalformedResponse(_))
        ));
    }
}
