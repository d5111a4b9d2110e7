//! Driver resolving the equations block of one neuron.

use serde::Serialize;

use crate::ir::analysis::symbol_table::is_identity_entry;
use crate::ir::ast::{EquationsBlock, Neuron};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};
use crate::ir::error::IrError;
use crate::ir::transform::ode::exact::apply_exact_solution;
use crate::ir::transform::ode::normalize::normalize_convolutions;
use crate::ir::transform::ode::numeric::apply_numeric_solution;
use crate::ir::transform::ode::self_contained::make_self_contained;
use crate::ir::transform::ode::spikes::apply_spikes;
use crate::solver::{Solver, SolverEntry, SolverRequest, SolverResponse};

#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Rounds of alias inlining before aliases are declared cyclic.
    pub max_alias_passes: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            max_alias_passes: 32,
        }
    }
}

/// Where a neuron ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOutcome {
    /// No equations block.
    Unchanged,
    /// Equations without shapes, left for a generic integrator.
    NoShapes,
    /// Discretized by an exact propagator.
    Analytical,
    /// Functional shapes expanded into differential form.
    Numeric,
}

/// Request for the self-contained `equations`: every ODE and shape except
/// the identity entries added by implicit-order completion.
pub fn build_solver_request(equations: &EquationsBlock) -> Result<SolverRequest, IrError> {
    let odes: Vec<SolverEntry> = equations
        .odes()
        .filter(|ode| !is_identity_entry(&ode.lhs, &ode.rhs))
        .map(|ode| SolverEntry::new(ode.lhs.complete_name(), ode.rhs.to_string()))
        .collect();
    if odes.len() > 1 {
        return Err(IrError::TooManyOdes { count: odes.len() });
    }
    let shapes = equations
        .shapes()
        .filter(|shape| !is_identity_entry(&shape.lhs, &shape.rhs))
        .map(|shape| SolverEntry::new(shape.lhs.complete_name(), shape.rhs.to_string()))
        .collect();
    Ok(SolverRequest {
        odes,
        shapes,
        parameters: Vec::new(),
    })
}

/// Resolve the equations block of `neuron`.
///
/// Milestones are reported as INFO diagnostics in `report`. A failure
/// leaves the neuron partially normalized and must exclude it from output.
pub fn transform_neuron(
    neuron: &mut Neuron,
    solver: Option<&dyn Solver>,
    options: &TransformOptions,
    report: &mut DiagnosticReport,
) -> anyhow::Result<TransformOutcome> {
    let Some(equations) = &mut neuron.equations else {
        log::debug!("{}: no equations block", neuron.name);
        return Ok(TransformOutcome::Unchanged);
    };

    let pairs = normalize_convolutions(equations);
    log::debug!("{}: normalized, {} convolutions", neuron.name, pairs.len());

    if equations.shapes().next().is_none() {
        log::info!("{}: no shapes, left to the numeric integrator", neuron.name);
        report.add(
            Diagnostic::info(
                DiagnosticCode::NeuronSolvedBySolver,
                format!("Neuron '{}' has no shapes and is integrated numerically", neuron.name),
            )
            .at(neuron.position),
        );
        return Ok(TransformOutcome::NoShapes);
    }

    let self_contained = make_self_contained(equations, options.max_alias_passes)?;
    let request = build_solver_request(&self_contained)?;
    log::info!(
        "{}: analysing {} ODEs and {} shapes",
        neuron.name,
        request.odes.len(),
        request.shapes.len()
    );
    report.add(
        Diagnostic::info(
            DiagnosticCode::NeuronAnalyzed,
            format!("Neuron '{}' is analysed by the solver", neuron.name),
        )
        .at(neuron.position),
    );

    let solver = solver.ok_or_else(|| IrError::NoSolver(neuron.name.clone()))?;
    let response = solver.solve(&request)?;
    log::info!("{}: solver chose the {} branch", neuron.name, response.name());

    let outcome = match &response {
        SolverResponse::Analytical(solution) => {
            apply_exact_solution(neuron, solution)?;
            TransformOutcome::Analytical
        }
        SolverResponse::Numeric(solution) => {
            apply_numeric_solution(neuron, solution)?;
            TransformOutcome::Numeric
        }
    };
    let increments = apply_spikes(neuron, &pairs);
    log::debug!("{}: {} spike increments", neuron.name, increments);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::predefined::PredefinedContext;
    use crate::ir::analysis::symbol_table::build_symbol_table;
    use crate::ir::ast::{AssignOp, EquationDecl, Statement};
    use crate::ir::parse::{parse_block, parse_declarations, parse_equations, parse_input_lines};
    use crate::solver::ReplaySolver;
    use serde_json::json;

    fn alpha_neuron() -> Neuron {
        let mut neuron = Neuron::new("iaf_psc_alpha");
        neuron.parameters =
            parse_declarations("tau_m ms = 10 ms\ntau_syn ms = 2 ms\nC_m pF = 250 pF").unwrap();
        neuron.initial_values = parse_declarations("V_m mV = 0 mV").unwrap();
        neuron.equations = Some(
            parse_equations(
                "shape I_shape = pA * e / tau_syn * t * exp(-t / tau_syn)\n\
                 function I_syn pA = curr_sum(I_shape, spikes)\n\
                 V_m' = -V_m / tau_m + I_syn / C_m",
            )
            .unwrap(),
        );
        neuron.input = parse_input_lines("spikes pA <- spike").unwrap();
        neuron.update = Some(parse_block("integrate_odes()").unwrap());
        neuron
    }

    fn analytical() -> ReplaySolver {
        ReplaySolver::new(json!({
            "solver": "analytical",
            "ode_var_factor": {"__ode_var_factor": "exp(-__h / tau_m)"},
            "const_input": {"__const_input": "0"},
            "propagator": {
                "__P11": "exp(-__h / tau_syn)",
                "__P21": "__h * exp(-__h / tau_syn)",
                "__P22": "exp(-__h / tau_syn)",
                "__P31": "1 / C_m",
                "__P32": "1 / C_m"
            },
            "ode_var_update_instructions": [
                "V_m = __ode_var_factor * V_m + __P31 * I_shape__d + __P32 * I_shape"
            ],
            "shape_state_variables": ["I_shape__d", "I_shape"],
            "shape_initial_values": ["pA * e / tau_syn", "0 pA"],
            "updates_to_shape_state_variables": [
                ["I_shape__d", "__P11 * I_shape__d"],
                ["I_shape", "__P21 * I_shape__d + __P22 * I_shape"]
            ]
        }))
    }

    fn assignments_to<'a>(neuron: &'a Neuron, name: &str, op: AssignOp) -> Vec<&'a Statement> {
        neuron
            .update
            .as_ref()
            .unwrap()
            .statements
            .iter()
            .filter(|stmt| {
                matches!(stmt, Statement::Assignment(a) if a.lhs.name == name && a.op == op)
            })
            .collect()
    }

    #[test]
    fn test_request_is_self_contained() {
        let mut equations = alpha_neuron().equations.unwrap();
        normalize_convolutions(&mut equations);
        let request = build_solver_request(&make_self_contained(&equations, 8).unwrap()).unwrap();

        assert_eq!(request.odes.len(), 1);
        assert_eq!(request.odes[0].symbol, "V_m'");
        assert_eq!(
            request.odes[0].definition,
            "-V_m / tau_m + (convolve(I_shape, spikes)) / C_m"
        );
        assert_eq!(request.shapes[0].symbol, "I_shape");
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn test_identity_entries_and_too_many_odes() {
        let mut neuron = Neuron::new("n");
        neuron.equations =
            Some(parse_equations("shape g'' = -g / tau**2\nV'' = -V").unwrap());
        let ctx = PredefinedContext::shared();
        build_symbol_table(&mut neuron, &ctx);
        let request = build_solver_request(neuron.equations.as_ref().unwrap()).unwrap();
        assert_eq!(request.odes.len(), 1);
        assert_eq!(request.shapes.len(), 1);

        let two = parse_equations("V' = -V\nU' = -U").unwrap();
        assert!(matches!(
            build_solver_request(&two),
            Err(IrError::TooManyOdes { count: 2 })
        ));
    }

    #[test]
    fn test_analytical_round_trip() {
        let mut neuron = alpha_neuron();
        let mut report = DiagnosticReport::new();
        let solver = analytical();
        let outcome =
            transform_neuron(&mut neuron, Some(&solver), &TransformOptions::default(), &mut report)
                .unwrap();

        assert_eq!(outcome, TransformOutcome::Analytical);
        assert!(neuron.equations.is_none());
        assert!(neuron.initial_values.is_empty());
        assert_eq!(assignments_to(&neuron, "V_m", AssignOp::Assign).len(), 1);
        // one increment per state variable of the convolved shape
        assert_eq!(assignments_to(&neuron, "I_shape", AssignOp::AddAssign).len(), 1);
        assert_eq!(assignments_to(&neuron, "I_shape__d", AssignOp::AddAssign).len(), 1);
        assert_eq!(report.with_code(DiagnosticCode::NeuronAnalyzed).len(), 1);
        let state: Vec<String> = neuron.state.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            state,
            vec!["V_m mV = 0 mV", "I_shape__d real = 0.0", "I_shape real = 0.0"]
        );
    }

    #[test]
    fn test_numeric_branch_keeps_ode() {
        let mut neuron = Neuron::new("n");
        neuron.parameters = parse_declarations("tau ms = 2 ms\ng0 nS = 1 nS").unwrap();
        neuron.initial_values = parse_declarations("V_m mV = 0 mV").unwrap();
        neuron.equations = Some(
            parse_equations(
                "shape g = g0 * exp(-t / tau)\n\
                 V_m' = -V_m / tau + convolve(g, spikes) * mV / (nS * ms)",
            )
            .unwrap(),
        );
        neuron.update = Some(parse_block("integrate_odes()").unwrap());
        let ode_before = neuron.equations.as_ref().unwrap().declarations[1].clone();
        let solver = ReplaySolver::new(json!({
            "solver": "numeric",
            "shape_state_variables": ["g"],
            "shape_ode_definitions": ["-g / tau"],
            "shape_initial_values": ["g0"]
        }));

        let mut report = DiagnosticReport::new();
        let outcome =
            transform_neuron(&mut neuron, Some(&solver), &TransformOptions::default(), &mut report)
                .unwrap();
        assert_eq!(outcome, TransformOutcome::Numeric);

        let equations = neuron.equations.as_ref().unwrap();
        let EquationDecl::Shape(shape) = &equations.declarations[0] else {
            panic!("expected shape");
        };
        assert_eq!(shape.to_string(), "shape g' = -g / tau");
        assert_eq!(equations.declarations[1], ode_before);

        let update = neuron.update.as_ref().unwrap().to_string();
        assert_eq!(update, "integrate_odes()\ng += spikes * (g0)\n");
        assert!(neuron.initial_values.is_empty());
    }

    #[test]
    fn test_no_equations_or_no_shapes() {
        let mut report = DiagnosticReport::new();
        let mut plain = Neuron::new("plain");
        let options = TransformOptions::default();
        assert_eq!(
            transform_neuron(&mut plain, None, &options, &mut report).unwrap(),
            TransformOutcome::Unchanged
        );

        let mut ode_only = Neuron::new("ode_only");
        ode_only.initial_values = parse_declarations("V mV = 0 mV").unwrap();
        ode_only.equations = Some(parse_equations("V' = -V / tau").unwrap());
        let before = ode_only.clone();
        assert_eq!(
            transform_neuron(&mut ode_only, None, &options, &mut report).unwrap(),
            TransformOutcome::NoShapes
        );
        assert_eq!(ode_only, before);
        assert_eq!(report.with_code(DiagnosticCode::NeuronSolvedBySolver).len(), 1);
    }

    #[test]
    fn test_solver_failures() {
        let options = TransformOptions::default();
        let mut report = DiagnosticReport::new();

        let error = transform_neuron(&mut alpha_neuron(), None, &options, &mut report).unwrap_err();
        assert!(matches!(error.downcast_ref::<IrError>(), Some(IrError::NoSolver(_))));

        let unknown = ReplaySolver::new(json!({"solver": "guess"}));
        let error = transform_neuron(&mut alpha_neuron(), Some(&unknown), &options, &mut report)
            .unwrap_err();
        assert!(matches!(error.downcast_ref::<IrError>(), Some(IrError::UnknownSolver(_))));
    }
}
