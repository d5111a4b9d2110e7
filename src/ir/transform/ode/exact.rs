//! Applying an exact propagator solution.

use crate::ir::analysis::predefined::{FN_INTEGRATE_ODES, FN_RESOLUTION};
use crate::ir::ast::{
    AssignOp, Assignment, Block, DataType, Declaration, Expression, FunctionCall, Neuron,
    SourcePosition, Statement, Variable,
};
use crate::ir::error::IrError;
use crate::ir::transform::ode::{real_declaration, solver_assignment, solver_expression};
use crate::solver::ExactSolution;

/// Internal holding the simulation step size.
pub const STEP_SIZE: &str = "__h";

/// Suffix of the temporaries holding next shape state values.
const TMP_SUFFIX: &str = "__tmp";

/// Discretize `neuron` with `solution`.
///
/// Adds the step size and the propagator constants to the internals, the
/// shape state variables to the initial values, replaces each
/// `integrate_odes()` call with the propagation sequence and drops the
/// equations block.
pub fn apply_exact_solution(neuron: &mut Neuron, solution: &ExactSolution) -> Result<(), IrError> {
    if solution.shape_state_variables.len() != solution.shape_initial_values.len() {
        return Err(IrError::MalformedResponse(format!(
            "{} shape state variables but {} initial values",
            solution.shape_state_variables.len(),
            solution.shape_initial_values.len()
        )));
    }

    // Parse everything before touching the neuron.
    let mut internals = Vec::new();
    if !declares(&neuron.internals, STEP_SIZE) {
        internals.push(Declaration::new(
            Variable::new(STEP_SIZE, 0),
            DataType::unit("ms"),
            Some(Expression::call(FunctionCall::new(FN_RESOLUTION, vec![]))),
        ));
    }
    for (name, definition) in solution
        .ode_var_factor
        .iter()
        .chain(&solution.const_input)
        .chain(&solution.propagator)
    {
        internals.push(real_declaration(name, solver_expression(definition)?));
    }

    let mut initial_values = Vec::new();
    for (name, initial) in solution
        .shape_state_variables
        .iter()
        .zip(&solution.shape_initial_values)
    {
        if declares(&neuron.initial_values, name) || declares(&neuron.state, name) {
            continue;
        }
        initial_values.push(real_declaration(name, solver_expression(initial)?));
    }

    let propagation = propagation_sequence(solution)?;

    neuron.internals.extend(internals);
    neuron.initial_values.extend(initial_values);
    let name = neuron.name.clone();
    let update = neuron.update_block_mut();
    if replace_integrate_calls(update, &propagation) == 0 {
        log::warn!(
            "{}: no {}() call in update block, appending the propagation",
            name,
            FN_INTEGRATE_ODES
        );
        update.statements.extend(propagation);
    }
    neuron.equations = None;
    Ok(())
}

/// ODE variable updates, then shape updates through temporaries so every
/// shape reads the values of the previous step.
fn propagation_sequence(solution: &ExactSolution) -> Result<Vec<Statement>, IrError> {
    let mut statements = Vec::new();
    for instruction in &solution.ode_var_update_instructions {
        statements.push(solver_assignment(instruction)?);
    }
    for (variable, update) in &solution.updates_to_shape_state_variables {
        let tmp = format!("{}{}", variable, TMP_SUFFIX);
        statements.push(Statement::Declaration(real_declaration(
            &tmp,
            solver_expression(update)?,
        )));
    }
    for (variable, _) in &solution.updates_to_shape_state_variables {
        let tmp = format!("{}{}", variable, TMP_SUFFIX);
        statements.push(Statement::Assignment(Assignment {
            lhs: Variable::new(variable.clone(), 0),
            op: AssignOp::Assign,
            rhs: Expression::variable(Variable::new(tmp, 0)),
            position: SourcePosition::added(),
        }));
    }
    Ok(statements)
}

fn declares(declarations: &[Declaration], name: &str) -> bool {
    declarations
        .iter()
        .flat_map(|decl| &decl.variables)
        .any(|var| var.complete_name() == name)
}

/// Replace every `integrate_odes()` statement, at any nesting depth.
fn replace_integrate_calls(block: &mut Block, propagation: &[Statement]) -> usize {
    let mut replaced = 0;
    let mut statements = Vec::with_capacity(block.statements.len());
    for mut stmt in block.statements.drain(..) {
        match &mut stmt {
            Statement::Call(call) if call.name == FN_INTEGRATE_ODES => {
                statements.extend(propagation.iter().cloned());
                replaced += 1;
                continue;
            }
            Statement::If {
                branches,
                else_block,
                ..
            } => {
                for branch in branches {
                    replaced += replace_integrate_calls(&mut branch.body, propagation);
                }
                if let Some(block) = else_block {
                    replaced += replace_integrate_calls(block, propagation);
                }
            }
            Statement::For { body, .. } | Statement::While { body, .. } => {
                replaced += replace_integrate_calls(body, propagation);
            }
            _ => {}
        }
        statements.push(stmt);
    }
    block.statements = statements;
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse::{parse_block, parse_declarations, parse_equations};
    use indexmap::IndexMap;

    fn solution() -> ExactSolution {
        let map = |entries: &[(&str, &str)]| -> IndexMap<String, String> {
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        ExactSolution {
            ode_var_factor: map(&[("__ode_var_factor", "exp(-__h / tau_m)")]),
            const_input: map(&[("__const_input", "(1 - exp(-__h / tau_m)) * I_e")]),
            propagator: map(&[("__P11", "exp(-__h / tau_syn)"), ("__P21", "__h * __P11")]),
            ode_var_update_instructions: vec![
                "V_m = __ode_var_factor * V_m + __const_input + __P21 * I_shape".to_string(),
            ],
            shape_state_variables: vec!["I_shape".to_string()],
            shape_initial_values: vec!["1.0".to_string()],
            updates_to_shape_state_variables: vec![(
                "I_shape".to_string(),
                "__P11 * I_shape".to_string(),
            )],
        }
    }

    fn neuron() -> Neuron {
        let mut neuron = Neuron::new("iaf");
        neuron.parameters = parse_declarations("tau_m ms = 10 ms\ntau_syn ms = 2 ms").unwrap();
        neuron.initial_values = parse_declarations("V_m mV = 0 mV").unwrap();
        neuron.equations = Some(
            parse_equations("shape I_shape = exp(-t / tau_syn)\nV_m' = -V_m / tau_m").unwrap(),
        );
        neuron.update = Some(
            parse_block("if true:\n  integrate_odes()\nend\nemit_spike()").unwrap(),
        );
        neuron
    }

    #[test]
    fn test_exact_solution_discretizes_neuron() {
        let mut neuron = neuron();
        apply_exact_solution(&mut neuron, &solution()).unwrap();

        assert!(neuron.equations.is_none());
        let internals: Vec<String> = neuron.internals.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            internals,
            vec![
                "__h ms = resolution()",
                "__ode_var_factor real = exp(-__h / tau_m)",
                "__const_input real = (1 - exp(-__h / tau_m)) * I_e",
                "__P11 real = exp(-__h / tau_syn)",
                "__P21 real = __h * __P11",
            ]
        );
        assert_eq!(neuron.initial_values.len(), 2);
        assert_eq!(neuron.initial_values[1].to_string(), "I_shape real = 1.0");

        let update = neuron.update.as_ref().unwrap().to_string();
        let expected = "\
if true:
  V_m = __ode_var_factor * V_m + __const_input + __P21 * I_shape
  I_shape__tmp real = __P11 * I_shape
  I_shape = I_shape__tmp
end
emit_spike()
";
        assert_eq!(update, expected);
    }

    #[test]
    fn test_missing_integrate_call_appends() {
        let mut neuron = neuron();
        neuron.update = Some(parse_block("emit_spike()").unwrap());
        apply_exact_solution(&mut neuron, &solution()).unwrap();
        assert_eq!(neuron.update.as_ref().unwrap().statements.len(), 4);
    }

    #[test]
    fn test_bad_response_leaves_neuron_untouched() {
        let mut neuron = neuron();
        let before = neuron.clone();
        let mut broken = solution();
        broken.propagator.insert("__P22".to_string(), "exp(".to_string());
        assert!(matches!(
            apply_exact_solution(&mut neuron, &broken),
            Err(IrError::Parse { .. })
        ));
        assert_eq!(neuron, before);

        let mut uneven = solution();
        uneven.shape_initial_values.clear();
        assert!(matches!(
            apply_exact_solution(&mut neuron, &uneven),
            Err(IrError::MalformedResponse(_))
        ));
    }
}
