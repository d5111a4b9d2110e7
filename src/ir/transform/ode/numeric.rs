//! Applying a numeric expansion of functional shapes.
//!
//! The solver names the state variables of a shape `g` as `g`, `g__d`,
//! `g__d__d`, ... where `g__d` stands for `g'`. Each chain is turned back
//! into a differential shape with tick notation plus one initial value per
//! order.

use std::collections::HashSet;

use crate::ir::analysis::symbol_table::is_identity_entry;
use crate::ir::ast::{
    EquationDecl, EquationsBlock, Expression, Neuron, OdeShape, ShapeForm, SourcePosition,
    Variable,
};
use crate::ir::error::IrError;
use crate::ir::transform::ode::{real_declaration, solver_expression};
use crate::ir::visitor::{MutVisitable, MutVisitor};
use crate::solver::NumericSolution;

const DERIVATIVE_SUFFIX: &str = "__d";

/// State variables of one shape as returned by the solver, lowest order
/// first.
#[derive(Debug)]
struct Chain<'a> {
    shape: String,
    definitions: Vec<&'a str>,
    initial_values: Vec<&'a str>,
}

/// Replace every functional shape of `neuron` by its differential
/// expansion. ODEs and differential shapes are left as they are.
pub fn apply_numeric_solution(
    neuron: &mut Neuron,
    solution: &NumericSolution,
) -> Result<(), IrError> {
    let Some(equations) = &mut neuron.equations else {
        return Ok(());
    };
    let functional: Vec<String> = equations
        .shapes()
        .filter(|shape| shape.form() == ShapeForm::Functional)
        .map(|shape| shape.lhs.name.clone())
        .collect();

    let chains = split_chains(solution, &functional)?;
    let bases: HashSet<&str> = chains.iter().map(|chain| chain.shape.as_str()).collect();

    let mut expansions = Vec::new();
    let mut initial_values = Vec::new();
    for chain in &chains {
        let order = chain.definitions.len();
        let mut shapes = Vec::new();
        for (index, definition) in chain.definitions.iter().enumerate() {
            let lhs = Variable::new(chain.shape.clone(), index + 1);
            let rhs = tick_expression(definition, &bases)?;
            // `g' = g__d` links the chain and is implied by the top order
            if index + 1 < order && is_identity_entry(&lhs, &rhs) {
                continue;
            }
            shapes.push(EquationDecl::Shape(OdeShape {
                lhs,
                rhs,
                position: SourcePosition::added(),
            }));
        }
        expansions.push((chain.shape.clone(), shapes));

        for (index, initial) in chain.initial_values.iter().enumerate() {
            let var = Variable::new(chain.shape.clone(), index);
            initial_values.push(real_declaration(
                &var.complete_name(),
                tick_expression(initial, &bases)?,
            ));
        }
    }

    for (shape, shapes) in expansions {
        replace_functional_shape(equations, &shape, shapes);
    }
    for decl in initial_values {
        let name = decl.variables[0].complete_name();
        neuron.initial_values.retain(|existing| {
            !existing.variables.iter().any(|var| var.complete_name() == name)
        });
        neuron.initial_values.push(decl);
    }
    Ok(())
}

/// Split the flat solver lists into one chain per functional shape.
fn split_chains<'a>(
    solution: &'a NumericSolution,
    functional: &[String],
) -> Result<Vec<Chain<'a>>, IrError> {
    let mut chains: Vec<Chain<'a>> = Vec::new();
    let entries = solution
        .shape_state_variables
        .iter()
        .zip(&solution.shape_ode_definitions)
        .zip(&solution.shape_initial_values);
    for ((name, definition), initial) in entries {
        match name.split_once("__") {
            None => {
                if !functional.contains(name) {
                    return Err(IrError::MalformedResponse(format!(
                        "state variable '{}' does not belong to a functional shape",
                        name
                    )));
                }
                if chains.iter().any(|chain| chain.shape == *name) {
                    return Err(IrError::ShapeChainNaming {
                        shape: name.clone(),
                        found: name.clone(),
                    });
                }
                chains.push(Chain {
                    shape: name.clone(),
                    definitions: vec![definition.as_str()],
                    initial_values: vec![initial.as_str()],
                });
            }
            Some((base, _)) => {
                let Some(chain) = chains.last_mut() else {
                    return Err(IrError::ShapeChainNaming {
                        shape: base.to_string(),
                        found: name.clone(),
                    });
                };
                let expected = format!(
                    "{}{}",
                    chain.shape,
                    DERIVATIVE_SUFFIX.repeat(chain.definitions.len())
                );
                if *name != expected {
                    return Err(IrError::ShapeChainNaming {
                        shape: chain.shape.clone(),
                        found: name.clone(),
                    });
                }
                chain.definitions.push(definition.as_str());
                chain.initial_values.push(initial.as_str());
            }
        }
    }
    if let Some(missing) = functional
        .iter()
        .find(|shape| !chains.iter().any(|chain| chain.shape == **shape))
    {
        return Err(IrError::MalformedResponse(format!(
            "no state variables for functional shape '{}'",
            missing
        )));
    }
    Ok(chains)
}

/// Order of `name` within the chain of `base`: `g` is 0, `g__d__d` is 2.
fn chain_order(name: &str, base: &str) -> Option<usize> {
    let mut rest = name.strip_prefix(base)?;
    let mut order = 0;
    while !rest.is_empty() {
        rest = rest.strip_prefix(DERIVATIVE_SUFFIX)?;
        order += 1;
    }
    Some(order)
}

/// Parse a solver expression, rewriting chain names to tick notation.
fn tick_expression(text: &str, bases: &HashSet<&str>) -> Result<Expression, IrError> {
    let mut expr = solver_expression(text)?;
    expr.accept_mut(&mut ToTicks { bases });
    Ok(expr)
}

struct ToTicks<'a> {
    bases: &'a HashSet<&'a str>,
}

impl MutVisitor for ToTicks<'_> {
    fn enter_variable(&mut self, node: &mut Variable) {
        if node.differential_order != 0 || !node.name.contains(DERIVATIVE_SUFFIX) {
            return;
        }
        let Some(base) = node.name.split(DERIVATIVE_SUFFIX).next().map(str::to_string) else {
            return;
        };
        if !self.bases.contains(base.as_str()) {
            return;
        }
        if let Some(order) = chain_order(&node.name, &base) {
            node.name = base;
            node.differential_order = order;
        }
    }
}

/// Put `shapes` where the functional shape `name` was declared.
fn replace_functional_shape(equations: &mut EquationsBlock, name: &str, shapes: Vec<EquationDecl>) {
    let position = equations.declarations.iter().position(|decl| {
        matches!(decl, EquationDecl::Shape(shape)
            if shape.lhs.name == name && shape.form() == ShapeForm::Functional)
    });
    match position {
        Some(index) => {
            equations.declarations.splice(index..=index, shapes);
        }
        None => equations.declarations.extend(shapes),
    }
}
