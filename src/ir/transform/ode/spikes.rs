//! Spike application and relocation of initial values.

use crate::ir::ast::{
    AssignOp, Assignment, BinaryOp, Expression, Neuron, SourcePosition, Statement, Variable,
};
use crate::ir::transform::ode::normalize::ShapeBuffers;
use crate::ir::transform::ode::zero_of;

/// Append `x += buffer * (x0)` to the update block for every initial value
/// `x = x0` belonging to a convolved shape, then move all initial values
/// into the state block with a zero initializer.
///
/// Every state variable of the shape gets its own increment, so a shape
/// expanded into a chain of `n` orders yields `n` increments.
///
/// Returns the number of spike increments added.
pub fn apply_spikes(neuron: &mut Neuron, pairs: &ShapeBuffers) -> usize {
    let mut increments = Vec::new();
    for (shape, buffer) in pairs {
        for decl in &neuron.initial_values {
            let Some(initial) = &decl.expression else {
                continue;
            };
            for var in decl.variables.iter().filter(|var| belongs_to_shape(var, shape)) {
                increments.push(Statement::Assignment(Assignment {
                    lhs: Variable::new(var.name.clone(), var.differential_order),
                    op: AssignOp::AddAssign,
                    rhs: Expression::binary(
                        Expression::variable(Variable::new(buffer.clone(), 0)),
                        BinaryOp::Mul,
                        Expression::paren(initial.clone()),
                    ),
                    position: SourcePosition::added(),
                }));
            }
        }
    }
    let count = increments.len();
    if count > 0 {
        neuron.update_block_mut().statements.extend(increments);
    }

    for mut decl in std::mem::take(&mut neuron.initial_values) {
        decl.expression = Some(zero_of(&decl.data_type));
        neuron.state.push(decl);
    }
    count
}

/// Whether `var` is a state variable of `shape`: `g`, `g'`, `g''` or the
/// solver spellings `g__d`, `g__1`.
fn belongs_to_shape(var: &Variable, shape: &str) -> bool {
    let shape_base = shape.trim_end_matches('\'');
    if var.name == shape_base {
        return true;
    }
    if var.differential_order != 0 {
        return false;
    }
    let Some(suffix) = var.name.strip_prefix(shape_base) else {
        return false;
    };
    let Some(mut rest) = suffix.strip_prefix("__") else {
        return false;
    };
    if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    while let Some(tail) = rest.strip_prefix('d') {
        if tail.is_empty() {
            return true;
        }
        let Some(next) = tail.strip_prefix("__") else {
            return false;
        };
        rest = next;
    }
    false
}
