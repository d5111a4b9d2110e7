//! Resolution of equations blocks.
//!
//! A neuron with shapes goes through
//! `RAW -> NORMALIZED -> SELF_CONTAINED -> SOLVED -> REWRITTEN`:
//! convolutions are recorded and put in canonical form, function aliases
//! are inlined into a copy handed to the solver, and the solver response
//! is applied either as an exact propagator update or as an expansion of
//! functional shapes into differential ones. Incoming spikes are then
//! applied to the shape state variables.
//!
//! A neuron without equations block, or whose block holds no shapes, is
//! left unchanged.

pub mod exact;
pub mod normalize;
pub mod numeric;
pub mod pipeline;
pub mod self_contained;
pub mod spikes;

pub use pipeline::{build_solver_request, transform_neuron, TransformOptions, TransformOutcome};

use crate::ir::ast::{
    BinaryOp, DataType, Declaration, ExprKind, Expression, FunctionCall, Literal, SourcePosition,
    Statement, UnitExpr, Variable,
};
use crate::ir::error::IrError;
use crate::ir::parse;
use crate::ir::visitor::{MutVisitable, MutVisitor};

/// Resets positions of nodes built from solver output: they have no place
/// in the user's source.
struct MarkAdded;

impl MutVisitor for MarkAdded {
    fn enter_expression(&mut self, node: &mut Expression) {
        node.position = SourcePosition::added();
    }

    fn enter_variable(&mut self, node: &mut Variable) {
        node.position = SourcePosition::added();
    }

    fn enter_function_call(&mut self, node: &mut FunctionCall) {
        node.position = SourcePosition::added();
    }

    fn enter_declaration(&mut self, node: &mut Declaration) {
        node.position = SourcePosition::added();
    }

    fn enter_statement(&mut self, node: &mut Statement) {
        if let Statement::Assignment(assignment) = node {
            assignment.position = SourcePosition::added();
        }
    }
}

fn solver_expression(text: &str) -> Result<Expression, IrError> {
    let mut expr = parse::parse_expression(text)?;
    expr.accept_mut(&mut MarkAdded);
    Ok(expr)
}

fn solver_assignment(text: &str) -> Result<Statement, IrError> {
    let mut stmt = Statement::Assignment(parse::parse_assignment(text)?);
    stmt.accept_mut(&mut MarkAdded);
    Ok(stmt)
}

/// A zero of the given type, e.g. `0 mV` or `0 * (nS/ms)`.
fn zero_of(data_type: &DataType) -> Expression {
    match data_type {
        DataType::Integer => Expression::integer(0),
        DataType::Real | DataType::Void => Expression::real(0.0),
        DataType::Boolean => Expression::new(ExprKind::Literal(Literal::Boolean(false))),
        DataType::String => Expression::new(ExprKind::Literal(Literal::String(String::new()))),
        DataType::Unit(UnitExpr::Name(name)) => Expression::new(ExprKind::UnitLiteral {
            value: Literal::Integer(0),
            unit: Variable::new(name.clone(), 0),
        }),
        DataType::Unit(unit) => Expression::binary(
            Expression::integer(0),
            BinaryOp::Mul,
            Expression::paren(unit_expression(unit)),
        ),
    }
}

fn unit_expression(unit: &UnitExpr) -> Expression {
    match unit {
        UnitExpr::Name(name) => Expression::variable(Variable::new(name.clone(), 0)),
        UnitExpr::One => Expression::integer(1),
        UnitExpr::Mul(lhs, rhs) => {
            Expression::binary(unit_expression(lhs), BinaryOp::Mul, unit_expression(rhs))
        }
        UnitExpr::Div(lhs, rhs) => {
            Expression::binary(unit_expression(lhs), BinaryOp::Div, unit_expression(rhs))
        }
        UnitExpr::Pow(base, exponent) => Expression::binary(
            unit_expression(base),
            BinaryOp::Pow,
            Expression::integer(i64::from(*exponent)),
        ),
        UnitExpr::Paren(inner) => Expression::paren(unit_expression(inner)),
    }
}

/// `name real = expression`, as the solver's internal constants are
/// declared.
fn real_declaration(name: &str, expression: Expression) -> Declaration {
    Declaration::new(Variable::new(name, 0), DataType::Real, Some(expression))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse::parse_data_type;

    #[test]
    fn test_solver_fragments_are_marked_added() {
        let expr = solver_expression("__P11 * g").unwrap();
        assert!(expr.position.is_added());
        let ExprKind::Binary { lhs, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert!(lhs.as_variable().unwrap().position.is_added());

        let Statement::Assignment(assignment) = solver_assignment("V_m = P * V_m").unwrap() else {
            panic!("expected assignment");
        };
        assert!(assignment.position.is_added());
        assert!(assignment.lhs.position.is_added());
    }

    #[test]
    fn test_zero_of() {
        assert_eq!(zero_of(&DataType::Real).to_string(), "0.0");
        assert_eq!(zero_of(&parse_data_type("mV").unwrap()).to_string(), "0 mV");
        assert_eq!(
            zero_of(&parse_data_type("nS/ms").unwrap()).to_string(),
            "0 * (nS / ms)"
        );
    }
}
