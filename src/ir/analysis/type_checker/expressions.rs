//! Bottom-up expression typing.
//!
//! Every expression node gets its `ty` slot filled. Operator rules come
//! from `type_symbol`; this module resolves names and attaches positions to
//! the diagnostics the rules return.

use crate::ir::analysis::predefined::is_convolution_function;
use crate::ir::analysis::symbols::SymbolKind;
use crate::ir::analysis::type_symbol::{self, Operand, TypeSymbol};
use crate::ir::analysis::scope::ScopeId;
use crate::ir::ast::{
    ExprKind, Expression, FunctionCall, Literal, OperatorCategory, SourcePosition, UnaryOp, Variable,
};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};

use super::casts::{classify_cast, CastOutcome};
use super::TypeEnv;

/// Type `expr` and all of its sub-expressions, returning the type of the
/// root.
pub fn type_expression(
    expr: &mut Expression,
    env: &TypeEnv<'_>,
    report: &mut DiagnosticReport,
) -> TypeSymbol {
    let position = expr.position;
    let scope = expr.scope;
    let ty = match &mut expr.kind {
        ExprKind::Literal(literal) => literal_type(literal),
        ExprKind::UnitLiteral { value, unit } => {
            let value_type = literal_type(value);
            let unit_type = match env.ctx.unit_type(&unit.name) {
                Some(unit_type) => unit_type,
                None => variable_type(unit, scope, env, report),
            };
            attach(type_symbol::mul(&value_type, &unit_type), position, report)
        }
        ExprKind::Variable(var) => variable_type(var, scope, env, report),
        ExprKind::FunctionCall(call) => call_type(call, scope, position, env, report),
        ExprKind::Unary { op, operand } => {
            let operand_type = type_expression(operand, env, report);
            let outcome = match op {
                UnaryOp::Plus | UnaryOp::Minus => type_symbol::neg(&operand_type),
                UnaryOp::Not => type_symbol::not(&operand_type),
                UnaryOp::BitNot => type_symbol::bitwise(&operand_type),
            };
            attach(outcome, position, report)
        }
        ExprKind::Binary { lhs, op, rhs } => {
            let lhs_type = type_expression(lhs, env, report);
            let rhs_type = type_expression(rhs, env, report);
            if op.category() == OperatorCategory::Logical {
                let (ty, issue) = type_symbol::logical(*op, &lhs_type, &rhs_type);
                if let Some((operand, diagnostic)) = issue {
                    let at = match operand {
                        Operand::Lhs => lhs.position,
                        Operand::Rhs => rhs.position,
                    };
                    report.add(diagnostic.at(at));
                }
                ty
            } else {
                let literal_exponent = rhs.integer_value();
                attach(
                    type_symbol::binary(*op, &lhs_type, &rhs_type, literal_exponent),
                    position,
                    report,
                )
            }
        }
        ExprKind::Paren(inner) => type_expression(inner, env, report),
        ExprKind::Ternary {
            condition,
            if_true,
            if_false,
        } => {
            let condition_type = type_expression(condition, env, report);
            let true_type = type_expression(if_true, env, report);
            let false_type = type_expression(if_false, env, report);
            attach(
                type_symbol::ternary(&condition_type, &true_type, &false_type),
                position,
                report,
            )
        }
    };
    expr.ty = Some(ty.clone());
    ty
}

fn attach(
    (ty, diagnostic): type_symbol::TypeOutcome,
    position: SourcePosition,
    report: &mut DiagnosticReport,
) -> TypeSymbol {
    if let Some(diagnostic) = diagnostic {
        report.add(diagnostic.at(position));
    }
    ty
}

fn literal_type(literal: &Literal) -> TypeSymbol {
    match literal {
        Literal::Integer(_) => TypeSymbol::Integer,
        Literal::Real(_) | Literal::Inf => TypeSymbol::Real,
        Literal::Boolean(_) => TypeSymbol::Boolean,
        Literal::String(_) => TypeSymbol::String,
    }
}

/// Type of a variable reference. Bare unit names (`1/ms`) resolve to their
/// unit type.
fn variable_type(
    var: &Variable,
    scope: Option<ScopeId>,
    env: &TypeEnv<'_>,
    report: &mut DiagnosticReport,
) -> TypeSymbol {
    let scope = var.scope.or(scope).unwrap_or_else(|| env.table.global());
    if let Some(symbol) = env
        .table
        .resolve(scope, &var.complete_name(), SymbolKind::Variable)
    {
        return symbol.type_symbol.clone();
    }
    if var.differential_order == 0 {
        if let Some(unit) = env.ctx.unit_type(&var.name) {
            return unit;
        }
    }
    report.add(
        Diagnostic::error(
            DiagnosticCode::VariableNotDefined,
            format!("Variable '{}' is not defined", var.complete_name()),
        )
        .at(var.position),
    );
    TypeSymbol::Error
}

/// Type of a call: the declared return type, except that the convolution
/// combinators carry the unit of the buffer they read.
///
/// Arguments whose unit differs from the parameter only in magnitude get
/// their conversion factor here; the diagnostics for argument mismatches
/// come from the function-call consistency check.
fn call_type(
    call: &mut FunctionCall,
    scope: Option<ScopeId>,
    position: SourcePosition,
    env: &TypeEnv<'_>,
    report: &mut DiagnosticReport,
) -> TypeSymbol {
    let arg_types: Vec<TypeSymbol> = call
        .args
        .iter_mut()
        .map(|arg| type_expression(arg, env, report))
        .collect();
    let scope = scope.unwrap_or_else(|| env.table.global());
    let Some(symbol) = env.table.resolve(scope, &call.name, SymbolKind::Function) else {
        report.add(
            Diagnostic::error(
                DiagnosticCode::FunctionNotDeclared,
                format!("Function '{}' is not declared", call.name),
            )
            .at(position),
        );
        return TypeSymbol::Error;
    };
    // already reported where the argument went wrong
    if arg_types.iter().any(TypeSymbol::is_error) {
        return TypeSymbol::Error;
    }

    if is_convolution_function(&call.name) {
        return match arg_types.get(1) {
            Some(buffer) if buffer.is_unit() => buffer.clone(),
            _ => TypeSymbol::Real,
        };
    }

    if let Some(signature) = &symbol.signature {
        if signature.parameters.len() == call.args.len() {
            for ((arg, expected), actual) in call
                .args
                .iter_mut()
                .zip(&signature.parameters)
                .zip(&arg_types)
            {
                if let CastOutcome::Magnitude(factor) = classify_cast(expected, actual) {
                    arg.conversion_factor = Some(factor);
                }
            }
        }
    }
    symbol.type_symbol.clone()
}
