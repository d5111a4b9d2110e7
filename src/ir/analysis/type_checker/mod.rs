//! Typing pass over a scoped neuron.
//!
//! Runs after the symbol table is built. Every expression in the neuron gets
//! its type annotated in place and stores into declared targets go through
//! implicit cast recovery. The pass never fails: problems end up in the
//! returned report and the offending node is typed as `Error`.

pub mod casts;
pub mod expressions;

pub use casts::{classify_cast, recover_or_error, CastOutcome};
pub use expressions::type_expression;

use crate::ir::analysis::predefined::PredefinedContext;
use crate::ir::analysis::scope::SymbolTable;
use crate::ir::analysis::symbols::SymbolKind;
use crate::ir::analysis::type_symbol::{self, TypeSymbol};
use crate::ir::ast::{
    Block, Declaration, EquationDecl, EquationsBlock, Expression, ExprKind, FunctionCall, Neuron,
    Statement,
};
use crate::ir::diagnostics::DiagnosticReport;

/// What expression typing resolves names against.
pub struct TypeEnv<'a> {
    pub table: &'a SymbolTable,
    pub ctx: &'a PredefinedContext,
}

/// Type every expression of `neuron`.
pub fn check_neuron_types(
    neuron: &mut Neuron,
    table: &SymbolTable,
    ctx: &PredefinedContext,
) -> DiagnosticReport {
    let env = TypeEnv { table, ctx };
    let mut report = DiagnosticReport::new();

    for decl in neuron
        .state
        .iter_mut()
        .chain(neuron.parameters.iter_mut())
        .chain(neuron.internals.iter_mut())
        .chain(neuron.initial_values.iter_mut())
    {
        check_declaration(decl, &env, &mut report);
    }
    if let Some(equations) = &mut neuron.equations {
        check_equations(equations, &env, &mut report);
    }
    for function in &mut neuron.functions {
        check_block(&mut function.body, &env, &mut report);
    }
    if let Some(update) = &mut neuron.update {
        check_block(update, &env, &mut report);
    }
    report
}

fn check_declaration(decl: &mut Declaration, env: &TypeEnv<'_>, report: &mut DiagnosticReport) {
    let target = env
        .ctx
        .resolve_data_type(&decl.data_type)
        .unwrap_or(TypeSymbol::Error);
    if let Some(expr) = &mut decl.expression {
        type_expression(expr, env, report);
        let names: Vec<String> = decl.variables.iter().map(|v| v.complete_name()).collect();
        let context = format!("declaration of '{}'", names.join(", "));
        recover_or_error(&target, expr, &context, report);
    }
    if let Some(invariant) = &mut decl.invariant {
        type_expression(invariant, env, report);
    }
}

fn check_equations(
    equations: &mut EquationsBlock,
    env: &TypeEnv<'_>,
    report: &mut DiagnosticReport,
) {
    for decl in &mut equations.declarations {
        match decl {
            EquationDecl::Ode(ode) => {
                type_expression(&mut ode.rhs, env, report);
            }
            EquationDecl::Shape(shape) => {
                type_expression(&mut shape.rhs, env, report);
            }
            EquationDecl::Function(function) => {
                type_expression(&mut function.expression, env, report);
                let target = env
                    .ctx
                    .resolve_data_type(&function.data_type)
                    .unwrap_or(TypeSymbol::Error);
                let context = format!("function '{}'", function.name);
                recover_or_error(&target, &mut function.expression, &context, report);
            }
        }
    }
}

fn check_block(block: &mut Block, env: &TypeEnv<'_>, report: &mut DiagnosticReport) {
    for stmt in &mut block.statements {
        check_statement(stmt, env, report);
    }
}

fn check_statement(stmt: &mut Statement, env: &TypeEnv<'_>, report: &mut DiagnosticReport) {
    match stmt {
        Statement::Declaration(decl) => check_declaration(decl, env, report),
        Statement::Assignment(assignment) => {
            let rhs_type = type_expression(&mut assignment.rhs, env, report);
            let scope = assignment.lhs.scope.unwrap_or_else(|| env.table.global());
            let Some(target) = env
                .table
                .resolve(scope, &assignment.lhs.complete_name(), SymbolKind::Variable)
                .map(|symbol| symbol.type_symbol.clone())
            else {
                // Undefined targets are reported by the variable-definition check.
                return;
            };
            let value = match assignment.op.binary_op() {
                Some(op) => {
                    let (ty, diagnostic) = type_symbol::binary(
                        op,
                        &target,
                        &rhs_type,
                        assignment.rhs.integer_value(),
                    );
                    if let Some(diagnostic) = diagnostic {
                        report.add(diagnostic.at(assignment.position));
                    }
                    ty
                }
                None => rhs_type,
            };
            let context = format!("assignment to '{}'", assignment.lhs.complete_name());
            casts::recover_value(&target, &value, &mut assignment.rhs, &context, report);
        }
        Statement::Call(call) => check_call_statement(call, env, report),
        Statement::Return { value, .. } => {
            if let Some(value) = value {
                type_expression(value, env, report);
            }
        }
        Statement::If {
            branches,
            else_block,
            ..
        } => {
            for branch in branches {
                type_expression(&mut branch.condition, env, report);
                check_block(&mut branch.body, env, report);
            }
            if let Some(block) = else_block {
                check_block(block, env, report);
            }
        }
        Statement::For { from, to, body, .. } => {
            type_expression(from, env, report);
            type_expression(to, env, report);
            check_block(body, env, report);
        }
        Statement::While {
            condition, body, ..
        } => {
            type_expression(condition, env, report);
            check_block(body, env, report);
        }
    }
}

/// A call used as a statement is typed through a temporary expression so
/// argument conversion factors land back in the tree.
fn check_call_statement(call: &mut FunctionCall, env: &TypeEnv<'_>, report: &mut DiagnosticReport) {
    let scope = call.args.first().and_then(|arg| arg.scope);
    let taken = std::mem::replace(call, FunctionCall::new(String::new(), Vec::new()));
    let mut expr = Expression::call(taken);
    expr.scope = scope;
    type_expression(&mut expr, env, report);
    if let ExprKind::FunctionCall(typed) = expr.kind {
        *call = typed;
    }
}
