//! Function aliases and the initial values block.

use crate::ir::analysis::scope::SymbolTable;
use crate::ir::analysis::symbols::SymbolKind;
use crate::ir::analysis::type_symbol::TypeSymbol;
use crate::ir::ast::{Declaration, Neuron};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};
use crate::ir::visitor::{Visitable, Visitor};

/// `function a, b mV = ...` is rejected: an alias names exactly one value.
pub fn check_function_alias_single_lhs(neuron: &Neuron, _table: &SymbolTable) -> DiagnosticReport {
    let mut checker = SingleLhs::default();
    neuron.accept(&mut checker);
    checker.report
}

#[derive(Default)]
struct SingleLhs {
    report: DiagnosticReport,
}

impl Visitor for SingleLhs {
    fn enter_declaration(&mut self, node: &Declaration) {
        if node.is_function && node.variables.len() > 1 {
            let names: Vec<String> = node.variables.iter().map(|v| v.complete_name()).collect();
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::FunctionAliasMultipleLhs,
                    format!("Function alias declares several names: {}", names.join(", ")),
                )
                .at(node.position),
            );
        }
    }
}

/// Every initial value needs an initializing expression that types
/// cleanly and an equation defining its evolution; aliases are exempt from
/// the latter two.
pub fn check_initial_values(neuron: &Neuron, table: &SymbolTable) -> DiagnosticReport {
    let mut report = DiagnosticReport::new();
    for decl in &neuron.initial_values {
        for var in &decl.variables {
            let scope = var.scope.unwrap_or_else(|| table.global());
            let Some(symbol) = table.resolve(scope, &var.complete_name(), SymbolKind::Variable)
            else {
                continue;
            };
            if !symbol.is_initial_value() {
                continue;
            }
            let name = var.complete_name();
            if decl.expression.is_none() {
                report.add(
                    Diagnostic::error(
                        DiagnosticCode::InitValueWithoutExpression,
                        format!("Initial value '{}' has no initializing expression", name),
                    )
                    .at(var.position),
                );
            }
            if symbol.ode_definition.is_none() && !symbol.is_function {
                report.add(
                    Diagnostic::error(
                        DiagnosticCode::InitValueWithoutOde,
                        format!("Initial value '{}' is not defined by any equation", name),
                    )
                    .at(var.position),
                );
            }
            let unresolved = decl
                .expression
                .as_ref()
                .and_then(|expr| expr.ty.as_ref())
                .is_some_and(TypeSymbol::is_error);
            if unresolved && !symbol.is_function {
                report.add(
                    Diagnostic::error(
                        DiagnosticCode::InitValueNotResolved,
                        format!("Initial value of '{}' could not be resolved", name),
                    )
                    .at(var.position),
                );
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::predefined::PredefinedContext;
    use crate::ir::analysis::symbol_table::build_symbol_table;
    use crate::ir::analysis::type_checker::check_neuron_types;
    use crate::ir::parse::{parse_declarations, parse_equations};

    fn scoped(mut neuron: Neuron) -> (Neuron, SymbolTable) {
        let ctx = PredefinedContext::shared();
        let (table, _) = build_symbol_table(&mut neuron, &ctx);
        (neuron, table)
    }

    #[test]
    fn test_alias_with_several_names() {
        let mut neuron = Neuron::new("n");
        neuron.internals =
            parse_declarations("function a, b real = 1.0\nfunction c real = 2.0").unwrap();
        let (neuron, table) = scoped(neuron);
        let report = check_function_alias_single_lhs(&neuron, &table);
        assert_eq!(report.len(), 1);
        assert_eq!(report.diagnostics[0].code, DiagnosticCode::FunctionAliasMultipleLhs);
    }

    #[test]
    fn test_initial_values_need_expression_and_equation() {
        let mut neuron = Neuron::new("n");
        neuron.parameters = parse_declarations("tau ms = 1 ms").unwrap();
        neuron.initial_values =
            parse_declarations("V_m mV = 0 mV\nw real\nfunction V_x mV = V_m * 2").unwrap();
        neuron.equations = Some(parse_equations("V_m' = -V_m / tau").unwrap());
        let (neuron, table) = scoped(neuron);
        let report = check_initial_values(&neuron, &table);

        assert_eq!(report.with_code(DiagnosticCode::InitValueWithoutExpression).len(), 1);
        let missing_ode = report.with_code(DiagnosticCode::InitValueWithoutOde);
        assert_eq!(missing_ode.len(), 1);
        assert!(missing_ode[0].message.contains("'w'"));
        assert!(report.with_code(DiagnosticCode::InitValueNotResolved).is_empty());
    }

    #[test]
    fn test_initial_value_typed_to_error_is_unresolved() {
        let mut neuron = Neuron::new("n");
        neuron.parameters = parse_declarations("tau ms = 1 ms").unwrap();
        neuron.initial_values =
            parse_declarations("\nV_m mV = V_rest + 1 mV\nw mV = 0 mV").unwrap();
        neuron.equations =
            Some(parse_equations("\n\n\nV_m' = -V_m / tau\nw' = -w / tau").unwrap());
        let (mut neuron, table) = scoped(neuron);
        let ctx = PredefinedContext::shared();
        let typing = check_neuron_types(&mut neuron, &table, &ctx);
        assert_eq!(typing.with_code(DiagnosticCode::VariableNotDefined).len(), 1);

        let report = check_initial_values(&neuron, &table);
        let unresolved = report.with_code(DiagnosticCode::InitValueNotResolved);
        assert_eq!(unresolved.len(), 1);
        assert!(unresolved[0].message.contains("'V_m'"));
        assert_eq!(report.len(), 1);
    }
}
