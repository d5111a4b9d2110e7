//! Variable usage: definition order, recursive definitions, assignment
//! targets.

use crate::ir::analysis::scope::SymbolTable;
use crate::ir::analysis::symbols::{BlockType, Symbol, SymbolKind};
use crate::ir::ast::{Expression, Neuron, Statement, Variable};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};
use crate::ir::visitor::{Visitable, Visitor};

fn resolve<'t>(table: &'t SymbolTable, var: &Variable) -> Option<&'t Symbol> {
    let scope = var.scope.unwrap_or_else(|| table.global());
    table.resolve(scope, &var.complete_name(), SymbolKind::Variable)
}

// =============================================================================
// All variables defined
// =============================================================================

/// Every variable used in an expression must be declared before the use,
/// unless it is a parameter, a buffer, predefined or synthesized. A
/// variable used inside its own declaration is a recursive definition.
/// Assignment targets must resolve.
///
/// References that do not resolve at all inside expressions are reported
/// by the typing pass.
pub fn check_all_variables_defined(neuron: &Neuron, table: &SymbolTable) -> DiagnosticReport {
    let mut checker = VariablesDefined {
        table,
        depth: 0,
        report: DiagnosticReport::new(),
    };
    neuron.accept(&mut checker);
    checker.report
}

struct VariablesDefined<'a> {
    table: &'a SymbolTable,
    /// Nesting of expressions; declared names outside expressions are skipped.
    depth: usize,
    report: DiagnosticReport,
}

impl Visitor for VariablesDefined<'_> {
    fn enter_expression(&mut self, _node: &Expression) {
        self.depth += 1;
    }

    fn exit_expression(&mut self, _node: &Expression) {
        self.depth -= 1;
    }

    fn enter_statement(&mut self, node: &Statement) {
        let Statement::Assignment(assignment) = node else {
            return;
        };
        if resolve(self.table, &assignment.lhs).is_none() {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::VariableNotDefined,
                    format!(
                        "Variable '{}' is assigned but not defined",
                        assignment.lhs.complete_name()
                    ),
                )
                .at(assignment.lhs.position),
            );
        }
    }

    fn enter_variable(&mut self, node: &Variable) {
        if self.depth == 0 {
            return;
        }
        let Some(symbol) = resolve(self.table, node) else {
            return;
        };
        if symbol.is_predefined || symbol.is_buffer() {
            return;
        }
        let declared_at = symbol.declaration_position;
        if declared_at.is_added() {
            return;
        }
        let is_parameter = symbol.block == Some(BlockType::Parameters);
        if !is_parameter && !declared_at.before(&node.position) {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::VariableUsedBeforeDeclaration,
                    format!(
                        "Variable '{}' is used before its declaration",
                        node.complete_name()
                    ),
                )
                .at(node.position),
            );
        }
        if declared_at.encloses(&node.position) {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::VariableDefinedRecursively,
                    format!("Variable '{}' is defined recursively", node.complete_name()),
                )
                .at(declared_at),
            );
        }
    }
}

// =============================================================================
// Buffers
// =============================================================================

/// Input buffers are read-only.
pub fn check_buffer_not_assigned(neuron: &Neuron, table: &SymbolTable) -> DiagnosticReport {
    let mut checker = BufferNotAssigned {
        table,
        report: DiagnosticReport::new(),
    };
    neuron.accept(&mut checker);
    checker.report
}

struct BufferNotAssigned<'a> {
    table: &'a SymbolTable,
    report: DiagnosticReport,
}

impl Visitor for BufferNotAssigned<'_> {
    fn enter_statement(&mut self, node: &Statement) {
        let Statement::Assignment(assignment) = node else {
            return;
        };
        let scope = assignment.lhs.scope.unwrap_or_else(|| self.table.global());
        let Some(symbol) = self
            .table
            .resolve(scope, &assignment.lhs.name, SymbolKind::Variable)
        else {
            return;
        };
        if symbol.is_buffer() {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::BufferAssigned,
                    format!(
                        "Value assigned to input buffer '{}'",
                        assignment.lhs.complete_name()
                    ),
                )
                .at(assignment.position),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::predefined::PredefinedContext;
    use crate::ir::analysis::symbol_table::build_symbol_table;
    use crate::ir::parse::{parse_block, parse_declarations, parse_input_lines};

    fn scoped(mut neuron: Neuron) -> (Neuron, SymbolTable) {
        let ctx = PredefinedContext::shared();
        let (table, _) = build_symbol_table(&mut neuron, &ctx);
        (neuron, table)
    }

    #[test]
    fn test_recursive_and_forward_references() {
        let mut neuron = Neuron::new("n");
        neuron.state = parse_declarations("V_m mV = V_m + 10 mV\nV_a mV = V_b\nV_b mV = 0 mV").unwrap();
        let (neuron, table) = scoped(neuron);
        let report = check_all_variables_defined(&neuron, &table);

        let recursive = report.with_code(DiagnosticCode::VariableDefinedRecursively);
        assert_eq!(recursive.len(), 1);
        assert_eq!(recursive[0].position, neuron.state[0].position);
        let early = report.with_code(DiagnosticCode::VariableUsedBeforeDeclaration);
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].position.start_line, 2);
    }

    #[test]
    fn test_parameters_and_buffers_are_exempt() {
        let mut neuron = Neuron::new("n");
        neuron.parameters = parse_declarations("a real = b\nb real = 1").unwrap();
        neuron.input = parse_input_lines("currents pA <- current").unwrap();
        neuron.update = Some(parse_block("x pA = currents\ny real = a").unwrap());
        let (neuron, table) = scoped(neuron);
        let report = check_all_variables_defined(&neuron, &table);
        assert!(report.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_undefined_assignment_target() {
        let mut neuron = Neuron::new("n");
        neuron.update = Some(parse_block("z = 1").unwrap());
        let (neuron, table) = scoped(neuron);
        let report = check_all_variables_defined(&neuron, &table);
        assert_eq!(report.with_code(DiagnosticCode::VariableNotDefined).len(), 1);
    }

    #[test]
    fn test_buffer_not_assigned() {
        let mut neuron = Neuron::new("n");
        neuron.input = parse_input_lines("spikes nS <- spike\ncurrents pA <- current").unwrap();
        neuron.update = Some(parse_block("spikes = 1 nS\ncurrents += 1 pA\nx real = 1\nx = 2").unwrap());
        let (neuron, table) = scoped(neuron);
        let report = check_buffer_not_assigned(&neuron, &table);
        assert_eq!(report.with_code(DiagnosticCode::BufferAssigned).len(), 2);
        assert_eq!(report.len(), 2);
    }
}
