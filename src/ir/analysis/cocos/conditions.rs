//! Boolean contexts and loop bounds.

use crate::ir::analysis::scope::SymbolTable;
use crate::ir::analysis::type_symbol::TypeSymbol;
use crate::ir::ast::{Declaration, Expression, Neuron, Statement};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};
use crate::ir::visitor::{Visitable, Visitor};

/// Type of an already typed expression. Untyped and `Error` expressions
/// yield `None`: their problem has been reported where it arose.
fn known_type(expr: &Expression) -> Option<&TypeSymbol> {
    expr.ty.as_ref().filter(|ty| !ty.is_error())
}

fn require_boolean(
    expr: &Expression,
    code: DiagnosticCode,
    what: &str,
    report: &mut DiagnosticReport,
) {
    if let Some(ty) = known_type(expr) {
        if *ty != TypeSymbol::Boolean {
            report.add(
                Diagnostic::error(code, format!("{} must be boolean, got {}", what, ty))
                    .at(expr.position),
            );
        }
    }
}

/// `if`, `elif` and `while` conditions are boolean.
pub fn check_conditions_boolean(neuron: &Neuron, _table: &SymbolTable) -> DiagnosticReport {
    let mut checker = Conditions::default();
    neuron.accept(&mut checker);
    checker.report
}

#[derive(Default)]
struct Conditions {
    report: DiagnosticReport,
}

impl Visitor for Conditions {
    fn enter_statement(&mut self, node: &Statement) {
        match node {
            Statement::If { branches, .. } => {
                for branch in branches {
                    require_boolean(
                        &branch.condition,
                        DiagnosticCode::ConditionNotBoolean,
                        "Condition",
                        &mut self.report,
                    );
                }
            }
            Statement::While { condition, .. } => require_boolean(
                condition,
                DiagnosticCode::ConditionNotBoolean,
                "Loop condition",
                &mut self.report,
            ),
            _ => {}
        }
    }
}

/// Declaration invariants `[[...]]` are boolean.
pub fn check_invariants_boolean(neuron: &Neuron, _table: &SymbolTable) -> DiagnosticReport {
    let mut checker = Invariants::default();
    neuron.accept(&mut checker);
    checker.report
}

#[derive(Default)]
struct Invariants {
    report: DiagnosticReport,
}

impl Visitor for Invariants {
    fn enter_declaration(&mut self, node: &Declaration) {
        if let Some(invariant) = &node.invariant {
            require_boolean(
                invariant,
                DiagnosticCode::InvariantNotBoolean,
                "Invariant",
                &mut self.report,
            );
        }
    }
}

/// `for` bounds are numeric.
pub fn check_loop_bounds_numeric(neuron: &Neuron, _table: &SymbolTable) -> DiagnosticReport {
    let mut checker = LoopBounds::default();
    neuron.accept(&mut checker);
    checker.report
}

#[derive(Default)]
struct LoopBounds {
    report: DiagnosticReport,
}

impl Visitor for LoopBounds {
    fn enter_statement(&mut self, node: &Statement) {
        let Statement::For { from, to, .. } = node else {
            return;
        };
        for bound in [from, to] {
            if let Some(ty) = known_type(bound) {
                if !ty.is_numeric() {
                    self.report.add(
                        Diagnostic::error(
                            DiagnosticCode::LoopBoundNotNumeric,
                            format!("Loop bound must be numeric, got {}", ty),
                        )
                        .at(bound.position),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::predefined::PredefinedContext;
    use crate::ir::analysis::symbol_table::build_symbol_table;
    use crate::ir::analysis::type_checker::check_neuron_types;
    use crate::ir::parse::{parse_block, parse_declarations};
    use unindent::unindent;

    fn typed(mut neuron: Neuron) -> (Neuron, SymbolTable) {
        let ctx = PredefinedContext::shared();
        let (table, _) = build_symbol_table(&mut neuron, &ctx);
        check_neuron_types(&mut neuron, &table, &ctx);
        (neuron, table)
    }

    #[test]
    fn test_conditions() {
        let mut neuron = Neuron::new("n");
        neuron.state = parse_declarations("V_m mV = 0 mV\nn integer = 0").unwrap();
        let update = unindent(
            "
            if V_m:
              n = 1
            elif V_m > 1 mV:
              n = 2
            end
            while n:
              n -= 1
            end
            if undefined_name:
              n = 3
            end
            ",
        );
        neuron.update = Some(parse_block(&update).unwrap());
        let (neuron, table) = typed(neuron);
        let report = check_conditions_boolean(&neuron, &table);

        // `undefined_name` is already an error from typing
        assert_eq!(report.with_code(DiagnosticCode::ConditionNotBoolean).len(), 2);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_invariants() {
        let mut neuron = Neuron::new("n");
        neuron.parameters =
            parse_declarations("tau ms = 10 ms [[tau > 0 ms]]\nC_m pF = 1 pF [[C_m]]").unwrap();
        let (neuron, table) = typed(neuron);
        let report = check_invariants_boolean(&neuron, &table);
        assert_eq!(report.with_code(DiagnosticCode::InvariantNotBoolean).len(), 1);
    }

    #[test]
    fn test_loop_bounds() {
        let mut neuron = Neuron::new("n");
        neuron.state = parse_declarations("i integer = 0\nflag boolean = true").unwrap();
        neuron.update = Some(
            parse_block("for i in 0 ... 10 step 1:\n  flag = false\nend\nfor i in flag ... 3 step 1:\n  flag = true\nend")
                .unwrap(),
        );
        let (neuron, table) = typed(neuron);
        let report = check_loop_bounds_numeric(&neuron, &table);
        assert_eq!(report.with_code(DiagnosticCode::LoopBoundNotNumeric).len(), 1);
    }
}
