//! Context conditions: independent semantic checks over a scoped, typed
//! neuron.
//!
//! Every check is a plain function reading the neuron and its symbol table
//! and returning the diagnostics it found. Checks never mutate the tree and
//! never rely on each other; [`check_neuron`] runs the whole battery in
//! registry order.

mod conditions;
mod equations;
mod functions;
mod neurons;
mod variables;

pub use conditions::{check_conditions_boolean, check_invariants_boolean, check_loop_bounds_numeric};
pub use equations::{check_function_alias_single_lhs, check_initial_values};
pub use functions::{
    check_convolve_correctly_built, check_function_calls_consistent, check_function_returns,
};
pub use neurons::check_neuron_names;
pub use variables::{check_all_variables_defined, check_buffer_not_assigned};

use crate::ir::analysis::scope::SymbolTable;
use crate::ir::ast::Neuron;
use crate::ir::diagnostics::DiagnosticReport;

/// Signature shared by all per-neuron checks.
pub type Coco = fn(&Neuron, &SymbolTable) -> DiagnosticReport;

/// The per-neuron battery, by name.
pub const NEURON_COCOS: &[(&str, Coco)] = &[
    ("all_variables_defined", check_all_variables_defined),
    ("buffer_not_assigned", check_buffer_not_assigned),
    ("convolve_correctly_built", check_convolve_correctly_built),
    ("function_calls_consistent", check_function_calls_consistent),
    ("function_returns", check_function_returns),
    ("conditions_boolean", check_conditions_boolean),
    ("invariants_boolean", check_invariants_boolean),
    ("loop_bounds_numeric", check_loop_bounds_numeric),
    ("function_alias_single_lhs", check_function_alias_single_lhs),
    ("initial_values", check_initial_values),
];

/// Run every per-neuron check.
pub fn check_neuron(neuron: &Neuron, table: &SymbolTable) -> DiagnosticReport {
    let mut report = DiagnosticReport::new();
    for (name, coco) in NEURON_COCOS {
        let found = coco(neuron, table);
        if found.has_issues() {
            log::debug!("{}: {} reported {} diagnostics", neuron.name, name, found.len());
        }
        report.merge(found);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::predefined::PredefinedContext;
    use crate::ir::analysis::symbol_table::build_symbol_table;
    use crate::ir::analysis::type_checker::check_neuron_types;
    use crate::ir::diagnostics::{DiagnosticCode, Severity};
    use crate::ir::parse::{parse_block, parse_declarations, parse_equations, parse_input_lines};

    fn checked(mut neuron: Neuron) -> DiagnosticReport {
        let ctx = PredefinedContext::shared();
        let (table, _) = build_symbol_table(&mut neuron, &ctx);
        check_neuron_types(&mut neuron, &table, &ctx);
        check_neuron(&neuron, &table)
    }

    #[test]
    fn test_clean_neuron_passes_every_check() {
        let mut neuron = Neuron::new("iaf_psc_alpha");
        neuron.parameters = parse_declarations("tau_m ms = 10 ms\ntau_syn ms = 2 ms\nC_m pF = 250 pF")
            .unwrap();
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
        neuron.update = Some(parse_block("integrate_odes()\nif V_m > 15 mV:\n  V_m = 0 mV\n  emit_spike()\nend").unwrap());

        let report = checked(neuron);
        assert!(!report.has_errors(), "{:?}", report);
    }

    #[test]
    fn test_buffer_assignment_yields_one_error() {
        let mut neuron = Neuron::new("n");
        neuron.input = parse_input_lines("spikes nS <- spike").unwrap();
        neuron.update = Some(parse_block("spikes = 1 nS").unwrap());

        let report = checked(neuron);
        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, DiagnosticCode::BufferAssigned);
        assert_eq!(errors[0].severity, Severity::Error);
    }
}
