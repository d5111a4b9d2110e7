//! Checks spanning compilation units.

use indexmap::IndexMap;

use crate::ir::ast::{CompilationUnit, SourcePosition};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};

/// Neuron names are unique across every parsed unit. Each repeated
/// definition is reported once, attributed to the repeating neuron.
pub fn check_neuron_names(units: &[CompilationUnit]) -> DiagnosticReport {
    let mut report = DiagnosticReport::new();
    let mut seen: IndexMap<&str, (&str, SourcePosition)> = IndexMap::new();
    for unit in units {
        for neuron in &unit.neurons {
            match seen.get(neuron.name.as_str()) {
                Some((first_file, first_position)) => report.add(
                    Diagnostic::error(
                        DiagnosticCode::NeuronRedeclared,
                        format!(
                            "Neuron '{}' is already defined in {} at {}",
                            neuron.name, first_file, first_position
                        ),
                    )
                    .at(neuron.position)
                    .in_neuron(neuron.name.clone()),
                ),
                None => {
                    seen.insert(&neuron.name, (&unit.file_name, neuron.position));
                }
            }
        }
    }
    report
}
