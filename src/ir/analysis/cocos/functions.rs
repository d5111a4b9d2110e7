//! Function calls, convolution combinators and user function returns.

use crate::ir::analysis::predefined::is_convolution_function;
use crate::ir::analysis::scope::SymbolTable;
use crate::ir::analysis::symbols::{Symbol, SymbolKind};
use crate::ir::analysis::type_checker::casts::{cast_diagnostic, classify_cast, CastOutcome};
use crate::ir::analysis::type_symbol::TypeSymbol;
use crate::ir::ast::{Expression, FunctionCall, Neuron, SourcePosition, Statement};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};
use crate::ir::visitor::{Visitable, Visitor};

// =============================================================================
// Function calls
// =============================================================================

/// Calls must match the arity of the callee, and every argument must be
/// storable into the corresponding parameter type.
///
/// Undeclared callees are reported by the typing pass and skipped here, as
/// are the convolution combinators which have their own check.
pub fn check_function_calls_consistent(neuron: &Neuron, table: &SymbolTable) -> DiagnosticReport {
    let mut checker = CallsConsistent {
        table,
        report: DiagnosticReport::new(),
    };
    neuron.accept(&mut checker);
    checker.report
}

struct CallsConsistent<'a> {
    table: &'a SymbolTable,
    report: DiagnosticReport,
}

impl Visitor for CallsConsistent<'_> {
    fn enter_function_call(&mut self, node: &FunctionCall) {
        if is_convolution_function(&node.name) {
            return;
        }
        let Some(signature) = self
            .table
            .resolve(self.table.global(), &node.name, SymbolKind::Function)
            .and_then(|symbol| symbol.signature.as_ref())
        else {
            return;
        };
        if signature.parameters.len() != node.args.len() {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::WrongNumberOfArgs,
                    format!(
                        "'{}' expects {} arguments, got {}",
                        node.name,
                        signature.parameters.len(),
                        node.args.len()
                    ),
                )
                .at(node.position),
            );
            return;
        }
        for (index, (arg, expected)) in node.args.iter().zip(&signature.parameters).enumerate() {
            let actual = match &arg.ty {
                Some(ty) if !ty.is_error() => ty,
                _ => continue,
            };
            let outcome = classify_cast(expected, actual);
            let context = format!("argument {} of '{}'", index + 1, node.name);
            if let Some(diagnostic) = cast_diagnostic(&outcome, expected, actual, &context) {
                self.report.add(diagnostic.at(arg.position));
            }
        }
    }
}

// =============================================================================
// Convolutions
// =============================================================================

/// `convolve`, `cond_sum` and `curr_sum` take a shape (or an initial value
/// bound to a differential shape) and a spike buffer.
pub fn check_convolve_correctly_built(neuron: &Neuron, table: &SymbolTable) -> DiagnosticReport {
    let mut checker = ConvolveBuilt {
        table,
        report: DiagnosticReport::new(),
    };
    neuron.accept(&mut checker);
    checker.report
}

struct ConvolveBuilt<'a> {
    table: &'a SymbolTable,
    report: DiagnosticReport,
}

impl ConvolveBuilt<'_> {
    fn resolve_arg(&self, arg: &Expression) -> Option<&Symbol> {
        let var = arg.as_variable()?;
        let scope = var.scope.or(arg.scope).unwrap_or_else(|| self.table.global());
        self.table
            .resolve(scope, &var.complete_name(), SymbolKind::Variable)
    }
}

impl Visitor for ConvolveBuilt<'_> {
    fn enter_function_call(&mut self, node: &FunctionCall) {
        if !is_convolution_function(&node.name) {
            return;
        }
        let [shape, buffer] = node.args.as_slice() else {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::WrongNumberOfArgs,
                    format!("'{}' expects 2 arguments, got {}", node.name, node.args.len()),
                )
                .at(node.position),
            );
            return;
        };
        if let Some(symbol) = self.resolve_arg(shape) {
            if !symbol.is_shape() && !symbol.is_initial_value() {
                self.report.add(
                    Diagnostic::error(
                        DiagnosticCode::ConvolveFirstArgNotShape,
                        format!(
                            "First argument of '{}' must be a shape or an initial value, got '{}'",
                            node.name, symbol.name
                        ),
                    )
                    .at(node.position),
                );
            }
        }
        if let Some(symbol) = self.resolve_arg(buffer) {
            if !symbol.is_spike_buffer() {
                self.report.add(
                    Diagnostic::error(
                        DiagnosticCode::ConvolveSecondArgNotSpikeBuffer,
                        format!(
                            "Second argument of '{}' must be a spike buffer, got '{}'",
                            node.name, symbol.name
                        ),
                    )
                    .at(node.position),
                );
            }
        }
    }
}

// =============================================================================
// Returns
// =============================================================================

/// A function declaring a return type must return a value castable to it;
/// a function without one must not return a value.
pub fn check_function_returns(neuron: &Neuron, table: &SymbolTable) -> DiagnosticReport {
    let mut report = DiagnosticReport::new();
    for function in &neuron.functions {
        let return_type = table
            .resolve(table.global(), &function.name, SymbolKind::Function)
            .map(|symbol| symbol.type_symbol.clone())
            .unwrap_or(TypeSymbol::Error);
        let mut returns = Returns::default();
        function.body.accept(&mut returns);

        let is_void = return_type == TypeSymbol::Void;
        if !is_void && !return_type.is_error() && returns.values.is_empty() {
            report.add(
                Diagnostic::error(
                    DiagnosticCode::MissingReturnValue,
                    format!("Function '{}' does not return a value", function.name),
                )
                .at(function.position),
            );
        }
        for (value, position) in returns.values {
            if is_void {
                report.add(
                    Diagnostic::error(
                        DiagnosticCode::ReturnTypeMismatch,
                        format!("Function '{}' returns a value but is void", function.name),
                    )
                    .at(position),
                );
                continue;
            }
            let Some(ty) = value else { continue };
            let outcome = classify_cast(&return_type, &ty);
            let context = format!("return value of '{}'", function.name);
            let diagnostic = match outcome {
                CastOutcome::Incompatible => Diagnostic::error(
                    DiagnosticCode::ReturnTypeMismatch,
                    format!("{}: type {} is not compatible with {}", context, ty, return_type),
                ),
                _ => match cast_diagnostic(&outcome, &return_type, &ty, &context) {
                    Some(diagnostic) => diagnostic,
                    None => continue,
                },
            };
            report.add(diagnostic.at(position));
        }
    }
    report
}

/// Collects the typed values of every `return` holding one.
#[derive(Default)]
struct Returns {
    values: Vec<(Option<TypeSymbol>, SourcePosition)>,
}

impl Visitor for Returns {
    fn enter_statement(&mut self, node: &Statement) {
        if let Statement::Return {
            value: Some(value), ..
        } = node
        {
            self.values.push((value.ty.clone(), value.position));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::predefined::PredefinedContext;
    use crate::ir::analysis::symbol_table::build_symbol_table;
    use crate::ir::analysis::type_checker::check_neuron_types;
    use crate::ir::ast::{FunctionDef, Parameter};
    use crate::ir::diagnostics::Severity;
    use crate::ir::parse::{
        parse_block, parse_data_type, parse_declarations, parse_equations, parse_input_lines,
    };

    fn typed(mut neuron: Neuron) -> (Neuron, SymbolTable) {
        let ctx = PredefinedContext::shared();
        let (table, _) = build_symbol_table(&mut neuron, &ctx);
        check_neuron_types(&mut neuron, &table, &ctx);
        (neuron, table)
    }

    fn function(name: &str, params: &[(&str, &str)], ret: Option<&str>, body: &str) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            parameters: params
                .iter()
                .map(|(name, ty)| Parameter {
                    name: name.to_string(),
                    data_type: parse_data_type(ty).unwrap(),
                    position: SourcePosition::added(),
                })
                .collect(),
            return_type: ret.map(|ty| parse_data_type(ty).unwrap()),
            body: parse_block(body).unwrap(),
            position: SourcePosition::new(1, 0, 1, 10),
        }
    }

    #[test]
    fn test_arity_and_argument_casts() {
        let mut neuron = Neuron::new("n");
        neuron.state = parse_declarations("V_m mV = 0 mV\nok boolean = true").unwrap();
        neuron.update = Some(
            parse_block("x real = exp(V_m)\ny real = max(1.0)\nz real = pow(ok, \"s\")").unwrap(),
        );
        let (neuron, table) = typed(neuron);
        let report = check_function_calls_consistent(&neuron, &table);

        assert_eq!(report.with_code(DiagnosticCode::WrongNumberOfArgs).len(), 1);
        // mV into real and boolean into real are castable, string is not
        let casts = report.with_code(DiagnosticCode::ImplicitCast);
        assert_eq!(casts.len(), 2);
        assert!(casts.iter().all(|d| d.severity == Severity::Warning));
        let errors = report.with_code(DiagnosticCode::IncompatibleTypes);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_convolve_arguments() {
        let mut neuron = Neuron::new("n");
        neuron.parameters = parse_declarations("tau ms = 2 ms").unwrap();
        neuron.state = parse_declarations("plain nS = 0 nS").unwrap();
        neuron.equations = Some(
            parse_equations(
                "shape g = exp(-t / tau)\n\
                 function ok pA = convolve(g, spikes)\n\
                 function bad pA = convolve(plain, currents)",
            )
            .unwrap(),
        );
        neuron.input = parse_input_lines("spikes pA <- spike\ncurrents pA <- current").unwrap();
        let (neuron, table) = typed(neuron);
        let report = check_convolve_correctly_built(&neuron, &table);

        assert_eq!(report.with_code(DiagnosticCode::ConvolveFirstArgNotShape).len(), 1);
        assert_eq!(report.with_code(DiagnosticCode::ConvolveSecondArgNotSpikeBuffer).len(), 1);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_function_returns() {
        let mut neuron = Neuron::new("n");
        neuron.functions = vec![
            function("good", &[("x", "mV")], Some("mV"), "return x * 2"),
            function("missing", &[], Some("real"), "y real = 1"),
            function("wrong", &[], Some("mV"), "return true"),
            function("void_value", &[], None, "return 1"),
            function("unit_to_real", &[("x", "mV")], Some("real"), "return x"),
        ];
        let (neuron, table) = typed(neuron);
        let report = check_function_returns(&neuron, &table);

        assert_eq!(report.with_code(DiagnosticCode::MissingReturnValue).len(), 1);
        assert_eq!(report.with_code(DiagnosticCode::ReturnTypeMismatch).len(), 2);
        assert_eq!(report.with_code(DiagnosticCode::ImplicitCast).len(), 1);
        assert_eq!(report.len(), 4);
    }
}
