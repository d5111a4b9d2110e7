//! Implicit cast recovery between a declared (target) type and the type
//! of the value stored into it.

use crate::ir::analysis::type_symbol::TypeSymbol;
use crate::ir::ast::Expression;
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};

/// How a value type relates to the type it is stored into.
#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    /// Types agree, or one side is already an error
    Compatible,
    /// Same unit dimension, the value is scaled by the factor
    Magnitude(f64),
    /// Legal implicit cast (unit to real, boolean/real, integer/real)
    Castable,
    Incompatible,
}

/// Classify storing a `value` into a `target`.
pub fn classify_cast(target: &TypeSymbol, value: &TypeSymbol) -> CastOutcome {
    if target.is_error() || value.is_error() || target == value {
        return CastOutcome::Compatible;
    }
    if let (TypeSymbol::Unit(target_unit), TypeSymbol::Unit(value_unit)) = (target, value) {
        if let Some(factor) = value_unit.conversion_factor_to(target_unit) {
            return CastOutcome::Magnitude(factor);
        }
    }
    if value.is_castable_to(target) {
        CastOutcome::Castable
    } else {
        CastOutcome::Incompatible
    }
}

/// Diagnostic for a cast outcome, `None` when nothing needs reporting.
pub fn cast_diagnostic(
    outcome: &CastOutcome,
    target: &TypeSymbol,
    value: &TypeSymbol,
    context: &str,
) -> Option<Diagnostic> {
    match outcome {
        CastOutcome::Compatible => None,
        CastOutcome::Magnitude(factor) => Some(Diagnostic::warning(
            DiagnosticCode::ImplicitMagnitudeConversion,
            format!(
                "{}: converting {} to {} with factor {}",
                context, value, target, factor
            ),
        )),
        CastOutcome::Castable => Some(Diagnostic::warning(
            DiagnosticCode::ImplicitCast,
            format!("{}: implicit cast from {} to {}", context, value, target),
        )),
        CastOutcome::Incompatible => Some(Diagnostic::error(
            DiagnosticCode::IncompatibleTypes,
            format!(
                "{}: type {} is not compatible with {}",
                context, value, target
            ),
        )),
    }
}

/// Try to recover a mismatch between `target` and the type of `expr`,
/// recording the conversion factor on the expression and reporting at its
/// position.
pub fn recover_or_error(
    target: &TypeSymbol,
    expr: &mut Expression,
    context: &str,
    report: &mut DiagnosticReport,
) {
    let value = expr.ty.clone().unwrap_or(TypeSymbol::Error);
    recover_value(target, &value, expr, context, report);
}

/// As [`recover_or_error`] with the value type given explicitly, for
/// compound assignments where the stored value is `lhs op rhs`.
pub fn recover_value(
    target: &TypeSymbol,
    value: &TypeSymbol,
    expr: &mut Expression,
    context: &str,
    report: &mut DiagnosticReport,
) {
    let outcome = classify_cast(target, value);
    if let CastOutcome::Magnitude(factor) = outcome {
        expr.conversion_factor = Some(factor);
    }
    if let Some(diagnostic) = cast_diagnostic(&outcome, target, value, context) {
        report.add(diagnostic.at(expr.position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::units::UnitRegistry;
    use crate::ir::diagnostics::Severity;

    fn unit(name: &str) -> TypeSymbol {
        TypeSymbol::Unit(UnitRegistry::si().lookup(name).unwrap())
    }

    #[test]
    fn test_magnitude_conversion_factor() {
        match classify_cast(&unit("V"), &unit("mV")) {
            CastOutcome::Magnitude(factor) => assert!((factor - 0.001).abs() < 1e-15),
            other => panic!("expected magnitude conversion, got {:?}", other),
        }
        match classify_cast(&unit("mV"), &unit("V")) {
            CastOutcome::Magnitude(factor) => assert!((factor - 1000.0).abs() < 1e-9),
            other => panic!("expected magnitude conversion, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_classification() {
        assert_eq!(classify_cast(&unit("mV"), &unit("mV")), CastOutcome::Compatible);
        assert_eq!(classify_cast(&TypeSymbol::Real, &unit("mV")), CastOutcome::Castable);
        assert_eq!(classify_cast(&TypeSymbol::Real, &TypeSymbol::Integer), CastOutcome::Castable);
        assert_eq!(classify_cast(&unit("mV"), &TypeSymbol::Real), CastOutcome::Incompatible);
        assert_eq!(classify_cast(&unit("mV"), &unit("ms")), CastOutcome::Incompatible);
        assert_eq!(classify_cast(&unit("mV"), &TypeSymbol::Error), CastOutcome::Compatible);
    }

    #[test]
    fn test_recovery_records_factor_and_single_warning() {
        let mut expr = Expression::integer(1);
        expr.ty = Some(unit("mV"));
        let mut report = DiagnosticReport::new();
        recover_or_error(&unit("V"), &mut expr, "declaration of 'x'", &mut report);
        assert_eq!(report.len(), 1);
        assert_eq!(report.diagnostics[0].severity, Severity::Warning);
        assert_eq!(report.diagnostics[0].code, DiagnosticCode::ImplicitMagnitudeConversion);
        let factor = expr.conversion_factor.unwrap();
        assert!(factor > 0.0 && (factor - 0.001).abs() < 1e-15);
    }
}
