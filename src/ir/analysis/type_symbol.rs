//! Type symbols and the operator algebra over them.
//!
//! Every operator rule is a free function returning the resulting type and,
//! when the combination is questionable or illegal, a diagnostic without a
//! position. Callers attach the position of the offending node.
//!
//! `TypeSymbol::Error` absorbs: any rule receiving it returns `Error` and
//! no diagnostic, since the root cause has already been reported.

use serde::{Deserialize, Serialize};

use crate::ir::analysis::units::UnitType;
use crate::ir::ast::BinaryOp;
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeSymbol {
    Integer,
    Real,
    Boolean,
    String,
    Void,
    Unit(UnitType),
    Error,
}

/// Result of applying a type rule.
pub type TypeOutcome = (TypeSymbol, Option<Diagnostic>);

impl TypeSymbol {
    pub fn is_error(&self) -> bool {
        matches!(self, TypeSymbol::Error)
    }

    pub fn is_numeric_primitive(&self) -> bool {
        matches!(self, TypeSymbol::Integer | TypeSymbol::Real)
    }

    /// Integer, real or a unit type.
    pub fn is_numeric(&self) -> bool {
        self.is_numeric_primitive() || self.is_unit()
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, TypeSymbol::Unit(_))
    }

    pub fn as_unit(&self) -> Option<&UnitType> {
        match self {
            TypeSymbol::Unit(unit) => Some(unit),
            _ => None,
        }
    }

    /// Collapse a dimensionless, unscaled unit into `Real`.
    pub fn normalized(self) -> TypeSymbol {
        match self {
            TypeSymbol::Unit(unit) if unit.is_dimensionless() && (unit.scale - 1.0).abs() < 1e-12 => {
                TypeSymbol::Real
            }
            other => other,
        }
    }

    /// Whether both are units of the same dimension with different
    /// magnitude.
    pub fn differs_only_in_magnitude(&self, other: &TypeSymbol) -> bool {
        match (self, other) {
            (TypeSymbol::Unit(a), TypeSymbol::Unit(b)) => a.differs_only_in_magnitude(b),
            _ => false,
        }
    }

    /// Whether a value of this type may be implicitly cast to `target`:
    /// unit to real, boolean to real and back, integer to real and back.
    pub fn is_castable_to(&self, target: &TypeSymbol) -> bool {
        matches!(
            (self, target),
            (TypeSymbol::Unit(_), TypeSymbol::Real)
                | (TypeSymbol::Boolean, TypeSymbol::Real)
                | (TypeSymbol::Real, TypeSymbol::Boolean)
                | (TypeSymbol::Integer, TypeSymbol::Real)
                | (TypeSymbol::Real, TypeSymbol::Integer)
        )
    }
}

impl std::fmt::Display for TypeSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeSymbol::Integer => write!(f, "integer"),
            TypeSymbol::Real => write!(f, "real"),
            TypeSymbol::Boolean => write!(f, "boolean"),
            TypeSymbol::String => write!(f, "string"),
            TypeSymbol::Void => write!(f, "void"),
            TypeSymbol::Unit(unit) => write!(f, "{}", unit),
            TypeSymbol::Error => write!(f, "<error>"),
        }
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Ge => ">=",
        BinaryOp::Gt => ">",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::ShiftLeft => "<<",
        BinaryOp::ShiftRight => ">>",
    }
}

fn hard_error(code: DiagnosticCode, message: String) -> TypeOutcome {
    (TypeSymbol::Error, Some(Diagnostic::error(code, message)))
}

fn numeric_promotion(lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeSymbol {
    if *lhs == TypeSymbol::Integer && *rhs == TypeSymbol::Integer {
        TypeSymbol::Integer
    } else {
        TypeSymbol::Real
    }
}

// =============================================================================
// Additive
// =============================================================================

/// `lhs + rhs`, including string concatenation.
pub fn add(lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    if lhs.is_error() || rhs.is_error() {
        return (TypeSymbol::Error, None);
    }
    let has_string = *lhs == TypeSymbol::String || *rhs == TypeSymbol::String;
    let has_void = *lhs == TypeSymbol::Void || *rhs == TypeSymbol::Void;
    if has_string && !has_void {
        return (TypeSymbol::String, None);
    }
    additive(BinaryOp::Add, lhs, rhs)
}

/// `lhs - rhs`
pub fn sub(lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    if lhs.is_error() || rhs.is_error() {
        return (TypeSymbol::Error, None);
    }
    additive(BinaryOp::Sub, lhs, rhs)
}

fn additive(op: BinaryOp, lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return hard_error(
            DiagnosticCode::AddSubTypeMismatch,
            format!(
                "Operands of '{}' must be numeric, got {} and {}",
                op_symbol(op),
                lhs,
                rhs
            ),
        );
    }
    if lhs == rhs {
        return (lhs.clone(), None);
    }
    match (lhs, rhs) {
        (TypeSymbol::Unit(a), TypeSymbol::Unit(b)) if a.same_dimension(b) => (
            TypeSymbol::Real,
            Some(Diagnostic::warning(
                DiagnosticCode::AddSubTypeMismatch,
                format!(
                    "Adding/subtracting {} and {} differing in magnitude, result is real",
                    a, b
                ),
            )),
        ),
        (TypeSymbol::Unit(a), TypeSymbol::Unit(b)) => hard_error(
            DiagnosticCode::AddSubTypeMismatch,
            format!("Cannot add/subtract incompatible units {} and {}", a, b),
        ),
        (TypeSymbol::Unit(unit), other) | (other, TypeSymbol::Unit(unit)) => (
            TypeSymbol::Unit(unit.clone()),
            Some(Diagnostic::warning(
                DiagnosticCode::AddSubTypeMismatch,
                format!(
                    "Adding/subtracting unit {} and {}, the unit is kept",
                    unit, other
                ),
            )),
        ),
        _ => (numeric_promotion(lhs, rhs), None),
    }
}

// =============================================================================
// Multiplicative and power
// =============================================================================

/// `lhs * rhs`
pub fn mul(lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    if lhs.is_error() || rhs.is_error() {
        return (TypeSymbol::Error, None);
    }
    match (lhs, rhs) {
        (TypeSymbol::Unit(a), TypeSymbol::Unit(b)) => {
            (TypeSymbol::Unit(a.multiply(b)).normalized(), None)
        }
        (TypeSymbol::Unit(unit), other) | (other, TypeSymbol::Unit(unit))
            if other.is_numeric_primitive() =>
        {
            (TypeSymbol::Unit(unit.clone()), None)
        }
        _ if lhs.is_numeric_primitive() && rhs.is_numeric_primitive() => {
            (numeric_promotion(lhs, rhs), None)
        }
        _ => operator_mismatch(BinaryOp::Mul, lhs, rhs),
    }
}

/// `lhs / rhs`
pub fn div(lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    if lhs.is_error() || rhs.is_error() {
        return (TypeSymbol::Error, None);
    }
    match (lhs, rhs) {
        (TypeSymbol::Unit(a), TypeSymbol::Unit(b)) => {
            (TypeSymbol::Unit(a.divide(b)).normalized(), None)
        }
        (TypeSymbol::Unit(unit), other) if other.is_numeric_primitive() => {
            (TypeSymbol::Unit(unit.clone()), None)
        }
        (other, TypeSymbol::Unit(unit)) if other.is_numeric_primitive() => {
            (TypeSymbol::Unit(unit.inverse()), None)
        }
        _ if lhs.is_numeric_primitive() && rhs.is_numeric_primitive() => {
            (numeric_promotion(lhs, rhs), None)
        }
        _ => operator_mismatch(BinaryOp::Div, lhs, rhs),
    }
}

/// `lhs % rhs`
pub fn modulo(lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    if lhs.is_error() || rhs.is_error() {
        return (TypeSymbol::Error, None);
    }
    if lhs.is_numeric_primitive() && rhs.is_numeric_primitive() {
        return (numeric_promotion(lhs, rhs), None);
    }
    if lhs.is_unit() && lhs == rhs {
        return (lhs.clone(), None);
    }
    operator_mismatch(BinaryOp::Mod, lhs, rhs)
}

/// `base ** exponent`. A unit base needs an integer literal exponent,
/// passed in `literal_exponent`.
pub fn pow(base: &TypeSymbol, exponent: &TypeSymbol, literal_exponent: Option<i64>) -> TypeOutcome {
    if base.is_error() || exponent.is_error() {
        return (TypeSymbol::Error, None);
    }
    if !exponent.is_numeric_primitive() {
        return operator_mismatch(BinaryOp::Pow, base, exponent);
    }
    match base {
        TypeSymbol::Integer if *exponent == TypeSymbol::Integer => (TypeSymbol::Integer, None),
        TypeSymbol::Integer | TypeSymbol::Real => (TypeSymbol::Real, None),
        TypeSymbol::Unit(unit) => match literal_exponent.and_then(|e| i32::try_from(e).ok()) {
            Some(e) => (TypeSymbol::Unit(unit.powi(e)).normalized(), None),
            None => hard_error(
                DiagnosticCode::OperatorTypeMismatch,
                format!(
                    "The exponent of unit {} must be an integer literal",
                    unit
                ),
            ),
        },
        _ => operator_mismatch(BinaryOp::Pow, base, exponent),
    }
}

fn operator_mismatch(op: BinaryOp, lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    hard_error(
        DiagnosticCode::OperatorTypeMismatch,
        format!(
            "Operator '{}' is not defined for {} and {}",
            op_symbol(op),
            lhs,
            rhs
        ),
    )
}

// =============================================================================
// Unary
// =============================================================================

/// Unary `-` and `+`
pub fn neg(operand: &TypeSymbol) -> TypeOutcome {
    if operand.is_error() {
        return (TypeSymbol::Error, None);
    }
    if operand.is_numeric() {
        (operand.clone(), None)
    } else {
        hard_error(
            DiagnosticCode::OperatorTypeMismatch,
            format!("Cannot negate a value of type {}", operand),
        )
    }
}

/// `not operand`
pub fn not(operand: &TypeSymbol) -> TypeOutcome {
    if operand.is_error() {
        return (TypeSymbol::Error, None);
    }
    if *operand == TypeSymbol::Boolean {
        (TypeSymbol::Boolean, None)
    } else {
        hard_error(
            DiagnosticCode::LogicalOperandNotBoolean,
            format!("Operand of 'not' must be boolean, got {}", operand),
        )
    }
}

/// `~operand` and binary bit operators, which have no semantics yet.
pub fn bitwise(operand: &TypeSymbol) -> TypeOutcome {
    if operand.is_error() {
        return (TypeSymbol::Error, None);
    }
    (
        TypeSymbol::Error,
        Some(Diagnostic::warning(
            DiagnosticCode::NoSemantics,
            "Bit operators are not supported, the expression is left untyped",
        )),
    )
}

// =============================================================================
// Comparison and logic
// =============================================================================

/// Relational and equality operators.
pub fn compare(op: BinaryOp, lhs: &TypeSymbol, rhs: &TypeSymbol) -> TypeOutcome {
    if lhs.is_error() || rhs.is_error() {
        return (TypeSymbol::Error, None);
    }
    let both_numeric = lhs.is_numeric_primitive() && rhs.is_numeric_primitive();
    let both_boolean = *lhs == TypeSymbol::Boolean && *rhs == TypeSymbol::Boolean;
    let same_numeric = lhs.is_numeric() && lhs == rhs;
    if both_numeric || both_boolean || same_numeric {
        return (TypeSymbol::Boolean, None);
    }
    if lhs.is_numeric() && rhs.is_numeric() {
        return (
            TypeSymbol::Boolean,
            Some(Diagnostic::warning(
                DiagnosticCode::SoftIncompatibility,
                format!(
                    "Comparing {} and {} with '{}'",
                    lhs,
                    rhs,
                    op_symbol(op)
                ),
            )),
        );
    }
    hard_error(
        DiagnosticCode::HardIncompatibility,
        format!(
            "Cannot compare {} and {} with '{}'",
            lhs,
            rhs,
            op_symbol(op)
        ),
    )
}

/// Which operand of a logical operator is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Lhs,
    Rhs,
}

/// `and` / `or`. On failure also names the offending operand so the caller
/// can point the diagnostic at it.
pub fn logical(
    op: BinaryOp,
    lhs: &TypeSymbol,
    rhs: &TypeSymbol,
) -> (TypeSymbol, Option<(Operand, Diagnostic)>) {
    if lhs.is_error() || rhs.is_error() {
        return (TypeSymbol::Error, None);
    }
    let (operand, found) = if *lhs != TypeSymbol::Boolean {
        (Operand::Lhs, lhs)
    } else if *rhs != TypeSymbol::Boolean {
        (Operand::Rhs, rhs)
    } else {
        return (TypeSymbol::Boolean, None);
    };
    let diagnostic = Diagnostic::error(
        DiagnosticCode::LogicalOperandNotBoolean,
        format!(
            "Operands of '{}' must be boolean, got {}",
            op_symbol(op),
            found
        ),
    );
    (TypeSymbol::Error, Some((operand, diagnostic)))
}

/// `condition ? if_true : if_false`, typed on the branches.
pub fn ternary(condition: &TypeSymbol, if_true: &TypeSymbol, if_false: &TypeSymbol) -> TypeOutcome {
    if condition.is_error() || if_true.is_error() || if_false.is_error() {
        return (TypeSymbol::Error, None);
    }
    if *condition != TypeSymbol::Boolean {
        return hard_error(
            DiagnosticCode::ConditionNotBoolean,
            format!("Ternary condition must be boolean, got {}", condition),
        );
    }
    if if_true == if_false {
        return (if_true.clone(), None);
    }
    match (if_true, if_false) {
        (TypeSymbol::Unit(unit), other) | (other, TypeSymbol::Unit(unit))
            if other.is_numeric_primitive() =>
        {
            (
                TypeSymbol::Unit(unit.clone()),
                Some(Diagnostic::warning(
                    DiagnosticCode::SoftIncompatibility,
                    format!("Ternary branches mix {} and {}", unit, other),
                )),
            )
        }
        _ if if_true.is_numeric_primitive() && if_false.is_numeric_primitive() => {
            (TypeSymbol::Real, None)
        }
        _ => hard_error(
            DiagnosticCode::IncompatibleTypes,
            format!(
                "Ternary branches have incompatible types {} and {}",
                if_true, if_false
            ),
        ),
    }
}

/// Dispatch a binary operator on operand types.
pub fn binary(
    op: BinaryOp,
    lhs: &TypeSymbol,
    rhs: &TypeSymbol,
    literal_rhs: Option<i64>,
) -> TypeOutcome {
    match op {
        BinaryOp::Add => add(lhs, rhs),
        BinaryOp::Sub => sub(lhs, rhs),
        BinaryOp::Mul => mul(lhs, rhs),
        BinaryOp::Div => div(lhs, rhs),
        BinaryOp::Mod => modulo(lhs, rhs),
        BinaryOp::Pow => pow(lhs, rhs, literal_rhs),
        BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Ge
        | BinaryOp::Gt => compare(op, lhs, rhs),
        BinaryOp::And | BinaryOp::Or => {
            let (ty, issue) = logical(op, lhs, rhs);
            (ty, issue.map(|(_, diagnostic)| diagnostic))
        }
        BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::ShiftLeft
        | BinaryOp::ShiftRight => {
            if rhs.is_error() {
                (TypeSymbol::Error, None)
            } else {
                bitwise(lhs)
            }
        }
    }
}
