//! Physical units.
//!
//! A unit is an exponent vector over the seven SI base dimensions plus a
//! magnitude scale relative to the coherent SI unit. `mV` is the volt
//! dimension with scale `1e-3`. Two units with equal dimension and
//! different scale can be converted by a constant factor.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ir::ast::UnitExpr;

const SCALE_TOLERANCE: f64 = 1e-9;

/// Exponents over (length, mass, time, current, temperature, amount,
/// luminous intensity).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension(pub [i8; 7]);

impl Dimension {
    pub const DIMENSIONLESS: Dimension = Dimension([0; 7]);

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::DIMENSIONLESS
    }

    fn combine(&self, other: &Dimension, sign: i8) -> Dimension {
        let mut out = [0i8; 7];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.0[i] + sign * other.0[i];
        }
        Dimension(out)
    }

    fn scaled(&self, exponent: i32) -> Dimension {
        let mut out = [0i8; 7];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (self.0[i] as i32 * exponent) as i8;
        }
        Dimension(out)
    }
}

/// A concrete unit, e.g. `mV`, `nS` or `pA/ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitType {
    pub name: String,
    pub dimension: Dimension,
    pub scale: f64,
}

impl PartialEq for UnitType {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension && scales_equal(self.scale, other.scale)
    }
}

fn scales_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCALE_TOLERANCE * a.abs().max(b.abs())
}

impl UnitType {
    pub fn new(name: impl Into<String>, dimension: Dimension, scale: f64) -> Self {
        Self {
            name: name.into(),
            dimension,
            scale,
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dimension.is_dimensionless()
    }

    /// Same physical dimension, regardless of magnitude.
    pub fn same_dimension(&self, other: &UnitType) -> bool {
        self.dimension == other.dimension
    }

    /// Same dimension but different magnitude, so a value can be converted
    /// by a constant factor.
    pub fn differs_only_in_magnitude(&self, other: &UnitType) -> bool {
        self.same_dimension(other) && !scales_equal(self.scale, other.scale)
    }

    /// Factor that converts a value in `self` into `target`, e.g.
    /// `mV -> V` gives `0.001`.
    pub fn conversion_factor_to(&self, target: &UnitType) -> Option<f64> {
        if self.same_dimension(target) {
            Some(self.scale / target.scale)
        } else {
            None
        }
    }

    pub fn multiply(&self, other: &UnitType) -> UnitType {
        UnitType::new(
            format!("{}*{}", self.name, other.name),
            self.dimension.combine(&other.dimension, 1),
            self.scale * other.scale,
        )
    }

    pub fn divide(&self, other: &UnitType) -> UnitType {
        let name = if self.name == "1" {
            format!("1/{}", wrap_compound(&other.name))
        } else {
            format!("{}/{}", self.name, wrap_compound(&other.name))
        };
        UnitType::new(
            name,
            self.dimension.combine(&other.dimension, -1),
            self.scale / other.scale,
        )
    }

    pub fn inverse(&self) -> UnitType {
        UnitType::new(
            format!("1/{}", wrap_compound(&self.name)),
            Dimension::DIMENSIONLESS.combine(&self.dimension, -1),
            1.0 / self.scale,
        )
    }

    pub fn powi(&self, exponent: i32) -> UnitType {
        UnitType::new(
            format!("{}**{}", wrap_compound(&self.name), exponent),
            self.dimension.scaled(exponent),
            self.scale.powi(exponent),
        )
    }
}

fn wrap_compound(name: &str) -> String {
    if name.contains(['*', '/']) {
        format!("({})", name)
    } else {
        name.to_string()
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

// =============================================================================
// Registry
// =============================================================================

const L: usize = 0;
const M: usize = 1;
const T: usize = 2;
const I: usize = 3;
const TH: usize = 4;
const N: usize = 5;
const J: usize = 6;

fn dim(entries: &[(usize, i8)]) -> Dimension {
    let mut out = [0i8; 7];
    for (index, exponent) in entries {
        out[*index] = *exponent;
    }
    Dimension(out)
}

/// SI prefixes accepted in front of any registered unit symbol.
pub const PREFIXES: &[(&str, f64)] = &[
    ("p", 1e-12),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("c", 1e-2),
    ("d", 1e-1),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
];

/// Known unit symbols and prefix resolution.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: IndexMap<String, UnitType>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::si()
    }
}

impl UnitRegistry {
    /// Registry with the SI base units and the usual derived units.
    pub fn si() -> Self {
        let table: Vec<(&str, Dimension, f64)> = vec![
            ("m", dim(&[(L, 1)]), 1.0),
            ("g", dim(&[(M, 1)]), 1e-3),
            ("s", dim(&[(T, 1)]), 1.0),
            ("A", dim(&[(I, 1)]), 1.0),
            ("K", dim(&[(TH, 1)]), 1.0),
            ("mol", dim(&[(N, 1)]), 1.0),
            ("cd", dim(&[(J, 1)]), 1.0),
            ("Hz", dim(&[(T, -1)]), 1.0),
            ("N", dim(&[(M, 1), (L, 1), (T, -2)]), 1.0),
            ("J", dim(&[(M, 1), (L, 2), (T, -2)]), 1.0),
            ("W", dim(&[(M, 1), (L, 2), (T, -3)]), 1.0),
            ("C", dim(&[(T, 1), (I, 1)]), 1.0),
            ("V", dim(&[(M, 1), (L, 2), (T, -3), (I, -1)]), 1.0),
            ("F", dim(&[(M, -1), (L, -2), (T, 4), (I, 2)]), 1.0),
            ("Ohm", dim(&[(M, 1), (L, 2), (T, -3), (I, -2)]), 1.0),
            ("S", dim(&[(M, -1), (L, -2), (T, 3), (I, 2)]), 1.0),
            ("H", dim(&[(M, 1), (L, 2), (T, -2), (I, -2)]), 1.0),
        ];
        let units = table
            .into_iter()
            .map(|(name, dimension, scale)| (name.to_string(), UnitType::new(name, dimension, scale)))
            .collect();
        Self { units }
    }

    /// Resolve a unit symbol, trying an exact match before prefixes.
    pub fn lookup(&self, name: &str) -> Option<UnitType> {
        if let Some(unit) = self.units.get(name) {
            return Some(unit.clone());
        }
        for (prefix, factor) in PREFIXES {
            if let Some(rest) = name.strip_prefix(prefix) {
                if let Some(base) = self.units.get(rest) {
                    return Some(UnitType::new(name, base.dimension, base.scale * factor));
                }
            }
        }
        None
    }

    pub fn is_unit(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Evaluate a unit expression from a data type. Returns the name of the
    /// first unknown unit symbol on failure.
    pub fn resolve(&self, expr: &UnitExpr) -> Result<UnitType, String> {
        match expr {
            UnitExpr::Name(name) => self.lookup(name).ok_or_else(|| name.clone()),
            UnitExpr::One => Ok(UnitType::new("1", Dimension::DIMENSIONLESS, 1.0)),
            UnitExpr::Mul(lhs, rhs) => Ok(self.resolve(lhs)?.multiply(&self.resolve(rhs)?)),
            UnitExpr::Div(lhs, rhs) => Ok(self.resolve(lhs)?.divide(&self.resolve(rhs)?)),
            UnitExpr::Pow(base, exponent) => Ok(self.resolve(base)?.powi(*exponent)),
            UnitExpr::Paren(inner) => self.resolve(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_lookup() {
        let registry = UnitRegistry::si();
        let mv = registry.lookup("mV").unwrap();
        let v = registry.lookup("V").unwrap();
        assert!(mv.same_dimension(&v));
        assert!((mv.scale - 1e-3).abs() < 1e-15);

        // exact symbols win over prefix splitting
        let mol = registry.lookup("mol").unwrap();
        assert_eq!(mol.dimension, dim(&[(N, 1)]));
        let kg = registry.lookup("kg").unwrap();
        assert!((kg.scale - 1.0).abs() < 1e-12);

        assert!(registry.lookup("furlong").is_none());
    }

    #[test]
    fn test_conversion_factor_millivolt_to_volt() {
        let registry = UnitRegistry::si();
        let mv = registry.lookup("mV").unwrap();
        let v = registry.lookup("V").unwrap();
        assert!(mv.differs_only_in_magnitude(&v));
        let factor = mv.conversion_factor_to(&v).unwrap();
        assert!((factor - 0.001).abs() < 1e-12);

        let ms = registry.lookup("ms").unwrap();
        assert!(mv.conversion_factor_to(&ms).is_none());
    }

    #[test]
    fn test_derived_units() {
        let registry = UnitRegistry::si();
        // nS * mV is a current in pA
        let ns = registry.lookup("nS").unwrap();
        let mv = registry.lookup("mV").unwrap();
        let pa = registry.lookup("pA").unwrap();
        assert_eq!(ns.multiply(&mv), pa);

        // pA / pF is a voltage rate
        let pf = registry.lookup("pF").unwrap();
        let ms = registry.lookup("ms").unwrap();
        let rate = pa.divide(&pf);
        assert_eq!(rate, mv.divide(&ms));
    }

    #[test]
    fn test_resolve_unit_expression() {
        let registry = UnitRegistry::si();
        let expr = UnitExpr::Div(
            Box::new(UnitExpr::One),
            Box::new(UnitExpr::Name("ms".to_string())),
        );
        let per_ms = registry.resolve(&expr).unwrap();
        assert_eq!(per_ms.name, "1/ms");
        assert_eq!(per_ms, registry.lookup("kHz").unwrap());

        let bad = UnitExpr::Name("parsec".to_string());
        assert_eq!(registry.resolve(&bad).unwrap_err(), "parsec");
    }
}
