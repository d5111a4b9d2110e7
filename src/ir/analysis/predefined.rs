//! Process-wide predefined types, units, variables and functions.
//!
//! The context is built once and shared by `Arc` between all neurons; it is
//! never mutated after construction.

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;

use crate::ir::analysis::symbols::FunctionSignature;
use crate::ir::analysis::type_symbol::TypeSymbol;
use crate::ir::analysis::units::UnitRegistry;
use crate::ir::ast::DataType;

pub const FN_CONVOLVE: &str = "convolve";
pub const FN_COND_SUM: &str = "cond_sum";
pub const FN_CURR_SUM: &str = "curr_sum";
pub const FN_INTEGRATE_ODES: &str = "integrate_odes";
pub const FN_RESOLUTION: &str = "resolution";
pub const FN_EMIT_SPIKE: &str = "emit_spike";

/// Combinators pairing a shape with a spike buffer.
pub const CONVOLUTION_FUNCTIONS: &[&str] = &[FN_CONVOLVE, FN_COND_SUM, FN_CURR_SUM];

pub fn is_convolution_function(name: &str) -> bool {
    CONVOLUTION_FUNCTIONS.contains(&name)
}

/// Primitive type names usable in declarations.
pub const PRIMITIVE_TYPES: &[&str] = &["integer", "real", "boolean", "string", "void"];

static SHARED: LazyLock<Arc<PredefinedContext>> =
    LazyLock::new(|| Arc::new(PredefinedContext::build()));

/// Immutable registry of everything a neuron can use without declaring it.
#[derive(Debug)]
pub struct PredefinedContext {
    pub units: UnitRegistry,
    pub variables: IndexMap<String, TypeSymbol>,
    pub functions: IndexMap<String, FunctionSignature>,
}

impl PredefinedContext {
    /// The process-wide instance.
    pub fn shared() -> Arc<PredefinedContext> {
        Arc::clone(&SHARED)
    }

    fn build() -> Self {
        let units = UnitRegistry::si();
        let ms = units
            .lookup("ms")
            .map(TypeSymbol::Unit)
            .unwrap_or(TypeSymbol::Real);

        let mut variables = IndexMap::new();
        variables.insert("e".to_string(), TypeSymbol::Real);
        variables.insert("t".to_string(), ms.clone());
        // also a literal token; registered so symbol lookups resolve it
        variables.insert("inf".to_string(), TypeSymbol::Real);

        let real = TypeSymbol::Real;
        let integer = TypeSymbol::Integer;
        let string = TypeSymbol::String;
        let void = TypeSymbol::Void;

        let signatures: Vec<(&str, Vec<TypeSymbol>, TypeSymbol)> = vec![
            ("exp", vec![real.clone()], real.clone()),
            ("expm1", vec![real.clone()], real.clone()),
            ("ln", vec![real.clone()], real.clone()),
            ("log10", vec![real.clone()], real.clone()),
            ("cosh", vec![real.clone()], real.clone()),
            ("sinh", vec![real.clone()], real.clone()),
            ("tanh", vec![real.clone()], real.clone()),
            ("abs", vec![real.clone()], real.clone()),
            ("pow", vec![real.clone(), real.clone()], real.clone()),
            ("max", vec![real.clone(), real.clone()], real.clone()),
            ("min", vec![real.clone(), real.clone()], real.clone()),
            ("bounded_max", vec![real.clone(), real.clone()], real.clone()),
            ("bounded_min", vec![real.clone(), real.clone()], real.clone()),
            ("clip", vec![real.clone(), real.clone(), real.clone()], real.clone()),
            ("delta", vec![real.clone(), real.clone()], real.clone()),
            ("random", vec![real.clone(), real.clone()], real.clone()),
            ("random_int", vec![integer.clone(), integer.clone()], integer.clone()),
            (FN_RESOLUTION, vec![], ms.clone()),
            ("steps", vec![ms], integer),
            (FN_EMIT_SPIKE, vec![], void.clone()),
            (FN_INTEGRATE_ODES, vec![], void.clone()),
            ("print", vec![string.clone()], void.clone()),
            ("println", vec![string.clone()], void.clone()),
            ("info", vec![string.clone()], void.clone()),
            ("warning", vec![string], void),
            (FN_CONVOLVE, vec![real.clone(), real.clone()], real.clone()),
            (FN_COND_SUM, vec![real.clone(), real.clone()], real.clone()),
            (FN_CURR_SUM, vec![real.clone(), real.clone()], real),
        ];
        let functions = signatures
            .into_iter()
            .map(|(name, parameters, return_type)| {
                (
                    name.to_string(),
                    FunctionSignature {
                        parameters,
                        return_type,
                    },
                )
            })
            .collect();

        Self {
            units,
            variables,
            functions,
        }
    }

    /// Resolve a declared data type. Returns the unknown unit symbol on
    /// failure.
    pub fn resolve_data_type(&self, data_type: &DataType) -> Result<TypeSymbol, String> {
        match data_type {
            DataType::Integer => Ok(TypeSymbol::Integer),
            DataType::Real => Ok(TypeSymbol::Real),
            DataType::Boolean => Ok(TypeSymbol::Boolean),
            DataType::String => Ok(TypeSymbol::String),
            DataType::Void => Ok(TypeSymbol::Void),
            DataType::Unit(expr) => self
                .units
                .resolve(expr)
                .map(|unit| TypeSymbol::Unit(unit).normalized()),
        }
    }

    /// Type of a bare unit symbol used in an expression, e.g. `1 / ms`.
    pub fn unit_type(&self, name: &str) -> Option<TypeSymbol> {
        self.units.lookup(name).map(TypeSymbol::Unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::UnitExpr;

    #[test]
    fn test_shared_instance_is_reused() {
        let a = PredefinedContext::shared();
        let b = PredefinedContext::shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.functions.contains_key("exp"));
        assert!(a.variables.contains_key("t"));
    }

    #[test]
    fn test_predefined_variables() {
        let ctx = PredefinedContext::shared();
        let names: Vec<&str> = ctx.variables.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["e", "t", "inf"]);
        assert_eq!(ctx.variables.get("inf"), Some(&TypeSymbol::Real));
        assert_eq!(ctx.variables.get("e"), Some(&TypeSymbol::Real));
        assert!(ctx.variables["t"].is_unit());
    }

    #[test]
    fn test_resolve_data_type() {
        let ctx = PredefinedContext::shared();
        assert_eq!(ctx.resolve_data_type(&DataType::Real), Ok(TypeSymbol::Real));
        let mv = ctx.resolve_data_type(&DataType::unit("mV")).unwrap();
        assert!(mv.is_unit());
        assert_eq!(
            ctx.resolve_data_type(&DataType::Unit(UnitExpr::Name("xyz".into()))),
            Err("xyz".to_string())
        );
        assert_eq!(
            ctx.resolve_data_type(&DataType::Unit(UnitExpr::Div(
                Box::new(UnitExpr::Name("mV".into())),
                Box::new(UnitExpr::Name("mV".into()))
            ))),
            Ok(TypeSymbol::Real)
        );
    }

    #[test]
    fn test_resolution_returns_time() {
        let ctx = PredefinedContext::shared();
        let resolution = &ctx.functions[FN_RESOLUTION];
        assert!(resolution.parameters.is_empty());
        assert_eq!(resolution.return_type, ctx.unit_type("ms").unwrap());
    }
}
