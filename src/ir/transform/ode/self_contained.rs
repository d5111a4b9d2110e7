//! Function alias inlining.
//!
//! Substitution works on the tree, so an alias `tau` never matches inside
//! `tau_syn`. Each inlined definition is parenthesized.

use indexmap::IndexMap;

use crate::ir::ast::{EquationDecl, EquationsBlock, ExprKind, Expression, Variable};
use crate::ir::error::IrError;
use crate::ir::visitor::{MutVisitable, MutVisitor, Visitable, Visitor};

/// Copy of `equations` in which no function alias references another, and
/// no ODE or shape references an alias.
///
/// Aliases are inlined into each other for at most `max_passes` rounds;
/// aliases still referencing an alias after that are cyclic.
pub fn make_self_contained(
    equations: &EquationsBlock,
    max_passes: usize,
) -> Result<EquationsBlock, IrError> {
    let mut aliases: IndexMap<String, Expression> = equations
        .functions()
        .map(|function| (function.name.clone(), function.expression.clone()))
        .collect();

    let mut passes = 0;
    while passes < max_passes && !dependent_aliases(&aliases).is_empty() {
        let snapshot = aliases.clone();
        for (name, expression) in aliases.iter_mut() {
            expression.accept_mut(&mut Inline {
                aliases: &snapshot,
                skip: Some(name.as_str()),
            });
        }
        passes += 1;
    }
    let dependent = dependent_aliases(&aliases);
    if !dependent.is_empty() {
        return Err(IrError::CyclicAliases {
            names: dependent,
            passes,
        });
    }
    log::debug!("aliases self-contained after {} passes", passes);

    let mut result = equations.clone();
    for decl in &mut result.declarations {
        match decl {
            EquationDecl::Function(function) => {
                if let Some(expression) = aliases.get(&function.name) {
                    function.expression = expression.clone();
                }
            }
            EquationDecl::Ode(ode) => ode.rhs.accept_mut(&mut Inline {
                aliases: &aliases,
                skip: None,
            }),
            EquationDecl::Shape(shape) => shape.rhs.accept_mut(&mut Inline {
                aliases: &aliases,
                skip: None,
            }),
        }
    }
    Ok(result)
}

/// Names of the aliases whose definition references an alias.
fn dependent_aliases(aliases: &IndexMap<String, Expression>) -> Vec<String> {
    aliases
        .iter()
        .filter(|(_, expression)| {
            let mut refs = AliasRefs {
                aliases,
                found: false,
            };
            expression.accept(&mut refs);
            refs.found
        })
        .map(|(name, _)| name.clone())
        .collect()
}

fn alias_definition<'a>(
    aliases: &'a IndexMap<String, Expression>,
    var: &Variable,
) -> Option<&'a Expression> {
    if var.differential_order != 0 {
        return None;
    }
    aliases.get(&var.name)
}

struct AliasRefs<'a> {
    aliases: &'a IndexMap<String, Expression>,
    found: bool,
}

impl Visitor for AliasRefs<'_> {
    fn enter_expression(&mut self, node: &Expression) {
        if let Some(var) = node.as_variable() {
            self.found |= alias_definition(self.aliases, var).is_some();
        }
    }
}

struct Inline<'a> {
    aliases: &'a IndexMap<String, Expression>,
    /// The alias being rewritten, never inlined into itself.
    skip: Option<&'a str>,
}

impl MutVisitor for Inline<'_> {
    fn exit_expression(&mut self, node: &mut Expression) {
        let Some(var) = node.as_variable() else {
            return;
        };
        if self.skip == Some(var.name.as_str()) {
            return;
        }
        let Some(definition) = alias_definition(self.aliases, var) else {
            return;
        };
        node.ty = definition.ty.clone();
        node.kind = ExprKind::Paren(Box::new(definition.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse::lexer::contains_identifier;
    use crate::ir::parse::parse_equations;

    #[test]
    fn test_chained_aliases_are_inlined() {
        let equations = parse_equations(
            "function f1 real = a\n\
             function f3 real = f2 + c\n\
             function f2 real = f1 + b\n\
             V_m' = f1 + f2 + f3 + f1_suffix",
        )
        .unwrap();
        let result = make_self_contained(&equations, 10).unwrap();

        let printed: Vec<String> = result
            .declarations
            .iter()
            .map(|decl| match decl {
                EquationDecl::Function(function) => function.expression.to_string(),
                EquationDecl::Ode(ode) => ode.rhs.to_string(),
                EquationDecl::Shape(shape) => shape.rhs.to_string(),
            })
            .collect();
        for text in &printed {
            for alias in ["f1", "f2", "f3"] {
                assert!(!contains_identifier(text, alias), "{} in {}", alias, text);
            }
        }
        assert_eq!(printed[1], "((a) + b) + c");
        assert!(contains_identifier(&printed[3], "f1_suffix"));
        // the neuron's own block is untouched
        assert!(contains_identifier(&equations.odes().next().unwrap().rhs.to_string(), "f1"));
    }

    #[test]
    fn test_cyclic_aliases() {
        let equations = parse_equations(
            "function a real = b + 1\n\
             function b real = a * 2\n\
             function c real = 3",
        )
        .unwrap();
        match make_self_contained(&equations, 4) {
            Err(IrError::CyclicAliases { names, passes }) => {
                assert_eq!(names, vec!["a", "b"]);
                assert_eq!(passes, 4);
            }
            other => panic!("expected cyclic aliases, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_cyclic() {
        let equations = parse_equations("function a real = a + 1").unwrap();
        assert!(matches!(
            make_self_contained(&equations, 3),
            Err(IrError::CyclicAliases { .. })
        ));
    }
}
