//! Lexical scopes of one neuron.
//!
//! Scopes live in an arena owned by the `SymbolTable`; a `ScopeId` indexes
//! into it. Resolution walks outward through parents until the global
//! scope.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ir::analysis::symbols::{Symbol, SymbolKind};
use crate::ir::ast::SourcePosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    Function,
    Update,
    Block,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub position: SourcePosition,
    symbols: IndexMap<(String, SymbolKind), Symbol>,
}

impl Scope {
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn get(&self, name: &str, kind: SymbolKind) -> Option<&Symbol> {
        self.symbols.get(&(name.to_string(), kind))
    }
}

/// Scope arena for one neuron.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table with an empty global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                parent: None,
                children: Vec::new(),
                position: SourcePosition::added(),
                symbols: IndexMap::new(),
            }],
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Open a child scope of `parent`.
    pub fn push_scope(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        position: SourcePosition,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            position,
            symbols: IndexMap::new(),
        });
        self.scopes[parent.0].children.push(id);
        id
    }

    /// Add a symbol to its scope. Returns false, leaving the existing
    /// symbol in place, if the scope already holds one of the same name
    /// and kind.
    pub fn add_symbol(&mut self, symbol: Symbol) -> bool {
        let key = (symbol.name.clone(), symbol.kind);
        let scope = &mut self.scopes[symbol.scope.0];
        if scope.symbols.contains_key(&key) {
            return false;
        }
        scope.symbols.insert(key, symbol);
        true
    }

    /// Resolve `name` starting in `scope` and walking outward.
    pub fn resolve(&self, scope: ScopeId, name: &str, kind: SymbolKind) -> Option<&Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let Some(symbol) = scope.get(name, kind) {
                return Some(symbol);
            }
            current = scope.parent;
        }
        None
    }

    /// Mutable variant of [`SymbolTable::resolve`].
    pub fn resolve_mut(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: SymbolKind,
    ) -> Option<&mut Symbol> {
        let key = (name.to_string(), kind);
        let mut current = Some(scope);
        let mut found = None;
        while let Some(id) = current {
            if self.scopes[id.0].symbols.contains_key(&key) {
                found = Some(id);
                break;
            }
            current = self.scopes[id.0].parent;
        }
        let id = found?;
        self.scopes[id.0].symbols.get_mut(&key)
    }

    /// Resolve a variable in the global scope.
    pub fn resolve_global(&self, name: &str) -> Option<&Symbol> {
        self.resolve(self.global(), name, SymbolKind::Variable)
    }

    /// Every symbol in every scope, in creation order.
    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.scopes.iter().flat_map(|scope| scope.symbols.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::symbols::BlockType;
    use crate::ir::analysis::type_symbol::TypeSymbol;

    #[test]
    fn test_resolution_walks_outward() {
        let mut table = SymbolTable::new();
        let global = table.global();
        let update = table.push_scope(global, ScopeKind::Update, SourcePosition::added());
        let inner = table.push_scope(update, ScopeKind::Block, SourcePosition::added());

        assert!(table.add_symbol(Symbol::variable("V_m", global, TypeSymbol::Real, BlockType::State)));
        assert!(table.add_symbol(Symbol::variable("tmp", update, TypeSymbol::Integer, BlockType::Local)));

        assert!(table.resolve(inner, "V_m", SymbolKind::Variable).is_some());
        assert_eq!(
            table.resolve(inner, "tmp", SymbolKind::Variable).unwrap().scope,
            update
        );
        assert!(table.resolve(global, "tmp", SymbolKind::Variable).is_none());
        assert!(table.resolve(inner, "V_m", SymbolKind::Function).is_none());
        assert_eq!(table.scope(global).children, vec![update]);
    }

    #[test]
    fn test_names_unique_per_kind() {
        let mut table = SymbolTable::new();
        let global = table.global();
        assert!(table.add_symbol(Symbol::variable("x", global, TypeSymbol::Real, BlockType::State)));
        assert!(!table.add_symbol(Symbol::variable("x", global, TypeSymbol::Integer, BlockType::Internals)));
        assert_eq!(table.resolve_global("x").unwrap().type_symbol, TypeSymbol::Real);

        let signature = crate::ir::analysis::symbols::FunctionSignature {
            parameters: vec![],
            return_type: TypeSymbol::Real,
        };
        assert!(table.add_symbol(Symbol::function("x", global, signature)));
    }

    #[test]
    fn test_resolve_mut_updates_symbol() {
        let mut table = SymbolTable::new();
        let global = table.global();
        let update = table.push_scope(global, ScopeKind::Update, SourcePosition::added());
        table.add_symbol(Symbol::variable("g", global, TypeSymbol::Real, BlockType::InitialValues));
        table
            .resolve_mut(update, "g", SymbolKind::Variable)
            .unwrap()
            .is_conductance_based = true;
        assert!(table.resolve_global("g").unwrap().is_conductance_based);
    }
}
