//! Symbol records stored in scopes.

use serde::{Deserialize, Serialize};

use crate::ir::analysis::scope::ScopeId;
use crate::ir::analysis::type_symbol::TypeSymbol;
use crate::ir::ast::{Expression, SourcePosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Variable,
    Function,
    Type,
}

/// The block a variable was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    State,
    Parameters,
    Internals,
    InitialValues,
    InputBufferSpike,
    InputBufferCurrent,
    Equation,
    Local,
}

impl BlockType {
    pub fn is_buffer(&self) -> bool {
        matches!(
            self,
            BlockType::InputBufferSpike | BlockType::InputBufferCurrent
        )
    }
}

/// Distinguishes plain variables from synaptic shapes and input buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    Variable,
    Shape,
    Buffer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub parameters: Vec<TypeSymbol>,
    pub return_type: TypeSymbol,
}

/// A declared variable, function or type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub scope: ScopeId,
    pub position: SourcePosition,
    pub block: Option<BlockType>,
    pub type_symbol: TypeSymbol,
    pub variable_type: VariableType,
    pub is_predefined: bool,
    /// Declared with `function`, i.e. an alias for its expression
    pub is_function: bool,
    pub is_recordable: bool,
    pub is_conductance_based: bool,
    /// Name of the size parameter for vector variables and buffers
    pub vector_parameter: Option<String>,
    pub declaring_expression: Option<Expression>,
    /// Initial value for symbols declared in the initial values block
    pub initial_value: Option<Expression>,
    /// Right-hand side of the ODE that defines this variable
    pub ode_definition: Option<Expression>,
    /// Span of the declaration the symbol comes from
    pub declaration_position: SourcePosition,
    pub signature: Option<FunctionSignature>,
}

impl Symbol {
    fn base(name: &str, kind: SymbolKind, scope: ScopeId, type_symbol: TypeSymbol) -> Self {
        Self {
            name: name.to_string(),
            kind,
            scope,
            position: SourcePosition::added(),
            block: None,
            type_symbol,
            variable_type: VariableType::Variable,
            is_predefined: false,
            is_function: false,
            is_recordable: false,
            is_conductance_based: false,
            vector_parameter: None,
            declaring_expression: None,
            initial_value: None,
            ode_definition: None,
            declaration_position: SourcePosition::added(),
            signature: None,
        }
    }

    pub fn variable(name: &str, scope: ScopeId, type_symbol: TypeSymbol, block: BlockType) -> Self {
        let mut symbol = Self::base(name, SymbolKind::Variable, scope, type_symbol);
        symbol.block = Some(block);
        symbol
    }

    pub fn function(name: &str, scope: ScopeId, signature: FunctionSignature) -> Self {
        let mut symbol = Self::base(
            name,
            SymbolKind::Function,
            scope,
            signature.return_type.clone(),
        );
        symbol.signature = Some(signature);
        symbol
    }

    pub fn type_symbol(name: &str, scope: ScopeId, type_symbol: TypeSymbol) -> Self {
        Self::base(name, SymbolKind::Type, scope, type_symbol)
    }

    pub fn predefined(mut self) -> Self {
        self.is_predefined = true;
        self.position = SourcePosition::predefined();
        self.declaration_position = SourcePosition::predefined();
        self
    }

    pub fn at(mut self, position: SourcePosition, declaration: SourcePosition) -> Self {
        self.position = position;
        self.declaration_position = declaration;
        self
    }

    pub fn is_buffer(&self) -> bool {
        self.variable_type == VariableType::Buffer
    }

    pub fn is_spike_buffer(&self) -> bool {
        self.block == Some(BlockType::InputBufferSpike)
    }

    pub fn is_shape(&self) -> bool {
        self.variable_type == VariableType::Shape
    }

    pub fn is_initial_value(&self) -> bool {
        self.block == Some(BlockType::InitialValues)
    }
}
