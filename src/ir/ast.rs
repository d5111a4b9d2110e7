//! Tree model for neuron descriptions.
//!
//! A `CompilationUnit` holds the neurons of one source file. Each `Neuron`
//! owns its declaration blocks, an optional equations block, input and
//! output declarations, user functions and the update block.
//!
//! Expressions and variables carry two annotation slots that are filled in
//! after construction: the scope they are resolved in (set by the symbol
//! table builder) and, for expressions, the computed `TypeSymbol` (set by
//! the type checker).

use serde::{Deserialize, Serialize};

use crate::ir::analysis::scope::ScopeId;
use crate::ir::analysis::type_symbol::TypeSymbol;

// =============================================================================
// Source positions
// =============================================================================

/// Sentinel line/column used for predefined symbols.
pub const PREDEFINED_SENTINEL: i32 = -1;
/// Sentinel line/column used for compiler-synthesized nodes.
pub const ADDED_SENTINEL: i32 = i32::MAX;

/// A span in a source file. Predefined and compiler-added nodes use
/// sentinel values so that ordering checks can exempt them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub start_line: i32,
    pub start_column: i32,
    pub end_line: i32,
    pub end_column: i32,
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::added()
    }
}

impl SourcePosition {
    pub fn new(start_line: i32, start_column: i32, end_line: i32, end_column: i32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Position of predefined symbols (`e`, `exp`, ...).
    pub fn predefined() -> Self {
        Self::new(
            PREDEFINED_SENTINEL,
            PREDEFINED_SENTINEL,
            PREDEFINED_SENTINEL,
            PREDEFINED_SENTINEL,
        )
    }

    /// Position of nodes synthesized by the compiler.
    pub fn added() -> Self {
        Self::new(ADDED_SENTINEL, ADDED_SENTINEL, ADDED_SENTINEL, ADDED_SENTINEL)
    }

    pub fn is_predefined(&self) -> bool {
        self.start_line == PREDEFINED_SENTINEL
    }

    pub fn is_added(&self) -> bool {
        self.start_line == ADDED_SENTINEL
    }

    /// Whether this position precedes `other`.
    ///
    /// Predefined positions precede everything. An added position only
    /// precedes other added positions, while every real position precedes
    /// an added one.
    pub fn before(&self, other: &SourcePosition) -> bool {
        if self.is_predefined() {
            return true;
        }
        if self.is_added() {
            return other.is_added();
        }
        (self.start_line, self.start_column) < (other.start_line, other.start_column)
    }

    /// Whether `other` lies within this span.
    pub fn encloses(&self, other: &SourcePosition) -> bool {
        if self.is_predefined() || self.is_added() || other.is_predefined() || other.is_added() {
            return false;
        }
        let starts_inside = (self.start_line, self.start_column)
            <= (other.start_line, other.start_column);
        let ends_inside = (other.end_line, other.end_column) <= (self.end_line, self.end_column);
        starts_inside && ends_inside
    }
}

impl std::fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_predefined() {
            write!(f, "<predefined>")
        } else if self.is_added() {
            write!(f, "<added>")
        } else {
            write!(
                f,
                "[{}:{};{}:{}]",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}

// =============================================================================
// Variables and data types
// =============================================================================

/// A variable reference, optionally carrying differential-order ticks
/// (`g''` has name `g` and order 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub differential_order: usize,
    #[serde(default)]
    pub position: SourcePosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeId>,
}

impl Variable {
    pub fn new(name: impl Into<String>, differential_order: usize) -> Self {
        Self {
            name: name.into(),
            differential_order,
            position: SourcePosition::added(),
            scope: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    /// Name including ticks, e.g. `g''`.
    pub fn complete_name(&self) -> String {
        format!("{}{}", self.name, "'".repeat(self.differential_order))
    }

    /// Name of the variable one differential order below, which is the
    /// state variable an equation for this variable defines.
    pub fn name_of_lower_order(&self) -> String {
        let order = self.differential_order.saturating_sub(1);
        format!("{}{}", self.name, "'".repeat(order))
    }
}

/// Unit expression as written in a data type, e.g. `mV/ms` or `1/ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitExpr {
    Name(String),
    One,
    Mul(Box<UnitExpr>, Box<UnitExpr>),
    Div(Box<UnitExpr>, Box<UnitExpr>),
    Pow(Box<UnitExpr>, i32),
    Paren(Box<UnitExpr>),
}

/// Declared data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Real,
    Boolean,
    String,
    Void,
    Unit(UnitExpr),
}

impl DataType {
    pub fn unit(name: impl Into<String>) -> Self {
        DataType::Unit(UnitExpr::Name(name.into()))
    }
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

/// Coarse operator classes used for type-rule dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCategory {
    Additive,
    Multiplicative,
    Power,
    Comparison,
    Logical,
    Bitwise,
}

impl BinaryOp {
    pub fn category(&self) -> OperatorCategory {
        match self {
            BinaryOp::Add | BinaryOp::Sub => OperatorCategory::Additive,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => OperatorCategory::Multiplicative,
            BinaryOp::Pow => OperatorCategory::Power,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Ge
            | BinaryOp::Gt => OperatorCategory::Comparison,
            BinaryOp::And | BinaryOp::Or => OperatorCategory::Logical,
            BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::ShiftLeft
            | BinaryOp::ShiftRight => OperatorCategory::Bitwise,
        }
    }

    /// Binding strength, higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Ge
            | BinaryOp::Gt => 6,
            BinaryOp::ShiftLeft | BinaryOp::ShiftRight => 7,
            BinaryOp::Add | BinaryOp::Sub => 8,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 9,
            BinaryOp::Pow => 11,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, BinaryOp::Pow)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(String),
    Inf,
}

/// A call `name(args...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expression>,
    #[serde(default)]
    pub position: SourcePosition,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self {
            name: name.into(),
            args,
            position: SourcePosition::added(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    /// A numeric literal followed by a unit, e.g. `10 mV`.
    UnitLiteral {
        value: Literal,
        unit: Variable,
    },
    Variable(Variable),
    FunctionCall(FunctionCall),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        lhs: Box<Expression>,
        op: BinaryOp,
        rhs: Box<Expression>,
    },
    Paren(Box<Expression>),
    Ternary {
        condition: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>,
    },
}

/// An expression node together with its annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExprKind,
    #[serde(default)]
    pub position: SourcePosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeSymbol>,
    /// Factor applied when a unit value is stored into a variable of the
    /// same dimension but different magnitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_factor: Option<f64>,
}

impl Expression {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            position: SourcePosition::added(),
            scope: None,
            ty: None,
            conversion_factor: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    pub fn integer(value: i64) -> Self {
        Self::new(ExprKind::Literal(Literal::Integer(value)))
    }

    pub fn real(value: f64) -> Self {
        Self::new(ExprKind::Literal(Literal::Real(value)))
    }

    pub fn variable(variable: Variable) -> Self {
        let position = variable.position;
        Self::new(ExprKind::Variable(variable)).at(position)
    }

    pub fn call(call: FunctionCall) -> Self {
        let position = call.position;
        Self::new(ExprKind::FunctionCall(call)).at(position)
    }

    pub fn binary(lhs: Expression, op: BinaryOp, rhs: Expression) -> Self {
        Self::new(ExprKind::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        })
    }

    pub fn paren(inner: Expression) -> Self {
        let position = inner.position;
        Self::new(ExprKind::Paren(Box::new(inner))).at(position)
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            ExprKind::Variable(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match &self.kind {
            ExprKind::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    /// Integer value of a (possibly signed or parenthesized) integer literal.
    pub fn integer_value(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Literal(Literal::Integer(v)) => Some(*v),
            ExprKind::Paren(inner) => inner.integer_value(),
            ExprKind::Unary {
                op: UnaryOp::Minus,
                operand,
            } => operand.integer_value().map(|v| -v),
            ExprKind::Unary {
                op: UnaryOp::Plus,
                operand,
            } => operand.integer_value(),
            _ => None,
        }
    }
}

// =============================================================================
// Declarations and statements
// =============================================================================

/// `[recordable] [function] a, b <type> [\[size\]] [= expr] [[invariant]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(default)]
    pub is_recordable: bool,
    #[serde(default)]
    pub is_function: bool,
    pub variables: Vec<Variable>,
    pub data_type: DataType,
    #[serde(default)]
    pub size_parameter: Option<String>,
    #[serde(default)]
    pub expression: Option<Expression>,
    #[serde(default)]
    pub invariant: Option<Expression>,
    #[serde(default)]
    pub position: SourcePosition,
}

impl Declaration {
    pub fn new(variable: Variable, data_type: DataType, expression: Option<Expression>) -> Self {
        Self {
            is_recordable: false,
            is_function: false,
            variables: vec![variable],
            data_type,
            size_parameter: None,
            expression,
            invariant: None,
            position: SourcePosition::added(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub lhs: Variable,
    pub op: AssignOp,
    pub rhs: Expression,
    #[serde(default)]
    pub position: SourcePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBlock {
    pub condition: Expression,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Declaration(Declaration),
    Assignment(Assignment),
    Call(FunctionCall),
    Return {
        value: Option<Expression>,
        #[serde(default)]
        position: SourcePosition,
    },
    If {
        branches: Vec<ConditionalBlock>,
        else_block: Option<Block>,
        #[serde(default)]
        position: SourcePosition,
    },
    For {
        variable: Variable,
        from: Expression,
        to: Expression,
        step: f64,
        body: Block,
        #[serde(default)]
        position: SourcePosition,
    },
    While {
        condition: Expression,
        body: Block,
        #[serde(default)]
        position: SourcePosition,
    },
}

impl Statement {
    pub fn position(&self) -> SourcePosition {
        match self {
            Statement::Declaration(decl) => decl.position,
            Statement::Assignment(assignment) => assignment.position,
            Statement::Call(call) => call.position,
            Statement::Return { position, .. }
            | Statement::If { position, .. }
            | Statement::For { position, .. }
            | Statement::While { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
}

// =============================================================================
// Equations block
// =============================================================================

/// `V_m' = rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeEquation {
    pub lhs: Variable,
    pub rhs: Expression,
    #[serde(default)]
    pub position: SourcePosition,
}

/// Whether a shape is written as a differential form or a closed-form
/// function of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeForm {
    Explicit,
    Functional,
}

/// `shape g = rhs` or `shape g'' = rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeShape {
    pub lhs: Variable,
    pub rhs: Expression,
    #[serde(default)]
    pub position: SourcePosition,
}

impl OdeShape {
    pub fn form(&self) -> ShapeForm {
        if self.lhs.differential_order == 0 {
            ShapeForm::Functional
        } else {
            ShapeForm::Explicit
        }
    }
}

/// `[recordable] function name type = rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeFunction {
    #[serde(default)]
    pub is_recordable: bool,
    pub name: String,
    pub data_type: DataType,
    pub expression: Expression,
    #[serde(default)]
    pub position: SourcePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EquationDecl {
    Ode(OdeEquation),
    Shape(OdeShape),
    Function(OdeFunction),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquationsBlock {
    pub declarations: Vec<EquationDecl>,
}

impl EquationsBlock {
    pub fn odes(&self) -> impl Iterator<Item = &OdeEquation> {
        self.declarations.iter().filter_map(|decl| match decl {
            EquationDecl::Ode(ode) => Some(ode),
            _ => None,
        })
    }

    pub fn shapes(&self) -> impl Iterator<Item = &OdeShape> {
        self.declarations.iter().filter_map(|decl| match decl {
            EquationDecl::Shape(shape) => Some(shape),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &OdeFunction> {
        self.declarations.iter().filter_map(|decl| match decl {
            EquationDecl::Function(function) => Some(function),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

// =============================================================================
// Input, output, functions, neuron
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Spike,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputQualifier {
    Inhibitory,
    Excitatory,
}

/// `name [size] [type] <- [inhibitory|excitatory] spike|current`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputLine {
    pub name: String,
    #[serde(default)]
    pub size_parameter: Option<String>,
    #[serde(default)]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub qualifiers: Vec<InputQualifier>,
    pub kind: InputKind,
    #[serde(default)]
    pub position: SourcePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Spike,
    Current,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub position: SourcePosition,
}

/// User-defined function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub return_type: Option<DataType>,
    pub body: Block,
    #[serde(default)]
    pub position: SourcePosition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    pub name: String,
    #[serde(default)]
    pub position: SourcePosition,
    #[serde(default)]
    pub state: Vec<Declaration>,
    #[serde(default)]
    pub parameters: Vec<Declaration>,
    #[serde(default)]
    pub internals: Vec<Declaration>,
    #[serde(default)]
    pub initial_values: Vec<Declaration>,
    #[serde(default)]
    pub equations: Option<EquationsBlock>,
    #[serde(default)]
    pub input: Vec<InputLine>,
    #[serde(default)]
    pub output: Option<OutputKind>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    #[serde(default)]
    pub update: Option<Block>,
}

impl Neuron {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Update block, created on demand.
    pub fn update_block_mut(&mut self) -> &mut Block {
        self.update.get_or_insert_with(Block::default)
    }
}

/// All neurons parsed from one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    #[serde(default)]
    pub file_name: String,
    pub neurons: Vec<Neuron>,
}
