//! Symbol-table construction for one neuron.
//!
//! The builder:
//! 1. completes implicit differential orders in the equations block,
//! 2. seeds the global scope with the predefined variables, functions and
//!    primitive types,
//! 3. walks the blocks, registering a symbol per declaration and stamping
//!    every expression and variable with the scope it resolves in,
//! 4. marks conductance-based spike buffers,
//! 5. binds each ODE and differential shape to the state variable it
//!    defines.
//!
//! Problems are reported as diagnostics and never abort the walk.

use crate::ir::analysis::predefined::{
    is_convolution_function, PredefinedContext, FN_COND_SUM, FN_CONVOLVE, PRIMITIVE_TYPES,
};
use crate::ir::analysis::scope::{ScopeId, ScopeKind, SymbolTable};
use crate::ir::analysis::symbols::{
    BlockType, FunctionSignature, Symbol, SymbolKind, VariableType,
};
use crate::ir::analysis::type_symbol::TypeSymbol;
use crate::ir::ast::{
    Block, DataType, Declaration, EquationDecl, EquationsBlock, Expression, FunctionCall,
    FunctionDef, InputKind, Neuron, OdeEquation, OdeShape, SourcePosition, Statement, Variable,
};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};
use crate::ir::visitor::{MutVisitable, MutVisitor, Visitable, Visitor};

/// Stamps the scope on every expression and variable it visits.
struct ScopeStamp(ScopeId);

impl MutVisitor for ScopeStamp {
    fn enter_expression(&mut self, node: &mut Expression) {
        node.scope = Some(self.0);
    }

    fn enter_variable(&mut self, node: &mut Variable) {
        node.scope = Some(self.0);
    }
}

fn stamp_expression(expr: &mut Expression, scope: ScopeId) {
    expr.accept_mut(&mut ScopeStamp(scope));
}

fn stamp_variable(var: &mut Variable, scope: ScopeId) {
    var.scope = Some(scope);
}

// =============================================================================
// Implicit-order completion
// =============================================================================

/// Insert identity declarations for the missing intermediate orders of
/// every differential shape and ODE: `g'' = ...` implies `g' = g'`.
///
/// Returns the number of declarations added; a second run on the same
/// block adds nothing.
pub fn complete_implicit_orders(equations: &mut EquationsBlock) -> usize {
    let mut added = Vec::new();
    for decl in &equations.declarations {
        let (lhs, is_shape) = match decl {
            EquationDecl::Shape(shape) => (&shape.lhs, true),
            EquationDecl::Ode(ode) => (&ode.lhs, false),
            EquationDecl::Function(_) => continue,
        };
        for order in 1..lhs.differential_order {
            let present = equations
                .declarations
                .iter()
                .chain(added.iter())
                .any(|other| match (other, is_shape) {
                    (EquationDecl::Shape(shape), true) => {
                        shape.lhs.name == lhs.name && shape.lhs.differential_order == order
                    }
                    (EquationDecl::Ode(ode), false) => {
                        ode.lhs.name == lhs.name && ode.lhs.differential_order == order
                    }
                    _ => false,
                });
            if present {
                continue;
            }
            let identity = Variable::new(lhs.name.clone(), order);
            let rhs = Expression::variable(identity.clone());
            added.push(if is_shape {
                EquationDecl::Shape(OdeShape {
                    lhs: identity,
                    rhs,
                    position: SourcePosition::added(),
                })
            } else {
                EquationDecl::Ode(OdeEquation {
                    lhs: identity,
                    rhs,
                    position: SourcePosition::added(),
                })
            });
        }
    }
    let count = added.len();
    equations.declarations.extend(added);
    count
}

/// Whether an equation entry is a synthesized `x' = x'` identity.
pub fn is_identity_entry(lhs: &Variable, rhs: &Expression) -> bool {
    match rhs.as_variable() {
        Some(var) => var.name == lhs.name && var.differential_order == lhs.differential_order,
        None => false,
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Build the symbol table of `neuron`, stamping scopes into its tree.
pub fn build_symbol_table(
    neuron: &mut Neuron,
    ctx: &PredefinedContext,
) -> (SymbolTable, DiagnosticReport) {
    let mut builder = SymbolTableBuilder {
        ctx,
        table: SymbolTable::new(),
        report: DiagnosticReport::new(),
    };
    builder.visit_neuron(neuron);
    (builder.table, builder.report)
}

struct SymbolTableBuilder<'a> {
    ctx: &'a PredefinedContext,
    table: SymbolTable,
    report: DiagnosticReport,
}

impl SymbolTableBuilder<'_> {
    fn visit_neuron(&mut self, neuron: &mut Neuron) {
        if let Some(equations) = &mut neuron.equations {
            let added = complete_implicit_orders(equations);
            if added > 0 {
                log::debug!("{}: added {} implicit order declarations", neuron.name, added);
            }
        }

        self.seed_predefined();
        let global = self.table.global();

        for decl in &mut neuron.state {
            self.declare(decl, global, BlockType::State);
        }
        for decl in &mut neuron.parameters {
            self.declare(decl, global, BlockType::Parameters);
        }
        for decl in &mut neuron.internals {
            self.declare(decl, global, BlockType::Internals);
        }
        for decl in &mut neuron.initial_values {
            self.declare(decl, global, BlockType::InitialValues);
        }
        if let Some(equations) = &mut neuron.equations {
            self.visit_equations(equations, global);
        }
        self.visit_input(neuron, global);
        for function in &mut neuron.functions {
            self.visit_function(function, global);
        }
        if let Some(update) = &mut neuron.update {
            let scope = self
                .table
                .push_scope(global, ScopeKind::Update, SourcePosition::added());
            self.visit_block(update, scope);
        }

        if let Some(equations) = &neuron.equations {
            self.mark_conductance_based_buffers(equations);
            self.bind_equations(equations);
        }
    }

    fn seed_predefined(&mut self) {
        let global = self.table.global();
        for (name, ty) in &self.ctx.variables {
            let mut symbol = Symbol::variable(name, global, ty.clone(), BlockType::State);
            symbol.block = None;
            self.table.add_symbol(symbol.predefined());
        }
        for (name, signature) in &self.ctx.functions {
            self.table
                .add_symbol(Symbol::function(name, global, signature.clone()).predefined());
        }
        for name in PRIMITIVE_TYPES {
            let ty = match *name {
                "integer" => TypeSymbol::Integer,
                "real" => TypeSymbol::Real,
                "boolean" => TypeSymbol::Boolean,
                "string" => TypeSymbol::String,
                _ => TypeSymbol::Void,
            };
            self.table
                .add_symbol(Symbol::type_symbol(name, global, ty).predefined());
        }
    }

    fn resolve_type(&mut self, data_type: &DataType, position: SourcePosition) -> TypeSymbol {
        match self.ctx.resolve_data_type(data_type) {
            Ok(ty) => ty,
            Err(unknown) => {
                self.report.add(
                    Diagnostic::error(
                        DiagnosticCode::UnknownType,
                        format!("Unknown type or unit '{}'", unknown),
                    )
                    .at(position),
                );
                TypeSymbol::Error
            }
        }
    }

    fn add_variable(&mut self, symbol: Symbol) {
        let name = symbol.name.clone();
        let position = symbol.position;
        if !self.table.add_symbol(symbol) {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::VariableRedeclared,
                    format!("Variable '{}' is declared more than once", name),
                )
                .at(position),
            );
        }
    }

    fn declare(&mut self, decl: &mut Declaration, scope: ScopeId, block: BlockType) {
        let ty = self.resolve_type(&decl.data_type, decl.position);
        for var in &mut decl.variables {
            stamp_variable(var, scope);
            let mut symbol = Symbol::variable(&var.complete_name(), scope, ty.clone(), block)
                .at(var.position, decl.position);
            symbol.is_function = decl.is_function;
            symbol.is_recordable = decl.is_recordable;
            symbol.vector_parameter = decl.size_parameter.clone();
            symbol.declaring_expression = decl.expression.clone();
            if block == BlockType::InitialValues {
                symbol.initial_value = decl.expression.clone();
            }
            self.add_variable(symbol);
        }
        if let Some(expr) = &mut decl.expression {
            stamp_expression(expr, scope);
        }
        if let Some(invariant) = &mut decl.invariant {
            stamp_expression(invariant, scope);
        }
    }

    fn visit_equations(&mut self, equations: &mut EquationsBlock, scope: ScopeId) {
        for decl in &mut equations.declarations {
            match decl {
                EquationDecl::Function(function) => {
                    let ty = self.resolve_type(&function.data_type, function.position);
                    let mut symbol =
                        Symbol::variable(&function.name, scope, ty, BlockType::Equation)
                            .at(function.position, function.position);
                    symbol.is_function = true;
                    symbol.is_recordable = function.is_recordable;
                    symbol.declaring_expression = Some(function.expression.clone());
                    self.add_variable(symbol);
                }
                EquationDecl::Shape(shape) => {
                    let name = shape.lhs.complete_name();
                    let declared = self
                        .table
                        .resolve(scope, &name, SymbolKind::Variable)
                        .is_some();
                    if shape.lhs.differential_order == 0 && !declared {
                        let mut symbol =
                            Symbol::variable(&name, scope, TypeSymbol::Real, BlockType::Equation)
                                .at(shape.lhs.position, shape.position);
                        symbol.variable_type = VariableType::Shape;
                        symbol.is_recordable = true;
                        symbol.declaring_expression = Some(shape.rhs.clone());
                        self.add_variable(symbol);
                    }
                }
                EquationDecl::Ode(_) => {}
            }
            decl.accept_mut(&mut ScopeStamp(scope));
        }
    }

    fn visit_input(&mut self, neuron: &mut Neuron, scope: ScopeId) {
        for line in &mut neuron.input {
            let (block, default_unit) = match line.kind {
                InputKind::Spike => (BlockType::InputBufferSpike, "nS"),
                InputKind::Current => (BlockType::InputBufferCurrent, "pA"),
            };
            if line.data_type.is_none() {
                if line.kind == InputKind::Spike {
                    self.report.add(
                        Diagnostic::warning(
                            DiagnosticCode::SpikeBufferWithoutType,
                            format!(
                                "Spike buffer '{}' has no data type, assuming {}",
                                line.name, default_unit
                            ),
                        )
                        .at(line.position),
                    );
                }
                line.data_type = Some(DataType::unit(default_unit));
            }
            let ty = match &line.data_type {
                Some(data_type) => self.resolve_type(data_type, line.position),
                None => TypeSymbol::Error,
            };
            let mut symbol = Symbol::variable(&line.name, scope, ty, block)
                .at(line.position, line.position);
            symbol.variable_type = VariableType::Buffer;
            symbol.vector_parameter = line.size_parameter.clone();
            self.add_variable(symbol);
        }
    }

    fn visit_function(&mut self, function: &mut FunctionDef, global: ScopeId) {
        let mut parameters = Vec::with_capacity(function.parameters.len());
        for parameter in &function.parameters {
            parameters.push(self.resolve_type(&parameter.data_type, parameter.position));
        }
        let return_type = match &function.return_type {
            Some(data_type) => self.resolve_type(data_type, function.position),
            None => TypeSymbol::Void,
        };
        let signature = FunctionSignature {
            parameters: parameters.clone(),
            return_type,
        };
        let symbol = Symbol::function(&function.name, global, signature)
            .at(function.position, function.position);
        if !self.table.add_symbol(symbol) {
            self.report.add(
                Diagnostic::error(
                    DiagnosticCode::FunctionRedeclared,
                    format!("Function '{}' is declared more than once", function.name),
                )
                .at(function.position),
            );
        }

        let scope = self
            .table
            .push_scope(global, ScopeKind::Function, function.position);
        for (parameter, ty) in function.parameters.iter().zip(parameters) {
            let symbol = Symbol::variable(&parameter.name, scope, ty, BlockType::Local)
                .at(parameter.position, parameter.position);
            self.add_variable(symbol);
        }
        self.visit_block(&mut function.body, scope);
    }

    fn visit_block(&mut self, block: &mut Block, scope: ScopeId) {
        for stmt in &mut block.statements {
            self.visit_statement(stmt, scope);
        }
    }

    fn nested_block(&mut self, block: &mut Block, parent: ScopeId) {
        let position = block
            .statements
            .first()
            .map(Statement::position)
            .unwrap_or_default();
        let scope = self.table.push_scope(parent, ScopeKind::Block, position);
        self.visit_block(block, scope);
    }

    fn visit_statement(&mut self, stmt: &mut Statement, scope: ScopeId) {
        match stmt {
            Statement::Declaration(decl) => self.declare(decl, scope, BlockType::Local),
            Statement::Assignment(assignment) => {
                stamp_variable(&mut assignment.lhs, scope);
                stamp_expression(&mut assignment.rhs, scope);
            }
            Statement::Call(call) => {
                for arg in &mut call.args {
                    stamp_expression(arg, scope);
                }
            }
            Statement::Return { value, .. } => {
                if let Some(value) = value {
                    stamp_expression(value, scope);
                }
            }
            Statement::If {
                branches,
                else_block,
                ..
            } => {
                for branch in branches {
                    stamp_expression(&mut branch.condition, scope);
                    self.nested_block(&mut branch.body, scope);
                }
                if let Some(block) = else_block {
                    self.nested_block(block, scope);
                }
            }
            Statement::For {
                variable,
                from,
                to,
                body,
                ..
            } => {
                stamp_variable(variable, scope);
                stamp_expression(from, scope);
                stamp_expression(to, scope);
                self.nested_block(body, scope);
            }
            Statement::While {
                condition, body, ..
            } => {
                stamp_expression(condition, scope);
                self.nested_block(body, scope);
            }
        }
    }

    /// Spike buffers fed to `cond_sum`, or to `convolve` while carrying a
    /// conductance unit, are conductance based.
    fn mark_conductance_based_buffers(&mut self, equations: &EquationsBlock) {
        let conductance = self.ctx.unit_type("nS");
        let mut calls = ConvolutionCalls::default();
        for decl in &equations.declarations {
            if !matches!(decl, EquationDecl::Shape(_)) {
                decl.accept(&mut calls);
            }
        }
        let global = self.table.global();
        for (function, buffer) in calls.pairs {
            let Some(symbol) = self.table.resolve_mut(global, &buffer, SymbolKind::Variable) else {
                continue;
            };
            if !symbol.is_spike_buffer() {
                continue;
            }
            let conductance_typed = match (&symbol.type_symbol, &conductance) {
                (TypeSymbol::Unit(unit), Some(TypeSymbol::Unit(ns))) => unit.same_dimension(ns),
                _ => false,
            };
            if function == FN_COND_SUM || (function == FN_CONVOLVE && conductance_typed) {
                symbol.is_conductance_based = true;
            }
        }
    }

    /// Attach each ODE and differential shape to the variable one order
    /// below its left-hand side.
    fn bind_equations(&mut self, equations: &EquationsBlock) {
        let global = self.table.global();
        for decl in &equations.declarations {
            let (lhs, rhs, position, is_shape) = match decl {
                EquationDecl::Ode(ode) => (&ode.lhs, &ode.rhs, ode.position, false),
                EquationDecl::Shape(shape) if shape.lhs.differential_order > 0 => {
                    (&shape.lhs, &shape.rhs, shape.position, true)
                }
                _ => continue,
            };
            let target = lhs.name_of_lower_order();
            match self.table.resolve_mut(global, &target, SymbolKind::Variable) {
                Some(symbol) => {
                    symbol.ode_definition = Some(rhs.clone());
                    if is_shape {
                        symbol.variable_type = VariableType::Shape;
                    }
                }
                None => self.report.add(
                    Diagnostic::error(
                        DiagnosticCode::OdeWithoutVariable,
                        format!(
                            "No variable '{}' declared for the equation of '{}'",
                            target,
                            lhs.complete_name()
                        ),
                    )
                    .at(position),
                ),
            }
        }
    }
}

/// Collects `(combinator, buffer name)` for every convolution call.
#[derive(Default)]
struct ConvolutionCalls {
    pairs: Vec<(String, String)>,
}

impl Visitor for ConvolutionCalls {
    fn enter_function_call(&mut self, node: &FunctionCall) {
        if !is_convolution_function(&node.name) {
            return;
        }
        if let Some(buffer) = node.args.get(1).and_then(Expression::as_variable) {
            self.pairs.push((node.name.clone(), buffer.name.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::diagnostics::Severity;
    use crate::ir::parse::{parse_block, parse_declarations, parse_equations, parse_input_lines};

    fn neuron() -> Neuron {
        let mut neuron = Neuron::new("iaf");
        neuron.parameters = parse_declarations("tau ms = 10 ms\nC_m pF = 250 pF").unwrap();
        neuron.initial_values =
            parse_declarations("V_m mV = 0 mV\ng nS = 0 nS\ng' nS/ms = e / tau").unwrap();
        neuron.equations = Some(
            parse_equations(
                "shape g'' = -g'/tau\nfunction I_syn pA = convolve(g, spikes)\nV_m' = -V_m/tau + I_syn/C_m",
            )
            .unwrap(),
        );
        neuron.input = parse_input_lines("spikes <- spike\ncurrents <- current").unwrap();
        neuron.update = Some(parse_block("x real = 1\nif x > 0:\n  y real = x\nend\nintegrate_odes()").unwrap());
        neuron
    }

    #[test]
    fn test_implicit_order_completion_is_idempotent() {
        let mut equations = parse_equations("shape g''' = -g/tau\nV_m' = -V_m").unwrap();
        assert_eq!(complete_implicit_orders(&mut equations), 2);
        assert_eq!(equations.shapes().count(), 3);
        let orders: Vec<usize> = equations.shapes().map(|s| s.lhs.differential_order).collect();
        assert_eq!(orders, vec![3, 1, 2]);
        let added = equations.shapes().nth(1).unwrap();
        assert!(added.position.is_added());
        assert!(is_identity_entry(&added.lhs, &added.rhs));

        assert_eq!(complete_implicit_orders(&mut equations), 0);
        assert_eq!(equations.declarations.len(), 4);
    }

    #[test]
    fn test_symbols_and_scopes() {
        let mut neuron = neuron();
        let ctx = PredefinedContext::shared();
        let (table, report) = build_symbol_table(&mut neuron, &ctx);

        let v_m = table.resolve_global("V_m").unwrap();
        assert_eq!(v_m.block, Some(BlockType::InitialValues));
        assert!(v_m.ode_definition.is_some());
        assert!(v_m.initial_value.is_some());

        let g = table.resolve_global("g").unwrap();
        assert_eq!(g.variable_type, VariableType::Shape);
        assert_eq!(g.ode_definition.as_ref().unwrap().to_string(), "g'");
        let g_prime = table.resolve_global("g'").unwrap();
        assert_eq!(g_prime.ode_definition.as_ref().unwrap().to_string(), "-g' / tau");

        let i_syn = table.resolve_global("I_syn").unwrap();
        assert!(i_syn.is_function);
        assert_eq!(i_syn.block, Some(BlockType::Equation));

        assert!(table.resolve_global("exp").is_none());
        assert!(table
            .resolve(table.global(), "exp", SymbolKind::Function)
            .unwrap()
            .is_predefined);

        // spike buffer without type: one warning, defaulted to nS
        assert_eq!(report.with_code(DiagnosticCode::SpikeBufferWithoutType).len(), 1);
        assert_eq!(neuron.input[0].data_type, Some(DataType::unit("nS")));
        assert_eq!(neuron.input[1].data_type, Some(DataType::unit("pA")));
        assert!(table.resolve_global("spikes").unwrap().is_conductance_based);
        assert!(!report.has_errors(), "{:?}", report);

        // update scope and nested block scope
        let update = neuron.update.as_ref().unwrap();
        let if_scope = match &update.statements[1] {
            Statement::If { branches, .. } => match &branches[0].body.statements[0] {
                Statement::Declaration(decl) => decl.variables[0].scope.unwrap(),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(table.scope(if_scope).kind, ScopeKind::Block);
        assert!(table.resolve(if_scope, "x", SymbolKind::Variable).is_some());
        assert!(table.resolve_global("y").is_none());
    }

    #[test]
    fn test_conductance_marking_follows_usage() {
        let mut neuron = Neuron::new("cond");
        neuron.parameters = parse_declarations("tau ms = 2 ms").unwrap();
        neuron.equations = Some(
            parse_equations(
                "shape g = exp(-t/tau)\n\
                 function I_ex pA = convolve(g, ex)\n\
                 function I_cur pA = curr_sum(g, cur)\n\
                 function I_sum pA = cond_sum(g, summed)",
            )
            .unwrap(),
        );
        neuron.input = parse_input_lines(
            "ex uS <- spike\ncur nS <- spike\nsummed pA <- spike\nidle nS <- spike",
        )
        .unwrap();
        let ctx = PredefinedContext::shared();
        let (table, _) = build_symbol_table(&mut neuron, &ctx);

        let marked = |name: &str| table.resolve_global(name).unwrap().is_conductance_based;
        assert!(marked("ex"));
        assert!(marked("summed"));
        // typed nS, but never convolved as a conductance
        assert!(!marked("cur"));
        assert!(!marked("idle"));
    }

    #[test]
    fn test_ode_without_variable_and_redeclaration() {
        let mut neuron = Neuron::new("broken");
        neuron.state = parse_declarations("a real = 1\na real = 2\nb unknown_unit").unwrap();
        neuron.equations = Some(parse_equations("w' = -w").unwrap());
        let ctx = PredefinedContext::shared();
        let (_, report) = build_symbol_table(&mut neuron, &ctx);

        assert_eq!(report.with_code(DiagnosticCode::VariableRedeclared).len(), 1);
        assert_eq!(report.with_code(DiagnosticCode::UnknownType).len(), 1);
        let missing = report.with_code(DiagnosticCode::OdeWithoutVariable);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].severity, Severity::Error);
    }

    #[test]
    fn test_rebuild_does_not_repeat_buffer_warning() {
        let mut neuron = neuron();
        let ctx = PredefinedContext::shared();
        build_symbol_table(&mut neuron, &ctx);
        let (_, report) = build_symbol_table(&mut neuron, &ctx);
        assert!(report.with_code(DiagnosticCode::SpikeBufferWithoutType).is_empty());
    }
}
