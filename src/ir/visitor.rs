//! Visitor traits over the neuron tree.
//!
//! `Visitor` walks by shared reference, `MutVisitor` by mutable reference.
//! Every node type gets an `enter_*` hook called before its children and an
//! `exit_*` hook called after them; all hooks default to no-ops.

use paste::paste;

use crate::ir::ast::{
    Block, Declaration, EquationDecl, EquationsBlock, ExprKind, Expression, FunctionCall, Neuron,
    Statement, Variable,
};

macro_rules! visitor_traits {
    ($($name:ident: $ty:ty),* $(,)?) => {
        paste! {
            pub trait Visitor {
                $(
                    fn [<enter_ $name>](&mut self, _node: &$ty) {}
                    fn [<exit_ $name>](&mut self, _node: &$ty) {}
                )*
            }

            pub trait MutVisitor {
                $(
                    fn [<enter_ $name>](&mut self, _node: &mut $ty) {}
                    fn [<exit_ $name>](&mut self, _node: &mut $ty) {}
                )*
            }
        }
    };
}

visitor_traits!(
    neuron: Neuron,
    declaration: Declaration,
    equation_decl: EquationDecl,
    block: Block,
    statement: Statement,
    expression: Expression,
    variable: Variable,
    function_call: FunctionCall,
);

pub trait Visitable {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V);
}

pub trait MutVisitable {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V);
}

// =============================================================================
// Shared traversal
// =============================================================================

impl Visitable for Variable {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_variable(self);
        visitor.exit_variable(self);
    }
}

impl Visitable for FunctionCall {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_function_call(self);
        for arg in &self.args {
            arg.accept(visitor);
        }
        visitor.exit_function_call(self);
    }
}

impl Visitable for Expression {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_expression(self);
        match &self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::UnitLiteral { unit, .. } => unit.accept(visitor),
            ExprKind::Variable(var) => var.accept(visitor),
            ExprKind::FunctionCall(call) => call.accept(visitor),
            ExprKind::Unary { operand, .. } => operand.accept(visitor),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.accept(visitor);
                rhs.accept(visitor);
            }
            ExprKind::Paren(inner) => inner.accept(visitor),
            ExprKind::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                condition.accept(visitor);
                if_true.accept(visitor);
                if_false.accept(visitor);
            }
        }
        visitor.exit_expression(self);
    }
}

impl Visitable for Declaration {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_declaration(self);
        for var in &self.variables {
            var.accept(visitor);
        }
        if let Some(expr) = &self.expression {
            expr.accept(visitor);
        }
        if let Some(invariant) = &self.invariant {
            invariant.accept(visitor);
        }
        visitor.exit_declaration(self);
    }
}

impl Visitable for Statement {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_statement(self);
        match self {
            Statement::Declaration(decl) => decl.accept(visitor),
            Statement::Assignment(assignment) => {
                assignment.lhs.accept(visitor);
                assignment.rhs.accept(visitor);
            }
            Statement::Call(call) => call.accept(visitor),
            Statement::Return { value, .. } => {
                if let Some(value) = value {
                    value.accept(visitor);
                }
            }
            Statement::If {
                branches,
                else_block,
                ..
            } => {
                for branch in branches {
                    branch.condition.accept(visitor);
                    branch.body.accept(visitor);
                }
                if let Some(block) = else_block {
                    block.accept(visitor);
                }
            }
            Statement::For {
                variable,
                from,
                to,
                body,
                ..
            } => {
                variable.accept(visitor);
                from.accept(visitor);
                to.accept(visitor);
                body.accept(visitor);
            }
            Statement::While {
                condition, body, ..
            } => {
                condition.accept(visitor);
                body.accept(visitor);
            }
        }
        visitor.exit_statement(self);
    }
}

impl Visitable for Block {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_block(self);
        for stmt in &self.statements {
            stmt.accept(visitor);
        }
        visitor.exit_block(self);
    }
}

impl Visitable for EquationDecl {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_equation_decl(self);
        match self {
            EquationDecl::Ode(ode) => {
                ode.lhs.accept(visitor);
                ode.rhs.accept(visitor);
            }
            EquationDecl::Shape(shape) => {
                shape.lhs.accept(visitor);
                shape.rhs.accept(visitor);
            }
            EquationDecl::Function(function) => function.expression.accept(visitor),
        }
        visitor.exit_equation_decl(self);
    }
}

impl Visitable for EquationsBlock {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        for decl in &self.declarations {
            decl.accept(visitor);
        }
    }
}

impl Visitable for Neuron {
    fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        visitor.enter_neuron(self);
        for decl in self
            .state
            .iter()
            .chain(&self.parameters)
            .chain(&self.internals)
            .chain(&self.initial_values)
        {
            decl.accept(visitor);
        }
        if let Some(equations) = &self.equations {
            equations.accept(visitor);
        }
        for function in &self.functions {
            function.body.accept(visitor);
        }
        if let Some(update) = &self.update {
            update.accept(visitor);
        }
        visitor.exit_neuron(self);
    }
}

// =============================================================================
// Mutable traversal
// =============================================================================

impl MutVisitable for Variable {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        visitor.enter_variable(self);
        visitor.exit_variable(self);
    }
}

impl MutVisitable for FunctionCall {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        visitor.enter_function_call(self);
        for arg in &mut self.args {
            arg.accept_mut(visitor);
        }
        visitor.exit_function_call(self);
    }
}

impl MutVisitable for Expression {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        visitor.enter_expression(self);
        match &mut self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::UnitLiteral { unit, .. } => unit.accept_mut(visitor),
            ExprKind::Variable(var) => var.accept_mut(visitor),
            ExprKind::FunctionCall(call) => call.accept_mut(visitor),
            ExprKind::Unary { operand, .. } => operand.accept_mut(visitor),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.accept_mut(visitor);
                rhs.accept_mut(visitor);
            }
            ExprKind::Paren(inner) => inner.accept_mut(visitor),
            ExprKind::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                condition.accept_mut(visitor);
                if_true.accept_mut(visitor);
                if_false.accept_mut(visitor);
            }
        }
        visitor.exit_expression(self);
    }
}

impl MutVisitable for EquationDecl {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        visitor.enter_equation_decl(self);
        match self {
            EquationDecl::Ode(ode) => {
                ode.lhs.accept_mut(visitor);
                ode.rhs.accept_mut(visitor);
            }
            EquationDecl::Shape(shape) => {
                shape.lhs.accept_mut(visitor);
                shape.rhs.accept_mut(visitor);
            }
            EquationDecl::Function(function) => function.expression.accept_mut(visitor),
        }
        visitor.exit_equation_decl(self);
    }
}

impl MutVisitable for EquationsBlock {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        for decl in &mut self.declarations {
            decl.accept_mut(visitor);
        }
    }
}

impl MutVisitable for Declaration {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        visitor.enter_declaration(self);
        for var in &mut self.variables {
            var.accept_mut(visitor);
        }
        if let Some(expr) = &mut self.expression {
            expr.accept_mut(visitor);
        }
        if let Some(invariant) = &mut self.invariant {
            invariant.accept_mut(visitor);
        }
        visitor.exit_declaration(self);
    }
}

impl MutVisitable for Statement {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        visitor.enter_statement(self);
        match self {
            Statement::Declaration(decl) => decl.accept_mut(visitor),
            Statement::Assignment(assignment) => {
                assignment.lhs.accept_mut(visitor);
                assignment.rhs.accept_mut(visitor);
            }
            Statement::Call(call) => call.accept_mut(visitor),
            Statement::Return { value, .. } => {
                if let Some(value) = value {
                    value.accept_mut(visitor);
                }
            }
            Statement::If {
                branches,
                else_block,
                ..
            } => {
                for branch in branches {
                    branch.condition.accept_mut(visitor);
                    branch.body.accept_mut(visitor);
                }
                if let Some(block) = else_block {
                    block.accept_mut(visitor);
                }
            }
            Statement::For {
                variable,
                from,
                to,
                body,
                ..
            } => {
                variable.accept_mut(visitor);
                from.accept_mut(visitor);
                to.accept_mut(visitor);
                body.accept_mut(visitor);
            }
            Statement::While {
                condition, body, ..
            } => {
                condition.accept_mut(visitor);
                body.accept_mut(visitor);
            }
        }
        visitor.exit_statement(self);
    }
}

impl MutVisitable for Block {
    fn accept_mut<V: MutVisitor + ?Sized>(&mut self, visitor: &mut V) {
        visitor.enter_block(self);
        for stmt in &mut self.statements {
            stmt.accept_mut(visitor);
        }
        visitor.exit_block(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::BinaryOp;

    #[derive(Default)]
    struct NameCollector {
        names: Vec<String>,
        calls: Vec<String>,
    }

    impl Visitor for NameCollector {
        fn enter_variable(&mut self, node: &Variable) {
            self.names.push(node.complete_name());
        }

        fn enter_function_call(&mut self, node: &FunctionCall) {
            self.calls.push(node.name.clone());
        }
    }

    struct Renamer;

    impl MutVisitor for Renamer {
        fn exit_variable(&mut self, node: &mut Variable) {
            node.name = node.name.to_uppercase();
        }
    }

    fn sample() -> Expression {
        Expression::binary(
            Expression::variable(Variable::new("a", 1)),
            BinaryOp::Add,
            Expression::call(FunctionCall::new(
                "exp",
                vec![Expression::variable(Variable::new("b", 0))],
            )),
        )
    }

    #[test]
    fn test_visitor_sees_all_variables_and_calls() {
        let mut collector = NameCollector::default();
        sample().accept(&mut collector);
        assert_eq!(collector.names, vec!["a'", "b"]);
        assert_eq!(collector.calls, vec!["exp"]);
    }

    #[test]
    fn test_mut_visitor_rewrites_in_place() {
        let mut expr = sample();
        expr.accept_mut(&mut Renamer);
        let mut collector = NameCollector::default();
        expr.accept(&mut collector);
        assert_eq!(collector.names, vec!["A'", "B"]);
    }
}
