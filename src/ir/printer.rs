//! Surface-syntax printing.
//!
//! The output re-parses to the same tree (modulo positions and explicit
//! parentheses), which is what the solver boundary relies on: equation
//! definitions go out as printed strings and come back as fragments.

use std::fmt::{self, Display, Formatter, Write as _};

use crate::ir::ast::{
    AssignOp, Assignment, BinaryOp, Block, DataType, Declaration, EquationDecl, ExprKind,
    Expression, FunctionCall, InputKind, InputLine, InputQualifier, Literal, OdeEquation,
    OdeFunction, OdeShape, Statement, UnaryOp, UnitExpr, Variable,
};

const INDENT: &str = "  ";

pub fn binary_op_symbol(op: BinaryOp) -> &'static str {
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

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.complete_name())
    }
}

impl Display for UnitExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UnitExpr::Name(name) => write!(f, "{}", name),
            UnitExpr::One => write!(f, "1"),
            UnitExpr::Mul(lhs, rhs) => write!(f, "{}*{}", lhs, rhs),
            UnitExpr::Div(lhs, rhs) => write!(f, "{}/{}", lhs, rhs),
            UnitExpr::Pow(base, exponent) => write!(f, "{}**{}", base, exponent),
            UnitExpr::Paren(inner) => write!(f, "({})", inner),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "integer"),
            DataType::Real => write!(f, "real"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::String => write!(f, "string"),
            DataType::Void => write!(f, "void"),
            DataType::Unit(unit) => write!(f, "{}", unit),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(value) => write!(f, "{}", value),
            // Debug keeps the decimal point so the value lexes as a float
            Literal::Real(value) => write!(f, "{:?}", value),
            Literal::Boolean(value) => write!(f, "{}", value),
            Literal::String(value) => write!(f, "\"{}\"", value),
            Literal::Inf => write!(f, "inf"),
        }
    }
}

impl Display for FunctionCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// Binding strength of an expression as a whole, used to decide where a
/// synthesized tree needs parentheses.
fn expression_precedence(expr: &Expression) -> u8 {
    match &expr.kind {
        ExprKind::Ternary { .. } => 0,
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary {
            op: UnaryOp::Not, ..
        } => 6,
        ExprKind::Unary { .. } => 10,
        _ => u8::MAX,
    }
}

fn write_operand(f: &mut Formatter<'_>, operand: &Expression, min_precedence: u8) -> fmt::Result {
    if expression_precedence(operand) < min_precedence {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(literal) => write!(f, "{}", literal),
            ExprKind::UnitLiteral { value, unit } => write!(f, "{} {}", value, unit),
            ExprKind::Variable(var) => write!(f, "{}", var),
            ExprKind::FunctionCall(call) => write!(f, "{}", call),
            ExprKind::Unary { op, operand } => {
                let (symbol, precedence) = match op {
                    UnaryOp::Plus => ("+", 10),
                    UnaryOp::Minus => ("-", 10),
                    UnaryOp::BitNot => ("~", 10),
                    UnaryOp::Not => ("not ", 6),
                };
                write!(f, "{}", symbol)?;
                write_operand(f, operand, precedence)
            }
            ExprKind::Binary { lhs, op, rhs } => {
                let precedence = op.precedence();
                let (lhs_min, rhs_min) = if op.is_right_associative() {
                    (precedence + 1, precedence)
                } else {
                    (precedence, precedence + 1)
                };
                write_operand(f, lhs, lhs_min)?;
                if *op == BinaryOp::Pow {
                    write!(f, "**")?;
                } else {
                    write!(f, " {} ", binary_op_symbol(*op))?;
                }
                write_operand(f, rhs, rhs_min)
            }
            ExprKind::Paren(inner) => write!(f, "({})", inner),
            ExprKind::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                write_operand(f, condition, 1)?;
                write!(f, " ? ")?;
                write_operand(f, if_true, 1)?;
                write!(f, " : ")?;
                write_operand(f, if_false, 1)
            }
        }
    }
}

impl Display for Declaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_recordable {
            write!(f, "recordable ")?;
        }
        if self.is_function {
            write!(f, "function ")?;
        }
        let names: Vec<String> = self.variables.iter().map(Variable::complete_name).collect();
        write!(f, "{} {}", names.join(", "), self.data_type)?;
        if let Some(size) = &self.size_parameter {
            write!(f, " [{}]", size)?;
        }
        if let Some(expr) = &self.expression {
            write!(f, " = {}", expr)?;
        }
        if let Some(invariant) = &self.invariant {
            write!(f, " [[{}]]", invariant)?;
        }
        Ok(())
    }
}

impl Display for AssignOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        };
        write!(f, "{}", s)
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

fn write_block(out: &mut String, block: &Block, depth: usize) -> fmt::Result {
    for stmt in &block.statements {
        write_statement(out, stmt, depth)?;
    }
    Ok(())
}

fn write_statement(out: &mut String, stmt: &Statement, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    match stmt {
        Statement::Declaration(decl) => writeln!(out, "{}{}", pad, decl),
        Statement::Assignment(assignment) => writeln!(out, "{}{}", pad, assignment),
        Statement::Call(call) => writeln!(out, "{}{}", pad, call),
        Statement::Return { value, .. } => match value {
            Some(value) => writeln!(out, "{}return {}", pad, value),
            None => writeln!(out, "{}return", pad),
        },
        Statement::If {
            branches,
            else_block,
            ..
        } => {
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "elif" };
                writeln!(out, "{}{} {}:", pad, keyword, branch.condition)?;
                write_block(out, &branch.body, depth + 1)?;
            }
            if let Some(block) = else_block {
                writeln!(out, "{}else:", pad)?;
                write_block(out, block, depth + 1)?;
            }
            writeln!(out, "{}end", pad)
        }
        Statement::For {
            variable,
            from,
            to,
            step,
            body,
            ..
        } => {
            writeln!(
                out,
                "{}for {} in {} ... {} step {}:",
                pad, variable, from, to, step
            )?;
            write_block(out, body, depth + 1)?;
            writeln!(out, "{}end", pad)
        }
        Statement::While {
            condition, body, ..
        } => {
            writeln!(out, "{}while {}:", pad, condition)?;
            write_block(out, body, depth + 1)?;
            writeln!(out, "{}end", pad)
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_statement(&mut out, self, 0)?;
        write!(f, "{}", out.trim_end())
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_block(&mut out, self, 0)?;
        write!(f, "{}", out)
    }
}

impl Display for OdeEquation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

impl Display for OdeShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "shape {} = {}", self.lhs, self.rhs)
    }
}

impl Display for OdeFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_recordable {
            write!(f, "recordable ")?;
        }
        write!(
            f,
            "function {} {} = {}",
            self.name, self.data_type, self.expression
        )
    }
}

impl Display for EquationDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EquationDecl::Ode(ode) => write!(f, "{}", ode),
            EquationDecl::Shape(shape) => write!(f, "{}", shape),
            EquationDecl::Function(function) => write!(f, "{}", function),
        }
    }
}

impl Display for InputLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(size) = &self.size_parameter {
            write!(f, "[{}]", size)?;
        }
        if let Some(data_type) = &self.data_type {
            write!(f, " {}", data_type)?;
        }
        write!(f, " <-")?;
        for qualifier in &self.qualifiers {
            match qualifier {
                InputQualifier::Inhibitory => write!(f, " inhibitory")?,
                InputQualifier::Excitatory => write!(f, " excitatory")?,
            }
        }
        match self.kind {
            InputKind::Spike => write!(f, " spike"),
            InputKind::Current => write!(f, " current"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse::{parse_block, parse_declaration, parse_expression, parse_input_line};

    fn reprint(source: &str) -> String {
        parse_expression(source).unwrap().to_string()
    }

    #[test]
    fn test_expressions_print_in_surface_syntax() {
        assert_eq!(reprint("-V_m/tau + I_syn/C_m"), "-V_m / tau + I_syn / C_m");
        assert_eq!(reprint("g''"), "g''");
        assert_eq!(reprint("(e/tau) * t * exp(-t/tau)"), "(e / tau) * t * exp(-t / tau)");
        assert_eq!(reprint("x**2"), "x**2");
        assert_eq!(reprint("10 mV"), "10 mV");
        assert_eq!(reprint("a > 0 ? 1.5 : 2"), "a > 0 ? 1.5 : 2");
        assert_eq!(reprint("not a and b"), "not a and b");
    }

    #[test]
    fn test_synthesized_trees_get_parentheses() {
        let sum = parse_expression("a + b").unwrap();
        let product = Expression::binary(
            Expression::variable(Variable::new("spikes", 0)),
            BinaryOp::Mul,
            sum,
        );
        assert_eq!(product.to_string(), "spikes * (a + b)");

        let difference = Expression::binary(
            Expression::variable(Variable::new("a", 0)),
            BinaryOp::Sub,
            parse_expression("b - c").unwrap(),
        );
        assert_eq!(difference.to_string(), "a - (b - c)");
    }

    #[test]
    fn test_printed_expression_reparses_to_same_text() {
        let sources = [
            "exp(-t / tau_syn) * (1 - x) ** 2",
            "V_m >= V_th and not refractory",
            "-(a + b) / c",
            "1e-05 * t",
        ];
        for source in sources {
            let once = reprint(source);
            assert_eq!(reprint(&once), once, "{}", source);
        }
    }

    #[test]
    fn test_declarations_and_blocks() {
        let decl = parse_declaration("recordable V_m mV = -70 mV").unwrap();
        assert_eq!(decl.to_string(), "recordable V_m mV = -70 mV");

        let decl = parse_declaration("I pA/ms").unwrap();
        assert_eq!(decl.to_string(), "I pA/ms");

        let block = parse_block("if x > 1:\n  x = 0\nend\nintegrate_odes()").unwrap();
        assert_eq!(block.to_string(), "if x > 1:\n  x = 0\nend\nintegrate_odes()\n");

        let line = parse_input_line("inh[n] pA <- inhibitory spike").unwrap();
        assert_eq!(line.to_string(), "inh[n] pA <- inhibitory spike");
    }
}
