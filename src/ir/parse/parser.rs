//! Fragment parser for the surface syntax.
//!
//! Parses single expressions, declarations, statements, equation entries
//! and input lines. This is what turns solver output back into tree nodes
//! and what tests use to build neurons; whole model files are parsed by the
//! front end, not here.

use std::ops::Range;

use logos::Logos;

use crate::ir::ast::{
    AssignOp, Assignment, BinaryOp, Block, ConditionalBlock, DataType, Declaration, EquationDecl,
    EquationsBlock, ExprKind, Expression, FunctionCall, InputKind, InputLine, InputQualifier,
    Literal, OdeEquation, OdeFunction, OdeShape, SourcePosition, Statement, UnaryOp, UnitExpr,
    Variable,
};
use crate::ir::error::IrError;
use crate::ir::parse::lexer::Token;

type Result<T> = std::result::Result<T, IrError>;

/// Parse a single expression.
pub fn parse_expression(source: &str) -> Result<Expression> {
    Parser::new(source)?.finish(|p| p.expression())
}

/// Parse a data type such as `mV`, `pA/ms` or `real`.
pub fn parse_data_type(source: &str) -> Result<DataType> {
    Parser::new(source)?.finish(|p| p.data_type())
}

/// Parse a declaration such as `V_m mV = -70 mV`.
pub fn parse_declaration(source: &str) -> Result<Declaration> {
    Parser::new(source)?.finish(|p| p.declaration())
}

/// Parse one declaration per line.
pub fn parse_declarations(source: &str) -> Result<Vec<Declaration>> {
    Parser::new(source)?.finish(|p| p.lines(|p| p.declaration()))
}

/// Parse an assignment such as `V_m += 1 mV`.
pub fn parse_assignment(source: &str) -> Result<Assignment> {
    Parser::new(source)?.finish(|p| p.assignment())
}

/// Parse a single statement.
pub fn parse_statement(source: &str) -> Result<Statement> {
    Parser::new(source)?.finish(|p| p.statement())
}

/// Parse a sequence of statements.
pub fn parse_block(source: &str) -> Result<Block> {
    Parser::new(source)?.finish(|p| p.block())
}

/// Parse one equations-block entry: an ODE, a shape or a function alias.
pub fn parse_equation(source: &str) -> Result<EquationDecl> {
    Parser::new(source)?.finish(|p| p.equation())
}

/// Parse an equations block, one entry per line.
pub fn parse_equations(source: &str) -> Result<EquationsBlock> {
    Parser::new(source)?.finish(|p| {
        Ok(EquationsBlock {
            declarations: p.lines(|p| p.equation())?,
        })
    })
}

/// Parse an input line such as `spikes nS <- spike`.
pub fn parse_input_line(source: &str) -> Result<InputLine> {
    Parser::new(source)?.finish(|p| p.input_line())
}

/// Parse one input line per line.
pub fn parse_input_lines(source: &str) -> Result<Vec<InputLine>> {
    Parser::new(source)?.finish(|p| p.lines(|p| p.input_line()))
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    paren_depth: usize,
    line_starts: Vec<usize>,
    last_end: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self> {
        let mut tokens = Vec::new();
        for (token, span) in Token::lexer(source).spanned() {
            match token {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    return Err(IrError::Parse {
                        offset: span.start,
                        message: format!("unexpected character '{}'", &source[span]),
                    })
                }
            }
        }
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Ok(Self {
            source,
            tokens,
            pos: 0,
            paren_depth: 0,
            line_starts,
            last_end: 0,
        })
    }

    fn finish<T>(mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.skip_separators();
        let value = parse(&mut self)?;
        self.skip_separators();
        match self.tokens.get(self.pos) {
            None => Ok(value),
            Some((token, span)) => Err(IrError::Parse {
                offset: span.start,
                message: format!("unexpected trailing token {:?}", token),
            }),
        }
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    /// Current token. Newlines are invisible inside parentheses.
    fn peek(&mut self) -> Option<&Token> {
        if self.paren_depth > 0 {
            while matches!(self.tokens.get(self.pos), Some((Token::Newline, _))) {
                self.pos += 1;
            }
        }
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        self.peek();
        let (token, span) = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        self.last_end = span.end;
        Some(token)
    }

    fn check(&mut self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", expected)))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.advance() {
                Some(Token::Ident(name)) => Ok(name),
                _ => Err(self.error("expected identifier")),
            },
            _ => Err(self.error("expected identifier")),
        }
    }

    fn error(&mut self, message: impl Into<String>) -> IrError {
        let offset = match self.tokens.get(self.pos) {
            Some((_, span)) => span.start,
            None => self.source.len(),
        };
        let found = match self.tokens.get(self.pos) {
            Some((token, _)) => format!("{:?}", token),
            None => "end of input".to_string(),
        };
        IrError::Parse {
            offset,
            message: format!("{}, found {}", message.into(), found),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.tokens.get(self.pos),
            Some((Token::Newline | Token::Semicolon, _))
        ) {
            self.pos += 1;
        }
    }

    fn start(&mut self) -> usize {
        self.peek();
        match self.tokens.get(self.pos) {
            Some((_, span)) => span.start,
            None => self.source.len(),
        }
    }

    fn line_col(&self, offset: usize) -> (i32, i32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let col = offset - self.line_starts[line];
        (line as i32 + 1, col as i32)
    }

    fn span_from(&self, start: usize) -> SourcePosition {
        let (start_line, start_column) = self.line_col(start);
        let (end_line, end_column) = self.line_col(self.last_end.max(start));
        SourcePosition::new(start_line, start_column, end_line, end_column)
    }

    /// Repeatedly parse items separated by newlines.
    fn lines<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let mut items = Vec::new();
        self.skip_separators();
        while self.pos < self.tokens.len() {
            items.push(item(self)?);
            if self.pos < self.tokens.len() {
                match self.peek() {
                    Some(Token::Newline | Token::Semicolon) => self.skip_separators(),
                    _ => return Err(self.error("expected end of line")),
                }
            }
        }
        Ok(items)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expression(&mut self) -> Result<Expression> {
        let start = self.start();
        let condition = self.binary(0)?;
        if self.eat(&Token::Question) {
            let if_true = self.expression()?;
            self.expect(Token::Colon)?;
            let if_false = self.expression()?;
            return Ok(Expression::new(ExprKind::Ternary {
                condition: Box::new(condition),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            })
            .at(self.span_from(start)));
        }
        Ok(condition)
    }

    fn binary_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Mod,
            Token::StarStar => BinaryOp::Pow,
            Token::Lt | Token::LArrow => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::EqEq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Ge => BinaryOp::Ge,
            Token::Gt => BinaryOp::Gt,
            Token::And => BinaryOp::And,
            Token::Or => BinaryOp::Or,
            Token::Amp => BinaryOp::BitAnd,
            Token::Pipe => BinaryOp::BitOr,
            Token::Caret => BinaryOp::BitXor,
            Token::Shl => BinaryOp::ShiftLeft,
            Token::Shr => BinaryOp::ShiftRight,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing over binary operators.
    fn binary(&mut self, min_precedence: u8) -> Result<Expression> {
        let start = self.start();
        let mut lhs = self.unary()?;
        while let Some(op) = self.binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            // `a<-1` lexes as an arrow; it is `a < -1`
            let arrow = self.check(&Token::LArrow);
            self.advance();
            let next = if op.is_right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let rhs = if arrow {
                let operand_start = self.last_end;
                let operand = self.binary(next)?;
                Expression::new(ExprKind::Unary {
                    op: UnaryOp::Minus,
                    operand: Box::new(operand),
                })
                .at(self.span_from(operand_start))
            } else {
                self.binary(next)?
            };
            lhs = Expression::binary(lhs, op, rhs).at(self.span_from(start));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expression> {
        let start = self.start();
        let (op, operand_precedence) = match self.peek() {
            Some(Token::Minus) => (UnaryOp::Minus, 10),
            Some(Token::Plus) => (UnaryOp::Plus, 10),
            Some(Token::Tilde) => (UnaryOp::BitNot, 10),
            Some(Token::Not) => (UnaryOp::Not, 6),
            _ => return self.primary(),
        };
        self.advance();
        let operand = self.binary(operand_precedence)?;
        Ok(Expression::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
        .at(self.span_from(start)))
    }

    fn primary(&mut self) -> Result<Expression> {
        let start = self.start();
        let kind = match self.peek().cloned() {
            Some(Token::Integer(value)) => {
                self.advance();
                self.numeric(Literal::Integer(value))?
            }
            Some(Token::Float(value)) => {
                self.advance();
                self.numeric(Literal::Real(value))?
            }
            Some(Token::Inf) => {
                self.advance();
                ExprKind::Literal(Literal::Inf)
            }
            Some(Token::True) => {
                self.advance();
                ExprKind::Literal(Literal::Boolean(true))
            }
            Some(Token::False) => {
                self.advance();
                ExprKind::Literal(Literal::Boolean(false))
            }
            Some(Token::Str(value)) => {
                self.advance();
                ExprKind::Literal(Literal::String(value))
            }
            Some(Token::LParen) => {
                self.advance();
                self.paren_depth += 1;
                let inner = self.expression();
                let close = inner.and_then(|inner| {
                    self.expect(Token::RParen)?;
                    Ok(inner)
                });
                self.paren_depth -= 1;
                ExprKind::Paren(Box::new(close?))
            }
            Some(Token::Ident(_)) => {
                if self.peek_at(1) == Some(&Token::LParen) {
                    ExprKind::FunctionCall(self.function_call()?)
                } else {
                    ExprKind::Variable(self.variable()?)
                }
            }
            _ => return Err(self.error("expected expression")),
        };
        Ok(Expression::new(kind).at(self.span_from(start)))
    }

    /// A numeric literal, optionally followed by a unit: `10 mV`.
    fn numeric(&mut self, value: Literal) -> Result<ExprKind> {
        if let Some((Token::Ident(_), _)) = self.tokens.get(self.pos) {
            let unit = self.variable()?;
            return Ok(ExprKind::UnitLiteral { value, unit });
        }
        Ok(ExprKind::Literal(value))
    }

    fn variable(&mut self) -> Result<Variable> {
        let start = self.start();
        let name = self.expect_ident()?;
        let mut order = 0;
        while matches!(self.tokens.get(self.pos), Some((Token::Tick, _))) {
            self.advance();
            order += 1;
        }
        Ok(Variable::new(name, order).at(self.span_from(start)))
    }

    fn function_call(&mut self) -> Result<FunctionCall> {
        let start = self.start();
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;
        self.paren_depth += 1;
        let args = self.arguments();
        self.paren_depth -= 1;
        let args = args?;
        let mut call = FunctionCall::new(name, args);
        call.position = self.span_from(start);
        Ok(call)
    }

    fn arguments(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn data_type(&mut self) -> Result<DataType> {
        let primitive = match self.peek() {
            Some(Token::IntegerType) => Some(DataType::Integer),
            Some(Token::RealType) => Some(DataType::Real),
            Some(Token::BooleanType) => Some(DataType::Boolean),
            Some(Token::StringType) => Some(DataType::String),
            Some(Token::VoidType) => Some(DataType::Void),
            _ => None,
        };
        if let Some(primitive) = primitive {
            self.advance();
            return Ok(primitive);
        }
        Ok(DataType::Unit(self.unit_expr()?))
    }

    fn unit_expr(&mut self) -> Result<UnitExpr> {
        let mut lhs = self.unit_power()?;
        loop {
            if self.eat(&Token::Star) {
                lhs = UnitExpr::Mul(Box::new(lhs), Box::new(self.unit_power()?));
            } else if self.eat(&Token::Slash) {
                lhs = UnitExpr::Div(Box::new(lhs), Box::new(self.unit_power()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unit_power(&mut self) -> Result<UnitExpr> {
        let base = self.unit_factor()?;
        if self.eat(&Token::StarStar) {
            let negative = self.eat(&Token::Minus);
            match self.advance() {
                Some(Token::Integer(exponent)) => {
                    let exponent = i32::try_from(exponent)
                        .map_err(|_| self.error("unit exponent out of range"))?;
                    let exponent = if negative { -exponent } else { exponent };
                    return Ok(UnitExpr::Pow(Box::new(base), exponent));
                }
                _ => return Err(self.error("expected integer unit exponent")),
            }
        }
        Ok(base)
    }

    fn unit_factor(&mut self) -> Result<UnitExpr> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(UnitExpr::Name(name))
            }
            Some(Token::Integer(1)) => {
                self.advance();
                Ok(UnitExpr::One)
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.unit_expr()?;
                self.expect(Token::RParen)?;
                Ok(UnitExpr::Paren(Box::new(inner)))
            }
            _ => Err(self.error("expected data type")),
        }
    }

    // =========================================================================
    // Declarations and statements
    // =========================================================================

    fn declaration(&mut self) -> Result<Declaration> {
        let start = self.start();
        let is_recordable = self.eat(&Token::Recordable);
        let is_function = self.eat(&Token::Function);
        let mut variables = vec![self.variable()?];
        while self.eat(&Token::Comma) {
            variables.push(self.variable()?);
        }
        let data_type = self.data_type()?;
        let mut size_parameter = None;
        if self.check(&Token::LBracket) && self.peek_at(1) != Some(&Token::LBracket) {
            self.advance();
            size_parameter = Some(self.expect_ident()?);
            self.expect(Token::RBracket)?;
        }
        let expression = if self.eat(&Token::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        let mut invariant = None;
        if self.check(&Token::LBracket) && self.peek_at(1) == Some(&Token::LBracket) {
            self.advance();
            self.advance();
            invariant = Some(self.expression()?);
            self.expect(Token::RBracket)?;
            self.expect(Token::RBracket)?;
        }
        Ok(Declaration {
            is_recordable,
            is_function,
            variables,
            data_type,
            size_parameter,
            expression,
            invariant,
            position: self.span_from(start),
        })
    }

    fn assign_op(&mut self) -> Option<AssignOp> {
        let op = match self.peek()? {
            Token::Assign => AssignOp::Assign,
            Token::PlusAssign => AssignOp::AddAssign,
            Token::MinusAssign => AssignOp::SubAssign,
            Token::StarAssign => AssignOp::MulAssign,
            Token::SlashAssign => AssignOp::DivAssign,
            _ => return None,
        };
        Some(op)
    }

    fn assignment(&mut self) -> Result<Assignment> {
        let start = self.start();
        let lhs = self.variable()?;
        let op = self
            .assign_op()
            .ok_or_else(|| self.error("expected assignment operator"))?;
        self.advance();
        let rhs = self.expression()?;
        Ok(Assignment {
            lhs,
            op,
            rhs,
            position: self.span_from(start),
        })
    }

    /// Whether the tokens at the cursor form `name'* <assign-op>`.
    fn at_assignment(&self) -> bool {
        let mut offset = 1;
        while self.peek_at(offset) == Some(&Token::Tick) {
            offset += 1;
        }
        matches!(
            self.peek_at(offset),
            Some(
                Token::Assign
                    | Token::PlusAssign
                    | Token::MinusAssign
                    | Token::StarAssign
                    | Token::SlashAssign
            )
        )
    }

    fn statement(&mut self) -> Result<Statement> {
        let start = self.start();
        match self.peek().cloned() {
            Some(Token::If) => self.if_statement(start),
            Some(Token::For) => self.for_statement(start),
            Some(Token::While) => {
                self.advance();
                let condition = self.expression()?;
                self.expect(Token::Colon)?;
                let body = self.block()?;
                self.expect(Token::End)?;
                Ok(Statement::While {
                    condition,
                    body,
                    position: self.span_from(start),
                })
            }
            Some(Token::Return) => {
                self.advance();
                let value = match self.peek() {
                    None | Some(Token::Newline | Token::Semicolon | Token::End) => None,
                    _ => Some(self.expression()?),
                };
                Ok(Statement::Return {
                    value,
                    position: self.span_from(start),
                })
            }
            Some(Token::Ident(_)) if self.peek_at(1) == Some(&Token::LParen) => {
                Ok(Statement::Call(self.function_call()?))
            }
            Some(Token::Ident(_)) if self.at_assignment() => {
                Ok(Statement::Assignment(self.assignment()?))
            }
            Some(Token::Ident(_) | Token::Recordable | Token::Function) => {
                Ok(Statement::Declaration(self.declaration()?))
            }
            _ => Err(self.error("expected statement")),
        }
    }

    fn if_statement(&mut self, start: usize) -> Result<Statement> {
        let mut branches = Vec::new();
        self.expect(Token::If)?;
        let condition = self.expression()?;
        self.expect(Token::Colon)?;
        let body = self.block()?;
        branches.push(ConditionalBlock { condition, body });
        while self.eat(&Token::Elif) {
            let condition = self.expression()?;
            self.expect(Token::Colon)?;
            let body = self.block()?;
            branches.push(ConditionalBlock { condition, body });
        }
        let else_block = if self.eat(&Token::Else) {
            self.expect(Token::Colon)?;
            Some(self.block()?)
        } else {
            None
        };
        self.expect(Token::End)?;
        Ok(Statement::If {
            branches,
            else_block,
            position: self.span_from(start),
        })
    }

    fn for_statement(&mut self, start: usize) -> Result<Statement> {
        self.expect(Token::For)?;
        let variable = self.variable()?;
        self.expect(Token::In)?;
        let from = self.expression()?;
        self.expect(Token::Ellipsis)?;
        let to = self.expression()?;
        let mut step = 1.0;
        if self.eat(&Token::Step) {
            let negative = self.eat(&Token::Minus);
            step = match self.advance() {
                Some(Token::Integer(value)) => value as f64,
                Some(Token::Float(value)) => value,
                _ => return Err(self.error("expected numeric step")),
            };
            if negative {
                step = -step;
            }
        }
        self.expect(Token::Colon)?;
        let body = self.block()?;
        self.expect(Token::End)?;
        Ok(Statement::For {
            variable,
            from,
            to,
            step,
            body,
            position: self.span_from(start),
        })
    }

    /// Statements up to `end`, `elif`, `else` or end of input.
    fn block(&mut self) -> Result<Block> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None | Some(Token::End | Token::Elif | Token::Else) => break,
                _ => statements.push(self.statement()?),
            }
        }
        Ok(Block { statements })
    }

    // =========================================================================
    // Equations and input
    // =========================================================================

    fn equation(&mut self) -> Result<EquationDecl> {
        let start = self.start();
        if self.eat(&Token::Shape) {
            let lhs = self.variable()?;
            self.expect(Token::Assign)?;
            let rhs = self.expression()?;
            return Ok(EquationDecl::Shape(OdeShape {
                lhs,
                rhs,
                position: self.span_from(start),
            }));
        }
        if matches!(self.peek(), Some(Token::Recordable | Token::Function)) {
            let is_recordable = self.eat(&Token::Recordable);
            self.expect(Token::Function)?;
            let name = self.expect_ident()?;
            let data_type = self.data_type()?;
            self.expect(Token::Assign)?;
            let expression = self.expression()?;
            return Ok(EquationDecl::Function(OdeFunction {
                is_recordable,
                name,
                data_type,
                expression,
                position: self.span_from(start),
            }));
        }
        let lhs = self.variable()?;
        self.expect(Token::Assign)?;
        let rhs = self.expression()?;
        Ok(EquationDecl::Ode(OdeEquation {
            lhs,
            rhs,
            position: self.span_from(start),
        }))
    }

    fn input_line(&mut self) -> Result<InputLine> {
        let start = self.start();
        let name = self.expect_ident()?;
        let mut size_parameter = None;
        if self.eat(&Token::LBracket) {
            size_parameter = Some(self.expect_ident()?);
            self.expect(Token::RBracket)?;
        }
        let data_type = if self.check(&Token::LArrow) {
            None
        } else {
            Some(self.data_type()?)
        };
        self.expect(Token::LArrow)?;
        let mut qualifiers = Vec::new();
        let kind = loop {
            match self.expect_ident()?.as_str() {
                "inhibitory" => qualifiers.push(InputQualifier::Inhibitory),
                "excitatory" => qualifiers.push(InputQualifier::Excitatory),
                "spike" => break InputKind::Spike,
                "current" => break InputKind::Current,
                other => {
                    return Err(self.error(format!("unknown input kind '{}'", other)));
                }
            }
        };
        Ok(InputLine {
            name,
            size_parameter,
            data_type,
            qualifiers,
            kind,
            position: self.span_from(start),
        })
    }
}
