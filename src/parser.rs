//! Recursive-descent parser with single-token lookahead.
//!
//! Mirrors the simplified Python expression precedence chain
//! (`test` → `or_test` → `and_test` → `not_test` → `comparison` →
//! `arith_expr` → `term` → `factor` → `power` → `atom_expr` → `atom`).
//! On a fault the parser synchronizes to the next statement head and
//! keeps scanning so a chunk reports one merged diagnostic.

use thiserror::Error;

use crate::ast::{
    BinaryOp, BoolOpKind, CompareOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp,
};
use crate::token::{Span, Token, TokenKind};

pub mod ast;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    ExpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("expected an expression, found {found}")]
    ExpectedExpression { found: String, span: Span },
    #[error("'if' block must be followed by an 'elif' or 'else' block")]
    MissingElseBlock { span: Span },
    #[error("{message}")]
    Merged { message: String, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::ExpectedToken { span, .. }
            | ParseError::ExpectedExpression { span, .. }
            | ParseError::MissingElseBlock { span }
            | ParseError::Merged { span, .. } => *span,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParseError::MissingElseBlock { .. } => "NoElseBlockError",
            _ => "ParserError",
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::EndMarker, Span::default()));
        }
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let start = self.current().span;
        let mut statements = Vec::new();
        let mut errors: Vec<ParseError> = Vec::new();

        loop {
            match self.peek_kind() {
                TokenKind::EndMarker => break,
                TokenKind::Newline | TokenKind::Dedent => {
                    self.advance();
                }
                _ => match self.parse_statement() {
                    Ok(stmt) => statements.push(stmt),
                    Err(error) => {
                        errors.push(error);
                        self.synchronize();
                    }
                },
            }
        }

        if errors.len() == 1 {
            return Err(errors.remove(0));
        }
        if let Some(first) = errors.first() {
            let span = first.span();
            let message = errors
                .iter()
                .map(|error| error.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ParseError::Merged { message, span });
        }

        let end = self.current().span;
        Ok(Program {
            statements,
            span: start.merge(end),
        })
    }

    /// Discards tokens up to the next statement boundary so that one
    /// chunk can report every fault in a single pass.
    fn synchronize(&mut self) {
        if !matches!(self.peek_kind(), TokenKind::EndMarker) {
            self.advance();
        }
        loop {
            match self.peek_kind() {
                TokenKind::EndMarker
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Def
                | TokenKind::If
                | TokenKind::Elif
                | TokenKind::Else
                | TokenKind::Return => return,
                TokenKind::Newline => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.peek_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Def => self.parse_function_def(),
            _ => self.parse_simple_statement(),
        }
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        let stmt = match self.peek_kind() {
            TokenKind::Pass => {
                self.advance();
                Stmt::new(StmtKind::Pass, start)
            }
            TokenKind::Break => {
                self.advance();
                Stmt::new(StmtKind::Break, start)
            }
            TokenKind::Continue => {
                self.advance();
                Stmt::new(StmtKind::Continue, start)
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    Stmt::new(StmtKind::Return(None), start)
                } else {
                    let value = self.parse_test()?;
                    let span = start.merge(value.span);
                    Stmt::new(StmtKind::Return(Some(value)), span)
                }
            }
            TokenKind::From => self.parse_from_import()?,
            TokenKind::Global => {
                self.advance();
                let (name, span) = self.expect_name()?;
                Stmt::new(StmtKind::Global(name), start.merge(span))
            }
            TokenKind::Nonlocal => {
                self.advance();
                let (name, span) = self.expect_name()?;
                Stmt::new(StmtKind::NonLocal(name), start.merge(span))
            }
            TokenKind::Assert => {
                self.advance();
                let value = self.parse_test()?;
                let span = start.merge(value.span);
                Stmt::new(StmtKind::Assert(value), span)
            }
            TokenKind::Name(_) if matches!(self.next_kind(), TokenKind::Assign) => {
                let (name, _) = self.expect_name()?;
                self.expect(TokenKind::Assign, "'='")?;
                let value = self.parse_test()?;
                let span = start.merge(value.span);
                Stmt::new(StmtKind::Assign { name, value }, span)
            }
            TokenKind::Name(_) if matches!(self.next_kind(), TokenKind::Colon) => {
                let (name, _) = self.expect_name()?;
                self.expect(TokenKind::Colon, "':'")?;
                let annotation = self.parse_test()?;
                self.expect(TokenKind::Assign, "'='")?;
                let value = self.parse_test()?;
                let span = start.merge(value.span);
                Stmt::new(
                    StmtKind::AnnAssign {
                        name,
                        annotation,
                        value,
                    },
                    span,
                )
            }
            _ => {
                let value = self.parse_test()?;
                let span = value.span;
                Stmt::new(StmtKind::Expr(value), span)
            }
        };
        self.expect_statement_end()?;
        Ok(stmt)
    }

    fn parse_from_import(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span;
        self.expect(TokenKind::From, "'from'")?;
        let (module, _) = self.expect_name()?;
        self.expect(TokenKind::Import, "'import'")?;
        let mut names = Vec::new();
        let (first, mut last_span) = self.expect_name()?;
        names.push(first);
        while matches!(self.peek_kind(), TokenKind::Comma) {
            self.advance();
            let (name, span) = self.expect_name()?;
            names.push(name);
            last_span = span;
        }
        Ok(Stmt::new(
            StmtKind::FromImport { module, names },
            start.merge(last_span),
        ))
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        // Entered on `if` or, recursively, on `elif`.
        let keyword = self.advance();
        let condition = self.parse_test()?;
        let body = self.parse_block()?;

        let orelse = match self.peek_kind() {
            TokenKind::Elif => vec![self.parse_if()?],
            TokenKind::Else => {
                self.advance();
                self.parse_block()?
            }
            _ => {
                return Err(ParseError::MissingElseBlock { span: keyword.span });
            }
        };

        let end = orelse.last().map(|stmt| stmt.span).unwrap_or(keyword.span);
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                body,
                orelse,
            },
            keyword.span.merge(end),
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let condition = self.parse_test()?;
        let body = self.parse_block()?;
        let end = body.last().map(|stmt| stmt.span).unwrap_or(keyword.span);
        Ok(Stmt::new(
            StmtKind::While { condition, body },
            keyword.span.merge(end),
        ))
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let (target, _) = self.expect_name()?;
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.parse_test()?;
        let body = self.parse_block()?;
        let end = body.last().map(|stmt| stmt.span).unwrap_or(keyword.span);
        Ok(Stmt::new(
            StmtKind::For {
                target,
                iterable,
                body,
            },
            keyword.span.merge(end),
        ))
    }

    fn parse_function_def(&mut self) -> ParseResult<Stmt> {
        let keyword = self.advance();
        let (name, _) = self.expect_name()?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::RParen) {
            let (param, _) = self.expect_name()?;
            params.push(param);
            while matches!(self.peek_kind(), TokenKind::Comma) {
                self.advance();
                let (param, _) = self.expect_name()?;
                params.push(param);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        let end = body.last().map(|stmt| stmt.span).unwrap_or(keyword.span);
        Ok(Stmt::new(
            StmtKind::FunctionDef { name, params, body },
            keyword.span.merge(end),
        ))
    }

    /// `':' NEWLINE INDENT stmt+ DEDENT`
    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon, "':'")?;
        self.expect(TokenKind::Newline, "end of line")?;
        self.expect(TokenKind::Indent, "an indented block")?;

        let mut statements = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Dedent | TokenKind::EndMarker => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
        if statements.is_empty() {
            return Err(self.expected("a statement"));
        }
        self.expect(TokenKind::Dedent, "end of block")?;
        Ok(statements)
    }

    fn parse_test(&mut self) -> ParseResult<Expr> {
        if matches!(self.peek_kind(), TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let consequent = self.parse_or_test()?;
        if matches!(self.peek_kind(), TokenKind::If) {
            self.advance();
            let predicate = self.parse_or_test()?;
            self.expect(TokenKind::Else, "'else'")?;
            let alternative = self.parse_test()?;
            let span = consequent.span.merge(alternative.span);
            return Ok(Expr::new(
                ExprKind::Ternary {
                    predicate: Box::new(predicate),
                    consequent: Box::new(consequent),
                    alternative: Box::new(alternative),
                },
                span,
            ));
        }
        Ok(consequent)
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let keyword = self.advance();
        let mut params = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::Colon) {
            let (param, _) = self.expect_name()?;
            params.push(param);
            while matches!(self.peek_kind(), TokenKind::Comma) {
                self.advance();
                let (param, _) = self.expect_name()?;
                params.push(param);
            }
        }
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_test()?;
        let span = keyword.span.merge(body.span);
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_or_test(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_and_test()?;
        while matches!(self.peek_kind(), TokenKind::Or) {
            let op_span = self.advance().span;
            let right = self.parse_and_test()?;
            let span = expr.span.merge(right.span);
            expr = Expr::new(
                ExprKind::BoolOp {
                    left: Box::new(expr),
                    op: BoolOpKind::Or,
                    op_span,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_and_test(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_not_test()?;
        while matches!(self.peek_kind(), TokenKind::And) {
            let op_span = self.advance().span;
            let right = self.parse_not_test()?;
            let span = expr.span.merge(right.span);
            expr = Expr::new(
                ExprKind::BoolOp {
                    left: Box::new(expr),
                    op: BoolOpKind::And,
                    op_span,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_not_test(&mut self) -> ParseResult<Expr> {
        if matches!(self.peek_kind(), TokenKind::Not | TokenKind::Bang) {
            let op_span = self.advance().span;
            let operand = self.parse_not_test()?;
            let span = op_span.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    op_span,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_arith()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Less => CompareOp::Lt,
                TokenKind::Greater => CompareOp::Gt,
                TokenKind::LessEqual => CompareOp::LtE,
                TokenKind::GreaterEqual => CompareOp::GtE,
                TokenKind::EqEqual => CompareOp::Eq,
                TokenKind::NotEqual => CompareOp::NotEq,
                TokenKind::Is => CompareOp::Is,
                TokenKind::IsNot => CompareOp::IsNot,
                TokenKind::In => CompareOp::In,
                TokenKind::NotIn => CompareOp::NotIn,
                _ => break,
            };
            let op_span = self.advance().span;
            let right = self.parse_arith()?;
            let span = expr.span.merge(right.span);
            expr = Expr::new(
                ExprKind::Compare {
                    left: Box::new(expr),
                    op,
                    op_span,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let op_span = self.advance().span;
            let right = self.parse_term()?;
            let span = expr.span.merge(right.span);
            expr = Expr::new(
                ExprKind::Binary {
                    left: Box::new(expr),
                    op,
                    op_span,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                _ => break,
            };
            let op_span = self.advance().span;
            let right = self.parse_factor()?;
            let span = expr.span.merge(right.span);
            expr = Expr::new(
                ExprKind::Binary {
                    left: Box::new(expr),
                    op,
                    op_span,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Minus => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            let op_span = self.advance().span;
            let operand = self.parse_factor()?;
            let span = op_span.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    op_span,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_atom_expr()?;
        if matches!(self.peek_kind(), TokenKind::DoubleStar) {
            let op_span = self.advance().span;
            let exponent = self.parse_factor()?;
            let span = base.span.merge(exponent.span);
            return Ok(Expr::new(
                ExprKind::Binary {
                    left: Box::new(base),
                    op: BinaryOp::Pow,
                    op_span,
                    right: Box::new(exponent),
                },
                span,
            ));
        }
        Ok(base)
    }

    fn parse_atom_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;
        // Chained calls `f()()` associate left by looping here.
        while matches!(self.peek_kind(), TokenKind::LParen) {
            self.advance();
            let mut args = Vec::new();
            if !matches!(self.peek_kind(), TokenKind::RParen) {
                args.push(self.parse_test()?);
                while matches!(self.peek_kind(), TokenKind::Comma) {
                    self.advance();
                    args.push(self.parse_test()?);
                }
            }
            let rparen = self.current().span;
            self.expect(TokenKind::RParen, "')'")?;
            let span = expr.span.merge(rparen);
            expr = Expr::new(
                ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        let kind = match token.kind {
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::None => ExprKind::None,
            TokenKind::Number(value) => ExprKind::Number(value),
            TokenKind::BigInt(ref lexeme) => ExprKind::BigInt(lexeme.clone()),
            TokenKind::Complex(imag) => ExprKind::Complex { real: 0.0, imag },
            TokenKind::Str(ref value) => ExprKind::Str(value.clone()),
            TokenKind::Name(ref name) => ExprKind::Name(name.clone()),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_test()?;
                let rparen = self.current().span;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(Expr::new(
                    ExprKind::Grouping(Box::new(inner)),
                    token.span.merge(rparen),
                ));
            }
            ref other => {
                return Err(ParseError::ExpectedExpression {
                    found: other.describe(),
                    span: token.span,
                });
            }
        };
        self.advance();
        Ok(Expr::new(kind, token.span))
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Dedent | TokenKind::EndMarker
        )
    }

    fn expect_statement_end(&mut self) -> ParseResult<()> {
        match self.peek_kind() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Dedent | TokenKind::EndMarker => Ok(()),
            _ => Err(self.expected("end of line")),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.current().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.expected(what))
        }
    }

    fn expect_name(&mut self) -> ParseResult<(String, Span)> {
        if let TokenKind::Name(name) = &self.current().kind {
            let name = name.clone();
            let span = self.current().span;
            self.advance();
            Ok((name, span))
        } else {
            Err(self.expected("a name"))
        }
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn next_kind(&self) -> &TokenKind {
        &self
            .tokens
            .get(self.pos + 1)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
            .kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expected(&self, what: &str) -> ParseError {
        ParseError::ExpectedToken {
            expected: what.to_string(),
            found: self.current().kind.describe(),
            span: self.current().span,
        }
    }
}

pub fn parse_tokens(tokens: Vec<Token>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

/// Tokenizes and parses in one step. Used by tests and benches; the
/// evaluator drives the two stages separately for error reporting.
pub fn parse_source(source: &str) -> anyhow::Result<Program> {
    let tokens = crate::lexer::tokenize(source)?;
    Ok(parse_tokens(tokens)?)
}
