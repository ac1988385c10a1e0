//! Hand-written tokenizer with significant indentation.
//!
//! Produces the token stream consumed by the parser, including the
//! synthetic Newline/Indent/Dedent layout tokens that encode Python's
//! whitespace-sensitive block structure. Indentation must move in steps
//! of four spaces; one Indent/Dedent token is emitted per step.

use thiserror::Error;

use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenizerError {
    #[error("unexpected character '{character}'")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("unsupported escape sequence '\\{character}'")]
    UnrecognizedEscape { character: char, span: Span },
    #[error("invalid number literal '{literal}'")]
    InvalidNumber { literal: String, span: Span },
    #[error("indent must be a multiple of 4, got {width} spaces")]
    IndentNotMultipleOfFour { width: usize, span: Span },
    #[error("dedent to {width} spaces does not match any outer indentation level")]
    InconsistentDedent { width: usize, span: Span },
    #[error("'{name}' is reserved and not part of this language subset")]
    ForbiddenIdentifier { name: String, span: Span },
    #[error("operator '{operator}' is not part of this language subset")]
    ForbiddenOperator { operator: String, span: Span },
    #[error("unmatched ')'")]
    UnmatchedCloseParen { span: Span },
}

impl TokenizerError {
    pub fn span(&self) -> Span {
        match self {
            TokenizerError::UnexpectedCharacter { span, .. }
            | TokenizerError::UnterminatedString { span }
            | TokenizerError::UnrecognizedEscape { span, .. }
            | TokenizerError::InvalidNumber { span, .. }
            | TokenizerError::IndentNotMultipleOfFour { span, .. }
            | TokenizerError::InconsistentDedent { span, .. }
            | TokenizerError::ForbiddenIdentifier { span, .. }
            | TokenizerError::ForbiddenOperator { span, .. }
            | TokenizerError::UnmatchedCloseParen { span } => *span,
        }
    }

    /// Diagnostic heading for the snippet renderer.
    pub fn name(&self) -> &'static str {
        match self {
            TokenizerError::UnterminatedString { .. } => "UnterminatedStringError",
            TokenizerError::ForbiddenIdentifier { .. } => "ForbiddenIdentifierError",
            TokenizerError::ForbiddenOperator { .. } => "ForbiddenOperatorError",
            _ => "TokenizerError",
        }
    }
}

pub type TokenizeResult<T> = Result<T, TokenizerError>;

const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "async", "await", "yield", "with", "del", "try", "except", "finally", "raise",
];

pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    paren_depth: usize,
    pending: Vec<Token>,
    at_line_start: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            paren_depth: 0,
            pending: Vec::new(),
            at_line_start: true,
        }
    }

    pub fn next_token(&mut self) -> TokenizeResult<Token> {
        loop {
            if let Some(token) = self.pending.pop() {
                return Ok(token);
            }

            if self.at_line_start && self.paren_depth == 0 {
                self.at_line_start = false;
                self.handle_line_start()?;
                continue;
            }

            self.consume_while(|c| c == ' ');

            let Some(ch) = self.peek_char() else {
                return self.handle_eof();
            };

            match ch {
                '\n' => {
                    let span = self.span_here(1);
                    self.consume_char();
                    if self.paren_depth > 0 {
                        // Line continuation inside parentheses.
                        continue;
                    }
                    self.at_line_start = true;
                    return Ok(Token::new(TokenKind::Newline, span));
                }
                '#' => {
                    self.consume_while(|c| c != '\n');
                    continue;
                }
                '"' | '\'' => return self.read_string(),
                c if c.is_ascii_digit() => return self.read_number(),
                c if c.is_alphabetic() || c == '_' => return self.read_identifier(),
                _ => return self.read_operator(),
            }
        }
    }

    /// Consumes blank lines and comment-only lines, then reconciles the
    /// first real line's indentation against the indent stack.
    fn handle_line_start(&mut self) -> TokenizeResult<()> {
        loop {
            let indent_start = self.pos;
            let indent_line = self.line;
            let width = self.consume_while(|c| c == ' ');

            match self.peek_char() {
                Some('\n') => {
                    self.consume_char();
                    continue;
                }
                Some('#') => {
                    self.consume_while(|c| c != '\n');
                    if self.peek_char().is_some() {
                        self.consume_char();
                    }
                    continue;
                }
                None => return Ok(()),
                _ => {
                    let span = Span::new(indent_start, self.pos, indent_line, 1);
                    return self.reconcile_indentation(width, span);
                }
            }
        }
    }

    fn reconcile_indentation(&mut self, width: usize, span: Span) -> TokenizeResult<()> {
        if width % 4 != 0 {
            return Err(TokenizerError::IndentNotMultipleOfFour { width, span });
        }

        let top = self.current_indent();
        if width > top {
            self.indent_stack.push(width);
            for _ in 0..(width - top) / 4 {
                self.pending.push(Token::new(TokenKind::Indent, span));
            }
        } else if width < top {
            while self.current_indent() > width {
                self.indent_stack.pop();
            }
            if self.current_indent() != width {
                return Err(TokenizerError::InconsistentDedent { width, span });
            }
            for _ in 0..(top - width) / 4 {
                self.pending.push(Token::new(TokenKind::Dedent, span));
            }
        }
        Ok(())
    }

    fn handle_eof(&mut self) -> TokenizeResult<Token> {
        // Close any open blocks before the end marker.
        while self.indent_stack.len() > 1 {
            let top = self.indent_stack.pop().unwrap_or(0);
            let below = self.current_indent();
            for _ in 0..(top - below) / 4 {
                self.pending.push(Token::new(TokenKind::Dedent, self.span_here(0)));
            }
        }
        if let Some(token) = self.pending.pop() {
            return Ok(token);
        }
        Ok(Token::new(TokenKind::EndMarker, self.span_here(0)))
    }

    fn read_number(&mut self) -> TokenizeResult<Token> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;

        if self.rest().starts_with("0x")
            || self.rest().starts_with("0X")
            || self.rest().starts_with("0o")
            || self.rest().starts_with("0O")
            || self.rest().starts_with("0b")
            || self.rest().starts_with("0B")
        {
            self.consume_char();
            let radix_char = self.consume_char().unwrap_or('x');
            let radix = match radix_char.to_ascii_lowercase() {
                'x' => 16,
                'o' => 8,
                _ => 2,
            };
            let digits = self.read_digits(radix, start, line, column)?;
            if digits.is_empty() {
                return Err(self.invalid_number(start, line, column));
            }
            let span = Span::new(start, self.pos, line, column);
            let lexeme = format!("0{}{}", radix_char.to_ascii_lowercase(), digits);
            return Ok(Token::new(TokenKind::BigInt(lexeme), span));
        }

        let mut text = self.read_digits(10, start, line, column)?;
        let mut is_float = false;

        if self.peek_char() == Some('.') {
            self.consume_char();
            is_float = true;
            text.push('.');
            if self.peek_char() == Some('_') {
                return Err(self.invalid_number(start, line, column));
            }
            let fraction = self.read_digits(10, start, line, column)?;
            if fraction.is_empty() {
                // "1." is a valid float literal; normalize for parsing.
                text.push('0');
            } else {
                text.push_str(&fraction);
            }
        }

        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let has_exponent = match self.peek_char_at(1) {
                Some(c) if c.is_ascii_digit() => true,
                Some('+') | Some('-') => {
                    matches!(self.peek_char_at(2), Some(c) if c.is_ascii_digit())
                }
                _ => false,
            };
            if has_exponent {
                self.consume_char();
                is_float = true;
                text.push('e');
                if matches!(self.peek_char(), Some('+') | Some('-')) {
                    let sign = self.consume_char().unwrap_or('+');
                    text.push(sign);
                }
                let exponent = self.read_digits(10, start, line, column)?;
                text.push_str(&exponent);
            }
        }

        if matches!(self.peek_char(), Some('j') | Some('J')) {
            self.consume_char();
            let span = Span::new(start, self.pos, line, column);
            let value = text
                .parse::<f64>()
                .map_err(|_| self.invalid_number(start, line, column))?;
            return Ok(Token::new(TokenKind::Complex(value), span));
        }

        let span = Span::new(start, self.pos, line, column);
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.invalid_number(start, line, column))?;
            Ok(Token::new(TokenKind::Number(value), span))
        } else {
            Ok(Token::new(TokenKind::BigInt(text), span))
        }
    }

    /// Reads a run of digits in the given radix, allowing underscores
    /// strictly between digits. Returns the digits with underscores
    /// removed.
    fn read_digits(
        &mut self,
        radix: u32,
        start: usize,
        line: usize,
        column: usize,
    ) -> TokenizeResult<String> {
        let mut digits = String::new();
        let mut last_was_underscore = false;
        while let Some(c) = self.peek_char() {
            if c == '_' {
                if digits.is_empty() || last_was_underscore {
                    return Err(self.invalid_number(start, line, column));
                }
                last_was_underscore = true;
                self.consume_char();
            } else if c.is_digit(radix) {
                last_was_underscore = false;
                digits.push(c);
                self.consume_char();
            } else {
                break;
            }
        }
        if last_was_underscore {
            return Err(self.invalid_number(start, line, column));
        }
        Ok(digits)
    }

    fn invalid_number(&self, start: usize, line: usize, column: usize) -> TokenizerError {
        TokenizerError::InvalidNumber {
            literal: self.input[start..self.pos].to_string(),
            span: Span::new(start, self.pos, line, column),
        }
    }

    fn read_string(&mut self) -> TokenizeResult<Token> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let quote = self.consume_char().unwrap_or('"');
        let triple_delim = if quote == '"' { "\"\"\"" } else { "'''" };
        let triple = self.rest().starts_with(&triple_delim[..2]);
        if triple {
            self.consume_char();
            self.consume_char();
        }

        let mut content = String::new();
        loop {
            if triple && self.rest().starts_with(triple_delim) {
                self.consume_char();
                self.consume_char();
                self.consume_char();
                break;
            }
            match self.peek_char() {
                None => {
                    return Err(TokenizerError::UnterminatedString {
                        span: Span::new(start, self.pos, line, column),
                    });
                }
                Some('\n') if !triple => {
                    return Err(TokenizerError::UnterminatedString {
                        span: Span::new(start, self.pos, line, column),
                    });
                }
                Some(c) if c == quote && !triple => {
                    self.consume_char();
                    break;
                }
                Some('\\') => {
                    let escape_start = self.pos;
                    let escape_line = self.line;
                    let escape_column = self.column;
                    self.consume_char();
                    let Some(escaped) = self.consume_char() else {
                        return Err(TokenizerError::UnterminatedString {
                            span: Span::new(start, self.pos, line, column),
                        });
                    };
                    match escaped {
                        '\\' => content.push('\\'),
                        '\'' => content.push('\''),
                        '"' => content.push('"'),
                        'a' => content.push('\x07'),
                        'b' => content.push('\x08'),
                        'f' => content.push('\x0C'),
                        'n' => content.push('\n'),
                        'r' => content.push('\r'),
                        't' => content.push('\t'),
                        'v' => content.push('\x0B'),
                        '\n' => {}
                        other => {
                            return Err(TokenizerError::UnrecognizedEscape {
                                character: other,
                                span: Span::new(
                                    escape_start,
                                    self.pos,
                                    escape_line,
                                    escape_column,
                                ),
                            });
                        }
                    }
                }
                Some(c) => {
                    self.consume_char();
                    content.push(c);
                }
            }
        }

        let span = Span::new(start, self.pos, line, column);
        Ok(Token::new(TokenKind::Str(content), span))
    }

    fn read_identifier(&mut self) -> TokenizeResult<Token> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        self.consume_while(|c| c.is_alphanumeric() || c == '_');
        let span = Span::new(start, self.pos, line, column);
        let lexeme = &self.input[start..self.pos];

        if FORBIDDEN_KEYWORDS.contains(&lexeme) {
            return Err(TokenizerError::ForbiddenIdentifier {
                name: lexeme.to_string(),
                span,
            });
        }

        let kind = match lexeme {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "def" => TokenKind::Def,
            "lambda" => TokenKind::Lambda,
            "return" => TokenKind::Return,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "global" => TokenKind::Global,
            "nonlocal" => TokenKind::Nonlocal,
            "pass" => TokenKind::Pass,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "assert" => TokenKind::Assert,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => TokenKind::Name(lexeme.to_string()),
        };
        Ok(Token::new(kind, span))
    }

    fn read_operator(&mut self) -> TokenizeResult<Token> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let ch = self.consume_char().unwrap_or('\0');

        let forbidden = |tokenizer: &Self, operator: &str| TokenizerError::ForbiddenOperator {
            operator: operator.to_string(),
            span: Span::new(start, tokenizer.pos, line, column),
        };

        let kind = match ch {
            '=' => {
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    TokenKind::EqEqual
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    TokenKind::NotEqual
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '+' => {
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    return Err(forbidden(self, "+="));
                }
                TokenKind::Plus
            }
            '-' => {
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    return Err(forbidden(self, "-="));
                }
                TokenKind::Minus
            }
            '*' => {
                if self.peek_char() == Some('*') {
                    self.consume_char();
                    if self.peek_char() == Some('=') {
                        self.consume_char();
                        return Err(forbidden(self, "**="));
                    }
                    TokenKind::DoubleStar
                } else if self.peek_char() == Some('=') {
                    self.consume_char();
                    return Err(forbidden(self, "*="));
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.peek_char() == Some('/') {
                    self.consume_char();
                    if self.peek_char() == Some('=') {
                        self.consume_char();
                        return Err(forbidden(self, "//="));
                    }
                    TokenKind::DoubleSlash
                } else if self.peek_char() == Some('=') {
                    self.consume_char();
                    return Err(forbidden(self, "/="));
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    return Err(forbidden(self, "%="));
                }
                TokenKind::Percent
            }
            '(' => {
                self.paren_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                if self.paren_depth == 0 {
                    return Err(TokenizerError::UnmatchedCloseParen {
                        span: Span::new(start, self.pos, line, column),
                    });
                }
                self.paren_depth -= 1;
                TokenKind::RParen
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '@' | '|' | '&' | '~' | '^' => {
                let mut operator = ch.to_string();
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    operator.push('=');
                }
                return Err(forbidden(self, &operator));
            }
            other => {
                return Err(TokenizerError::UnexpectedCharacter {
                    character: other,
                    span: Span::new(start, self.pos, line, column),
                });
            }
        };

        Ok(Token::new(kind, Span::new(start, self.pos, line, column)))
    }

    fn consume_while<P>(&mut self, keep: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let mut count = 0;
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
            count += 1;
        }
        count
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn span_here(&self, width: usize) -> Span {
        Span::new(self.pos, self.pos + width, self.line, self.column)
    }
}

/// Tokenizes the whole input, applying the `is not` / `not in` keyword
/// fusions across adjacent tokens.
pub fn tokenize(input: &str) -> TokenizeResult<Vec<Token>> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens: Vec<Token> = Vec::new();
    loop {
        let token = tokenizer.next_token()?;
        let is_end = matches!(token.kind, TokenKind::EndMarker);
        match (&token.kind, tokens.last().map(|t| &t.kind)) {
            (TokenKind::Not, Some(TokenKind::Is)) => {
                if let Some(previous) = tokens.last_mut() {
                    previous.span = previous.span.merge(token.span);
                    previous.kind = TokenKind::IsNot;
                }
            }
            (TokenKind::In, Some(TokenKind::Not)) => {
                if let Some(previous) = tokens.last_mut() {
                    previous.span = previous.span.merge(token.span);
                    previous.kind = TokenKind::NotIn;
                }
            }
            _ => tokens.push(token),
        }
        if is_end {
            break;
        }
    }
    Ok(tokens)
}
