//! Formula parser
//!
//! Converts a sequence of tokens into an expression tree. Uses recursive
//! descent with operator precedence:
//!
//! ```text
//! comparison := additive (("=" | "<>" | "<" | ">" | "<=" | ">=") additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := ("-" | "+") unary | power
//! power      := postfix ("^" unary)?
//! postfix    := NAME "(" "x" (("+" | "-") INTEGER)? ")"
//!             | NAME "(" arguments? ")"
//!             | primary
//! ```

use super::tokenizer::{Spanned, Token};
use crate::types::CellValue;
use std::collections::BTreeSet;
use std::fmt;

/// Name of the row variable inside column references
const ROW_VARIABLE: &str = "x";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "^" => BinaryOp::Pow,
            "=" => BinaryOp::Eq,
            "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Formula expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value; `NULL` parses to `Literal(CellValue::Absent)`
    Literal(CellValue),
    /// `Name(x+offset)`; a bare `Name` is offset 0
    Column { name: String, offset: i64 },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call: NAME(arg1, arg2, ...)
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn number(n: f64) -> Self {
        Expr::Literal(CellValue::Number(n))
    }

    pub fn column(name: impl Into<String>, offset: i64) -> Self {
        Expr::Column {
            name: name.into(),
            offset,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    /// Every column name the expression reads, sorted
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column { name, .. } => {
                out.insert(name.as_str());
            }
            Expr::Unary { operand, .. } => operand.collect_columns(out),
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// True when the expression looks at any row other than the current one
    pub fn uses_offsets(&self) -> bool {
        match self {
            Expr::Literal(_) => false,
            Expr::Column { offset, .. } => *offset != 0,
            Expr::Unary { operand, .. } => operand.uses_offsets(),
            Expr::Binary { left, right, .. } => left.uses_offsets() || right.uses_offsets(),
            Expr::Call { args, .. } => args.iter().any(Expr::uses_offsets),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(CellValue::Absent) => f.write_str("NULL"),
            Expr::Literal(CellValue::Text(s)) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Column { name, offset } => {
                let name = if name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
                    name.clone()
                } else {
                    format!("`{}`", name)
                };
                match offset {
                    0 => write!(f, "{}(x)", name),
                    o if *o > 0 => write!(f, "{}(x+{})", name, o),
                    o => write!(f, "{}(x{})", name, o),
                }
            }
            Expr::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                };
                write!(f, "{}{}", symbol, operand)
            }
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    end_position: usize,
}

impl Parser {
    #[must_use]
    pub fn new(tokens: Vec<Spanned>) -> Self {
        let end_position = tokens.last().map_or(0, |t| t.position + 1);
        Self {
            tokens,
            index: 0,
            end_position,
        }
    }

    /// Parse the tokens into an expression tree
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.comparison()?;

        if let Some(token) = self.peek() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", token),
                self.position(),
            ));
        }

        Ok(expr)
    }

    /// Character position of the current token (or end of input)
    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map_or(self.end_position, |t| t.position)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|t| &t.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.index + ahead).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|t| t.token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    fn binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;

        while let Some(symbol) = self.match_any_operator(ops) {
            let right = next(self)?;
            let op = BinaryOp::from_symbol(&symbol)
                .ok_or_else(|| {
                    ParseError::new(format!("Unknown operator {}", symbol), self.position())
                })?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["=", "<>", "<", ">", "<=", ">="], Self::additive)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["+", "-"], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["*", "/"], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(symbol) = self.match_any_operator(&["-", "+"]) {
            let operand = self.unary()?;
            let op = if symbol == "-" {
                UnaryOp::Neg
            } else {
                UnaryOp::Plus
            };
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            })
        } else {
            self.power()
        }
    }

    /// Power is right-associative and binds tighter than unary minus on its
    /// left: `-2^2` is `-(2^2)`, `2^-1` is `2^(-1)`.
    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.postfix()?;

        if self.match_any_operator(&["^"]).is_some() {
            let exponent = self.unary()?;
            Ok(Expr::binary(BinaryOp::Pow, base, exponent))
        } else {
            Ok(base)
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let Some(Token::Identifier(name)) = self.peek().cloned() else {
            return self.primary();
        };
        let start = self.position();
        self.advance();

        if !self.match_token(&Token::OpenParen) {
            return Ok(Self::bare_identifier(name));
        }

        if self.at_row_variable() {
            let offset = self.row_offset()?;
            return Ok(Expr::Column { name, offset });
        }

        let args = self.arguments()?;
        if !self.match_token(&Token::CloseParen) {
            return Err(ParseError::new(
                format!("Expected ')' to close call to {} opened at {}", name, start),
                self.position(),
            ));
        }
        Ok(Expr::Call { name, args })
    }

    /// After `NAME(`, is the next thing the row variable `x`?
    fn at_row_variable(&self) -> bool {
        if !matches!(self.peek(), Some(Token::Identifier(v)) if v == ROW_VARIABLE) {
            return false;
        }
        match self.peek_at(1) {
            Some(Token::CloseParen) => true,
            Some(Token::Operator(op)) if op == "+" || op == "-" => {
                matches!(self.peek_at(2), Some(Token::Number(_)))
                    && matches!(self.peek_at(3), Some(Token::CloseParen))
            }
            _ => false,
        }
    }

    /// Parse `x`, `x+N` or `x-N` followed by `)`
    fn row_offset(&mut self) -> Result<i64, ParseError> {
        self.advance(); // 'x'

        let sign = match self.match_any_operator(&["+", "-"]) {
            None => {
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new("Expected ')' after x", self.position()));
                }
                return Ok(0);
            }
            Some(op) if op == "-" => -1,
            Some(_) => 1,
        };

        let position = self.position();
        let magnitude = match self.advance() {
            Some(Token::Number(n)) if n.fract() == 0.0 && n >= 0.0 && n <= i64::MAX as f64 => {
                n as i64
            }
            Some(other) => {
                return Err(ParseError::new(
                    format!("Row offset must be a whole number, found {:?}", other),
                    position,
                ))
            }
            None => return Err(ParseError::new("Missing row offset", position)),
        };

        if !self.match_token(&Token::CloseParen) {
            return Err(ParseError::new(
                "Expected ')' after row offset",
                self.position(),
            ));
        }
        Ok(sign * magnitude)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.comparison()?);
        while self.match_token(&Token::Comma) {
            args.push(self.comparison()?);
        }

        Ok(args)
    }

    /// Keywords become literals; anything else is the current row of a column
    fn bare_identifier(name: String) -> Expr {
        match name.to_ascii_uppercase().as_str() {
            "TRUE" => Expr::Literal(CellValue::Boolean(true)),
            "FALSE" => Expr::Literal(CellValue::Boolean(false)),
            "NULL" | "NONE" => Expr::Literal(CellValue::Absent),
            _ => Expr::Column { name, offset: 0 },
        }
    }

    /// Primary: NUMBER | STRING | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();

        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(CellValue::Number(n))),
            Some(Token::Text(s)) => Ok(Expr::Literal(CellValue::Text(s))),
            Some(Token::OpenParen) => {
                let expr = self.comparison()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position(),
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                position,
            )),
            None => Err(ParseError::new("Unexpected end of expression", position)),
        }
    }
}

/// Convenience function to parse tokens into an expression tree
pub fn parse(tokens: Vec<Spanned>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}
