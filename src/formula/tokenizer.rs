//! Formula tokenizer
//!
//! Converts formula strings like "=Revenue(x) - Revenue(x-1)" into a sequence
//! of positioned tokens for the parser.

use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A string literal (e.g., "hello" or 'world')
    Text(String),
    /// A column name, function name or keyword. Backtick-quoted names may
    /// contain spaces.
    Identifier(String),
    /// Operators, normalised: + - * / ^ = <> >= <= < >
    Operator(String),
    OpenParen,
    CloseParen,
    Comma,
}

/// A token and the character offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    #[must_use]
    pub fn new(formula: &'a str) -> Self {
        let (formula, position) = match formula.strip_prefix('=') {
            Some(rest) => (rest, 1),
            None => (formula, 0),
        };
        Self {
            chars: formula.chars().peekable(),
            position,
        }
    }

    /// Tokenize the entire formula
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, TokenizeError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let position = self.position;
            match self.next_token()? {
                Some(token) => tokens.push(Spanned { token, position }),
                None => break,
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '"' | '\'' => self.read_string()?,
            '`' => self.read_quoted_identifier()?,

            '(' => {
                self.advance();
                Token::OpenParen
            }
            ')' => {
                self.advance();
                Token::CloseParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }

            '+' | '-' | '/' | '^' => {
                self.advance();
                Token::Operator(c.to_string())
            }

            // '*' or '**' (power)
            '*' => {
                self.advance();
                if self.peek() == Some('*') {
                    self.advance();
                    Token::Operator("^".to_string())
                } else {
                    Token::Operator("*".to_string())
                }
            }

            // '=' or '=='
            '=' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
                Token::Operator("=".to_string())
            }

            '!' => {
                let start = self.position;
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Operator("<>".to_string())
                } else {
                    return Err(TokenizeError::new("Expected '=' after '!'", start));
                }
            }

            '<' => self.read_less_than_operator(),
            '>' => self.read_greater_than_operator(),

            c if c.is_ascii_digit() || c == '.' => self.read_number()?,

            c if c.is_alphabetic() || c == '_' => self.read_identifier(),

            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };
        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Advance while `pred` holds, collecting the characters
    fn take_while(&mut self, pred: impl Fn(char) -> bool, into: &mut String) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            into.push(c);
            self.advance();
        }
    }

    /// Read a string literal (double or single quoted, doubled quote escapes)
    fn read_string(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let quote = self.advance();
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(TokenizeError::new("Unterminated string literal", start_pos));
                }
                Some(c) if Some(c) == quote => {
                    if self.peek() == quote {
                        value.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
            }
        }

        Ok(Token::Text(value))
    }

    /// Read a `backtick quoted` column name
    fn read_quoted_identifier(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        self.advance();
        let mut name = String::new();
        self.take_while(|c| c != '`', &mut name);
        if self.advance() != Some('`') {
            return Err(TokenizeError::new("Unterminated quoted name", start_pos));
        }
        if name.trim().is_empty() {
            return Err(TokenizeError::new("Empty quoted name", start_pos));
        }
        Ok(Token::Identifier(name))
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.take_while(|c| c.is_ascii_digit(), &mut num_str);

        if self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            self.take_while(|c| c.is_ascii_digit(), &mut num_str);
        }

        if let Some(e @ ('e' | 'E')) = self.peek() {
            num_str.push(e);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            self.take_while(|c| c.is_ascii_digit(), &mut num_str);
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '.', &mut ident);
        Token::Identifier(ident)
    }

    fn read_less_than_operator(&mut self) -> Token {
        self.advance();

        match self.peek() {
            Some('=') => {
                self.advance();
                Token::Operator("<=".to_string())
            }
            Some('>') => {
                self.advance();
                Token::Operator("<>".to_string())
            }
            _ => Token::Operator("<".to_string()),
        }
    }

    fn read_greater_than_operator(&mut self) -> Token {
        self.advance();

        match self.peek() {
            Some('=') => {
                self.advance();
                Token::Operator(">=".to_string())
            }
            _ => Token::Operator(">".to_string()),
        }
    }
}

/// Convenience function to tokenize a formula string
pub fn tokenize(formula: &str) -> Result<Vec<Spanned>, TokenizeError> {
    Tokenizer::new(formula).tokenize()
}
