//! Evaluator for the `#` variable arithmetic embedded in scene commands.
//!
//! `#N` reads variable `N`, where `N` is itself a primary expression, so
//! `#(950+#300)` is legal. A trailing `=` assigns to the last variable read
//! (`#(955+3)=576`). Comparisons (`==`, `<`, `>`) chain and yield 1 or 0.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("invalid token '{0}'")]
    InvalidToken(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected ')' but found {0}")]
    Unclosed(String),
    #[error("unexpected {0} after expression")]
    Trailing(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("number '{0}' does not fit")]
    Overflow(String),
}

/// Script variable table. Unset variables read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables {
    values: BTreeMap<i64, i64>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> i64 {
        self.values.get(&id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, id: i64, value: i64) {
        self.values.insert(id, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.values.iter().map(|(&id, &value)| (id, value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Evaluates `source`, applying any assignment it contains.
    pub fn eval(&mut self, source: &str) -> Result<i64, ExprError> {
        let mut parser = Parser {
            lexer: Lexer::new(source)?,
            vars: self,
            last_var: None,
        };
        parser.assign_expr()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Var,
    Assign,
    Eq,
    Lt,
    Gt,
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
    End,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    current: Token,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Result<Self, ExprError> {
        let mut lexer = Lexer {
            chars: source.chars().peekable(),
            current: Token::End,
        };
        lexer.advance()?;
        Ok(lexer)
    }

    fn advance(&mut self) -> Result<(), ExprError> {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(c) = self.chars.next() else {
            self.current = Token::End;
            return Ok(());
        };
        self.current = match c {
            '=' => {
                if self.chars.next_if_eq(&'=').is_some() {
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            '<' => Token::Lt,
            '>' => Token::Gt,
            '#' => Token::Var,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Mul,
            '/' => Token::Div,
            '(' => Token::LParen,
            ')' => Token::RParen,
            digit if digit.is_ascii_digit() => {
                let mut text = String::from(digit);
                while let Some(next) = self.chars.next_if(char::is_ascii_digit) {
                    text.push(next);
                }
                let value = text.parse().map_err(|_| ExprError::Overflow(text))?;
                Token::Number(value)
            }
            other => return Err(ExprError::InvalidToken(other)),
        };
        Ok(())
    }
}

struct Parser<'a, 'v> {
    lexer: Lexer<'a>,
    vars: &'v mut Variables,
    last_var: Option<i64>,
}

impl Parser<'_, '_> {
    fn current(&self) -> &Token {
        &self.lexer.current
    }

    fn assign_expr(&mut self) -> Result<i64, ExprError> {
        let starts_with_var = *self.current() == Token::Var;
        let value = self.equality_expr()?;
        if starts_with_var && *self.current() == Token::Assign {
            let target = self.last_var;
            self.lexer.advance()?;
            let value = self.equality_expr()?;
            self.expect_end()?;
            if let Some(id) = target {
                log::debug!("set #{id} = {value}");
                self.vars.set(id, value);
            }
            return Ok(value);
        }
        self.expect_end()?;
        Ok(value)
    }

    fn expect_end(&self) -> Result<(), ExprError> {
        match self.current() {
            Token::End => Ok(()),
            other => Err(ExprError::Trailing(format!("{other:?}"))),
        }
    }

    fn equality_expr(&mut self) -> Result<i64, ExprError> {
        let mut left = self.add_expr()?;
        let mut holds: Option<bool> = None;
        loop {
            let compare: fn(i64, i64) -> bool = match self.current() {
                Token::Eq => |a, b| a == b,
                Token::Lt => |a, b| a < b,
                Token::Gt => |a, b| a > b,
                _ => break,
            };
            self.lexer.advance()?;
            let right = self.add_expr()?;
            holds = Some(holds.unwrap_or(true) && compare(left, right));
            left = right;
        }
        Ok(match holds {
            Some(result) => i64::from(result),
            None => left,
        })
    }

    fn add_expr(&mut self) -> Result<i64, ExprError> {
        let mut result = self.mul_expr()?;
        loop {
            match self.current() {
                Token::Plus => {
                    self.lexer.advance()?;
                    result = result.wrapping_add(self.mul_expr()?);
                }
                Token::Minus => {
                    self.lexer.advance()?;
                    result = result.wrapping_sub(self.mul_expr()?);
                }
                _ => return Ok(result),
            }
        }
    }

    fn mul_expr(&mut self) -> Result<i64, ExprError> {
        let mut result = self.unary_expr()?;
        loop {
            match self.current() {
                Token::Mul => {
                    self.lexer.advance()?;
                    result = result.wrapping_mul(self.unary_expr()?);
                }
                Token::Div => {
                    self.lexer.advance()?;
                    let divisor = self.unary_expr()?;
                    if divisor == 0 {
                        return Err(ExprError::DivideByZero);
                    }
                    result = result.wrapping_div(divisor);
                }
                _ => return Ok(result),
            }
        }
    }

    fn unary_expr(&mut self) -> Result<i64, ExprError> {
        match self.current() {
            Token::Plus => {
                self.lexer.advance()?;
                self.primary()
            }
            Token::Minus => {
                self.lexer.advance()?;
                Ok(self.primary()?.wrapping_neg())
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<i64, ExprError> {
        match self.current().clone() {
            Token::Number(value) => {
                self.lexer.advance()?;
                Ok(value)
            }
            Token::Var => {
                self.lexer.advance()?;
                let id = self.primary()?;
                self.last_var = Some(id);
                Ok(self.vars.get(id))
            }
            Token::LParen => {
                self.lexer.advance()?;
                let value = self.add_expr()?;
                if *self.current() != Token::RParen {
                    return Err(ExprError::Unclosed(format!("{:?}", self.current())));
                }
                self.lexer.advance()?;
                Ok(value)
            }
            Token::End => Err(ExprError::UnexpectedEnd),
            other => Err(ExprError::Unclosed(format!("{other:?}"))),
        }
    }
}
