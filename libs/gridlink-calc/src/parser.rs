//! Recursive-descent formula parser
//!
//! Grammar (standard precedence, left associative):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := NUMBER | IDENT | IDENT '(' args ')' | '(' expr ')'
//! args    := expr (',' expr)*
//! ```
//!
//! Only the constructs above exist. There is no assignment, indexing,
//! attribute access or string support, which keeps formulas from untrusted
//! configuration safe to evaluate in-process.

use crate::error::{CalcError, Result};
use crate::lexer::{tokenize, Token};

/// Nesting limit; formulas deeper than this are rejected rather than
/// risking evaluator stack exhaustion.
const MAX_DEPTH: usize = 64;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Parse a formula string into an expression tree.
pub fn parse(formula: &str) -> Result<Expr> {
    let tokens = tokenize(formula)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(CalcError::parse(format!(
            "Unexpected trailing token: {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(CalcError::parse(format!(
                "Expected {expected:?}, found {token:?}"
            ))),
            None => Err(CalcError::parse(format!(
                "Expected {expected:?}, found end of formula"
            ))),
        }
    }

    fn expr(&mut self, depth: usize) -> Result<Expr> {
        if depth > MAX_DEPTH {
            return Err(CalcError::parse("Formula nesting too deep"));
        }
        let mut left = self.term(depth + 1)?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    let right = self.term(depth + 1)?;
                    left = Expr::Add(Box::new(left), Box::new(right));
                },
                Some(Token::Minus) => {
                    self.pos += 1;
                    let right = self.term(depth + 1)?;
                    left = Expr::Sub(Box::new(left), Box::new(right));
                },
                _ => break,
            }
        }
        Ok(left)
    }

    fn term(&mut self, depth: usize) -> Result<Expr> {
        if depth > MAX_DEPTH {
            return Err(CalcError::parse("Formula nesting too deep"));
        }
        let mut left = self.unary(depth + 1)?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    let right = self.unary(depth + 1)?;
                    left = Expr::Mul(Box::new(left), Box::new(right));
                },
                Some(Token::Slash) => {
                    self.pos += 1;
                    let right = self.unary(depth + 1)?;
                    left = Expr::Div(Box::new(left), Box::new(right));
                },
                _ => break,
            }
        }
        Ok(left)
    }

    fn unary(&mut self, depth: usize) -> Result<Expr> {
        if depth > MAX_DEPTH {
            return Err(CalcError::parse("Formula nesting too deep"));
        }
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            let inner = self.unary(depth + 1)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary(depth + 1)
    }

    fn primary(&mut self, depth: usize) -> Result<Expr> {
        if depth > MAX_DEPTH {
            return Err(CalcError::parse("Formula nesting too deep"));
        }
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.expr(depth + 1)?);
                            if matches!(self.peek(), Some(Token::Comma)) {
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Variable(name))
                }
            },
            Some(Token::LParen) => {
                let inner = self.expr(depth + 1)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            },
            Some(token) => Err(CalcError::parse(format!("Unexpected token: {token:?}"))),
            None => Err(CalcError::parse("Unexpected end of formula")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_precedence() {
        // a + b * 2 parses as a + (b * 2)
        let expr = parse("a + b * 2").unwrap();
        assert_eq!(
            expr,
            Expr::Add(
                Box::new(Expr::Variable("a".into())),
                Box::new(Expr::Mul(
                    Box::new(Expr::Variable("b".into())),
                    Box::new(Expr::Number(2.0)),
                )),
            )
        );
    }

    #[test]
    fn test_parse_left_associativity() {
        // a - b - c parses as (a - b) - c
        let expr = parse("a - b - c").unwrap();
        assert_eq!(
            expr,
            Expr::Sub(
                Box::new(Expr::Sub(
                    Box::new(Expr::Variable("a".into())),
                    Box::new(Expr::Variable("b".into())),
                )),
                Box::new(Expr::Variable("c".into())),
            )
        );
    }

    #[test]
    fn test_parse_parentheses_override() {
        let expr = parse("(a + b) * 2").unwrap();
        assert_eq!(
            expr,
            Expr::Mul(
                Box::new(Expr::Add(
                    Box::new(Expr::Variable("a".into())),
                    Box::new(Expr::Variable("b".into())),
                )),
                Box::new(Expr::Number(2.0)),
            )
        );
    }

    #[test]
    fn test_parse_unary_minus() {
        let expr = parse("-a * 2").unwrap();
        assert_eq!(
            expr,
            Expr::Mul(
                Box::new(Expr::Neg(Box::new(Expr::Variable("a".into())))),
                Box::new(Expr::Number(2.0)),
            )
        );
        assert!(parse("--a").is_ok());
    }

    #[test]
    fn test_parse_function_call() {
        let expr = parse("min(a, max(b, 0))").unwrap();
        assert_eq!(
            expr,
            Expr::Call(
                "min".into(),
                vec![
                    Expr::Variable("a".into()),
                    Expr::Call(
                        "max".into(),
                        vec![Expr::Variable("b".into()), Expr::Number(0.0)],
                    ),
                ],
            )
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("a +").is_err());
        assert!(parse("(a + b").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("min(a,)").is_err());
        assert!(parse(")").is_err());
    }

    #[test]
    fn test_parse_depth_limit() {
        let deep = "(".repeat(200) + "1" + &")".repeat(200);
        assert!(matches!(parse(&deep), Err(CalcError::Parse(_))));
    }
}
