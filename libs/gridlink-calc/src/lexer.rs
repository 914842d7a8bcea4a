//! Formula tokenizer
//!
//! Splits a formula string into tokens. Anything outside the whitelisted
//! character set (numbers, identifiers, arithmetic operators, parentheses,
//! commas) is a hard parse error, so strings, attribute access and other
//! injection vectors never reach the parser.

use crate::error::{CalcError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

/// Tokenize a formula. Identifiers are `[A-Za-z_][A-Za-z0-9_]*`.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            },
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            },
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            },
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            },
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            },
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            },
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            },
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            },
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Exponent part (1e3, 2.5e-4)
                if let Some(&(_, c)) = chars.peek() {
                    if c == 'e' || c == 'E' {
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        let sign = matches!(lookahead.peek(), Some(&(_, '+')) | Some(&(_, '-')));
                        if sign {
                            lookahead.next();
                        }
                        if matches!(lookahead.peek(), Some(&(_, d)) if d.is_ascii_digit()) {
                            text.push(c);
                            chars.next();
                            if sign {
                                let (_, s) = chars.next().unwrap_or((0, '+'));
                                text.push(s);
                            }
                            while let Some(&(_, d)) = chars.peek() {
                                if d.is_ascii_digit() {
                                    text.push(d);
                                    chars.next();
                                } else {
                                    break;
                                }
                            }
                        }
                    }
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| CalcError::parse(format!("Invalid number literal: {text}")))?;
                tokens.push(Token::Number(value));
            },
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            },
            other => {
                return Err(CalcError::parse(format!(
                    "Unexpected character '{other}' at position {pos}"
                )));
            },
        }
    }

    if tokens.is_empty() {
        return Err(CalcError::parse("Empty formula"));
    }
    Ok(tokens)
}
