//! gridlink-calc - Formula evaluation for GridLink calculated registers
//!
//! Safe, in-process evaluation of operator-authored formulas. Formulas are
//! plain arithmetic over named variables with a small whitelist of
//! functions; the language has no strings, no assignment and no way to
//! reach outside the variable map, so configuration-supplied formulas can
//! be evaluated without sandboxing.
//!
//! # Example
//!
//! ```rust
//! use gridlink_calc::Formula;
//! use std::collections::HashMap;
//!
//! let formula = Formula::compile("max(inflow - outflow, 0) * 3.6").unwrap();
//! assert_eq!(formula.variables(), vec!["inflow", "outflow"]);
//!
//! let mut vars = HashMap::new();
//! vars.insert("inflow".to_string(), 12.0);
//! vars.insert("outflow".to_string(), 2.0);
//! assert_eq!(formula.evaluate(&vars).unwrap(), 36.0);
//! ```
//!
//! # Supported syntax
//!
//! - Operators: `+`, `-`, `*`, `/`, unary `-`, parentheses
//! - Functions: `abs(x)`, `round(x)`, `min(a, b)`, `max(a, b)`, `pow(a, b)`
//! - Numbers: decimal and scientific notation
//!
//! Division by zero and non-finite results are evaluation errors, not
//! silent NaN propagation.

pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use error::{CalcError, Result};
pub use evaluator::{evaluate, Formula, BUILTIN_FUNCTIONS};
pub use parser::Expr;
