//! Formula evaluation
//!
//! Walks the parsed expression tree against a variable map. The function
//! set is a fixed whitelist; there is no user-extensible function table.

use std::collections::{BTreeSet, HashMap};

use crate::error::{CalcError, Result};
use crate::parser::{parse, Expr};

/// Names the evaluator accepts in call position.
pub const BUILTIN_FUNCTIONS: &[&str] = &["abs", "min", "max", "round", "pow"];

/// A compiled formula. Parsing happens once, evaluation per sample.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse and validate a formula. Unknown functions and wrong arities
    /// are rejected here, before any evaluation.
    pub fn compile(source: &str) -> Result<Self> {
        let expr = parse(source)?;
        check_calls(&expr)?;
        tracing::debug!(formula = source, "Compiled formula");
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of all variables the formula reads, sorted and deduplicated.
    pub fn variables(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        collect_variables(&self.expr, &mut names);
        names.into_iter().collect()
    }

    /// Evaluate against the given variable values. Every variable in the
    /// formula must be present in the map.
    pub fn evaluate(&self, variables: &HashMap<String, f64>) -> Result<f64> {
        let value = eval_expr(&self.expr, variables)?;
        if !value.is_finite() {
            return Err(CalcError::NonFinite);
        }
        Ok(value)
    }
}

/// One-shot convenience: compile and evaluate in a single call.
pub fn evaluate(formula: &str, variables: &HashMap<String, f64>) -> Result<f64> {
    Formula::compile(formula)?.evaluate(variables)
}

fn check_calls(expr: &Expr) -> Result<()> {
    match expr {
        Expr::Number(_) | Expr::Variable(_) => Ok(()),
        Expr::Neg(inner) => check_calls(inner),
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
            check_calls(a)?;
            check_calls(b)
        },
        Expr::Call(name, args) => {
            let arity_ok = match name.as_str() {
                "abs" | "round" => args.len() == 1,
                "min" | "max" | "pow" => args.len() == 2,
                _ => return Err(CalcError::unknown_function(name.clone())),
            };
            if !arity_ok {
                return Err(CalcError::function(format!(
                    "{}() takes {} argument(s), got {}",
                    name,
                    if matches!(name.as_str(), "abs" | "round") { 1 } else { 2 },
                    args.len()
                )));
            }
            for arg in args {
                check_calls(arg)?;
            }
            Ok(())
        },
    }
}

fn collect_variables(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Number(_) => {},
        Expr::Variable(name) => {
            names.insert(name.clone());
        },
        Expr::Neg(inner) => collect_variables(inner, names),
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
            collect_variables(a, names);
            collect_variables(b, names);
        },
        Expr::Call(_, args) => {
            for arg in args {
                collect_variables(arg, names);
            }
        },
    }
}

fn eval_expr(expr: &Expr, variables: &HashMap<String, f64>) -> Result<f64> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Variable(name) => variables
            .get(name)
            .copied()
            .ok_or_else(|| CalcError::variable_not_found(name.clone())),
        Expr::Neg(inner) => Ok(-eval_expr(inner, variables)?),
        Expr::Add(a, b) => Ok(eval_expr(a, variables)? + eval_expr(b, variables)?),
        Expr::Sub(a, b) => Ok(eval_expr(a, variables)? - eval_expr(b, variables)?),
        Expr::Mul(a, b) => Ok(eval_expr(a, variables)? * eval_expr(b, variables)?),
        Expr::Div(a, b) => {
            let divisor = eval_expr(b, variables)?;
            if divisor == 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            Ok(eval_expr(a, variables)? / divisor)
        },
        Expr::Call(name, args) => {
            // Arity was checked at compile time
            match name.as_str() {
                "abs" => Ok(eval_expr(&args[0], variables)?.abs()),
                "round" => Ok(eval_expr(&args[0], variables)?.round()),
                "min" => Ok(eval_expr(&args[0], variables)?.min(eval_expr(&args[1], variables)?)),
                "max" => Ok(eval_expr(&args[0], variables)?.max(eval_expr(&args[1], variables)?)),
                "pow" => {
                    Ok(eval_expr(&args[0], variables)?.powf(eval_expr(&args[1], variables)?))
                },
                other => Err(CalcError::unknown_function(other.to_string())),
            }
        },
    }
}
