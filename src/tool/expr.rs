//! Arithmetic expression evaluator used by the calculator tool and the
//! code-math environment.
//!
//! Expressions are parsed into a small AST and evaluated against a
//! [`FunctionTable`] plus optional variable bindings. Supported syntax:
//!
//! - binary operators `+ - * / % ^` (`^` is exponentiation, right
//!   associative, binding tighter than unary minus)
//! - parentheses and function calls with comma-separated arguments
//! - bare identifiers resolved as variables first, then the constants
//!   `pi` and `e`

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

// ---------------------------------------------------------------------------
// Function table
// ---------------------------------------------------------------------------

/// A named math function with its arity behavior.
#[derive(Debug, Clone, Copy)]
enum MathFunction {
    /// Exactly one argument.
    Unary(fn(f64) -> f64),
    /// Exactly two arguments.
    Binary(fn(f64, f64) -> f64),
    /// One or more arguments, folded pairwise.
    Fold(fn(f64, f64) -> f64),
}

/// The set of callable functions available to an evaluator.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<&'static str, MathFunction>,
}

impl FunctionTable {
    /// Functions exposed by the calculator tool: square roots, trigonometry,
    /// logarithms, rounding.
    pub fn calculator() -> Self {
        let mut table = Self::default();
        table.functions.insert("sqrt", MathFunction::Unary(f64::sqrt));
        table.functions.insert("sin", MathFunction::Unary(f64::sin));
        table.functions.insert("cos", MathFunction::Unary(f64::cos));
        table.functions.insert("tan", MathFunction::Unary(f64::tan));
        table.functions.insert("log", MathFunction::Unary(f64::log10));
        table.functions.insert("ln", MathFunction::Unary(f64::ln));
        table.functions.insert("exp", MathFunction::Unary(f64::exp));
        table.functions.insert("pow", MathFunction::Binary(f64::powf));
        table.functions.insert("abs", MathFunction::Unary(f64::abs));
        table.functions.insert("ceil", MathFunction::Unary(f64::ceil));
        table.functions.insert("floor", MathFunction::Unary(f64::floor));
        table.functions.insert("round", MathFunction::Unary(f64::round));
        table
    }

    /// Calculator functions plus `max`/`min`, which line-oriented code
    /// evaluation supports.
    pub fn code_math() -> Self {
        let mut table = Self::calculator();
        table.functions.insert("max", MathFunction::Fold(f64::max));
        table.functions.insert("min", MathFunction::Fold(f64::min));
        table
    }

    fn call(&self, name: &str, args: &[f64]) -> Result<f64> {
        let Some(function) = self.functions.get(name) else {
            anyhow::bail!("unknown function '{name}'");
        };
        match function {
            MathFunction::Unary(f) => {
                if args.len() != 1 {
                    anyhow::bail!("{name} requires exactly 1 argument");
                }
                Ok(f(args[0]))
            }
            MathFunction::Binary(f) => {
                if args.len() != 2 {
                    anyhow::bail!("{name} requires exactly 2 arguments");
                }
                Ok(f(args[0], args[1]))
            }
            MathFunction::Fold(f) => {
                let mut values = args.iter().copied();
                let Some(first) = values.next() else {
                    anyhow::bail!("{name} requires at least 1 argument");
                };
                Ok(values.fold(first, f))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AST and parser
// ---------------------------------------------------------------------------

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl Expr {
    /// Parse an expression, rejecting empty input and trailing garbage.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            input,
            chars: input.char_indices().peekable(),
        };
        parser.skip_whitespace();
        if parser.peek().is_none() {
            anyhow::bail!("empty expression");
        }
        let expr = parser.expr()?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            anyhow::bail!("unexpected character '{c}'");
        }
        Ok(expr)
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                Some('%') => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        if self.eat('-') {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        self.skip_whitespace();
        if self.eat('^') {
            // Right associative: 2^3^2 parses as 2^(3^2).
            let exponent = self.unary()?;
            return Ok(Expr::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.bump();
                let inner = self.expr()?;
                self.skip_whitespace();
                if !self.eat(')') {
                    anyhow::bail!("expected ')'");
                }
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.ident(),
            Some(c) => anyhow::bail!("unexpected character '{c}'"),
            None => anyhow::bail!("unexpected end of expression"),
        }
    }

    fn number(&mut self) -> Result<Expr> {
        let start = match self.chars.peek() {
            Some(&(idx, _)) => idx,
            None => self.input.len(),
        };
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = idx + c.len_utf8();
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..end];
        literal
            .parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| anyhow::anyhow!("invalid number '{literal}'"))
    }

    fn ident(&mut self) -> Result<Expr> {
        let start = match self.chars.peek() {
            Some(&(idx, _)) => idx,
            None => self.input.len(),
        };
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                end = idx + c.len_utf8();
                self.bump();
            } else {
                break;
            }
        }
        let name = self.input[start..end].to_string();
        self.skip_whitespace();
        if !self.eat('(') {
            return Ok(Expr::Ident(name));
        }
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.eat(')') {
            return Ok(Expr::Call(name, args));
        }
        loop {
            args.push(self.expr()?);
            self.skip_whitespace();
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(Expr::Call(name, args));
            }
            anyhow::bail!("expected ',' or ')' in call to '{name}'");
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Evaluates parsed expressions against a function table and variable
/// bindings. Variables shadow the built-in constants.
#[derive(Debug, Clone, Default)]
pub struct ExprEvaluator {
    functions: FunctionTable,
    variables: HashMap<String, f64>,
}

impl ExprEvaluator {
    pub fn new(functions: FunctionTable) -> Self {
        Self {
            functions,
            variables: HashMap::new(),
        }
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: f64) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    /// Parse and evaluate in one step.
    pub fn evaluate(&self, input: &str) -> Result<f64> {
        let expr = Expr::parse(input)?;
        self.eval(&expr)
    }

    pub fn eval(&self, expr: &Expr) -> Result<f64> {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::Ident(name) => {
                if let Some(value) = self.variables.get(name) {
                    return Ok(*value);
                }
                match name.as_str() {
                    "pi" => Ok(std::f64::consts::PI),
                    "e" => Ok(std::f64::consts::E),
                    _ => anyhow::bail!("unknown variable '{name}'"),
                }
            }
            Expr::Neg(inner) => Ok(-self.eval(inner)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Ok(match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => lhs / rhs,
                    BinaryOp::Rem => lhs % rhs,
                    BinaryOp::Pow => lhs.powf(rhs),
                })
            }
            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.functions.call(name, &values)
            }
        }
    }
}

/// Rewrite common mathematical notation into evaluator syntax: Unicode
/// operators, superscripts, and the implicit products `2pi` / `2e`.
pub fn preprocess_expression(expr: &str) -> String {
    expr.replace('π', "pi")
        .replace('×', "*")
        .replace('÷', "/")
        .replace('²', "^2")
        .replace('³', "^3")
        .replace("2pi", "2*pi")
        .replace("2e", "2*e")
}

/// Format a result, dropping the fraction for integer-valued floats.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str) -> f64 {
        ExprEvaluator::new(FunctionTable::calculator())
            .evaluate(input)
            .unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert!((eval("2 + 3 * 4") - 14.0).abs() < 1e-9);
        assert!((eval("(2 + 3) * 4") - 20.0).abs() < 1e-9);
        assert!((eval("10 / 4") - 2.5).abs() < 1e-9);
        assert!((eval("7 % 3") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn exponentiation_is_right_associative() {
        assert!((eval("2^3^2") - 512.0).abs() < 1e-9);
        assert!((eval("2^10") - 1024.0).abs() < 1e-9);
    }

    #[test]
    fn unary_minus_binds_looser_than_power() {
        assert!((eval("-2^2") - -4.0).abs() < 1e-9);
        assert!((eval("2^-1") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn constants_and_functions() {
        assert!((eval("sin(pi/2)") - 1.0).abs() < 1e-9);
        assert!((eval("sqrt(16) + log(100)") - 6.0).abs() < 1e-9);
        assert!((eval("pow(2, 8)") - 256.0).abs() < 1e-9);
        assert!((eval("ln(e)") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn variables_shadow_constants() {
        let mut evaluator = ExprEvaluator::new(FunctionTable::calculator());
        evaluator.set_variable("x", 3.0);
        evaluator.set_variable("pi", 3.0);
        assert!((evaluator.evaluate("x * 2").unwrap() - 6.0).abs() < 1e-9);
        assert!((evaluator.evaluate("pi").unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let evaluator = ExprEvaluator::new(FunctionTable::calculator());
        let err = evaluator.evaluate("foo(1)").unwrap_err();
        assert_eq!(err.to_string(), "unknown function 'foo'");
        let err = evaluator.evaluate("y + 1").unwrap_err();
        assert_eq!(err.to_string(), "unknown variable 'y'");
    }

    #[test]
    fn arity_is_checked() {
        let evaluator = ExprEvaluator::new(FunctionTable::code_math());
        let err = evaluator.evaluate("sqrt(1, 2)").unwrap_err();
        assert_eq!(err.to_string(), "sqrt requires exactly 1 argument");
        let err = evaluator.evaluate("pow(2)").unwrap_err();
        assert_eq!(err.to_string(), "pow requires exactly 2 arguments");
        let err = evaluator.evaluate("max()").unwrap_err();
        assert_eq!(err.to_string(), "max requires at least 1 argument");
    }

    #[test]
    fn fold_functions_take_many_arguments() {
        let evaluator = ExprEvaluator::new(FunctionTable::code_math());
        assert!((evaluator.evaluate("max(1, 7, 3)").unwrap() - 7.0).abs() < 1e-9);
        assert!((evaluator.evaluate("min(4, 2, 8)").unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn calculator_table_excludes_fold_functions() {
        let evaluator = ExprEvaluator::new(FunctionTable::calculator());
        let err = evaluator.evaluate("max(1, 2)").unwrap_err();
        assert_eq!(err.to_string(), "unknown function 'max'");
    }

    #[test]
    fn syntax_errors() {
        assert!(Expr::parse("").is_err());
        assert_eq!(Expr::parse("2 +").unwrap_err().to_string(), "unexpected end of expression");
        assert_eq!(Expr::parse("(2 + 3").unwrap_err().to_string(), "expected ')'");
        assert_eq!(Expr::parse("2 @ 3").unwrap_err().to_string(), "unexpected character '@'");
        assert_eq!(Expr::parse("1.2.3").unwrap_err().to_string(), "invalid number '1.2.3'");
    }

    #[test]
    fn preprocess_rewrites_notation() {
        assert_eq!(preprocess_expression("2π + 3²"), "2*pi + 3^2");
        assert_eq!(preprocess_expression("4 × 2 ÷ 8"), "4 * 2 / 8");
        assert_eq!(preprocess_expression("2e"), "2*e");
    }

    #[test]
    fn format_number_drops_integer_fraction() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-3.0), "-3");
    }
}
