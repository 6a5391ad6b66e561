//! Compiled expressions and their evaluator.

use std::fmt;

use super::ast::{BinaryOp, Node, UnaryOp};
use super::context::EvalContext;
use super::{lexer, parser};
use crate::error::ExprError;

/// Equality tolerance for numeric `==` / `!=`.
pub const EQ_EPSILON: f64 = 1e-9;

/// Results with a magnitude at or below this are falsy.
pub const TRUTHY_EPSILON: f64 = 1e-12;

/// Divisors smaller than this divide to zero.
pub const DIV_EPSILON: f64 = 1e-12;

/// A runtime value. Booleans are numbers (`1.0` / `0.0`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn from_bool(b: bool) -> Self {
        Value::Number(if b { 1.0 } else { 0.0 })
    }

    /// Numeric view; text that does not parse as a number reads as `0.0`.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        is_truthy(self.as_number())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

pub fn is_truthy(v: f64) -> bool {
    v.abs() > TRUTHY_EPSILON
}

/// An expression compiled once and evaluated against many contexts.
///
/// Compilation never fails. A structural error is kept and returned from
/// every evaluation; [`Expr::diagnostic`] exposes it for linting.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    root: Result<Node, ExprError>,
}

impl Expr {
    pub fn compile(source: &str) -> Self {
        let tokens = lexer::tokenize(source);
        let root = parser::parse(&tokens);
        if let Err(error) = &root {
            tracing::debug!(source, %error, "expression has a structural error");
        }
        Self {
            source: source.to_string(),
            root,
        }
    }

    /// An expression that always evaluates to `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            source: value.to_string(),
            root: Ok(Node::Number(value)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The structural error, if the source did not parse.
    pub fn diagnostic(&self) -> Option<&ExprError> {
        self.root.as_ref().err()
    }

    pub fn is_valid(&self) -> bool {
        self.root.is_ok()
    }

    pub fn eval_value(&self, ctx: &EvalContext<'_>) -> Result<Value, ExprError> {
        match &self.root {
            Ok(node) => Ok(evaluate(node, ctx)),
            Err(e) => Err(e.clone()),
        }
    }

    pub fn eval_number(&self, ctx: &EvalContext<'_>) -> Result<f64, ExprError> {
        self.eval_value(ctx).map(|v| v.as_number())
    }

    /// Truthy iff `|eval_number| > 1e-12`.
    pub fn eval_bool(&self, ctx: &EvalContext<'_>) -> Result<bool, ExprError> {
        self.eval_number(ctx).map(is_truthy)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn evaluate(node: &Node, ctx: &EvalContext<'_>) -> Value {
    match node {
        Node::Number(n) => Value::Number(*n),
        Node::Text(s) => Value::Text(s.clone()),
        Node::Var(name) => ctx.var(name).cloned().unwrap_or(Value::Number(0.0)),
        Node::Call { name, args } => {
            let values: Vec<Value> = args.iter().map(|a| evaluate(a, ctx)).collect();
            Value::Number(ctx.call(name, &values))
        }
        Node::Unary { op, operand } => {
            let v = evaluate(operand, ctx).as_number();
            Value::Number(match op {
                UnaryOp::Plus => v,
                UnaryOp::Neg => -v,
                UnaryOp::Not => bool_num(!is_truthy(v)),
            })
        }
        Node::Binary { op, lhs, rhs } => Value::Number(binary(*op, lhs, rhs, ctx)),
    }
}

fn binary(op: BinaryOp, lhs: &Node, rhs: &Node, ctx: &EvalContext<'_>) -> f64 {
    match op {
        BinaryOp::Or => {
            if evaluate(lhs, ctx).is_truthy() {
                return 1.0;
            }
            bool_num(evaluate(rhs, ctx).is_truthy())
        }
        BinaryOp::And => {
            if !evaluate(lhs, ctx).is_truthy() {
                return 0.0;
            }
            bool_num(evaluate(rhs, ctx).is_truthy())
        }
        BinaryOp::Eq | BinaryOp::NotEq => {
            let a = evaluate(lhs, ctx);
            let b = evaluate(rhs, ctx);
            let equal = match (&a, &b) {
                (Value::Text(x), Value::Text(y)) => x == y,
                _ => (a.as_number() - b.as_number()).abs() < EQ_EPSILON,
            };
            bool_num(if op == BinaryOp::Eq { equal } else { !equal })
        }
        _ => {
            let a = evaluate(lhs, ctx).as_number();
            let b = evaluate(rhs, ctx).as_number();
            match op {
                BinaryOp::Gt => bool_num(a > b),
                BinaryOp::Lt => bool_num(a < b),
                BinaryOp::Ge => bool_num(a >= b),
                BinaryOp::Le => bool_num(a <= b),
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b.abs() < DIV_EPSILON {
                        0.0
                    } else {
                        a / b
                    }
                }
                BinaryOp::Or | BinaryOp::And | BinaryOp::Eq | BinaryOp::NotEq => 0.0,
            }
        }
    }
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_world::memory::MemoryWorld;
    use sim_world::{Services, ThingId, ThingView, World};

    fn eval(source: &str) -> f64 {
        let world = MemoryWorld::new(4, 4);
        let snap = world.snap();
        let services = Services::new();
        let ctx = EvalContext::new(&snap, &services);
        Expr::compile(source).eval_number(&ctx).unwrap()
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("-2 * -3"), 6.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
    }

    #[test]
    fn test_division_by_near_zero_is_zero() {
        assert_eq!(eval("5 / 0"), 0.0);
        assert_eq!(eval("5 / 1e-13"), 0.0);
        assert_eq!(eval("0 / 0"), 0.0);
        assert_eq!(eval("6 / 3"), 2.0);
    }

    #[test]
    fn test_equality_epsilon() {
        assert_eq!(eval("0.1 + 0.2 == 0.3"), 1.0);
        assert_eq!(eval("1 != 1.0000000001"), 0.0);
        assert_eq!(eval("1 != 1.001"), 1.0);
    }

    #[test]
    fn test_logic_and_booleans() {
        assert_eq!(eval("true && !false"), 1.0);
        assert_eq!(eval("0 || 2"), 1.0);
        assert_eq!(eval("3 && 0"), 0.0);
        assert_eq!(eval("1 < 2 && 2 <= 2 && 3 >= 4 || 5 > 4"), 1.0);
    }

    #[test]
    fn test_string_comparison() {
        assert_eq!(eval("'rain' == \"rain\""), 1.0);
        assert_eq!(eval("'rain' != 'snow'"), 1.0);
        assert_eq!(eval("'2' == 2"), 1.0);
    }

    #[test]
    fn test_truthiness_threshold() {
        let world = MemoryWorld::new(1, 1);
        let snap = world.snap();
        let services = Services::new();
        let ctx = EvalContext::new(&snap, &services);
        assert!(!Expr::compile("1e-13").eval_bool(&ctx).unwrap());
        assert!(Expr::compile("-1e-11").eval_bool(&ctx).unwrap());
    }

    #[test]
    fn test_structural_error_is_reported_on_every_eval() {
        let world = MemoryWorld::new(1, 1);
        let snap = world.snap();
        let services = Services::new();
        let ctx = EvalContext::new(&snap, &services);

        let expr = Expr::compile("(1 + 2");
        assert!(expr.diagnostic().is_some());
        assert!(expr.eval_number(&ctx).is_err());
        assert!(expr.eval_bool(&ctx).is_err());
    }

    #[test]
    fn test_truncated_expression_still_evaluates() {
        assert_eq!(eval("1 + 2 # trailing garbage"), 3.0);
    }

    #[test]
    fn test_variables() {
        let mut world = MemoryWorld::new(4, 4);
        world.insert(ThingView::new("npc", "actor"));
        let snap = world.snap();
        let services = Services::new();
        let mut ctx = EvalContext::new(&snap, &services).with_self(&ThingId::from("npc"));
        ctx.bind("bonus", Value::Number(2.5));

        assert_eq!(Expr::compile("$bonus * 2").eval_number(&ctx).unwrap(), 5.0);
        assert_eq!(Expr::compile("$self == 'npc'").eval_number(&ctx).unwrap(), 1.0);
        assert_eq!(Expr::compile("$missing + 1").eval_number(&ctx).unwrap(), 1.0);
    }

    #[test]
    fn test_unknown_function_is_zero() {
        assert_eq!(eval("no_such_fn(1, 2) + 4"), 4.0);
    }

    #[test]
    fn test_compile_is_deterministic() {
        assert_eq!(Expr::compile("max(1, $x) * 2"), Expr::compile("max(1, $x) * 2"));
    }
}
