use std::collections::HashMap;

use crate::error::ExprError;
use crate::expression::builtins;
use crate::expression::functions::{FunctionRegistry, Symbol};
use crate::expression::parser::{BinaryOp, Expr, UnaryOp};
use crate::expression::value::{Scope, Value};

/// Bound on nested user-function calls. Mutually recursive functions are
/// legal at compile time; this keeps runaway recursion from hanging a turn.
const MAX_DEPTH: usize = 64;

/// Tree-walking evaluator over a scope, extended with the registry of
/// user-declared functions.
pub struct Evaluator<'a> {
    functions: &'a FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(functions: &'a FunctionRegistry) -> Self {
        Self { functions }
    }

    pub fn eval(&self, expr: &Expr, scope: &Scope) -> Result<Value, ExprError> {
        self.eval_at(expr, scope, 0)
    }

    fn eval_at(&self, expr: &Expr, scope: &Scope, depth: usize) -> Result<Value, ExprError> {
        if depth > MAX_DEPTH {
            return Err(ExprError::DepthExceeded);
        }
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::UnknownIdentifier(name.clone())),
            Expr::Unary(op, inner) => {
                let v = self.eval_at(inner, scope, depth)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                    UnaryOp::Neg => v
                        .as_number()
                        .map(|n| Value::Number(-n))
                        .ok_or_else(|| ExprError::Type(format!("cannot negate {}", v.type_name()))),
                }
            }
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right, scope, depth),
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_at(arg, scope, depth)?);
                }
                self.call(name, values, scope, depth)
            }
            Expr::Index(target, index) => {
                let target = self.eval_at(target, scope, depth)?;
                let index = self.eval_at(index, scope, depth)?;
                eval_index(&target, &index)
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_at(item, scope, depth)?);
                }
                Ok(Value::List(values))
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &Scope,
        depth: usize,
    ) -> Result<Value, ExprError> {
        // Short-circuit before evaluating the right side.
        match op {
            BinaryOp::And => {
                let l = self.eval_at(left, scope, depth)?;
                if !l.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval_at(right, scope, depth)?;
                return Ok(Value::Bool(r.is_truthy()));
            }
            BinaryOp::Or => {
                let l = self.eval_at(left, scope, depth)?;
                if l.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval_at(right, scope, depth)?;
                return Ok(Value::Bool(r.is_truthy()));
            }
            _ => {}
        }

        let l = self.eval_at(left, scope, depth)?;
        let r = self.eval_at(right, scope, depth)?;

        match op {
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &l, &r),
            BinaryOp::Add => add(&l, &r),
            BinaryOp::Sub => arithmetic(op, &l, &r, |a, b| Ok(a - b)),
            BinaryOp::Mul => arithmetic(op, &l, &r, |a, b| Ok(a * b)),
            BinaryOp::Div => arithmetic(op, &l, &r, |a, b| {
                if b == 0.0 {
                    Err(ExprError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            }),
            BinaryOp::Mod => arithmetic(op, &l, &r, |a, b| {
                if b == 0.0 {
                    Err(ExprError::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            }),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        caller_scope: &Scope,
        depth: usize,
    ) -> Result<Value, ExprError> {
        // User functions take precedence so declared functions can refine
        // behavior; shadowing a built-in is rejected at compile time anyway.
        if let Some(func) = self.functions.get(name) {
            if args.len() != func.params.len() {
                return Err(ExprError::Arity {
                    name: name.to_string(),
                    expected: func.params.len(),
                    got: args.len(),
                });
            }
            // Local scope: declared parameters, then the resolved closure
            // bound from the calling scope. Transitive closure guarantees a
            // nested call finds its variables among these locals.
            let mut local: Scope = HashMap::with_capacity(func.params.len() + func.closure.len());
            for (param, arg) in func.params.iter().zip(args) {
                local.insert(param.clone(), arg);
            }
            for sym in &func.closure {
                if let Symbol::Variable(var) = sym {
                    let value = caller_scope.get(var).cloned().unwrap_or(Value::Null);
                    local.entry(var.clone()).or_insert(value);
                }
            }
            return self.eval_at(&func.body, &local, depth + 1);
        }

        match builtins::call(name, &args) {
            Some(result) => result,
            None => Err(ExprError::UnknownFunction(name.to_string())),
        }
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        // Numbers written as strings compare numerically, matching the
        // loose comparisons configuration authors write after textual
        // tag substitution.
        (Value::Number(a), Value::Str(s)) | (Value::Str(s), Value::Number(a)) => {
            s.parse::<f64>().map(|b| *a == b).unwrap_or(false)
        }
        _ => l == r,
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    let ordering = match (l, r) {
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(ExprError::Type(format!(
                    "cannot compare {} with {}",
                    l.type_name(),
                    r.type_name()
                )))
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn add(l: &Value, r: &Value) -> Result<Value, ExprError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            Ok(Value::List(items))
        }
        // String on either side concatenates.
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", l.render(), r.render())))
        }
        _ => Err(ExprError::Type(format!(
            "cannot add {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn arithmetic(
    op: BinaryOp,
    l: &Value,
    r: &Value,
    f: impl Fn(f64, f64) -> Result<f64, ExprError>,
) -> Result<Value, ExprError> {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Ok(Value::Number(f(a, b)?)),
        _ => Err(ExprError::Type(format!(
            "{op:?} expects numbers, got {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn eval_index(target: &Value, index: &Value) -> Result<Value, ExprError> {
    let i = index
        .as_number()
        .ok_or_else(|| ExprError::Type("index must be a number".to_string()))?
        as i64;
    match target {
        Value::List(items) => {
            if i < 0 || i as usize >= items.len() {
                return Err(ExprError::IndexOutOfBounds {
                    index: i,
                    len: items.len(),
                });
            }
            Ok(items[i as usize].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            if i < 0 || i as usize >= chars.len() {
                return Err(ExprError::IndexOutOfBounds {
                    index: i,
                    len: chars.len(),
                });
            }
            Ok(Value::Str(chars[i as usize].to_string()))
        }
        other => Err(ExprError::Type(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}
