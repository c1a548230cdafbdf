//! Expression evaluator.
//!
//! Integer arithmetic stays integral and checked; mixing with doubles
//! promotes; `/` always yields a double. `+` with a string operand
//! concatenates.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::library::ClassDef;
use crate::ast::{BinaryOp, Expr, FunctionDef, UnaryOp};
use crate::core::Value;
use crate::errors::{Result, RunnerError};

/// Largest array a range expression may produce.
pub const MAX_RANGE_LEN: i64 = 1_000_000;

/// Names visible to the evaluator.
pub trait Environment {
    /// Value of a top-level binding. `Some(Err(_))` when the binding faulted.
    fn global(&self, name: &str) -> Option<Result<Value>>;

    fn function(&self, name: &str) -> Option<&FunctionDef>;

    fn class(&self, name: &str) -> Option<&'static ClassDef>;

    /// Everything a script could have meant, for suggestions.
    fn known_names(&self) -> Vec<&str>;
}

pub struct Interpreter<'e, E: Environment + ?Sized> {
    env: &'e E,
    max_depth: usize,
    frames: Vec<HashMap<&'e str, Value>>,
}

impl<'e, E: Environment + ?Sized> Interpreter<'e, E> {
    pub fn new(env: &'e E, max_depth: usize) -> Self {
        Self {
            env,
            max_depth,
            frames: Vec::new(),
        }
    }

    pub fn eval(&mut self, expr: &'e Expr) -> Result<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Double(d) => Ok(Value::Double(*d)),
            Expr::Str(s) => Ok(Value::str(s.as_str())),
            Expr::Ident(name) => self.lookup(name),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Expr::Range { start, end } => {
                let start = self.eval(start)?;
                let end = self.eval(end)?;
                range(&start, &end)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                if !self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                if self.eval(lhs)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { target, name, args } => match target.as_deref() {
                None => self.call_function(name, args),
                Some(target) => self.call_member(target, name, args),
            },
            Expr::Member { target, name } => self.member(target, name),
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.frames.last().and_then(|frame| frame.get(name)) {
            return Ok(value.clone());
        }

        match self.env.global(name) {
            Some(Ok(value)) => Ok(value),
            Some(Err(cause)) => Err(RunnerError::engine_fault(format!(
                "'{}' has no value: {}",
                name, cause.kind
            ))),
            None if self.env.class(name).is_some() => Err(RunnerError::engine_fault(format!(
                "class '{}' is not a value",
                name
            ))),
            None => Err(self.unknown(name)),
        }
    }

    fn unknown(&self, name: &str) -> RunnerError {
        let mut candidates = self.env.known_names();
        if let Some(frame) = self.frames.last() {
            candidates.extend(frame.keys().copied());
        }
        RunnerError::unknown_with_candidates(name, candidates)
    }

    fn eval_args(&mut self, args: &'e [Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call_function(&mut self, name: &str, args: &'e [Expr]) -> Result<Value> {
        let env = self.env;
        let def = env.function(name).ok_or_else(|| self.unknown(name))?;

        if args.len() != def.params.len() {
            return Err(RunnerError::engine_fault(format!(
                "{} takes {} argument(s), got {}",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        if self.frames.len() >= self.max_depth {
            return Err(RunnerError::engine_fault(format!(
                "call depth limit of {} exceeded in '{}'",
                self.max_depth, def.name
            )));
        }

        let values = self.eval_args(args)?;
        let frame = def.params.iter().map(String::as_str).zip(values).collect();

        self.frames.push(frame);
        let result = self.eval(&def.body);
        self.frames.pop();
        result
    }

    /// `Class.method(...)` when `target` names an imported class and is not
    /// shadowed by a parameter; otherwise an instance call on the target value.
    fn call_member(&mut self, target: &'e Expr, name: &str, args: &'e [Expr]) -> Result<Value> {
        if let Some(class) = self.static_target(target) {
            let method = class
                .find_method(name)
                .filter(|m| m.is_static)
                .ok_or_else(|| unknown_member(class, name))?;
            let values = self.eval_args(args)?;
            return method.invoke(class.name, None, values);
        }

        let receiver = self.eval(target)?;
        let class = self.class_of(&receiver, name)?;
        let method = class
            .find_method(name)
            .filter(|m| !m.is_static)
            .ok_or_else(|| unknown_member(class, name))?;
        let values = self.eval_args(args)?;
        method.invoke(class.name, Some(&receiver), values)
    }

    fn member(&mut self, target: &'e Expr, name: &str) -> Result<Value> {
        if let Some(class) = self.static_target(target) {
            return match class.find_property(name).filter(|p| p.is_static) {
                Some(property) => (property.getter)(None, &[]),
                None if class.find_method(name).is_some() => Err(RunnerError::engine_fault(format!(
                    "{}.{} is a method; call it with ()",
                    class.name, name
                ))),
                None => Err(unknown_member(class, name)),
            };
        }

        let receiver = self.eval(target)?;
        let class = self.class_of(&receiver, name)?;
        if let Some(property) = class.find_property(name).filter(|p| !p.is_static) {
            return (property.getter)(Some(&receiver), &[]);
        }
        receiver
            .as_object()
            .and_then(|obj| obj.field(name))
            .cloned()
            .ok_or_else(|| unknown_member(class, name))
    }

    fn static_target(&self, target: &Expr) -> Option<&'static ClassDef> {
        match target {
            Expr::Ident(name) if !self.is_local(name) => self.env.class(name),
            _ => None,
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.frames.last().map_or(false, |frame| frame.contains_key(name))
    }

    fn class_of(&self, receiver: &Value, member: &str) -> Result<&'static ClassDef> {
        let obj = receiver.as_object().ok_or_else(|| {
            RunnerError::engine_fault(format!(
                "cannot access '{}' on a {}",
                member,
                receiver.type_name()
            ))
        })?;
        self.env.class(&obj.class).ok_or_else(|| {
            RunnerError::engine_fault(format!("class '{}' is not imported", obj.class))
        })
    }
}

fn unknown_member(class: &ClassDef, name: &str) -> RunnerError {
    RunnerError::unknown_with_candidates(name, class.member_names())
        .with_suggestion(format!("{} has no member '{}'", class.name, name))
}

fn type_error(op: &str, lhs: &Value, rhs: &Value) -> RunnerError {
    RunnerError::engine_fault(format!(
        "cannot apply '{}' to {} and {}",
        op,
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn overflow(op: BinaryOp) -> RunnerError {
    RunnerError::engine_fault(format!("integer overflow in '{}'", op.symbol()))
}

fn text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        other => other.to_string(),
    }
}

pub fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| RunnerError::engine_fault("integer overflow in '-'")),
        (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
        (UnaryOp::Neg, other) => Err(RunnerError::engine_fault(format!(
            "cannot negate a {}",
            other.type_name()
        ))),
    }
}

pub fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    use BinaryOp::*;

    match op {
        Eq => Ok(Value::Bool(lhs.same_as(&rhs))),
        Ne => Ok(Value::Bool(!lhs.same_as(&rhs))),
        Lt | Le | Gt | Ge => {
            let ordering = compare(&lhs, &rhs).ok_or_else(|| type_error(op.symbol(), &lhs, &rhs))?;
            Ok(Value::Bool(match (op, ordering) {
                (_, None) => false,
                (Lt, Some(o)) => o == Ordering::Less,
                (Le, Some(o)) => o != Ordering::Greater,
                (Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            }))
        }
        Add if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) => {
            Ok(Value::str(format!("{}{}", text(&lhs), text(&rhs))))
        }
        Add | Sub | Mul => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                let result = match op {
                    Add => a.checked_add(*b),
                    Sub => a.checked_sub(*b),
                    _ => a.checked_mul(*b),
                };
                result.map(Value::Int).ok_or_else(|| overflow(op))
            }
            _ => {
                let (a, b) = numbers(op, &lhs, &rhs)?;
                Ok(Value::Double(match op {
                    Add => a + b,
                    Sub => a - b,
                    _ => a * b,
                }))
            }
        },
        Div => {
            if matches!((&lhs, &rhs), (Value::Int(_), Value::Int(0))) {
                return Err(RunnerError::engine_fault("division by zero"));
            }
            let (a, b) = numbers(op, &lhs, &rhs)?;
            Ok(Value::Double(a / b))
        }
        Mod => match (&lhs, &rhs) {
            (Value::Int(_), Value::Int(0)) => Err(RunnerError::engine_fault("modulo by zero")),
            (Value::Int(a), Value::Int(b)) => a.checked_rem(*b).map(Value::Int).ok_or_else(|| overflow(op)),
            _ => {
                let (a, b) = numbers(op, &lhs, &rhs)?;
                Ok(Value::Double(a % b))
            }
        },
        And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
    }
}

fn numbers(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<(f64, f64)> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(type_error(op.symbol(), lhs, rhs)),
    }
}

/// `None` when the operands are not comparable at all, `Some(None)` when
/// they are numbers but unordered (NaN).
fn compare(lhs: &Value, rhs: &Value) -> Option<Option<Ordering>> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(Some(a.cmp(b))),
        _ => Some(lhs.as_f64()?.partial_cmp(&rhs.as_f64()?)),
    }
}

/// Inclusive integer range; descends when `start > end`.
pub fn range(start: &Value, end: &Value) -> Result<Value> {
    let (Value::Int(a), Value::Int(b)) = (start, end) else {
        return Err(RunnerError::engine_fault(format!(
            "range bounds must be ints, got {} and {}",
            start.type_name(),
            end.type_name()
        )));
    };

    let len = (*b as i128 - *a as i128).abs() + 1;
    if len > MAX_RANGE_LEN as i128 {
        return Err(RunnerError::engine_fault(format!(
            "range {}..{} has more than {} elements",
            a, b, MAX_RANGE_LEN
        )));
    }

    let items = if a <= b {
        (*a..=*b).map(Value::Int).collect()
    } else {
        (*b..=*a).rev().map(Value::Int).collect()
    };
    Ok(Value::Array(items))
}

/// Array or string indexing; negative indices count from the end.
pub fn index_value(target: &Value, index: &Value) -> Result<Value> {
    let Value::Int(i) = index else {
        return Err(RunnerError::engine_fault(format!(
            "index must be an int, got {}",
            index.type_name()
        )));
    };

    let resolve = |len: usize| -> Result<usize> {
        let len_i = len as i64;
        let pos = if *i < 0 { len_i + *i } else { *i };
        if (0..len_i).contains(&pos) {
            Ok(pos as usize)
        } else {
            Err(RunnerError::engine_fault(format!(
                "index {} out of range for length {}",
                i, len
            )))
        }
    };

    match target {
        Value::Array(items) => Ok(items[resolve(items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let c = chars[resolve(chars.len())?];
            Ok(Value::str(c.to_string()))
        }
        other => Err(RunnerError::engine_fault(format!(
            "cannot index a {}",
            other.type_name()
        ))),
    }
}
