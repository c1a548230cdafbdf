//! `List` - static helpers over arrays.

use std::cmp::Ordering;

use super::array;
use crate::core::{Parameter, Value, ValueType};
use crate::engine::library::{ClassDef, MethodDef, NativeFn, NativeLibrary};
use crate::errors::{Result, RunnerError};

pub(super) fn library() -> NativeLibrary {
    let over_list = |name: &'static str, returns: ValueType, body: NativeFn| {
        MethodDef::static_method(name, vec![Parameter::new("list", ValueType::Array)], returns, body)
    };

    let class = ClassDef::new("List")
        .method(over_list("Count", ValueType::Int, count))
        .method(over_list("Sum", ValueType::Var, sum))
        .method(over_list("Reverse", ValueType::Array, reverse))
        .method(over_list("Sort", ValueType::Array, sort))
        .method(over_list("First", ValueType::Var, first))
        .method(over_list("Last", ValueType::Var, last))
        .method(MethodDef::static_method(
            "Contains",
            vec![
                Parameter::new("list", ValueType::Array),
                Parameter::new("item", ValueType::Var),
            ],
            ValueType::Bool,
            contains,
        ));

    NativeLibrary {
        name: "List",
        classes: vec![class],
    }
}

fn count(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Int(array(args, 0)?.len() as i64))
}

fn sum(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    let items = array(args, 0)?;
    let mut int_total: i64 = 0;
    let mut float_total = 0.0;
    let mut all_ints = true;

    for item in items {
        match item {
            Value::Int(i) if all_ints => {
                int_total = int_total
                    .checked_add(*i)
                    .ok_or_else(|| RunnerError::engine_fault("integer overflow in List.Sum"))?;
            }
            Value::Int(i) => float_total += *i as f64,
            Value::Double(d) => {
                if all_ints {
                    all_ints = false;
                    float_total = int_total as f64;
                }
                float_total += d;
            }
            other => {
                return Err(RunnerError::engine_fault(format!(
                    "List.Sum cannot add a {}",
                    other.type_name()
                )))
            }
        }
    }

    Ok(if all_ints {
        Value::Int(int_total)
    } else {
        Value::Double(float_total)
    })
}

fn reverse(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Array(array(args, 0)?.iter().rev().cloned().collect()))
}

fn sort(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    let mut items = array(args, 0)?.to_vec();
    let mut failure = None;

    items.sort_by(|a, b| match compare(a, b) {
        Some(ordering) => ordering,
        None => {
            failure.get_or_insert_with(|| (a.type_name().to_string(), b.type_name().to_string()));
            Ordering::Equal
        }
    });

    match failure {
        Some((a, b)) => Err(RunnerError::engine_fault(format!(
            "List.Sort cannot order {} against {}",
            a, b
        ))),
        None => Ok(Value::Array(items)),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn first(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    array(args, 0)?
        .first()
        .cloned()
        .ok_or_else(|| RunnerError::engine_fault("List.First of an empty list"))
}

fn last(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    array(args, 0)?
        .last()
        .cloned()
        .ok_or_else(|| RunnerError::engine_fault("List.Last of an empty list"))
}

fn contains(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    let items = array(args, 0)?;
    let needle = &args[1];
    Ok(Value::Bool(items.iter().any(|item| item.same_as(needle))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        let lib = library();
        lib.classes[0].find_method(name).unwrap().invoke("List", None, args)
    }

    fn ints(values: &[i64]) -> Value {
        Value::Array(values.iter().map(|i| Value::Int(*i)).collect())
    }

    #[test]
    fn test_count_and_sum() {
        assert_eq!(call("Count", vec![ints(&[1, 2, 3])]).unwrap(), Value::Int(3));
        assert_eq!(call("Sum", vec![ints(&[1, 2, 3])]).unwrap(), Value::Int(6));
        let mixed = Value::Array(vec![Value::Int(1), Value::Double(0.5)]);
        assert_eq!(call("Sum", vec![mixed]).unwrap(), Value::Double(1.5));
        assert!(call("Sum", vec![Value::Array(vec![Value::str("a")])]).is_err());
    }

    #[test]
    fn test_sort_and_reverse() {
        assert_eq!(call("Sort", vec![ints(&[3, 1, 2])]).unwrap(), ints(&[1, 2, 3]));
        assert_eq!(call("Reverse", vec![ints(&[1, 2])]).unwrap(), ints(&[2, 1]));
        let mixed = Value::Array(vec![Value::Int(1), Value::str("a")]);
        assert!(call("Sort", vec![mixed]).is_err());
    }

    #[test]
    fn test_first_last_contains() {
        assert_eq!(call("First", vec![ints(&[4, 5])]).unwrap(), Value::Int(4));
        assert_eq!(call("Last", vec![ints(&[4, 5])]).unwrap(), Value::Int(5));
        assert!(call("First", vec![ints(&[])]).is_err());
        assert_eq!(
            call("Contains", vec![ints(&[4, 5]), Value::Double(5.0)]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_rejects_non_list() {
        assert!(call("Count", vec![Value::Int(1)]).is_err());
    }
}
