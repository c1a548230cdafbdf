//! `Math` - numeric helpers. Trigonometry works in degrees.

use super::number;
use crate::core::{Parameter, Value, ValueType};
use crate::engine::library::{ClassDef, MethodDef, NativeFn, NativeLibrary, PropertyDef};
use crate::errors::{Result, RunnerError};

pub(super) fn library() -> NativeLibrary {
    let unary = |name: &'static str, body: NativeFn| {
        MethodDef::static_method(
            name,
            vec![Parameter::new("value", ValueType::Double)],
            ValueType::Double,
            body,
        )
    };
    let binary = |name: &'static str, a: &str, b: &str, returns: ValueType, body: NativeFn| {
        MethodDef::static_method(
            name,
            vec![Parameter::new(a, ValueType::Double), Parameter::new(b, ValueType::Double)],
            returns,
            body,
        )
    };

    let class = ClassDef::new("Math")
        .method(unary("Sqrt", sqrt))
        .method(unary("Abs", abs))
        .method(binary("Pow", "base", "exponent", ValueType::Double, pow))
        .method(unary("Sin", sin))
        .method(unary("Cos", cos))
        .method(unary("Tan", tan))
        .method(unary("Floor", floor).returning(ValueType::Int))
        .method(unary("Ceiling", ceiling).returning(ValueType::Int))
        .method(unary("Round", round).returning(ValueType::Int))
        .method(MethodDef::static_method(
            "Min",
            vec![Parameter::new("a", ValueType::Var), Parameter::new("b", ValueType::Var)],
            ValueType::Var,
            min,
        ))
        .method(MethodDef::static_method(
            "Max",
            vec![Parameter::new("a", ValueType::Var), Parameter::new("b", ValueType::Var)],
            ValueType::Var,
            max,
        ))
        .property(PropertyDef::static_property("PI", ValueType::Double, pi));

    NativeLibrary {
        name: "Math",
        classes: vec![class],
    }
}

fn sqrt(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(number(args, 0)?.sqrt()))
}

fn abs(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(number(args, 0)?.abs()))
}

fn pow(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(number(args, 0)?.powf(number(args, 1)?)))
}

fn sin(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(number(args, 0)?.to_radians().sin()))
}

fn cos(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(number(args, 0)?.to_radians().cos()))
}

fn tan(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(number(args, 0)?.to_radians().tan()))
}

fn floor(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    to_int(number(args, 0)?.floor())
}

fn ceiling(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    to_int(number(args, 0)?.ceil())
}

fn round(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    to_int(number(args, 0)?.round())
}

fn to_int(value: f64) -> Result<Value> {
    if value.is_finite() && value.abs() < i64::MAX as f64 {
        Ok(Value::Int(value as i64))
    } else {
        Err(RunnerError::engine_fault(format!("{} does not fit an int", value)))
    }
}

fn min(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    pick(args, |a, b| a <= b)
}

fn max(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    pick(args, |a, b| a >= b)
}

/// First argument when `keep_first` holds, else the second; two ints stay ints.
fn pick(args: &[Value], keep_first: fn(f64, f64) -> bool) -> Result<Value> {
    let (a, b) = (number(args, 0)?, number(args, 1)?);
    Ok(match (&args[0], &args[1]) {
        (Value::Int(x), Value::Int(y)) => Value::Int(if keep_first(a, b) { *x } else { *y }),
        _ => Value::Double(if keep_first(a, b) { a } else { b }),
    })
}

fn pi(_: Option<&Value>, _: &[Value]) -> Result<Value> {
    Ok(Value::Double(std::f64::consts::PI))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        let lib = library();
        let method = lib.classes[0].find_method(name).unwrap();
        method.invoke("Math", None, args)
    }

    #[test]
    fn test_sqrt_widens_int() {
        assert_eq!(call("Sqrt", vec![Value::Int(4)]).unwrap(), Value::Double(2.0));
    }

    #[test]
    fn test_degrees() {
        let sin = call("Sin", vec![Value::Int(90)]).unwrap().as_f64().unwrap();
        assert!((sin - 1.0).abs() < 1e-12);
        let cos = call("Cos", vec![Value::Int(180)]).unwrap().as_f64().unwrap();
        assert!((cos + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rounding_returns_ints() {
        assert_eq!(call("Floor", vec![Value::Double(2.7)]).unwrap(), Value::Int(2));
        assert_eq!(call("Ceiling", vec![Value::Double(2.1)]).unwrap(), Value::Int(3));
        assert_eq!(call("Round", vec![Value::Double(-2.5)]).unwrap(), Value::Int(-3));
        assert!(call("Floor", vec![Value::Double(f64::INFINITY)]).is_err());
    }

    #[test]
    fn test_min_max_keep_ints() {
        assert_eq!(call("Min", vec![Value::Int(3), Value::Int(1)]).unwrap(), Value::Int(1));
        assert_eq!(call("Max", vec![Value::Int(3), Value::Double(4.5)]).unwrap(), Value::Double(4.5));
        assert!(call("Max", vec![Value::str("a"), Value::Int(1)]).is_err());
    }

    #[test]
    fn test_pi_is_static() {
        let lib = library();
        let pi = lib.classes[0].find_property("PI").unwrap();
        assert!(pi.is_static);
        assert_eq!((pi.getter)(None, &[]).unwrap(), Value::Double(std::f64::consts::PI));
    }
}
