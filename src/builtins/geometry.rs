//! `Geometry` - the `Point` class.
//!
//! Points are plain objects with `X`, `Y` and `Z` double fields, so they
//! serialize and print like any other value.

use super::number;
use crate::core::{ObjectValue, Parameter, Value, ValueType};
use crate::engine::library::{ClassDef, MethodDef, NativeLibrary, PropertyDef};
use crate::errors::{Result, RunnerError};

const POINT: &str = "Point";

pub(super) fn library() -> NativeLibrary {
    let point = || ValueType::class(POINT);
    let coords = || {
        vec![
            Parameter::new("x", ValueType::Double),
            Parameter::new("y", ValueType::Double),
            Parameter::new("z", ValueType::Double),
        ]
    };

    let class = ClassDef::new(POINT)
        .method(MethodDef::static_method("ByCoordinates", coords(), point(), by_coordinates))
        .method(MethodDef::static_method("Origin", Vec::new(), point(), origin))
        .method(MethodDef::new(
            "Add",
            vec![Parameter::new("other", point())],
            point(),
            add,
        ))
        .method(MethodDef::new(
            "DistanceTo",
            vec![Parameter::new("other", point())],
            ValueType::Double,
            distance_to,
        ))
        .method(MethodDef::new(
            "Translate",
            vec![
                Parameter::new("dx", ValueType::Double),
                Parameter::new("dy", ValueType::Double),
                Parameter::new("dz", ValueType::Double),
            ],
            point(),
            translate,
        ))
        .property(PropertyDef::new("X", ValueType::Double, x))
        .property(PropertyDef::new("Y", ValueType::Double, y))
        .property(PropertyDef::new("Z", ValueType::Double, z));

    NativeLibrary {
        name: "Geometry",
        classes: vec![class],
    }
}

fn make_point(x: f64, y: f64, z: f64) -> Value {
    Value::Object(
        ObjectValue::new(POINT)
            .with_field("X", Value::Double(x))
            .with_field("Y", Value::Double(y))
            .with_field("Z", Value::Double(z)),
    )
}

fn coordinates(value: Option<&Value>) -> Result<[f64; 3]> {
    let obj = value
        .and_then(Value::as_object)
        .filter(|obj| &*obj.class == POINT)
        .ok_or_else(|| RunnerError::engine_fault("expected a Point"))?;

    let mut out = [0.0; 3];
    for (slot, name) in out.iter_mut().zip(["X", "Y", "Z"]) {
        *slot = obj
            .field(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| RunnerError::engine_fault(format!("Point has no numeric {}", name)))?;
    }
    Ok(out)
}

fn by_coordinates(_: Option<&Value>, args: &[Value]) -> Result<Value> {
    Ok(make_point(number(args, 0)?, number(args, 1)?, number(args, 2)?))
}

fn origin(_: Option<&Value>, _: &[Value]) -> Result<Value> {
    Ok(make_point(0.0, 0.0, 0.0))
}

fn add(receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
    let [ax, ay, az] = coordinates(receiver)?;
    let [bx, by, bz] = coordinates(args.first())?;
    Ok(make_point(ax + bx, ay + by, az + bz))
}

fn distance_to(receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
    let [ax, ay, az] = coordinates(receiver)?;
    let [bx, by, bz] = coordinates(args.first())?;
    let (dx, dy, dz) = (bx - ax, by - ay, bz - az);
    Ok(Value::Double((dx * dx + dy * dy + dz * dz).sqrt()))
}

fn translate(receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
    let [x, y, z] = coordinates(receiver)?;
    Ok(make_point(x + number(args, 0)?, y + number(args, 1)?, z + number(args, 2)?))
}

fn x(receiver: Option<&Value>, _: &[Value]) -> Result<Value> {
    Ok(Value::Double(coordinates(receiver)?[0]))
}

fn y(receiver: Option<&Value>, _: &[Value]) -> Result<Value> {
    Ok(Value::Double(coordinates(receiver)?[1]))
}

fn z(receiver: Option<&Value>, _: &[Value]) -> Result<Value> {
    Ok(Value::Double(coordinates(receiver)?[2]))
}
