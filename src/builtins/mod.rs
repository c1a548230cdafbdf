//! Native libraries - classes scripts can use after `import("<name>")`
//!
//! Design: each library lives in a focused module that builds its
//! [`NativeLibrary`] description once; lookup goes through a lazily
//! initialized table shared by every engine in the process.

mod geometry;
mod list;
mod math;

use once_cell::sync::Lazy;

use crate::core::Value;
use crate::engine::library::NativeLibrary;
use crate::errors::{Result, RunnerError};

static LIBRARIES: Lazy<Vec<NativeLibrary>> = Lazy::new(|| {
    tracing::debug!("initializing native library table");
    vec![math::library(), list::library(), geometry::library()]
});

/// Native library called `name` (case-insensitive).
pub fn find_library(name: &str) -> Option<&'static NativeLibrary> {
    LIBRARIES.iter().find(|lib| lib.name.eq_ignore_ascii_case(name))
}

pub fn library_names() -> impl Iterator<Item = &'static str> {
    LIBRARIES.iter().map(|lib| lib.name)
}

/// Numeric argument `index`, widened to `f64`.
pub(crate) fn number(args: &[Value], index: usize) -> Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| RunnerError::engine_fault(format!("argument {} must be a number", index + 1)))
}

pub(crate) fn array(args: &[Value], index: usize) -> Result<&[Value]> {
    args.get(index)
        .and_then(Value::as_array)
        .ok_or_else(|| RunnerError::engine_fault(format!("argument {} must be a list", index + 1)))
}
