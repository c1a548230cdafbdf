//! Foreign Function Interface
//!
//! C ABI over [`crate::LiveRunner`] for hosts that are not written in Rust.

pub mod c_api;

pub use c_api::{FfiRunner, UpdateCallback};
