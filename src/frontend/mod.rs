//! Frontend components
//!
//! Lexer and parser for script text, runner configuration, and the
//! command-line interface.

pub mod lexer;
pub mod parser;
pub mod cli;
pub mod config;

pub use parser::{parse_arguments, parse_expression, parse_program};
pub use cli::main as cli_main;
pub use config::{ConfigurationKeys, RunnerConfig};
