//! CLI command handlers

pub mod commands;

pub use commands::{calculate, columns, groups, validate, CalculateArgs};
