//! Structured error types for the middle-end.
//!
//! Every failure is surfaced as a [`compile_error::CompileError`]; nothing is
//! caught locally and continued. Passes are required to leave the IR in a
//! structurally valid state before returning an error.
pub mod compile_error;

pub use compile_error::CompileError;
