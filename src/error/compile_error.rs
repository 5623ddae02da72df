// src/error/compile_error.rs
use thiserror::Error;

/// Errors surfaced by the middle-end. None of these are recoverable by a
/// caller: every variant aborts compilation of the current unit.
#[derive(Debug, Error)]
pub enum CompileError {
    /// An internal invariant was violated. Always indicates a bug in a pass
    /// or analysis, never bad user input.
    #[error("compiler bug: {message}")]
    CompilerBug { message: String },

    /// The IR is structurally malformed (unterminated block, dangling label,
    /// phi with the wrong arity).
    #[error("malformed IR: {message}")]
    StructureError { message: String },

    /// The lowering encountered a legacy construct with no IR mapping.
    #[error("unsupported opcode: {opcode}")]
    UnsupportedOpcode { opcode: String },

    /// An analysis result was used after a pass invalidated it.
    #[error("stale analysis used after invalidation: {analysis}")]
    StaleAnalysis { analysis: &'static str },

    /// Textual IR could not be parsed.
    #[error("parse error at line {line}: {message}")]
    ParseError { message: String, line: usize },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CompileError {
    pub fn bug(message: impl Into<String>) -> Self {
        CompileError::CompilerBug { message: message.into() }
    }

    pub fn structure(message: impl Into<String>) -> Self {
        CompileError::StructureError { message: message.into() }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CompileError::CompilerBug { message }
            | CompileError::StructureError { message }
            | CompileError::ParseError { message, .. } => Some(message),
            _ => None,
        }
    }
}
