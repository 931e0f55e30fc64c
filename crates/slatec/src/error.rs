use serde::Serialize;
use slate_bytecode::{BytecodeError, VarType};
use thiserror::Error;

use crate::ast::Position;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("undefined function `{name}`")]
    UndefinedFunction { name: String, position: Position },

    #[error("function `{name}` expects {expected} arguments, got {got}")]
    ParameterCountMismatch {
        name: String,
        expected: usize,
        got: usize,
        position: Position,
    },

    #[error("undefined variable `{name}`")]
    UndefinedVariable { name: String, position: Position },

    #[error("cannot convert {from} to {to}")]
    InvalidConversion {
        from: VarType,
        to: VarType,
        position: Position,
    },

    #[error("{msg}")]
    InvalidOperation { msg: String, position: Position },

    #[error("function `{name}` is already declared in this block")]
    DuplicateFunction { name: String, position: Position },

    #[error("native symbol `{symbol}` is not bound")]
    UnresolvedNative { symbol: String, position: Position },

    #[error("internal error: {0}")]
    Internal(#[from] BytecodeError),

    #[error("internal error: {0}")]
    Invariant(String),
}

impl CompileError {
    pub fn invalid_operation(msg: impl Into<String>, position: Position) -> Self {
        CompileError::InvalidOperation {
            msg: msg.into(),
            position,
        }
    }

    /// Source position of the offending node, if the error has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            CompileError::UndefinedFunction { position, .. }
            | CompileError::ParameterCountMismatch { position, .. }
            | CompileError::UndefinedVariable { position, .. }
            | CompileError::InvalidConversion { position, .. }
            | CompileError::InvalidOperation { position, .. }
            | CompileError::DuplicateFunction { position, .. }
            | CompileError::UnresolvedNative { position, .. } => Some(*position),
            CompileError::Internal(_) | CompileError::Invariant(_) => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal(_) | CompileError::Invariant(_))
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            message: self.to_string(),
            position: self.position(),
            severity: Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

/// The single user-facing report of a failed translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub position: Option<Position>,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
