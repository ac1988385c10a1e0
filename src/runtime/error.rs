//! Structured faults raised during evaluation.
//!
//! Every fault is fatal to the current chunk; the chunk driver renders
//! the snippet-and-caret diagnostic and emits the message. Nothing is
//! retried or resumed.

use thiserror::Error;

use crate::token::Span;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("unsupported operand type(s) for {op}: '{left}' and '{right}'")]
    UnsupportedOperandTypes {
        op: String,
        left: String,
        right: String,
        span: Span,
    },
    #[error("bad operand type for unary {op}: '{operand}'")]
    UnsupportedUnaryOperand {
        op: String,
        operand: String,
        span: Span,
    },
    #[error("{message}")]
    ZeroDivision { message: String, span: Span },
    #[error("cannot access local variable '{name}' where it is not associated with a value")]
    UnboundLocal { name: String, span: Span },
    #[error("name '{name}' is not defined")]
    NameNotFound { name: String, span: Span },
    #[error("'{type_name}' object is not callable")]
    NotCallable { type_name: String, span: Span },
    #[error("{name}() expected {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("{message}")]
    InvalidArgument { message: String, span: Span },
    #[error("assertion failed")]
    AssertionFailed { span: Span },
    #[error("Step limit exceeded")]
    StepLimitExceeded { span: Span },
    #[error("'return' outside function")]
    ReturnOutsideFunction { span: Span },
    #[error("'{keyword}' outside loop")]
    OutsideLoop { keyword: &'static str, span: Span },
    #[error("'for' loops are not supported: this language subset has no iterable values")]
    ForLoopUnsupported { span: Span },
    #[error("{message}")]
    ForeignCall { message: String, span: Span },
    #[error("evaluator invariant violated: {message}")]
    Invariant { message: &'static str, span: Span },
}

impl RuntimeError {
    pub fn span(&self) -> Span {
        match self {
            RuntimeError::UnsupportedOperandTypes { span, .. }
            | RuntimeError::UnsupportedUnaryOperand { span, .. }
            | RuntimeError::ZeroDivision { span, .. }
            | RuntimeError::UnboundLocal { span, .. }
            | RuntimeError::NameNotFound { span, .. }
            | RuntimeError::NotCallable { span, .. }
            | RuntimeError::ArityMismatch { span, .. }
            | RuntimeError::InvalidArgument { span, .. }
            | RuntimeError::AssertionFailed { span }
            | RuntimeError::StepLimitExceeded { span }
            | RuntimeError::ReturnOutsideFunction { span }
            | RuntimeError::OutsideLoop { span, .. }
            | RuntimeError::ForLoopUnsupported { span }
            | RuntimeError::ForeignCall { span, .. }
            | RuntimeError::Invariant { span, .. } => *span,
        }
    }

    /// Diagnostic heading for the snippet renderer.
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeError::UnsupportedOperandTypes { .. }
            | RuntimeError::UnsupportedUnaryOperand { .. } => "UnsupportedOperandTypeError",
            RuntimeError::ZeroDivision { .. } => "ZeroDivisionError",
            RuntimeError::UnboundLocal { .. } => "UnboundLocalError",
            RuntimeError::NameNotFound { .. } => "NameError",
            RuntimeError::NotCallable { .. } | RuntimeError::ArityMismatch { .. } => "TypeError",
            RuntimeError::InvalidArgument { .. } => "ValueError",
            RuntimeError::AssertionFailed { .. } => "AssertionError",
            RuntimeError::StepLimitExceeded { .. }
            | RuntimeError::ReturnOutsideFunction { .. }
            | RuntimeError::OutsideLoop { .. }
            | RuntimeError::ForLoopUnsupported { .. }
            | RuntimeError::Invariant { .. } => "RuntimeError",
            RuntimeError::ForeignCall { .. } => "ModuleError",
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
