//! Runtime value model.
//!
//! A tagged union with exhaustive matches; no object inheritance. The
//! `Undefined` case doubles as Python's `None`.

use std::collections::HashSet;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::Zero;

use crate::ast::{Expr, Stmt};
use crate::builtins::BuiltinFunction;
use crate::module::ForeignClosure;
use crate::runtime::environment::EnvId;
use crate::runtime::num::{Complex64, format_complex, format_float};

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(Rc<str>),
    Complex(Complex64),
    Closure(Rc<Closure>),
    Foreign(Rc<ForeignClosure>),
    Builtin(BuiltinFunction),
    /// Wrapper for a caught fault, used as a finished chunk result.
    Error(Rc<str>),
}

/// Function value capturing the frame it was defined in. `locals` holds
/// the names assigned anywhere in the body (without recursing into
/// nested functions); the machine consults it for the UnboundLocalError
/// rule.
#[derive(Debug, Clone)]
pub struct Closure {
    pub name: String,
    pub params: Vec<String>,
    pub body: ClosureBody,
    pub env: EnvId,
    pub locals: Rc<HashSet<String>>,
}

#[derive(Debug, Clone)]
pub enum ClosureBody {
    /// `def` and multi-statement lambda bodies.
    Block(Rc<Vec<Stmt>>),
    /// Single-expression lambda bodies.
    Expr(Rc<Expr>),
}

impl Value {
    pub fn str(text: &str) -> Self {
        Value::Str(Rc::from(text))
    }

    pub fn int(value: i64) -> Self {
        Value::Int(BigInt::from(value))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Bool(value) => *value,
            Value::Int(value) => !value.is_zero(),
            Value::Float(value) => *value != 0.0,
            Value::Str(value) => !value.is_empty(),
            Value::Complex(value) => value.re != 0.0 || value.im != 0.0,
            Value::Closure(_) | Value::Foreign(_) | Value::Builtin(_) | Value::Error(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Complex(_) => "complex",
            Value::Closure(_) => "function",
            Value::Foreign(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Error(_) => "error",
        }
    }

    /// Text form used by `print`, `str`, and chunk results.
    pub fn to_output(&self) -> String {
        match self {
            Value::Undefined => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => format_float(*value),
            Value::Str(value) => value.to_string(),
            Value::Complex(value) => format_complex(*value),
            Value::Closure(closure) => format!("<function {}>", closure.name),
            Value::Foreign(foreign) => format!("<function {}>", foreign.name),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Value::Error(message) => message.to_string(),
        }
    }
}
