//! Module protocol.
//!
//! `from M import a, b` is served before evaluation starts: the machine
//! never sees the import at runtime. A `ModuleLoader` resolves each
//! distinct module name to a bundle of host callables, and every
//! imported name is bound in the global frame as a `ForeignClosure`
//! that marshals scalar values across the boundary. How a loader
//! fetches and caches bundles is the host's concern.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use thiserror::Error;

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use crate::runtime::context::Context;
use crate::runtime::value::Value;
use crate::token::Span;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModuleError {
    #[error("could not connect to module '{module}'")]
    Connection { module: String },
    #[error("module '{module}' has no function '{name}'")]
    UnknownName { module: String, name: String },
    #[error("module '{module}' failed internally: {message}")]
    Internal { module: String, message: String },
    #[error("value of type '{type_name}' cannot cross the module boundary")]
    NotPassable { type_name: String },
}

pub type ModuleResult<T> = Result<T, ModuleError>;

/// Scalar value shapes that cross the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Int(BigInt),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

pub type HostFunction = Rc<dyn Fn(&[HostValue]) -> ModuleResult<HostValue>>;

/// A module function bound into the interpreter.
pub struct ForeignClosure {
    pub name: String,
    pub module: String,
    pub function: HostFunction,
}

impl fmt::Debug for ForeignClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignClosure")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl ForeignClosure {
    pub fn invoke(&self, args: &[Value]) -> ModuleResult<Value> {
        let host_args: Vec<HostValue> = args
            .iter()
            .map(marshal_to_host)
            .collect::<ModuleResult<_>>()?;
        let result = (self.function)(&host_args)?;
        Ok(marshal_from_host(result))
    }
}

pub fn marshal_to_host(value: &Value) -> ModuleResult<HostValue> {
    match value {
        Value::Int(v) => Ok(HostValue::Int(v.clone())),
        Value::Float(v) => Ok(HostValue::Float(*v)),
        Value::Str(v) => Ok(HostValue::Str(v.to_string())),
        Value::Bool(v) => Ok(HostValue::Bool(*v)),
        Value::Undefined => Ok(HostValue::Null),
        other => Err(ModuleError::NotPassable {
            type_name: other.type_name().to_string(),
        }),
    }
}

pub fn marshal_from_host(value: HostValue) -> Value {
    match value {
        HostValue::Int(v) => Value::Int(v),
        HostValue::Float(v) => Value::Float(v),
        HostValue::Str(v) => Value::str(&v),
        HostValue::Bool(v) => Value::Bool(v),
        HostValue::Null => Value::Undefined,
    }
}

/// Resolves module names to bundles of host callables.
pub trait ModuleLoader {
    fn load(&mut self, module: &str) -> ModuleResult<HashMap<String, HostFunction>>;
}

/// Loader for hosts that configure no modules; every import fails.
#[derive(Debug, Default)]
pub struct NullLoader;

impl ModuleLoader for NullLoader {
    fn load(&mut self, module: &str) -> ModuleResult<HashMap<String, HostFunction>> {
        Err(ModuleError::Connection {
            module: module.to_string(),
        })
    }
}

/// In-memory loader; the test suites and embedding hosts register
/// bundles up front.
#[derive(Default)]
pub struct StaticLoader {
    modules: HashMap<String, HashMap<String, HostFunction>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        function: HostFunction,
    ) {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(name.into(), function);
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&mut self, module: &str) -> ModuleResult<HashMap<String, HostFunction>> {
        self.modules
            .get(module)
            .cloned()
            .ok_or(ModuleError::Connection {
                module: module.to_string(),
            })
    }
}

/// A preload failure, anchored to the `from ... import` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadError {
    pub error: ModuleError,
    pub span: Span,
}

/// Scans the program for `from M import ...` statements, loads each
/// distinct module once, and binds every imported name in the global
/// frame. Runs to completion before evaluation starts.
pub fn preload_modules(
    program: &Program,
    loader: &mut dyn ModuleLoader,
    ctx: &mut Context,
) -> Result<(), PreloadError> {
    let mut imports: Vec<(&str, &[String], Span)> = Vec::new();
    for stmt in &program.statements {
        collect_imports(stmt, &mut imports);
    }

    let mut bundles: HashMap<String, HashMap<String, HostFunction>> = HashMap::new();
    for (module, names, span) in imports {
        if !bundles.contains_key(module) {
            let bundle = loader
                .load(module)
                .map_err(|error| PreloadError { error, span })?;
            bundles.insert(module.to_string(), bundle);
        }
        let bundle = &bundles[module];
        for name in names {
            let function = bundle.get(name).ok_or(PreloadError {
                error: ModuleError::UnknownName {
                    module: module.to_string(),
                    name: name.clone(),
                },
                span,
            })?;
            let foreign = ForeignClosure {
                name: name.clone(),
                module: module.to_string(),
                function: Rc::clone(function),
            };
            ctx.arena
                .bind(ctx.global_env, name.clone(), Value::Foreign(Rc::new(foreign)));
        }
    }
    Ok(())
}

fn collect_imports<'a>(stmt: &'a Stmt, imports: &mut Vec<(&'a str, &'a [String], Span)>) {
    match &stmt.kind {
        StmtKind::FromImport { module, names } => imports.push((module, names, stmt.span)),
        StmtKind::If { body, orelse, .. } => {
            body.iter().for_each(|s| collect_imports(s, imports));
            orelse.iter().for_each(|s| collect_imports(s, imports));
        }
        StmtKind::While { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::FunctionDef { body, .. } => {
            body.iter().for_each(|s| collect_imports(s, imports));
        }
        StmtKind::Expr(expr)
        | StmtKind::Assign { value: expr, .. }
        | StmtKind::Assert(expr)
        | StmtKind::Return(Some(expr)) => collect_imports_expr(expr, imports),
        StmtKind::AnnAssign { value, .. } => collect_imports_expr(value, imports),
        _ => {}
    }
}

fn collect_imports_expr<'a>(expr: &'a Expr, imports: &mut Vec<(&'a str, &'a [String], Span)>) {
    if let ExprKind::MultiLambda { body, .. } = &expr.kind {
        body.iter().for_each(|s| collect_imports(s, imports));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::runtime::context::Options;

    fn doubling_loader() -> StaticLoader {
        let mut loader = StaticLoader::new();
        loader.register(
            "arith",
            "double",
            Rc::new(|args: &[HostValue]| match args {
                [HostValue::Int(v)] => Ok(HostValue::Int(v * 2)),
                _ => Err(ModuleError::Internal {
                    module: "arith".to_string(),
                    message: "double expects one integer".to_string(),
                }),
            }),
        );
        loader
    }

    #[test]
    fn preload_binds_each_imported_name() {
        let program = parse_source("from arith import double\ndouble(21)\n").expect("parse");
        let mut ctx = Context::new(Options::default());
        let mut loader = doubling_loader();
        preload_modules(&program, &mut loader, &mut ctx).expect("preload succeeds");

        let bound = ctx
            .arena
            .lookup(ctx.global_env, "double")
            .expect("double is bound");
        assert!(matches!(bound, Value::Foreign(_)));
        assert!(ctx.arena.lookup(ctx.global_env, "arith").is_none());
    }

    #[test]
    fn preload_fails_for_unknown_module_and_name() {
        let mut ctx = Context::new(Options::default());
        let program = parse_source("from nowhere import thing\n").expect("parse");
        let err = preload_modules(&program, &mut NullLoader, &mut ctx)
            .expect_err("expected connection failure");
        assert!(matches!(err.error, ModuleError::Connection { .. }));

        let program = parse_source("from arith import missing\n").expect("parse");
        let mut loader = doubling_loader();
        let err = preload_modules(&program, &mut loader, &mut ctx)
            .expect_err("expected unknown name failure");
        assert_eq!(
            err.error,
            ModuleError::UnknownName {
                module: "arith".to_string(),
                name: "missing".to_string(),
            }
        );
    }

    #[test]
    fn marshalling_round_trips_scalars() {
        for value in [
            Value::int(7),
            Value::Float(2.5),
            Value::str("hi"),
            Value::Bool(true),
            Value::Undefined,
        ] {
            let host = marshal_to_host(&value).expect("scalar should marshal");
            let back = marshal_from_host(host);
            assert_eq!(value.to_output(), back.to_output());
        }
    }

    #[test]
    fn complex_values_cannot_cross_the_boundary() {
        let err = marshal_to_host(&Value::Complex(crate::runtime::num::Complex64::new(
            1.0, 2.0,
        )))
        .expect_err("expected marshal failure");
        assert_eq!(
            err,
            ModuleError::NotPassable {
                type_name: "complex".to_string()
            }
        );
    }

    #[test]
    fn foreign_invocation_marshals_both_ways() {
        let mut loader = doubling_loader();
        let bundle = loader.load("arith").expect("bundle");
        let foreign = ForeignClosure {
            name: "double".to_string(),
            module: "arith".to_string(),
            function: Rc::clone(&bundle["double"]),
        };
        let result = foreign.invoke(&[Value::int(21)]).expect("invoke succeeds");
        assert_eq!(result.to_output(), "42");
    }
}
