//! Static name resolution.
//!
//! Two passes per block scope. The first pass declares sibling `def`
//! names as redefinable placeholders (so sibling functions can refer to
//! each other) and pre-declares the block's assignment targets (so a
//! read before the assignment reaches the machine and raises
//! UnboundLocalError there, as in Python). The second pass visits
//! statements in order and enforces the single-real-definition rule,
//! the closed-over-rebind rule, and `nonlocal` validity.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use crate::token::Span;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolverError {
    #[error("name '{name}' is not defined")]
    NameNotFound {
        name: String,
        span: Span,
        suggestion: Option<String>,
    },
    #[error("name '{name}' has already been defined in this scope")]
    NameReassignment { name: String, span: Span },
    #[error("no binding for nonlocal '{name}' found in an enclosing scope")]
    NonlocalWithoutBinding { name: String, span: Span },
}

impl ResolverError {
    pub fn span(&self) -> Span {
        match self {
            ResolverError::NameNotFound { span, .. }
            | ResolverError::NameReassignment { span, .. }
            | ResolverError::NonlocalWithoutBinding { span, .. } => *span,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResolverError::NameNotFound { .. } => "NameNotFoundError",
            ResolverError::NameReassignment { .. } => "NameReassignmentError",
            ResolverError::NonlocalWithoutBinding { .. } => "NameNotFoundError",
        }
    }

    /// The "did you mean" line appended to the rendered diagnostic.
    pub fn suggestion_line(&self) -> Option<String> {
        match self {
            ResolverError::NameNotFound {
                suggestion: Some(candidate),
                ..
            } => Some(format!("Perhaps you meant to type '{candidate}'?")),
            _ => None,
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolverError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// Hoisted `def` name; may be redefined once for real.
    Placeholder,
    /// Assignment target seen in pass one but not yet reached.
    PreDeclared,
    /// Really defined (pass two reached the definition).
    Defined,
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Builtin,
    Global,
    Function,
    Block,
}

struct Scope {
    kind: ScopeKind,
    bindings: HashMap<String, Binding>,
    nonlocals: HashSet<String>,
    globals: HashSet<String>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            bindings: HashMap::new(),
            nonlocals: HashSet::new(),
            globals: HashSet::new(),
        }
    }
}

pub struct Resolver {
    scopes: Vec<Scope>,
}

impl Resolver {
    /// `builtin_names` seeds the bottom frame; `global_names` seeds the
    /// user global frame with names defined by earlier chunks.
    pub fn new<'a, 'b>(
        builtin_names: impl IntoIterator<Item = &'a str>,
        global_names: impl IntoIterator<Item = &'b str>,
    ) -> Self {
        let mut builtin_scope = Scope::new(ScopeKind::Builtin);
        for name in builtin_names {
            builtin_scope.bindings.insert(name.to_string(), Binding::Defined);
        }
        let mut global_scope = Scope::new(ScopeKind::Global);
        for name in global_names {
            global_scope.bindings.insert(name.to_string(), Binding::Defined);
        }
        Self {
            scopes: vec![builtin_scope, global_scope],
        }
    }

    pub fn resolve(&mut self, program: &Program) -> ResolveResult<()> {
        self.resolve_statements(&program.statements)
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) -> ResolveResult<()> {
        self.hoist(statements);
        for stmt in statements {
            self.resolve_statement(stmt)?;
        }
        Ok(())
    }

    /// Pass one for the current scope.
    fn hoist(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::FunctionDef { name, .. } => {
                    self.current_mut()
                        .bindings
                        .insert(name.clone(), Binding::Placeholder);
                }
                StmtKind::Assign { name, .. } | StmtKind::AnnAssign { name, .. } => {
                    self.current_mut()
                        .bindings
                        .entry(name.clone())
                        .or_insert(Binding::PreDeclared);
                }
                _ => {}
            }
        }
    }

    fn resolve_statement(&mut self, stmt: &Stmt) -> ResolveResult<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) | StmtKind::Assert(expr) => self.resolve_expr(expr),
            StmtKind::Assign { name, value } => {
                self.resolve_expr(value)?;
                self.check_enclosing_rebind(name, stmt.span)?;
                self.declare(name, stmt.span)
            }
            StmtKind::AnnAssign {
                name,
                annotation,
                value,
            } => {
                self.resolve_expr(annotation)?;
                self.resolve_expr(value)?;
                self.check_enclosing_rebind(name, stmt.span)?;
                self.declare(name, stmt.span)
            }
            StmtKind::FunctionDef { name, params, body } => {
                self.declare(name, stmt.span)?;
                self.with_scope(ScopeKind::Function, |resolver| {
                    for param in params {
                        resolver
                            .current_mut()
                            .bindings
                            .insert(param.clone(), Binding::Parameter);
                    }
                    resolver.resolve_statements(body)
                })
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            StmtKind::If {
                condition,
                body,
                orelse,
            } => {
                self.resolve_expr(condition)?;
                self.with_scope(ScopeKind::Block, |resolver| {
                    resolver.resolve_statements(body)
                })?;
                self.with_scope(ScopeKind::Block, |resolver| {
                    resolver.resolve_statements(orelse)
                })
            }
            StmtKind::While { condition, body } => {
                self.resolve_expr(condition)?;
                self.with_scope(ScopeKind::Block, |resolver| {
                    resolver.resolve_statements(body)
                })
            }
            StmtKind::For {
                target,
                iterable,
                body,
            } => {
                self.resolve_expr(iterable)?;
                self.with_scope(ScopeKind::Block, |resolver| {
                    resolver
                        .current_mut()
                        .bindings
                        .insert(target.clone(), Binding::Defined);
                    resolver.resolve_statements(body)
                })
            }
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::FromImport { names, .. } => {
                for name in names {
                    self.declare(name, stmt.span)?;
                }
                Ok(())
            }
            StmtKind::Global(name) => {
                self.current_mut().globals.insert(name.clone());
                Ok(())
            }
            StmtKind::NonLocal(name) => {
                let bound_in_ancestor = self.scopes[..self.scopes.len() - 1]
                    .iter()
                    .any(|scope| {
                        scope.kind != ScopeKind::Builtin && scope.bindings.contains_key(name)
                    });
                if !bound_in_ancestor {
                    return Err(ResolverError::NonlocalWithoutBinding {
                        name: name.clone(),
                        span: stmt.span,
                    });
                }
                self.current_mut().nonlocals.insert(name.clone());
                Ok(())
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) -> ResolveResult<()> {
        match &expr.kind {
            ExprKind::None
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::BigInt(_)
            | ExprKind::Complex { .. }
            | ExprKind::Str(_) => Ok(()),
            ExprKind::Name(name) => self.lookup(name, expr.span),
            ExprKind::Grouping(inner) => self.resolve_expr(inner),
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Binary { left, right, .. }
            | ExprKind::BoolOp { left, right, .. }
            | ExprKind::Compare { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            ExprKind::Call { callee, args } => {
                self.resolve_expr(callee)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
                Ok(())
            }
            ExprKind::Ternary {
                predicate,
                consequent,
                alternative,
            } => {
                self.resolve_expr(predicate)?;
                self.resolve_expr(consequent)?;
                self.resolve_expr(alternative)
            }
            ExprKind::Lambda { params, body } => {
                self.with_scope(ScopeKind::Function, |resolver| {
                    for param in params {
                        resolver
                            .current_mut()
                            .bindings
                            .insert(param.clone(), Binding::Parameter);
                    }
                    resolver.resolve_expr(body)
                })
            }
            ExprKind::MultiLambda { params, body } => {
                self.with_scope(ScopeKind::Function, |resolver| {
                    for param in params {
                        resolver
                            .current_mut()
                            .bindings
                            .insert(param.clone(), Binding::Parameter);
                    }
                    resolver.resolve_statements(body)
                })
            }
        }
    }

    fn with_scope<F>(&mut self, kind: ScopeKind, body: F) -> ResolveResult<()>
    where
        F: FnOnce(&mut Self) -> ResolveResult<()>,
    {
        self.scopes.push(Scope::new(kind));
        let result = body(self);
        self.scopes.pop();
        result
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    /// Pass-two declaration: a second real definition of the same name
    /// in the same frame is an error.
    fn declare(&mut self, name: &str, span: Span) -> ResolveResult<()> {
        let scope = self.current_mut();
        if scope.bindings.get(name) == Some(&Binding::Defined) {
            return Err(ResolverError::NameReassignment {
                name: name.to_string(),
                span,
            });
        }
        scope.bindings.insert(name.to_string(), Binding::Defined);
        Ok(())
    }

    /// Walks from the frame outside the current one up to and including
    /// the nearest enclosing function frame; a binding found there is a
    /// closed-over name that cannot be rebound without `nonlocal`.
    fn check_enclosing_rebind(&self, name: &str, span: Span) -> ResolveResult<()> {
        let current = self.scopes.last().expect("scope stack is never empty");
        if current.nonlocals.contains(name) || current.globals.contains(name) {
            return Ok(());
        }
        for scope in self.scopes[..self.scopes.len() - 1].iter().rev() {
            match scope.kind {
                ScopeKind::Global | ScopeKind::Builtin => break,
                ScopeKind::Block => {
                    if scope.bindings.contains_key(name) {
                        return Err(ResolverError::NameReassignment {
                            name: name.to_string(),
                            span,
                        });
                    }
                }
                ScopeKind::Function => {
                    if scope.bindings.contains_key(name) {
                        return Err(ResolverError::NameReassignment {
                            name: name.to_string(),
                            span,
                        });
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str, span: Span) -> ResolveResult<()> {
        if self
            .scopes
            .iter()
            .rev()
            .any(|scope| scope.bindings.contains_key(name))
        {
            return Ok(());
        }
        let visible: Vec<&str> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.bindings.keys().map(String::as_str))
            .collect();
        Err(ResolverError::NameNotFound {
            name: name.to_string(),
            span,
            suggestion: best_suggestion(name, &visible),
        })
    }
}

/// Resolves a whole program against the given built-in and global name
/// sets. Reports the first violation in source order.
pub fn resolve<'a, 'b>(
    program: &Program,
    builtin_names: impl IntoIterator<Item = &'a str>,
    global_names: impl IntoIterator<Item = &'b str>,
) -> ResolveResult<()> {
    Resolver::new(builtin_names, global_names).resolve(program)
}

/// Closest visible name by edit distance; distances of 4 or more
/// disable the suggestion.
fn best_suggestion(name: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|candidate| (levenshtein(name, candidate), *candidate))
        .min_by_key(|(distance, candidate)| (*distance, candidate.to_string()))
        .filter(|(distance, _)| *distance < 4)
        .map(|(_, candidate)| candidate.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
