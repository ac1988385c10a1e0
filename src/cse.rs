//! The CSE machine: an explicit-control evaluator over three stacks.
//!
//! The Control holds pending work (AST nodes to evaluate, instructions
//! to run after their operands), the Stash holds produced values, and
//! the environment stack tracks the active lexical frame. One step
//! processes exactly one control item; scheduling is single-threaded
//! and cooperative, and each step may push further items onto either
//! stack.
//!
//! Evaluation order is canonical: left operand before right, arguments
//! left to right after the callee, conditions before branches. `and`
//! and `or` short-circuit: the right operand is pushed onto the Control
//! only when the left value does not decide.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{
    BinaryOp, BoolOpKind, CompareOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp,
};
use crate::builtins;
use crate::module::ModuleError;
use crate::runtime::context::Context;
use crate::runtime::environment::EnvId;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::num::{Complex64, parse_bigint_lexeme};
use crate::runtime::ops::{self, OpFault};
use crate::runtime::value::{Closure, ClosureBody, Value};
use crate::token::Span;

/// One unit of pending work.
#[derive(Debug, Clone)]
pub enum ControlItem {
    Stmt(Stmt),
    Expr(Expr),
    Instr(Instruction),
}

impl ControlItem {
    fn span(&self) -> Span {
        match self {
            ControlItem::Stmt(stmt) => stmt.span,
            ControlItem::Expr(expr) => expr.span,
            ControlItem::Instr(instr) => instr.span(),
        }
    }
}

/// Post-evaluation step scheduled behind its operands.
#[derive(Debug, Clone)]
pub enum Instruction {
    UnaryOp {
        op: UnaryOp,
        span: Span,
    },
    BinaryOp {
        op: BinaryOp,
        span: Span,
    },
    Compare {
        op: CompareOp,
        span: Span,
    },
    /// Holds the unevaluated right operand for short-circuiting.
    BoolOp {
        op: BoolOpKind,
        right: Expr,
        span: Span,
    },
    Assignment {
        name: String,
        span: Span,
    },
    Application {
        argc: usize,
        span: Span,
    },
    Branch {
        consequent: BranchArm,
        alternate: Option<BranchArm>,
        span: Span,
    },
    /// Leaves the callee's frame.
    Reset {
        span: Span,
    },
    /// Reached only when a `def` body finishes without `return`.
    EndOfFunctionBody {
        span: Span,
    },
    /// Discards the stash top.
    Pop,
    /// Re-tests the loop condition after each iteration.
    While {
        condition: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Assert {
        span: Span,
    },
}

impl Instruction {
    fn span(&self) -> Span {
        match self {
            Instruction::UnaryOp { span, .. }
            | Instruction::BinaryOp { span, .. }
            | Instruction::Compare { span, .. }
            | Instruction::BoolOp { span, .. }
            | Instruction::Assignment { span, .. }
            | Instruction::Application { span, .. }
            | Instruction::Branch { span, .. }
            | Instruction::Reset { span }
            | Instruction::EndOfFunctionBody { span }
            | Instruction::While { span, .. }
            | Instruction::Assert { span } => *span,
            Instruction::Pop => Span::default(),
        }
    }
}

/// Either arm of a branch: a statement block or a single expression.
#[derive(Debug, Clone)]
pub enum BranchArm {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

pub struct CseMachine<'c> {
    control: Vec<ControlItem>,
    stash: Vec<Value>,
    env_stack: Vec<EnvId>,
    ctx: &'c mut Context,
}

/// Evaluates a whole program against the context's accumulated global
/// frame and returns the stash top (`Undefined` when the stash ends up
/// empty).
pub fn evaluate_program(ctx: &mut Context, program: &Program) -> RuntimeResult<Value> {
    CseMachine::new(ctx).run_program(program)
}

impl<'c> CseMachine<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        let global = ctx.global_env;
        Self {
            control: Vec::new(),
            stash: Vec::new(),
            env_stack: vec![global],
            ctx,
        }
    }

    pub fn run_program(&mut self, program: &Program) -> RuntimeResult<Value> {
        for stmt in program.statements.iter().rev() {
            self.control.push(ControlItem::Stmt(stmt.clone()));
        }
        self.run()
    }

    fn run(&mut self) -> RuntimeResult<Value> {
        while let Some(item) = self.control.pop() {
            self.count_step(item.span())?;
            match item {
                ControlItem::Stmt(stmt) => self.step_stmt(stmt)?,
                ControlItem::Expr(expr) => self.step_expr(expr)?,
                ControlItem::Instr(instr) => self.step_instr(instr)?,
            }
        }
        Ok(self.stash.pop().unwrap_or(Value::Undefined))
    }

    fn count_step(&mut self, span: Span) -> RuntimeResult<()> {
        if self.ctx.options.is_prelude {
            return Ok(());
        }
        self.ctx.steps += 1;
        self.ctx.env_steps_total += 1;
        if let Some(budget) = self.ctx.options.step_budget() {
            if self.ctx.steps > budget {
                return Err(RuntimeError::StepLimitExceeded { span });
            }
        }
        Ok(())
    }

    fn current_env(&self) -> EnvId {
        *self.env_stack.last().unwrap_or(&self.ctx.global_env)
    }

    fn step_stmt(&mut self, stmt: Stmt) -> RuntimeResult<()> {
        let span = stmt.span;
        match stmt.kind {
            StmtKind::Expr(expr) => self.control.push(ControlItem::Expr(expr)),
            StmtKind::Assign { name, value } => {
                self.control
                    .push(ControlItem::Instr(Instruction::Assignment { name, span }));
                self.control.push(ControlItem::Expr(value));
            }
            StmtKind::AnnAssign { name, value, .. } => {
                // The annotation is static-only; evaluation skips it.
                self.control
                    .push(ControlItem::Instr(Instruction::Assignment { name, span }));
                self.control.push(ControlItem::Expr(value));
            }
            StmtKind::FunctionDef { name, params, body } => {
                // Definition is immediate; no instruction is scheduled.
                let locals = collect_locals(&body);
                let closure = Closure {
                    name: name.clone(),
                    params,
                    body: ClosureBody::Block(Rc::new(body)),
                    env: self.current_env(),
                    locals: Rc::new(locals),
                };
                let env = self.current_env();
                self.ctx
                    .arena
                    .bind(env, name, Value::Closure(Rc::new(closure)));
            }
            StmtKind::Return(value) => {
                loop {
                    match self.control.last() {
                        Some(ControlItem::Instr(Instruction::Reset { .. })) => break,
                        Some(_) => {
                            self.control.pop();
                        }
                        None => return Err(RuntimeError::ReturnOutsideFunction { span }),
                    }
                }
                match value {
                    Some(expr) => self.control.push(ControlItem::Expr(expr)),
                    None => self.stash.push(Value::Undefined),
                }
            }
            StmtKind::If {
                condition,
                body,
                orelse,
            } => {
                let alternate = if orelse.is_empty() {
                    None
                } else {
                    Some(BranchArm::Block(orelse))
                };
                self.control.push(ControlItem::Instr(Instruction::Branch {
                    consequent: BranchArm::Block(body),
                    alternate,
                    span,
                }));
                self.control.push(ControlItem::Expr(condition));
            }
            StmtKind::While { condition, body } => {
                self.control.push(ControlItem::Instr(Instruction::While {
                    condition: condition.clone(),
                    body,
                    span,
                }));
                self.control.push(ControlItem::Expr(condition));
            }
            StmtKind::For { .. } => {
                return Err(RuntimeError::ForLoopUnsupported { span });
            }
            StmtKind::Break => self.unwind_loop(span, true)?,
            StmtKind::Continue => self.unwind_loop(span, false)?,
            StmtKind::Pass => {}
            StmtKind::Assert(value) => {
                self.control
                    .push(ControlItem::Instr(Instruction::Assert { span }));
                self.control.push(ControlItem::Expr(value));
            }
            // Imports are preloaded into the global frame before the
            // machine starts; scope declarations are resolver-only.
            StmtKind::FromImport { .. } | StmtKind::Global(_) | StmtKind::NonLocal(_) => {}
        }
        Ok(())
    }

    /// Discards control items up to the innermost `While` instruction.
    /// `exit` pops the loop as well; otherwise the loop condition is
    /// rescheduled.
    fn unwind_loop(&mut self, span: Span, exit: bool) -> RuntimeResult<()> {
        let keyword = if exit { "break" } else { "continue" };
        loop {
            match self.control.last() {
                Some(ControlItem::Instr(Instruction::While { condition, .. })) => {
                    let condition = condition.clone();
                    if exit {
                        self.control.pop();
                    } else {
                        self.control.push(ControlItem::Expr(condition));
                    }
                    return Ok(());
                }
                Some(ControlItem::Instr(Instruction::Reset { .. })) | None => {
                    return Err(RuntimeError::OutsideLoop { keyword, span });
                }
                Some(_) => {
                    self.control.pop();
                }
            }
        }
    }

    fn step_expr(&mut self, expr: Expr) -> RuntimeResult<()> {
        let span = expr.span;
        match expr.kind {
            ExprKind::None => self.stash.push(Value::Undefined),
            ExprKind::Bool(value) => self.stash.push(Value::Bool(value)),
            ExprKind::Number(value) => self.stash.push(Value::Float(value)),
            ExprKind::BigInt(lexeme) => {
                let value =
                    parse_bigint_lexeme(&lexeme).ok_or(RuntimeError::Invariant {
                        message: "tokenizer admitted an unparseable integer literal",
                        span,
                    })?;
                self.stash.push(Value::Int(value));
            }
            ExprKind::Complex { real, imag } => {
                self.stash.push(Value::Complex(Complex64::new(real, imag)));
            }
            ExprKind::Str(value) => self.stash.push(Value::str(&value)),
            ExprKind::Name(name) => {
                let value = self.lookup_name(&name, span)?;
                self.stash.push(value);
            }
            ExprKind::Grouping(inner) => self.control.push(ControlItem::Expr(*inner)),
            ExprKind::Unary {
                op,
                op_span,
                operand,
            } => {
                self.control
                    .push(ControlItem::Instr(Instruction::UnaryOp { op, span: op_span }));
                self.control.push(ControlItem::Expr(*operand));
            }
            ExprKind::Binary {
                left,
                op,
                op_span,
                right,
            } => {
                self.control
                    .push(ControlItem::Instr(Instruction::BinaryOp { op, span: op_span }));
                self.control.push(ControlItem::Expr(*right));
                self.control.push(ControlItem::Expr(*left));
            }
            ExprKind::Compare {
                left,
                op,
                op_span,
                right,
            } => {
                self.control
                    .push(ControlItem::Instr(Instruction::Compare { op, span: op_span }));
                self.control.push(ControlItem::Expr(*right));
                self.control.push(ControlItem::Expr(*left));
            }
            ExprKind::BoolOp {
                left,
                op,
                op_span,
                right,
            } => {
                self.control.push(ControlItem::Instr(Instruction::BoolOp {
                    op,
                    right: *right,
                    span: op_span,
                }));
                self.control.push(ControlItem::Expr(*left));
            }
            ExprKind::Call { callee, args } => {
                self.control
                    .push(ControlItem::Instr(Instruction::Application {
                        argc: args.len(),
                        span,
                    }));
                for arg in args.into_iter().rev() {
                    self.control.push(ControlItem::Expr(arg));
                }
                self.control.push(ControlItem::Expr(*callee));
            }
            ExprKind::Ternary {
                predicate,
                consequent,
                alternative,
            } => {
                self.control.push(ControlItem::Instr(Instruction::Branch {
                    consequent: BranchArm::Expr(consequent),
                    alternate: Some(BranchArm::Expr(alternative)),
                    span,
                }));
                self.control.push(ControlItem::Expr(*predicate));
            }
            ExprKind::Lambda { params, body } => {
                let closure = Closure {
                    name: "<lambda>".to_string(),
                    params,
                    body: ClosureBody::Expr(Rc::new(*body)),
                    env: self.current_env(),
                    locals: Rc::new(HashSet::new()),
                };
                self.stash.push(Value::Closure(Rc::new(closure)));
            }
            ExprKind::MultiLambda { params, body } => {
                let locals = collect_locals(&body);
                let closure = Closure {
                    name: "<lambda>".to_string(),
                    params,
                    body: ClosureBody::Block(Rc::new(body)),
                    env: self.current_env(),
                    locals: Rc::new(locals),
                };
                self.stash.push(Value::Closure(Rc::new(closure)));
            }
        }
        Ok(())
    }

    fn step_instr(&mut self, instr: Instruction) -> RuntimeResult<()> {
        match instr {
            Instruction::UnaryOp { op, span } => {
                let operand = self.pop_stash(span)?;
                let result = ops::apply_unary(op, &operand)
                    .map_err(|fault| fault_to_error(fault, op.symbol(), span))?;
                self.stash.push(result);
            }
            Instruction::BinaryOp { op, span } => {
                let right = self.pop_stash(span)?;
                let left = self.pop_stash(span)?;
                let result = ops::apply_binary(op, &left, &right)
                    .map_err(|fault| fault_to_error(fault, op.symbol(), span))?;
                self.stash.push(result);
            }
            Instruction::Compare { op, span } => {
                let right = self.pop_stash(span)?;
                let left = self.pop_stash(span)?;
                let result = ops::apply_compare(op, &left, &right)
                    .map_err(|fault| fault_to_error(fault, op.symbol(), span))?;
                self.stash.push(result);
            }
            Instruction::BoolOp { op, right, span } => {
                let left = self.pop_stash(span)?;
                let decided = match op {
                    BoolOpKind::Or => left.is_truthy(),
                    BoolOpKind::And => !left.is_truthy(),
                };
                if decided {
                    self.stash.push(left);
                } else {
                    self.control.push(ControlItem::Expr(right));
                }
            }
            Instruction::Assignment { name, span } => {
                let value = self.pop_stash(span)?;
                let env = self.current_env();
                self.ctx.arena.bind(env, name, value);
            }
            Instruction::Application { argc, span } => self.apply(argc, span)?,
            Instruction::Branch {
                consequent,
                alternate,
                span,
            } => {
                let condition = self.pop_stash(span)?;
                if condition.is_truthy() {
                    self.push_arm(consequent);
                } else if let Some(alternate) = alternate {
                    self.push_arm(alternate);
                }
            }
            Instruction::Reset { .. } => {
                if self.env_stack.len() > 1 {
                    self.env_stack.pop();
                }
            }
            Instruction::EndOfFunctionBody { .. } => self.stash.push(Value::Undefined),
            Instruction::Pop => {
                self.stash.pop();
            }
            Instruction::While {
                condition,
                body,
                span,
            } => {
                let tested = self.pop_stash(span)?;
                if tested.is_truthy() {
                    self.control.push(ControlItem::Instr(Instruction::While {
                        condition: condition.clone(),
                        body: body.clone(),
                        span,
                    }));
                    self.control.push(ControlItem::Expr(condition));
                    for stmt in body.into_iter().rev() {
                        self.control.push(ControlItem::Stmt(stmt));
                    }
                }
            }
            Instruction::Assert { span } => {
                let value = self.pop_stash(span)?;
                if !value.is_truthy() {
                    return Err(RuntimeError::AssertionFailed { span });
                }
            }
        }
        Ok(())
    }

    fn push_arm(&mut self, arm: BranchArm) {
        match arm {
            BranchArm::Block(stmts) => {
                for stmt in stmts.into_iter().rev() {
                    self.control.push(ControlItem::Stmt(stmt));
                }
            }
            BranchArm::Expr(expr) => self.control.push(ControlItem::Expr(*expr)),
        }
    }

    fn apply(&mut self, argc: usize, span: Span) -> RuntimeResult<()> {
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop_stash(span)?);
        }
        args.reverse();
        let callee = self.pop_stash(span)?;

        match callee {
            Value::Closure(closure) => self.apply_closure(&closure, args, span),
            Value::Foreign(foreign) => {
                let result = foreign.invoke(&args).map_err(|error| match error {
                    ModuleError::NotPassable { type_name } => RuntimeError::ForeignCall {
                        message: format!(
                            "value of type '{type_name}' cannot cross the module boundary"
                        ),
                        span,
                    },
                    other => RuntimeError::ForeignCall {
                        message: other.to_string(),
                        span,
                    },
                })?;
                self.stash.push(result);
                Ok(())
            }
            Value::Builtin(builtin) => {
                let result = builtins::call_builtin(self.ctx, builtin, &args, span)?;
                self.stash.push(result);
                Ok(())
            }
            other => Err(RuntimeError::NotCallable {
                type_name: other.type_name().to_string(),
                span,
            }),
        }
    }

    fn apply_closure(
        &mut self,
        closure: &Closure,
        args: Vec<Value>,
        span: Span,
    ) -> RuntimeResult<()> {
        if args.len() != closure.params.len() {
            return Err(RuntimeError::ArityMismatch {
                name: closure.name.clone(),
                expected: closure.params.len(),
                found: args.len(),
                span,
            });
        }

        self.control
            .push(ControlItem::Instr(Instruction::Reset { span }));
        if matches!(closure.body, ClosureBody::Block(_)) {
            self.control
                .push(ControlItem::Instr(Instruction::EndOfFunctionBody { span }));
        }

        let env = self
            .ctx
            .arena
            .alloc(closure.name.clone(), Some(closure.env));
        self.ctx.arena.frame_mut(env).closure_locals = Some(Rc::clone(&closure.locals));
        for (param, value) in closure.params.iter().zip(args) {
            self.ctx.arena.bind(env, param.clone(), value);
        }
        self.env_stack.push(env);

        match &closure.body {
            ClosureBody::Block(body) => {
                for stmt in body.iter().rev() {
                    self.control.push(ControlItem::Stmt(stmt.clone()));
                }
            }
            ClosureBody::Expr(body) => {
                self.control.push(ControlItem::Expr((**body).clone()));
            }
        }
        Ok(())
    }

    fn lookup_name(&self, name: &str, span: Span) -> RuntimeResult<Value> {
        let env = self.current_env();
        let frame = self.ctx.arena.frame(env);
        if let Some(locals) = &frame.closure_locals {
            if locals.contains(name) && !frame.head.contains_key(name) {
                return Err(RuntimeError::UnboundLocal {
                    name: name.to_string(),
                    span,
                });
            }
        }
        self.ctx
            .arena
            .lookup(env, name)
            .cloned()
            .ok_or(RuntimeError::NameNotFound {
                name: name.to_string(),
                span,
            })
    }

    fn pop_stash(&mut self, span: Span) -> RuntimeResult<Value> {
        self.stash.pop().ok_or(RuntimeError::Invariant {
            message: "stash underflow",
            span,
        })
    }
}

/// Assignment targets of a function body, without recursing into nested
/// functions. Names declared `global`/`nonlocal` in the body are not
/// locals.
fn collect_locals(body: &[Stmt]) -> HashSet<String> {
    let mut assigned = HashSet::new();
    let mut excluded = HashSet::new();
    collect_locals_into(body, &mut assigned, &mut excluded);
    assigned.difference(&excluded).cloned().collect()
}

fn collect_locals_into(
    body: &[Stmt],
    assigned: &mut HashSet<String>,
    excluded: &mut HashSet<String>,
) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { name, .. } | StmtKind::AnnAssign { name, .. } => {
                assigned.insert(name.clone());
            }
            StmtKind::FunctionDef { name, .. } => {
                // The def binds its name here; its body is another scope.
                assigned.insert(name.clone());
            }
            StmtKind::For { target, body, .. } => {
                assigned.insert(target.clone());
                collect_locals_into(body, assigned, excluded);
            }
            StmtKind::If { body, orelse, .. } => {
                collect_locals_into(body, assigned, excluded);
                collect_locals_into(orelse, assigned, excluded);
            }
            StmtKind::While { body, .. } => collect_locals_into(body, assigned, excluded),
            StmtKind::Global(name) | StmtKind::NonLocal(name) => {
                excluded.insert(name.clone());
            }
            _ => {}
        }
    }
}

fn fault_to_error(fault: OpFault, op: &str, span: Span) -> RuntimeError {
    match fault {
        OpFault::Unsupported { left, right } => RuntimeError::UnsupportedOperandTypes {
            op: op.to_string(),
            left: left.to_string(),
            right: right.to_string(),
            span,
        },
        OpFault::UnsupportedUnary { operand } => RuntimeError::UnsupportedUnaryOperand {
            op: op.to_string(),
            operand: operand.to_string(),
            span,
        },
        OpFault::ZeroDivision { message } => RuntimeError::ZeroDivision {
            message: message.to_string(),
            span,
        },
    }
}
