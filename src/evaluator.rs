//! Chunk driver.
//!
//! One `Evaluator` serves a session: each chunk is tokenized, parsed,
//! resolved against the accumulated global frame, has its imports
//! preloaded, and is then run on the CSE machine. Output lines and the
//! chunk's final representation go to the `Conductor`; faults are
//! rendered with snippet and caret and sent as `Error: <message>`.

use crate::builtins::builtin_names;
use crate::cse;
use crate::diagnostics::{self, Diagnostic};
use crate::lexer;
use crate::module::{ModuleLoader, preload_modules};
use crate::parser;
use crate::resolver;
use crate::runtime::context::{Context, Options};
use crate::runtime::value::Value;

/// The host side of the evaluator: receives every produced line.
pub trait Conductor {
    fn send_output(&mut self, line: &str);
}

/// Prints each line to standard output.
#[derive(Debug, Default)]
pub struct StdoutConductor;

impl Conductor for StdoutConductor {
    fn send_output(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Collects lines in memory; used by the test suites.
#[derive(Debug, Default)]
pub struct BufferConductor {
    pub lines: Vec<String>,
}

impl Conductor for BufferConductor {
    fn send_output(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

/// A finished chunk: the stash-top value and its text form. Faults
/// finish as `Value::Error` carrying the rendered diagnostic.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub value: Value,
    pub representation: String,
}

pub struct Evaluator<C: Conductor, L: ModuleLoader> {
    ctx: Context,
    conductor: C,
    loader: L,
}

impl<C: Conductor, L: ModuleLoader> Evaluator<C, L> {
    pub fn new(conductor: C, loader: L, options: Options) -> Self {
        Self {
            ctx: Context::new(options),
            conductor,
            loader,
        }
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn conductor(&self) -> &C {
        &self.conductor
    }

    /// Entry point used by host runtimes.
    pub fn start(&mut self, entrypoint: &str) -> ChunkResult {
        self.evaluate_chunk(entrypoint)
    }

    /// Parse-resolve-evaluate one chunk against the accumulated
    /// context.
    pub fn evaluate_chunk(&mut self, source: &str) -> ChunkResult {
        let outcome = self.run_pipeline(source);

        for line in std::mem::take(&mut self.ctx.output) {
            self.conductor.send_output(&line);
        }

        match outcome {
            Ok(value) => {
                let representation = value.to_output();
                // A None result is suppressed, as in a Python REPL.
                if !matches!(value, Value::Undefined) {
                    self.conductor.send_output(&representation);
                }
                ChunkResult {
                    value,
                    representation,
                }
            }
            Err(message) => {
                self.ctx.errors.push(message.clone());
                self.conductor.send_output(&format!("Error: {message}"));
                ChunkResult {
                    value: Value::Error(message.as_str().into()),
                    representation: message,
                }
            }
        }
    }

    fn run_pipeline(&mut self, source: &str) -> Result<Value, String> {
        let tokens = lexer::tokenize(source).map_err(|error| {
            let diagnostic = Diagnostic::new(error.name(), error.span(), error.to_string());
            diagnostics::render(source, &diagnostic)
        })?;

        let program = parser::parse_tokens(tokens).map_err(|error| {
            let diagnostic = Diagnostic::new(error.name(), error.span(), error.to_string());
            diagnostics::render(source, &diagnostic)
        })?;

        let globals = self.ctx.global_names();
        resolver::resolve(
            &program,
            builtin_names(),
            globals.iter().map(String::as_str),
        )
        .map_err(|error| {
            let diagnostic = Diagnostic::new(error.name(), error.span(), error.to_string())
                .with_suggestion(error.suggestion_line());
            diagnostics::render(source, &diagnostic)
        })?;

        preload_modules(&program, &mut self.loader, &mut self.ctx).map_err(|failure| {
            let diagnostic =
                Diagnostic::new("ModuleError", failure.span, failure.error.to_string());
            diagnostics::render(source, &diagnostic)
        })?;

        cse::evaluate_program(&mut self.ctx, &program).map_err(|error| {
            let diagnostic = Diagnostic::new(error.name(), error.span(), error.to_string());
            diagnostics::render(source, &diagnostic)
        })
    }
}
