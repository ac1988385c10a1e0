//! Per-evaluation mutable state shared by the machine and builtins.

use std::collections::VecDeque;

use crate::builtins;
use crate::runtime::environment::{EnvArena, EnvId};

#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Prelude chunks run without step accounting.
    pub is_prelude: bool,
    /// Environment-step budget; zero means unbounded.
    pub env_steps: usize,
    /// Total step budget; zero means unbounded.
    pub step_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            is_prelude: false,
            env_steps: 0,
            step_limit: 0,
        }
    }
}

impl Options {
    /// The effective step bound, if any; the smaller of the two budgets
    /// wins when both are set.
    pub fn step_budget(&self) -> Option<usize> {
        match (self.env_steps, self.step_limit) {
            (0, 0) => None,
            (0, limit) | (limit, 0) => Some(limit),
            (a, b) => Some(a.min(b)),
        }
    }
}

/// Where `input()` reads from.
pub enum InputSource {
    /// Always yields the empty string.
    Empty,
    /// Pre-supplied lines, consumed front to back.
    Queue(VecDeque<String>),
    /// The process's standard input.
    Stdin,
}

/// Accumulated interpreter state. One context serves a whole session of
/// chunks; the global frame persists across `evaluate_chunk` calls.
pub struct Context {
    pub arena: EnvArena,
    pub builtin_env: EnvId,
    pub global_env: EnvId,
    /// Lines produced by `print`, drained by the chunk driver.
    pub output: Vec<String>,
    /// Rendered diagnostics of every fault seen this session.
    pub errors: Vec<String>,
    pub steps: usize,
    pub env_steps_total: usize,
    pub options: Options,
    pub input: InputSource,
    rng_state: u64,
}

impl Context {
    pub fn new(options: Options) -> Self {
        let mut arena = EnvArena::new();
        let builtin_env = arena.alloc("builtins", None);
        builtins::seed_builtin_frame(&mut arena, builtin_env);
        let global_env = arena.alloc("global", Some(builtin_env));
        Self {
            arena,
            builtin_env,
            global_env,
            output: Vec::new(),
            errors: Vec::new(),
            steps: 0,
            env_steps_total: 0,
            options,
            input: InputSource::Empty,
            rng_state: 0x9e3779b97f4a7c15,
        }
    }

    pub fn with_input(mut self, lines: impl IntoIterator<Item = String>) -> Self {
        self.input = InputSource::Queue(lines.into_iter().collect());
        self
    }

    /// Names bound in the user global frame, for resolver seeding.
    pub fn global_names(&self) -> Vec<String> {
        self.arena
            .frame(self.global_env)
            .head
            .keys()
            .cloned()
            .collect()
    }

    pub fn read_input(&mut self) -> String {
        match &mut self.input {
            InputSource::Empty => String::new(),
            InputSource::Queue(lines) => lines.pop_front().unwrap_or_default(),
            InputSource::Stdin => {
                let mut line = String::new();
                match std::io::stdin().read_line(&mut line) {
                    Ok(_) => line.trim_end_matches(['\r', '\n']).to_string(),
                    Err(_) => String::new(),
                }
            }
        }
    }

    /// xorshift64*; hosts that need reproducible runs construct the
    /// context themselves and leave the default seed in place.
    pub fn next_random(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        let mantissa = x.wrapping_mul(0x2545f4914f6cdd1d) >> 11;
        mantissa as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_budget_picks_the_smaller_bound() {
        let unbounded = Options::default();
        assert_eq!(unbounded.step_budget(), None);

        let only_limit = Options {
            step_limit: 100,
            ..Options::default()
        };
        assert_eq!(only_limit.step_budget(), Some(100));

        let both = Options {
            env_steps: 50,
            step_limit: 100,
            ..Options::default()
        };
        assert_eq!(both.step_budget(), Some(50));
    }

    #[test]
    fn random_values_stay_in_unit_interval() {
        let mut ctx = Context::new(Options::default());
        for _ in 0..100 {
            let value = ctx.next_random();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn queued_input_is_consumed_in_order() {
        let mut ctx =
            Context::new(Options::default()).with_input(["a".to_string(), "b".to_string()]);
        assert_eq!(ctx.read_input(), "a");
        assert_eq!(ctx.read_input(), "b");
        assert_eq!(ctx.read_input(), "");
    }
}
