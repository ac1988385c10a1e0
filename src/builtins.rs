//! Built-in functions and constants seeded into the bottom frame.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Pow, Signed, ToPrimitive};

use crate::ast::CompareOp;
use crate::runtime::context::Context;
use crate::runtime::environment::{EnvArena, EnvId};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::num::round_half_even;
use crate::runtime::ops::{self, OpFault};
use crate::runtime::value::Value;
use crate::token::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Print,
    Abs,
    Max,
    Min,
    Round,
    Str,
    Int,
    Input,
    RandomRandom,
}

const ALL_BUILTINS: [BuiltinFunction; 9] = [
    BuiltinFunction::Print,
    BuiltinFunction::Abs,
    BuiltinFunction::Max,
    BuiltinFunction::Min,
    BuiltinFunction::Round,
    BuiltinFunction::Str,
    BuiltinFunction::Int,
    BuiltinFunction::Input,
    BuiltinFunction::RandomRandom,
];

const MATH_CONSTANTS: [(&str, f64); 5] = [
    ("math_pi", std::f64::consts::PI),
    ("math_e", std::f64::consts::E),
    ("math_tau", std::f64::consts::TAU),
    ("math_inf", f64::INFINITY),
    ("math_nan", f64::NAN),
];

impl BuiltinFunction {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinFunction::Print => "print",
            BuiltinFunction::Abs => "abs",
            BuiltinFunction::Max => "max",
            BuiltinFunction::Min => "min",
            BuiltinFunction::Round => "round",
            BuiltinFunction::Str => "str",
            BuiltinFunction::Int => "_int",
            BuiltinFunction::Input => "input",
            BuiltinFunction::RandomRandom => "random_random",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_BUILTINS
            .into_iter()
            .find(|builtin| builtin.name() == name)
    }
}

/// Binds every built-in function and constant in the given frame.
pub fn seed_builtin_frame(arena: &mut EnvArena, env: EnvId) {
    for builtin in ALL_BUILTINS {
        arena.bind(env, builtin.name(), Value::Builtin(builtin));
    }
    for (name, value) in MATH_CONSTANTS {
        arena.bind(env, name, Value::Float(value));
    }
}

/// Every name the built-in frame provides; seeds the resolver.
pub fn builtin_names() -> Vec<&'static str> {
    ALL_BUILTINS
        .into_iter()
        .map(BuiltinFunction::name)
        .chain(MATH_CONSTANTS.into_iter().map(|(name, _)| name))
        .collect()
}

pub fn call_builtin(
    ctx: &mut Context,
    function: BuiltinFunction,
    args: &[Value],
    span: Span,
) -> RuntimeResult<Value> {
    match function {
        BuiltinFunction::Print => {
            let line = args
                .iter()
                .map(Value::to_output)
                .collect::<Vec<_>>()
                .join(" ");
            ctx.output.push(line);
            Ok(Value::Undefined)
        }
        BuiltinFunction::Abs => {
            expect_arity("abs", args, 1, 1, span)?;
            match &args[0] {
                Value::Int(v) => Ok(Value::Int(v.abs())),
                Value::Float(v) => Ok(Value::Float(v.abs())),
                Value::Bool(v) => Ok(Value::int(i64::from(*v))),
                Value::Complex(v) => Ok(Value::Float(v.norm())),
                other => Err(bad_argument("abs", other, span)),
            }
        }
        BuiltinFunction::Max => fold_extreme("max", CompareOp::Gt, args, span),
        BuiltinFunction::Min => fold_extreme("min", CompareOp::Lt, args, span),
        BuiltinFunction::Round => round_builtin(args, span),
        BuiltinFunction::Str => {
            expect_arity("str", args, 1, 1, span)?;
            Ok(Value::str(&args[0].to_output()))
        }
        BuiltinFunction::Int => {
            expect_arity("_int", args, 1, 1, span)?;
            match &args[0] {
                Value::Int(v) => Ok(Value::Int(v.clone())),
                Value::Bool(v) => Ok(Value::int(i64::from(*v))),
                Value::Float(v) => float_to_int(*v, span),
                Value::Str(text) => {
                    text.trim().parse::<BigInt>().map(Value::Int).map_err(|_| {
                        RuntimeError::InvalidArgument {
                            message: format!("invalid literal for _int(): '{text}'"),
                            span,
                        }
                    })
                }
                other => Err(bad_argument("_int", other, span)),
            }
        }
        BuiltinFunction::Input => {
            expect_arity("input", args, 0, 1, span)?;
            // The prompt, if any, is the conductor's concern to display.
            let line = ctx.read_input();
            Ok(Value::str(&line))
        }
        BuiltinFunction::RandomRandom => {
            expect_arity("random_random", args, 0, 0, span)?;
            Ok(Value::Float(ctx.next_random()))
        }
    }
}

fn expect_arity(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
    span: Span,
) -> RuntimeResult<()> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::ArityMismatch {
            name: name.to_string(),
            expected: max,
            found: args.len(),
            span,
        });
    }
    Ok(())
}

fn bad_argument(function: &str, got: &Value, span: Span) -> RuntimeError {
    RuntimeError::InvalidArgument {
        message: format!("bad operand type for {function}(): '{}'", got.type_name()),
        span,
    }
}

fn fold_extreme(
    name: &str,
    keep_if: CompareOp,
    args: &[Value],
    span: Span,
) -> RuntimeResult<Value> {
    let Some((first, rest)) = args.split_first() else {
        return Err(RuntimeError::ArityMismatch {
            name: name.to_string(),
            expected: 1,
            found: 0,
            span,
        });
    };
    let mut best = first.clone();
    for candidate in rest {
        let wins = ops::apply_compare(keep_if, candidate, &best)
            .map_err(|fault| fault_to_error(fault, keep_if.symbol(), span))?;
        if wins.is_truthy() {
            best = candidate.clone();
        }
    }
    Ok(best)
}

fn round_builtin(args: &[Value], span: Span) -> RuntimeResult<Value> {
    expect_arity("round", args, 1, 2, span)?;
    let ndigits = match args.get(1) {
        None => None,
        Some(Value::Int(v)) => Some(v.clone()),
        Some(Value::Bool(v)) => Some(BigInt::from(i32::from(*v))),
        Some(other) => {
            return Err(RuntimeError::InvalidArgument {
                message: format!(
                    "round() ndigits must be an integer, not '{}'",
                    other.type_name()
                ),
                span,
            });
        }
    };

    match &args[0] {
        Value::Int(v) => match ndigits {
            Some(n) if n.sign() == num_bigint::Sign::Minus => Ok(Value::Int(round_int_to_power(
                v,
                n.abs().to_u32().unwrap_or(u32::MAX),
            ))),
            _ => Ok(Value::Int(v.clone())),
        },
        Value::Bool(v) => Ok(Value::int(i64::from(*v))),
        Value::Float(v) => match ndigits {
            None => float_to_int(round_half_even(*v), span),
            Some(n) => {
                let exponent = n.to_i32().unwrap_or(if n.sign() == num_bigint::Sign::Minus {
                    i32::MIN
                } else {
                    i32::MAX
                });
                let scale = 10f64.powi(exponent);
                Ok(Value::Float(round_half_even(v * scale) / scale))
            }
        },
        other => Err(bad_argument("round", other, span)),
    }
}

/// Rounds an integer to a multiple of 10^power, ties to even.
fn round_int_to_power(value: &BigInt, power: u32) -> BigInt {
    let unit: BigInt = Pow::pow(&BigInt::from(10), power);
    let (quotient, remainder) = value.div_mod_floor(&unit);
    let doubled = &remainder * 2;
    let rounded = if doubled > unit {
        quotient + 1
    } else if doubled < unit {
        quotient
    } else if quotient.is_even() {
        quotient
    } else {
        quotient + 1
    };
    rounded * unit
}

fn float_to_int(value: f64, span: Span) -> RuntimeResult<Value> {
    if value.is_nan() {
        return Err(RuntimeError::InvalidArgument {
            message: "cannot convert float NaN to integer".to_string(),
            span,
        });
    }
    if value.is_infinite() {
        return Err(RuntimeError::InvalidArgument {
            message: "cannot convert float infinity to integer".to_string(),
            span,
        });
    }
    let truncated = value.trunc();
    BigInt::from_f64(truncated)
        .map(Value::Int)
        .ok_or(RuntimeError::InvalidArgument {
            message: "cannot convert float to integer".to_string(),
            span,
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Options;

    fn ctx() -> Context {
        Context::new(Options::default())
    }

    fn span() -> Span {
        Span::default()
    }

    #[test]
    fn print_joins_arguments_with_spaces() {
        let mut ctx = ctx();
        let result = call_builtin(
            &mut ctx,
            BuiltinFunction::Print,
            &[Value::int(1), Value::str("two"), Value::Bool(true)],
            span(),
        )
        .expect("print should succeed");
        assert!(matches!(result, Value::Undefined));
        assert_eq!(ctx.output, vec!["1 two True".to_string()]);
    }

    #[test]
    fn abs_handles_the_numeric_tower() {
        let mut ctx = ctx();
        let negative = call_builtin(&mut ctx, BuiltinFunction::Abs, &[Value::int(-5)], span())
            .expect("abs int");
        assert_eq!(negative.to_output(), "5");

        let magnitude = call_builtin(
            &mut ctx,
            BuiltinFunction::Abs,
            &[Value::Complex(crate::runtime::num::Complex64::new(3.0, 4.0))],
            span(),
        )
        .expect("abs complex");
        assert_eq!(magnitude.to_output(), "5.0");
    }

    #[test]
    fn max_and_min_fold_with_python_comparison() {
        let mut ctx = ctx();
        let args = [Value::int(3), Value::Float(2.5), Value::int(7)];
        let largest =
            call_builtin(&mut ctx, BuiltinFunction::Max, &args, span()).expect("max succeeds");
        assert_eq!(largest.to_output(), "7");
        let smallest =
            call_builtin(&mut ctx, BuiltinFunction::Min, &args, span()).expect("min succeeds");
        assert_eq!(smallest.to_output(), "2.5");
    }

    #[test]
    fn max_of_nothing_is_an_arity_error() {
        let mut ctx = ctx();
        let err = call_builtin(&mut ctx, BuiltinFunction::Max, &[], span())
            .expect_err("expected arity error");
        assert!(matches!(err, RuntimeError::ArityMismatch { .. }));
    }

    #[test]
    fn round_uses_bankers_rounding() {
        let mut ctx = ctx();
        for (input, expected) in [(0.5, "0"), (1.5, "2"), (2.5, "2"), (2.6, "3")] {
            let rounded = call_builtin(
                &mut ctx,
                BuiltinFunction::Round,
                &[Value::Float(input)],
                span(),
            )
            .expect("round succeeds");
            assert_eq!(rounded.to_output(), expected, "round({input})");
        }
    }

    #[test]
    fn round_with_ndigits_keeps_floats() {
        let mut ctx = ctx();
        let rounded = call_builtin(
            &mut ctx,
            BuiltinFunction::Round,
            &[Value::Float(2.675), Value::int(2)],
            span(),
        )
        .expect("round succeeds");
        assert!(matches!(rounded, Value::Float(_)));
    }

    #[test]
    fn round_of_integer_to_negative_digits() {
        let mut ctx = ctx();
        let rounded = call_builtin(
            &mut ctx,
            BuiltinFunction::Round,
            &[Value::int(1250), Value::int(-2)],
            span(),
        )
        .expect("round succeeds");
        assert_eq!(rounded.to_output(), "1200");
    }

    #[test]
    fn int_conversion_truncates_and_parses() {
        let mut ctx = ctx();
        let truncated =
            call_builtin(&mut ctx, BuiltinFunction::Int, &[Value::Float(-2.9)], span())
                .expect("conversion succeeds");
        assert_eq!(truncated.to_output(), "-2");

        let parsed = call_builtin(
            &mut ctx,
            BuiltinFunction::Int,
            &[Value::str(" 42 ")],
            span(),
        )
        .expect("conversion succeeds");
        assert_eq!(parsed.to_output(), "42");

        let err = call_builtin(&mut ctx, BuiltinFunction::Int, &[Value::str("4.5")], span())
            .expect_err("expected parse failure");
        assert!(matches!(err, RuntimeError::InvalidArgument { .. }));

        let err = call_builtin(
            &mut ctx,
            BuiltinFunction::Int,
            &[Value::Float(f64::NAN)],
            span(),
        )
        .expect_err("expected NaN failure");
        assert!(matches!(err, RuntimeError::InvalidArgument { .. }));
    }

    #[test]
    fn str_renders_like_print() {
        let mut ctx = ctx();
        let text = call_builtin(&mut ctx, BuiltinFunction::Str, &[Value::Float(2.0)], span())
            .expect("str succeeds");
        assert_eq!(text.to_output(), "2.0");
    }

    #[test]
    fn input_reads_queued_lines() {
        let mut ctx = Context::new(Options::default()).with_input(["hello".to_string()]);
        let line = call_builtin(&mut ctx, BuiltinFunction::Input, &[], span())
            .expect("input succeeds");
        assert_eq!(line.to_output(), "hello");
        let empty = call_builtin(&mut ctx, BuiltinFunction::Input, &[], span())
            .expect("input succeeds");
        assert_eq!(empty.to_output(), "");
    }

    #[test]
    fn every_builtin_name_round_trips() {
        for builtin in ALL_BUILTINS {
            assert_eq!(BuiltinFunction::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(BuiltinFunction::from_name("nope"), None);
        assert!(builtin_names().contains(&"math_pi"));
    }
}
