//! Operator semantics over runtime values.
//!
//! Dispatch priority for binary operators: complex operands first, then
//! `None`, then strings, then the numeric tower (bools coerce to
//! integers, floats are contagious, `/` always produces a float, and
//! `**` with a negative integer exponent promotes to float). Faults
//! carry no source location; the machine attaches the operator span.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Pow, ToPrimitive, Zero};

use crate::ast::{BinaryOp, CompareOp, UnaryOp};
use crate::runtime::num::{
    Complex64, compare_int_float, complex_div, complex_pow, float_floor_div, float_mod,
};
use crate::runtime::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpFault {
    Unsupported {
        left: &'static str,
        right: &'static str,
    },
    UnsupportedUnary {
        operand: &'static str,
    },
    ZeroDivision {
        message: &'static str,
    },
}

enum Num {
    Int(BigInt),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(v) => Some(Num::Int(v.clone())),
        Value::Float(v) => Some(Num::Float(*v)),
        Value::Bool(v) => Some(Num::Int(BigInt::from(i32::from(*v)))),
        _ => None,
    }
}

fn as_complex(value: &Value) -> Option<Complex64> {
    match value {
        Value::Complex(v) => Some(*v),
        Value::Float(v) => Some(Complex64::new(*v, 0.0)),
        Value::Int(v) => Some(Complex64::new(int_to_f64(v), 0.0)),
        Value::Bool(v) => Some(Complex64::new(f64::from(*v), 0.0)),
        _ => None,
    }
}

fn int_to_f64(value: &BigInt) -> f64 {
    value.to_f64().unwrap_or(match value.sign() {
        num_bigint::Sign::Minus => f64::NEG_INFINITY,
        _ => f64::INFINITY,
    })
}

fn unsupported(left: &Value, right: &Value) -> OpFault {
    OpFault::Unsupported {
        left: left.type_name(),
        right: right.type_name(),
    }
}

pub fn apply_unary(op: UnaryOp, operand: &Value) -> Result<Value, OpFault> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Bool(v) => Ok(Value::Int(BigInt::from(-i32::from(*v)))),
            Value::Int(v) => Ok(Value::Int(-v)),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Complex(v) => Ok(Value::Complex(-v)),
            other => Err(OpFault::UnsupportedUnary {
                operand: other.type_name(),
            }),
        },
        UnaryOp::Pos => match operand {
            Value::Bool(v) => Ok(Value::Int(BigInt::from(i32::from(*v)))),
            Value::Int(v) => Ok(Value::Int(v.clone())),
            Value::Float(v) => Ok(Value::Float(*v)),
            Value::Complex(v) => Ok(Value::Complex(*v)),
            other => Err(OpFault::UnsupportedUnary {
                operand: other.type_name(),
            }),
        },
    }
}

pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpFault> {
    if matches!(left, Value::Complex(_)) || matches!(right, Value::Complex(_)) {
        let (Some(a), Some(b)) = (as_complex(left), as_complex(right)) else {
            return Err(unsupported(left, right));
        };
        return match op {
            BinaryOp::Add => Ok(Value::Complex(a + b)),
            BinaryOp::Sub => Ok(Value::Complex(a - b)),
            BinaryOp::Mul => Ok(Value::Complex(a * b)),
            BinaryOp::Div => complex_div(a, b).map(Value::Complex).ok_or(
                OpFault::ZeroDivision {
                    message: "complex division by zero",
                },
            ),
            BinaryOp::Pow => complex_pow(a, b).map(Value::Complex).ok_or(
                OpFault::ZeroDivision {
                    message: "zero cannot be raised to a negative or complex power",
                },
            ),
            BinaryOp::FloorDiv | BinaryOp::Mod => Err(unsupported(left, right)),
        };
    }

    if matches!(left, Value::Undefined) || matches!(right, Value::Undefined) {
        return Err(unsupported(left, right));
    }

    if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
        if let (Value::Str(a), Value::Str(b), BinaryOp::Add) = (left, right, op) {
            return Ok(Value::Str(format!("{a}{b}").into()));
        }
        return Err(unsupported(left, right));
    }

    let (Some(a), Some(b)) = (as_num(left), as_num(right)) else {
        return Err(unsupported(left, right));
    };

    match op {
        BinaryOp::Add => Ok(match (a, b) {
            (Num::Int(x), Num::Int(y)) => Value::Int(x + y),
            (x, y) => Value::Float(to_f64(&x) + to_f64(&y)),
        }),
        BinaryOp::Sub => Ok(match (a, b) {
            (Num::Int(x), Num::Int(y)) => Value::Int(x - y),
            (x, y) => Value::Float(to_f64(&x) - to_f64(&y)),
        }),
        BinaryOp::Mul => Ok(match (a, b) {
            (Num::Int(x), Num::Int(y)) => Value::Int(x * y),
            (x, y) => Value::Float(to_f64(&x) * to_f64(&y)),
        }),
        BinaryOp::Div => {
            if num_is_zero(&b) {
                return Err(OpFault::ZeroDivision {
                    message: "division by zero",
                });
            }
            Ok(Value::Float(to_f64(&a) / to_f64(&b)))
        }
        BinaryOp::FloorDiv => match (a, b) {
            (Num::Int(x), Num::Int(y)) => {
                if y.is_zero() {
                    return Err(OpFault::ZeroDivision {
                        message: "integer division or modulo by zero",
                    });
                }
                Ok(Value::Int(x.div_floor(&y)))
            }
            (x, y) => {
                if num_is_zero(&y) {
                    return Err(OpFault::ZeroDivision {
                        message: "float floor division by zero",
                    });
                }
                Ok(Value::Float(float_floor_div(to_f64(&x), to_f64(&y))))
            }
        },
        BinaryOp::Mod => match (a, b) {
            (Num::Int(x), Num::Int(y)) => {
                if y.is_zero() {
                    return Err(OpFault::ZeroDivision {
                        message: "integer division or modulo by zero",
                    });
                }
                Ok(Value::Int(x.mod_floor(&y)))
            }
            (x, y) => {
                if num_is_zero(&y) {
                    return Err(OpFault::ZeroDivision {
                        message: "float modulo",
                    });
                }
                Ok(Value::Float(float_mod(to_f64(&x), to_f64(&y))))
            }
        },
        BinaryOp::Pow => num_pow(a, b),
    }
}

fn num_pow(base: Num, exponent: Num) -> Result<Value, OpFault> {
    if let (Num::Int(x), Num::Int(y)) = (&base, &exponent) {
        if y.sign() != num_bigint::Sign::Minus {
            // Exponents beyond u32 would not fit in memory anyway; fall
            // through to float arithmetic and overflow to infinity.
            if let Some(exp) = y.to_u32() {
                return Ok(Value::Int(Pow::pow(x, exp)));
            }
        }
    }

    let b = to_f64(&base);
    let e = to_f64(&exponent);
    if b == 0.0 && e < 0.0 {
        return Err(OpFault::ZeroDivision {
            message: "0.0 cannot be raised to a negative power",
        });
    }
    if b < 0.0 && e.fract() != 0.0 {
        // A negative base with a fractional exponent lands in the
        // complex plane, as in Python.
        return complex_pow(Complex64::new(b, 0.0), Complex64::new(e, 0.0))
            .map(Value::Complex)
            .ok_or(OpFault::ZeroDivision {
                message: "zero cannot be raised to a negative or complex power",
            });
    }
    Ok(Value::Float(b.powf(e)))
}

pub fn apply_compare(op: CompareOp, left: &Value, right: &Value) -> Result<Value, OpFault> {
    match op {
        CompareOp::Is => return Ok(Value::Bool(is_identical(left, right))),
        CompareOp::IsNot => return Ok(Value::Bool(!is_identical(left, right))),
        _ => {}
    }

    if matches!(left, Value::Complex(_)) || matches!(right, Value::Complex(_)) {
        let (Some(a), Some(b)) = (as_complex(left), as_complex(right)) else {
            return Err(unsupported(left, right));
        };
        return match op {
            CompareOp::Eq => Ok(Value::Bool(a == b)),
            CompareOp::NotEq => Ok(Value::Bool(a != b)),
            _ => Err(unsupported(left, right)),
        };
    }

    if matches!(left, Value::Undefined) || matches!(right, Value::Undefined) {
        let both_none = matches!(left, Value::Undefined) && matches!(right, Value::Undefined);
        return match op {
            CompareOp::Eq => Ok(Value::Bool(both_none)),
            CompareOp::NotEq => Ok(Value::Bool(!both_none)),
            _ => Err(unsupported(left, right)),
        };
    }

    if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
        let (Value::Str(a), Value::Str(b)) = (left, right) else {
            return Err(unsupported(left, right));
        };
        return Ok(Value::Bool(match op {
            CompareOp::Eq => a == b,
            CompareOp::NotEq => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Gt => a > b,
            CompareOp::LtE => a <= b,
            CompareOp::GtE => a >= b,
            CompareOp::In => b.contains(a.as_ref()),
            CompareOp::NotIn => !b.contains(a.as_ref()),
            CompareOp::Is | CompareOp::IsNot => unreachable!("handled above"),
        }));
    }

    let (Some(a), Some(b)) = (as_num(left), as_num(right)) else {
        return Err(unsupported(left, right));
    };
    if matches!(op, CompareOp::In | CompareOp::NotIn) {
        return Err(unsupported(left, right));
    }

    let ordering = match (&a, &b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(y)),
        (Num::Float(x), Num::Float(y)) => x.partial_cmp(y),
        (Num::Int(x), Num::Float(y)) => compare_int_float(x, *y),
        (Num::Float(x), Num::Int(y)) => compare_int_float(y, *x).map(Ordering::reverse),
    };
    Ok(Value::Bool(match (op, ordering) {
        (CompareOp::NotEq, None) => true,
        (_, None) => false,
        (CompareOp::Eq, Some(ordering)) => ordering == Ordering::Equal,
        (CompareOp::NotEq, Some(ordering)) => ordering != Ordering::Equal,
        (CompareOp::Lt, Some(ordering)) => ordering == Ordering::Less,
        (CompareOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
        (CompareOp::LtE, Some(ordering)) => ordering != Ordering::Greater,
        (CompareOp::GtE, Some(ordering)) => ordering != Ordering::Less,
        (CompareOp::In | CompareOp::NotIn | CompareOp::Is | CompareOp::IsNot, _) => {
            unreachable!("handled above")
        }
    }))
}

fn is_identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Complex(a), Value::Complex(b)) => a == b,
        (Value::Closure(a), Value::Closure(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Foreign(a), Value::Foreign(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => false,
    }
}

fn to_f64(value: &Num) -> f64 {
    match value {
        Num::Int(v) => int_to_f64(v),
        Num::Float(v) => *v,
    }
}

fn num_is_zero(value: &Num) -> bool {
    match value {
        Num::Int(v) => v.is_zero(),
        Num::Float(v) => *v == 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn int(value: i64) -> Value {
        Value::int(value)
    }

    fn expect_int(result: Result<Value, OpFault>) -> BigInt {
        match result.expect("operation should succeed") {
            Value::Int(v) => v,
            other => panic!("expected int, got {other:?}"),
        }
    }

    fn expect_float(result: Result<Value, OpFault>) -> f64 {
        match result.expect("operation should succeed") {
            Value::Float(v) => v,
            other => panic!("expected float, got {other:?}"),
        }
    }

    fn expect_bool(result: Result<Value, OpFault>) -> bool {
        match result.expect("operation should succeed") {
            Value::Bool(v) => v,
            other => panic!("expected bool, got {other:?}"),
        }
    }

    #[test]
    fn integer_arithmetic_stays_arbitrary_precision() {
        let big = Value::Int("99999999999999999999".parse().expect("literal"));
        let sum = expect_int(apply_binary(BinaryOp::Add, &big, &int(1)));
        assert_eq!(sum, "100000000000000000000".parse::<BigInt>().expect("literal"));
    }

    #[test]
    fn addition_roundtrip_law_holds() {
        let a = Value::Int("123456789123456789123456789".parse().expect("literal"));
        let b = int(987654321);
        let sum = Value::Int(expect_int(apply_binary(BinaryOp::Add, &a, &b)));
        let back = expect_int(apply_binary(BinaryOp::Sub, &sum, &b));
        match a {
            Value::Int(original) => assert_eq!(back, original),
            _ => unreachable!(),
        }
    }

    #[test]
    fn floor_division_follows_divisor_sign() {
        assert_eq!(expect_int(apply_binary(BinaryOp::FloorDiv, &int(10), &int(-3))), BigInt::from(-4));
        assert_eq!(expect_int(apply_binary(BinaryOp::Mod, &int(10), &int(-3))), BigInt::from(-2));
        assert_eq!(expect_int(apply_binary(BinaryOp::FloorDiv, &int(-10), &int(3))), BigInt::from(-4));
        assert_eq!(expect_int(apply_binary(BinaryOp::Mod, &int(-10), &int(3))), BigInt::from(2));
    }

    #[test]
    fn floor_division_identity_holds() {
        for (a, b) in [(17, 5), (17, -5), (-17, 5), (-17, -5), (0, 3)] {
            let quotient = expect_int(apply_binary(BinaryOp::FloorDiv, &int(a), &int(b)));
            let remainder = expect_int(apply_binary(BinaryOp::Mod, &int(a), &int(b)));
            assert_eq!(quotient * BigInt::from(b) + remainder, BigInt::from(a));
        }
    }

    #[test]
    fn true_division_always_produces_float() {
        assert_eq!(expect_float(apply_binary(BinaryOp::Div, &int(7), &int(2))), 3.5);
        assert_eq!(expect_float(apply_binary(BinaryOp::Div, &int(8), &int(2))), 4.0);
    }

    #[test]
    fn division_by_zero_faults() {
        for op in [BinaryOp::Div, BinaryOp::FloorDiv, BinaryOp::Mod] {
            let fault = apply_binary(op, &int(1), &int(0)).expect_err("expected fault");
            assert!(matches!(fault, OpFault::ZeroDivision { .. }), "{op:?}");
        }
    }

    #[test]
    fn power_promotes_negative_integer_exponents_to_float() {
        assert_eq!(expect_float(apply_binary(BinaryOp::Pow, &int(2), &int(-2))), 0.25);
        assert_eq!(expect_int(apply_binary(BinaryOp::Pow, &int(2), &int(10))), BigInt::from(1024));
    }

    #[test]
    fn zero_to_negative_power_faults() {
        let fault = apply_binary(BinaryOp::Pow, &int(0), &int(-1)).expect_err("expected fault");
        assert_eq!(
            fault,
            OpFault::ZeroDivision {
                message: "0.0 cannot be raised to a negative power"
            }
        );
    }

    #[test]
    fn negative_base_with_fractional_exponent_goes_complex() {
        match apply_binary(BinaryOp::Pow, &int(-4), &Value::Float(0.5)) {
            Ok(Value::Complex(v)) => {
                assert!(v.re.abs() < 1e-9);
                assert!((v.im - 2.0).abs() < 1e-9);
            }
            other => panic!("expected complex result, got {other:?}"),
        }
    }

    #[test]
    fn bools_coerce_to_integers() {
        assert_eq!(
            expect_int(apply_binary(BinaryOp::Add, &Value::Bool(true), &int(2))),
            BigInt::from(3)
        );
        assert!(expect_bool(apply_compare(CompareOp::Eq, &Value::Bool(true), &int(1))));
    }

    #[test]
    fn float_contagion_applies() {
        assert_eq!(
            expect_float(apply_binary(BinaryOp::Add, &int(1), &Value::Float(0.5))),
            1.5
        );
    }

    #[test]
    fn string_concatenation_and_ordering() {
        match apply_binary(BinaryOp::Add, &Value::str("ab"), &Value::str("cd")) {
            Ok(Value::Str(s)) => assert_eq!(s.as_ref(), "abcd"),
            other => panic!("expected string, got {other:?}"),
        }
        assert!(expect_bool(apply_compare(CompareOp::Lt, &Value::str("abc"), &Value::str("abd"))));
        assert!(expect_bool(apply_compare(CompareOp::In, &Value::str("bc"), &Value::str("abcd"))));
        assert!(expect_bool(apply_compare(CompareOp::NotIn, &Value::str("x"), &Value::str("abcd"))));
    }

    #[test]
    fn string_plus_number_is_unsupported() {
        let fault = apply_binary(BinaryOp::Add, &Value::str("a"), &int(1)).expect_err("expected fault");
        assert_eq!(
            fault,
            OpFault::Unsupported {
                left: "str",
                right: "int"
            }
        );
    }

    #[test]
    fn none_supports_only_equality() {
        assert!(expect_bool(apply_compare(CompareOp::Eq, &Value::Undefined, &Value::Undefined)));
        assert!(expect_bool(apply_compare(CompareOp::NotEq, &Value::Undefined, &int(1))));
        let fault =
            apply_compare(CompareOp::Lt, &Value::Undefined, &int(1)).expect_err("expected fault");
        assert!(matches!(fault, OpFault::Unsupported { .. }));
    }

    #[test]
    fn complex_equality_promotes_numeric_operands() {
        let one = Value::Complex(Complex64::new(1.0, 0.0));
        assert!(expect_bool(apply_compare(CompareOp::Eq, &one, &int(1))));
        let fault = apply_compare(CompareOp::Lt, &one, &one).expect_err("expected fault");
        assert!(matches!(fault, OpFault::Unsupported { .. }));
    }

    #[test]
    fn cross_type_numeric_comparison_is_exact_beyond_2_pow_53() {
        let huge = Value::Int("100000000000000000001".parse().expect("literal"));
        assert!(expect_bool(apply_compare(CompareOp::Gt, &huge, &Value::Float(1e20))));
        assert!(expect_bool(apply_compare(CompareOp::Lt, &Value::Float(1e20), &huge)));
    }

    #[test]
    fn nan_comparisons_are_false_except_not_equal() {
        let nan = Value::Float(f64::NAN);
        assert!(!expect_bool(apply_compare(CompareOp::Eq, &nan, &nan)));
        assert!(!expect_bool(apply_compare(CompareOp::Lt, &nan, &Value::Float(1.0))));
        assert!(expect_bool(apply_compare(CompareOp::NotEq, &nan, &nan)));
    }

    #[test]
    fn unary_operators_follow_python() {
        assert!(expect_bool(apply_unary(UnaryOp::Not, &int(0))));
        assert!(!expect_bool(apply_unary(UnaryOp::Not, &Value::str("x"))));
        assert_eq!(expect_int(apply_unary(UnaryOp::Neg, &Value::Bool(true))), BigInt::from(-1));
        assert_eq!(expect_int(apply_unary(UnaryOp::Pos, &Value::Bool(true))), BigInt::from(1));
        let fault = apply_unary(UnaryOp::Neg, &Value::str("x")).expect_err("expected fault");
        assert_eq!(fault, OpFault::UnsupportedUnary { operand: "str" });
    }
}
