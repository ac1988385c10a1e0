//! Numeric tower helpers.
//!
//! Arbitrary-precision integers, IEEE-754 floats, and complex numbers
//! with CPython-compatible arithmetic: the branched complex division,
//! the polar power with its zero-base error policy, the short float
//! repr (scientific notation outside `[1e-4, 1e16)`), and the exact
//! integer-versus-float ordering that stays correct beyond 2^53.

use std::cmp::Ordering;

use num_bigint::{BigInt, Sign};
pub use num_complex::Complex64;
use num_traits::{Num, ToPrimitive};

/// Largest integer magnitude exactly representable in an f64.
const EXACT_FLOAT_BITS: u64 = 53;

/// Parses an integer literal lexeme, honoring 0x/0o/0b prefixes.
/// Underscores have already been stripped by the tokenizer.
pub fn parse_bigint_lexeme(lexeme: &str) -> Option<BigInt> {
    let lower = lexeme.to_ascii_lowercase();
    if let Some(digits) = lower.strip_prefix("0x") {
        BigInt::from_str_radix(digits, 16).ok()
    } else if let Some(digits) = lower.strip_prefix("0o") {
        BigInt::from_str_radix(digits, 8).ok()
    } else if let Some(digits) = lower.strip_prefix("0b") {
        BigInt::from_str_radix(digits, 2).ok()
    } else {
        lower.parse::<BigInt>().ok()
    }
}

/// CPython's branched complex division. `None` when the divisor is
/// exactly 0+0j.
pub fn complex_div(numerator: Complex64, divisor: Complex64) -> Option<Complex64> {
    let (c, d) = (divisor.re, divisor.im);
    if c.abs() >= d.abs() {
        if c.abs() == 0.0 {
            return None;
        }
        let ratio = d / c;
        let denom = c + d * ratio;
        Some(Complex64::new(
            (numerator.re + numerator.im * ratio) / denom,
            (numerator.im - numerator.re * ratio) / denom,
        ))
    } else {
        let ratio = c / d;
        let denom = c * ratio + d;
        Some(Complex64::new(
            (numerator.re * ratio + numerator.im) / denom,
            (numerator.im * ratio - numerator.re) / denom,
        ))
    }
}

/// Polar-form complex power. `None` for a zero base with a negative
/// real or non-zero imaginary exponent.
pub fn complex_pow(base: Complex64, exponent: Complex64) -> Option<Complex64> {
    if exponent.re == 0.0 && exponent.im == 0.0 {
        return Some(Complex64::new(1.0, 0.0));
    }
    let magnitude = base.norm();
    if magnitude == 0.0 {
        if exponent.re < 0.0 || exponent.im != 0.0 {
            return None;
        }
        return Some(Complex64::new(0.0, 0.0));
    }
    let theta = base.im.atan2(base.re);
    let mut length = magnitude.powf(exponent.re);
    let mut phase = theta * exponent.re;
    if exponent.im != 0.0 {
        length /= (theta * exponent.im).exp();
        phase += exponent.im * magnitude.ln();
    }
    Some(Complex64::new(length * phase.cos(), length * phase.sin()))
}

/// Python's `repr` for floats: shortest round-trip digits, a trailing
/// `.0` for integral values, and scientific notation outside
/// `[1e-4, 1e16)`.
pub fn format_float(value: f64) -> String {
    format_float_short(value, true)
}

/// Same rules without the trailing `.0`, as used for the components of
/// a complex number.
pub fn format_float_component(value: f64) -> String {
    format_float_short(value, false)
}

fn format_float_short(value: f64, add_dot_zero: bool) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{value:e}");
        let (mantissa, exponent) = formatted
            .split_once('e')
            .unwrap_or((formatted.as_str(), "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }

    let formatted = format!("{value}");
    if add_dot_zero && !formatted.contains('.') {
        format!("{formatted}.0")
    } else {
        formatted
    }
}

/// Python's `repr` for complex values: `Bj` when the real part is a
/// positive zero, `(A+Bj)` otherwise, each component in short form.
pub fn format_complex(value: Complex64) -> String {
    if value.re == 0.0 && value.re.is_sign_positive() && !value.re.is_nan() {
        return format!("{}j", format_float_component(value.im));
    }
    let imag = format_float_component(value.im);
    let separator = if imag.starts_with('-') { "" } else { "+" };
    format!(
        "({}{}{}j)",
        format_float_component(value.re),
        separator,
        imag
    )
}

/// Orders an arbitrary-precision integer against a float without losing
/// precision. `None` when the float is NaN.
pub fn compare_int_float(int: &BigInt, float: f64) -> Option<Ordering> {
    if float.is_nan() {
        return None;
    }
    if float.is_infinite() {
        return Some(if float > 0.0 {
            Ordering::Less
        } else {
            Ordering::Greater
        });
    }

    let int_sign: i8 = match int.sign() {
        Sign::Plus => 1,
        Sign::NoSign => 0,
        Sign::Minus => -1,
    };
    let float_sign: i8 = if float > 0.0 {
        1
    } else if float < 0.0 {
        -1
    } else {
        0
    };
    if int_sign != float_sign {
        return Some(int_sign.cmp(&float_sign));
    }
    if int_sign == 0 {
        return Some(Ordering::Equal);
    }

    if int.magnitude().bits() <= EXACT_FLOAT_BITS {
        let exact = int.to_f64()?;
        return exact.partial_cmp(&float);
    }

    // Beyond 2^53 the cast is lossy; compare decimal digit counts, then
    // the digit strings themselves.
    let int_abs = int.magnitude().to_string();
    let float_abs = float.abs();
    let float_digits = float_abs.log10().floor() as i64 + 1;
    let magnitude_order = (int_abs.len() as i64).cmp(&float_digits);
    let ordering = if magnitude_order != Ordering::Equal {
        magnitude_order
    } else {
        let approx = approximate_bigint_string(float_abs, 30);
        int_abs.cmp(&approx)
    };
    Some(if int_sign < 0 {
        ordering.reverse()
    } else {
        ordering
    })
}

/// The leading decimal digits of `value`'s integer part, padded with
/// zeros to its full digit count. `value` must be positive and at least
/// one; callers only reach this for magnitudes far beyond 2^53.
fn approximate_bigint_string(value: f64, precision: usize) -> String {
    let digits_after_point = precision.saturating_sub(1);
    let formatted = format!("{value:.digits_after_point$e}");
    let (mantissa, exponent) = formatted
        .split_once('e')
        .unwrap_or((formatted.as_str(), "0"));
    let exponent: i64 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let total_len = (exponent + 1).max(1) as usize;
    let mut result: String = digits.chars().take(total_len).collect();
    while result.len() < total_len {
        result.push('0');
    }
    result
}

/// True when the integer equals the float exactly.
pub fn int_float_equal(int: &BigInt, float: f64) -> bool {
    compare_int_float(int, float) == Some(Ordering::Equal) && float.fract() == 0.0
}

/// Python `//` on floats: floor of the true quotient.
pub fn float_floor_div(left: f64, right: f64) -> f64 {
    (left / right).floor()
}

/// Python `%` on floats: the remainder takes the divisor's sign.
pub fn float_mod(left: f64, right: f64) -> f64 {
    let remainder = left % right;
    if remainder != 0.0 && (remainder < 0.0) != (right < 0.0) {
        remainder + right
    } else {
        remainder
    }
}

/// Python `round` with no ndigits: half-to-even.
pub fn round_half_even(value: f64) -> f64 {
    let floor = value.floor();
    let diff = value - floor;
    if diff == 0.5 {
        if (floor / 2.0).fract() == 0.0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        value.round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn int(text: &str) -> BigInt {
        text.parse().expect("valid integer literal")
    }

    #[test]
    fn parses_prefixed_literals() {
        assert_eq!(parse_bigint_lexeme("0xff"), Some(BigInt::from(255)));
        assert_eq!(parse_bigint_lexeme("0o17"), Some(BigInt::from(15)));
        assert_eq!(parse_bigint_lexeme("0b101"), Some(BigInt::from(5)));
        assert_eq!(
            parse_bigint_lexeme("123456789012345678901234567890"),
            Some(int("123456789012345678901234567890"))
        );
    }

    #[test]
    fn complex_multiplication_matches_python() {
        let product = Complex64::new(1.0, 2.0) * Complex64::new(3.0, -4.0);
        assert_eq!(product, Complex64::new(11.0, 2.0));
        assert_eq!(format_complex(product), "(11+2j)");
    }

    #[test]
    fn complex_division_uses_branched_algorithm() {
        let quotient = complex_div(Complex64::new(1.0, 0.0), Complex64::new(0.0, 2.0))
            .expect("nonzero divisor");
        assert_eq!(quotient, Complex64::new(0.0, -0.5));

        let identity = complex_div(Complex64::new(3.0, 4.0), Complex64::new(3.0, 4.0))
            .expect("nonzero divisor");
        assert_eq!(identity, Complex64::new(1.0, 0.0));
    }

    #[test]
    fn complex_division_by_zero_is_rejected() {
        assert_eq!(
            complex_div(Complex64::new(1.0, 1.0), Complex64::new(0.0, 0.0)),
            None
        );
    }

    #[test]
    fn unit_complex_laws_hold() {
        let z = Complex64::new(2.5, -1.5);
        assert_eq!(z * Complex64::new(1.0, 0.0), z);
        assert_eq!(complex_div(z, z), Some(Complex64::new(1.0, 0.0)));
    }

    #[test]
    fn complex_pow_handles_zero_base_policy() {
        assert_eq!(
            complex_pow(Complex64::new(0.0, 0.0), Complex64::new(-1.0, 0.0)),
            None
        );
        assert_eq!(
            complex_pow(Complex64::new(0.0, 0.0), Complex64::new(0.0, 1.0)),
            None
        );
        assert_eq!(
            complex_pow(Complex64::new(0.0, 0.0), Complex64::new(2.0, 0.0)),
            Some(Complex64::new(0.0, 0.0))
        );
        assert_eq!(
            complex_pow(Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)),
            Some(Complex64::new(1.0, 0.0))
        );
    }

    #[test]
    fn complex_pow_of_real_base_matches_float_pow() {
        let squared =
            complex_pow(Complex64::new(3.0, 0.0), Complex64::new(2.0, 0.0)).expect("finite");
        assert!((squared.re - 9.0).abs() < 1e-9);
        assert!(squared.im.abs() < 1e-9);
    }

    #[test]
    fn formats_floats_like_python_repr() {
        assert_eq!(format_float(7.0), "7.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn formats_complex_like_python_repr() {
        assert_eq!(format_complex(Complex64::new(0.0, 2.0)), "2j");
        assert_eq!(format_complex(Complex64::new(0.0, -2.0)), "-2j");
        assert_eq!(format_complex(Complex64::new(1.0, 2.0)), "(1+2j)");
        assert_eq!(format_complex(Complex64::new(1.5, -2.5)), "(1.5-2.5j)");
        assert_eq!(format_complex(Complex64::new(-0.0, 2.0)), "(-0+2j)");
    }

    #[test]
    fn small_integers_compare_exactly_with_floats() {
        assert_eq!(
            compare_int_float(&BigInt::from(3), 3.0),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare_int_float(&BigInt::from(3), 3.5),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_int_float(&BigInt::from(-3), -2.5),
            Some(Ordering::Less)
        );
        assert_eq!(compare_int_float(&BigInt::from(1), f64::NAN), None);
    }

    #[test]
    fn infinities_compare_by_sign() {
        assert_eq!(
            compare_int_float(&int("99999999999999999999"), f64::INFINITY),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_int_float(&int("-99999999999999999999"), f64::NEG_INFINITY),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn huge_integers_compare_by_digits() {
        // 10^20 vs 1e20: equal.
        assert_eq!(
            compare_int_float(&int("100000000000000000000"), 1e20),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare_int_float(&int("100000000000000000001"), 1e20),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_int_float(&int("99999999999999999999"), 1e20),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_int_float(&int("-100000000000000000001"), -1e20),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn cross_type_equality_holds_up_to_2_pow_53() {
        let exact = BigInt::from(9007199254740992_i64); // 2^53
        assert!(int_float_equal(&exact, 9007199254740992.0));
        assert!(int_float_equal(&BigInt::from(7), 7.0));
        assert!(!int_float_equal(&BigInt::from(7), 7.5));
    }

    #[test]
    fn float_mod_takes_divisor_sign() {
        assert_eq!(float_mod(10.0, -3.0), -2.0);
        assert_eq!(float_mod(-10.0, 3.0), 2.0);
        assert_eq!(float_mod(10.0, 3.0), 1.0);
        assert_eq!(float_mod(9.0, 3.0), 0.0);
    }

    #[test]
    fn float_floor_div_rounds_toward_negative_infinity() {
        assert_eq!(float_floor_div(10.0, -3.0), -4.0);
        assert_eq!(float_floor_div(-10.0, 3.0), -4.0);
        assert_eq!(float_floor_div(10.0, 3.0), 3.0);
    }

    #[test]
    fn round_half_even_matches_python_round() {
        assert_eq!(round_half_even(0.5), 0.0);
        assert_eq!(round_half_even(1.5), 2.0);
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(-0.5), -0.0);
        assert_eq!(round_half_even(-1.5), -2.0);
        assert_eq!(round_half_even(2.4), 2.0);
    }
}
