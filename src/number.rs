// The numeric tower: a three-arm union of exact integers, IEEE doubles
// and complex doubles.
//
// Representation invariants, enforced at construction and therefore after
// every arithmetic operation:
//
// - a float with an exactly representable integer value collapses to Int;
// - a complex with zero imaginary part collapses to its real part;
// - integer addition, subtraction and multiplication widen to float
//   instead of overflowing.
//
// Keeping the invariants in the constructors means the arithmetic code
// never has to normalize its results by hand.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_complex::Complex64;
use num_traits::Zero;
use regex::Regex;

use crate::error::{Error, Result};
use crate::value::Value;

pub type Int = i64;
pub type Float = f64;

#[derive(Copy, Clone, Debug)]
pub enum Number {
    Int(Int),
    Float(Float),
    Complex(Complex64),
}

impl From<Int> for Number {
    fn from(i: Int) -> Number {
        Number::Int(i)
    }
}

impl From<Float> for Number {
    fn from(x: Float) -> Number {
        if x.is_finite() && x == x.trunc() && x.abs() < Int::MAX as Float {
            Number::Int(x as Int)
        } else {
            Number::Float(x)
        }
    }
}

impl From<Complex64> for Number {
    fn from(z: Complex64) -> Number {
        if z.im == 0.0 {
            Number::from(z.re)
        } else {
            Number::Complex(z)
        }
    }
}

// Comparison boilerplate: integers compare exactly, everything else is
// compared as doubles, and complex operands are unordered.
macro_rules! ordering {
    ($name:ident, $op:tt) => {
        pub fn $name(&self, other: &Number) -> Result<bool> {
            match (*self, *other) {
                (Number::Complex(_), _) | (_, Number::Complex(_)) => Err(Error::Domain(
                    "complex numbers are unordered",
                    Value::Number(*other),
                )),
                (Number::Int(a), Number::Int(b)) => Ok(a $op b),
                (a, b) => Ok(a.to_f64() $op b.to_f64()),
            }
        }
    };
}

// Unary functions that promote to double, or dispatch to the complex
// implementation for a complex argument.
macro_rules! transcendental {
    ($($name:ident),+ $(,)?) => { $(
        pub fn $name(&self) -> Number {
            match *self {
                Number::Complex(z) => Number::from(z.$name()),
                n => Number::from(n.to_f64().$name()),
            }
        }
    )+ };
}

impl Number {
    pub fn rect(re: Float, im: Float) -> Number {
        Number::from(Complex64::new(re, im))
    }

    pub fn polar(r: Float, theta: Float) -> Number {
        Number::from(Complex64::from_polar(r, theta))
    }

    pub fn is_complex(&self) -> bool {
        match self {
            Number::Complex(_) => true,
            _ => false,
        }
    }

    // Exactness follows the representation: only the integer arm is exact.
    pub fn is_exact(&self) -> bool {
        match self {
            Number::Int(_) => true,
            _ => false,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(i) => *i == 0,
            Number::Float(x) => *x == 0.0,
            Number::Complex(z) => z.is_zero(),
        }
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Number::Int(_) => true,
            Number::Float(x) => x.is_finite() && *x == x.trunc(),
            Number::Complex(_) => false,
        }
    }

    /// Convert to a double; a complex number converts to its magnitude.
    pub fn to_f64(&self) -> Float {
        match self {
            Number::Int(i) => *i as Float,
            Number::Float(x) => *x,
            Number::Complex(z) => z.norm(),
        }
    }

    pub fn to_complex(&self) -> Complex64 {
        match self {
            Number::Int(i) => Complex64::new(*i as Float, 0.0),
            Number::Float(x) => Complex64::new(*x, 0.0),
            Number::Complex(z) => *z,
        }
    }

    /// Convert to an exact integer if the value is integral.
    pub fn to_int(&self) -> Result<Int> {
        match self {
            Number::Int(i) => Ok(*i),
            _ => Err(Error::Domain(
                "expected an exact integer",
                Value::Number(*self),
            )),
        }
    }

    ordering! { lt, < }
    ordering! { gt, > }
    ordering! { le, <= }
    ordering! { ge, >= }

    transcendental! {
        sin, cos, tan, asin, acos, atan,
        sinh, cosh, tanh, asinh, acosh, atanh,
        exp, cbrt,
    }

    pub fn log(&self) -> Number {
        match *self {
            Number::Complex(z) => Number::from(z.ln()),
            n => Number::from(n.to_f64().ln()),
        }
    }

    pub fn log10(&self) -> Number {
        match *self {
            Number::Complex(z) => Number::from(z.log10()),
            n => Number::from(n.to_f64().log10()),
        }
    }

    /// Square root; negative reals promote to the complex plane.
    pub fn sqrt(&self) -> Number {
        match *self {
            Number::Complex(z) => Number::from(z.sqrt()),
            n => {
                let x = n.to_f64();
                if x < 0.0 {
                    Number::from(Complex64::new(x, 0.0).sqrt())
                } else {
                    Number::from(x.sqrt())
                }
            }
        }
    }

    pub fn pow(&self, rhs: &Number) -> Number {
        if self.is_zero() {
            return if rhs.is_zero() {
                Number::Int(1)
            } else {
                Number::Int(0)
            };
        }
        match (*self, *rhs) {
            (Number::Complex(a), b) => Number::from(a.powc(b.to_complex())),
            (a, Number::Complex(b)) => Number::from(a.to_complex().powc(b)),
            (a, b) => Number::from(a.to_f64().powf(b.to_f64())),
        }
    }

    pub fn div(&self, rhs: &Number) -> Result<Number> {
        if rhs.is_zero() {
            return Err(Error::Domain("divide by zero", Value::Number(*self)));
        }
        Ok(match (*self, *rhs) {
            // An integer quotient stays exact only when the division is exact.
            (Number::Int(a), Number::Int(b)) => match (a.checked_rem(b), a.checked_div(b)) {
                (Some(0), Some(q)) => Number::Int(q),
                _ => Number::from(a as Float / b as Float),
            },
            (Number::Complex(a), b) => Number::from(a / b.to_complex()),
            (a, Number::Complex(b)) => Number::from(a.to_complex() / b),
            (a, b) => Number::from(a.to_f64() / b.to_f64()),
        })
    }

    /// Floored modulo, the sign following the divisor.
    pub fn modulo(&self, rhs: &Number) -> Result<Number> {
        if rhs.is_zero() {
            return Err(Error::Domain("divide by zero", Value::Number(*self)));
        }
        match (*self, *rhs) {
            (Number::Complex(_), _) | (_, Number::Complex(_)) => Err(Error::Domain(
                "modulo is undefined for complex numbers",
                Value::Number(*self),
            )),
            (Number::Int(a), Number::Int(b)) => {
                let r = a.checked_rem(b).unwrap_or(0);
                // When r and b share a sign, r + b may overflow, but the
                // floored result is then r itself.
                Ok(Number::Int(r.checked_add(b).map(|s| s % b).unwrap_or(r)))
            }
            (a, b) => {
                let (x, y) = (a.to_f64(), b.to_f64());
                Ok(Number::from((x % y + y) % y))
            }
        }
    }

    /// Truncating remainder, the sign following the dividend.
    pub fn remainder(&self, rhs: &Number) -> Result<Number> {
        if rhs.is_zero() {
            return Err(Error::Domain("divide by zero", Value::Number(*self)));
        }
        match (*self, *rhs) {
            (Number::Complex(_), _) | (_, Number::Complex(_)) => Err(Error::Domain(
                "remainder is undefined for complex numbers",
                Value::Number(*self),
            )),
            (Number::Int(a), Number::Int(b)) => Ok(Number::Int(a.checked_rem(b).unwrap_or(0))),
            (a, b) => Ok(Number::from(a.to_f64() % b.to_f64())),
        }
    }

    pub fn quotient(&self, rhs: &Number) -> Result<Number> {
        if rhs.is_zero() {
            return Err(Error::Domain("divide by zero", Value::Number(*self)));
        }
        match (*self, *rhs) {
            (Number::Complex(_), _) | (_, Number::Complex(_)) => Err(Error::Domain(
                "quotient is undefined for complex numbers",
                Value::Number(*self),
            )),
            (Number::Int(a), Number::Int(b)) => match a.checked_div(b) {
                Some(q) => Ok(Number::Int(q)),
                None => Ok(Number::from(a as Float / b as Float)),
            },
            (a, b) => Ok(Number::from((a.to_f64() / b.to_f64()).trunc())),
        }
    }

    pub fn floor(&self) -> Result<Number> {
        self.rounding(Float::floor)
    }

    pub fn ceil(&self) -> Result<Number> {
        self.rounding(Float::ceil)
    }

    pub fn trunc(&self) -> Result<Number> {
        self.rounding(Float::trunc)
    }

    /// Round half-way cases to the nearest even integer.
    pub fn round(&self) -> Result<Number> {
        self.rounding(|x| {
            let r = x.round();
            if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
                r - x.signum()
            } else {
                r
            }
        })
    }

    fn rounding(&self, f: impl Fn(Float) -> Float) -> Result<Number> {
        match *self {
            Number::Int(i) => Ok(Number::Int(i)),
            Number::Float(x) => Ok(Number::from(f(x))),
            Number::Complex(_) => Err(Error::Domain(
                "rounding is undefined for complex numbers",
                Value::Number(*self),
            )),
        }
    }

    pub fn abs(&self) -> Number {
        match *self {
            Number::Int(i) => match i.checked_abs() {
                Some(a) => Number::Int(a),
                None => Number::Float(-(i as Float)),
            },
            Number::Float(x) => Number::Float(x.abs()),
            Number::Complex(z) => Number::from(z.norm()),
        }
    }

    pub fn min(&self, other: &Number) -> Result<Number> {
        Ok(if other.lt(self)? { *other } else { *self })
    }

    pub fn max(&self, other: &Number) -> Result<Number> {
        Ok(if other.gt(self)? { *other } else { *self })
    }

    pub fn real_part(&self) -> Number {
        match *self {
            Number::Complex(z) => Number::from(z.re),
            n => n,
        }
    }

    pub fn imag_part(&self) -> Number {
        match *self {
            Number::Complex(z) => Number::from(z.im),
            _ => Number::Int(0),
        }
    }

    pub fn arg(&self) -> Number {
        Number::from(self.to_complex().arg())
    }

    pub fn conj(&self) -> Number {
        match *self {
            Number::Complex(z) => Number::from(z.conj()),
            n => n,
        }
    }

    pub fn hypot(&self, other: &Number) -> Number {
        Number::from(self.to_f64().hypot(other.to_f64()))
    }

    pub fn is_odd(&self) -> Result<bool> {
        match *self {
            Number::Int(i) => Ok(i.rem_euclid(2) == 1),
            Number::Float(x) if self.is_integer() => Ok((x % 2.0).abs() == 1.0),
            n => Err(Error::Domain(
                "parity is only defined for integers",
                Value::Number(n),
            )),
        }
    }

    /// Lexical analysis of a numeric literal: integer, floating point, or
    /// the `a+bi` complex forms.
    pub fn parse(s: &str) -> Option<Number> {
        lazy_static! {
            static ref INT_RE: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
            static ref FLOAT_RE: Regex =
                Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
            static ref COMPLEX_RE: Regex = Regex::new(
                r"^(?P<re>[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)?(?P<im>[+-](?:(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)?)?[iI]$"
            )
            .unwrap();
        }

        match s {
            "+i" | "+I" => return Some(Number::Complex(Complex64::new(0.0, 1.0))),
            "-i" | "-I" => return Some(Number::Complex(Complex64::new(0.0, -1.0))),
            _ => {}
        }
        if INT_RE.is_match(s) {
            // Integer literals too large for the exact arm fall back to float.
            return match s.parse::<Int>() {
                Ok(i) => Some(Number::Int(i)),
                Err(_) => s.parse::<Float>().ok().map(Number::from),
            };
        }
        if FLOAT_RE.is_match(s) {
            return s.parse::<Float>().ok().map(Number::from);
        }
        if let Some(caps) = COMPLEX_RE.captures(s) {
            let imag_of = |t: &str| -> Option<Float> {
                match t {
                    "+" => Some(1.0),
                    "-" => Some(-1.0),
                    _ => t.parse().ok(),
                }
            };
            let (re, im) = match (caps.name("re"), caps.name("im")) {
                (Some(r), Some(i)) => (r.as_str().parse().ok()?, imag_of(i.as_str())?),
                (Some(r), None) => (0.0, r.as_str().parse().ok()?),
                (None, Some(i)) => (0.0, imag_of(i.as_str())?),
                (None, None) => return None,
            };
            return Some(Number::rect(re, im));
        }
        None
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Number) -> bool {
        match (*self, *other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Complex(a), b) => a == b.to_complex(),
            (a, Number::Complex(b)) => a.to_complex() == b,
            (a, b) => a.to_f64() == b.to_f64(),
        }
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(n) => Number::Int(n),
                None => Number::from(a as Float + b as Float),
            },
            (Number::Complex(a), b) => Number::from(a + b.to_complex()),
            (a, Number::Complex(b)) => Number::from(a.to_complex() + b),
            (a, b) => Number::from(a.to_f64() + b.to_f64()),
        }
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_sub(b) {
                Some(n) => Number::Int(n),
                None => Number::from(a as Float - b as Float),
            },
            (Number::Complex(a), b) => Number::from(a - b.to_complex()),
            (a, Number::Complex(b)) => Number::from(a.to_complex() - b),
            (a, b) => Number::from(a.to_f64() - b.to_f64()),
        }
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_mul(b) {
                Some(n) => Number::Int(n),
                None => Number::from(a as Float * b as Float),
            },
            (Number::Complex(a), b) => Number::from(a * b.to_complex()),
            (a, Number::Complex(b)) => Number::from(a.to_complex() * b),
            (a, b) => Number::from(a.to_f64() * b.to_f64()),
        }
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Int(i) => match i.checked_neg() {
                Some(n) => Number::Int(n),
                None => Number::from(-(i as Float)),
            },
            Number::Float(x) => Number::Float(-x),
            Number::Complex(z) => Number::Complex(-z),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{}", x),
            Number::Complex(z) => {
                write!(f, "{}", z.re)?;
                if z.im == 1.0 {
                    write!(f, "+i")
                } else if z.im == -1.0 {
                    write!(f, "-i")
                } else if z.im < 0.0 {
                    write!(f, "{}i", z.im)
                } else {
                    write!(f, "+{}i", z.im)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(x: Float) -> Number {
        Number::from(x)
    }

    #[test]
    fn test_collapse() {
        assert!(matches!(n(1.0), Number::Int(1)));
        assert!(matches!(n(-42.0), Number::Int(-42)));
        assert!(matches!(n(1.5), Number::Float(_)));
        assert!(matches!(Number::rect(3.0, 0.0), Number::Int(3)));
        assert!(matches!(Number::rect(0.0, 1.0), Number::Complex(_)));
        // Not representable as Int: stays a float.
        assert!(matches!(n(1.0e300), Number::Float(_)));
        assert!(matches!(n(Float::NAN), Number::Float(_)));
    }

    #[test]
    fn test_widening() {
        let max = Number::Int(Int::MAX);
        assert!(matches!(max + Number::Int(1), Number::Float(_)));
        assert!(matches!(Number::Int(Int::MIN) - Number::Int(1), Number::Float(_)));
        assert!(matches!(max * Number::Int(2), Number::Float(_)));
        assert!(matches!(-Number::Int(Int::MIN), Number::Float(_)));
        // No overflow, no widening.
        assert_eq!(Number::Int(2) + Number::Int(3), Number::Int(5));
    }

    #[test]
    fn test_division() {
        assert_eq!(Number::Int(6).div(&Number::Int(2)).unwrap(), Number::Int(3));
        assert_eq!(
            Number::Int(1).div(&Number::Int(2)).unwrap(),
            Number::Float(0.5)
        );
        assert!(Number::Int(1).div(&Number::Int(0)).is_err());
        assert!(Number::Int(1).div(&Number::Float(0.5)).is_ok());
    }

    #[test]
    fn test_modulo_remainder() {
        assert_eq!(
            Number::Int(-7).modulo(&Number::Int(3)).unwrap(),
            Number::Int(2)
        );
        assert_eq!(
            Number::Int(-7).remainder(&Number::Int(3)).unwrap(),
            Number::Int(-1)
        );
        assert_eq!(
            Number::Int(7).quotient(&Number::Int(2)).unwrap(),
            Number::Int(3)
        );
        assert!(Number::Int(7).modulo(&Number::Int(0)).is_err());
    }

    #[test]
    fn test_equality_across_arms() {
        assert_eq!(Number::Float(1.0), Number::Int(1));
        assert_eq!(Number::Complex(num_complex::Complex64::new(2.0, 0.0)), Number::Int(2));
        assert_ne!(Number::Int(1), Number::Int(2));
        assert_ne!(Number::Float(Float::NAN), Number::Float(Float::NAN));
    }

    #[test]
    fn test_ordering() {
        assert!(Number::Int(1).lt(&Number::Float(1.5)).unwrap());
        assert!(Number::Int(2).ge(&Number::Int(2)).unwrap());
        assert!(Number::rect(0.0, 1.0).lt(&Number::Int(1)).is_err());
    }

    #[test]
    fn test_sqrt_collapses_back() {
        let i = Number::Int(-1).sqrt();
        assert!(i.is_complex());
        // i * i is -1 + 0i, which must collapse to the exact integer.
        assert_eq!(i * i, Number::Int(-1));
        assert_eq!(Number::Int(9).sqrt(), Number::Int(3));
    }

    #[test]
    fn test_pow() {
        assert_eq!(Number::Int(2).pow(&Number::Int(10)), Number::Int(1024));
        assert_eq!(Number::Int(0).pow(&Number::Int(0)), Number::Int(1));
        assert_eq!(Number::Int(0).pow(&Number::Int(5)), Number::Int(0));
        assert_eq!(
            Number::Int(4).pow(&Number::Float(0.5)),
            Number::Int(2)
        );
    }

    #[test]
    fn test_round_to_even() {
        assert_eq!(Number::Float(2.5).round().unwrap(), Number::Int(2));
        assert_eq!(Number::Float(3.5).round().unwrap(), Number::Int(4));
        assert_eq!(Number::Float(-2.5).round().unwrap(), Number::Int(-2));
        assert_eq!(Number::Float(2.4).round().unwrap(), Number::Int(2));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Number::parse("42"), Some(Number::Int(42)));
        assert_eq!(Number::parse("-7"), Some(Number::Int(-7)));
        assert_eq!(Number::parse("1.5"), Some(Number::Float(1.5)));
        assert_eq!(Number::parse("-.5"), Some(Number::Float(-0.5)));
        assert_eq!(Number::parse("1e3"), Some(Number::Int(1000)));
        assert_eq!(Number::parse("2+3i"), Some(Number::rect(2.0, 3.0)));
        assert_eq!(Number::parse("2-3i"), Some(Number::rect(2.0, -3.0)));
        assert_eq!(Number::parse("4i"), Some(Number::rect(0.0, 4.0)));
        assert_eq!(Number::parse("+i"), Some(Number::rect(0.0, 1.0)));
        assert_eq!(Number::parse("-i"), Some(Number::rect(0.0, -1.0)));
        assert_eq!(Number::parse("1.5e2"), Some(Number::Int(150)));
        assert_eq!(Number::parse("foo"), None);
        assert_eq!(Number::parse("i"), None);
        assert_eq!(Number::parse("1.2.3"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Number::Int(42).to_string(), "42");
        assert_eq!(Number::Float(1.5).to_string(), "1.5");
        assert_eq!(Number::rect(2.0, 3.0).to_string(), "2+3i");
        assert_eq!(Number::rect(2.0, -1.0).to_string(), "2-i");
        assert_eq!(Number::rect(0.0, 1.0).to_string(), "0+i");
    }

    #[test]
    fn test_parity() {
        assert!(Number::Int(3).is_odd().unwrap());
        assert!(!Number::Int(4).is_odd().unwrap());
        assert!(Number::Int(-3).is_odd().unwrap());
        assert!(Number::Float(1.5).is_odd().is_err());
    }
}
