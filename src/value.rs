use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, Div, Mul, Neg, Sub},
};

/// A number held in the constant pool or on the operand stack.
///
/// Integer arithmetic stays integral until it overflows, at which point the
/// operation is redone in floating point. Division is always floating point.
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
}

impl Default for Value {
    fn default() -> Value {
        Value::Integer(0)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
        }
    }
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Integer(n) => n as f64,
            Value::Float(n) => n,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    fn integral(
        self,
        rhs: Value,
        checked: fn(i64, i64) -> Option<i64>,
        float: fn(f64, f64) -> f64,
    ) -> Value {
        if let (Value::Integer(l), Value::Integer(r)) = (self, rhs) {
            if let Some(n) = checked(l, r) {
                return Value::Integer(n);
            }
        }

        Value::Float(float(self.as_f64(), rhs.as_f64()))
    }
}

impl Add for Value {
    type Output = Value;
    fn add(self, rhs: Self) -> Self::Output {
        self.integral(rhs, i64::checked_add, |l, r| l + r)
    }
}

impl Sub for Value {
    type Output = Value;
    fn sub(self, rhs: Self) -> Self::Output {
        self.integral(rhs, i64::checked_sub, |l, r| l - r)
    }
}

impl Mul for Value {
    type Output = Value;
    fn mul(self, rhs: Self) -> Self::Output {
        self.integral(rhs, i64::checked_mul, |l, r| l * r)
    }
}

impl Div for Value {
    type Output = Value;
    fn div(self, rhs: Self) -> Self::Output {
        Value::Float(self.as_f64() / rhs.as_f64())
    }
}

impl Neg for Value {
    type Output = Value;
    fn neg(self) -> Self::Output {
        match self {
            Value::Integer(n) => match n.checked_neg() {
                Some(n) => Value::Integer(n),
                None => Value::Float(-(n as f64)),
            },
            Value::Float(n) => Value::Float(-n),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_stay_integral() {
        assert_eq!(Value::from(2) + Value::from(3), Value::Integer(5));
        assert_eq!(Value::from(2) - Value::from(3), Value::Integer(-1));
        assert_eq!(Value::from(4) * Value::from(3), Value::Integer(12));
    }

    #[test]
    fn overflow_falls_back_to_float() {
        let sum = Value::from(i64::MAX) + Value::from(1);
        assert!(!sum.is_integer());
        assert_eq!(sum.as_f64(), i64::MAX as f64 + 1.0);

        let negated = -Value::from(i64::MIN);
        assert_eq!(negated, Value::Float(-(i64::MIN as f64)));
    }

    #[test]
    fn mixed_operands_promote() {
        assert_eq!(Value::from(1) + Value::from(0.5), Value::Float(1.5));
        assert_eq!(Value::from(0.5) * Value::from(4), Value::Float(2.0));
    }

    #[test]
    fn division_is_ieee() {
        assert_eq!(Value::from(7) / Value::from(2), Value::Float(3.5));
        assert_eq!(
            (Value::from(1) / Value::from(0)).as_f64(),
            f64::INFINITY
        );
        assert!((Value::from(0.0) / Value::from(0)).as_f64().is_nan());
    }

    #[test]
    fn display() {
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(1.2).to_string(), "1.2");
        assert_eq!(Value::from(-20.0).to_string(), "-20");
        assert_eq!(Value::from(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::from(f64::NAN).to_string(), "NaN");
    }
}
