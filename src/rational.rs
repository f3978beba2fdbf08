use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A timebase or rate, `num/den` seconds (or units) per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// num/den with a positive denominator, widened for cross-multiplication.
    fn normalized(self) -> (i128, i128) {
        if self.den < 0 {
            (-(self.num as i128), -(self.den as i128))
        } else {
            (self.num as i128, self.den as i128)
        }
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Compares `ts_a * tb_a` against `ts_b * tb_b` exactly.
pub fn compare_ts(ts_a: i64, tb_a: Rational, ts_b: i64, tb_b: Rational) -> Ordering {
    let (na, da) = tb_a.normalized();
    let (nb, db) = tb_b.normalized();
    let lhs = ts_a as i128 * na * db;
    let rhs = ts_b as i128 * nb * da;
    lhs.cmp(&rhs)
}

/// Converts `ts` from one timebase to another, rounding to nearest with ties
/// away from zero. Degenerate timebases leave the value untouched.
pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
    let (fn_, fd) = from.normalized();
    let (tn, td) = to.normalized();
    let mut num = ts as i128 * fn_ * td;
    let mut den = fd * tn;
    if den == 0 {
        return ts;
    }
    if den < 0 {
        num = -num;
        den = -den;
    }
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        -((-num + half) / den)
    };
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
