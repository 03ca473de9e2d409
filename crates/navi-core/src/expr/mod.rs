//! Scalar algebra
//!
//! [`Scalar`] is the small set of composition operations the MPC formulation
//! needs: arithmetic, `min`/`max`/`clamp` and a handful of elementary
//! functions. Two targets implement it:
//! - `f64`: plain numeric evaluation
//! - [`Expr`]: a symbolic graph that can be compiled into a [`Function`]
//!   with exact reverse-mode gradients

pub mod function;
pub mod symbolic;

pub use function::{ExprError, Function, Instr, Tape};
pub use symbolic::{symbols, BinaryOp, Expr, Space, UnaryOp};

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Algebra shared by the numeric and symbolic back ends
pub trait Scalar:
    Clone
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lift a literal into the algebra
    fn constant(value: f64) -> Self;

    fn sqrt(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn acos(self) -> Self;

    /// Sign with `sign(0) = 0`
    fn sign(self) -> Self;

    fn fmin(self, other: Self) -> Self;
    fn fmax(self, other: Self) -> Self;

    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn one() -> Self {
        Self::constant(1.0)
    }

    fn square(self) -> Self {
        self.clone() * self
    }

    /// `max(lo, min(self, hi))`
    fn clamp(self, lo: Self, hi: Self) -> Self {
        self.fmin(hi).fmax(lo)
    }

    /// `max(0, self)`
    fn hinge(self) -> Self {
        self.fmax(Self::zero())
    }
}

impl Scalar for f64 {
    fn constant(value: f64) -> Self {
        value
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn acos(self) -> Self {
        f64::acos(self)
    }

    fn sign(self) -> Self {
        if self > 0.0 {
            1.0
        } else if self < 0.0 {
            -1.0
        } else {
            0.0
        }
    }

    fn fmin(self, other: Self) -> Self {
        f64::min(self, other)
    }

    fn fmax(self, other: Self) -> Self {
        f64::max(self, other)
    }
}

/// Sum of all terms, zero when empty
pub fn sum<S: Scalar>(terms: impl IntoIterator<Item = S>) -> S {
    terms.into_iter().fold(S::zero(), |acc, term| acc + term)
}

/// Product of all factors, one when empty
pub fn product<S: Scalar>(factors: impl IntoIterator<Item = S>) -> S {
    factors.into_iter().fold(S::one(), |acc, factor| acc * factor)
}

/// Smallest of all terms, `None` when empty
pub fn min_of<S: Scalar>(terms: impl IntoIterator<Item = S>) -> Option<S> {
    terms.into_iter().reduce(|acc, term| acc.fmin(term))
}

/// Dot product of two equally long slices
pub fn dot<S: Scalar>(a: &[S], b: &[S]) -> S {
    sum(a.iter().cloned().zip(b.iter().cloned()).map(|(x, y)| x * y))
}
