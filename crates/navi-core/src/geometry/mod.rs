//! Planar geometry
//!
//! Geometric primitives written against [`Scalar`](crate::expr::Scalar) so
//! they serve both symbolic formulation and numeric evaluation, plus a
//! numeric convex polygon helper for producing half-plane descriptors.
//!
//! [`Point`] carries its own `sub`/`dot`/`cross` instead of using nalgebra's
//! `Vector2<S>`: the symbolic [`Expr`](crate::Expr) is a reference-counted
//! graph node with no `PartialEq` or `num_traits::Zero`, so it is not a
//! nalgebra scalar. Numeric-only code such as [`ConvexPolygon`] uses
//! `Point2<f64>`.

pub mod polygon;
pub mod primitives;

pub use polygon::{ConvexPolygon, GeometryError};
pub use primitives::*;

use serde::{Deserialize, Serialize};

use crate::expr::Scalar;

/// Guard added to a squared segment length before dividing
pub const SEGMENT_EPS: f64 = 1e-16;
/// Guard added to each ellipse semi-axis
pub const ELLIPSE_EPS: f64 = 1e-6;
/// Guard for normalising and clamping cosines
pub const ANGLE_EPS: f64 = 1e-10;

/// Point in the plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point<S> {
    pub x: S,
    pub y: S,
}

impl<S: Scalar> Point<S> {
    pub fn new(x: S, y: S) -> Self {
        Self { x, y }
    }

    pub fn sub(&self, other: &Point<S>) -> Point<S> {
        Point::new(self.x.clone() - other.x.clone(), self.y.clone() - other.y.clone())
    }

    pub fn dot(&self, other: &Point<S>) -> S {
        self.x.clone() * other.x.clone() + self.y.clone() * other.y.clone()
    }

    /// z-component of `self × other`
    pub fn cross(&self, other: &Point<S>) -> S {
        self.x.clone() * other.y.clone() - self.y.clone() * other.x.clone()
    }

    pub fn norm_squared(&self) -> S {
        self.dot(self)
    }
}

/// Directed line segment from `start` to `end`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment<S> {
    pub start: Point<S>,
    pub end: Point<S>,
}

impl<S: Scalar> Segment<S> {
    pub fn new(start: Point<S>, end: Point<S>) -> Self {
        Self { start, end }
    }

    pub fn direction(&self) -> Point<S> {
        self.end.sub(&self.start)
    }
}

/// Half-plane `b − a0·x − a1·y > 0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfPlane<S> {
    pub b: S,
    pub a0: S,
    pub a1: S,
}

impl<S: Scalar> HalfPlane<S> {
    pub fn new(b: S, a0: S, a1: S) -> Self {
        Self { b, a0, a1 }
    }

    /// Signed margin, positive on the satisfied side
    pub fn margin(&self, point: &Point<S>) -> S {
        self.b.clone() - self.a0.clone() * point.x.clone() - self.a1.clone() * point.y.clone()
    }
}

/// Rotated ellipse with a decay factor
///
/// `angle` is the rotation of the `rx` axis from the world x axis.
/// `alpha` scales the cost contribution of the ellipse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse<S> {
    pub cx: S,
    pub cy: S,
    pub rx: S,
    pub ry: S,
    pub angle: S,
    pub alpha: S,
}

impl<S: Scalar> Ellipse<S> {
    /// Same ellipse with both semi-axes enlarged by `margin`
    pub fn inflated(&self, margin: S) -> Self {
        Self {
            rx: self.rx.clone() + margin.clone(),
            ry: self.ry.clone() + margin,
            ..self.clone()
        }
    }
}
