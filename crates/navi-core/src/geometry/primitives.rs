//! Geometric primitives
//!
//! All functions are continuous in their inputs and guard degenerate cases
//! (zero-length segments, zero radii, parallel lines) with small epsilons
//! instead of failing.

use super::{Ellipse, HalfPlane, Point, Segment, ANGLE_EPS, ELLIPSE_EPS, SEGMENT_EPS};
use crate::expr::{product, sum, Scalar};

/// Squared Euclidean distance from `point` to each of `points`
pub fn squared_distances_to_points<S: Scalar>(point: &Point<S>, points: &[Point<S>]) -> Vec<S> {
    points.iter().map(|other| point.sub(other).norm_squared()).collect()
}

/// Squared distance from `point` to the closest point of `segment`
///
/// The projection parameter `t` is clamped to `[0, 1]`, so points beyond the
/// ends measure to the nearer endpoint.
pub fn squared_distance_to_segment<S: Scalar>(point: &Point<S>, segment: &Segment<S>) -> S {
    let dir = segment.direction();
    let t_hat =
        point.sub(&segment.start).dot(&dir) / (dir.norm_squared() + S::constant(SEGMENT_EPS));
    let t = t_hat.clamp(S::zero(), S::one());

    let closest = Point::new(
        segment.start.x.clone() + t.clone() * dir.x.clone(),
        segment.start.y.clone() + t * dir.y.clone(),
    );
    closest.sub(point).norm_squared()
}

/// Euclidean distance from `point` to the closest point of `segment`
pub fn distance_to_segment<S: Scalar>(point: &Point<S>, segment: &Segment<S>) -> S {
    squared_distance_to_segment(point, segment).sqrt()
}

/// Rotated-ellipse membership indicator
///
/// Positive inside, zero on the boundary, negative outside.
pub fn inside_ellipse<S: Scalar>(point: &Point<S>, ellipse: &Ellipse<S>) -> S {
    let dx = point.x.clone() - ellipse.cx.clone();
    let dy = point.y.clone() - ellipse.cy.clone();
    let (cos, sin) = (ellipse.angle.clone().cos(), ellipse.angle.clone().sin());
    let rx = ellipse.rx.clone() + S::constant(ELLIPSE_EPS);
    let ry = ellipse.ry.clone() + S::constant(ELLIPSE_EPS);

    let along = dx.clone() * cos.clone() + dy.clone() * sin.clone();
    let across = dx * sin - dy * cos;

    S::one() - along.square() / rx.square() - across.square() / ry.square()
}

/// Convex polygon membership indicator
///
/// Product of `max(0, margin)²` over all edges: strictly positive only when
/// every half-plane is strictly satisfied, zero on or beyond any edge.
pub fn inside_polygon<S: Scalar>(point: &Point<S>, edges: &[HalfPlane<S>]) -> S {
    product(edges.iter().map(|edge| edge.margin(point).hinge().square()))
}

/// Polygon exclusion indicator
///
/// Sum of `min(0, margin)²` over all edges: positive only when at least one
/// half-plane is violated.
pub fn outside_polygon<S: Scalar>(point: &Point<S>, edges: &[HalfPlane<S>]) -> S {
    sum(edges.iter().map(|edge| edge.margin(point).fmin(S::zero()).square()))
}

/// Signed angle from the direction of `l1` to the direction of `l2`
///
/// Magnitude via `acos` of the dot product, sign from the 2D cross product
/// `v2 × v1`. With `normalized = false` the dot product is divided by the
/// product of lengths; with `normalized = true` the directions are taken as
/// unit vectors. The cosine is clamped to `[-1 + ε, 1 − ε]` in both cases.
pub fn signed_angle_between_segments<S: Scalar>(
    l1: &Segment<S>,
    l2: &Segment<S>,
    normalized: bool,
) -> S {
    let v1 = l1.direction();
    let v2 = l2.direction();

    let mut cos_angle = v1.dot(&v2);
    if !normalized {
        let lengths = v1.norm_squared().sqrt() * v2.norm_squared().sqrt();
        cos_angle = cos_angle / (lengths + S::constant(ANGLE_EPS));
    }
    let cos_angle = cos_angle.clamp(S::constant(-1.0 + ANGLE_EPS), S::constant(1.0 - ANGLE_EPS));

    cos_angle.acos() * v2.cross(&v1).sign()
}
