//! Cost terms
//!
//! Every term returns a scalar contribution and is generic over [`Scalar`],
//! so the same code builds the symbolic cost and evaluates it numerically.

use navi_core::expr::{min_of, sum};
use navi_core::geometry::{
    inside_ellipse, inside_polygon, squared_distance_to_segment, squared_distances_to_points,
};
use navi_core::{Ellipse, HalfPlane, Point, Scalar, Segment};

/// Penalize being strictly inside a convex polygon
pub fn cost_inside_polygon<S: Scalar>(point: &Point<S>, edges: &[HalfPlane<S>], weight: S) -> S {
    inside_polygon(point, edges) * weight
}

/// `Σ max(0, inside)² · alpha · weight` over `ellipses`
pub fn cost_inside_ellipses<S: Scalar>(point: &Point<S>, ellipses: &[Ellipse<S>], weight: S) -> S {
    sum(ellipses.iter().map(|ellipse| {
        inside_ellipse(point, ellipse).hinge().square() * ellipse.alpha.clone() * weight.clone()
    }))
}

/// Weighted sum of squared control components
pub fn cost_control_action<S: Scalar>(control: &[S], weights: &[S]) -> S {
    sum(control
        .iter()
        .zip(weights)
        .map(|(u, w)| w.clone() * u.clone().square()))
}

/// Weighted sum of squared differences to the previous control
pub fn cost_control_jerk<S: Scalar>(control: &[S], previous: &[S], weights: &[S]) -> S {
    sum(control
        .iter()
        .zip(previous)
        .zip(weights)
        .map(|((u, u_prev), w)| w.clone() * (u.clone() - u_prev.clone()).square()))
}

/// `weight · Σ max(0, safe_distance² − d²)` over the other robots
pub fn cost_fleet_collision<S: Scalar>(
    point: &Point<S>,
    others: &[Point<S>],
    safe_distance: S,
    weight: S,
) -> S {
    let safe_squared = safe_distance.square();
    let intrusion = sum(squared_distances_to_points(point, others)
        .into_iter()
        .map(|d2| (safe_squared.clone() - d2).hinge()));
    weight * intrusion
}

/// Weighted squared deviation from a scalar reference
pub fn cost_ref_value_deviation<S: Scalar>(actual: S, reference: S, weight: S) -> S {
    weight * (actual - reference).square()
}

/// Weighted squared deviation from a reference vector, one weight per component
pub fn cost_ref_state_deviation<S: Scalar>(state: &[S], reference: &[S], weights: &[S]) -> S {
    sum(state
        .iter()
        .zip(reference)
        .zip(weights)
        .map(|((s, r), w)| w.clone() * (s.clone() - r.clone()).square()))
}

/// Weighted squared distance to the closest segment of `path`
///
/// Consecutive points form the segments. A single point scores the squared
/// distance to that point, an empty path costs nothing.
pub fn cost_ref_path_deviation<S: Scalar>(point: &Point<S>, path: &[Point<S>], weight: S) -> S {
    let closest = match path {
        [] => return S::zero(),
        [only] => point.sub(only).norm_squared(),
        _ => {
            let distances = path.windows(2).map(|pair| {
                let segment = Segment::new(pair[0].clone(), pair[1].clone());
                squared_distance_to_segment(point, &segment)
            });
            match min_of(distances) {
                Some(distance) => distance,
                None => S::zero(),
            }
        }
    };
    weight * closest
}

/// Weighted squared error between the distance to `reference` and `target_distance`
///
/// Keeps a fixed offset to a reference point, e.g. a formation slot.
pub fn cost_ref_point_detach<S: Scalar>(
    point: &Point<S>,
    reference: &Point<S>,
    target_distance: S,
    weight: S,
) -> S {
    let distance = point.sub(reference).norm_squared().sqrt();
    weight * (distance - target_distance).square()
}
