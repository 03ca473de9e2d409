//! Obstacle descriptors read from the parameter vector

use navi_core::geometry::{inside_ellipse, inside_polygon};
use navi_core::{Ellipse, HalfPlane, Point, Scalar};
use serde::{Deserialize, Serialize};

/// Obstacle as seen by the rollout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Obstacle<S> {
    /// Convex polygon, one half-plane per edge
    Static { edges: Vec<HalfPlane<S>> },
    /// Moving ellipse, one prediction per horizon step
    Dynamic { ellipses: Vec<Ellipse<S>> },
}

impl<S> Obstacle<S> {
    pub fn is_static(&self) -> bool {
        matches!(self, Obstacle::Static { .. })
    }

    /// Predicted ellipse at `step`; the last prediction holds beyond the horizon
    pub fn ellipse_at(&self, step: usize) -> Option<&Ellipse<S>> {
        match self {
            Obstacle::Static { .. } => None,
            Obstacle::Dynamic { ellipses } => ellipses.get(step).or_else(|| ellipses.last()),
        }
    }
}

impl<S: Scalar> Obstacle<S> {
    /// Containment indicator at `step`, clipped at zero
    ///
    /// Positive only when `point` is strictly inside the obstacle. Dynamic
    /// obstacles are tested against their true (uninflated) boundary.
    pub fn penalty_at(&self, point: &Point<S>, step: usize) -> S {
        match self {
            Obstacle::Static { edges } => inside_polygon(point, edges).hinge(),
            Obstacle::Dynamic { .. } => match self.ellipse_at(step) {
                Some(ellipse) => inside_ellipse(point, ellipse).hinge(),
                None => S::zero(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navi_core::geometry::ConvexPolygon;

    fn unit_circle(cx: f64) -> Ellipse<f64> {
        Ellipse { cx, cy: 0.0, rx: 1.0, ry: 1.0, angle: 0.0, alpha: 1.0 }
    }

    #[test]
    fn test_static_penalty() {
        let square = ConvexPolygon::rectangle(0.0, 0.0, 1.0, 1.0).unwrap();
        let obstacle = Obstacle::Static { edges: square.edges().to_vec() };

        assert!(obstacle.is_static());
        assert!(obstacle.penalty_at(&Point::new(0.5, 0.5), 0) > 0.0);
        assert_eq!(obstacle.penalty_at(&Point::new(1.5, 0.5), 0), 0.0);
        assert_eq!(obstacle.penalty_at(&Point::new(1.0, 0.5), 0), 0.0);
    }

    #[test]
    fn test_dynamic_penalty_follows_prediction() {
        let obstacle = Obstacle::Dynamic { ellipses: vec![unit_circle(0.0), unit_circle(5.0)] };
        let origin = Point::new(0.0, 0.0);

        assert!(!obstacle.is_static());
        assert!(obstacle.penalty_at(&origin, 0) > 0.0);
        assert_eq!(obstacle.penalty_at(&origin, 1), 0.0);
        // Beyond the last prediction the obstacle stays where it was
        assert_eq!(obstacle.ellipse_at(7), Some(&unit_circle(5.0)));
        assert!(obstacle.penalty_at(&Point::new(5.0, 0.0), 7) > 0.0);
    }
}
