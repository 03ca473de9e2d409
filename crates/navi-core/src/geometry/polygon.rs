//! Convex polygon descriptors
//!
//! Converts a vertex list into the half-plane edges `(b, a0, a1)` consumed
//! by the formulation. Edge normals are normalised, so an edge margin is the
//! Euclidean distance to that edge line.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{HalfPlane, Point};

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("A polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("Polygon has zero area")]
    Degenerate,
    #[error("Polygon is not convex at vertex {0}")]
    NotConvex(usize),
}

/// Convex polygon with counter-clockwise vertices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvexPolygon {
    vertices: Vec<Point2<f64>>,
    edges: Vec<HalfPlane<f64>>,
}

impl ConvexPolygon {
    /// Build from vertices in either winding order
    pub fn from_vertices(vertices: &[Point2<f64>]) -> Result<Self, GeometryError> {
        let n = vertices.len();
        if n < 3 {
            return Err(GeometryError::TooFewVertices(n));
        }

        let area2: f64 = (0..n)
            .map(|i| {
                let (a, b) = (vertices[i], vertices[(i + 1) % n]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        if area2.abs() < 1e-12 {
            return Err(GeometryError::Degenerate);
        }

        let mut vertices = vertices.to_vec();
        if area2 < 0.0 {
            vertices.reverse();
        }

        for i in 0..n {
            let e1 = vertices[(i + 1) % n] - vertices[i];
            let e2 = vertices[(i + 2) % n] - vertices[(i + 1) % n];
            if e1.perp(&e2) < -1e-12 {
                return Err(GeometryError::NotConvex((i + 1) % n));
            }
        }

        let edges = (0..n)
            .filter_map(|i| edge_half_plane(&vertices[i], &vertices[(i + 1) % n]))
            .collect();

        Ok(Self { vertices, edges })
    }

    /// Axis-aligned rectangle `[x_min, x_max] × [y_min, y_max]`
    pub fn rectangle(
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    ) -> Result<Self, GeometryError> {
        Self::from_vertices(&[
            Point2::new(x_min, y_min),
            Point2::new(x_max, y_min),
            Point2::new(x_max, y_max),
            Point2::new(x_min, y_max),
        ])
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn edges(&self) -> &[HalfPlane<f64>] {
        &self.edges
    }

    /// Strict containment
    pub fn contains(&self, point: &Point2<f64>) -> bool {
        let p = Point::new(point.x, point.y);
        self.edges.iter().all(|edge| edge.margin(&p) > 0.0)
    }
}

/// Interior lies to the left of `from → to`; `None` for repeated vertices
fn edge_half_plane(from: &Point2<f64>, to: &Point2<f64>) -> Option<HalfPlane<f64>> {
    let e: Vector2<f64> = to - from;
    let length = e.norm();
    if length < 1e-12 {
        return None;
    }
    let e = e / length;
    // cross(e, p − from) > 0  ⇔  (e.y·from.x − e.x·from.y) − e.y·x + e.x·y > 0
    Some(HalfPlane::new(e.y * from.x - e.x * from.y, e.y, -e.x))
}
