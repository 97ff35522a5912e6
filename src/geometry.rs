//! Diagram geometry shared by the BPMN and Petri models.
//!
//! Coordinates are carried through conversion as rendering hints only; they
//! never influence which nodes or arcs are produced, except that synthetic
//! nodes are positioned relative to their neighbors.

use serde::{Deserialize, Serialize};

/// A point in diagram space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation from `self` towards `other`.
    pub fn lerp(self, other: Point, ratio: f64) -> Point {
        Point {
            x: self.x + (other.x - self.x) * ratio,
            y: self.y + (other.y - self.y) * ratio,
        }
    }

    pub fn midpoint(self, other: Point) -> Point {
        self.lerp(other, 0.5)
    }
}

/// Axis-aligned bounds of a diagram shape.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(0.0, 0.0, 100.0, 80.0)
    }
}

/// Centroid of a point set. Returns the origin for an empty set.
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::default();
    }
    let mut sum = Point::default();
    for p in points {
        sum.x += p.x;
        sum.y += p.y;
    }
    let n = points.len() as f64;
    Point::new(sum.x / n, sum.y / n)
}

/// Every subset of `items`, enumerated in bitmask order: the subset at
/// index `i` contains `items[b]` exactly when bit `b` of `i` is set. The
/// empty set comes first and the full set last.
pub fn power_set<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    let n = items.len();
    let mut subsets = Vec::with_capacity(1 << n);
    for mask in 0usize..(1 << n) {
        let mut subset = Vec::new();
        for (b, item) in items.iter().enumerate() {
            if mask & (1 << b) != 0 {
                subset.push(item.clone());
            }
        }
        subsets.push(subset);
    }
    subsets
}
