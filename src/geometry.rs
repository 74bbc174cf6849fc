//! Shared geometric predicates for proximity and steering math.
//!
//! Every "is close enough" check in the command layer goes through these
//! helpers: circle-vs-rectangle for building footprints, circle-vs-point for
//! unit targets, and point-to-segment distance for avoidance ray tests.

use serde::{Deserialize, Serialize};

use crate::components::{Feet, Tile};

/// Axis-aligned rectangle of tiles, inclusive on both corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub min: Tile,
    pub max: Tile,
}

impl TileRect {
    pub fn new(min: Tile, max: Tile) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y, "inverted tile rect");
        Self { min, max }
    }

    /// Rectangle bounds in feet coordinates. The max corner is the far edge
    /// of the max tile, so a 1x1 rect at (3,3) spans feet [3.0, 4.0].
    pub fn feet_bounds(&self) -> (Feet, Feet) {
        (
            Feet::new(self.min.x as f32, self.min.y as f32),
            Feet::new(self.max.x as f32 + 1.0, self.max.y as f32 + 1.0),
        )
    }

    /// Center of the rectangle in feet coordinates.
    pub fn center(&self) -> Feet {
        let (lo, hi) = self.feet_bounds();
        Feet::new((lo.x + hi.x) * 0.5, (lo.y + hi.y) * 0.5)
    }

    /// Closest point of the rectangle to `point` (clamped into the bounds).
    pub fn closest_point(&self, point: Feet) -> Feet {
        let (lo, hi) = self.feet_bounds();
        Feet::new(point.x.clamp(lo.x, hi.x), point.y.clamp(lo.y, hi.y))
    }

    pub fn contains_tile(&self, tile: Tile) -> bool {
        tile.x >= self.min.x && tile.x <= self.max.x && tile.y >= self.min.y && tile.y <= self.max.y
    }
}

/// Does a circle at `center` with `radius` overlap the rectangle?
///
/// Returns true exactly at the boundary, matching the circle-vs-point test.
pub fn circle_overlaps_rect(center: Feet, radius: f32, rect: TileRect) -> bool {
    let closest = rect.closest_point(center);
    center.distance_sq_to(closest) <= radius * radius
}

/// Does a circle at `center` with `radius` cover `point`?
pub fn circle_contains_point(center: Feet, radius: f32, point: Feet) -> bool {
    center.distance_sq_to(point) <= radius * radius
}

/// Distance from `point` to the segment `a`..`b`.
pub fn point_segment_distance(point: Feet, a: Feet, b: Feet) -> f32 {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len_sq = abx * abx + aby * aby;
    if len_sq < f32::EPSILON {
        return point.distance_to(a);
    }
    let t = (((point.x - a.x) * abx + (point.y - a.y) * aby) / len_sq).clamp(0.0, 1.0);
    point.distance_to(Feet::new(a.x + t * abx, a.y + t * aby))
}

/// Normalize a direction vector; zero-length input yields (0, 0).
pub fn normalize(dx: f32, dy: f32) -> (f32, f32) {
    let mag = (dx * dx + dy * dy).sqrt();
    if mag < 1e-4 {
        (0.0, 0.0)
    } else {
        (dx / mag, dy / mag)
    }
}

/// Left-hand perpendicular of a direction vector.
pub fn perpendicular_left(dx: f32, dy: f32) -> (f32, f32) {
    (-dy, dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_closest_point_clamps_into_rect() {
        let rect = TileRect::new(Tile::new(2, 2), Tile::new(4, 3));
        // Inside stays put
        let inside = Feet::new(3.0, 2.5);
        assert_eq!(rect.closest_point(inside), inside);
        // Outside clamps to the edge
        assert_eq!(rect.closest_point(Feet::new(0.0, 2.5)), Feet::new(2.0, 2.5));
        assert_eq!(rect.closest_point(Feet::new(6.0, 9.0)), Feet::new(5.0, 4.0));
    }

    #[test]
    fn test_circle_rect_overlap_boundary() {
        let rect = TileRect::new(Tile::new(5, 5), Tile::new(5, 5)); // feet [5,6]x[5,6]
        // Exactly at the boundary counts as overlap
        assert!(circle_overlaps_rect(Feet::new(4.0, 5.5), 1.0, rect));
        // Just outside does not
        assert!(!circle_overlaps_rect(Feet::new(3.99, 5.5), 1.0, rect));
        // Center inside always overlaps
        assert!(circle_overlaps_rect(Feet::new(5.5, 5.5), 0.1, rect));
    }

    #[test]
    fn test_circle_point_boundary() {
        let center = Feet::new(0.0, 0.0);
        assert!(circle_contains_point(center, 2.0, Feet::new(2.0, 0.0)));
        assert!(!circle_contains_point(center, 2.0, Feet::new(2.01, 0.0)));
    }

    #[test]
    fn test_point_segment_distance() {
        let a = Feet::new(0.0, 0.0);
        let b = Feet::new(4.0, 0.0);
        assert_relative_eq!(point_segment_distance(Feet::new(2.0, 3.0), a, b), 3.0);
        // Beyond the endpoints, distance is to the endpoint
        assert_relative_eq!(point_segment_distance(Feet::new(-3.0, 4.0), a, b), 5.0);
        // Degenerate segment
        assert_relative_eq!(point_segment_distance(Feet::new(1.0, 0.0), a, a), 1.0);
    }

    #[test]
    fn test_normalize_zero_safe() {
        assert_eq!(normalize(0.0, 0.0), (0.0, 0.0));
        let (x, y) = normalize(3.0, 4.0);
        assert_relative_eq!(x, 0.6);
        assert_relative_eq!(y, 0.8);
    }

    #[test]
    fn test_perpendicular_left() {
        // Heading +x, left is +y
        assert_eq!(perpendicular_left(1.0, 0.0), (0.0, 1.0));
        assert_eq!(perpendicular_left(0.0, 1.0), (-1.0, 0.0));
    }
}
