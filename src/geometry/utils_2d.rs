//! 2D geometry utilities for items, ports and constraints.
//!
//! Pure functions shared by the item shapes (distance queries) and the
//! connection machinery (projecting glue points onto port segments).

use super::{Point2, Vector2, EPSILON};

// =============================================================================
// Point Operations
// =============================================================================

/// Compute distance between two 2D points.
#[inline]
pub fn distance(p1: Point2, p2: Point2) -> f64 {
    nalgebra::distance(&p1, &p2)
}

/// Linear interpolation between two 2D points.
#[inline]
pub fn lerp(p1: Point2, p2: Point2, t: f64) -> Point2 {
    p1 + (p2 - p1) * t
}

// =============================================================================
// Line Segment Operations
// =============================================================================

/// Find parameter t where point projects onto the segment's carrier line.
/// Returns t such that point ≈ start + t * (end - start).
/// t in [0,1] means the projection lands on the segment.
pub fn project_point_on_segment(start: Point2, end: Point2, point: Point2) -> f64 {
    let dir: Vector2 = end - start;
    let len_sq = dir.norm_squared();

    if len_sq < EPSILON * EPSILON {
        return 0.0;
    }

    (point - start).dot(&dir) / len_sq
}

/// Compute the closest point on a line segment to a given point.
#[inline]
pub fn closest_point_on_segment(start: Point2, end: Point2, point: Point2) -> Point2 {
    let t = project_point_on_segment(start, end, point).clamp(0.0, 1.0);
    lerp(start, end, t)
}

/// Distance from a point to a line segment, together with the nearest
/// point on the segment.
pub fn distance_line_point(start: Point2, end: Point2, point: Point2) -> (f64, Point2) {
    let nearest = closest_point_on_segment(start, end, point);
    (distance(point, nearest), nearest)
}

// =============================================================================
// Rectangle Operations
// =============================================================================

/// Distance from a point to the border of a rectangle `(x, y, width, height)`.
/// Negative inside the rectangle (distance to the nearest edge).
pub fn distance_rectangle_border_point(rect: (f64, f64, f64, f64), point: Point2) -> f64 {
    let (rx, ry, rw, rh) = rect;
    let (px, py) = (point.x, point.y);
    let rx1 = rx + rw;
    let ry1 = ry + rh;

    if rx < px && px < rx1 && ry < py && py < ry1 {
        return -(px - rx).min(rx1 - px).min(py - ry).min(ry1 - py);
    }

    let dx = if px < rx {
        rx - px
    } else if px > rx1 {
        px - rx1
    } else {
        0.0
    };
    let dy = if py < ry {
        ry - py
    } else if py > ry1 {
        py - ry1
    } else {
        0.0
    };

    dx.abs() + dy.abs()
}

// =============================================================================
// Tests
// =============================================================================
