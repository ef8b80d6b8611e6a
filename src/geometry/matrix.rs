//! Affine 2D transformation matrix.
//!
//! Six numbers `(a, b, c, d, tx, ty)` describing the map
//! `(x, y) -> (a*x + c*y + tx, b*x + d*y + ty)`. The in-place mutators
//! follow the usual graphics convention: the new operation applies to
//! coordinates *before* the existing transformation.

use nalgebra as na;
use serde::{Deserialize, Serialize};

use super::{Point2, Vector2, EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Rotation by `angle` radians, counter-clockwise in a y-up frame.
    pub fn rotation(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// The six components as an array, in `(a, b, c, d, tx, ty)` order.
    pub fn tuple(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.tx, self.ty]
    }

    pub fn from_tuple(t: [f64; 6]) -> Self {
        Self::new(t[0], t[1], t[2], t[3], t[4], t[5])
    }

    /// Compose: the result applies `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            tx: self.tx * other.a + self.ty * other.c + other.tx,
            ty: self.tx * other.b + self.ty * other.d + other.ty,
        }
    }

    /// Translate the local frame: coordinates are shifted by `(tx, ty)`
    /// before the existing transformation applies.
    pub fn translate(&mut self, tx: f64, ty: f64) {
        *self = Matrix::translation(tx, ty).multiply(self);
    }

    /// Scale the local frame.
    pub fn scale(&mut self, sx: f64, sy: f64) {
        *self = Matrix::scaling(sx, sy).multiply(self);
    }

    /// Rotate the local frame by `angle` radians.
    pub fn rotate(&mut self, angle: f64) {
        *self = Matrix::rotation(angle).multiply(self);
    }

    pub fn det(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Inverse transformation, or `None` for a degenerate matrix.
    pub fn invert(&self) -> Option<Matrix> {
        if self.det().abs() < EPSILON {
            return None;
        }
        let m = na::Matrix3::new(
            self.a, self.c, self.tx, //
            self.b, self.d, self.ty, //
            0.0, 0.0, 1.0,
        );
        let inv = m.try_inverse()?;
        Some(Matrix::new(
            inv[(0, 0)],
            inv[(1, 0)],
            inv[(0, 1)],
            inv[(1, 1)],
            inv[(0, 2)],
            inv[(1, 2)],
        ))
    }

    pub fn transform_point(&self, p: Point2) -> Point2 {
        Point2::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    /// Transform a distance vector; translation does not apply.
    pub fn transform_distance(&self, v: Vector2) -> Vector2 {
        Vector2::new(self.a * v.x + self.c * v.y, self.b * v.x + self.d * v.y)
    }
}
