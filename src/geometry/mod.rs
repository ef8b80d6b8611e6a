use nalgebra as na;

pub type Point2 = na::Point2<f64>;
pub type Vector2 = na::Vector2<f64>;

/// Tolerance for variable-value comparisons. Two values closer than this
/// are the same value as far as dirty tracking is concerned.
pub const EPSILON: f64 = 1e-9;

/// Bisection tolerance of the equation root finder.
pub const EQUATION_TOLERANCE: f64 = 1e-10;

/// Maximum bisection iterations of the equation root finder.
pub const EQUATION_ITERATION_CAP: usize = 100;

/// Maximum number of bracket doublings before the root finder gives up.
pub const BRACKET_DOUBLING_CAP: usize = 32;

/// Maximum constraint solves in a single solver pass.
pub const SOLVE_BUDGET: usize = 1000;

/// Maximum times one constraint may be re-enqueued within a single pass.
pub const RESOLVE_LIMIT: usize = 100;

pub trait ApproxEq {
    fn approx_eq(&self, other: &Self) -> bool;
}

impl ApproxEq for f64 {
    fn approx_eq(&self, other: &Self) -> bool {
        (self - other).abs() < EPSILON
    }
}

impl ApproxEq for Point2 {
    fn approx_eq(&self, other: &Self) -> bool {
        na::distance_squared(self, other) < EPSILON * EPSILON
    }
}

pub mod matrix;
pub use matrix::Matrix;

pub mod utils_2d;
pub use utils_2d::*;
