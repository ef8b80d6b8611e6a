pub mod canvas;
pub mod connector;
pub mod geometry;
pub mod item;
pub mod solver;
pub mod state;

pub use canvas::{Canvas, CanvasError, UpdateOutcome, View};
pub use connector::{Handle, HandleFlag, Port};
pub use geometry::Matrix;
pub use item::{Element, Item, ItemId, Line, LineFlag, Measure, UpdateContext};
pub use solver::{Constraint, ConstraintId, Position, SolveOutcome, Solver, VarId};
pub use state::{Event, EventBus};

pub fn version() -> &'static str {
    "0.1.0"
}
