//! Items placed in the canvas tree.
//!
//! An item owns a local affine matrix (relative to its parent), an
//! ordered list of handles, an ordered list of ports, and possibly a set
//! of internal constraints keeping its shape consistent. The canvas
//! drives the item lifecycle through `pre_update`/`post_update` hooks.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connector::{Handle, Port};
use crate::geometry::{Matrix, EPSILON};
use crate::solver::{ConstraintId, Solver, VariableStore};
use crate::state::EventBus;

pub mod element;
pub mod line;

#[cfg(test)]
mod tests_line;

pub use element::Element;
pub use line::{Line, LineFlag};

/// A stable identifier for an item in a canvas.
///
/// Wraps a Uuid for strong typing; the canvas keys every registry
/// (tree, connections, matrices) by it, so items never need
/// back-pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Measurement handle handed to the update hooks, typically used to
/// compute text extents. The core never interprets drawing calls.
pub trait Measure {
    /// Width and height of `text` when rendered.
    fn text_extents(&self, text: &str) -> (f64, f64);
}

/// Measurer used when the host has not supplied one.
#[derive(Debug, Default)]
pub struct NullMeasure;

impl Measure for NullMeasure {
    fn text_extents(&self, _text: &str) -> (f64, f64) {
        (0.0, 0.0)
    }
}

pub struct UpdateContext<'a> {
    pub measure: &'a dyn Measure,
    requested_update: bool,
}

impl<'a> UpdateContext<'a> {
    pub fn new(measure: &'a dyn Measure) -> Self {
        Self {
            measure,
            requested_update: false,
        }
    }

    /// Ask the canvas to keep this item in the dirty set for the rest of
    /// the cycle.
    pub fn request_update(&mut self) {
        self.requested_update = true;
    }

    pub(crate) fn update_requested(&self) -> bool {
        self.requested_update
    }
}

pub type HookError = Box<dyn std::error::Error>;

/// The protocol every canvas item implements.
pub trait Item: Any {
    /// The local, item-to-parent matrix.
    fn matrix(&self) -> &Matrix;

    fn matrix_mut(&mut self) -> &mut Matrix;

    /// Handles owned by the item, in order.
    fn handles(&self) -> &[Handle];

    fn handles_mut(&mut self) -> &mut [Handle];

    /// Ports owned by the item, in order.
    fn ports(&self) -> &[Port];

    /// Internally-owned constraints, removed from the solver when the
    /// item leaves the canvas.
    fn constraints(&self) -> Vec<ConstraintId> {
        Vec::new()
    }

    /// Called before constraint resolution. Errors are logged and the
    /// item is marked clean for the rest of the cycle.
    fn pre_update(&mut self, _ctx: &mut UpdateContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after resolution and normalization.
    fn post_update(&mut self, _ctx: &mut UpdateContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Distance from the point `(x, y)` (item coordinates) to the item;
    /// zero means the point is on the item.
    fn point(&self, store: &VariableStore, x: f64, y: f64) -> f64;

    /// Move the item's frame so the first handle sits at the local
    /// origin. Returns whether the matrix changed.
    fn normalize(&mut self, solver: &mut Solver, bus: &EventBus) -> bool {
        let Some(first) = self.handles().first() else {
            return false;
        };
        let origin = solver.pos(&first.pos);
        if origin.x.abs() <= EPSILON && origin.y.abs() <= EPSILON {
            return false;
        }

        self.matrix_mut().translate(origin.x, origin.y);
        let positions: Vec<_> = self.handles().iter().map(|h| h.pos).collect();
        for pos in positions {
            let p = solver.pos(&pos);
            solver.set_value(pos.x, p.x - origin.x, bus);
            solver.set_value(pos.y, p.y - origin.y, bus);
        }
        true
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
