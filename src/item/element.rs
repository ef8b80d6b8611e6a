//! Rectangular element with four corner handles.
//!
//! ```text
//!    NW +---+ NE
//!       |   |
//!    SW +---+ SE
//! ```
//!
//! Internal constraints keep the corners rectangular; `min_width` and
//! `min_height` are STRONG lower bounds on the extents.

use std::any::Any;

use crate::connector::{Handle, Port};
use crate::geometry::{distance_rectangle_border_point, Matrix, Point2};
use crate::solver::{Constraint, ConstraintId, Solver, VariableStore, NORMAL, STRONG};
use crate::state::EventBus;

use super::Item;

pub const NW: usize = 0;
pub const NE: usize = 1;
pub const SE: usize = 2;
pub const SW: usize = 3;

pub struct Element {
    matrix: Matrix,
    handles: Vec<Handle>,
    ports: Vec<Port>,
    constraints: Vec<ConstraintId>,
    min_width: crate::solver::VarId,
    min_height: crate::solver::VarId,
}

impl Element {
    pub fn new(solver: &mut Solver, width: f64, height: f64) -> Self {
        let width = width.max(0.0);
        let height = height.max(0.0);

        let nw = solver.add_position((0.0, 0.0), NORMAL);
        let ne = solver.add_position((width, 0.0), NORMAL);
        let se = solver.add_position((width, height), NORMAL);
        let sw = solver.add_position((0.0, height), NORMAL);

        let handles = vec![
            Handle::new(nw),
            Handle::new(ne),
            Handle::new(se),
            Handle::new(sw),
        ];

        // The edges double as the default connectable ports.
        let ports = vec![
            Port::line(nw, ne),
            Port::line(ne, se),
            Port::line(se, sw),
            Port::line(sw, nw),
        ];

        let min_width = solver.add_variable(10.0, STRONG);
        let min_height = solver.add_variable(10.0, STRONG);

        let constraints = vec![
            // Rectangularity: horizontal edges share y, vertical edges
            // share x.
            solver.add_constraint(Constraint::Eq { a: nw.y, b: ne.y }),
            solver.add_constraint(Constraint::Eq { a: sw.y, b: se.y }),
            solver.add_constraint(Constraint::Eq { a: nw.x, b: sw.x }),
            solver.add_constraint(Constraint::Eq { a: ne.x, b: se.x }),
            // Minimal size.
            solver.add_constraint(Constraint::LessThan {
                smaller: nw.x,
                bigger: se.x,
                delta: Some(min_width),
            }),
            solver.add_constraint(Constraint::LessThan {
                smaller: nw.y,
                bigger: se.y,
                delta: Some(min_height),
            }),
        ];

        Self {
            matrix: Matrix::identity(),
            handles,
            ports,
            constraints,
            min_width,
            min_height,
        }
    }

    /// Distance between the left and right handles.
    pub fn width(&self, store: &VariableStore) -> f64 {
        store.value(self.handles[SE].pos.x) - store.value(self.handles[NW].pos.x)
    }

    pub fn set_width(&self, solver: &mut Solver, bus: &EventBus, width: f64) {
        let left = solver.value(self.handles[NW].pos.x);
        solver.set_value(self.handles[SE].pos.x, left + width, bus);
        solver.set_value(self.handles[NE].pos.x, left + width, bus);
    }

    pub fn height(&self, store: &VariableStore) -> f64 {
        store.value(self.handles[SE].pos.y) - store.value(self.handles[NW].pos.y)
    }

    pub fn set_height(&self, solver: &mut Solver, bus: &EventBus, height: f64) {
        let top = solver.value(self.handles[NW].pos.y);
        solver.set_value(self.handles[SE].pos.y, top + height, bus);
        solver.set_value(self.handles[SW].pos.y, top + height, bus);
    }

    pub fn min_width(&self) -> crate::solver::VarId {
        self.min_width
    }

    pub fn min_height(&self) -> crate::solver::VarId {
        self.min_height
    }
}

impl Item for Element {
    fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    fn matrix_mut(&mut self) -> &mut Matrix {
        &mut self.matrix
    }

    fn handles(&self) -> &[Handle] {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut [Handle] {
        &mut self.handles
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    fn constraints(&self) -> Vec<ConstraintId> {
        self.constraints.clone()
    }

    fn point(&self, store: &VariableStore, x: f64, y: f64) -> f64 {
        let nw = store.pos(&self.handles[NW].pos);
        let se = store.pos(&self.handles[SE].pos);
        distance_rectangle_border_point(
            (nw.x, nw.y, se.x - nw.x, se.y - nw.y),
            Point2::new(x, y),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
