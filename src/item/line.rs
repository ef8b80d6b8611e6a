//! Polyline item.
//!
//! A line has at least two handles; each consecutive pair of handles
//! spans a segment and a matching line port. The `orthogonal` flag keeps
//! the segments alternately axis-aligned; `horizontal` makes the first
//! segment the horizontal one.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::connector::{Handle, Port};
use crate::geometry::{distance_line_point, Matrix, Point2};
use crate::solver::{Constraint, ConstraintId, Solver, VariableStore, NORMAL};

use super::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineFlag {
    Orthogonal,
    Horizontal,
}

pub struct Line {
    matrix: Matrix,
    handles: Vec<Handle>,
    ports: Vec<Port>,
    orthogonal_constraints: Vec<ConstraintId>,
    orthogonal: bool,
    horizontal: bool,
    /// Extra margin taken into account by `point()`.
    pub fuzziness: f64,
}

impl Line {
    pub fn new(solver: &mut Solver) -> Self {
        let head = solver.add_position((0.0, 0.0), NORMAL);
        let tail = solver.add_position((10.0, 10.0), NORMAL);
        let mut line = Self {
            matrix: Matrix::identity(),
            handles: vec![Handle::connectable(head), Handle::connectable(tail)],
            ports: Vec::new(),
            orthogonal_constraints: Vec::new(),
            orthogonal: false,
            horizontal: false,
            fuzziness: 0.0,
        };
        line.update_ports();
        line
    }

    pub fn head(&self) -> &Handle {
        &self.handles[0]
    }

    pub fn tail(&self) -> &Handle {
        self.handles.last().expect("a line has at least two handles")
    }

    /// Given one end handle's index, return the other end's.
    pub fn opposite(&self, handle: usize) -> Option<usize> {
        if handle == 0 {
            Some(self.handles.len() - 1)
        } else if handle == self.handles.len() - 1 {
            Some(0)
        } else {
            None
        }
    }

    pub fn orthogonal(&self) -> bool {
        self.orthogonal
    }

    pub fn horizontal(&self) -> bool {
        self.horizontal
    }

    pub fn flag(&self, flag: LineFlag) -> bool {
        match flag {
            LineFlag::Orthogonal => self.orthogonal,
            LineFlag::Horizontal => self.horizontal,
        }
    }

    pub fn set_flag(&mut self, solver: &mut Solver, flag: LineFlag, value: bool) {
        match flag {
            LineFlag::Orthogonal => self.orthogonal = value,
            LineFlag::Horizontal => self.horizontal = value,
        }
        self.update_orthogonal_constraints(solver);
    }

    /// Insert a handle at `index`, splitting the neighbouring segment.
    pub fn insert_handle(&mut self, solver: &mut Solver, index: usize, pos: (f64, f64)) {
        let position = solver.add_position(pos, NORMAL);
        self.handles.insert(index, Handle::connectable(position));
        self.update_ports();
        self.update_orthogonal_constraints(solver);
    }

    pub fn remove_handle(&mut self, solver: &mut Solver, index: usize) {
        assert!(
            self.handles.len() > 2,
            "a line keeps at least two handles"
        );
        self.handles.remove(index);
        self.update_ports();
        self.update_orthogonal_constraints(solver);
    }

    /// Rebuild the one-port-per-segment list.
    fn update_ports(&mut self) {
        self.ports = self
            .handles
            .windows(2)
            .map(|pair| Port::line(pair[0].pos, pair[1].pos))
            .collect();
    }

    /// Rebuild the constraints that keep the line orthogonal. Without the
    /// flag, or with fewer than three handles, the line is unconstrained.
    pub fn update_orthogonal_constraints(&mut self, solver: &mut Solver) {
        for cid in self.orthogonal_constraints.drain(..) {
            let _ = solver.remove_constraint(cid);
        }

        if !self.orthogonal || self.handles.len() < 3 {
            return;
        }

        let rest = usize::from(self.horizontal);
        for (i, pair) in self.handles.windows(2).enumerate() {
            let p0 = pair[0].pos;
            let p1 = pair[1].pos;
            let constraint = if i % 2 == rest {
                Constraint::Eq { a: p0.x, b: p1.x }
            } else {
                Constraint::Eq { a: p0.y, b: p1.y }
            };
            self.orthogonal_constraints
                .push(solver.add_constraint(constraint));
        }
    }
}

impl Item for Line {
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
        self.orthogonal_constraints.clone()
    }

    fn point(&self, store: &VariableStore, x: f64, y: f64) -> f64 {
        let p = Point2::new(x, y);
        let best = self
            .handles
            .windows(2)
            .map(|pair| {
                let start = store.pos(&pair[0].pos);
                let end = store.pos(&pair[1].pos);
                distance_line_point(start, end, p).0
            })
            .fold(f64::INFINITY, f64::min);
        (best - self.fuzziness).max(0.0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
