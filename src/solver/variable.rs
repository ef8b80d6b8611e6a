//! Solver variables.
//!
//! A variable is either a plain scalar with a strength, or a projection:
//! a variable-shaped facade that reads and writes a local position through
//! an item's canvas-to-common matrix. The solver never distinguishes the
//! two; a projection's strength and write-serial mirror the underlying
//! local variable.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::geometry::{Matrix, Point2, EPSILON};
use crate::state::{DiagnosticKind, Event, EventBus};

// Variable strengths. In a constraint the weakest variables are changed.
pub const VERY_WEAK: u32 = 0;
pub const WEAK: u32 = 10;
pub const NORMAL: u32 = 20;
pub const STRONG: u32 = 30;
pub const VERY_STRONG: u32 = 40;
pub const REQUIRED: u32 = 100;

/// Handle into the solver's variable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// An ordered pair of variables representing a 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: VarId,
    pub y: VarId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Clone)]
enum VarKind {
    Plain {
        value: f64,
        strength: u32,
        serial: u64,
    },
    /// Reads return `M * local` (recomputed every read, never cached);
    /// writes take common-space coordinates and assign `M^-1 * common`
    /// to the underlying local position.
    Projection {
        local: Position,
        axis: Axis,
        matrix: Rc<Cell<Matrix>>,
    },
}

#[derive(Default)]
pub struct VariableStore {
    vars: Vec<VarKind>,
    next_serial: u64,
    /// local variable -> projection variables reading through it
    projections: HashMap<VarId, Vec<VarId>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, value: f64, strength: u32) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarKind::Plain {
            value,
            strength,
            serial: 0,
        });
        id
    }

    pub fn add_position(&mut self, pos: (f64, f64), strength: u32) -> Position {
        Position {
            x: self.add_variable(pos.0, strength),
            y: self.add_variable(pos.1, strength),
        }
    }

    /// Allocate a projection of `local` through `matrix`, one variable per
    /// axis. Both projection variables depend on both local components,
    /// since the matrix may mix the axes.
    pub fn add_projection(&mut self, local: Position, matrix: Rc<Cell<Matrix>>) -> Position {
        let x = VarId(self.vars.len() as u32);
        self.vars.push(VarKind::Projection {
            local,
            axis: Axis::X,
            matrix: Rc::clone(&matrix),
        });
        let y = VarId(self.vars.len() as u32);
        self.vars.push(VarKind::Projection {
            local,
            axis: Axis::Y,
            matrix,
        });

        for underlying in [local.x, local.y] {
            let deps = self.projections.entry(underlying).or_default();
            deps.push(x);
            deps.push(y);
        }
        Position { x, y }
    }

    fn kind(&self, var: VarId) -> &VarKind {
        &self.vars[var.0 as usize]
    }

    pub fn is_projection(&self, var: VarId) -> bool {
        matches!(self.kind(var), VarKind::Projection { .. })
    }

    /// Projection variables reading through `var`, if any.
    pub fn projections_of(&self, var: VarId) -> &[VarId] {
        self.projections.get(&var).map_or(&[], Vec::as_slice)
    }

    pub fn value(&self, var: VarId) -> f64 {
        match *self.kind(var) {
            VarKind::Plain { value, .. } => value,
            VarKind::Projection {
                local,
                axis,
                ref matrix,
            } => {
                let common = matrix.get().transform_point(self.pos(&local));
                match axis {
                    Axis::X => common.x,
                    Axis::Y => common.y,
                }
            }
        }
    }

    pub fn pos(&self, pos: &Position) -> Point2 {
        Point2::new(self.value(pos.x), self.value(pos.y))
    }

    /// A projection's strength is the strength of the underlying variable.
    pub fn strength(&self, var: VarId) -> u32 {
        match *self.kind(var) {
            VarKind::Plain { strength, .. } => strength,
            VarKind::Projection { local, axis, .. } => self.strength(match axis {
                Axis::X => local.x,
                Axis::Y => local.y,
            }),
        }
    }

    /// Monotone write-serial; a projection mirrors the underlying variable.
    pub fn serial(&self, var: VarId) -> u64 {
        match *self.kind(var) {
            VarKind::Plain { serial, .. } => serial,
            VarKind::Projection { local, axis, .. } => self.serial(match axis {
                Axis::X => local.x,
                Axis::Y => local.y,
            }),
        }
    }

    /// Assign `value` to `var`, writing through projections. Returns the
    /// plain variables that materially changed (more than [`EPSILON`]).
    /// Emits a [`Event::ValueChanged`] per changed variable, before the
    /// commit.
    pub fn set_value(&mut self, var: VarId, value: f64, bus: &EventBus) -> Vec<VarId> {
        match *self.kind(var) {
            VarKind::Plain { .. } => {
                if self.set_plain(var, value, bus) {
                    vec![var]
                } else {
                    vec![]
                }
            }
            VarKind::Projection {
                local,
                axis,
                ref matrix,
            } => {
                let m = matrix.get();
                let Some(inv) = m.invert() else {
                    tracing::warn!(?var, "projection write dropped: singular matrix");
                    bus.emit_diagnostic(
                        DiagnosticKind::SingularMatrix,
                        format!("projection write to {var:?} dropped"),
                    );
                    return vec![];
                };
                let mut common = m.transform_point(self.pos(&local));
                match axis {
                    Axis::X => common.x = value,
                    Axis::Y => common.y = value,
                }
                let new_local = inv.transform_point(common);
                let mut changed = Vec::new();
                if self.set_plain(local.x, new_local.x, bus) {
                    changed.push(local.x);
                }
                if self.set_plain(local.y, new_local.y, bus) {
                    changed.push(local.y);
                }
                changed
            }
        }
    }

    fn set_plain(&mut self, var: VarId, value: f64, bus: &EventBus) -> bool {
        let VarKind::Plain {
            value: old,
            serial,
            ..
        } = &mut self.vars[var.0 as usize]
        else {
            unreachable!("set_plain on projection");
        };
        if (*old - value).abs() <= EPSILON {
            return false;
        }
        bus.emit(&Event::ValueChanged {
            var,
            old: *old,
            new: value,
        });
        *old = value;
        self.next_serial += 1;
        *serial = self.next_serial;
        true
    }
}
