//! Connection endpoints: handles and ports.
//!
//! A handle is a movable point on an item. A port is a region of an item
//! a handle can connect to; gluing a point to a port yields the nearest
//! point on the port and the distance to it. Both live in item-local
//! coordinates; the canvas pins a handle to a port in common coordinates
//! through matrix projections.

use serde::{Deserialize, Serialize};

use crate::geometry::{distance, distance_line_point, Point2};
use crate::solver::{Position, VariableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleFlag {
    Connectable,
    Movable,
    Visible,
}

/// A movable point on an item, used to manipulate its shape.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub pos: Position,
    pub connectable: bool,
    pub movable: bool,
    pub visible: bool,
}

impl Handle {
    pub fn new(pos: Position) -> Self {
        Self {
            pos,
            connectable: false,
            movable: true,
            visible: true,
        }
    }

    pub fn connectable(pos: Position) -> Self {
        Self {
            connectable: true,
            ..Self::new(pos)
        }
    }

    pub fn flag(&self, flag: HandleFlag) -> bool {
        match flag {
            HandleFlag::Connectable => self.connectable,
            HandleFlag::Movable => self.movable,
            HandleFlag::Visible => self.visible,
        }
    }

    pub fn set_flag(&mut self, flag: HandleFlag, value: bool) {
        match flag {
            HandleFlag::Connectable => self.connectable = value,
            HandleFlag::Movable => self.movable = value,
            HandleFlag::Visible => self.visible = value,
        }
    }
}

/// Result of gluing a point to a port.
#[derive(Debug, Clone, Copy)]
pub struct Glue {
    /// Nearest point on the port, in item coordinates.
    pub point: Point2,
    pub distance: f64,
}

/// A fixed connectable point.
#[derive(Debug, Clone, Copy)]
pub struct PointPort {
    pub pos: Position,
}

/// A connectable segment, usually between two handles.
#[derive(Debug, Clone, Copy)]
pub struct LinePort {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy)]
pub enum Port {
    Point(PointPort),
    Line(LinePort),
}

impl Port {
    pub fn point(pos: Position) -> Self {
        Port::Point(PointPort { pos })
    }

    pub fn line(start: Position, end: Position) -> Self {
        Port::Line(LinePort { start, end })
    }

    /// Nearest point on the port and its distance from `p`.
    pub fn glue(&self, store: &VariableStore, p: Point2) -> Glue {
        match self {
            Port::Point(port) => {
                let pos = store.pos(&port.pos);
                Glue {
                    point: pos,
                    distance: distance(p, pos),
                }
            }
            Port::Line(port) => {
                let start = store.pos(&port.start);
                let end = store.pos(&port.end);
                let (d, point) = distance_line_point(start, end, p);
                Glue { point, distance: d }
            }
        }
    }
}
