//! Constraint kinds.
//!
//! Each constraint is a relation over a fixed, ordered set of variables.
//! `solve_for(target)` adjusts the target (and only the target, except
//! for the point-valued kinds, which adjust the target's position pair)
//! so the relation holds given the current values of the other operands.
//! Constraints are stateless across resolutions.
//!
//! Operands may be projection variables; writes then land in the
//! underlying local variables through the projection's matrix.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{
    lerp, project_point_on_segment, BRACKET_DOUBLING_CAP, EQUATION_ITERATION_CAP,
    EQUATION_TOLERANCE,
};
use crate::state::EventBus;

use super::variable::{Position, VarId, VariableStore};

/// Handle into the solver's constraint registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub u32);

/// Callable of an equation constraint; evaluated over the operand values
/// in operand order. The root finder drives it to zero.
pub struct EquationFn(Box<dyn Fn(&[f64]) -> f64>);

impl EquationFn {
    pub fn new(f: impl Fn(&[f64]) -> f64 + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn eval(&self, values: &[f64]) -> f64 {
        (self.0)(values)
    }
}

impl fmt::Debug for EquationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EquationFn(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveForError {
    /// The equation root finder found no sign change within its
    /// bracket-expansion cap.
    NonConvergent,
}

/// The geometric and algebraic relations the solver maintains.
#[derive(Debug)]
pub enum Constraint {
    /// `a = b`
    Eq { a: VarId, b: VarId },
    /// `smaller + delta <= bigger`; only adjusts when violated.
    LessThan {
        smaller: VarId,
        bigger: VarId,
        delta: Option<VarId>,
    },
    /// `center = (a + b) / 2`
    Center { a: VarId, b: VarId, center: VarId },
    /// `v = band.0 + balance * (band.1 - band.0)` with a fixed ratio.
    Balance {
        band: (VarId, VarId),
        v: VarId,
        balance: f64,
    },
    /// `f(vars...) = 0`, solved numerically for the target.
    Equation { f: EquationFn, vars: Vec<VarId> },
    /// Keep `point` on the segment between `line.0` and `line.1`: the
    /// point is moved to the foot of its perpendicular, clamped
    /// parametrically to `[0, 1]`.
    Line {
        line: (Position, Position),
        point: Position,
    },
    /// Two positions coincide.
    PositionEq { a: Position, b: Position },
}

impl PartialEq for Constraint {
    /// Structural equality over operands; `Equation` closures are not
    /// comparable, so two `Equation` constraints are equal only if they
    /// share the same operand list.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constraint::Eq { a, b }, Constraint::Eq { a: a2, b: b2 }) => a == a2 && b == b2,
            (
                Constraint::LessThan {
                    smaller,
                    bigger,
                    delta,
                },
                Constraint::LessThan {
                    smaller: s2,
                    bigger: b2,
                    delta: d2,
                },
            ) => smaller == s2 && bigger == b2 && delta == d2,
            (
                Constraint::Center { a, b, center },
                Constraint::Center {
                    a: a2,
                    b: b2,
                    center: c2,
                },
            ) => a == a2 && b == b2 && center == c2,
            (
                Constraint::Balance { band, v, balance },
                Constraint::Balance {
                    band: band2,
                    v: v2,
                    balance: balance2,
                },
            ) => band == band2 && v == v2 && balance == balance2,
            (Constraint::Equation { vars, .. }, Constraint::Equation { vars: vars2, .. }) => {
                vars == vars2
            }
            (
                Constraint::Line { line, point },
                Constraint::Line {
                    line: line2,
                    point: point2,
                },
            ) => line == line2 && point == point2,
            (Constraint::PositionEq { a, b }, Constraint::PositionEq { a: a2, b: b2 }) => {
                a == a2 && b == b2
            }
            _ => false,
        }
    }
}

impl Constraint {
    /// Derive the balance ratio from the variables' current values, like
    /// dropping a handle onto a segment and keeping it there.
    pub fn balance_from_current(store: &VariableStore, band: (VarId, VarId), v: VarId) -> Self {
        let b1 = store.value(band.0);
        let b2 = store.value(band.1);
        let w = b2 - b1;
        let balance = if w.abs() < f64::EPSILON {
            0.0
        } else {
            ((store.value(v) - b1) / w).clamp(0.0, 1.0)
        };
        Constraint::Balance { band, v, balance }
    }

    /// The operand list, in fixed order.
    pub fn operands(&self) -> Vec<VarId> {
        match self {
            Constraint::Eq { a, b } => vec![*a, *b],
            Constraint::LessThan {
                smaller,
                bigger,
                delta,
            } => {
                let mut ops = vec![*smaller, *bigger];
                ops.extend(*delta);
                ops
            }
            Constraint::Center { a, b, center } => vec![*a, *b, *center],
            Constraint::Balance { band, v, .. } => vec![band.0, band.1, *v],
            Constraint::Equation { vars, .. } => vars.clone(),
            Constraint::Line { line, point } => {
                vec![line.0.x, line.0.y, line.1.x, line.1.y, point.x, point.y]
            }
            Constraint::PositionEq { a, b } => vec![a.x, a.y, b.x, b.y],
        }
    }

    /// How far the relation currently is from holding.
    pub fn residual(&self, store: &VariableStore) -> f64 {
        match self {
            Constraint::Eq { a, b } => (store.value(*a) - store.value(*b)).abs(),
            Constraint::LessThan {
                smaller,
                bigger,
                delta,
            } => {
                let d = delta.map_or(0.0, |d| store.value(d));
                (store.value(*smaller) + d - store.value(*bigger)).max(0.0)
            }
            Constraint::Center { a, b, center } => {
                (store.value(*center) - (store.value(*a) + store.value(*b)) / 2.0).abs()
            }
            Constraint::Balance { band, v, balance } => {
                let b1 = store.value(band.0);
                let b2 = store.value(band.1);
                (store.value(*v) - (b1 + balance * (b2 - b1))).abs()
            }
            Constraint::Equation { f, vars } => {
                let values: Vec<f64> = vars.iter().map(|v| store.value(*v)).collect();
                f.eval(&values).abs()
            }
            Constraint::Line { line, point } => {
                let s = store.pos(&line.0);
                let e = store.pos(&line.1);
                let p = store.pos(&point);
                let t = project_point_on_segment(s, e, p).clamp(0.0, 1.0);
                crate::geometry::distance(p, lerp(s, e, t))
            }
            Constraint::PositionEq { a, b } => {
                crate::geometry::distance(store.pos(a), store.pos(b))
            }
        }
    }

    /// Adjust `target` so the relation holds. Returns the plain variables
    /// that materially changed.
    pub fn solve_for(
        &self,
        target: VarId,
        store: &mut VariableStore,
        bus: &EventBus,
    ) -> Result<Vec<VarId>, SolveForError> {
        match self {
            Constraint::Eq { a, b } => {
                let (dst, src) = if target == *a { (*a, *b) } else { (*b, *a) };
                let value = store.value(src);
                Ok(store.set_value(dst, value, bus))
            }
            Constraint::LessThan {
                smaller,
                bigger,
                delta,
            } => {
                let d = delta.map_or(0.0, |d| store.value(d));
                if store.value(*smaller) + d <= store.value(*bigger) {
                    return Ok(vec![]);
                }
                let changed = if target == *smaller {
                    let v = store.value(*bigger) - d;
                    store.set_value(*smaller, v, bus)
                } else if target == *bigger {
                    let v = store.value(*smaller) + d;
                    store.set_value(*bigger, v, bus)
                } else {
                    let v = store.value(*bigger) - store.value(*smaller);
                    store.set_value(target, v, bus)
                };
                Ok(changed)
            }
            Constraint::Center { a, b, center } => {
                let av = store.value(*a);
                let bv = store.value(*b);
                let cv = store.value(*center);
                let changed = if target == *center {
                    store.set_value(*center, (av + bv) / 2.0, bus)
                } else if target == *a {
                    store.set_value(*a, 2.0 * cv - bv, bus)
                } else {
                    store.set_value(*b, 2.0 * cv - av, bus)
                };
                Ok(changed)
            }
            Constraint::Balance { band, v, balance } => {
                let b1 = store.value(band.0);
                let b2 = store.value(band.1);
                let w = *balance;
                let changed = if target == *v {
                    store.set_value(*v, b1 + w * (b2 - b1), bus)
                } else if target == band.0 {
                    if (1.0 - w).abs() < f64::EPSILON {
                        return Ok(vec![]);
                    }
                    let value = (store.value(*v) - w * b2) / (1.0 - w);
                    store.set_value(band.0, value, bus)
                } else {
                    if w.abs() < f64::EPSILON {
                        return Ok(vec![]);
                    }
                    let value = b1 + (store.value(*v) - b1) / w;
                    store.set_value(band.1, value, bus)
                };
                Ok(changed)
            }
            Constraint::Equation { f, vars } => {
                let index = vars
                    .iter()
                    .position(|v| *v == target)
                    .expect("target is an operand");
                let mut values: Vec<f64> = vars.iter().map(|v| store.value(*v)).collect();
                let x0 = values[index];
                let g = |x: f64| {
                    values[index] = x;
                    f.eval(&values)
                };
                let root = bisect(g, x0).ok_or(SolveForError::NonConvergent)?;
                Ok(store.set_value(target, root, bus))
            }
            Constraint::Line { line, point } => {
                let s = store.pos(&line.0);
                let e = store.pos(&line.1);
                let p = store.pos(point);
                let t = project_point_on_segment(s, e, p).clamp(0.0, 1.0);
                let foot = lerp(s, e, t);
                let mut changed = store.set_value(point.x, foot.x, bus);
                changed.extend(store.set_value(point.y, foot.y, bus));
                Ok(changed)
            }
            Constraint::PositionEq { a, b } => {
                let (dst, src) = if target == a.x || target == a.y {
                    (*a, *b)
                } else {
                    (*b, *a)
                };
                let value = store.pos(&src);
                let mut changed = store.set_value(dst.x, value.x, bus);
                changed.extend(store.set_value(dst.y, value.y, bus));
                Ok(changed)
            }
        }
    }
}

/// Bracketed bisection for `g(x) = 0` around `x0`.
///
/// The bracket `[x0 - h, x0 + h]` grows by doubling `h` until a sign
/// change appears, up to [`BRACKET_DOUBLING_CAP`] doublings; then plain
/// bisection runs to [`EQUATION_TOLERANCE`] or
/// [`EQUATION_ITERATION_CAP`] iterations, whichever comes first.
fn bisect(mut g: impl FnMut(f64) -> f64, x0: f64) -> Option<f64> {
    let g0 = g(x0);
    if g0.abs() <= EQUATION_TOLERANCE {
        return Some(x0);
    }

    let mut h = 1.0;
    let mut bracket = None;
    for _ in 0..BRACKET_DOUBLING_CAP {
        let lo = x0 - h;
        let hi = x0 + h;
        let glo = g(lo);
        let ghi = g(hi);
        if glo.abs() <= EQUATION_TOLERANCE {
            return Some(lo);
        }
        if ghi.abs() <= EQUATION_TOLERANCE {
            return Some(hi);
        }
        if glo.signum() != g0.signum() {
            bracket = Some((lo, x0, glo));
            break;
        }
        if ghi.signum() != g0.signum() {
            bracket = Some((x0, hi, g0));
            break;
        }
        h *= 2.0;
    }
    let (mut lo, mut hi, mut glo) = bracket?;

    for _ in 0..EQUATION_ITERATION_CAP {
        let mid = 0.5 * (lo + hi);
        let gmid = g(mid);
        if gmid.abs() <= EQUATION_TOLERANCE || 0.5 * (hi - lo) <= EQUATION_TOLERANCE {
            return Some(mid);
        }
        if gmid.signum() == glo.signum() {
            lo = mid;
            glo = gmid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}
