//! Incremental constraint solver.
//!
//! The solver owns the variable store and the registered constraints.
//! Mutating a variable marks the constraints referring to it dirty;
//! [`Solver::solve`] drains the dirty queue to a fixed point.
//!
//! For every dirty constraint the solver picks a *target*: the operand
//! with the lowest strength, ties broken by least-recently-written (the
//! variable not updated most recently is the weaker one). REQUIRED
//! variables are never targets. When solving a constraint materially
//! changes its target, every *other* constraint referring to the target
//! is enqueued, in FIFO order, within the pass's iteration budget.

pub mod constraint;
pub mod variable;


pub use constraint::{Constraint, ConstraintId, EquationFn, SolveForError};
pub use variable::{
    Position, VarId, VariableStore, NORMAL, REQUIRED, STRONG, VERY_STRONG, VERY_WEAK, WEAK,
};

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point2, RESOLVE_LIMIT, SOLVE_BUDGET};
use crate::state::{DiagnosticKind, EventBus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("constraint {0:?} is not registered")]
    UnknownConstraint(ConstraintId),
}

/// Report of a single solver pass, in the spirit of a CAD solver's
/// solve result: converged or not, how much work was done, and which
/// constraints could not be restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveOutcome {
    /// Whether every dirty constraint was restored within budget.
    pub converged: bool,
    /// Number of constraint solves performed.
    pub solves: usize,
    /// Constraints still violated or truncated by the budget.
    pub unresolved: Vec<ConstraintId>,
    /// Plain variables that changed during the pass.
    pub changed: Vec<VarId>,
}

impl SolveOutcome {
    fn clean() -> Self {
        Self {
            converged: true,
            solves: 0,
            unresolved: Vec::new(),
            changed: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: SolveOutcome) {
        self.converged &= other.converged;
        self.solves += other.solves;
        self.unresolved.extend(other.unresolved);
        self.changed.extend(other.changed);
    }
}

#[derive(Default)]
pub struct Solver {
    store: VariableStore,
    constraints: HashMap<ConstraintId, Constraint>,
    next_constraint: u32,
    /// variable -> constraints referring to it
    index: HashMap<VarId, Vec<ConstraintId>>,
    queue: VecDeque<ConstraintId>,
    queued: HashSet<ConstraintId>,
    /// per-pass re-enqueue counts, bounded by [`RESOLVE_LIMIT`]
    resolve_counts: HashMap<ConstraintId, usize>,
    /// constraints whose re-enqueues were suppressed this pass
    suppressed: HashSet<ConstraintId>,
    solving: bool,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    // === Variables ===

    pub fn add_variable(&mut self, value: f64, strength: u32) -> VarId {
        self.store.add_variable(value, strength)
    }

    pub fn add_position(&mut self, pos: (f64, f64), strength: u32) -> Position {
        self.store.add_position(pos, strength)
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut VariableStore {
        &mut self.store
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.store.value(var)
    }

    pub fn pos(&self, pos: &Position) -> Point2 {
        self.store.pos(pos)
    }

    /// Assign a value and mark the dependent constraints dirty.
    pub fn set_value(&mut self, var: VarId, value: f64, bus: &EventBus) {
        let changed = self.store.set_value(var, value, bus);
        for v in changed {
            self.request_resolve(v);
        }
    }

    /// Mark `var` dirty: every constraint referring to it (directly or
    /// through a projection) is enqueued.
    pub fn request_resolve(&mut self, var: VarId) {
        for cid in self.dependents(var) {
            self.enqueue(cid);
        }
    }

    /// Enqueue exactly the constraints referring to `var` itself, without
    /// following projections. Used by the update pipeline when a matrix
    /// changed and only the projected values moved.
    pub fn request_resolve_var(&mut self, var: VarId) {
        let cids = self.index.get(&var).cloned().unwrap_or_default();
        for cid in cids {
            self.enqueue(cid);
        }
    }

    fn dependents(&self, var: VarId) -> Vec<ConstraintId> {
        let mut cids: Vec<ConstraintId> = self.index.get(&var).cloned().unwrap_or_default();
        for proj in self.store.projections_of(var) {
            if let Some(extra) = self.index.get(proj) {
                cids.extend(extra);
            }
        }
        cids
    }

    fn enqueue(&mut self, cid: ConstraintId) {
        if !self.constraints.contains_key(&cid) {
            return;
        }
        if self.solving {
            if self.queued.contains(&cid) {
                return;
            }
            let count = self.resolve_counts.entry(cid).or_insert(0);
            *count += 1;
            if *count > RESOLVE_LIMIT {
                tracing::debug!(?cid, "re-enqueue suppressed: resolve limit reached");
                self.suppressed.insert(cid);
                return;
            }
            self.queue.push_back(cid);
            self.queued.insert(cid);
        } else {
            // Move to the back so the most recent request resolves last.
            if self.queued.contains(&cid) {
                self.queue.retain(|c| *c != cid);
            }
            self.queue.push_back(cid);
            self.queued.insert(cid);
        }
    }

    // === Constraints ===

    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintId {
        let cid = ConstraintId(self.next_constraint);
        self.next_constraint += 1;
        for var in constraint.operands() {
            self.index.entry(var).or_default().push(cid);
        }
        self.constraints.insert(cid, constraint);
        self.enqueue(cid);
        cid
    }

    pub fn remove_constraint(&mut self, cid: ConstraintId) -> Result<Constraint, SolveError> {
        let constraint = self
            .constraints
            .remove(&cid)
            .ok_or(SolveError::UnknownConstraint(cid))?;
        for var in constraint.operands() {
            if let Some(cids) = self.index.get_mut(&var) {
                cids.retain(|c| *c != cid);
                if cids.is_empty() {
                    // The variable is no longer tracked.
                    self.index.remove(&var);
                }
            }
        }
        if self.queued.remove(&cid) {
            self.queue.retain(|c| *c != cid);
        }
        Ok(constraint)
    }

    pub fn contains(&self, cid: ConstraintId) -> bool {
        self.constraints.contains_key(&cid)
    }

    pub fn constraint(&self, cid: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&cid)
    }

    pub fn constraint_ids(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.constraints.keys().copied()
    }

    pub fn residual(&self, cid: ConstraintId) -> Option<f64> {
        Some(self.constraints.get(&cid)?.residual(&self.store))
    }

    pub fn needs_solving(&self) -> bool {
        !self.queue.is_empty()
    }

    // === Solving ===

    /// Drain the dirty queue to a fixed point.
    ///
    /// The pass is bounded by [`SOLVE_BUDGET`] constraint solves; hitting
    /// the budget truncates the pass, leaves state as last written and
    /// reports the still-dirty constraints. The caller may re-invoke.
    pub fn solve(&mut self, bus: &EventBus) -> SolveOutcome {
        if self.queue.is_empty() {
            return SolveOutcome::clean();
        }

        self.solving = true;
        self.resolve_counts.clear();
        self.suppressed.clear();
        let mut outcome = SolveOutcome::clean();
        let mut truncated = false;

        while let Some(cid) = self.queue.pop_front() {
            self.queued.remove(&cid);
            if !self.constraints.contains_key(&cid) {
                continue;
            }
            if outcome.solves >= SOLVE_BUDGET {
                truncated = true;
                outcome.unresolved.push(cid);
                continue;
            }
            outcome.solves += 1;

            let result = {
                let constraint = &self.constraints[&cid];
                match choose_target(constraint, &self.store) {
                    Some(target) => constraint.solve_for(target, &mut self.store, bus),
                    // Every operand is REQUIRED; nothing may move.
                    None => {
                        if constraint.residual(&self.store) > crate::geometry::EPSILON {
                            outcome.unresolved.push(cid);
                        }
                        continue;
                    }
                }
            };

            match result {
                Ok(changed) => {
                    for var in &changed {
                        for dep in self.dependents(*var) {
                            if dep != cid {
                                self.enqueue(dep);
                            }
                        }
                    }
                    outcome.changed.extend(changed);
                }
                Err(SolveForError::NonConvergent) => {
                    tracing::warn!(?cid, "equation constraint did not converge");
                    outcome.unresolved.push(cid);
                }
            }
        }

        self.solving = false;
        if !self.suppressed.is_empty() {
            // Oscillating constraints were cut off; report the whole
            // cycle, not just the one that hit the ceiling last.
            for (cid, count) in &self.resolve_counts {
                if *count >= RESOLVE_LIMIT && self.constraints.contains_key(cid) {
                    truncated = true;
                    outcome.unresolved.push(*cid);
                }
            }
            self.suppressed.clear();
        }
        if truncated {
            tracing::warn!(
                unresolved = outcome.unresolved.len(),
                "solve truncated: iteration budget exceeded"
            );
            bus.emit_diagnostic(
                DiagnosticKind::SolveBudgetExceeded,
                format!("{} constraints left unresolved", outcome.unresolved.len()),
            );
        }
        outcome.unresolved.sort();
        outcome.unresolved.dedup();
        outcome.converged = outcome.unresolved.is_empty();
        outcome.changed.sort();
        outcome.changed.dedup();
        outcome
    }
}

/// The operand with the lowest strength; ties go to the least recently
/// written. REQUIRED variables are never chosen.
fn choose_target(constraint: &Constraint, store: &VariableStore) -> Option<VarId> {
    constraint
        .operands()
        .into_iter()
        .filter(|v| store.strength(*v) < REQUIRED)
        .min_by_key(|v| (store.strength(*v), store.serial(*v)))
}
