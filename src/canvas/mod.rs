//! Canvas: container of items, solver and connections.
//!
//! The canvas owns the item tree, the constraint solver, the connection
//! registry and the event bus. All model mutations route through it, so
//! every change emits its observable event before committing and lands
//! in the dirty bookkeeping the update pipeline consumes.
//!
//! The update pipeline runs pre-update hooks, refreshes canvas-to-item
//! matrices, resolves constraints, normalizes item coordinates, refreshes
//! matrices once more and runs post-update hooks. After `update()`
//! returns, every registered constraint either holds within tolerance or
//! was reported unresolvable, and the dirty sets are empty.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connector::{Glue, HandleFlag, Port};
use crate::geometry::{Matrix, Point2, EPSILON};
use crate::item::{Item, ItemId, Line, LineFlag, Measure, NullMeasure, UpdateContext};
use crate::solver::{Constraint, ConstraintId, Position, SolveOutcome, Solver, VarId};
use crate::state::{Event, EventBus};

pub mod connections;
pub mod tree;

#[cfg(test)]
mod tests_canvas;
#[cfg(test)]
mod tests_connections;

pub use connections::{Connection, Connections, DisconnectCallback};
pub use tree::Tree;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("update() entered while an update is already running")]
    ReentrantUpdate,
    #[error("handle {handle} of item {item} is already connected")]
    DuplicateConnection { item: ItemId, handle: usize },
    #[error("handle {handle} of item {item} is not connected")]
    NotConnected { item: ItemId, handle: usize },
    #[error("item {0} is not part of this canvas")]
    UnknownItem(ItemId),
    #[error("item {item} has no handle {handle}")]
    UnknownHandle { item: ItemId, handle: usize },
    #[error("item {item} has no port {port}")]
    UnknownPort { item: ItemId, port: usize },
    #[error("item {0} is not a line")]
    NotALine(ItemId),
    #[error("event cannot be applied: {0}")]
    CannotApply(&'static str),
}

/// Report of one update cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub solve: SolveOutcome,
}

/// A registered presentation layer; notified after each update cycle and
/// when items are removed.
pub trait View {
    fn request_update(&mut self, dirty: &[ItemId], matrix_only: &[ItemId], removed: &[ItemId]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewId(usize);

pub struct Canvas {
    tree: Tree,
    items: HashMap<ItemId, Box<dyn Item>>,
    solver: Solver,
    connections: Connections,
    bus: EventBus,
    /// canvas-to-item matrix cache, shared with the item's projections
    i2c: HashMap<ItemId, Rc<Cell<Matrix>>>,
    /// projections allocated per item, re-resolved when its matrix moves
    projections: HashMap<ItemId, Vec<Position>>,
    /// owning item of handle/port/projection variables
    var_owner: HashMap<VarId, ItemId>,
    dirty_items: HashSet<ItemId>,
    dirty_matrix_items: HashSet<ItemId>,
    views: Vec<(ViewId, Box<dyn View>)>,
    next_view: usize,
    measurer: Box<dyn Measure>,
    updating: bool,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            items: HashMap::new(),
            solver: Solver::new(),
            connections: Connections::new(),
            bus: EventBus::new(),
            i2c: HashMap::new(),
            projections: HashMap::new(),
            var_owner: HashMap::new(),
            dirty_items: HashSet::new(),
            dirty_matrix_items: HashSet::new(),
            views: Vec::new(),
            next_view: 0,
            measurer: Box::new(NullMeasure),
            updating: false,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut Solver {
        &mut self.solver
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn set_measurer(&mut self, measurer: Box<dyn Measure>) {
        self.measurer = measurer;
    }

    // === Item access ===

    pub fn item(&self, id: ItemId) -> Option<&dyn Item> {
        self.items.get(&id).map(|b| &**b)
    }

    pub fn item_as<T: Item>(&self, id: ItemId) -> Option<&T> {
        self.item(id)?.as_any().downcast_ref()
    }

    /// All items, in tree order.
    pub fn items(&self) -> &[ItemId] {
        self.tree.nodes()
    }

    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        self.tree.parent(id)
    }

    pub fn children(&self, id: Option<ItemId>) -> &[ItemId] {
        self.tree.children(id)
    }

    pub fn ancestors(&self, id: ItemId) -> Vec<ItemId> {
        self.tree.ancestors(id)
    }

    /// Sort ids into the canonical depth-first order.
    pub fn sort(&self, ids: &[ItemId]) -> Vec<ItemId> {
        let set: HashSet<ItemId> = ids.iter().copied().collect();
        self.tree.order(&set)
    }

    /// Mutate an item with solver and event-bus access, marking it dirty.
    pub fn edit<R>(
        &mut self,
        id: ItemId,
        f: impl FnOnce(&mut dyn Item, &mut Solver, &EventBus) -> R,
    ) -> Option<R> {
        let item = self.items.get_mut(&id)?;
        let result = f(&mut **item, &mut self.solver, &self.bus);
        // The edit may have grown the handle list (e.g. splitting a line
        // segment); keep variable ownership current.
        let positions: Vec<Position> = item.handles().iter().map(|h| h.pos).collect();
        for pos in positions {
            self.var_owner.insert(pos.x, id);
            self.var_owner.insert(pos.y, id);
        }
        self.request_update(id);
        Some(result)
    }

    // === Tree mutations ===

    /// Add an item to the canvas, optionally under a parent at a given
    /// sibling index. Returns the item's id.
    pub fn add(
        &mut self,
        item: Box<dyn Item>,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) -> ItemId {
        let id = ItemId::new();
        self.insert_item(id, item, parent, index);
        id
    }

    /// Re-add an item previously handed back by [`Canvas::remove`],
    /// keeping its original id. Connections are not restored; replay
    /// their events separately.
    pub fn restore(
        &mut self,
        id: ItemId,
        item: Box<dyn Item>,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) -> Result<(), CanvasError> {
        if self.items.contains_key(&id) {
            return Err(CanvasError::CannotApply("item id is already present"));
        }
        if let Some(p) = parent {
            if !self.items.contains_key(&p) {
                return Err(CanvasError::UnknownItem(p));
            }
        }
        self.insert_item(id, item, parent, index);
        Ok(())
    }

    fn insert_item(
        &mut self,
        id: ItemId,
        item: Box<dyn Item>,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) {
        let siblings = self.tree.children(parent).len();
        let index = index.unwrap_or(siblings).min(siblings);
        self.bus.emit(&Event::ItemAdded {
            item: id,
            parent,
            index,
        });

        for handle in item.handles() {
            self.var_owner.insert(handle.pos.x, id);
            self.var_owner.insert(handle.pos.y, id);
        }
        for port in item.ports() {
            if let Port::Point(p) = port {
                self.var_owner.insert(p.pos.x, id);
                self.var_owner.insert(p.pos.y, id);
            }
        }

        let local = *item.matrix();
        let parent_i2c = parent
            .and_then(|p| self.i2c.get(&p))
            .map_or_else(Matrix::identity, |c| c.get());
        self.i2c
            .insert(id, Rc::new(Cell::new(local.multiply(&parent_i2c))));

        self.tree.add(id, parent, Some(index));
        self.items.insert(id, item);
        self.request_update(id);
    }

    /// Remove an item and, recursively, its children. Connections to and
    /// from each removed item are disconnected. The boxed item is handed
    /// back so a host undo stack can restore it.
    pub fn remove(&mut self, id: ItemId) -> Option<Box<dyn Item>> {
        if !self.items.contains_key(&id) {
            return None;
        }
        for child in self.tree.children(Some(id)).to_vec().into_iter().rev() {
            self.remove(child);
        }
        self.remove_connections_to_item(id);

        for cid in self.items[&id].constraints() {
            let _ = self.solver.remove_constraint(cid);
        }

        let parent = self.tree.parent(id);
        let index = self.tree.index(id).unwrap_or(0);
        self.bus.emit(&Event::ItemRemoved {
            item: id,
            parent,
            index,
        });

        self.tree.remove(id);
        let boxed = self.items.remove(&id);
        self.i2c.remove(&id);
        self.projections.remove(&id);
        self.var_owner.retain(|_, owner| *owner != id);
        self.dirty_items.remove(&id);
        self.dirty_matrix_items.remove(&id);

        for (_, view) in &mut self.views {
            view.request_update(&[], &[], &[id]);
        }
        boxed
    }

    pub fn reparent(
        &mut self,
        id: ItemId,
        parent: Option<ItemId>,
        index: Option<usize>,
    ) -> Result<(), CanvasError> {
        if !self.items.contains_key(&id) {
            return Err(CanvasError::UnknownItem(id));
        }
        let old_parent = self.tree.parent(id);
        let old_index = self.tree.index(id).unwrap_or(0);
        let siblings = if parent == old_parent {
            self.tree.children(parent).len() - 1
        } else {
            self.tree.children(parent).len()
        };
        let new_index = index.unwrap_or(siblings).min(siblings);
        self.bus.emit(&Event::Reparented {
            item: id,
            old_parent,
            old_index,
            new_parent: parent,
            new_index,
        });
        self.tree.reparent(id, parent, Some(new_index));
        self.request_update(id);
        Ok(())
    }

    // === Dirty bookkeeping ===

    pub fn request_update(&mut self, id: ItemId) {
        self.dirty_items.insert(id);
        self.dirty_matrix_items.insert(id);
    }

    pub fn request_matrix_update(&mut self, id: ItemId) {
        self.dirty_matrix_items.insert(id);
    }

    fn request_item_update(&mut self, id: ItemId) {
        self.dirty_items.insert(id);
    }

    pub fn needs_update(&self) -> bool {
        !self.dirty_items.is_empty()
            || !self.dirty_matrix_items.is_empty()
            || self.solver.needs_solving()
    }

    // === Matrices ===

    /// Edit an item's local matrix; every operation emits its event
    /// before committing and schedules a matrix refresh.
    pub fn matrix_mut(&mut self, id: ItemId) -> Result<MatrixEdit<'_>, CanvasError> {
        if !self.items.contains_key(&id) {
            return Err(CanvasError::UnknownItem(id));
        }
        Ok(MatrixEdit { canvas: self, id })
    }

    /// The item-to-canvas matrix: the composition of local matrices from
    /// the root down to `id`.
    pub fn matrix_i2c(&self, id: ItemId) -> Option<Matrix> {
        self.i2c.get(&id).map(|c| c.get())
    }

    pub fn matrix_c2i(&self, id: ItemId) -> Option<Matrix> {
        self.matrix_i2c(id)?.invert()
    }

    pub fn matrix_i2i(&self, from: ItemId, to: ItemId) -> Option<Matrix> {
        let i2c = self.matrix_i2c(from)?;
        let c2i = self.matrix_c2i(to)?;
        Some(i2c.multiply(&c2i))
    }

    // === Variables and projections ===

    /// Allocate a pair of projection variables presenting `pos` of `item`
    /// in common (canvas) coordinates.
    pub fn project(&mut self, item: ItemId, pos: Position) -> Result<Position, CanvasError> {
        let cell = self
            .i2c
            .get(&item)
            .ok_or(CanvasError::UnknownItem(item))?;
        let proj = self
            .solver
            .store_mut()
            .add_projection(pos, Rc::clone(cell));
        self.projections.entry(item).or_default().push(proj);
        self.var_owner.insert(proj.x, item);
        self.var_owner.insert(proj.y, item);
        Ok(proj)
    }

    /// Write a solver variable; the owning item, if any, is marked dirty.
    pub fn set_var(&mut self, var: VarId, value: f64) {
        self.solver.set_value(var, value, &self.bus);
        if let Some(owner) = self.var_owner.get(&var).copied() {
            self.request_item_update(owner);
        }
    }

    pub fn set_handle_pos(
        &mut self,
        id: ItemId,
        handle: usize,
        pos: (f64, f64),
    ) -> Result<(), CanvasError> {
        let item = self.items.get(&id).ok_or(CanvasError::UnknownItem(id))?;
        let hpos = item
            .handles()
            .get(handle)
            .ok_or(CanvasError::UnknownHandle { item: id, handle })?
            .pos;
        self.solver.set_value(hpos.x, pos.0, &self.bus);
        self.solver.set_value(hpos.y, pos.1, &self.bus);
        self.request_item_update(id);
        Ok(())
    }

    pub fn set_handle_flag(
        &mut self,
        id: ItemId,
        handle: usize,
        flag: HandleFlag,
        value: bool,
    ) -> Result<(), CanvasError> {
        let item = self.items.get(&id).ok_or(CanvasError::UnknownItem(id))?;
        let h = item
            .handles()
            .get(handle)
            .ok_or(CanvasError::UnknownHandle { item: id, handle })?;
        let old = h.flag(flag);
        if old == value {
            return Ok(());
        }
        self.bus.emit(&Event::HandleFlagChanged {
            item: id,
            handle,
            flag,
            old,
            new: value,
        });
        self.items
            .get_mut(&id)
            .expect("checked above")
            .handles_mut()[handle]
            .set_flag(flag, value);
        Ok(())
    }

    pub fn set_line_flag(
        &mut self,
        id: ItemId,
        flag: LineFlag,
        value: bool,
    ) -> Result<(), CanvasError> {
        let line = self
            .items
            .get(&id)
            .ok_or(CanvasError::UnknownItem(id))?
            .as_any()
            .downcast_ref::<Line>()
            .ok_or(CanvasError::NotALine(id))?;
        let old = line.flag(flag);
        if old == value {
            return Ok(());
        }
        self.bus.emit(&Event::LineFlagChanged {
            item: id,
            flag,
            old,
            new: value,
        });
        let item = self.items.get_mut(&id).expect("checked above");
        let line = item
            .as_any_mut()
            .downcast_mut::<Line>()
            .expect("checked above");
        line.set_flag(&mut self.solver, flag, value);
        self.request_item_update(id);
        Ok(())
    }

    // === Connections ===

    /// Map `item`'s handle into `connected`'s coordinates and glue it to
    /// the nearest port. Returns the port index and the glue result.
    pub fn glue(
        &self,
        item: ItemId,
        handle: usize,
        connected: ItemId,
    ) -> Option<(usize, Glue)> {
        let hpos = self.item(item)?.handles().get(handle)?.pos;
        let common = self.matrix_i2c(item)?.transform_point(self.solver.pos(&hpos));
        let local = self.matrix_c2i(connected)?.transform_point(common);
        let store = self.solver.store();
        self.item(connected)?
            .ports()
            .iter()
            .enumerate()
            .map(|(i, port)| (i, port.glue(store, local)))
            .min_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
    }

    /// Create a connection between `item`'s handle and a port of
    /// `connected`. The pinning constraint works in common coordinates,
    /// so the connection survives both items' matrices changing.
    pub fn connect_item(
        &mut self,
        item: ItemId,
        handle: usize,
        connected: ItemId,
        port: usize,
        callback: Option<DisconnectCallback>,
    ) -> Result<ConstraintId, CanvasError> {
        if self.connections.get(item, handle).is_some() {
            return Err(CanvasError::DuplicateConnection { item, handle });
        }
        let hpos = self
            .items
            .get(&item)
            .ok_or(CanvasError::UnknownItem(item))?
            .handles()
            .get(handle)
            .ok_or(CanvasError::UnknownHandle { item, handle })?
            .pos;
        let p = *self
            .items
            .get(&connected)
            .ok_or(CanvasError::UnknownItem(connected))?
            .ports()
            .get(port)
            .ok_or(CanvasError::UnknownPort {
                item: connected,
                port,
            })?;

        self.bus.emit(&Event::Connected {
            item,
            handle,
            connected,
            port,
        });

        let handle_proj = self.project(item, hpos)?;
        let constraint = match p {
            Port::Point(pp) => Constraint::PositionEq {
                a: self.project(connected, pp.pos)?,
                b: handle_proj,
            },
            Port::Line(lp) => Constraint::Line {
                line: (
                    self.project(connected, lp.start)?,
                    self.project(connected, lp.end)?,
                ),
                point: handle_proj,
            },
        };
        let cid = self.solver.add_constraint(constraint);
        self.connections.insert(Connection {
            item,
            handle,
            connected,
            port,
            constraint: cid,
            callback,
        });
        self.request_item_update(item);
        Ok(cid)
    }

    /// Break the connection of `item`'s handle. The constraint leaves the
    /// solver and the disconnect callback runs exactly once.
    pub fn disconnect_item(&mut self, item: ItemId, handle: usize) -> Result<(), CanvasError> {
        let Some(record) = self.connections.get(item, handle) else {
            return Err(CanvasError::NotConnected { item, handle });
        };
        let (connected, port) = (record.connected, record.port);
        self.bus.emit(&Event::Disconnected {
            item,
            handle,
            connected,
            port,
        });
        let mut record = self
            .connections
            .remove(item, handle)
            .expect("record existed above");
        let _ = self.solver.remove_constraint(record.constraint);
        if let Some(mut callback) = record.callback.take() {
            callback();
        }
        self.request_item_update(item);
        Ok(())
    }

    /// Swap the constraint of an existing connection in place.
    pub fn reconnect_item(
        &mut self,
        item: ItemId,
        handle: usize,
        constraint: Constraint,
    ) -> Result<ConstraintId, CanvasError> {
        let record = self
            .connections
            .get(item, handle)
            .ok_or(CanvasError::NotConnected { item, handle })?;
        let old = record.constraint;
        let _ = self.solver.remove_constraint(old);
        let cid = self.solver.add_constraint(constraint);
        self.connections
            .get_mut(item, handle)
            .expect("record existed above")
            .constraint = cid;
        self.request_item_update(item);
        Ok(cid)
    }

    pub fn get_connection(&self, item: ItemId, handle: usize) -> Option<&Connection> {
        self.connections.get(item, handle)
    }

    /// Constraints anchored to `item` through connections.
    pub fn solvable_constraints(&self, item: ItemId) -> Vec<ConstraintId> {
        self.connections.solvable_constraints(item)
    }

    fn remove_connections_to_item(&mut self, id: ItemId) {
        for (item, handle) in self.connections.involving(id) {
            let _ = self.disconnect_item(item, handle);
        }
    }

    // === Views ===

    pub fn register_view(&mut self, view: Box<dyn View>) -> ViewId {
        let id = ViewId(self.next_view);
        self.next_view += 1;
        self.views.push((id, view));
        id
    }

    pub fn unregister_view(&mut self, id: ViewId) {
        self.views.retain(|(vid, _)| *vid != id);
    }

    // === Update pipeline ===

    /// Run one update cycle. Returns `ReentrantUpdate` without side
    /// effects when called from within an update (e.g. an observer).
    pub fn update(&mut self) -> Result<UpdateOutcome, CanvasError> {
        if self.updating {
            return Err(CanvasError::ReentrantUpdate);
        }
        self.updating = true;
        let outcome = self.update_now();
        self.updating = false;
        Ok(outcome)
    }

    fn update_now(&mut self) -> UpdateOutcome {
        // Parents of dirty items are updated along with them.
        for id in self.dirty_items.clone() {
            for ancestor in self.tree.ancestors(id) {
                self.dirty_items.insert(ancestor);
            }
        }
        let mut dirty_set = std::mem::take(&mut self.dirty_items);
        let mut failed: HashSet<ItemId> = HashSet::new();

        // 1. Pre-update hooks, in tree order.
        for id in self.tree.order(&dirty_set) {
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            let mut ctx = UpdateContext::new(&*self.measurer);
            match item.pre_update(&mut ctx) {
                Ok(()) => {
                    if ctx.update_requested() {
                        dirty_set.insert(id);
                    }
                }
                Err(err) => {
                    tracing::warn!(%id, error = %err, "pre_update failed; item marked clean");
                    failed.insert(id);
                }
            }
        }

        // 2. Matrix refresh; constraints on projections of moved items
        // become dirty.
        let matrix_items = std::mem::take(&mut self.dirty_matrix_items);
        let mut matrix_changed = self.update_matrices(&matrix_items);
        self.mark_projection_constraints(&matrix_changed);

        // 3. Solve.
        let mut solve = self.solver.solve(&self.bus);
        self.extend_dirty(&mut dirty_set, &solve.changed);

        // 4. Normalize: first handle back to the local origin.
        let mut normalized = HashSet::new();
        for id in self.tree.order(&dirty_set) {
            if failed.contains(&id) {
                continue;
            }
            if self.normalize_item(id) {
                normalized.insert(id);
            }
        }

        // 5. Matrix refresh for normalized items, then re-solve so the
        // connection constraints hold in the shifted frames.
        let renormalized_changed = self.update_matrices(&normalized);
        self.mark_projection_constraints(&renormalized_changed);
        matrix_changed.extend(renormalized_changed);
        let second = self.solver.solve(&self.bus);
        self.extend_dirty(&mut dirty_set, &second.changed);
        solve.merge(second);

        // 6. Post-update hooks for the (possibly grown) dirty set.
        for id in self.tree.order(&dirty_set) {
            if failed.contains(&id) {
                continue;
            }
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            let mut ctx = UpdateContext::new(&*self.measurer);
            if let Err(err) = item.post_update(&mut ctx) {
                tracing::warn!(%id, error = %err, "post_update failed");
            }
        }

        self.dirty_items.clear();
        self.dirty_matrix_items.clear();

        let dirty_list = self.tree.order(&dirty_set);
        let matrix_only: Vec<ItemId> = matrix_changed
            .iter()
            .copied()
            .filter(|id| !dirty_set.contains(id))
            .collect();
        for (_, view) in &mut self.views {
            view.request_update(&dirty_list, &matrix_only, &[]);
        }

        UpdateOutcome { solve }
    }

    fn extend_dirty(&mut self, dirty: &mut HashSet<ItemId>, changed: &[VarId]) {
        for var in changed {
            if let Some(owner) = self.var_owner.get(var) {
                dirty.insert(*owner);
            }
        }
    }

    /// Recompute the canvas-to-item matrices of `items` and all their
    /// descendants, top-down. Returns the items whose matrix actually
    /// changed.
    fn update_matrices(&mut self, items: &HashSet<ItemId>) -> HashSet<ItemId> {
        let mut changed = HashSet::new();
        for id in self.tree.order(items) {
            if self.tree.ancestors(id).iter().any(|a| items.contains(a)) {
                // Covered by the ancestor's recursion.
                continue;
            }
            self.update_matrix_recursive(id, &mut changed);
        }
        changed
    }

    fn update_matrix_recursive(&mut self, id: ItemId, changed: &mut HashSet<ItemId>) {
        self.update_matrix(id, changed);
        for child in self.tree.children(Some(id)).to_vec() {
            self.update_matrix_recursive(child, changed);
        }
    }

    fn update_matrix(&mut self, id: ItemId, changed: &mut HashSet<ItemId>) {
        let Some(item) = self.items.get(&id) else {
            return;
        };
        let local = *item.matrix();
        let parent_i2c = self
            .tree
            .parent(id)
            .and_then(|p| self.i2c.get(&p))
            .map_or_else(Matrix::identity, |c| c.get());
        let new = local.multiply(&parent_i2c);
        let cell = &self.i2c[&id];
        if cell.get() != new {
            cell.set(new);
            changed.insert(id);
        }
    }

    fn mark_projection_constraints(&mut self, items: &HashSet<ItemId>) {
        for id in items {
            let positions = self.projections.get(id).cloned().unwrap_or_default();
            for pos in positions {
                self.solver.request_resolve_var(pos.x);
                self.solver.request_resolve_var(pos.y);
            }
        }
    }

    /// Translate the item's frame so its first handle lands at (0, 0).
    fn normalize_item(&mut self, id: ItemId) -> bool {
        let Some(item) = self.items.get(&id) else {
            return false;
        };
        let Some(first) = item.handles().first() else {
            return false;
        };
        let origin = self.solver.pos(&first.pos);
        if origin.x.abs() <= EPSILON && origin.y.abs() <= EPSILON {
            return false;
        }

        let old = item.matrix().tuple();
        let mut translated = *item.matrix();
        translated.translate(origin.x, origin.y);
        self.bus.emit(&Event::MatrixChanged {
            item: id,
            old,
            new: translated.tuple(),
        });

        let item = self.items.get_mut(&id).expect("checked above");
        item.normalize(&mut self.solver, &self.bus)
    }

    // === Event replay ===

    /// Apply an observed (or inverse) event to the model. Re-adding a
    /// removed item cannot be replayed from the event alone; the host
    /// holds the boxed item returned by [`Canvas::remove`].
    pub fn apply(&mut self, event: &Event) -> Result<(), CanvasError> {
        match *event {
            Event::ValueChanged { var, new, .. } => {
                self.set_var(var, new);
                Ok(())
            }
            Event::MatrixChanged { item, new, .. } => {
                self.matrix_mut(item)?.set(Matrix::from_tuple(new));
                Ok(())
            }
            Event::ItemAdded { .. } => Err(CanvasError::CannotApply(
                "re-adding an item needs the boxed item from remove()",
            )),
            Event::ItemRemoved { item, .. } => {
                self.remove(item)
                    .map(drop)
                    .ok_or(CanvasError::UnknownItem(item))
            }
            Event::Reparented {
                item,
                new_parent,
                new_index,
                ..
            } => self.reparent(item, new_parent, Some(new_index)),
            Event::Connected {
                item,
                handle,
                connected,
                port,
            } => self
                .connect_item(item, handle, connected, port, None)
                .map(drop),
            Event::Disconnected { item, handle, .. } => self.disconnect_item(item, handle),
            Event::HandleFlagChanged {
                item,
                handle,
                flag,
                new,
                ..
            } => self.set_handle_flag(item, handle, flag, new),
            Event::LineFlagChanged {
                item, flag, new, ..
            } => self.set_line_flag(item, flag, new),
            Event::Diagnostic { .. } => Ok(()),
        }
    }

    /// Position of a handle in common (canvas) coordinates.
    pub fn handle_common_pos(&self, id: ItemId, handle: usize) -> Option<Point2> {
        let pos = self.item(id)?.handles().get(handle)?.pos;
        Some(self.matrix_i2c(id)?.transform_point(self.solver.pos(&pos)))
    }
}

/// Guard for editing an item's local matrix through the canvas, so every
/// mutation is observed and schedules a matrix refresh.
pub struct MatrixEdit<'a> {
    canvas: &'a mut Canvas,
    id: ItemId,
}

impl MatrixEdit<'_> {
    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.apply(|m| m.translate(tx, ty));
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.apply(|m| m.scale(sx, sy));
    }

    pub fn rotate(&mut self, angle: f64) {
        self.apply(|m| m.rotate(angle));
    }

    pub fn set(&mut self, matrix: Matrix) {
        self.apply(|m| *m = matrix);
    }

    fn apply(&mut self, f: impl FnOnce(&mut Matrix)) {
        let item = self
            .canvas
            .items
            .get_mut(&self.id)
            .expect("checked by matrix_mut");
        let old = *item.matrix();
        let mut new = old;
        f(&mut new);
        if new == old {
            return;
        }
        self.canvas.bus.emit(&Event::MatrixChanged {
            item: self.id,
            old: old.tuple(),
            new: new.tuple(),
        });
        *item.matrix_mut() = new;
        self.canvas.dirty_items.insert(self.id);
        self.canvas.dirty_matrix_items.insert(self.id);
    }
}
