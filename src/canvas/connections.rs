//! Registry of handle-to-port connections.
//!
//! Connections live only here, keyed by item ids; items never carry
//! back-pointers to the things connected to them. For each
//! `(item, handle)` pair at most one record exists.

use crate::item::ItemId;
use crate::solver::ConstraintId;

pub type DisconnectCallback = Box<dyn FnMut()>;

/// One connected handle: `item`'s `handle` sits on `connected`'s `port`,
/// held in place by `constraint`.
pub struct Connection {
    pub item: ItemId,
    pub handle: usize,
    pub connected: ItemId,
    pub port: usize,
    pub constraint: ConstraintId,
    /// Invoked exactly once when the connection is broken.
    pub(crate) callback: Option<DisconnectCallback>,
}

#[derive(Default)]
pub struct Connections {
    records: Vec<Connection>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item: ItemId, handle: usize) -> Option<&Connection> {
        self.records
            .iter()
            .find(|c| c.item == item && c.handle == handle)
    }

    pub(crate) fn get_mut(&mut self, item: ItemId, handle: usize) -> Option<&mut Connection> {
        self.records
            .iter_mut()
            .find(|c| c.item == item && c.handle == handle)
    }

    /// The caller checks for duplicates first; a second record for the
    /// same `(item, handle)` is a bug.
    pub(crate) fn insert(&mut self, record: Connection) {
        debug_assert!(self.get(record.item, record.handle).is_none());
        self.records.push(record);
    }

    pub(crate) fn remove(&mut self, item: ItemId, handle: usize) -> Option<Connection> {
        let index = self
            .records
            .iter()
            .position(|c| c.item == item && c.handle == handle)?;
        Some(self.records.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.records.iter()
    }

    /// Records where `item` is the connecting side.
    pub fn of_item(&self, item: ItemId) -> impl Iterator<Item = &Connection> {
        self.records.iter().filter(move |c| c.item == item)
    }

    /// Records where `item` is the connected-to side.
    pub fn of_connected(&self, item: ItemId) -> impl Iterator<Item = &Connection> {
        self.records.iter().filter(move |c| c.connected == item)
    }

    /// Constraints anchored to `item`, for prioritized resolution.
    pub fn solvable_constraints(&self, item: ItemId) -> Vec<ConstraintId> {
        self.of_connected(item).map(|c| c.constraint).collect()
    }

    /// All `(item, handle)` keys that involve `item` on either side.
    pub fn involving(&self, item: ItemId) -> Vec<(ItemId, usize)> {
        self.records
            .iter()
            .filter(|c| c.item == item || c.connected == item)
            .map(|c| (c.item, c.handle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
