//! Observable mutation events.
//!
//! Every mutating operation on the model emits an [`Event`] *before* the
//! change is committed, so handlers observe the prior state. The
//! [`EventBus`] is owned by the canvas; its lifetime is the canvas
//! lifetime. Two handler sets exist: observers receive the raw events,
//! subscribers receive the reverter-produced inverse events, which a host
//! can record to build an undo log. The core never manages undo stacks
//! itself.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::connector::HandleFlag;
use crate::item::{ItemId, LineFlag};
use crate::solver::VarId;

#[cfg(test)]
mod tests_events;

/// Diagnostic conditions that would otherwise be silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A solver pass hit its iteration budget and was truncated.
    SolveBudgetExceeded,
    /// A projection write was dropped because the matrix is not invertible.
    SingularMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ValueChanged {
        var: VarId,
        old: f64,
        new: f64,
    },
    MatrixChanged {
        item: ItemId,
        old: [f64; 6],
        new: [f64; 6],
    },
    ItemAdded {
        item: ItemId,
        parent: Option<ItemId>,
        index: usize,
    },
    ItemRemoved {
        item: ItemId,
        parent: Option<ItemId>,
        index: usize,
    },
    Reparented {
        item: ItemId,
        old_parent: Option<ItemId>,
        old_index: usize,
        new_parent: Option<ItemId>,
        new_index: usize,
    },
    Connected {
        item: ItemId,
        handle: usize,
        connected: ItemId,
        port: usize,
    },
    Disconnected {
        item: ItemId,
        handle: usize,
        connected: ItemId,
        port: usize,
    },
    HandleFlagChanged {
        item: ItemId,
        handle: usize,
        flag: HandleFlag,
        old: bool,
        new: bool,
    },
    LineFlagChanged {
        item: ItemId,
        flag: LineFlag,
        old: bool,
        new: bool,
    },
    Diagnostic {
        kind: DiagnosticKind,
        detail: String,
    },
}

impl Event {
    /// The inverse operation, applying which reverts this event.
    /// Diagnostics have no inverse.
    pub fn inverse(&self) -> Option<Event> {
        match *self {
            Event::ValueChanged { var, old, new } => Some(Event::ValueChanged {
                var,
                old: new,
                new: old,
            }),
            Event::MatrixChanged { item, old, new } => Some(Event::MatrixChanged {
                item,
                old: new,
                new: old,
            }),
            Event::ItemAdded {
                item,
                parent,
                index,
            } => Some(Event::ItemRemoved {
                item,
                parent,
                index,
            }),
            Event::ItemRemoved {
                item,
                parent,
                index,
            } => Some(Event::ItemAdded {
                item,
                parent,
                index,
            }),
            Event::Reparented {
                item,
                old_parent,
                old_index,
                new_parent,
                new_index,
            } => Some(Event::Reparented {
                item,
                old_parent: new_parent,
                old_index: new_index,
                new_parent: old_parent,
                new_index: old_index,
            }),
            Event::Connected {
                item,
                handle,
                connected,
                port,
            } => Some(Event::Disconnected {
                item,
                handle,
                connected,
                port,
            }),
            Event::Disconnected {
                item,
                handle,
                connected,
                port,
            } => Some(Event::Connected {
                item,
                handle,
                connected,
                port,
            }),
            Event::HandleFlagChanged {
                item,
                handle,
                flag,
                old,
                new,
            } => Some(Event::HandleFlagChanged {
                item,
                handle,
                flag,
                old: new,
                new: old,
            }),
            Event::LineFlagChanged {
                item, flag, old, new,
            } => Some(Event::LineFlagChanged {
                item,
                flag,
                old: new,
                new: old,
            }),
            Event::Diagnostic { .. } => None,
        }
    }
}

pub type Handler = Rc<dyn Fn(&Event)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

/// Event dispatcher owned by the canvas.
///
/// Interior mutability keeps `emit` callable from anywhere a shared
/// reference reaches, while the handler sets stay editable by the host.
#[derive(Default)]
pub struct EventBus {
    observers: RefCell<Vec<(HandlerId, Handler)>>,
    subscribers: RefCell<Vec<(HandlerId, Handler)>>,
    next_id: Cell<usize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> HandlerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        HandlerId(id)
    }

    /// Register a handler for raw, pre-commit events.
    pub fn add_observer(&self, handler: impl Fn(&Event) + 'static) -> HandlerId {
        let id = self.next();
        self.observers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    pub fn remove_observer(&self, id: HandlerId) {
        self.observers.borrow_mut().retain(|(hid, _)| *hid != id);
    }

    /// Register a handler for reverter-produced inverse events.
    pub fn add_subscriber(&self, handler: impl Fn(&Event) + 'static) -> HandlerId {
        let id = self.next();
        self.subscribers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    pub fn remove_subscriber(&self, id: HandlerId) {
        self.subscribers.borrow_mut().retain(|(hid, _)| *hid != id);
    }

    /// Dispatch an event to all observers, then its inverse to all
    /// subscribers. Handler sets are snapshotted first, so a handler may
    /// register or remove handlers without poisoning the dispatch. Each
    /// handler is contained individually: a panicking handler is caught
    /// and logged, and the remaining handlers still run.
    pub fn emit(&self, event: &Event) {
        let observers: Vec<Handler> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in observers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(?event, "observer panicked; skipping it");
            }
        }

        if let Some(inverse) = event.inverse() {
            let subscribers: Vec<Handler> = self
                .subscribers
                .borrow()
                .iter()
                .map(|(_, h)| Rc::clone(h))
                .collect();
            for handler in subscribers {
                if catch_unwind(AssertUnwindSafe(|| handler(&inverse))).is_err() {
                    tracing::error!(event = ?inverse, "subscriber panicked; skipping it");
                }
            }
        }
    }

    pub fn emit_diagnostic(&self, kind: DiagnosticKind, detail: impl Into<String>) {
        self.emit(&Event::Diagnostic {
            kind,
            detail: detail.into(),
        });
    }
}
