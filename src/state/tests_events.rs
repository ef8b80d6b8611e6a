use std::cell::RefCell;
use std::rc::Rc;

use crate::connector::HandleFlag;
use crate::item::ItemId;
use crate::solver::VarId;
use crate::state::{DiagnosticKind, Event, EventBus};

#[test]
fn test_inverse_swaps_assignment() {
    let event = Event::ValueChanged {
        var: VarId(3),
        old: 1.0,
        new: 2.0,
    };
    assert_eq!(
        event.inverse(),
        Some(Event::ValueChanged {
            var: VarId(3),
            old: 2.0,
            new: 1.0,
        })
    );
    // Inverting twice is the identity.
    assert_eq!(event.inverse().unwrap().inverse(), Some(event));
}

#[test]
fn test_inverse_pairs_structural_events() {
    let item = ItemId::new();
    let parent = Some(ItemId::new());

    let added = Event::ItemAdded {
        item,
        parent,
        index: 2,
    };
    assert_eq!(
        added.inverse(),
        Some(Event::ItemRemoved {
            item,
            parent,
            index: 2,
        })
    );

    let connected = Event::Connected {
        item,
        handle: 1,
        connected: parent.unwrap(),
        port: 0,
    };
    assert!(matches!(
        connected.inverse(),
        Some(Event::Disconnected { handle: 1, .. })
    ));

    let reparented = Event::Reparented {
        item,
        old_parent: None,
        old_index: 0,
        new_parent: parent,
        new_index: 1,
    };
    let inverse = reparented.inverse().unwrap();
    assert_eq!(
        inverse,
        Event::Reparented {
            item,
            old_parent: parent,
            old_index: 1,
            new_parent: None,
            new_index: 0,
        }
    );
}

#[test]
fn test_diagnostics_have_no_inverse() {
    let event = Event::Diagnostic {
        kind: DiagnosticKind::SingularMatrix,
        detail: "write dropped".into(),
    };
    assert_eq!(event.inverse(), None);
}

#[test]
fn test_observers_receive_raw_events() {
    let bus = EventBus::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = bus.add_observer(move |e| sink.borrow_mut().push(e.clone()));

    let event = Event::ValueChanged {
        var: VarId(0),
        old: 0.0,
        new: 1.0,
    };
    bus.emit(&event);
    assert_eq!(seen.borrow().as_slice(), &[event.clone()]);

    bus.remove_observer(id);
    bus.emit(&event);
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_subscribers_receive_inverse_events() {
    let bus = EventBus::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    bus.add_subscriber(move |e| sink.borrow_mut().push(e.clone()));

    bus.emit(&Event::ValueChanged {
        var: VarId(7),
        old: 3.0,
        new: 4.0,
    });
    assert_eq!(
        seen.borrow().as_slice(),
        &[Event::ValueChanged {
            var: VarId(7),
            old: 4.0,
            new: 3.0,
        }]
    );

    // No inverse, nothing delivered.
    bus.emit_diagnostic(DiagnosticKind::SolveBudgetExceeded, "truncated");
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_handlers_may_unregister_during_dispatch() {
    let bus = Rc::new(EventBus::new());
    let count = Rc::new(RefCell::new(0));

    let bus2 = Rc::clone(&bus);
    let count2 = Rc::clone(&count);
    let id = Rc::new(RefCell::new(None));
    let id2 = Rc::clone(&id);
    let handler = bus.add_observer(move |_| {
        *count2.borrow_mut() += 1;
        if let Some(own) = id2.borrow_mut().take() {
            bus2.remove_observer(own);
        }
    });
    *id.borrow_mut() = Some(handler);

    let event = Event::ValueChanged {
        var: VarId(0),
        old: 0.0,
        new: 1.0,
    };
    bus.emit(&event);
    bus.emit(&event);
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn test_panicking_handlers_do_not_affect_others() {
    let bus = EventBus::new();
    let observed = Rc::new(RefCell::new(0));
    let reverted = Rc::new(RefCell::new(0));

    // The broken handlers come first, so the well-behaved ones only run
    // if dispatch survives the panic.
    bus.add_observer(|_| panic!("broken observer"));
    let sink = Rc::clone(&observed);
    bus.add_observer(move |_| *sink.borrow_mut() += 1);
    bus.add_subscriber(|_| panic!("broken subscriber"));
    let sink = Rc::clone(&reverted);
    bus.add_subscriber(move |_| *sink.borrow_mut() += 1);

    // emit must return normally despite the panics.
    bus.emit(&Event::ValueChanged {
        var: VarId(0),
        old: 0.0,
        new: 1.0,
    });
    assert_eq!(*observed.borrow(), 1);
    assert_eq!(*reverted.borrow(), 1);

    bus.emit(&Event::ValueChanged {
        var: VarId(0),
        old: 1.0,
        new: 2.0,
    });
    assert_eq!(*observed.borrow(), 2);
    assert_eq!(*reverted.borrow(), 2);
}

#[test]
fn test_events_serialize() {
    let event = Event::HandleFlagChanged {
        item: ItemId::new(),
        handle: 0,
        flag: HandleFlag::Connectable,
        old: false,
        new: true,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
