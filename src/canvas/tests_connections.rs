use std::cell::Cell;
use std::rc::Rc;

use crate::canvas::{Canvas, CanvasError};
use crate::geometry::EPSILON;
use crate::item::{Element, ItemId, Line};

const TOP: usize = 0;
const LEFT: usize = 3;

fn element_at(canvas: &mut Canvas, x: f64, y: f64) -> ItemId {
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(Box::new(element), None, None);
    canvas.matrix_mut(id).unwrap().translate(x, y);
    id
}

fn line(canvas: &mut Canvas) -> ItemId {
    let line = Line::new(canvas.solver_mut());
    canvas.add(Box::new(line), None, None)
}

#[test]
fn test_line_follows_connected_items_across_frames() {
    // Element A at (0, 0), element B at (300, 200); the line's ends sit
    // on A's top edge and B's left edge. Moving B drags the second
    // handle along.
    let mut canvas = Canvas::new();
    let a = element_at(&mut canvas, 0.0, 0.0);
    let b = element_at(&mut canvas, 300.0, 200.0);
    let l = line(&mut canvas);
    canvas.update().unwrap();

    canvas.connect_item(l, 0, a, TOP, None).unwrap();
    canvas.connect_item(l, 1, b, LEFT, None).unwrap();
    canvas.update().unwrap();

    // Both handles were glued onto their ports.
    let (_, glue_a) = canvas.glue(l, 0, a).unwrap();
    assert!(glue_a.distance < EPSILON);
    let (port_b, glue_b) = canvas.glue(l, 1, b).unwrap();
    assert_eq!(port_b, LEFT);
    assert!(glue_b.distance < EPSILON);

    canvas.matrix_mut(b).unwrap().translate(50.0, -20.0);
    let outcome = canvas.update().unwrap();
    assert!(outcome.solve.converged);

    // B's left edge is now at x = 350, spanning y in [180, 230].
    let h1 = canvas.handle_common_pos(l, 1).unwrap();
    assert!((h1.x - 350.0).abs() < EPSILON);
    assert!(h1.y >= 180.0 - EPSILON && h1.y <= 230.0 + EPSILON);
    let (_, glue_b) = canvas.glue(l, 1, b).unwrap();
    assert!(glue_b.distance < EPSILON);

    // The line's own first handle stayed at its local origin.
    let line_item = canvas.item(l).unwrap();
    let h0 = canvas.solver().pos(&line_item.handles()[0].pos);
    assert!(h0.x.abs() < EPSILON && h0.y.abs() < EPSILON);
}

#[test]
fn test_duplicate_connection_is_rejected() {
    let mut canvas = Canvas::new();
    let a = element_at(&mut canvas, 0.0, 0.0);
    let b = element_at(&mut canvas, 200.0, 0.0);
    let l = line(&mut canvas);
    canvas.update().unwrap();

    canvas.connect_item(l, 0, a, TOP, None).unwrap();
    let result = canvas.connect_item(l, 0, b, TOP, None);
    assert_eq!(
        result,
        Err(CanvasError::DuplicateConnection { item: l, handle: 0 })
    );
    // The first connection is untouched.
    assert_eq!(canvas.get_connection(l, 0).unwrap().connected, a);
    assert_eq!(canvas.connections().len(), 1);
}

#[test]
fn test_disconnect_invokes_callback_exactly_once() {
    let mut canvas = Canvas::new();
    let a = element_at(&mut canvas, 0.0, 0.0);
    let l = line(&mut canvas);
    canvas.update().unwrap();

    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let cid = canvas
        .connect_item(l, 0, a, TOP, Some(Box::new(move || {
            counter.set(counter.get() + 1);
        })))
        .unwrap();

    canvas.disconnect_item(l, 0).unwrap();
    assert_eq!(calls.get(), 1);
    assert!(canvas.get_connection(l, 0).is_none());
    assert!(!canvas.solver().contains(cid));

    assert_eq!(
        canvas.disconnect_item(l, 0),
        Err(CanvasError::NotConnected { item: l, handle: 0 })
    );
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_removing_an_item_disconnects_both_sides() {
    let mut canvas = Canvas::new();
    let a = element_at(&mut canvas, 0.0, 0.0);
    let b = element_at(&mut canvas, 300.0, 0.0);
    let l = line(&mut canvas);
    canvas.update().unwrap();

    let a_calls = Rc::new(Cell::new(0));
    let b_calls = Rc::new(Cell::new(0));
    let ca = Rc::clone(&a_calls);
    let cb = Rc::clone(&b_calls);
    let cid_a = canvas
        .connect_item(l, 0, a, TOP, Some(Box::new(move || ca.set(ca.get() + 1))))
        .unwrap();
    let cid_b = canvas
        .connect_item(l, 1, b, LEFT, Some(Box::new(move || cb.set(cb.get() + 1))))
        .unwrap();
    canvas.update().unwrap();

    // Removing the connected element breaks exactly the records naming
    // it, on either side.
    canvas.remove(a);
    assert_eq!(a_calls.get(), 1);
    assert_eq!(b_calls.get(), 0);
    assert!(canvas.get_connection(l, 0).is_none());
    assert!(canvas.get_connection(l, 1).is_some());
    assert!(!canvas.solver().contains(cid_a));
    assert!(canvas.solver().contains(cid_b));

    // Removing the connecting line breaks the rest.
    canvas.remove(l);
    assert_eq!(b_calls.get(), 1);
    assert!(canvas.connections().is_empty());
    assert!(!canvas.solver().contains(cid_b));
}

#[test]
fn test_solvable_constraints_are_anchored_to_the_connected_item() {
    let mut canvas = Canvas::new();
    let a = element_at(&mut canvas, 0.0, 0.0);
    let b = element_at(&mut canvas, 300.0, 0.0);
    let l = line(&mut canvas);
    canvas.update().unwrap();

    let cid_a = canvas.connect_item(l, 0, a, TOP, None).unwrap();
    let cid_b = canvas.connect_item(l, 1, b, TOP, None).unwrap();

    assert_eq!(canvas.solvable_constraints(a), vec![cid_a]);
    assert_eq!(canvas.solvable_constraints(b), vec![cid_b]);
    assert!(canvas.solvable_constraints(l).is_empty());
}

#[test]
fn test_reconnect_swaps_the_constraint_in_place() {
    use crate::solver::Constraint;

    let mut canvas = Canvas::new();
    let a = element_at(&mut canvas, 0.0, 0.0);
    let l = line(&mut canvas);
    canvas.update().unwrap();

    let old = canvas.connect_item(l, 0, a, TOP, None).unwrap();

    // Pin the handle to the port start corner instead.
    let handle_pos = canvas.item(l).unwrap().handles()[0].pos;
    let corner = canvas.item(a).unwrap().handles()[0].pos;
    let handle_proj = canvas.project(l, handle_pos).unwrap();
    let corner_proj = canvas.project(a, corner).unwrap();
    let new = canvas
        .reconnect_item(
            l,
            0,
            Constraint::PositionEq {
                a: corner_proj,
                b: handle_proj,
            },
        )
        .unwrap();

    assert!(!canvas.solver().contains(old));
    assert!(canvas.solver().contains(new));
    assert_eq!(canvas.get_connection(l, 0).unwrap().constraint, new);
}

#[test]
fn test_connection_to_point_port_pins_the_handle() {
    use std::any::Any;

    use crate::connector::{Handle, Port};
    use crate::geometry::Matrix;
    use crate::item::Item;
    use crate::solver::{VariableStore, STRONG};

    // A one-port item in the spirit of a UML lifeline head: a single
    // fixed connection point.
    struct Pin {
        matrix: Matrix,
        handles: Vec<Handle>,
        ports: Vec<Port>,
    }

    impl Item for Pin {
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
        fn point(&self, store: &VariableStore, x: f64, y: f64) -> f64 {
            let p = store.pos(&self.ports_pos());
            crate::geometry::distance(p, nalgebra::Point2::new(x, y))
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    impl Pin {
        fn ports_pos(&self) -> crate::solver::Position {
            match self.ports[0] {
                Port::Point(p) => p.pos,
                Port::Line(_) => unreachable!(),
            }
        }
    }

    let mut canvas = Canvas::new();
    // A fixed connection point holds its ground against the handle.
    let pos = canvas.solver_mut().add_position((4.0, 6.0), STRONG);
    let pin = Pin {
        matrix: Matrix::identity(),
        handles: vec![],
        ports: vec![Port::point(pos)],
    };
    let p = canvas.add(Box::new(pin), None, None);
    canvas.matrix_mut(p).unwrap().translate(100.0, 0.0);
    let l = line(&mut canvas);
    canvas.update().unwrap();

    canvas.connect_item(l, 1, p, 0, None).unwrap();
    canvas.update().unwrap();

    let h1 = canvas.handle_common_pos(l, 1).unwrap();
    assert!((h1.x - 104.0).abs() < EPSILON);
    assert!((h1.y - 6.0).abs() < EPSILON);
}
