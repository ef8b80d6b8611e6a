use crate::canvas::{Canvas, View};
use crate::geometry::EPSILON;
use crate::item::{Element, ItemId, Line};

fn element(canvas: &mut Canvas) -> ItemId {
    let element = Element::new(canvas.solver_mut(), 10.0, 10.0);
    canvas.add(Box::new(element), None, None)
}

#[test]
fn test_add_then_remove_leaves_the_tree_unchanged() {
    let mut canvas = Canvas::new();
    let a = element(&mut canvas);
    let before = canvas.items().to_vec();

    let x = element(&mut canvas);
    assert_eq!(canvas.items().len(), 2);
    let boxed = canvas.remove(x);
    assert!(boxed.is_some());
    assert_eq!(canvas.items(), before.as_slice());
    assert_eq!(canvas.items(), &[a]);
}

#[test]
fn test_remove_is_recursive() {
    let mut canvas = Canvas::new();
    let a = element(&mut canvas);
    let child = Element::new(canvas.solver_mut(), 10.0, 10.0);
    let b = canvas.add(Box::new(child), Some(a), None);
    let grandchild = Line::new(canvas.solver_mut());
    let c = canvas.add(Box::new(grandchild), Some(b), None);

    canvas.remove(a);
    assert!(canvas.items().is_empty());
    assert!(canvas.item(b).is_none());
    assert!(canvas.item(c).is_none());
}

#[test]
fn test_reparent_back_is_identity() {
    let mut canvas = Canvas::new();
    let a = element(&mut canvas);
    let b = element(&mut canvas);
    let child = Element::new(canvas.solver_mut(), 10.0, 10.0);
    let c = canvas.add(Box::new(child), Some(a), None);
    canvas.update().unwrap();

    let order = canvas.items().to_vec();
    let index = canvas
        .children(Some(a))
        .iter()
        .position(|n| *n == c);

    canvas.reparent(c, Some(b), None).unwrap();
    assert_eq!(canvas.parent(c), Some(b));
    canvas.reparent(c, Some(a), index).unwrap();
    assert_eq!(canvas.parent(c), Some(a));
    assert_eq!(canvas.items(), order.as_slice());
}

#[test]
fn test_items_iterate_depth_first() {
    let mut canvas = Canvas::new();
    let a = element(&mut canvas);
    let b = element(&mut canvas);
    let child = Element::new(canvas.solver_mut(), 10.0, 10.0);
    let a1 = canvas.add(Box::new(child), Some(a), None);

    assert_eq!(canvas.items(), &[a, a1, b]);
    assert_eq!(canvas.sort(&[b, a1, a]), vec![a, a1, b]);
}

#[test]
fn test_i2c_matrix_is_the_composition_from_root() {
    let mut canvas = Canvas::new();
    let a = element(&mut canvas);
    let child = Element::new(canvas.solver_mut(), 10.0, 10.0);
    let b = canvas.add(Box::new(child), Some(a), None);

    canvas.matrix_mut(a).unwrap().translate(10.0, 0.0);
    canvas.matrix_mut(b).unwrap().translate(5.0, 5.0);
    canvas.update().unwrap();

    let i2c = canvas.matrix_i2c(b).unwrap().tuple();
    assert!((i2c[4] - 15.0).abs() < EPSILON);
    assert!((i2c[5] - 5.0).abs() < EPSILON);

    // Moving only the parent cascades into the child's cached matrix.
    canvas.matrix_mut(a).unwrap().translate(0.0, 100.0);
    canvas.update().unwrap();
    let i2c = canvas.matrix_i2c(b).unwrap().tuple();
    assert!((i2c[5] - 105.0).abs() < EPSILON);
}

#[test]
fn test_matrix_i2i_routes_between_items() {
    let mut canvas = Canvas::new();
    let a = element(&mut canvas);
    let b = element(&mut canvas);
    canvas.matrix_mut(a).unwrap().translate(10.0, 0.0);
    canvas.matrix_mut(b).unwrap().translate(0.0, 30.0);
    canvas.update().unwrap();

    let m = canvas.matrix_i2i(a, b).unwrap();
    let p = m.transform_point(nalgebra::Point2::new(0.0, 0.0));
    assert!((p.x - 10.0).abs() < EPSILON);
    assert!((p.y + 30.0).abs() < EPSILON);
}

#[test]
fn test_update_with_nothing_dirty_is_clean() {
    let mut canvas = Canvas::new();
    let outcome = canvas.update().unwrap();
    assert!(outcome.solve.converged);
    assert_eq!(outcome.solve.solves, 0);
    assert!(!canvas.needs_update());
}

#[test]
fn test_update_clears_the_dirty_state() {
    let mut canvas = Canvas::new();
    let a = element(&mut canvas);
    assert!(canvas.needs_update());
    canvas.update().unwrap();
    assert!(!canvas.needs_update());

    canvas.request_update(a);
    assert!(canvas.needs_update());
    canvas.update().unwrap();
    assert!(!canvas.needs_update());
}

#[test]
fn test_views_are_notified_after_update() {
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        dirty: Vec<ItemId>,
        removed: Vec<ItemId>,
    }

    struct RecordingView(Rc<RefCell<Recorder>>);

    impl View for RecordingView {
        fn request_update(&mut self, dirty: &[ItemId], _matrix_only: &[ItemId], removed: &[ItemId]) {
            let mut recorder = self.0.borrow_mut();
            recorder.dirty.extend_from_slice(dirty);
            recorder.removed.extend_from_slice(removed);
        }
    }

    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut canvas = Canvas::new();
    canvas.register_view(Box::new(RecordingView(Rc::clone(&recorder))));

    let a = element(&mut canvas);
    canvas.update().unwrap();
    assert_eq!(recorder.borrow().dirty, vec![a]);

    canvas.remove(a);
    assert_eq!(recorder.borrow().removed, vec![a]);
}

#[test]
fn test_hook_errors_are_caught_and_logged() {
    use std::any::Any;

    use crate::connector::Handle;
    use crate::geometry::Matrix;
    use crate::item::{HookError, Item, UpdateContext};
    use crate::solver::VariableStore;

    struct FailingItem {
        matrix: Matrix,
        handles: Vec<Handle>,
    }

    impl Item for FailingItem {
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
        fn ports(&self) -> &[crate::connector::Port] {
            &[]
        }
        fn pre_update(&mut self, _ctx: &mut UpdateContext<'_>) -> Result<(), HookError> {
            Err("text measurement failed".into())
        }
        fn point(&self, _store: &VariableStore, _x: f64, _y: f64) -> f64 {
            f64::INFINITY
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    let mut canvas = Canvas::new();
    let handles = vec![Handle::new(
        canvas.solver_mut().add_position((0.0, 0.0), crate::solver::NORMAL),
    )];
    let id = canvas.add(
        Box::new(FailingItem {
            matrix: Matrix::identity(),
            handles,
        }),
        None,
        None,
    );

    // The failing hook must not poison the cycle.
    let outcome = canvas.update().unwrap();
    assert!(outcome.solve.converged);
    assert!(!canvas.needs_update());
    assert!(canvas.item(id).is_some());
}
