use crate::canvas::Canvas;
use crate::geometry::EPSILON;
use crate::item::{Item, Line, LineFlag};

#[test]
fn test_line_starts_with_two_handles_one_port() {
    let mut canvas = Canvas::new();
    let line = Line::new(canvas.solver_mut());
    let id = canvas.add(Box::new(line), None, None);
    canvas.update().unwrap();

    let line = canvas.item_as::<Line>(id).unwrap();
    assert_eq!(line.handles().len(), 2);
    assert_eq!(line.ports().len(), 1);
    assert_eq!(line.opposite(0), Some(1));
    assert_eq!(line.opposite(1), Some(0));
}

#[test]
fn test_insert_handle_rebuilds_ports() {
    let mut canvas = Canvas::new();
    let line = Line::new(canvas.solver_mut());
    let id = canvas.add(Box::new(line), None, None);

    canvas.edit(id, |item, solver, _bus| {
        let line = item.as_any_mut().downcast_mut::<Line>().unwrap();
        line.insert_handle(solver, 1, (5.0, 5.0));
    });

    let line = canvas.item_as::<Line>(id).unwrap();
    assert_eq!(line.handles().len(), 3);
    assert_eq!(line.ports().len(), 2);
    assert_eq!(line.opposite(1), None);

    canvas.edit(id, |item, solver, _bus| {
        let line = item.as_any_mut().downcast_mut::<Line>().unwrap();
        line.remove_handle(solver, 1);
    });
    let line = canvas.item_as::<Line>(id).unwrap();
    assert_eq!(line.handles().len(), 2);
    assert_eq!(line.ports().len(), 1);
}

#[test]
fn test_orthogonal_line_alternates_axis_aligned_segments() {
    let mut canvas = Canvas::new();
    let line = Line::new(canvas.solver_mut());
    let id = canvas.add(Box::new(line), None, None);
    canvas.edit(id, |item, solver, _bus| {
        let line = item.as_any_mut().downcast_mut::<Line>().unwrap();
        line.insert_handle(solver, 1, (10.0, 2.0));
    });
    canvas.set_handle_pos(id, 2, (10.0, 10.0)).unwrap();
    canvas.update().unwrap();

    canvas.set_line_flag(id, LineFlag::Orthogonal, true).unwrap();
    canvas.set_line_flag(id, LineFlag::Horizontal, true).unwrap();
    canvas.set_handle_pos(id, 1, (10.0, 2.0)).unwrap();
    canvas.update().unwrap();

    let line = canvas.item_as::<Line>(id).unwrap();
    let store = canvas.solver().store();
    let h0 = store.pos(&line.handles()[0].pos);
    let h1 = store.pos(&line.handles()[1].pos);
    let h2 = store.pos(&line.handles()[2].pos);
    // First segment horizontal, second vertical.
    assert!((h0.y - h1.y).abs() < EPSILON);
    assert!((h1.x - h2.x).abs() < EPSILON);
    // Normalization kept the head at the origin.
    assert!(h0.x.abs() < EPSILON && h0.y.abs() < EPSILON);
}

#[test]
fn test_orthogonal_needs_three_handles() {
    let mut canvas = Canvas::new();
    let line = Line::new(canvas.solver_mut());
    let id = canvas.add(Box::new(line), None, None);

    canvas.set_line_flag(id, LineFlag::Orthogonal, true).unwrap();
    let line = canvas.item_as::<Line>(id).unwrap();
    assert!(line.orthogonal());
    assert!(line.constraints().is_empty());
}

#[test]
fn test_point_distance_includes_fuzziness() {
    let mut canvas = Canvas::new();
    let line = Line::new(canvas.solver_mut());
    let id = canvas.add(Box::new(line), None, None);
    canvas.set_handle_pos(id, 1, (10.0, 0.0)).unwrap();
    canvas.update().unwrap();

    {
        let line = canvas.item_as::<Line>(id).unwrap();
        let store = canvas.solver().store();
        assert!((line.point(store, 5.0, 4.0) - 4.0).abs() < EPSILON);
    }

    canvas.edit(id, |item, _solver, _bus| {
        item.as_any_mut().downcast_mut::<Line>().unwrap().fuzziness = 3.0;
    });
    let line = canvas.item_as::<Line>(id).unwrap();
    let store = canvas.solver().store();
    assert!((line.point(store, 5.0, 4.0) - 1.0).abs() < EPSILON);
    assert_eq!(line.point(store, 5.0, 1.0), 0.0);
}

#[test]
fn test_line_flag_is_rejected_for_other_items() {
    use crate::canvas::CanvasError;
    use crate::item::Element;

    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 10.0, 10.0);
    let id = canvas.add(Box::new(element), None, None);
    assert_eq!(
        canvas.set_line_flag(id, LineFlag::Orthogonal, true),
        Err(CanvasError::NotALine(id))
    );
}
