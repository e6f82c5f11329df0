//! Integration tests: pointer gestures through the editing session.
//!
//! A press-drag-release becomes at most one undoable command; everything in
//! between is provisional.

use grc_core::*;
use grc_editor::{EditorConfig, InputEvent, Modifiers, Session};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Canvas {
    session: Session,
    a: NodeIndex,
    sink: NodeIndex,
    b: NodeIndex,
    /// Commands recorded while setting up.
    baseline: usize,
}

/// Two throttles stacked on the left, a null sink to the right of the top one.
fn canvas() -> Canvas {
    let registry = Arc::new(BlockRegistry::from_json(include_str!("fixtures/registry.json")).unwrap());
    let mut session = Session::new(registry, EditorConfig::default());
    let a = session.add_block("blocks_throttle", Point::new(100.0, 200.0)).unwrap();
    let sink = session.add_block("blocks_null_sink", Point::new(400.0, 200.0)).unwrap();
    let b = session.add_block("blocks_throttle", Point::new(100.0, 400.0)).unwrap();
    session.deselect_all();
    session.save().unwrap();
    let baseline = session.commands().len();
    Canvas { session, a, sink, b, baseline }
}

fn port_center(session: &Session, idx: NodeIndex, direction: Direction) -> Point {
    let block = session.flowgraph().block(idx).unwrap();
    let port = block.port(direction, "0").unwrap();
    block.map_to_scene(block.port_rect(port).center())
}

fn position(session: &Session, idx: NodeIndex) -> Point {
    session.flowgraph().block(idx).unwrap().position
}

fn gesture(session: &mut Session, from: Point, to: Point) {
    session.handle_event(&InputEvent::pointer_down(from.x, from.y)).unwrap();
    session.handle_event(&InputEvent::pointer_move(to.x, to.y)).unwrap();
    session.handle_event(&InputEvent::pointer_up(to.x, to.y)).unwrap();
}

fn shifted(event: InputEvent) -> InputEvent {
    match event {
        InputEvent::PointerDown { x, y, .. } => InputEvent::PointerDown { x, y, modifiers: Modifiers::SHIFT },
        InputEvent::PointerMove { x, y, .. } => InputEvent::PointerMove { x, y, modifiers: Modifiers::SHIFT },
        InputEvent::PointerUp { x, y, .. } => InputEvent::PointerUp { x, y, modifiers: Modifiers::SHIFT },
        key => key,
    }
}

// ─── Drag ────────────────────────────────────────────────────────────────

#[test]
fn drag_records_one_move() {
    let Canvas { mut session, a, baseline, .. } = canvas();
    session.handle_event(&InputEvent::pointer_down(150.0, 225.0)).unwrap();
    session.handle_event(&InputEvent::pointer_move(170.0, 235.0)).unwrap();
    session.handle_event(&InputEvent::pointer_move(200.0, 260.0)).unwrap();
    session.handle_event(&InputEvent::pointer_up(200.0, 260.0)).unwrap();

    assert_eq!(position(&session, a), Point::new(150.0, 235.0));
    assert_eq!(session.commands().len(), baseline + 1);
    assert_eq!(session.commands().undo_text(), Some("Move"));
    assert!(session.is_dirty());

    session.undo().unwrap();
    assert_eq!(position(&session, a), Point::new(100.0, 200.0));
}

#[test]
fn provisional_drag_is_not_dirty_and_escape_cancels() {
    let Canvas { mut session, a, baseline, .. } = canvas();
    session.handle_event(&InputEvent::pointer_down(150.0, 225.0)).unwrap();
    session.handle_event(&InputEvent::pointer_move(300.0, 300.0)).unwrap();
    assert_eq!(position(&session, a), Point::new(250.0, 275.0));
    assert!(!session.is_dirty());

    session.handle_event(&InputEvent::key("Escape")).unwrap();
    assert_eq!(position(&session, a), Point::new(100.0, 200.0));
    assert!(session.tool().is_idle());

    session.handle_event(&InputEvent::pointer_up(300.0, 300.0)).unwrap();
    assert_eq!(position(&session, a), Point::new(100.0, 200.0));
    assert_eq!(session.commands().len(), baseline);
    assert!(!session.is_dirty());
}

#[test]
fn click_without_movement_only_selects() {
    let Canvas { mut session, a, baseline, .. } = canvas();
    gesture(&mut session, Point::new(150.0, 225.0), Point::new(150.0, 225.0));
    assert_eq!(session.flowgraph().selected_blocks(), vec![a]);
    assert_eq!(session.commands().len(), baseline);
    assert!(!session.is_dirty());
}

#[test]
fn shift_drag_keeps_the_dominant_axis() {
    let Canvas { mut session, a, .. } = canvas();
    session.handle_event(&InputEvent::pointer_down(150.0, 225.0)).unwrap();
    session.handle_event(&shifted(InputEvent::pointer_up(230.0, 240.0))).unwrap();
    assert_eq!(position(&session, a), Point::new(180.0, 200.0));
}

#[test]
fn dragging_a_selection_moves_every_member() {
    let Canvas { mut session, a, b, baseline, .. } = canvas();
    session.select(&[ElementRef::Block(a), ElementRef::Block(b)]);
    gesture(&mut session, Point::new(150.0, 425.0), Point::new(160.0, 435.0));

    assert_eq!(position(&session, a), Point::new(110.0, 210.0));
    assert_eq!(position(&session, b), Point::new(110.0, 410.0));
    assert_eq!(session.commands().len(), baseline + 1);

    session.undo().unwrap();
    assert_eq!(position(&session, a), Point::new(100.0, 200.0));
    assert_eq!(position(&session, b), Point::new(100.0, 400.0));
}

// ─── Connect ─────────────────────────────────────────────────────────────

#[test]
fn port_drag_connects() {
    let Canvas { mut session, a, sink, baseline, .. } = canvas();
    let from = port_center(&session, a, Direction::Source);
    let to = port_center(&session, sink, Direction::Sink);
    gesture(&mut session, from, to);

    let fg = session.flowgraph();
    assert_eq!(fg.connection_count(), 1);
    let edge = fg.connections_of(sink)[0];
    assert_eq!(fg.endpoints(edge), Some((a, sink)));
    assert_eq!(session.commands().len(), baseline + 1);
    assert_eq!(session.commands().undo_text(), Some("Add"));

    session.undo().unwrap();
    assert_eq!(session.flowgraph().connection_count(), 0);
    session.redo().unwrap();
    assert_eq!(session.flowgraph().connection_count(), 1);
}

#[test]
fn dragging_from_a_sink_connects_the_other_way() {
    let Canvas { mut session, a, sink, .. } = canvas();
    let from = port_center(&session, sink, Direction::Sink);
    let to = port_center(&session, a, Direction::Source);
    gesture(&mut session, from, to);

    let fg = session.flowgraph();
    let edge = fg.connections_of(sink)[0];
    assert_eq!(fg.endpoints(edge), Some((a, sink)));
}

#[test]
fn release_on_empty_space_connects_nothing() {
    let Canvas { mut session, a, baseline, .. } = canvas();
    let from = port_center(&session, a, Direction::Source);
    gesture(&mut session, from, Point::new(700.0, 700.0));
    assert_eq!(session.flowgraph().connection_count(), 0);
    assert_eq!(session.commands().len(), baseline);
    assert!(session.tool().is_idle());
}

#[test]
fn occupied_sink_rejects_second_connection() {
    let Canvas { mut session, a, sink, b, baseline, .. } = canvas();
    let target = port_center(&session, sink, Direction::Sink);
    let from = port_center(&session, a, Direction::Source);
    gesture(&mut session, from, target);
    let from = port_center(&session, b, Direction::Source);
    gesture(&mut session, from, target);

    assert_eq!(session.flowgraph().connection_count(), 1);
    assert_eq!(session.commands().len(), baseline + 1);
}

// ─── Marquee ─────────────────────────────────────────────────────────────

#[test]
fn marquee_selects_intersecting_blocks() {
    let Canvas { mut session, a, b, .. } = canvas();
    session.select(&[ElementRef::Block(b)]);
    session.handle_event(&InputEvent::pointer_down(20.0, 180.0)).unwrap();
    session.handle_event(&InputEvent::pointer_move(300.0, 300.0)).unwrap();
    assert_eq!(
        session.tool().marquee_rect(),
        Some(Rect::new(20.0, 180.0, 300.0, 300.0))
    );
    session.handle_event(&InputEvent::pointer_up(300.0, 300.0)).unwrap();

    assert_eq!(session.flowgraph().selected_blocks(), vec![a]);
    assert!(session.tool().marquee_rect().is_none());
}

#[test]
fn shift_marquee_adds_to_the_selection() {
    let Canvas { mut session, a, b, baseline, .. } = canvas();
    session.select(&[ElementRef::Block(b)]);
    session.handle_event(&shifted(InputEvent::pointer_down(20.0, 180.0))).unwrap();
    session.handle_event(&shifted(InputEvent::pointer_up(300.0, 300.0))).unwrap();

    let mut selected = session.flowgraph().selected_blocks();
    selected.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(selected, expected);
    assert_eq!(session.commands().len(), baseline);
}

#[test]
fn click_on_empty_space_clears_the_selection() {
    let Canvas { mut session, a, .. } = canvas();
    session.select(&[ElementRef::Block(a)]);
    gesture(&mut session, Point::new(700.0, 700.0), Point::new(700.0, 700.0));
    assert!(session.flowgraph().selected_blocks().is_empty());
}
