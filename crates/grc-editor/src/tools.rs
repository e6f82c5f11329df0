//! Pointer gesture handling on the canvas.
//!
//! `SelectTool` is a small state machine: press on a block starts a drag,
//! press on a port starts a connection, press on empty space starts a
//! marquee. Intermediate drag positions are provisional (layout only, not
//! dirty, not in the history); the gesture becomes a command only at release
//! and only if something actually changed.
//!
//! ## Modifier behaviors
//!
//! | Modifier | Press | Drag |
//! |----------|-------|------|
//! | **Shift** | Toggle the element in/out of the selection; marquee adds | Constrain to the dominant axis |

use crate::commands::{BlockMove, Command};
use crate::input::InputEvent;
use grc_core::{
    BlockName, Direction, ElementRef, Flowgraph, FlowgraphData, Hit, NodeIndex, Point, PortRef,
    Rect, Vec2,
};

/// Where a gesture stands between press and release.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ToolState {
    #[default]
    Idle,
    /// Moving the selected blocks; `start` holds their pre-drag positions.
    Dragging {
        origin: Point,
        start: Vec<(NodeIndex, BlockName, Point)>,
    },
    /// Dragging a connection out of a port.
    Connecting { from: PortRef, cursor: Point },
    /// Rubber-band selection.
    Marquee {
        start: Point,
        current: Point,
        additive: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SelectTool {
    state: ToolState,
}

impl SelectTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ToolState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ToolState::Idle
    }

    /// Current marquee rectangle (normalized), for the host to draw.
    pub fn marquee_rect(&self) -> Option<Rect> {
        match self.state {
            ToolState::Marquee { start, current, .. } => Some(Rect::from_points(start, current)),
            _ => None,
        }
    }

    /// Handle one pointer event. Selection and provisional positions are
    /// written to `fg` directly; a finished gesture is returned as a command
    /// whose effect is already applied, for the caller to record.
    pub fn handle(&mut self, fg: &mut Flowgraph, event: &InputEvent) -> Option<Command> {
        match event {
            InputEvent::PointerDown { x, y, modifiers } => {
                self.press(fg, Point::new(*x, *y), modifiers.shift);
                None
            }
            InputEvent::PointerMove { x, y, modifiers } => {
                self.drag(fg, Point::new(*x, *y), modifiers.shift);
                None
            }
            InputEvent::PointerUp { x, y, modifiers } => self.release(fg, Point::new(*x, *y), modifiers.shift),
            InputEvent::Key { .. } => None,
        }
    }

    /// Abort the gesture in progress. A drag puts every block back where it
    /// started; nothing is recorded.
    pub fn cancel(&mut self, fg: &mut Flowgraph) {
        if let ToolState::Dragging { start, .. } = std::mem::take(&mut self.state) {
            for (idx, _, position) in start {
                // A block removed mid-gesture has nothing to restore.
                let _ = fg.set_position(idx, position);
            }
        }
    }

    fn press(&mut self, fg: &mut Flowgraph, point: Point, shift: bool) {
        self.cancel(fg);
        match fg.hit_test(point) {
            Some(Hit::Port(port)) => {
                self.state = ToolState::Connecting { from: port, cursor: point };
            }
            Some(Hit::Block(idx)) => {
                let selected = fg.block(idx).is_some_and(|b| b.selected);
                if shift {
                    fg.set_selected(ElementRef::Block(idx), !selected);
                } else if !selected {
                    fg.select_only(&[ElementRef::Block(idx)]);
                }
                // Clicking an already-selected block keeps the selection for the drag.
                let start = fg
                    .selected_blocks()
                    .into_iter()
                    .filter_map(|i| fg.block(i).map(|b| (i, b.name, b.position)))
                    .collect();
                self.state = ToolState::Dragging { origin: point, start };
            }
            Some(Hit::Connection(edge)) => {
                let element = ElementRef::Connection(edge);
                if shift {
                    let selected = fg.connection(edge).is_some_and(|c| c.selected);
                    fg.set_selected(element, !selected);
                } else {
                    fg.select_only(&[element]);
                }
            }
            None => {
                if !shift {
                    fg.deselect_all();
                }
                self.state = ToolState::Marquee {
                    start: point,
                    current: point,
                    additive: shift,
                };
            }
        }
    }

    fn drag(&mut self, fg: &mut Flowgraph, point: Point, shift: bool) {
        match &mut self.state {
            ToolState::Dragging { origin, start } => {
                let delta = constrain(point - *origin, shift);
                for (idx, _, position) in start.iter() {
                    let _ = fg.set_position(*idx, *position + delta);
                }
            }
            ToolState::Connecting { cursor, .. } => *cursor = point,
            ToolState::Marquee { current, .. } => *current = point,
            ToolState::Idle => {}
        }
    }

    fn release(&mut self, fg: &mut Flowgraph, point: Point, shift: bool) -> Option<Command> {
        match std::mem::take(&mut self.state) {
            ToolState::Idle => None,
            ToolState::Dragging { origin, start } => {
                let delta = constrain(point - origin, shift);
                let mut moves = Vec::with_capacity(start.len());
                for (idx, block, from) in start {
                    let to = from + delta;
                    if fg.set_position(idx, to).is_ok() {
                        moves.push(BlockMove { block, from, to });
                    }
                }
                let command = Command::move_blocks(moves);
                if command.is_some() {
                    fg.update();
                }
                command
            }
            ToolState::Connecting { from, .. } => {
                let Some(Hit::Port(to)) = fg.hit_test(point) else {
                    return None;
                };
                let (source, sink) = match from.direction {
                    Direction::Source => (from, to),
                    Direction::Sink => (to, from),
                };
                match fg.connect(&source, &sink) {
                    Ok(edge) => {
                        let conn = fg.connection_data(edge)?;
                        Some(Command::NewElement {
                            data: FlowgraphData {
                                connections: vec![conn],
                                ..FlowgraphData::default()
                            },
                        })
                    }
                    Err(e) => {
                        log::debug!("connection rejected: {e}");
                        None
                    }
                }
            }
            ToolState::Marquee { start, additive, .. } => {
                let caught = fg.hit_test_rect(Rect::from_points(start, point));
                if additive {
                    caught.into_iter().for_each(|e| fg.select(e));
                } else {
                    fg.select_only(&caught);
                }
                None
            }
        }
    }
}

/// Shift-drag keeps only the dominant axis.
fn constrain(delta: Vec2, shift: bool) -> Vec2 {
    if !shift {
        delta
    } else if delta.x.abs() > delta.y.abs() {
        Vec2::new(delta.x, 0.0)
    } else {
        Vec2::new(0.0, delta.y)
    }
}
