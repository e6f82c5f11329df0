//! Undo/Redo command stack.
//!
//! Every edit is wrapped in a reversible `Command` that captures enough state
//! to apply it and to exactly reverse it. Commands are pushed to a linear
//! history; undo walks the cursor back and applies the inverse.
//!
//! Commands address blocks by [`BlockName`], not arena index: a block that is
//! deleted and restored comes back under a new index but the same name.

use grc_core::{
    Block, BlockName, ConnectionScope, Direction, ElementRef, EnabledState, Flowgraph, FlowgraphData,
    FlowgraphError, NodeIndex, Point, Rect, Rotation, block_not_found, rotate_point,
};

/// One block's position before and after a move gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMove {
    pub block: BlockName,
    pub from: Point,
    pub to: Point,
}

/// One block's enable state before and after a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub block: BlockName,
    pub from: EnabledState,
    pub to: EnabledState,
    /// The remembered pre-bypass state before the change; undo puts it back.
    pub pre_bypass: EnabledState,
}

impl StateChange {
    fn of(block: &Block, to: EnabledState) -> Self {
        Self {
            block: block.name,
            from: block.state,
            to,
            pre_bypass: block.pre_bypass_state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamChange {
    pub key: String,
    pub from: String,
    pub to: String,
}

/// A reversible edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// All blocks moved by one drag gesture.
    Move { moves: Vec<BlockMove> },
    /// Quarter-turn rotation of a group about a fixed pivot.
    Rotate {
        blocks: Vec<BlockName>,
        delta: i32,
        pivot: Point,
    },
    /// Blocks and/or connections created from a snapshot (add, paste, connect).
    NewElement { data: FlowgraphData },
    /// Blocks and/or connections removed; the snapshot includes every
    /// connection incident to a removed block.
    DeleteElement { data: FlowgraphData },
    Bypass { changes: Vec<StateChange> },
    /// Enable/disable.
    ChangeState { changes: Vec<StateChange> },
    ChangeParams {
        block: BlockName,
        changes: Vec<ParamChange>,
    },
    Rename { from: BlockName, to: BlockName },
    /// Fold a block side's stream ports into a bus port (or unfold it).
    Bussify {
        block: BlockName,
        direction: Direction,
        on: bool,
    },
}

fn lookup(fg: &Flowgraph, name: BlockName) -> Result<NodeIndex, FlowgraphError> {
    fg.index_of(name)
        .ok_or_else(|| FlowgraphError::BlockNotFound(name.to_string()))
}

impl Command {
    /// A move of the blocks whose position actually changed; `None` when
    /// the gesture had no net displacement.
    pub fn move_blocks(moves: impl IntoIterator<Item = BlockMove>) -> Option<Self> {
        let moves: Vec<BlockMove> = moves.into_iter().filter(|m| m.from != m.to).collect();
        (!moves.is_empty()).then_some(Command::Move { moves })
    }

    /// Rotate `blocks` by `delta` degrees (a non-zero multiple of 90) about
    /// the center of their positions' bounding box.
    pub fn rotate(fg: &Flowgraph, blocks: &[NodeIndex], delta: i32) -> Option<Self> {
        // Stored normalized to 90/180/270 so the inverse can negate it.
        let delta = i32::from(Rotation::from_degrees(delta)?.degrees());
        if delta == 0 {
            return None;
        }
        let members: Vec<(BlockName, Point)> = blocks
            .iter()
            .filter_map(|idx| fg.block(*idx))
            .map(|b| (b.name, b.position))
            .collect();
        let (_, first) = *members.first()?;
        let bounds = members
            .iter()
            .fold(Rect::from_points(first, first), |r, (_, p)| r.union_pt(*p));
        Some(Command::Rotate {
            blocks: members.into_iter().map(|(name, _)| name).collect(),
            delta,
            pivot: bounds.center(),
        })
    }

    /// Snapshot the given blocks (never the options block) with all their
    /// connections, plus the given connections.
    pub fn delete(fg: &Flowgraph, elements: &[ElementRef]) -> Option<Self> {
        let options = fg.options_block();
        let blocks: Vec<NodeIndex> = elements
            .iter()
            .filter_map(|e| match e {
                ElementRef::Block(idx) if *idx != options => Some(*idx),
                _ => None,
            })
            .collect();
        let mut data = fg.export_subgraph(&blocks, ConnectionScope::Incident);
        for element in elements {
            if let ElementRef::Connection(edge) = element {
                if let Some(conn) = fg.connection_data(*edge) {
                    if !data.connections.contains(&conn) {
                        data.connections.push(conn);
                    }
                }
            }
        }
        data.connections.sort();
        (!data.is_empty()).then_some(Command::DeleteElement { data })
    }

    /// Bypass every eligible block, or, when all of them already are,
    /// return each to the state it had before being bypassed.
    pub fn toggle_bypass(fg: &Flowgraph, blocks: &[NodeIndex]) -> Option<Self> {
        let targets: Vec<_> = blocks
            .iter()
            .filter_map(|idx| fg.block(*idx).map(|b| (*idx, b)))
            .filter(|(_, b)| b.can_bypass() || b.state == EnabledState::Bypassed)
            .collect();
        if targets.is_empty() {
            return None;
        }
        let restore = targets.iter().all(|(_, b)| b.state == EnabledState::Bypassed);

        let changes: Vec<StateChange> = targets
            .iter()
            .filter_map(|(idx, b)| {
                let to = if restore {
                    fg.pre_bypass_state(*idx).unwrap_or_default()
                } else {
                    EnabledState::Bypassed
                };
                (b.state != to).then_some(StateChange::of(b, to))
            })
            .collect();
        (!changes.is_empty()).then_some(Command::Bypass { changes })
    }

    /// Set `state` on every block (except the options block) not already in it.
    pub fn change_state(fg: &Flowgraph, blocks: &[NodeIndex], state: EnabledState) -> Option<Self> {
        let changes: Vec<StateChange> = blocks
            .iter()
            .filter_map(|idx| fg.block(*idx))
            .filter(|b| !b.is_options() && b.state != state)
            .map(|b| StateChange::of(b, state))
            .collect();
        (!changes.is_empty()).then_some(Command::ChangeState { changes })
    }

    /// # Errors
    /// `BlockNotFound`/`ParamNotFound` for unknown targets.
    pub fn change_params(
        fg: &Flowgraph,
        idx: NodeIndex,
        values: &[(&str, &str)],
    ) -> Result<Option<Self>, FlowgraphError> {
        let block = fg
            .block(idx)
            .ok_or_else(|| block_not_found(idx))?;
        let mut changes = Vec::new();
        for (key, value) in values {
            let current = block.param_value(key).ok_or_else(|| FlowgraphError::ParamNotFound {
                block: block.name.to_string(),
                param: (*key).to_string(),
            })?;
            if current != *value {
                changes.push(ParamChange {
                    key: (*key).to_string(),
                    from: current.to_string(),
                    to: (*value).to_string(),
                });
            }
        }
        Ok((!changes.is_empty()).then_some(Command::ChangeParams { block: block.name, changes }))
    }

    /// The name is resolved up front (`{wanted}_{n}` when taken) so the
    /// command replays to the same name.
    ///
    /// # Errors
    /// `BlockNotFound` for a stale index.
    pub fn rename(fg: &Flowgraph, idx: NodeIndex, wanted: &str) -> Result<Option<Self>, FlowgraphError> {
        let block = fg
            .block(idx)
            .ok_or_else(|| block_not_found(idx))?;
        if block.name.as_str() == wanted {
            return Ok(None);
        }
        let to = if fg.is_name_taken(wanted) {
            fg.unique_name(wanted)
        } else {
            BlockName::intern(wanted)
        };
        Ok(Some(Command::Rename { from: block.name, to }))
    }

    /// # Errors
    /// `BlockNotFound` for a stale index.
    pub fn toggle_bus(fg: &Flowgraph, idx: NodeIndex, direction: Direction) -> Result<Self, FlowgraphError> {
        let block = fg
            .block(idx)
            .ok_or_else(|| block_not_found(idx))?;
        Ok(Command::Bussify {
            block: block.name,
            direction,
            on: !block.is_bussified(direction),
        })
    }

    /// Short human-readable label for undo/redo menus.
    pub fn description(&self) -> &'static str {
        match self {
            Command::Move { .. } => "Move",
            Command::Rotate { .. } => "Rotate",
            Command::NewElement { .. } => "Add",
            Command::DeleteElement { .. } => "Delete",
            Command::Bypass { .. } => "Bypass",
            Command::ChangeState { .. } => "Change state",
            Command::ChangeParams { .. } => "Change parameters",
            Command::Rename { .. } => "Rename",
            Command::Bussify { .. } => "Toggle bus",
        }
    }

    /// # Errors
    /// A block or connection the command names no longer exists; the
    /// flowgraph is left unchanged.
    pub fn apply(&self, fg: &mut Flowgraph) -> Result<(), FlowgraphError> {
        self.run(fg, true)
    }

    /// # Errors
    /// See [`Command::apply`].
    pub fn apply_inverse(&self, fg: &mut Flowgraph) -> Result<(), FlowgraphError> {
        self.run(fg, false)
    }

    fn run(&self, fg: &mut Flowgraph, forward: bool) -> Result<(), FlowgraphError> {
        match self {
            Command::Move { moves } => {
                let targets = moves
                    .iter()
                    .map(|m| lookup(fg, m.block).map(|idx| (idx, if forward { m.to } else { m.from })))
                    .collect::<Result<Vec<_>, _>>()?;
                for (idx, position) in targets {
                    fg.set_position(idx, position)?;
                }
            }
            Command::Rotate { blocks, delta, pivot } => {
                let delta = if forward { *delta } else { -*delta };
                let turn = Rotation::default().rotated(delta);
                let targets = blocks
                    .iter()
                    .map(|name| lookup(fg, *name))
                    .collect::<Result<Vec<_>, _>>()?;
                for idx in targets {
                    let Some(block) = fg.block(idx) else { continue };
                    let position = rotate_point(block.position, *pivot, turn);
                    let rotation = block.rotation.rotated(delta);
                    fg.set_position(idx, position)?;
                    fg.set_rotation(idx, rotation)?;
                }
            }
            Command::NewElement { data } if forward => insert(fg, data),
            Command::NewElement { data } => fg.remove_subgraph(data)?,
            Command::DeleteElement { data } if forward => fg.remove_subgraph(data)?,
            Command::DeleteElement { data } => insert(fg, data),
            Command::Bypass { changes } | Command::ChangeState { changes } => {
                let targets = changes
                    .iter()
                    .map(|c| lookup(fg, c.block).map(|idx| (idx, c)))
                    .collect::<Result<Vec<_>, _>>()?;
                for (idx, change) in targets {
                    if forward {
                        fg.set_state(idx, change.to)?;
                    } else {
                        fg.restore_state(idx, change.from, change.pre_bypass)?;
                    }
                }
            }
            Command::ChangeParams { block, changes } => {
                let idx = lookup(fg, *block)?;
                for change in changes {
                    let value = if forward { &change.to } else { &change.from };
                    fg.set_param(idx, &change.key, value)?;
                }
            }
            Command::Rename { from, to } => {
                let (current, wanted) = if forward { (*from, *to) } else { (*to, *from) };
                let idx = lookup(fg, current)?;
                // Replay must land on the recorded name or later commands lose the block.
                if fg.index_of(wanted).is_some() {
                    return Err(FlowgraphError::NameInUse(wanted.to_string()));
                }
                fg.rename_block(idx, wanted.as_str())?;
            }
            Command::Bussify { block, direction, on } => {
                let idx = lookup(fg, *block)?;
                fg.set_bus(idx, *direction, if forward { *on } else { !*on })?;
            }
        }
        fg.update();
        Ok(())
    }
}

/// Re-create a snapshot and make it the selection.
fn insert(fg: &mut Flowgraph, data: &FlowgraphData) {
    let mut selection: Vec<ElementRef> = fg
        .insert_subgraph(data)
        .into_iter()
        .map(ElementRef::Block)
        .collect();
    selection.extend(
        data.connections
            .iter()
            .filter_map(|c| fg.find_connection_data(c))
            .map(ElementRef::Connection),
    );
    fg.select_only(&selection);
}

/// Linear undo history: commands below `cursor` are done, the rest redoable.
#[derive(Debug, Clone)]
pub struct CommandStack {
    history: Vec<Command>,
    cursor: usize,
    /// Maximum undo depth.
    max_depth: usize,
}

impl Default for CommandStack {
    fn default() -> Self {
        Self::new(100)
    }
}

impl CommandStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            history: Vec::new(),
            cursor: 0,
            max_depth,
        }
    }

    /// Apply `command` and append it to the history, discarding the redo tail.
    ///
    /// # Errors
    /// The command could not be applied; the history is unchanged.
    pub fn push(&mut self, fg: &mut Flowgraph, command: Command) -> Result<(), FlowgraphError> {
        command.apply(fg)?;
        self.record(fg, command);
        Ok(())
    }

    /// Append a command whose effect is already on the flowgraph.
    pub fn record(&mut self, fg: &mut Flowgraph, command: Command) {
        log::debug!("push {}", command.description());
        self.history.truncate(self.cursor);
        self.history.push(command);
        if self.history.len() > self.max_depth {
            let excess = self.history.len() - self.max_depth;
            self.history.drain(..excess);
        }
        self.cursor = self.history.len();
        fg.mark_dirty();
    }

    /// Undo the last done command, returning its description. A no-op
    /// returning `None` when nothing is left to undo.
    ///
    /// # Errors
    /// The inverse could not be applied; the cursor does not move.
    pub fn undo(&mut self, fg: &mut Flowgraph) -> Result<Option<&'static str>, FlowgraphError> {
        let Some(command) = self.cursor.checked_sub(1).and_then(|i| self.history.get(i)) else {
            return Ok(None);
        };
        command.apply_inverse(fg)?;
        let description = command.description();
        log::debug!("undo {description}");
        self.cursor -= 1;
        fg.mark_dirty();
        Ok(Some(description))
    }

    /// Redo the next undone command, returning its description.
    ///
    /// # Errors
    /// The command could not be re-applied; the cursor does not move.
    pub fn redo(&mut self, fg: &mut Flowgraph) -> Result<Option<&'static str>, FlowgraphError> {
        let Some(command) = self.history.get(self.cursor) else {
            return Ok(None);
        };
        command.apply(fg)?;
        let description = command.description();
        log::debug!("redo {description}");
        self.cursor += 1;
        fg.mark_dirty();
        Ok(Some(description))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.history.len()
    }

    pub fn undo_text(&self) -> Option<&'static str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.history.get(i))
            .map(Command::description)
    }

    pub fn redo_text(&self) -> Option<&'static str> {
        self.history.get(self.cursor).map(Command::description)
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
