//! One open document: a flowgraph, its undo history, a clipboard buffer and
//! the pointer tool.
//!
//! This is the command surface a GUI shell talks to. Every edit that should
//! be undoable goes through the command stack from here; selection changes
//! and provisional drag positions do not.

use crate::clipboard::ClipboardData;
use crate::commands::{Command, CommandStack};
use crate::config::EditorConfig;
use crate::input::InputEvent;
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::tools::SelectTool;
use grc_core::{
    BlockName, BlockRegistry, ConnectionScope, Direction, EdgeIndex, ElementRef, EnabledState,
    Flowgraph, FlowgraphData, FlowgraphError, NodeIndex, Point, PortRef,
};
use std::sync::Arc;

/// The editing session for one flowgraph.
#[derive(Debug)]
pub struct Session {
    flowgraph: Flowgraph,
    commands: CommandStack,
    clipboard: Option<ClipboardData>,
    tool: SelectTool,
    config: EditorConfig,
}

impl Session {
    /// A session on an empty flowgraph (options block only).
    pub fn new(registry: Arc<BlockRegistry>, config: EditorConfig) -> Self {
        let mut flowgraph = Flowgraph::new(registry);
        flowgraph.set_layout_config(config.layout.clone());
        Self::with_flowgraph(flowgraph, config)
    }

    fn with_flowgraph(flowgraph: Flowgraph, config: EditorConfig) -> Self {
        Self {
            flowgraph,
            commands: CommandStack::new(config.max_undo_depth),
            clipboard: None,
            tool: SelectTool::new(),
            config,
        }
    }

    /// Open a JSON document.
    ///
    /// # Errors
    /// Malformed document.
    pub fn load(registry: Arc<BlockRegistry>, config: EditorConfig, text: &str) -> Result<Self, FlowgraphError> {
        let mut flowgraph = Flowgraph::from_json(registry, text)?;
        flowgraph.set_layout_config(config.layout.clone());
        log::debug!("loaded flowgraph with {} blocks", flowgraph.block_count());
        Ok(Self::with_flowgraph(flowgraph, config))
    }

    /// Serialize the document and clear the dirty flag. The undo history is
    /// kept.
    ///
    /// # Errors
    /// Serialization failure; the flowgraph stays dirty.
    pub fn save(&mut self) -> Result<String, FlowgraphError> {
        let text = self.flowgraph.to_json()?;
        self.flowgraph.reset_dirty();
        Ok(text)
    }

    pub fn flowgraph(&self) -> &Flowgraph {
        &self.flowgraph
    }

    pub fn commands(&self) -> &CommandStack {
        &self.commands
    }

    pub fn tool(&self) -> &SelectTool {
        &self.tool
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn is_valid(&self) -> bool {
        self.flowgraph.is_valid()
    }

    pub fn is_dirty(&self) -> bool {
        self.flowgraph.is_dirty()
    }

    // ─── Selection ───────────────────────────────────────────────────────

    pub fn select(&mut self, elements: &[ElementRef]) {
        self.flowgraph.select_only(elements);
    }

    pub fn select_all(&mut self) {
        self.flowgraph.select_all();
    }

    pub fn deselect_all(&mut self) {
        self.flowgraph.deselect_all();
    }

    // ─── Structural edits ────────────────────────────────────────────────

    /// Add a block and select it.
    ///
    /// # Errors
    /// `UnknownBlockType`, `OptionsBlockExists`.
    pub fn add_block(&mut self, type_key: &str, position: Point) -> Result<NodeIndex, FlowgraphError> {
        let idx = self.flowgraph.add_block(type_key, position)?;
        let data = self.flowgraph.export_subgraph(&[idx], ConnectionScope::Internal);
        self.commands
            .record(&mut self.flowgraph, Command::NewElement { data });
        self.flowgraph.select_only(&[ElementRef::Block(idx)]);
        Ok(idx)
    }

    /// Connect two ports under the connect-time rules.
    ///
    /// # Errors
    /// See [`Flowgraph::connect`].
    pub fn connect(&mut self, source: &PortRef, sink: &PortRef) -> Result<EdgeIndex, FlowgraphError> {
        let edge = self.flowgraph.connect(source, sink)?;
        if let Some(conn) = self.flowgraph.connection_data(edge) {
            let data = FlowgraphData {
                connections: vec![conn],
                ..FlowgraphData::default()
            };
            self.commands
                .record(&mut self.flowgraph, Command::NewElement { data });
        }
        Ok(edge)
    }

    /// Remove one element as an undoable step. Returns `false` for the
    /// options block or a stale handle.
    ///
    /// # Errors
    /// The removal could not be applied.
    pub fn remove_element(&mut self, element: ElementRef) -> Result<bool, FlowgraphError> {
        let command = Command::delete(&self.flowgraph, &[element]);
        self.push(command)
    }

    /// Remove the selected blocks (with their connections) and connections.
    ///
    /// # Errors
    /// The removal could not be applied.
    pub fn remove_selected(&mut self) -> Result<bool, FlowgraphError> {
        let command = Command::delete(&self.flowgraph, &self.selection());
        self.push(command)
    }

    /// Rotate the selected blocks by `delta` degrees about their common center.
    ///
    /// # Errors
    /// The rotation could not be applied.
    pub fn rotate_selection(&mut self, delta: i32) -> Result<bool, FlowgraphError> {
        let blocks = self.flowgraph.selected_blocks();
        let command = Command::rotate(&self.flowgraph, &blocks, delta);
        self.push(command)
    }

    /// # Errors
    /// The change could not be applied.
    pub fn toggle_bypass_selection(&mut self) -> Result<bool, FlowgraphError> {
        let blocks = self.flowgraph.selected_blocks();
        let command = Command::toggle_bypass(&self.flowgraph, &blocks);
        self.push(command)
    }

    /// Enable or disable the selected blocks.
    ///
    /// # Errors
    /// The change could not be applied.
    pub fn set_selection_state(&mut self, state: EnabledState) -> Result<bool, FlowgraphError> {
        let blocks = self.flowgraph.selected_blocks();
        let command = Command::change_state(&self.flowgraph, &blocks, state);
        self.push(command)
    }

    /// # Errors
    /// `BlockNotFound`, `ParamNotFound`.
    pub fn set_param(&mut self, idx: NodeIndex, key: &str, value: &str) -> Result<bool, FlowgraphError> {
        let command = Command::change_params(&self.flowgraph, idx, &[(key, value)])?;
        self.push(command)
    }

    /// Rename a block, returning the name actually given.
    ///
    /// # Errors
    /// `BlockNotFound`.
    pub fn rename(&mut self, idx: NodeIndex, wanted: &str) -> Result<BlockName, FlowgraphError> {
        if let Some(command) = Command::rename(&self.flowgraph, idx, wanted)? {
            self.commands.push(&mut self.flowgraph, command)?;
        }
        self.flowgraph
            .block(idx)
            .map(|b| b.name)
            .ok_or_else(|| grc_core::block_not_found(idx))
    }

    /// # Errors
    /// `BlockNotFound`.
    pub fn toggle_bus(&mut self, idx: NodeIndex, direction: Direction) -> Result<(), FlowgraphError> {
        let command = Command::toggle_bus(&self.flowgraph, idx, direction)?;
        self.commands.push(&mut self.flowgraph, command)
    }

    // ─── Clipboard ───────────────────────────────────────────────────────

    /// Copy the selected blocks and the connections among them. Returns
    /// whether anything was copied.
    pub fn copy_to_clipboard(&mut self) -> bool {
        let blocks = self.flowgraph.selected_blocks();
        let connections = self.flowgraph.selected_connections();
        match ClipboardData::copy(&self.flowgraph, &blocks, &connections) {
            Some(data) => {
                self.clipboard = Some(data);
                true
            }
            None => false,
        }
    }

    /// Paste the clipboard, shifted by the configured offset. The pasted
    /// elements become the selection.
    ///
    /// # Errors
    /// The paste could not be applied.
    pub fn paste_from_clipboard(&mut self) -> Result<bool, FlowgraphError> {
        let command = self
            .clipboard
            .as_ref()
            .and_then(|clip| clip.paste(&self.flowgraph, self.config.paste_offset));
        self.push(command)
    }

    /// Copy then remove the selection (one undo step for the removal).
    ///
    /// # Errors
    /// The removal could not be applied.
    pub fn cut(&mut self) -> Result<bool, FlowgraphError> {
        if !self.copy_to_clipboard() {
            return Ok(false);
        }
        self.remove_selected()
    }

    pub fn clipboard(&self) -> Option<&ClipboardData> {
        self.clipboard.as_ref()
    }

    /// Replace the clipboard, e.g. with a payload from another session.
    pub fn set_clipboard(&mut self, data: ClipboardData) {
        self.clipboard = Some(data);
    }

    // ─── History ─────────────────────────────────────────────────────────

    /// # Errors
    /// The inverse could not be applied.
    pub fn undo(&mut self) -> Result<Option<&'static str>, FlowgraphError> {
        self.tool.cancel(&mut self.flowgraph);
        self.commands.undo(&mut self.flowgraph)
    }

    /// # Errors
    /// The command could not be re-applied.
    pub fn redo(&mut self) -> Result<Option<&'static str>, FlowgraphError> {
        self.tool.cancel(&mut self.flowgraph);
        self.commands.redo(&mut self.flowgraph)
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Route a pointer event to the tool or a key event to its shortcut.
    /// Returns the shortcut action performed, if any.
    ///
    /// # Errors
    /// The resulting edit could not be applied.
    pub fn handle_event(&mut self, event: &InputEvent) -> Result<Option<ShortcutAction>, FlowgraphError> {
        if let InputEvent::Key { key, ctrl, shift, alt, meta } = event {
            let Some(action) = ShortcutMap::resolve(key, *ctrl, *shift, *alt, *meta) else {
                return Ok(None);
            };
            self.perform(action)?;
            return Ok(Some(action));
        }
        if let Some(command) = self.tool.handle(&mut self.flowgraph, event) {
            self.commands.record(&mut self.flowgraph, command);
        }
        Ok(None)
    }

    /// Run a shortcut action.
    ///
    /// # Errors
    /// The resulting edit could not be applied.
    pub fn perform(&mut self, action: ShortcutAction) -> Result<(), FlowgraphError> {
        let step = self.config.rotation_step;
        match action {
            ShortcutAction::Undo => {
                self.undo()?;
            }
            ShortcutAction::Redo => {
                self.redo()?;
            }
            ShortcutAction::Copy => {
                self.copy_to_clipboard();
            }
            ShortcutAction::Cut => {
                self.cut()?;
            }
            ShortcutAction::Paste => {
                self.paste_from_clipboard()?;
            }
            ShortcutAction::Delete => {
                self.remove_selected()?;
            }
            ShortcutAction::SelectAll => self.select_all(),
            ShortcutAction::Deselect => {
                self.tool.cancel(&mut self.flowgraph);
                self.deselect_all();
            }
            ShortcutAction::RotateLeft => {
                self.rotate_selection(step.saturating_neg())?;
            }
            ShortcutAction::RotateRight => {
                self.rotate_selection(step)?;
            }
            ShortcutAction::Enable => {
                self.set_selection_state(EnabledState::Enabled)?;
            }
            ShortcutAction::Disable => {
                self.set_selection_state(EnabledState::Disabled)?;
            }
            ShortcutAction::Bypass => {
                self.toggle_bypass_selection()?;
            }
        }
        Ok(())
    }

    fn selection(&self) -> Vec<ElementRef> {
        let blocks = self.flowgraph.selected_blocks().into_iter().map(ElementRef::Block);
        let connections = self
            .flowgraph
            .selected_connections()
            .into_iter()
            .map(ElementRef::Connection);
        blocks.chain(connections).collect()
    }

    fn push(&mut self, command: Option<Command>) -> Result<bool, FlowgraphError> {
        match command {
            Some(command) => {
                self.commands.push(&mut self.flowgraph, command)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
