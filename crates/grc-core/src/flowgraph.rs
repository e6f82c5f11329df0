//! The flowgraph arena: one open document's blocks and connections.
//!
//! Blocks are nodes and connections are edges of a `StableDiGraph`, with
//! edges pointing from the source block to the sink block. Stable indices
//! survive unrelated removals, so handles held by the editor stay valid.
//! Every structural mutation ends with [`Flowgraph::update`], which runs
//! rewrite → validate → layout in that order.

use crate::error::{ConnectionError, FlowgraphError};
use crate::id::BlockName;
use crate::layout::{self, LayoutConfig};
use crate::model::{
    Block, Connection, Direction, ElementRef, EnabledState, PortRef, Rotation,
};
use crate::registry::{BlockRegistry, OPTIONS_KEY, OPTIONS_NAME};
use crate::rules::{Diagnostic, DomainRules, Severity, StandardRules};
use kurbo::Point;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::HashMap;
use std::sync::Arc;

/// A flowgraph document.
#[derive(Debug, Clone)]
pub struct Flowgraph {
    /// Blocks (nodes) and connections (edges, source → sink).
    pub(crate) graph: StableDiGraph<Block, Connection>,

    /// Block name → arena index.
    pub(crate) name_index: HashMap<BlockName, NodeIndex>,

    /// The distinguished options block. Never removed.
    pub(crate) options: NodeIndex,

    pub(crate) registry: Arc<BlockRegistry>,
    pub(crate) rules: Arc<dyn DomainRules>,
    pub(crate) layout: LayoutConfig,

    /// Findings of the last `validate()`.
    diagnostics: Vec<Diagnostic>,

    /// Unsaved changes since load/save.
    dirty: bool,
}

/// `BlockNotFound` for an index with no block behind it.
pub fn block_not_found(idx: NodeIndex) -> FlowgraphError {
    FlowgraphError::BlockNotFound(format!("#{}", idx.index()))
}

impl Flowgraph {
    /// A flowgraph holding only the options block, checked by the standard rules.
    #[must_use]
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self::with_rules(registry, Arc::new(StandardRules), LayoutConfig::default())
    }

    #[must_use]
    pub fn with_rules(
        registry: Arc<BlockRegistry>,
        rules: Arc<dyn DomainRules>,
        layout: LayoutConfig,
    ) -> Self {
        let name = BlockName::intern(OPTIONS_NAME);
        let options_block = registry
            .get(OPTIONS_KEY)
            .map_or_else(|| Block::dummy(OPTIONS_KEY, name), |def| Block::from_type(def, name));

        let mut graph = StableDiGraph::new();
        let options = graph.add_node(options_block);
        let mut fg = Self {
            graph,
            name_index: HashMap::from([(name, options)]),
            options,
            registry,
            rules,
            layout,
            diagnostics: Vec::new(),
            dirty: false,
        };
        fg.update();
        fg
    }

    /// An empty flowgraph sharing this one's registry, rules and layout config.
    #[must_use]
    pub fn fresh(&self) -> Self {
        Self::with_rules(Arc::clone(&self.registry), Arc::clone(&self.rules), self.layout.clone())
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn set_layout_config(&mut self, layout: LayoutConfig) {
        self.layout = layout;
        self.recompute_layout();
    }

    pub fn options_block(&self) -> NodeIndex {
        self.options
    }

    pub fn block(&self, idx: NodeIndex) -> Option<&Block> {
        self.graph.node_weight(idx)
    }

    pub fn connection(&self, edge: EdgeIndex) -> Option<&Connection> {
        self.graph.edge_weight(edge)
    }

    /// `(source block, sink block)` of a connection.
    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (NodeIndex, &Block)> {
        self.graph.node_indices().map(move |idx| (idx, &self.graph[idx]))
    }

    /// `(edge, source block, sink block, connection)` for every connection.
    pub fn connections(
        &self,
    ) -> impl Iterator<Item = (EdgeIndex, NodeIndex, NodeIndex, &Connection)> {
        self.graph
            .edge_references()
            .map(|e| (e.id(), e.source(), e.target(), e.weight()))
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn index_of(&self, name: BlockName) -> Option<NodeIndex> {
        self.name_index.get(&name).copied()
    }

    pub fn block_by_name(&self, name: &str) -> Option<&Block> {
        self.index_of(BlockName::lookup(name)?).map(|idx| &self.graph[idx])
    }

    /// Every connection touching `idx`, incoming first.
    pub fn connections_of(&self, idx: NodeIndex) -> Vec<EdgeIndex> {
        let incoming = self.graph.edges_directed(idx, petgraph::Direction::Incoming);
        let outgoing = self.graph.edges_directed(idx, petgraph::Direction::Outgoing);
        incoming.chain(outgoing).map(|e| e.id()).collect()
    }

    /// The edge joining the two named ports, if any.
    pub fn find_connection(
        &self,
        source: NodeIndex,
        source_port: &str,
        sink: NodeIndex,
        sink_port: &str,
    ) -> Option<EdgeIndex> {
        self.graph
            .edges_connecting(source, sink)
            .find(|e| e.weight().source_port == source_port && e.weight().sink_port == sink_port)
            .map(|e| e.id())
    }

    /// A connection takes part in the flowgraph iff neither endpoint is disabled.
    pub fn connection_enabled(&self, edge: EdgeIndex) -> bool {
        self.endpoints(edge).is_some_and(|(s, t)| {
            self.graph[s].state.is_active() && self.graph[t].state.is_active()
        })
    }

    /// Enabled connections attached to one port.
    pub fn port_connection_count(&self, idx: NodeIndex, direction: Direction, key: &str) -> usize {
        let edge_dir = match direction {
            Direction::Sink => petgraph::Direction::Incoming,
            Direction::Source => petgraph::Direction::Outgoing,
        };
        self.graph
            .edges_directed(idx, edge_dir)
            .filter(|e| {
                let port = match direction {
                    Direction::Sink => &e.weight().sink_port,
                    Direction::Source => &e.weight().source_port,
                };
                port == key && self.connection_enabled(e.id())
            })
            .count()
    }

    /// The remembered state a bypassed block returns to.
    pub fn pre_bypass_state(&self, idx: NodeIndex) -> Option<EnabledState> {
        self.block(idx).map(Block::pre_bypass_state)
    }

    // ─── Naming ──────────────────────────────────────────────────────────

    /// `{base}_{n}` with the smallest `n ≥ 0` not already taken.
    /// Only the returned name is interned.
    pub fn unique_name(&self, base: &str) -> BlockName {
        let mut n = 0;
        loop {
            let candidate = format!("{base}_{n}");
            if !self.is_name_taken(&candidate) {
                return BlockName::intern(&candidate);
            }
            n += 1;
        }
    }

    /// Whether a block in this flowgraph is called `name`.
    pub fn is_name_taken(&self, name: &str) -> bool {
        BlockName::lookup(name).is_some_and(|n| self.name_index.contains_key(&n))
    }

    /// `wanted` itself when free, otherwise the first free `{wanted}_{n}`.
    fn resolve_name(&self, wanted: &str) -> BlockName {
        if self.is_name_taken(wanted) {
            self.unique_name(wanted)
        } else {
            BlockName::intern(wanted)
        }
    }

    // ─── Structural mutation ─────────────────────────────────────────────

    /// Place a block without running the update cycle. A name collision is
    /// resolved by renaming the incoming block.
    pub(crate) fn insert_block(&mut self, mut block: Block) -> NodeIndex {
        if self.name_index.contains_key(&block.name) {
            let renamed = self.resolve_name(block.name.as_str());
            log::warn!("block name {} already in use, renamed to {renamed}", block.name);
            block.name = renamed;
        }
        let name = block.name;
        let idx = self.graph.add_node(block);
        self.attach_ports(idx);
        self.name_index.insert(name, idx);
        idx
    }

    /// Point every port's back-reference at its owning block.
    fn attach_ports(&mut self, idx: NodeIndex) {
        let block = &mut self.graph[idx];
        for port in block.sinks.iter_mut().chain(block.sources.iter_mut()) {
            port.block = idx;
        }
    }

    /// Instantiate `type_key` at `position` under a fresh `{type_key}_{n}` name.
    ///
    /// # Errors
    /// `UnknownBlockType` for an unregistered key, `OptionsBlockExists` for a
    /// second options block. The flowgraph is unchanged on error.
    pub fn add_block(&mut self, type_key: &str, position: Point) -> Result<NodeIndex, FlowgraphError> {
        let def = self
            .registry
            .get(type_key)
            .ok_or_else(|| FlowgraphError::UnknownBlockType(type_key.to_string()))?;
        if type_key == OPTIONS_KEY {
            return Err(FlowgraphError::OptionsBlockExists);
        }

        let mut block = Block::from_type(def, self.unique_name(type_key));
        block.position = position;
        let idx = self.insert_block(block);
        log::debug!("added block {}", self.graph[idx].name);

        self.dirty = true;
        self.update();
        Ok(idx)
    }

    /// Remove a block (with every connection touching it) or a connection.
    /// Removing the options block is a no-op. Returns whether anything changed.
    pub fn remove_element(&mut self, element: ElementRef) -> bool {
        let removed = match element {
            ElementRef::Block(idx) if idx == self.options => {
                log::debug!("the options block cannot be removed");
                false
            }
            ElementRef::Block(idx) => match self.graph.remove_node(idx) {
                Some(block) => {
                    self.name_index.remove(&block.name);
                    log::debug!("removed block {}", block.name);
                    true
                }
                None => false,
            },
            ElementRef::Connection(edge) => self.graph.remove_edge(edge).is_some(),
        };
        if removed {
            self.dirty = true;
            self.update();
        }
        removed
    }

    /// Join a source port to a sink port.
    ///
    /// # Errors
    /// `InvalidConnection` when the directions are wrong, both ports belong to
    /// the same block, the pair is already connected, or the (stream) sink
    /// already has an incoming connection. `BlockNotFound`/`PortNotFound` for
    /// dangling handles.
    pub fn connect(&mut self, source: &PortRef, sink: &PortRef) -> Result<EdgeIndex, FlowgraphError> {
        if source.direction != Direction::Source {
            return Err(ConnectionError::NotASource.into());
        }
        if sink.direction != Direction::Sink {
            return Err(ConnectionError::NotASink.into());
        }
        if source.block == sink.block {
            return Err(ConnectionError::SameBlock.into());
        }

        let src_block = self.block(source.block).ok_or_else(|| block_not_found(source.block))?;
        let sink_block = self.block(sink.block).ok_or_else(|| block_not_found(sink.block))?;
        if src_block.port(Direction::Source, &source.key).is_none() {
            return Err(FlowgraphError::PortNotFound {
                block: src_block.name.to_string(),
                port: source.key.clone(),
            });
        }
        let Some(sink_port) = sink_block.port(Direction::Sink, &sink.key) else {
            return Err(FlowgraphError::PortNotFound {
                block: sink_block.name.to_string(),
                port: sink.key.clone(),
            });
        };

        if self
            .find_connection(source.block, &source.key, sink.block, &sink.key)
            .is_some()
        {
            return Err(ConnectionError::AlreadyConnected.into());
        }
        let occupied = self
            .graph
            .edges_directed(sink.block, petgraph::Direction::Incoming)
            .any(|e| e.weight().sink_port == sink.key);
        if occupied && !sink_port.is_message() {
            return Err(ConnectionError::SinkOccupied.into());
        }

        let edge = self.graph.add_edge(
            source.block,
            sink.block,
            Connection::new(source.key.clone(), sink.key.clone()),
        );
        log::debug!(
            "connected {}:{} -> {}:{}",
            self.graph[source.block].name,
            source.key,
            self.graph[sink.block].name,
            sink.key
        );
        self.dirty = true;
        self.update();
        Ok(edge)
    }

    pub fn disconnect(&mut self, edge: EdgeIndex) -> bool {
        self.remove_element(ElementRef::Connection(edge))
    }

    /// Add an edge without the connect-time checks (restoring saved state).
    pub(crate) fn insert_connection(
        &mut self,
        source: NodeIndex,
        sink: NodeIndex,
        connection: Connection,
    ) -> EdgeIndex {
        self.graph.add_edge(source, sink, connection)
    }

    // ─── Block edits ─────────────────────────────────────────────────────

    /// Rename a block. A taken name resolves to `{wanted}_{n}`; the name
    /// actually given is returned.
    pub fn rename_block(&mut self, idx: NodeIndex, wanted: &str) -> Result<BlockName, FlowgraphError> {
        let current = self.block(idx).ok_or_else(|| block_not_found(idx))?.name;
        if current.as_str() == wanted {
            return Ok(current);
        }
        self.name_index.remove(&current);
        let name = self.resolve_name(wanted);
        if name.as_str() != wanted {
            log::warn!("block name {wanted} already in use, renamed to {name}");
        }
        self.graph[idx].name = name;
        self.name_index.insert(name, idx);
        log::debug!("renamed block {current} to {name}");

        self.dirty = true;
        self.update();
        Ok(name)
    }

    /// Set a parameter value, returning the previous one.
    pub fn set_param(&mut self, idx: NodeIndex, key: &str, value: &str) -> Result<String, FlowgraphError> {
        let block = self.graph.node_weight_mut(idx).ok_or_else(|| block_not_found(idx))?;
        let name = block.name;
        let param = block.param_mut(key).ok_or_else(|| FlowgraphError::ParamNotFound {
            block: name.to_string(),
            param: key.to_string(),
        })?;
        let old = std::mem::replace(&mut param.value, value.to_string());

        self.dirty = true;
        self.update();
        Ok(old)
    }

    /// Set the enable state, returning the previous one. Entering `Bypassed`
    /// remembers the state to return to.
    pub fn set_state(&mut self, idx: NodeIndex, state: EnabledState) -> Result<EnabledState, FlowgraphError> {
        let block = self.graph.node_weight_mut(idx).ok_or_else(|| block_not_found(idx))?;
        let old = block.state;
        if state == EnabledState::Bypassed && old != EnabledState::Bypassed {
            block.unbypassed_state = old;
        }
        block.state = state;

        self.dirty = true;
        self.update();
        Ok(old)
    }

    /// Put back a state together with the remembered pre-bypass state,
    /// exactly as captured. Used when undoing a state change.
    pub fn restore_state(
        &mut self,
        idx: NodeIndex,
        state: EnabledState,
        pre_bypass: EnabledState,
    ) -> Result<(), FlowgraphError> {
        let block = self.graph.node_weight_mut(idx).ok_or_else(|| block_not_found(idx))?;
        block.state = state;
        block.unbypassed_state = pre_bypass;

        self.dirty = true;
        self.update();
        Ok(())
    }

    /// Move a block, returning its previous position. Only layout is
    /// recomputed; the flowgraph is not marked dirty, so the editor can use
    /// this for provisional drag positions.
    pub fn set_position(&mut self, idx: NodeIndex, position: Point) -> Result<Point, FlowgraphError> {
        let block = self.graph.node_weight_mut(idx).ok_or_else(|| block_not_found(idx))?;
        let old = std::mem::replace(&mut block.position, position);
        self.recompute_layout();
        Ok(old)
    }

    pub fn set_rotation(&mut self, idx: NodeIndex, rotation: Rotation) -> Result<Rotation, FlowgraphError> {
        let block = self.graph.node_weight_mut(idx).ok_or_else(|| block_not_found(idx))?;
        let old = std::mem::replace(&mut block.rotation, rotation);
        self.dirty = true;
        self.recompute_layout();
        Ok(old)
    }

    /// Toggle the bus port on one side of a block, returning the previous flag.
    pub fn set_bus(&mut self, idx: NodeIndex, direction: Direction, on: bool) -> Result<bool, FlowgraphError> {
        let block = self.graph.node_weight_mut(idx).ok_or_else(|| block_not_found(idx))?;
        let flag = match direction {
            Direction::Sink => &mut block.bus_sink,
            Direction::Source => &mut block.bus_source,
        };
        let old = std::mem::replace(flag, on);
        self.dirty = true;
        self.update();
        Ok(old)
    }

    // ─── Selection ───────────────────────────────────────────────────────

    pub fn set_selected(&mut self, element: ElementRef, selected: bool) {
        match element {
            ElementRef::Block(idx) => {
                if let Some(block) = self.graph.node_weight_mut(idx) {
                    block.selected = selected;
                }
            }
            ElementRef::Connection(edge) => {
                if let Some(conn) = self.graph.edge_weight_mut(edge) {
                    conn.selected = selected;
                }
            }
        }
        self.recompute_layout();
    }

    pub fn select(&mut self, element: ElementRef) {
        self.set_selected(element, true);
    }

    pub fn deselect_all(&mut self) {
        self.graph.node_weights_mut().for_each(|b| b.selected = false);
        self.graph.edge_weights_mut().for_each(|c| c.selected = false);
        self.recompute_layout();
    }

    pub fn select_all(&mut self) {
        self.graph.node_weights_mut().for_each(|b| b.selected = true);
        self.graph.edge_weights_mut().for_each(|c| c.selected = true);
        self.recompute_layout();
    }

    /// Replace the selection.
    pub fn select_only(&mut self, elements: &[ElementRef]) {
        self.graph.node_weights_mut().for_each(|b| b.selected = false);
        self.graph.edge_weights_mut().for_each(|c| c.selected = false);
        for element in elements {
            match *element {
                ElementRef::Block(idx) => {
                    if let Some(block) = self.graph.node_weight_mut(idx) {
                        block.selected = true;
                    }
                }
                ElementRef::Connection(edge) => {
                    if let Some(conn) = self.graph.edge_weight_mut(edge) {
                        conn.selected = true;
                    }
                }
            }
        }
        self.recompute_layout();
    }

    pub fn selected_blocks(&self) -> Vec<NodeIndex> {
        self.blocks().filter(|(_, b)| b.selected).map(|(idx, _)| idx).collect()
    }

    pub fn selected_connections(&self) -> Vec<EdgeIndex> {
        self.connections().filter(|(.., c)| c.selected).map(|(e, ..)| e).collect()
    }

    // ─── Update cycle ────────────────────────────────────────────────────

    /// Normalize derived block state (ports from parameter templates, bus ports).
    pub fn rewrite(&mut self) {
        let rules = Arc::clone(&self.rules);
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for idx in indices {
            rules.rewrite_block(&mut self.graph[idx]);
            self.attach_ports(idx);
        }
    }

    /// Run the domain rules and cache error messages on each element.
    /// Does not change graph structure.
    pub fn validate(&mut self) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        self.rules.validate(self, &mut diags);

        self.graph.node_weights_mut().for_each(|b| b.errors.clear());
        self.graph.edge_weights_mut().for_each(|c| c.errors.clear());
        for diag in diags.iter().filter(|d| d.severity == Severity::Error) {
            let errors = match diag.element {
                ElementRef::Block(idx) => self.graph.node_weight_mut(idx).map(|b| &mut b.errors),
                ElementRef::Connection(edge) => self.graph.edge_weight_mut(edge).map(|c| &mut c.errors),
            };
            if let Some(errors) = errors {
                errors.push(diag.message.clone());
            }
        }

        self.diagnostics.clone_from(&diags);
        diags
    }

    /// Recompute block sizes, port placement, colors and connection paths.
    pub fn recompute_layout(&mut self) {
        for block in self.graph.node_weights_mut() {
            layout::layout_block(block, &self.layout);
        }

        let edges: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for edge in edges {
            let Some((s, t)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let enabled = self.connection_enabled(edge);
            let conn = &self.graph[edge];
            let (source, sink) = (&self.graph[s], &self.graph[t]);
            let mut path = match (
                source.port(Direction::Source, &conn.source_port),
                sink.port(Direction::Sink, &conn.sink_port),
            ) {
                (Some(sp), Some(kp)) => layout::connection_path(source, sp, sink, kp, &self.layout),
                _ => layout::detached_path(source, sink),
            };
            path.color = layout::connection_color(conn.selected, enabled, conn.is_valid());
            self.graph[edge].path = path;
        }
    }

    /// The canonical post-edit cycle: rewrite, then validate, then layout.
    pub fn update(&mut self) {
        self.rewrite();
        self.validate();
        self.recompute_layout();
    }

    // ─── State ───────────────────────────────────────────────────────────

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// True iff the last validation reported no errors.
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn reset_dirty(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<BlockRegistry> {
        Arc::new(
            BlockRegistry::from_json(
                r#"[
                    { "id": "src", "outputs": [{ "dtype": "float" }] },
                    { "id": "snk", "inputs": [{ "dtype": "float" }] }
                ]"#,
            )
            .unwrap(),
        )
    }

    #[test]
    fn new_flowgraph_has_only_options() {
        let fg = Flowgraph::new(registry());
        assert_eq!(fg.block_count(), 1);
        assert_eq!(fg.block(fg.options_block()).unwrap().name.as_str(), OPTIONS_NAME);
        assert!(fg.is_valid());
        assert!(!fg.is_dirty());
    }

    #[test]
    fn unique_name_fills_gaps() {
        let mut fg = Flowgraph::new(registry());
        let a = fg.add_block("src", Point::ZERO).unwrap();
        fg.add_block("src", Point::ZERO).unwrap();
        fg.remove_element(ElementRef::Block(a));
        assert_eq!(fg.unique_name("src").as_str(), "src_0");
    }

    #[test]
    fn second_options_block_rejected() {
        let mut fg = Flowgraph::new(registry());
        assert_eq!(
            fg.add_block(OPTIONS_KEY, Point::ZERO).unwrap_err(),
            FlowgraphError::OptionsBlockExists
        );
    }

    #[test]
    fn rename_collision_is_resolved() {
        let mut fg = Flowgraph::new(registry());
        fg.add_block("src", Point::ZERO).unwrap();
        let b = fg.add_block("src", Point::ZERO).unwrap();
        let name = fg.rename_block(b, "src_0").unwrap();
        assert_eq!(name.as_str(), "src_0_0");
        assert_eq!(fg.index_of(name), Some(b));
        assert!(fg.block_by_name("src_1").is_none());
    }

    #[test]
    fn bypass_remembers_previous_state() {
        let mut fg = Flowgraph::new(registry());
        let a = fg.add_block("src", Point::ZERO).unwrap();
        fg.set_state(a, EnabledState::Disabled).unwrap();
        fg.set_state(a, EnabledState::Bypassed).unwrap();
        assert_eq!(fg.pre_bypass_state(a), Some(EnabledState::Disabled));
    }

    #[test]
    fn ports_point_back_at_their_block() {
        let mut fg = Flowgraph::new(registry());
        let a = fg.add_block("snk", Point::ZERO).unwrap();
        assert_eq!(fg.block(a).unwrap().sinks[0].block, a);
    }
}
