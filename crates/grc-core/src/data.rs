//! Exported flowgraph data: the serialization hook of each element.
//!
//! The shape follows GNU Radio's `.grc` document (`name`/`id`/`parameters`/
//! `states` per block, `[src, src_port, snk, snk_port]` per connection) so
//! the host can map it onto its file format unchanged. The same records serve
//! as command snapshots and as the clipboard payload.

use crate::error::FlowgraphError;
use crate::flowgraph::Flowgraph;
use crate::id::BlockName;
use crate::model::{Block, Connection, Direction, EnabledState, Param, Port, Rotation};
use crate::registry::OPTIONS_KEY;
use kurbo::Point;
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// ─── Records ─────────────────────────────────────────────────────────────

/// Per-block placement and state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStates {
    pub bus_sink: bool,
    pub bus_source: bool,
    pub coordinate: (f64, f64),
    pub rotation: Rotation,
    pub state: EnabledState,
    /// State restored when bypass is toggled off; only written when it is
    /// not the default.
    #[serde(skip_serializing_if = "is_enabled")]
    pub pre_bypass: EnabledState,
}

fn is_enabled(state: &EnabledState) -> bool {
    *state == EnabledState::Enabled
}

/// One exported block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub name: BlockName,
    #[serde(rename = "id")]
    pub type_key: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub states: BlockStates,
}

impl BlockData {
    pub fn from_block(block: &Block) -> Self {
        Self {
            name: block.name,
            type_key: block.type_key.clone(),
            parameters: block
                .params
                .iter()
                .map(|p| (p.key.clone(), p.value.clone()))
                .collect(),
            states: BlockStates {
                bus_sink: block.bus_sink,
                bus_source: block.bus_source,
                coordinate: (block.position.x, block.position.y),
                rotation: block.rotation,
                state: block.state,
                pre_bypass: block.pre_bypass_state(),
            },
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.states.coordinate.0, self.states.coordinate.1)
    }

    pub fn set_position(&mut self, position: Point) {
        self.states.coordinate = (position.x, position.y);
    }
}

/// One exported connection, serialized as a 4-element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(
    from = "(BlockName, String, BlockName, String)",
    into = "(BlockName, String, BlockName, String)"
)]
pub struct ConnectionData {
    pub source_block: BlockName,
    pub source_port: String,
    pub sink_block: BlockName,
    pub sink_port: String,
}

impl From<(BlockName, String, BlockName, String)> for ConnectionData {
    fn from((source_block, source_port, sink_block, sink_port): (BlockName, String, BlockName, String)) -> Self {
        Self { source_block, source_port, sink_block, sink_port }
    }
}

impl From<ConnectionData> for (BlockName, String, BlockName, String) {
    fn from(c: ConnectionData) -> Self {
        (c.source_block, c.source_port, c.sink_block, c.sink_port)
    }
}

/// A whole document, or a subgraph of one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowgraphData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BlockData>,
    #[serde(default)]
    pub blocks: Vec<BlockData>,
    #[serde(default)]
    pub connections: Vec<ConnectionData>,
}

impl FlowgraphData {
    pub fn is_empty(&self) -> bool {
        self.options.is_none() && self.blocks.is_empty() && self.connections.is_empty()
    }

    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, FlowgraphError> {
        serde_json::to_string_pretty(self).map_err(|e| FlowgraphError::Data(e.to_string()))
    }

    /// # Errors
    /// Malformed JSON or records.
    pub fn from_json(text: &str) -> Result<Self, FlowgraphError> {
        serde_json::from_str(text).map_err(|e| FlowgraphError::Data(e.to_string()))
    }
}

/// Which connections a subgraph export carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionScope {
    /// Both endpoints inside the exported blocks (copy).
    Internal,
    /// At least one endpoint inside the exported blocks (delete).
    Incident,
}

// ─── Flowgraph import / export ───────────────────────────────────────────

impl Flowgraph {
    /// The whole document: options block, then blocks by name, then
    /// connections in sorted order.
    pub fn export_data(&self) -> FlowgraphData {
        let mut blocks: Vec<BlockData> = self
            .blocks()
            .filter(|(idx, _)| *idx != self.options)
            .map(|(_, b)| BlockData::from_block(b))
            .collect();
        blocks.sort_by(|a, b| a.name.cmp(&b.name));

        let mut connections: Vec<ConnectionData> = self
            .connections()
            .filter_map(|(edge, ..)| self.connection_data(edge))
            .collect();
        connections.sort();

        FlowgraphData {
            options: self.block(self.options).map(BlockData::from_block),
            blocks,
            connections,
        }
    }

    pub fn connection_data(&self, edge: EdgeIndex) -> Option<ConnectionData> {
        let (source, sink) = self.endpoints(edge)?;
        let conn = self.connection(edge)?;
        Some(ConnectionData {
            source_block: self.graph[source].name,
            source_port: conn.source_port.clone(),
            sink_block: self.graph[sink].name,
            sink_port: conn.sink_port.clone(),
        })
    }

    /// The edge a connection record names, if it exists.
    pub fn find_connection_data(&self, data: &ConnectionData) -> Option<EdgeIndex> {
        let source = self.index_of(data.source_block)?;
        let sink = self.index_of(data.sink_block)?;
        self.find_connection(source, &data.source_port, sink, &data.sink_port)
    }

    /// Export some blocks and the connections in `scope`. Unknown indices are
    /// skipped; the options block is exported like any other block.
    pub fn export_subgraph(&self, blocks: &[NodeIndex], scope: ConnectionScope) -> FlowgraphData {
        let members: HashSet<NodeIndex> = blocks.iter().copied().filter(|i| self.block(*i).is_some()).collect();

        let mut block_data: Vec<BlockData> = members
            .iter()
            .map(|idx| BlockData::from_block(&self.graph[*idx]))
            .collect();
        block_data.sort_by(|a, b| a.name.cmp(&b.name));

        let mut connections: Vec<ConnectionData> = self
            .connections()
            .filter(|(_, s, t, _)| match scope {
                ConnectionScope::Internal => members.contains(s) && members.contains(t),
                ConnectionScope::Incident => members.contains(s) || members.contains(t),
            })
            .filter_map(|(edge, ..)| self.connection_data(edge))
            .collect();
        connections.sort();

        FlowgraphData { options: None, blocks: block_data, connections }
    }

    /// Replace the document with `data`. Unknown block types load as dummy
    /// blocks, duplicate names are renamed and dangling connections skipped,
    /// each with a warning. The result is not dirty.
    pub fn import_data(&mut self, data: &FlowgraphData) {
        let mut fresh = self.fresh();
        let options_data = data
            .options
            .as_ref()
            .or_else(|| data.blocks.iter().find(|b| b.type_key == OPTIONS_KEY));
        if let Some(options_data) = options_data {
            let block = fresh.instantiate(options_data);
            let options = fresh.options;
            fresh.name_index.clear();
            fresh.name_index.insert(block.name, options);
            fresh.graph[options] = block;
        }
        fresh.insert_subgraph(data);
        fresh.reset_dirty();
        log::debug!(
            "imported {} blocks, {} connections",
            fresh.block_count(),
            fresh.connection_count()
        );
        *self = fresh;
    }

    /// Instantiate the blocks and connections of `data` under their recorded
    /// names (colliding names are renamed). Options blocks are skipped.
    /// Returns the new block indices in record order.
    pub fn insert_subgraph(&mut self, data: &FlowgraphData) -> Vec<NodeIndex> {
        let mut names: HashMap<BlockName, BlockName> = HashMap::new();
        let mut inserted = Vec::new();
        for record in &data.blocks {
            if record.type_key == OPTIONS_KEY {
                log::debug!("skipping options block {}", record.name);
                continue;
            }
            let block = self.instantiate(record);
            let idx = self.insert_block(block);
            names.entry(record.name).or_insert(self.graph[idx].name);
            inserted.push(idx);
        }

        let mut connected = 0;
        for record in &data.connections {
            let resolve = |name: BlockName| names.get(&name).copied().unwrap_or(name);
            let (Some(source), Some(sink)) = (
                self.index_of(resolve(record.source_block)),
                self.index_of(resolve(record.sink_block)),
            ) else {
                log::warn!(
                    "skipping connection {}:{} -> {}:{}: block not found",
                    record.source_block,
                    record.source_port,
                    record.sink_block,
                    record.sink_port
                );
                continue;
            };
            if source == sink
                || self
                    .find_connection(source, &record.source_port, sink, &record.sink_port)
                    .is_some()
            {
                log::warn!(
                    "skipping connection {}:{} -> {}:{}: duplicate or self loop",
                    record.source_block,
                    record.source_port,
                    record.sink_block,
                    record.sink_port
                );
                continue;
            }
            self.ensure_dummy_port(source, Direction::Source, &record.source_port);
            self.ensure_dummy_port(sink, Direction::Sink, &record.sink_port);
            self.insert_connection(
                source,
                sink,
                Connection::new(record.source_port.clone(), record.sink_port.clone()),
            );
            connected += 1;
        }

        if !inserted.is_empty() || connected > 0 {
            self.mark_dirty();
        }
        self.update();
        inserted
    }

    /// Remove exactly the blocks and connections `data` names.
    ///
    /// # Errors
    /// `BlockNotFound`/`ConnectionNotFound` when a record has no counterpart;
    /// nothing is removed in that case.
    pub fn remove_subgraph(&mut self, data: &FlowgraphData) -> Result<(), FlowgraphError> {
        let blocks = data
            .blocks
            .iter()
            .filter(|b| b.type_key != OPTIONS_KEY)
            .map(|b| {
                self.index_of(b.name)
                    .ok_or_else(|| FlowgraphError::BlockNotFound(b.name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let edges = data
            .connections
            .iter()
            .map(|c| {
                self.find_connection_data(c)
                    .ok_or_else(|| FlowgraphError::ConnectionNotFound {
                        source_block: c.source_block.to_string(),
                        source_port: c.source_port.clone(),
                        sink_block: c.sink_block.to_string(),
                        sink_port: c.sink_port.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for edge in edges {
            self.graph.remove_edge(edge);
        }
        for idx in blocks {
            if let Some(block) = self.graph.remove_node(idx) {
                self.name_index.remove(&block.name);
            }
        }
        self.mark_dirty();
        self.update();
        Ok(())
    }

    /// Build a block from its record without placing it.
    fn instantiate(&self, record: &BlockData) -> Block {
        let mut block = match self.registry.get(&record.type_key) {
            Some(def) => {
                let mut block = Block::from_type(def, record.name);
                for (key, value) in &record.parameters {
                    match block.param_mut(key) {
                        Some(param) => param.value.clone_from(value),
                        None => log::warn!("{}: ignoring unknown parameter {key}", record.name),
                    }
                }
                block
            }
            None => {
                log::warn!("{}: block type {} not found, loading as dummy", record.name, record.type_key);
                let mut block = Block::dummy(&record.type_key, record.name);
                block.params = record
                    .parameters
                    .iter()
                    .map(|(k, v)| Param::raw(k, v))
                    .collect();
                block
            }
        };
        block.position = record.position();
        block.rotation = record.states.rotation;
        block.state = record.states.state;
        block.unbypassed_state = record.states.pre_bypass;
        block.bus_sink = record.states.bus_sink;
        block.bus_source = record.states.bus_source;
        block
    }

    /// Dummy blocks grow the ports their connections refer to.
    fn ensure_dummy_port(&mut self, idx: NodeIndex, direction: Direction, key: &str) {
        let block = &mut self.graph[idx];
        if !block.is_dummy || block.port(direction, key).is_some() {
            return;
        }
        let mut port = Port::new(key, direction, "");
        port.block = idx;
        block.ports_mut(direction).push(port);
    }

    /// Serialize the whole document.
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, FlowgraphError> {
        self.export_data().to_json()
    }

    /// Load a document into a flowgraph backed by `registry`.
    ///
    /// # Errors
    /// Malformed JSON or records.
    pub fn from_json(
        registry: std::sync::Arc<crate::registry::BlockRegistry>,
        text: &str,
    ) -> Result<Self, FlowgraphError> {
        let data = FlowgraphData::from_json(text)?;
        let mut fg = Flowgraph::new(registry);
        fg.import_data(&data);
        Ok(fg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_serializes_as_array() {
        let data = ConnectionData {
            source_block: BlockName::intern("src_0"),
            source_port: "0".into(),
            sink_block: BlockName::intern("snk_0"),
            sink_port: "0".into(),
        };
        assert_eq!(serde_json::to_string(&data).unwrap(), r#"["src_0","0","snk_0","0"]"#);
    }

    #[test]
    fn states_default_when_missing() {
        let block: BlockData =
            serde_json::from_str(r#"{ "name": "null_0", "id": "blocks_null_sink" }"#).unwrap();
        assert_eq!(block.states, BlockStates::default());
        assert_eq!(block.states.state, EnabledState::Enabled);
    }

    #[test]
    fn rotation_rejects_odd_angles() {
        let err = serde_json::from_str::<BlockStates>(r#"{ "rotation": 45 }"#);
        assert!(err.is_err());
    }
}
