//! Copy/paste of a selected subgraph.
//!
//! A copy is a detached snapshot (`BlockData`/`ConnectionData` records plus
//! the top-left anchor of the copied blocks). Pasting re-instantiates it as a
//! single `NewElement` command with fresh names, so one undo removes the
//! whole paste. The wire form is MessagePack.

use crate::commands::Command;
use grc_core::{
    BlockData, BlockName, ConnectionData, ConnectionScope, EdgeIndex, Flowgraph, FlowgraphData,
    FlowgraphError, NodeIndex, OPTIONS_KEY, Point, Vec2,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A copied subgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardData {
    /// Minimum `(x, y)` over the copied blocks.
    pub anchor: Point,
    pub blocks: Vec<BlockData>,
    pub connections: Vec<ConnectionData>,
}

impl ClipboardData {
    /// Snapshot `blocks` with every connection whose both endpoints are
    /// among them. Selected connections leaving the selection are dropped.
    /// `None` when no block is given.
    pub fn copy(fg: &Flowgraph, blocks: &[NodeIndex], connections: &[EdgeIndex]) -> Option<Self> {
        let data = fg.export_subgraph(blocks, ConnectionScope::Internal);
        let first = data.blocks.first()?.position();
        let anchor = data.blocks.iter().fold(first, |min, b| {
            let p = b.position();
            Point::new(min.x.min(p.x), min.y.min(p.y))
        });

        let members: HashSet<BlockName> = data.blocks.iter().map(|b| b.name).collect();
        let mut conns = data.connections;
        for conn in connections.iter().filter_map(|e| fg.connection_data(*e)) {
            if members.contains(&conn.source_block)
                && members.contains(&conn.sink_block)
                && !conns.contains(&conn)
            {
                conns.push(conn);
            }
        }
        conns.sort();

        Some(Self {
            anchor,
            blocks: data.blocks,
            connections: conns,
        })
    }

    /// Offset that places the anchor at `target`, for pasting at a cursor.
    pub fn offset_to(&self, target: Point) -> Vec2 {
        target - self.anchor
    }

    /// Build the command that pastes this snapshot into `fg`, shifted by
    /// `offset`. Blocks whose names are taken get the next free
    /// `{type_key}_{n}`; connections follow the renames. The options block is
    /// never pasted. `None` when there is nothing to paste.
    pub fn paste(&self, fg: &Flowgraph, offset: Vec2) -> Option<Command> {
        let records: Vec<&BlockData> = self
            .blocks
            .iter()
            .filter(|b| b.type_key != OPTIONS_KEY)
            .collect();
        if records.is_empty() {
            return None;
        }

        // Free names are kept, so reserve them before generating any.
        let mut taken: HashSet<BlockName> = records
            .iter()
            .map(|b| b.name)
            .filter(|name| fg.index_of(*name).is_none())
            .collect();
        let mut names: HashMap<BlockName, BlockName> = HashMap::new();
        let mut blocks = Vec::with_capacity(records.len());
        for record in records {
            let name = if fg.index_of(record.name).is_none() {
                record.name
            } else {
                let fresh = (0..)
                    .map(|n| format!("{}_{n}", record.type_key))
                    .find(|c| {
                        !fg.is_name_taken(c) && !BlockName::lookup(c).is_some_and(|b| taken.contains(&b))
                    })
                    .map(|c| BlockName::intern(&c))?;
                taken.insert(fresh);
                fresh
            };
            names.insert(record.name, name);

            let mut block = record.clone();
            block.name = name;
            block.set_position(record.position() + offset);
            blocks.push(block);
        }

        let mut connections: Vec<ConnectionData> = self
            .connections
            .iter()
            .filter_map(|c| {
                Some(ConnectionData {
                    source_block: *names.get(&c.source_block)?,
                    source_port: c.source_port.clone(),
                    sink_block: *names.get(&c.sink_block)?,
                    sink_port: c.sink_port.clone(),
                })
            })
            .collect();
        connections.sort();

        log::debug!("paste {} blocks, {} connections", blocks.len(), connections.len());
        Some(Command::NewElement {
            data: FlowgraphData {
                options: None,
                blocks,
                connections,
            },
        })
    }

    /// # Errors
    /// Encoding failure.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FlowgraphError> {
        rmp_serde::to_vec_named(self).map_err(|e| FlowgraphError::Data(e.to_string()))
    }

    /// # Errors
    /// Malformed payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FlowgraphError> {
        rmp_serde::from_slice(bytes).map_err(|e| FlowgraphError::Data(e.to_string()))
    }
}
