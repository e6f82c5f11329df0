//! Error types for flowgraph mutation.
//!
//! A rejected operation leaves the flowgraph untouched. Structural problems
//! that the user can still edit out of (type mismatches, dangling ports) are
//! reported as [`Diagnostic`](crate::rules::Diagnostic)s instead.

use thiserror::Error;

/// Why `connect` refused to join two ports.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("the source endpoint is not a source port")]
    NotASource,

    #[error("the sink endpoint is not a sink port")]
    NotASink,

    #[error("source and sink belong to the same block")]
    SameBlock,

    #[error("the sink port already has an incoming connection")]
    SinkOccupied,

    #[error("these ports are already connected")]
    AlreadyConnected,
}

/// Errors returned by structural flowgraph operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowgraphError {
    #[error("block type '{0}' is not registered")]
    UnknownBlockType(String),

    #[error("invalid connection: {0}")]
    InvalidConnection(#[from] ConnectionError),

    #[error("block '{0}' not found")]
    BlockNotFound(String),

    #[error("block '{block}' has no port '{port}'")]
    PortNotFound { block: String, port: String },

    #[error("block '{block}' has no parameter '{param}'")]
    ParamNotFound { block: String, param: String },

    #[error("connection {source_block}:{source_port} -> {sink_block}:{sink_port} not found")]
    ConnectionNotFound {
        source_block: String,
        source_port: String,
        sink_block: String,
        sink_port: String,
    },

    #[error("block name '{0}' is already in use")]
    NameInUse(String),

    #[error("the flowgraph already has an options block")]
    OptionsBlockExists,

    #[error("malformed flowgraph data: {0}")]
    Data(String),
}

/// Errors raised while loading block-type definitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("failed to parse block definitions: {0}")]
    Parse(String),

    #[error("block type '{0}' is defined twice")]
    DuplicateKey(String),

    #[error("block type '{block}': parameter '{param}' is defined twice")]
    DuplicateParam { block: String, param: String },
}
