pub mod colors;
pub mod data;
pub mod error;
pub mod flowgraph;
pub mod hit;
pub mod id;
pub mod layout;
pub mod model;
pub mod registry;
pub mod rules;

pub use data::{BlockData, BlockStates, ConnectionData, ConnectionScope, FlowgraphData};
pub use error::{ConnectionError, FlowgraphError, RegistryError};
pub use flowgraph::{Flowgraph, block_not_found};
pub use hit::Hit;
pub use id::BlockName;
pub use layout::LayoutConfig;
pub use model::*;
pub use registry::{BlockRegistry, BlockType, MAX_MULTIPLICITY, OPTIONS_KEY, OPTIONS_NAME};
pub use rules::{Diagnostic, DomainRules, Severity, StandardRules};

// Re-export geometry and graph handles so downstream crates don't need a direct dependency
pub use kurbo::{Point, Rect, Vec2};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
