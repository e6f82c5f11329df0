//! Domain model for GRC flowgraphs.
//!
//! Blocks own their ports and parameters; connections join one source port
//! to one sink port. Both live inside the [`Flowgraph`](crate::Flowgraph)
//! arena (a `petgraph` stable graph) and refer to each other by index or by
//! port key, never by owning pointer. Everything under a `geometry`/`colors`
//! field is derived by the layout pass and may be recomputed at any time.

use crate::id::BlockName;
use crate::registry::{BlockType, Hide, OPTIONS_KEY, PortDef, resolve_template};
use kurbo::{CubicBez, Point, Size, Vec2};
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color. Stored as 4 × f32 [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Helper to parse a single hex digit.
fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let bytes = hex.as_bytes();
        if bytes.len() != 6 {
            return None;
        }
        let r = hex_val(bytes[0])? << 4 | hex_val(bytes[1])?;
        let g = hex_val(bytes[2])? << 4 | hex_val(bytes[3])?;
        let b = hex_val(bytes[4])? << 4 | hex_val(bytes[5])?;
        Some(Self::rgb8(r, g, b))
    }

    /// Emit as `#RRGGBB`.
    pub fn to_hex(&self) -> String {
        let to_u8 = |c: f32| (c * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}", to_u8(self.r), to_u8(self.g), to_u8(self.b))
    }

    /// Subtract `amount` from each channel, clamping at zero.
    pub fn darken(self, amount: f32) -> Self {
        Self::rgba(
            (self.r - amount).max(0.0),
            (self.g - amount).max(0.0),
            (self.b - amount).max(0.0),
            self.a,
        )
    }
}

// ─── Element state ───────────────────────────────────────────────────────

/// Whether a block takes part in the generated flowgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnabledState {
    #[default]
    Enabled,
    Disabled,
    /// Logically removed from the signal path; its input is wired to its output.
    Bypassed,
}

impl EnabledState {
    /// Disabled blocks (and their connections) are ignored; bypassed ones are not.
    pub fn is_active(self) -> bool {
        self != EnabledState::Disabled
    }
}

/// Block rotation in degrees, always one of 0, 90, 180, 270.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Rotation(u16);

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation(0), Rotation(90), Rotation(180), Rotation(270)];

    /// Normalize any multiple of 90 (negative included); `None` otherwise.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        let normalized = degrees.rem_euclid(360);
        (normalized % 90 == 0).then_some(Rotation(normalized as u16))
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    /// Add a delta (a multiple of 90), wrapping around. Other deltas are
    /// rounded down to the previous quarter turn.
    #[must_use]
    pub fn rotated(self, delta: i32) -> Self {
        let quarter = delta.div_euclid(90).rem_euclid(4) * 90;
        Rotation(((i32::from(self.0) + quarter) % 360) as u16)
    }

    /// The rotation that undoes this one.
    #[must_use]
    pub fn inverse(self) -> Self {
        Rotation((360 - self.0) % 360)
    }

    /// `(cos, sin)` exactly, so quarter turns never accumulate float error.
    pub fn cos_sin(self) -> (f64, f64) {
        match self.0 {
            90 => (0.0, 1.0),
            180 => (-1.0, 0.0),
            270 => (0.0, -1.0),
            _ => (1.0, 0.0),
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = String;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Rotation::from_degrees(degrees).ok_or_else(|| format!("unusable rotation angle {degrees}"))
    }
}

impl From<Rotation> for i32 {
    fn from(r: Rotation) -> i32 {
        i32::from(r.0)
    }
}

/// Which way data flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Source,
    Sink,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Source => f.write_str("source"),
            Direction::Sink => f.write_str("sink"),
        }
    }
}

/// Handle to any element placed on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementRef {
    Block(NodeIndex),
    Connection(EdgeIndex),
}

// ─── Parameters ──────────────────────────────────────────────────────────

/// A parameter instance with its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub key: String,
    pub name: String,
    pub dtype: String,
    pub value: String,
    pub hide: Hide,
    pub options: Vec<String>,
    pub option_labels: Vec<String>,
}

impl Param {
    pub fn from_def(def: &crate::registry::ParamDef) -> Self {
        Self {
            key: def.id.clone(),
            name: if def.label.is_empty() { def.id.clone() } else { def.label.clone() },
            dtype: def.dtype.clone(),
            value: def.default.clone(),
            hide: def.hide,
            options: def.options.clone(),
            option_labels: def.option_labels.clone(),
        }
    }

    /// An untyped parameter carried by a block whose type is unknown.
    pub fn raw(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            dtype: "raw".to_string(),
            value: value.to_string(),
            hide: Hide::None,
            options: Vec::new(),
            option_labels: Vec::new(),
        }
    }

    /// The option label when the value is a known option, else the raw value.
    pub fn display_value(&self) -> &str {
        self.options
            .iter()
            .position(|o| *o == self.value)
            .and_then(|i| self.option_labels.get(i))
            .map_or(self.value.as_str(), String::as_str)
    }

    /// Whether this parameter gets a row on the canvas.
    pub fn is_shown(&self) -> bool {
        self.hide == Hide::None
    }
}

// ─── Ports ───────────────────────────────────────────────────────────────

/// Derived port placement, relative to the owning block's unrotated origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortGeometry {
    pub offset: Point,
    pub width: f64,
    pub height: f64,
    /// Where connections attach, relative to the block origin.
    pub connection_point: Point,
    pub color: Color,
}

impl Default for PortGeometry {
    fn default() -> Self {
        Self {
            offset: Point::ZERO,
            width: 0.0,
            height: 0.0,
            connection_point: Point::ZERO,
            color: crate::colors::DEFAULT_PORT_COLOR,
        }
    }
}

/// A typed connection endpoint owned by a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub key: String,
    pub label: String,
    pub direction: Direction,
    pub domain: String,
    pub dtype: String,
    pub vlen: u32,
    pub optional: bool,
    pub hidden: bool,
    pub is_bus_member: bool,
    /// A synthesized port standing for a bundle of member ports.
    pub is_bus: bool,
    /// Owning block. Set by the flowgraph when the block is placed.
    pub block: NodeIndex,
    pub geometry: PortGeometry,
}

impl Port {
    pub fn new(key: impl Into<String>, direction: Direction, dtype: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: String::new(),
            direction,
            domain: "stream".to_string(),
            dtype: dtype.into(),
            vlen: 1,
            optional: false,
            hidden: false,
            is_bus_member: false,
            is_bus: false,
            block: NodeIndex::end(),
            geometry: PortGeometry::default(),
        }
    }

    pub fn is_message(&self) -> bool {
        self.domain == "message"
    }

    /// Text drawn on the port: its label, or its key for unlabelled ports.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() { &self.key } else { &self.label }
    }
}

/// Caller-facing handle naming one port of one block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub block: NodeIndex,
    pub direction: Direction,
    pub key: String,
}

impl PortRef {
    pub fn source(block: NodeIndex, key: impl Into<String>) -> Self {
        Self { block, direction: Direction::Source, key: key.into() }
    }

    pub fn sink(block: NodeIndex, key: impl Into<String>) -> Self {
        Self { block, direction: Direction::Sink, key: key.into() }
    }
}

// ─── Blocks ──────────────────────────────────────────────────────────────

/// Derived block size.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockGeometry {
    pub width: f64,
    pub height: f64,
}

/// Derived block colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockColors {
    pub background: Color,
    pub border: Color,
    pub label: Color,
}

impl Default for BlockColors {
    fn default() -> Self {
        Self {
            background: crate::colors::BLOCK_ENABLED_COLOR,
            border: crate::colors::BORDER_COLOR,
            label: crate::colors::FONT_COLOR,
        }
    }
}

/// A configurable processing unit placed on the canvas.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: BlockName,
    pub type_key: String,
    pub label: String,
    pub params: Vec<Param>,
    pub sinks: SmallVec<[Port; 4]>,
    pub sources: SmallVec<[Port; 4]>,
    pub position: Point,
    pub rotation: Rotation,
    pub state: EnabledState,
    pub bus_sink: bool,
    pub bus_source: bool,
    /// The type key was not found in the registry when this block was loaded.
    pub is_dummy: bool,
    pub deprecated: bool,
    pub selected: bool,
    /// Validation annotations from the last `validate()`.
    pub errors: Vec<String>,
    pub geometry: BlockGeometry,
    pub colors: BlockColors,
    /// State to return to when bypass is toggled off.
    pub(crate) unbypassed_state: EnabledState,
    pub(crate) definition: Option<Arc<BlockType>>,
}

impl Block {
    /// Instantiate a block from its type definition with default parameters.
    pub fn from_type(definition: Arc<BlockType>, name: BlockName) -> Self {
        let mut block = Self::bare(name, &definition.id);
        block.label = if definition.label.is_empty() {
            definition.id.clone()
        } else {
            definition.label.clone()
        };
        block.params = definition.parameters.iter().map(Param::from_def).collect();
        block.deprecated = definition.is_deprecated();
        block.definition = Some(definition);
        block.sinks = block.build_ports(Direction::Sink);
        block.sources = block.build_ports(Direction::Source);
        block
    }

    /// Placeholder for a block whose type is missing from the registry.
    /// Keeps its raw parameters so it round-trips through export.
    pub fn dummy(type_key: &str, name: BlockName) -> Self {
        let mut block = Self::bare(name, type_key);
        block.is_dummy = true;
        block
    }

    fn bare(name: BlockName, type_key: &str) -> Self {
        Self {
            name,
            type_key: type_key.to_string(),
            label: type_key.to_string(),
            params: Vec::new(),
            sinks: SmallVec::new(),
            sources: SmallVec::new(),
            position: Point::ZERO,
            rotation: Rotation::default(),
            state: EnabledState::Enabled,
            bus_sink: false,
            bus_source: false,
            is_dummy: false,
            deprecated: false,
            selected: false,
            errors: Vec::new(),
            geometry: BlockGeometry::default(),
            colors: BlockColors::default(),
            unbypassed_state: EnabledState::Enabled,
            definition: None,
        }
    }

    pub fn definition(&self) -> Option<&BlockType> {
        self.definition.as_deref()
    }

    /// Expand the definition's port templates against the current parameters.
    ///
    /// Stream ports are keyed by their running index per direction; message
    /// ports by their explicit id. Dummy blocks keep whatever ports they have.
    pub fn build_ports(&self, direction: Direction) -> SmallVec<[Port; 4]> {
        let Some(def) = &self.definition else {
            return self.ports(direction).iter().cloned().collect();
        };
        let templates: &[PortDef] = match direction {
            Direction::Sink => &def.inputs,
            Direction::Source => &def.outputs,
        };
        let lookup = |key: &str| self.param_value(key);

        let mut ports = SmallVec::new();
        let mut stream_index = 0usize;
        for template in templates {
            let count = template.multiplicity.resolve_count(lookup);
            let dtype = resolve_template(&template.dtype, lookup);
            let vlen = template.vlen.resolve(lookup).max(1);
            for i in 0..count {
                let key = match &template.id {
                    Some(id) if count > 1 => format!("{id}{i}"),
                    Some(id) => id.clone(),
                    None => {
                        stream_index += 1;
                        (stream_index - 1).to_string()
                    }
                };
                let mut port = Port::new(key, direction, dtype.clone());
                port.label = if count > 1 && !template.label.is_empty() {
                    format!("{}{i}", template.label)
                } else {
                    template.label.clone()
                };
                port.domain = template.domain.clone();
                port.vlen = vlen;
                port.optional = template.optional;
                port.hidden = template.hide;
                ports.push(port);
            }
        }
        ports
    }

    pub fn is_options(&self) -> bool {
        self.type_key == OPTIONS_KEY
    }

    pub fn param(&self, key: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.key == key)
    }

    pub fn param_mut(&mut self, key: &str) -> Option<&mut Param> {
        self.params.iter_mut().find(|p| p.key == key)
    }

    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.param(key).map(|p| p.value.as_str())
    }

    pub fn ports(&self, direction: Direction) -> &[Port] {
        match direction {
            Direction::Sink => &self.sinks,
            Direction::Source => &self.sources,
        }
    }

    pub fn ports_mut(&mut self, direction: Direction) -> &mut SmallVec<[Port; 4]> {
        match direction {
            Direction::Sink => &mut self.sinks,
            Direction::Source => &mut self.sources,
        }
    }

    pub fn port(&self, direction: Direction, key: &str) -> Option<&Port> {
        self.ports(direction).iter().find(|p| p.key == key)
    }

    /// Ports drawn on the canvas (not hidden, bus members folded away).
    pub fn active_ports(&self, direction: Direction) -> impl Iterator<Item = &Port> {
        self.ports(direction).iter().filter(|p| !p.hidden)
    }

    pub fn is_bussified(&self, direction: Direction) -> bool {
        match direction {
            Direction::Sink => self.bus_sink,
            Direction::Source => self.bus_source,
        }
    }

    /// The state this block returns to when bypass is toggled off.
    pub fn pre_bypass_state(&self) -> EnabledState {
        self.unbypassed_state
    }

    /// Exactly one stream input and one stream output of the same type.
    pub fn can_bypass(&self) -> bool {
        if self.is_options() || self.is_dummy {
            return false;
        }
        let sinks: Vec<&Port> = self.sinks.iter().filter(|p| !p.is_message()).collect();
        let sources: Vec<&Port> = self.sources.iter().filter(|p| !p.is_message()).collect();
        matches!((sinks.as_slice(), sources.as_slice()), ([i], [o]) if i.dtype == o.dtype)
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn size(&self) -> Size {
        Size::new(self.geometry.width, self.geometry.height)
    }

    /// Center of the block in scene coordinates (rotation pivot).
    pub fn center(&self) -> Point {
        self.position + self.size().to_vec2() / 2.0
    }

    /// Map a point given relative to the unrotated block origin into the scene,
    /// rotating about the block center.
    pub fn map_to_scene(&self, local: Point) -> Point {
        rotate_point(self.position + local.to_vec2(), self.center(), self.rotation)
    }

    /// Inverse of [`map_to_scene`](Self::map_to_scene).
    pub fn map_from_scene(&self, scene: Point) -> Point {
        let unrotated = rotate_point(scene, self.center(), self.rotation.inverse());
        (unrotated - self.position).to_point()
    }

    /// Scene-space rectangle of a visible port.
    pub fn port_rect(&self, port: &Port) -> kurbo::Rect {
        kurbo::Rect::from_origin_size(port.geometry.offset, (port.geometry.width, port.geometry.height))
    }
}

/// Rotate `point` about `pivot` by a quarter-turn multiple. Positive angles
/// turn clockwise on a y-down canvas.
pub fn rotate_point(point: Point, pivot: Point, rotation: Rotation) -> Point {
    if rotation.degrees() == 0 {
        return point;
    }
    let (cos, sin) = rotation.cos_sin();
    let d = point - pivot;
    pivot + Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
}

// ─── Connections ─────────────────────────────────────────────────────────

/// Derived drawing data for a connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPath {
    pub start: Point,
    pub end: Point,
    pub curve: CubicBez,
    /// Arrowhead triangle, tip first.
    pub arrow: [Point; 3],
    pub color: Color,
}

impl Default for ConnectionPath {
    fn default() -> Self {
        Self {
            start: Point::ZERO,
            end: Point::ZERO,
            curve: CubicBez::new(Point::ZERO, Point::ZERO, Point::ZERO, Point::ZERO),
            arrow: [Point::ZERO; 3],
            color: crate::colors::CONNECTION_ENABLED_COLOR,
        }
    }
}

/// Edge weight: which source port feeds which sink port. The blocks are the
/// edge's endpoints in the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source_port: String,
    pub sink_port: String,
    pub selected: bool,
    pub errors: Vec<String>,
    pub path: ConnectionPath,
}

impl Connection {
    pub fn new(source_port: impl Into<String>, sink_port: impl Into<String>) -> Self {
        Self {
            source_port: source_port.into(),
            sink_port: sink_port.into(),
            selected: false,
            errors: Vec::new(),
            path: ConnectionPath::default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
