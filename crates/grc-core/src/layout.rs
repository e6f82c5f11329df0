//! Derived block geometry, port placement, colors and connection paths.
//!
//! Everything here is a pure function of the current block state and is
//! recomputed after every edit; nothing computed here is persisted.

use crate::colors::{self, port_color};
use crate::model::{
    Block, BlockColors, BlockGeometry, Color, ConnectionPath, Direction, EnabledState, Port,
};
use kurbo::{CubicBez, Point, Vec2};
use serde::{Deserialize, Serialize};

// ─── Config ───────────────────────────────────────────────────────────────

/// Layout constants. Text widths are estimated from per-character advances,
/// so the host can calibrate them against the font it actually draws with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Height of a block with no visible parameters.
    pub base_height: f64,
    /// Fixed height of a block whose type is missing.
    pub dummy_height: f64,
    /// Extra height per visible parameter row.
    pub param_row_height: f64,
    /// Added to the widest text line.
    pub width_margin: f64,

    pub port_separation: f64,
    pub port_border_separation: f64,
    pub port_spacing: f64,
    pub port_height: f64,
    pub port_min_width: f64,
    pub port_extra_bus_height: f64,
    /// Port width is its label width times this factor.
    pub port_label_scale: f64,

    pub label_char_width: f64,
    pub name_char_width: f64,
    pub value_char_width: f64,
    pub port_char_width: f64,

    /// Horizontal distance of the connection curve's control points.
    pub connector_control_offset: f64,
    pub arrow_height: f64,
    pub arrow_base: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_height: 30.0,
            dummy_height: 50.0,
            param_row_height: 20.0,
            width_margin: 15.0,
            port_separation: 32.0,
            port_border_separation: 8.0,
            port_spacing: 16.0,
            port_height: 15.0,
            port_min_width: 15.0,
            port_extra_bus_height: 40.0,
            port_label_scale: 1.5,
            label_char_width: 8.0,
            name_char_width: 7.0,
            value_char_width: 6.0,
            port_char_width: 6.0,
            connector_control_offset: 200.0,
            arrow_height: 13.0,
            arrow_base: 10.0,
        }
    }
}

fn text_width(text: &str, char_width: f64) -> f64 {
    text.chars().count() as f64 * char_width
}

// ─── Blocks ──────────────────────────────────────────────────────────────

/// Recompute a block's size, its ports' placement and all colors.
pub fn layout_block(block: &mut Block, config: &LayoutConfig) {
    size_ports(block, config);

    let mut height = if block.is_dummy {
        config.dummy_height
    } else {
        let rows = block.params.iter().filter(|p| p.is_shown()).count();
        config.base_height + rows as f64 * config.param_row_height
    };
    for direction in [Direction::Sink, Direction::Source] {
        height = height.max(min_height_for_ports(block, direction, config));
    }

    let label_width = text_width(&block.label, config.label_char_width);
    let widest = if block.is_dummy {
        let key_line = text_width("key: ", config.name_char_width)
            + text_width(&block.type_key, config.value_char_width);
        text_width(&block.label, config.name_char_width).max(key_line)
    } else {
        block
            .params
            .iter()
            .filter(|p| p.is_shown())
            .map(|p| {
                text_width(&format!("{}: ", p.name), config.name_char_width)
                    + text_width(p.display_value(), config.value_char_width)
            })
            .fold(label_width, f64::max)
    };

    block.geometry = BlockGeometry { width: widest + config.width_margin, height };
    place_ports(block, Direction::Sink, config);
    place_ports(block, Direction::Source, config);
    block.colors = block_colors(block);
    log::trace!("layout {}: {}x{}", block.name, block.geometry.width, block.geometry.height);
}

fn size_ports(block: &mut Block, config: &LayoutConfig) {
    let disabled = block.state == EnabledState::Disabled;
    for direction in [Direction::Sink, Direction::Source] {
        for port in block.ports_mut(direction).iter_mut() {
            let label_width = text_width(port.display_label(), config.port_char_width);
            port.geometry.width = config.port_min_width.max(label_width * config.port_label_scale);
            port.geometry.height = if port.is_bus {
                config.port_height + config.port_extra_bus_height
            } else {
                config.port_height
            };
            port.geometry.color = port_fill(port, disabled);
        }
    }
}

fn port_fill(port: &Port, block_disabled: bool) -> Color {
    if block_disabled {
        colors::BLOCK_DISABLED_COLOR
    } else if port.is_message() {
        port_color("message", 1)
    } else {
        port_color(&port.dtype, port.vlen)
    }
}

fn min_height_for_ports(block: &Block, direction: Direction, config: &LayoutConfig) -> f64 {
    let ports: Vec<&Port> = block.active_ports(direction).collect();
    let border = 2.0 * config.port_border_separation;
    if ports.iter().any(|p| p.is_bus) {
        let buses: f64 = ports
            .iter()
            .filter(|p| p.is_bus)
            .map(|p| p.geometry.height + config.port_spacing)
            .sum();
        return border + buses - config.port_spacing;
    }
    match ports.last() {
        Some(last) => border + ports.len() as f64 * config.port_separation - last.geometry.height,
        None => border,
    }
}

/// Distribute the visible ports of one side evenly about the block's middle.
fn place_ports(block: &mut Block, direction: Direction, config: &LayoutConfig) {
    let width = block.geometry.width;
    let height = block.geometry.height;
    let has_bus = block.is_bussified(direction);
    let ports = block.ports_mut(direction);
    let visible: Vec<usize> = (0..ports.len()).filter(|&i| !ports[i].hidden).collect();
    let Some(&first) = visible.first() else {
        return;
    };

    let first_height = ports[first].geometry.height;
    let separation = if has_bus {
        first_height + config.port_spacing
    } else {
        config.port_separation
    };
    let mut offset = (height - (visible.len() - 1) as f64 * separation - first_height) / 2.0;

    for i in visible {
        let geometry = &mut ports[i].geometry;
        let mid = offset + geometry.height / 2.0;
        match direction {
            Direction::Sink => {
                geometry.offset = Point::new(-geometry.width, offset);
                geometry.connection_point = Point::new(-geometry.width, mid);
            }
            Direction::Source => {
                geometry.offset = Point::new(width, offset);
                geometry.connection_point = Point::new(width + geometry.width, mid);
            }
        }
        offset += if has_bus {
            geometry.height + config.port_spacing
        } else {
            config.port_separation
        };
    }
}

/// Block background and border follow the enable state; the label turns red
/// on invalid blocks.
pub fn block_colors(block: &Block) -> BlockColors {
    let (background, border) = if block.is_dummy {
        (colors::MISSING_BLOCK_BACKGROUND_COLOR, colors::MISSING_BLOCK_BORDER_COLOR)
    } else {
        match block.state {
            EnabledState::Enabled if block.deprecated => (
                colors::BLOCK_DEPRECATED_BACKGROUND_COLOR,
                colors::BLOCK_DEPRECATED_BORDER_COLOR,
            ),
            EnabledState::Enabled => (colors::BLOCK_ENABLED_COLOR, colors::BORDER_COLOR),
            EnabledState::Bypassed => (colors::BLOCK_BYPASSED_COLOR, colors::BORDER_COLOR),
            EnabledState::Disabled => (colors::BLOCK_DISABLED_COLOR, colors::BORDER_COLOR_DISABLED),
        }
    };
    BlockColors {
        background,
        border: if block.selected { colors::HIGHLIGHT_COLOR } else { border },
        label: if block.is_valid() { colors::FONT_COLOR } else { colors::ERROR_FONT_COLOR },
    }
}

// ─── Connections ─────────────────────────────────────────────────────────

/// Which way a port points in scene space once its block is rotated.
fn facing(block: &Block, direction: Direction) -> Vec2 {
    let (cos, sin) = block.rotation.cos_sin();
    match direction {
        Direction::Source => Vec2::new(cos, sin),
        Direction::Sink => Vec2::new(-cos, -sin),
    }
}

/// Cubic from the source's connection point to the sink's, leaving and
/// entering along each port's facing direction, plus the arrowhead at the sink.
pub fn connection_path(
    source: &Block,
    source_port: &Port,
    sink: &Block,
    sink_port: &Port,
    config: &LayoutConfig,
) -> ConnectionPath {
    let start = source.map_to_scene(source_port.geometry.connection_point);
    let end = sink.map_to_scene(sink_port.geometry.connection_point);
    let out_dir = facing(source, Direction::Source);
    let in_dir = facing(sink, Direction::Sink);

    let curve = CubicBez::new(
        start,
        start + out_dir * config.connector_control_offset,
        end + in_dir * config.connector_control_offset,
        end,
    );
    let base = end + in_dir * config.arrow_height;
    let across = Vec2::new(-in_dir.y, in_dir.x) * (config.arrow_base / 2.0);

    ConnectionPath {
        start,
        end,
        curve,
        arrow: [end, base + across, base - across],
        color: colors::CONNECTION_ENABLED_COLOR,
    }
}

/// Straight stand-in drawn between block centers when a port is missing.
pub fn detached_path(source: &Block, sink: &Block) -> ConnectionPath {
    let (start, end) = (source.center(), sink.center());
    ConnectionPath {
        start,
        end,
        curve: CubicBez::new(start, start, end, end),
        ..ConnectionPath::default()
    }
}

pub fn connection_color(selected: bool, enabled: bool, valid: bool) -> Color {
    if selected {
        colors::HIGHLIGHT_COLOR
    } else if !enabled {
        colors::CONNECTION_DISABLED_COLOR
    } else if !valid {
        colors::CONNECTION_ERROR_COLOR
    } else {
        colors::CONNECTION_ENABLED_COLOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::BlockName;
    use crate::model::Param;
    use crate::registry::Hide;

    fn dummy_with_ports(name: &str, sinks: usize, sources: usize) -> Block {
        let mut block = Block::dummy("test_block", BlockName::intern(name));
        block.is_dummy = false;
        block.label = "Test".into();
        for i in 0..sinks {
            block.sinks.push(Port::new(i.to_string(), Direction::Sink, "float"));
        }
        for i in 0..sources {
            block.sources.push(Port::new(i.to_string(), Direction::Source, "float"));
        }
        block
    }

    fn shown_param(key: &str, value: &str) -> Param {
        Param {
            key: key.into(),
            name: key.into(),
            dtype: "raw".into(),
            value: value.into(),
            hide: Hide::None,
            options: Vec::new(),
            option_labels: Vec::new(),
        }
    }

    #[test]
    fn height_grows_per_visible_param() {
        let config = LayoutConfig::default();
        let mut block = dummy_with_ports("layout_height", 0, 0);
        block.params.push(shown_param("samp_rate", "32000"));
        block.params.push(shown_param("type", "float"));
        let mut hidden = shown_param("comment", "");
        hidden.hide = Hide::Part;
        block.params.push(hidden);

        layout_block(&mut block, &config);
        assert_eq!(block.geometry.height, 70.0);
    }

    #[test]
    fn dummy_blocks_have_fixed_height() {
        let config = LayoutConfig::default();
        let mut block = Block::dummy("gone_block", BlockName::intern("layout_dummy"));
        layout_block(&mut block, &config);
        assert_eq!(block.geometry.height, 50.0);
        assert_eq!(block.colors.background, colors::MISSING_BLOCK_BACKGROUND_COLOR);
    }

    #[test]
    fn width_follows_widest_line() {
        let config = LayoutConfig::default();
        let mut block = dummy_with_ports("layout_width", 0, 0);
        // "samp_rate: " = 11 chars × 7, "32000" = 5 chars × 6.
        block.params.push(shown_param("samp_rate", "32000"));
        layout_block(&mut block, &config);
        assert_eq!(block.geometry.width, 77.0 + 30.0 + 15.0);
    }

    #[test]
    fn ports_are_centered_and_separated() {
        let config = LayoutConfig::default();
        let mut block = dummy_with_ports("layout_ports", 2, 1);
        layout_block(&mut block, &config);

        // 2 sinks need 16 + 64 - 15 = 65 > 30.
        assert_eq!(block.geometry.height, 65.0);
        let first = block.sinks[0].geometry.offset.y;
        let second = block.sinks[1].geometry.offset.y;
        assert_eq!(second - first, 32.0);
        assert_eq!(first, (65.0 - 32.0 - 15.0) / 2.0);
        assert_eq!(block.sources[0].geometry.offset.x, block.geometry.width);
    }

    #[test]
    fn connection_curve_leaves_horizontally() {
        let config = LayoutConfig::default();
        let mut source = dummy_with_ports("layout_src", 0, 1);
        let mut sink = dummy_with_ports("layout_snk", 1, 0);
        sink.position = Point::new(400.0, 0.0);
        layout_block(&mut source, &config);
        layout_block(&mut sink, &config);

        let path = connection_path(&source, &source.sources[0], &sink, &sink.sinks[0], &config);
        assert_eq!(path.curve.p1, path.start + Vec2::new(200.0, 0.0));
        assert_eq!(path.curve.p2, path.end - Vec2::new(200.0, 0.0));
        assert_eq!(path.arrow[0], path.end);
        assert_eq!(path.arrow[1].x, path.end.x - 13.0);
    }

    #[test]
    fn selected_connection_is_highlighted() {
        assert_eq!(connection_color(true, false, false), colors::HIGHLIGHT_COLOR);
        assert_eq!(connection_color(false, false, true), colors::CONNECTION_DISABLED_COLOR);
        assert_eq!(connection_color(false, true, false), colors::CONNECTION_ERROR_COLOR);
    }
}
