//! Canvas palette and the IO-type color table.

use crate::model::Color;

// ─── Blocks ──────────────────────────────────────────────────────────────

pub const HIGHLIGHT_COLOR: Color = Color::rgb8(0x00, 0xFF, 0xFF);
pub const BORDER_COLOR: Color = Color::rgb8(0x61, 0x61, 0x61);
pub const BORDER_COLOR_DISABLED: Color = Color::rgb8(0x88, 0x88, 0x88);
pub const FONT_COLOR: Color = Color::rgb8(0x00, 0x00, 0x00);
pub const ERROR_FONT_COLOR: Color = Color::rgb8(0xFF, 0x00, 0x00);

pub const MISSING_BLOCK_BACKGROUND_COLOR: Color = Color::rgb8(0xFF, 0xF2, 0xF2);
pub const MISSING_BLOCK_BORDER_COLOR: Color = Color::rgb8(0xFF, 0x00, 0x00);

pub const BLOCK_ENABLED_COLOR: Color = Color::rgb8(0xF1, 0xEC, 0xFF);
pub const BLOCK_DISABLED_COLOR: Color = Color::rgb8(0xCC, 0xCC, 0xCC);
pub const BLOCK_BYPASSED_COLOR: Color = Color::rgb8(0xF4, 0xFF, 0x81);
pub const BLOCK_DEPRECATED_BACKGROUND_COLOR: Color = Color::rgb8(0xFE, 0xD6, 0xD6);
pub const BLOCK_DEPRECATED_BORDER_COLOR: Color = Color::rgb8(0xFF, 0x54, 0x0B);

// ─── Connections ─────────────────────────────────────────────────────────

pub const CONNECTION_ENABLED_COLOR: Color = Color::rgb8(0x61, 0x61, 0x61);
pub const CONNECTION_DISABLED_COLOR: Color = Color::rgb8(0xBB, 0xBB, 0xBB);
pub const CONNECTION_ERROR_COLOR: Color = Color::rgb8(0xFF, 0x00, 0x00);

// ─── IO types ────────────────────────────────────────────────────────────

/// `(dtype aliases, item size in bytes, color)`.
const IO_TYPES: &[(&[&str], usize, Color)] = &[
    (&["fc64"], 16, Color::rgb8(0xCC, 0x8C, 0x69)),
    (&["complex", "fc32"], 8, Color::rgb8(0x33, 0x99, 0xFF)),
    (&["f64"], 8, Color::rgb8(0x66, 0xCC, 0xCC)),
    (&["float", "f32"], 4, Color::rgb8(0xFF, 0x8C, 0x69)),
    (&["int", "s32"], 4, Color::rgb8(0x00, 0xFF, 0x99)),
    (&["short", "s16"], 2, Color::rgb8(0xFF, 0xFF, 0x66)),
    (&["byte", "s8"], 1, Color::rgb8(0xFF, 0x66, 0xFF)),
    (&["msg"], 0, Color::rgb8(0x77, 0x77, 0x77)),
    (&["message"], 0, Color::rgb8(0xC0, 0xC0, 0xC0)),
    (&["bus"], 0, Color::rgb8(0xFF, 0xFF, 0xFF)),
];

/// Wildcard / unknown IO type.
pub const DEFAULT_PORT_COLOR: Color = Color::rgb8(0xFF, 0xFF, 0xFF);

fn lookup(dtype: &str) -> Option<&'static (&'static [&'static str], usize, Color)> {
    IO_TYPES.iter().find(|(names, _, _)| names.contains(&dtype))
}

/// Base color for an IO type, darkened for vectors.
pub fn port_color(dtype: &str, vlen: u32) -> Color {
    let base = lookup(dtype).map_or(DEFAULT_PORT_COLOR, |(_, _, c)| *c);
    let dark = [0.0, 0.0, 30.0, 50.0, 70.0][vlen.min(4) as usize] / 255.0;
    base.darken(dark)
}

/// Item size in bytes, `None` for unknown or sizeless types.
pub fn item_size(dtype: &str) -> Option<usize> {
    lookup(dtype).map(|(_, size, _)| *size).filter(|s| *s > 0)
}

/// Canonical name for a dtype alias (`fc32` → `complex`).
pub fn canonical_dtype(dtype: &str) -> &str {
    lookup(dtype).map_or(dtype, |(names, _, _)| names[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_color_and_size() {
        assert_eq!(port_color("complex", 1), port_color("fc32", 1));
        assert_eq!(item_size("f32"), Some(4));
        assert_eq!(canonical_dtype("s16"), "short");
    }

    #[test]
    fn vectors_are_darker() {
        let scalar = port_color("float", 1);
        let vector = port_color("float", 4);
        assert!(vector.r < scalar.r);
    }

    #[test]
    fn unknown_dtype_uses_default() {
        assert_eq!(port_color("whatever", 1), DEFAULT_PORT_COLOR);
        assert_eq!(item_size("bus"), None);
    }
}
