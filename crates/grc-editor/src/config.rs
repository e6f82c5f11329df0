//! Editor settings.

use grc_core::{LayoutConfig, Vec2};
use serde::{Deserialize, Serialize};

/// Per-session editor settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Oldest commands are dropped past this many.
    pub max_undo_depth: usize,
    /// Shift applied to pasted blocks relative to the copied ones.
    pub paste_offset: Vec2,
    /// Degrees per rotate-left/right action.
    pub rotation_step: i32,
    pub layout: LayoutConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: 100,
            paste_offset: Vec2::new(20.0, 20.0),
            rotation_step: 90,
            layout: LayoutConfig::default(),
        }
    }
}

impl EditorConfig {
    /// # Errors
    /// Malformed JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EditorConfig::from_json(r#"{ "max_undo_depth": 5, "layout": { "port_height": 20 } }"#).unwrap();
        assert_eq!(config.max_undo_depth, 5);
        assert_eq!(config.paste_offset, Vec2::new(20.0, 20.0));
        assert_eq!(config.rotation_step, 90);
        assert_eq!(config.layout.port_height, 20.0);
        assert_eq!(config.layout.base_height, 30.0);
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(EditorConfig::from_json(r#"{ "max_undo_depth": "lots" }"#).is_err());
    }
}
