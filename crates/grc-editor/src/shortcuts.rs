//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic `ShortcutAction`s, following the
//! GNU Radio Companion bindings:
//! - ←/→ rotate the selection counter-clockwise/clockwise
//! - E/D/B enable, disable and bypass the selection
//! - ⌘Z/⌘Y (or ⌘⇧Z) undo and redo

/// Actions that keyboard shortcuts can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    // ── Edit ──
    Undo,
    Redo,
    Copy,
    Cut,
    Paste,
    Delete,
    SelectAll,
    Deselect,

    // ── Blocks ──
    RotateLeft,
    RotateRight,
    Enable,
    Disable,
    Bypass,
}

/// Resolves key events into shortcut actions.
///
/// Uses platform-aware modifier detection: on macOS `meta` is ⌘,
/// on other platforms `ctrl` serves the same role.
pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a key event to an action.
    ///
    /// `key` is the `KeyboardEvent.key` value (e.g. `"z"`, `"Delete"`).
    /// Returns `None` if the key combo has no binding.
    pub fn resolve(key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> Option<ShortcutAction> {
        let cmd = ctrl || meta;
        if alt {
            return None;
        }

        if cmd && shift {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Redo),
                _ => None,
            };
        }

        if cmd {
            return match key {
                "z" | "Z" => Some(ShortcutAction::Undo),
                "y" | "Y" => Some(ShortcutAction::Redo),
                "a" | "A" => Some(ShortcutAction::SelectAll),
                "c" | "C" => Some(ShortcutAction::Copy),
                "x" | "X" => Some(ShortcutAction::Cut),
                "v" | "V" => Some(ShortcutAction::Paste),
                _ => None,
            };
        }

        if shift {
            return None;
        }

        match key {
            "ArrowLeft" | "Left" => Some(ShortcutAction::RotateLeft),
            "ArrowRight" | "Right" => Some(ShortcutAction::RotateRight),
            "e" | "E" => Some(ShortcutAction::Enable),
            "d" | "D" => Some(ShortcutAction::Disable),
            "b" | "B" => Some(ShortcutAction::Bypass),
            "Delete" | "Backspace" => Some(ShortcutAction::Delete),
            "Escape" => Some(ShortcutAction::Deselect),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_undo_redo() {
        assert_eq!(
            ShortcutMap::resolve("z", true, false, false, false),
            Some(ShortcutAction::Undo)
        );
        assert_eq!(
            ShortcutMap::resolve("Z", false, true, false, true),
            Some(ShortcutAction::Redo)
        );
        assert_eq!(
            ShortcutMap::resolve("y", true, false, false, false),
            Some(ShortcutAction::Redo)
        );
    }

    #[test]
    fn resolve_clipboard() {
        assert_eq!(
            ShortcutMap::resolve("c", false, false, false, true),
            Some(ShortcutAction::Copy)
        );
        assert_eq!(
            ShortcutMap::resolve("x", true, false, false, false),
            Some(ShortcutAction::Cut)
        );
        assert_eq!(
            ShortcutMap::resolve("v", true, false, false, false),
            Some(ShortcutAction::Paste)
        );
    }

    #[test]
    fn resolve_block_actions() {
        assert_eq!(
            ShortcutMap::resolve("ArrowLeft", false, false, false, false),
            Some(ShortcutAction::RotateLeft)
        );
        assert_eq!(
            ShortcutMap::resolve("Right", false, false, false, false),
            Some(ShortcutAction::RotateRight)
        );
        assert_eq!(
            ShortcutMap::resolve("e", false, false, false, false),
            Some(ShortcutAction::Enable)
        );
        assert_eq!(
            ShortcutMap::resolve("d", false, false, false, false),
            Some(ShortcutAction::Disable)
        );
        assert_eq!(
            ShortcutMap::resolve("b", false, false, false, false),
            Some(ShortcutAction::Bypass)
        );
    }

    #[test]
    fn resolve_modifier_precedence() {
        assert_eq!(ShortcutMap::resolve("z", false, false, false, false), None);
        assert_eq!(
            ShortcutMap::resolve("d", true, false, false, false),
            None,
            "⌘D is not disable"
        );
        assert_eq!(ShortcutMap::resolve("e", false, false, true, false), None);
    }

    #[test]
    fn resolve_unknown_key() {
        assert_eq!(ShortcutMap::resolve("q", false, false, false, false), None);
        assert_eq!(ShortcutMap::resolve("7", false, false, false, false), None);
    }
}
