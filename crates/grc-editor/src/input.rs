//! Input abstraction layer.
//!
//! Normalizes pointer and keyboard events from the host shell into a unified
//! `InputEvent` enum consumed by tools and the shortcut map. Coordinates are
//! scene coordinates.

use grc_core::Point;

/// Modifier keys held during a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };
}

/// A normalized input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Primary button pressed.
    PointerDown { x: f64, y: f64, modifiers: Modifiers },

    /// Pointer moved, pressed or not.
    PointerMove { x: f64, y: f64, modifiers: Modifiers },

    /// Primary button released.
    PointerUp { x: f64, y: f64, modifiers: Modifiers },

    /// Keyboard shortcut. `key` is the `KeyboardEvent.key` value.
    Key {
        key: String,
        ctrl: bool,
        shift: bool,
        alt: bool,
        meta: bool,
    },
}

impl InputEvent {
    pub fn pointer_down(x: f64, y: f64) -> Self {
        Self::PointerDown { x, y, modifiers: Modifiers::NONE }
    }

    pub fn pointer_move(x: f64, y: f64) -> Self {
        Self::PointerMove { x, y, modifiers: Modifiers::NONE }
    }

    pub fn pointer_up(x: f64, y: f64) -> Self {
        Self::PointerUp { x, y, modifiers: Modifiers::NONE }
    }

    /// A key press without modifiers.
    pub fn key(key: &str) -> Self {
        Self::Key {
            key: key.to_string(),
            ctrl: false,
            shift: false,
            alt: false,
            meta: false,
        }
    }

    /// A key press with the platform command modifier (ctrl).
    pub fn ctrl_key(key: &str) -> Self {
        Self::Key {
            key: key.to_string(),
            ctrl: true,
            shift: false,
            alt: false,
            meta: false,
        }
    }

    /// Extract position if this is a pointer event.
    pub fn position(&self) -> Option<Point> {
        match self {
            Self::PointerDown { x, y, .. }
            | Self::PointerMove { x, y, .. }
            | Self::PointerUp { x, y, .. } => Some(Point::new(*x, *y)),
            Self::Key { .. } => None,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            Self::PointerDown { modifiers, .. }
            | Self::PointerMove { modifiers, .. }
            | Self::PointerUp { modifiers, .. } => *modifiers,
            Self::Key { ctrl, shift, alt, meta, .. } => Modifiers {
                shift: *shift,
                ctrl: *ctrl,
                alt: *alt,
                meta: *meta,
            },
        }
    }
}
