pub mod clipboard;
pub mod commands;
pub mod config;
pub mod input;
pub mod session;
pub mod shortcuts;
pub mod tools;

pub use clipboard::ClipboardData;
pub use commands::{BlockMove, Command, CommandStack};
pub use config::EditorConfig;
pub use input::{InputEvent, Modifiers};
pub use session::Session;
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use tools::{SelectTool, ToolState};
