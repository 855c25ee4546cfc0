mod shortcut;

pub use shortcut::{
    normalize_key, resolve_shortcut, InputContext, KeyboardShortcut, ShortcutAction,
    ShortcutKey, ShortcutModifiers, ShortcutParseError, DEFAULT_TOGGLE_SHORTCUT,
};
