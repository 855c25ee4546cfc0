use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::dom::KeyStroke;

pub const DEFAULT_TOGGLE_SHORTCUT: &str = "Ctrl+Shift+Q";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKey {
    Character(char),
    Function(u8),
    Enter,
    Escape,
    Space,
}

impl fmt::Display for ShortcutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Character(character) => write!(f, "{}", character.to_ascii_uppercase()),
            Self::Function(number) => write!(f, "F{number}"),
            Self::Enter => f.write_str("Enter"),
            Self::Escape => f.write_str("Escape"),
            Self::Space => f.write_str("Space"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortcutModifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl ShortcutModifiers {
    pub const fn new(ctrl: bool, shift: bool) -> Self {
        Self {
            ctrl,
            shift,
            alt: false,
            meta: false,
        }
    }

    pub fn from_stroke(stroke: &KeyStroke) -> Self {
        Self {
            ctrl: stroke.ctrl,
            shift: stroke.shift,
            alt: stroke.alt,
            meta: stroke.meta,
        }
    }

    pub const fn is_empty(self) -> bool {
        !(self.ctrl || self.shift || self.alt || self.meta)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortcutParseError {
    #[error("shortcut is empty")]
    Empty,
    #[error("unknown shortcut token: {token}")]
    UnknownToken { token: String },
    #[error("shortcut has no key: {shortcut}")]
    MissingKey { shortcut: String },
    #[error("shortcut has more than one key: {shortcut}")]
    MultipleKeys { shortcut: String },
}

/// A user-configured chord such as `Ctrl+Shift+Q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardShortcut {
    pub modifiers: ShortcutModifiers,
    pub key: ShortcutKey,
}

impl KeyboardShortcut {
    pub fn matches(&self, stroke: &KeyStroke) -> bool {
        normalize_key(&stroke.key) == Some(self.key)
            && ShortcutModifiers::from_stroke(stroke) == self.modifiers
    }
}

impl Default for KeyboardShortcut {
    fn default() -> Self {
        Self {
            modifiers: ShortcutModifiers::new(true, true),
            key: ShortcutKey::Character('q'),
        }
    }
}

impl FromStr for KeyboardShortcut {
    type Err = ShortcutParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(ShortcutParseError::Empty);
        }

        let mut modifiers = ShortcutModifiers::default();
        let mut key = None;
        for token in value.split('+').map(str::trim) {
            match token.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => modifiers.ctrl = true,
                "shift" => modifiers.shift = true,
                "alt" | "option" => modifiers.alt = true,
                "meta" | "cmd" | "command" | "super" => modifiers.meta = true,
                _ => {
                    let parsed =
                        normalize_key(token).ok_or_else(|| ShortcutParseError::UnknownToken {
                            token: token.to_string(),
                        })?;
                    if key.replace(parsed).is_some() {
                        return Err(ShortcutParseError::MultipleKeys {
                            shortcut: value.to_string(),
                        });
                    }
                }
            }
        }

        let key = key.ok_or_else(|| ShortcutParseError::MissingKey {
            shortcut: value.to_string(),
        })?;
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for KeyboardShortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.modifiers.ctrl {
            parts.push("Ctrl".to_string());
        }
        if self.modifiers.alt {
            parts.push("Alt".to_string());
        }
        if self.modifiers.shift {
            parts.push("Shift".to_string());
        }
        if self.modifiers.meta {
            parts.push("Meta".to_string());
        }
        parts.push(self.key.to_string());
        f.write_str(&parts.join("+"))
    }
}

/// Maps a DOM `KeyboardEvent.key` value onto a shortcut key.
pub fn normalize_key(key: &str) -> Option<ShortcutKey> {
    match key.to_ascii_lowercase().as_str() {
        "escape" | "esc" => return Some(ShortcutKey::Escape),
        "enter" | "return" => return Some(ShortcutKey::Enter),
        " " | "space" | "spacebar" => return Some(ShortcutKey::Space),
        _ => {}
    }

    let mut chars = key.chars();
    if let (Some(character), None) = (chars.next(), chars.next()) {
        if character.is_ascii_graphic() {
            return Some(ShortcutKey::Character(character.to_ascii_lowercase()));
        }
        return None;
    }

    let number = key
        .strip_prefix('F')
        .or_else(|| key.strip_prefix('f'))?
        .parse::<u8>()
        .ok()?;
    (1..=24)
        .contains(&number)
        .then_some(ShortcutKey::Function(number))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputContext {
    pub selection_active: bool,
    pub modal_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    ToggleSelection,
    StopSelection,
    CloseModal,
}

pub fn resolve_shortcut(
    stroke: &KeyStroke,
    toggle: &KeyboardShortcut,
    context: InputContext,
) -> Option<ShortcutAction> {
    if toggle.matches(stroke) {
        return Some(ShortcutAction::ToggleSelection);
    }

    let plain_escape = normalize_key(&stroke.key) == Some(ShortcutKey::Escape)
        && ShortcutModifiers::from_stroke(stroke).is_empty();
    if !plain_escape {
        return None;
    }

    if context.selection_active {
        return Some(ShortcutAction::StopSelection);
    }

    if context.modal_open {
        return Some(ShortcutAction::CloseModal);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_modifiers_and_key_case_insensitively() {
        let shortcut: KeyboardShortcut = "ctrl+SHIFT+q".parse().expect("shortcut parses");
        assert_eq!(shortcut, KeyboardShortcut::default());
        assert_eq!(shortcut.to_string(), DEFAULT_TOGGLE_SHORTCUT);

        let shortcut: KeyboardShortcut = "Alt + F2".parse().expect("shortcut parses");
        assert!(shortcut.modifiers.alt);
        assert_eq!(shortcut.key, ShortcutKey::Function(2));
    }

    #[test]
    fn parse_rejects_malformed_shortcuts() {
        assert_eq!("".parse::<KeyboardShortcut>(), Err(ShortcutParseError::Empty));
        assert!(matches!(
            "Ctrl+Shift".parse::<KeyboardShortcut>(),
            Err(ShortcutParseError::MissingKey { .. })
        ));
        assert!(matches!(
            "Ctrl+A+B".parse::<KeyboardShortcut>(),
            Err(ShortcutParseError::MultipleKeys { .. })
        ));
        assert!(matches!(
            "Hyper+Q".parse::<KeyboardShortcut>(),
            Err(ShortcutParseError::UnknownToken { .. })
        ));
    }

    #[test]
    fn matches_requires_exact_modifier_set() {
        let shortcut = KeyboardShortcut::default();
        assert!(shortcut.matches(&KeyStroke::new("Q").with_ctrl().with_shift()));
        assert!(shortcut.matches(&KeyStroke::new("q").with_ctrl().with_shift()));
        assert!(!shortcut.matches(&KeyStroke::new("q").with_ctrl()));
        assert!(!shortcut.matches(&KeyStroke::new("q").with_ctrl().with_shift().with_alt()));
    }

    #[test]
    fn resolve_shortcut_prioritizes_toggle_then_selection_then_modal() {
        let toggle = KeyboardShortcut::default();
        let everything = InputContext {
            selection_active: true,
            modal_open: true,
        };
        assert_eq!(
            resolve_shortcut(&KeyStroke::new("Q").with_ctrl().with_shift(), &toggle, everything),
            Some(ShortcutAction::ToggleSelection)
        );
        assert_eq!(
            resolve_shortcut(&KeyStroke::new("Escape"), &toggle, everything),
            Some(ShortcutAction::StopSelection)
        );
        assert_eq!(
            resolve_shortcut(
                &KeyStroke::new("Escape"),
                &toggle,
                InputContext {
                    modal_open: true,
                    ..Default::default()
                }
            ),
            Some(ShortcutAction::CloseModal)
        );
        assert_eq!(
            resolve_shortcut(&KeyStroke::new("Escape"), &toggle, InputContext::default()),
            None
        );
        assert_eq!(
            resolve_shortcut(&KeyStroke::new("Escape").with_ctrl(), &toggle, everything),
            None
        );
    }

    #[test]
    fn normalize_key_handles_named_and_function_keys() {
        assert_eq!(normalize_key("Esc"), Some(ShortcutKey::Escape));
        assert_eq!(normalize_key(" "), Some(ShortcutKey::Space));
        assert_eq!(normalize_key("F12"), Some(ShortcutKey::Function(12)));
        assert_eq!(normalize_key("F30"), None);
        assert_eq!(normalize_key("Shift"), None);
    }
}
