use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::input::{KeyboardShortcut, DEFAULT_TOGGLE_SHORTCUT};
use crate::storage::{SettingsStore, StorageError, StoredValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigPathError {
    #[error("neither XDG_CONFIG_HOME nor HOME is set")]
    MissingHomeDirectory,
}

const APP_DIR: &str = "got-clue";
const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_MODEL: &str = "gpt-4o";
const API_KEY_PREFIX: &str = "sk-";

const KEY_API_KEY: &str = "apiKey";
const KEY_MODEL: &str = "model";
const KEY_USER_PROMPT: &str = "userPrompt";
const KEY_KEYBOARD_SHORTCUT: &str = "keyboardShortcut";
const CONFIG_KEYS: [&str; 4] = [KEY_API_KEY, KEY_MODEL, KEY_USER_PROMPT, KEY_KEYBOARD_SHORTCUT];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("please enter an OpenAI API key")]
    MissingApiKey,
    #[error("API key should start with \"sk-\"")]
    InvalidApiKey,
    #[error("invalid keyboard shortcut: {0}")]
    InvalidShortcut(#[from] crate::input::ShortcutParseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// User settings shared by the background controller and the settings surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default = "default_shortcut")]
    pub keyboard_shortcut: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_shortcut() -> String {
    DEFAULT_TOGGLE_SHORTCUT.to_string()
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            user_prompt: String::new(),
            keyboard_shortcut: default_shortcut(),
        }
    }
}

impl ExtensionConfig {
    /// Reads the config, substituting defaults for missing or empty values.
    pub fn load(store: &dyn SettingsStore) -> ConfigResult<Self> {
        let values = store.get(&CONFIG_KEYS)?;
        Ok(Self::from_values(&values))
    }

    /// Like [`ExtensionConfig::load`] but never fails: unreadable storage
    /// yields the defaults, which count as unconfigured.
    pub fn load_or_default(store: &dyn SettingsStore) -> Self {
        Self::load(store).unwrap_or_else(|err| {
            tracing::warn!(?err, "failed to read settings; using defaults");
            Self::default()
        })
    }

    fn from_values(values: &StoredValues) -> Self {
        let text = |key: &str| {
            values
                .get(key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            api_key: text(KEY_API_KEY).unwrap_or_default(),
            model: text(KEY_MODEL).unwrap_or_else(default_model),
            user_prompt: text(KEY_USER_PROMPT).unwrap_or_default(),
            keyboard_shortcut: text(KEY_KEYBOARD_SHORTCUT).unwrap_or_else(default_shortcut),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !api_key.starts_with(API_KEY_PREFIX) {
            return Err(ConfigError::InvalidApiKey);
        }
        self.keyboard_shortcut.parse::<KeyboardShortcut>()?;
        Ok(())
    }

    /// Validates and persists the config. Text fields are trimmed first.
    pub fn save(&self, store: &dyn SettingsStore) -> ConfigResult<()> {
        let normalized = Self {
            api_key: self.api_key.trim().to_string(),
            model: self.model.trim().to_string(),
            user_prompt: self.user_prompt.trim().to_string(),
            keyboard_shortcut: self.keyboard_shortcut.trim().to_string(),
        };
        normalized.validate()?;

        store.set(StoredValues::from([
            (KEY_API_KEY.to_string(), Value::from(normalized.api_key)),
            (KEY_MODEL.to_string(), Value::from(normalized.model)),
            (KEY_USER_PROMPT.to_string(), Value::from(normalized.user_prompt)),
            (
                KEY_KEYBOARD_SHORTCUT.to_string(),
                Value::from(normalized.keyboard_shortcut),
            ),
        ]))?;
        tracing::info!("settings saved");
        Ok(())
    }

    /// Restores every field to its default; nothing is persisted until `save`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The parsed toggle shortcut, falling back to the default chord.
    pub fn toggle_shortcut(&self) -> KeyboardShortcut {
        self.keyboard_shortcut.parse().unwrap_or_else(|err| {
            tracing::warn!(?err, shortcut = %self.keyboard_shortcut, "invalid shortcut; using default");
            KeyboardShortcut::default()
        })
    }
}

pub fn settings_path() -> Result<PathBuf, ConfigPathError> {
    let (xdg_config_home, home) = config_env_dirs();
    app_config_path(
        APP_DIR,
        SETTINGS_FILE,
        xdg_config_home.as_deref(),
        home.as_deref(),
    )
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}
