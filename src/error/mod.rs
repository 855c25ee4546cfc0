use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::BridgeError;
use crate::config::{ConfigError, ConfigPathError};
use crate::content::ContentError;
use crate::dom::{SelectorError, SnapshotError};
use crate::llm::LlmError;
use crate::ocr::OcrError;
use crate::runtime::RuntimeError;
use crate::state::StateError;
use crate::storage::StorageError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ConfigPath(#[from] ConfigPathError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not configured; add an API key to {path}")]
    NotConfigured { path: PathBuf },
    #[error("no element matches `{selector}`")]
    ElementNotFound { selector: String },
    #[error("page document lock poisoned")]
    DocumentPoisoned,
    #[error("no answer within {0:?}")]
    NoAnswer(Duration),
}
