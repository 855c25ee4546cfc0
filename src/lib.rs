pub mod background;
pub mod bridge;
pub mod config;
pub mod content;
pub mod dom;
pub mod error;
pub mod geometry;
pub mod input;
pub mod llm;
pub mod logging;
pub mod modal;
pub mod ocr;
pub mod overlay;
pub mod runtime;
pub mod selection;
pub mod session;
pub mod state;
pub mod storage;
pub mod text;
mod worker;
pub use error::{AppError, AppResult};

use std::path::Path;

use modal::ModalView;

/// Entrypoint used by the CLI: picks `selector` in the page snapshot and
/// returns the modal the background ends up showing.
pub fn run(snapshot_path: &Path, selector: &str) -> AppResult<ModalView> {
    logging::init();
    tracing::info!(snapshot = %snapshot_path.display(), "starting got-clue");

    let view = session::pick_from_snapshot(snapshot_path, selector)?;

    tracing::info!(kind = ?view.kind, "pick complete");
    Ok(view)
}
