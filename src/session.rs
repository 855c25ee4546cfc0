//! Wires the worlds together for one page: page world, content script and
//! background controller, each joined only by its message channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::background::{BackgroundHandle, BackgroundService, Orchestrator, SettingsSurface};
use crate::bridge::{BridgeConfig, OcrBridge, PageWorld, PageWorldHandle, WindowChannel};
use crate::config::{settings_path, ExtensionConfig};
use crate::content::ContentScript;
use crate::dom::{PageEvent, PageSnapshot, SharedDocument};
use crate::error::{AppError, AppResult};
use crate::llm::OpenAiClient;
use crate::modal::{DesktopModal, InMemoryModal, ModalFanout, ModalView};
use crate::ocr::{resolve_model_dir, PaddleRecognizer};
use crate::runtime::runtime_channel;
use crate::storage::{JsonFileStore, SettingsStore};

const COMMAND_WAIT: Duration = Duration::from_secs(2);
const ANSWER_WAIT: Duration = Duration::from_secs(90);
const ANSWER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Points the user at the settings file.
pub struct SettingsFileSurface {
    path: PathBuf,
}

impl SettingsFileSurface {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SettingsSurface for SettingsFileSurface {
    fn open_settings(&self) {
        tracing::warn!(
            path = %self.path.display(),
            "got-clue is not configured; add an \"apiKey\" to the settings file"
        );
    }
}

fn spawn_page_world(
    document: &SharedDocument,
    channel: &WindowChannel,
    frames_dir: PathBuf,
) -> Option<PageWorldHandle> {
    let Some(model_dir) = resolve_model_dir() else {
        tracing::warn!("no OCR models installed; media will be sent as html");
        return None;
    };
    let recognizer = match PaddleRecognizer::from_model_dir(&model_dir, frames_dir) {
        Ok(recognizer) => recognizer,
        Err(err) => {
            tracing::warn!(%err, "OCR engine unavailable; media will be sent as html");
            return None;
        }
    };
    match PageWorld::new(document.clone(), channel.clone(), Box::new(recognizer)).spawn() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(%err, "failed to start page world");
            None
        }
    }
}

/// Loads a page snapshot, picks the element matching `selector` the way a
/// user would, and waits for the modal the background shows.
pub fn pick_from_snapshot(snapshot_path: &Path, selector: &str) -> AppResult<ModalView> {
    let document = PageSnapshot::load(snapshot_path)?
        .into_document()?
        .into_shared();
    let frames_dir = snapshot_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let settings_file = settings_path()?;
    let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::new(settings_file.clone()));
    let config = ExtensionConfig::load_or_default(store.as_ref());

    let channel = WindowChannel::new();
    let bridge = OcrBridge::new(channel.clone(), BridgeConfig::default());
    let page_world = spawn_page_world(&document, &channel, frames_dir);

    let modal = InMemoryModal::new();
    let (port, inbox) = runtime_channel();
    let (content, tab) = ContentScript::new(
        document.clone(),
        bridge,
        port,
        config.toggle_shortcut(),
    )?;
    let mut content = content.with_modal(modal.clone());
    if page_world.is_some() {
        let ready = content.bridge().await_ready();
        tracing::info!(ready, "page loaded");
    }

    let orchestrator = Orchestrator::new(
        store,
        Box::new(OpenAiClient::new()?),
        Box::new(ModalFanout::new().with(modal.clone()).with(DesktopModal::new())),
        Box::new(tab),
        Box::new(SettingsFileSurface::new(settings_file.clone())),
    );
    let background = BackgroundService::new(orchestrator, inbox).spawn()?;

    let result = drive_pick(&mut content, &background, &document, &modal, selector, &settings_file);

    drop(background);
    if let Some(page_world) = page_world {
        page_world.shutdown();
    }
    result
}

fn drive_pick(
    content: &mut ContentScript,
    background: &BackgroundHandle,
    document: &SharedDocument,
    modal: &InMemoryModal,
    selector: &str,
    settings_file: &Path,
) -> AppResult<ModalView> {
    background.toggle();
    if !content.poll_command(COMMAND_WAIT)? {
        return Err(AppError::NotConfigured {
            path: settings_file.to_path_buf(),
        });
    }

    let target = document
        .read()
        .map_err(|_| AppError::DocumentPoisoned)?
        .query_selector(selector)?
        .ok_or_else(|| AppError::ElementNotFound {
            selector: selector.to_string(),
        })?;
    tracing::info!(selector, "picking element");
    content.dispatch(PageEvent::PointerOver { target })?;
    content.dispatch(PageEvent::Click { target })?;

    let deadline = Instant::now() + ANSWER_WAIT;
    while Instant::now() < deadline {
        if let Some(view) = modal.current() {
            return Ok(view);
        }
        std::thread::sleep(ANSWER_POLL_INTERVAL);
    }
    Err(AppError::NoAnswer(ANSWER_WAIT))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::background::fakes::{CountingSettings, RecordingSummarizer};
    use crate::dom::Document;
    use crate::input::KeyboardShortcut;
    use crate::modal::{ModalKind, AUTO_DISMISS_AFTER};
    use crate::ocr::{OcrResult, TextRecognizer};
    use crate::storage::MemoryStore;

    struct QuizFrame;

    impl TextRecognizer for QuizFrame {
        fn recognize(&self, _source: &str) -> OcrResult<String> {
            Ok("What is 2+2? A) 3 B) 4".to_string())
        }
    }

    #[test]
    fn picking_quiz_image_ends_in_auto_closing_answer() {
        let mut doc = Document::new();
        let body = doc.body();
        let quiz = doc.create_element("img");
        doc.set_attribute(quiz, "class", "question");
        doc.set_attribute(quiz, "src", "quiz.png");
        doc.append_child(body, quiz);
        let document = doc.into_shared();

        let channel = WindowChannel::new();
        let bridge = OcrBridge::new(channel.clone(), BridgeConfig::default());
        let page_world = PageWorld::new(document.clone(), channel, Box::new(QuizFrame))
            .spawn()
            .expect("page world spawns");

        let modal = InMemoryModal::new();
        let summarizer = RecordingSummarizer::default();
        let (port, inbox) = runtime_channel();
        let (content, tab) =
            ContentScript::new(document.clone(), bridge, port, KeyboardShortcut::default())
                .expect("content script attaches");
        let mut content = content.with_modal(modal.clone());
        assert!(content.bridge().await_ready(), "page world announces readiness");
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryStore::with_values([("apiKey", Value::from("sk-test"))])),
            Box::new(summarizer.clone()),
            Box::new(modal.clone()),
            Box::new(tab),
            Box::new(CountingSettings::default()),
        );
        let background = BackgroundService::new(orchestrator, inbox)
            .spawn()
            .expect("background spawns");

        let view = drive_pick(
            &mut content,
            &background,
            &document,
            &modal,
            "img.question",
            Path::new("settings.json"),
        )
        .expect("pick produces a modal");

        assert_eq!(view.kind, ModalKind::Response);
        assert_eq!(view.text, "Answer: B\nExplanation: 2+2=4");
        let prompts = summarizer.prompts.lock().expect("prompt log lock");
        assert!(prompts[0].ends_with("Below is the question and options:\nWhat is 2+2? A) 3 B) 4"));

        let closes_at = view.auto_close_at.expect("responses auto-close");
        assert!(closes_at <= Instant::now() + AUTO_DISMISS_AFTER);
        content
            .poll_command(Duration::from_millis(10))
            .expect("poll before deadline");
        assert!(modal.current().is_some(), "answer stays up until its deadline");

        std::thread::sleep(closes_at.saturating_duration_since(Instant::now()));
        content
            .poll_command(Duration::from_millis(10))
            .expect("poll after deadline");
        assert_eq!(modal.current(), None);

        drop(background);
        page_world.shutdown();
    }

    #[test]
    fn unconfigured_pick_reports_settings_path() {
        let document = Document::new().into_shared();
        let channel = WindowChannel::new();
        let bridge = OcrBridge::new(channel, BridgeConfig::default());
        let modal = InMemoryModal::new();
        let settings = CountingSettings::default();
        let (port, inbox) = runtime_channel();
        let (mut content, tab) =
            ContentScript::new(document.clone(), bridge, port, KeyboardShortcut::default())
                .expect("content script attaches");
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryStore::new()),
            Box::new(RecordingSummarizer::default()),
            Box::new(modal.clone()),
            Box::new(tab),
            Box::new(settings.clone()),
        );
        let background = BackgroundService::new(orchestrator, inbox)
            .spawn()
            .expect("background spawns");

        let result = drive_pick(
            &mut content,
            &background,
            &document,
            &modal,
            "p",
            Path::new("/tmp/got-clue/settings.json"),
        );
        assert!(matches!(result, Err(AppError::NotConfigured { .. })));
        assert!(!content.selection().is_active());
        drop(background);
        assert_eq!(*settings.opened.lock().expect("settings counter lock"), 2);
    }
}
