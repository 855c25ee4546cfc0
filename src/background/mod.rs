//! Background controller: gates selection on configuration, turns picked
//! elements into prompts, and reports answers through the modal.

mod service;

pub use service::{BackgroundCommand, BackgroundHandle, BackgroundService};

use std::sync::Arc;

use crate::config::ExtensionConfig;
use crate::llm::{build_prompt, Summarizer};
use crate::modal::ModalPresenter;
use crate::runtime::{ElementSelected, IncomingMessage, RuntimeAck, RuntimeMessage, RuntimeResult};
use crate::storage::SettingsStore;
use crate::text::html_to_text;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("OpenAI API key not configured. Please set it in the extension options.")]
    NotConfigured,
    #[error("No content to process")]
    NoContent,
    #[error("No text content could be extracted from the selected element")]
    NoTextContent,
    #[error("{0}")]
    RemoteApiFailed(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// The tab the selection runs in.
pub trait TabController: Send {
    fn start_selection(&self) -> RuntimeResult<()>;
    fn stop_selection(&self) -> RuntimeResult<()>;
}

/// Wherever the user edits settings.
pub trait SettingsSurface: Send {
    fn open_settings(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    OpenedSettings,
    Started,
    Stopped,
    TabUnavailable,
}

pub struct Orchestrator {
    store: Arc<dyn SettingsStore>,
    summarizer: Box<dyn Summarizer>,
    modal: Box<dyn ModalPresenter>,
    tab: Box<dyn TabController>,
    settings: Box<dyn SettingsSurface>,
    selection_mode: bool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        summarizer: Box<dyn Summarizer>,
        modal: Box<dyn ModalPresenter>,
        tab: Box<dyn TabController>,
        settings: Box<dyn SettingsSurface>,
    ) -> Self {
        Self {
            store,
            summarizer,
            modal,
            tab,
            settings,
            selection_mode: false,
        }
    }

    pub fn selection_mode(&self) -> bool {
        self.selection_mode
    }

    fn config(&self) -> ExtensionConfig {
        ExtensionConfig::load_or_default(self.store.as_ref())
    }

    /// Opens the settings surface when no API key has been saved yet.
    pub fn on_startup(&self) -> bool {
        if self.config().is_configured() {
            return false;
        }
        tracing::info!("no API key configured; opening settings");
        self.settings.open_settings();
        true
    }

    /// Toolbar button and command shortcut.
    pub fn toggle_selection(&mut self) -> ToggleOutcome {
        if !self.config().is_configured() {
            tracing::info!("selection requested before configuration; opening settings");
            self.settings.open_settings();
            return ToggleOutcome::OpenedSettings;
        }

        self.selection_mode = !self.selection_mode;
        let (result, outcome) = if self.selection_mode {
            (self.tab.start_selection(), ToggleOutcome::Started)
        } else {
            (self.tab.stop_selection(), ToggleOutcome::Stopped)
        };
        match result {
            Ok(()) => {
                tracing::debug!(?outcome, "selection toggled");
                outcome
            }
            Err(err) => {
                tracing::warn!(%err, "failed to reach tab; selection mode reset");
                self.selection_mode = false;
                ToggleOutcome::TabUnavailable
            }
        }
    }

    /// Acknowledges a content message, then acts on it.
    pub fn handle_message(&mut self, incoming: IncomingMessage) {
        let message = incoming.message.clone();
        incoming.respond(RuntimeAck { success: true });

        match message {
            RuntimeMessage::ElementSelected(selected) => {
                self.selection_mode = false;
                self.handle_selected(&selected);
            }
            RuntimeMessage::SelectionStopped => {
                self.selection_mode = false;
                tracing::debug!("selection stopped in page");
            }
            RuntimeMessage::ToggleSelection => {
                self.toggle_selection();
            }
        }
    }

    /// Runs the pipeline and shows either the answer or the error.
    pub fn handle_selected(&self, selected: &ElementSelected) {
        match self.process_selected(selected) {
            Ok(answer) => self.modal.show_response(&answer),
            Err(PipelineError::NotConfigured) => {
                self.modal.show_error(&PipelineError::NotConfigured.to_string())
            }
            Err(err) => {
                tracing::warn!(%err, "processing selected element failed");
                self.modal
                    .show_error(&format!("Error processing request: {err}"));
            }
        }
    }

    pub fn process_selected(&self, selected: &ElementSelected) -> PipelineResult<String> {
        let config = self.config();
        if !config.is_configured() {
            return Err(PipelineError::NotConfigured);
        }

        let content = match (&selected.extracted_text, &selected.html) {
            (Some(text), _) if !text.is_empty() => {
                if let Some(warning) = &selected.error {
                    tracing::warn!(%warning, "ocr reported a warning");
                }
                tracing::info!(
                    element_type = selected.element_type.as_str(),
                    "using text extracted from media"
                );
                text.clone()
            }
            (_, Some(html)) if !html.is_empty() => {
                if let Some(error) = &selected.error {
                    tracing::warn!(%error, "ocr failed; using element markup");
                }
                html_to_text(html)
            }
            _ => return Err(PipelineError::NoContent),
        };
        if content.trim().is_empty() {
            return Err(PipelineError::NoTextContent);
        }

        let prompt = build_prompt(&content, &config.user_prompt);
        tracing::info!(model = %config.model, "asking model");
        self.summarizer
            .complete(&prompt, &config.api_key, &config.model)
            .map_err(|err| PipelineError::RemoteApiFailed(err.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::llm::{LlmError, LlmResult};
    use crate::runtime::RuntimeError;

    #[derive(Clone, Default)]
    pub struct RecordingSummarizer {
        pub prompts: Arc<Mutex<Vec<String>>>,
        pub failure: Option<String>,
    }

    impl Summarizer for RecordingSummarizer {
        fn complete(&self, prompt: &str, _api_key: &str, _model: &str) -> LlmResult<String> {
            self.prompts
                .lock()
                .expect("prompt log lock")
                .push(prompt.to_string());
            match &self.failure {
                Some(message) => Err(LlmError::Api(message.clone())),
                None => Ok("Answer: B\nExplanation: 2+2=4".to_string()),
            }
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingTab {
        pub commands: Arc<Mutex<Vec<&'static str>>>,
        pub unreachable: bool,
    }

    impl TabController for RecordingTab {
        fn start_selection(&self) -> RuntimeResult<()> {
            if self.unreachable {
                return Err(RuntimeError::ContextInvalidated);
            }
            self.commands.lock().expect("tab log lock").push("start");
            Ok(())
        }

        fn stop_selection(&self) -> RuntimeResult<()> {
            if self.unreachable {
                return Err(RuntimeError::ContextInvalidated);
            }
            self.commands.lock().expect("tab log lock").push("stop");
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub struct CountingSettings {
        pub opened: Arc<Mutex<usize>>,
    }

    impl SettingsSurface for CountingSettings {
        fn open_settings(&self) {
            *self.opened.lock().expect("settings counter lock") += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::llm::OpenAiClient;
    use crate::modal::{InMemoryModal, ModalKind};
    use crate::ocr::ElementKind;
    use crate::runtime::runtime_channel;
    use crate::storage::MemoryStore;
    use serde_json::Value;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        orchestrator: Orchestrator,
        summarizer: RecordingSummarizer,
        modal: InMemoryModal,
        tab: RecordingTab,
        settings: CountingSettings,
    }

    fn harness(api_key: Option<&str>, summarizer: RecordingSummarizer, tab: RecordingTab) -> Harness {
        let store = match api_key {
            Some(key) => MemoryStore::with_values([
                ("apiKey", Value::from(key)),
                ("userPrompt", Value::from("")),
            ]),
            None => MemoryStore::new(),
        };
        let modal = InMemoryModal::new();
        let settings = CountingSettings::default();
        let orchestrator = Orchestrator::new(
            Arc::new(store),
            Box::new(summarizer.clone()),
            Box::new(modal.clone()),
            Box::new(tab.clone()),
            Box::new(settings.clone()),
        );
        Harness {
            orchestrator,
            summarizer,
            modal,
            tab,
            settings,
        }
    }

    fn configured() -> Harness {
        harness(
            Some("sk-test"),
            RecordingSummarizer::default(),
            RecordingTab::default(),
        )
    }

    #[test]
    fn toggle_without_api_key_opens_settings_instead() {
        let mut h = harness(None, RecordingSummarizer::default(), RecordingTab::default());

        assert_eq!(h.orchestrator.toggle_selection(), ToggleOutcome::OpenedSettings);
        assert_eq!(*h.settings.opened.lock().expect("lock"), 1);
        assert!(h.tab.commands.lock().expect("lock").is_empty());
        assert!(!h.orchestrator.selection_mode());
    }

    #[test]
    fn startup_opens_settings_only_when_unconfigured() {
        let h = harness(None, RecordingSummarizer::default(), RecordingTab::default());
        assert!(h.orchestrator.on_startup());
        assert!(!configured().orchestrator.on_startup());
    }

    #[test]
    fn toggle_alternates_start_and_stop() {
        let mut h = configured();
        assert_eq!(h.orchestrator.toggle_selection(), ToggleOutcome::Started);
        assert!(h.orchestrator.selection_mode());
        assert_eq!(h.orchestrator.toggle_selection(), ToggleOutcome::Stopped);
        assert_eq!(*h.tab.commands.lock().expect("lock"), vec!["start", "stop"]);
    }

    #[test]
    fn unreachable_tab_resets_selection_mode() {
        let mut h = harness(
            Some("sk-test"),
            RecordingSummarizer::default(),
            RecordingTab {
                unreachable: true,
                ..RecordingTab::default()
            },
        );
        assert_eq!(h.orchestrator.toggle_selection(), ToggleOutcome::TabUnavailable);
        assert!(!h.orchestrator.selection_mode());
    }

    #[test]
    fn extracted_text_goes_into_prompt_and_answer_into_modal() {
        let h = configured();
        h.orchestrator.handle_selected(&ElementSelected::from_text(
            "What is 2+2? A) 3 B) 4".to_string(),
            ElementKind::Image,
        ));

        let prompts = h.summarizer.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("Below is the question and options:\nWhat is 2+2? A) 3 B) 4"));

        let view = h.modal.current().expect("answer modal open");
        assert_eq!(view.kind, ModalKind::Response);
        assert_eq!(view.text, "Answer: B\nExplanation: 2+2=4");
        assert!(view.auto_close_at.is_some());
    }

    #[test]
    fn html_is_reduced_to_text_before_prompting() {
        let h = configured();
        h.orchestrator.handle_selected(&ElementSelected::from_html(
            "<p>What is 2+2? <b>A) 3</b> <b>B) 4</b></p>".to_string(),
            ElementKind::Html,
        ));
        let prompts = h.summarizer.prompts.lock().expect("lock");
        assert!(prompts[0].ends_with("\nWhat is 2+2? A) 3 B) 4"));
    }

    #[test]
    fn empty_markup_shows_persistent_error() {
        let h = configured();
        h.orchestrator.handle_selected(
            &ElementSelected::from_html("<img src=\"q.png\">".to_string(), ElementKind::Image)
                .with_error("OCR timeout"),
        );

        assert!(h.summarizer.prompts.lock().expect("lock").is_empty());
        let view = h.modal.current().expect("error modal open");
        assert_eq!(view.kind, ModalKind::Error);
        assert_eq!(
            view.text,
            "Error processing request: No text content could be extracted from the selected element"
        );
        assert_eq!(view.auto_close_at, None);
    }

    #[test]
    fn remote_failure_reaches_the_user() {
        let h = harness(
            Some("sk-test"),
            RecordingSummarizer {
                failure: Some("Incorrect API key provided".to_string()),
                ..RecordingSummarizer::default()
            },
            RecordingTab::default(),
        );
        h.orchestrator.handle_selected(&ElementSelected::from_text(
            "Q".to_string(),
            ElementKind::Video,
        ));
        assert_eq!(
            h.modal.current().map(|view| view.text),
            Some("Error processing request: Incorrect API key provided".to_string())
        );
    }

    #[test]
    fn missing_content_is_rejected() {
        let h = configured();
        let selected = ElementSelected {
            html: None,
            extracted_text: None,
            element_type: ElementKind::Html,
            error: None,
        };
        assert_eq!(
            h.orchestrator.process_selected(&selected),
            Err(PipelineError::NoContent)
        );
    }

    #[test]
    fn handle_message_acks_and_resets_selection_mode() {
        let mut h = configured();
        h.orchestrator.toggle_selection();
        let (port, inbox) = runtime_channel();

        let sender = std::thread::spawn(move || port.send(&RuntimeMessage::SelectionStopped));
        let incoming = inbox
            .recv_timeout(std::time::Duration::from_secs(1))
            .expect("port open")
            .expect("message delivered");
        h.orchestrator.handle_message(incoming);

        let ack = sender
            .join()
            .expect("sender thread finishes")
            .expect("ack received");
        assert!(ack.success);
        assert!(!h.orchestrator.selection_mode());
    }

    #[test]
    fn remote_rejection_reaches_error_modal_through_http_client() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("test runtime builds");
        let server = runtime.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(401).set_body_string(
                    r#"{"error":{"message":"Incorrect API key provided"}}"#,
                ))
                .mount(&server)
                .await;
            server
        });
        let client = OpenAiClient::with_endpoint(format!("{}/v1/chat/completions", server.uri()))
            .expect("client builds");
        let modal = InMemoryModal::new();
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryStore::with_values([("apiKey", Value::from("sk-test"))])),
            Box::new(client),
            Box::new(modal.clone()),
            Box::new(RecordingTab::default()),
            Box::new(CountingSettings::default()),
        );

        let selected = ElementSelected::from_text("What is 2+2? A) 3 B) 4".to_string(), ElementKind::Image);
        assert!(matches!(
            orchestrator.process_selected(&selected),
            Err(PipelineError::RemoteApiFailed(message)) if message == "Incorrect API key provided"
        ));

        orchestrator.handle_selected(&selected);
        let view = modal.current().expect("error modal open");
        assert_eq!(view.kind, ModalKind::Error);
        assert_eq!(view.text, "Error processing request: Incorrect API key provided");
        assert_eq!(view.auto_close_at, None);
    }
}
