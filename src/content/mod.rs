//! The isolated content world: owns selection mode for one tab, delivers
//! picked elements to the background, and reaches OCR through the bridge.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::background::TabController;
use crate::bridge::OcrBridge;
use crate::dom::{EventDisposition, EventKind, ListenerId, PageEvent, Phase, SharedDocument};
use crate::input::{resolve_shortcut, InputContext, KeyboardShortcut, ShortcutAction};
use crate::modal::InMemoryModal;
use crate::ocr::ElementKind;
use crate::runtime::{ElementSelected, RuntimeError, RuntimeMessage, RuntimePort, RuntimeResult};
use crate::selection::{PickedElement, SelectionController, SelectionOutcome};
use crate::state::{SelectionEvent, StateError};

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("page document lock poisoned")]
    DocumentPoisoned,
}

pub type ContentResult<T> = Result<T, ContentError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCommand {
    StartSelection,
    StopSelection,
}

/// Background-side handle for sending commands into the tab.
#[derive(Debug, Clone)]
pub struct TabHandle {
    tx: Sender<ContentCommand>,
}

impl TabController for TabHandle {
    fn start_selection(&self) -> RuntimeResult<()> {
        self.tx
            .send(ContentCommand::StartSelection)
            .map_err(|_| RuntimeError::ContextInvalidated)
    }

    fn stop_selection(&self) -> RuntimeResult<()> {
        self.tx
            .send(ContentCommand::StopSelection)
            .map_err(|_| RuntimeError::ContextInvalidated)
    }
}

pub struct ContentScript {
    document: SharedDocument,
    selection: SelectionController,
    bridge: OcrBridge,
    runtime: RuntimePort,
    shortcut: KeyboardShortcut,
    modal: Option<InMemoryModal>,
    keydown_listener: ListenerId,
    commands: Receiver<ContentCommand>,
}

impl ContentScript {
    pub fn new(
        document: SharedDocument,
        bridge: OcrBridge,
        runtime: RuntimePort,
        shortcut: KeyboardShortcut,
    ) -> ContentResult<(Self, TabHandle)> {
        let keydown_listener = document
            .write()
            .map_err(|_| ContentError::DocumentPoisoned)?
            .add_event_listener(EventKind::KeyDown, Phase::Bubble);
        let (tx, rx) = mpsc::channel();
        let script = Self {
            document,
            selection: SelectionController::new(),
            bridge,
            runtime,
            shortcut,
            modal: None,
            keydown_listener,
            commands: rx,
        };
        Ok((script, TabHandle { tx }))
    }

    /// Lets Escape, a click outside and the auto-dismiss deadline close the
    /// modal shown in this page.
    pub fn with_modal(mut self, modal: InMemoryModal) -> Self {
        self.modal = Some(modal);
        self
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn bridge(&self) -> &OcrBridge {
        &self.bridge
    }

    pub fn keydown_listener(&self) -> ListenerId {
        self.keydown_listener
    }

    /// Handles one queued background command, waiting up to `timeout`.
    /// Returns `false` when nothing arrived. Expired modals close on every
    /// pass.
    pub fn poll_command(&mut self, timeout: Duration) -> ContentResult<bool> {
        self.tick_modal(Instant::now());
        let received = match self.commands.recv_timeout(timeout) {
            Ok(command) => {
                self.handle_command(command)?;
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        };
        self.tick_modal(Instant::now());
        Ok(received)
    }

    /// Closes a response modal whose auto-dismiss deadline has passed.
    pub fn tick_modal(&self, now: Instant) -> bool {
        let closed = self
            .modal
            .as_ref()
            .is_some_and(|modal| modal.state().tick(now));
        if closed {
            tracing::debug!("response modal auto-dismissed");
        }
        closed
    }

    pub fn handle_command(&mut self, command: ContentCommand) -> ContentResult<()> {
        tracing::debug!(?command, "content command");
        match command {
            ContentCommand::StartSelection => {
                let mut doc = self.document.write().map_err(|_| ContentError::DocumentPoisoned)?;
                self.selection.start(&mut doc)?;
                Ok(())
            }
            ContentCommand::StopSelection => self.stop_selection(SelectionEvent::Stop),
        }
    }

    fn stop_selection(&mut self, event: SelectionEvent) -> ContentResult<()> {
        let stopped = {
            let mut doc = self.document.write().map_err(|_| ContentError::DocumentPoisoned)?;
            self.selection.stop(&mut doc, event)?
        };
        if stopped {
            self.runtime.send_or_warn(&RuntimeMessage::SelectionStopped);
        }
        Ok(())
    }

    fn modal_open(&self) -> bool {
        self.modal
            .as_ref()
            .is_some_and(|modal| modal.state().is_open())
    }

    fn close_modal_on_click(&self) -> bool {
        self.modal
            .as_ref()
            .is_some_and(|modal| modal.state().click_outside())
    }

    /// Delivers a page event to this world's listeners.
    pub fn dispatch(&mut self, event: PageEvent) -> ContentResult<EventDisposition> {
        if let PageEvent::KeyDown(stroke) = &event {
            let context = InputContext {
                selection_active: self.selection.is_active(),
                modal_open: self.modal_open(),
            };
            match resolve_shortcut(stroke, &self.shortcut, context) {
                Some(ShortcutAction::ToggleSelection) if context.selection_active => {
                    self.stop_selection(SelectionEvent::ShortcutToggle)?;
                }
                Some(ShortcutAction::ToggleSelection) => {
                    self.runtime.send_or_warn(&RuntimeMessage::ToggleSelection);
                }
                Some(ShortcutAction::StopSelection) => {
                    self.stop_selection(SelectionEvent::Stop)?;
                }
                Some(ShortcutAction::CloseModal) => {
                    if let Some(modal) = &self.modal {
                        modal.state().handle_key(stroke);
                    }
                }
                None => {}
            }
            return Ok(EventDisposition::default());
        }

        if let PageEvent::Click { .. } = event {
            if !self.selection.is_active() && self.close_modal_on_click() {
                return Ok(EventDisposition::default());
            }
        }

        let (disposition, outcome) = {
            let mut doc = self.document.write().map_err(|_| ContentError::DocumentPoisoned)?;
            if let PageEvent::Scroll { x, y } = event {
                doc.scroll_to(x, y);
            }
            self.selection.handle_event(&mut doc, &event)?
        };

        if let SelectionOutcome::Picked(picked) = outcome {
            self.deliver(picked)?;
        }
        Ok(disposition)
    }

    /// Extracts content for a picked element and sends it to the
    /// background. Selection mode is already torn down at this point.
    fn deliver(&mut self, picked: PickedElement) -> ContentResult<()> {
        let selected = self.extract(&picked);
        tracing::info!(
            element_type = selected.element_type.as_str(),
            ocr = selected.extracted_text.is_some(),
            "element selected"
        );
        self.runtime
            .send_or_warn(&RuntimeMessage::ElementSelected(selected));

        let mut doc = self.document.write().map_err(|_| ContentError::DocumentPoisoned)?;
        self.selection.finish_pick(&mut doc);
        Ok(())
    }

    fn extract(&self, picked: &PickedElement) -> ElementSelected {
        if !picked.kind.is_media() || !self.bridge.is_ready() {
            return ElementSelected::from_html(picked.outer_html.clone(), ElementKind::Html);
        }
        match self.bridge.extract_text(&self.document, picked.node) {
            Ok(text) => ElementSelected::from_text(text, picked.kind),
            Err(err) => {
                tracing::warn!(%err, "ocr failed; falling back to markup");
                ElementSelected::from_html(picked.outer_html.clone(), picked.kind)
                    .with_error(err.to_string())
            }
        }
    }
}
