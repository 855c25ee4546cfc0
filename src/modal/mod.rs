//! Answer and error modal.
//!
//! The core only sees [`ModalPresenter`]. [`InMemoryModal`] keeps the modal
//! as page state (what the in-page modal renders); [`DesktopModal`] shows
//! the same content as a desktop notification.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::dom::KeyStroke;

pub const RESPONSE_TITLE: &str = "Got Clue Anot - Response";
pub const ERROR_TITLE: &str = "Got Clue Anot - Error";
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(5);

const APP_NAME: &str = "got-clue";
const CODE_STYLE: &str =
    "background: rgba(0,0,0,0.1); padding: 2px 4px; border-radius: 3px; font-family: monospace;";

pub trait ModalPresenter: Send {
    fn show_response(&self, text: &str);
    fn show_error(&self, text: &str);
    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalKind {
    Response,
    Error,
}

impl ModalKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Response => RESPONSE_TITLE,
            Self::Error => ERROR_TITLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalView {
    pub kind: ModalKind,
    pub text: String,
    pub body_html: String,
    pub auto_close_at: Option<Instant>,
}

/// At most one modal is open; showing a new one replaces the old one.
#[derive(Debug, Default)]
pub struct ModalState {
    current: Option<ModalView>,
}

impl ModalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ModalView> {
        self.current.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn show(&mut self, kind: ModalKind, text: &str, now: Instant) {
        let auto_close_at = match kind {
            ModalKind::Response => Some(now + AUTO_DISMISS_AFTER),
            ModalKind::Error => None,
        };
        self.current = Some(ModalView {
            kind,
            text: text.to_string(),
            body_html: format_content(text),
            auto_close_at,
        });
    }

    pub fn close(&mut self) -> bool {
        self.current.take().is_some()
    }

    /// Closes a response whose auto-dismiss deadline has passed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let expired = self
            .current
            .as_ref()
            .and_then(|view| view.auto_close_at)
            .is_some_and(|deadline| now >= deadline);
        if expired {
            self.current = None;
        }
        expired
    }

    pub fn handle_key(&mut self, stroke: &KeyStroke) -> bool {
        stroke.key == "Escape" && self.close()
    }

    pub fn click_outside(&mut self) -> bool {
        self.close()
    }
}

/// Renders model output for the modal body: escapes markup, then applies
/// `**bold**`, `*italic*`, `` `code` `` and line breaks.
pub fn format_content(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let line = escape_html(line);
            let line = wrap_delimited(&line, "**", "<strong>", "</strong>");
            let line = wrap_delimited(&line, "*", "<em>", "</em>");
            wrap_delimited(
                &line,
                "`",
                &format!("<code style=\"{CODE_STYLE}\">"),
                "</code>",
            )
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn wrap_delimited(line: &str, delimiter: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find(delimiter) {
        let after = &rest[start + delimiter.len()..];
        let Some(end) = after.find(delimiter) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(open);
        out.push_str(&after[..end]);
        out.push_str(close);
        rest = &after[end + delimiter.len()..];
    }
    out.push_str(rest);
    out
}

/// Modal kept as shared page state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModal {
    state: Arc<Mutex<ModalState>>,
}

impl InMemoryModal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ModalState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> Option<ModalView> {
        self.state().current().cloned()
    }
}

impl ModalPresenter for InMemoryModal {
    fn show_response(&self, text: &str) {
        self.state().show(ModalKind::Response, text, Instant::now());
    }

    fn show_error(&self, text: &str) {
        self.state().show(ModalKind::Error, text, Instant::now());
    }

    fn close(&self) {
        self.state().close();
    }
}

/// Shows answers as desktop notifications. Responses expire after five
/// seconds; errors stay until dismissed.
#[derive(Debug, Default)]
pub struct DesktopModal;

impl DesktopModal {
    pub fn new() -> Self {
        Self
    }

    fn notify(&self, kind: ModalKind, text: &str) {
        let timeout = match kind {
            ModalKind::Response => {
                notify_rust::Timeout::Milliseconds(AUTO_DISMISS_AFTER.as_millis() as u32)
            }
            ModalKind::Error => notify_rust::Timeout::Never,
        };
        if let Err(err) = notify_rust::Notification::new()
            .appname(APP_NAME)
            .summary(kind.title())
            .body(text)
            .timeout(timeout)
            .show()
        {
            tracing::warn!("desktop notification failed: {err}");
        }
    }
}

impl ModalPresenter for DesktopModal {
    fn show_response(&self, text: &str) {
        self.notify(ModalKind::Response, text);
    }

    fn show_error(&self, text: &str) {
        self.notify(ModalKind::Error, text);
    }

    fn close(&self) {
        tracing::debug!("desktop notifications close on their own");
    }
}

/// Shows every modal on each of several presenters.
#[derive(Default)]
pub struct ModalFanout {
    presenters: Vec<Box<dyn ModalPresenter>>,
}

impl ModalFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, presenter: impl ModalPresenter + 'static) -> Self {
        self.presenters.push(Box::new(presenter));
        self
    }
}

impl ModalPresenter for ModalFanout {
    fn show_response(&self, text: &str) {
        self.presenters
            .iter()
            .for_each(|presenter| presenter.show_response(text));
    }

    fn show_error(&self, text: &str) {
        self.presenters
            .iter()
            .for_each(|presenter| presenter.show_error(text));
    }

    fn close(&self) {
        self.presenters.iter().for_each(|presenter| presenter.close());
    }
}
