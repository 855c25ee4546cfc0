//! Extension runtime messaging between the content world and the
//! background controller.
//!
//! Every message is a JSON string with a `type` tag, answered by a
//! `{ "success": bool }` acknowledgement. A send after the background side
//! has gone away fails with [`RuntimeError::ContextInvalidated`]; callers on
//! the content side treat that as a warning and carry on.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ocr::ElementKind;

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Extension context invalidated")]
    ContextInvalidated,
    #[error("no acknowledgement within {0:?}")]
    NoResponse(Duration),
    #[error("failed to encode runtime message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode runtime message: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Payload sent when an element has been picked. Exactly one of `html` and
/// `extracted_text` carries content; `error` records a failed extraction
/// that fell back to markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSelected {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    pub element_type: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ElementSelected {
    pub fn from_html(html: String, element_type: ElementKind) -> Self {
        Self {
            html: Some(html),
            extracted_text: None,
            element_type,
            error: None,
        }
    }

    pub fn from_text(text: String, element_type: ElementKind) -> Self {
        Self {
            html: None,
            extracted_text: Some(text),
            element_type,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeMessage {
    ElementSelected(ElementSelected),
    SelectionStopped,
    /// The toggle shortcut was pressed while the page was not selecting.
    ToggleSelection,
}

impl RuntimeMessage {
    pub fn encode(&self) -> RuntimeResult<String> {
        serde_json::to_string(self).map_err(RuntimeError::Encode)
    }

    pub fn decode(data: &str) -> RuntimeResult<Self> {
        serde_json::from_str(data).map_err(RuntimeError::Decode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeAck {
    pub success: bool,
}

struct Envelope {
    payload: String,
    reply: Sender<String>,
}

/// Sending half, owned by the content world.
#[derive(Clone)]
pub struct RuntimePort {
    tx: Sender<Envelope>,
    ack_timeout: Duration,
}

/// Receiving half, owned by the background controller.
pub struct RuntimeInbox {
    rx: Receiver<Envelope>,
}

pub fn runtime_channel() -> (RuntimePort, RuntimeInbox) {
    let (tx, rx) = mpsc::channel();
    (
        RuntimePort {
            tx,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        },
        RuntimeInbox { rx },
    )
}

impl RuntimePort {
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn send(&self, message: &RuntimeMessage) -> RuntimeResult<RuntimeAck> {
        let payload = message.encode()?;
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Envelope {
                payload,
                reply: reply_tx,
            })
            .map_err(|_| RuntimeError::ContextInvalidated)?;

        let reply = reply_rx
            .recv_timeout(self.ack_timeout)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => RuntimeError::NoResponse(self.ack_timeout),
                RecvTimeoutError::Disconnected => RuntimeError::ContextInvalidated,
            })?;
        serde_json::from_str(&reply).map_err(RuntimeError::Decode)
    }

    /// Sends and logs instead of failing; a torn-down background must not
    /// break the page.
    pub fn send_or_warn(&self, message: &RuntimeMessage) -> Option<RuntimeAck> {
        match self.send(message) {
            Ok(ack) => Some(ack),
            Err(RuntimeError::ContextInvalidated) => {
                tracing::warn!("extension context invalidated; message dropped");
                None
            }
            Err(err) => {
                tracing::warn!(%err, "runtime message failed");
                None
            }
        }
    }
}

/// A received message whose sender is waiting on [`IncomingMessage::respond`].
pub struct IncomingMessage {
    pub message: RuntimeMessage,
    reply: Sender<String>,
}

impl IncomingMessage {
    pub fn respond(self, ack: RuntimeAck) {
        let Ok(body) = serde_json::to_string(&ack) else {
            return;
        };
        if self.reply.send(body).is_err() {
            tracing::debug!("sender stopped waiting for acknowledgement");
        }
    }
}

impl RuntimeInbox {
    /// Waits up to `timeout` for the next message. `Ok(None)` means nothing
    /// arrived; `ContextInvalidated` means every port is gone. Malformed
    /// payloads are answered with `success: false` and skipped.
    pub fn recv_timeout(&self, timeout: Duration) -> RuntimeResult<Option<IncomingMessage>> {
        loop {
            let envelope = match self.rx.recv_timeout(timeout) {
                Ok(envelope) => envelope,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RuntimeError::ContextInvalidated)
                }
            };
            match RuntimeMessage::decode(&envelope.payload) {
                Ok(message) => {
                    return Ok(Some(IncomingMessage {
                        message,
                        reply: envelope.reply,
                    }))
                }
                Err(err) => {
                    tracing::warn!(%err, "ignoring malformed runtime message");
                    let _ = envelope.reply.send(r#"{"success":false}"#.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_selected_uses_camel_case_and_omits_empty_fields() {
        let message = RuntimeMessage::ElementSelected(ElementSelected::from_text(
            "What is 2+2?".to_string(),
            ElementKind::Image,
        ));
        assert_eq!(
            message.encode().expect("message encodes"),
            r#"{"type":"ELEMENT_SELECTED","extractedText":"What is 2+2?","elementType":"image"}"#
        );
        assert_eq!(
            RuntimeMessage::SelectionStopped
                .encode()
                .expect("message encodes"),
            r#"{"type":"SELECTION_STOPPED"}"#
        );
    }

    #[test]
    fn decode_reads_html_fallback_with_error() {
        let message = RuntimeMessage::decode(
            r#"{"type":"ELEMENT_SELECTED","html":"<img src=\"q.png\">","elementType":"image","error":"OCR timeout"}"#,
        )
        .expect("valid payload decodes");
        assert_eq!(
            message,
            RuntimeMessage::ElementSelected(
                ElementSelected::from_html("<img src=\"q.png\">".to_string(), ElementKind::Image)
                    .with_error("OCR timeout")
            )
        );
    }

    #[test]
    fn send_waits_for_acknowledgement() {
        let (port, inbox) = runtime_channel();
        let background = std::thread::spawn(move || {
            let incoming = inbox
                .recv_timeout(Duration::from_secs(1))
                .expect("port still open")
                .expect("message arrives");
            assert_eq!(incoming.message, RuntimeMessage::SelectionStopped);
            incoming.respond(RuntimeAck { success: true });
        });

        let ack = port
            .send(&RuntimeMessage::SelectionStopped)
            .expect("background acknowledges");
        assert!(ack.success);
        background.join().expect("background thread finishes");
    }

    #[test]
    fn send_after_background_is_gone_is_context_invalidated() {
        let (port, inbox) = runtime_channel();
        drop(inbox);
        assert!(matches!(
            port.send(&RuntimeMessage::SelectionStopped),
            Err(RuntimeError::ContextInvalidated)
        ));
        assert_eq!(port.send_or_warn(&RuntimeMessage::SelectionStopped), None);
    }

    #[test]
    fn unanswered_send_times_out() {
        let (port, inbox) = runtime_channel();
        let port = port.with_ack_timeout(Duration::from_millis(20));
        let keep_alive = std::thread::spawn(move || {
            let incoming = inbox.recv_timeout(Duration::from_secs(1));
            std::thread::sleep(Duration::from_millis(100));
            drop(incoming);
        });
        assert!(matches!(
            port.send(&RuntimeMessage::SelectionStopped),
            Err(RuntimeError::NoResponse(_))
        ));
        keep_alive.join().expect("helper thread finishes");
    }

    #[test]
    fn inbox_reports_closed_ports() {
        let (port, inbox) = runtime_channel();
        drop(port);
        assert!(matches!(
            inbox.recv_timeout(Duration::from_millis(10)),
            Err(RuntimeError::ContextInvalidated)
        ));
    }
}
