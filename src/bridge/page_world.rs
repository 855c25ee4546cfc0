use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::channel::{WindowChannel, WindowListener};
use super::protocol::BridgeMessage;
use crate::dom::SharedDocument;
use crate::ocr::{classify_element, frame_source, TextRecognizer};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The privileged side of the bridge: resolves selectors against the live
/// page and runs OCR on whatever they point at.
pub struct PageWorld {
    document: SharedDocument,
    channel: WindowChannel,
    recognizer: Box<dyn TextRecognizer>,
}

impl PageWorld {
    pub fn new(
        document: SharedDocument,
        channel: WindowChannel,
        recognizer: Box<dyn TextRecognizer>,
    ) -> Self {
        Self {
            document,
            channel,
            recognizer,
        }
    }

    /// Answers one bridge message. Returns `None` for messages this side
    /// does not respond to, including its own replies echoing back.
    pub fn respond(&self, message: BridgeMessage) -> Option<BridgeMessage> {
        match message {
            BridgeMessage::CheckReady => Some(BridgeMessage::OcrReady { ready: true }),
            BridgeMessage::Extract {
                request_id,
                selector,
            } => Some(self.extract(request_id, &selector)),
            BridgeMessage::OcrReady { .. } | BridgeMessage::OcrResult { .. } => None,
        }
    }

    fn extract(&self, request_id: u64, selector: &str) -> BridgeMessage {
        tracing::debug!(request_id, selector, "page world extracting text");
        let source = match self.resolve_frame_source(selector) {
            Ok(source) => source,
            Err(message) => return BridgeMessage::failure(request_id, message),
        };

        match self.recognizer.recognize(&source) {
            Ok(text) => BridgeMessage::success(request_id, text),
            Err(err) => {
                tracing::warn!(request_id, %err, "ocr extraction failed");
                BridgeMessage::failure(request_id, format!("Text extraction failed: {err}"))
            }
        }
    }

    /// Looks up the element and its pixel source. The document lock is
    /// released before recognition starts.
    fn resolve_frame_source(&self, selector: &str) -> Result<String, String> {
        let document = self
            .document
            .read()
            .map_err(|_| "Page document unavailable".to_string())?;
        let node = document
            .query_selector(selector)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "Element not found".to_string())?;
        if !classify_element(&document, node).is_media() {
            return Err("Element is not an image or video".to_string());
        }
        frame_source(&document, node).map_err(|err| err.to_string())
    }

    pub fn spawn(self) -> std::io::Result<PageWorldHandle> {
        let listener = self.channel.subscribe();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let thread = crate::worker::spawn_worker("got-clue-page-world", move || {
            self.run(listener, &worker_stop)
        })?;
        Ok(PageWorldHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn run(self, listener: WindowListener, stop: &AtomicBool) {
        self.channel
            .post(BridgeMessage::OcrReady { ready: true }.encode());
        tracing::debug!("page world announced ocr readiness");

        while !stop.load(Ordering::Relaxed) {
            let Ok(data) = listener.recv_timeout(SHUTDOWN_POLL_INTERVAL) else {
                continue;
            };
            let Some(message) = BridgeMessage::decode(&data) else {
                continue;
            };
            if let Some(reply) = self.respond(message) {
                self.channel.post(reply.encode());
            }
        }
        tracing::debug!("page world stopped");
    }
}

/// Keeps the page world thread alive; stops it on shutdown or drop.
pub struct PageWorldHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PageWorldHandle {
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("page world thread panicked");
            }
        }
    }
}

impl Drop for PageWorldHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
