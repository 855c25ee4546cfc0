use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::channel::{WindowChannel, WindowListener};
use super::protocol::BridgeMessage;
use crate::dom::{NodeId, SharedDocument};
use crate::ocr::{frame_source, TextRecognizer};
use crate::selection::structural_selector;
use crate::worker::spawn_worker;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("an OCR request is already in flight")]
    Busy,
    #[error("OCR timeout")]
    Timeout,
    #[error("No text extracted")]
    NoTextExtracted,
    #[error("{0}")]
    Extraction(String),
    #[error("element is no longer attached to the page")]
    ElementDetached,
    #[error("page document lock poisoned")]
    DocumentPoisoned,
    #[error("window channel closed")]
    ChannelClosed,
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    pub request_timeout: Duration,
    pub ready_attempts: u32,
    pub ready_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            ready_attempts: 30,
            ready_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOcrRequest {
    pub request_id: u64,
    pub selector: String,
    pub created_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Readiness {
    #[default]
    Unknown,
    Ready,
    Unavailable,
}

/// Readiness as resolved by the load-time handshake.
#[derive(Debug, Default)]
struct ReadinessCell {
    state: Mutex<Readiness>,
    resolved: Condvar,
}

impl ReadinessCell {
    fn lock(&self) -> MutexGuard<'_, Readiness> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self) -> Readiness {
        *self.lock()
    }

    fn resolve(&self, ready: bool) {
        *self.lock() = if ready {
            Readiness::Ready
        } else {
            Readiness::Unavailable
        };
        self.resolved.notify_all();
    }

    fn wait(&self) -> bool {
        let state = self
            .resolved
            .wait_while(self.lock(), |state| *state == Readiness::Unknown)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state == Readiness::Ready
    }
}

/// Polls the page world until it reports ready or the attempts run out.
struct ReadinessProbe {
    channel: WindowChannel,
    listener: WindowListener,
    config: BridgeConfig,
    cell: Arc<ReadinessCell>,
}

impl ReadinessProbe {
    fn run(self) {
        let ready = self.poll();
        tracing::debug!(ready, "ocr readiness resolved");
        self.cell.resolve(ready);
    }

    fn poll(&self) -> bool {
        if drain_for_ready(&self.listener) {
            return true;
        }
        for attempt in 1..=self.config.ready_attempts {
            self.channel.post(BridgeMessage::CheckReady.encode());
            let deadline = Instant::now() + self.config.ready_interval;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.listener.recv_timeout(remaining) {
                    Ok(data) => {
                        if matches!(
                            BridgeMessage::decode(&data),
                            Some(BridgeMessage::OcrReady { ready: true })
                        ) {
                            return true;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return false,
                }
            }
            tracing::trace!(attempt, "ocr not ready yet");
        }
        tracing::warn!(
            attempts = self.config.ready_attempts,
            "ocr never became ready; media will fall back to html"
        );
        false
    }
}

/// Empties the pending slot however the request ends.
struct PendingGuard<'a> {
    slot: &'a Mutex<Option<PendingOcrRequest>>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// Content-world client of the page world's OCR service.
pub struct OcrBridge {
    channel: WindowChannel,
    listener: Mutex<WindowListener>,
    pending: Mutex<Option<PendingOcrRequest>>,
    readiness: Arc<ReadinessCell>,
    next_request_id: AtomicU64,
    direct: Option<Box<dyn TextRecognizer>>,
    config: BridgeConfig,
}

impl OcrBridge {
    /// Starts the readiness handshake right away on its own thread. Both
    /// listeners subscribe before returning so an early announcement from
    /// the page world is not missed.
    pub fn new(channel: WindowChannel, config: BridgeConfig) -> Self {
        let listener = channel.subscribe();
        let readiness = Arc::new(ReadinessCell::default());
        let probe = ReadinessProbe {
            channel: channel.clone(),
            listener: channel.subscribe(),
            config,
            cell: Arc::clone(&readiness),
        };
        if let Err(err) = spawn_worker("got-clue-ocr-ready", move || probe.run()) {
            tracing::warn!(%err, "failed to start ocr readiness probe");
            readiness.resolve(false);
        }
        Self {
            channel,
            listener: Mutex::new(listener),
            pending: Mutex::new(None),
            readiness,
            next_request_id: AtomicU64::new(1),
            direct: None,
            config,
        }
    }

    /// Uses a recognizer available in this world instead of the bridge.
    pub fn with_direct_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.direct = Some(recognizer);
        self
    }

    pub fn pending_request(&self) -> Option<PendingOcrRequest> {
        self.pending.lock().ok().and_then(|slot| slot.clone())
    }

    fn listener(&self) -> MutexGuard<'_, WindowListener> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether OCR is usable right now. Never blocks; a handshake that is
    /// still running counts as not ready.
    pub fn is_ready(&self) -> bool {
        self.direct.is_some() || self.readiness.get() == Readiness::Ready
    }

    /// Blocks until the load-time handshake has resolved, at most
    /// `ready_attempts * ready_interval`.
    pub fn await_ready(&self) -> bool {
        self.direct.is_some() || self.readiness.wait()
    }

    fn claim(&self, selector: &str) -> BridgeResult<(u64, PendingGuard<'_>)> {
        let mut slot = self.pending.lock().map_err(|_| BridgeError::Busy)?;
        if slot.is_some() {
            return Err(BridgeError::Busy);
        }
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        *slot = Some(PendingOcrRequest {
            request_id,
            selector: selector.to_string(),
            created_at: Instant::now(),
        });
        Ok((request_id, PendingGuard { slot: &self.pending }))
    }

    /// Extracts the text shown by a media element.
    ///
    /// Resolves with trimmed, non-empty text. The pending slot is empty
    /// again when this returns, whatever the outcome.
    pub fn extract_text(&self, document: &SharedDocument, node: NodeId) -> BridgeResult<String> {
        let (selector, direct_source) = {
            let doc = document.read().map_err(|_| BridgeError::DocumentPoisoned)?;
            if !doc.is_connected(node) {
                return Err(BridgeError::ElementDetached);
            }
            let selector = structural_selector(&doc, node).ok_or(BridgeError::ElementDetached)?;
            let direct_source = match self.direct {
                Some(_) => Some(
                    frame_source(&doc, node)
                        .map_err(|err| BridgeError::Extraction(err.to_string()))?,
                ),
                None => None,
            };
            (selector, direct_source)
        };

        let (request_id, _guard) = self.claim(&selector)?;
        tracing::debug!(request_id, selector = %selector, "requesting ocr");

        let raw = match (&self.direct, direct_source) {
            (Some(recognizer), Some(source)) => recognizer
                .recognize(&source)
                .map_err(|err| BridgeError::Extraction(format!("Text extraction failed: {err}")))?,
            _ => self.round_trip(request_id, selector)?,
        };

        let text = raw.trim();
        if text.is_empty() {
            return Err(BridgeError::NoTextExtracted);
        }
        Ok(text.to_string())
    }

    fn round_trip(&self, request_id: u64, selector: String) -> BridgeResult<String> {
        let listener = self.listener();
        while listener.try_recv().is_some() {}

        self.channel
            .post(BridgeMessage::Extract { request_id, selector }.encode());

        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let data = match listener.recv_timeout(remaining) {
                Ok(data) => data,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(request_id, "ocr request timed out");
                    return Err(BridgeError::Timeout);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(BridgeError::ChannelClosed),
            };
            match BridgeMessage::decode(&data) {
                Some(BridgeMessage::OcrResult {
                    request_id: reply_id,
                    result,
                    error,
                }) if reply_id == request_id => {
                    return match (result, error) {
                        (_, Some(error)) => Err(BridgeError::Extraction(error)),
                        (Some(result), None) => Ok(result),
                        (None, None) => Err(BridgeError::NoTextExtracted),
                    };
                }
                Some(BridgeMessage::OcrResult {
                    request_id: reply_id,
                    ..
                }) => {
                    tracing::debug!(request_id, reply_id, "ignoring stale ocr reply");
                }
                _ => {}
            }
        }
    }
}

fn drain_for_ready(listener: &WindowListener) -> bool {
    let mut ready = false;
    while let Some(data) = listener.try_recv() {
        if matches!(
            BridgeMessage::decode(&data),
            Some(BridgeMessage::OcrReady { ready: true })
        ) {
            ready = true;
        }
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PageWorld;
    use crate::dom::Document;
    use crate::ocr::{OcrError, OcrResult};

    struct ScriptedRecognizer;

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize(&self, source: &str) -> OcrResult<String> {
            match source {
                "quiz.png" => Ok("  What is 2+2? A) 3 B) 4 \n".to_string()),
                "blank.png" => Ok("   ".to_string()),
                _ => Err(OcrError::Recognition {
                    message: "engine crashed".to_string(),
                }),
            }
        }
    }

    fn fast_config() -> BridgeConfig {
        BridgeConfig {
            request_timeout: Duration::from_millis(150),
            ready_attempts: 3,
            ready_interval: Duration::from_millis(10),
        }
    }

    fn quiz_page() -> (SharedDocument, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let body = doc.body();
        let quiz = doc.create_element("img");
        doc.set_attribute(quiz, "id", "quiz");
        doc.set_attribute(quiz, "src", "quiz.png");
        let blank = doc.create_element("img");
        doc.set_attribute(blank, "class", "blank");
        doc.set_attribute(blank, "src", "blank.png");
        let broken = doc.create_element("img");
        doc.set_attribute(broken, "src", "broken.png");
        for node in [quiz, blank, broken] {
            doc.append_child(body, node);
        }
        (doc.into_shared(), quiz, blank, broken)
    }

    fn spawn_page_world(
        document: &SharedDocument,
        channel: &WindowChannel,
    ) -> crate::bridge::PageWorldHandle {
        PageWorld::new(
            document.clone(),
            channel.clone(),
            Box::new(ScriptedRecognizer),
        )
        .spawn()
        .expect("page world thread should spawn")
    }

    #[test]
    fn extract_text_resolves_trimmed_text_and_clears_slot() {
        let (document, quiz, _, _) = quiz_page();
        let channel = WindowChannel::new();
        let bridge = OcrBridge::new(channel.clone(), fast_config());
        let _world = spawn_page_world(&document, &channel);

        assert!(bridge.await_ready(), "page world should announce readiness");
        assert_eq!(
            bridge.extract_text(&document, quiz),
            Ok("What is 2+2? A) 3 B) 4".to_string())
        );
        assert_eq!(bridge.pending_request(), None);
    }

    #[test]
    fn extract_text_rejects_empty_and_failed_recognition() {
        let (document, _, blank, broken) = quiz_page();
        let channel = WindowChannel::new();
        let bridge = OcrBridge::new(channel.clone(), fast_config());
        let _world = spawn_page_world(&document, &channel);

        assert_eq!(
            bridge.extract_text(&document, blank),
            Err(BridgeError::NoTextExtracted)
        );
        match bridge.extract_text(&document, broken) {
            Err(BridgeError::Extraction(message)) => {
                assert!(message.contains("engine crashed"), "got {message}")
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
        assert_eq!(bridge.pending_request(), None);
    }

    #[test]
    fn extract_text_times_out_without_page_world() {
        let (document, quiz, _, _) = quiz_page();
        let bridge = OcrBridge::new(WindowChannel::new(), fast_config());

        let started = Instant::now();
        assert_eq!(
            bridge.extract_text(&document, quiz),
            Err(BridgeError::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(bridge.pending_request(), None);
    }

    #[test]
    fn second_request_while_pending_is_busy() {
        let (document, quiz, _, _) = quiz_page();
        let bridge = OcrBridge::new(WindowChannel::new(), fast_config());

        let (_, guard) = bridge.claim("img#other").expect("slot starts empty");
        assert_eq!(
            bridge.extract_text(&document, quiz),
            Err(BridgeError::Busy)
        );
        drop(guard);
        assert_eq!(bridge.pending_request(), None);
    }

    #[test]
    fn stale_replies_are_ignored() {
        let (document, quiz, _, _) = quiz_page();
        let channel = WindowChannel::new();
        let bridge = OcrBridge::new(channel.clone(), fast_config());

        let page = channel.clone();
        let inbox = channel.subscribe();
        let responder = std::thread::spawn(move || {
            while let Ok(data) = inbox.recv_timeout(Duration::from_secs(1)) {
                if let Some(BridgeMessage::Extract { request_id, .. }) =
                    BridgeMessage::decode(&data)
                {
                    page.post(BridgeMessage::success(request_id + 100, "stale".into()).encode());
                    page.post(BridgeMessage::success(request_id, "fresh".into()).encode());
                    return;
                }
            }
        });

        assert_eq!(bridge.extract_text(&document, quiz), Ok("fresh".to_string()));
        responder.join().expect("responder thread should finish");
    }

    #[test]
    fn readiness_gives_up_after_bounded_attempts_and_caches() {
        let bridge = OcrBridge::new(WindowChannel::new(), fast_config());
        assert!(!bridge.await_ready());
        let started = Instant::now();
        assert!(!bridge.await_ready());
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn readiness_resolves_from_construction_without_a_caller() {
        let (document, _, _, _) = quiz_page();
        let channel = WindowChannel::new();
        let bridge = OcrBridge::new(channel.clone(), fast_config());
        let _world = spawn_page_world(&document, &channel);

        let deadline = Instant::now() + Duration::from_secs(1);
        while !bridge.is_ready() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(bridge.is_ready(), "handshake runs without anyone waiting on it");
    }

    #[test]
    fn is_ready_does_not_wait_for_the_handshake() {
        let bridge = OcrBridge::new(WindowChannel::new(), BridgeConfig::default());
        let started = Instant::now();
        assert!(!bridge.is_ready());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn direct_recognizer_counts_as_ready_and_skips_channel() {
        let (document, quiz, _, _) = quiz_page();
        let bridge = OcrBridge::new(WindowChannel::new(), fast_config())
            .with_direct_recognizer(Box::new(ScriptedRecognizer));

        assert!(bridge.is_ready());
        assert!(bridge.await_ready());
        assert_eq!(
            bridge.extract_text(&document, quiz),
            Ok("What is 2+2? A) 3 B) 4".to_string())
        );
    }

    #[test]
    fn detached_elements_are_rejected_before_posting() {
        let (document, quiz, _, _) = quiz_page();
        document
            .write()
            .expect("document lock should be free")
            .detach(quiz);
        let bridge = OcrBridge::new(WindowChannel::new(), fast_config());
        assert_eq!(
            bridge.extract_text(&document, quiz),
            Err(BridgeError::ElementDetached)
        );
    }
}
