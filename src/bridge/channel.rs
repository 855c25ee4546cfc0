use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    fn next() -> Self {
        Self(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: WindowId,
    data: String,
}

/// The window-level `postMessage` channel: every post is delivered to every
/// listener, including ones in the posting world.
///
/// Payloads are plain strings; nothing else crosses between worlds.
#[derive(Debug, Clone)]
pub struct WindowChannel {
    window: WindowId,
    subscribers: Arc<Mutex<Vec<Sender<Envelope>>>>,
}

impl Default for WindowChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowChannel {
    pub fn new() -> Self {
        Self {
            window: WindowId::next(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// A handle that posts into the same channel as a different window,
    /// the way an embedded frame would.
    pub fn foreign_frame(&self) -> Self {
        Self {
            window: WindowId::next(),
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    pub fn subscribe(&self) -> WindowListener {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        WindowListener {
            window: self.window,
            rx,
        }
    }

    pub fn post(&self, data: impl Into<String>) {
        let envelope = Envelope {
            origin: self.window,
            data: data.into(),
        };
        let Ok(mut subscribers) = self.subscribers.lock() else {
            tracing::warn!("window channel lock poisoned; dropping message");
            return;
        };
        subscribers.retain(|subscriber| subscriber.send(envelope.clone()).is_ok());
    }
}

/// Receiving end for one world; drops messages posted by other windows.
#[derive(Debug)]
pub struct WindowListener {
    window: WindowId,
    rx: Receiver<Envelope>,
}

impl WindowListener {
    /// Waits up to `timeout` for a same-window message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let envelope = self.rx.recv_timeout(remaining)?;
            if envelope.origin == self.window {
                return Ok(envelope.data);
            }
            tracing::trace!(origin = ?envelope.origin, "dropping message from foreign window");
        }
    }

    /// Returns the next same-window message that is already queued, if any.
    pub fn try_recv(&self) -> Option<String> {
        while let Ok(envelope) = self.rx.try_recv() {
            if envelope.origin == self.window {
                return Some(envelope.data);
            }
        }
        None
    }
}
