use std::collections::BTreeMap;

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    PointerOver,
    PointerOut,
    Click,
    Scroll,
    Resize,
    KeyDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capture,
    Bubble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// A key press as delivered by the host page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyStroke {
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyStroke {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    PointerOver { target: NodeId },
    PointerOut { target: NodeId },
    Click { target: NodeId },
    Scroll { x: f64, y: f64 },
    Resize,
    KeyDown(KeyStroke),
}

impl PageEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PointerOver { .. } => EventKind::PointerOver,
            Self::PointerOut { .. } => EventKind::PointerOut,
            Self::Click { .. } => EventKind::Click,
            Self::Scroll { .. } => EventKind::Scroll,
            Self::Resize => EventKind::Resize,
            Self::KeyDown(_) => EventKind::KeyDown,
        }
    }
}

/// What the listeners decided about the native behaviour of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventDisposition {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
}

impl EventDisposition {
    pub const fn suppressed() -> Self {
        Self {
            default_prevented: true,
            propagation_stopped: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    kind: EventKind,
    phase: Phase,
}

/// Book-keeping for listeners attached to the document.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: u64,
    registrations: BTreeMap<ListenerId, Registration>,
}

impl ListenerRegistry {
    pub fn add(&mut self, kind: EventKind, phase: Phase) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.registrations.insert(id, Registration { kind, phase });
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.registrations.remove(&id).is_some()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.registrations.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn count_of(&self, kind: EventKind) -> usize {
        self.registrations
            .values()
            .filter(|registration| registration.kind == kind)
            .count()
    }

    /// Listeners for `kind`, capture phase first, each phase in attach order.
    pub fn listeners_for(&self, kind: EventKind) -> Vec<ListenerId> {
        let mut capture = Vec::new();
        let mut bubble = Vec::new();
        for (id, registration) in &self.registrations {
            if registration.kind != kind {
                continue;
            }
            match registration.phase {
                Phase::Capture => capture.push(*id),
                Phase::Bubble => bubble.push(*id),
            }
        }
        capture.extend(bubble);
        capture
    }
}
