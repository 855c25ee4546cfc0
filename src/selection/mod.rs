//! Element picking: hover highlighting, click capture, and teardown.

mod selector;

pub use selector::structural_selector;

use crate::dom::{Document, EventDisposition, EventKind, ListenerId, NodeId, PageEvent, Phase};
use crate::ocr::{classify_element, ElementKind};
use crate::overlay::{OverlayKind, OverlayRenderer};
use crate::state::{SelectionEvent, SelectionState, StateMachine, StateResult};

const SELECTION_CURSOR: &str = "crosshair";

const CAPTURE_LISTENERS: [EventKind; 3] =
    [EventKind::PointerOver, EventKind::PointerOut, EventKind::Click];
const LAYOUT_LISTENERS: [EventKind; 2] = [EventKind::Scroll, EventKind::Resize];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSession {
    pub active: bool,
    pub hovered_target: Option<NodeId>,
    pub selected_target: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedElement {
    pub node: NodeId,
    pub kind: ElementKind,
    pub outer_html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Ignored,
    Hovered(NodeId),
    Unhovered,
    Repositioned,
    Picked(PickedElement),
}

#[derive(Debug, Default)]
pub struct SelectionController {
    machine: StateMachine,
    session: SelectionSession,
    overlays: OverlayRenderer,
    listeners: Vec<(EventKind, ListenerId)>,
    saved_cursor: Option<String>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        self.machine.state()
    }

    pub fn is_active(&self) -> bool {
        self.session.active
    }

    pub fn session(&self) -> &SelectionSession {
        &self.session
    }

    pub fn overlays(&self) -> &OverlayRenderer {
        &self.overlays
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Enters selection mode. Returns `false` when it was already active.
    pub fn start(&mut self, doc: &mut Document) -> StateResult<bool> {
        if self.session.active {
            tracing::debug!("selection already active; ignoring start");
            return Ok(false);
        }
        self.machine.transition(SelectionEvent::Start)?;

        self.overlays.remove_all(doc);
        self.session = SelectionSession {
            active: true,
            ..SelectionSession::default()
        };

        for kind in CAPTURE_LISTENERS {
            let id = doc.add_event_listener(kind, Phase::Capture);
            self.listeners.push((kind, id));
        }
        for kind in LAYOUT_LISTENERS {
            let id = doc.add_event_listener(kind, Phase::Bubble);
            self.listeners.push((kind, id));
        }

        let body = doc.body();
        if let Some(style) = doc.style_mut(body) {
            self.saved_cursor = style.get("cursor").map(str::to_string);
            style.set("cursor", SELECTION_CURSOR);
        }
        tracing::debug!(listeners = self.listeners.len(), "selection mode started");
        Ok(true)
    }

    /// Leaves selection mode without picking anything. Returns `false` when
    /// it was not active.
    pub fn stop(&mut self, doc: &mut Document, event: SelectionEvent) -> StateResult<bool> {
        if !self.session.active {
            tracing::debug!(?event, "selection not active; ignoring stop");
            return Ok(false);
        }
        self.machine.transition(event)?;
        self.teardown(doc);
        self.overlays.remove_all(doc);
        self.session = SelectionSession::default();
        tracing::debug!(?event, "selection mode stopped");
        Ok(true)
    }

    /// Removes exactly what `start` added.
    fn teardown(&mut self, doc: &mut Document) {
        for (kind, id) in self.listeners.drain(..) {
            if !doc.remove_event_listener(id) {
                tracing::warn!(?kind, "selection listener was already gone");
            }
        }

        let body = doc.body();
        let saved = self.saved_cursor.take();
        if let Some(style) = doc.style_mut(body) {
            match saved {
                Some(cursor) => style.set("cursor", cursor),
                None => {
                    style.remove("cursor");
                }
            }
        }

        self.overlays.clear(doc, OverlayKind::Hover);
        self.session.active = false;
        self.session.hovered_target = None;
    }

    fn listens_for(&self, doc: &Document, kind: EventKind) -> bool {
        self.listeners
            .iter()
            .any(|(registered, id)| *registered == kind && doc.listeners().contains(*id))
    }

    /// Runs this controller's listeners for one page event.
    pub fn handle_event(
        &mut self,
        doc: &mut Document,
        event: &PageEvent,
    ) -> StateResult<(EventDisposition, SelectionOutcome)> {
        let ignored = (EventDisposition::default(), SelectionOutcome::Ignored);
        if !self.session.active || !self.listens_for(doc, event.kind()) {
            return Ok(ignored);
        }

        match *event {
            PageEvent::PointerOver { target } => {
                if self.overlays.is_overlay(target) || !doc.is_element(target) {
                    return Ok(ignored);
                }
                self.machine.transition(SelectionEvent::Hover)?;
                self.overlays.clear(doc, OverlayKind::Hover);
                self.overlays.show(doc, OverlayKind::Hover, target);
                self.session.hovered_target = Some(target);
                Ok((EventDisposition::suppressed(), SelectionOutcome::Hovered(target)))
            }
            PageEvent::PointerOut { .. } => {
                self.overlays.clear(doc, OverlayKind::Hover);
                self.session.hovered_target = None;
                Ok((EventDisposition::suppressed(), SelectionOutcome::Unhovered))
            }
            PageEvent::Click { target } => {
                let picked = self.pick(doc, target)?;
                Ok((EventDisposition::suppressed(), SelectionOutcome::Picked(picked)))
            }
            PageEvent::Scroll { .. } | PageEvent::Resize => {
                self.overlays.reposition(doc);
                Ok((EventDisposition::default(), SelectionOutcome::Repositioned))
            }
            PageEvent::KeyDown(_) => Ok(ignored),
        }
    }

    fn pick(&mut self, doc: &mut Document, target: NodeId) -> StateResult<PickedElement> {
        self.machine.transition(SelectionEvent::Click)?;
        self.teardown(doc);

        // Markup is captured before the selected overlay joins the page.
        let kind = classify_element(doc, target);
        let outer_html = doc.outer_html(target);
        self.session.selected_target = Some(target);
        self.overlays.show(doc, OverlayKind::Selected, target);
        tracing::debug!(?target, kind = kind.as_str(), "element picked");
        Ok(PickedElement {
            node: target,
            kind,
            outer_html,
        })
    }

    /// Drops the selected highlight once the pick has been dispatched.
    pub fn finish_pick(&mut self, doc: &mut Document) {
        self.overlays.remove_all(doc);
        self.session.selected_target = None;
    }
}
