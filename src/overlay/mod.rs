use crate::dom::{Document, NodeId};
use crate::geometry::Rect;

const OVERLAY_ATTRIBUTE: &str = "data-got-clue-overlay";
const OVERLAY_Z_INDEX: &str = "2147483647";
const ACCENT_COLOR: &str = "#8b5cf6";
const HOVER_BORDER: &str = "2px dashed";
const SELECTED_BORDER: &str = "3px solid";
const HOVER_FILL: &str = "rgba(139, 92, 246, 0.08)";
const SELECTED_FILL: &str = "rgba(139, 92, 246, 0.16)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Hover,
    Selected,
}

impl OverlayKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Hover => "hover",
            Self::Selected => "selected",
        }
    }

    fn border(self) -> String {
        let width_and_style = match self {
            Self::Hover => HOVER_BORDER,
            Self::Selected => SELECTED_BORDER,
        };
        format!("{width_and_style} {ACCENT_COLOR}")
    }

    fn fill(self) -> &'static str {
        match self {
            Self::Hover => HOVER_FILL,
            Self::Selected => SELECTED_FILL,
        }
    }
}

#[derive(Debug, Default)]
struct OverlaySlot {
    node: Option<NodeId>,
    target: Option<NodeId>,
}

/// Draws the hover and selected boxes as standalone nodes on top of the page.
///
/// Targets are never restyled; an overlay is a separate absolutely positioned
/// element that ignores pointer events, so removing the overlay nodes leaves
/// the page exactly as it was.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    hover: OverlaySlot,
    selected: OverlaySlot,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: OverlayKind) -> &OverlaySlot {
        match kind {
            OverlayKind::Hover => &self.hover,
            OverlayKind::Selected => &self.selected,
        }
    }

    fn slot_mut(&mut self, kind: OverlayKind) -> &mut OverlaySlot {
        match kind {
            OverlayKind::Hover => &mut self.hover,
            OverlayKind::Selected => &mut self.selected,
        }
    }

    pub fn target(&self, kind: OverlayKind) -> Option<NodeId> {
        self.slot(kind).target
    }

    /// The overlay element for `kind`, if it has been created.
    pub fn overlay_node(&self, kind: OverlayKind) -> Option<NodeId> {
        self.slot(kind).node
    }

    pub fn is_visible(&self, kind: OverlayKind) -> bool {
        self.slot(kind).target.is_some()
    }

    pub fn is_overlay(&self, node: NodeId) -> bool {
        self.hover.node == Some(node) || self.selected.node == Some(node)
    }

    pub fn show(&mut self, doc: &mut Document, kind: OverlayKind, target: NodeId) {
        let node = match self.slot(kind).node {
            Some(node) => node,
            None => {
                let node = create_overlay_node(doc, kind);
                self.slot_mut(kind).node = Some(node);
                node
            }
        };
        if doc.parent(node).is_none() {
            doc.append_child(doc.body(), node);
        }
        self.slot_mut(kind).target = Some(target);
        position_overlay(doc, node, target);
        tracing::trace!(kind = kind.as_str(), ?target, "overlay shown");
    }

    /// Hides the overlay by detaching its node; the node is reused on the next show.
    pub fn clear(&mut self, doc: &mut Document, kind: OverlayKind) {
        let slot = self.slot_mut(kind);
        slot.target = None;
        if let Some(node) = slot.node {
            doc.detach(node);
        }
    }

    /// Recomputes both overlay boxes after a scroll or resize.
    pub fn reposition(&self, doc: &mut Document) {
        for slot in [&self.hover, &self.selected] {
            if let (Some(node), Some(target)) = (slot.node, slot.target) {
                position_overlay(doc, node, target);
            }
        }
    }

    /// Detaches both overlay nodes. They stay owned by the renderer and are
    /// reattached by the next `show`, so repeated sessions add no nodes.
    pub fn remove_all(&mut self, doc: &mut Document) {
        for kind in [OverlayKind::Hover, OverlayKind::Selected] {
            self.clear(doc, kind);
        }
    }
}

fn create_overlay_node(doc: &mut Document, kind: OverlayKind) -> NodeId {
    let node = doc.create_element("div");
    doc.set_attribute(node, OVERLAY_ATTRIBUTE, kind.as_str());
    if let Some(style) = doc.style_mut(node) {
        style.set("position", "absolute");
        style.set("pointer-events", "none");
        style.set("box-sizing", "border-box");
        style.set("z-index", OVERLAY_Z_INDEX);
        style.set("border", kind.border());
        style.set("background", kind.fill());
    }
    node
}

fn overlay_rect(doc: &Document, target: NodeId) -> Rect {
    doc.bounding_client_rect(target).to_page(doc.scroll_offset())
}

fn position_overlay(doc: &mut Document, node: NodeId, target: NodeId) {
    let rect = overlay_rect(doc, target);
    if let Some(style) = doc.style_mut(node) {
        style.set("left", format!("{}px", rect.x));
        style.set("top", format!("{}px", rect.y));
        style.set("width", format!("{}px", rect.width));
        style.set("height", format!("{}px", rect.height));
    }
}
