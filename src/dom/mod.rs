//! In-memory model of the host page.
//!
//! Both script worlds see the same `Document`; what they do not share is
//! anything else. Element handles (`NodeId`) are only meaningful inside the
//! document that issued them and never cross the window message channel.

use std::sync::{Arc, RwLock};

use crate::geometry::{Rect, ScrollOffset};

mod event;
mod selector;
mod snapshot;

pub use event::{
    EventDisposition, EventKind, KeyStroke, ListenerId, ListenerRegistry, PageEvent, Phase,
};
pub use selector::{parse_selector, CompoundSelector, SelectorError, SelectorResult};
pub(crate) use selector::is_identifier;
pub use snapshot::{NodeSnapshot, PageSnapshot, SnapshotError, SnapshotResult};

pub type SharedDocument = Arc<RwLock<Document>>;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Inline `style` declarations, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.as_str())
    }

    pub fn set(&mut self, property: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .declarations
            .iter_mut()
            .find(|(name, _)| name == property)
        {
            Some(entry) => entry.1 = value,
            None => self.declarations.push((property.to_string(), value)),
        }
    }

    pub fn remove(&mut self, property: &str) -> Option<String> {
        let index = self
            .declarations
            .iter()
            .position(|(name, _)| name == property)?;
        Some(self.declarations.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn css_text(&self) -> String {
        self.declarations
            .iter()
            .map(|(name, value)| format!("{name}: {value};"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parses `prop: value; prop: value` text, ignoring malformed entries.
    pub fn parse(text: &str) -> Self {
        let mut style = Self::default();
        for declaration in text.split(';') {
            if let Some((name, value)) = declaration.split_once(':') {
                let name = name.trim();
                let value = value.trim();
                if !name.is_empty() && !value.is_empty() {
                    style.set(&name.to_ascii_lowercase(), value);
                }
            }
        }
        style
    }
}

#[derive(Debug, Clone)]
pub struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    style: InlineStyle,
    layout: Rect,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    scroll: ScrollOffset,
    listeners: ListenerRegistry,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut document = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            scroll: ScrollOffset::default(),
            listeners: ListenerRegistry::default(),
        };
        let root = document.create_element("html");
        let body = document.create_element("body");
        document.root = root;
        document.body = body;
        document.append_child(root, body);
        document
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(RwLock::new(self))
    }

    pub fn document_element(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            style: InlineStyle::default(),
            layout: Rect::default(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent == child || self.node(parent).is_none() || self.node(child).is_none() {
            return false;
        }
        if self.is_ancestor(child, parent) {
            return false;
        }
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        true
    }

    /// Detaches `node` from its parent. Returns false if it had none.
    pub fn detach(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.node(node).and_then(|n| n.parent) else {
            return false;
        };
        self.nodes[parent.0].children.retain(|child| *child != node);
        self.nodes[node.0].parent = None;
        true
    }

    fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == candidate {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Whether `node` is reachable from the document element.
    pub fn is_connected(&self, node: NodeId) -> bool {
        node == self.root || self.is_ancestor(self.root, node)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    /// Lower-case tag name, or `None` for text nodes.
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag.as_str())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        if name == "style" {
            return None;
        }
        self.element(node)?
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> bool {
        let name = name.to_ascii_lowercase();
        let Some(element) = self.element_mut(node) else {
            return false;
        };
        if name == "style" {
            element.style = InlineStyle::parse(value);
            return true;
        }
        match element.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => element.attributes.push((name, value.to_string())),
        }
        true
    }

    pub fn element_id(&self, node: NodeId) -> Option<&str> {
        self.attribute(node, "id").filter(|id| !id.is_empty())
    }

    pub fn class_list(&self, node: NodeId) -> Vec<&str> {
        self.attribute(node, "class")
            .map(|classes| classes.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn style(&self, node: NodeId) -> Option<&InlineStyle> {
        self.element(node).map(|element| &element.style)
    }

    pub fn style_mut(&mut self, node: NodeId) -> Option<&mut InlineStyle> {
        self.element_mut(node).map(|element| &mut element.style)
    }

    /// Sets the element's box in document coordinates.
    pub fn set_layout(&mut self, node: NodeId, rect: Rect) -> bool {
        match self.element_mut(node) {
            Some(element) => {
                element.layout = rect;
                true
            }
            None => false,
        }
    }

    /// Viewport-relative box, as `getBoundingClientRect` reports it.
    pub fn bounding_client_rect(&self, node: NodeId) -> Rect {
        let layout = self
            .element(node)
            .map(|element| element.layout)
            .unwrap_or_default();
        Rect::new(
            layout.x - self.scroll.x,
            layout.y - self.scroll.y,
            layout.width,
            layout.height,
        )
    }

    pub fn scroll_offset(&self) -> ScrollOffset {
        self.scroll
    }

    pub fn scroll_to(&mut self, x: f64, y: f64) {
        self.scroll = ScrollOffset::new(x.max(0.0), y.max(0.0));
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn add_event_listener(&mut self, kind: EventKind, phase: Phase) -> ListenerId {
        self.listeners.add(kind, phase)
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut text = String::new();
        self.collect_text(node, &mut text);
        text
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(current) = self.node(node) else {
            return;
        };
        match &current.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element(_) => {
                for child in &current.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut html = String::new();
        self.write_html(node, &mut html);
        html
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let Some(current) = self.node(node) else {
            return;
        };
        let element = match &current.data {
            NodeData::Text(text) => {
                out.push_str(&escape_text(text));
                return;
            }
            NodeData::Element(element) => element,
        };

        out.push('<');
        out.push_str(&element.tag);
        for (name, value) in &element.attributes {
            out.push_str(&format!(" {name}=\"{}\"", escape_attribute(value)));
        }
        if !element.style.is_empty() {
            out.push_str(&format!(
                " style=\"{}\"",
                escape_attribute(&element.style.css_text())
            ));
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&element.tag.as_str()) {
            return;
        }
        for child in &current.children {
            self.write_html(*child, out);
        }
        out.push_str(&format!("</{}>", element.tag));
    }

    /// 1-based position of `node` among its parent's element children.
    pub fn element_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.element_children(parent)
            .iter()
            .position(|child| *child == node)
            .map(|index| index + 1)
    }

    /// All connected elements in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        let mut ordered = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if !self.is_element(node) {
                continue;
            }
            ordered.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        ordered
    }

    pub fn matches(&self, node: NodeId, selector: &CompoundSelector) -> bool {
        let Some(tag) = self.tag_name(node) else {
            return false;
        };
        if selector.tag.as_deref().is_some_and(|wanted| wanted != tag) {
            return false;
        }
        if let Some(id) = &selector.id {
            if self.element_id(node) != Some(id.as_str()) {
                return false;
            }
        }
        let classes = self.class_list(node);
        if !selector
            .classes
            .iter()
            .all(|class| classes.contains(&class.as_str()))
        {
            return false;
        }
        match selector.nth_child {
            Some(position) => self.element_index(node) == Some(position),
            None => true,
        }
    }

    /// First connected element matching `selector`, in document order.
    pub fn query_selector(&self, selector: &str) -> SelectorResult<Option<NodeId>> {
        let parsed = parse_selector(selector)?;
        Ok(self
            .elements()
            .into_iter()
            .find(|node| self.matches(*node, &parsed)))
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_document() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let body = doc.body();
        let section = doc.create_element("section");
        doc.append_child(body, section);
        let question = doc.create_element("p");
        doc.set_attribute(question, "class", "question lead");
        let text = doc.create_text("What is 2+2? A) 3 B) 4");
        doc.append_child(question, text);
        doc.append_child(section, question);
        (doc, section, question)
    }

    #[test]
    fn outer_html_serializes_attributes_children_and_escapes() {
        let (mut doc, _, question) = quiz_document();
        doc.set_attribute(question, "title", "a \"quoted\" <title>");
        assert_eq!(
            doc.outer_html(question),
            "<p class=\"question lead\" title=\"a &quot;quoted&quot; &lt;title&gt;\">What is 2+2? A) 3 B) 4</p>"
        );
    }

    #[test]
    fn outer_html_leaves_void_elements_unclosed() {
        let mut doc = Document::new();
        let img = doc.create_element("IMG");
        doc.set_attribute(img, "src", "quiz.png");
        doc.append_child(doc.body(), img);
        assert_eq!(doc.outer_html(img), "<img src=\"quiz.png\">");
    }

    #[test]
    fn style_attribute_is_routed_to_inline_style() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "style", "background-image: url(a.png); color: red");
        let style = doc.style(div).expect("element has style");
        assert_eq!(style.get("background-image"), Some("url(a.png)"));
        assert_eq!(style.get("color"), Some("red"));
        assert_eq!(doc.attribute(div, "style"), None);
    }

    #[test]
    fn query_selector_finds_first_match_in_document_order() {
        let (mut doc, section, question) = quiz_document();
        let second = doc.create_element("p");
        doc.set_attribute(second, "class", "question");
        doc.append_child(section, second);

        assert_eq!(doc.query_selector("p.question"), Ok(Some(question)));
        assert_eq!(doc.query_selector("p:nth-child(2)"), Ok(Some(second)));
        assert_eq!(
            doc.query_selector("section p"),
            Err(SelectorError::Unsupported {
                selector: "section p".to_string()
            })
        );
        assert_eq!(doc.query_selector("video"), Ok(None));
    }

    #[test]
    fn detached_nodes_are_not_found_by_query() {
        let (mut doc, _, question) = quiz_document();
        doc.set_attribute(question, "id", "q1");
        assert_eq!(doc.query_selector("#q1"), Ok(Some(question)));
        assert!(doc.detach(question));
        assert!(!doc.is_connected(question));
        assert_eq!(doc.query_selector("#q1"), Ok(None));
    }

    #[test]
    fn append_child_refuses_cycles() {
        let (mut doc, section, question) = quiz_document();
        assert!(!doc.append_child(question, section));
        assert_eq!(doc.parent(question), Some(section));
    }

    #[test]
    fn bounding_client_rect_is_viewport_relative() {
        let (mut doc, section, _) = quiz_document();
        doc.set_layout(section, Rect::new(10.0, 500.0, 200.0, 40.0));
        doc.scroll_to(0.0, 450.0);
        assert_eq!(
            doc.bounding_client_rect(section),
            Rect::new(10.0, 50.0, 200.0, 40.0)
        );
    }

    #[test]
    fn text_content_concatenates_descendant_text() {
        let (doc, section, _) = quiz_document();
        assert_eq!(doc.text_content(section), "What is 2+2? A) 3 B) 4");
    }
}
