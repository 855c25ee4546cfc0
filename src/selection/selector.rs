use crate::dom::{is_identifier, Document, NodeId};

/// Builds a selector the other world can use to find `node` again.
///
/// Preference order: `tag#id`, then `tag.first-class`, then
/// `tag:nth-child(n)`. The result is not guaranteed to be unique; the
/// resolver takes the first match, so a page that changes in between may
/// resolve to a different element.
pub fn structural_selector(doc: &Document, node: NodeId) -> Option<String> {
    let tag = doc.tag_name(node)?;

    if let Some(id) = doc.element_id(node).filter(|id| is_identifier(id)) {
        return Some(format!("{tag}#{id}"));
    }

    if let Some(class) = doc.class_list(node).first().filter(|class| is_identifier(class)) {
        return Some(format!("{tag}.{class}"));
    }

    match doc.element_index(node) {
        Some(position) => Some(format!("{tag}:nth-child({position})")),
        None => Some(tag.to_string()),
    }
}
