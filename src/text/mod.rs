//! Reduces picked markup to the plain text sent to the model.

const ENTITIES: [(&str, &str); 6] = [
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
];

/// Replaces every tag with a space, collapses whitespace, then decodes the
/// handful of entities pages commonly use.
pub fn html_to_text(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match (in_tag, ch) {
            (false, '<') => in_tag = true,
            (true, '>') => {
                in_tag = false;
                stripped.push(' ');
            }
            (false, _) => stripped.push(ch),
            (true, _) => {}
        }
    }
    if in_tag {
        // Unterminated `<` is text, not a tag.
        if let Some(start) = html.rfind('<') {
            stripped.push_str(&html[start..]);
        }
    }

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    ENTITIES
        .iter()
        .fold(collapsed, |text, (entity, replacement)| {
            text.replace(entity, replacement)
        })
}
