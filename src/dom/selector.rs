use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported selector syntax: {selector}")]
    Unsupported { selector: String },
}

pub type SelectorResult<T> = std::result::Result<T, SelectorError>;

/// A single compound selector such as `div#main`, `p.lead` or `li:nth-child(3)`.
///
/// Combinators and attribute selectors are not supported; the structural
/// selectors built for cross-world lookups never use them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub nth_child: Option<usize>,
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

pub(crate) fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '-' => {}
        _ => return false,
    }
    chars.all(is_ident_char)
}

fn take_ident(rest: &str) -> (&str, &str) {
    let end = rest
        .char_indices()
        .find(|(_, ch)| !is_ident_char(*ch))
        .map(|(index, _)| index)
        .unwrap_or(rest.len());
    rest.split_at(end)
}

pub fn parse_selector(selector: &str) -> SelectorResult<CompoundSelector> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(SelectorError::Empty);
    }
    let unsupported = || SelectorError::Unsupported {
        selector: trimmed.to_string(),
    };

    let mut parsed = CompoundSelector::default();
    let (tag, mut rest) = take_ident(trimmed);
    if !tag.is_empty() {
        parsed.tag = Some(tag.to_ascii_lowercase());
    }

    while let Some(prefix) = rest.chars().next() {
        match prefix {
            '#' => {
                let (ident, tail) = take_ident(&rest[1..]);
                if ident.is_empty() || parsed.id.is_some() {
                    return Err(unsupported());
                }
                parsed.id = Some(ident.to_string());
                rest = tail;
            }
            '.' => {
                let (ident, tail) = take_ident(&rest[1..]);
                if ident.is_empty() {
                    return Err(unsupported());
                }
                parsed.classes.push(ident.to_string());
                rest = tail;
            }
            ':' => {
                let tail = rest
                    .strip_prefix(":nth-child(")
                    .ok_or_else(unsupported)?;
                let close = tail.find(')').ok_or_else(unsupported)?;
                let index = tail[..close]
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|index| *index > 0)
                    .ok_or_else(unsupported)?;
                if parsed.nth_child.is_some() {
                    return Err(unsupported());
                }
                parsed.nth_child = Some(index);
                rest = &tail[close + 1..];
            }
            _ => return Err(unsupported()),
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_selector_reads_tag_id_classes_and_position() {
        let parsed = parse_selector("IMG#hero.wide.tall:nth-child(2)").expect("selector parses");
        assert_eq!(parsed.tag.as_deref(), Some("img"));
        assert_eq!(parsed.id.as_deref(), Some("hero"));
        assert_eq!(parsed.classes, vec!["wide".to_string(), "tall".to_string()]);
        assert_eq!(parsed.nth_child, Some(2));
    }

    #[test]
    fn parse_selector_accepts_bare_id() {
        let parsed = parse_selector("#question").expect("selector parses");
        assert_eq!(parsed.tag, None);
        assert_eq!(parsed.id.as_deref(), Some("question"));
    }

    #[test]
    fn parse_selector_rejects_combinators_and_bad_positions() {
        assert!(matches!(
            parse_selector("div > p"),
            Err(SelectorError::Unsupported { .. })
        ));
        assert!(matches!(
            parse_selector("li:nth-child(0)"),
            Err(SelectorError::Unsupported { .. })
        ));
        assert!(matches!(
            parse_selector("a[href]"),
            Err(SelectorError::Unsupported { .. })
        ));
        assert_eq!(parse_selector("   "), Err(SelectorError::Empty));
    }

    #[test]
    fn is_identifier_rejects_leading_digits() {
        assert!(is_identifier("main-content"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier(""));
    }
}
