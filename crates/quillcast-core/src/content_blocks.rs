//! Keyed content blocks for assembling article bodies.
//!
//! Each block carries a string key and a typed body; lookups go through
//! [`find_block`] (or the typed helpers) instead of probing untyped maps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading,
    Paragraph,
    Button,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading { key: String, level: u8, text: String },
    Paragraph { key: String, text: String },
    Button { key: String, label: String, href: String },
    List { key: String, items: Vec<String> },
}

impl ContentBlock {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            ContentBlock::Heading { key, .. }
            | ContentBlock::Paragraph { key, .. }
            | ContentBlock::Button { key, .. }
            | ContentBlock::List { key, .. } => key,
        }
    }

    #[must_use]
    pub fn kind(&self) -> BlockKind {
        match self {
            ContentBlock::Heading { .. } => BlockKind::Heading,
            ContentBlock::Paragraph { .. } => BlockKind::Paragraph,
            ContentBlock::Button { .. } => BlockKind::Button,
            ContentBlock::List { .. } => BlockKind::List,
        }
    }

    /// Render the block as an HTML fragment. Text is escaped.
    #[must_use]
    pub fn to_html(&self) -> String {
        match self {
            ContentBlock::Heading { level, text, .. } => {
                let level = (*level).clamp(1, 6);
                format!("<h{level}>{}</h{level}>", escape_html(text))
            }
            ContentBlock::Paragraph { text, .. } => format!("<p>{}</p>", escape_html(text)),
            ContentBlock::Button { label, href, .. } => format!(
                "<a class=\"button\" href=\"{}\">{}</a>",
                escape_html(href),
                escape_html(label)
            ),
            ContentBlock::List { items, .. } => {
                let lis: String = items
                    .iter()
                    .map(|item| format!("<li>{}</li>", escape_html(item)))
                    .collect();
                format!("<ul>{lis}</ul>")
            }
        }
    }
}

/// First block with the given key and kind.
#[must_use]
pub fn find_block<'a>(
    blocks: &'a [ContentBlock],
    key: &str,
    kind: BlockKind,
) -> Option<&'a ContentBlock> {
    blocks
        .iter()
        .find(|block| block.kind() == kind && block.key() == key)
}

#[must_use]
pub fn find_heading<'a>(blocks: &'a [ContentBlock], key: &str) -> Option<&'a str> {
    match find_block(blocks, key, BlockKind::Heading)? {
        ContentBlock::Heading { text, .. } => Some(text),
        _ => None,
    }
}

#[must_use]
pub fn find_list<'a>(blocks: &'a [ContentBlock], key: &str) -> Option<&'a [String]> {
    match find_block(blocks, key, BlockKind::List)? {
        ContentBlock::List { items, .. } => Some(items),
        _ => None,
    }
}

/// Concatenate the HTML of every block, in order.
#[must_use]
pub fn render_blocks(blocks: &[ContentBlock]) -> String {
    blocks.iter().map(ContentBlock::to_html).collect::<Vec<_>>().join("\n")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ContentBlock> {
        vec![
            ContentBlock::Heading {
                key: "intro".to_string(),
                level: 2,
                text: "Why cold brew".to_string(),
            },
            ContentBlock::Paragraph {
                key: "intro".to_string(),
                text: "Less acid & more body.".to_string(),
            },
            ContentBlock::List {
                key: "takeaways".to_string(),
                items: vec!["Steep 18h".to_string(), "Filter twice".to_string()],
            },
        ]
    }

    #[test]
    fn lookup_distinguishes_kind_for_shared_key() {
        let blocks = sample();
        assert_eq!(find_heading(&blocks, "intro"), Some("Why cold brew"));
        assert!(matches!(
            find_block(&blocks, "intro", BlockKind::Paragraph),
            Some(ContentBlock::Paragraph { .. })
        ));
        assert!(find_block(&blocks, "intro", BlockKind::Button).is_none());
    }

    #[test]
    fn missing_key_is_none() {
        let blocks = sample();
        assert!(find_list(&blocks, "nope").is_none());
        assert_eq!(find_list(&blocks, "takeaways").map(<[String]>::len), Some(2));
    }

    #[test]
    fn render_escapes_text() {
        let html = render_blocks(&sample());
        assert!(html.contains("<h2>Why cold brew</h2>"));
        assert!(html.contains("Less acid &amp; more body."));
        assert!(html.contains("<li>Steep 18h</li>"));
    }

    #[test]
    fn blocks_deserialize_from_tagged_json() {
        let json = r#"[{"kind":"button","key":"cta","label":"Shop","href":"/shop"}]"#;
        let blocks: Vec<ContentBlock> = serde_json::from_str(json).expect("parse");
        assert_eq!(blocks[0].kind(), BlockKind::Button);
        assert_eq!(blocks[0].key(), "cta");
    }
}
