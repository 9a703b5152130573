// src/extract/blocks.rs
//! Structural blocks (headings, list items, table rows) of isolated content.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::html;

static BLOCKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6, li, tr").expect("block selector")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    ListItem,
    TableRow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Heading level 1..=6; 0 for other kinds.
    pub level: u8,
    pub text: String,
}

impl Block {
    /// Table cells (table rows only; other kinds yield the whole text).
    pub fn cells(&self) -> Vec<&str> {
        match self.kind {
            BlockKind::TableRow => self.text.split(" | ").map(str::trim).collect(),
            _ => vec![self.text.as_str()],
        }
    }
}

fn heading_level(tag: &str) -> Option<u8> {
    let rest = tag.strip_prefix('h')?;
    match rest.parse::<u8>() {
        Ok(n) if (1..=6).contains(&n) => Some(n),
        _ => None,
    }
}

fn is_separator_cell(cell: &str) -> bool {
    let c = cell.trim_matches(':');
    !c.is_empty() && c.chars().all(|ch| ch == '-')
}

fn markdown_rows(text: &str) -> Vec<Block> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with('|') || line.matches('|').count() < 2 {
            continue;
        }
        let cells: Vec<&str> = line
            .split('|')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if cells.is_empty() || cells.iter().all(|c| is_separator_cell(c)) {
            continue;
        }
        out.push(Block {
            kind: BlockKind::TableRow,
            level: 0,
            text: cells.join(" | "),
        });
    }
    out
}

/// Headings, list items and table rows from `main_html` in document order,
/// followed by markdown-style table rows found in `text`.
pub fn content_blocks(main_html: &str, text: &str) -> Vec<Block> {
    let mut out = Vec::new();
    let frag = Html::parse_fragment(main_html);

    for el in frag.select(&BLOCKS) {
        let tag = el.value().name();
        let block = if let Some(level) = heading_level(tag) {
            Block {
                kind: BlockKind::Heading,
                level,
                text: html::inline_text(el),
            }
        } else if tag == "li" {
            Block {
                kind: BlockKind::ListItem,
                level: 0,
                text: html::inline_text(el),
            }
        } else {
            // direct cells only; nested tables produce their own rows
            let cells: Vec<String> = el
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(html::inline_text)
                .filter(|c| !c.is_empty())
                .collect();
            Block {
                kind: BlockKind::TableRow,
                level: 0,
                text: cells.join(" | "),
            }
        };
        if !block.text.is_empty() {
            out.push(block);
        }
    }

    out.extend(markdown_rows(text));
    out
}

/// True if the content carries at least one table row.
pub fn is_structured(blocks: &[Block]) -> bool {
    blocks.iter().any(|b| b.kind == BlockKind::TableRow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_blocks_in_document_order() {
        let html = r#"<h2>Security</h2><ul><li>SSO <b>included</b></li></ul>
            <table><tr><th>Feature</th><th>Pro</th></tr><tr><td>SCIM</td><td>&#10003;</td></tr></table>"#;
        let blocks = content_blocks(html, "");
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![BlockKind::Heading, BlockKind::ListItem, BlockKind::TableRow, BlockKind::TableRow]
        );
        assert_eq!(blocks[0].level, 2);
        assert_eq!(blocks[1].text, "SSO included");
        assert_eq!(blocks[3].text, "SCIM | ✓");
        assert_eq!(blocks[3].cells(), vec!["SCIM", "✓"]);
        assert!(is_structured(&blocks));
    }

    #[test]
    fn unclosed_items_and_cells_split_cleanly() {
        let html = "<ul><li>Slack<li>Jira<li>GitHub</ul><table><tr><td>Zendesk<td>Support</table>";
        let blocks = content_blocks(html, "");
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["Slack", "Jira", "GitHub", "Zendesk | Support"]);
        assert_eq!(blocks[3].cells(), vec!["Zendesk", "Support"]);
    }

    #[test]
    fn markdown_rows_from_text() {
        let text = "Compare plans\n| Feature | Plans |\n|---|:---:|\n| SSO | ✓ Enterprise only |";
        let blocks = content_blocks("", text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].text, "SSO | ✓ Enterprise only");
        assert_eq!(blocks[1].kind, BlockKind::TableRow);
    }

    #[test]
    fn plain_text_is_unstructured() {
        let blocks = content_blocks("<p>hello</p>", "hello | world");
        assert!(blocks.is_empty());
        assert!(!is_structured(&blocks));
    }
}
