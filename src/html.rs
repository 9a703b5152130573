// src/html.rs
//! DOM helpers over `scraper`. Text flattening turns block boundaries into
//! newlines and table cells into ` | ` separators; href harvesting stays on
//! the raw markup so the crawler sees links the isolator strips.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

static RE_BODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body\b").expect("body regex"));
static RE_INLINE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\x0B\x0C]+").expect("ws regex"));

/// Never contribute text.
const SILENT_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start and end a line of text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr",
    "table", "thead", "tbody", "tfoot", "blockquote", "pre", "header", "footer", "main", "dd",
    "dt", "dl", "figure", "summary", "details", "title",
];

/// True when the raw markup declares a `<body>`. The parser always
/// synthesizes one, so this is checked on the source text.
pub fn has_body(raw_html: &str) -> bool {
    RE_BODY_OPEN.is_match(raw_html)
}

/// First element matching `sel` in the document.
pub fn first<'a>(doc: &'a Html, sel: &Selector) -> Option<ElementRef<'a>> {
    doc.select(sel).next()
}

/// Lowercased `id`, trimmed.
pub fn id_of(el: &ElementRef<'_>) -> Option<String> {
    el.value().id().map(|s| s.trim().to_ascii_lowercase())
}

/// Lowercased class names.
pub fn classes_of(el: &ElementRef<'_>) -> Vec<String> {
    el.value().classes().map(|c| c.to_ascii_lowercase()).collect()
}

fn walk(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    if SILENT_TAGS.contains(&name) {
        return;
    }
    if name == "br" {
        out.push('\n');
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    walk(child_el, out);
                }
            }
            _ => {}
        }
    }
    if name == "td" || name == "th" {
        out.push_str(" | ");
    } else if block {
        out.push('\n');
    }
}

/// Readable text of one element and its descendants.
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    walk(el, &mut raw);
    collapse_lines(&raw.replace('\u{a0}', " "))
}

/// One-line text (titles, headings, list items).
pub fn inline_text(el: ElementRef<'_>) -> String {
    element_text(el).split('\n').collect::<Vec<_>>().join(" ")
}

/// Readable text of an HTML fragment or document.
pub fn to_text(html: &str) -> String {
    let frag = Html::parse_fragment(html);
    element_text(frag.root_element())
}

/// Collapse inline whitespace to single spaces, drop blank lines, trim.
pub fn collapse_lines(s: &str) -> String {
    let mut lines = Vec::new();
    for raw in s.lines() {
        let line = RE_INLINE_WS.replace_all(raw, " ");
        let line = line.trim();
        let line = line.trim_end_matches(" |").trim_end_matches('|').trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines.join("\n")
}

/// Raw `href` values of anchors in document order.
pub fn hrefs(html: &str) -> Vec<String> {
    static RE_HREF: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("href regex")
    });
    RE_HREF
        .captures_iter(html)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
        .filter(|h| !h.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_keeps_blocks_and_cells() {
        let html = "<h2>Plans</h2><table><tr><td>SSO</td><td>&#10003; Enterprise&nbsp;only</td></tr></table><p>a&amp;b   c</p>";
        assert_eq!(to_text(html), "Plans\nSSO | ✓ Enterprise only\na&b c");
    }

    #[test]
    fn scripts_and_comments_are_silent() {
        let html = "<div>before<!-- hidden --><script>var x = 1;</script><br>after</div>";
        assert_eq!(to_text(html), "before\nafter");
    }

    #[test]
    fn implied_end_tags_are_closed() {
        let doc = Html::parse_fragment("<ul><li>Slack<li>Jira</ul><p>tail");
        let li = Selector::parse("li").unwrap();
        let items: Vec<String> = doc.select(&li).map(inline_text).collect();
        assert_eq!(items, vec!["Slack", "Jira"]);
    }

    #[test]
    fn attribute_lookup_is_case_folded() {
        let doc = Html::parse_document(r#"<html><body><div id=" Main " class="Prose wide">x</div></body></html>"#);
        let el = first(&doc, &Selector::parse("div").unwrap()).unwrap();
        assert_eq!(id_of(&el).as_deref(), Some("main"));
        assert_eq!(classes_of(&el), vec!["prose", "wide"]);
    }

    #[test]
    fn body_is_detected_in_source() {
        assert!(has_body("<HTML><BODY class=x>hi</BODY></HTML>"));
        assert!(!has_body("<p>no body here</p>"));
    }

    #[test]
    fn hrefs_in_document_order() {
        let html = r#"<a href="/a">A</a><link href="/style.css"><a class="x" href='/b#top'>B</a>"#;
        assert_eq!(hrefs(html), vec!["/a".to_string(), "/b#top".to_string()]);
    }
}
