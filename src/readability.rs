// src/readability.rs
//! Content isolation: strip chrome (scripts, nav, footers, cookie banners),
//! then locate the page's title and main content through ordered strategy
//! cascades. First strategy that yields something wins.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::html;

const UNTITLED: &str = "Untitled";

/// Elements removed wholesale before main-content detection.
static NOISE_TAGS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script, style, noscript, template, svg, nav, header, footer, aside, form, iframe")
        .expect("noise selector")
});
static MARKED: Lazy<Selector> = Lazy::new(|| Selector::parse("[class], [id]").expect("marked selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("h1 selector"));
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[content]").expect("meta selector"));
static MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("main").expect("main selector"));
static WITH_ID: Lazy<Selector> = Lazy::new(|| Selector::parse("[id]").expect("id selector"));
static WITH_CLASS: Lazy<Selector> = Lazy::new(|| Selector::parse("[class]").expect("class selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("body selector"));

/// class/id tokens (split on `-`, `_`, whitespace) that mark chrome.
const NOISE_TOKENS: &[&str] = &[
    "nav", "navbar", "navigation", "menu", "breadcrumb", "breadcrumbs", "ad", "ads", "advert",
    "advertisement", "sponsored", "banner", "cookie", "cookies", "consent", "popup", "modal",
    "overlay", "social", "share", "sharing", "sidebar", "newsletter", "footer",
];

/// Never removed by the token filter; losing these loses the page.
const PROTECTED_TAGS: &[&str] = &["html", "head", "body", "main"];

const CONTENT_IDS: &[&str] = &["content", "main", "main-content", "maincontent", "primary", "article"];
const CONTENT_CLASSES: &[&str] = &[
    "content",
    "main-content",
    "page-content",
    "post-content",
    "entry-content",
    "article-body",
    "article",
    "markdown-body",
    "docs-content",
    "prose",
];
const BODY_BLOCK_TAGS: &[&str] = &["div", "article", "section"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Isolated {
    pub title: String,
    pub main_html: String,
    pub text: String,
    /// Name of the main-content strategy that matched, if any.
    pub strategy: Option<&'static str>,
}

impl Isolated {
    fn degenerate() -> Self {
        Self {
            title: UNTITLED.to_string(),
            main_html: String::new(),
            text: String::new(),
            strategy: None,
        }
    }
}

pub trait TitleStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn title(&self, doc: &Html) -> Option<String>;
}

pub trait ContentStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    /// The main-content element of the de-noised document.
    fn locate<'a>(&self, cleaned: &'a Html) -> Option<ElementRef<'a>>;
}

struct TitleTag;
struct FirstHeading;
struct OpenGraphTitle;

impl TitleStrategy for TitleTag {
    fn name(&self) -> &'static str {
        "title-tag"
    }
    fn title(&self, doc: &Html) -> Option<String> {
        html::first(doc, &TITLE).and_then(|el| non_empty(html::inline_text(el)))
    }
}

impl TitleStrategy for FirstHeading {
    fn name(&self) -> &'static str {
        "h1"
    }
    fn title(&self, doc: &Html) -> Option<String> {
        html::first(doc, &H1).and_then(|el| non_empty(html::inline_text(el)))
    }
}

impl TitleStrategy for OpenGraphTitle {
    fn name(&self) -> &'static str {
        "og:title"
    }
    fn title(&self, doc: &Html) -> Option<String> {
        doc.select(&META)
            .find(|m| {
                let v = m.value();
                v.attr("property")
                    .or_else(|| v.attr("name"))
                    .is_some_and(|p| p.eq_ignore_ascii_case("og:title"))
            })
            .and_then(|m| m.value().attr("content"))
            .and_then(|c| non_empty(html::collapse_lines(c).replace('\n', " ")))
    }
}

struct MainElement;
struct ContentId;
struct ContentClass;
struct LargestBodyBlock;

fn has_text(el: &ElementRef<'_>) -> bool {
    !html::element_text(*el).is_empty()
}

fn is_content_id(el: &ElementRef<'_>) -> bool {
    html::id_of(el).is_some_and(|id| CONTENT_IDS.contains(&id.as_str()))
}

fn is_content_class(el: &ElementRef<'_>) -> bool {
    html::classes_of(el)
        .iter()
        .any(|c| CONTENT_CLASSES.contains(&c.as_str()))
}

impl ContentStrategy for MainElement {
    fn name(&self) -> &'static str {
        "main"
    }
    fn locate<'a>(&self, cleaned: &'a Html) -> Option<ElementRef<'a>> {
        html::first(cleaned, &MAIN).filter(has_text)
    }
}

impl ContentStrategy for ContentId {
    fn name(&self) -> &'static str {
        "content-id"
    }
    fn locate<'a>(&self, cleaned: &'a Html) -> Option<ElementRef<'a>> {
        cleaned
            .select(&WITH_ID)
            .find(|el| el.value().name() != "body" && is_content_id(el))
            .filter(has_text)
    }
}

impl ContentStrategy for ContentClass {
    fn name(&self) -> &'static str {
        "content-class"
    }
    fn locate<'a>(&self, cleaned: &'a Html) -> Option<ElementRef<'a>> {
        cleaned
            .select(&WITH_CLASS)
            .find(|el| el.value().name() != "body" && is_content_class(el))
            .filter(has_text)
    }
}

impl ContentStrategy for LargestBodyBlock {
    fn name(&self) -> &'static str {
        "largest-body-block"
    }
    fn locate<'a>(&self, cleaned: &'a Html) -> Option<ElementRef<'a>> {
        let body = html::first(cleaned, &BODY)?;

        let mut best: Option<(usize, ElementRef<'a>)> = None;
        for child in body.children().filter_map(ElementRef::wrap) {
            if !BODY_BLOCK_TAGS.contains(&child.value().name()) {
                continue;
            }
            let len = html::element_text(child).chars().count();
            // strictly greater keeps the first of equal candidates
            if len > 0 && best.map_or(true, |(b, _)| len > b) {
                best = Some((len, child));
            }
        }
        match best {
            Some((_, el)) => Some(el),
            None => Some(body).filter(has_text),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn is_noise_marker(value: &str) -> bool {
    value
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|tok| !tok.is_empty())
        .any(|tok| NOISE_TOKENS.contains(&tok.to_ascii_lowercase().as_str()))
}

fn is_noise_element(el: &ElementRef<'_>) -> bool {
    let v = el.value();
    if PROTECTED_TAGS.contains(&v.name()) {
        return false;
    }
    v.attr("class").is_some_and(is_noise_marker) || v.attr("id").is_some_and(is_noise_marker)
}

/// Page wrappers often carry layout classes like `has-sidebar`; anything
/// holding the main content region stays.
fn wraps_content(el: &ElementRef<'_>) -> bool {
    el.descendants().skip(1).filter_map(ElementRef::wrap).any(|d| {
        d.value().name() == "main"
            || d.value().attr("role").is_some_and(|r| r.eq_ignore_ascii_case("main"))
            || is_content_id(&d)
            || is_content_class(&d)
    })
}

/// Detach noise tags, then elements whose class/id carries a noise token.
pub fn remove_noise(doc: &mut Html) {
    let mut doomed: Vec<_> = doc
        .select(&NOISE_TAGS)
        .filter(|el| !wraps_content(el))
        .map(|el| el.id())
        .collect();
    doomed.extend(
        doc.select(&MARKED)
            .filter(|el| is_noise_element(el) && !wraps_content(el))
            .map(|el| el.id()),
    );
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Ordered title and main-content cascades.
pub struct Isolator {
    titles: Vec<Box<dyn TitleStrategy>>,
    contents: Vec<Box<dyn ContentStrategy>>,
}

impl Default for Isolator {
    fn default() -> Self {
        Self {
            titles: vec![Box::new(TitleTag), Box::new(FirstHeading), Box::new(OpenGraphTitle)],
            contents: vec![
                Box::new(MainElement),
                Box::new(ContentId),
                Box::new(ContentClass),
                Box::new(LargestBodyBlock),
            ],
        }
    }
}

impl Isolator {
    pub fn title(&self, raw_html: &str) -> String {
        self.title_of(&Html::parse_document(raw_html))
    }

    fn title_of(&self, doc: &Html) -> String {
        self.titles
            .iter()
            .find_map(|s| s.title(doc))
            .unwrap_or_else(|| UNTITLED.to_string())
    }

    pub fn isolate(&self, raw_html: &str) -> Isolated {
        if !html::has_body(raw_html) {
            return Isolated::degenerate();
        }

        let mut doc = Html::parse_document(raw_html);
        let title = self.title_of(&doc);
        remove_noise(&mut doc);

        let found = self
            .contents
            .iter()
            .find_map(|s| s.locate(&doc).map(|el| (s.name(), el)));
        let Some((strategy, main)) = found else {
            return Isolated { title, ..Isolated::degenerate() };
        };
        let text = html::element_text(main);
        if text.is_empty() {
            return Isolated { title, ..Isolated::degenerate() };
        }

        tracing::trace!(strategy, text_len = text.len(), "content isolated");
        Isolated {
            title,
            main_html: main.inner_html().trim().to_string(),
            text,
            strategy: Some(strategy),
        }
    }
}

/// Isolate with the default cascades.
pub fn isolate(raw_html: &str) -> Isolated {
    Isolator::default().isolate(raw_html)
}
