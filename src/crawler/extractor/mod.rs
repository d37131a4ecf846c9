
use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

/// Elements whose text never reaches the model
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "nav", "header", "footer", "iframe", "template",
    "button", "form",
];

const SKIPPED_CLASSES: &[&str] = &["advertisement", "ads", "sidebar", "cookie-banner", "menu"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre",
    "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

/// Visible text of an HTML page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedText {
    pub title: String,
    /// One line per block element, whitespace collapsed
    pub text: String,
}

/// Extract the title and visible text from an HTML document
pub fn extract_text(html: &str) -> Result<ExtractedText> {
    let document = Html::parse_document(html);

    let title = extract_title(&document)?;

    let body_selector =
        Selector::parse("body").map_err(|e| anyhow!("Failed to create CSS selector: {:?}", e))?;
    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::with_capacity(html.len() / 2);
    collect_text(root, &mut raw);
    let text = collapse_whitespace(&raw);

    debug!(
        "Extracted text: title='{}', {} chars from {} bytes of HTML",
        title,
        text.len(),
        html.len()
    );

    Ok(ExtractedText { title, text })
}

fn extract_title(document: &Html) -> Result<String> {
    for selector in ["title", "h1"] {
        let selector = Selector::parse(selector)
            .map_err(|e| anyhow!("Failed to create CSS selector: {:?}", e))?;
        if let Some(element) = document.select(&selector).next() {
            let title = collapse_whitespace(&element.text().collect::<String>());
            if !title.is_empty() {
                return Ok(title.replace('\n', " "));
            }
        }
    }
    Ok(String::new())
}

fn is_skipped(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    SKIPPED_TAGS.contains(&value.name())
        || value.attr("hidden").is_some()
        || value.attr("aria-hidden") == Some("true")
        || value.classes().any(|class| SKIPPED_CLASSES.contains(&class))
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_skipped(&child) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&child.value().name());
                if block {
                    out.push('\n');
                }
                collect_text(child, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of whitespace inside lines and drop blank lines
#[inline]
pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
