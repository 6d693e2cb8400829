use scraper::{Html, Node, Selector};
use std::sync::LazyLock;

static TITLE: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("title").ok());

/// Elements whose text is never indexed
const SKIPPED: [&str; 5] = ["script", "style", "noscript", "template", "title"];

/// Text extracted from an HTML document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlText {
    pub title: String,
    pub body: String,
}

/// Extract the `<title>` and the visible text of an HTML document
pub fn extract_text(html: &str) -> HtmlText {
    let document = Html::parse_document(html);

    let title = TITLE
        .as_ref()
        .and_then(|selector| document.select(selector).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let mut body = String::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIPPED.contains(&el.name()))
        });
        if skipped {
            continue;
        }
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !body.is_empty() {
            body.push(' ');
        }
        body.push_str(text);
    }

    HtmlText { title, body }
}

/// Whether a mimetype is HTML and eligible for default indexing
pub fn is_html(mimetype: &str) -> bool {
    mimetype
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("text/html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_title_and_visible_text() {
        let html = r#"<html><head><title> Hello Page </title>
            <style>body { color: red }</style></head>
            <body><h1>Main</h1><p>Some <b>bold</b> text.</p>
            <script>var hidden = 1;</script></body></html>"#;
        let text = extract_text(html);
        assert_eq!(text.title, "Hello Page");
        assert!(text.body.contains("Main"));
        assert!(text.body.contains("bold"));
        assert!(!text.body.contains("hidden"));
        assert!(!text.body.contains("color"));
        assert!(!text.body.contains("Hello Page"));
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("text/html; charset=utf-8"));
        assert!(!is_html("text/plain"));
    }
}
