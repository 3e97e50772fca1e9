use scraper::{Html, Selector};

/// Elements whose text never renders.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Text scraped from one loaded page
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// Contents of the `<title>` tag, if any
    pub title: Option<String>,

    /// `<meta name="description">`, falling back to `og:description`
    pub meta_description: Option<String>,

    /// Visible body text with whitespace collapsed
    pub content: String,
}

impl PageText {
    /// Title, meta description and body text joined into the text that gets analysed
    pub fn analysis_text(&self) -> String {
        [self.title.as_deref(), self.meta_description.as_deref(), Some(self.content.as_str())]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Extract the visible text of an HTML page
///
/// Returns `None` when the body has no visible text, which ends the pipeline
/// for that page without contacting the classifier.
///
/// # Examples
/// ```
/// use rust_moodmap::parser::extract_page_text;
///
/// let html = r#"<html><head><title>Hi</title></head><body><p>Hello   world</p></body></html>"#;
/// let page = extract_page_text(html).unwrap();
/// assert_eq!(page.content, "Hello world");
/// assert_eq!(page.title.as_deref(), Some("Hi"));
/// ```
pub fn extract_page_text(html_body: &str) -> Option<PageText> {
    let document = Html::parse_document(html_body);
    let content = visible_body_text(&document)?;

    Some(PageText {
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        content,
    })
}

/// Normalize text that was already extracted by the page (e.g. `innerText`)
///
/// Collapses whitespace; returns `None` if nothing is left.
pub fn normalize_text(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn visible_body_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("body").ok()?;
    let body = document.select(&selector).next()?;

    let mut pieces: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|element| HIDDEN_ELEMENTS.contains(&element.name()))
                .unwrap_or(false)
        });
        if !hidden {
            pieces.push(text);
        }
    }

    normalize_text(&pieces.join(" "))
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| normalize_text(&el.text().collect::<String>()))
}

fn extract_meta_description(document: &Html) -> Option<String> {
    ["meta[name=\"description\"]", "meta[property=\"og:description\"]"]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("content"))
                .find_map(normalize_text)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_visible_text() {
        let html = "<html><body><h1>Big News</h1><p>Something   happened\n today.</p></body></html>";
        let page = extract_page_text(html).unwrap();
        assert_eq!(page.content, "Big News Something happened today.");
    }

    #[test]
    fn test_skips_scripts_and_styles() {
        let html = "<html><body><script>var x = 1;</script><style>p { color: red; }</style><p>Visible</p><noscript>Enable JS</noscript></body></html>";
        let page = extract_page_text(html).unwrap();
        assert_eq!(page.content, "Visible");
    }

    #[test]
    fn test_empty_body_is_none() {
        assert!(extract_page_text("<html><head><title>Empty</title></head><body></body></html>").is_none());
        assert!(extract_page_text("<html><body>   \n\t </body></html>").is_none());
        assert!(extract_page_text("").is_none());
    }

    #[test]
    fn test_script_only_body_is_none() {
        let html = "<html><body><script>console.log('hi')</script></body></html>";
        assert!(extract_page_text(html).is_none());
    }

    #[test]
    fn test_title_and_meta_description() {
        let html = r#"<html><head>
            <title> Example  Domain </title>
            <meta name="description" content="An example page">
        </head><body><p>Body text</p></body></html>"#;
        let page = extract_page_text(html).unwrap();
        assert_eq!(page.title.as_deref(), Some("Example Domain"));
        assert_eq!(page.meta_description.as_deref(), Some("An example page"));
        assert_eq!(page.content, "Body text");
    }

    #[test]
    fn test_og_description_fallback() {
        let html = r#"<html><head><meta property="og:description" content="From OpenGraph"></head><body>Text</body></html>"#;
        let page = extract_page_text(html).unwrap();
        assert_eq!(page.meta_description.as_deref(), Some("From OpenGraph"));
        assert!(page.title.is_none());
    }

    #[test]
    fn test_analysis_text_includes_title_and_description() {
        let html = r#"<html><head>
            <title>Storm Warning</title>
            <meta name="description" content="Heavy rain expected">
        </head><body><p>Stay indoors.</p></body></html>"#;
        let page = extract_page_text(html).unwrap();
        assert_eq!(page.analysis_text(), "Storm Warning Heavy rain expected Stay indoors.");

        let bare = extract_page_text("<body>Only body</body>").unwrap();
        assert_eq!(bare.analysis_text(), "Only body");
    }

    #[test]
    fn test_malformed_html() {
        let html = "<html><body><div>Unclosed div<p>Some text without closing tag</body></html>";
        let page = extract_page_text(html).unwrap();
        assert_eq!(page.content, "Unclosed div Some text without closing tag");
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  a \n b  ").as_deref(), Some("a b"));
        assert_eq!(normalize_text(" \n "), None);
    }
}
