//! HTML → [`ExtractedContent`] transformation.
//!
//! Parsing is best-effort: scraper recovers from malformed markup, so a bad
//! page degrades to whatever could be parsed rather than failing the check.
//! Only a document with no usable content at all is an error.

use std::collections::HashSet;

use ego_tree::iter::Edge;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::types::{ExtractedContent, FingerprintSet, FormField, FormInfo, OutlineNode, PageLink};

use super::hasher::fingerprint;
use super::normalize::{collapse_whitespace, keyword_set, normalize_text, BENIGN_PATTERNS};

/// Outline walks stop recording below this depth to avoid runaway nesting.
const MAX_OUTLINE_DEPTH: usize = 10;

lazy_static! {
    // Static CSS selectors are always valid.
    static ref BLOCK_SELECTOR: Selector =
        Selector::parse("h1,h2,h3,h4,h5,h6,p,div,li,article,section,td,th,blockquote").unwrap();
    static ref LINK_SELECTOR: Selector = Selector::parse("a[href]").unwrap();
    static ref FORM_SELECTOR: Selector = Selector::parse("form").unwrap();
    static ref FIELD_SELECTOR: Selector = Selector::parse("input,textarea,select").unwrap();
    static ref TITLE_SELECTOR: Selector = Selector::parse("title").unwrap();
    static ref META_DESCRIPTION_SELECTOR: Selector =
        Selector::parse(r#"meta[name="description"]"#).unwrap();
}

/// A fully extracted page: normalized content plus its fingerprint family.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub content: ExtractedContent,
    pub fingerprints: FingerprintSet,
    /// Raw HTML exceeded the configured cap and was truncated before hashing
    pub truncated: bool,
}

/// Transforms raw HTML into a stable content representation.
pub struct ContentExtractor {
    ignored_tags: HashSet<String>,
    max_content_bytes: usize,
    benign_patterns: Vec<Regex>,
}

impl ContentExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            ignored_tags: config.ignored_tags.iter().map(|t| t.to_ascii_lowercase()).collect(),
            max_content_bytes: config.max_content_bytes,
            benign_patterns: BENIGN_PATTERNS.clone(),
        }
    }

    /// Add a deployment-specific benign-churn pattern.
    pub fn with_benign_pattern(mut self, pattern: Regex) -> Self {
        self.benign_patterns.push(pattern);
        self
    }

    /// Parse, walk and normalize a page.
    pub fn extract(
        &self,
        raw_html: &str,
        site_url: &str,
    ) -> Result<ExtractedDocument, ExtractError> {
        let truncated = raw_html.len() > self.max_content_bytes;
        let html = truncate_to_boundary(raw_html, self.max_content_bytes);
        if truncated {
            tracing::warn!(
                site_url,
                raw_bytes = raw_html.len(),
                cap = self.max_content_bytes,
                "content truncated before extraction"
            );
        }

        let document = Html::parse_document(html);
        let base_url = Url::parse(site_url).ok();

        let (outline, full_text) = self.walk_document(&document);

        let normalized_text = normalize_text(&full_text, &self.benign_patterns);
        let keywords = keyword_set(&normalized_text);

        let content = ExtractedContent {
            title: self.first_text(&document, &TITLE_SELECTOR),
            meta_description: document
                .select(&META_DESCRIPTION_SELECTOR)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(collapse_whitespace)
                .filter(|s| !s.is_empty()),
            normalized_text,
            keywords,
            outline,
            text_blocks: self.text_blocks(&document),
            links: self.links(&document, base_url.as_ref()),
            forms: self.forms(&document),
        };

        if content.is_empty() {
            return Err(ExtractError::EmptyDocument);
        }

        let fingerprints = fingerprint(&content);
        Ok(ExtractedDocument { content, fingerprints, truncated })
    }

    /// Depth-first walk producing the outline and the visible text, skipping
    /// ignored subtrees entirely.
    fn walk_document(&self, document: &Html) -> (Vec<OutlineNode>, String) {
        let mut outline = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;
        let mut skip_depth = 0usize;

        for edge in document.root_element().traverse() {
            match edge {
                Edge::Open(node) => match node.value() {
                    Node::Element(el) => {
                        let tag = el.name().to_ascii_lowercase();
                        if self.ignored_tags.contains(&tag) {
                            skip_depth += 1;
                        } else if skip_depth == 0 {
                            if depth <= MAX_OUTLINE_DEPTH {
                                let mut classes: Vec<String> =
                                    el.classes().map(|c| c.to_string()).collect();
                                classes.sort_unstable();
                                outline.push(OutlineNode {
                                    tag,
                                    depth,
                                    classes,
                                    id: el.id().map(str::to_string),
                                });
                            }
                        }
                        depth += 1;
                    }
                    Node::Text(t) => {
                        if skip_depth == 0 {
                            text.push_str(&t.text);
                            text.push(' ');
                        }
                    }
                    _ => {}
                },
                Edge::Close(node) => {
                    if let Node::Element(el) = node.value() {
                        depth = depth.saturating_sub(1);
                        let tag = el.name().to_ascii_lowercase();
                        if self.ignored_tags.contains(&tag) {
                            skip_depth = skip_depth.saturating_sub(1);
                        }
                    }
                }
            }
        }

        (outline, text)
    }

    /// Whether any ancestor of the element is an ignored tag.
    fn in_ignored_subtree(&self, element: ElementRef<'_>) -> bool {
        element.ancestors().any(|node| {
            node.value()
                .as_element()
                .map(|el| self.ignored_tags.contains(&el.name().to_ascii_lowercase()))
                .unwrap_or(false)
        })
    }

    /// Visible subtree text of one element, skipping ignored tags.
    fn visible_text(&self, element: ElementRef<'_>) -> String {
        let mut chunks: Vec<&str> = Vec::new();
        let mut skip_depth = 0usize;

        for edge in element.traverse() {
            match edge {
                Edge::Open(node) => match node.value() {
                    Node::Element(el) => {
                        if self.ignored_tags.contains(&el.name().to_ascii_lowercase()) {
                            skip_depth += 1;
                        }
                    }
                    Node::Text(t) => {
                        if skip_depth == 0 {
                            chunks.push(&t.text);
                        }
                    }
                    _ => {}
                },
                Edge::Close(node) => {
                    if let Node::Element(el) = node.value() {
                        if self.ignored_tags.contains(&el.name().to_ascii_lowercase()) {
                            skip_depth = skip_depth.saturating_sub(1);
                        }
                    }
                }
            }
        }

        collapse_whitespace(&chunks.join(" "))
    }

    fn text_blocks(&self, document: &Html) -> Vec<String> {
        document
            .select(&BLOCK_SELECTOR)
            .filter(|el| !self.in_ignored_subtree(*el))
            .map(|el| self.visible_text(el))
            .filter(|text| !text.is_empty())
            .collect()
    }

    fn links(&self, document: &Html, base_url: Option<&Url>) -> Vec<PageLink> {
        let site_host = base_url.and_then(|u| u.host_str().map(str::to_string));
        let mut links = Vec::new();

        for element in document.select(&LINK_SELECTOR) {
            if self.in_ignored_subtree(element) {
                continue;
            }
            let Some(href) = element.value().attr("href") else { continue };
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }

            let resolved = match base_url {
                Some(base) => match base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                },
                None => href.to_string(),
            };

            let internal = match (&site_host, Url::parse(&resolved).ok()) {
                (Some(host), Some(url)) => url.host_str() == Some(host.as_str()),
                _ => false,
            };

            links.push(PageLink { href: resolved, internal });
        }

        links
    }

    fn forms(&self, document: &Html) -> Vec<FormInfo> {
        document
            .select(&FORM_SELECTOR)
            .filter(|form| !self.in_ignored_subtree(*form))
            .map(|form| {
                let fields = form
                    .select(&FIELD_SELECTOR)
                    .map(|field| FormField {
                        name: field.value().attr("name").map(str::to_string),
                        input_type: field
                            .value()
                            .attr("type")
                            .unwrap_or(field.value().name())
                            .to_ascii_lowercase(),
                    })
                    .collect();

                FormInfo {
                    method: form
                        .value()
                        .attr("method")
                        .unwrap_or("get")
                        .to_ascii_lowercase(),
                    action: form.value().attr("action").map(str::to_string),
                    fields,
                }
            })
            .collect()
    }

    fn first_text(&self, document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|s| !s.is_empty())
    }
}

fn truncate_to_boundary(html: &str, max: usize) -> &str {
    if html.len() <= max {
        return html;
    }
    let mut end = max;
    while end > 0 && !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(&ExtractorConfig::default())
    }

    const PAGE: &str = r#"
        <html>
          <head>
            <title>Acme Corp</title>
            <meta name="description" content="Industrial supplies since 1949">
            <script>var tracking = "f00f00f00f00f00f00f00f00f00f00f1";</script>
          </head>
          <body>
            <nav><a href="/hidden">nav link</a></nav>
            <h1 class="hero main">Welcome to Acme</h1>
            <p id="intro">We sell <b>anvils</b> and rockets.</p>
            <a href="/products">Products</a>
            <a href="https://other.example/partner">Partner</a>
            <form method="post" action="/subscribe">
              <input type="email" name="email">
              <input type="hidden" name="csrf_token" value="deadbeef12345678">
            </form>
          </body>
        </html>"#;

    #[test]
    fn extracts_title_and_meta() {
        let doc = extractor().extract(PAGE, "https://acme.example").unwrap();
        assert_eq!(doc.content.title.as_deref(), Some("Acme Corp"));
        assert_eq!(doc.content.meta_description.as_deref(), Some("Industrial supplies since 1949"));
    }

    #[test]
    fn ignored_tags_leave_no_trace() {
        let doc = extractor().extract(PAGE, "https://acme.example").unwrap();
        assert!(!doc.content.normalized_text.contains("tracking"));
        assert!(!doc.content.normalized_text.contains("nav link"));
        assert!(doc.content.outline.iter().all(|n| n.tag != "script" && n.tag != "nav"));
    }

    #[test]
    fn outline_captures_classes_sorted_and_ids() {
        let doc = extractor().extract(PAGE, "https://acme.example").unwrap();
        let h1 = doc.content.outline.iter().find(|n| n.tag == "h1").unwrap();
        assert_eq!(h1.classes, vec!["hero".to_string(), "main".to_string()]);
        let p = doc.content.outline.iter().find(|n| n.tag == "p").unwrap();
        assert_eq!(p.id.as_deref(), Some("intro"));
    }

    #[test]
    fn links_are_tagged_internal_external() {
        let doc = extractor().extract(PAGE, "https://acme.example").unwrap();
        let products = doc.content.links.iter().find(|l| l.href.contains("/products")).unwrap();
        assert!(products.internal);
        let partner = doc.content.links.iter().find(|l| l.href.contains("partner")).unwrap();
        assert!(!partner.internal);
        assert!(doc.content.links.iter().all(|l| !l.href.contains("/hidden")));
    }

    #[test]
    fn forms_capture_field_metadata() {
        let doc = extractor().extract(PAGE, "https://acme.example").unwrap();
        assert_eq!(doc.content.forms.len(), 1);
        let form = &doc.content.forms[0];
        assert_eq!(form.method, "post");
        assert_eq!(form.action.as_deref(), Some("/subscribe"));
        assert!(form.fields.iter().any(|f| f.name.as_deref() == Some("email")));
    }

    #[test]
    fn malformed_html_is_recovered() {
        let doc = extractor()
            .extract("<html><body><p>broken <div>but usable", "https://acme.example")
            .unwrap();
        assert!(doc.content.normalized_text.contains("broken"));
        assert!(doc.content.normalized_text.contains("usable"));
    }

    #[test]
    fn oversized_content_sets_truncated_flag() {
        let config = ExtractorConfig { max_content_bytes: 200, ..Default::default() };
        let big = format!("<html><body><p>{}</p></body></html>", "word ".repeat(100));
        let doc = ContentExtractor::new(&config).extract(&big, "https://acme.example").unwrap();
        assert!(doc.truncated);
        assert!(!doc.content.normalized_text.is_empty());
    }

    #[test]
    fn empty_document_is_an_error() {
        let err = extractor().extract("", "https://acme.example");
        assert!(matches!(err, Err(ExtractError::EmptyDocument)));
    }

    #[test]
    fn identical_pages_modulo_benign_churn_fingerprint_identically() {
        let page_a = PAGE.replace("1949", "1949");
        let page_b = PAGE.replace(
            "f00f00f00f00f00f00f00f00f00f00f1",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa2",
        );
        let a = extractor().extract(&page_a, "https://acme.example").unwrap();
        let b = extractor().extract(&page_b, "https://acme.example").unwrap();
        assert!(a.fingerprints.matches(&b.fingerprints));
    }
}
