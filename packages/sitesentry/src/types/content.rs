use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One element of the DOM outline: tag name, nesting depth, sorted classes
/// and optional id. The outline is an ordered depth-first sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub tag: String,
    pub depth: usize,
    pub classes: Vec<String>,
    pub id: Option<String>,
}

impl OutlineNode {
    /// Canonical `tag:depth[.class1.class2…][#id]` tuple used for the
    /// structure hash and the structural-similarity edit distance.
    pub fn signature(&self) -> String {
        let mut sig = format!("{}:{}", self.tag, self.depth);
        for class in &self.classes {
            sig.push('.');
            sig.push_str(class);
        }
        if let Some(id) = &self.id {
            sig.push('#');
            sig.push_str(id);
        }
        sig
    }
}

/// A hyperlink found on the page, tagged internal/external relative to the
/// monitored site's host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    pub internal: bool,
}

/// An input field inside a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: Option<String>,
    pub input_type: String,
}

/// A form with its input-field metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInfo {
    pub method: String,
    pub action: Option<String>,
    pub fields: Vec<FormField>,
}

/// Normalized representation of a fetched page. Transient: derived from raw
/// HTML on every check, never persisted as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    /// Lowercased, whitespace-collapsed text with benign-churn patterns
    /// (timestamps, session ids, tokens) stripped
    pub normalized_text: String,
    /// Tokenized, stopword-filtered, deduplicated
    pub keywords: HashSet<String>,
    /// Depth-first DOM outline, bounded to depth 10
    pub outline: Vec<OutlineNode>,
    /// Text of significant block tags, in document order
    pub text_blocks: Vec<String>,
    pub links: Vec<PageLink>,
    pub forms: Vec<FormInfo>,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.normalized_text.is_empty() && self.outline.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_includes_sorted_classes_and_id() {
        let node = OutlineNode {
            tag: "div".into(),
            depth: 2,
            classes: vec!["alpha".into(), "beta".into()],
            id: Some("main".into()),
        };
        assert_eq!(node.signature(), "div:2.alpha.beta#main");
    }

    #[test]
    fn signature_without_decorations() {
        let node = OutlineNode { tag: "p".into(), depth: 4, classes: vec![], id: None };
        assert_eq!(node.signature(), "p:4");
    }
}
