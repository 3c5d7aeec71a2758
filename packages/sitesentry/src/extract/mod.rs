//! Content extraction and fingerprinting.

mod extractor;
mod hasher;
mod normalize;

pub use extractor::{ContentExtractor, ExtractedDocument};
pub use hasher::fingerprint;
pub use normalize::{
    collapse_alphanumeric, collapse_whitespace, keyword_set, normalize_text, BENIGN_PATTERNS,
    STOPWORDS,
};
