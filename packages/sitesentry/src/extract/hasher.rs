//! The four content fingerprints.
//!
//! Each hash covers a distinct projection of the extracted content so the
//! detector can tell *what kind* of change happened from which hashes moved:
//!
//! - `content_hash`: Blake3 over normalized text (any textual change)
//! - `structure_hash`: Blake2b over the DOM outline (layout change)
//! - `text_block_hash`: Blake2b over sorted text blocks (catches reordering)
//! - `semantic_hash`: Blake2b over alphanumeric-collapsed text (ignores
//!   formatting-only edits)

use blake2::{Blake2b512, Digest};

use crate::types::{ExtractedContent, FingerprintSet};

use super::normalize::collapse_alphanumeric;

/// Compute the full fingerprint family for extracted content.
pub fn fingerprint(content: &ExtractedContent) -> FingerprintSet {
    FingerprintSet {
        content_hash: blake3::hash(content.normalized_text.as_bytes()).to_hex().to_string(),
        structure_hash: blake2b_hex(structure_projection(content).as_bytes()),
        text_block_hash: blake2b_hex(text_block_projection(content).as_bytes()),
        semantic_hash: blake2b_hex(collapse_alphanumeric(&content.normalized_text).as_bytes()),
    }
}

fn structure_projection(content: &ExtractedContent) -> String {
    content
        .outline
        .iter()
        .map(|node| node.signature())
        .collect::<Vec<_>>()
        .join("|")
}

fn text_block_projection(content: &ExtractedContent) -> String {
    let mut blocks = content.text_blocks.clone();
    blocks.sort_unstable();
    blocks.join("\n")
}

fn blake2b_hex(data: &[u8]) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
