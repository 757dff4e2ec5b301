//! Term-frequency sparse vectors for the keyword channel.
//!
//! A BM25 surrogate: raw term counts keyed by a stable hash of each token.
//! There is no corpus-level IDF here; the vector store re-weights sparse
//! vectors with IDF at index time.
//!
//! # Tokenization
//!
//! 1. Lower-case the text and split on whitespace.
//! 2. Strip every non-alphanumeric character from each token.
//! 3. Drop tokens shorter than two characters.
//!
//! # Indexing
//!
//! `index = u64(sha256(term)[0..8]) mod 1_000_000`. Distinct terms that
//! collide on an index have their counts summed. Indices are emitted in
//! ascending order.
//!
//! Changing the hash changes every stored sparse vector; collections must
//! be re-embedded if it ever does.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::models::SparseVector;

/// Size of the sparse index space.
pub const SPARSE_MODULUS: u64 = 1_000_000;

/// Build the sparse term-frequency vector for `text`.
pub fn vectorize(text: &str) -> SparseVector {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    from_term_counts(counts.iter().map(|(t, c)| (t.as_str(), *c)))
}

/// Fold `(term, count)` pairs into a sorted sparse vector, summing collisions.
pub fn from_term_counts<'a>(terms: impl IntoIterator<Item = (&'a str, u32)>) -> SparseVector {
    let mut by_index: BTreeMap<u32, f32> = BTreeMap::new();
    for (term, count) in terms {
        *by_index.entry(term_index(term)).or_insert(0.0) += count as f32;
    }
    let (indices, values) = by_index.into_iter().unzip();
    SparseVector { indices, values }
}

/// Normalized tokens of `text`, in order of appearance.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().filter_map(|raw| {
        let token: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        (token.chars().count() > 1).then_some(token)
    })
}

/// Stable sparse index of a normalized term.
pub fn term_index(term: &str) -> u32 {
    let digest = Sha256::digest(term.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % SPARSE_MODULUS) as u32
}
