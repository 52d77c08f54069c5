//! Text tokenization shared by the indexing pipeline and the query evaluator.
//!
//! Both sides must agree byte-for-byte on what a token is, so the crawl
//! worker and the search handler funnel through the same
//! [`accepted_tokens`] pipeline: depunctuate, split, NFD-decompose, case
//! fold, then filter through [`is_indexable`].

use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

/// Maximum surface length, in characters, of an indexable token.
const MAX_TOKEN_CHARS: usize = 64;
/// Minimum surface length of an indexable token.
const MIN_TOKEN_CHARS: usize = 2;

/// Replaces every ASCII byte that is not a letter, digit or whitespace with
/// a space. Non-ASCII characters pass through untouched.
fn depunctuate(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || !c.is_ascii() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Canonical form of a raw token: NFD decomposition followed by case folding.
fn normalize(token: &str) -> String {
    token.nfd().collect::<String>().to_lowercase()
}

/// Whether a normalized token belongs in the index.
///
/// Accepts tokens of 2..=64 characters whose bytes are all ASCII letters or
/// non-ASCII continuation bytes; anything containing an ASCII digit is
/// rejected, so pure numbers and mixed alphanumerics never reach the word
/// dictionary.
pub fn is_indexable(token: &str) -> bool {
    let chars = token.chars().count();
    if !(MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&chars) {
        return false;
    }
    token.bytes().all(|b| b.is_ascii_alphabetic() || b >= 0x80)
}

fn accepted_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    depunctuate(text)
        .split_ascii_whitespace()
        .map(normalize)
        .filter(|t| is_indexable(t))
        .collect::<Vec<_>>()
        .into_iter()
}

/// Builds the per-document frequency map for `text`.
pub fn index(text: &str) -> HashMap<String, i32> {
    let mut frequencies = HashMap::new();
    for token in accepted_tokens(text) {
        *frequencies.entry(token).or_insert(0) += 1;
    }
    frequencies
}

/// Tokenizes a query string with the indexing pipeline, deduplicating while
/// preserving first-occurrence order.
pub fn query_tokens(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for token in accepted_tokens(query) {
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }
    tokens
}
