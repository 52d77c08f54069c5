//! Query evaluation: from a raw query string to ranked conjunctive results.

use crate::store::{SearchResult, Store, StoreError};
use crate::tokenizer;

/// Hard upper bound on the number of query tokens evaluated.
const MAX_QUERY_TOKENS: usize = 4;

/// Normalizes a raw query into the token list handed to the store: the
/// indexing tokenizer, first-occurrence dedupe, then the four-token cap.
pub fn prepare_query_tokens(query: &str) -> Vec<String> {
    let mut tokens = tokenizer::query_tokens(query);
    tokens.truncate(MAX_QUERY_TOKENS);
    tokens
}

/// Read-only search facade over the catalog.
pub struct Searcher {
    store: Store,
}

impl Searcher {
    /// Wraps an already-connected store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Evaluates a conjunctive query, returning up to `limit` results
    /// ordered by descending score. Queries with no valid tokens produce an
    /// empty list, not an error.
    pub async fn search(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let tokens = prepare_query_tokens(query);
        if tokens.is_empty() {
            tracing::debug!(query, "no valid search tokens");
            return Ok(Vec::new());
        }
        tracing::debug!(query, ?tokens, limit, "searching");
        self.store.search_conjunctive_top_k(&tokens, limit).await
    }

    /// Catalog size figures for the landing page.
    pub async fn catalog_stats(&self) -> Result<(i64, i64), StoreError> {
        let documents = self.store.document_count().await?;
        let words = self.store.word_count().await?;
        Ok((documents, words))
    }
}
