//! Text search over the trigram index, and code-prefix search over rows.
//!
//! The index is asked for more hits than the caller wants so that level and
//! expiry filtering after the fetch does not starve the page. Ranking is
//! whatever the index returns; nothing here re-orders hits.

use std::sync::Arc;

use tracing::debug;

use crate::codec::MAX_LEVEL;
use crate::error::{KpdError, Result};
use crate::ports::ClassificationStore;
use crate::types::{ClassificationEntry, CodeScan, ExpiryFilter, SearchLanguage, TextQuery};

/// Index hits fetched per requested result.
pub const OVERFETCH_FACTOR: usize = 2;

/// Default page size for search endpoints.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Largest `limit` a search request may ask for.
pub const MAX_SEARCH_LIMIT: usize = 1_000;

/// Quote `term` as a phrase, escaping backslashes and double quotes.
pub fn escape_phrase(term: &str) -> String {
    let mut phrase = String::with_capacity(term.len() + 2);
    phrase.push('"');
    for c in term.chars() {
        if matches!(c, '"' | '\\') {
            phrase.push('\\');
        }
        phrase.push(c);
    }
    phrase.push('"');
    phrase
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub language: SearchLanguage,
    pub level: Option<u8>,
    pub limit: usize,
    pub expiry: ExpiryFilter,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            language: SearchLanguage::default(),
            level: None,
            limit: DEFAULT_SEARCH_LIMIT,
            expiry: ExpiryFilter::default(),
        }
    }

    pub fn language(mut self, language: SearchLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn expiry(mut self, expiry: ExpiryFilter) -> Self {
        self.expiry = expiry;
        self
    }
}

#[derive(Clone)]
pub struct SearchService {
    store: Arc<dyn ClassificationStore>,
}

impl SearchService {
    pub fn new(store: Arc<dyn ClassificationStore>) -> Self {
        Self { store }
    }

    /// Ranked trigram search. A blank query returns nothing.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<ClassificationEntry>> {
        validate_limit(request.limit)?;
        if let Some(level) = request.level {
            validate_level_filter(level)?;
        }

        let term = request.query.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let query = TextQuery {
            term: term.to_string(),
            phrase: escape_phrase(term),
            language: request.language,
            fetch_limit: request.limit.saturating_mul(OVERFETCH_FACTOR),
        };

        let hits = self.store.text_search(&query).await?;
        let fetched = hits.len();

        let results: Vec<ClassificationEntry> = hits
            .into_iter()
            .filter(|e| request.level.map_or(true, |level| e.level == level))
            .filter(|e| request.expiry.admits(e))
            .take(request.limit)
            .collect();

        debug!(
            term,
            language = ?request.language,
            fetched,
            returned = results.len(),
            "Text search"
        );

        Ok(results)
    }

    /// Entries whose full code starts with `prefix`, ordered by code.
    ///
    /// Reads the rows directly; the trigram index is not involved.
    pub async fn search_by_code(
        &self,
        prefix: &str,
        limit: usize,
        expiry: ExpiryFilter,
    ) -> Result<Vec<ClassificationEntry>> {
        validate_limit(limit)?;
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }

        let scan = CodeScan {
            prefix: prefix.to_uppercase(),
            limit,
            expiry,
        };
        Ok(self.store.scan_code_prefix(&scan).await?)
    }
}

pub(crate) fn validate_limit(limit: usize) -> Result<()> {
    if limit == 0 || limit > MAX_SEARCH_LIMIT {
        return Err(KpdError::InvalidInput(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_level_filter(level: u8) -> Result<()> {
    if !(1..=MAX_LEVEL).contains(&level) {
        return Err(KpdError::InvalidInput(format!(
            "level must be between 1 and {MAX_LEVEL}, got {level}"
        )));
    }
    Ok(())
}
