//! Storage port trait. Implemented by kpd_index (in-memory) and kpd_postgres.
//! Navigation, search and import depend only on this trait.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{
    ClassificationEntry, CodeScan, ConflictMode, ExpiryFilter, ListQuery, PrefixScan, TextQuery,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The record store adapter.
///
/// Lookups return `Ok(None)` / an empty `Vec` on a miss; `Err` is reserved for
/// adapter failures. Every write keeps the text index in step with the rows it
/// touches, inside the same unit of work.
#[async_trait]
pub trait ClassificationStore: Send + Sync {
    async fn get_by_full_code(&self, full_code: &str) -> StoreResult<Option<ClassificationEntry>>;

    async fn get_by_official_code(
        &self,
        official_code: &str,
    ) -> StoreResult<Option<ClassificationEntry>>;

    async fn get_by_path(&self, path: &str) -> StoreResult<Option<ClassificationEntry>>;

    /// Entries for whichever of `paths` exist, ordered by level ascending.
    async fn get_by_paths(&self, paths: &[String]) -> StoreResult<Vec<ClassificationEntry>>;

    /// Entries whose path matches `scan.pattern`, ordered by path.
    async fn scan_path_prefix(&self, scan: &PrefixScan) -> StoreResult<Vec<ClassificationEntry>>;

    /// Entries whose `full_code` starts with `scan.prefix`, ordered by code.
    async fn scan_code_prefix(&self, scan: &CodeScan) -> StoreResult<Vec<ClassificationEntry>>;

    /// One page of entries ordered by path.
    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ClassificationEntry>>;

    async fn count(&self, level: Option<u8>, expiry: ExpiryFilter) -> StoreResult<u64>;

    /// Insert-or-update keyed by `full_code`. Returns the number of rows
    /// accepted (inserted and updated are not distinguished).
    async fn upsert_batch(
        &self,
        entries: &[ClassificationEntry],
        mode: ConflictMode,
    ) -> StoreResult<u64>;

    /// Remove a row and its index document. Returns whether a row existed.
    async fn delete(&self, full_code: &str) -> StoreResult<bool>;

    /// Query the trigram index and join hits back to rows, best match first.
    async fn text_search(&self, query: &TextQuery) -> StoreResult<Vec<ClassificationEntry>>;

    /// Drop and repopulate the text index from the rows. Returns rows indexed.
    async fn rebuild_index(&self) -> StoreResult<u64>;
}
