//! `ClassificationService`: the one entry point upstream callers use.
//!
//! Wires a store into the navigator, search service and importer, and adds
//! pagination plus `require_*` helpers that turn a miss into
//! `KpdError::NotFound`.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use kpd_core::{
    BatchImporter, ClassificationEntry, ClassificationStore, ExpiryFilter, HierarchyNavigator,
    ImportOptions, ImportReport, KpdError, ListQuery, Result, SearchRequest, SearchService,
};
use kpd_index::MemoryClassificationStore;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub items: Vec<ClassificationEntry>,
    /// Matching entries across all pages.
    pub total: u64,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Page {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.page_size as u64)
    }
}

#[derive(Clone)]
pub struct ClassificationService {
    store: Arc<dyn ClassificationStore>,
    navigator: HierarchyNavigator,
    search: SearchService,
    importer: BatchImporter,
}

impl ClassificationService {
    pub fn new(store: Arc<dyn ClassificationStore>) -> Self {
        Self {
            navigator: HierarchyNavigator::new(store.clone()),
            search: SearchService::new(store.clone()),
            importer: BatchImporter::new(store.clone()),
            store,
        }
    }

    /// Service over a fresh in-memory store.
    pub fn in_memory() -> Result<Self> {
        let store =
            MemoryClassificationStore::new().map_err(|e| KpdError::Internal(e.into()))?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn store(&self) -> &Arc<dyn ClassificationStore> {
        &self.store
    }

    // ── Lookup ────────────────────────────────────────────────

    /// Full code (`A01.11`) or official code (`01.11`).
    pub async fn get_by_code(&self, code: &str) -> Result<Option<ClassificationEntry>> {
        Ok(self.navigator.get_by_code(code).await?)
    }

    pub async fn require_by_code(&self, code: &str) -> Result<ClassificationEntry> {
        self.get_by_code(code)
            .await?
            .ok_or_else(|| KpdError::NotFound(format!("classification code '{code}'")))
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<ClassificationEntry>> {
        Ok(self.navigator.get_by_path(path).await?)
    }

    pub async fn require_by_path(&self, path: &str) -> Result<ClassificationEntry> {
        self.get_by_path(path)
            .await?
            .ok_or_else(|| KpdError::NotFound(format!("classification path '{path}'")))
    }

    // ── Listing ───────────────────────────────────────────────

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<ClassificationEntry>> {
        validate_level(query.level)?;
        Ok(self.store.list(query).await?)
    }

    /// `page` is 1-based.
    pub async fn paginate(
        &self,
        page: usize,
        page_size: usize,
        level: Option<u8>,
        expiry: ExpiryFilter,
    ) -> Result<Page> {
        if page == 0 {
            return Err(KpdError::InvalidInput("page starts at 1".into()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(KpdError::InvalidInput(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let query = ListQuery {
            level,
            offset: (page - 1).saturating_mul(page_size),
            limit: page_size,
            expiry,
        };
        let items = self.list(&query).await?;
        let total = self.store.count(level, expiry).await?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn count(&self, level: Option<u8>, expiry: ExpiryFilter) -> Result<u64> {
        validate_level(level)?;
        Ok(self.store.count(level, expiry).await?)
    }

    // ── Navigation ────────────────────────────────────────────

    pub async fn get_roots(&self, expiry: ExpiryFilter) -> Result<Vec<ClassificationEntry>> {
        Ok(self.navigator.get_roots(expiry).await?)
    }

    pub async fn get_children(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> Result<Vec<ClassificationEntry>> {
        Ok(self.navigator.get_children(path, expiry).await?)
    }

    pub async fn get_descendants(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> Result<Vec<ClassificationEntry>> {
        Ok(self.navigator.get_descendants(path, expiry).await?)
    }

    pub async fn get_parent(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> Result<Option<ClassificationEntry>> {
        Ok(self.navigator.get_parent(path, expiry).await?)
    }

    pub async fn get_ancestors(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> Result<Vec<ClassificationEntry>> {
        Ok(self.navigator.get_ancestors(path, expiry).await?)
    }

    pub async fn get_full_path(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> Result<Vec<ClassificationEntry>> {
        Ok(self.navigator.get_full_path(path, expiry).await?)
    }

    // ── Search ────────────────────────────────────────────────

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<ClassificationEntry>> {
        self.search.search(request).await
    }

    pub async fn search_by_code(
        &self,
        prefix: &str,
        limit: usize,
        expiry: ExpiryFilter,
    ) -> Result<Vec<ClassificationEntry>> {
        self.search.search_by_code(prefix, limit, expiry).await
    }

    // ── Import and index maintenance ──────────────────────────

    pub async fn load_from_file(
        &self,
        path: impl AsRef<Path>,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        self.importer.load_from_file(path, options).await
    }

    pub async fn rebuild_index(&self) -> Result<u64> {
        Ok(self.store.rebuild_index().await?)
    }
}

fn validate_level(level: Option<u8>) -> Result<()> {
    match level {
        Some(l) if !(1..=kpd_core::codec::MAX_LEVEL).contains(&l) => Err(KpdError::InvalidInput(
            format!("level must be between 1 and {}", kpd_core::codec::MAX_LEVEL),
        )),
        _ => Ok(()),
    }
}
