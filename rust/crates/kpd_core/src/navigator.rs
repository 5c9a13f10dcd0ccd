//! Hierarchy navigation over path-prefix algebra.
//!
//! Every structural query is a path computation from `codec` plus one store
//! call. Levels need not be contiguous: descendants come from a prefix scan,
//! not from walking child links, so a skipped level never hides a subtree.
//! Expiry filtering is applied to the structural result afterwards.

use std::sync::Arc;

use tracing::debug;

use crate::codec::{self, CodeKind};
use crate::ports::{ClassificationStore, StoreResult};
use crate::types::{ClassificationEntry, ExpiryFilter, ListQuery, PrefixScan};

#[derive(Clone)]
pub struct HierarchyNavigator {
    store: Arc<dyn ClassificationStore>,
}

impl HierarchyNavigator {
    pub fn new(store: Arc<dyn ClassificationStore>) -> Self {
        Self { store }
    }

    /// Resolve an external code, full (`A01.11`) or official (`01.11`).
    ///
    /// Both representations of one entry resolve to the same row. Codes that
    /// start with neither a letter nor a digit resolve to `None`.
    pub async fn get_by_code(&self, code: &str) -> StoreResult<Option<ClassificationEntry>> {
        let code = code.trim();
        match codec::classify_code(code) {
            CodeKind::ByFullCode => self.store.get_by_full_code(code).await,
            CodeKind::ByOfficialCode => self.store.get_by_official_code(code).await,
            CodeKind::Invalid => {
                debug!(code, "Unclassifiable code");
                Ok(None)
            }
        }
    }

    pub async fn get_by_path(&self, path: &str) -> StoreResult<Option<ClassificationEntry>> {
        self.store.get_by_path(path).await
    }

    /// All level-1 sections, ordered by path.
    pub async fn get_roots(&self, expiry: ExpiryFilter) -> StoreResult<Vec<ClassificationEntry>> {
        self.store
            .list(&ListQuery {
                level: Some(1),
                offset: 0,
                limit: usize::MAX,
                expiry,
            })
            .await
    }

    /// Entries exactly one level below `path`, ordered by path.
    pub async fn get_children(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> StoreResult<Vec<ClassificationEntry>> {
        let depth = codec::segment_count(path);
        if depth == 0 {
            return Ok(Vec::new());
        }
        let Ok(child_level) = u8::try_from(depth + 1) else {
            return Ok(Vec::new());
        };

        let scan = PrefixScan {
            pattern: codec::children_prefix(path),
            level: Some(child_level),
        };
        let children = self.store.scan_path_prefix(&scan).await?;
        Ok(retain_admitted(children, expiry))
    }

    /// Every entry below `path` at any depth, ordered by path.
    pub async fn get_descendants(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> StoreResult<Vec<ClassificationEntry>> {
        if path.is_empty() {
            return Ok(Vec::new());
        }

        let scan = PrefixScan {
            pattern: codec::children_prefix(path),
            level: None,
        };
        let descendants = self.store.scan_path_prefix(&scan).await?;
        Ok(retain_admitted(descendants, expiry))
    }

    /// The entry one segment up, or `None` for a root.
    pub async fn get_parent(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> StoreResult<Option<ClassificationEntry>> {
        let Some(parent) = codec::parent_path(path) else {
            return Ok(None);
        };
        let entry = self.store.get_by_path(&parent).await?;
        Ok(entry.filter(|e| expiry.admits(e)))
    }

    /// Stored ancestors, root first. Missing intermediate levels are skipped.
    pub async fn get_ancestors(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> StoreResult<Vec<ClassificationEntry>> {
        let paths = codec::ancestor_paths(path);
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut ancestors = self.store.get_by_paths(&paths).await?;
        ancestors.sort_by_key(|e| e.level);
        Ok(retain_admitted(ancestors, expiry))
    }

    /// Ancestors followed by the entry itself.
    ///
    /// Empty when `path` itself is not stored or is filtered out.
    pub async fn get_full_path(
        &self,
        path: &str,
        expiry: ExpiryFilter,
    ) -> StoreResult<Vec<ClassificationEntry>> {
        let Some(current) = self.store.get_by_path(path).await? else {
            return Ok(Vec::new());
        };
        if !expiry.admits(&current) {
            return Ok(Vec::new());
        }

        let mut chain = self.get_ancestors(path, expiry).await?;
        chain.push(current);
        Ok(chain)
    }
}

fn retain_admitted(
    mut entries: Vec<ClassificationEntry>,
    expiry: ExpiryFilter,
) -> Vec<ClassificationEntry> {
    entries.retain(|e| expiry.admits(e));
    entries
}
