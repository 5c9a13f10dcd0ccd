//! In-memory classification store.
//!
//! Rows live in ordered maps behind one `RwLock`; every write updates the
//! rows and commits the trigram index while holding the write lock, so a
//! reader never observes a row without its index document or the reverse.
//! A failed index commit rolls the row changes back.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use kpd_core::{
    ClassificationEntry, ClassificationStore, CodeScan, ConflictMode, ExpiryFilter, ListQuery,
    PrefixScan, StoreError, StoreResult, TextQuery,
};

use crate::trigram::{IndexError, TrigramIndex};

#[derive(Default)]
struct Rows {
    by_code: BTreeMap<String, ClassificationEntry>,
    /// path → full_code
    by_path: BTreeMap<String, String>,
    /// official_code → full_code
    by_official: HashMap<String, String>,
}

impl Rows {
    fn insert(&mut self, entry: ClassificationEntry) -> Option<ClassificationEntry> {
        self.by_path
            .insert(entry.path.clone(), entry.full_code.clone());
        self.by_official
            .insert(entry.official_code.clone(), entry.full_code.clone());
        self.by_code.insert(entry.full_code.clone(), entry)
    }

    fn remove(&mut self, full_code: &str) -> Option<ClassificationEntry> {
        let entry = self.by_code.remove(full_code)?;
        self.by_path.remove(&entry.path);
        if self.by_official.get(&entry.official_code).map(String::as_str) == Some(full_code) {
            self.by_official.remove(&entry.official_code);
        }
        Some(entry)
    }

    fn by_path(&self, path: &str) -> Option<&ClassificationEntry> {
        self.by_path.get(path).and_then(|code| self.by_code.get(code))
    }

    /// Entries in path order.
    fn in_path_order(&self) -> impl Iterator<Item = &ClassificationEntry> {
        self.by_path.values().filter_map(|code| self.by_code.get(code))
    }

    /// Put back what `undo` recorded, newest first.
    fn restore(&mut self, undo: Vec<(String, Option<ClassificationEntry>)>) {
        for (code, previous) in undo.into_iter().rev() {
            self.remove(&code);
            if let Some(previous) = previous {
                self.insert(previous);
            }
        }
    }
}

pub struct MemoryClassificationStore {
    rows: RwLock<Rows>,
    index: TrigramIndex,
}

impl MemoryClassificationStore {
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self {
            rows: RwLock::new(Rows::default()),
            index: TrigramIndex::new()?,
        })
    }

    /// Documents currently in the text index.
    pub async fn indexed_count(&self) -> u64 {
        let _rows = self.rows.read().await;
        self.index.len()
    }

    /// Reject a batch that would give an existing path a second owner.
    fn check_paths(rows: &Rows, entries: &[ClassificationEntry]) -> StoreResult<()> {
        let mut staged: HashMap<&str, &str> = HashMap::new();
        for entry in entries {
            if rows.by_code.contains_key(&entry.full_code) {
                continue;
            }
            let owner = rows
                .by_path
                .get(&entry.path)
                .map(String::as_str)
                .or_else(|| staged.get(entry.path.as_str()).copied());
            if let Some(owner) = owner {
                if owner != entry.full_code {
                    return Err(StoreError::Conflict(format!(
                        "path '{}' already belongs to {owner}, cannot add {}",
                        entry.path, entry.full_code
                    )));
                }
            }
            staged.insert(&entry.path, &entry.full_code);
        }
        Ok(())
    }
}

#[async_trait]
impl ClassificationStore for MemoryClassificationStore {
    async fn get_by_full_code(&self, full_code: &str) -> StoreResult<Option<ClassificationEntry>> {
        Ok(self.rows.read().await.by_code.get(full_code).cloned())
    }

    async fn get_by_official_code(
        &self,
        official_code: &str,
    ) -> StoreResult<Option<ClassificationEntry>> {
        let rows = self.rows.read().await;
        Ok(rows
            .by_official
            .get(official_code)
            .and_then(|code| rows.by_code.get(code))
            .cloned())
    }

    async fn get_by_path(&self, path: &str) -> StoreResult<Option<ClassificationEntry>> {
        Ok(self.rows.read().await.by_path(path).cloned())
    }

    async fn get_by_paths(&self, paths: &[String]) -> StoreResult<Vec<ClassificationEntry>> {
        let rows = self.rows.read().await;
        let mut found: Vec<ClassificationEntry> =
            paths.iter().filter_map(|p| rows.by_path(p)).cloned().collect();
        found.sort_by_key(|e| e.level);
        Ok(found)
    }

    async fn scan_path_prefix(&self, scan: &PrefixScan) -> StoreResult<Vec<ClassificationEntry>> {
        let prefix = scan.prefix();
        let rows = self.rows.read().await;
        Ok(rows
            .by_path
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter_map(|(_, code)| rows.by_code.get(code))
            .filter(|e| scan.level.map_or(true, |level| e.level == level))
            .cloned()
            .collect())
    }

    async fn scan_code_prefix(&self, scan: &CodeScan) -> StoreResult<Vec<ClassificationEntry>> {
        let rows = self.rows.read().await;
        Ok(rows
            .by_code
            .range(scan.prefix.clone()..)
            .take_while(|(code, _)| code.starts_with(&scan.prefix))
            .map(|(_, e)| e)
            .filter(|e| scan.expiry.admits(e))
            .take(scan.limit)
            .cloned()
            .collect())
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ClassificationEntry>> {
        let rows = self.rows.read().await;
        Ok(rows
            .in_path_order()
            .filter(|e| query.level.map_or(true, |level| e.level == level))
            .filter(|e| query.expiry.admits(e))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn count(&self, level: Option<u8>, expiry: ExpiryFilter) -> StoreResult<u64> {
        let rows = self.rows.read().await;
        Ok(rows
            .by_code
            .values()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .filter(|e| expiry.admits(e))
            .count() as u64)
    }

    async fn upsert_batch(
        &self,
        entries: &[ClassificationEntry],
        mode: ConflictMode,
    ) -> StoreResult<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut rows = self.rows.write().await;
        Self::check_paths(&rows, entries)?;

        let mut undo = Vec::with_capacity(entries.len());
        let mut touched = Vec::with_capacity(entries.len());
        for entry in entries {
            let next = match rows.by_code.get(&entry.full_code) {
                Some(_) if mode == ConflictMode::Skip => continue,
                Some(stored) => ClassificationEntry {
                    name_hr: entry.name_hr.clone(),
                    name_en: entry.name_en.clone(),
                    start_date: entry.start_date,
                    end_date: entry.end_date,
                    updated_at: entry.updated_at,
                    ..stored.clone()
                },
                None => entry.clone(),
            };
            let previous = rows.insert(next.clone());
            undo.push((next.full_code.clone(), previous));
            touched.push(next);
        }

        if let Err(e) = self.index.apply(&touched, &[]) {
            rows.restore(undo);
            return Err(e.into());
        }

        tracing::debug!(rows = entries.len(), written = touched.len(), %mode, "Upserted batch");
        Ok(entries.len() as u64)
    }

    async fn delete(&self, full_code: &str) -> StoreResult<bool> {
        let mut rows = self.rows.write().await;
        let Some(previous) = rows.remove(full_code) else {
            return Ok(false);
        };

        if let Err(e) = self.index.apply(&[], &[full_code.to_string()]) {
            rows.insert(previous);
            return Err(e.into());
        }
        Ok(true)
    }

    async fn text_search(&self, query: &TextQuery) -> StoreResult<Vec<ClassificationEntry>> {
        let rows = self.rows.read().await;
        let codes = self.index.search(query)?;
        Ok(codes
            .iter()
            .filter_map(|code| rows.by_code.get(code))
            .cloned()
            .collect())
    }

    async fn rebuild_index(&self) -> StoreResult<u64> {
        // Write lock: no upsert may interleave with the rebuild.
        let rows = self.rows.write().await;
        Ok(self.index.rebuild(rows.by_code.values())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use kpd_core::search::escape_phrase;
    use kpd_core::{encode_path, SearchLanguage};

    fn entry(full_code: &str, level: u8, name_hr: &str, name_en: &str) -> ClassificationEntry {
        let now = Utc::now();
        let official = if full_code.len() == 1 {
            full_code.to_string()
        } else {
            full_code[1..].to_string()
        };
        ClassificationEntry {
            full_code: full_code.to_string(),
            official_code: official,
            path: encode_path(full_code),
            name_hr: name_hr.to_string(),
            name_en: name_en.to_string(),
            start_date: NaiveDate::from_ymd_opt(2008, 1, 1).unwrap(),
            end_date: None,
            level,
            created_at: now,
            updated_at: now,
        }
    }

    fn text(term: &str) -> TextQuery {
        TextQuery {
            term: term.to_string(),
            phrase: escape_phrase(term),
            language: SearchLanguage::Both,
            fetch_limit: 20,
        }
    }

    async fn seeded() -> MemoryClassificationStore {
        let store = MemoryClassificationStore::new().unwrap();
        store
            .upsert_batch(
                &[
                    entry("A", 1, "Poljoprivreda", "Agriculture"),
                    entry("A01", 2, "Biljna proizvodnja", "Crop production"),
                    entry("A01.1", 3, "Jednogodišnji usjevi", "Non-perennial crops"),
                    entry("A01.11", 4, "Uzgoj žitarica", "Growing of cereals"),
                    entry("A02", 2, "Šumarstvo", "Forestry"),
                    entry("B", 1, "Rudarstvo", "Mining"),
                ],
                ConflictMode::Update,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_lookups_by_each_key() {
        let store = seeded().await;

        let by_full = store.get_by_full_code("A01.11").await.unwrap().unwrap();
        let by_official = store.get_by_official_code("01.11").await.unwrap().unwrap();
        let by_path = store.get_by_path("A.01.1.1").await.unwrap().unwrap();
        assert_eq!(by_full, by_official);
        assert_eq!(by_full, by_path);

        assert!(store.get_by_full_code("Z99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_text_search_unbounded_fetch() {
        let store = seeded().await;
        let mut query = text("proizvod");
        query.fetch_limit = usize::MAX;
        let hits = store.text_search(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].full_code, "A01");
    }

    #[tokio::test]
    async fn test_prefix_scan_respects_level_and_order() {
        let store = seeded().await;
        let scan = PrefixScan {
            pattern: "A.%".into(),
            level: Some(2),
        };
        let codes: Vec<_> = store
            .scan_path_prefix(&scan)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.full_code)
            .collect();
        assert_eq!(codes, vec!["A01", "A02"]);

        let all = PrefixScan {
            pattern: "A.%".into(),
            level: None,
        };
        assert_eq!(store.scan_path_prefix(&all).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let store = seeded().await;
        let page = store
            .list(&ListQuery {
                level: None,
                offset: 1,
                limit: 2,
                expiry: ExpiryFilter::IncludeExpired,
            })
            .await
            .unwrap();
        let paths: Vec<_> = page.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["A.01", "A.01.1"]);

        assert_eq!(store.count(None, ExpiryFilter::IncludeExpired).await.unwrap(), 6);
        assert_eq!(store.count(Some(1), ExpiryFilter::IncludeExpired).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_is_searchable_immediately() {
        let store = seeded().await;
        assert_eq!(store.indexed_count().await, 6);

        let hits = store.text_search(&text("žitar")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].full_code, "A01.11");
    }

    #[tokio::test]
    async fn test_update_keeps_structure_and_reindexes() {
        let store = seeded().await;
        let mut changed = entry("A01.11", 4, "Uzgoj riže", "Growing of rice");
        changed.end_date = NaiveDate::from_ymd_opt(2030, 12, 31);

        assert_eq!(
            store
                .upsert_batch(&[changed], ConflictMode::Update)
                .await
                .unwrap(),
            1
        );

        let stored = store.get_by_full_code("A01.11").await.unwrap().unwrap();
        assert_eq!(stored.name_hr, "Uzgoj riže");
        assert_eq!(stored.path, "A.01.1.1");
        assert_eq!(stored.end_date, NaiveDate::from_ymd_opt(2030, 12, 31));

        assert!(store.text_search(&text("žitar")).await.unwrap().is_empty());
        assert_eq!(store.text_search(&text("riže")).await.unwrap().len(), 1);
        assert_eq!(store.indexed_count().await, 6);
    }

    #[tokio::test]
    async fn test_skip_mode_leaves_row() {
        let store = seeded().await;
        store
            .upsert_batch(
                &[entry("A02", 2, "Nešto drugo", "Something else")],
                ConflictMode::Skip,
            )
            .await
            .unwrap();

        let stored = store.get_by_full_code("A02").await.unwrap().unwrap();
        assert_eq!(stored.name_hr, "Šumarstvo");
        assert!(store.text_search(&text("drugo")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_conflict_rejects_whole_batch() {
        let store = seeded().await;
        // "A.01" is already A01's path.
        let mut clash = entry("X01", 2, "Sukob", "Clash");
        clash.path = "A.01".into();

        let err = store
            .upsert_batch(
                &[entry("C", 1, "Prerađivačka industrija", "Manufacturing"), clash],
                ConflictMode::Update,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_by_full_code("C").await.unwrap().is_none());
        assert_eq!(store.indexed_count().await, 6);
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_document() {
        let store = seeded().await;
        assert!(store.delete("A02").await.unwrap());
        assert!(!store.delete("A02").await.unwrap());

        assert!(store.get_by_path("A.02").await.unwrap().is_none());
        assert!(store.text_search(&text("šumar")).await.unwrap().is_empty());
        assert_eq!(store.indexed_count().await, 5);
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let store = seeded().await;
        let before: Vec<_> = store
            .text_search(&text("proizvod"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.full_code)
            .collect();

        assert_eq!(store.rebuild_index().await.unwrap(), 6);
        assert_eq!(store.rebuild_index().await.unwrap(), 6);
        assert_eq!(store.indexed_count().await, 6);

        let after: Vec<_> = store
            .text_search(&text("proizvod"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.full_code)
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_stay_consistent() {
        let store = std::sync::Arc::new(MemoryClassificationStore::new().unwrap());
        let writes = (0..8).map(|i| {
            let store = store.clone();
            async move {
                let code = format!("{}", (b'A' + i) as char);
                store
                    .upsert_batch(
                        &[entry(&code, 1, &format!("Područje {code}"), "Section")],
                        ConflictMode::Update,
                    )
                    .await
            }
        });
        for result in futures::future::join_all(writes).await {
            assert_eq!(result.unwrap(), 1);
        }

        assert_eq!(store.count(None, ExpiryFilter::IncludeExpired).await.unwrap(), 8);
        assert_eq!(store.indexed_count().await, 8);
    }
}
