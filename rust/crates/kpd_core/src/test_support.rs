//! Vec-backed store double for unit tests inside this crate.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::codec;
use crate::error::StoreError;
use crate::ports::{ClassificationStore, StoreResult};
use crate::types::{
    ClassificationEntry, CodeScan, ConflictMode, ExpiryFilter, ListQuery, PrefixScan, TextQuery,
};

pub(crate) fn entry(full_code: &str, level: u8) -> ClassificationEntry {
    let now = Utc::now();
    let official_code = if full_code.len() == 1 {
        full_code.to_string()
    } else {
        full_code[1..].to_string()
    };
    ClassificationEntry {
        full_code: full_code.to_string(),
        official_code,
        path: codec::encode_path(full_code),
        name_hr: format!("Naziv {full_code}"),
        name_en: format!("Name {full_code}"),
        start_date: NaiveDate::from_ymd_opt(2008, 1, 1).unwrap(),
        end_date: None,
        level,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn expired(mut e: ClassificationEntry) -> ClassificationEntry {
    e.end_date = NaiveDate::from_ymd_opt(2020, 12, 31);
    e
}

#[derive(Default)]
pub(crate) struct FakeStore {
    rows: Mutex<Vec<ClassificationEntry>>,
    /// When set, every call fails with `StoreError::Unavailable`.
    pub(crate) fail: bool,
}

impl FakeStore {
    pub(crate) fn with(rows: Vec<ClassificationEntry>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn rows(&self) -> StoreResult<Vec<ClassificationEntry>> {
        if self.fail {
            return Err(StoreError::Unavailable("fake store is down".into()));
        }
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(rows)
    }
}

#[async_trait]
impl ClassificationStore for FakeStore {
    async fn get_by_full_code(&self, full_code: &str) -> StoreResult<Option<ClassificationEntry>> {
        Ok(self.rows()?.into_iter().find(|e| e.full_code == full_code))
    }

    async fn get_by_official_code(
        &self,
        official_code: &str,
    ) -> StoreResult<Option<ClassificationEntry>> {
        Ok(self
            .rows()?
            .into_iter()
            .find(|e| e.official_code == official_code))
    }

    async fn get_by_path(&self, path: &str) -> StoreResult<Option<ClassificationEntry>> {
        Ok(self.rows()?.into_iter().find(|e| e.path == path))
    }

    async fn get_by_paths(&self, paths: &[String]) -> StoreResult<Vec<ClassificationEntry>> {
        let mut found: Vec<_> = self
            .rows()?
            .into_iter()
            .filter(|e| paths.contains(&e.path))
            .collect();
        found.sort_by_key(|e| e.level);
        Ok(found)
    }

    async fn scan_path_prefix(&self, scan: &PrefixScan) -> StoreResult<Vec<ClassificationEntry>> {
        Ok(self
            .rows()?
            .into_iter()
            .filter(|e| e.path.starts_with(scan.prefix()))
            .filter(|e| scan.level.map_or(true, |l| e.level == l))
            .collect())
    }

    async fn scan_code_prefix(&self, scan: &CodeScan) -> StoreResult<Vec<ClassificationEntry>> {
        let mut rows: Vec<_> = self
            .rows()?
            .into_iter()
            .filter(|e| e.full_code.starts_with(&scan.prefix) && scan.expiry.admits(e))
            .collect();
        rows.sort_by(|a, b| a.full_code.cmp(&b.full_code));
        rows.truncate(scan.limit);
        Ok(rows)
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ClassificationEntry>> {
        Ok(self
            .rows()?
            .into_iter()
            .filter(|e| query.level.map_or(true, |l| e.level == l) && query.expiry.admits(e))
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count(&self, level: Option<u8>, expiry: ExpiryFilter) -> StoreResult<u64> {
        Ok(self
            .rows()?
            .iter()
            .filter(|e| level.map_or(true, |l| e.level == l) && expiry.admits(e))
            .count() as u64)
    }

    async fn upsert_batch(
        &self,
        entries: &[ClassificationEntry],
        mode: ConflictMode,
    ) -> StoreResult<u64> {
        if self.fail {
            return Err(StoreError::Unavailable("fake store is down".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        for incoming in entries {
            match rows.iter_mut().find(|e| e.full_code == incoming.full_code) {
                Some(existing) if mode == ConflictMode::Update => {
                    existing.name_hr = incoming.name_hr.clone();
                    existing.name_en = incoming.name_en.clone();
                    existing.start_date = incoming.start_date;
                    existing.end_date = incoming.end_date;
                    existing.updated_at = incoming.updated_at;
                }
                Some(_) => {}
                None => rows.push(incoming.clone()),
            }
        }
        Ok(entries.len() as u64)
    }

    async fn delete(&self, full_code: &str) -> StoreResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|e| e.full_code != full_code);
        Ok(rows.len() != before)
    }

    async fn text_search(&self, query: &TextQuery) -> StoreResult<Vec<ClassificationEntry>> {
        let needle = query.term.to_lowercase();
        let mut hits: Vec<_> = self
            .rows()?
            .into_iter()
            .filter(|e| {
                (query.language.includes_hr() && e.name_hr.to_lowercase().contains(&needle))
                    || (query.language.includes_en() && e.name_en.to_lowercase().contains(&needle))
                    || (query.language.includes_code()
                        && e.full_code.to_lowercase().contains(&needle))
            })
            .collect();
        hits.truncate(query.fetch_limit);
        Ok(hits)
    }

    async fn rebuild_index(&self) -> StoreResult<u64> {
        Ok(self.rows()?.len() as u64)
    }
}
