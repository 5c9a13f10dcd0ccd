//! PostgreSQL implementation of `ClassificationStore`.
//!
//! All SQL is runtime-checked (`sqlx::query_as`, not `sqlx::query_as!`) so the
//! crate builds without a live database. Text search runs against the
//! `kpd.classification_search` mirror, which a trigger maintains in the same
//! transaction as every row write.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use kpd_core::{
    ClassificationEntry, ClassificationStore, CodeScan, ConflictMode, ExpiryFilter, ListQuery,
    PrefixScan, SearchLanguage, StoreError, StoreResult, TextQuery,
};

/// Rows per INSERT statement; keeps bind parameters well under the
/// protocol's 65535 limit.
const MAX_ROWS_PER_STATEMENT: usize = 1_000;

const COLUMNS: &str = "full_code, official_code, path, name_hr, name_en, \
                       start_date, end_date, level, created_at, updated_at";

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, sqlx::FromRow)]
struct PgClassificationRow {
    full_code: String,
    official_code: String,
    path: String,
    name_hr: String,
    name_en: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    level: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgClassificationRow> for ClassificationEntry {
    type Error = String;

    fn try_from(row: PgClassificationRow) -> Result<Self, Self::Error> {
        let level = u8::try_from(row.level)
            .map_err(|_| format!("row {} has invalid level {}", row.full_code, row.level))?;
        Ok(ClassificationEntry {
            full_code: row.full_code,
            official_code: row.official_code,
            path: row.path,
            name_hr: row.name_hr,
            name_en: row.name_en,
            start_date: row.start_date,
            end_date: row.end_date,
            level,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

fn into_entries(rows: Vec<PgClassificationRow>) -> StoreResult<Vec<ClassificationEntry>> {
    rows.into_iter()
        .map(|r| r.try_into().map_err(StoreError::Database))
        .collect()
}

fn into_entry(row: Option<PgClassificationRow>) -> StoreResult<Option<ClassificationEntry>> {
    row.map(|r| r.try_into().map_err(StoreError::Database))
        .transpose()
}

/// Escape LIKE wildcards so `value` matches literally.
pub(crate) fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Keep the last occurrence of each `full_code`, in first-seen order.
/// A single `ON CONFLICT DO UPDATE` statement cannot touch a row twice.
pub(crate) fn dedup_last_wins(entries: &[ClassificationEntry]) -> Vec<&ClassificationEntry> {
    let mut slot: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<&ClassificationEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match slot.get(entry.full_code.as_str()) {
            Some(&i) => out[i] = entry,
            None => {
                slot.insert(&entry.full_code, out.len());
                out.push(entry);
            }
        }
    }
    out
}

/// Trigram columns of the search mirror for a language.
fn search_columns(language: SearchLanguage) -> Vec<&'static str> {
    let mut cols = Vec::with_capacity(3);
    if language.includes_code() {
        cols.push("s.code");
    }
    if language.includes_hr() {
        cols.push("s.name_hr");
    }
    if language.includes_en() {
        cols.push("s.name_en");
    }
    cols
}

pub struct PgClassificationStore {
    pool: PgPool,
}

impl PgClassificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled migrations (schema, trigram indexes, sync trigger).
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("Running KPD migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl ClassificationStore for PgClassificationStore {
    async fn get_by_full_code(&self, full_code: &str) -> StoreResult<Option<ClassificationEntry>> {
        let row = sqlx::query_as::<_, PgClassificationRow>(&format!(
            "SELECT {COLUMNS} FROM kpd.classification WHERE full_code = $1"
        ))
        .bind(full_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        into_entry(row)
    }

    async fn get_by_official_code(
        &self,
        official_code: &str,
    ) -> StoreResult<Option<ClassificationEntry>> {
        let row = sqlx::query_as::<_, PgClassificationRow>(&format!(
            "SELECT {COLUMNS} FROM kpd.classification WHERE official_code = $1 \
             ORDER BY full_code LIMIT 1"
        ))
        .bind(official_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        into_entry(row)
    }

    async fn get_by_path(&self, path: &str) -> StoreResult<Option<ClassificationEntry>> {
        let row = sqlx::query_as::<_, PgClassificationRow>(&format!(
            "SELECT {COLUMNS} FROM kpd.classification WHERE path = $1"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        into_entry(row)
    }

    async fn get_by_paths(&self, paths: &[String]) -> StoreResult<Vec<ClassificationEntry>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, PgClassificationRow>(&format!(
            "SELECT {COLUMNS} FROM kpd.classification WHERE path = ANY($1) ORDER BY level"
        ))
        .bind(paths)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_entries(rows)
    }

    async fn scan_path_prefix(&self, scan: &PrefixScan) -> StoreResult<Vec<ClassificationEntry>> {
        let pattern = format!("{}%", escape_like(scan.prefix()));
        let rows = sqlx::query_as::<_, PgClassificationRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM kpd.classification
            WHERE path LIKE $1
              AND ($2::smallint IS NULL OR level = $2)
            ORDER BY path
            "#
        ))
        .bind(pattern)
        .bind(scan.level.map(i16::from))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_entries(rows)
    }

    async fn scan_code_prefix(&self, scan: &CodeScan) -> StoreResult<Vec<ClassificationEntry>> {
        let pattern = format!("{}%", escape_like(&scan.prefix));
        let rows = sqlx::query_as::<_, PgClassificationRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM kpd.classification
            WHERE full_code LIKE $1
              AND ($2::date IS NULL OR end_date IS NULL OR end_date >= $2)
            ORDER BY full_code
            LIMIT $3
            "#
        ))
        .bind(pattern)
        .bind(scan.expiry.cutoff())
        .bind(sql_limit(scan.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_entries(rows)
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<ClassificationEntry>> {
        let rows = sqlx::query_as::<_, PgClassificationRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM kpd.classification
            WHERE ($1::smallint IS NULL OR level = $1)
              AND ($2::date IS NULL OR end_date IS NULL OR end_date >= $2)
            ORDER BY path
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(query.level.map(i16::from))
        .bind(query.expiry.cutoff())
        .bind(sql_limit(query.limit))
        .bind(sql_limit(query.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_entries(rows)
    }

    async fn count(&self, level: Option<u8>, expiry: ExpiryFilter) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM kpd.classification
            WHERE ($1::smallint IS NULL OR level = $1)
              AND ($2::date IS NULL OR end_date IS NULL OR end_date >= $2)
            "#,
        )
        .bind(level.map(i16::from))
        .bind(expiry.cutoff())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }

    async fn upsert_batch(
        &self,
        entries: &[ClassificationEntry],
        mode: ConflictMode,
    ) -> StoreResult<u64> {
        if entries.is_empty() {
            return Ok(0);
        }
        let unique = dedup_last_wins(entries);

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for part in unique.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO kpd.classification ({COLUMNS}) "));
            qb.push_values(part, |mut b, e| {
                b.push_bind(e.full_code.clone())
                    .push_bind(e.official_code.clone())
                    .push_bind(e.path.clone())
                    .push_bind(e.name_hr.clone())
                    .push_bind(e.name_en.clone())
                    .push_bind(e.start_date)
                    .push_bind(e.end_date)
                    .push_bind(i16::from(e.level))
                    .push_bind(e.created_at)
                    .push_bind(e.updated_at);
            });
            match mode {
                ConflictMode::Update => qb.push(
                    " ON CONFLICT (full_code) DO UPDATE SET \
                     name_hr = EXCLUDED.name_hr, \
                     name_en = EXCLUDED.name_en, \
                     start_date = EXCLUDED.start_date, \
                     end_date = EXCLUDED.end_date, \
                     updated_at = EXCLUDED.updated_at",
                ),
                ConflictMode::Skip => qb.push(" ON CONFLICT (full_code) DO NOTHING"),
            };
            qb.build().execute(&mut *tx).await.map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        tracing::debug!(rows = entries.len(), unique = unique.len(), %mode, "Upserted batch");
        Ok(entries.len() as u64)
    }

    async fn delete(&self, full_code: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM kpd.classification WHERE full_code = $1")
            .bind(full_code)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn text_search(&self, query: &TextQuery) -> StoreResult<Vec<ClassificationEntry>> {
        let cols = search_columns(query.language);
        if cols.is_empty() || query.fetch_limit == 0 {
            return Ok(Vec::new());
        }

        let matches = cols
            .iter()
            .map(|c| format!("{c} ILIKE $1"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let score = cols
            .iter()
            .map(|c| format!("similarity({c}, $2)"))
            .collect::<Vec<_>>()
            .join(", ");
        let select = COLUMNS
            .split(", ")
            .map(|c| format!("c.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            r#"
            SELECT {select}
            FROM kpd.classification_search s
            JOIN kpd.classification c ON c.full_code = s.full_code
            WHERE {matches}
            ORDER BY GREATEST({score}) DESC, c.full_code
            LIMIT $3
            "#
        );

        let rows = sqlx::query_as::<_, PgClassificationRow>(&sql)
            .bind(format!("%{}%", escape_like(&query.term)))
            .bind(&query.term)
            .bind(sql_limit(query.fetch_limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        into_entries(rows)
    }

    async fn rebuild_index(&self) -> StoreResult<u64> {
        let start = std::time::Instant::now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("TRUNCATE kpd.classification_search")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO kpd.classification_search (full_code, code, name_hr, name_en)
            SELECT full_code, full_code, name_hr, name_en FROM kpd.classification
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        tx.commit().await.map_err(db_err)?;
        tracing::info!(
            indexed = inserted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search mirror rebuilt"
        );
        Ok(inserted)
    }
}
