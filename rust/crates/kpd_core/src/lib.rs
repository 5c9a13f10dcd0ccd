//! KPD classification core.
//!
//! Pure domain logic for the six-level product classification: the path
//! codec, the store port trait, hierarchy navigation, text search and the
//! batch importer. Storage lives behind [`ports::ClassificationStore`];
//! `kpd_index` provides an in-memory adapter and `kpd_postgres` a PostgreSQL
//! one.
//!
//! ```text
//! CSV rows ──► import ──► codec (path + level check) ──► store.upsert_batch
//!                                                            │
//!                                         rows + trigram index, one unit
//!                                                            │
//!          navigator (prefix scans) ◄──── store ────► search (text index)
//! ```

pub mod codec;
pub mod error;
pub mod import;
pub mod navigator;
pub mod ports;
pub mod search;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use codec::{
    ancestor_paths, children_prefix, classify_code, encode_path, parent_path, validate_level,
    CodeKind,
};
pub use error::{ErrorTier, KpdError, PathError, Result, StoreError};
pub use import::{BatchImporter, ImportOptions, ImportReport, RowRejection};
pub use navigator::HierarchyNavigator;
pub use ports::{ClassificationStore, StoreResult};
pub use search::{SearchRequest, SearchService};
pub use types::{
    ClassificationEntry, CodeScan, ConflictMode, ExpiryFilter, ListQuery, PrefixScan,
    SearchLanguage, TextQuery,
};
