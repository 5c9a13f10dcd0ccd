//! KPD PostgreSQL adapter.
//!
//! [`PgClassificationStore`] implements `kpd_core::ClassificationStore` over a
//! `PgPool`. Rows live in `kpd.classification`; substring search uses pg_trgm
//! GIN indexes on the `kpd.classification_search` mirror.

pub mod store;

pub use store::PgClassificationStore;
