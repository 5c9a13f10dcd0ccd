//! KPD - Croatian product classification service
//!
//! Six-level classification (section → subcategory) with hierarchy
//! navigation, trigram text search and bulk CSV import.
//!
//! ## Crates
//! - `kpd_core`: path codec, store port, navigator, search, importer
//! - `kpd_index`: Tantivy trigram index and the in-memory store
//! - `kpd_postgres`: PostgreSQL store with pg_trgm search
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kpd::{ClassificationService, ExpiryFilter, ImportOptions, SearchRequest};
//!
//! # async fn run() -> kpd::Result<()> {
//! let service = ClassificationService::in_memory()?;
//! let report = service
//!     .load_from_file("data/kpd_2025.csv", &ImportOptions::default())
//!     .await?;
//! println!("{} rows, {} rejected", report.processed, report.rejected());
//!
//! let children = service.get_children("A.01", ExpiryFilter::active_today()).await?;
//! let hits = service.search(&SearchRequest::new("žitarice")).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod service;

// Database integration (when enabled)
#[cfg(feature = "database")]
pub mod database;

pub use config::KpdConfig;
pub use service::{ClassificationService, Page};

pub use kpd_core::{
    ClassificationEntry, ConflictMode, ErrorTier, ExpiryFilter, ImportOptions, ImportReport,
    KpdError, ListQuery, Result, RowRejection, SearchLanguage, SearchRequest,
};
pub use kpd_index::MemoryClassificationStore;

#[cfg(feature = "database")]
pub use database::{DatabaseConfig, DatabaseManager};
#[cfg(feature = "database")]
pub use kpd_postgres::PgClassificationStore;
