//! Domain value types shared by the navigator, search, importer and adapters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One node of the classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    /// Primary identity, section letter included (`A01.11`).
    pub full_code: String,
    /// Code without the section letter (`01.11`); the letter itself at level 1.
    pub official_code: String,
    /// Structural key, one segment per level (`A.01.1.1`).
    pub path: String,
    pub name_hr: String,
    pub name_en: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub level: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassificationEntry {
    /// True when `end_date` lies strictly before `as_of`.
    pub fn is_expired_on(&self, as_of: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| end < as_of)
    }
}

/// Whether expired entries take part in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryFilter {
    IncludeExpired,
    /// Drop entries expired before the given date.
    ExcludeExpiredOn(NaiveDate),
}

impl ExpiryFilter {
    /// Exclude entries expired before today (UTC).
    pub fn active_today() -> Self {
        Self::ExcludeExpiredOn(Utc::now().date_naive())
    }

    pub fn from_flag(exclude_expired: bool) -> Self {
        if exclude_expired {
            Self::active_today()
        } else {
            Self::IncludeExpired
        }
    }

    pub fn admits(&self, entry: &ClassificationEntry) -> bool {
        match self {
            Self::IncludeExpired => true,
            Self::ExcludeExpiredOn(as_of) => !entry.is_expired_on(*as_of),
        }
    }

    /// Reference date for SQL filters; `None` when nothing is excluded.
    pub fn cutoff(&self) -> Option<NaiveDate> {
        match self {
            Self::IncludeExpired => None,
            Self::ExcludeExpiredOn(as_of) => Some(*as_of),
        }
    }
}

impl Default for ExpiryFilter {
    fn default() -> Self {
        Self::active_today()
    }
}

/// Behaviour when an upserted `full_code` already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Replace names and dates; code, path and level stay as stored.
    #[default]
    Update,
    /// Keep the stored row untouched.
    Skip,
}

impl FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" | "replace" => Ok(Self::Update),
            "skip" | "ignore" => Ok(Self::Skip),
            other => Err(format!("unknown conflict mode '{other}'")),
        }
    }
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Which text columns a search matches against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchLanguage {
    Hr,
    En,
    /// Code plus both name columns.
    #[default]
    Both,
}

impl SearchLanguage {
    pub fn includes_hr(&self) -> bool {
        matches!(self, Self::Hr | Self::Both)
    }

    pub fn includes_en(&self) -> bool {
        matches!(self, Self::En | Self::Both)
    }

    pub fn includes_code(&self) -> bool {
        matches!(self, Self::Both)
    }
}

impl FromStr for SearchLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hr" => Ok(Self::Hr),
            "en" => Ok(Self::En),
            "both" | "" => Ok(Self::Both),
            other => Err(format!("unknown search language '{other}'")),
        }
    }
}

/// Path-prefix scan, ordered by path ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixScan {
    /// LIKE pattern ending in `%`, as produced by `codec::children_prefix`.
    pub pattern: String,
    /// Restrict to a single level.
    pub level: Option<u8>,
}

impl PrefixScan {
    /// The literal prefix of the pattern.
    pub fn prefix(&self) -> &str {
        self.pattern.strip_suffix('%').unwrap_or(&self.pattern)
    }
}

/// `full_code` prefix scan, ordered by code ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeScan {
    pub prefix: String,
    pub limit: usize,
    pub expiry: ExpiryFilter,
}

/// Paginated listing, ordered by path ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub level: Option<u8>,
    pub offset: usize,
    pub limit: usize,
    pub expiry: ExpiryFilter,
}

/// A query handed to the text index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    /// Trimmed user input.
    pub term: String,
    /// `term` escaped and quoted for phrase syntax.
    pub phrase: String,
    pub language: SearchLanguage,
    /// Number of hits to pull from the index, before post-filtering.
    pub fetch_limit: usize,
}
