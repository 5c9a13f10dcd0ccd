//! One delimited row → one validated `ClassificationEntry`, or a typed reason
//! why not.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::codec::{self, MAX_LEVEL};
use crate::error::PathError;
use crate::types::ClassificationEntry;

/// Date format of the start and end columns.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Columns a row must carry.
pub const MIN_COLUMNS: usize = 9;

// Column positions. 4 and 6 hold short names and are not imported.
const COL_OFFICIAL_CODE: usize = 0;
const COL_START_DATE: usize = 1;
const COL_END_DATE: usize = 2;
const COL_NAME_HR: usize = 3;
const COL_NAME_EN: usize = 5;
const COL_LEVEL: usize = 7;
const COL_FULL_CODE: usize = 8;

/// Why a row was rejected. The `Display` text is what the import report shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("Expected at least {expected} columns, got {found}")]
    TooFewColumns { expected: usize, found: usize },

    #[error("Invalid {field} '{value}', expected DD.MM.YYYY")]
    InvalidDate { field: &'static str, value: String },

    #[error("Invalid level '{0}'")]
    InvalidLevel(String),

    #[error("Level {0} outside 1-{max}", max = MAX_LEVEL)]
    LevelOutOfRange(u8),

    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Malformed row: {0}")]
    Malformed(String),
}

/// A validated row with its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub line: u64,
    pub entry: ClassificationEntry,
}

/// Validate and normalise one row.
///
/// `now` stamps both bookkeeping timestamps.
pub fn parse_fields<S: AsRef<str>>(
    fields: &[S],
    now: DateTime<Utc>,
) -> Result<ClassificationEntry, RowError> {
    if fields.len() < MIN_COLUMNS {
        return Err(RowError::TooFewColumns {
            expected: MIN_COLUMNS,
            found: fields.len(),
        });
    }
    let cell = |idx: usize| fields[idx].as_ref().trim();

    let start_date = parse_date(cell(COL_START_DATE), "start date")?;
    let end_date = match cell(COL_END_DATE) {
        "" => None,
        raw => Some(parse_date(raw, "end date")?),
    };

    let level = parse_level(cell(COL_LEVEL))?;

    let full_code = required(cell(COL_FULL_CODE), "full code")?;
    let path = codec::encode_path(full_code);
    codec::validate_level(&path, level)?;

    Ok(ClassificationEntry {
        full_code: full_code.to_string(),
        official_code: required(cell(COL_OFFICIAL_CODE), "code")?.to_string(),
        path,
        name_hr: required(cell(COL_NAME_HR), "Croatian name")?.to_string(),
        name_en: required(cell(COL_NAME_EN), "English name")?.to_string(),
        start_date,
        end_date,
        level,
        created_at: now,
        updated_at: now,
    })
}

fn parse_date(raw: &str, field: &'static str) -> Result<NaiveDate, RowError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| RowError::InvalidDate {
        field,
        value: raw.to_string(),
    })
}

fn parse_level(raw: &str) -> Result<u8, RowError> {
    let level: u8 = raw
        .parse()
        .map_err(|_| RowError::InvalidLevel(raw.to_string()))?;
    if !(1..=MAX_LEVEL).contains(&level) {
        return Err(RowError::LevelOutOfRange(level));
    }
    Ok(level)
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, RowError> {
    if value.is_empty() {
        Err(RowError::MissingField(field))
    } else {
        Ok(value)
    }
}
