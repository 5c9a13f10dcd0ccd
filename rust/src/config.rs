//! Service configuration.
//!
//! Loaded from YAML (path in `KPD_CONFIG`, default `config/kpd.yaml`), then
//! overridden from the environment. A missing file is not an error; every
//! section has defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use kpd_core::{ConflictMode, ImportOptions};

/// Default configuration path
pub const DEFAULT_CONFIG_PATH: &str = "config/kpd.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KpdConfig {
    pub database: DatabaseSection,
    pub import: ImportOptionsConfig,
    /// Default source for `import` when no file is given.
    pub data_file: Option<PathBuf>,
}

/// Connection settings. Applied over `DatabaseConfig::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub pool_size: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
}

/// YAML shape of [`ImportOptions`]; the delimiter is written as a character.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportOptionsConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub conflict_mode: ConflictMode,
    pub delimiter: char,
    pub rebuild_index: bool,
}

impl Default for ImportOptionsConfig {
    fn default() -> Self {
        let defaults = ImportOptions::default();
        Self {
            batch_size: defaults.batch_size,
            concurrency: defaults.concurrency,
            conflict_mode: defaults.conflict_mode,
            delimiter: defaults.delimiter as char,
            rebuild_index: defaults.rebuild_index,
        }
    }
}

impl ImportOptionsConfig {
    pub fn to_options(&self) -> Result<ImportOptions> {
        let options = ImportOptions {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            conflict_mode: self.conflict_mode,
            delimiter: delimiter_byte(self.delimiter)?,
            rebuild_index: self.rebuild_index,
        };
        options.validate()?;
        Ok(options)
    }
}

/// The CSV reader takes a single-byte delimiter.
pub fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("delimiter '{c}' must be a single ASCII character"))
}

impl KpdConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: KpdConfig =
            serde_yaml::from_str(content).context("Failed to parse KPD config")?;
        Ok(config)
    }

    /// `.env`, then the YAML file (if present), then environment overrides,
    /// then validation.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("KPD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            tracing::info!(path = %path, "Loading configuration");
            Self::from_file(&path)?
        } else {
            tracing::debug!(path = %path, "No config file, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(size) = lookup("DATABASE_POOL_SIZE") {
            self.database.pool_size =
                Some(size.parse().context("DATABASE_POOL_SIZE must be a number")?);
        }
        if let Some(path) = lookup("KPD_DATA_FILE") {
            self.data_file = Some(PathBuf::from(path));
        }
        if let Some(size) = lookup("KPD_IMPORT_BATCH_SIZE") {
            self.import.batch_size = size
                .parse()
                .context("KPD_IMPORT_BATCH_SIZE must be a number")?;
        }
        if let Some(n) = lookup("KPD_IMPORT_CONCURRENCY") {
            self.import.concurrency = n
                .parse()
                .context("KPD_IMPORT_CONCURRENCY must be a number")?;
        }
        if let Some(mode) = lookup("KPD_CONFLICT_MODE") {
            self.import.conflict_mode = mode.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.import.to_options()?;
        if self.database.pool_size == Some(0) {
            anyhow::bail!("database pool_size must be at least 1");
        }
        Ok(())
    }

    /// Import options with config defaults applied.
    pub fn import_options(&self) -> Result<ImportOptions> {
        self.import.to_options()
    }

    #[cfg(feature = "database")]
    pub fn database_config(&self) -> crate::database::DatabaseConfig {
        let mut db = crate::database::DatabaseConfig::default();
        if let Some(url) = &self.database.url {
            db.database_url = url.clone();
        }
        if let Some(size) = self.database.pool_size {
            db.max_connections = size;
        }
        if let Some(secs) = self.database.connect_timeout_secs {
            db.connection_timeout = std::time::Duration::from_secs(secs);
        }
        db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = KpdConfig::default();
        let options = config.import_options().unwrap();
        assert_eq!(options, ImportOptions::default());
        assert!(config.data_file.is_none());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
database:
  url: postgresql://kpd@localhost/kpd
  pool_size: 4
import:
  batch_size: 250
  concurrency: 2
  conflict_mode: skip
  delimiter: ";"
  rebuild_index: true
data_file: data/kpd_2025.csv.gz
"#;
        let config = KpdConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.database.pool_size, Some(4));

        let options = config.import_options().unwrap();
        assert_eq!(options.batch_size, 250);
        assert_eq!(options.concurrency, 2);
        assert_eq!(options.conflict_mode, ConflictMode::Skip);
        assert_eq!(options.delimiter, b';');
        assert!(options.rebuild_index);
        assert_eq!(config.data_file, Some(PathBuf::from("data/kpd_2025.csv.gz")));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = KpdConfig::from_yaml("import:\n  batch_size: 10\n").unwrap();
        let options = config.import_options().unwrap();
        assert_eq!(options.batch_size, 10);
        assert_eq!(options.concurrency, ImportOptions::default().concurrency);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("KPD_IMPORT_BATCH_SIZE", "100"),
            ("KPD_IMPORT_CONCURRENCY", "8"),
            ("KPD_CONFLICT_MODE", "skip"),
            ("KPD_DATA_FILE", "/tmp/kpd.csv"),
        ]
        .into_iter()
        .collect();

        let mut config = KpdConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.import.batch_size, 100);
        assert_eq!(config.import.concurrency, 8);
        assert_eq!(config.import.conflict_mode, ConflictMode::Skip);
        assert_eq!(config.data_file, Some(PathBuf::from("/tmp/kpd.csv")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = KpdConfig::from_yaml("import:\n  batch_size: 0\n").unwrap();
        assert!(config.validate().is_err());

        let mut config = KpdConfig::default();
        let err = config.apply_env(|k| (k == "KPD_IMPORT_CONCURRENCY").then(|| "many".to_string()));
        assert!(err.is_err());

        assert!(delimiter_byte('č').is_err());
        assert_eq!(delimiter_byte('\t').unwrap(), b'\t');
    }
}
