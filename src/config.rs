// ⚙️ Configuration - TOML file + environment overrides
//
// Priority (highest first): CLI flags, environment, config file, defaults.

use crate::sheet::{CsvSheet, SqliteSheet, StoreResult, Worksheet};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "split-ledger.toml";
pub const CONFIG_ENV: &str = "SPLIT_LEDGER_CONFIG";
pub const SHEET_ENV: &str = "SPLIT_LEDGER_SHEET";
pub const BACKEND_ENV: &str = "SPLIT_LEDGER_BACKEND";

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Csv,
    Sqlite,
}

impl Backend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Some(Backend::Csv),
            "sqlite" => Some(Backend::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub backend: Backend,
    pub path: PathBuf,
    /// Worksheet (tab) name; the sqlite backend keys cells by it
    pub worksheet: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        SheetConfig {
            backend: Backend::Csv,
            path: PathBuf::from("splits.csv"),
            worksheet: "Splits".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Role that unlocks !update and !add
    pub admin_role: String,
    pub prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            admin_role: "Admin".to_string(),
            prefix: "!".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub sheet: SheetConfig,
    pub bot: BotConfig,
    pub server: ServerConfig,
}

// ============================================================================
// LOADING
// ============================================================================

impl LedgerConfig {
    /// Parse from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Load from a file that must exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml(&content)
    }

    /// Resolve and load the configuration, then apply environment overrides.
    ///
    /// An explicit path (argument or `SPLIT_LEDGER_CONFIG`) must exist; the
    /// default `split-ledger.toml` is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, Path::new(DEFAULT_CONFIG_FILE), |key| {
            std::env::var(key).ok()
        })
    }

    /// `load` with the default file location and the environment supplied
    pub fn load_with<F>(explicit: Option<&Path>, default_file: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_path = lookup(CONFIG_ENV).map(PathBuf::from);

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None if default_file.exists() => Self::from_file(default_file)?,
            None => Self::default(),
        };

        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Apply `SPLIT_LEDGER_SHEET` / `SPLIT_LEDGER_BACKEND` style overrides
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(SHEET_ENV) {
            self.sheet.path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(BACKEND_ENV) {
            self.sheet.backend = Backend::parse(&raw)
                .with_context(|| format!("Unknown backend in {}: {:?}", BACKEND_ENV, raw))?;
        }
        Ok(())
    }

    /// Open the configured worksheet, creating an empty one if asked
    pub fn open_sheet(&self, create: bool) -> StoreResult<Box<dyn Worksheet + Send>> {
        let sheet: Box<dyn Worksheet + Send> = match self.sheet.backend {
            Backend::Csv if create => Box::new(CsvSheet::create(&self.sheet.path)?),
            Backend::Csv => Box::new(CsvSheet::open(&self.sheet.path)?),
            // SQLite creates the database file on open either way
            Backend::Sqlite => Box::new(SqliteSheet::open(&self.sheet.path, &self.sheet.worksheet)?),
        };
        Ok(sheet)
    }
}

// ============================================================================
// TESTS
// ============================================================================
