// ⚙️ Configuration - JSON file, then environment, then CLI flags
//
// Binaries build a Config once at startup and hand it to TitheService::open.

use crate::error::{LedgerError, Result};
use crate::parser::NumericPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB: &str = "TITHE_LEDGER_DB";
pub const ENV_LOG: &str = "TITHE_LEDGER_LOG";
pub const ENV_LOG_JSON: &str = "TITHE_LEDGER_LOG_JSON";
pub const ENV_NUMERIC_POLICY: &str = "TITHE_LEDGER_NUMERIC_POLICY";

pub const DEFAULT_DB_PATH: &str = "tithe-ledger.db";
pub const DEFAULT_LOG_FILTER: &str = "tithe_ledger=info";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
    pub log_json: bool,
    pub numeric_policy: NumericPolicy,
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_json: false,
            numeric_policy: NumericPolicy::Permissive,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Defaults, overlaid by the optional JSON file, overlaid by the
    /// process environment
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Overlay values from `lookup` (normally the process environment)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.db_path = PathBuf::from(db);
        }

        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }

        if let Some(json) = lookup(ENV_LOG_JSON) {
            self.log_json = matches!(json.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Some(policy) = lookup(ENV_NUMERIC_POLICY) {
            self.numeric_policy = NumericPolicy::parse(&policy).ok_or_else(|| {
                LedgerError::validation(format!("{} must be permissive or strict, got {:?}", ENV_NUMERIC_POLICY, policy))
            })?;
        }

        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// ============================================================================
// TESTS
// ============================================================================
