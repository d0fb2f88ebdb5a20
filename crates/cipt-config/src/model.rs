use std::path::PathBuf;

use serde::Deserialize;

/// Database file used when neither the environment nor the config file names one.
pub const DEFAULT_DB_FILE: &str = "sistemacipt.db";

/// Business timezone for "today" and "this year" boundaries.
pub const DEFAULT_TIMEZONE: &str = "America/Fortaleza";

/// On-disk configuration (`cipt.yaml` / `cipt.toml`). Every field is optional;
/// environment variables take precedence over anything set here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite file. Relative paths resolve against the project root.
    pub path: Option<PathBuf>,
    /// Milliseconds SQLite waits on a locked file before giving up.
    pub busy_timeout_ms: Option<u64>,
}
