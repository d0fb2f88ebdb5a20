pub mod loader;
pub mod model;

pub use loader::{ConfigLoader, ResolvedConfig, STORAGE_ENV, TIMEZONE_ENV};
pub use model::{AppConfig, DEFAULT_DB_FILE, DEFAULT_TIMEZONE, StorageConfig};
