use std::path::PathBuf;
use std::time::Duration;

use cipt_common::Result;
use cipt_db::{DEFAULT_BUSY_TIMEOUT, open_existing};
use rusqlite::Connection;
use tracing::{info, warn};

/// The database a fix runs against.
#[derive(Debug, Clone)]
pub struct Target {
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
}

impl Target {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

/// Open `target` (which must already exist), run `fix` against it, and close the
/// connection whether or not the fix succeeded.
pub fn with_target<T, F>(target: &Target, fix: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T>,
{
    let mut conn = open_existing(&target.db_path, target.busy_timeout)?;
    let result = fix(&mut conn);
    if let Err((_, e)) = conn.close() {
        warn!("failed to close {}: {e}", target.db_path.display());
    } else {
        info!("closed {}", target.db_path.display());
    }
    result
}
