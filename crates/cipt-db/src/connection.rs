use std::path::Path;
use std::time::Duration;

use cipt_common::{Error, Result};
use rusqlite::{Connection, OpenFlags};
use tracing::info;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open (creating if needed) the database at `path` with the standard pragmas.
/// The migration runner uses this: a fresh file is a valid starting point.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    info!("opening database at {}", path.display());
    let conn = Connection::open(path)
        .map_err(|e| Error::database("failed to open database", e))?;
    apply_pragmas(&conn, busy_timeout)?;
    Ok(conn)
}

/// Open an existing database without creating it. Data fixes go through this,
/// so a mistyped path fails instead of producing an empty file.
pub fn open_existing(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if !path.is_file() {
        return Err(Error::Config(format!(
            "database not found: {}",
            path.display()
        )));
    }

    info!("opening existing database at {}", path.display());
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)
        .map_err(|e| Error::database("failed to open database", e))?;
    apply_pragmas(&conn, busy_timeout)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| Error::database("failed to open in-memory database", e))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .map_err(|e| Error::database("failed to set pragmas", e))?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)
        .map_err(|e| Error::database("failed to set busy timeout", e))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| Error::database("failed to set pragmas", e))?;
    Ok(())
}
