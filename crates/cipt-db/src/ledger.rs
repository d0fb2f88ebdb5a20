use chrono::{DateTime, Utc};
use cipt_common::{Error, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::info;

/// Table recording which migrations have been applied.
pub const LEDGER_TABLE: &str = "_migrations";

/// Objects a migration actually created, so its `down` can leave everything
/// that was already there alone.
pub const OBJECTS_TABLE: &str = "_migration_objects";

/// What a row of [`OBJECTS_TABLE`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Column,
    Index,
    /// A seeded row, named by its key value.
    Row,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::Column => "column",
            ObjectKind::Index => "index",
            ObjectKind::Row => "row",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub applied_at: DateTime<Utc>,
}

/// Applied-migrations ledger. Only the runner writes to it, always inside the
/// transaction of the migration being recorded.
pub struct Ledger<'c> {
    conn: &'c Connection,
}

impl<'c> Ledger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn exists(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![LEDGER_TABLE],
                |row| row.get(0),
            )
            .map_err(|e| Error::database("failed to check ledger", e))?;
        Ok(count > 0)
    }

    /// Create the ledger tables on first use. A no-op once they exist.
    pub fn ensure(&self) -> Result<()> {
        let fresh = !self.exists()?;
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    id TEXT PRIMARY KEY NOT NULL,
                    applied_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS _migration_objects (
                    migration_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    table_name TEXT NOT NULL COLLATE NOCASE,
                    name TEXT NOT NULL COLLATE NOCASE,
                    PRIMARY KEY (kind, table_name, name)
                );",
            )
            .map_err(|e| Error::database("failed to create ledger", e))?;
        if fresh {
            info!("created migration ledger table {LEDGER_TABLE}");
        }
        Ok(())
    }

    /// Applied entries in ascending id order. Empty if the ledger does not exist yet.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT id, applied_at FROM _migrations ORDER BY id ASC")
            .map_err(|e| Error::database("failed to prepare ledger query", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LedgerEntry {
                    id: row.get(0)?,
                    applied_at: parse_datetime(&row.get::<_, String>(1)?),
                })
            })
            .map_err(|e| Error::database("failed to query ledger", e))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| Error::database("failed to read ledger row", e))?);
        }
        Ok(entries)
    }

    pub fn last(&self) -> Result<Option<LedgerEntry>> {
        Ok(self.entries()?.pop())
    }

    pub fn record(&self, id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO _migrations (id, applied_at) VALUES (?1, ?2)",
                params![id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::database(&format!("failed to record {id}"), e))?;
        Ok(())
    }

    /// Drop `id` from the ledger along with whatever it still has tracked.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM _migrations WHERE id = ?1", params![id])
            .map_err(|e| Error::database(&format!("failed to unrecord {id}"), e))?;
        self.conn
            .execute(
                "DELETE FROM _migration_objects WHERE migration_id = ?1",
                params![id],
            )
            .map_err(|e| Error::database(&format!("failed to clear objects of {id}"), e))?;
        Ok(())
    }

    pub fn track(&self, id: &str, kind: ObjectKind, table: &str, name: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO _migration_objects (migration_id, kind, table_name, name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, kind.as_str(), table, name],
            )
            .map_err(|e| Error::database(&format!("failed to track {table}.{name}"), e))?;
        Ok(())
    }

    pub fn is_tracked(
        &self,
        id: &str,
        kind: ObjectKind,
        table: &str,
        name: &str,
    ) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(1) FROM _migration_objects
                 WHERE migration_id = ?1 AND kind = ?2 AND table_name = ?3 AND name = ?4",
                params![id, kind.as_str(), table, name],
                |row| row.get(0),
            )
            .map_err(|e| Error::database("failed to read tracked objects", e))?;
        Ok(count > 0)
    }

    /// Names of every `kind` object `id` created on `table`.
    pub fn tracked(&self, id: &str, kind: ObjectKind, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM _migration_objects
                 WHERE migration_id = ?1 AND kind = ?2 AND table_name = ?3 ORDER BY name",
            )
            .map_err(|e| Error::database("failed to prepare tracked objects query", e))?;
        let rows = stmt
            .query_map(params![id, kind.as_str(), table], |row| row.get(0))
            .map_err(|e| Error::database("failed to read tracked objects", e))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row.map_err(|e| Error::database("failed to read tracked object", e))?);
        }
        Ok(names)
    }

    pub fn untrack(&self, id: &str, kind: ObjectKind, table: &str, name: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM _migration_objects
                 WHERE migration_id = ?1 AND kind = ?2 AND table_name = ?3 AND name = ?4",
                params![id, kind.as_str(), table, name],
            )
            .map_err(|e| Error::database(&format!("failed to untrack {table}.{name}"), e))?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // Rows written by hand via sqlite3 use datetime('now'): "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_empty_before_ledger_exists() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = Ledger::new(&conn);
        assert!(!ledger.exists().unwrap());
        assert!(ledger.entries().unwrap().is_empty());
        assert!(ledger.last().unwrap().is_none());
    }

    #[test]
    fn record_and_remove_keep_id_order() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = Ledger::new(&conn);
        ledger.ensure().unwrap();
        ledger.ensure().unwrap();

        ledger.record("20250816000000-b").unwrap();
        ledger.record("20250811000000-a").unwrap();

        let ids: Vec<String> = ledger.entries().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["20250811000000-a", "20250816000000-b"]);
        assert_eq!(ledger.last().unwrap().unwrap().id, "20250816000000-b");

        ledger.remove("20250816000000-b").unwrap();
        assert_eq!(ledger.last().unwrap().unwrap().id, "20250811000000-a");
    }

    #[test]
    fn duplicate_record_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = Ledger::new(&conn);
        ledger.ensure().unwrap();
        ledger.record("20250811000000-a").unwrap();
        assert!(matches!(
            ledger.record("20250811000000-a"),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn tracked_objects_follow_their_migration() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = Ledger::new(&conn);
        ledger.ensure().unwrap();
        ledger.record("20250811000000-a").unwrap();
        ledger
            .track("20250811000000-a", ObjectKind::Column, "Eventos", "tipo_desconto")
            .unwrap();
        ledger
            .track("20250811000000-a", ObjectKind::Row, "salas_reuniao", "116")
            .unwrap();

        assert!(ledger
            .is_tracked("20250811000000-a", ObjectKind::Column, "eventos", "TIPO_DESCONTO")
            .unwrap());
        assert!(!ledger
            .is_tracked("20250811000000-b", ObjectKind::Column, "Eventos", "tipo_desconto")
            .unwrap());
        assert_eq!(
            ledger
                .tracked("20250811000000-a", ObjectKind::Row, "salas_reuniao")
                .unwrap(),
            vec!["116"]
        );

        ledger.remove("20250811000000-a").unwrap();
        assert!(ledger
            .tracked("20250811000000-a", ObjectKind::Row, "salas_reuniao")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn parses_sqlite_datetime_format() {
        let dt = parse_datetime("2025-08-16 12:30:00");
        assert_eq!(dt.to_rfc3339(), "2025-08-16T12:30:00+00:00");
    }
}
