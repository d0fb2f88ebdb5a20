use cipt_common::{Result, SchemaError};
use cipt_db::{DataUpdate, Predicate, SchemaEditor};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

pub const LEGACY_STATUS: &str = "Vencida";
pub const CANONICAL_STATUS: &str = "Vencido";

#[derive(Debug, Clone, Copy, Default)]
pub struct UnifyStatusOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnifyStatusReport {
    /// Rows still carrying the legacy status when the fix started.
    pub matched: usize,
    pub updated: usize,
}

/// Rewrite every `dars.status = 'Vencida'` to `'Vencido'`. Rows already on the
/// canonical value are not matched, so a second run changes nothing.
pub fn run(conn: &Connection, opts: &UnifyStatusOptions) -> Result<UnifyStatusReport> {
    let editor = SchemaEditor::new(conn);
    if !editor.table_exists("dars")? {
        return Err(SchemaError::TableNotFound("dars".into()).into());
    }

    let legacy = Predicate::eq("status", LEGACY_STATUS.to_string());
    let matched = editor.count("dars", &legacy)?;
    if matched == 0 {
        info!("no DARs with status '{LEGACY_STATUS}', nothing to do");
        return Ok(UnifyStatusReport::default());
    }

    if opts.dry_run {
        info!(
            "[dry-run] would set {matched} DAR(s) from '{LEGACY_STATUS}' to '{CANONICAL_STATUS}'"
        );
        return Ok(UnifyStatusReport {
            matched,
            updated: 0,
        });
    }

    let updated = editor.run_update(
        &DataUpdate::new("dars")
            .set("status", CANONICAL_STATUS.to_string())
            .filter(legacy),
    )?;
    info!("set {updated} DAR(s) to '{CANONICAL_STATUS}'");
    Ok(UnifyStatusReport { matched, updated })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Connection {
        let conn = cipt_db::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE dars (id INTEGER PRIMARY KEY, status TEXT NOT NULL);
             INSERT INTO dars (status) VALUES ('Vencida'), ('Vencida'), ('Vencido'), ('Pago');",
        )
        .unwrap();
        conn
    }

    fn count(conn: &Connection, status: &str) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM dars WHERE status = ?1", [status], |r| {
            r.get(0)
        })
        .unwrap()
    }

    #[test]
    fn second_run_touches_nothing() {
        let conn = seeded();
        let opts = UnifyStatusOptions::default();

        let first = run(&conn, &opts).unwrap();
        assert_eq!(first, UnifyStatusReport { matched: 2, updated: 2 });
        assert_eq!(count(&conn, "Vencido"), 3);

        let second = run(&conn, &opts).unwrap();
        assert_eq!(second, UnifyStatusReport::default());
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let conn = seeded();
        let report = run(&conn, &UnifyStatusOptions { dry_run: true }).unwrap();
        assert_eq!(report, UnifyStatusReport { matched: 2, updated: 0 });
        assert_eq!(count(&conn, "Vencida"), 2);
    }

    #[test]
    fn missing_dars_table_is_reported() {
        let conn = cipt_db::open_in_memory().unwrap();
        let err = run(&conn, &UnifyStatusOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            cipt_common::Error::Schema(SchemaError::TableNotFound(_))
        ));
    }
}
