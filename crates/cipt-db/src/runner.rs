use std::collections::HashSet;

use chrono::{DateTime, Utc};
use cipt_common::{Error, MigrationError, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalogue;
use crate::ledger::Ledger;
use crate::migration::{Migration, MigrationState};
use crate::schema::SchemaEditor;

/// Ids applied by one `apply_*` call, in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<String>,
}

impl ApplyReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// One line of `status()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub id: String,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
    pub reversible: bool,
    /// Present in the ledger but not in the registry.
    pub unknown: bool,
}

/// Applies and reverts an ordered set of migrations against one connection.
///
/// Each migration runs in its own transaction together with its ledger write,
/// so a failure rolls back that migration only; earlier ones in the same run
/// stay committed. Runs are fail-fast.
#[derive(Debug)]
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    /// Build a runner over `migrations`, sorted by id. Ids must be unique and well-formed.
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by(|a, b| a.id.cmp(b.id));
        let mut seen = HashSet::new();
        for m in &migrations {
            m.validate_id()?;
            if !seen.insert(m.id) {
                return Err(MigrationError::DuplicateId(m.id.to_string()).into());
            }
        }
        Ok(Self { migrations })
    }

    /// Runner over the built-in schema history.
    pub fn with_catalogue() -> Result<Self> {
        Self::new(catalogue::all())
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    fn find(&self, id: &str) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.id == id)
    }

    /// Registry entries not yet in the ledger, ascending.
    pub fn pending(&self, conn: &Connection) -> Result<Vec<&Migration>> {
        let applied: HashSet<String> = Ledger::new(conn)
            .entries()?
            .into_iter()
            .map(|e| e.id)
            .collect();
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(m.id))
            .collect())
    }

    pub fn apply_all(&self, conn: &mut Connection) -> Result<ApplyReport> {
        self.apply_until(conn, None)
    }

    /// Apply pending migrations up to and including `target`.
    pub fn apply_to(&self, conn: &mut Connection, target: &str) -> Result<ApplyReport> {
        if self.find(target).is_none() {
            return Err(MigrationError::Unknown(target.to_string()).into());
        }
        if let Some(last) = Ledger::new(conn).last()? {
            if target < last.id.as_str() {
                return Err(MigrationError::OutOfOrderRequest(format!(
                    "target {target} is older than the last applied migration {}",
                    last.id
                ))
                .into());
            }
        }
        self.apply_until(conn, Some(target))
    }

    fn apply_until(&self, conn: &mut Connection, target: Option<&str>) -> Result<ApplyReport> {
        let pending: Vec<Migration> = self
            .pending(conn)?
            .into_iter()
            .filter(|m| target.is_none_or(|t| m.id <= t))
            .copied()
            .collect();

        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(ApplyReport::default());
        }

        // A pending id older than something already applied would run after
        // migrations that assumed it was never there.
        if let Some(last) = Ledger::new(conn).last()? {
            if let Some(stale) = pending.iter().find(|m| m.id < last.id.as_str()) {
                return Err(MigrationError::OutOfOrderRequest(format!(
                    "pending migration {} is older than the last applied migration {}",
                    stale.id, last.id
                ))
                .into());
            }
        }

        Ledger::new(conn).ensure()?;
        info!("{} pending migration(s)", pending.len());

        let mut report = ApplyReport::default();
        for migration in &pending {
            self.apply_one(conn, migration)?;
            report.applied.push(migration.id.to_string());
        }
        Ok(report)
    }

    fn apply_one(&self, conn: &mut Connection, migration: &Migration) -> Result<()> {
        info!(id = migration.id, state = %MigrationState::Applying, "migration");
        let tx = conn
            .transaction()
            .map_err(|e| Error::database("failed to begin transaction", e))?;

        let outcome = {
            let editor = SchemaEditor::for_migration(&tx, migration.id);
            (migration.up)(&editor).and_then(|()| Ledger::new(&tx).record(migration.id))
        };

        match outcome {
            Ok(()) => {
                tx.commit()
                    .map_err(|e| Error::database("failed to commit migration", e))?;
                info!(id = migration.id, state = %MigrationState::Applied, "migration");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("rollback of {} failed: {rollback}", migration.id);
                }
                warn!(id = migration.id, state = %MigrationState::Pending, "migration failed: {e}");
                Err(MigrationError::Failed {
                    id: migration.id.to_string(),
                    source: Box::new(e),
                }
                .into())
            }
        }
    }

    /// Revert the most recently applied migration and return its id.
    pub fn revert_last(&self, conn: &mut Connection) -> Result<String> {
        let last = Ledger::new(conn)
            .last()?
            .ok_or(MigrationError::NoneApplied)?;
        let migration = *self
            .find(&last.id)
            .ok_or_else(|| MigrationError::Unknown(last.id.clone()))?;

        if !migration.reversible {
            warn!(
                "{} is an irreversible data migration; its data changes are kept",
                migration.id
            );
        }

        info!(id = migration.id, state = %MigrationState::Reverting, "migration");
        let tx = conn
            .transaction()
            .map_err(|e| Error::database("failed to begin transaction", e))?;

        // Ledgers written before object tracking existed lack the objects table.
        let outcome = Ledger::new(&tx).ensure().and_then(|()| {
            let editor = SchemaEditor::for_migration(&tx, migration.id);
            (migration.down)(&editor).and_then(|()| Ledger::new(&tx).remove(migration.id))
        });

        match outcome {
            Ok(()) => {
                tx.commit()
                    .map_err(|e| Error::database("failed to commit revert", e))?;
                info!(id = migration.id, state = %MigrationState::Pending, "migration");
                Ok(migration.id.to_string())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("rollback of {} failed: {rollback}", migration.id);
                }
                Err(MigrationError::Failed {
                    id: migration.id.to_string(),
                    source: Box::new(e),
                }
                .into())
            }
        }
    }

    /// Every registered migration plus any ledger ids the registry does not know.
    pub fn status(&self, conn: &Connection) -> Result<Vec<MigrationStatus>> {
        let entries = Ledger::new(conn).entries()?;
        let mut statuses: Vec<MigrationStatus> = self
            .migrations
            .iter()
            .map(|m| {
                let entry = entries.iter().find(|e| e.id == m.id);
                MigrationStatus {
                    id: m.id.to_string(),
                    applied: entry.is_some(),
                    applied_at: entry.map(|e| e.applied_at),
                    reversible: m.reversible,
                    unknown: false,
                }
            })
            .collect();

        for entry in entries.iter().filter(|e| self.find(&e.id).is_none()) {
            statuses.push(MigrationStatus {
                id: entry.id.clone(),
                applied: true,
                applied_at: Some(entry.applied_at),
                reversible: false,
                unknown: true,
            });
        }
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType, IndexDef, TableDef};
    use cipt_common::SchemaError;

    fn create_reservas(ed: &SchemaEditor<'_>) -> Result<()> {
        ed.create_table(&TableDef::new(
            "reservas_salas",
            vec![
                ColumnDef::id(),
                ColumnDef::new("sala_id", ColumnType::Integer).not_null(),
                ColumnDef::new("data", ColumnType::String).not_null(),
                ColumnDef::new("hora_inicio", ColumnType::String).not_null(),
                ColumnDef::new("hora_fim", ColumnType::String).not_null(),
            ],
        ))?;
        Ok(())
    }

    fn drop_reservas(ed: &SchemaEditor<'_>) -> Result<()> {
        ed.drop_created_table("reservas_salas")?;
        Ok(())
    }

    fn add_checkin(ed: &SchemaEditor<'_>) -> Result<()> {
        ed.add_column("reservas_salas", &ColumnDef::new("checkin", ColumnType::String))?;
        Ok(())
    }

    fn remove_checkin(ed: &SchemaEditor<'_>) -> Result<()> {
        ed.remove_created_column("reservas_salas", "checkin")?;
        Ok(())
    }

    fn add_unique(ed: &SchemaEditor<'_>) -> Result<()> {
        ed.add_index(
            "reservas_salas",
            &IndexDef::new("reservas_salas_unica", &["sala_id", "data", "hora_inicio", "hora_fim"])
                .unique(),
        )
    }

    fn remove_unique(ed: &SchemaEditor<'_>) -> Result<()> {
        ed.remove_created_index("reservas_salas", "reservas_salas_unica")?;
        Ok(())
    }

    fn add_then_fail(ed: &SchemaEditor<'_>) -> Result<()> {
        ed.add_column("reservas_salas", &ColumnDef::new("half_applied", ColumnType::Text))?;
        Err(Error::Other("boom".into()))
    }

    fn runner() -> MigrationRunner {
        MigrationRunner::new(vec![
            Migration::new("20250828140702-add-unique", add_unique, remove_unique),
            Migration::new("20250819150000-create-reservas", create_reservas, drop_reservas),
            Migration::new("20250820000000-add-checkin", add_checkin, remove_checkin),
        ])
        .unwrap()
    }

    fn applied_ids(conn: &Connection) -> Vec<String> {
        Ledger::new(conn)
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect()
    }

    #[test]
    fn sorts_registry_and_rejects_duplicates() {
        let r = runner();
        let ids: Vec<&str> = r.migrations().iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![
                "20250819150000-create-reservas",
                "20250820000000-add-checkin",
                "20250828140702-add-unique"
            ]
        );

        let err = MigrationRunner::new(vec![
            Migration::new("20250819150000-a", create_reservas, drop_reservas),
            Migration::new("20250819150000-a", add_checkin, remove_checkin),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Migration(MigrationError::DuplicateId(_))));
    }

    #[test]
    fn apply_all_runs_in_order_and_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        let r = runner();

        let report = r.apply_all(&mut conn).unwrap();
        assert_eq!(report.applied.len(), 3);
        assert_eq!(applied_ids(&conn), report.applied);

        let changes_before = conn.total_changes();
        let again = r.apply_all(&mut conn).unwrap();
        assert!(again.is_empty());
        assert_eq!(conn.total_changes(), changes_before);
    }

    #[test]
    fn failure_rolls_back_only_the_failing_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        let r = MigrationRunner::new(vec![
            Migration::new("20250819150000-create-reservas", create_reservas, drop_reservas),
            Migration::new("20250820000000-broken", add_then_fail, remove_checkin),
            Migration::new("20250821000000-add-checkin", add_checkin, remove_checkin),
        ])
        .unwrap();

        let err = r.apply_all(&mut conn).unwrap_err();
        match err {
            Error::Migration(MigrationError::Failed { id, .. }) => {
                assert_eq!(id, "20250820000000-broken")
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(applied_ids(&conn), vec!["20250819150000-create-reservas"]);
        let ed = SchemaEditor::new(&conn);
        assert!(ed.table_exists("reservas_salas").unwrap());
        assert!(!ed.has_column("reservas_salas", "half_applied").unwrap());
        assert!(!ed.has_column("reservas_salas", "checkin").unwrap());
    }

    #[test]
    fn unique_index_over_duplicates_leaves_ledger_unchanged() {
        let mut conn = Connection::open_in_memory().unwrap();
        let r = runner();
        r.apply_to(&mut conn, "20250820000000-add-checkin").unwrap();
        conn.execute_batch(
            "INSERT INTO reservas_salas (sala_id, data, hora_inicio, hora_fim)
             VALUES (3, '2025-09-01', '14:00', '15:00'), (3, '2025-09-01', '14:00', '15:00');",
        )
        .unwrap();
        let before = applied_ids(&conn);

        let err = r.apply_all(&mut conn).unwrap_err();
        assert!(matches!(
            err.schema_cause(),
            Some(SchemaError::ConstraintViolation { .. })
        ));
        assert_eq!(applied_ids(&conn), before);
    }

    #[test]
    fn revert_last_walks_back_to_empty_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        let r = runner();
        r.apply_all(&mut conn).unwrap();

        assert_eq!(r.revert_last(&mut conn).unwrap(), "20250828140702-add-unique");
        assert_eq!(r.revert_last(&mut conn).unwrap(), "20250820000000-add-checkin");
        assert_eq!(r.revert_last(&mut conn).unwrap(), "20250819150000-create-reservas");

        assert!(!SchemaEditor::new(&conn).table_exists("reservas_salas").unwrap());
        let err = r.revert_last(&mut conn).unwrap_err();
        assert!(matches!(err, Error::Migration(MigrationError::NoneApplied)));
    }

    #[test]
    fn revert_keeps_a_table_that_predates_the_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE reservas_salas (
                id INTEGER PRIMARY KEY,
                sala_id INTEGER NOT NULL,
                data TEXT NOT NULL,
                hora_inicio TEXT NOT NULL,
                hora_fim TEXT NOT NULL
             );
             INSERT INTO reservas_salas (sala_id, data, hora_inicio, hora_fim)
                VALUES (7, '2025-08-01', '10:00', '11:00');",
        )
        .unwrap();
        let r = runner();
        r.apply_all(&mut conn).unwrap();
        while r.revert_last(&mut conn).is_ok() {}

        assert!(applied_ids(&conn).is_empty());
        let ed = SchemaEditor::new(&conn);
        assert!(!ed.has_column("reservas_salas", "checkin").unwrap());
        assert!(!ed.index_exists("reservas_salas_unica").unwrap());
        let kept: i64 = conn
            .query_row("SELECT sala_id FROM reservas_salas", [], |row| row.get(0))
            .unwrap();
        assert_eq!(kept, 7);
    }

    #[test]
    fn revert_on_fresh_database_is_none_applied() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = runner().revert_last(&mut conn).unwrap_err();
        assert!(matches!(err, Error::Migration(MigrationError::NoneApplied)));
    }

    #[test]
    fn apply_to_rejects_targets_behind_the_ledger() {
        let mut conn = Connection::open_in_memory().unwrap();
        let r = runner();
        let report = r.apply_to(&mut conn, "20250820000000-add-checkin").unwrap();
        assert_eq!(report.applied.len(), 2);

        let err = r
            .apply_to(&mut conn, "20250819150000-create-reservas")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Migration(MigrationError::OutOfOrderRequest(_))
        ));

        let err = r.apply_to(&mut conn, "20990101000000-nope").unwrap_err();
        assert!(matches!(err, Error::Migration(MigrationError::Unknown(_))));
    }

    #[test]
    fn back_dated_pending_migration_is_out_of_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationRunner::new(vec![Migration::new(
            "20250819150000-create-reservas",
            create_reservas,
            drop_reservas,
        )])
        .unwrap()
        .apply_all(&mut conn)
        .unwrap();
        Ledger::new(&conn).record("20250901000000-later").unwrap();

        let r = MigrationRunner::new(vec![
            Migration::new("20250819150000-create-reservas", create_reservas, drop_reservas),
            Migration::new("20250820000000-add-checkin", add_checkin, remove_checkin),
            Migration::new("20250901000000-later", add_unique, remove_unique),
        ])
        .unwrap();
        let err = r.apply_all(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            Error::Migration(MigrationError::OutOfOrderRequest(_))
        ));
        assert!(!SchemaEditor::new(&conn).has_column("reservas_salas", "checkin").unwrap());
    }

    #[test]
    fn status_reports_applied_pending_and_unknown() {
        let mut conn = Connection::open_in_memory().unwrap();
        let r = runner();
        r.apply_to(&mut conn, "20250819150000-create-reservas").unwrap();
        Ledger::new(&conn).record("20250101000000-removed-from-registry").unwrap();

        let status = r.status(&conn).unwrap();
        assert_eq!(status.len(), 4);
        assert!(status[0].unknown && status[0].applied);
        assert!(status[1].applied && !status[1].unknown);
        assert!(!status[2].applied);
        assert!(!status[3].applied);

        let err = {
            Ledger::new(&conn).remove("20250819150000-create-reservas").unwrap();
            r.revert_last(&mut conn).unwrap_err()
        };
        assert!(matches!(err, Error::Migration(MigrationError::Unknown(_))));
    }
}
