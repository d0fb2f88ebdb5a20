use cipt_common::{Error, Result, SchemaError};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params, params_from_iter};
use serde::Serialize;
use tracing::{debug, info};

use crate::ledger::{Ledger, ObjectKind};
use crate::statement::{DataUpdate, Predicate, quote_ident};

/// Column type tags, rendered the way SQLite stores them in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Short text, `VARCHAR(255)`.
    String,
    Text,
    Integer,
    Real,
    Float,
    Decimal { precision: u8, scale: u8 },
    /// ISO-8601 text under a `DATETIME` affinity.
    Date,
    Boolean,
}

impl ColumnType {
    pub fn sql(&self) -> String {
        match self {
            ColumnType::String => "VARCHAR(255)".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            ColumnType::Date => "DATETIME".to_string(),
            ColumnType::Boolean => "TINYINT(1)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
    /// Only valid in `CREATE TABLE`; SQLite refuses it for `ADD COLUMN`.
    CurrentTimestamp,
    /// A parenthesised SQL expression such as `datetime('now')`. `CREATE TABLE` only.
    Expression(&'static str),
}

impl DefaultValue {
    fn sql(&self) -> String {
        match self {
            DefaultValue::Integer(v) => v.to_string(),
            DefaultValue::Real(v) => v.to_string(),
            DefaultValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            DefaultValue::Expression(expr) => format!("({expr})"),
        }
    }
}

/// `REFERENCES <table>(<column>) ON DELETE <action>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub table: String,
    pub column: String,
    pub on_delete: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub primary_key: bool,
    pub unique: bool,
    pub references: Option<Reference>,
    pub check: Option<&'static str>,
}

impl ColumnDef {
    /// A nullable column with no default.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
            references: None,
            check: None,
        }
    }

    /// `id INTEGER PRIMARY KEY AUTOINCREMENT`.
    pub fn id() -> Self {
        Self {
            primary_key: true,
            nullable: false,
            ..Self::new("id", ColumnType::Integer)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        on_delete: Option<&'static str>,
    ) -> Self {
        self.references = Some(Reference {
            table: table.into(),
            column: column.into(),
            on_delete,
        });
        self
    }

    /// `CHECK (<expr>)` on this column.
    pub fn check(mut self, expr: &'static str) -> Self {
        self.check = Some(expr);
        self
    }

    fn sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.ty.sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if !self.nullable && !self.primary_key {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.sql());
        }
        if let Some(expr) = self.check {
            sql.push_str(&format!(" CHECK ({expr})"));
        }
        if let Some(r) = &self.references {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                quote_ident(&r.table),
                quote_ident(&r.column)
            ));
            if let Some(action) = r.on_delete {
                sql.push_str(" ON DELETE ");
                sql.push_str(action);
            }
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub descending: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
            descending: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Order every key column `DESC`.
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Table-level `UNIQUE (...)` constraints.
    pub unique_keys: Vec<Vec<String>>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique_keys: Vec::new(),
        }
    }

    pub fn unique_key(mut self, columns: &[&str]) -> Self {
        self.unique_keys
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    fn sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDef::sql).collect();
        for key in &self.unique_keys {
            let cols: Vec<String> = key.iter().map(|c| quote_ident(c)).collect();
            parts.push(format!("UNIQUE ({})", cols.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.name),
            parts.join(",\n    ")
        )
    }
}

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// One row of `PRAGMA index_list`, with its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// Whether a guarded mutation changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped,
}

/// Schema inspection and mutation over a borrowed connection (or transaction).
///
/// Every migration goes through this so the existence guards live in one place:
/// adding a column that is already there is a no-op, while index and column
/// removals report [`SchemaError::NotFound`] unless the `_if_exists` form is used.
///
/// An editor built with [`SchemaEditor::for_migration`] also records every table,
/// column and index it actually creates under that migration's id. The
/// `*_created` removals consult that record, so reverting a migration never
/// touches objects that existed before it ran.
pub struct SchemaEditor<'c> {
    conn: &'c Connection,
    owner: Option<&'c str>,
}

impl<'c> SchemaEditor<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn, owner: None }
    }

    /// Editor whose creations are tracked under migration `id`. The ledger
    /// tables must already exist.
    pub fn for_migration(conn: &'c Connection, id: &'c str) -> Self {
        Self {
            conn,
            owner: Some(id),
        }
    }

    fn track(&self, kind: ObjectKind, table: &str, name: &str) -> Result<()> {
        match self.owner {
            Some(id) => Ledger::new(self.conn).track(id, kind, table, name),
            None => Ok(()),
        }
    }

    fn untrack(&self, kind: ObjectKind, table: &str, name: &str) -> Result<()> {
        match self.owner {
            Some(id) => Ledger::new(self.conn).untrack(id, kind, table, name),
            None => Ok(()),
        }
    }

    /// Whether the owning migration created this object. Always false without an owner.
    fn created_here(&self, kind: ObjectKind, table: &str, name: &str) -> Result<bool> {
        match self.owner {
            Some(id) => Ledger::new(self.conn).is_tracked(id, kind, table, name),
            None => Ok(false),
        }
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(1) FROM sqlite_master
                 WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                params![table],
                |row| row.get(0),
            )
            .map_err(|e| Error::database("failed to check table", e))?;
        Ok(count > 0)
    }

    pub fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Error::database("failed to prepare table_info", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default: row.get(4)?,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })
            .map_err(|e| Error::database("failed to read table_info", e))?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(|e| Error::database("failed to read column row", e))?);
        }
        if columns.is_empty() {
            return Err(SchemaError::TableNotFound(table.to_string()).into());
        }
        Ok(columns)
    }

    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .describe_table(table)?
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(column)))
    }

    /// Indexes on `table`, excluding the ones SQLite creates for `UNIQUE`/`PRIMARY KEY`.
    pub fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let sql = format!("PRAGMA index_list({})", quote_ident(table));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Error::database("failed to prepare index_list", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| Error::database("failed to read index_list", e))?;

        let mut indexes = Vec::new();
        for row in rows {
            let (name, unique, origin) =
                row.map_err(|e| Error::database("failed to read index row", e))?;
            if origin != "c" {
                continue;
            }
            let columns = self.index_columns(&name)?;
            indexes.push(IndexInfo {
                name,
                unique,
                columns,
            });
        }
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(indexes)
    }

    fn index_columns(&self, index: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA index_info({})", quote_ident(index));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Error::database("failed to prepare index_info", e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Option<String>>(2))
            .map_err(|e| Error::database("failed to read index_info", e))?;
        let mut columns = Vec::new();
        for row in rows {
            if let Some(col) = row.map_err(|e| Error::database("failed to read index column", e))? {
                columns.push(col);
            }
        }
        Ok(columns)
    }

    /// The table an index named `index` belongs to, if it exists anywhere.
    fn index_owner(&self, index: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT tbl_name FROM sqlite_master
                 WHERE type = 'index' AND name = ?1 COLLATE NOCASE",
                params![index],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::database("failed to look up index", e))
    }

    pub fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.index_owner(index)?.is_some())
    }

    pub fn create_table(&self, table: &TableDef) -> Result<Outcome> {
        if self.table_exists(&table.name)? {
            debug!("table {} already exists, skipping", table.name);
            return Ok(Outcome::Skipped);
        }
        self.conn
            .execute_batch(&table.sql())
            .map_err(|e| Error::database(&format!("failed to create table {}", table.name), e))?;
        self.track(ObjectKind::Table, &table.name, &table.name)?;
        info!("created table {}", table.name);
        Ok(Outcome::Applied)
    }

    pub fn drop_table(&self, table: &str) -> Result<()> {
        if !self.table_exists(table)? {
            return Err(SchemaError::TableNotFound(table.to_string()).into());
        }
        self.conn
            .execute_batch(&format!("DROP TABLE {}", quote_ident(table)))
            .map_err(|e| Error::database(&format!("failed to drop table {table}"), e))?;
        info!("dropped table {table}");
        Ok(())
    }

    /// Drop `table` only if the owning migration created it.
    pub fn drop_created_table(&self, table: &str) -> Result<Outcome> {
        if !self.created_here(ObjectKind::Table, table, table)? {
            info!("table {table} was not created by this migration, keeping it");
            return Ok(Outcome::Skipped);
        }
        self.drop_table(table)?;
        self.untrack(ObjectKind::Table, table, table)?;
        Ok(Outcome::Applied)
    }

    /// Add `column` to `table` unless a column with that name is already present.
    pub fn add_column(&self, table: &str, column: &ColumnDef) -> Result<Outcome> {
        if self.has_column(table, &column.name)? {
            debug!("{table}.{} already exists, skipping", column.name);
            return Ok(Outcome::Skipped);
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column.sql()
        );
        self.conn
            .execute_batch(&sql)
            .map_err(|e| Error::database(&format!("failed to add {table}.{}", column.name), e))?;
        self.track(ObjectKind::Column, table, &column.name)?;
        info!("added column {table}.{}", column.name);
        Ok(Outcome::Applied)
    }

    pub fn remove_column(&self, table: &str, column: &str) -> Result<()> {
        if !self.has_column(table, column)? {
            return Err(SchemaError::NotFound {
                table: table.to_string(),
                kind: "column",
                name: column.to_string(),
            }
            .into());
        }
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(column)
        );
        self.conn
            .execute_batch(&sql)
            .map_err(|e| Error::database(&format!("failed to drop {table}.{column}"), e))?;
        info!("removed column {table}.{column}");
        Ok(())
    }

    pub fn remove_column_if_exists(&self, table: &str, column: &str) -> Result<Outcome> {
        if !self.table_exists(table)? || !self.has_column(table, column)? {
            debug!("{table}.{column} absent, nothing to remove");
            return Ok(Outcome::Skipped);
        }
        self.remove_column(table, column)?;
        Ok(Outcome::Applied)
    }

    /// Remove `table.column` only if the owning migration added it.
    pub fn remove_created_column(&self, table: &str, column: &str) -> Result<Outcome> {
        if !self.created_here(ObjectKind::Column, table, column)? {
            info!("{table}.{column} was not added by this migration, keeping it");
            return Ok(Outcome::Skipped);
        }
        self.remove_column(table, column)?;
        self.untrack(ObjectKind::Column, table, column)?;
        Ok(Outcome::Applied)
    }

    /// Create `index` on `table`. A unique index over rows that already collide
    /// fails with [`SchemaError::ConstraintViolation`].
    pub fn add_index(&self, table: &str, index: &IndexDef) -> Result<()> {
        if !self.table_exists(table)? {
            return Err(SchemaError::TableNotFound(table.to_string()).into());
        }
        if self.index_owner(&index.name)?.is_some() {
            return Err(SchemaError::DuplicateIndex {
                table: table.to_string(),
                index: index.name.clone(),
            }
            .into());
        }

        let order = if index.descending { " DESC" } else { "" };
        let cols: Vec<String> = index
            .columns
            .iter()
            .map(|c| format!("{}{order}", quote_ident(c)))
            .collect();
        let sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            quote_ident(&index.name),
            quote_ident(table),
            cols.join(", ")
        );
        match self.conn.execute_batch(&sql) {
            Ok(()) => {
                self.track(ObjectKind::Index, table, &index.name)?;
                info!("created index {} on {table}", index.name);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(SchemaError::ConstraintViolation {
                    table: table.to_string(),
                    index: index.name.clone(),
                    detail: msg.unwrap_or_else(|| err.to_string()),
                }
                .into())
            }
            Err(e) => Err(Error::database(
                &format!("failed to create index {}", index.name),
                e,
            )),
        }
    }

    pub fn remove_index(&self, table: &str, index: &str) -> Result<()> {
        match self.index_owner(index)? {
            Some(owner) if owner.eq_ignore_ascii_case(table) => {}
            _ => {
                return Err(SchemaError::NotFound {
                    table: table.to_string(),
                    kind: "index",
                    name: index.to_string(),
                }
                .into());
            }
        }
        self.conn
            .execute_batch(&format!("DROP INDEX {}", quote_ident(index)))
            .map_err(|e| Error::database(&format!("failed to drop index {index}"), e))?;
        info!("removed index {index} from {table}");
        Ok(())
    }

    pub fn remove_index_if_exists(&self, table: &str, index: &str) -> Result<Outcome> {
        if self.index_owner(index)?.is_none() {
            debug!("index {index} absent, nothing to remove");
            return Ok(Outcome::Skipped);
        }
        self.remove_index(table, index)?;
        Ok(Outcome::Applied)
    }

    /// Create `index` unless an index with that name already exists anywhere.
    pub fn add_index_if_missing(&self, table: &str, index: &IndexDef) -> Result<Outcome> {
        if self.index_exists(&index.name)? {
            debug!("index {} already exists, skipping", index.name);
            return Ok(Outcome::Skipped);
        }
        self.add_index(table, index)?;
        Ok(Outcome::Applied)
    }

    /// Remove `index` only if the owning migration created it.
    pub fn remove_created_index(&self, table: &str, index: &str) -> Result<Outcome> {
        if !self.created_here(ObjectKind::Index, table, index)? {
            info!("index {index} was not created by this migration, keeping it");
            return Ok(Outcome::Skipped);
        }
        self.remove_index(table, index)?;
        self.untrack(ObjectKind::Index, table, index)?;
        Ok(Outcome::Applied)
    }

    /// Insert each row of `rows` whose `key` value is not yet present in `table`.
    /// Inserted keys are tracked as rows of the owning migration.
    pub fn seed_rows(&self, table: &str, key: &str, rows: &[Vec<(&str, Value)>]) -> Result<usize> {
        let mut inserted = 0;
        for row in rows {
            let Some((_, key_value)) = row.iter().find(|(col, _)| *col == key) else {
                return Err(Error::Other(format!("seed row for {table} has no {key}")));
            };
            if self.count(table, &Predicate::eq(key, key_value.clone()))? > 0 {
                debug!("{table} already has {key} = {key_value:?}, skipping");
                continue;
            }
            let cols: Vec<String> = row.iter().map(|(col, _)| quote_ident(col)).collect();
            let marks = vec!["?"; row.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({marks})",
                quote_ident(table),
                cols.join(", ")
            );
            self.conn
                .execute(&sql, params_from_iter(row.iter().map(|(_, v)| v)))
                .map_err(|e| Error::database(&format!("failed to seed {table}"), e))?;
            self.track(ObjectKind::Row, table, &key_text(key_value))?;
            inserted += 1;
        }
        info!("seeded {inserted} row(s) into {table}");
        Ok(inserted)
    }

    /// Delete the rows this migration seeded into `table`, matched on `key`.
    pub fn remove_seeded_rows(&self, table: &str, key: &str) -> Result<usize> {
        let Some(id) = self.owner else {
            return Ok(0);
        };
        let ledger = Ledger::new(self.conn);
        let keys = ledger.tracked(id, ObjectKind::Row, table)?;
        let values = keys.iter().cloned().map(Value::Text).collect();
        let deleted = self.run_delete(table, &Predicate::In(key.to_string(), values))?;
        for k in &keys {
            ledger.untrack(id, ObjectKind::Row, table, k)?;
        }
        Ok(deleted)
    }

    /// Values of `columns` for every row matching `filter`, in rowid order.
    pub fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &Predicate,
    ) -> Result<Vec<Vec<Value>>> {
        let mut values = Vec::new();
        let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY rowid",
            cols.join(", "),
            quote_ident(table),
            filter.render(&mut values)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Error::database(&format!("failed to prepare select on {table}"), e))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                (0..columns.len())
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .map_err(|e| Error::database(&format!("failed to select from {table}"), e))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::database(&format!("failed to read {table} row"), e))?);
        }
        Ok(out)
    }

    /// Run a declarative update; returns the number of rows changed.
    pub fn run_update(&self, update: &DataUpdate) -> Result<usize> {
        let (sql, values) = update.to_sql();
        let changed = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| Error::database(&format!("failed to update {}", update.table), e))?;
        info!("updated {changed} row(s) in {}", update.table);
        Ok(changed)
    }

    pub fn run_delete(&self, table: &str, filter: &Predicate) -> Result<usize> {
        let mut values = Vec::new();
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(table),
            filter.render(&mut values)
        );
        let deleted = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| Error::database(&format!("failed to delete from {table}"), e))?;
        info!("deleted {deleted} row(s) from {table}");
        Ok(deleted)
    }

    pub fn count(&self, table: &str, filter: &Predicate) -> Result<usize> {
        let mut values = Vec::new();
        let sql = format!(
            "SELECT COUNT(1) FROM {} WHERE {}",
            quote_ident(table),
            filter.render(&mut values)
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .map_err(|e| Error::database(&format!("failed to count {table}"), e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Rowids whose `columns` key repeats an earlier (lower rowid) row.
    /// Rows with a NULL in any key column never count as duplicates.
    pub fn duplicate_rowids(&self, table: &str, columns: &[&str]) -> Result<Vec<i64>> {
        let non_null: Vec<String> = columns
            .iter()
            .map(|c| format!("{} IS NOT NULL", quote_ident(c)))
            .collect();
        let non_null = non_null.join(" AND ");
        let group: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let t = quote_ident(table);
        let sql = format!(
            "SELECT rowid FROM {t} WHERE {non_null} AND rowid NOT IN (
                SELECT MIN(rowid) FROM {t} WHERE {non_null} GROUP BY {}
            ) ORDER BY rowid",
            group.join(", ")
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Error::database("failed to prepare duplicate scan", e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::database("failed to scan duplicates", e))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| Error::database("failed to read duplicate row", e))?);
        }
        Ok(ids)
    }

    /// Delete rows that duplicate an earlier row on `columns`, keeping the lowest rowid.
    pub fn dedupe_keep_first(&self, table: &str, columns: &[&str]) -> Result<usize> {
        let ids = self.duplicate_rowids(table, columns)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let values = ids.into_iter().map(Value::Integer).collect();
        self.run_delete(table, &Predicate::In("rowid".into(), values))
    }
}

/// Seed keys are compared as text once tracked.
fn key_text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Null | Value::Blob(_) => String::new(),
    }
}
