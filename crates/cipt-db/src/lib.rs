pub mod catalogue;
pub mod connection;
pub mod ledger;
pub mod migration;
pub mod runner;
pub mod schema;
pub mod statement;

pub use connection::{DEFAULT_BUSY_TIMEOUT, open, open_existing, open_in_memory};
pub use ledger::{LEDGER_TABLE, Ledger, LedgerEntry, OBJECTS_TABLE, ObjectKind};
pub use migration::{Migration, MigrationFn, MigrationState};
pub use runner::{ApplyReport, MigrationRunner, MigrationStatus};
pub use schema::{
    ColumnDef, ColumnInfo, ColumnType, DefaultValue, IndexDef, IndexInfo, Outcome, SchemaEditor,
    TableDef,
};
pub use statement::{Assignment, DataUpdate, Predicate, quote_ident};
