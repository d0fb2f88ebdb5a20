use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures raised by the column/index mutation primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("index {index} already exists on {table}")]
    DuplicateIndex { table: String, index: String },

    #[error("{kind} {name} not found on {table}")]
    NotFound {
        table: String,
        kind: &'static str,
        name: String,
    },

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("existing rows in {table} violate {index}: {detail}")]
    ConstraintViolation {
        table: String,
        index: String,
        detail: String,
    },
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("no migrations have been applied")]
    NoneApplied,

    #[error("out-of-order request: {0}")]
    OutOfOrderRequest(String),

    #[error("duplicate migration id {0}")]
    DuplicateId(String),

    #[error("malformed migration id {0} (expected <14-digit timestamp>-<name>)")]
    InvalidId(String),

    #[error("unknown migration {0}")]
    Unknown(String),

    #[error("migration {id} failed: {source}")]
    Failed {
        id: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap a rusqlite failure with a short description of what was attempted.
    pub fn database(context: &str, err: rusqlite::Error) -> Self {
        Error::Database(format!("{context}: {err}"))
    }

    /// The schema error at the root of this error, looking through a failed migration.
    pub fn schema_cause(&self) -> Option<&SchemaError> {
        match self {
            Error::Schema(e) => Some(e),
            Error::Migration(MigrationError::Failed { source, .. }) => source.schema_cause(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let e = Error::Config("database not found: ./db.sqlite".into());
        assert_eq!(
            e.to_string(),
            "configuration error: database not found: ./db.sqlite"
        );

        let e = Error::Migration(MigrationError::NoneApplied);
        assert_eq!(
            e.to_string(),
            "migration error: no migrations have been applied"
        );

        let e = Error::Schema(SchemaError::NotFound {
            table: "Eventos".into(),
            kind: "column",
            name: "tipo_desconto".into(),
        });
        assert_eq!(
            e.to_string(),
            "schema error: column tipo_desconto not found on Eventos"
        );

        let e = Error::Other("misc".into());
        assert_eq!(e.to_string(), "misc");
    }

    #[test]
    fn schema_cause_looks_through_failed_migration() {
        let violation = SchemaError::ConstraintViolation {
            table: "reservas_salas".into(),
            index: "reservas_salas_unica".into(),
            detail: "UNIQUE constraint failed".into(),
        };
        let e = Error::Migration(MigrationError::Failed {
            id: "20250828140702-add-unique-reservas".into(),
            source: Box::new(Error::Schema(violation.clone())),
        });
        assert_eq!(e.schema_cause(), Some(&violation));
        assert!(Error::Other("x".into()).schema_cause().is_none());
    }
}
