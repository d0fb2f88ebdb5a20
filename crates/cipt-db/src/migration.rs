use std::fmt;
use std::sync::LazyLock;

use cipt_common::{MigrationError, Result};
use regex::Regex;

use crate::schema::SchemaEditor;

/// Forward or backward step of a migration.
pub type MigrationFn = fn(&SchemaEditor<'_>) -> Result<()>;

/// `YYYYMMDDhhmmss-some-name`: the timestamp prefix makes lexicographic order
/// chronological.
static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{14}-[a-z0-9][a-z0-9_-]*$").expect("migration id pattern is valid")
});

/// A versioned schema or data change.
///
/// Structural migrations pair `up` with its exact inverse in `down`. Data
/// transformations that cannot be undone are built with [`Migration::irreversible`],
/// whose `down` does nothing.
#[derive(Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub up: MigrationFn,
    pub down: MigrationFn,
    pub reversible: bool,
}

impl Migration {
    pub const fn new(id: &'static str, up: MigrationFn, down: MigrationFn) -> Self {
        Self {
            id,
            up,
            down,
            reversible: true,
        }
    }

    pub const fn irreversible(id: &'static str, up: MigrationFn) -> Self {
        Self {
            id,
            up,
            down: no_op,
            reversible: false,
        }
    }

    pub fn validate_id(&self) -> Result<()> {
        if ID_PATTERN.is_match(self.id) {
            Ok(())
        } else {
            Err(MigrationError::InvalidId(self.id.to_string()).into())
        }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("reversible", &self.reversible)
            .finish()
    }
}

fn no_op(_: &SchemaEditor<'_>) -> Result<()> {
    Ok(())
}

/// Lifecycle of one migration inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applying,
    Applied,
    Reverting,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationState::Pending => "pending",
            MigrationState::Applying => "applying",
            MigrationState::Applied => "applied",
            MigrationState::Reverting => "reverting",
        };
        f.write_str(s)
    }
}
