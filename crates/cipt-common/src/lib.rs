pub mod error;
pub mod phone;

pub use error::{Error, MigrationError, Result, SchemaError};
pub use phone::normalize_msisdn;
