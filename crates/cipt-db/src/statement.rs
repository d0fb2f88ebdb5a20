//! Declarative data statements.
//!
//! Data migrations and fixes describe *what* rows change as a [`Predicate`] plus
//! typed assignments; the SQL text and bound parameters are produced here with
//! every identifier quoted and every value passed as a parameter.

use rusqlite::types::Value;

/// Quote an SQL identifier (`"name"`), doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Row filter for [`DataUpdate`] and deletes.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    All,
    Eq(String, Value),
    NotEq(String, Value),
    IsNull(String),
    IsNotNull(String),
    In(String, Vec<Value>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(column.into(), value.into())
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::NotEq(column.into(), value.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Predicate::IsNotNull(column.into())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Render as an SQL boolean expression, appending bound values to `params`.
    pub fn render(&self, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::All => "1 = 1".to_string(),
            Predicate::Eq(col, value) => {
                params.push(value.clone());
                format!("{} = ?", quote_ident(col))
            }
            Predicate::NotEq(col, value) => {
                params.push(value.clone());
                format!("{} <> ?", quote_ident(col))
            }
            Predicate::IsNull(col) => format!("{} IS NULL", quote_ident(col)),
            Predicate::IsNotNull(col) => format!("{} IS NOT NULL", quote_ident(col)),
            // An empty IN list matches nothing.
            Predicate::In(_, values) if values.is_empty() => "0 = 1".to_string(),
            Predicate::In(col, values) => {
                params.extend(values.iter().cloned());
                let marks = vec!["?"; values.len()].join(", ");
                format!("{} IN ({marks})", quote_ident(col))
            }
            Predicate::And(parts) => join(parts, " AND ", "1 = 1", params),
            Predicate::Or(parts) => join(parts, " OR ", "0 = 1", params),
        }
    }
}

fn join(parts: &[Predicate], sep: &str, empty: &str, params: &mut Vec<Value>) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered: Vec<String> = parts
        .iter()
        .map(|p| format!("({})", p.render(params)))
        .collect();
    rendered.join(sep)
}

/// Right-hand side of one `SET` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Value(Value),
    /// Copy another column of the same row.
    Column(String),
}

/// `UPDATE <table> SET <assignments> WHERE <filter>`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUpdate {
    pub table: String,
    pub assignments: Vec<(String, Assignment)>,
    pub filter: Predicate,
}

impl DataUpdate {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            filter: Predicate::All,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments
            .push((column.into(), Assignment::Value(value.into())));
        self
    }

    pub fn set_from(mut self, column: impl Into<String>, source: impl Into<String>) -> Self {
        self.assignments
            .push((column.into(), Assignment::Column(source.into())));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = predicate;
        self
    }

    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut params = Vec::with_capacity(self.assignments.len());
        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(col, rhs)| match rhs {
                Assignment::Value(value) => {
                    params.push(value.clone());
                    format!("{} = ?", quote_ident(col))
                }
                Assignment::Column(source) => {
                    format!("{} = {}", quote_ident(col), quote_ident(source))
                }
            })
            .collect();
        let filter = self.filter.render(&mut params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {filter}",
            quote_ident(&self.table),
            sets.join(", ")
        );
        (sql, params)
    }
}
