//! Table identifier parsing and formatting utilities.

use crate::error::{HiveError, Result};

/// Hive table identifier (`database.table`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    pub database: String,
    pub table: String,
}

impl TableIdentifier {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Canonical `database.table` form.
    pub fn to_canonical(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    /// Hive identifiers are case-insensitive.
    pub fn matches(&self, other: &TableIdentifier) -> bool {
        self.database.eq_ignore_ascii_case(&other.database)
            && self.table.eq_ignore_ascii_case(&other.table)
    }
}

impl std::fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Parse `database.table` or `database/table`.
///
/// Hive has a single namespace level, so exactly two non-empty parts are
/// required.
///
/// # Examples
///
/// ```
/// use fluree_db_hive::catalog::parse_table_identifier;
///
/// let id = parse_table_identifier("sales.orders").unwrap();
/// assert_eq!(id.database, "sales");
/// assert_eq!(id.table, "orders");
///
/// assert!(parse_table_identifier("a.b.c").is_err());
/// ```
pub fn parse_table_identifier(table_id: &str) -> Result<TableIdentifier> {
    let sep = if table_id.contains('/') { '/' } else { '.' };
    let parts: Vec<&str> = table_id.split(sep).collect();
    match parts.as_slice() {
        [database, table] if !database.is_empty() && !table.is_empty() => {
            Ok(TableIdentifier::new(*database, *table))
        }
        _ => Err(HiveError::Config(format!(
            "Invalid table identifier '{}': expected database.table",
            table_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dot_and_slash() {
        assert_eq!(
            parse_table_identifier("db.tbl").unwrap(),
            TableIdentifier::new("db", "tbl")
        );
        assert_eq!(
            parse_table_identifier("db/tbl").unwrap(),
            TableIdentifier::new("db", "tbl")
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_table_identifier("tbl").is_err());
        assert!(parse_table_identifier(".tbl").is_err());
        assert!(parse_table_identifier("db.").is_err());
        assert!(parse_table_identifier("a/b/c").is_err());
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let a = TableIdentifier::new("Sales", "Orders");
        assert!(a.matches(&TableIdentifier::new("sales", "orders")));
        assert!(!a.matches(&TableIdentifier::new("sales", "items")));
        assert_eq!(a.to_string(), "Sales.Orders");
    }
}
