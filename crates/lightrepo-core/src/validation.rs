//! # Validation Module
//!
//! Identifiers (tables, columns) are the only caller input that ends up in
//! SQL text instead of a bound parameter, so they are checked here before
//! the query builder quotes them.
//!
//! ## Accepted Shapes
//! ```text
//! name            → "name"
//! users.name      → "users"."name"
//! *               → *
//! users.*         → "users".*
//! ```

use crate::error::{CoreError, CoreResult};

/// Validates a single identifier segment.
///
/// ## Rules
/// - Must not be empty
/// - First character is an ASCII letter or `_`
/// - Remaining characters are ASCII alphanumerics or `_`
///
/// ## Example
/// ```rust
/// use lightrepo_core::validation::validate_identifier;
///
/// assert!(validate_identifier("created_at").is_ok());
/// assert!(validate_identifier("drop table").is_err());
/// ```
pub fn validate_identifier(ident: &str) -> CoreResult<()> {
    let mut chars = ident.chars();

    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier(ident.to_string()))
    }
}

/// Validates a possibly table-qualified column reference and returns it
/// double-quoted for SQLite.
///
/// `*` and `table.*` are accepted as projections.
///
/// ## Example
/// ```rust
/// use lightrepo_core::validation::quote_column;
///
/// assert_eq!(quote_column("users.name").unwrap(), "\"users\".\"name\"");
/// assert_eq!(quote_column("*").unwrap(), "*");
/// ```
pub fn quote_column(column: &str) -> CoreResult<String> {
    let column = column.trim();

    if column == "*" {
        return Ok("*".to_string());
    }

    match column.split_once('.') {
        Some((table, field)) => {
            validate_identifier(table)
                .map_err(|_| CoreError::InvalidIdentifier(column.to_string()))?;
            if field == "*" {
                return Ok(format!("\"{}\".*", table));
            }
            validate_identifier(field)
                .map_err(|_| CoreError::InvalidIdentifier(column.to_string()))?;
            Ok(format!("\"{}\".\"{}\"", table, field))
        }
        None => {
            validate_identifier(column)?;
            Ok(format!("\"{}\"", column))
        }
    }
}

/// Validates a table name and returns it double-quoted.
pub fn quote_table(table: &str) -> CoreResult<String> {
    validate_identifier(table)?;
    Ok(format!("\"{}\"", table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("id").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("user_id2").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fa").is_err());
        assert!(validate_identifier("name; DROP TABLE users").is_err());
        assert!(validate_identifier("na-me").is_err());
    }

    #[test]
    fn test_quote_column() {
        assert_eq!(quote_column("name").unwrap(), "\"name\"");
        assert_eq!(quote_column(" name ").unwrap(), "\"name\"");
        assert_eq!(quote_column("users.id").unwrap(), "\"users\".\"id\"");
        assert_eq!(quote_column("users.*").unwrap(), "\"users\".*");

        assert_eq!(
            quote_column("a.b.c"),
            Err(CoreError::InvalidIdentifier("a.b.c".to_string()))
        );
        assert!(quote_column("\"name\"").is_err());
    }

    #[test]
    fn test_quote_table() {
        assert_eq!(quote_table("users").unwrap(), "\"users\"");
        assert!(quote_table("users.name").is_err());
    }
}
