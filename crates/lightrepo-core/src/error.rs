//! # Error Types
//!
//! Error types for lightrepo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  lightrepo-core errors (this file)                                     │
//! │  └── CoreError        - Identifier validation failures                 │
//! │                                                                         │
//! │  lightrepo-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: CoreError → DbError → caller                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Errors raised by the pure layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A table or column name cannot be safely placed in SQL text.
    ///
    /// ## When This Occurs
    /// - Empty identifier
    /// - Characters outside `[A-Za-z0-9_]`
    /// - Leading digit
    /// - More than one `.` qualifier
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidIdentifier("1name".to_string());
        assert_eq!(err.to_string(), "Invalid identifier: '1name'");
    }
}
