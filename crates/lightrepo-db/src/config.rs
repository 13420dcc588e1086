//! Repository configuration.
//!
//! Options are fixed when a repository is built. They can be assembled in
//! code or loaded from environment variables with fallback to defaults.
//!
//! | Variable                      | Default | Meaning                         |
//! |-------------------------------|---------|---------------------------------|
//! | `LIGHTREPO_USE_TRANSACTIONS`  | `true`  | Wrap `update` in a transaction  |

use std::env;
use std::str::FromStr;

use lightrepo_core::{Attributes, Value};

use crate::error::DbResult;

/// Options fixed for the lifetime of a [`Repository`](crate::Repository).
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryOptions {
    /// Equality conditions ANDed into every scoped query.
    pub default_conditions: Attributes,

    /// Run the find + write of `update` inside a transaction.
    pub use_transactions: bool,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        RepositoryOptions {
            default_conditions: Attributes::new(),
            use_transactions: true,
        }
    }
}

impl RepositoryOptions {
    /// Load options from environment variables.
    ///
    /// An unparsable value fails with [`DbError::Config`](crate::DbError::Config).
    pub fn from_env() -> DbResult<Self> {
        Ok(RepositoryOptions {
            default_conditions: Attributes::new(),
            use_transactions: env_or("LIGHTREPO_USE_TRANSACTIONS", true)?,
        })
    }

    /// Adds one default condition.
    pub fn default_condition(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_conditions.insert(column.into(), value.into());
        self
    }

    /// Replaces all default conditions.
    pub fn default_conditions(mut self, conditions: Attributes) -> Self {
        self.default_conditions = conditions;
        self
    }

    /// Sets whether `update` runs inside a transaction.
    pub fn use_transactions(mut self, enabled: bool) -> Self {
        self.use_transactions = enabled;
        self
    }
}

/// Reads `key` from the environment, falling back to `default` when unset.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;

    #[test]
    fn test_defaults() {
        let options = RepositoryOptions::default();
        assert!(options.use_transactions);
        assert!(options.default_conditions.is_empty());
    }

    #[test]
    fn test_builder() {
        let options = RepositoryOptions::default()
            .default_condition("active", true)
            .use_transactions(false);

        assert!(!options.use_transactions);
        assert_eq!(
            options.default_conditions.get("active"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_env_or_parses_and_rejects() {
        env::set_var("LIGHTREPO_TEST_FLAG_OK", "false");
        env::set_var("LIGHTREPO_TEST_FLAG_BAD", "maybe");

        assert!(!env_or("LIGHTREPO_TEST_FLAG_OK", true).unwrap());
        assert!(env_or("LIGHTREPO_TEST_FLAG_UNSET", true).unwrap());
        assert!(matches!(
            env_or::<bool>("LIGHTREPO_TEST_FLAG_BAD", true),
            Err(ConfigError::InvalidValue(ref k)) if k == "LIGHTREPO_TEST_FLAG_BAD"
        ));
    }

    #[test]
    fn test_from_env_reports_config_error() {
        env::set_var("LIGHTREPO_USE_TRANSACTIONS", "sometimes");
        let result = RepositoryOptions::from_env();
        env::remove_var("LIGHTREPO_USE_TRANSACTIONS");

        assert!(matches!(
            result,
            Err(DbError::Config(ConfigError::InvalidValue(ref k))) if k == "LIGHTREPO_USE_TRANSACTIONS"
        ));
        assert!(RepositoryOptions::from_env().unwrap().use_transactions);
    }
}
