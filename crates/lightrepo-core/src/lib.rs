//! # lightrepo-core: Pure Types for lightrepo
//!
//! This crate holds the data that flows between a repository, its query
//! builder and the database: bindable values, attribute maps, column
//! projections and the record of an executed statement.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        lightrepo Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Application code                             │   │
//! │  │    repo.find_by(...), repo.update(...), repo.pluck(...)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                lightrepo-db (Repository, Query)                 │   │
//! │  │          SQL rendering, sqlx execution, listeners               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ lightrepo-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌────────────┐  ┌───────────┐ │   │
//! │  │   │   Value   │  │ Attributes │  │ QueryEvent │  │ validation│ │   │
//! │  │   └───────────┘  └────────────┘  └────────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Values, attribute maps, projections, query events
//! - [`error`] - Core error types
//! - [`validation`] - SQL identifier validation
//!
//! ## Example Usage
//!
//! ```rust
//! use lightrepo_core::{attributes, Value};
//!
//! let attrs = attributes! { "name" => "Ada", "active" => true };
//! assert_eq!(attrs.get("active"), Some(&Value::Bool(true)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use types::*;

/// Builds an [`Attributes`] map from `column => value` pairs.
///
/// Values go through `Value::from`, so anything with a `From` impl works.
///
/// ```rust
/// use lightrepo_core::attributes;
///
/// let attrs = attributes! { "title" => "Note", "pinned" => false };
/// assert_eq!(attrs.len(), 2);
/// ```
#[macro_export]
macro_rules! attributes {
    () => {
        $crate::Attributes::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut attrs = $crate::Attributes::new();
        $(
            attrs.insert(::std::string::String::from($column), $crate::Value::from($value));
        )+
        attrs
    }};
}
