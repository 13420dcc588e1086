//! # Criteria and Conditions
//!
//! The row-agnostic half of a query: where clauses, ordering and paging.
//! Query modifiers receive a `&mut Criteria`, so the same closure works on
//! an entity query and on a raw table query.
//!
//! ## Condition Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Condition::Equality({a: 1, b: "x"})   →  ("a" = ? AND "b" = ?)         │
//! │  Condition::Modifier(|c| c.or_where…)  →  ( …clauses the closure adds…) │
//! │  Condition::Raw("score > ?", [10])     →  (score > ?)                   │
//! │                                                                         │
//! │  Every shape lands as ONE parenthesised group ANDed onto the query.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use lightrepo_core::validation::quote_column;
use lightrepo_core::{Attributes, Value};

use crate::error::{DbError, DbResult};
use crate::executor::Statement;

// =============================================================================
// Operators
// =============================================================================

/// Comparison operator for [`Criteria::where_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl Operator {
    fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Boolean {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

// =============================================================================
// Raw Expressions
// =============================================================================

/// SQL fragment with its own `?` bindings, placed verbatim in a where clause.
///
/// Nothing in the fragment is validated. Never build one from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExpression {
    pub sql: String,
    pub bindings: Vec<Value>,
}

impl RawExpression {
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        RawExpression {
            sql: sql.into(),
            bindings,
        }
    }
}

// =============================================================================
// Condition
// =============================================================================

/// Closure form of a condition, applied to a fresh nested group.
pub type ConditionFn = Arc<dyn Fn(&mut Criteria) + Send + Sync>;

/// Caller-supplied filter for repository operations.
#[derive(Clone)]
pub enum Condition {
    /// Column = value for every entry. `Null` values compare with `IS NULL`.
    Equality(Attributes),
    /// Builds a nested where group.
    Modifier(ConditionFn),
    /// Verbatim SQL fragment.
    Raw(RawExpression),
}

impl Condition {
    /// Equality condition from `(column, value)` pairs.
    ///
    /// ```rust
    /// use lightrepo_db::Condition;
    ///
    /// let by_name = Condition::eq([("name", "Ada")]);
    /// ```
    pub fn eq<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Condition::Equality(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Nested group built by `f`.
    pub fn group<F>(f: F) -> Self
    where
        F: Fn(&mut Criteria) + Send + Sync + 'static,
    {
        Condition::Modifier(Arc::new(f))
    }

    pub fn raw(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        Condition::Raw(RawExpression::new(sql, bindings))
    }
}

impl From<Attributes> for Condition {
    fn from(attrs: Attributes) -> Self {
        Condition::Equality(attrs)
    }
}

impl From<RawExpression> for Condition {
    fn from(expr: RawExpression) -> Self {
        Condition::Raw(expr)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equality(attrs) => f.debug_tuple("Equality").field(attrs).finish(),
            Condition::Modifier(_) => f.write_str("Modifier(..)"),
            Condition::Raw(expr) => f.debug_tuple("Raw").field(expr).finish(),
        }
    }
}

// =============================================================================
// Clauses
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Clause {
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Null {
        column: String,
        negated: bool,
    },
    Raw(RawExpression),
    Group(Vec<Predicate>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub(crate) boolean: Boolean,
    pub(crate) clause: Clause,
}

impl Predicate {
    pub(crate) fn and(clause: Clause) -> Self {
        Predicate {
            boolean: Boolean::And,
            clause,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Order {
    pub(crate) column: String,
    pub(crate) direction: Direction,
}

// =============================================================================
// Criteria
// =============================================================================

/// Where clauses, ordering and paging of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub(crate) wheres: Vec<Predicate>,
    pub(crate) orders: Vec<Order>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, boolean: Boolean, clause: Clause) -> &mut Self {
        self.wheres.push(Predicate { boolean, clause });
        self
    }

    /// `column = value` (`IS NULL` for [`Value::Null`]).
    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.where_op(column, Operator::Eq, value)
    }

    pub fn where_op(
        &mut self,
        column: impl Into<String>,
        op: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push(
            Boolean::And,
            Clause::Compare {
                column: column.into(),
                op,
                value: value.into(),
            },
        )
    }

    pub fn or_where(
        &mut self,
        column: impl Into<String>,
        op: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push(
            Boolean::Or,
            Clause::Compare {
                column: column.into(),
                op,
                value: value.into(),
            },
        )
    }

    pub fn where_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(
            Boolean::And,
            Clause::In {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negated: false,
            },
        )
    }

    pub fn where_not_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(
            Boolean::And,
            Clause::In {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negated: true,
            },
        )
    }

    pub fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push(
            Boolean::And,
            Clause::Null {
                column: column.into(),
                negated: false,
            },
        )
    }

    pub fn where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push(
            Boolean::And,
            Clause::Null {
                column: column.into(),
                negated: true,
            },
        )
    }

    /// Verbatim SQL fragment; see [`RawExpression`].
    pub fn where_raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) -> &mut Self {
        self.push(Boolean::And, Clause::Raw(RawExpression::new(sql, bindings)))
    }

    /// `AND ( … )` with the clauses `build` adds.
    pub fn where_group<F: FnOnce(&mut Criteria)>(&mut self, build: F) -> &mut Self {
        self.group(Boolean::And, build)
    }

    /// `OR ( … )` with the clauses `build` adds.
    pub fn or_where_group<F: FnOnce(&mut Criteria)>(&mut self, build: F) -> &mut Self {
        self.group(Boolean::Or, build)
    }

    fn group<F: FnOnce(&mut Criteria)>(&mut self, boolean: Boolean, build: F) -> &mut Self {
        let mut nested = Criteria::new();
        build(&mut nested);
        if !nested.wheres.is_empty() {
            self.push(boolean, Clause::Group(nested.wheres));
        }
        self
    }

    /// ANDs `condition` onto the criteria as one nested group.
    ///
    /// Empty equality maps and closures that add nothing leave the criteria
    /// untouched.
    pub fn apply(&mut self, condition: &Condition) -> &mut Self {
        match condition {
            Condition::Equality(attrs) => {
                if !attrs.is_empty() {
                    let group = equality_predicates(attrs);
                    self.push(Boolean::And, Clause::Group(group));
                }
                self
            }
            Condition::Modifier(build) => self.where_group(|nested| build(nested)),
            Condition::Raw(expr) => self.push(Boolean::And, Clause::Raw(expr.clone())),
        }
    }

    pub fn order_by(&mut self, column: impl Into<String>) -> &mut Self {
        self.orders.push(Order {
            column: column.into(),
            direction: Direction::Asc,
        });
        self
    }

    pub fn order_by_desc(&mut self, column: impl Into<String>) -> &mut Self {
        self.orders.push(Order {
            column: column.into(),
            direction: Direction::Desc,
        });
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn has_wheres(&self) -> bool {
        !self.wheres.is_empty()
    }

    pub fn has_orders(&self) -> bool {
        !self.orders.is_empty()
    }

    pub(crate) fn is_paged(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub(crate) fn has_top_level_or(&self) -> bool {
        self.wheres
            .iter()
            .skip(1)
            .any(|p| p.boolean == Boolean::Or)
    }
}

pub(crate) fn equality_predicates(attrs: &Attributes) -> Vec<Predicate> {
    attrs
        .iter()
        .map(|(column, value)| {
            Predicate::and(Clause::Compare {
                column: column.clone(),
                op: Operator::Eq,
                value: value.clone(),
            })
        })
        .collect()
}

// =============================================================================
// Rendering
// =============================================================================

/// Appends `predicates` joined by their connectors. The first connector is
/// dropped.
pub(crate) fn render_predicates(predicates: &[Predicate], stmt: &mut Statement) -> DbResult<()> {
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            stmt.push(match predicate.boolean {
                Boolean::And => " AND ",
                Boolean::Or => " OR ",
            });
        }
        render_clause(&predicate.clause, stmt)?;
    }
    Ok(())
}

fn render_clause(clause: &Clause, stmt: &mut Statement) -> DbResult<()> {
    match clause {
        Clause::Compare { column, op, value } => {
            let column = quote_column(column)?;
            match (op, value) {
                (Operator::Eq, Value::Null) => {
                    stmt.push(format!("{} IS NULL", column));
                }
                (Operator::Ne, Value::Null) => {
                    stmt.push(format!("{} IS NOT NULL", column));
                }
                _ => {
                    stmt.push(format!("{} {} ", column, op.as_sql()))
                        .push_bind(value.clone());
                }
            }
        }
        Clause::In {
            column,
            values,
            negated,
        } => {
            let column = quote_column(column)?;
            if values.is_empty() {
                // IN () is a syntax error in SQLite
                stmt.push(if *negated { "1 = 1" } else { "0 = 1" });
            } else {
                let keyword = if *negated { "NOT IN" } else { "IN" };
                stmt.push(format!("{} {} (", column, keyword))
                    .push_bind_list(values)
                    .push(")");
            }
        }
        Clause::Null { column, negated } => {
            let column = quote_column(column)?;
            let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
            stmt.push(format!("{} {}", column, keyword));
        }
        Clause::Raw(expr) => {
            stmt.push("(");
            render_raw(expr, stmt)?;
            stmt.push(")");
        }
        Clause::Group(predicates) => {
            stmt.push("(");
            render_predicates(predicates, stmt)?;
            stmt.push(")");
        }
    }
    Ok(())
}

/// Each `?` in the fragment takes the next binding, in order.
fn render_raw(expr: &RawExpression, stmt: &mut Statement) -> DbResult<()> {
    let placeholders = expr.sql.matches('?').count();
    if placeholders != expr.bindings.len() {
        return Err(DbError::QueryFailed(format!(
            "raw expression `{}` has {} placeholders but {} bindings",
            expr.sql,
            placeholders,
            expr.bindings.len()
        )));
    }

    let mut bindings = expr.bindings.iter();
    for (i, part) in expr.sql.split('?').enumerate() {
        if i > 0 {
            if let Some(value) = bindings.next() {
                stmt.push_bind(value.clone());
            }
        }
        stmt.push(part);
    }
    Ok(())
}

pub(crate) fn render_orders(orders: &[Order], stmt: &mut Statement) -> DbResult<()> {
    if orders.is_empty() {
        return Ok(());
    }

    let mut parts = Vec::with_capacity(orders.len());
    for order in orders {
        let direction = match order.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        parts.push(format!("{} {}", quote_column(&order.column)?, direction));
    }

    stmt.push(" ORDER BY ").push_list(parts);
    Ok(())
}

/// SQLite takes a signed 64-bit LIMIT/OFFSET; larger values saturate.
fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub(crate) fn render_paging(criteria: &Criteria, stmt: &mut Statement) {
    match (criteria.limit, criteria.offset) {
        (Some(limit), Some(offset)) => {
            stmt.push(" LIMIT ")
                .push_bind(clamp(limit))
                .push(" OFFSET ")
                .push_bind(clamp(offset));
        }
        (Some(limit), None) => {
            stmt.push(" LIMIT ").push_bind(clamp(limit));
        }
        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
        (None, Some(offset)) => {
            stmt.push(" LIMIT -1 OFFSET ").push_bind(clamp(offset));
        }
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightrepo_core::attributes;

    fn render(criteria: &Criteria) -> (String, Vec<Value>) {
        let mut stmt = Statement::new("");
        render_predicates(&criteria.wheres, &mut stmt).unwrap();
        (stmt.sql().to_string(), stmt.bindings().to_vec())
    }

    #[test]
    fn test_compare_and_null_equality() {
        let mut criteria = Criteria::new();
        criteria
            .where_eq("name", "x")
            .where_eq("deleted_at", Value::Null)
            .where_op("age", Operator::Ge, 18);

        let (sql, bindings) = render(&criteria);
        assert_eq!(sql, "\"name\" = ? AND \"deleted_at\" IS NULL AND \"age\" >= ?");
        assert_eq!(bindings, vec![Value::from("x"), Value::Int(18)]);
    }

    #[test]
    fn test_in_lists() {
        let mut criteria = Criteria::new();
        criteria
            .where_in("id", [1, 2, 3])
            .where_in("role", Vec::<String>::new())
            .where_not_in("status", ["banned"]);

        let (sql, bindings) = render(&criteria);
        assert_eq!(
            sql,
            "\"id\" IN (?, ?, ?) AND 0 = 1 AND \"status\" NOT IN (?)"
        );
        assert_eq!(bindings.len(), 4);
    }

    #[test]
    fn test_groups_and_or() {
        let mut criteria = Criteria::new();
        criteria.where_eq("active", true).where_group(|g| {
            g.where_eq("role", "admin").or_where("role", Operator::Eq, "owner");
        });

        let (sql, _) = render(&criteria);
        assert_eq!(sql, "\"active\" = ? AND (\"role\" = ? OR \"role\" = ?)");
        assert!(!criteria.has_top_level_or());
    }

    #[test]
    fn test_apply_each_condition_shape() {
        let mut criteria = Criteria::new();
        criteria
            .apply(&Condition::from(attributes! { "a" => 1, "b" => 2 }))
            .apply(&Condition::group(|g| {
                g.where_null("c");
            }))
            .apply(&Condition::raw("score > ?", vec![Value::Int(10)]));

        let (sql, bindings) = render(&criteria);
        assert_eq!(
            sql,
            "(\"a\" = ? AND \"b\" = ?) AND (\"c\" IS NULL) AND (score > ?)"
        );
        assert_eq!(bindings, vec![Value::Int(1), Value::Int(2), Value::Int(10)]);
    }

    #[test]
    fn test_empty_conditions_add_nothing() {
        let mut criteria = Criteria::new();
        criteria
            .apply(&Condition::Equality(Attributes::new()))
            .apply(&Condition::group(|_| {}));

        assert!(!criteria.has_wheres());
    }

    #[test]
    fn test_invalid_column_is_rejected() {
        let mut criteria = Criteria::new();
        criteria.where_eq("name; DROP TABLE users", 1);

        let mut stmt = Statement::new("");
        assert!(render_predicates(&criteria.wheres, &mut stmt).is_err());
    }

    #[test]
    fn test_raw_placeholders_must_match_bindings() {
        let mut criteria = Criteria::new();
        criteria.where_raw("score BETWEEN ? AND ?", vec![Value::Int(1)]);

        let mut stmt = Statement::new("");
        let err = render_predicates(&criteria.wheres, &mut stmt).unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));
    }

    #[test]
    fn test_orders_and_paging() {
        let mut criteria = Criteria::new();
        criteria.order_by("name").order_by_desc("id").offset(20);

        let mut stmt = Statement::new("");
        render_orders(&criteria.orders, &mut stmt).unwrap();
        render_paging(&criteria, &mut stmt);

        assert_eq!(
            stmt.sql(),
            " ORDER BY \"name\" ASC, \"id\" DESC LIMIT -1 OFFSET ?"
        );
        assert_eq!(stmt.bindings(), &[Value::Int(20)]);
    }

    #[test]
    fn test_paging_saturates_at_i64_max() {
        let mut criteria = Criteria::new();
        criteria.limit(u64::MAX).offset(u64::MAX - 1);

        let mut stmt = Statement::new("");
        render_paging(&criteria, &mut stmt);

        assert_eq!(stmt.sql(), " LIMIT ? OFFSET ?");
        assert_eq!(
            stmt.bindings(),
            &[Value::Int(i64::MAX), Value::Int(i64::MAX)]
        );
    }
}
