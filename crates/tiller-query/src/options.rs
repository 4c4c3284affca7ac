//! Normalized query options.
//!
//! [`QueryOptions`] is the typed record a [`Query`](crate::Query) accumulates.
//! It is consumed once per statement by the SQL builder and the connection
//! engine.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tiller_common::Value;

use crate::where_tree::{Condition, SubQuery, WhereTree};

/// One item of the select list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldItem {
    /// A column with an optional alias.
    Column {
        /// Column name.
        name: String,
        /// Output alias.
        alias: Option<String>,
    },
    /// An expression emitted verbatim.
    Raw(String),
}

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
}

impl JoinKind {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// A join clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Join {
    /// Join flavour.
    pub kind: JoinKind,
    /// Joined table, optionally followed by an alias.
    pub table: String,
    /// `ON` condition.
    pub condition: String,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One item of the order list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OrderItem {
    /// A column with an optional direction.
    Column {
        /// Column name.
        field: String,
        /// Sort direction.
        direction: Option<Direction>,
    },
    /// An expression emitted verbatim.
    Raw(String),
}

/// Row window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limit {
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Rows to return.
    pub length: u64,
}

/// Source of a union member.
#[derive(Debug, Clone, Serialize)]
pub enum UnionSource {
    /// Raw SQL.
    Raw(String),
    /// Closure-built select.
    Sub(SubQuery),
}

/// A union member.
#[derive(Debug, Clone, Serialize)]
pub struct Union {
    /// `UNION ALL` rather than `UNION`.
    pub all: bool,
    /// The member select.
    pub source: UnionSource,
}

/// Value assigned to a column by INSERT or UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataValue {
    /// Plain value.
    Value(Value),
    /// `col = col + step`
    Inc(Value),
    /// `col = col - step`
    Dec(Value),
    /// SQL expression emitted verbatim.
    Exp(String),
}

/// Result cache request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSpec {
    /// Explicit key; derived when absent.
    pub key: Option<String>,
    /// Time to live; no expiry when absent.
    pub expire: Option<Duration>,
    /// Tag grouping the entry for bulk invalidation.
    pub tag: Option<String>,
}

/// Soft-delete predicate appended to every where clause.
#[derive(Debug, Clone, Serialize)]
pub struct SoftDelete(pub Condition);

/// The normalized options of one statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOptions {
    /// Tables; `__NAME__` references are prefixed at build time.
    pub table: Vec<String>,
    /// Table to alias mapping.
    pub alias: BTreeMap<String, String>,
    /// Select list; empty means `*`.
    pub field: Vec<FieldItem>,
    /// Expand every known column.
    pub field_all: bool,
    /// Columns removed from the expanded column list.
    pub except: Vec<String>,
    /// Where conditions.
    #[serde(rename = "where")]
    pub where_: WhereTree,
    /// Joins.
    pub join: Vec<Join>,
    /// `GROUP BY` expression.
    pub group: Option<String>,
    /// `HAVING` expression.
    pub having: Option<String>,
    /// Order list.
    pub order: Vec<OrderItem>,
    /// Row window.
    pub limit: Option<Limit>,
    /// Page number and size, resolved into `limit`.
    pub page: Option<(u64, u64)>,
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// Lock clause such as `FOR UPDATE`.
    pub lock: Option<String>,
    /// Union members.
    pub union: Vec<Union>,
    /// Write data in insertion order.
    pub data: Vec<(String, DataValue)>,
    /// Result cache request.
    pub cache: Option<CacheSpec>,
    /// Read from the master.
    pub master: bool,
    /// Return SQL instead of executing it.
    pub fetch_sql: bool,
    /// Soft-delete predicate.
    pub soft_delete: Option<SoftDelete>,
    /// SQL comment.
    pub comment: Option<String>,
    /// Forced index.
    pub force: Option<String>,
    /// Strict field checking; the connection default applies when unset.
    pub strict: Option<bool>,
    /// `REPLACE` instead of `INSERT`.
    pub replace: bool,
    /// Primary key override.
    pub pk: Option<Vec<String>>,
    /// User binds referenced by raw SQL or [`CondValue::Bind`](crate::CondValue::Bind).
    pub bind: Vec<(String, Value)>,
    /// Values of top-level AND equality conditions, keyed by field.
    pub eq_values: BTreeMap<String, Value>,
}

impl QueryOptions {
    /// Returns the first table, the one whose schema drives compilation.
    #[must_use]
    pub fn main_table(&self) -> Option<&str> {
        self.table.first().map(String::as_str)
    }

    /// Returns the write value of `column`, if set.
    #[must_use]
    pub fn data_value(&self, column: &str) -> Option<&DataValue> {
        self.data
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Returns true if any value still contains a closure.
    #[must_use]
    pub fn has_closure(&self) -> bool {
        serde_json::to_value(self).is_err()
    }
}
