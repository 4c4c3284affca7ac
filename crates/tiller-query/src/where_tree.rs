//! The where-tree.
//!
//! Conditions are grouped into buckets keyed by their logic keyword. Buckets
//! keep the order in which they were first populated and entries keep their
//! insertion order, so compiled output follows the order of the setter calls.

use std::fmt;
use std::sync::Arc;

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use tiller_common::Value;

use crate::operator::Operator;
use crate::query::Query;

/// Logic keyword joining conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Logic {
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `XOR`
    Xor,
}

impl Logic {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
            Logic::Xor => "XOR",
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Closure building a nested query.
pub type QueryFn = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// A closure-built sub-builder.
///
/// Applied to a fresh [`Query`] when the enclosing statement is compiled.
/// Sub-builders cannot be serialized, so cache keys cannot be derived from
/// options holding one.
#[derive(Clone)]
pub struct SubQuery(QueryFn);

impl SubQuery {
    /// Wraps a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Applies the closure to a fresh query.
    #[must_use]
    pub fn build(&self) -> Query {
        (self.0)(Query::new())
    }
}

impl fmt::Debug for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubQuery(..)")
    }
}

impl Serialize for SubQuery {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom("closure cannot be serialized"))
    }
}

/// Left-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldRef {
    /// A column name, possibly a `|` or `&` macro over several columns.
    Column(String),
    /// An expression emitted verbatim.
    Raw(String),
}

impl FieldRef {
    /// Classifies a field string.
    ///
    /// Strings containing `, = < > ' " (` or whitespace are expressions.
    #[must_use]
    pub fn parse(field: &str) -> Self {
        if is_raw_field(field) {
            FieldRef::Raw(field.to_string())
        } else {
            FieldRef::Column(field.to_string())
        }
    }

    /// Returns the field text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            FieldRef::Column(s) | FieldRef::Raw(s) => s,
        }
    }
}

/// Returns true if the string is an expression rather than an identifier.
#[must_use]
pub fn is_raw_field(field: &str) -> bool {
    field
        .chars()
        .any(|c| matches!(c, ',' | '=' | '<' | '>' | '\'' | '"' | '(') || c.is_whitespace())
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, Serialize)]
pub enum CondValue {
    /// No value, as for `IS NULL`.
    None,
    /// A single value.
    Value(Value),
    /// A list of values.
    List(Vec<Value>),
    /// Another column, compared with the given operator.
    Column {
        /// Comparison operator.
        op: Operator,
        /// Right-hand column.
        column: String,
    },
    /// SQL emitted verbatim.
    Raw(String),
    /// A closure-built subquery.
    Sub(SubQuery),
    /// Reference to a placeholder bound with [`Query::bind`].
    Bind(String),
}

impl CondValue {
    /// Builds a subquery value.
    pub fn query<F>(f: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        CondValue::Sub(SubQuery::new(f))
    }

    /// Builds a raw SQL value.
    pub fn raw(sql: impl Into<String>) -> Self {
        CondValue::Raw(sql.into())
    }

    /// References a user-bound placeholder by name, with or without `:`.
    pub fn bind(name: impl AsRef<str>) -> Self {
        CondValue::Bind(name.as_ref().trim_start_matches(':').to_string())
    }

    /// Builds a list value.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        CondValue::List(values.into_iter().map(Into::into).collect())
    }

    /// Returns the scalar value, if any.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            CondValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! cond_value_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for CondValue {
                fn from(v: $t) -> Self {
                    CondValue::Value(Value::from(v))
                }
            }

            impl From<Vec<$t>> for CondValue {
                fn from(v: Vec<$t>) -> Self {
                    CondValue::List(v.into_iter().map(Value::from).collect())
                }
            }

            impl<const N: usize> From<[$t; N]> for CondValue {
                fn from(v: [$t; N]) -> Self {
                    CondValue::List(v.into_iter().map(Value::from).collect())
                }
            }
        )*
    };
}

cond_value_from!(i32, i64, u32, u64, usize, f32, f64, bool, &str, String);

impl From<Value> for CondValue {
    fn from(v: Value) -> Self {
        CondValue::Value(v)
    }
}

impl From<Vec<Value>> for CondValue {
    fn from(v: Vec<Value>) -> Self {
        CondValue::List(v)
    }
}

impl From<SubQuery> for CondValue {
    fn from(q: SubQuery) -> Self {
        CondValue::Sub(q)
    }
}

/// Why a setter produced an invalid entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvalidEntry {
    /// The operator is not recognised.
    UnknownOperator(String),
    /// The entry is malformed.
    Malformed(String),
}

/// One entry of a where bucket.
#[derive(Debug, Clone, Serialize)]
pub enum Condition {
    /// Field, operator, value and optional logic combining list elements.
    Expr {
        /// Left-hand side.
        field: FieldRef,
        /// Operator.
        op: Operator,
        /// Right-hand side.
        value: CondValue,
        /// Logic joining the elements of a LIKE list.
        logic: Option<Logic>,
    },
    /// Several operator/value pairs sharing one field, joined by AND.
    Multi {
        /// Shared field.
        field: FieldRef,
        /// Operator/value pairs.
        items: Vec<(Operator, CondValue)>,
    },
    /// A closure-built nested group.
    Group(SubQuery),
    /// Raw SQL with its own named binds.
    Raw {
        /// SQL text.
        sql: String,
        /// Binds referenced by the SQL.
        binds: Vec<(String, Value)>,
    },
    /// Recorded by a setter that received malformed input.
    Invalid(InvalidEntry),
}

impl Condition {
    /// Normalizes a triplet into a condition entry.
    pub fn triplet(field: &str, op: &str, value: CondValue, logic: Option<Logic>) -> Self {
        let Some(op) = Operator::parse(op) else {
            return Condition::Invalid(InvalidEntry::UnknownOperator(op.to_string()));
        };
        Self::expr(FieldRef::parse(field), op, value, logic)
    }

    /// Builds an expression entry, adapting string values to the operator.
    #[must_use]
    pub fn expr(field: FieldRef, op: Operator, value: CondValue, logic: Option<Logic>) -> Self {
        let value = match (op, value) {
            (Operator::Column, CondValue::Value(Value::Str(column))) => CondValue::Column {
                op: Operator::Eq,
                column,
            },
            (Operator::Exp | Operator::Exists | Operator::NotExists, CondValue::Value(Value::Str(sql))) => {
                CondValue::Raw(sql)
            }
            (_, value) => value,
        };
        Condition::Expr {
            field,
            op,
            value,
            logic,
        }
    }
}

/// Ordered, logic-keyed condition buckets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WhereTree {
    buckets: Vec<(Logic, Vec<Condition>)>,
}

impl WhereTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a condition to the bucket of `logic`.
    pub fn push(&mut self, logic: Logic, condition: Condition) {
        match self.buckets.iter_mut().find(|(l, _)| *l == logic) {
            Some((_, entries)) => entries.push(condition),
            None => self.buckets.push((logic, vec![condition])),
        }
    }

    /// Returns the buckets in population order.
    #[must_use]
    pub fn buckets(&self) -> &[(Logic, Vec<Condition>)] {
        &self.buckets
    }

    /// Returns true if no condition has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|(_, entries)| entries.is_empty())
    }

    /// Returns the total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|(_, entries)| entries.len()).sum()
    }

    /// Returns true if any bucket other than AND holds entries.
    #[must_use]
    pub fn has_non_and(&self) -> bool {
        self.buckets
            .iter()
            .any(|(logic, entries)| *logic != Logic::And && !entries.is_empty())
    }
}
