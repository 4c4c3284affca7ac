//! Fluent query builder.
//!
//! Every setter normalizes its arguments into one canonical entry of the
//! where-tree or into one named slot of [`QueryOptions`] and returns the
//! builder by value for chaining.
//!
//! # Example
//!
//! ```rust
//! use tiller_query::Query;
//!
//! let query = Query::new()
//!     .table("user")
//!     .where_map([("status", 1)])
//!     .where_in("type", [1, 2, 3])
//!     .order("id", "desc")
//!     .page(2, 20);
//!
//! assert_eq!(query.options().where_.len(), 2);
//! ```

use std::mem;
use std::time::Duration;

use tiller_common::Value;

use crate::operator::Operator;
use crate::options::{
    CacheSpec, DataValue, Direction, FieldItem, Join, JoinKind, Limit, OrderItem, QueryOptions,
    SoftDelete, Union, UnionSource,
};
use crate::where_tree::{
    is_raw_field, CondValue, Condition, FieldRef, InvalidEntry, Logic, SubQuery,
};

/// A fluent, single-use query description.
#[derive(Debug, Clone, Default)]
pub struct Query {
    options: QueryOptions,
}

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accumulated options.
    #[must_use]
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Consumes the options, fills defaults and resets the builder.
    ///
    /// Unset strict mode takes `fields_strict`, an empty select list becomes
    /// `*` and a page request is resolved into an offset and length. Reading
    /// again afterwards yields the default record.
    pub fn parse_options(&mut self, fields_strict: bool) -> QueryOptions {
        let mut options = mem::take(&mut self.options);

        if options.strict.is_none() {
            options.strict = Some(fields_strict);
        }

        if let Some((page, size)) = options.page.take() {
            let page = page.max(1);
            options.limit = Some(Limit {
                offset: Some((page - 1) * size),
                length: size,
            });
        }

        if options.field.is_empty() && !options.field_all && options.except.is_empty() {
            options.field.push(FieldItem::Raw("*".to_string()));
        }

        options
    }

    fn push_where(mut self, logic: Logic, condition: Condition) -> Self {
        if logic == Logic::And {
            if let Condition::Expr {
                field: FieldRef::Column(field),
                op: Operator::Eq,
                value: CondValue::Value(value),
                ..
            } = &condition
            {
                self.options
                    .eq_values
                    .insert(field.clone(), value.clone());
            }
        }
        self.options.where_.push(logic, condition);
        self
    }

    fn push_expr(self, logic: Logic, field: &str, op: Operator, value: CondValue) -> Self {
        self.push_where(logic, Condition::expr(FieldRef::parse(field), op, value, None))
    }

    // =========================================================================
    // Where
    // =========================================================================

    /// Adds an AND condition.
    #[must_use]
    pub fn where_(self, field: &str, op: &str, value: impl Into<CondValue>) -> Self {
        self.push_where(Logic::And, Condition::triplet(field, op, value.into(), None))
    }

    /// Adds an AND equality condition.
    #[must_use]
    pub fn where_eq(self, field: &str, value: impl Into<CondValue>) -> Self {
        self.push_expr(Logic::And, field, Operator::Eq, value.into())
    }

    /// Adds one AND condition per pair: lists compile to `IN`, nulls to
    /// `IS NULL` and everything else to `=`.
    #[must_use]
    pub fn where_map<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<CondValue>,
    {
        for (field, value) in pairs {
            let value = value.into();
            let op = match &value {
                CondValue::List(_) => Operator::In,
                CondValue::Value(Value::Null) | CondValue::None => Operator::Null,
                _ => Operator::Eq,
            };
            self = self.push_expr(Logic::And, field.as_ref(), op, value);
        }
        self
    }

    /// Adds an OR condition.
    #[must_use]
    pub fn where_or(self, field: &str, op: &str, value: impl Into<CondValue>) -> Self {
        self.push_where(Logic::Or, Condition::triplet(field, op, value.into(), None))
    }

    /// Adds an XOR condition.
    #[must_use]
    pub fn where_xor(self, field: &str, op: &str, value: impl Into<CondValue>) -> Self {
        self.push_where(Logic::Xor, Condition::triplet(field, op, value.into(), None))
    }

    /// Adds an AND condition whose list elements are joined by `logic`.
    #[must_use]
    pub fn where_with(
        self,
        field: &str,
        op: &str,
        value: impl Into<CondValue>,
        logic: Logic,
    ) -> Self {
        self.push_where(
            Logic::And,
            Condition::triplet(field, op, value.into(), Some(logic)),
        )
    }

    /// Adds `field IN (...)`. Accepts lists, comma strings and subqueries.
    #[must_use]
    pub fn where_in(self, field: &str, values: impl Into<CondValue>) -> Self {
        self.push_expr(Logic::And, field, Operator::In, values.into())
    }

    /// Adds `field NOT IN (...)`.
    #[must_use]
    pub fn where_not_in(self, field: &str, values: impl Into<CondValue>) -> Self {
        self.push_expr(Logic::And, field, Operator::NotIn, values.into())
    }

    /// Adds `field BETWEEN a AND b`. Accepts a pair or a comma string.
    #[must_use]
    pub fn where_between(self, field: &str, range: impl Into<CondValue>) -> Self {
        self.push_expr(Logic::And, field, Operator::Between, range.into())
    }

    /// Adds `field NOT BETWEEN a AND b`.
    #[must_use]
    pub fn where_not_between(self, field: &str, range: impl Into<CondValue>) -> Self {
        self.push_expr(Logic::And, field, Operator::NotBetween, range.into())
    }

    /// Adds `field LIKE pattern`.
    #[must_use]
    pub fn where_like(self, field: &str, pattern: impl Into<CondValue>) -> Self {
        self.push_expr(Logic::And, field, Operator::Like, pattern.into())
    }

    /// Adds `field NOT LIKE pattern`.
    #[must_use]
    pub fn where_not_like(self, field: &str, pattern: impl Into<CondValue>) -> Self {
        self.push_expr(Logic::And, field, Operator::NotLike, pattern.into())
    }

    /// Adds `field IS NULL`.
    #[must_use]
    pub fn where_null(self, field: &str) -> Self {
        self.push_expr(Logic::And, field, Operator::Null, CondValue::None)
    }

    /// Adds `field IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(self, field: &str) -> Self {
        self.push_expr(Logic::And, field, Operator::NotNull, CondValue::None)
    }

    /// Adds `EXISTS ( ... )` from a subquery or raw SQL.
    #[must_use]
    pub fn where_exists(self, source: impl Into<CondValue>) -> Self {
        self.push_where(
            Logic::And,
            Condition::expr(
                FieldRef::Column(String::new()),
                Operator::Exists,
                source.into(),
                None,
            ),
        )
    }

    /// Adds `NOT EXISTS ( ... )`.
    #[must_use]
    pub fn where_not_exists(self, source: impl Into<CondValue>) -> Self {
        self.push_where(
            Logic::And,
            Condition::expr(
                FieldRef::Column(String::new()),
                Operator::NotExists,
                source.into(),
                None,
            ),
        )
    }

    /// Adds a raw SQL condition.
    #[must_use]
    pub fn where_raw(self, sql: impl Into<String>) -> Self {
        self.push_where(
            Logic::And,
            Condition::Raw {
                sql: sql.into(),
                binds: Vec::new(),
            },
        )
    }

    /// Adds a raw SQL condition with its own named binds.
    #[must_use]
    pub fn where_raw_bind<I, K, V>(self, sql: impl Into<String>, binds: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let binds = binds
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim_start_matches(':').to_string(), v.into()))
            .collect();
        self.push_where(
            Logic::And,
            Condition::Raw {
                sql: sql.into(),
                binds,
            },
        )
    }

    /// Compares two columns.
    #[must_use]
    pub fn where_column(self, field: &str, op: &str, other: &str) -> Self {
        let condition = match Operator::parse(op) {
            Some(op) => Condition::expr(
                FieldRef::parse(field),
                Operator::Column,
                CondValue::Column {
                    op,
                    column: other.to_string(),
                },
                None,
            ),
            None => Condition::Invalid(InvalidEntry::UnknownOperator(op.to_string())),
        };
        self.push_where(Logic::And, condition)
    }

    /// Appends a raw expression after the field.
    #[must_use]
    pub fn where_exp(self, field: &str, sql: impl Into<String>) -> Self {
        self.push_expr(Logic::And, field, Operator::Exp, CondValue::Raw(sql.into()))
    }

    /// Adds a time comparison; values are coerced through the column type.
    ///
    /// `op` is one of `> >= < <= between "not between"` or their time forms.
    #[must_use]
    pub fn where_time(self, field: &str, op: &str, value: impl Into<CondValue>) -> Self {
        let condition = match Operator::parse(op).and_then(Operator::to_time) {
            Some(op) => Condition::expr(FieldRef::parse(field), op, value.into(), None),
            None => Condition::Invalid(InvalidEntry::UnknownOperator(format!("{op} TIME"))),
        };
        self.push_where(Logic::And, condition)
    }

    /// Adds a parenthesized AND group built by the closure.
    #[must_use]
    pub fn where_group<F>(self, f: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.push_where(Logic::And, Condition::Group(SubQuery::new(f)))
    }

    /// Adds a parenthesized OR group built by the closure.
    #[must_use]
    pub fn where_or_group<F>(self, f: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.push_where(Logic::Or, Condition::Group(SubQuery::new(f)))
    }

    /// Adds several conditions on one field, joined by AND.
    #[must_use]
    pub fn where_multi<I, O>(self, field: &str, items: I) -> Self
    where
        I: IntoIterator<Item = (O, CondValue)>,
        O: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for (op, value) in items {
            match Operator::parse(op.as_ref()) {
                Some(op) => parsed.push((op, value)),
                None => {
                    let invalid = InvalidEntry::UnknownOperator(op.as_ref().to_string());
                    return self.push_where(Logic::And, Condition::Invalid(invalid));
                }
            }
        }
        if parsed.is_empty() {
            let invalid = InvalidEntry::Malformed(format!("no conditions for field '{field}'"));
            return self.push_where(Logic::And, Condition::Invalid(invalid));
        }
        self.push_where(
            Logic::And,
            Condition::Multi {
                field: FieldRef::parse(field),
                items: parsed,
            },
        )
    }

    // =========================================================================
    // Table and fields
    // =========================================================================

    /// Sets the table. Comma-separated names add several tables and a
    /// trailing word (`user u`, `user AS u`) sets the alias.
    #[must_use]
    pub fn table(mut self, table: &str) -> Self {
        for item in table.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let parts: Vec<&str> = item.split_whitespace().collect();
            let (name, alias) = match parts.as_slice() {
                [name, alias] => (*name, Some(*alias)),
                [name, kw, alias] if kw.eq_ignore_ascii_case("as") => (*name, Some(*alias)),
                _ => (item, None),
            };
            self.options.table.push(name.to_string());
            if let Some(alias) = alias {
                self.options
                    .alias
                    .insert(name.to_string(), alias.to_string());
            }
        }
        self
    }

    /// Sets the table by name; the configured prefix is applied at build time.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.options
            .table
            .push(format!("__{}__", name.to_ascii_uppercase()));
        self
    }

    /// Aliases the main table.
    #[must_use]
    pub fn alias(mut self, alias: &str) -> Self {
        let table = self.options.main_table().unwrap_or_default().to_string();
        self.options.alias.insert(table, alias.to_string());
        self
    }

    /// Adds a column or expression to the select list.
    #[must_use]
    pub fn field(mut self, field: &str) -> Self {
        let item = if is_raw_field(field) || field == "*" {
            FieldItem::Raw(field.to_string())
        } else {
            FieldItem::Column {
                name: field.to_string(),
                alias: None,
            }
        };
        self.options.field.push(item);
        self
    }

    /// Adds several columns to the select list.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in fields {
            self = self.field(field.as_ref());
        }
        self
    }

    /// Adds `column AS alias` to the select list.
    #[must_use]
    pub fn field_as(mut self, name: &str, alias: &str) -> Self {
        self.options.field.push(FieldItem::Column {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Selects every known column explicitly.
    #[must_use]
    pub fn field_all(mut self) -> Self {
        self.options.field_all = true;
        self
    }

    /// Selects every known column except these.
    #[must_use]
    pub fn except<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.options
            .except
            .extend(fields.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    // =========================================================================
    // Clauses
    // =========================================================================

    fn push_join(mut self, kind: JoinKind, table: &str, condition: &str) -> Self {
        self.options.join.push(Join {
            kind,
            table: table.to_string(),
            condition: condition.to_string(),
        });
        self
    }

    /// Adds an `INNER JOIN`.
    #[must_use]
    pub fn join(self, table: &str, condition: &str) -> Self {
        self.push_join(JoinKind::Inner, table, condition)
    }

    /// Adds a `LEFT JOIN`.
    #[must_use]
    pub fn left_join(self, table: &str, condition: &str) -> Self {
        self.push_join(JoinKind::Left, table, condition)
    }

    /// Adds a `RIGHT JOIN`.
    #[must_use]
    pub fn right_join(self, table: &str, condition: &str) -> Self {
        self.push_join(JoinKind::Right, table, condition)
    }

    /// Adds a `UNION` member.
    #[must_use]
    pub fn union(mut self, source: impl Into<UnionSource>) -> Self {
        self.options.union.push(Union {
            all: false,
            source: source.into(),
        });
        self
    }

    /// Adds a `UNION ALL` member.
    #[must_use]
    pub fn union_all(mut self, source: impl Into<UnionSource>) -> Self {
        self.options.union.push(Union {
            all: true,
            source: source.into(),
        });
        self
    }

    /// Adds an order item; `direction` is `asc`, `desc` or empty.
    #[must_use]
    pub fn order(mut self, field: &str, direction: &str) -> Self {
        let parsed = match direction.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        };
        let item = if is_raw_field(field) {
            let dir = direction.trim();
            if dir.is_empty() {
                OrderItem::Raw(field.to_string())
            } else {
                OrderItem::Raw(format!("{field} {dir}"))
            }
        } else {
            OrderItem::Column {
                field: field.to_string(),
                direction: parsed,
            }
        };
        self.options.order.push(item);
        self
    }

    /// Adds a raw order expression.
    #[must_use]
    pub fn order_raw(mut self, sql: &str) -> Self {
        self.options.order.push(OrderItem::Raw(sql.to_string()));
        self
    }

    /// Limits the number of rows.
    #[must_use]
    pub fn limit(mut self, length: u64) -> Self {
        self.options.limit = Some(Limit {
            offset: None,
            length,
        });
        self
    }

    /// Skips `offset` rows and returns at most `length`.
    #[must_use]
    pub fn limit_offset(mut self, offset: u64, length: u64) -> Self {
        self.options.limit = Some(Limit {
            offset: Some(offset),
            length,
        });
        self
    }

    /// Requests page `page` (1-based) of `size` rows.
    #[must_use]
    pub fn page(mut self, page: u64, size: u64) -> Self {
        self.options.page = Some((page, size));
        self
    }

    /// Sets `GROUP BY`.
    #[must_use]
    pub fn group(mut self, group: &str) -> Self {
        self.options.group = Some(group.to_string());
        self
    }

    /// Sets `HAVING`.
    #[must_use]
    pub fn having(mut self, having: &str) -> Self {
        self.options.having = Some(having.to_string());
        self
    }

    /// Toggles `SELECT DISTINCT`.
    #[must_use]
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.options.distinct = distinct;
        self
    }

    /// Toggles `FOR UPDATE`.
    #[must_use]
    pub fn lock(mut self, lock: bool) -> Self {
        self.options.lock = lock.then(|| "FOR UPDATE".to_string());
        self
    }

    /// Sets a custom lock clause.
    #[must_use]
    pub fn lock_with(mut self, clause: &str) -> Self {
        self.options.lock = Some(clause.to_string());
        self
    }

    /// Caches the result under a derived key.
    #[must_use]
    pub fn cache(mut self, expire: Option<Duration>) -> Self {
        let spec = self.options.cache.get_or_insert_with(CacheSpec::default);
        spec.expire = expire;
        self
    }

    /// Caches the result under an explicit key.
    #[must_use]
    pub fn cache_key(mut self, key: &str, expire: Option<Duration>) -> Self {
        let spec = self.options.cache.get_or_insert_with(CacheSpec::default);
        spec.key = Some(key.to_string());
        spec.expire = expire;
        self
    }

    /// Tags the cached result.
    #[must_use]
    pub fn cache_tag(mut self, tag: &str) -> Self {
        let spec = self.options.cache.get_or_insert_with(CacheSpec::default);
        spec.tag = Some(tag.to_string());
        self
    }

    /// Forces reads to the master.
    #[must_use]
    pub fn master(mut self, master: bool) -> Self {
        self.options.master = master;
        self
    }

    /// Overrides strict field checking.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = Some(strict);
        self
    }

    /// Adds an SQL comment.
    #[must_use]
    pub fn comment(mut self, comment: &str) -> Self {
        self.options.comment = Some(comment.to_string());
        self
    }

    /// Forces an index.
    #[must_use]
    pub fn force(mut self, index: &str) -> Self {
        self.options.force = Some(index.to_string());
        self
    }

    /// Returns the SQL instead of executing it.
    #[must_use]
    pub fn fetch_sql(mut self, fetch: bool) -> Self {
        self.options.fetch_sql = fetch;
        self
    }

    /// Appends a soft-delete predicate to every where clause.
    #[must_use]
    pub fn soft_delete(mut self, field: &str, op: &str, value: impl Into<CondValue>) -> Self {
        self.options.soft_delete =
            Some(SoftDelete(Condition::triplet(field, op, value.into(), None)));
        self
    }

    /// Overrides the primary key; composite keys are comma-separated.
    #[must_use]
    pub fn pk(mut self, pk: &str) -> Self {
        let fields: Vec<String> = pk
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.options.pk = (!fields.is_empty()).then_some(fields);
        self
    }

    /// Uses `REPLACE` instead of `INSERT`.
    #[must_use]
    pub fn replace(mut self, replace: bool) -> Self {
        self.options.replace = replace;
        self
    }

    // =========================================================================
    // Data
    // =========================================================================

    fn push_data(mut self, field: &str, value: DataValue) -> Self {
        match self.options.data.iter_mut().find(|(name, _)| name == field) {
            Some((_, existing)) => *existing = value,
            None => self.options.data.push((field.to_string(), value)),
        }
        self
    }

    /// Sets several write values.
    #[must_use]
    pub fn data<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (field, value) in pairs {
            self = self.push_data(field.as_ref(), DataValue::Value(value.into()));
        }
        self
    }

    /// Sets one write value.
    #[must_use]
    pub fn set(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_data(field, DataValue::Value(value.into()))
    }

    /// Increments a column by `step`.
    #[must_use]
    pub fn inc(self, field: &str, step: impl Into<Value>) -> Self {
        self.push_data(field, DataValue::Inc(step.into()))
    }

    /// Decrements a column by `step`.
    #[must_use]
    pub fn dec(self, field: &str, step: impl Into<Value>) -> Self {
        self.push_data(field, DataValue::Dec(step.into()))
    }

    /// Assigns a raw SQL expression to a column.
    #[must_use]
    pub fn exp(self, field: &str, sql: &str) -> Self {
        self.push_data(field, DataValue::Exp(sql.to_string()))
    }

    /// Binds a named parameter referenced by raw SQL or [`CondValue::bind`].
    ///
    /// Numeric names bind positional `?` parameters.
    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.options
            .bind
            .push((name.trim_start_matches(':').to_string(), value.into()));
        self
    }
}

impl From<&str> for UnionSource {
    fn from(sql: &str) -> Self {
        UnionSource::Raw(sql.to_string())
    }
}

impl From<String> for UnionSource {
    fn from(sql: String) -> Self {
        UnionSource::Raw(sql)
    }
}

impl From<SubQuery> for UnionSource {
    fn from(q: SubQuery) -> Self {
        UnionSource::Sub(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_resets_builder() {
        let mut query = Query::new().table("user").where_eq("id", 1).page(3, 10);
        let options = query.parse_options(true);

        assert_eq!(options.table, vec!["user".to_string()]);
        assert_eq!(
            options.limit,
            Some(Limit {
                offset: Some(20),
                length: 10
            })
        );
        assert_eq!(options.field, vec![FieldItem::Raw("*".to_string())]);
        assert_eq!(options.strict, Some(true));

        let again = query.parse_options(false);
        assert!(again.table.is_empty());
        assert!(again.where_.is_empty());
        assert_eq!(again.strict, Some(false));
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let mut query = Query::new().page(0, 15);
        let options = query.parse_options(true);
        assert_eq!(options.limit.and_then(|l| l.offset), Some(0));
    }

    #[test]
    fn test_eq_values_captured_for_and_only() {
        let query = Query::new()
            .where_eq("id", 5)
            .where_or("name", "=", "x")
            .where_("age", ">", 3);
        let eq = &query.options().eq_values;
        assert_eq!(eq.get("id"), Some(&Value::Int(5)));
        assert!(!eq.contains_key("name"));
        assert!(!eq.contains_key("age"));
    }

    #[test]
    fn test_table_alias_parsing() {
        let query = Query::new().table("user u, profile AS p");
        let options = query.options();
        assert_eq!(options.table, vec!["user".to_string(), "profile".to_string()]);
        assert_eq!(options.alias.get("user").map(String::as_str), Some("u"));
        assert_eq!(options.alias.get("profile").map(String::as_str), Some("p"));
    }

    #[test]
    fn test_name_marks_prefixed_table() {
        let query = Query::new().name("user_info");
        assert_eq!(query.options().main_table(), Some("__USER_INFO__"));
    }

    #[test]
    fn test_raw_field_and_order() {
        let query = Query::new()
            .field("COUNT(*) AS total")
            .field("id")
            .order("FIELD(id, 3, 1)", "")
            .order("id", "DESC");
        let options = query.options();
        assert_eq!(options.field[0], FieldItem::Raw("COUNT(*) AS total".to_string()));
        assert_eq!(options.order[0], OrderItem::Raw("FIELD(id, 3, 1)".to_string()));
        assert_eq!(
            options.order[1],
            OrderItem::Column {
                field: "id".to_string(),
                direction: Some(Direction::Desc)
            }
        );
    }

    #[test]
    fn test_data_replaces_existing_column() {
        let query = Query::new().set("name", "a").inc("hits", 1).set("name", "b");
        let data = &query.options().data;
        assert_eq!(data.len(), 2);
        assert_eq!(data[0], ("name".to_string(), DataValue::Value(Value::from("b"))));
    }

    #[test]
    fn test_where_time_rejects_non_range_operator() {
        let query = Query::new().where_time("created_at", "like", "2024");
        let (_, entries) = &query.options().where_.buckets()[0];
        assert!(matches!(entries[0], Condition::Invalid(_)));
    }

    #[test]
    fn test_cache_spec() {
        let query = Query::new()
            .cache_key("hot", Some(Duration::from_secs(60)))
            .cache_tag("user");
        let spec = query.options().cache.clone().unwrap();
        assert_eq!(spec.key.as_deref(), Some("hot"));
        assert_eq!(spec.tag.as_deref(), Some("user"));
    }
}
