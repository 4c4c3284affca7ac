//! Where-expression compiler.
//!
//! Lowers a [`WhereTree`] into one boolean SQL expression, binding every
//! value into the statement's shared [`BindTable`]. Compilation is
//! all-or-nothing: the first invalid entry aborts with a parse error and no
//! partial SQL is returned.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tiller_common::{BindType, TillerError, TillerResult, Value, WHERE_BIND_PREFIX};

use super::Builder;
use crate::bind::BindTable;
use crate::operator::{Operator, OperatorKind};
use crate::options::SoftDelete;
use crate::schema::TableSchema;
use crate::where_tree::{CondValue, Condition, FieldRef, InvalidEntry, Logic, SubQuery, WhereTree};

/// Derives a placeholder base name from a field.
///
/// `.` and `-` become `_`; a field with any other non-word character is
/// replaced by a stable hash.
#[must_use]
pub fn bind_base(prefix: &str, field: &str) -> String {
    let mapped: String = field
        .chars()
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .collect();
    if !mapped.is_empty() && mapped.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("{prefix}{mapped}")
    } else {
        let mut hasher = DefaultHasher::new();
        field.hash(&mut hasher);
        format!("{prefix}{:x}", hasher.finish())
    }
}

/// Compiles where-trees of one statement against a shared bind table.
pub(crate) struct WhereCompiler<'a> {
    builder: &'a Builder,
    schema: Option<&'a TableSchema>,
    binds: &'a mut BindTable,
}

impl<'a> WhereCompiler<'a> {
    pub(crate) fn new(
        builder: &'a Builder,
        schema: Option<&'a TableSchema>,
        binds: &'a mut BindTable,
    ) -> Self {
        Self {
            builder,
            schema,
            binds,
        }
    }

    /// Compiles the tree and appends the soft-delete predicate.
    pub(crate) fn compile(
        &mut self,
        tree: &WhereTree,
        soft_delete: Option<&SoftDelete>,
    ) -> TillerResult<String> {
        let mut expr = self.compile_tree(tree)?;

        if let Some(SoftDelete(condition)) = soft_delete {
            if let Some(predicate) = self.compile_entry(condition)? {
                if expr.is_empty() {
                    expr = predicate;
                } else if tree.has_non_and() {
                    expr = format!("( {expr} ) AND {predicate}");
                } else {
                    expr = format!("{expr} AND {predicate}");
                }
            }
        }

        Ok(expr)
    }

    // =========================================================================
    // Group level
    // =========================================================================

    fn compile_tree(&mut self, tree: &WhereTree) -> TillerResult<String> {
        let mut out = String::new();
        for (logic, entries) in tree.buckets() {
            for entry in entries {
                let Some(fragment) = self.compile_entry(entry)? else {
                    continue;
                };
                if !out.is_empty() {
                    out.push(' ');
                    out.push_str(logic.as_sql());
                    out.push(' ');
                }
                out.push_str(&fragment);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Entry level
    // =========================================================================

    fn compile_entry(&mut self, entry: &Condition) -> TillerResult<Option<String>> {
        match entry {
            Condition::Invalid(InvalidEntry::UnknownOperator(op)) => {
                Err(TillerError::UnknownOperator {
                    operator: op.clone(),
                })
            }
            Condition::Invalid(InvalidEntry::Malformed(message)) => {
                Err(TillerError::invalid_condition(message.clone()))
            }
            Condition::Group(sub) => {
                let query = sub.build();
                let options = query.options();
                self.builder.bind_user(&options.bind, self.binds)?;
                let inner = self.compile_tree(&options.where_)?;
                Ok((!inner.is_empty()).then(|| format!("( {inner} )")))
            }
            Condition::Multi { field, items } => {
                let mut parts = Vec::with_capacity(items.len());
                for (op, value) in items {
                    parts.push(self.compile_field(field, *op, value, None)?);
                }
                Ok(Some(format!("( {} )", parts.join(" AND "))))
            }
            Condition::Raw { sql, binds } => {
                for (name, value) in binds {
                    self.binds.insert(name, value.clone(), value.bind_type())?;
                }
                Ok(Some(format!("( {sql} )")))
            }
            Condition::Expr {
                field,
                op,
                value,
                logic,
            } => self.compile_field(field, *op, value, *logic).map(Some),
        }
    }

    fn compile_field(
        &mut self,
        field: &FieldRef,
        op: Operator,
        value: &CondValue,
        logic: Option<Logic>,
    ) -> TillerResult<String> {
        if op.kind() == OperatorKind::Exists {
            return self.parse_exists(op, value);
        }

        match field {
            FieldRef::Raw(expr) => self.compile_item(expr, expr, op, value, logic),
            FieldRef::Column(name) if name.contains('|') => {
                self.expand(name, '|', Logic::Or, op, value, logic)
            }
            FieldRef::Column(name) if name.contains('&') => {
                self.expand(name, '&', Logic::And, op, value, logic)
            }
            FieldRef::Column(name) => {
                let key = self.builder.dialect().parse_key(name);
                self.compile_item(name, &key, op, value, logic)
            }
        }
    }

    fn expand(
        &mut self,
        fields: &str,
        separator: char,
        join: Logic,
        op: Operator,
        value: &CondValue,
        logic: Option<Logic>,
    ) -> TillerResult<String> {
        let mut parts = Vec::new();
        for name in fields.split(separator).map(str::trim).filter(|s| !s.is_empty()) {
            let key = self.builder.dialect().parse_key(name);
            parts.push(self.compile_item(name, &key, op, value, logic)?);
        }
        let glue = format!(" {join} ");
        Ok(format!("( {} )", parts.join(&glue)))
    }

    fn compile_item(
        &mut self,
        field: &str,
        key: &str,
        op: Operator,
        value: &CondValue,
        logic: Option<Logic>,
    ) -> TillerResult<String> {
        match op.kind() {
            OperatorKind::Comparison => self.parse_compare(field, key, op, value),
            OperatorKind::Like => self.parse_like(field, key, op, value, logic),
            OperatorKind::Null => Ok(format!("{key} {op}")),
            OperatorKind::In => self.parse_in(field, key, op, value),
            OperatorKind::Between => self.parse_between(field, key, op, value),
            OperatorKind::Exists => self.parse_exists(op, value),
            OperatorKind::Column => self.parse_column(key, value),
            OperatorKind::Exp => self.parse_exp(key, value),
            OperatorKind::Time => self.parse_time(field, key, op, value),
        }
    }

    // =========================================================================
    // Operator handlers
    // =========================================================================

    fn parse_compare(
        &mut self,
        field: &str,
        key: &str,
        op: Operator,
        value: &CondValue,
    ) -> TillerResult<String> {
        match value {
            CondValue::Value(v) => {
                let name = self.bind(field, &bind_base(WHERE_BIND_PREFIX, field), v.clone());
                Ok(format!("{key} {op} :{name}"))
            }
            CondValue::Bind(name) => {
                if self.binds.contains(name) {
                    Ok(format!("{key} {op} :{name}"))
                } else {
                    Err(TillerError::invalid_condition(format!(
                        "placeholder ':{name}' is not bound"
                    )))
                }
            }
            CondValue::Sub(sub) => {
                let sql = self.subquery(sub)?;
                Ok(format!("{key} {op} ( {sql} )"))
            }
            CondValue::Raw(sql) => Ok(format!("{key} {op} {sql}")),
            _ => Err(TillerError::invalid_condition(format!(
                "'{field} {op}' needs a scalar value"
            ))),
        }
    }

    fn parse_like(
        &mut self,
        field: &str,
        key: &str,
        op: Operator,
        value: &CondValue,
        logic: Option<Logic>,
    ) -> TillerResult<String> {
        let patterns = match value {
            CondValue::Value(v) => vec![v.clone()],
            CondValue::List(vs) if !vs.is_empty() => vs.clone(),
            _ => {
                return Err(TillerError::invalid_condition(format!(
                    "'{field} {op}' needs a pattern"
                )))
            }
        };

        let base = bind_base(WHERE_BIND_PREFIX, field);
        let parts: Vec<String> = patterns
            .into_iter()
            .map(|pattern| {
                let name = self.bind(field, &base, pattern);
                format!("{key} {op} :{name}")
            })
            .collect();

        if parts.len() == 1 {
            return Ok(parts.into_iter().collect());
        }
        let glue = format!(" {} ", logic.unwrap_or(Logic::And));
        Ok(format!("( {} )", parts.join(&glue)))
    }

    fn parse_in(
        &mut self,
        field: &str,
        key: &str,
        op: Operator,
        value: &CondValue,
    ) -> TillerResult<String> {
        let values = match value {
            CondValue::Sub(sub) => {
                let sql = self.subquery(sub)?;
                return Ok(format!("{key} {op} ( {sql} )"));
            }
            CondValue::Raw(sql) => return Ok(format!("{key} {op} ( {sql} )")),
            CondValue::List(vs) => vs.clone(),
            CondValue::Value(Value::Str(s)) => split_list(s),
            CondValue::Value(v) => vec![v.clone()],
            _ => {
                return Err(TillerError::invalid_condition(format!(
                    "'{field} {op}' needs a list"
                )))
            }
        };

        let mut unique: Vec<Value> = Vec::with_capacity(values.len());
        for v in values {
            if !unique.contains(&v) {
                unique.push(v);
            }
        }

        if unique.is_empty() {
            return Ok(format!("{key} {op} ('')"));
        }

        let base = bind_base(WHERE_BIND_PREFIX, field);
        let names: Vec<String> = unique
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let name = self.bind(field, &format!("{base}_in_{}", i + 1), v);
                format!(":{name}")
            })
            .collect();
        Ok(format!("{key} {op} ({})", names.join(",")))
    }

    fn parse_between(
        &mut self,
        field: &str,
        key: &str,
        op: Operator,
        value: &CondValue,
    ) -> TillerResult<String> {
        let (low, high) = range_pair(field, op, value)?;
        let (low, high) = self.bind_range(field, low, high);
        Ok(format!("{key} {op} :{low} AND :{high}"))
    }

    fn parse_exists(&mut self, op: Operator, value: &CondValue) -> TillerResult<String> {
        match value {
            CondValue::Sub(sub) => {
                let sql = self.subquery(sub)?;
                Ok(format!("{op} ( {sql} )"))
            }
            CondValue::Raw(sql) => Ok(format!("{op} ( {sql} )")),
            _ => Err(TillerError::invalid_condition(format!(
                "{op} needs a subquery"
            ))),
        }
    }

    fn parse_column(&mut self, key: &str, value: &CondValue) -> TillerResult<String> {
        match value {
            CondValue::Column { op, column } if op.kind() == OperatorKind::Comparison => {
                let other = self.builder.dialect().parse_key(column);
                Ok(format!("{key} {op} {other}"))
            }
            CondValue::Column { op, .. } => Err(TillerError::invalid_condition(format!(
                "column comparison needs a comparison operator, got '{op}'"
            ))),
            _ => Err(TillerError::invalid_condition(format!(
                "column comparison on '{key}' needs a column"
            ))),
        }
    }

    fn parse_exp(&mut self, key: &str, value: &CondValue) -> TillerResult<String> {
        match value {
            CondValue::Raw(sql) => Ok(format!("( {key} {sql} )")),
            _ => Err(TillerError::invalid_condition(format!(
                "expression on '{key}' needs raw SQL"
            ))),
        }
    }

    fn parse_time(
        &mut self,
        field: &str,
        key: &str,
        op: Operator,
        value: &CondValue,
    ) -> TillerResult<String> {
        if op.is_time_range() {
            let (low, high) = range_pair(field, op, value)?;
            let low = self.coerce_time(field, &low)?;
            let high = self.coerce_time(field, &high)?;
            let (low, high) = self.bind_range(field, low, high);
            return Ok(format!("{key} {op} :{low} AND :{high}"));
        }

        match value {
            CondValue::Value(v) => {
                let v = self.coerce_time(field, v)?;
                let name = self.bind(field, &bind_base(WHERE_BIND_PREFIX, field), v);
                Ok(format!("{key} {op} :{name}"))
            }
            _ => Err(TillerError::invalid_condition(format!(
                "'{field} {op}' needs a time value"
            ))),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn bind(&mut self, field: &str, base: &str, value: Value) -> String {
        let bind_type = self
            .schema
            .and_then(|s| s.bind_type(field))
            .unwrap_or_else(|| value.bind_type());
        self.binds.bind(base, value, bind_type)
    }

    fn bind_range(&mut self, field: &str, low: Value, high: Value) -> (String, String) {
        let base = bind_base(WHERE_BIND_PREFIX, field);
        let low = self.bind(field, &format!("{base}_between_1"), low);
        let high = self.bind(field, &format!("{base}_between_2"), high);
        (low, high)
    }

    fn subquery(&mut self, sub: &SubQuery) -> TillerResult<String> {
        self.builder.compile_subquery(sub, self.binds)
    }

    /// Coerces a time value through the column's declared SQL type.
    fn coerce_time(&self, field: &str, value: &Value) -> TillerResult<Value> {
        let Some(sql_type) = self.schema.and_then(|s| s.sql_type(field)) else {
            return Ok(value.clone());
        };
        let lower = sql_type.to_ascii_lowercase();
        let time = parse_time(value).ok_or_else(|| {
            TillerError::invalid_condition(format!("'{value}' is not a valid time for '{field}'"))
        })?;

        let coerced = if lower.starts_with("datetime") || lower.starts_with("timestamp") {
            Value::Str(time.format("%Y-%m-%d %H:%M:%S").to_string())
        } else if lower.starts_with("date") {
            Value::Str(time.format("%Y-%m-%d").to_string())
        } else if BindType::from_sql_type(sql_type) == BindType::Int {
            Value::Int(time.and_utc().timestamp())
        } else {
            value.clone()
        };
        Ok(coerced)
    }
}

fn split_list(s: &str) -> Vec<Value> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(Value::from)
        .collect()
}

fn range_pair(field: &str, op: Operator, value: &CondValue) -> TillerResult<(Value, Value)> {
    let values = match value {
        CondValue::List(vs) => vs.clone(),
        CondValue::Value(Value::Str(s)) => split_list(s),
        _ => Vec::new(),
    };
    match <[Value; 2]>::try_from(values) {
        Ok([low, high]) => Ok((low, high)),
        Err(_) => Err(TillerError::invalid_condition(format!(
            "'{field} {op}' needs exactly two values"
        ))),
    }
}

/// Parses a time from a unix timestamp or a date/datetime string.
fn parse_time(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Int(secs) => DateTime::from_timestamp(*secs, 0).map(|t| t.naive_utc()),
        Value::Str(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return DateTime::from_timestamp(secs, 0).map(|t| t.naive_utc());
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
                if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(t);
                }
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0);
            }
            DateTime::parse_from_rfc3339(s).ok().map(|t| t.naive_utc())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MysqlDialect;
    use crate::query::Query;
    use crate::schema::ColumnInfo;
    use std::sync::Arc;

    fn compile(query: &Query) -> TillerResult<(String, BindTable)> {
        compile_with(query, None)
    }

    fn compile_with(query: &Query, schema: Option<&TableSchema>) -> TillerResult<(String, BindTable)> {
        let builder = Builder::new(Arc::new(MysqlDialect));
        let mut binds = BindTable::new();
        let options = query.options();
        let sql = WhereCompiler::new(&builder, schema, &mut binds)
            .compile(&options.where_, options.soft_delete.as_ref())?;
        Ok((sql, binds))
    }

    #[test]
    fn test_bind_base() {
        assert_eq!(bind_base("where_", "status"), "where_status");
        assert_eq!(bind_base("where_", "u.user-id"), "where_u_user_id");
        let hashed = bind_base("where_", "LENGTH(name)");
        assert!(hashed.starts_with("where_"));
        assert_eq!(hashed, bind_base("where_", "LENGTH(name)"));
        assert!(hashed[6..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_map_then_in() {
        let query = Query::new()
            .where_map([("status", 1)])
            .where_in("type", [1, 2, 3]);
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(
            sql,
            "status = :where_status AND type IN (:where_type_in_1,:where_type_in_2,:where_type_in_3)"
        );
        assert_eq!(binds.len(), 4);
        assert_eq!(binds.get("where_type_in_3").unwrap().value, Value::Int(3));
    }

    #[test]
    fn test_between() {
        let query = Query::new().where_between("age", [18, 65]);
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(sql, "age BETWEEN :where_age_between_1 AND :where_age_between_2");
        assert_eq!(binds.get("where_age_between_1").unwrap().value, Value::Int(18));
        assert_eq!(binds.get("where_age_between_2").unwrap().value, Value::Int(65));
    }

    #[test]
    fn test_between_from_comma_string() {
        let query = Query::new().where_not_between("score", "10, 20");
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(
            sql,
            "score NOT BETWEEN :where_score_between_1 AND :where_score_between_2"
        );
        assert_eq!(binds.get("where_score_between_2").unwrap().value, Value::from("20"));
    }

    #[test]
    fn test_between_arity_error() {
        let query = Query::new().where_between("age", [1, 2, 3]);
        let err = compile(&query).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_or_reuses_field_with_distinct_names() {
        let query = Query::new()
            .where_("name", "=", "a")
            .where_or("name", "=", "b");
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(sql, "name = :where_name OR name = :where_name_1");
        assert_eq!(binds.get("where_name_1").unwrap().value, Value::from("b"));
    }

    #[test]
    fn test_empty_in_is_always_false() {
        let query = Query::new().where_in("id", Vec::<i32>::new());
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(sql, "id IN ('')");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_in_dedupes_and_splits() {
        let query = Query::new().where_not_in("id", "3,1,3, 2");
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(
            sql,
            "id NOT IN (:where_id_in_1,:where_id_in_2,:where_id_in_3)"
        );
        assert_eq!(binds.get("where_id_in_2").unwrap().value, Value::from("1"));
    }

    #[test]
    fn test_in_subquery_shares_bind_table() {
        let query = Query::new().where_eq("status", 1).where_in(
            "user_id",
            CondValue::query(|q| q.table("orders").field("user_id").where_eq("status", 2)),
        );
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(
            sql,
            "status = :where_status AND user_id IN ( SELECT user_id FROM orders WHERE status = :where_status_1 )"
        );
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_pipe_and_ampersand_expansion() {
        let query = Query::new()
            .where_like("name|title", "%rust%")
            .where_("a&b", ">", 0);
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(
            sql,
            "( name LIKE :where_name OR title LIKE :where_title ) AND ( a > :where_a AND b > :where_b )"
        );
    }

    #[test]
    fn test_like_list_with_logic() {
        let query = Query::new().where_with("name", "like", ["a%", "b%"], Logic::Or);
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(sql, "( name LIKE :where_name OR name LIKE :where_name_1 )");
    }

    #[test]
    fn test_null_and_exists() {
        let query = Query::new()
            .where_null("deleted_at")
            .where_not_null("email")
            .where_exists("SELECT 1 FROM t");
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(
            sql,
            "deleted_at IS NULL AND email IS NOT NULL AND EXISTS ( SELECT 1 FROM t )"
        );
        assert!(binds.is_empty());
    }

    #[test]
    fn test_exists_without_subquery_fails() {
        let query = Query::new().where_("", "exists", 1);
        assert!(compile(&query).unwrap_err().is_parse_error());
    }

    #[test]
    fn test_group_and_or_group() {
        let query = Query::new()
            .where_eq("status", 1)
            .where_group(|q| q.where_eq("a", 1).where_or("b", "=", 2))
            .where_or_group(|q| q.where_eq("vip", 1));
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(
            sql,
            "status = :where_status AND ( a = :where_a OR b = :where_b ) OR ( vip = :where_vip )"
        );
    }

    #[test]
    fn test_xor_bucket_between_and_or() {
        let query = Query::new()
            .where_eq("a", 1)
            .where_xor("b", "=", 2)
            .where_or("c", "=", 3);
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(sql, "a = :where_a XOR b = :where_b OR c = :where_c");
        assert_eq!(binds.get("where_b").unwrap().value, Value::Int(2));

        let query = Query::new()
            .where_xor("x", "=", 1)
            .where_xor("y", ">", 2);
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(sql, "x = :where_x XOR y > :where_y");
    }

    #[test]
    fn test_empty_group_is_skipped() {
        let query = Query::new().where_group(|q| q).where_eq("id", 1);
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(sql, "id = :where_id");
    }

    #[test]
    fn test_multi_condition() {
        let query = Query::new().where_multi(
            "age",
            [(">", CondValue::from(18)), ("<", CondValue::from(65))],
        );
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(sql, "( age > :where_age AND age < :where_age_1 )");
    }

    #[test]
    fn test_column_and_exp() {
        let query = Query::new()
            .where_column("updated_at", ">", "created_at")
            .where_exp("score", "> bonus + 1");
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(sql, "updated_at > created_at AND ( score > bonus + 1 )");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_column_requires_comparison() {
        let query = Query::new().where_column("a", "like", "b");
        assert!(compile(&query).unwrap_err().is_parse_error());
    }

    #[test]
    fn test_raw_field_is_verbatim_with_hashed_bind() {
        let query = Query::new().where_("LENGTH(name)", ">", 3);
        let (sql, binds) = compile(&query).unwrap();
        let name = &binds.entries()[0].name;
        assert_eq!(sql, format!("LENGTH(name) > :{name}"));
        assert_ne!(name, "where_LENGTH(name)");
    }

    #[test]
    fn test_raw_condition_binds() {
        let query = Query::new().where_raw_bind("score > :min", [("min", 10)]);
        let (sql, binds) = compile(&query).unwrap();
        assert_eq!(sql, "( score > :min )");
        assert_eq!(binds.get("min").unwrap().value, Value::Int(10));
    }

    #[test]
    fn test_bind_reference() {
        let builder = Builder::new(Arc::new(MysqlDialect));
        let query = Query::new().where_("id", "=", CondValue::bind(":uid"));

        let mut binds = BindTable::new();
        let err = WhereCompiler::new(&builder, None, &mut binds)
            .compile(&query.options().where_, None)
            .unwrap_err();
        assert!(err.is_parse_error());

        let mut binds = BindTable::new();
        binds.insert("uid", 7.into(), BindType::Int).unwrap();
        let sql = WhereCompiler::new(&builder, None, &mut binds)
            .compile(&query.options().where_, None)
            .unwrap();
        assert_eq!(sql, "id = :uid");
    }

    #[test]
    fn test_unknown_operator_aborts() {
        let query = Query::new().where_eq("id", 1).where_("name", "regexp", "^a");
        let err = compile(&query).unwrap_err();
        assert!(matches!(err, TillerError::UnknownOperator { .. }));
    }

    #[test]
    fn test_soft_delete_wraps_non_and() {
        let query = Query::new()
            .where_eq("a", 1)
            .where_or("b", "=", 2)
            .soft_delete("delete_time", "null", CondValue::None);
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(sql, "( a = :where_a OR b = :where_b ) AND delete_time IS NULL");

        let query = Query::new().soft_delete("delete_time", "=", 0);
        let (sql, _) = compile(&query).unwrap();
        assert_eq!(sql, "delete_time = :where_delete_time");
    }

    #[test]
    fn test_time_coercion_through_schema() {
        let schema = TableSchema::from_columns(&[
            ColumnInfo::new("created_at", "datetime", false),
            ColumnInfo::new("birthday", "date", false),
            ColumnInfo::new("login_time", "int(10) unsigned", false),
        ]);
        let query = Query::new()
            .where_time("created_at", ">=", "2024-03-01")
            .where_time("birthday", "<", "2024-03-01 12:30:00")
            .where_time("login_time", "between", ["1970-01-01 00:01:00", "1970-01-02"]);
        let (sql, binds) = compile_with(&query, Some(&schema)).unwrap();

        assert_eq!(
            sql,
            "created_at >= :where_created_at AND birthday < :where_birthday \
             AND login_time BETWEEN :where_login_time_between_1 AND :where_login_time_between_2"
        );
        assert_eq!(
            binds.get("where_created_at").unwrap().value,
            Value::from("2024-03-01 00:00:00")
        );
        assert_eq!(binds.get("where_birthday").unwrap().value, Value::from("2024-03-01"));
        assert_eq!(binds.get("where_login_time_between_1").unwrap().value, Value::Int(60));
        assert_eq!(
            binds.get("where_login_time_between_2").unwrap().value,
            Value::Int(86_400)
        );
        assert_eq!(
            binds.get("where_login_time_between_2").unwrap().bind_type,
            BindType::Int
        );
    }

    #[test]
    fn test_schema_bind_type_wins() {
        let schema = TableSchema::from_columns(&[ColumnInfo::new("id", "bigint", true)]);
        let query = Query::new().where_eq("id", "42");
        let (_, binds) = compile_with(&query, Some(&schema)).unwrap();
        assert_eq!(binds.get("where_id").unwrap().bind_type, BindType::Int);
    }
}
