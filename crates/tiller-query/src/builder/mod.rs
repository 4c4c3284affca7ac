//! SQL builder.
//!
//! Fills statement templates by substituting compiled fragments for the
//! `%TOKEN%` markers. SELECT, UPDATE and DELETE share the where compiler;
//! row windows are rendered by the [`Dialect`].

mod where_expr;

use std::fmt::Write;
use std::sync::Arc;

use tiller_common::{BindType, Row, TillerError, TillerResult, Value, DATA_BIND_PREFIX};

use crate::bind::BindTable;
use crate::dialect::Dialect;
use crate::operator::Operator;
use crate::options::{DataValue, Direction, FieldItem, OrderItem, QueryOptions, UnionSource};
use crate::schema::TableSchema;
use crate::where_tree::{CondValue, Condition, FieldRef, Logic, SubQuery, WhereTree};

pub use where_expr::bind_base;
use where_expr::WhereCompiler;

const SELECT_SQL: &str = "SELECT%DISTINCT% %FIELD% FROM %TABLE%%FORCE%%JOIN%%WHERE%%GROUP%%HAVING%%UNION%%ORDER%%LIMIT%%LOCK%%COMMENT%";
const INSERT_SQL: &str = "%INSERT% INTO %TABLE% (%FIELD%) VALUES (%DATA%)%COMMENT%";
const INSERT_ALL_SQL: &str = "%INSERT% INTO %TABLE% (%FIELD%) %DATA%%COMMENT%";
const UPDATE_SQL: &str = "UPDATE %TABLE%%JOIN% SET %SET%%WHERE%%ORDER%%LIMIT%%LOCK%%COMMENT%";
const DELETE_SQL: &str = "DELETE FROM %TABLE%%JOIN%%WHERE%%ORDER%%LIMIT%%LOCK%%COMMENT%";

/// A compiled statement.
#[derive(Debug, Clone, Default)]
pub struct CompiledSql {
    /// SQL text with `:name` or `?` placeholders.
    pub sql: String,
    /// Placeholder values.
    pub binds: BindTable,
}

impl CompiledSql {
    /// Returns the SQL with every placeholder replaced by its literal.
    #[must_use]
    pub fn reconstruct(&self) -> String {
        self.binds.reconstruct(&self.sql)
    }
}

/// Compiles [`QueryOptions`] into SQL for one dialect.
#[derive(Debug, Clone)]
pub struct Builder {
    dialect: Arc<dyn Dialect>,
    prefix: String,
}

impl Builder {
    /// Creates a builder without a table prefix.
    #[must_use]
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            prefix: String::new(),
        }
    }

    /// Sets the prefix substituted for `__NAME__` table references.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Returns the main table with its `__NAME__` reference resolved.
    #[must_use]
    pub fn table_name(&self, options: &QueryOptions) -> Option<String> {
        options.main_table().map(|t| self.resolve_names(t))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Compiles a SELECT.
    pub fn select(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
    ) -> TillerResult<CompiledSql> {
        let mut binds = BindTable::new();
        self.bind_user(&options.bind, &mut binds)?;
        let sql = self.select_sql(options, schema, &mut binds)?;
        Ok(CompiledSql { sql, binds })
    }

    /// Compiles an INSERT, or a REPLACE when requested.
    pub fn insert(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
    ) -> TillerResult<CompiledSql> {
        let mut binds = BindTable::new();
        self.bind_user(&options.bind, &mut binds)?;

        let table = self.parse_table_plain(options)?;
        let data = self.parse_data(options, &options.data, schema, &mut binds, None)?;
        if data.is_empty() {
            return Err(TillerError::invalid_argument("no data to insert"));
        }

        let (fields, values): (Vec<String>, Vec<String>) = data.into_iter().unzip();
        let sql = fill(
            INSERT_SQL,
            &[
                ("%INSERT%", insert_keyword(options)),
                ("%TABLE%", table),
                ("%FIELD%", fields.join(",")),
                ("%DATA%", values.join(",")),
                ("%COMMENT%", self.parse_comment(options)),
            ],
        );
        Ok(CompiledSql { sql, binds })
    }

    /// Compiles a multi-row insert as `INSERT ... SELECT ... UNION ALL SELECT ...`.
    ///
    /// Columns come from the first row; rows lacking a column insert NULL.
    /// Every bind name carries the row index as a suffix.
    pub fn insert_all(
        &self,
        options: &QueryOptions,
        rows: &[Row],
        schema: Option<&TableSchema>,
    ) -> TillerResult<CompiledSql> {
        let Some(first) = rows.first() else {
            return Err(TillerError::invalid_argument("no data to insert"));
        };

        let mut binds = BindTable::new();
        self.bind_user(&options.bind, &mut binds)?;
        let table = self.parse_table_plain(options)?;

        let mut columns = Vec::new();
        for column in first.columns() {
            if self.check_field(options, schema, column)? {
                columns.push(column.clone());
            }
        }
        if columns.is_empty() {
            return Err(TillerError::invalid_argument("no data to insert"));
        }

        let mut selects = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let data: Vec<(String, DataValue)> = columns
                .iter()
                .map(|c| {
                    let value = row.get(c).cloned().unwrap_or(Value::Null);
                    (c.clone(), DataValue::Value(value))
                })
                .collect();
            let values: Vec<String> = self
                .parse_data(options, &data, schema, &mut binds, Some(index))?
                .into_iter()
                .map(|(_, value)| value)
                .collect();
            selects.push(format!("SELECT {}", values.join(",")));
        }

        let fields: Vec<String> = columns.iter().map(|c| self.dialect.parse_key(c)).collect();
        let sql = fill(
            INSERT_ALL_SQL,
            &[
                ("%INSERT%", insert_keyword(options)),
                ("%TABLE%", table),
                ("%FIELD%", fields.join(",")),
                ("%DATA%", selects.join(" UNION ALL ")),
                ("%COMMENT%", self.parse_comment(options)),
            ],
        );
        Ok(CompiledSql { sql, binds })
    }

    /// Compiles an UPDATE.
    ///
    /// Without a where condition the primary key is taken from the write
    /// data; failing that the update is rejected.
    pub fn update(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
    ) -> TillerResult<CompiledSql> {
        let mut binds = BindTable::new();
        self.bind_user(&options.bind, &mut binds)?;

        let (tree, data) = self.pk_condition(options, schema, "update")?;
        let set = self.parse_data(options, &data, schema, &mut binds, None)?;
        if set.is_empty() {
            return Err(TillerError::invalid_argument("no data to update"));
        }
        let set: Vec<String> = set
            .into_iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect();

        let sql = fill(
            UPDATE_SQL,
            &[
                ("%TABLE%", self.parse_table(options)?),
                ("%JOIN%", self.parse_join(options)),
                ("%SET%", set.join(" , ")),
                ("%WHERE%", self.parse_where(&tree, options, schema, &mut binds)?),
                ("%ORDER%", self.parse_order(options)),
                ("%LIMIT%", self.parse_limit(options)),
                ("%LOCK%", self.parse_lock(options)),
                ("%COMMENT%", self.parse_comment(options)),
            ],
        );
        Ok(CompiledSql { sql, binds })
    }

    /// Compiles a DELETE. Primary-key values in the write data serve as the
    /// condition when no where condition is set.
    pub fn delete(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
    ) -> TillerResult<CompiledSql> {
        let mut binds = BindTable::new();
        self.bind_user(&options.bind, &mut binds)?;

        let (tree, _) = self.pk_condition(options, schema, "delete")?;
        let sql = fill(
            DELETE_SQL,
            &[
                ("%TABLE%", self.parse_table(options)?),
                ("%JOIN%", self.parse_join(options)),
                ("%WHERE%", self.parse_where(&tree, options, schema, &mut binds)?),
                ("%ORDER%", self.parse_order(options)),
                ("%LIMIT%", self.parse_limit(options)),
                ("%LOCK%", self.parse_lock(options)),
                ("%COMMENT%", self.parse_comment(options)),
            ],
        );
        Ok(CompiledSql { sql, binds })
    }

    /// Compiles only the where expression, without the `WHERE` keyword.
    pub fn compile_where(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
        binds: &mut BindTable,
    ) -> TillerResult<String> {
        WhereCompiler::new(self, schema, binds)
            .compile(&options.where_, options.soft_delete.as_ref())
    }

    // =========================================================================
    // Shared pieces
    // =========================================================================

    fn select_sql(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
        binds: &mut BindTable,
    ) -> TillerResult<String> {
        let table = self.parse_table(options)?;
        let where_ = self.parse_where(&options.where_, options, schema, binds)?;
        let union = self.parse_union(options, binds)?;

        Ok(fill(
            SELECT_SQL,
            &[
                ("%TABLE%", table),
                ("%DISTINCT%", parse_distinct(options)),
                ("%FIELD%", self.parse_field(options, schema)),
                ("%FORCE%", parse_force(options)),
                ("%JOIN%", self.parse_join(options)),
                ("%WHERE%", where_),
                ("%GROUP%", parse_group(options)),
                ("%HAVING%", parse_having(options)),
                ("%UNION%", union),
                ("%ORDER%", self.parse_order(options)),
                ("%LIMIT%", self.parse_limit(options)),
                ("%LOCK%", self.parse_lock(options)),
                ("%COMMENT%", self.parse_comment(options)),
            ],
        ))
    }

    /// Compiles a closure-built select into the shared bind table.
    pub(crate) fn compile_subquery(
        &self,
        sub: &SubQuery,
        binds: &mut BindTable,
    ) -> TillerResult<String> {
        let mut query = sub.build();
        let options = query.parse_options(false);
        self.bind_user(&options.bind, binds)?;
        self.select_sql(&options, None, binds)
    }

    pub(crate) fn bind_user(
        &self,
        user: &[(String, Value)],
        binds: &mut BindTable,
    ) -> TillerResult<()> {
        for (name, value) in user {
            binds.insert(name, value.clone(), value.bind_type())?;
        }
        Ok(())
    }

    /// Moves primary-key values from the write data into the condition when
    /// the where-tree is empty.
    fn pk_condition(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
        operation: &'static str,
    ) -> TillerResult<(WhereTree, Vec<(String, DataValue)>)> {
        let mut tree = options.where_.clone();
        let mut data = options.data.clone();

        if tree.is_empty() {
            let pk: Vec<String> = match (&options.pk, schema) {
                (Some(pk), _) => pk.clone(),
                (None, Some(schema)) => schema
                    .pk
                    .columns()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                (None, None) => Vec::new(),
            };

            let present: Vec<&String> = pk
                .iter()
                .filter(|k| matches!(options.data_value(k), Some(DataValue::Value(_))))
                .collect();

            if !present.is_empty() {
                if let Some(missing) = pk.iter().find(|k| !present.contains(k)) {
                    return Err(TillerError::MissingPrimaryKey {
                        field: missing.clone(),
                    });
                }
                for key in &pk {
                    if let Some(DataValue::Value(value)) = options.data_value(key) {
                        tree.push(
                            Logic::And,
                            Condition::expr(
                                FieldRef::Column(key.clone()),
                                Operator::Eq,
                                CondValue::Value(value.clone()),
                                None,
                            ),
                        );
                    }
                }
                data.retain(|(name, _)| !pk.contains(name));
            }
        }

        if tree.is_empty() {
            return Err(TillerError::MissingCondition { operation });
        }
        Ok((tree, data))
    }

    /// Returns whether a write column is kept, rejecting it in strict mode.
    fn check_field(
        &self,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
        field: &str,
    ) -> TillerResult<bool> {
        let Some(schema) = schema else {
            return Ok(true);
        };
        if schema.fields.is_empty() || schema.has_field(field) {
            return Ok(true);
        }
        if options.strict.unwrap_or(true) {
            return Err(TillerError::UnknownField {
                field: field.to_string(),
                table: self.table_name(options).unwrap_or_default(),
            });
        }
        Ok(false)
    }

    /// Compiles write data into `(quoted column, value expression)` pairs.
    fn parse_data(
        &self,
        options: &QueryOptions,
        data: &[(String, DataValue)],
        schema: Option<&TableSchema>,
        binds: &mut BindTable,
        row: Option<usize>,
    ) -> TillerResult<Vec<(String, String)>> {
        let mut out = Vec::with_capacity(data.len());
        for (field, value) in data {
            if !self.check_field(options, schema, field)? {
                continue;
            }
            let key = self.dialect.parse_key(field);
            let mut bind = |value: &Value| -> String {
                let base = match row {
                    Some(row) => format!("{}_{row}", bind_base(DATA_BIND_PREFIX, field)),
                    None => bind_base(DATA_BIND_PREFIX, field),
                };
                let bind_type = column_bind_type(schema, field, value);
                format!(":{}", binds.bind(&base, value.clone(), bind_type))
            };
            let expr = match value {
                DataValue::Value(Value::Null) => "NULL".to_string(),
                DataValue::Value(v) => bind(v),
                DataValue::Inc(step) => format!("{key} + {}", bind(step)),
                DataValue::Dec(step) => format!("{key} - {}", bind(step)),
                DataValue::Exp(sql) => sql.clone(),
            };
            out.push((key, expr));
        }
        Ok(out)
    }

    /// Replaces `__NAME__` references with the prefixed lowercase name.
    fn resolve_names(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find("__") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("__") else {
                break;
            };
            let name = &after[..end];
            if !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            {
                out.push_str(&rest[..start]);
                out.push_str(&self.prefix);
                out.push_str(&name.to_ascii_lowercase());
                rest = &after[end + 2..];
            } else {
                out.push_str(&rest[..start + 2]);
                rest = after;
            }
        }
        out.push_str(rest);
        out
    }

    fn parse_table(&self, options: &QueryOptions) -> TillerResult<String> {
        if options.table.is_empty() {
            return Err(TillerError::invalid_argument("no table specified"));
        }
        let tables: Vec<String> = options
            .table
            .iter()
            .enumerate()
            .map(|(i, table)| {
                let key = self.dialect.parse_key(&self.resolve_names(table));
                let alias = options
                    .alias
                    .get(table)
                    .or_else(|| (i == 0).then(|| options.alias.get("")).flatten());
                match alias {
                    Some(alias) => format!("{key} {alias}"),
                    None => key,
                }
            })
            .collect();
        Ok(tables.join(","))
    }

    fn parse_table_plain(&self, options: &QueryOptions) -> TillerResult<String> {
        self.table_name(options)
            .map(|t| self.dialect.parse_key(&t))
            .ok_or_else(|| TillerError::invalid_argument("no table specified"))
    }

    fn parse_field(&self, options: &QueryOptions, schema: Option<&TableSchema>) -> String {
        if options.field_all || !options.except.is_empty() {
            if let Some(schema) = schema {
                let fields: Vec<String> = schema
                    .fields
                    .iter()
                    .filter(|f| !options.except.contains(f))
                    .map(|f| self.dialect.parse_key(f))
                    .collect();
                if !fields.is_empty() {
                    return fields.join(",");
                }
            }
            return "*".to_string();
        }

        let fields: Vec<String> = options
            .field
            .iter()
            .map(|item| match item {
                FieldItem::Column { name, alias } => {
                    let key = self.dialect.parse_key(name);
                    match alias {
                        Some(alias) => format!("{key} AS {}", self.dialect.parse_key(alias)),
                        None => key,
                    }
                }
                FieldItem::Raw(sql) => sql.clone(),
            })
            .collect();
        if fields.is_empty() {
            "*".to_string()
        } else {
            fields.join(",")
        }
    }

    fn parse_join(&self, options: &QueryOptions) -> String {
        options
            .join
            .iter()
            .map(|join| {
                let table = self.resolve_names(&join.table);
                let table = if table.contains(char::is_whitespace) {
                    table
                } else {
                    self.dialect.parse_key(&table)
                };
                format!(" {} {table} ON {}", join.kind.as_sql(), join.condition)
            })
            .collect()
    }

    fn parse_where(
        &self,
        tree: &WhereTree,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
        binds: &mut BindTable,
    ) -> TillerResult<String> {
        let expr =
            WhereCompiler::new(self, schema, binds).compile(tree, options.soft_delete.as_ref())?;
        if expr.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {expr}"))
        }
    }

    fn parse_order(&self, options: &QueryOptions) -> String {
        if options.order.is_empty() {
            return String::new();
        }
        let items: Vec<String> = options
            .order
            .iter()
            .map(|item| match item {
                OrderItem::Column { field, direction } => {
                    let key = self.dialect.parse_key(field);
                    match direction {
                        Some(Direction::Asc) => format!("{key} ASC"),
                        Some(Direction::Desc) => format!("{key} DESC"),
                        None => key,
                    }
                }
                OrderItem::Raw(sql) => sql.clone(),
            })
            .collect();
        format!(" ORDER BY {}", items.join(","))
    }

    fn parse_limit(&self, options: &QueryOptions) -> String {
        options
            .limit
            .map(|limit| self.dialect.limit(limit.offset, limit.length))
            .unwrap_or_default()
    }

    fn parse_union(&self, options: &QueryOptions, binds: &mut BindTable) -> TillerResult<String> {
        let mut out = String::new();
        for union in &options.union {
            let sql = match &union.source {
                UnionSource::Raw(sql) => sql.clone(),
                UnionSource::Sub(sub) => self.compile_subquery(sub, binds)?,
            };
            let keyword = if union.all { "UNION ALL" } else { "UNION" };
            let _ = write!(out, " {keyword} ( {sql} )");
        }
        Ok(out)
    }

    fn parse_lock(&self, options: &QueryOptions) -> String {
        options
            .lock
            .as_ref()
            .map(|lock| format!(" {lock}"))
            .unwrap_or_default()
    }

    fn parse_comment(&self, options: &QueryOptions) -> String {
        options
            .comment
            .as_ref()
            .map(|c| format!(" /* {} */", c.replace("*/", "")))
            .unwrap_or_default()
    }
}

fn parse_distinct(options: &QueryOptions) -> String {
    if options.distinct {
        " DISTINCT".to_string()
    } else {
        String::new()
    }
}

fn parse_force(options: &QueryOptions) -> String {
    options
        .force
        .as_ref()
        .map(|index| format!(" FORCE INDEX ( {index} )"))
        .unwrap_or_default()
}

fn parse_group(options: &QueryOptions) -> String {
    options
        .group
        .as_ref()
        .map(|g| format!(" GROUP BY {g}"))
        .unwrap_or_default()
}

fn parse_having(options: &QueryOptions) -> String {
    options
        .having
        .as_ref()
        .map(|h| format!(" HAVING {h}"))
        .unwrap_or_default()
}

fn insert_keyword(options: &QueryOptions) -> String {
    let keyword = if options.replace { "REPLACE" } else { "INSERT" };
    keyword.to_string()
}

/// Substitutes `%TOKEN%` markers in one pass; fragment text is never rescanned.
fn fill(template: &str, fragments: &[(&str, String)]) -> String {
    let mut sql = String::with_capacity(template.len() * 2);
    let mut rest = template;
    while let Some(start) = rest.find('%') {
        sql.push_str(&rest[..start]);
        let tail = &rest[start..];
        let token = tail[1..].find('%').map(|end| &tail[..end + 2]);
        match token.and_then(|t| fragments.iter().find(|(name, _)| *name == t)) {
            Some((name, fragment)) => {
                sql.push_str(fragment);
                rest = &tail[name.len()..];
            }
            None => {
                sql.push('%');
                rest = &tail[1..];
            }
        }
    }
    sql.push_str(rest);
    sql.trim().to_string()
}

/// Returns the bind type a column is bound with.
fn column_bind_type(schema: Option<&TableSchema>, field: &str, value: &Value) -> BindType {
    schema
        .and_then(|s| s.bind_type(field))
        .unwrap_or_else(|| value.bind_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, MysqlDialect};
    use crate::query::Query;
    use crate::schema::ColumnInfo;

    fn builder() -> Builder {
        Builder::new(Arc::new(MysqlDialect)).with_prefix("t_")
    }

    fn user_schema() -> TableSchema {
        TableSchema::from_columns(&[
            ColumnInfo::new("id", "int(11)", true),
            ColumnInfo::new("name", "varchar(32)", false),
            ColumnInfo::new("status", "tinyint(1)", false),
            ColumnInfo::new("hits", "int(11)", false),
        ])
    }

    #[test]
    fn test_select_full_template() {
        let mut query = Query::new()
            .table("user")
            .alias("u")
            .distinct(true)
            .field("u.id")
            .field_as("u.name", "username")
            .left_join("profile p", "p.user_id = u.id")
            .where_eq("u.status", 1)
            .group("u.id")
            .having("COUNT(*) > 1")
            .order("u.id", "desc")
            .limit_offset(10, 5)
            .lock(true)
            .comment("hot path");
        let options = query.parse_options(true);
        let compiled = builder().select(&options, None).unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT DISTINCT u.id,u.name AS username FROM user u LEFT JOIN profile p ON p.user_id = u.id \
             WHERE u.status = :where_u_status GROUP BY u.id HAVING COUNT(*) > 1 ORDER BY u.id DESC \
             LIMIT 10,5 FOR UPDATE /* hot path */"
        );
        assert_eq!(
            compiled.reconstruct(),
            compiled.sql.replace(":where_u_status", "1")
        );
    }

    #[test]
    fn test_select_star_and_prefixed_name() {
        let mut query = Query::new().name("user_info").where_eq("id", 3);
        let options = query.parse_options(true);
        let compiled = builder().select(&options, None).unwrap();
        assert_eq!(compiled.sql, "SELECT * FROM t_user_info WHERE id = :where_id");
        assert_eq!(builder().table_name(&options).as_deref(), Some("t_user_info"));
    }

    #[test]
    fn test_field_all_and_except() {
        let schema = user_schema();
        let mut query = Query::new().table("user").except(["hits"]);
        let options = query.parse_options(true);
        let compiled = builder().select(&options, Some(&schema)).unwrap();
        assert_eq!(compiled.sql, "SELECT id,name,status FROM user");

        let mut query = Query::new().table("user").field_all();
        let options = query.parse_options(true);
        let compiled = builder().select(&options, Some(&schema)).unwrap();
        assert_eq!(compiled.sql, "SELECT id,name,status,hits FROM user");
    }

    #[test]
    fn test_union_and_generic_limit() {
        let builder = Builder::new(Arc::new(GenericDialect));
        let mut query = Query::new()
            .table("a")
            .field("id")
            .union_all(SubQuery::new(|q| q.table("b").field("id").where_eq("id", 2)))
            .where_eq("id", 1)
            .page(3, 10);
        let options = query.parse_options(true);
        let compiled = builder.select(&options, None).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT id FROM a WHERE id = :where_id UNION ALL ( SELECT id FROM b WHERE id = :where_id_1 ) LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_missing_table() {
        let mut query = Query::new().where_eq("id", 1);
        let options = query.parse_options(true);
        assert!(builder().select(&options, None).is_err());
    }

    #[test]
    fn test_insert() {
        let schema = user_schema();
        let mut query = Query::new()
            .table("user")
            .data([("name", Value::from("alice")), ("status", Value::Null)]);
        let options = query.parse_options(true);
        let compiled = builder().insert(&options, Some(&schema)).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO user (name,status) VALUES (:data_name,NULL)"
        );
        assert_eq!(compiled.binds.get("data_name").unwrap().bind_type, BindType::Str);
    }

    #[test]
    fn test_replace_and_strict_mode() {
        let schema = user_schema();
        let mut query = Query::new()
            .table("user")
            .replace(true)
            .set("name", "bob")
            .set("nickname", "b");
        let options = query.parse_options(true);
        let err = builder().insert(&options, Some(&schema)).unwrap_err();
        assert!(matches!(err, TillerError::UnknownField { ref field, .. } if field == "nickname"));

        let mut query = Query::new()
            .table("user")
            .replace(true)
            .strict(false)
            .set("name", "bob")
            .set("nickname", "b");
        let options = query.parse_options(true);
        let compiled = builder().insert(&options, Some(&schema)).unwrap();
        assert_eq!(compiled.sql, "REPLACE INTO user (name) VALUES (:data_name)");
    }

    #[test]
    fn test_insert_all() {
        let rows = vec![
            Row::from_pairs([("name", Value::from("a")), ("status", Value::Int(1))]),
            Row::from_pairs([("name", Value::from("b"))]),
        ];
        let mut query = Query::new().table("user");
        let options = query.parse_options(true);
        let compiled = builder().insert_all(&options, &rows, None).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO user (name,status) SELECT :data_name_0,:data_status_0 UNION ALL SELECT :data_name_1,NULL"
        );
        assert_eq!(compiled.binds.len(), 3);
    }

    #[test]
    fn test_update_with_pk_in_data() {
        let schema = user_schema();
        let mut query = Query::new()
            .table("user")
            .data([("id", Value::Int(7)), ("name", Value::from("x"))])
            .inc("hits", 2);
        let options = query.parse_options(true);
        let compiled = builder().update(&options, Some(&schema)).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE user SET name = :data_name , hits = hits + :data_hits WHERE id = :where_id"
        );
        assert_eq!(compiled.binds.get("where_id").unwrap().value, Value::Int(7));
    }

    #[test]
    fn test_update_without_condition_fails() {
        let schema = user_schema();
        let mut query = Query::new().table("user").set("name", "x");
        let options = query.parse_options(true);
        let err = builder().update(&options, Some(&schema)).unwrap_err();
        assert_eq!(err.to_string(), "missing update condition");
    }

    #[test]
    fn test_composite_pk_requires_every_field() {
        let schema = TableSchema::from_columns(&[
            ColumnInfo::new("a", "int", true),
            ColumnInfo::new("b", "int", true),
            ColumnInfo::new("v", "int", false),
        ]);
        let mut query = Query::new().table("pair").set("a", 1).set("v", 2);
        let options = query.parse_options(true);
        let err = builder().update(&options, Some(&schema)).unwrap_err();
        assert!(matches!(err, TillerError::MissingPrimaryKey { ref field } if field == "b"));
    }

    #[test]
    fn test_update_exp_and_dec() {
        let mut query = Query::new()
            .table("user")
            .where_eq("id", 1)
            .dec("hits", 1)
            .exp("name", "UPPER(name)");
        let options = query.parse_options(true);
        let compiled = builder().update(&options, None).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE user SET hits = hits - :data_hits , name = UPPER(name) WHERE id = :where_id"
        );
    }

    #[test]
    fn test_delete() {
        let mut query = Query::new()
            .table("user")
            .where_in("id", [1, 2])
            .soft_delete("delete_time", "null", CondValue::None);
        let options = query.parse_options(true);
        let compiled = builder().delete(&options, None).unwrap();
        assert_eq!(
            compiled.sql,
            "DELETE FROM user WHERE id IN (:where_id_in_1,:where_id_in_2) AND delete_time IS NULL"
        );

        let mut query = Query::new().table("user");
        let options = query.parse_options(true);
        let err = builder().delete(&options, None).unwrap_err();
        assert_eq!(err.to_string(), "missing delete condition");
    }

    #[test]
    fn test_user_binds_and_force_index() {
        let mut query = Query::new()
            .table("user")
            .force("idx_status")
            .where_raw("status = :s")
            .bind("s", 1);
        let options = query.parse_options(true);
        let compiled = builder().select(&options, None).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM user FORCE INDEX ( idx_status ) WHERE ( status = :s )"
        );
        assert_eq!(
            compiled.reconstruct(),
            "SELECT * FROM user FORCE INDEX ( idx_status ) WHERE ( status = 1 )"
        );
    }

    #[test]
    fn test_resolve_names_and_fill() {
        let b = builder();
        assert_eq!(b.resolve_names("__ORDER_ITEM__ oi"), "t_order_item oi");
        assert_eq!(b.resolve_names("a__b__c"), "a__b__c");
        assert_eq!(
            fill("%A% and %B% 100%", &[("%A%", "x%B%".to_string()), ("%B%", "y".to_string())]),
            "x%B% and y 100%"
        );
    }
}
