//! Table schemas and the schema cache.
//!
//! A [`TableSchema`] is computed once per (database, table) pair from the
//! driver's column listing and cached in a [`SchemaCache`]. The cache can be
//! persisted as one JSON file per table:
//!
//! ```json
//! {"fields": ["id", "name"], "type": {"id": "int(11)", "name": "varchar(32)"},
//!  "bind": {"id": "int", "name": "str"}, "pk": "id"}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tiller_common::{BindType, TillerResult};
use tracing::debug;

/// Primary key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// No primary key.
    #[default]
    None,
    /// Single-column key.
    Single(String),
    /// Multi-column key.
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// Returns the key columns.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::None => Vec::new(),
            PrimaryKey::Single(pk) => vec![pk.as_str()],
            PrimaryKey::Composite(pks) => pks.iter().map(String::as_str).collect(),
        }
    }

    /// Builds a key from a column list.
    #[must_use]
    pub fn from_columns(mut columns: Vec<String>) -> Self {
        match columns.len() {
            0 => PrimaryKey::None,
            1 => PrimaryKey::Single(columns.remove(0)),
            _ => PrimaryKey::Composite(columns),
        }
    }
}

/// Column description reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared SQL type.
    pub sql_type: String,
    /// Part of the primary key.
    pub primary: bool,
}

impl ColumnInfo {
    /// Creates a column description.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, primary: bool) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary,
        }
    }
}

/// Field list, types and primary key of one table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// Column names in table order.
    pub fields: Vec<String>,
    /// Declared SQL type per column.
    #[serde(rename = "type")]
    pub types: BTreeMap<String, String>,
    /// Bind type per column.
    pub bind: BTreeMap<String, BindType>,
    /// Primary key.
    pub pk: PrimaryKey,
}

impl TableSchema {
    /// Builds a schema from a driver column listing.
    #[must_use]
    pub fn from_columns(columns: &[ColumnInfo]) -> Self {
        let mut schema = Self::default();
        let mut pk = Vec::new();
        for column in columns {
            schema.fields.push(column.name.clone());
            schema
                .types
                .insert(column.name.clone(), column.sql_type.clone());
            schema.bind.insert(
                column.name.clone(),
                BindType::from_sql_type(&column.sql_type),
            );
            if column.primary {
                pk.push(column.name.clone());
            }
        }
        schema.pk = PrimaryKey::from_columns(pk);
        schema
    }

    /// Returns true if the column exists.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Returns the declared SQL type of a column.
    ///
    /// A `table.` or `alias.` qualifier is ignored.
    #[must_use]
    pub fn sql_type(&self, field: &str) -> Option<&str> {
        self.types.get(unqualified(field)).map(String::as_str)
    }

    /// Returns the bind type of a column.
    #[must_use]
    pub fn bind_type(&self, field: &str) -> Option<BindType> {
        self.bind.get(unqualified(field)).copied()
    }
}

fn unqualified(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}

/// Resolves table schemas.
pub trait SchemaLookup {
    /// Returns the schema of `table` in `database`.
    fn schema(&self, database: &str, table: &str) -> Option<Arc<TableSchema>>;
}

/// Schema cache keyed by (database, table).
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<(String, String), Arc<TableSchema>>>,
    dir: Option<PathBuf>,
}

impl SchemaCache {
    /// Creates an in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that also reads and writes JSON files under `dir`.
    #[must_use]
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dir: Some(dir.into()),
        }
    }

    /// Returns the cached schema, consulting the on-disk store on a miss.
    #[must_use]
    pub fn get(&self, database: &str, table: &str) -> Option<Arc<TableSchema>> {
        let key = (database.to_string(), table.to_string());
        if let Some(schema) = self.entries.read().get(&key) {
            return Some(Arc::clone(schema));
        }

        let dir = self.dir.as_ref()?;
        match Self::load_file(dir, database, table) {
            Ok(Some(schema)) => {
                let schema = Arc::new(schema);
                self.entries.write().insert(key, Arc::clone(&schema));
                Some(schema)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(database, table, error = %e, "ignoring unreadable schema cache file");
                None
            }
        }
    }

    /// Stores a schema, persisting it when a directory is configured.
    pub fn insert(
        &self,
        database: &str,
        table: &str,
        schema: TableSchema,
    ) -> TillerResult<Arc<TableSchema>> {
        if let Some(dir) = &self.dir {
            Self::save_file(dir, database, table, &schema)?;
        }
        let schema = Arc::new(schema);
        self.entries.write().insert(
            (database.to_string(), table.to_string()),
            Arc::clone(&schema),
        );
        Ok(schema)
    }

    /// Drops one cached schema from memory.
    pub fn invalidate(&self, database: &str, table: &str) {
        self.entries
            .write()
            .remove(&(database.to_string(), table.to_string()));
    }

    /// Drops every cached schema from memory.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of schemas held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no schema is held in memory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the file holding the schema of (database, table).
    #[must_use]
    pub fn file_path(dir: &Path, database: &str, table: &str) -> PathBuf {
        if database.is_empty() {
            dir.join(format!("{table}.json"))
        } else {
            dir.join(format!("{database}.{table}.json"))
        }
    }

    /// Loads a schema file, returning `None` when it does not exist.
    pub fn load_file(dir: &Path, database: &str, table: &str) -> TillerResult<Option<TableSchema>> {
        let path = Self::file_path(dir, database, table);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let schema = serde_json::from_str(&content)?;
        Ok(Some(schema))
    }

    /// Writes a schema file.
    pub fn save_file(
        dir: &Path,
        database: &str,
        table: &str,
        schema: &TableSchema,
    ) -> TillerResult<()> {
        std::fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(schema)?;
        std::fs::write(Self::file_path(dir, database, table), content)?;
        Ok(())
    }
}

impl SchemaLookup for SchemaCache {
    fn schema(&self, database: &str, table: &str) -> Option<Arc<TableSchema>> {
        self.get(database, table)
    }
}
