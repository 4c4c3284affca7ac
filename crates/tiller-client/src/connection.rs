//! Connection engine.
//!
//! A [`Connection`] compiles queries through the builder, routes them to a
//! master or replica handle, prepares, binds and executes them, and layers
//! result caching, reconnection and read-after-write routing on top.
//!
//! Every call follows the same path:
//!
//! ```text
//! cache check -> compile -> acquire handle -> prepare -> bind -> execute
//!     -> (connection lost? retry once) -> fetch / row count -> cache store
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiller_cache::{Cache, Clock, SystemClock};
use tiller_common::{
    DatabaseConfig, HostConfig, Row, TillerError, TillerResult, Value, CACHE_KEY_PREFIX,
    LAZY_KEY_PREFIX,
};
use tiller_query::bind::is_positional;
use tiller_query::options::{CacheSpec, DataValue, FieldItem, Limit};
use tiller_query::where_tree::is_raw_field;
use tiller_query::{
    dialect_for, BindTable, Builder, CompiledSql, PrimaryKey, Query, QueryOptions, TableSchema,
};
use tracing::{debug, error, info, warn};

use crate::context::DbContext;
use crate::driver::{
    ConnectTarget, Driver, DriverError, DriverResult, Handle, Param, PreparedStatement,
};
use crate::logger::{LogLevel, Logger, TracingLogger};

/// Callback receiving `(sql, run time, ran on master)` after each statement.
pub type Listener = Box<dyn Fn(&str, Duration, bool) + Send + Sync>;

/// Which handle a statement runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Master,
    Slave,
}

struct Prepared {
    role: Role,
    sql: String,
    stmt: Box<dyn PreparedStatement>,
}

/// Why one execution attempt failed.
enum Failure {
    Fatal(TillerError),
    Bind(String, DriverError),
    Driver(DriverError),
}

impl From<TillerError> for Failure {
    fn from(e: TillerError) -> Self {
        Failure::Fatal(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Inc,
    Dec,
}

/// A database connection.
///
/// Handles are opened lazily on first use. All operations take `&mut self`;
/// share connections across threads through [`crate::ConnectionPool`].
pub struct Connection {
    config: DatabaseConfig,
    builder: Builder,
    driver: Arc<dyn Driver>,
    context: Arc<DbContext>,
    cache: Option<Arc<dyn Cache>>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    listeners: Vec<Listener>,
    master: Option<Box<dyn Handle>>,
    slave: Option<Box<dyn Handle>>,
    statement: Option<Prepared>,
    pub(crate) trans_depth: usize,
    last_sql: String,
    last_binds: BindTable,
    last_insert_id: Option<String>,
    num_rows: u64,
    written: HashSet<String>,
    rng: StdRng,
}

impl Connection {
    /// Creates a connection. No server is contacted until the first statement.
    pub fn new(config: DatabaseConfig, driver: Arc<dyn Driver>) -> TillerResult<Self> {
        config.validate()?;
        let dialect = dialect_for(&config.dialect)?;
        let builder = Builder::new(dialect).with_prefix(config.prefix.clone());
        let context = match (&config.schema_cache_path, config.fields_cache) {
            (Some(dir), true) => DbContext::with_schema_dir(dir.clone()),
            _ => DbContext::new(),
        };

        Ok(Self {
            config,
            builder,
            driver,
            context: Arc::new(context),
            cache: None,
            clock: Arc::new(SystemClock),
            logger: Arc::new(TracingLogger),
            listeners: Vec::new(),
            master: None,
            slave: None,
            statement: None,
            trans_depth: 0,
            last_sql: String::new(),
            last_binds: BindTable::new(),
            last_insert_id: None,
            num_rows: 0,
            written: HashSet::new(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Shares a context with other connections.
    #[must_use]
    pub fn with_context(mut self, context: Arc<DbContext>) -> Self {
        self.context = context;
        self
    }

    /// Sets the result cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the clock that times lazy write windows.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the SQL logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Seeds server selection, making it reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Registers a statement listener.
    pub fn listen<F>(&mut self, listener: F)
    where
        F: Fn(&str, Duration, bool) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Returns the shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<DbContext> {
        &self.context
    }

    /// Returns the SQL builder.
    #[must_use]
    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    /// Returns the transaction nesting depth.
    #[must_use]
    pub fn trans_depth(&self) -> usize {
        self.trans_depth
    }

    /// Returns the last statement with its placeholders substituted.
    #[must_use]
    pub fn get_last_sql(&self) -> String {
        self.last_binds.reconstruct(&self.last_sql)
    }

    /// Returns the id generated by the last insert.
    #[must_use]
    pub fn get_last_insert_id(&self) -> Option<&str> {
        self.last_insert_id.as_deref()
    }

    /// Returns the rows fetched or affected by the last statement.
    #[must_use]
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Drops every open handle and the prepared statement.
    pub fn close(&mut self) {
        self.statement = None;
        self.master = None;
        self.slave = None;
        debug!("connection closed");
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Runs a select and returns every row.
    pub fn select(&mut self, mut query: Query) -> TillerResult<Vec<Row>> {
        let options = query.parse_options(self.config.fields_strict);
        self.select_options(&options, false)
    }

    /// Returns the first matching row.
    ///
    /// With a cache spec and a captured primary-key value the result is
    /// cached under `tiller:<db>.<table>|<pk>`.
    pub fn find(&mut self, mut query: Query) -> TillerResult<Option<Row>> {
        let mut options = query.parse_options(self.config.fields_strict);
        options.limit = Some(Limit {
            offset: None,
            length: 1,
        });
        Ok(self.select_options(&options, true)?.into_iter().next())
    }

    /// Returns one column of the first matching row.
    pub fn value(&mut self, mut query: Query, field: &str) -> TillerResult<Option<Value>> {
        let mut options = query.parse_options(self.config.fields_strict);
        select_only(&mut options, field);
        options.limit = Some(Limit {
            offset: None,
            length: 1,
        });
        let rows = self.select_options(&options, false)?;
        Ok(rows.first().and_then(|row| row.get_by_index(0)).cloned())
    }

    /// Returns one column of every matching row.
    pub fn column(&mut self, mut query: Query, field: &str) -> TillerResult<Vec<Value>> {
        let mut options = query.parse_options(self.config.fields_strict);
        select_only(&mut options, field);
        let rows = self.select_options(&options, false)?;
        Ok(rows
            .iter()
            .map(|row| row.get_by_index(0).cloned().unwrap_or_default())
            .collect())
    }

    /// Counts matching rows.
    pub fn count(&mut self, query: Query) -> TillerResult<u64> {
        let value = self.aggregate(query, "COUNT", "*")?;
        Ok(value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    /// Sums a column.
    pub fn sum(&mut self, query: Query, field: &str) -> TillerResult<Value> {
        self.aggregate(query, "SUM", field)
    }

    /// Returns the smallest value of a column.
    pub fn min(&mut self, query: Query, field: &str) -> TillerResult<Value> {
        self.aggregate(query, "MIN", field)
    }

    /// Returns the largest value of a column.
    pub fn max(&mut self, query: Query, field: &str) -> TillerResult<Value> {
        self.aggregate(query, "MAX", field)
    }

    /// Averages a column.
    pub fn avg(&mut self, query: Query, field: &str) -> TillerResult<Value> {
        self.aggregate(query, "AVG", field)
    }

    fn aggregate(&mut self, query: Query, func: &str, field: &str) -> TillerResult<Value> {
        let key = self.builder.dialect().parse_key(field);
        let expr = format!("{func}({key}) AS tiller_{}", func.to_ascii_lowercase());
        Ok(self.value(query, &expr)?.unwrap_or_default())
    }

    /// Compiles a select without touching the server and returns its SQL.
    pub fn fetch_sql(&mut self, mut query: Query) -> TillerResult<String> {
        let options = query.parse_options(self.config.fields_strict);
        let schema = self.cached_schema(&options);
        let compiled = self.builder.select(&options, schema.as_deref())?;
        self.remember(&compiled);
        Ok(compiled.reconstruct())
    }

    /// Runs raw SQL and returns its rows. `binds` name `:placeholders`, or
    /// `?` positions when the names are numeric.
    pub fn query(&mut self, sql: &str, binds: &[(&str, Value)]) -> TillerResult<Vec<Row>> {
        let compiled = raw_compiled(sql, binds)?;
        let rows = self.run(&compiled, false, |stmt| stmt.fetch_all())?;
        self.context.record_query();
        self.num_rows = rows.len() as u64;
        Ok(rows)
    }

    /// Runs raw SQL on the master and returns the affected rows.
    pub fn execute(&mut self, sql: &str, binds: &[(&str, Value)]) -> TillerResult<u64> {
        let compiled = raw_compiled(sql, binds)?;
        let count = self.run(&compiled, true, |stmt| Ok(stmt.row_count()))?;
        self.context.record_execute();
        self.num_rows = count;
        Ok(count)
    }

    fn select_options(&mut self, options: &QueryOptions, find: bool) -> TillerResult<Vec<Row>> {
        let master = self.read_from_master(options);
        let schema = if options.fetch_sql {
            self.cached_schema(options)
        } else {
            self.schema_for(options, master)
        };

        let cache_key = match (&options.cache, &self.cache) {
            (Some(spec), Some(_)) if !options.fetch_sql => {
                Some(self.cache_key(options, spec, schema.as_deref(), find)?)
            }
            _ => None,
        };
        if let Some(key) = &cache_key {
            if let Some(rows) = self.cache_get(key) {
                debug!(key = %key, "cache hit");
                self.num_rows = rows.len() as u64;
                return Ok(rows);
            }
        }

        let compiled = self.builder.select(options, schema.as_deref())?;
        if options.fetch_sql {
            self.remember(&compiled);
            return Ok(Vec::new());
        }

        let rows = self.run(&compiled, master, |stmt| stmt.fetch_all())?;
        self.context.record_query();
        self.num_rows = rows.len() as u64;

        if let (Some(key), Some(spec)) = (&cache_key, &options.cache) {
            self.cache_put(key, spec, &rows)?;
        }
        Ok(rows)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts one row; `replace(true)` on the query issues REPLACE.
    pub fn insert(&mut self, mut query: Query) -> TillerResult<u64> {
        let options = query.parse_options(self.config.fields_strict);
        let schema = self.schema_for(&options, true);
        let compiled = self.builder.insert(&options, schema.as_deref())?;
        self.write(&compiled, &options, schema.as_deref())
    }

    /// Inserts one row and returns the generated id.
    pub fn insert_get_id(&mut self, query: Query) -> TillerResult<Option<String>> {
        self.insert(query)?;
        Ok(self.last_insert_id.clone())
    }

    /// Inserts several rows in one statement.
    pub fn insert_all(&mut self, mut query: Query, rows: &[Row]) -> TillerResult<u64> {
        let options = query.parse_options(self.config.fields_strict);
        let schema = self.schema_for(&options, true);
        let compiled = self.builder.insert_all(&options, rows, schema.as_deref())?;
        self.write(&compiled, &options, schema.as_deref())
    }

    /// Updates matching rows.
    ///
    /// Without a where condition the primary key is taken from the data;
    /// with neither the update fails before any SQL is sent.
    pub fn update(&mut self, mut query: Query) -> TillerResult<u64> {
        let options = query.parse_options(self.config.fields_strict);
        let schema = self.schema_for(&options, true);
        let compiled = self.builder.update(&options, schema.as_deref())?;
        self.write(&compiled, &options, schema.as_deref())
    }

    /// Deletes matching rows.
    pub fn delete(&mut self, mut query: Query) -> TillerResult<u64> {
        let options = query.parse_options(self.config.fields_strict);
        let schema = self.schema_for(&options, true);
        let compiled = self.builder.delete(&options, schema.as_deref())?;
        self.write(&compiled, &options, schema.as_deref())
    }

    /// Increments a column.
    ///
    /// With a `lazy` window and a cache, steps accumulate in the cache and
    /// `None` is returned; once the window has elapsed the accumulated step is
    /// written in one UPDATE and its row count returned.
    pub fn set_inc(
        &mut self,
        query: Query,
        field: &str,
        step: i64,
        lazy: Option<Duration>,
    ) -> TillerResult<Option<u64>> {
        self.lazy_write(query, field, step, lazy, Step::Inc)
    }

    /// Decrements a column; see [`Connection::set_inc`].
    pub fn set_dec(
        &mut self,
        query: Query,
        field: &str,
        step: i64,
        lazy: Option<Duration>,
    ) -> TillerResult<Option<u64>> {
        self.lazy_write(query, field, step, lazy, Step::Dec)
    }

    fn lazy_write(
        &mut self,
        query: Query,
        field: &str,
        step: i64,
        lazy: Option<Duration>,
        kind: Step,
    ) -> TillerResult<Option<u64>> {
        let total = match (lazy, self.cache.clone()) {
            (Some(window), Some(cache)) => {
                let guid = self.lazy_guid(query.options(), field, kind)?;
                let now = self.clock.unix_millis();
                match accumulate(cache.as_ref(), &guid, step, window, now)? {
                    Some(total) => total,
                    None => return Ok(None),
                }
            }
            _ => step,
        };

        let query = match kind {
            Step::Inc => query.inc(field, total),
            Step::Dec => query.dec(field, total),
        };
        self.update(query).map(Some)
    }

    fn lazy_guid(&self, options: &QueryOptions, field: &str, kind: Step) -> TillerResult<String> {
        let table = self.builder.table_name(options).unwrap_or_default();
        let condition = serde_json::to_string(&options.where_)
            .map_err(|_| TillerError::cache_key("lazy write condition contains a closure"))?;
        let mut hasher = DefaultHasher::new();
        condition.hash(&mut hasher);
        let kind = match kind {
            Step::Inc => "inc",
            Step::Dec => "dec",
        };
        Ok(format!(
            "{LAZY_KEY_PREFIX}{table}_{field}_{kind}_{:x}",
            hasher.finish()
        ))
    }

    fn write(
        &mut self,
        compiled: &CompiledSql,
        options: &QueryOptions,
        schema: Option<&TableSchema>,
    ) -> TillerResult<u64> {
        if options.fetch_sql {
            self.remember(compiled);
            return Ok(0);
        }

        let count = self.run(compiled, true, |stmt| Ok(stmt.row_count()))?;
        self.context.record_execute();
        self.num_rows = count;

        let is_insert = compiled.sql.starts_with("INSERT") || compiled.sql.starts_with("REPLACE");
        if is_insert {
            self.last_insert_id = self
                .link(Role::Master)
                .ok()
                .and_then(|handle| handle.last_insert_id());
        }

        if self.config.read_master {
            if let Some(table) = self.builder.table_name(options) {
                self.written.insert(table);
            }
        }
        self.invalidate(options, schema)?;
        Ok(count)
    }

    // =========================================================================
    // Caching
    // =========================================================================

    fn cache_key(
        &self,
        options: &QueryOptions,
        spec: &CacheSpec,
        schema: Option<&TableSchema>,
        find: bool,
    ) -> TillerResult<String> {
        if let Some(key) = &spec.key {
            return Ok(key.clone());
        }
        if find {
            if let Some(key) = self.pk_cache_key(options, schema) {
                return Ok(key);
            }
        }

        let serialized = serde_json::to_string(options)
            .map_err(|_| TillerError::cache_key("query options contain a closure"))?;
        let mut hasher = DefaultHasher::new();
        self.database().hash(&mut hasher);
        self.config.prefix.hash(&mut hasher);
        serialized.hash(&mut hasher);
        Ok(format!("{CACHE_KEY_PREFIX}{:x}", hasher.finish()))
    }

    /// Key of a single row addressed by its primary key.
    fn pk_cache_key(&self, options: &QueryOptions, schema: Option<&TableSchema>) -> Option<String> {
        let PrimaryKey::Single(pk) = &schema?.pk else {
            return None;
        };
        let value = match options.eq_values.get(pk) {
            Some(value) => value.clone(),
            None => match options.data_value(pk) {
                Some(DataValue::Value(value)) => value.clone(),
                _ => return None,
            },
        };
        let table = self.builder.table_name(options)?;
        Some(format!(
            "{CACHE_KEY_PREFIX}{}.{table}|{value}",
            self.database()
        ))
    }

    fn cache_get(&self, key: &str) -> Option<Vec<Row>> {
        let value = self.cache.as_ref()?.get(key)?;
        match serde_json::from_value(value) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(key, error = %e, "ignoring undecodable cache entry");
                None
            }
        }
    }

    fn cache_put(&self, key: &str, spec: &CacheSpec, rows: &[Row]) -> TillerResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let value = serde_json::to_value(rows)?;
        match &spec.tag {
            Some(tag) => cache.set_tagged(key, value, spec.expire, tag),
            None => cache.set(key, value, spec.expire),
        }
    }

    fn invalidate(&self, options: &QueryOptions, schema: Option<&TableSchema>) -> TillerResult<()> {
        let (Some(cache), Some(spec)) = (&self.cache, &options.cache) else {
            return Ok(());
        };
        if let Some(tag) = &spec.tag {
            cache.clear_tag(tag)?;
            debug!(tag = %tag, "cache tag cleared after write");
        }
        let key = spec
            .key
            .clone()
            .or_else(|| self.pk_cache_key(options, schema));
        if let Some(key) = key {
            cache.delete(&key)?;
            debug!(key = %key, "cache key deleted after write");
        }
        Ok(())
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Returns the schema of a table, loading it from the server on a miss.
    /// Debug mode always reloads.
    pub fn table_schema(&mut self, table: &str) -> TillerResult<Arc<TableSchema>> {
        let database = self.database();
        if !self.config.debug {
            if let Some(schema) = self.context.schema().get(&database, table) {
                return Ok(schema);
            }
        }

        let role = self.init_connect(false)?;
        let columns = self.link(role)?.columns(table).map_err(|e| TillerError::Execution {
            message: e.to_string(),
            sql: format!("SHOW COLUMNS FROM {table}"),
        })?;
        self.context
            .schema()
            .insert(&database, table, TableSchema::from_columns(&columns))
    }

    fn schema_for(&mut self, options: &QueryOptions, master: bool) -> Option<Arc<TableSchema>> {
        let table = self.schema_table(options)?;
        let database = self.database();
        if !self.config.debug {
            if let Some(schema) = self.context.schema().get(&database, &table) {
                return Some(schema);
            }
        }

        let loaded = self.init_connect(master).and_then(|role| {
            self.link(role)?.columns(&table).map_err(|e| TillerError::Execution {
                message: e.to_string(),
                sql: format!("SHOW COLUMNS FROM {table}"),
            })
        });
        match loaded {
            Ok(columns) => self
                .context
                .schema()
                .insert(&database, &table, TableSchema::from_columns(&columns))
                .map_err(|e| warn!(table = %table, error = %e, "schema not persisted"))
                .ok(),
            Err(e) => {
                debug!(table = %table, error = %e, "table schema unavailable");
                None
            }
        }
    }

    fn cached_schema(&self, options: &QueryOptions) -> Option<Arc<TableSchema>> {
        let table = self.schema_table(options)?;
        self.context.schema().get(&self.database(), &table)
    }

    fn schema_table(&self, options: &QueryOptions) -> Option<String> {
        self.builder
            .table_name(options)
            .filter(|t| !is_raw_field(t))
    }

    fn database(&self) -> String {
        self.config.host(0).database
    }

    // =========================================================================
    // Server selection
    // =========================================================================

    fn splits_reads(&self) -> bool {
        self.config.is_distributed() && self.config.rw_separate
    }

    fn read_from_master(&self, options: &QueryOptions) -> bool {
        if options.master {
            return true;
        }
        self.config.read_master
            && self
                .builder
                .table_name(options)
                .is_some_and(|t| self.written.contains(&t))
    }

    /// Opens the handle for the requested role and returns the role used.
    pub(crate) fn init_connect(&mut self, master: bool) -> TillerResult<Role> {
        if !self.config.is_distributed() {
            if self.master.is_none() {
                let host = self.config.host(0);
                self.master = Some(self.connect(&host, None)?);
            }
            return Ok(Role::Master);
        }

        if !self.splits_reads() || master || self.trans_depth > 0 {
            if self.master.is_none() {
                self.master = Some(self.multi_connect(true)?);
            }
            Ok(Role::Master)
        } else {
            if self.slave.is_none() {
                self.slave = Some(self.multi_connect(false)?);
            }
            Ok(Role::Slave)
        }
    }

    /// Picks a server from the host lists and connects to it, with the
    /// master as fallback when a replica was chosen.
    fn multi_connect(&mut self, master: bool) -> TillerResult<Box<dyn Handle>> {
        let hosts = self.config.host_count();
        let master_num = self.config.master_num.clamp(1, hosts);
        let m = match self.config.master_no {
            Some(no) => no,
            None => self.rng.gen_range(0..master_num),
        };

        let r = if self.config.rw_separate {
            if master {
                m
            } else if let Some(no) = self.config.slave_no {
                no
            } else if master_num < hosts {
                self.rng.gen_range(master_num..hosts)
            } else {
                m
            }
        } else {
            self.rng.gen_range(0..hosts)
        };

        debug!(index = r, master_index = m, master, "selected server");
        let host = self.config.host(r);
        let fallback = (r != m).then(|| self.config.host(m));
        self.connect(&host, fallback.as_ref())
    }

    /// Connects to one server, retrying once against `fallback` on failure.
    fn connect(
        &self,
        host: &HostConfig,
        fallback: Option<&HostConfig>,
    ) -> TillerResult<Box<dyn Handle>> {
        let dsn = if host.dsn.is_empty() {
            self.builder.dialect().build_dsn(host)
        } else {
            host.dsn.clone()
        };
        let target = ConnectTarget {
            dsn,
            host: host.clone(),
        };

        match self.driver.connect(&target) {
            Ok(handle) => {
                info!(dsn = %target.dsn, "connected");
                Ok(handle)
            }
            Err(e) => match fallback {
                Some(fallback) => {
                    warn!(dsn = %target.dsn, error = %e, "connect failed, falling back to master");
                    self.connect(fallback, None)
                }
                None => {
                    error!(dsn = %target.dsn, error = %e, "connect failed");
                    Err(TillerError::Connection {
                        message: e.to_string(),
                    })
                }
            },
        }
    }

    fn link(&mut self, role: Role) -> TillerResult<&mut Box<dyn Handle>> {
        let slot = if role == Role::Slave && self.splits_reads() {
            &mut self.slave
        } else {
            &mut self.master
        };
        slot.as_mut()
            .ok_or_else(|| TillerError::internal("no open handle for role"))
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn remember(&mut self, compiled: &CompiledSql) {
        self.last_sql.clone_from(&compiled.sql);
        self.last_binds = compiled.binds.clone();
    }

    fn should_reconnect(&self, message: &str, allow_in_trans: bool) -> bool {
        self.config.break_reconnect
            && (self.trans_depth == 0 || allow_in_trans)
            && self.config.is_break_message(message)
    }

    /// Runs a compiled statement, reconnecting once on connection loss.
    fn run<T, F>(&mut self, compiled: &CompiledSql, master: bool, mut finish: F) -> TillerResult<T>
    where
        F: FnMut(&mut dyn PreparedStatement) -> DriverResult<T>,
    {
        self.remember(compiled);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let failure = match self.attempt(compiled, master, &mut finish) {
                Ok((value, role)) => {
                    self.trace(compiled, started.elapsed(), role);
                    return Ok(value);
                }
                Err(failure) => failure,
            };
            self.statement = None;

            match failure {
                Failure::Fatal(e) => return Err(e),
                Failure::Bind(name, e) => {
                    return Err(TillerError::Bind {
                        name,
                        message: e.to_string(),
                        sql: compiled.sql.clone(),
                        binds: compiled.binds.to_string(),
                    });
                }
                Failure::Driver(e) => {
                    let message = e.to_string();
                    if attempt == 0 && self.should_reconnect(&message, false) {
                        attempt += 1;
                        warn!(error = %message, "connection lost, reconnecting");
                        self.close();
                        continue;
                    }
                    return Err(TillerError::Execution {
                        message,
                        sql: compiled.reconstruct(),
                    });
                }
            }
        }
    }

    fn attempt<T, F>(
        &mut self,
        compiled: &CompiledSql,
        master: bool,
        finish: &mut F,
    ) -> Result<(T, Role), Failure>
    where
        F: FnMut(&mut dyn PreparedStatement) -> DriverResult<T>,
    {
        let role = self.init_connect(master)?;
        let reusable = self
            .statement
            .as_ref()
            .is_some_and(|p| p.role == role && p.sql == compiled.sql);
        if !reusable {
            self.statement = None;
            let stmt = self
                .link(role)?
                .prepare(&compiled.sql)
                .map_err(Failure::Driver)?;
            self.statement = Some(Prepared {
                role,
                sql: compiled.sql.clone(),
                stmt,
            });
        }

        let Some(prepared) = self.statement.as_mut() else {
            return Err(Failure::Fatal(TillerError::internal("statement not prepared")));
        };
        let stmt = prepared.stmt.as_mut();

        for entry in compiled.binds.iter() {
            let param = if is_positional(&entry.name) {
                let position = entry.name.parse().map_err(|_| {
                    Failure::Bind(
                        entry.name.clone(),
                        DriverError::Bind("position out of range".to_string()),
                    )
                })?;
                Param::Position(position)
            } else {
                Param::Named(entry.name.clone())
            };
            let value = entry.bind_type.coerce(&entry.value);
            stmt.bind(&param, &value, entry.bind_type)
                .map_err(|e| Failure::Bind(entry.name.clone(), e))?;
        }

        stmt.execute().map_err(Failure::Driver)?;
        let value = finish(stmt).map_err(Failure::Driver)?;
        Ok((value, role))
    }

    /// Runs a transaction control statement on the master.
    pub(crate) fn exec_control(&mut self, sql: &str, retry: bool) -> TillerResult<()> {
        let mut attempt = 0;
        loop {
            let role = self.init_connect(true)?;
            let started = Instant::now();
            match self.link(role)?.exec(sql) {
                Ok(_) => {
                    self.last_sql = sql.to_string();
                    self.last_binds = BindTable::new();
                    let compiled = CompiledSql {
                        sql: sql.to_string(),
                        binds: BindTable::new(),
                    };
                    self.trace(&compiled, started.elapsed(), role);
                    return Ok(());
                }
                Err(e) => {
                    let message = e.to_string();
                    if retry && attempt == 0 && self.should_reconnect(&message, true) {
                        attempt += 1;
                        warn!(error = %message, sql, "connection lost, reconnecting");
                        self.close();
                        continue;
                    }
                    return Err(TillerError::transaction(format!("{sql} failed: {message}")));
                }
            }
        }
    }

    fn trace(&self, compiled: &CompiledSql, elapsed: Duration, role: Role) {
        if !self.config.debug && self.listeners.is_empty() {
            return;
        }
        let sql = compiled.reconstruct();
        if self.config.debug {
            self.logger.record(
                &format!("[ SQL ] {sql} [ RunTime:{:.6}s ]", elapsed.as_secs_f64()),
                LogLevel::Sql,
            );
        }
        for listener in &self.listeners {
            listener(&sql, elapsed, role == Role::Master);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.builder.dialect().name())
            .field("deploy", &self.config.deploy)
            .field("master_open", &self.master.is_some())
            .field("slave_open", &self.slave.is_some())
            .field("trans_depth", &self.trans_depth)
            .finish_non_exhaustive()
    }
}

fn select_only(options: &mut QueryOptions, field: &str) {
    options.field_all = false;
    options.except.clear();
    options.field = vec![if is_raw_field(field) {
        FieldItem::Raw(field.to_string())
    } else {
        FieldItem::Column {
            name: field.to_string(),
            alias: None,
        }
    }];
}

fn raw_compiled(sql: &str, binds: &[(&str, Value)]) -> TillerResult<CompiledSql> {
    let mut table = BindTable::new();
    for (name, value) in binds {
        table.insert(name.trim_start_matches(':'), value.clone(), value.bind_type())?;
    }
    Ok(CompiledSql {
        sql: sql.to_string(),
        binds: table,
    })
}

/// Adds `step` to the pending total under `guid`.
///
/// Returns the total to write once `window` has passed since the first
/// pending step at `now` (Unix millis), `None` while still accumulating.
fn accumulate(
    cache: &dyn Cache,
    guid: &str,
    step: i64,
    window: Duration,
    now: u64,
) -> TillerResult<Option<i64>> {
    let time_key = format!("{guid}_time");
    let window = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);

    match cache.get(&time_key).and_then(|v| v.as_u64()) {
        None => {
            cache.set(&time_key, now.into(), None)?;
            cache.inc(guid, step)?;
            Ok(None)
        }
        Some(since) if now >= since.saturating_add(window) => {
            let total = cache.inc(guid, step)?;
            cache.delete(guid)?;
            cache.delete(&time_key)?;
            Ok((total != 0).then_some(total))
        }
        Some(_) => {
            cache.inc(guid, step)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tiller_cache::{ManualClock, MemoryCache};
    use tiller_common::{BindType, Deploy, ErrorCode};
    use tiller_query::ColumnInfo;

    use super::*;
    use crate::driver::MemoryDriver;

    fn single() -> DatabaseConfig {
        DatabaseConfig::builder()
            .database("app")
            .dsn("mem://db")
            .build()
    }

    fn distributed() -> DatabaseConfig {
        DatabaseConfig::builder()
            .deploy(Deploy::Distributed)
            .hostname("10.0.0.1,10.0.0.2")
            .dsn("mem://master,mem://replica")
            .database("app")
            .rw_separate(true)
            .build()
    }

    fn open(config: DatabaseConfig) -> (Connection, MemoryDriver) {
        let driver = MemoryDriver::new();
        driver.define_table(
            "user",
            vec![
                ColumnInfo::new("id", "int(11)", true),
                ColumnInfo::new("name", "varchar(32)", false),
                ColumnInfo::new("score", "int(11)", false),
            ],
        );
        let conn = Connection::new(config, Arc::new(driver.clone()))
            .unwrap()
            .with_seed(7);
        (conn, driver)
    }

    #[test]
    fn test_select_binds_typed_values() {
        let (mut conn, driver) = open(single());
        driver.push_rows(vec![Row::from_pairs([("id", 1)])]);

        let rows = conn
            .select(
                Query::new()
                    .table("user")
                    .where_eq("id", "")
                    .where_eq("name", "o'neil"),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(conn.num_rows(), 1);

        let executed = driver.statements();
        assert_eq!(
            executed[0].sql,
            "SELECT * FROM user WHERE id = :where_id AND name = :where_name"
        );
        assert_eq!(executed[0].param("where_id"), Some(&Value::Int(0)));
        assert_eq!(executed[0].params[0].2, BindType::Int);
        assert_eq!(
            conn.get_last_sql(),
            "SELECT * FROM user WHERE id = '' AND name = 'o''neil'"
        );
        assert_eq!(conn.context().query_times(), 1);
    }

    #[test]
    fn test_prepared_statement_is_reused() {
        let (mut conn, driver) = open(single());
        for _ in 0..3 {
            conn.select(Query::new().table("user").where_eq("id", 1))
                .unwrap();
        }
        assert_eq!(driver.prepare_count(), 1);
        assert_eq!(driver.statements().len(), 3);
    }

    #[test]
    fn test_update_without_condition_sends_nothing() {
        let (mut conn, driver) = open(single());
        let err = conn
            .update(Query::new().table("user").set("name", "ann"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingCondition);
        assert!(driver.statements().is_empty());
    }

    #[test]
    fn test_insert_get_id_and_aggregates() {
        let (mut conn, driver) = open(single());
        let id = conn
            .insert_get_id(Query::new().table("user").set("name", "ann"))
            .unwrap();
        assert_eq!(id.as_deref(), Some("1"));

        driver.push_rows(vec![Row::from_pairs([("tiller_count", "3")])]);
        assert_eq!(conn.count(Query::new().table("user")).unwrap(), 3);
        assert!(driver
            .executed_sql()
            .last()
            .unwrap()
            .starts_with("SELECT COUNT(*) AS tiller_count FROM user"));

        driver.push_rows(vec![
            Row::from_pairs([("name", "ann")]),
            Row::from_pairs([("name", "bob")]),
        ]);
        let names = conn.column(Query::new().table("user"), "name").unwrap();
        assert_eq!(names, vec![Value::from("ann"), Value::from("bob")]);
    }

    #[test]
    fn test_reconnects_once_on_lost_connection() {
        let mut config = single();
        config.break_reconnect = true;
        let (mut conn, driver) = open(config);

        driver.fail_next("MySQL server has gone away");
        conn.select(Query::new().table("user")).unwrap();
        assert_eq!(driver.connects().len(), 2);

        driver.fail_next("MySQL server has gone away");
        driver.fail_next("MySQL server has gone away");
        let err = conn.select(Query::new().table("user")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ExecutionFailed);
    }

    #[test]
    fn test_no_reconnect_inside_transaction() {
        let mut config = single();
        config.break_reconnect = true;
        let (mut conn, driver) = open(config);

        conn.start_trans().unwrap();
        driver.fail_next("lost connection to server");
        assert!(conn.select(Query::new().table("user")).is_err());
        assert_eq!(driver.connects().len(), 1);
    }

    #[test]
    fn test_bind_failure_reports_binds() {
        let (mut conn, driver) = open(single());
        driver.reject_param("where_id");
        let err = conn
            .select(Query::new().table("user").where_eq("id", 5))
            .unwrap_err();
        match err {
            TillerError::Bind { name, binds, .. } => {
                assert_eq!(name, "where_id");
                assert!(binds.contains("where_id"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_write_split() {
        let (mut conn, driver) = open(distributed());
        conn.select(Query::new().table("user")).unwrap();
        conn.update(Query::new().table("user").where_eq("id", 1).set("name", "x"))
            .unwrap();

        let executed = driver.statements();
        assert_eq!(executed[0].dsn, "mem://replica");
        assert_eq!(executed[1].dsn, "mem://master");
    }

    #[test]
    fn test_read_master_after_write() {
        let mut config = distributed();
        config.read_master = true;
        let (mut conn, driver) = open(config);

        conn.update(Query::new().table("user").where_eq("id", 1).set("name", "x"))
            .unwrap();
        conn.select(Query::new().table("user")).unwrap();
        let executed = driver.statements();
        assert_eq!(executed[1].dsn, "mem://master");
    }

    #[test]
    fn test_replica_falls_back_to_master() {
        let (mut conn, driver) = open(distributed());
        driver.refuse("mem://replica");
        conn.select(Query::new().table("user")).unwrap();
        assert_eq!(driver.statements()[0].dsn, "mem://master");
    }

    #[test]
    fn test_fetch_sql_does_not_execute() {
        let (mut conn, driver) = open(single());
        let sql = conn
            .fetch_sql(Query::new().table("user").where_eq("name", "ann"))
            .unwrap();
        assert_eq!(sql, "SELECT * FROM user WHERE name = 'ann'");
        assert!(driver.connects().is_empty());
    }

    #[test]
    fn test_cached_select_hits_once() {
        let cache = Arc::new(MemoryCache::new());
        let (conn, driver) = open(single());
        let mut conn = conn.with_cache(cache.clone());
        driver.push_rows(vec![Row::from_pairs([("id", 1)])]);

        let query = || Query::new().table("user").where_eq("id", 1).cache(None);
        let first = conn.select(query()).unwrap();
        let second = conn.select(query()).unwrap();
        assert_eq!(first, second);
        assert_eq!(driver.statements().len(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_find_cache_invalidated_by_pk_update() {
        let cache = Arc::new(MemoryCache::new());
        let (conn, driver) = open(single());
        let mut conn = conn.with_cache(cache.clone());
        driver.push_rows(vec![Row::from_pairs([("id", 1)])]);

        conn.find(Query::new().table("user").where_eq("id", 1).cache(None))
            .unwrap();
        assert!(cache.has("tiller:app.user|1"));

        conn.update(
            Query::new()
                .table("user")
                .data([("id", Value::Int(1)), ("name", Value::from("x"))])
                .cache(None),
        )
        .unwrap();
        assert!(!cache.has("tiller:app.user|1"));
    }

    #[test]
    fn test_lazy_inc_accumulates() {
        let cache = Arc::new(MemoryCache::new());
        let (conn, driver) = open(single());
        let mut conn = conn.with_cache(cache);
        let query = || Query::new().table("user").where_eq("id", 1);

        let first = conn
            .set_inc(query(), "score", 2, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(first, None);
        assert!(driver.statements().is_empty());

        let flushed = conn
            .set_inc(query(), "score", 3, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(flushed, Some(1));
        let executed = driver.statements();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].param("data_score"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_lazy_window_follows_clock() {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let (conn, driver) = open(single());
        let mut conn = conn.with_cache(cache).with_clock(clock.clone());
        let window = Some(Duration::from_secs(60));
        let query = || Query::new().table("user").where_eq("id", 1);

        assert_eq!(conn.set_dec(query(), "score", 1, window).unwrap(), None);
        clock.advance(Duration::from_secs(59));
        assert_eq!(conn.set_dec(query(), "score", 2, window).unwrap(), None);
        assert!(driver.statements().is_empty());

        clock.advance(Duration::from_secs(1));
        assert_eq!(conn.set_dec(query(), "score", 4, window).unwrap(), Some(1));
        let executed = driver.statements();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].param("data_score"), Some(&Value::Int(7)));

        assert_eq!(conn.set_dec(query(), "score", 1, window).unwrap(), None);
        assert_eq!(driver.statements().len(), 1);
    }

    #[test]
    fn test_set_dec_without_cache_runs_immediately() {
        let (mut conn, driver) = open(single());
        let result = conn
            .set_dec(
                Query::new().table("user").where_eq("id", 1),
                "score",
                1,
                Some(Duration::from_secs(60)),
            )
            .unwrap();
        assert_eq!(result, Some(1));
        assert_eq!(
            driver.executed_sql(),
            vec!["UPDATE user SET score = score - :data_score WHERE id = :where_id"]
        );
    }

    #[test]
    fn test_listeners_see_every_statement() {
        let (mut conn, _driver) = open(single());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        conn.listen(move |sql, _, master| {
            assert!(sql.starts_with("SELECT"));
            assert!(master);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        conn.select(Query::new().table("user")).unwrap();
        conn.select(Query::new().table("user")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_schema_loaded_once() {
        let (mut conn, _driver) = open(single());
        let schema = conn.table_schema("user").unwrap();
        assert_eq!(schema.pk, PrimaryKey::Single("id".to_string()));
        assert_eq!(conn.context().schema().len(), 1);
        assert!(conn.table_schema("missing").is_err());
    }
}
