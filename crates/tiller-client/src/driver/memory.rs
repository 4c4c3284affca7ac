//! In-memory recording driver.
//!
//! Records every connect, prepare and statement, answers selects from a
//! queue of scripted result sets and can be told to refuse connections or
//! fail the next statement. Clones share state, so a test keeps one clone
//! for inspection while the connection owns another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tiller_common::{BindType, Row, Value};
use tiller_query::ColumnInfo;

use super::{ConnectTarget, Driver, DriverError, DriverResult, Handle, Param, PreparedStatement};

/// A statement as it reached the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// DSN of the handle that ran it.
    pub dsn: String,
    /// SQL text.
    pub sql: String,
    /// Bound parameters in bind order.
    pub params: Vec<(Param, Value, BindType)>,
}

impl ExecutedStatement {
    /// Returns the value bound to a named parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find_map(|(p, v, _)| match p {
            Param::Named(n) if n == name => Some(v),
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
struct State {
    connects: Vec<String>,
    refused: HashSet<String>,
    prepares: usize,
    statements: Vec<ExecutedStatement>,
    results: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    failures: VecDeque<String>,
    rejected_params: HashSet<String>,
    tables: HashMap<String, Vec<ColumnInfo>>,
    last_ids: HashMap<String, String>,
    next_id: u64,
}

impl State {
    fn take_failure(&mut self) -> DriverResult<()> {
        match self.failures.pop_front() {
            Some(message) => Err(DriverError::Execute(message)),
            None => Ok(()),
        }
    }
}

/// Driver that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<State>>,
}

impl MemoryDriver {
    /// Creates a driver with no tables and no scripted results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table for column listings.
    pub fn define_table(&self, table: &str, columns: Vec<ColumnInfo>) {
        self.state.lock().tables.insert(table.to_string(), columns);
    }

    /// Queues the result set returned by the next select.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.lock().results.push_back(rows);
    }

    /// Queues the affected-row count of the next write.
    pub fn push_affected(&self, count: u64) {
        self.state.lock().affected.push_back(count);
    }

    /// Fails the next executed statement with `message`.
    pub fn fail_next(&self, message: &str) {
        self.state.lock().failures.push_back(message.to_string());
    }

    /// Refuses connections to `dsn`.
    pub fn refuse(&self, dsn: &str) {
        self.state.lock().refused.insert(dsn.to_string());
    }

    /// Accepts connections to `dsn` again.
    pub fn accept(&self, dsn: &str) {
        self.state.lock().refused.remove(dsn);
    }

    /// Rejects binding the named parameter.
    pub fn reject_param(&self, name: &str) {
        self.state.lock().rejected_params.insert(name.to_string());
    }

    /// Returns every executed statement.
    #[must_use]
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.state.lock().statements.clone()
    }

    /// Returns the SQL of every executed statement.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.state
            .lock()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Returns the DSN of every successful connect.
    #[must_use]
    pub fn connects(&self) -> Vec<String> {
        self.state.lock().connects.clone()
    }

    /// Returns the number of prepares.
    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.state.lock().prepares
    }

    /// Forgets recorded connects, prepares and statements.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.connects.clear();
        state.prepares = 0;
        state.statements.clear();
    }
}

impl Driver for MemoryDriver {
    fn connect(&self, target: &ConnectTarget) -> DriverResult<Box<dyn Handle>> {
        let mut state = self.state.lock();
        if state.refused.contains(&target.dsn) {
            return Err(DriverError::Connect(format!(
                "can't connect to server '{}'",
                target.dsn
            )));
        }
        state.connects.push(target.dsn.clone());
        Ok(Box::new(MemoryHandle {
            dsn: target.dsn.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryHandle {
    dsn: String,
    state: Arc<Mutex<State>>,
}

impl Handle for MemoryHandle {
    fn prepare(&mut self, sql: &str) -> DriverResult<Box<dyn PreparedStatement>> {
        self.state.lock().prepares += 1;
        Ok(Box::new(MemoryStatement {
            dsn: self.dsn.clone(),
            sql: sql.to_string(),
            state: Arc::clone(&self.state),
            params: Vec::new(),
            rows: Vec::new(),
            count: 0,
        }))
    }

    fn exec(&mut self, sql: &str) -> DriverResult<u64> {
        let mut state = self.state.lock();
        state.take_failure()?;
        state.statements.push(ExecutedStatement {
            dsn: self.dsn.clone(),
            sql: sql.to_string(),
            params: Vec::new(),
        });
        Ok(state.affected.pop_front().unwrap_or(0))
    }

    fn last_insert_id(&self) -> Option<String> {
        self.state.lock().last_ids.get(&self.dsn).cloned()
    }

    fn columns(&mut self, table: &str) -> DriverResult<Vec<ColumnInfo>> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| DriverError::Execute(format!("table '{table}' doesn't exist")))
    }
}

struct MemoryStatement {
    dsn: String,
    sql: String,
    state: Arc<Mutex<State>>,
    params: Vec<(Param, Value, BindType)>,
    rows: Vec<Row>,
    count: u64,
}

impl PreparedStatement for MemoryStatement {
    fn bind(&mut self, param: &Param, value: &Value, bind_type: BindType) -> DriverResult<()> {
        if let Param::Named(name) = param {
            if self.state.lock().rejected_params.contains(name) {
                return Err(DriverError::Bind(format!("parameter '{name}' rejected")));
            }
        }
        match self.params.iter_mut().find(|(p, _, _)| p == param) {
            Some(slot) => *slot = (param.clone(), value.clone(), bind_type),
            None => self.params.push((param.clone(), value.clone(), bind_type)),
        }
        Ok(())
    }

    fn execute(&mut self) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.take_failure()?;
        state.statements.push(ExecutedStatement {
            dsn: self.dsn.clone(),
            sql: self.sql.clone(),
            params: self.params.clone(),
        });

        let head = self
            .sql
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match head.as_str() {
            "SELECT" => {
                self.rows = state.results.pop_front().unwrap_or_default();
                self.count = self.rows.len() as u64;
            }
            "INSERT" | "REPLACE" => {
                self.rows.clear();
                self.count = state.affected.pop_front().unwrap_or(1);
                state.next_id += 1;
                let id = state.next_id.to_string();
                state.last_ids.insert(self.dsn.clone(), id);
            }
            _ => {
                self.rows.clear();
                self.count = state.affected.pop_front().unwrap_or(1);
            }
        }
        Ok(())
    }

    fn fetch_all(&mut self) -> DriverResult<Vec<Row>> {
        Ok(std::mem::take(&mut self.rows))
    }

    fn row_count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_common::HostConfig;

    fn target(dsn: &str) -> ConnectTarget {
        ConnectTarget {
            dsn: dsn.to_string(),
            host: HostConfig::default(),
        }
    }

    #[test]
    fn test_records_statements_and_scripted_rows() {
        let driver = MemoryDriver::new();
        driver.push_rows(vec![Row::from_pairs([("id", 1)])]);

        let mut handle = driver.connect(&target("mem://a")).unwrap();
        let mut stmt = handle.prepare("SELECT id FROM t WHERE id = :id").unwrap();
        stmt.bind(&Param::Named("id".to_string()), &Value::Int(1), BindType::Int)
            .unwrap();
        stmt.execute().unwrap();

        assert_eq!(stmt.fetch_all().unwrap().len(), 1);
        assert_eq!(stmt.row_count(), 1);
        let executed = driver.statements();
        assert_eq!(executed[0].param("id"), Some(&Value::Int(1)));
        assert_eq!(driver.connects(), vec!["mem://a".to_string()]);
    }

    #[test]
    fn test_insert_ids_and_failures() {
        let driver = MemoryDriver::new();
        let mut handle = driver.connect(&target("mem://a")).unwrap();
        let mut stmt = handle.prepare("INSERT INTO t (a) VALUES (1)").unwrap();
        stmt.execute().unwrap();
        stmt.execute().unwrap();
        assert_eq!(handle.last_insert_id().as_deref(), Some("2"));

        driver.fail_next("deadlock found");
        assert!(matches!(stmt.execute(), Err(DriverError::Execute(_))));
        assert_eq!(handle.exec("BEGIN").unwrap(), 0);
    }

    #[test]
    fn test_refuse_and_columns() {
        let driver = MemoryDriver::new();
        driver.refuse("mem://down");
        assert!(driver.connect(&target("mem://down")).is_err());

        driver.define_table("user", vec![ColumnInfo::new("id", "int", true)]);
        let mut handle = driver.connect(&target("mem://up")).unwrap();
        assert_eq!(handle.columns("user").unwrap().len(), 1);
        assert!(handle.columns("missing").is_err());
    }
}
