//! Nested transactions.
//!
//! The outermost level issues BEGIN/COMMIT/ROLLBACK; inner levels use
//! savepoints named `trans<depth>` when the dialect supports them and are
//! no-ops otherwise.

use tiller_common::{TillerError, TillerResult, SAVEPOINT_PREFIX};
use tracing::{debug, error};

use crate::connection::Connection;

impl Connection {
    /// Opens a transaction or, when one is open, a savepoint.
    pub fn start_trans(&mut self) -> TillerResult<()> {
        let depth = self.trans_depth + 1;
        if depth == 1 {
            self.exec_control("BEGIN", true)?;
        } else if self.builder().dialect().supports_savepoint() {
            self.exec_control(&format!("SAVEPOINT {SAVEPOINT_PREFIX}{depth}"), false)?;
        }
        self.trans_depth = depth;
        debug!(depth, "transaction started");
        Ok(())
    }

    /// Commits the innermost level.
    pub fn commit(&mut self) -> TillerResult<()> {
        let depth = self.trans_depth;
        match depth {
            0 => return Err(TillerError::transaction("commit without an open transaction")),
            1 => self.exec_control("COMMIT", false)?,
            _ => {
                if self.builder().dialect().supports_savepoint() {
                    self.exec_control(
                        &format!("RELEASE SAVEPOINT {SAVEPOINT_PREFIX}{depth}"),
                        false,
                    )?;
                }
            }
        }
        self.trans_depth = depth - 1;
        debug!(depth, "transaction committed");
        Ok(())
    }

    /// Rolls back the innermost level.
    pub fn rollback(&mut self) -> TillerResult<()> {
        let depth = self.trans_depth;
        match depth {
            0 => {
                return Err(TillerError::transaction(
                    "rollback without an open transaction",
                ))
            }
            1 => self.exec_control("ROLLBACK", false)?,
            _ => {
                if self.builder().dialect().supports_savepoint() {
                    self.exec_control(
                        &format!("ROLLBACK TO SAVEPOINT {SAVEPOINT_PREFIX}{depth}"),
                        false,
                    )?;
                }
            }
        }
        self.trans_depth = depth - 1;
        debug!(depth, "transaction rolled back");
        Ok(())
    }

    /// Rolls back every open level with a single ROLLBACK.
    ///
    /// The depth is reset even when the ROLLBACK fails.
    pub fn rollback_all(&mut self) -> TillerResult<()> {
        if self.trans_depth == 0 {
            return Ok(());
        }
        let result = self.exec_control("ROLLBACK", false);
        self.trans_depth = 0;
        result
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` succeeds. When `f` or the commit fails every open
    /// level is rolled back and the original error returned.
    pub fn transaction<T, F>(&mut self, f: F) -> TillerResult<T>
    where
        F: FnOnce(&mut Self) -> TillerResult<T>,
    {
        self.start_trans()?;
        let result = f(self).and_then(|value| self.commit().map(|()| value));
        if let Err(e) = &result {
            error!(error = %e, "transaction failed, rolling back");
            if let Err(rollback) = self.rollback_all() {
                error!(error = %rollback, "rollback failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tiller_common::{DatabaseConfig, ErrorCode};

    use crate::driver::MemoryDriver;

    use super::*;

    fn connection(dialect: &str) -> (Connection, MemoryDriver) {
        let driver = MemoryDriver::new();
        let config = DatabaseConfig::builder()
            .dialect(dialect)
            .database("app")
            .build();
        let conn = Connection::new(config, Arc::new(driver.clone())).unwrap();
        (conn, driver)
    }

    #[test]
    fn test_nested_savepoints() {
        let (mut conn, driver) = connection("mysql");
        conn.start_trans().unwrap();
        conn.start_trans().unwrap();
        assert_eq!(conn.trans_depth(), 2);
        conn.commit().unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.trans_depth(), 0);

        assert_eq!(
            driver.executed_sql(),
            vec!["BEGIN", "SAVEPOINT trans2", "RELEASE SAVEPOINT trans2", "COMMIT"]
        );
    }

    #[test]
    fn test_inner_levels_without_savepoints() {
        let (mut conn, driver) = connection("generic");
        conn.start_trans().unwrap();
        conn.start_trans().unwrap();
        conn.rollback().unwrap();
        conn.commit().unwrap();
        assert_eq!(driver.executed_sql(), vec!["BEGIN", "COMMIT"]);
    }

    #[test]
    fn test_commit_without_transaction() {
        let (mut conn, _) = connection("mysql");
        let err = conn.commit().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Transaction);
    }

    #[test]
    fn test_closure_failure_rolls_back() {
        let (mut conn, driver) = connection("mysql");
        let result: TillerResult<()> = conn.transaction(|c| {
            c.start_trans()?;
            Err(TillerError::invalid_argument("boom"))
        });
        assert!(result.is_err());
        assert_eq!(conn.trans_depth(), 0);
        assert_eq!(
            driver.executed_sql(),
            vec!["BEGIN", "SAVEPOINT trans2", "ROLLBACK"]
        );
    }

    #[test]
    fn test_rollback_all_resets_depth_on_failure() {
        let (mut conn, driver) = connection("mysql");
        conn.start_trans().unwrap();
        driver.fail_next("server gone");
        assert!(conn.rollback_all().is_err());
        assert_eq!(conn.trans_depth(), 0);
    }
}
