//! Nested transaction scenarios.

use tiller_common::{ErrorCode, TillerError, TillerResult};
use tiller_query::Query;
use tiller_test::{distributed_config, open, single_config};

fn count(sql: &[String], statement: &str) -> usize {
    sql.iter().filter(|s| s.as_str() == statement).count()
}

#[test]
fn test_depth_sequence_issues_one_begin_and_one_commit() {
    let mut fx = open(single_config());
    let conn = &mut fx.conn;

    assert_eq!(conn.trans_depth(), 0);
    conn.start_trans().unwrap();
    assert_eq!(conn.trans_depth(), 1);
    conn.start_trans().unwrap();
    assert_eq!(conn.trans_depth(), 2);
    conn.commit().unwrap();
    assert_eq!(conn.trans_depth(), 1);
    conn.commit().unwrap();
    assert_eq!(conn.trans_depth(), 0);

    let sql = fx.driver.executed_sql();
    assert_eq!(count(&sql, "BEGIN"), 1);
    assert_eq!(count(&sql, "COMMIT"), 1);
    assert_eq!(count(&sql, "SAVEPOINT trans2"), 1);
}

#[test]
fn test_failing_callback_rolls_back_whole_stack() {
    let mut fx = open(single_config());

    let result: TillerResult<u64> = fx.conn.transaction(|c| {
        c.insert(Query::new().table("user").set("name", "ann"))?;
        c.transaction(|inner| {
            inner.update(Query::new().table("user").where_eq("id", 1).set("status", 0))?;
            Err(TillerError::invalid_argument("quota exceeded"))
        })
    });

    let err = result.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert_eq!(fx.conn.trans_depth(), 0);

    let sql = fx.driver.executed_sql();
    assert_eq!(sql.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(sql.last().map(String::as_str), Some("ROLLBACK"));
    assert_eq!(count(&sql, "ROLLBACK"), 1);
    assert_eq!(count(&sql, "COMMIT"), 0);
}

#[test]
fn test_successful_callback_commits() {
    let mut fx = open(single_config());
    let id = fx
        .conn
        .transaction(|c| c.insert_get_id(Query::new().table("user").set("name", "ann")))
        .unwrap();

    assert_eq!(id.as_deref(), Some("1"));
    assert_eq!(
        fx.driver.executed_sql(),
        vec![
            "BEGIN",
            "INSERT INTO user (name) VALUES (:data_name)",
            "COMMIT"
        ]
    );
}

#[test]
fn test_failed_commit_rolls_back() {
    let mut fx = open(single_config());
    let driver = fx.driver.clone();

    let result = fx.conn.transaction(|_| {
        driver.fail_next("deadlock found when trying to get lock");
        Ok(())
    });

    assert_eq!(result.unwrap_err().code(), ErrorCode::Transaction);
    assert_eq!(fx.conn.trans_depth(), 0);
    assert_eq!(fx.driver.executed_sql(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn test_reads_inside_transaction_use_master() {
    let mut fx = open(distributed_config(3, 1));
    fx.conn.start_trans().unwrap();
    fx.conn.select(Query::new().table("user")).unwrap();
    fx.conn.commit().unwrap();
    fx.conn.select(Query::new().table("user")).unwrap();

    let executed = fx.driver.statements();
    assert!(executed[..3].iter().all(|s| s.dsn == "mem://db0"));
    assert_ne!(executed[3].dsn, "mem://db0");
}

#[test]
fn test_begin_reconnects_after_lost_connection() {
    let mut config = single_config();
    config.break_reconnect = true;
    let mut fx = open(config);

    fx.conn.select(Query::new().table("user")).unwrap();
    fx.driver.fail_next("SQLSTATE[HY000]: General error: 2006 MySQL server has gone away");
    fx.conn.start_trans().unwrap();

    assert_eq!(fx.conn.trans_depth(), 1);
    assert_eq!(fx.driver.connects().len(), 2);
}
