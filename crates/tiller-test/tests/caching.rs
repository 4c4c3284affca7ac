//! Result cache and lazy counter scenarios.

use std::sync::Arc;
use std::time::Duration;

use tiller_cache::{Cache, ManualClock, MemoryCache};
use tiller_common::{ErrorCode, Row, Value};
use tiller_query::Query;
use tiller_test::{open, single_config, Fixture};

fn cached(cache: &Arc<MemoryCache>) -> Fixture {
    let fx = open(single_config());
    Fixture {
        conn: fx.conn.with_cache(cache.clone()),
        driver: fx.driver,
    }
}

#[test]
fn test_second_read_is_served_from_cache() {
    let cache = Arc::new(MemoryCache::new());
    let mut fx = cached(&cache);
    fx.driver.push_rows(vec![Row::from_pairs([("id", 1)])]);

    let query = || Query::new().table("user").where_eq("status", 1).cache(None);
    let first = fx.conn.select(query()).unwrap();
    let second = fx.conn.select(query()).unwrap();

    assert_eq!(first, second);
    assert_eq!(fx.driver.statements().len(), 1);
    assert_eq!(fx.conn.context().query_times(), 1);

    fx.conn
        .select(Query::new().table("user").where_eq("status", 2).cache(None))
        .unwrap();
    assert_eq!(fx.driver.statements().len(), 2);
}

#[test]
fn test_explicit_key_expires() {
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
    let mut fx = cached(&cache);
    let query = || {
        Query::new()
            .table("user")
            .cache_key("active_users", Some(Duration::from_secs(30)))
    };

    fx.conn.select(query()).unwrap();
    assert!(cache.has("active_users"));
    fx.conn.select(query()).unwrap();
    assert_eq!(fx.driver.statements().len(), 1);

    clock.advance(Duration::from_secs(31));
    fx.conn.select(query()).unwrap();
    assert_eq!(fx.driver.statements().len(), 2);
}

#[test]
fn test_write_clears_tag() {
    let cache = Arc::new(MemoryCache::new());
    let mut fx = cached(&cache);

    fx.conn
        .select(Query::new().table("user").cache_key("user_list", None).cache_tag("user"))
        .unwrap();
    fx.conn
        .select(Query::new().table("user").cache_key("user_top", None).cache_tag("user"))
        .unwrap();
    assert!(cache.has("user_list") && cache.has("user_top"));

    fx.conn
        .update(
            Query::new()
                .table("user")
                .where_eq("id", 1)
                .set("name", "ann")
                .cache_tag("user"),
        )
        .unwrap();
    assert!(!cache.has("user_list"));
    assert!(!cache.has("user_top"));
}

#[test]
fn test_find_uses_primary_key_entry() {
    let cache = Arc::new(MemoryCache::new());
    let mut fx = cached(&cache);
    fx.driver.push_rows(vec![Row::from_pairs([("id", 5)])]);

    let row = fx
        .conn
        .find(Query::new().table("user").where_eq("id", 5).cache(None))
        .unwrap();
    assert!(row.is_some());
    assert!(cache.has("tiller:app.user|5"));

    fx.conn
        .delete(Query::new().table("user").where_eq("id", 5).cache(None))
        .unwrap();
    assert!(!cache.has("tiller:app.user|5"));
}

#[test]
fn test_closure_condition_cannot_derive_key() {
    let cache = Arc::new(MemoryCache::new());
    let mut fx = cached(&cache);

    let err = fx
        .conn
        .select(
            Query::new()
                .table("user")
                .where_group(|q| q.where_eq("status", 1).where_or("score", ">", 10))
                .cache(None),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CacheKey);
    assert!(fx.driver.statements().is_empty());

    fx.conn
        .select(
            Query::new()
                .table("user")
                .where_group(|q| q.where_eq("status", 1))
                .cache_key("grouped", None),
        )
        .unwrap();
    assert!(cache.has("grouped"));
}

#[test]
fn test_lazy_counter_flushes_accumulated_step() {
    let cache = Arc::new(MemoryCache::new());
    let mut fx = cached(&cache);
    let query = || Query::new().table("user").where_eq("id", 1);

    assert_eq!(
        fx.conn
            .set_inc(query(), "score", 1, Some(Duration::from_secs(3600)))
            .unwrap(),
        None
    );
    assert_eq!(
        fx.conn
            .set_inc(query(), "score", 4, Some(Duration::from_secs(3600)))
            .unwrap(),
        None
    );
    assert!(fx.driver.statements().is_empty());

    let flushed = fx
        .conn
        .set_inc(query(), "score", 2, Some(Duration::ZERO))
        .unwrap();
    assert_eq!(flushed, Some(1));

    let executed = fx.driver.statements();
    assert_eq!(executed.len(), 1);
    assert_eq!(
        executed[0].sql,
        "UPDATE user SET score = score + :data_score WHERE id = :where_id"
    );
    assert_eq!(executed[0].param("data_score"), Some(&Value::Int(7)));
}

#[test]
fn test_lazy_counters_are_keyed_by_direction_and_condition() {
    let cache = Arc::new(MemoryCache::new());
    let mut fx = cached(&cache);
    let window = Some(Duration::from_secs(3600));

    fx.conn
        .set_inc(Query::new().table("user").where_eq("id", 1), "score", 1, window)
        .unwrap();
    fx.conn
        .set_dec(Query::new().table("user").where_eq("id", 1), "score", 1, window)
        .unwrap();
    fx.conn
        .set_inc(Query::new().table("user").where_eq("id", 2), "score", 1, window)
        .unwrap();

    // Each pending counter keeps a total and a start time.
    assert_eq!(cache.len(), 6);
    assert!(fx.driver.statements().is_empty());
}
