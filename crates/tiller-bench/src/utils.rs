//! Benchmark utilities and helpers.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiller_common::Row;
use tiller_query::Query;

/// Generates a random alphanumeric string.
pub fn random_string(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Builds a query with `conditions` AND-ed equality conditions on
/// distinct fields plus one IN list.
pub fn wide_query(conditions: usize) -> Query {
    let mut rng = StdRng::seed_from_u64(42);
    let mut query = Query::new().table("user");
    for i in 0..conditions {
        query = query.where_eq(&format!("field_{i}"), random_string(&mut rng, 12));
    }
    query.where_in("status", [1, 2, 3, 4, 5])
}

/// Builds a query that reuses one field in every condition, forcing bind
/// name collisions.
pub fn colliding_query(conditions: usize) -> Query {
    let mut query = Query::new().table("user");
    for i in 0..conditions {
        query = query.where_or("name", "=", i as i64);
    }
    query
}

/// Generates user rows for batch inserts.
pub fn generate_user_rows(count: usize) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            Row::from_pairs([
                ("name", random_string(&mut rng, 8)),
                ("email", format!("{}@example.com", random_string(&mut rng, 6))),
            ])
        })
        .collect()
}
