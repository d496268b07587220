//! Tests against live Postgres and Redis instances.
//!
//! Run with `cargo test -- --ignored` once `TEST_DATABASE_URL` and
//! `TEST_REDIS_URL` point at disposable instances. The key store test clears
//! `secret_keys`.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use uuid::Uuid;

use storefront_identity::{
    crypto::{aes::generate_key, key_store::{KeyProvider, PgKeyStore}},
    db,
    middleware_layer::rate_limit::count_attempt,
    repositories::session_record::{PgSessionRecordStore, SessionRecordStore},
};

async fn test_pool() -> deadpool_postgres::Pool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = db::create_pool(&url).unwrap();
    db::ensure_schema(&pool).await.unwrap();
    pool
}

async fn test_redis() -> ConnectionManager {
    let url = std::env::var("TEST_REDIS_URL").expect("TEST_REDIS_URL must be set");
    redis::Client::open(url)
        .unwrap()
        .get_connection_manager()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs a disposable Postgres at TEST_DATABASE_URL"]
async fn test_pg_key_store_race_has_one_winner() {
    let pool = test_pool().await;
    pool.get()
        .await
        .unwrap()
        .execute("DELETE FROM secret_keys", &[])
        .await
        .unwrap();

    // One store per task, so no in-process cache is shared between callers
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = PgKeyStore::new(pool.clone());
            tokio::spawn(async move { store.get_or_create_key().await.unwrap() })
        })
        .collect();

    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await.unwrap());
    }

    let first = keys[0].clone();
    assert!(keys.iter().all(|k| *k == first));

    let rows: i64 = pool
        .get()
        .await
        .unwrap()
        .query_one("SELECT COUNT(*) FROM secret_keys", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(rows, 1);

    let fresh = PgKeyStore::new(pool.clone());
    assert_eq!(fresh.get_or_create_key().await.unwrap(), first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs a disposable Postgres at TEST_DATABASE_URL"]
async fn test_pg_first_login_is_recorded_once() {
    let pool = test_pool().await;
    let store = Arc::new(PgSessionRecordStore::new(pool));
    let openid = format!("owx_{}", Uuid::new_v4().simple());
    let key = generate_key();

    assert!(store.record_first_login(&openid, "secret-1", &key).await.unwrap());
    assert!(!store.record_first_login(&openid, "secret-2", &generate_key()).await.unwrap());

    let racer = format!("owx_{}", Uuid::new_v4().simple());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let racer = racer.clone();
            let key = key.clone();
            tokio::spawn(async move {
                store
                    .record_first_login(&racer, &format!("secret-{}", i), &key)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut written = 0;
    for handle in handles {
        if handle.await.unwrap() {
            written += 1;
        }
    }
    assert_eq!(written, 1);

    let record = store.find_by_subject(&openid).await.unwrap().unwrap();
    assert_eq!(record.openid, openid);
    assert_eq!(record.session_key, "secret-1");
    assert_eq!(record.secret_key, key.to_base64());
}

#[tokio::test]
#[ignore = "needs a disposable Redis at TEST_REDIS_URL"]
async fn test_rate_limit_counter_always_expires() {
    let mut conn = test_redis().await;
    let key = format!("rate_limit:authorize:test-{}", Uuid::new_v4().simple());

    let (attempts, ttl) = count_attempt(&mut conn, &key, 60).await.unwrap();
    assert_eq!(attempts, 1);
    assert!(ttl > 0 && ttl <= 60);

    let (attempts, _) = count_attempt(&mut conn, &key, 60).await.unwrap();
    assert_eq!(attempts, 2);

    // A counter whose expiry was never set gets one on the next attempt
    let stuck = format!("rate_limit:authorize:test-{}", Uuid::new_v4().simple());
    let _: () = redis::cmd("SET").arg(&stuck).arg(50).query_async(&mut conn).await.unwrap();

    let (attempts, ttl) = count_attempt(&mut conn, &stuck, 60).await.unwrap();
    assert_eq!(attempts, 51);
    assert_eq!(ttl, 60);

    let remaining: i64 = redis::cmd("TTL").arg(&stuck).query_async(&mut conn).await.unwrap();
    assert!(remaining > 0);

    let _: () = redis::cmd("DEL").arg(&key).arg(&stuck).query_async(&mut conn).await.unwrap();
}
