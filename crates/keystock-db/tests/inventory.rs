//! Integration tests for the key store against a live PostgreSQL.
//!
//! Run with a scratch database:
//! ```text
//! DATABASE_URL=postgres://localhost/keystock_test cargo test -p keystock-db -- --ignored
//! ```
//! Each test creates its own offer and pool with fresh UUIDs, and codes are
//! generated per run, so tests are safe to re-run against the same database.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use keystock_common::cipher::Cipher;
use keystock_common::models::key::KeyStatus;
use keystock_db::repository::{audit, keys};
use keystock_common::models::audit::AuditAction;
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = PgPool::connect(&url).await.expect("connect");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");
    pool
}

fn test_cipher() -> Cipher {
    Cipher::new(&B64.encode([7u8; 32])).unwrap()
}

fn fresh_code() -> String {
    format!("CODE-{}", Uuid::new_v4())
}

/// Insert an offer + pool fixture. Offers are external reference data, so
/// the fixture writes them directly.
async fn fixture_pool(pg: &PgPool) -> (Uuid, Uuid) {
    let seller_id = Uuid::new_v4();
    let offer_id: (Uuid,) = sqlx::query_as(
        "INSERT INTO offers (seller_id, delivery_type) VALUES ($1, 'digital_key') RETURNING id",
    )
    .bind(seller_id)
    .fetch_one(pg)
    .await
    .unwrap();
    let pool = keystock_db::repository::pools::create(pg, offer_id.0, seller_id)
        .await
        .unwrap();
    (pool.id, seller_id)
}

/// Ingest codes the way the upload path does: one tx, audit row per insert.
async fn ingest(pg: &PgPool, cipher: &Cipher, pool_id: Uuid, seller_id: Uuid, codes: &[String]) {
    let mut tx = pg.begin().await.unwrap();
    for code in codes {
        let hash = cipher.hash(code);
        let ct = cipher.encrypt(code).unwrap();
        let id = keys::insert_key(&mut tx, pool_id, &ct, &hash)
            .await
            .unwrap()
            .expect("fixture codes are unique");
        audit::append(&mut tx, id, pool_id, seller_id, AuditAction::Upload, None)
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn code_hash_is_globally_unique_across_pools() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_a, seller_a) = fixture_pool(&pg).await;
    let (pool_b, _seller_b) = fixture_pool(&pg).await;

    let code = fresh_code();
    ingest(&pg, &cipher, pool_a, seller_a, &[code.clone()]).await;

    // Same code into a different pool owned by a different seller: the
    // insert loses on the unique constraint and reports no id.
    let mut tx = pg.begin().await.unwrap();
    let ct = cipher.encrypt(&code).unwrap();
    let inserted = keys::insert_key(&mut tx, pool_b, &ct, &cipher.hash(&code))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert!(inserted.is_none(), "cross-pool duplicate must be rejected");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn concurrent_reserves_never_double_allocate() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_id, seller_id) = fixture_pool(&pg).await;

    const K: usize = 5;
    const N: usize = 20;
    let codes: Vec<String> = (0..K).map(|_| fresh_code()).collect();
    ingest(&pg, &cipher, pool_id, seller_id, &codes).await;

    let mut handles = Vec::new();
    for _ in 0..N {
        let pg = pg.clone();
        handles.push(tokio::spawn(async move {
            keys::reserve_next(&pg, pool_id, Uuid::new_v4()).await.unwrap()
        }));
    }

    let mut won = Vec::new();
    let mut no_stock = 0usize;
    for handle in handles {
        match handle.await.unwrap() {
            Some(key) => won.push(key.id),
            None => no_stock += 1,
        }
    }

    assert_eq!(won.len(), K, "exactly one winner per available key");
    assert_eq!(no_stock, N - K);
    won.sort();
    won.dedup();
    assert_eq!(won.len(), K, "no key may be handed to two callers");
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn reservation_is_fifo_by_creation_time() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_id, seller_id) = fixture_pool(&pg).await;

    let first = fresh_code();
    let second = fresh_code();
    let third = fresh_code();
    ingest(
        &pg,
        &cipher,
        pool_id,
        seller_id,
        &[first.clone(), second.clone(), third.clone()],
    )
    .await;

    let key = keys::reserve_next(&pg, pool_id, Uuid::new_v4())
        .await
        .unwrap()
        .expect("stock available");
    assert_eq!(cipher.decrypt(&key.code_encrypted).unwrap(), first);

    let key = keys::reserve_next(&pg, pool_id, Uuid::new_v4())
        .await
        .unwrap()
        .expect("stock available");
    assert_eq!(cipher.decrypt(&key.code_encrypted).unwrap(), second);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn reserve_deliver_lookup_chain() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_id, seller_id) = fixture_pool(&pg).await;

    let code = fresh_code();
    ingest(&pg, &cipher, pool_id, seller_id, &[code.clone()]).await;

    let order_id = Uuid::new_v4();
    let key = keys::reserve_next(&pg, pool_id, order_id)
        .await
        .unwrap()
        .expect("stock available");
    assert_eq!(key.status, KeyStatus::Reserved);
    assert_eq!(key.order_id, Some(order_id));
    assert!(key.reserved_at.is_some());

    let delivered = keys::confirm_delivery(&pg, key.id, order_id)
        .await
        .unwrap()
        .expect("reserved key delivers");
    assert_eq!(delivered.status, KeyStatus::Delivered);
    assert!(delivered.delivered_at.is_some());

    let looked_up = keys::find_delivered_by_order(&pg, order_id)
        .await
        .unwrap()
        .expect("delivered key is retrievable by order");
    assert_eq!(cipher.decrypt(&looked_up.code_encrypted).unwrap(), code);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn empty_pool_reports_no_stock_not_error() {
    let pg = test_pool().await;
    let (pool_id, _seller_id) = fixture_pool(&pg).await;

    let outcome = keys::reserve_next(&pg, pool_id, Uuid::new_v4()).await.unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn delivery_requires_prior_reservation_for_same_order() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_id, seller_id) = fixture_pool(&pg).await;

    let code = fresh_code();
    ingest(&pg, &cipher, pool_id, seller_id, &[code]).await;

    let order_id = Uuid::new_v4();
    let key = keys::reserve_next(&pg, pool_id, order_id)
        .await
        .unwrap()
        .unwrap();

    // Wrong order: guarded update matches nothing.
    assert!(keys::confirm_delivery(&pg, key.id, Uuid::new_v4())
        .await
        .unwrap()
        .is_none());

    // Second delivery after the first also matches nothing.
    assert!(keys::confirm_delivery(&pg, key.id, order_id)
        .await
        .unwrap()
        .is_some());
    assert!(keys::confirm_delivery(&pg, key.id, order_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn reserved_keys_are_not_listed_as_available_and_stay_locked_down() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_id, seller_id) = fixture_pool(&pg).await;

    let code = fresh_code();
    ingest(&pg, &cipher, pool_id, seller_id, &[code]).await;
    let key = keys::reserve_next(&pg, pool_id, Uuid::new_v4())
        .await
        .unwrap()
        .unwrap();

    // State predicates gate seller mutations; the service layer refuses
    // them before any SQL runs.
    assert!(!key.status.allows_edit());
    assert!(!key.status.allows_invalidate());
    assert!(!key.status.allows_reveal());

    let stats = keys::count_by_status(&pg, pool_id).await.unwrap();
    assert_eq!(stats.available, 0);
    assert_eq!(stats.reserved, 1);
    assert_eq!(stats.total, 1);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn ingest_writes_one_upload_audit_row_per_key() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_id, seller_id) = fixture_pool(&pg).await;

    let codes: Vec<String> = (0..3).map(|_| fresh_code()).collect();
    ingest(&pg, &cipher, pool_id, seller_id, &codes).await;

    let rows = keys::list_page(&pg, pool_id, None, 10, 0).await.unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        let trail = audit::list_for_key(&pg, row.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Upload);
        assert_eq!(trail[0].seller_id, seller_id);
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn listing_is_newest_first() {
    let pg = test_pool().await;
    let cipher = test_cipher();
    let (pool_id, seller_id) = fixture_pool(&pg).await;

    let oldest = fresh_code();
    let newest = fresh_code();
    ingest(&pg, &cipher, pool_id, seller_id, &[oldest, newest.clone()]).await;

    let rows = keys::list_page(&pg, pool_id, None, 10, 0).await.unwrap();
    assert_eq!(cipher.decrypt(&rows[0].code_encrypted).unwrap(), newest);
}
