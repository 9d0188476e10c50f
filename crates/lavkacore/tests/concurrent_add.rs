//! Upsert linearizability: concurrent add_to_cart calls for the same
//! (user, item) must collapse into a single open entry whose quantity is
//! the sum of all added quantities. The enforcement point is the partial
//! unique index on open pairs plus the BEGIN IMMEDIATE write transaction.

use std::thread;

use lavkacore::storage::{cart, catalog, db, users};

const THREADS: usize = 8;
const ADDS_PER_THREAD: i64 = 5;

#[test]
fn concurrent_adds_collapse_into_one_entry() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let path = dir.path().join("lavka.sqlite");
    let pool = db::create_pool(path.to_str().expect("utf-8 path")).expect("create pool");

    let (user_id, item_id) = {
        let conn = db::get_connection(&pool).unwrap();
        let user = users::upsert_user(&conn, 5, "Dasha", None, None).unwrap();
        let item = catalog::create_item(&conn, "Postcard", 2.5, None, None, None, 0).unwrap();
        (user.id, item.id)
    };

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                let conn = db::get_connection(&pool).unwrap();
                for _ in 0..ADDS_PER_THREAD {
                    cart::add_to_cart(&conn, user_id, item_id, 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let conn = db::get_connection(&pool).unwrap();
    let lines = cart::list_open_cart(&conn, user_id).unwrap();
    assert_eq!(lines.len(), 1, "exactly one open entry for the pair");
    assert_eq!(
        lines[0].entry.quantity,
        THREADS as i64 * ADDS_PER_THREAD,
        "quantity must equal the sum of all added quantities"
    );
}

#[test]
fn concurrent_users_do_not_contend_on_results() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let path = dir.path().join("lavka.sqlite");
    let pool = db::create_pool(path.to_str().expect("utf-8 path")).expect("create pool");

    let item_id = {
        let conn = db::get_connection(&pool).unwrap();
        let item = catalog::create_item(&conn, "Postcard", 2.5, None, None, None, 0).unwrap();
        // One user row per thread
        for telegram_id in 0..THREADS as i64 {
            users::upsert_user(&conn, telegram_id, "shopper", None, None).unwrap();
        }
        item.id
    };

    let handles: Vec<_> = (0..THREADS as i64)
        .map(|telegram_id| {
            let pool = pool.clone();
            thread::spawn(move || {
                let conn = db::get_connection(&pool).unwrap();
                let user = users::get_user_by_telegram_id(&conn, telegram_id).unwrap();
                cart::add_to_cart(&conn, user.id, item_id, telegram_id + 1).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let conn = db::get_connection(&pool).unwrap();
    for telegram_id in 0..THREADS as i64 {
        let user = users::get_user_by_telegram_id(&conn, telegram_id).unwrap();
        let lines = cart::list_open_cart(&conn, user.id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].entry.quantity, telegram_id + 1);
    }
}
