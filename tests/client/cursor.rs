use bson::{doc, Bson};
use mongodb::bulk_write::{BulkWriteOptions, WriteModel};
use mongodb::common::Namespace;
use mongodb::cursor::{Cursor, CursorState};
use mongodb::TimeoutContext;

use crate::mock::MockServer;

fn inserts(count: usize) -> Vec<WriteModel> {
    (0..count)
        .map(|i| WriteModel::insert_one(Namespace::new("db", "coll"), doc! { "_id": i as i32 }))
        .collect()
}

#[tokio::test]
async fn verbose_results_are_fetched_with_get_more() {
    let mock = MockServer::new();
    mock.hold_results_for_get_more();
    let client = mock.client(|_| ());

    let options = BulkWriteOptions {
        verbose_results: Some(true),
        ..Default::default()
    };
    let result = client.bulk_write(inserts(3), options).await.unwrap();

    assert_eq!(result.insert_results.len(), 3);
    let get_mores = mock.commands("getMore");
    assert_eq!(get_mores.len(), 1);
    assert_eq!(get_mores[0].get_i64("getMore").unwrap(), 1);
    assert_eq!(get_mores[0].get_str("collection").unwrap(), "$cmd.bulkWrite");
    assert!(mock.commands("killCursors").is_empty());
}

#[tokio::test]
async fn unread_results_cursor_is_killed() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());

    let executor = client.executor().clone();
    let server = client.topology().servers().next().unwrap().clone();
    let reply = doc! {
        "ok": 1,
        "cursor": {
            "id": 7i64,
            "ns": "admin.$cmd.bulkWrite",
            "firstBatch": [{ "ok": 1, "idx": 0 }],
        },
    };
    let mut cursor = Cursor::from_reply(executor, server, reply).unwrap();
    let ctx = TimeoutContext::unbounded();

    assert_eq!(cursor.state(), CursorState::Open);
    assert!(cursor.next(&ctx).await.unwrap().is_some());

    cursor.close(&ctx).await;
    assert_eq!(cursor.state(), CursorState::Killed);

    let kills = mock.commands("killCursors");
    assert_eq!(kills.len(), 1);
    assert_eq!(kills[0].get_str("killCursors").unwrap(), "$cmd.bulkWrite");
    assert_eq!(kills[0].get_array("cursors").unwrap(), &vec![Bson::Int64(7)]);

    // Closing twice sends nothing more.
    cursor.close(&ctx).await;
    assert_eq!(mock.commands("killCursors").len(), 1);
}

#[tokio::test]
async fn exhausted_cursor_is_not_killed() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());
    let server = client.topology().servers().next().unwrap().clone();

    let reply = doc! {
        "ok": 1,
        "cursor": { "id": 0i64, "ns": "db.coll", "firstBatch": [{ "x": 1 }, { "x": 2 }] },
    };
    let mut cursor = Cursor::from_reply(client.executor().clone(), server, reply).unwrap();
    let ctx = TimeoutContext::unbounded();

    assert_eq!(cursor.state(), CursorState::Exhausted);
    assert_eq!(cursor.collect_remaining(&ctx).await.unwrap().len(), 2);
    assert!(!cursor.has_next(&ctx).await.unwrap());

    cursor.close(&ctx).await;
    assert_eq!(mock.connections(), 0);
}
