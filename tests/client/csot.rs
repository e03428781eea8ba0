use std::time::{Duration, Instant};

use bson::{doc, Bson};
use mongodb::bulk_write::{BulkWriteOptions, WriteModel};
use mongodb::common::{Namespace, WriteConcern};
use mongodb::operation::RenameOptions;
use mongodb::{Error, TimeoutContext};

use crate::mock::{FailPoint, MockServer};

fn inserts(count: usize) -> Vec<WriteModel> {
    (0..count)
        .map(|i| WriteModel::insert_one(Namespace::new("db", "coll"), doc! { "x": i as i32 }))
        .collect()
}

// Timing checks allow 100ms either side of the expected duration.
fn assert_elapsed_near(start: Instant, expected_ms: u64) {
    let elapsed = start.elapsed();
    let low = Duration::from_millis(expected_ms.saturating_sub(100));
    let high = Duration::from_millis(expected_ms + 100);
    assert!(
        elapsed >= low && elapsed <= high,
        "took {:?}, expected about {}ms",
        elapsed,
        expected_ms
    );
}

#[tokio::test]
async fn client_default_timeout_applies() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("bulkWrite").block(1000));
    let client = mock.client(|o| o.timeout = Some(Duration::from_millis(300)));

    let start = Instant::now();
    let err = client.bulk_write(inserts(1), None).await.unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert_elapsed_near(start, 300);
    assert_eq!(mock.commands("bulkWrite").len(), 1);
}

#[tokio::test]
async fn client_default_timeout_applies_to_rename() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("renameCollection").block(600));
    let client = mock.client(|o| o.timeout = Some(Duration::from_millis(300)));
    let coll = client.database("db").collection("a");

    let start = Instant::now();
    let err = coll.rename("b", None).await.unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert_elapsed_near(start, 300);
}

#[tokio::test]
async fn operation_timeout_overrides_client_default() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("renameCollection").block(300));
    let client = mock.client(|o| o.timeout = Some(Duration::from_millis(100)));
    let coll = client.database("db").collection("a");

    let options = RenameOptions {
        timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    coll.rename("b", options).await.unwrap();

    // Zero disables the timeout altogether.
    let options = RenameOptions {
        timeout: Some(Duration::ZERO),
        ..Default::default()
    };
    coll.rename("c", options).await.unwrap();

    let commands = mock.commands("renameCollection");
    assert_eq!(commands.len(), 2);
    assert!(commands[0].get_i64("maxTimeMS").unwrap() <= 2000);
    assert!(!commands[1].contains_key("maxTimeMS"));
}

#[tokio::test]
async fn max_time_ms_reflects_remaining_budget() {
    let mock = MockServer::new();
    let client = mock.client(|o| o.timeout = Some(Duration::from_millis(1000)));

    client.database("db").collection("a").rename("b", None).await.unwrap();

    let rename = &mock.commands("renameCollection")[0];
    let max_time_ms = rename.get_i64("maxTimeMS").unwrap();
    assert!(max_time_ms > 0 && max_time_ms <= 1000, "maxTimeMS was {}", max_time_ms);
    assert_eq!(rename.get_str("$db").unwrap(), "admin");
}

#[tokio::test]
async fn no_max_time_ms_without_timeout() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());

    client.database("db").collection("a").rename("b", None).await.unwrap();

    assert!(!mock.commands("renameCollection")[0].contains_key("maxTimeMS"));
}

#[tokio::test]
async fn bulk_write_batches_share_one_deadline() {
    let mock = MockServer::new();
    mock.set_max_write_batch_size(2);
    mock.add_fail_point(FailPoint::new("bulkWrite").times(2).block(1010));
    let client = mock.client(|o| o.timeout = Some(Duration::from_millis(2000)));

    let start = Instant::now();
    let err = client.bulk_write(inserts(4), None).await.unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert_elapsed_near(start, 2000);
    assert_eq!(mock.commands("bulkWrite").len(), 2);
}

#[tokio::test]
async fn unacknowledged_bulk_write_times_out_waiting_for_connection() {
    let mock = MockServer::new();
    let client = mock.client(|o| {
        o.max_pool_size = 1;
        o.write_concern = WriteConcern::unacknowledged();
        o.timeout = Some(Duration::from_millis(200));
    });

    let server = client.topology().servers().next().unwrap().clone();
    let held = server.acquire_stream(&TimeoutContext::unbounded()).await.unwrap();

    let start = Instant::now();
    let err = client.bulk_write(inserts(1), None).await.unwrap_err();
    assert!(matches!(err, Error::OperationTimeout(_)), "unexpected error: {}", err);
    assert_elapsed_near(start, 200);
    drop(held);

    let result = client.bulk_write(inserts(1), None).await.unwrap();
    assert!(!result.acknowledged);
}

#[tokio::test]
async fn timeout_while_reading_results_kills_cursor() {
    let mock = MockServer::new();
    mock.hold_results_for_get_more();
    mock.add_fail_point(FailPoint::new("getMore").block(600));
    let client = mock.client(|o| o.timeout = Some(Duration::from_millis(300)));

    let options = BulkWriteOptions {
        verbose_results: Some(true),
        ..Default::default()
    };
    let err = client.bulk_write(inserts(2), options).await.unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {}", err);

    let get_more = &mock.commands("getMore")[0];
    assert!(!get_more.contains_key("maxTimeMS"));

    let kills = mock.commands("killCursors");
    assert_eq!(kills.len(), 1);
    assert!(kills[0].get_i64("maxTimeMS").unwrap() > 0);
    assert_eq!(kills[0].get_array("cursors").unwrap(), &vec![Bson::Int64(1)]);
}

#[tokio::test]
async fn server_time_limit_is_reported_as_timeout() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("renameCollection").times(1).error(50));
    let client = mock.client(|o| o.timeout = Some(Duration::from_secs(1)));
    let coll = client.database("db").collection("a");

    let err = coll.rename("b", None).await.unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {}", err);

    mock.add_fail_point(FailPoint::new("renameCollection").times(1).error(50));
    let options = RenameOptions {
        timeout: Some(Duration::ZERO),
        ..Default::default()
    };
    let err = coll.rename("b", options).await.unwrap_err();
    assert_eq!(err.code(), Some(50));
}
