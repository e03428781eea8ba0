use std::time::Duration;

use mongodb::operation::RenameOptions;
use mongodb::{Error, TimeoutContext};

use crate::mock::{FailPoint, MockServer};

#[tokio::test]
async fn checked_in_connection_is_reused() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());
    let coll = client.database("db").collection("a");

    coll.rename("b", None).await.unwrap();
    coll.rename("c", None).await.unwrap();

    assert_eq!(mock.connections(), 1);
    let server = client.topology().servers().next().unwrap();
    assert_eq!(server.pool().total_connections(), 1);
    assert_eq!(server.pool().available_connections(), 1);
}

#[tokio::test]
async fn wait_queue_timeout_is_distinct_from_operation_timeout() {
    let mock = MockServer::new();
    let client = mock.client(|o| {
        o.max_pool_size = 1;
        o.wait_queue_timeout = Some(Duration::from_millis(50));
        o.timeout = Some(Duration::from_secs(1));
    });
    let coll = client.database("db").collection("a");

    let server = client.topology().servers().next().unwrap().clone();
    let held = server.acquire_stream(&TimeoutContext::unbounded()).await.unwrap();

    let err = coll.rename("b", None).await.unwrap_err();
    assert!(matches!(err, Error::PoolWaitTimeout(_)), "unexpected error: {}", err);

    let options = RenameOptions {
        timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let err = coll.rename("b", options).await.unwrap_err();
    assert!(matches!(err, Error::OperationTimeout(_)), "unexpected error: {}", err);

    drop(held);
    assert_eq!(mock.command_count(), 0);
}

#[tokio::test]
async fn returned_connection_goes_to_waiter() {
    let mock = MockServer::new();
    let client = mock.client(|o| o.max_pool_size = 1);

    let server = client.topology().servers().next().unwrap().clone();
    let held = server.acquire_stream(&TimeoutContext::unbounded()).await.unwrap();

    let coll = client.database("db").collection("a");
    let waiter = tokio::spawn(async move { coll.rename("b", None).await.map(|_| ()) });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.pool().waiting(), 1);
    drop(held);

    waiter.await.unwrap().unwrap();
    assert_eq!(mock.connections(), 1);
    assert_eq!(server.pool().waiting(), 0);
}

#[tokio::test]
async fn network_error_clears_pool() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("renameCollection").times(1).close_connection());
    let client = mock.client(|_| ());
    let server = client.topology().servers().next().unwrap().clone();
    let coll = client.database("db").collection("a");

    let generation = server.pool().generation();
    let err = coll.rename("b", None).await.unwrap_err();

    assert!(err.is_network_error(), "unexpected error: {}", err);
    assert_eq!(server.pool().generation(), generation + 1);
    assert_eq!(server.pool().total_connections(), 0);

    coll.rename("b", None).await.unwrap();
    assert_eq!(mock.connections(), 2);
}

#[tokio::test]
async fn closed_pool_rejects_checkout() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());

    client.shutdown();
    let err = client.database("db").collection("a").rename("b", None).await.unwrap_err();

    assert!(matches!(err, Error::PoolClosed), "unexpected error: {}", err);
    assert_eq!(mock.connections(), 0);
}

#[tokio::test]
async fn connect_populates_min_pool_size() {
    let mock = MockServer::new();
    let options = {
        let client = mock.client(|o| o.min_pool_size = 2);
        client.options().clone()
    };

    let client = mongodb::Client::connect(options).await.unwrap();
    let server = client.topology().servers().next().unwrap();

    assert_eq!(server.pool().total_connections(), 2);
    assert_eq!(mock.connections(), 2);
}
