use bson::doc;
use mongodb::common::WriteConcern;
use mongodb::operation::RenameOptions;
use mongodb::Client;

use crate::mock::{FailPoint, MockServer};

#[tokio::test]
async fn rename_collection() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());
    let coll = client.database("db").collection("from");

    let renamed = coll.rename("to", None).await.unwrap();
    assert_eq!(renamed.name(), "to");
    assert_eq!(renamed.database().name(), "db");

    let commands = mock.commands("renameCollection");
    assert_eq!(
        commands[0],
        doc! { "renameCollection": "db.from", "to": "db.to", "dropTarget": false, "$db": "admin" }
    );
}

#[tokio::test]
async fn rename_with_options() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());
    let coll = client
        .database("db")
        .collection_with_write_concern("from", WriteConcern::with_w(1));

    coll.rename("to", None).await.unwrap();
    let options = RenameOptions {
        drop_target: Some(true),
        write_concern: Some(WriteConcern::with_w(2)),
        ..Default::default()
    };
    coll.rename("to", options).await.unwrap();

    let commands = mock.commands("renameCollection");
    assert_eq!(commands[0].get_document("writeConcern").unwrap(), &doc! { "w": 1 });
    assert_eq!(commands[1].get_bool("dropTarget").unwrap(), true);
    assert_eq!(commands[1].get_document("writeConcern").unwrap(), &doc! { "w": 2 });
}

#[tokio::test]
async fn renamed_collection_keeps_write_concern() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());
    let coll = client
        .database("db")
        .collection_with_write_concern("from", WriteConcern::with_w(3));

    let renamed = coll.rename("to", None).await.unwrap();
    assert_eq!(renamed.name(), "to");
    assert_eq!(renamed.write_concern(), &WriteConcern::with_w(3));
}

#[tokio::test]
async fn failed_rename_error_is_printable() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("renameCollection").times(1).error(13));
    let client = mock.client(|_| ());
    let coll = client.database("db").collection("from");

    let err = coll.rename("to", None).await.unwrap_err();
    assert_eq!(err.code(), Some(13));

    let printed = format!("{:?}", coll);
    assert!(printed.starts_with("Collection"), "{}", printed);
    assert!(printed.contains("\"from\""), "{}", printed);
    assert_eq!(format!("{:?}", coll.database()), "Database { name: \"db\" }");
}

#[tokio::test]
async fn drop_search_index_twice() {
    let mock = MockServer::new();
    mock.add_search_index("by_text");
    let client = mock.client(|_| ());
    let coll = client.database("db").collection("coll");

    coll.drop_search_index("by_text").await.unwrap();
    // The index is gone the second time; that is still a success.
    coll.drop_search_index("by_text").await.unwrap();

    let commands = mock.commands("dropSearchIndex");
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0], doc! { "dropSearchIndex": "coll", "name": "by_text", "$db": "db" });
}

#[tokio::test]
async fn drop_search_index_other_errors_propagate() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("dropSearchIndex").times(1).error(8));
    let client = mock.client(|_| ());

    let err = client
        .database("db")
        .collection("coll")
        .drop_search_index("by_text")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(8));
}

#[tokio::test]
async fn database_handles_inherit_write_concern() {
    let client = Client::with_uri_str("mongodb://localhost/app?w=2").unwrap();

    let db = client.default_database().unwrap();
    assert_eq!(db.name(), "app");
    assert_eq!(db.write_concern(), &WriteConcern::with_w(2));
    assert_eq!(db.collection("c").namespace().to_string(), "app.c");
    assert_eq!(db.collection("c").write_concern(), &WriteConcern::with_w(2));
}
