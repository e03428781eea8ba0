use bson::{doc, Bson, Document};
use mongodb::bulk_write::{BulkWriteOptions, UpdateModelOptions, WriteModel};
use mongodb::common::Namespace;
use mongodb::error::RETRYABLE_WRITE_ERROR;
use mongodb::Error;

use crate::mock::{FailPoint, MockServer};

fn ops(command: &Document) -> Vec<Document> {
    command
        .get_array("ops")
        .unwrap()
        .iter()
        .filter_map(|op| op.as_document().cloned())
        .collect()
}

#[tokio::test]
async fn inserts_across_namespaces() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());

    let first = Namespace::new("db", "first");
    let second = Namespace::new("other", "second");
    let models = vec![
        WriteModel::insert_one(first.clone(), doc! { "_id": 1 }),
        WriteModel::insert_one(second, doc! { "x": 2 }),
        WriteModel::insert_one(first, doc! { "_id": 3 }),
    ];

    let result = client.bulk_write(models, None).await.unwrap();
    assert!(result.acknowledged);
    assert_eq!(result.inserted_count, 3);
    assert!(result.insert_results.is_empty());

    let commands = mock.commands("bulkWrite");
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].get_array("nsInfo").unwrap(),
        &vec![
            Bson::Document(doc! { "ns": "db.first" }),
            Bson::Document(doc! { "ns": "other.second" }),
        ]
    );

    let ops = ops(&commands[0]);
    assert_eq!(ops[0].get_i32("insert").unwrap(), 0);
    assert_eq!(ops[1].get_i32("insert").unwrap(), 1);
    assert_eq!(ops[2].get_i32("insert").unwrap(), 0);
    assert!(ops[1].get_document("document").unwrap().contains_key("_id"));
    assert_eq!(commands[0].get_bool("errorsOnly").unwrap(), true);
}

#[tokio::test]
async fn verbose_results_are_keyed_by_model_index() {
    let mock = MockServer::new();
    mock.set_max_write_batch_size(2);
    let client = mock.client(|_| ());

    let ns = Namespace::new("db", "coll");
    let models = vec![
        WriteModel::insert_one(ns.clone(), doc! { "_id": "a" }),
        WriteModel::update_one(ns.clone(), doc! { "_id": "a" }, doc! { "$set": { "x": 1 } }),
        WriteModel::delete_one(ns, doc! { "_id": "a" }),
    ];
    let options = BulkWriteOptions {
        verbose_results: Some(true),
        ..Default::default()
    };

    let result = client.bulk_write(models, options).await.unwrap();

    assert_eq!(mock.commands("bulkWrite").len(), 2);
    assert_eq!(result.insert_results[&0].inserted_id, Bson::String("a".to_owned()));
    assert_eq!(result.update_results[&1].modified_count, 1);
    assert_eq!(result.delete_results[&2].deleted_count, 1);
    assert_eq!(result.matched_count, 1);
}

#[tokio::test]
async fn invalid_model_fails_before_any_command() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());

    let models = vec![
        WriteModel::insert_one(Namespace::new("db", "coll"), doc! {}),
        WriteModel::update_one(Namespace::new("db", "coll"), doc! {}, doc! { "x": 1 }),
    ];
    let err = client.bulk_write(models, None).await.unwrap_err();

    assert!(matches!(err, Error::ValidationError(_)), "unexpected error: {}", err);
    assert_eq!(mock.connections(), 0);

    let err = client.bulk_write(Vec::new(), None).await.unwrap_err();
    assert!(matches!(err, Error::ArgumentError(_)), "unexpected error: {}", err);
}

#[tokio::test]
async fn sort_is_only_sent_for_single_updates() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());

    let ns = Namespace::new("db", "coll");
    let options = UpdateModelOptions {
        sort: Some(doc! { "x": -1 }),
        ..Default::default()
    };
    let models = vec![
        WriteModel::UpdateOne {
            namespace: ns.clone(),
            filter: doc! {},
            update: doc! { "$inc": { "x": 1 } }.into(),
            options: options.clone(),
        },
        WriteModel::UpdateMany {
            namespace: ns,
            filter: doc! {},
            update: doc! { "$inc": { "x": 1 } }.into(),
            options,
        },
    ];

    client.bulk_write(models, None).await.unwrap();

    let ops = ops(&mock.commands("bulkWrite")[0]);
    assert_eq!(ops[0].get_document("sort").unwrap(), &doc! { "x": -1 });
    assert_eq!(ops[0].get_bool("multi").unwrap(), false);
    assert!(!ops[1].contains_key("sort"));
    assert_eq!(ops[1].get_bool("multi").unwrap(), true);
}

#[tokio::test]
async fn retryable_error_is_retried_once() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("bulkWrite").times(1).error(91));
    let client = mock.client(|_| ());
    let models = || vec![WriteModel::insert_one(Namespace::new("db", "coll"), doc! { "_id": 1 })];

    let result = client.bulk_write(models(), None).await.unwrap();
    assert_eq!(result.inserted_count, 1);
    assert_eq!(mock.commands("bulkWrite").len(), 2);

    let fail_point = FailPoint::new("bulkWrite").times(2).error(11601);
    mock.add_fail_point(fail_point.label(RETRYABLE_WRITE_ERROR));
    let err = client.bulk_write(models(), None).await.unwrap_err();
    assert_eq!(err.code(), Some(11601));
    assert_eq!(mock.commands("bulkWrite").len(), 4);
}

#[tokio::test]
async fn multi_document_write_is_sent_once() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("bulkWrite").times(1).close_connection());
    let client = mock.client(|_| ());

    let ns = Namespace::new("db", "coll");
    let models = vec![WriteModel::update_many(ns, doc! {}, doc! { "$inc": { "n": 1 } })];

    let err = client.bulk_write(models, None).await.unwrap_err();
    assert!(err.is_network_error(), "{:?}", err);
    assert_eq!(mock.commands("bulkWrite").len(), 1);
}

#[tokio::test]
async fn single_document_write_is_retried_after_network_error() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("bulkWrite").times(1).close_connection());
    let client = mock.client(|_| ());

    let ns = Namespace::new("db", "coll");
    let models = vec![WriteModel::update_one(ns, doc! {}, doc! { "$inc": { "n": 1 } })];

    let result = client.bulk_write(models, None).await.unwrap();
    assert_eq!(result.modified_count, 1);
    assert_eq!(mock.commands("bulkWrite").len(), 2);
}

#[tokio::test]
async fn ordered_write_error_stops_remaining_batches() {
    let mock = MockServer::new();
    mock.set_max_write_batch_size(1);
    mock.fail_write_at(0);
    let client = mock.client(|_| ());

    let models = || {
        vec![
            WriteModel::insert_one(Namespace::new("db", "coll"), doc! { "_id": 1 }),
            WriteModel::insert_one(Namespace::new("db", "coll"), doc! { "_id": 2 }),
        ]
    };

    let err = client.bulk_write(models(), None).await.unwrap_err();
    let exception = match err {
        Error::BulkWriteError(exception) => exception,
        other => panic!("unexpected error: {}", other),
    };
    assert_eq!(mock.commands("bulkWrite").len(), 1);
    assert_eq!(exception.write_errors[&0].code, 11000);
    assert_eq!(exception.partial_result.unwrap().inserted_count, 0);

    let options = BulkWriteOptions {
        ordered: Some(false),
        ..Default::default()
    };
    let err = client.bulk_write(models(), options).await.unwrap_err();
    let exception = match err {
        Error::BulkWriteError(exception) => exception,
        other => panic!("unexpected error: {}", other),
    };
    assert_eq!(mock.commands("bulkWrite").len(), 3);
    // Every single-operation batch fails at index 0 of its own batch.
    assert_eq!(exception.write_errors.len(), 2);
    assert!(exception.write_errors.contains_key(&1));
}

#[tokio::test]
async fn write_concern_and_options_are_sent() {
    let mock = MockServer::new();
    let client = mock.client(|_| ());

    let options = BulkWriteOptions {
        write_concern: Some(mongodb::common::WriteConcern::with_w(2)),
        comment: Some(Bson::String("audit".to_owned())),
        let_vars: Some(doc! { "limit": 5 }),
        bypass_document_validation: Some(true),
        ..Default::default()
    };
    let models = vec![WriteModel::delete_one(Namespace::new("db", "coll"), doc! { "x": 1 })];
    client.bulk_write(models, options).await.unwrap();

    let command = &mock.commands("bulkWrite")[0];
    assert_eq!(command.get_document("writeConcern").unwrap(), &doc! { "w": 2 });
    assert_eq!(command.get_str("comment").unwrap(), "audit");
    assert_eq!(command.get_document("let").unwrap(), &doc! { "limit": 5 });
    assert_eq!(command.get_bool("bypassDocumentValidation").unwrap(), true);
    assert_eq!(command.get_str("$db").unwrap(), "admin");
}
