use std::sync::{Arc, Mutex};
use std::time::Duration;

use mongodb::CommandResult;

use crate::mock::{FailPoint, MockServer};

#[tokio::test]
async fn command_duration() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("renameCollection").block(150));
    let client = mock.client(|_| ());

    let durations = Arc::new(Mutex::new(Vec::new()));
    let recorded = durations.clone();
    client
        .add_completion_hook(move |result: &CommandResult| {
            if let CommandResult::Success { duration, .. } = *result {
                recorded.lock().unwrap().push(duration);
            }
        })
        .unwrap();

    client.database("db").collection("a").rename("b", None).await.unwrap();

    let durations = durations.lock().unwrap();
    assert_eq!(durations.len(), 1);
    assert!(durations[0] >= Duration::from_millis(150));
}

#[tokio::test]
async fn failures_and_starts_are_reported() {
    let mock = MockServer::new();
    mock.add_fail_point(FailPoint::new("renameCollection").times(1).error(13));
    let client = mock.client(|_| ());

    let events = Arc::new(Mutex::new(Vec::new()));
    let started = events.clone();
    client
        .add_start_hook(move |event| {
            let line = format!("started {} on {}", event.command_name, event.database_name);
            started.lock().unwrap().push(line);
        })
        .unwrap();
    let completed = events.clone();
    client
        .add_completion_hook(move |result: &CommandResult| {
            let outcome = if result.is_success() { "succeeded" } else { "failed" };
            completed.lock().unwrap().push(format!("{} {}", result.command_name(), outcome));
        })
        .unwrap();

    let coll = client.database("db").collection("a");
    assert!(coll.rename("b", None).await.is_err());
    coll.rename("b", None).await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "started renameCollection on admin",
            "renameCollection failed",
            "started renameCollection on admin",
            "renameCollection succeeded",
        ]
    );
}
