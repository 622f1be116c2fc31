//! S2 — fan-out to a wildcard target reports per-agent outcomes and a
//! disconnected target does not abort the rest of the batch.

#[path = "../support/mod.rs"]
mod support;

use botfleet_commander::registry::WriteRequest;
use support::Commander;
use tokio::sync::mpsc;

fn accepting_writer() -> mpsc::Sender<WriteRequest> {
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            let _ = req.ack.send(Ok(()));
        }
    });
    tx
}

/// A writer whose receiving half is already gone, so any send against it
/// fails immediately -- stands in for an agent whose TCP session has
/// already dropped.
fn disconnected_writer() -> mpsc::Sender<WriteRequest> {
    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    tx
}

#[tokio::test]
async fn wildcard_dispatch_reports_partial_failure_without_losing_the_batch() {
    let commander = Commander::start().await;

    commander.state.storage.upsert_agent("A", "h1", "addr1", "Linux").unwrap();
    commander.state.storage.upsert_agent("B", "h2", "addr2", "Linux").unwrap();
    commander.state.storage.upsert_agent("C", "h3", "addr3", "Windows").unwrap();

    commander
        .state
        .registry
        .upsert("A", "h1", "addr1", "Linux", accepting_writer())
        .await;
    commander
        .state
        .registry
        .upsert("B", "h2", "addr2", "Linux", disconnected_writer())
        .await;
    commander
        .state
        .registry
        .upsert("C", "h3", "addr3", "Windows", accepting_writer())
        .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/agents/*/cmd?os=Linux", commander.api_base))
        .json(&serde_json::json!({ "cmd": "uptime" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let results: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(results.len(), 2);

    let by_id = |id: &str| results.iter().find(|r| r["id"] == serde_json::json!(id)).unwrap();
    assert_eq!(by_id("A")["outcome"], serde_json::json!("success"));
    assert!(by_id("B")["outcome"].as_str().unwrap().starts_with("failed"));

    let history_a = commander.state.storage.agent_history("A", None).unwrap();
    assert_eq!(history_a.len(), 1);
    assert_eq!(history_a[0].event, "exeCommand");
    assert_eq!(history_a[0].event_detail, "uptime");
    assert!(history_a[0].response.is_none());

    let history_b = commander.state.storage.agent_history("B", None).unwrap();
    assert_eq!(history_b.len(), 1);
    assert!(history_b[0].response.is_none());

    let history_c = commander.state.storage.agent_history("C", None).unwrap();
    assert!(history_c.is_empty(), "Windows agent must not receive a Linux-only dispatch");
}
