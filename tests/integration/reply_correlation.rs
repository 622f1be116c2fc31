//! S3 — a dispatched command's reply is correlated back onto its
//! `CommandHistory` row after the correlator's flush window.

#[path = "../support/mod.rs"]
mod support;

use std::time::Duration;

use support::{spawn_agent, wait_until_async, Commander};

#[tokio::test]
async fn command_reply_lands_on_the_originating_history_row() {
    let commander = Commander::start_with(Duration::from_secs(120), Duration::from_millis(50)).await;
    let identity_dir = tempfile::tempdir().unwrap();
    let (_agent_task, id) = spawn_agent(&commander, identity_dir.path(), 6).await;

    wait_until_async(Duration::from_secs(5), || {
        let state = commander.state.clone();
        let id = id.clone();
        async move { state.registry.is_live(&id).await }
    })
    .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/agents/{id}/cmd", commander.api_base))
        .json(&serde_json::json!({ "cmd": "echo hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let results: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(results[0]["outcome"], serde_json::json!("success"));

    let settled = wait_until_async(Duration::from_secs(5), || {
        let state = commander.state.clone();
        let id = id.clone();
        async move {
            let history = state.storage.agent_history(&id, None).unwrap();
            history.last().is_some_and(|row| row.response.is_some())
        }
    })
    .await;
    assert!(settled, "reply never got correlated back onto the history row");

    let history = commander.state.storage.agent_history(&id, None).unwrap();
    let row = history.last().unwrap();
    assert_eq!(row.event, "exeCommand");
    assert_eq!(row.event_detail, "echo hi");
    assert!(row.response.as_deref().unwrap().contains("hi"));
    assert_eq!(row.exit_code, Some(0));
}
