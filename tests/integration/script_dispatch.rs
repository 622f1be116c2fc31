//! S6 — script dispatch reads the script file server-side and delivers its
//! contents, not its path, to the agent for execution.

#[path = "../support/mod.rs"]
mod support;

use std::time::Duration;

use support::{spawn_agent, wait_until_async, Commander};

#[tokio::test]
async fn script_dispatch_runs_the_file_contents_on_the_agent() {
    let commander = Commander::start().await;
    let identity_dir = tempfile::tempdir().unwrap();
    let (_agent_task, id) = spawn_agent(&commander, identity_dir.path(), 6).await;

    wait_until_async(Duration::from_secs(5), || {
        let state = commander.state.clone();
        let id = id.clone();
        async move { state.registry.is_live(&id).await }
    })
    .await;

    let script_dir = tempfile::tempdir().unwrap();
    let script_path = script_dir.path().join("x.sh");
    std::fs::write(&script_path, "echo scripted\n").unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/agents/*/script", commander.api_base))
        .json(&serde_json::json!({
            "script_path": script_path.to_string_lossy(),
            "script_type": "sh",
        }))
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
    assert!(settled, "script reply never got correlated back onto the history row");

    let history = commander.state.storage.agent_history(&id, None).unwrap();
    let row = history.last().unwrap();
    assert_eq!(row.event, "exeScript");
    assert_eq!(row.event_detail, script_path.to_string_lossy());
    assert!(row.response.as_deref().unwrap().contains("scripted"));
    assert_eq!(row.exit_code, Some(0));
}
