//! S1 — a freshly started agent registers with a clean commander store.

#[path = "../support/mod.rs"]
mod support;

use std::time::Duration;

use support::{spawn_agent, wait_until_async, Commander};

#[tokio::test]
async fn first_registration_creates_inventory_row_and_marks_agent_live() {
    let commander = Commander::start().await;
    let identity_dir = tempfile::tempdir().unwrap();

    let (_agent_task, id) = spawn_agent(&commander, identity_dir.path(), 6).await;

    let registered = wait_until_async(Duration::from_secs(5), || {
        let state = commander.state.clone();
        let id = id.clone();
        async move { state.registry.is_live(&id).await }
    })
    .await;
    assert!(registered, "agent never appeared live in the registry");

    let agents = commander.state.storage.list_agents(None, Some(&id)).unwrap();
    assert_eq!(agents.len(), 1);
    assert!(!agents[0].hostname.is_empty());
    assert!(matches!(agents[0].os.as_str(), "Linux" | "Darwin" | "Windows"));

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/agents/{id}/list", commander.api_base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body[0]["id"], serde_json::json!(id));
}
