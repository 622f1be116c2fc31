//! S4 — reconnecting with the same persisted identity refreshes the
//! inventory row's address without disturbing command history.

#[path = "../support/mod.rs"]
mod support;

use std::time::Duration;

use botfleet_agent::client::AgentClient;
use support::{spawn_agent, wait_until_async, Commander};

#[tokio::test]
async fn reconnect_updates_address_and_leaves_history_untouched() {
    let commander = Commander::start().await;
    let identity_dir = tempfile::tempdir().unwrap();

    let (first_task, id) = spawn_agent(&commander, identity_dir.path(), 6).await;
    wait_until_async(Duration::from_secs(5), || {
        let state = commander.state.clone();
        let id = id.clone();
        async move { state.registry.is_live(&id).await }
    })
    .await;

    let first_address = commander
        .state
        .storage
        .list_agents(None, Some(&id))
        .unwrap()
        .remove(0)
        .address;

    commander
        .state
        .storage
        .add_agent_events(&[id.clone()], "exeCommand", "uptime")
        .unwrap();
    let history_before = commander.state.storage.agent_history(&id, None).unwrap();
    assert_eq!(history_before.len(), 1);

    first_task.abort();
    wait_until_async(Duration::from_secs(5), || {
        let state = commander.state.clone();
        let id = id.clone();
        async move { !state.registry.is_live(&id).await }
    })
    .await;

    let identity_path = identity_dir.path().join("agent.id");
    let cfg = commander.agent_config(6);
    let second_client = AgentClient::new(cfg, identity_path);
    let second_task = tokio::spawn(async move {
        let _ = second_client.run().await;
    });

    let reregistered = wait_until_async(Duration::from_secs(5), || {
        let state = commander.state.clone();
        let id = id.clone();
        async move { state.registry.is_live(&id).await }
    })
    .await;
    assert!(reregistered, "agent never re-registered with its persisted identity");

    let agents_after = commander.state.storage.list_agents(None, Some(&id)).unwrap();
    assert_eq!(agents_after.len(), 1, "reconnection must update, not duplicate, the inventory row");
    assert_ne!(
        agents_after[0].address, first_address,
        "a fresh TCP connection gets a fresh ephemeral port"
    );

    let history_after = commander.state.storage.agent_history(&id, None).unwrap();
    assert_eq!(history_after, history_before, "reconnection must not touch CommandHistory");

    second_task.abort();
}
