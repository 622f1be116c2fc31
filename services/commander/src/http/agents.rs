//! `/agents/...` and `/timeout` route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::{bad_request, internal_error, validators};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EntityFilter {
    pub status: Option<String>,
    pub os: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentView {
    pub id: String,
    pub hostname: String,
    pub addr: String,
    pub os: String,
}

async fn live_filter(state: &AppState, online_only: Option<bool>, ids: Vec<String>) -> Vec<String> {
    let Some(online) = online_only else {
        return ids;
    };
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let is_live = state.registry.is_live(&id).await;
        if is_live == online {
            out.push(id);
        }
    }
    out
}

pub async fn count(
    State(state): State<AppState>,
    Query(filter): Query<EntityFilter>,
) -> impl IntoResponse {
    let os = match validators::os(filter.os.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let online = match validators::status(filter.status.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };

    let agents = match state.storage.list_agents(os.as_deref(), None) {
        Ok(v) => v,
        Err(e) => return internal_error(&e),
    };
    let ids = agents.into_iter().map(|a| a.id).collect();
    let filtered = live_filter(&state, online, ids).await;
    (StatusCode::OK, Json(serde_json::json!(filtered.len()))).into_response()
}

pub async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(filter): Query<EntityFilter>,
) -> impl IntoResponse {
    let entity = match validators::entity(&entity) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let os = match validators::os(filter.os.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let online = match validators::status(filter.status.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };

    let agents = match state.storage.list_agents(os.as_deref(), Some(&entity)) {
        Ok(v) => v,
        Err(e) => return internal_error(&e),
    };
    let mut views = Vec::with_capacity(agents.len());
    for a in agents {
        let keep = match online {
            Some(want) => state.registry.is_live(&a.id).await == want,
            None => true,
        };
        if keep {
            views.push(AgentView {
                id: a.id,
                hostname: a.hostname,
                addr: a.address,
                os: a.os,
            });
        }
    }
    (StatusCode::OK, Json(views)).into_response()
}

pub async fn history(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(filter): Query<EntityFilter>,
) -> impl IntoResponse {
    let entity = match validators::entity(&entity) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let os = match validators::os(filter.os.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let online = match validators::status(filter.status.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };

    let agents = match state.storage.list_agents(os.as_deref(), Some(&entity)) {
        Ok(v) => v,
        Err(e) => return internal_error(&e),
    };
    let mut ids = Vec::with_capacity(agents.len());
    for a in agents {
        let keep = match online {
            Some(want) => state.registry.is_live(&a.id).await == want,
            None => true,
        };
        if keep {
            ids.push(a.id);
        }
    }
    if ids.is_empty() {
        return (StatusCode::OK, Json(Vec::<serde_json::Value>::new())).into_response();
    }
    match state.storage.agents_history(&ids, false, os.as_deref()) {
        Ok(events) => (StatusCode::OK, Json(events_json(&events))).into_response(),
        Err(e) => internal_error(&e),
    }
}

fn events_json(events: &[botfleet_storage::EventRecord]) -> Vec<serde_json::Value> {
    events
        .iter()
        .map(|e| {
            serde_json::json!({
                "count": e.count,
                "time": e.time,
                "id": e.id,
                "event": e.event,
                "event_detail": e.event_detail,
                "response": e.response,
                "exit_code": e.exit_code,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct DispatchFilter {
    pub os: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CmdBody {
    pub cmd: String,
}

#[derive(Debug, Serialize)]
struct TargetView {
    id: String,
    outcome: String,
}

fn target_views(results: Vec<crate::scheduler::TargetResult>) -> Vec<TargetView> {
    results
        .into_iter()
        .map(|r| TargetView {
            id: r.id,
            outcome: match r.outcome {
                crate::scheduler::DispatchOutcome::Success => "success".to_owned(),
                crate::scheduler::DispatchOutcome::Failed(reason) => format!("failed: {reason}"),
            },
        })
        .collect()
}

pub async fn cmd(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(filter): Query<DispatchFilter>,
    Json(body): Json<CmdBody>,
) -> impl IntoResponse {
    let entity = match validators::entity(&entity) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let os = match validators::os(filter.os.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    if body.cmd.trim().is_empty() {
        return bad_request("cmd must not be empty");
    }

    let timeout = state.cmd_timeout_secs();
    match state
        .scheduler
        .exe_command(&entity, os.as_deref(), &body.cmd, timeout)
        .await
    {
        Ok(results) => (StatusCode::OK, Json(target_views(results))).into_response(),
        Err(e) => internal_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptBody {
    pub script_path: String,
    pub script_type: String,
}

pub async fn script(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(filter): Query<DispatchFilter>,
    Json(body): Json<ScriptBody>,
) -> impl IntoResponse {
    let entity = match validators::entity(&entity) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let os = match validators::os(filter.os.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let script_path = match validators::script_path(&body.script_path) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let script_type = match validators::script_type(&body.script_type) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };

    let source = match tokio::task::spawn_blocking({
        let path = script_path.clone();
        move || std::fs::read_to_string(path)
    })
    .await
    {
        Ok(Ok(contents)) => contents,
        Ok(Err(e)) => return bad_request(&format!("cannot read script_path: {e}")),
        Err(e) => return internal_error(&e),
    };

    let timeout = state.cmd_timeout_secs();
    match state
        .scheduler
        .exe_script(&entity, os.as_deref(), &script_path, script_type, &source, timeout)
        .await
    {
        Ok(results) => (StatusCode::OK, Json(target_views(results))).into_response(),
        Err(e) => internal_error(&e),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(filter): Query<DispatchFilter>,
) -> impl IntoResponse {
    let entity = match validators::entity(&entity) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let os = match validators::os(filter.os.as_deref()) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };

    match state.storage.delete_agents(&entity, os.as_deref()) {
        Ok(ids) => {
            for id in &ids {
                state.registry.drop_session(id).await;
            }
            (StatusCode::OK, Json(ids)).into_response()
        }
        Err(e) => internal_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct TimeoutQuery {
    pub timeout: Option<u64>,
}

pub async fn get_timeout(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!(state.cmd_timeout_secs()))).into_response()
}

pub async fn put_timeout(
    State(state): State<AppState>,
    Query(q): Query<TimeoutQuery>,
) -> impl IntoResponse {
    let raw = match q.timeout {
        Some(v) => v,
        None => return bad_request("timeout query parameter is required"),
    };
    match validators::timeout(raw) {
        Ok(v) => {
            state.set_cmd_timeout_secs(v);
            (StatusCode::OK, Json(serde_json::json!({ "ack": true }))).into_response()
        }
        Err(msg) => bad_request(&msg),
    }
}
