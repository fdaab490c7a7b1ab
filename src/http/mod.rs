use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::{Any, CorsLayer};

use crate::messages::{AgentMessage, Query};

const JSON_CONTENT_TYPE: &str = "text/x-json;charset=UTF-8";

/// Read-only HTTP surface. Each handler asks the agent actor for a
/// snapshot through its queue; the snapshot is computed inside the
/// serialized loop, so no lock is held here and nothing can observe a
/// half-applied handler.
#[derive(Clone)]
pub struct IntrospectionState {
    pub tx: mpsc::Sender<AgentMessage>,
}

pub fn router(state: IntrospectionState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/slave/info.json", get(info_json))
        .route("/slave/frameworks.json", get(frameworks_json))
        .route("/slave/tasks.json", get(tasks_json))
        .route("/slave/stats.json", get(stats_json))
        .route("/slave/vars", get(vars))
        .layer(cors)
        .with_state(state)
}

pub async fn run_introspection(addr: SocketAddr, state: IntrospectionState) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting introspection server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind introspection server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Introspection server failed");
    }
}

/// Ask the actor for a snapshot and serialize the reply as JSON.
macro_rules! snapshot {
    ($state:expr, $variant:ident) => {{
        let (reply, rx) = oneshot::channel();
        if $state
            .tx
            .send(AgentMessage::Query(Query::$variant { reply }))
            .await
            .is_err()
        {
            return (StatusCode::SERVICE_UNAVAILABLE, "Agent is shutting down").into_response();
        }
        match rx.await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                return (StatusCode::SERVICE_UNAVAILABLE, "Agent is shutting down")
                    .into_response()
            }
        }
    }};
}

async fn info_json(State(state): State<IntrospectionState>) -> axum::response::Response {
    let snapshot = snapshot!(state, Info);
    json_response(&snapshot)
}

async fn frameworks_json(State(state): State<IntrospectionState>) -> axum::response::Response {
    let snapshot = snapshot!(state, Frameworks);
    json_response(&snapshot)
}

async fn tasks_json(State(state): State<IntrospectionState>) -> axum::response::Response {
    let snapshot = snapshot!(state, Tasks);
    json_response(&snapshot)
}

async fn stats_json(State(state): State<IntrospectionState>) -> axum::response::Response {
    let snapshot = snapshot!(state, Stats);
    json_response(&snapshot)
}

async fn vars(State(state): State<IntrospectionState>) -> axum::response::Response {
    let body = snapshot!(state, Vars);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        body,
    )
        .into_response()
}

fn json_response<T: serde::Serialize>(snapshot: &T) -> axum::response::Response {
    match serde_json::to_string(snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize snapshot");
            (StatusCode::INTERNAL_SERVER_ERROR, "serialization error").into_response()
        }
    }
}
