mod test_support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use drover_agent::http::{router, IntrospectionState};
use drover_agent::messages::AgentMessage;
use drover_agent::proto::TaskState;
use test_support::{framework_info, status_update, task, test_agent};

/// Spin up the actor loop and an introspection router wired to it.
/// Returns the router plus the channel handles that keep the actor
/// alive for the duration of the test.
struct TestStack {
    app: axum::Router,
    tx: mpsc::Sender<AgentMessage>,
    token: CancellationToken,
    _outbound: mpsc::Receiver<drover_agent::messages::Outbound>,
    _isolation: mpsc::Receiver<drover_agent::isolation::IsolationRequest>,
    _work_dir: tempfile::TempDir,
}

fn test_stack() -> TestStack {
    let agent = test_agent("cpus:4;mem:2048");
    let test_support::TestAgent {
        slave,
        tx,
        rx,
        outbound,
        isolation,
        work_dir,
    } = agent;

    let (_event_tx, event_rx) = mpsc::channel(8);
    let token = CancellationToken::new();
    tokio::spawn(slave.run(rx, event_rx, token.clone()));

    let app = router(IntrospectionState { tx: tx.clone() });
    TestStack {
        app,
        tx,
        token,
        _outbound: outbound,
        _isolation: isolation,
        _work_dir: work_dir,
    }
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, String, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, content_type, json)
}

#[tokio::test]
async fn test_info_json() {
    let stack = test_stack();

    let (status, content_type, json) = get_json(stack.app, "/slave/info.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.contains("text/x-json"));
    assert!(json["built_date"].is_string());
    assert!(json["build_user"].is_string());
    assert!(json["start_time"].is_string());
    assert!(json["pid"].as_str().unwrap().contains(':'));

    stack.token.cancel();
}

#[tokio::test]
async fn test_frameworks_json_lists_frameworks() {
    let stack = test_stack();

    stack
        .tx
        .send(AgentMessage::RunTask {
            framework: framework_info("wordcount", "e1"),
            framework_id: "f1".to_string(),
            pid: "sched:6000".to_string(),
            task: task("t1", 1.0, 256.0),
        })
        .await
        .unwrap();

    let (status, _, json) = get_json(stack.app, "/slave/frameworks.json").await;
    assert_eq!(status, StatusCode::OK);

    let frameworks = json.as_array().unwrap();
    assert_eq!(frameworks.len(), 1);
    assert_eq!(frameworks[0]["id"], "f1");
    assert_eq!(frameworks[0]["name"], "wordcount");
    assert_eq!(frameworks[0]["user"], "alice");

    stack.token.cancel();
}

#[tokio::test]
async fn test_tasks_json_shows_scalar_slices() {
    let stack = test_stack();

    stack
        .tx
        .send(AgentMessage::RunTask {
            framework: framework_info("wordcount", "e1"),
            framework_id: "f1".to_string(),
            pid: "sched:6000".to_string(),
            task: task("t1", 1.5, 256.0),
        })
        .await
        .unwrap();
    stack
        .tx
        .send(AgentMessage::RegisterExecutor {
            framework_id: "f1".to_string(),
            executor_id: "e1".to_string(),
            pid: "exec:7000".to_string(),
        })
        .await
        .unwrap();

    let (status, _, json) = get_json(stack.app, "/slave/tasks.json").await;
    assert_eq!(status, StatusCode::OK);

    let tasks = json.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["task_id"], "t1");
    assert_eq!(tasks[0]["framework_id"], "f1");
    assert_eq!(tasks[0]["state"], "TASK_STARTING");
    assert_eq!(tasks[0]["cpus"], 1.5);
    assert_eq!(tasks[0]["mem"], 256.0);

    stack.token.cancel();
}

#[tokio::test]
async fn test_stats_json_reflects_counters() {
    let stack = test_stack();

    stack
        .tx
        .send(AgentMessage::NewMasterDetected {
            pid: "master-a:5050".to_string(),
        })
        .await
        .unwrap();
    stack
        .tx
        .send(AgentMessage::RunTask {
            framework: framework_info("wordcount", "e1"),
            framework_id: "f1".to_string(),
            pid: "sched:6000".to_string(),
            task: task("t1", 1.0, 256.0),
        })
        .await
        .unwrap();
    stack
        .tx
        .send(AgentMessage::RegisterExecutor {
            framework_id: "f1".to_string(),
            executor_id: "e1".to_string(),
            pid: "exec:7000".to_string(),
        })
        .await
        .unwrap();
    stack
        .tx
        .send(AgentMessage::StatusUpdate {
            update: status_update("f1", "e1", "t1", TaskState::TaskFinished),
        })
        .await
        .unwrap();

    let (status, _, json) = get_json(stack.app, "/slave/stats.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_frameworks"], 1);
    assert_eq!(json["started_tasks"], 1);
    assert_eq!(json["finished_tasks"], 1);
    assert_eq!(json["valid_status_updates"], 1);
    assert_eq!(json["invalid_status_updates"], 0);
    assert!(json["uptime"].is_number());

    stack.token.cancel();
}

#[tokio::test]
async fn test_vars_is_plain_text_key_values() {
    let stack = test_stack();

    let response = stack
        .app
        .oneshot(
            Request::builder()
                .uri("/slave/vars")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(content_type.contains("text/plain"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("build_date "));
    assert!(text.contains("resources cpus:4;mem:2048"));
    assert!(text.contains("valid_status_updates 0"));

    stack.token.cancel();
}
