//! API integration tests.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{test_env, write_validation_file};

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(method)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

async fn send_get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

async fn send_delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(Method::DELETE)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

/// Poll the session output endpoint until one of the streams carries a line.
async fn poll_session_output(app: &Router, session_id: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = send_get(app, &format!("/api/sessions/{session_id}/output")).await;
        assert_eq!(status, StatusCode::OK);
        if body["output"] != "" || body["error"] != "" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("session {session_id} produced no output in time");
}

/// Test that the health endpoint reports status and version.
#[tokio::test]
async fn test_health_endpoint() {
    let env = test_env();

    let (status, body) = send_get(&env.app, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

/// Test creating a workspace session for a question.
#[tokio::test]
async fn test_create_workspace_session() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/session/create",
        json!({"questionId": "q-101"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let session_id = body["sessionId"].as_str().unwrap();
    assert_eq!(session_id.len(), 8);

    let workspace_path = body["workspacePath"].as_str().unwrap();
    assert!(Path::new(workspace_path).is_dir());
    assert!(workspace_path.ends_with(session_id));
    assert!(Path::new(workspace_path).starts_with(&env.workspace_root));
}

/// Test that workspace session creation requires a question id.
#[tokio::test]
async fn test_create_workspace_session_requires_question_id() {
    let env = test_env();

    let (status, body) = send_json(&env.app, Method::POST, "/api/session/create", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No question ID provided");

    let (status, _) = send_json(
        &env.app,
        Method::POST,
        "/api/session/create",
        json!({"questionId": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Test that consecutive workspace sessions get distinct identifiers.
#[tokio::test]
async fn test_workspace_session_ids_are_unique() {
    let env = test_env();

    let mut ids = HashSet::new();
    for _ in 0..5 {
        let (status, body) = send_json(
            &env.app,
            Method::POST,
            "/api/session/create",
            json!({"questionId": "q-101"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        ids.insert(body["sessionId"].as_str().unwrap().to_string());
    }
    assert_eq!(ids.len(), 5);
}

/// Test that ending a session keeps its workspace directory on disk.
#[tokio::test]
async fn test_end_session_keeps_workspace_directory() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/session/create",
        json!({"questionId": "q-101"}),
    )
    .await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();
    let workspace_path = created["workspacePath"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/session/end",
        json!({"sessionId": session_id}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], format!("Session {session_id} ended"));
    assert!(Path::new(&workspace_path).is_dir());

    // The record is gone, so a second end is rejected.
    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/session/end",
        json!({"sessionId": session_id}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid session ID");
}

/// Test ending sessions that were never created.
#[tokio::test]
async fn test_end_session_unknown_id() {
    let env = test_env();

    let (status, body) = send_json(&env.app, Method::POST, "/api/session/end", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid session ID");

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/session/end",
        json!({"sessionId": "does-not-exist"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid session ID");
}

/// Test that ending an interactive session succeeds after its shell has
/// already exited on its own.
#[tokio::test]
async fn test_end_session_after_shell_exit() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": "team-1"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &env.app,
        Method::POST,
        &format!("/api/sessions/{session_id}/execute"),
        json!({"command": "exit"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Give the shell time to act on the exit before the record is ended.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/session/end",
        json!({"sessionId": session_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], format!("Session {session_id} ended"));

    // The record is gone either way, so a retry answers not-found.
    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/session/end",
        json!({"sessionId": session_id}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid session ID");
}

/// Test that a terminal command with no session runs and captures output.
#[tokio::test]
async fn test_terminal_execute_without_session() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({"command": "echo hi"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "hi\n");
    assert_eq!(body["returnCode"], 0);
}

/// Test that a terminal command runs inside its session's workspace.
#[tokio::test]
async fn test_terminal_execute_runs_in_session_workspace() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/session/create",
        json!({"questionId": "q-101"}),
    )
    .await;
    let session_id = created["sessionId"].as_str().unwrap();
    let workspace_path = created["workspacePath"].as_str().unwrap();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({"command": "pwd", "sessionId": session_id}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["returnCode"], 0);
    assert_eq!(body["output"].as_str().unwrap().trim_end(), workspace_path);
}

/// Test that terminal execution requires a command.
#[tokio::test]
async fn test_terminal_execute_requires_command() {
    let env = test_env();

    let (status, body) =
        send_json(&env.app, Method::POST, "/api/terminal/execute", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No command provided");

    let (status, _) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({"command": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Test that a failing command is a successful exchange with success=false.
#[tokio::test]
async fn test_terminal_execute_reports_failure_exit_code() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({"command": "exit 7"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["returnCode"], 7);
    assert_eq!(body["output"], "");
}

/// Test that stdout and stderr are combined with a separating newline.
#[tokio::test]
async fn test_terminal_execute_combines_streams() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({"command": "echo out; echo err 1>&2"}),
    )
    .await;

    // Writing to stderr alone does not make the command a failure.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "out\n\nerr\n");
}

/// Test that a command exceeding the terminal timeout reports the fixed
/// timeout message with no return code.
#[tokio::test]
async fn test_terminal_execute_times_out() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({"command": "sleep 30"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["output"], "Command timed out after 2 seconds");
    assert!(body.get("returnCode").is_none());
}

/// Test that the first namespace written to a session sticks.
#[tokio::test]
async fn test_terminal_namespace_first_write_wins() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/session/create",
        json!({"questionId": "q-101"}),
    )
    .await;
    let session_id = created["sessionId"].as_str().unwrap();

    let (_, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({
            "command": "printf '%s' \"${NAMESPACE:-unset}\"",
            "sessionId": session_id,
            "namespace": "alpha"
        }),
    )
    .await;
    assert_eq!(body["output"], "alpha");

    // A later namespace does not replace the stored one.
    let (_, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({
            "command": "printf '%s' \"${NAMESPACE:-unset}\"",
            "sessionId": session_id,
            "namespace": "beta"
        }),
    )
    .await;
    assert_eq!(body["output"], "alpha");

    // An unknown session id leaves the environment untouched.
    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/terminal/execute",
        json!({
            "command": "printf '%s' \"${NAMESPACE:-unset}\"",
            "sessionId": "does-not-exist",
            "namespace": "gamma"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], "unset");
}

/// Test creating an interactive shell session.
#[tokio::test]
async fn test_create_interactive_session() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": "team-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);

    let session_id = body["session_id"].as_str().unwrap();
    assert_eq!(session_id.len(), 36);
    assert_eq!(
        body["message"],
        format!("Session '{session_id}' created successfully")
    );
    assert!(env.workspace_root.join("team-1").join(session_id).is_dir());

    send_delete(&env.app, &format!("/api/sessions/{session_id}")).await;
}

/// Test that interactive session creation requires a namespace.
#[tokio::test]
async fn test_create_interactive_session_requires_namespace() {
    let env = test_env();

    let (status, body) = send_json(&env.app, Method::POST, "/api/sessions", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No namespace provided");

    let (status, _) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Test the full interactive flow: create, execute, poll output, delete.
#[tokio::test]
async fn test_interactive_execute_and_poll_output() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": "team-1"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        &format!("/api/sessions/{session_id}/execute"),
        json!({"command": "echo hello"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Command executed: echo hello");

    let output = poll_session_output(&env.app, &session_id).await;
    assert_eq!(output["output"], "hello");
    assert_eq!(output["error"], "");

    let (status, body) = send_delete(&env.app, &format!("/api/sessions/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["message"],
        format!("Session '{session_id}' deleted successfully")
    );
    // Deletion keeps the workspace directory around.
    assert!(env.workspace_root.join("team-1").join(&session_id).is_dir());

    let (status, body) = send_delete(&env.app, &format!("/api/sessions/{session_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], format!("Session '{session_id}' not found"));
}

/// Test that executing in a session requires a command.
#[tokio::test]
async fn test_interactive_execute_requires_command() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": "team-1"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        &format!("/api/sessions/{session_id}/execute"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No command provided");

    send_delete(&env.app, &format!("/api/sessions/{session_id}")).await;
}

/// Test that interactive endpoints 404 for sessions that do not exist.
#[tokio::test]
async fn test_interactive_endpoints_unknown_session() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions/missing-id/execute",
        json!({"command": "echo hi"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session 'missing-id' not found");

    let (status, body) = send_get(&env.app, "/api/sessions/missing-id/output").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session 'missing-id' not found");

    let (status, body) = send_delete(&env.app, "/api/sessions/missing-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session 'missing-id' not found");
}

/// Test that an unknown session 404s on execute even when the request
/// carries no command.
#[tokio::test]
async fn test_interactive_execute_unknown_session_without_command() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions/missing-id/execute",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session 'missing-id' not found");
}

/// Test that stderr lines come back in the error field, not output.
#[tokio::test]
async fn test_session_output_separates_streams() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": "team-1"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &env.app,
        Method::POST,
        &format!("/api/sessions/{session_id}/execute"),
        json!({"command": "echo oops 1>&2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let output = poll_session_output(&env.app, &session_id).await;
    assert_eq!(output["error"], "oops");
    assert_eq!(output["output"], "");

    send_delete(&env.app, &format!("/api/sessions/{session_id}")).await;
}

/// Test that polling an idle session returns empty strings immediately.
#[tokio::test]
async fn test_session_output_empty_when_idle() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": "team-1"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let (status, body) = send_get(&env.app, &format!("/api/sessions/{session_id}/output")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "");
    assert_eq!(body["error"], "");

    send_delete(&env.app, &format!("/api/sessions/{session_id}")).await;
}

/// Test interactive-only endpoints against a workspace session record.
#[tokio::test]
async fn test_interactive_ops_reject_workspace_sessions() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/session/create",
        json!({"questionId": "q-101"}),
    )
    .await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        &format!("/api/sessions/{session_id}/execute"),
        json!({"command": "echo hi"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], format!("Session '{session_id}' not found"));

    let (status, _) = send_get(&env.app, &format!("/api/sessions/{session_id}/output")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleting a workspace record works; there is just no process to stop.
    let (status, body) = send_delete(&env.app, &format!("/api/sessions/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

/// Test lab validation for passing and failing steps.
#[tokio::test]
async fn test_validate_lab_pass_and_fail() {
    let env = test_env();
    let lab_dir = env.labs_dir.join("lab-net");
    write_validation_file(
        &lab_dir,
        "validate.json",
        r#"{"1": "true", "2": "echo checked", "3": "echo broken 1>&2; exit 2"}"#,
    );

    // Numeric step keys coerce to their string form.
    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"lab": "lab-net", "step": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert_eq!(body["output"], "Command executed successfully");

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"lab": "lab-net", "step": "2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert_eq!(body["output"], "checked");

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"lab": "lab-net", "step": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], false);
    assert_eq!(body["output"], "broken");
}

/// Test validation 404s for missing labs and steps.
#[tokio::test]
async fn test_validate_missing_lab_and_step() {
    let env = test_env();
    let lab_dir = env.labs_dir.join("lab-net");
    write_validation_file(&lab_dir, "validate.json", r#"{"1": "true"}"#);

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"lab": "nope", "step": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Lab 'nope' not found");

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"lab": "lab-net", "step": 9}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Step 9 not found for lab 'lab-net'");
}

/// Test that a freshly created question with an empty validation map has no
/// steps to validate.
#[tokio::test]
async fn test_validate_empty_map_is_step_not_found() {
    let env = test_env();
    let question_dir = env.questions_dir.join("q-new");
    write_validation_file(&question_dir, "validation.json", "{}");

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"question_id": "q-new", "step": "1"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Step 1 not found for question 'q-new'");
}

/// Test that an unparseable validation file is a server-side error.
#[tokio::test]
async fn test_validate_invalid_format() {
    let env = test_env();
    let lab_dir = env.labs_dir.join("lab-bad");
    write_validation_file(&lab_dir, "validate.json", "not json at all");

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"lab": "lab-bad", "step": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Invalid validation file format");
}

/// Test validation request preconditions.
#[tokio::test]
async fn test_validate_requires_target_and_body() {
    let env = test_env();

    let (status, body) =
        send_json(&env.app, Method::POST, "/api/validate", json!({"step": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing lab or question_id parameter");

    // A bodyless POST is rejected before any field checks.
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/validate")
                .method(Method::POST)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_body(response).await;
    assert_eq!(body["error"], "No data provided");
}

/// Test `${NAMESPACE}` substitution in question validation commands.
#[tokio::test]
async fn test_validate_question_namespace_substitution() {
    let env = test_env();
    let question_dir = env.questions_dir.join("q-ns");
    write_validation_file(
        &question_dir,
        "validation.json",
        r#"{"1": "printf 'ns=%s' ${NAMESPACE}"}"#,
    );

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"question_id": "q-ns", "step": 1, "namespace": "demo"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert_eq!(body["output"], "ns=demo");

    // Without a namespace the placeholder reaches the shell unexpanded and
    // resolves to an unset variable.
    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"question_id": "q-ns", "step": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], "ns=");
}

/// Test question validation 404 for an unknown question.
#[tokio::test]
async fn test_validate_question_not_found() {
    let env = test_env();

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/validate",
        json!({"question_id": "ghost", "step": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Question 'ghost' validation not found");
}

/// Test the namespace creation endpoint with the stubbed CLI.
#[tokio::test]
async fn test_create_namespace_endpoint() {
    let env = test_env();

    let (status, body) =
        send_json(&env.app, Method::POST, "/api/create-namespace", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No namespace provided");

    let (status, body) = send_json(
        &env.app,
        Method::POST,
        "/api/create-namespace",
        json!({"namespace": "team-blue"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Namespace 'team-blue' created successfully");
}

/// Test that concurrent workspace creates never share an identifier.
#[tokio::test]
async fn test_concurrent_workspace_creates_get_distinct_ids() {
    let env = test_env();

    let request = json!({"questionId": "q-101"});
    let (a, b, c) = tokio::join!(
        send_json(&env.app, Method::POST, "/api/session/create", request.clone()),
        send_json(&env.app, Method::POST, "/api/session/create", request.clone()),
        send_json(&env.app, Method::POST, "/api/session/create", request.clone()),
    );

    let ids: HashSet<String> = [a, b, c]
        .iter()
        .map(|(status, body)| {
            assert_eq!(*status, StatusCode::OK);
            body["sessionId"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids.len(), 3);
}

/// Test that a delete racing an execute leaves the registry consistent.
#[tokio::test]
async fn test_delete_races_with_execute() {
    let env = test_env();

    let (_, created) = send_json(
        &env.app,
        Method::POST,
        "/api/sessions",
        json!({"namespace": "team-1"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let delete_path = format!("/api/sessions/{session_id}");
    let execute_path = format!("/api/sessions/{session_id}/execute");
    let (deleted, executed) = tokio::join!(
        send_delete(&env.app, &delete_path),
        send_json(
            &env.app,
            Method::POST,
            &execute_path,
            json!({"command": "echo hi"}),
        ),
    );

    assert_eq!(deleted.0, StatusCode::OK);
    assert!(
        [
            StatusCode::OK,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR
        ]
        .contains(&executed.0),
        "unexpected execute status {}",
        executed.0
    );

    // Whatever the race decided, the session is gone afterwards.
    let (status, _) = send_get(&env.app, &format!("/api/sessions/{session_id}/output")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
