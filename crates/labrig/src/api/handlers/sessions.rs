//! Session endpoints: interactive shells and workspace sessions.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::session::SessionError;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
}

/// Success/failure envelope shared by the mutation endpoints.
#[derive(Debug, Serialize)]
pub struct SessionMessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteCommandRequest {
    pub command: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionOutputResponse {
    pub success: bool,
    pub output: String,
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    pub question_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceResponse {
    pub success: bool,
    pub session_id: String,
    pub workspace_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    pub session_id: Option<String>,
}

/// Create an interactive shell session rooted in a fresh workspace.
#[instrument(skip(state, body))]
pub async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let Some(namespace) = req.namespace.filter(|ns| !ns.is_empty()) else {
        return Err(ApiError::bad_request("No namespace provided"));
    };

    match state.sessions.create_interactive(&namespace).await {
        Ok(id) => {
            let message = format!("Session '{id}' created successfully");
            Ok((
                StatusCode::CREATED,
                Json(CreateSessionResponse {
                    success: true,
                    session_id: id,
                    message,
                }),
            )
                .into_response())
        }
        Err(err) => {
            error!(%err, "failed to create interactive session");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SessionMessageResponse {
                    success: false,
                    message: err.to_string(),
                }),
            )
                .into_response())
        }
    }
}

/// Delete an interactive session and stop its shell.
#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionMessageResponse>> {
    state
        .sessions
        .delete_interactive(&session_id)
        .await
        .map_err(|err| match &err {
            SessionError::NotFound(_) => ApiError::not_found(err.to_string()),
            _ => ApiError::internal(format!("Failed to terminate session: {err}")),
        })?;

    Ok(Json(SessionMessageResponse {
        success: true,
        message: format!("Session '{session_id}' deleted successfully"),
    }))
}

/// Queue one command line to the session's shell.
#[instrument(skip(state, body))]
pub async fn execute_command(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<ExecuteCommandRequest>, JsonRejection>,
) -> ApiResult<Json<SessionMessageResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    // Resolve the session before validating the command; an unknown id
    // answers not-found even when the command is missing.
    state
        .sessions
        .ensure_interactive(&session_id)
        .await
        .map_err(|err| ApiError::not_found(err.to_string()))?;

    let Some(command) = req.command.filter(|cmd| !cmd.is_empty()) else {
        return Err(ApiError::bad_request("No command provided"));
    };

    state
        .sessions
        .execute_interactive(&session_id, &command)
        .await
        .map_err(|err| match &err {
            SessionError::NotFound(_) => ApiError::not_found(err.to_string()),
            _ => ApiError::internal(format!("Failed to execute command: {err}")),
        })?;

    Ok(Json(SessionMessageResponse {
        success: true,
        message: format!("Command executed: {command}"),
    }))
}

/// Poll one buffered line from each of the session's output streams.
#[instrument(skip(state))]
pub async fn session_output(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionOutputResponse>> {
    let polled = state
        .sessions
        .read_output(&session_id)
        .await
        .map_err(|err| match &err {
            SessionError::NotFound(_) => ApiError::not_found(err.to_string()),
            _ => ApiError::internal(err.to_string()),
        })?;

    Ok(Json(SessionOutputResponse {
        success: true,
        output: polled.stdout.trim().to_string(),
        error: polled.stderr.trim().to_string(),
    }))
}

/// Create a workspace session for a question.
#[instrument(skip(state, body))]
pub async fn create_workspace_session(
    State(state): State<AppState>,
    body: Result<Json<CreateWorkspaceRequest>, JsonRejection>,
) -> ApiResult<Json<CreateWorkspaceResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let Some(question_id) = req.question_id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::bad_request("No question ID provided"));
    };

    let session = state
        .sessions
        .create_workspace(&question_id)
        .await
        .map_err(|err| ApiError::internal(format!("Failed to create session: {err}")))?;

    Ok(Json(CreateWorkspaceResponse {
        success: true,
        session_id: session.id,
        workspace_path: session.workspace.display().to_string(),
    }))
}

/// End a workspace session. The workspace directory stays on disk.
#[instrument(skip(state, body))]
pub async fn end_session(
    State(state): State<AppState>,
    body: Result<Json<EndSessionRequest>, JsonRejection>,
) -> ApiResult<Json<SessionMessageResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let Some(session_id) = req.session_id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::not_found("Invalid session ID"));
    };

    // The only failure end_workspace reports is an unknown id.
    state
        .sessions
        .end_workspace(&session_id)
        .await
        .map_err(|err| ApiError::not_found(err.to_string()))?;

    Ok(Json(SessionMessageResponse {
        success: true,
        message: format!("Session {session_id} ended"),
    }))
}
