//! One-shot terminal command execution.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::command::{CommandError, RunOptions};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRequest {
    pub command: Option<String>,
    pub session_id: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResponse {
    pub success: bool,
    pub output: String,
    /// Absent when the command timed out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
}

/// Run a command to completion, in the session's workspace when a known
/// session id accompanies it.
///
/// An unknown session id is not an error; the command just runs without a
/// workspace or namespace. A failing or timed-out command is a successful
/// exchange reporting an unsuccessful command.
#[instrument(skip(state, body))]
pub async fn execute_terminal(
    State(state): State<AppState>,
    body: Result<Json<TerminalRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let Some(command) = req.command.filter(|cmd| !cmd.is_empty()) else {
        return Err(ApiError::bad_request("No command provided"));
    };

    let context = match req.session_id.as_deref() {
        Some(id) => {
            state
                .sessions
                .terminal_context(id, req.namespace.as_deref())
                .await
        }
        None => None,
    };

    let mut options = RunOptions::with_timeout(state.terminal_timeout);
    if let Some(context) = context {
        options = options.cwd(context.workspace);
        if let Some(namespace) = context.namespace {
            options = options.env("NAMESPACE", namespace);
        }
    }

    match state.runner.run(&command, &options).await {
        Ok(output) => {
            let mut combined = output.stdout.clone();
            if !output.stderr.is_empty() {
                if combined.is_empty() {
                    combined = output.stderr.clone();
                } else {
                    combined.push('\n');
                    combined.push_str(&output.stderr);
                }
            }
            Ok(Json(TerminalResponse {
                success: output.success(),
                output: combined,
                return_code: Some(output.exit_code),
            })
            .into_response())
        }
        Err(err @ CommandError::TimedOut(_)) => Ok(Json(TerminalResponse {
            success: false,
            output: err.to_string(),
            return_code: None,
        })
        .into_response()),
        Err(CommandError::Io(err)) => {
            error!(%err, "terminal command failed to start");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TerminalResponse {
                    success: false,
                    output: format!("Error executing command: {err}"),
                    return_code: None,
                }),
            )
                .into_response())
        }
    }
}
