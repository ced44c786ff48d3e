//! Cluster namespace management.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::command::RunOptions;

const NAMESPACE_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Deserialize)]
pub struct CreateNamespaceRequest {
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateNamespaceResponse {
    pub success: bool,
    pub message: String,
}

/// Recreate a cluster namespace through the configured CLI: delete any
/// namespace with the same name, then create it fresh.
#[instrument(skip(state, body))]
pub async fn create_namespace(
    State(state): State<AppState>,
    body: Result<Json<CreateNamespaceRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let Some(namespace) = req.namespace.filter(|ns| !ns.is_empty()) else {
        return Err(ApiError::bad_request("No namespace provided"));
    };

    let cli = &state.cluster_cli;
    let options = RunOptions::with_timeout(NAMESPACE_COMMAND_TIMEOUT);

    // Best-effort teardown of a leftover namespace with the same name.
    let teardown = format!("{cli} delete namespace {namespace} --ignore-not-found");
    if let Err(err) = state.runner.run(&teardown, &options).await {
        debug!(%err, namespace, "namespace teardown failed");
    }

    let create = format!("{cli} create namespace {namespace}");
    match state.runner.run(&create, &options).await {
        Ok(output) if output.success() => Ok(Json(CreateNamespaceResponse {
            success: true,
            message: format!("Namespace '{namespace}' created successfully"),
        })
        .into_response()),
        Ok(output) => {
            let stderr = output.stderr.trim();
            let message = if stderr.is_empty() {
                "Failed to create namespace".to_string()
            } else {
                stderr.to_string()
            };
            Ok(Json(CreateNamespaceResponse {
                success: false,
                message,
            })
            .into_response())
        }
        Err(err) => {
            error!(%err, namespace, "namespace creation failed to run");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreateNamespaceResponse {
                    success: false,
                    message: err.to_string(),
                }),
            )
                .into_response())
        }
    }
}
