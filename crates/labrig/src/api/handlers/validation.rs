//! Validation endpoint.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::validation::{ValidationError, ValidationSource};

#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    /// Step key; clients send strings and bare numbers interchangeably.
    pub step: Option<Value>,
    pub lab: Option<String>,
    pub question_id: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub passed: bool,
    pub output: String,
}

/// Run one validation step for a lab or a question.
#[instrument(skip(state, body))]
pub async fn validate_step(
    State(state): State<AppState>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Ok(Json(req)) = body else {
        return Err(ApiError::bad_request("No data provided"));
    };

    let step = step_key(req.step.as_ref());
    let source = if let Some(lab) = req.lab.filter(|lab| !lab.is_empty()) {
        ValidationSource::Lab(lab)
    } else if let Some(id) = req.question_id.filter(|id| !id.is_empty()) {
        ValidationSource::Question(id)
    } else {
        return Err(ApiError::bad_request("Missing lab or question_id parameter"));
    };

    let namespace = req.namespace.filter(|ns| !ns.is_empty());

    match state
        .validator
        .validate(&source, &step, namespace.as_deref())
        .await
    {
        Ok(outcome) => Ok(Json(ValidateResponse {
            passed: outcome.passed,
            output: outcome.output,
        })
        .into_response()),
        Err(err @ ValidationError::Exec(_)) => {
            error!(%err, "validation command failed to start");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValidateResponse {
                    passed: false,
                    output: err.to_string(),
                }),
            )
                .into_response())
        }
        Err(err) => Err(map_validation_error(err)),
    }
}

fn map_validation_error(err: ValidationError) -> ApiError {
    match &err {
        ValidationError::LabNotFound(_)
        | ValidationError::QuestionNotFound(_)
        | ValidationError::LabStepNotFound { .. }
        | ValidationError::QuestionStepNotFound { .. } => ApiError::not_found(err.to_string()),
        ValidationError::InvalidFormat(_) => ApiError::internal(err.to_string()),
        ValidationError::Exec(_) | ValidationError::Io(_) => ApiError::internal(err.to_string()),
    }
}

/// Render the step key the way it appears in validation files. Strings pass
/// through; anything else is rendered as JSON, so `3` looks up `"3"`.
fn step_key(step: Option<&Value>) -> String {
    match step {
        Some(Value::String(key)) => key.clone(),
        Some(other) => other.to_string(),
        None => Value::Null.to_string(),
    }
}
