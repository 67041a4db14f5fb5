//! HTTP entry point for the scoring pipeline.
//!
//! One operational route: `POST /ev/score`. Responses are always structured
//! JSON with a `status` field of `"success"` or `"error"`; pipeline errors
//! are translated to HTTP status codes here and nowhere else.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::auth::Authorizer;
use crate::error::{AuthError, PipelineError};
use crate::model::QuotaKind;
use crate::pipeline::{Orchestrator, ScoreRequest};
use crate::ratelimit::{Admission, RateLimiter};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub authorizer: Arc<dyn Authorizer>,
    pub limiter: Arc<dyn RateLimiter>,
    /// Session token that skips authorization (internal callers).
    pub bypass_token: Option<String>,
}

/// Build the Axum router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ev/score", post(score))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "service": "leadscore" }))
}

/// Request body for `POST /ev/score`. Fields are validated by hand so a
/// missing field yields a 400 with a named-field error, not a decoder
/// rejection.
#[derive(Debug, Deserialize)]
struct ScoreBody {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
}

async fn score(
    State(state): State<AppState>,
    body: Result<Json<ScoreBody>, JsonRejection>,
) -> Response {
    // A decoder rejection must still produce the structured error shape,
    // not axum's plain-text default.
    let Json(body) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {rejection}"),
            );
        }
    };

    let conversation_id = match require(body.conversation_id, "conversation_id") {
        Ok(v) => v,
        Err(response) => return response,
    };
    let account_id = match require(body.account_id, "account_id") {
        Ok(v) => v,
        Err(response) => return response,
    };
    let session_id = match require(body.session_id, "session_id") {
        Ok(v) => v,
        Err(response) => return response,
    };

    // Internal callers present the bypass token and skip the session check.
    let bypassed = state.bypass_token.as_deref() == Some(session_id.as_str());
    if !bypassed {
        match state.authorizer.authorize(&account_id, &session_id).await {
            Ok(()) => {}
            Err(AuthError::Denied(reason)) => {
                warn!(account = %account_id, %reason, "Authorization denied");
                return error_response(StatusCode::UNAUTHORIZED, &reason);
            }
            Err(AuthError::Storage(e)) => {
                error!(account = %account_id, error = %e, "Authorization lookup failed");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "authorization check failed",
                );
            }
        }
    }

    // General quota guards the front door; the AI quota is checked inside
    // the pipeline, right before the paid calls.
    if let Admission::Denied(reason) = state.limiter.admit(&account_id, QuotaKind::General).await {
        return error_response(StatusCode::TOO_MANY_REQUESTS, &reason);
    }

    let request = ScoreRequest {
        conversation_id,
        account_id,
        message_id: body.message_id,
    };

    match state.orchestrator.score_conversation(&request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "ev_score": outcome.ev_score,
                "conversation_id": outcome.conversation_id,
                "flagged": outcome.flagged,
                "token_usage": outcome.token_usage,
            })),
        )
            .into_response(),
        Err(e) => {
            error!(
                conversation = %request.conversation_id,
                account = %request.account_id,
                error = %e,
                "Pipeline failed"
            );
            error_response(status_for(&e), &e.to_string())
        }
    }
}

fn require(value: Option<String>, name: &str) -> Result<String, Response> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            &format!("missing required field: {name}"),
        )),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "status": "error", "error": message })),
    )
        .into_response()
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::ScoringFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn pipeline_errors_map_to_expected_statuses() {
        assert_eq!(
            status_for(&PipelineError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&PipelineError::RateLimited("x".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&PipelineError::ScoringFailed { code: -2 }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&PipelineError::Storage(StorageError::Query("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
