//! HTTP ingress: liveness/readiness, Prometheus metrics, and the
//! text-in/text-out API surface that fronts the orchestrator. Correlation,
//! auth, rate-limiting, and tracing are `tower` middleware layered over
//! the whole router.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::control::health::{DependencyCheck, DependencyStatus, ReadinessReport};
use crate::control::{auth_middleware, AuthContext, CorrelationId};
use crate::error::error_response;
use crate::orchestrator::{Orchestrator, TranscriptOutcome};
use crate::tools::ToolInvocationResult;

/// Shared state handed to every handler. Distinct from `AuthContext`,
/// which is layered in separately so the auth middleware's state type
/// doesn't have to match the router's.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<AppConfig>,
}

/// Builds the full router: open health/metrics endpoints plus the
/// auth-and-rate-limited API surface.
pub fn router(state: Arc<AppState>, auth: Arc<AuthContext>) -> Router {
    let api = Router::new()
        .route("/api/v1/transcripts", post(post_transcript))
        .route("/api/v1/notifications/transcript", post(post_transcript_notification))
        .route("/api/v1/messages", post(post_message))
        .route("/api/v1/capabilities", get(get_capabilities))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/health/live", get(get_liveness))
        .route("/health/ready", get(get_readiness))
        .route("/metrics", get(get_metrics))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct TranscriptRequest {
    session_id: Uuid,
    owner: String,
    channel: String,
    transcript: String,
}

#[derive(Deserialize)]
struct MessageRequest {
    session_id: Uuid,
    owner: String,
    channel: String,
    message: String,
}

#[derive(Serialize)]
struct TranscriptResponse {
    success: bool,
    session_id: Uuid,
    agent: String,
    response_text: String,
    actions: Vec<ToolInvocationResult>,
    correlation_id: Uuid,
}

impl From<TranscriptOutcome> for TranscriptResponse {
    fn from(outcome: TranscriptOutcome) -> Self {
        Self {
            success: true,
            session_id: outcome.session_id,
            agent: outcome.agent,
            response_text: outcome.response_text,
            actions: outcome.actions,
            correlation_id: outcome.correlation_id,
        }
    }
}

async fn post_transcript(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<TranscriptRequest>) -> Response {
    let correlation_id = CorrelationId::from_headers(&headers);
    match state
        .orchestrator
        .process_transcript(req.session_id, &req.owner, &req.channel, &req.transcript, correlation_id.0)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(TranscriptResponse::from(outcome))).into_response(),
        Err(e) => error_response(&e, correlation_id.0),
    }
}

/// Fire-and-forget variant: the transcript is processed in the
/// background and the caller gets an immediate acknowledgment rather
/// than waiting on the full agent/tool/guardrail round trip.
async fn post_transcript_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TranscriptRequest>,
) -> Response {
    let correlation_id = CorrelationId::from_headers(&headers);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator
            .process_transcript(req.session_id, &req.owner, &req.channel, &req.transcript, correlation_id.0)
            .await
        {
            tracing::warn!(correlation_id = %correlation_id.0, error = %e, "notification transcript processing failed");
        }
    });
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "success": true, "correlation_id": correlation_id.0 })),
    )
        .into_response()
}

/// Direct text-chat entry point, bypassing STT entirely — same pipeline
/// as `/transcripts`, addressed by message rather than spoken transcript.
async fn post_message(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<MessageRequest>) -> Response {
    let correlation_id = CorrelationId::from_headers(&headers);
    match state
        .orchestrator
        .process_transcript(req.session_id, &req.owner, &req.channel, &req.message, correlation_id.0)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(TranscriptResponse::from(outcome))).into_response(),
        Err(e) => error_response(&e, correlation_id.0),
    }
}

#[derive(Serialize)]
struct OperationSpec {
    method: &'static str,
    path: &'static str,
    description: &'static str,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct CapabilitiesResponse {
    service: &'static str,
    version: &'static str,
    operations: Vec<OperationSpec>,
}

fn transcript_like_schema(text_field: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["session_id", "owner", "channel", text_field],
        "properties": {
            "session_id": {"type": "string", "format": "uuid"},
            "owner": {"type": "string"},
            "channel": {"type": "string"},
            (text_field): {"type": "string"},
        },
    })
}

/// Describes this service and every operation it exposes, each with a
/// JSON schema for its parameters, so a caller can discover the API
/// without reading source.
async fn get_capabilities() -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        service: "switchboard-core",
        version: env!("CARGO_PKG_VERSION"),
        operations: vec![
            OperationSpec {
                method: "POST",
                path: "/api/v1/transcripts",
                description: "Run a finished transcript through the agent/tool pipeline and wait for the response.",
                parameters: transcript_like_schema("transcript"),
            },
            OperationSpec {
                method: "POST",
                path: "/api/v1/notifications/transcript",
                description: "Fire-and-forget variant of /api/v1/transcripts: acknowledges immediately and processes in the background.",
                parameters: transcript_like_schema("transcript"),
            },
            OperationSpec {
                method: "POST",
                path: "/api/v1/messages",
                description: "Direct text-chat entry point, bypassing STT, through the same pipeline as /api/v1/transcripts.",
                parameters: transcript_like_schema("message"),
            },
            OperationSpec {
                method: "GET",
                path: "/api/v1/capabilities",
                description: "Describe this service and the operations it exposes.",
                parameters: serde_json::json!({ "type": "object", "properties": {} }),
            },
        ],
    })
}

async fn get_liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

/// A minimal, in-process readiness check: the session store and agent
/// registry are always reachable once the process is up, so the only
/// thing worth reporting is whether at least one agent is registered to
/// serve traffic. Upstream STT/TTS/LLM reachability is not probed here —
/// those failures surface per-request as `dependency_unavailable`
/// instead of flipping readiness for the whole process.
async fn get_readiness(State(state): State<Arc<AppState>>) -> Response {
    let agents_ready = !state.orchestrator.agents.is_empty();
    let deps = vec![DependencyCheck {
        name: "agent_registry".to_string(),
        status: if agents_ready { DependencyStatus::Healthy } else { DependencyStatus::Unhealthy },
        required: true,
        detail: None,
    }];
    let report = ReadinessReport::aggregate(deps);
    let status = if report.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    state.orchestrator.metrics.health_status.set(match report.status {
        crate::control::health::AggregateStatus::Healthy => 1.0,
        crate::control::health::AggregateStatus::Degraded => 0.5,
        crate::control::health::AggregateStatus::Unhealthy => 0.0,
    });
    (status, Json(report)).into_response()
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    let body = state.orchestrator.metrics.render();
    (StatusCode::OK, [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}
