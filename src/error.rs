//! Centralized error types for switchboard-core.
//!
//! Each component defines the error kinds it can fail with; this module
//! aggregates them into one `SwitchboardError` for the HTTP ingress
//! layer and implements `IntoResponse` so failures become a uniform
//! `{success:false, reason, correlation_id}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Machine-readable error code for API responses.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("expected {expected} samples per frame, got {actual}")]
    InvalidFrameShape { expected: usize, actual: usize },
    #[error("frame sequence not contiguous: {prev} -> {next}")]
    NonContiguousFrames { prev: u64, next: u64 },
    #[error("segment has no frames")]
    EmptySegment,
    #[error("malformed input bytes: {0}")]
    Malformed(String),
    #[error("unsupported codec: {0}")]
    UnsupportedFormat(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            _ => "codec_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum VadError {
    #[error("VAD model not loaded: {0}")]
    ModelNotLoaded(String),
    #[error("invalid audio for VAD: {0}")]
    InvalidAudio(String),
    #[error("VAD backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl ErrorCode for VadError {
    fn code(&self) -> &'static str {
        "vad_error"
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown adapter: {0}")]
    Unknown(String),
    #[error("transient adapter failure: {0}")]
    Transient(String),
    #[error("fatal adapter failure: {0}")]
    Fatal(String),
}

impl ErrorCode for AdapterError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "unknown_adapter",
            Self::Transient(_) => "adapter_transient",
            Self::Fatal(_) => "adapter_fatal",
        }
    }
}

#[derive(Debug, Error)]
pub enum SttError {
    #[error("transient STT failure: {0}")]
    Transient(String),
    #[error("fatal STT failure: {0}")]
    Fatal(String),
}

impl ErrorCode for SttError {
    fn code(&self) -> &'static str {
        "stt_error"
    }
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("text exceeds maximum length ({0} chars)")]
    TooLong(usize),
    #[error("transient TTS failure: {0}")]
    Transient(String),
    #[error("fatal TTS failure: {0}")]
    Fatal(String),
}

impl ErrorCode for TtsError {
    fn code(&self) -> &'static str {
        match self {
            Self::TooLong(_) => "tts_text_too_long",
            _ => "tts_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transient LLM failure: {0}")]
    Transient(String),
    #[error("fatal LLM failure: {0}")]
    Fatal(String),
}

impl ErrorCode for LlmError {
    fn code(&self) -> &'static str {
        "llm_error"
    }
}

/// Reasons a guardrail can block a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailReason {
    PromptInjection,
    TooLong,
    ToxicContent,
    PiiLeak,
    PolicyViolation,
}

impl GuardrailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromptInjection => "prompt_injection",
            Self::TooLong => "too_long",
            Self::ToxicContent => "toxic_content",
            Self::PiiLeak => "pii_leak",
            Self::PolicyViolation => "policy_violation",
        }
    }
}

#[derive(Debug, Error)]
#[error("blocked by guardrail: {reason:?}")]
pub struct GuardrailBlocked {
    pub reason: GuardrailReason,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool or invalid arguments: {0}")]
    Contract(String),
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

impl ErrorCode for ToolError {
    fn code(&self) -> &'static str {
        match self {
            Self::Contract(_) => "tool_contract_error",
            Self::Execution(_) => "tool_execution_error",
            Self::RateLimited { .. } => "rate_limited",
        }
    }
}

#[derive(Debug, Error)]
#[error("agent exceeded its time budget")]
pub struct AgentTimeout;

/// Application-wide error type for the ingress HTTP layer.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Vad(#[from] VadError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Stt(#[from] SttError),
    #[error(transparent)]
    Tts(#[from] TtsError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Guardrail(#[from] GuardrailBlocked),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    AgentTimeout(#[from] AgentTimeout),
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SwitchboardError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Codec(e) => e.code(),
            Self::Vad(e) => e.code(),
            Self::Adapter(e) => e.code(),
            Self::Stt(e) => e.code(),
            Self::Tts(e) => e.code(),
            Self::Llm(e) => e.code(),
            Self::Guardrail(g) => g.reason.as_str(),
            Self::Tool(e) => e.code(),
            Self::AgentTimeout(_) => "agent_timeout",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited | Self::Tool(ToolError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            Self::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    reason: &'static str,
    correlation_id: Uuid,
}

/// Renders an error as the standard JSON failure envelope, tagged with
/// the correlation id of the request that failed.
pub fn error_response(err: &SwitchboardError, correlation_id: Uuid) -> Response {
    let body = ErrorBody {
        success: false,
        reason: err.reason(),
        correlation_id,
    };
    (err.status_code(), Json(body)).into_response()
}

impl IntoResponse for SwitchboardError {
    fn into_response(self) -> Response {
        error_response(&self, Uuid::nil())
    }
}

pub type SwitchboardResult<T> = Result<T, SwitchboardError>;
