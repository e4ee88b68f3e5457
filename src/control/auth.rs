//! Ingress auth + per-client rate limiting: bearer token check against
//! a shared secret set, then a token-bucket
//! request budget per client. Both failures surface as the standard
//! `{success:false, reason, correlation_id}` envelope via
//! `SwitchboardError`.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use super::correlation::CorrelationId;
use super::rate_limit::RateLimiter;
use crate::error::{error_response, SwitchboardError};

pub struct AuthContext {
    bearer_tokens: HashSet<String>,
    limiter: RateLimiter,
}

impl AuthContext {
    pub fn new(bearer_tokens: HashSet<String>, rps_per_client: u32, window: std::time::Duration) -> Self {
        Self {
            bearer_tokens,
            limiter: RateLimiter::new(rps_per_client, window),
        }
    }

    fn authorize(&self, token: Option<&str>) -> Result<(), SwitchboardError> {
        if self.bearer_tokens.is_empty() {
            return Ok(());
        }
        match token {
            Some(t) if self.bearer_tokens.contains(t) => Ok(()),
            _ => Err(SwitchboardError::Unauthorized),
        }
    }

    fn check_rate(&self, client_key: &str) -> Result<(), SwitchboardError> {
        self.limiter.check(client_key).map_err(|_| SwitchboardError::RateLimited)
    }
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Auth + rate-limit middleware, wired via `axum::middleware::from_fn_with_state`.
/// Client identity for rate limiting is the bearer token when present,
/// else the connecting socket address.
pub async fn auth_middleware(
    State(ctx): State<Arc<AuthContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlation_id = CorrelationId::from_headers(request.headers());
    let token = bearer_token(request.headers());

    if let Err(e) = ctx.authorize(token) {
        return error_response(&e, correlation_id.0);
    }

    let client_key = token.map(str::to_string).unwrap_or_else(|| addr.ip().to_string());
    if let Err(e) = ctx.check_rate(&client_key) {
        return error_response(&e, correlation_id.0);
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(CorrelationId::header_name(), correlation_id.header_value());
    response
}
