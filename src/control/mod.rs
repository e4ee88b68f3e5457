//! Control plane (C15) and ingress auth/rate-limiting (C16): correlation
//! id propagation, liveness/readiness, Prometheus metrics, bearer auth,
//! and per-client rate limiting. Wired into the HTTP layer as `tower`
//! middleware plus a handful of plain handlers.

pub mod auth;
pub mod correlation;
pub mod health;
pub mod metrics;
pub mod rate_limit;

pub use auth::{auth_middleware, AuthContext};
pub use correlation::CorrelationId;
pub use health::{AggregateStatus, DependencyCheck, DependencyStatus, ReadinessReport};
pub use metrics::Metrics;
pub use rate_limit::RateLimiter;
