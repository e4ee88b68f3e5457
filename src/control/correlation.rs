//! Correlation id propagation: every request entering the core is
//! assigned or inherits a correlation id carried through structured
//! logs, metric labels, and span attributes.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Newtype wrapper so correlation ids are never confused with other
/// UUIDs (session ids, idempotency keys) at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reads `X-Correlation-ID` from request headers, generating a
    /// fresh id if absent or malformed.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Self)
            .unwrap_or_else(Self::new)
    }

    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.0.to_string()).expect("uuid renders as a valid header value")
    }

    pub fn header_name() -> HeaderName {
        HeaderName::from_static(CORRELATION_HEADER)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_fresh_id_when_header_absent() {
        let headers = HeaderMap::new();
        let id = CorrelationId::from_headers(&headers);
        assert_ne!(id.0, Uuid::nil());
    }

    #[test]
    fn reuses_id_from_valid_header() {
        let existing = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(CorrelationId::header_name(), HeaderValue::from_str(&existing.to_string()).unwrap());
        let id = CorrelationId::from_headers(&headers);
        assert_eq!(id.0, existing);
    }

    #[test]
    fn falls_back_on_malformed_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CorrelationId::header_name(), HeaderValue::from_static("not-a-uuid"));
        let id = CorrelationId::from_headers(&headers);
        assert_ne!(id.0, Uuid::nil());
    }
}
