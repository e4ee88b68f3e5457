//! Liveness/readiness aggregation: every component exposes liveness
//! (always ok while the process runs) and readiness (reflects
//! dependency checks); aggregate readiness is `healthy` iff all
//! required dependencies are healthy, else `degraded` or `unhealthy`.
//! Named checks, an overall status, and a 503 when not ready.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyCheck {
    pub name: String,
    pub status: DependencyStatus,
    pub required: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: AggregateStatus,
    pub dependencies: Vec<DependencyCheck>,
}

impl ReadinessReport {
    /// `healthy` iff every required dependency is healthy; any
    /// unhealthy required dependency makes the whole report
    /// `unhealthy`, an unhealthy non-required one makes it `degraded`.
    pub fn aggregate(dependencies: Vec<DependencyCheck>) -> Self {
        let mut status = AggregateStatus::Healthy;
        for dep in &dependencies {
            match (dep.status, dep.required) {
                (DependencyStatus::Unhealthy, true) => {
                    status = AggregateStatus::Unhealthy;
                    break;
                }
                (DependencyStatus::Unhealthy, false) | (DependencyStatus::Degraded, _) => {
                    if status == AggregateStatus::Healthy {
                        status = AggregateStatus::Degraded;
                    }
                }
                (DependencyStatus::Healthy, _) => {}
            }
        }
        Self { status, dependencies }
    }

    pub fn is_ready(&self) -> bool {
        self.status != AggregateStatus::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, status: DependencyStatus, required: bool) -> DependencyCheck {
        DependencyCheck { name: name.to_string(), status, required, detail: None }
    }

    #[test]
    fn all_healthy_is_healthy() {
        let report = ReadinessReport::aggregate(vec![check("stt", DependencyStatus::Healthy, true)]);
        assert_eq!(report.status, AggregateStatus::Healthy);
        assert!(report.is_ready());
    }

    #[test]
    fn unhealthy_required_dependency_is_unhealthy() {
        let report = ReadinessReport::aggregate(vec![check("stt", DependencyStatus::Unhealthy, true)]);
        assert_eq!(report.status, AggregateStatus::Unhealthy);
        assert!(!report.is_ready());
    }

    #[test]
    fn unhealthy_optional_dependency_is_degraded_not_unready() {
        let report = ReadinessReport::aggregate(vec![
            check("stt", DependencyStatus::Healthy, true),
            check("metrics-collector", DependencyStatus::Unhealthy, false),
        ]);
        assert_eq!(report.status, AggregateStatus::Degraded);
        assert!(report.is_ready());
    }
}
