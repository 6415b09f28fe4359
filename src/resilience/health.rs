//! Cheap backend health probes, aggregated into one overall status.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: Status,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: Status,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let overall = if components.iter().any(|c| c.status == Status::Unavailable) {
            Status::Unavailable
        } else if components.iter().any(|c| c.status == Status::Degraded) {
            Status::Degraded
        } else {
            Status::Healthy
        };
        Self { overall, components }
    }
}

/// A cheap, backend-specific liveness probe. `deep` gates whether the
/// embedding provider is probed with an actual small text (costs money)
/// versus a metadata-only check.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn probe(&self, deep: bool) -> ComponentHealth;
}

pub async fn run_health_checks(probes: &[Box<dyn HealthProbe>], deep: bool) -> HealthReport {
    let mut components = Vec::with_capacity(probes.len());
    for probe in probes {
        components.push(probe.probe(deep).await);
    }
    HealthReport::from_components(components)
}
