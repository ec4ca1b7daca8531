use super::phase::{Phase, WorkItem};
use crate::workflows::evaluation::domain::{Address, AddressKey, EnrichmentUpdate, Property};
use crate::workflows::evaluation::{Tier, Verdict};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Worth retrying with backoff (timeouts, rate limits, flaky upstreams).
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("permanent provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Source of enrichment values, one method per data domain.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn county_data(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError>;
    async fn listing(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError>;
    async fn location(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError>;
    async fn imagery(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError>;
}

/// Outbound hook receiving each property's result at the report phase.
#[async_trait]
pub trait ReportPublisher: Send + Sync {
    async fn publish(&self, result: &PropertyResult) -> Result<(), ProviderError>;
}

/// Best-effort outcome for one property, produced whether or not every phase finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyResult {
    pub key: AddressKey,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub failed_criteria: Vec<String>,
    #[serde(default)]
    pub warned_criteria: Vec<String>,
    /// Phases before the report that did not complete.
    #[serde(default)]
    pub missing_phases: Vec<Phase>,
    /// The work item was locked by another holder and was not advanced.
    #[serde(default)]
    pub locked: bool,
}

impl PropertyResult {
    pub fn from_work_item(item: &WorkItem) -> Self {
        let evaluation = item.evaluation.as_ref();
        Self {
            key: item.key.clone(),
            address: item.address.clone(),
            tier: evaluation.map(|evaluation| evaluation.tier),
            verdict: evaluation.map(|evaluation| evaluation.kill_switch.verdict),
            total_score: evaluation
                .and_then(|evaluation| evaluation.score.as_ref())
                .map(|score| score.total),
            failed_criteria: evaluation
                .map(|evaluation| evaluation.kill_switch.hard_failures.clone())
                .unwrap_or_default(),
            warned_criteria: evaluation
                .map(|evaluation| evaluation.kill_switch.soft_failures.clone())
                .unwrap_or_default(),
            missing_phases: item.missing_phases(),
            locked: false,
        }
    }

    pub fn locked(item: &WorkItem) -> Self {
        Self {
            locked: true,
            ..Self::from_work_item(item)
        }
    }

    pub fn tier_label(&self) -> &'static str {
        self.tier.map_or("UNKNOWN", Tier::label)
    }

    pub fn summary(&self) -> String {
        match self.tier {
            Some(Tier::Failed) => {
                let mut criteria = self.failed_criteria.clone();
                criteria.extend(self.warned_criteria.iter().cloned());
                format!("{}: FAILED ({})", self.address, criteria.join(", "))
            }
            Some(tier) => match self.total_score {
                Some(total) => format!("{}: {} ({total:.1} pts)", self.address, tier.label()),
                None => format!("{}: {}", self.address, tier.label()),
            },
            None => {
                let missing: Vec<&str> =
                    self.missing_phases.iter().map(|phase| phase.label()).collect();
                format!("{}: UNKNOWN (missing {})", self.address, missing.join(", "))
            }
        }
    }
}
