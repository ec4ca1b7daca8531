pub mod domain;
mod kill_switch;
pub mod policy;
pub mod scoring;
mod tier;

#[cfg(test)]
mod tests;

pub use domain::{
    Address, AddressKey, EnrichmentRecord, EnrichmentUpdate, FieldValue, FloodZone,
    LaundryLocation, MergeSummary, Orientation, Property, PropertyFields, Provenance, SewerType,
    SolarStatus, Sourced, ValidationError,
};
pub use kill_switch::{
    CriterionDetail, CriterionStatus, KillSwitchEvaluator, KillSwitchResult, Verdict,
};
pub use policy::{
    CriterionClass, CriterionPolicy, CriterionRule, EvaluationPolicy, KillSwitchPolicy,
    PolicyError, TierPolicy,
};
pub use scoring::{PropertyScorer, ScoreBreakdown, ScoreComponent, ScoringError, Section};
pub use tier::{Tier, TierClassifier, TierThresholds};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Construction-time failures. These are fatal: they describe the configuration, not a property.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Stateless evaluator composing kill-switch, scorer, and tier classifier.
#[derive(Debug, Clone)]
pub struct EvaluationEngine {
    kill_switch: KillSwitchEvaluator,
    scorer: PropertyScorer,
    classifier: TierClassifier,
}

impl EvaluationEngine {
    pub fn new(policy: &EvaluationPolicy, reference_year: u16) -> Result<Self, EngineError> {
        policy.validate()?;
        let kill_switch = KillSwitchEvaluator::new(policy.kill_switch.clone(), reference_year)?;
        let scorer = PropertyScorer::standard(reference_year)?;
        let classifier = TierClassifier::new(scorer.max_total(), &policy.tiers)?;

        Ok(Self {
            kill_switch,
            scorer,
            classifier,
        })
    }

    /// Engine anchored to the current calendar year.
    pub fn for_current_year(policy: &EvaluationPolicy) -> Result<Self, EngineError> {
        let year = u16::try_from(Utc::now().year()).unwrap_or(u16::MAX);
        Self::new(policy, year)
    }

    pub fn kill_switch(&self) -> &KillSwitchEvaluator {
        &self.kill_switch
    }

    pub fn scorer(&self) -> &PropertyScorer {
        &self.scorer
    }

    pub fn classifier(&self) -> &TierClassifier {
        &self.classifier
    }

    pub fn evaluate(&self, record: &EnrichmentRecord, evaluated_at: DateTime<Utc>) -> Evaluation {
        let kill_switch = self.kill_switch.evaluate(&record.fields);
        let score = (kill_switch.verdict != Verdict::Fail)
            .then(|| self.scorer.score(&record.fields));
        let total = score.as_ref().map_or(0.0, |breakdown| breakdown.total);
        let tier = self.classifier.classify(kill_switch.verdict, total);

        Evaluation {
            kill_switch,
            score,
            tier,
            evaluated_at,
        }
    }
}

/// Point-in-time evaluation attached to a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub kill_switch: KillSwitchResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreBreakdown>,
    pub tier: Tier,
    pub evaluated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn summary(&self) -> String {
        match &self.score {
            Some(score) => format!(
                "{} ({:.1} pts, kill-switch {})",
                self.tier.label(),
                score.total,
                self.kill_switch.summary()
            ),
            None => format!(
                "{} (kill-switch {})",
                self.tier.label(),
                self.kill_switch.summary()
            ),
        }
    }
}
