use super::domain::{PropertyFields, SewerType, SolarStatus};
use super::policy::{CriterionClass, CriterionRule, KillSwitchPolicy, PolicyError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Warning,
    Fail,
}

impl Verdict {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warning => "WARNING",
            Self::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Passed,
    Failed,
    /// SOFT criterion whose input was missing; counted as passing.
    Unknown,
}

/// Per-criterion audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDetail {
    pub criterion: String,
    pub class: CriterionClass,
    pub status: CriterionStatus,
    pub requirement: String,
    pub observed: Option<String>,
    pub severity_applied: f64,
}

/// Snapshot produced by one kill-switch pass. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchResult {
    pub verdict: Verdict,
    pub severity: f64,
    pub hard_failures: Vec<String>,
    pub soft_failures: Vec<String>,
    pub missing_data: Vec<String>,
    pub details: Vec<CriterionDetail>,
}

impl KillSwitchResult {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.hard_failures.is_empty() {
            parts.push(format!("failed {}", self.hard_failures.join(", ")));
        }
        if !self.soft_failures.is_empty() {
            parts.push(format!(
                "warned {} (severity {:.1})",
                self.soft_failures.join(", "),
                self.severity
            ));
        }
        if parts.is_empty() {
            self.verdict.label().to_string()
        } else {
            format!("{}: {}", self.verdict.label(), parts.join("; "))
        }
    }
}

/// Applies the kill-switch table to merged enrichment values.
#[derive(Debug, Clone)]
pub struct KillSwitchEvaluator {
    policy: KillSwitchPolicy,
    reference_year: u16,
}

struct Observation {
    passed: Option<bool>,
    observed: Option<String>,
}

impl Observation {
    fn missing() -> Self {
        Self {
            passed: None,
            observed: None,
        }
    }

    fn of(passed: bool, observed: String) -> Self {
        Self {
            passed: Some(passed),
            observed: Some(observed),
        }
    }
}

impl KillSwitchEvaluator {
    /// `reference_year` anchors the new-build rule so repeated passes agree.
    pub fn new(policy: KillSwitchPolicy, reference_year: u16) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            policy,
            reference_year,
        })
    }

    pub fn policy(&self) -> &KillSwitchPolicy {
        &self.policy
    }

    pub fn evaluate(&self, fields: &PropertyFields) -> KillSwitchResult {
        let mut severity = 0.0;
        let mut hard_failures = Vec::new();
        let mut soft_failures = Vec::new();
        let mut missing_data = Vec::new();
        let mut details = Vec::with_capacity(self.policy.criteria.len());

        for criterion in &self.policy.criteria {
            let name = criterion.rule.name();
            let observation = self.observe(&criterion.rule, fields);
            if observation.passed.is_none() {
                missing_data.push(name.to_string());
            }

            let (status, severity_applied) = match (criterion.class, observation.passed) {
                (_, Some(true)) => (CriterionStatus::Passed, 0.0),
                // HARD criteria fail closed when the input is missing.
                (CriterionClass::Hard, _) => {
                    hard_failures.push(name.to_string());
                    (CriterionStatus::Failed, 0.0)
                }
                (CriterionClass::Soft { severity: weight }, Some(false)) => {
                    soft_failures.push(name.to_string());
                    severity += weight;
                    (CriterionStatus::Failed, weight)
                }
                (CriterionClass::Soft { .. }, None) => (CriterionStatus::Unknown, 0.0),
            };

            details.push(CriterionDetail {
                criterion: name.to_string(),
                class: criterion.class,
                status,
                requirement: criterion.rule.requirement(),
                observed: observation.observed,
                severity_applied,
            });
        }

        let verdict = if !hard_failures.is_empty() || severity >= self.policy.fail_threshold {
            Verdict::Fail
        } else if severity >= self.policy.warning_threshold {
            Verdict::Warning
        } else {
            Verdict::Pass
        };

        KillSwitchResult {
            verdict,
            severity,
            hard_failures,
            soft_failures,
            missing_data,
            details,
        }
    }

    fn observe(&self, rule: &CriterionRule, fields: &PropertyFields) -> Observation {
        match *rule {
            CriterionRule::NoHoa => fields.hoa_fee().map_or_else(Observation::missing, |fee| {
                Observation::of(fee == 0.0, format!("${fee:.0}/month"))
            }),
            CriterionRule::MinBedrooms { min } => fields
                .bedrooms()
                .map_or_else(Observation::missing, |beds| {
                    Observation::of(beds >= min, format!("{beds} bedrooms"))
                }),
            CriterionRule::MinBathrooms { min } => fields
                .bathrooms()
                .map_or_else(Observation::missing, |baths| {
                    Observation::of(baths >= min, format!("{baths} bathrooms"))
                }),
            CriterionRule::CitySewer => fields.sewer().map_or_else(Observation::missing, |sewer| {
                Observation::of(sewer == SewerType::City, format!("{sewer:?}").to_lowercase())
            }),
            CriterionRule::NoNewBuild => fields
                .year_built()
                .map_or_else(Observation::missing, |year| {
                    Observation::of(year < self.reference_year, format!("built {year}"))
                }),
            CriterionRule::MinGarage { min } => fields
                .garage_spaces()
                .map_or_else(Observation::missing, |spaces| {
                    Observation::of(spaces >= min, format!("{spaces} garage spaces"))
                }),
            CriterionRule::LotSize { min, max } => fields
                .lot_area_sqft()
                .map_or_else(Observation::missing, |lot| {
                    Observation::of((min..=max).contains(&lot), format!("{lot} sqft lot"))
                }),
            CriterionRule::MinLivingArea { min } => fields
                .living_area_sqft()
                .map_or_else(Observation::missing, |area| {
                    Observation::of(area >= min, format!("{area} sqft"))
                }),
            CriterionRule::NoSolarLease => {
                fields.solar().map_or_else(Observation::missing, |solar| {
                    Observation::of(
                        solar != SolarStatus::Leased,
                        format!("{solar:?} solar").to_lowercase(),
                    )
                })
            }
        }
    }
}
