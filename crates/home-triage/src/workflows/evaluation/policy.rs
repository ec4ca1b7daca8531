use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const POLICY_VERSION: u32 = 1;

pub const DEFAULT_FAIL_THRESHOLD: f64 = 3.0;
pub const DEFAULT_WARNING_THRESHOLD: f64 = 1.5;
pub const DEFAULT_UNICORN_PCT: f64 = 80.0;
pub const DEFAULT_CONTENDER_PCT: f64 = 60.0;

/// Versioned evaluation policy: kill-switch table and tier boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPolicy {
    pub version: u32,
    pub kill_switch: KillSwitchPolicy,
    pub tiers: TierPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchPolicy {
    pub fail_threshold: f64,
    pub warning_threshold: f64,
    pub criteria: Vec<CriterionPolicy>,
}

/// One row of the kill-switch table. Whether a rule is HARD or SOFT is policy, not code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionPolicy {
    pub rule: CriterionRule,
    pub class: CriterionClass,
}

impl CriterionPolicy {
    pub fn hard(rule: CriterionRule) -> Self {
        Self {
            rule,
            class: CriterionClass::Hard,
        }
    }

    pub fn soft(rule: CriterionRule, severity: f64) -> Self {
        Self {
            rule,
            class: CriterionClass::Soft { severity },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionClass {
    Hard,
    Soft { severity: f64 },
}

impl CriterionClass {
    pub const fn is_hard(&self) -> bool {
        matches!(self, CriterionClass::Hard)
    }
}

/// Disqualification predicates over a single enrichment field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum CriterionRule {
    NoHoa,
    MinBedrooms { min: u8 },
    MinBathrooms { min: f64 },
    CitySewer,
    NoNewBuild,
    MinGarage { min: u8 },
    LotSize { min: u32, max: u32 },
    MinLivingArea { min: u32 },
    NoSolarLease,
}

impl CriterionRule {
    pub const fn name(&self) -> &'static str {
        match self {
            CriterionRule::NoHoa => "no_hoa",
            CriterionRule::MinBedrooms { .. } => "min_bedrooms",
            CriterionRule::MinBathrooms { .. } => "min_bathrooms",
            CriterionRule::CitySewer => "city_sewer",
            CriterionRule::NoNewBuild => "no_new_build",
            CriterionRule::MinGarage { .. } => "min_garage",
            CriterionRule::LotSize { .. } => "lot_size",
            CriterionRule::MinLivingArea { .. } => "min_living_area",
            CriterionRule::NoSolarLease => "no_solar_lease",
        }
    }

    pub fn requirement(&self) -> String {
        match self {
            CriterionRule::NoHoa => "no HOA fee".to_string(),
            CriterionRule::MinBedrooms { min } => format!("at least {min} bedrooms"),
            CriterionRule::MinBathrooms { min } => format!("at least {min} bathrooms"),
            CriterionRule::CitySewer => "city sewer".to_string(),
            CriterionRule::NoNewBuild => "built before the current year".to_string(),
            CriterionRule::MinGarage { min } => format!("at least {min} garage spaces"),
            CriterionRule::LotSize { min, max } => format!("lot between {min} and {max} sqft"),
            CriterionRule::MinLivingArea { min } => format!("at least {min} sqft living area"),
            CriterionRule::NoSolarLease => "no leased solar".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Percent of the scorer's maximum total.
    pub unicorn_pct: f64,
    pub contender_pct: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("unsupported policy version {found} (expected {})", POLICY_VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("criterion {criterion} has invalid severity {severity}")]
    InvalidSeverity {
        criterion: &'static str,
        severity: f64,
    },
    #[error("criterion {0} listed more than once")]
    DuplicateCriterion(&'static str),
    #[error("criterion {0} has an empty or inverted range")]
    InvalidRange(&'static str),
    #[error("kill-switch thresholds invalid (warning {warning}, fail {fail})")]
    InvalidThresholds { warning: f64, fail: f64 },
    #[error("tier percentages invalid (unicorn {unicorn}%, contender {contender}%)")]
    InvalidTierPercentages { unicorn: f64, contender: f64 },
    #[error("unable to read policy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to parse policy: {0}")]
    Parse(#[from] serde_json::Error),
}

impl EvaluationPolicy {
    /// Policy table used when no override file is configured.
    pub fn standard() -> Self {
        Self {
            version: POLICY_VERSION,
            kill_switch: KillSwitchPolicy::standard(),
            tiers: TierPolicy {
                unicorn_pct: DEFAULT_UNICORN_PCT,
                contender_pct: DEFAULT_CONTENDER_PCT,
            },
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PolicyError> {
        let policy: Self = serde_json::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version != POLICY_VERSION {
            return Err(PolicyError::UnsupportedVersion {
                found: self.version,
            });
        }
        self.kill_switch.validate()?;
        self.tiers.validate()
    }
}

impl KillSwitchPolicy {
    pub fn standard() -> Self {
        Self {
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            criteria: vec![
                CriterionPolicy::hard(CriterionRule::NoHoa),
                CriterionPolicy::hard(CriterionRule::MinBedrooms { min: 4 }),
                CriterionPolicy::hard(CriterionRule::MinBathrooms { min: 2.0 }),
                CriterionPolicy::soft(CriterionRule::CitySewer, 2.5),
                CriterionPolicy::soft(CriterionRule::NoNewBuild, 2.0),
                CriterionPolicy::soft(CriterionRule::MinGarage { min: 2 }, 1.5),
                CriterionPolicy::soft(
                    CriterionRule::LotSize {
                        min: 7_000,
                        max: 15_000,
                    },
                    1.0,
                ),
                CriterionPolicy::soft(CriterionRule::MinLivingArea { min: 1_800 }, 1.0),
                CriterionPolicy::soft(CriterionRule::NoSolarLease, 1.0),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let thresholds_ok = self.warning_threshold.is_finite()
            && self.fail_threshold.is_finite()
            && self.warning_threshold > 0.0
            && self.warning_threshold <= self.fail_threshold;
        if !thresholds_ok {
            return Err(PolicyError::InvalidThresholds {
                warning: self.warning_threshold,
                fail: self.fail_threshold,
            });
        }

        let mut seen = HashSet::new();
        for criterion in &self.criteria {
            let name = criterion.rule.name();
            if !seen.insert(name) {
                return Err(PolicyError::DuplicateCriterion(name));
            }

            if let CriterionClass::Soft { severity } = criterion.class {
                if !severity.is_finite() || severity < 0.0 {
                    return Err(PolicyError::InvalidSeverity {
                        criterion: name,
                        severity,
                    });
                }
            }

            match criterion.rule {
                CriterionRule::LotSize { min, max } if min > max => {
                    return Err(PolicyError::InvalidRange(name));
                }
                CriterionRule::MinBathrooms { min } if !min.is_finite() || min < 0.0 => {
                    return Err(PolicyError::InvalidRange(name));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl TierPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        let valid = self.contender_pct.is_finite()
            && self.unicorn_pct.is_finite()
            && self.contender_pct > 0.0
            && self.contender_pct < self.unicorn_pct
            && self.unicorn_pct <= 100.0;
        if valid {
            Ok(())
        } else {
            Err(PolicyError::InvalidTierPercentages {
                unicorn: self.unicorn_pct,
                contender: self.contender_pct,
            })
        }
    }
}
