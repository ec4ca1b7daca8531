use super::kill_switch::Verdict;
use super::policy::{PolicyError, TierPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Unicorn,
    Contender,
    Pass,
    Failed,
}

impl Tier {
    pub const fn ordered() -> [Self; 4] {
        [Self::Unicorn, Self::Contender, Self::Pass, Self::Failed]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Unicorn => "UNICORN",
            Self::Contender => "CONTENDER",
            Self::Pass => "PASS",
            Self::Failed => "FAILED",
        }
    }
}

/// Point boundaries derived from the scorer's maximum total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierThresholds {
    pub unicorn: f64,
    pub contender: f64,
}

#[derive(Debug, Clone)]
pub struct TierClassifier {
    thresholds: TierThresholds,
}

impl TierClassifier {
    pub fn new(max_total: f64, policy: &TierPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            thresholds: TierThresholds {
                unicorn: max_total * policy.unicorn_pct / 100.0,
                contender: max_total * policy.contender_pct / 100.0,
            },
        })
    }

    pub fn thresholds(&self) -> TierThresholds {
        self.thresholds
    }

    /// WARNING verdicts tier exactly like PASS.
    pub fn classify(&self, verdict: Verdict, total: f64) -> Tier {
        if verdict == Verdict::Fail {
            Tier::Failed
        } else if total >= self.thresholds.unicorn {
            Tier::Unicorn
        } else if total >= self.thresholds.contender {
            Tier::Contender
        } else {
            Tier::Pass
        }
    }
}
