use crate::workflows::evaluation::domain::{Address, AddressKey};
use crate::workflows::evaluation::Evaluation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CountyData,
    Listing,
    Map,
    Images,
    Synthesis,
    Report,
}

impl Phase {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::CountyData,
            Self::Listing,
            Self::Map,
            Self::Images,
            Self::Synthesis,
            Self::Report,
        ]
    }

    /// Phases sharing an ordinal run together.
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::CountyData => 0,
            Self::Listing | Self::Map => 1,
            Self::Images => 2,
            Self::Synthesis => 3,
            Self::Report => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::CountyData => "county_data",
            Self::Listing => "listing",
            Self::Map => "map",
            Self::Images => "images",
            Self::Synthesis => "synthesis",
            Self::Report => "report",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Report)
    }

    pub fn group(ordinal: u8) -> Vec<Self> {
        Self::ordered()
            .into_iter()
            .filter(|phase| phase.ordinal() == ordinal)
            .collect()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Complete or skipped; later phases may treat the phase as done.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Complete | Self::Skipped)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub status: PhaseStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// No further attempts will be made without a manual reset.
    #[serde(default)]
    pub permanent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseRecord {
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.status == PhaseStatus::Failed && (self.permanent || self.retry_count >= max_retries)
    }

    /// Settled or exhausted: nothing more will happen to this phase in a run.
    pub fn is_done(&self, max_retries: u32) -> bool {
        self.status.is_settled() || self.is_exhausted(max_retries)
    }

    /// Settled, or failed with no attempts left. Synthesis can proceed past a closed sibling.
    pub fn is_closed(&self) -> bool {
        self.status.is_settled() || (self.status == PhaseStatus::Failed && self.permanent)
    }

    /// Attempts left before the phase is exhausted.
    pub fn remaining_attempts(&self, max_retries: u32) -> u32 {
        if self.permanent {
            0
        } else {
            max_retries.saturating_sub(self.retry_count)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: std::time::Duration) -> bool {
        now.signed_duration_since(self.acquired_at)
            .to_std()
            .is_ok_and(|age| age >= stale_after)
    }
}

/// Durable progress of one property through the phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: AddressKey,
    pub address: Address,
    pub current_phase: Phase,
    pub phases: BTreeMap<Phase, PhaseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockInfo>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

impl WorkItem {
    pub fn new(address: Address, now: DateTime<Utc>) -> Self {
        Self {
            key: address.key(),
            address,
            current_phase: Phase::CountyData,
            phases: Phase::ordered()
                .into_iter()
                .map(|phase| (phase, PhaseRecord::default()))
                .collect(),
            lock: None,
            updated_at: now,
            evaluation: None,
        }
    }

    pub fn record(&self, phase: Phase) -> PhaseRecord {
        self.phases.get(&phase).cloned().unwrap_or_default()
    }

    pub fn status(&self, phase: Phase) -> PhaseStatus {
        self.phases
            .get(&phase)
            .map_or(PhaseStatus::Pending, |record| record.status)
    }

    pub fn record_mut(&mut self, phase: Phase) -> &mut PhaseRecord {
        self.phases.entry(phase).or_default()
    }

    pub fn is_settled(&self) -> bool {
        Phase::ordered()
            .into_iter()
            .all(|phase| self.status(phase).is_settled())
    }

    /// Lowest ordinal group that still has work, or `None` once every phase is done.
    pub fn next_group(&self, max_retries: u32) -> Option<Vec<Phase>> {
        (0..=Phase::Report.ordinal()).find_map(|ordinal| {
            let open: Vec<Phase> = Phase::group(ordinal)
                .into_iter()
                .filter(|phase| !self.record(*phase).is_done(max_retries))
                .collect();
            (!open.is_empty()).then_some(open)
        })
    }

    /// First unmet requirement for entering `phase`, phrased as the skip reason.
    pub fn unmet_prerequisite(&self, phase: Phase) -> Option<String> {
        let complete = |phase: Phase| self.status(phase) == PhaseStatus::Complete;
        let settled = |phase: Phase| self.status(phase).is_settled();
        let closed = |phase: Phase| self.record(phase).is_closed();

        match phase {
            Phase::CountyData => None,
            Phase::Listing | Phase::Map => {
                (!settled(Phase::CountyData)).then(|| "county data not completed".to_string())
            }
            Phase::Images => {
                (!complete(Phase::Listing)).then(|| "no listing data completed".to_string())
            }
            Phase::Synthesis => {
                if !complete(Phase::Listing) && !complete(Phase::Map) {
                    return Some("no Phase 1 completed".to_string());
                }
                [Phase::Listing, Phase::Map, Phase::Images]
                    .into_iter()
                    .find(|phase| !closed(*phase))
                    .map(|phase| format!("{phase} still open"))
            }
            Phase::Report => {
                (!complete(Phase::Synthesis)).then(|| "synthesis not completed".to_string())
            }
        }
    }

    pub fn start(&mut self, phase: Phase, now: DateTime<Utc>) {
        let record = self.record_mut(phase);
        record.status = PhaseStatus::InProgress;
        record.started_at = Some(now);
        record.skip_reason = None;
        self.updated_at = now;
    }

    pub fn complete(&mut self, phase: Phase, failed_attempts: u32, now: DateTime<Utc>) {
        let record = self.record_mut(phase);
        record.status = PhaseStatus::Complete;
        record.retry_count += failed_attempts;
        record.last_error = None;
        record.permanent = false;
        record.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn fail(
        &mut self,
        phase: Phase,
        failed_attempts: u32,
        error: impl Into<String>,
        permanent: bool,
        max_retries: u32,
        now: DateTime<Utc>,
    ) {
        let record = self.record_mut(phase);
        record.status = PhaseStatus::Failed;
        record.retry_count += failed_attempts;
        record.last_error = Some(error.into());
        record.permanent = permanent || record.retry_count >= max_retries;
        self.updated_at = now;
    }

    pub fn skip(&mut self, phase: Phase, reason: impl Into<String>, now: DateTime<Utc>) {
        let record = self.record_mut(phase);
        record.status = PhaseStatus::Skipped;
        record.skip_reason = Some(reason.into());
        record.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Return `phase` and everything after it to pending.
    pub fn reset_from(&mut self, phase: Phase, now: DateTime<Utc>) {
        for later in Phase::ordered() {
            if later.ordinal() >= phase.ordinal() {
                self.phases.insert(later, PhaseRecord::default());
            }
        }
        if phase.ordinal() <= Phase::Synthesis.ordinal() {
            self.evaluation = None;
        }
        self.updated_at = now;
    }

    pub fn refresh_current_phase(&mut self, max_retries: u32) {
        self.current_phase = self
            .next_group(max_retries)
            .and_then(|group| group.first().copied())
            .unwrap_or(Phase::Report);
    }

    /// Phases up to synthesis that have not completed.
    pub fn missing_phases(&self) -> Vec<Phase> {
        Phase::ordered()
            .into_iter()
            .filter(|phase| !phase.is_terminal() && self.status(*phase) != PhaseStatus::Complete)
            .collect()
    }
}
