use super::coordinator::{CoordinatorError, PhaseCoordinator, PhaseOutcome, RecoveryReport};
use super::phase::Phase;
use super::provider::{EnrichmentProvider, PropertyResult, ReportPublisher};
use super::store::{EnrichmentStore, WorkItemStore};
use crate::workflows::evaluation::domain::AddressKey;
use crate::workflows::evaluation::Tier;
use crate::workflows::listings::ListingSeed;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub unicorn: usize,
    pub contender: usize,
    pub pass: usize,
    pub failed: usize,
    pub unknown: usize,
    pub locked: usize,
}

/// Results of one batch run, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub registered: usize,
    pub results: Vec<PropertyResult>,
    pub counts: TierCounts,
    pub recovery: RecoveryReport,
}

impl BatchSummary {
    fn record(&mut self, result: PropertyResult) {
        match result.tier {
            Some(Tier::Unicorn) => self.counts.unicorn += 1,
            Some(Tier::Contender) => self.counts.contender += 1,
            Some(Tier::Pass) => self.counts.pass += 1,
            Some(Tier::Failed) => self.counts.failed += 1,
            None => self.counts.unknown += 1,
        }
        if result.locked {
            self.counts.locked += 1;
        }
        self.results.push(result);
    }

    pub fn result(&self, key: &AddressKey) -> Option<&PropertyResult> {
        self.results.iter().find(|result| &result.key == key)
    }
}

/// Batch driver: recover, register, then advance each property in turn.
pub struct AnalysisPipeline<W, E, P, R> {
    coordinator: PhaseCoordinator<W, E, P, R>,
}

impl<W, E, P, R> AnalysisPipeline<W, E, P, R>
where
    W: WorkItemStore + 'static,
    E: EnrichmentStore + 'static,
    P: EnrichmentProvider + 'static,
    R: ReportPublisher + 'static,
{
    pub fn new(coordinator: PhaseCoordinator<W, E, P, R>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &PhaseCoordinator<W, E, P, R> {
        &self.coordinator
    }

    /// Phase failures and skips are recorded on the work items and never abort the
    /// batch; only store failures and strict-mode prerequisite errors do.
    pub async fn run(&self, seeds: &[ListingSeed]) -> Result<BatchSummary, CoordinatorError> {
        let recovery = self.coordinator.recover()?;

        let mut registered = 0;
        for seed in seeds {
            if self.coordinator.register(seed)? {
                registered += 1;
            }
        }

        let settled: HashSet<AddressKey> = recovery.completed.iter().cloned().collect();
        let mut summary = BatchSummary {
            registered,
            results: Vec::with_capacity(seeds.len()),
            counts: TierCounts::default(),
            recovery,
        };

        for seed in seeds {
            let key = seed.key();
            let locked = if settled.contains(&key) {
                false
            } else {
                self.drive(&key).await?
            };

            let item = self.coordinator.work_item(&key)?;
            let result = if locked {
                PropertyResult::locked(&item)
            } else {
                PropertyResult::from_work_item(&item)
            };
            info!(address = %key, tier = result.tier_label(), "property processed");
            summary.record(result);
        }

        info!(
            properties = summary.results.len(),
            unicorn = summary.counts.unicorn,
            contender = summary.counts.contender,
            pass = summary.counts.pass,
            failed = summary.counts.failed,
            unknown = summary.counts.unknown,
            "batch complete"
        );
        Ok(summary)
    }

    /// Advance one property until it finishes, skips, or is locked. Returns true when locked.
    async fn drive(&self, key: &AddressKey) -> Result<bool, CoordinatorError> {
        // Each `Advanced` settles its whole group.
        for _ in 0..=Phase::ordered().len() {
            match self.coordinator.advance(key).await? {
                PhaseOutcome::Advanced { .. } => continue,
                PhaseOutcome::Skipped { phase, reason } => {
                    info!(
                        address = %key,
                        phase = %phase,
                        reason = %reason,
                        "phase skipped; moving to next property"
                    );
                    return Ok(false);
                }
                PhaseOutcome::Finished => return Ok(false),
                PhaseOutcome::Locked { holder } => {
                    warn!(address = %key, holder = %holder, "property locked by another run");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
