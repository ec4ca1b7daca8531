use super::phase::{Phase, PhaseStatus, WorkItem};
use super::provider::{EnrichmentProvider, PropertyResult, ProviderError, ReportPublisher};
use super::retry::backoff_delay;
use super::store::{EnrichmentStore, LockOutcome, RepositoryError, WorkItemStore};
use crate::config::PipelineConfig;
use crate::workflows::evaluation::domain::{
    AddressKey, EnrichmentRecord, EnrichmentUpdate, Property, ValidationError,
};
use crate::workflows::evaluation::{Evaluation, EvaluationEngine};
use crate::workflows::listings::ListingSeed;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const INTERRUPTED: &str = "interrupted";

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("cannot enter {phase} for {key}: {reason}")]
    Prerequisite {
        key: AddressKey,
        phase: Phase,
        reason: String,
    },
    #[error("invalid enrichment for {key}: {source}")]
    Validation {
        key: AddressKey,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub error: String,
    /// Failed attempts recorded for the phase so far.
    pub attempts: u32,
    pub permanent: bool,
}

/// What one `advance` call did to a work item.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    /// An ordinal group ran; each of its phases is now complete or failed.
    Advanced {
        completed: Vec<Phase>,
        failed: Vec<PhaseFailure>,
    },
    /// Prerequisites were unmet and the group was skipped. Move on to the next property.
    Skipped { phase: Phase, reason: String },
    /// Nothing left to run.
    Finished,
    /// Another live holder owns the work item.
    Locked { holder: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustedPhase {
    pub key: AddressKey,
    pub phase: Phase,
    pub reason: String,
}

/// What `recover` found in the persisted work items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryReport {
    /// Phases interrupted mid-run, now queued for another attempt.
    pub resumed: Vec<(AddressKey, Phase)>,
    /// Failed phases still under the retry cap.
    pub retrying: Vec<(AddressKey, Phase)>,
    /// Work items with every phase complete or skipped; excluded from the run queue.
    pub completed: Vec<AddressKey>,
    pub exhausted: Vec<ExhaustedPhase>,
    pub locked: Vec<AddressKey>,
}

enum PhaseWork {
    Enriched(EnrichmentUpdate),
    Evaluated(Evaluation),
    Published,
}

struct PhaseRun {
    phase: Phase,
    result: Result<PhaseWork, ProviderError>,
    failed_attempts: u32,
}

/// Sole writer of work items: sequences phases, checks prerequisites, retries, and recovers.
pub struct PhaseCoordinator<W, E, P, R> {
    work_items: Arc<W>,
    enrichment: Arc<E>,
    provider: Arc<P>,
    publisher: Arc<R>,
    engine: Arc<EvaluationEngine>,
    config: PipelineConfig,
    holder: String,
}

impl<W, E, P, R> PhaseCoordinator<W, E, P, R>
where
    W: WorkItemStore + 'static,
    E: EnrichmentStore + 'static,
    P: EnrichmentProvider + 'static,
    R: ReportPublisher + 'static,
{
    pub fn new(
        work_items: Arc<W>,
        enrichment: Arc<E>,
        provider: Arc<P>,
        publisher: Arc<R>,
        engine: EvaluationEngine,
        config: PipelineConfig,
    ) -> Self {
        Self {
            work_items,
            enrichment,
            provider,
            publisher,
            engine: Arc::new(engine),
            config,
            holder: format!("coordinator-{}", Uuid::new_v4()),
        }
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn engine(&self) -> &EvaluationEngine {
        &self.engine
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn work_item(&self, key: &AddressKey) -> Result<WorkItem, CoordinatorError> {
        Ok(self
            .work_items
            .fetch(key)?
            .ok_or_else(|| RepositoryError::NotFound(key.clone()))?)
    }

    /// Create the work item if it is new and merge the listing's own values into
    /// the enrichment record. Returns true when the work item was created.
    pub fn register(&self, seed: &ListingSeed) -> Result<bool, CoordinatorError> {
        let key = seed.key();
        let created = match self.work_items.fetch(&key)? {
            Some(_) => false,
            None => {
                self.work_items
                    .save(&WorkItem::new(seed.property.address.clone(), Utc::now()))?;
                debug!(address = %key, "registered work item");
                true
            }
        };

        if let Some(holder) = self.lock(&key)? {
            warn!(address = %key, holder = %holder, "work item locked; listing values not merged");
            return Ok(created);
        }
        let result = self.seed_locked(&key, seed);
        self.unlock(&key);
        result.map(|()| created)
    }

    /// Run the next runnable ordinal group for one property.
    pub async fn advance(&self, key: &AddressKey) -> Result<PhaseOutcome, CoordinatorError> {
        if let Some(holder) = self.lock(key)? {
            info!(address = %key, holder = %holder, "work item locked elsewhere; skipping");
            return Ok(PhaseOutcome::Locked { holder });
        }
        let result = self.advance_locked(key).await;
        self.unlock(key);
        match result {
            Err(err) => match lost_lock(err) {
                Ok(holder) => {
                    warn!(address = %key, holder = %holder, "lock taken over mid-phase; skipping");
                    Ok(PhaseOutcome::Locked { holder })
                }
                Err(err) => Err(err),
            },
            outcome => outcome,
        }
    }

    /// Reconcile persisted state after a crash. Interrupted phases count as a failed
    /// attempt and are retried while under the cap.
    pub fn recover(&self) -> Result<RecoveryReport, CoordinatorError> {
        let now = Utc::now();
        let mut report = RecoveryReport::default();
        let collection = self.work_items.load_all()?;

        for key in collection.items.keys() {
            if let Some(holder) = self.lock(key)? {
                debug!(address = %key, holder = %holder, "work item locked; not recovered");
                report.locked.push(key.clone());
                continue;
            }
            let result = self.recover_locked(key, now, &mut report);
            self.unlock(key);
            if let Err(err) = result {
                let holder = lost_lock(err)?;
                debug!(address = %key, holder = %holder, "lock taken over during recovery");
                report.locked.push(key.clone());
            }
        }

        for exhausted in &report.exhausted {
            warn!(
                address = %exhausted.key,
                phase = %exhausted.phase,
                reason = %exhausted.reason,
                "phase permanently failed"
            );
        }
        info!(
            resumed = report.resumed.len(),
            retrying = report.retrying.len(),
            completed = report.completed.len(),
            exhausted = report.exhausted.len(),
            locked = report.locked.len(),
            "recovery complete"
        );
        Ok(report)
    }

    /// Return `phase` and every later phase to pending with retry counts cleared.
    pub fn reset_phase(
        &self,
        key: &AddressKey,
        phase: Phase,
    ) -> Result<WorkItem, CoordinatorError> {
        if let Some(holder) = self.lock(key)? {
            return Err(RepositoryError::LockHeld {
                key: key.clone(),
                holder,
            }
            .into());
        }
        let result = self.reset_locked(key, phase);
        self.unlock(key);
        result
    }

    fn lock(&self, key: &AddressKey) -> Result<Option<String>, CoordinatorError> {
        match self.work_items.acquire_lock(key, &self.holder, Utc::now())? {
            LockOutcome::Held { holder, .. } => Ok(Some(holder)),
            LockOutcome::Reclaimed { previous_holder } => {
                warn!(address = %key, previous_holder = %previous_holder, "took over stale lock");
                Ok(None)
            }
            LockOutcome::Acquired | LockOutcome::Reentered => Ok(None),
        }
    }

    fn unlock(&self, key: &AddressKey) {
        if let Err(err) = self.work_items.release_lock(key, &self.holder) {
            warn!(address = %key, error = %err, "failed to release work item lock");
        }
    }

    fn seed_locked(&self, key: &AddressKey, seed: &ListingSeed) -> Result<(), CoordinatorError> {
        let existing = self.enrichment.fetch(key)?;
        let is_new = existing.is_none();
        let mut record =
            existing.unwrap_or_else(|| EnrichmentRecord::new(seed.property.address.clone()));

        let summary = record
            .apply(&seed.update)
            .map_err(|source| CoordinatorError::Validation {
                key: key.clone(),
                source,
            })?;
        if is_new || summary.changed() {
            self.enrichment.save(&record)?;
        }
        Ok(())
    }

    async fn advance_locked(&self, key: &AddressKey) -> Result<PhaseOutcome, CoordinatorError> {
        let max_retries = self.config.retry.max_retries;
        let mut item = self.work_item(key)?;
        let Some(group) = item.next_group(max_retries) else {
            return Ok(PhaseOutcome::Finished);
        };

        let now = Utc::now();
        let mut runnable = Vec::with_capacity(group.len());
        let mut first_skip = None;
        for phase in group {
            match item.unmet_prerequisite(phase) {
                None => runnable.push(phase),
                Some(reason) if self.config.strict_prerequisites => {
                    return Err(CoordinatorError::Prerequisite {
                        key: key.clone(),
                        phase,
                        reason,
                    });
                }
                Some(reason) => {
                    info!(
                        address = %key,
                        phase = %phase,
                        reason = %reason,
                        "prerequisites unmet; skipping phase"
                    );
                    item.skip(phase, reason.clone(), now);
                    first_skip.get_or_insert((phase, reason));
                }
            }
        }

        if runnable.is_empty() {
            item.refresh_current_phase(max_retries);
            self.work_items.save(&item)?;
            return Ok(match first_skip {
                Some((phase, reason)) => PhaseOutcome::Skipped { phase, reason },
                None => PhaseOutcome::Finished,
            });
        }

        for phase in &runnable {
            item.start(*phase, now);
        }
        item.current_phase = runnable[0];
        self.work_items.save(&item)?;

        let mut record = self
            .enrichment
            .fetch(key)?
            .unwrap_or_else(|| EnrichmentRecord::new(item.address.clone()));
        let runs = self.execute_group(&runnable, &item, &record).await;

        let now = Utc::now();
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut record_changed = false;
        for run in runs {
            let phase = run.phase;
            match run.result {
                Ok(PhaseWork::Enriched(update)) => match record.apply(&update) {
                    Ok(summary) => {
                        debug!(
                            address = %key,
                            phase = %phase,
                            source = %update.source,
                            set = summary.set,
                            overwritten = summary.overwritten,
                            kept = summary.kept,
                            "merged enrichment"
                        );
                        record_changed |= summary.changed();
                        item.complete(phase, run.failed_attempts, now);
                        completed.push(phase);
                    }
                    Err(err) => {
                        let error = format!("invalid values from {}: {err}", update.source);
                        item.fail(phase, run.failed_attempts + 1, error, true, max_retries, now);
                        failed.push(failure(&item, phase));
                    }
                },
                Ok(PhaseWork::Evaluated(evaluation)) => {
                    info!(address = %key, result = %evaluation.summary(), "evaluated property");
                    item.evaluation = Some(evaluation);
                    item.complete(phase, run.failed_attempts, now);
                    completed.push(phase);
                }
                Ok(PhaseWork::Published) => {
                    item.complete(phase, run.failed_attempts, now);
                    completed.push(phase);
                }
                Err(err) => {
                    let permanent = !err.is_transient();
                    let error = err.to_string();
                    item.fail(phase, run.failed_attempts, error, permanent, max_retries, now);
                    failed.push(failure(&item, phase));
                }
            }
        }

        for failure in &failed {
            warn!(
                address = %key,
                phase = %failure.phase,
                attempts = failure.attempts,
                error = %failure.error,
                "phase failed"
            );
        }

        if record_changed {
            self.enrichment.save(&record)?;
        }
        item.refresh_current_phase(max_retries);
        self.work_items.save(&item)?;

        Ok(PhaseOutcome::Advanced { completed, failed })
    }

    async fn execute_group(
        &self,
        phases: &[Phase],
        item: &WorkItem,
        record: &EnrichmentRecord,
    ) -> Vec<PhaseRun> {
        match phases {
            [first, second] => {
                let (first, second) = tokio::join!(
                    self.execute(*first, item, record),
                    self.execute(*second, item, record)
                );
                vec![first, second]
            }
            _ => {
                let mut runs = Vec::with_capacity(phases.len());
                for phase in phases {
                    runs.push(self.execute(*phase, item, record).await);
                }
                runs
            }
        }
    }

    /// Call the collaborator for `phase`, retrying transient failures with backoff
    /// until the phase's remaining attempts run out.
    async fn execute(&self, phase: Phase, item: &WorkItem, record: &EnrichmentRecord) -> PhaseRun {
        let retry = &self.config.retry;
        let prior_failures = item.record(phase).retry_count;
        let budget = item.record(phase).remaining_attempts(retry.max_retries).max(1);
        let mut failed_attempts = 0;

        loop {
            match self.call(phase, item, record).await {
                Ok(work) => {
                    return PhaseRun {
                        phase,
                        result: Ok(work),
                        failed_attempts,
                    }
                }
                Err(err) => {
                    failed_attempts += 1;
                    if !err.is_transient() || failed_attempts >= budget {
                        return PhaseRun {
                            phase,
                            result: Err(err),
                            failed_attempts,
                        };
                    }

                    let delay = backoff_delay(retry, prior_failures + failed_attempts);
                    warn!(
                        address = %item.key,
                        phase = %phase,
                        attempt = prior_failures + failed_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn call(
        &self,
        phase: Phase,
        item: &WorkItem,
        record: &EnrichmentRecord,
    ) -> Result<PhaseWork, ProviderError> {
        let property = Property::new(item.address.clone());
        match phase {
            Phase::CountyData => self
                .provider
                .county_data(&property)
                .await
                .map(PhaseWork::Enriched),
            Phase::Listing => self
                .provider
                .listing(&property)
                .await
                .map(PhaseWork::Enriched),
            Phase::Map => self
                .provider
                .location(&property)
                .await
                .map(PhaseWork::Enriched),
            Phase::Images => self
                .provider
                .imagery(&property)
                .await
                .map(PhaseWork::Enriched),
            Phase::Synthesis => Ok(PhaseWork::Evaluated(
                self.engine.evaluate(record, Utc::now()),
            )),
            Phase::Report => {
                let result = PropertyResult::from_work_item(item);
                self.publisher
                    .publish(&result)
                    .await
                    .map(|()| PhaseWork::Published)
            }
        }
    }

    fn recover_locked(
        &self,
        key: &AddressKey,
        now: DateTime<Utc>,
        report: &mut RecoveryReport,
    ) -> Result<(), CoordinatorError> {
        let max_retries = self.config.retry.max_retries;
        let Some(mut item) = self.work_items.fetch(key)? else {
            return Ok(());
        };
        if item.is_settled() {
            report.completed.push(key.clone());
            return Ok(());
        }

        let mut changed = false;
        for phase in Phase::ordered() {
            let record = item.record(phase);
            match record.status {
                PhaseStatus::InProgress => {
                    item.fail(phase, 1, INTERRUPTED, false, max_retries, now);
                    changed = true;
                    let record = item.record(phase);
                    if record.is_exhausted(max_retries) {
                        report.exhausted.push(ExhaustedPhase {
                            key: key.clone(),
                            phase,
                            reason: format!("interrupted after {} attempts", record.retry_count),
                        });
                    } else {
                        info!(
                            address = %key,
                            phase = %phase,
                            attempts = record.retry_count,
                            "resuming interrupted phase"
                        );
                        report.resumed.push((key.clone(), phase));
                    }
                }
                PhaseStatus::Failed if record.is_exhausted(max_retries) => {
                    if !record.permanent {
                        item.record_mut(phase).permanent = true;
                        changed = true;
                    }
                    report.exhausted.push(ExhaustedPhase {
                        key: key.clone(),
                        phase,
                        reason: record
                            .last_error
                            .unwrap_or_else(|| "retry limit reached".to_string()),
                    });
                }
                PhaseStatus::Failed => report.retrying.push((key.clone(), phase)),
                PhaseStatus::Pending | PhaseStatus::Complete | PhaseStatus::Skipped => {}
            }
        }

        if changed {
            item.refresh_current_phase(max_retries);
            self.work_items.save(&item)?;
        }
        Ok(())
    }

    fn reset_locked(&self, key: &AddressKey, phase: Phase) -> Result<WorkItem, CoordinatorError> {
        let mut item = self.work_item(key)?;
        item.reset_from(phase, Utc::now());
        item.refresh_current_phase(self.config.retry.max_retries);
        self.work_items.save(&item)?;
        info!(address = %key, phase = %phase, "reset phase and its successors to pending");
        Ok(item)
    }
}

/// The new holder when another run reclaimed the lock before our save; any other error as is.
fn lost_lock(err: CoordinatorError) -> Result<String, CoordinatorError> {
    match err {
        CoordinatorError::Repository(RepositoryError::LockHeld { holder, .. }) => Ok(holder),
        other => Err(other),
    }
}

fn failure(item: &WorkItem, phase: Phase) -> PhaseFailure {
    let record = item.record(phase);
    PhaseFailure {
        phase,
        error: record.last_error.unwrap_or_default(),
        attempts: record.retry_count,
        permanent: record.permanent,
    }
}
