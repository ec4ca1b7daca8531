mod analysis;
mod coordinator;
mod phase;
mod provider;
mod retry;
pub mod store;

#[cfg(test)]
mod tests;

pub use analysis::{AnalysisPipeline, BatchSummary, TierCounts};
pub use coordinator::{
    CoordinatorError, ExhaustedPhase, PhaseCoordinator, PhaseFailure, PhaseOutcome,
    RecoveryReport,
};
pub use phase::{LockInfo, Phase, PhaseRecord, PhaseStatus, WorkItem};
pub use provider::{EnrichmentProvider, PropertyResult, ProviderError, ReportPublisher};
pub use retry::backoff_delay;
pub use store::{
    EnrichmentStore, FileEnrichmentStore, FileWorkItemStore, InMemoryEnrichmentStore,
    InMemoryWorkItemStore, LockOutcome, RepositoryError, StatusCounts, WorkItemCollection,
    WorkItemStore,
};
