use crate::infra::{load_policy, FixtureProvider, LogPublisher};
use chrono::Utc;
use clap::Args;
use home_triage::config::AppConfig;
use home_triage::error::AppError;
use home_triage::workflows::evaluation::EvaluationEngine;
use home_triage::workflows::listings::ListingImporter;
use home_triage::workflows::pipeline::{
    AnalysisPipeline, BatchSummary, FileEnrichmentStore, FileWorkItemStore, PhaseCoordinator,
    WorkItem, WorkItemStore,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Listing CSV export (street, city, state, zip, price, beds, baths, sqft)
    #[arg(long)]
    pub(crate) listings: PathBuf,
    /// JSON file of canned provider responses, one entry per address
    #[arg(long)]
    pub(crate) enrichment: Option<PathBuf>,
    /// Print the batch summary as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct RestoreArgs {
    /// Backup to restore (defaults to the most recent one)
    #[arg(long)]
    pub(crate) backup: Option<PathBuf>,
    /// Restore the enrichment store instead of the work-item store
    #[arg(long)]
    pub(crate) enrichment: bool,
    /// List available backups without restoring anything
    #[arg(long)]
    pub(crate) list: bool,
}

pub(crate) async fn run_batch(config: &AppConfig, args: RunArgs) -> Result<(), AppError> {
    let RunArgs {
        listings,
        enrichment,
        json,
    } = args;

    let policy = load_policy(config)?;
    let engine = EvaluationEngine::for_current_year(&policy)?;
    let seeds = ListingImporter::from_path(&listings, Utc::now())?;
    let provider = match enrichment {
        Some(path) => FixtureProvider::from_path(&path)?,
        None => FixtureProvider::default(),
    };
    info!(
        environment = ?config.environment,
        listings = seeds.len(),
        fixtures = provider.len(),
        data_dir = %config.store.data_dir.display(),
        "starting batch"
    );

    let coordinator = PhaseCoordinator::new(
        Arc::new(FileWorkItemStore::new(&config.store)),
        Arc::new(FileEnrichmentStore::new(&config.store)),
        Arc::new(provider),
        Arc::new(LogPublisher),
        engine,
        config.pipeline.clone(),
    );
    let summary = AnalysisPipeline::new(coordinator).run(&seeds).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&summary).map_err(io::Error::from)?;
        println!("{rendered}");
    } else {
        render_summary(&summary);
    }
    Ok(())
}

fn render_summary(summary: &BatchSummary) {
    let counts = &summary.counts;
    println!(
        "Processed {} properties ({} newly registered)",
        summary.results.len(),
        summary.registered
    );
    println!(
        "- {} unicorn | {} contender | {} pass | {} failed | {} unknown",
        counts.unicorn, counts.contender, counts.pass, counts.failed, counts.unknown
    );
    if counts.locked > 0 {
        println!("- {} locked by another run", counts.locked);
    }

    let recovery = &summary.recovery;
    if !recovery.resumed.is_empty() || !recovery.exhausted.is_empty() {
        println!(
            "Recovery: {} resumed, {} retrying, {} exhausted",
            recovery.resumed.len(),
            recovery.retrying.len(),
            recovery.exhausted.len()
        );
        for exhausted in &recovery.exhausted {
            println!(
                "  - {} {}: {}",
                exhausted.key, exhausted.phase, exhausted.reason
            );
        }
    }

    println!("Results:");
    for result in &summary.results {
        println!("  - {}", result.summary());
    }
}

pub(crate) fn run_status(config: &AppConfig) -> Result<(), AppError> {
    let store = FileWorkItemStore::new(&config.store);
    let collection = store.load_all()?;

    println!(
        "Work items in {} (session {})",
        store.path().display(),
        collection.session_id
    );
    if collection.items.is_empty() {
        println!("No properties registered yet.");
        return Ok(());
    }
    if let Some(updated_at) = collection.updated_at {
        println!("Last updated {}", updated_at.to_rfc3339());
    }
    let counts = collection.counts;
    println!(
        "Phases: {} pending | {} in progress | {} complete | {} failed | {} skipped",
        counts.pending, counts.in_progress, counts.complete, counts.failed, counts.skipped
    );

    for item in collection.items.values() {
        render_work_item(item);
    }
    Ok(())
}

fn render_work_item(item: &WorkItem) {
    let tier = item
        .evaluation
        .as_ref()
        .map_or("UNKNOWN", |evaluation| evaluation.tier.label());
    println!("- {} [{}] next: {}", item.address, tier, item.current_phase);

    for (phase, record) in &item.phases {
        let mut line = format!("    {phase}: {}", record.status.label());
        if record.retry_count > 0 {
            line.push_str(&format!(" ({} failed attempts)", record.retry_count));
        }
        if let Some(error) = &record.last_error {
            line.push_str(&format!(" last error: {error}"));
        }
        if let Some(reason) = &record.skip_reason {
            line.push_str(&format!(" skipped: {reason}"));
        }
        println!("{line}");
    }
    if let Some(lock) = &item.lock {
        println!(
            "    locked by {} since {}",
            lock.holder,
            lock.acquired_at.to_rfc3339()
        );
    }
}

pub(crate) fn run_restore(config: &AppConfig, args: RestoreArgs) -> Result<(), AppError> {
    let RestoreArgs {
        backup,
        enrichment,
        list,
    } = args;

    if enrichment {
        let store = FileEnrichmentStore::new(&config.store);
        if list {
            print_backups(store.path(), &store.backups()?);
        } else {
            let restored = store.restore_from_backup(backup.as_deref())?;
            println!("Restored {} from {}", store.path().display(), restored.display());
        }
    } else {
        let store = FileWorkItemStore::new(&config.store);
        if list {
            print_backups(store.path(), &store.backups()?);
        } else {
            let restored = store.restore_from_backup(backup.as_deref())?;
            println!("Restored {} from {}", store.path().display(), restored.display());
        }
    }
    Ok(())
}

fn print_backups(store: &Path, backups: &[PathBuf]) {
    println!("{} backups for {}", backups.len(), store.display());
    for backup in backups {
        println!("  - {}", backup.display());
    }
}

pub(crate) fn run_policy(config: &AppConfig) -> Result<(), AppError> {
    let policy = load_policy(config)?;
    let rendered = serde_json::to_string_pretty(&policy).map_err(io::Error::from)?;
    println!("{rendered}");
    Ok(())
}
