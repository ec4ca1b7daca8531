use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::config::{PipelineConfig, RetryConfig};
use crate::workflows::evaluation::domain::{
    Address, AddressKey, EnrichmentUpdate, FieldValue, FloodZone, LaundryLocation, Orientation,
    Property, SewerType, SolarStatus,
};
use crate::workflows::evaluation::{EvaluationEngine, EvaluationPolicy};
use crate::workflows::listings::{ListingSeed, LISTING_CONFIDENCE, LISTING_SOURCE};
use crate::workflows::pipeline::{
    EnrichmentProvider, InMemoryEnrichmentStore, InMemoryWorkItemStore, Phase, PhaseCoordinator,
    PropertyResult, ProviderError, ReportPublisher, WorkItem, WorkItemStore,
};

pub(super) const MAX_RETRIES: u32 = 3;

pub(super) type TestCoordinator = PhaseCoordinator<
    InMemoryWorkItemStore,
    InMemoryEnrichmentStore,
    ScriptedProvider,
    RecordingPublisher,
>;

pub(super) fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0)
        .single()
        .expect("valid timestamp")
}

type CallHook = Box<dyn Fn(Phase, &AddressKey) + Send + Sync>;

/// Provider returning a fixed update per phase unless a scripted result is queued.
#[derive(Default)]
pub(super) struct ScriptedProvider {
    scripts: Mutex<HashMap<Phase, VecDeque<Result<EnrichmentUpdate, ProviderError>>>>,
    calls: Mutex<Vec<(Phase, AddressKey)>>,
    on_call: Mutex<Option<CallHook>>,
}

impl ScriptedProvider {
    pub(super) fn script(&self, phase: Phase, result: Result<EnrichmentUpdate, ProviderError>) {
        self.scripts
            .lock()
            .expect("script mutex")
            .entry(phase)
            .or_default()
            .push_back(result);
    }

    pub(super) fn fail_times(&self, phase: Phase, error: ProviderError, times: usize) {
        for _ in 0..times {
            self.script(phase, Err(error.clone()));
        }
    }

    pub(super) fn calls(&self) -> Vec<Phase> {
        self.calls
            .lock()
            .expect("calls mutex")
            .iter()
            .map(|(phase, _)| *phase)
            .collect()
    }

    pub(super) fn calls_for(&self, key: &AddressKey) -> Vec<Phase> {
        self.calls
            .lock()
            .expect("calls mutex")
            .iter()
            .filter(|(_, called)| called == key)
            .map(|(phase, _)| *phase)
            .collect()
    }

    /// Run `hook` inside every provider call, before the response is produced.
    pub(super) fn on_call(&self, hook: impl Fn(Phase, &AddressKey) + Send + Sync + 'static) {
        *self.on_call.lock().expect("hook mutex") = Some(Box::new(hook));
    }

    fn respond(
        &self,
        phase: Phase,
        property: &Property,
    ) -> Result<EnrichmentUpdate, ProviderError> {
        let key = property.key();
        if let Some(hook) = self.on_call.lock().expect("hook mutex").as_ref() {
            hook(phase, &key);
        }
        self.calls.lock().expect("calls mutex").push((phase, key));
        let scripted = self
            .scripts
            .lock()
            .expect("script mutex")
            .get_mut(&phase)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(default_update(phase)))
    }
}

#[async_trait]
impl EnrichmentProvider for ScriptedProvider {
    async fn county_data(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(Phase::CountyData, property)
    }

    async fn listing(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(Phase::Listing, property)
    }

    async fn location(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(Phase::Map, property)
    }

    async fn imagery(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(Phase::Images, property)
    }
}

#[derive(Default)]
pub(super) struct RecordingPublisher {
    published: Mutex<Vec<PropertyResult>>,
}

impl RecordingPublisher {
    pub(super) fn published(&self) -> Vec<PropertyResult> {
        self.published.lock().expect("publisher mutex").clone()
    }
}

#[async_trait]
impl ReportPublisher for RecordingPublisher {
    async fn publish(&self, result: &PropertyResult) -> Result<(), ProviderError> {
        self.published
            .lock()
            .expect("publisher mutex")
            .push(result.clone());
        Ok(())
    }
}

/// Values that pass the standard kill-switch and land in the contender tier.
pub(super) fn default_update(phase: Phase) -> EnrichmentUpdate {
    match phase {
        Phase::CountyData => EnrichmentUpdate::new("county_records", 0.9, fetched_at())
            .with(FieldValue::HoaFee(0.0))
            .with(FieldValue::Bedrooms(4))
            .with(FieldValue::Bathrooms(2.0))
            .with(FieldValue::Sewer(SewerType::City))
            .with(FieldValue::GarageSpaces(2))
            .with(FieldValue::LotAreaSqft(9_000))
            .with(FieldValue::YearBuilt(2015))
            .with(FieldValue::AnnualTax(2_100.0))
            .with(FieldValue::RoofYear(2021))
            .with(FieldValue::HvacYear(2019))
            .with(FieldValue::HasPool(false)),
        Phase::Listing => EnrichmentUpdate::new("listing_site", 0.8, fetched_at())
            .with(FieldValue::ListPrice(425_000))
            .with(FieldValue::LivingAreaSqft(2_200))
            .with(FieldValue::Solar(SolarStatus::Owned)),
        Phase::Map => EnrichmentUpdate::new("map_service", 0.7, fetched_at())
            .with(FieldValue::SchoolRating(8.0))
            .with(FieldValue::CrimeIndex(80.0))
            .with(FieldValue::HighwayDistanceMiles(1.5))
            .with(FieldValue::FloodZone(FloodZone::Minimal))
            .with(FieldValue::GroceryDistanceMiles(0.8))
            .with(FieldValue::ParkDistanceMiles(0.4))
            .with(FieldValue::WalkScore(55))
            .with(FieldValue::CommuteMinutes(20))
            .with(FieldValue::BackyardOrientation(Orientation::East)),
        Phase::Images => EnrichmentUpdate::new("vision", 0.5, fetched_at())
            .with(FieldValue::KitchenRating(7.0))
            .with(FieldValue::MasterSuiteRating(7.0))
            .with(FieldValue::NaturalLightRating(8.0))
            .with(FieldValue::BackyardRating(7.0))
            .with(FieldValue::AestheticsRating(7.0))
            .with(FieldValue::CeilingHeightFt(9.0))
            .with(FieldValue::HasFireplace(false))
            .with(FieldValue::Laundry(LaundryLocation::DedicatedRoom)),
        Phase::Synthesis | Phase::Report => EnrichmentUpdate::new("none", 0.0, fetched_at()),
    }
}

/// Total for a property enriched with every default update.
pub(super) const DEFAULT_TOTAL: f64 = 463.0;

pub(super) struct Harness {
    pub(super) coordinator: TestCoordinator,
    pub(super) provider: Arc<ScriptedProvider>,
    pub(super) publisher: Arc<RecordingPublisher>,
    pub(super) work_items: Arc<InMemoryWorkItemStore>,
    pub(super) enrichment: Arc<InMemoryEnrichmentStore>,
}

pub(super) fn harness() -> Harness {
    harness_with(false)
}

pub(super) fn harness_with(strict_prerequisites: bool) -> Harness {
    let provider = Arc::new(ScriptedProvider::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let work_items = Arc::new(InMemoryWorkItemStore::default());
    let enrichment = Arc::new(InMemoryEnrichmentStore::default());
    let engine =
        EvaluationEngine::new(&EvaluationPolicy::standard(), 2025).expect("standard engine");
    let config = PipelineConfig {
        strict_prerequisites,
        retry: RetryConfig::immediate(MAX_RETRIES),
    };

    let coordinator = PhaseCoordinator::new(
        Arc::clone(&work_items),
        Arc::clone(&enrichment),
        Arc::clone(&provider),
        Arc::clone(&publisher),
        engine,
        config,
    )
    .with_holder("test-coordinator");

    Harness {
        coordinator,
        provider,
        publisher,
        work_items,
        enrichment,
    }
}

pub(super) fn address(street: &str) -> Address {
    Address::new(street, "Scottsdale", "AZ", "85251")
}

pub(super) fn seed(street: &str) -> ListingSeed {
    ListingSeed {
        property: Property::new(address(street)),
        update: EnrichmentUpdate::new(LISTING_SOURCE, LISTING_CONFIDENCE, fetched_at())
            .with(FieldValue::ListPrice(419_000)),
    }
}

/// Register `street` and return its key.
pub(super) fn registered(harness: &Harness, street: &str) -> AddressKey {
    let seed = seed(street);
    harness.coordinator.register(&seed).expect("register");
    seed.key()
}

/// Persist a hand-built work item, e.g. to simulate state left by a crash.
pub(super) fn store_item(harness: &Harness, item: &WorkItem) {
    harness.work_items.save(item).expect("save work item");
}

pub(super) fn stored(harness: &Harness, key: &AddressKey) -> WorkItem {
    harness.coordinator.work_item(key).expect("work item")
}
