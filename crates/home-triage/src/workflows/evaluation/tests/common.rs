use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::evaluation::domain::{
    Address, EnrichmentRecord, EnrichmentUpdate, FieldValue, FloodZone, LaundryLocation,
    Orientation, SewerType, SolarStatus,
};
use crate::workflows::evaluation::policy::{
    CriterionPolicy, CriterionRule, EvaluationPolicy, KillSwitchPolicy,
};
use crate::workflows::evaluation::{EvaluationEngine, KillSwitchEvaluator};

pub(super) const REFERENCE_YEAR: u16 = 2025;

pub(super) fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn engine() -> EvaluationEngine {
    EvaluationEngine::new(&EvaluationPolicy::standard(), REFERENCE_YEAR).expect("standard engine")
}

pub(super) fn evaluator() -> KillSwitchEvaluator {
    KillSwitchEvaluator::new(KillSwitchPolicy::standard(), REFERENCE_YEAR)
        .expect("standard kill-switch")
}

/// Evaluator with only SOFT sewer and garage rules at the given severities.
pub(super) fn soft_evaluator(sewer: f64, garage: f64) -> KillSwitchEvaluator {
    let policy = KillSwitchPolicy {
        fail_threshold: 3.0,
        warning_threshold: 1.5,
        criteria: vec![
            CriterionPolicy::soft(CriterionRule::CitySewer, sewer),
            CriterionPolicy::soft(CriterionRule::MinGarage { min: 2 }, garage),
        ],
    };
    KillSwitchEvaluator::new(policy, REFERENCE_YEAR).expect("valid soft policy")
}

pub(super) fn record_with(values: &[FieldValue]) -> EnrichmentRecord {
    let mut record = EnrichmentRecord::new(Address::new(
        "4417 E Sunnyside Dr",
        "Phoenix",
        "AZ",
        "85028",
    ));
    let update = values
        .iter()
        .fold(EnrichmentUpdate::new("fixture", 0.9, fetched_at()), |update, value| {
            update.with(*value)
        });
    record.apply(&update).expect("fixture values are valid");
    record
}

/// HOA 0, 4 beds, 2 baths, city sewer, 2-car garage, 9,000 sqft lot, built 2015.
pub(super) fn baseline_values() -> Vec<FieldValue> {
    vec![
        FieldValue::HoaFee(0.0),
        FieldValue::Bedrooms(4),
        FieldValue::Bathrooms(2.0),
        FieldValue::Sewer(SewerType::City),
        FieldValue::GarageSpaces(2),
        FieldValue::LotAreaSqft(9_000),
        FieldValue::YearBuilt(2015),
    ]
}

pub(super) fn baseline_record() -> EnrichmentRecord {
    record_with(&baseline_values())
}

/// Baseline plus strong values for every scoring input.
pub(super) fn showcase_record() -> EnrichmentRecord {
    let mut values = baseline_values();
    values.extend([
        FieldValue::LivingAreaSqft(2_400),
        FieldValue::Solar(SolarStatus::Owned),
        FieldValue::ListPrice(425_000),
        FieldValue::AnnualTax(2_100.0),
        FieldValue::HasPool(true),
        FieldValue::PoolEquipmentYear(2023),
        FieldValue::RoofYear(2021),
        FieldValue::HvacYear(2019),
        FieldValue::SchoolRating(9.0),
        FieldValue::CrimeIndex(85.0),
        FieldValue::HighwayDistanceMiles(2.5),
        FieldValue::FloodZone(FloodZone::Minimal),
        FieldValue::GroceryDistanceMiles(0.8),
        FieldValue::ParkDistanceMiles(0.2),
        FieldValue::WalkScore(62),
        FieldValue::CommuteMinutes(22),
        FieldValue::BackyardOrientation(Orientation::North),
        FieldValue::KitchenRating(8.5),
        FieldValue::MasterSuiteRating(8.0),
        FieldValue::NaturalLightRating(9.0),
        FieldValue::BackyardRating(7.0),
        FieldValue::AestheticsRating(8.0),
        FieldValue::CeilingHeightFt(10.0),
        FieldValue::HasFireplace(true),
        FieldValue::Laundry(LaundryLocation::DedicatedRoom),
    ]);
    record_with(&values)
}
