use super::common::*;
use crate::workflows::evaluation::domain::{EnrichmentRecord, FieldValue};
use crate::workflows::evaluation::scoring::{
    standard_strategies, PropertyScorer, ScoringError, Section, MAX_TOTAL,
};

const EPSILON: f64 = 1e-9;

fn scorer() -> PropertyScorer {
    PropertyScorer::standard(REFERENCE_YEAR).expect("standard scorer")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPSILON,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn standard_weights_fill_each_section() {
    let scorer = scorer();
    for section in Section::ordered() {
        let weight: u16 = scorer
            .strategies()
            .iter()
            .filter(|strategy| strategy.section == section)
            .map(|strategy| strategy.weight)
            .sum();
        assert_eq!(weight, section.max_points());
    }
    assert_eq!(scorer.max_total(), f64::from(MAX_TOTAL));
}

#[test]
fn weight_table_that_misses_section_max_is_rejected() {
    let mut strategies = standard_strategies();
    let kitchen = strategies
        .iter_mut()
        .find(|strategy| strategy.name == "kitchen")
        .expect("kitchen strategy");
    kitchen.weight -= 5;

    let err = PropertyScorer::new(strategies, REFERENCE_YEAR).expect_err("weights short");
    assert!(matches!(
        err,
        ScoringError::WeightMismatch {
            section: Section::Interior,
            expected: 180,
            actual: 175,
        }
    ));
}

#[test]
fn duplicate_strategy_names_are_rejected() {
    let mut strategies = standard_strategies();
    let copy = strategies[0];
    strategies.push(copy);

    let err = PropertyScorer::new(strategies, REFERENCE_YEAR).expect_err("duplicate");
    assert!(matches!(err, ScoringError::DuplicateStrategy("school_district")));
}

#[test]
fn missing_inputs_fall_back_to_neutral_half_credit() {
    let record = record_with(&[]);
    let breakdown = scorer().score(&record.fields);

    assert_close(breakdown.location, 125.0);
    assert_close(breakdown.systems, 87.5);
    assert_close(breakdown.interior, 90.0);
    assert_close(breakdown.total, 302.5);
    assert_eq!(
        breakdown.defaulted_strategies().len(),
        standard_strategies().len()
    );
}

#[test]
fn baseline_record_scores_known_inputs_only() {
    let breakdown = scorer().score(&baseline_record().fields);

    let plumbing = breakdown
        .components
        .iter()
        .find(|component| component.strategy == "plumbing_era")
        .expect("plumbing component");
    assert!(!plumbing.defaulted);
    assert_close(plumbing.points, 25.0);
    assert_close(breakdown.systems, 100.0);
    assert_close(breakdown.total, 315.0);
}

#[test]
fn showcase_record_scores_each_section() {
    let breakdown = scorer().score(&showcase_record().fields);

    assert_close(breakdown.location, 222.15);
    assert_close(breakdown.systems, 152.5);
    assert_close(breakdown.interior, 161.0);
    assert_close(breakdown.total, 535.65);
    assert!(breakdown.defaulted_strategies().is_empty());
}

#[test]
fn sections_stay_within_bounds_and_sum_to_total() {
    let scorer = scorer();
    let records: Vec<EnrichmentRecord> = vec![
        record_with(&[]),
        baseline_record(),
        showcase_record(),
        record_with(&[
            FieldValue::SchoolRating(10.0),
            FieldValue::CrimeIndex(100.0),
            FieldValue::WalkScore(100),
            FieldValue::RoofYear(1990),
            FieldValue::HvacYear(1995),
            FieldValue::KitchenRating(0.0),
        ]),
    ];

    for record in &records {
        let breakdown = scorer.score(&record.fields);
        for section in Section::ordered() {
            let points = breakdown.section(section);
            assert!(points >= 0.0);
            assert!(points <= f64::from(section.max_points()) + EPSILON);
        }
        assert_close(
            breakdown.total,
            breakdown.location + breakdown.systems + breakdown.interior,
        );
        assert!(breakdown.total <= f64::from(MAX_TOTAL) + EPSILON);
    }
}

#[test]
fn old_roof_and_hvac_drag_systems_down() {
    let fresh = scorer().score(&record_with(&[
        FieldValue::RoofYear(2023),
        FieldValue::HvacYear(2022),
    ]).fields);
    let tired = scorer().score(&record_with(&[
        FieldValue::RoofYear(1998),
        FieldValue::HvacYear(2005),
    ]).fields);

    assert!(fresh.systems > tired.systems);
    let roof = tired
        .components
        .iter()
        .find(|component| component.strategy == "roof_condition")
        .expect("roof component");
    assert_close(roof.points, 0.0);
}
