//! Standard strategy table and the breakpoints behind each rating curve.
//!
//! Breakpoints are `(limit, raw)` pairs checked in order. `step_down` tables award the
//! raw score of the first limit the value does not exceed (smaller is better), `step_up`
//! tables the first limit the value reaches (larger is better). Anything past the last
//! pair gets the table's floor.

use super::{ScoringContext, ScoringStrategy, Section};
use crate::workflows::evaluation::domain::{
    FloodZone, LaundryLocation, Orientation, PropertyFields,
};

pub const NEUTRAL_RAW: f64 = 5.0;

pub const HIGHWAY_DISTANCE_MILES: &[(f64, f64)] =
    &[(2.0, 10.0), (1.0, 7.0), (0.5, 5.0), (0.25, 3.0)];
pub const HIGHWAY_DISTANCE_FLOOR: f64 = 1.0;

pub const FLOOD_MINIMAL_RAW: f64 = 10.0;
pub const FLOOD_MODERATE_RAW: f64 = 6.0;
pub const FLOOD_HIGH_RAW: f64 = 2.0;
pub const FLOOD_COASTAL_RAW: f64 = 0.0;

pub const GROCERY_DISTANCE_MILES: &[(f64, f64)] =
    &[(0.5, 10.0), (1.0, 8.0), (2.0, 6.0), (3.0, 4.0)];
pub const GROCERY_DISTANCE_FLOOR: f64 = 2.0;

pub const PARK_DISTANCE_MILES: &[(f64, f64)] =
    &[(0.25, 10.0), (0.5, 8.0), (1.0, 6.0), (2.0, 4.0)];
pub const PARK_DISTANCE_FLOOR: f64 = 2.0;

pub const COMMUTE_MINUTES: &[(f64, f64)] =
    &[(15.0, 10.0), (25.0, 8.0), (35.0, 6.0), (45.0, 4.0)];
pub const COMMUTE_FLOOR: f64 = 2.0;

/// Backyard exposure; west-facing yards take the full afternoon sun.
pub const ORIENTATION_NORTH_RAW: f64 = 10.0;
pub const ORIENTATION_EAST_RAW: f64 = 7.5;
pub const ORIENTATION_SOUTH_RAW: f64 = 5.0;
pub const ORIENTATION_WEST_RAW: f64 = 0.0;

/// Roof age in years. Tuned for desert tile/shingle lifespans.
pub const ROOF_AGE_YEARS: &[(f64, f64)] =
    &[(5.0, 10.0), (10.0, 7.0), (15.0, 4.0), (20.0, 2.0)];
pub const ROOF_AGE_FLOOR: f64 = 0.0;

/// HVAC age in years; units rarely pass fifteen summers here.
pub const HVAC_AGE_YEARS: &[(f64, f64)] = &[(5.0, 10.0), (10.0, 7.0), (15.0, 4.0)];
pub const HVAC_AGE_FLOOR: f64 = 1.0;

/// Construction year as a proxy for supply line material.
pub const PLUMBING_YEAR_BUILT: &[(f64, f64)] =
    &[(2010.0, 10.0), (2000.0, 8.0), (1990.0, 6.0), (1980.0, 4.0)];
pub const PLUMBING_FLOOR: f64 = 2.0;

pub const POOL_EQUIPMENT_AGE_YEARS: &[(f64, f64)] = &[(3.0, 10.0), (6.0, 7.0), (10.0, 4.0)];
pub const POOL_EQUIPMENT_FLOOR: f64 = 2.0;
pub const NO_POOL_RAW: f64 = 5.0;

/// Monthly payment per dollar of list price (30-year fixed around 7%).
pub const MORTGAGE_PAYMENT_FACTOR: f64 = 0.00665;
/// Used when the tax bill is unknown.
pub const ESTIMATED_TAX_RATE: f64 = 0.0066;
pub const MONTHLY_COST_DOLLARS: &[(f64, f64)] = &[
    (3_000.0, 10.0),
    (3_500.0, 8.0),
    (4_000.0, 6.0),
    (4_500.0, 4.0),
    (5_000.0, 2.0),
];
pub const MONTHLY_COST_FLOOR: f64 = 0.0;

pub const CEILING_HEIGHT_FT: &[(f64, f64)] = &[(10.0, 10.0), (9.0, 7.0), (8.0, 4.0)];
pub const CEILING_HEIGHT_FLOOR: f64 = 2.0;

pub const FIREPLACE_PRESENT_RAW: f64 = 10.0;
pub const FIREPLACE_ABSENT_RAW: f64 = 0.0;

pub const LAUNDRY_ROOM_RAW: f64 = 10.0;
pub const LAUNDRY_CLOSET_RAW: f64 = 6.0;
pub const LAUNDRY_GARAGE_RAW: f64 = 3.0;
pub const LAUNDRY_NONE_RAW: f64 = 0.0;

fn step_down(value: f64, steps: &[(f64, f64)], floor: f64) -> f64 {
    steps
        .iter()
        .find(|(limit, _)| value <= *limit)
        .map_or(floor, |(_, raw)| *raw)
}

fn step_up(value: f64, steps: &[(f64, f64)], floor: f64) -> f64 {
    steps
        .iter()
        .find(|(limit, _)| value >= *limit)
        .map_or(floor, |(_, raw)| *raw)
}

fn age(year: u16, context: &ScoringContext) -> f64 {
    f64::from(context.reference_year.saturating_sub(year))
}

fn strategy(
    name: &'static str,
    section: Section,
    weight: u16,
    rate: super::RateFn,
) -> ScoringStrategy {
    ScoringStrategy {
        name,
        section,
        weight,
        neutral_raw: NEUTRAL_RAW,
        rate,
    }
}

pub fn standard_strategies() -> Vec<ScoringStrategy> {
    vec![
        // Section A: location & environment (250)
        strategy("school_district", Section::Location, 45, school_district),
        strategy("safety", Section::Location, 45, safety),
        strategy("quietness", Section::Location, 30, quietness),
        strategy("flood_risk", Section::Location, 25, flood_risk),
        strategy("grocery_proximity", Section::Location, 20, grocery_proximity),
        strategy("parks_proximity", Section::Location, 20, parks_proximity),
        strategy("walkability", Section::Location, 20, walkability),
        strategy("commute", Section::Location, 25, commute),
        strategy("sun_orientation", Section::Location, 20, sun_orientation),
        // Section B: lot & systems (175)
        strategy("roof_condition", Section::Systems, 45, roof_condition),
        strategy("hvac_condition", Section::Systems, 30, hvac_condition),
        strategy("plumbing_era", Section::Systems, 25, plumbing_era),
        strategy("pool", Section::Systems, 20, pool),
        strategy("cost_efficiency", Section::Systems, 30, cost_efficiency),
        strategy("backyard", Section::Systems, 25, backyard),
        // Section C: interior & features (180)
        strategy("kitchen", Section::Interior, 40, kitchen),
        strategy("master_suite", Section::Interior, 35, master_suite),
        strategy("natural_light", Section::Interior, 30, natural_light),
        strategy("ceiling_height", Section::Interior, 25, ceiling_height),
        strategy("fireplace", Section::Interior, 15, fireplace),
        strategy("laundry", Section::Interior, 20, laundry),
        strategy("aesthetics", Section::Interior, 15, aesthetics),
    ]
}

fn school_district(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.school_rating()
}

fn safety(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.crime_index().map(|index| index / 10.0)
}

fn quietness(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields
        .highway_distance_miles()
        .map(|miles| step_up(miles, HIGHWAY_DISTANCE_MILES, HIGHWAY_DISTANCE_FLOOR))
}

fn flood_risk(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.flood_zone().map(|zone| match zone {
        FloodZone::Minimal => FLOOD_MINIMAL_RAW,
        FloodZone::Moderate => FLOOD_MODERATE_RAW,
        FloodZone::High => FLOOD_HIGH_RAW,
        FloodZone::Coastal => FLOOD_COASTAL_RAW,
    })
}

fn grocery_proximity(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields
        .grocery_distance_miles()
        .map(|miles| step_down(miles, GROCERY_DISTANCE_MILES, GROCERY_DISTANCE_FLOOR))
}

fn parks_proximity(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields
        .park_distance_miles()
        .map(|miles| step_down(miles, PARK_DISTANCE_MILES, PARK_DISTANCE_FLOOR))
}

fn walkability(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.walk_score().map(|score| f64::from(score) / 10.0)
}

fn commute(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields
        .commute_minutes()
        .map(|minutes| step_down(f64::from(minutes), COMMUTE_MINUTES, COMMUTE_FLOOR))
}

fn sun_orientation(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.backyard_orientation().map(|facing| match facing {
        Orientation::North => ORIENTATION_NORTH_RAW,
        Orientation::East => ORIENTATION_EAST_RAW,
        Orientation::South => ORIENTATION_SOUTH_RAW,
        Orientation::West => ORIENTATION_WEST_RAW,
    })
}

fn roof_condition(fields: &PropertyFields, context: &ScoringContext) -> Option<f64> {
    fields
        .roof_year()
        .map(|year| step_down(age(year, context), ROOF_AGE_YEARS, ROOF_AGE_FLOOR))
}

fn hvac_condition(fields: &PropertyFields, context: &ScoringContext) -> Option<f64> {
    fields
        .hvac_year()
        .map(|year| step_down(age(year, context), HVAC_AGE_YEARS, HVAC_AGE_FLOOR))
}

fn plumbing_era(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields
        .year_built()
        .map(|year| step_up(f64::from(year), PLUMBING_YEAR_BUILT, PLUMBING_FLOOR))
}

fn pool(fields: &PropertyFields, context: &ScoringContext) -> Option<f64> {
    match fields.has_pool()? {
        false => Some(NO_POOL_RAW),
        true => fields.pool_equipment_year().map(|year| {
            step_down(
                age(year, context),
                POOL_EQUIPMENT_AGE_YEARS,
                POOL_EQUIPMENT_FLOOR,
            )
        }),
    }
}

fn cost_efficiency(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    let price = f64::from(fields.list_price()?);
    let annual_tax = fields.annual_tax().unwrap_or(price * ESTIMATED_TAX_RATE);
    let hoa = fields.hoa_fee().unwrap_or(0.0);
    let monthly = price * MORTGAGE_PAYMENT_FACTOR + annual_tax / 12.0 + hoa;
    Some(step_down(monthly, MONTHLY_COST_DOLLARS, MONTHLY_COST_FLOOR))
}

fn backyard(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.backyard_rating()
}

fn kitchen(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.kitchen_rating()
}

fn master_suite(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.master_suite_rating()
}

fn natural_light(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.natural_light_rating()
}

fn ceiling_height(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields
        .ceiling_height_ft()
        .map(|feet| step_up(feet, CEILING_HEIGHT_FT, CEILING_HEIGHT_FLOOR))
}

fn fireplace(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.has_fireplace().map(|present| {
        if present {
            FIREPLACE_PRESENT_RAW
        } else {
            FIREPLACE_ABSENT_RAW
        }
    })
}

fn laundry(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.laundry().map(|location| match location {
        LaundryLocation::DedicatedRoom => LAUNDRY_ROOM_RAW,
        LaundryLocation::Closet => LAUNDRY_CLOSET_RAW,
        LaundryLocation::Garage => LAUNDRY_GARAGE_RAW,
        LaundryLocation::NoHookups => LAUNDRY_NONE_RAW,
    })
}

fn aesthetics(fields: &PropertyFields, _: &ScoringContext) -> Option<f64> {
    fields.aesthetics_rating()
}
