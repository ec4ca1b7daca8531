mod strategies;

pub use strategies::standard_strategies;

use super::domain::PropertyFields;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const LOCATION_MAX: u16 = 250;
pub const SYSTEMS_MAX: u16 = 175;
pub const INTERIOR_MAX: u16 = 180;
pub const MAX_TOTAL: u16 = 605;

const _: () = assert!(LOCATION_MAX + SYSTEMS_MAX + INTERIOR_MAX == MAX_TOTAL);

/// Upper end of every strategy's raw scale.
pub const RAW_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Section A
    Location,
    /// Section B
    Systems,
    /// Section C
    Interior,
}

impl Section {
    pub const fn ordered() -> [Self; 3] {
        [Self::Location, Self::Systems, Self::Interior]
    }

    pub const fn max_points(self) -> u16 {
        match self {
            Self::Location => LOCATION_MAX,
            Self::Systems => SYSTEMS_MAX,
            Self::Interior => INTERIOR_MAX,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Location => "Location & Environment",
            Self::Systems => "Lot & Systems",
            Self::Interior => "Interior & Features",
        }
    }
}

/// Inputs shared by every rating function that are not part of the property itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringContext {
    pub reference_year: u16,
}

/// Rates one aspect of a property on the raw 0-10 scale. `None` means the inputs were missing.
pub type RateFn = fn(&PropertyFields, &ScoringContext) -> Option<f64>;

#[derive(Clone, Copy)]
pub struct ScoringStrategy {
    pub name: &'static str,
    pub section: Section,
    pub weight: u16,
    /// Raw score used when the inputs are missing.
    pub neutral_raw: f64,
    pub rate: RateFn,
}

impl fmt::Debug for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringStrategy")
            .field("name", &self.name)
            .field("section", &self.section)
            .field("weight", &self.weight)
            .field("neutral_raw", &self.neutral_raw)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("{section:?} strategy weights sum to {actual}, expected {expected}")]
    WeightMismatch {
        section: Section,
        expected: u16,
        actual: u16,
    },
    #[error("strategy {0} registered more than once")]
    DuplicateStrategy(&'static str),
    #[error("strategy {strategy} has neutral default {raw} outside 0..=10")]
    InvalidNeutral { strategy: &'static str, raw: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub strategy: String,
    pub section: Section,
    pub raw: f64,
    pub points: f64,
    /// True when the neutral default stood in for missing data.
    pub defaulted: bool,
}

/// Section subtotals and their sum for one scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub location: f64,
    pub systems: f64,
    pub interior: f64,
    pub total: f64,
    pub components: Vec<ScoreComponent>,
}

impl ScoreBreakdown {
    pub fn section(&self, section: Section) -> f64 {
        match section {
            Section::Location => self.location,
            Section::Systems => self.systems,
            Section::Interior => self.interior,
        }
    }

    pub fn defaulted_strategies(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|component| component.defaulted)
            .map(|component| component.strategy.as_str())
            .collect()
    }
}

/// Weighted strategy table. Weights are checked against the section maxima at construction.
#[derive(Debug, Clone)]
pub struct PropertyScorer {
    strategies: Vec<ScoringStrategy>,
    context: ScoringContext,
}

impl PropertyScorer {
    pub fn standard(reference_year: u16) -> Result<Self, ScoringError> {
        Self::new(standard_strategies(), reference_year)
    }

    pub fn new(strategies: Vec<ScoringStrategy>, reference_year: u16) -> Result<Self, ScoringError> {
        let mut names = HashSet::new();
        for strategy in &strategies {
            if !names.insert(strategy.name) {
                return Err(ScoringError::DuplicateStrategy(strategy.name));
            }
            if !(0.0..=RAW_SCALE).contains(&strategy.neutral_raw) {
                return Err(ScoringError::InvalidNeutral {
                    strategy: strategy.name,
                    raw: strategy.neutral_raw,
                });
            }
        }

        for section in Section::ordered() {
            let actual: u16 = strategies
                .iter()
                .filter(|strategy| strategy.section == section)
                .map(|strategy| strategy.weight)
                .sum();
            if actual != section.max_points() {
                return Err(ScoringError::WeightMismatch {
                    section,
                    expected: section.max_points(),
                    actual,
                });
            }
        }

        Ok(Self {
            strategies,
            context: ScoringContext { reference_year },
        })
    }

    pub fn max_total(&self) -> f64 {
        f64::from(MAX_TOTAL)
    }

    pub fn strategies(&self) -> &[ScoringStrategy] {
        &self.strategies
    }

    pub fn score(&self, fields: &PropertyFields) -> ScoreBreakdown {
        let mut subtotals = [0.0_f64; 3];
        let mut components = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let rated = (strategy.rate)(fields, &self.context);
            let defaulted = rated.is_none();
            let raw = rated
                .unwrap_or(strategy.neutral_raw)
                .clamp(0.0, RAW_SCALE);
            let points = raw / RAW_SCALE * f64::from(strategy.weight);

            subtotals[section_index(strategy.section)] += points;
            components.push(ScoreComponent {
                strategy: strategy.name.to_string(),
                section: strategy.section,
                raw,
                points,
                defaulted,
            });
        }

        let [location, systems, interior] = Section::ordered()
            .map(|section| subtotals[section_index(section)].min(f64::from(section.max_points())));

        ScoreBreakdown {
            location,
            systems,
            interior,
            total: location + systems + interior,
            components,
        }
    }
}

fn section_index(section: Section) -> usize {
    match section {
        Section::Location => 0,
        Section::Systems => 1,
        Section::Interior => 2,
    }
}
