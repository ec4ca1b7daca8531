use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized address used as the key for every per-property collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressKey(pub String);

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Street address as it appeared in the source listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Address {
    pub fn new(
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            state: state.into(),
            zip: zip.into(),
        }
    }

    pub fn key(&self) -> AddressKey {
        AddressKey(format!(
            "{}, {}, {} {}",
            normalize_address_part(&self.street),
            normalize_address_part(&self.city),
            normalize_address_part(&self.state),
            normalize_address_part(&self.zip),
        ))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {} {}",
            self.street, self.city, self.state, self.zip
        )
    }
}

pub(crate) fn normalize_address_part(value: &str) -> String {
    let cleaned: String = value
        .replace(['\u{feff}', '\u{200b}'], "")
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '#' | '-'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

/// A property entering the pipeline. Everything else about it arrives through enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub address: Address,
}

impl Property {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn key(&self) -> AddressKey {
        self.address.key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SewerType {
    City,
    Septic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarStatus {
    Owned,
    Leased,
    Absent,
}

/// FEMA flood hazard grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodZone {
    /// Zone X
    Minimal,
    /// Zone X (shaded) / B
    Moderate,
    /// Zones A, AE, AH, AO
    High,
    /// Zones V, VE
    Coastal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    North,
    East,
    South,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaundryLocation {
    DedicatedRoom,
    Closet,
    Garage,
    NoHookups,
}

/// Where a field value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub confidence: f64,
    pub fetched_at: DateTime<Utc>,
}

/// A value paired with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub provenance: Provenance,
}

/// Rejected field values. Raised when an update is applied, never coerced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} value {value} outside allowed range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("bathrooms must be a multiple of 0.5 (found {0})")]
    BathroomIncrement(f64),
    #[error("confidence {0} outside [0, 1]")]
    Confidence(f64),
    #[error("enrichment source identifier must not be empty")]
    EmptySource,
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Outcome of merging one value into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Set,
    Overwritten,
    Kept,
}

fn merge_slot<T>(slot: &mut Option<Sourced<T>>, value: T, provenance: &Provenance) -> MergeAction {
    let action = match slot.as_ref() {
        None => MergeAction::Set,
        Some(existing) if existing.provenance.source == provenance.source => MergeAction::Kept,
        Some(existing) if provenance.confidence > existing.provenance.confidence => {
            MergeAction::Overwritten
        }
        Some(_) => MergeAction::Kept,
    };

    if action != MergeAction::Kept {
        *slot = Some(Sourced {
            value,
            provenance: provenance.clone(),
        });
    }

    action
}

macro_rules! property_fields {
    ($($field:ident : $variant:ident($ty:ty)),+ $(,)?) => {
        /// Typed enrichment values. Every field is optional until a source supplies it.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct PropertyFields {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<Sourced<$ty>>,
            )+
        }

        impl PropertyFields {
            $(
                pub fn $field(&self) -> Option<$ty> {
                    self.$field.as_ref().map(|sourced| sourced.value)
                }
            )+

            fn merge(&mut self, value: FieldValue, provenance: &Provenance) -> MergeAction {
                match value {
                    $(FieldValue::$variant(value) => merge_slot(&mut self.$field, value, provenance),)+
                }
            }
        }

        /// A single field value handed over by an enrichment source.
        #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "field", content = "value", rename_all = "snake_case")]
        pub enum FieldValue {
            $($variant($ty),)+
        }

        impl FieldValue {
            pub const fn field_name(&self) -> &'static str {
                match self {
                    $(FieldValue::$variant(_) => stringify!($field),)+
                }
            }
        }
    };
}

property_fields! {
    // county records and listing
    bedrooms: Bedrooms(u8),
    bathrooms: Bathrooms(f64),
    living_area_sqft: LivingAreaSqft(u32),
    lot_area_sqft: LotAreaSqft(u32),
    garage_spaces: GarageSpaces(u8),
    hoa_fee: HoaFee(f64),
    sewer: Sewer(SewerType),
    solar: Solar(SolarStatus),
    year_built: YearBuilt(u16),
    list_price: ListPrice(u32),
    annual_tax: AnnualTax(f64),
    has_pool: HasPool(bool),
    pool_equipment_year: PoolEquipmentYear(u16),
    roof_year: RoofYear(u16),
    hvac_year: HvacYear(u16),
    // location
    school_rating: SchoolRating(f64),
    crime_index: CrimeIndex(f64),
    highway_distance_miles: HighwayDistanceMiles(f64),
    flood_zone: FloodZone(FloodZone),
    grocery_distance_miles: GroceryDistanceMiles(f64),
    park_distance_miles: ParkDistanceMiles(f64),
    walk_score: WalkScore(u8),
    commute_minutes: CommuteMinutes(u32),
    backyard_orientation: BackyardOrientation(Orientation),
    // visual assessment
    kitchen_rating: KitchenRating(f64),
    master_suite_rating: MasterSuiteRating(f64),
    natural_light_rating: NaturalLightRating(f64),
    backyard_rating: BackyardRating(f64),
    aesthetics_rating: AestheticsRating(f64),
    ceiling_height_ft: CeilingHeightFt(f64),
    has_fireplace: HasFireplace(bool),
    laundry: Laundry(LaundryLocation),
}

const MIN_YEAR: f64 = 1800.0;
const MAX_YEAR: f64 = 2100.0;

impl FieldValue {
    /// Reject structurally impossible values before they reach the record.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let field = self.field_name();
        match *self {
            FieldValue::Bedrooms(count) => check_range(field, count as f64, 0.0, 20.0),
            FieldValue::Bathrooms(count) => {
                check_range(field, count, 0.0, 20.0)?;
                if (count * 2.0).fract() != 0.0 {
                    return Err(ValidationError::BathroomIncrement(count));
                }
                Ok(())
            }
            FieldValue::LivingAreaSqft(area) => check_range(field, area as f64, 100.0, 50_000.0),
            FieldValue::LotAreaSqft(area) => check_range(field, area as f64, 0.0, 2_000_000.0),
            FieldValue::GarageSpaces(spaces) => check_range(field, spaces as f64, 0.0, 10.0),
            FieldValue::HoaFee(fee) => check_range(field, fee, 0.0, 100_000.0),
            FieldValue::YearBuilt(year)
            | FieldValue::PoolEquipmentYear(year)
            | FieldValue::RoofYear(year)
            | FieldValue::HvacYear(year) => check_range(field, year as f64, MIN_YEAR, MAX_YEAR),
            FieldValue::AnnualTax(tax) => check_range(field, tax, 0.0, 1_000_000.0),
            FieldValue::SchoolRating(rating)
            | FieldValue::KitchenRating(rating)
            | FieldValue::MasterSuiteRating(rating)
            | FieldValue::NaturalLightRating(rating)
            | FieldValue::BackyardRating(rating)
            | FieldValue::AestheticsRating(rating) => check_range(field, rating, 0.0, 10.0),
            FieldValue::CrimeIndex(index) => check_range(field, index, 0.0, 100.0),
            FieldValue::WalkScore(score) => check_range(field, score as f64, 0.0, 100.0),
            FieldValue::HighwayDistanceMiles(miles)
            | FieldValue::GroceryDistanceMiles(miles)
            | FieldValue::ParkDistanceMiles(miles) => check_range(field, miles, 0.0, 500.0),
            FieldValue::CommuteMinutes(minutes) => {
                check_range(field, minutes as f64, 0.0, 600.0)
            }
            FieldValue::CeilingHeightFt(height) => check_range(field, height, 6.0, 30.0),
            FieldValue::ListPrice(_)
            | FieldValue::Sewer(_)
            | FieldValue::Solar(_)
            | FieldValue::HasPool(_)
            | FieldValue::FloodZone(_)
            | FieldValue::BackyardOrientation(_)
            | FieldValue::HasFireplace(_)
            | FieldValue::Laundry(_) => Ok(()),
        }
    }
}

/// Structured bag of values produced by one enrichment source in one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentUpdate {
    pub source: String,
    pub confidence: f64,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

impl EnrichmentUpdate {
    pub fn new(source: impl Into<String>, confidence: f64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            confidence,
            fetched_at,
            values: Vec::new(),
        }
    }

    pub fn with(mut self, value: FieldValue) -> Self {
        self.values.push(value);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source.trim().is_empty() {
            return Err(ValidationError::EmptySource);
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::Confidence(self.confidence));
        }
        self.values.iter().try_for_each(FieldValue::validate)
    }

    fn provenance(&self) -> Provenance {
        Provenance {
            source: self.source.clone(),
            confidence: self.confidence,
            fetched_at: self.fetched_at,
        }
    }
}

/// Counts of what happened to each value in an applied update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub set: usize,
    pub overwritten: usize,
    pub kept: usize,
}

impl MergeSummary {
    pub fn changed(&self) -> bool {
        self.set + self.overwritten > 0
    }
}

/// Accumulated field values and provenance for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub key: AddressKey,
    pub address: Address,
    #[serde(flatten)]
    pub fields: PropertyFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EnrichmentRecord {
    pub fn new(address: Address) -> Self {
        Self {
            key: address.key(),
            address,
            fields: PropertyFields::default(),
            updated_at: None,
        }
    }

    /// Validate the whole update, then merge it. Nothing is merged when any value is invalid.
    pub fn apply(&mut self, update: &EnrichmentUpdate) -> Result<MergeSummary, ValidationError> {
        update.validate()?;

        let provenance = update.provenance();
        let mut summary = MergeSummary::default();
        for value in &update.values {
            match self.fields.merge(*value, &provenance) {
                MergeAction::Set => summary.set += 1,
                MergeAction::Overwritten => summary.overwritten += 1,
                MergeAction::Kept => summary.kept += 1,
            }
        }

        if summary.changed() {
            self.updated_at = Some(update.fetched_at);
        }

        Ok(summary)
    }
}
