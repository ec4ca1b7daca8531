mod parser;

use crate::workflows::evaluation::domain::{
    Address, AddressKey, EnrichmentUpdate, FieldValue, Property, ValidationError,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

use parser::{numeric_text, ListingRow};

pub const LISTING_SOURCE: &str = "listing_csv";
pub const LISTING_CONFIDENCE: f64 = 0.6;

#[derive(Debug)]
pub enum ListingImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingAddress { line: usize, column: &'static str },
    InvalidNumber {
        line: usize,
        column: &'static str,
        value: String,
    },
    Validation { line: usize, source: ValidationError },
}

impl std::fmt::Display for ListingImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingImportError::Io(err) => write!(f, "failed to read listing export: {}", err),
            ListingImportError::Csv(err) => write!(f, "invalid listing CSV data: {}", err),
            ListingImportError::MissingAddress { line, column } => {
                write!(f, "line {line}: address column '{column}' is empty")
            }
            ListingImportError::InvalidNumber {
                line,
                column,
                value,
            } => write!(f, "line {line}: '{value}' is not a valid {column}"),
            ListingImportError::Validation { line, source } => {
                write!(f, "line {line}: {source}")
            }
        }
    }
}

impl std::error::Error for ListingImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListingImportError::Io(err) => Some(err),
            ListingImportError::Csv(err) => Some(err),
            ListingImportError::Validation { source, .. } => Some(source),
            ListingImportError::MissingAddress { .. }
            | ListingImportError::InvalidNumber { .. } => None,
        }
    }
}

impl From<std::io::Error> for ListingImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ListingImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// A property taken from a listing export plus the values the export already carried.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingSeed {
    pub property: Property,
    pub update: EnrichmentUpdate,
}

impl ListingSeed {
    pub fn key(&self) -> AddressKey {
        self.property.key()
    }
}

pub struct ListingImporter;

impl ListingImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<ListingSeed>, ListingImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, fetched_at)
    }

    /// Rows sharing a normalized address keep the first occurrence.
    pub fn from_reader<R: Read>(
        reader: R,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<ListingSeed>, ListingImportError> {
        let mut seen: HashSet<AddressKey> = HashSet::new();
        let mut seeds = Vec::new();

        for (line, row) in parser::parse_rows(reader)? {
            let seed = seed_from_row(line, row, fetched_at)?;
            let key = seed.key();
            if !seen.insert(key.clone()) {
                debug!(address = %key, line, "skipping duplicate listing row");
                continue;
            }
            seeds.push(seed);
        }

        if seeds.is_empty() {
            warn!("listing export contained no properties");
        }

        Ok(seeds)
    }
}

fn seed_from_row(
    line: usize,
    row: ListingRow,
    fetched_at: DateTime<Utc>,
) -> Result<ListingSeed, ListingImportError> {
    let address = Address::new(
        required(line, "street", row.street)?,
        required(line, "city", row.city)?,
        required(line, "state", row.state)?,
        required(line, "zip", row.zip)?,
    );

    let mut update = EnrichmentUpdate::new(LISTING_SOURCE, LISTING_CONFIDENCE, fetched_at);
    if let Some(price) = number::<f64>(line, "price", row.price.as_deref())? {
        update = update.with(FieldValue::ListPrice(whole(line, "price", price)?));
    }
    if let Some(beds) = number::<u8>(line, "beds", row.beds.as_deref())? {
        update = update.with(FieldValue::Bedrooms(beds));
    }
    if let Some(baths) = number::<f64>(line, "baths", row.baths.as_deref())? {
        update = update.with(FieldValue::Bathrooms(baths));
    }
    if let Some(sqft) = number::<u32>(line, "sqft", row.sqft.as_deref())? {
        update = update.with(FieldValue::LivingAreaSqft(sqft));
    }

    update
        .validate()
        .map_err(|source| ListingImportError::Validation { line, source })?;

    Ok(ListingSeed {
        property: Property::new(address),
        update,
    })
}

fn required(
    line: usize,
    column: &'static str,
    value: Option<String>,
) -> Result<String, ListingImportError> {
    value.ok_or(ListingImportError::MissingAddress { line, column })
}

fn number<T: FromStr>(
    line: usize,
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, ListingImportError> {
    value
        .map(|raw| {
            numeric_text(raw)
                .parse::<T>()
                .map_err(|_| ListingImportError::InvalidNumber {
                    line,
                    column,
                    value: raw.to_string(),
                })
        })
        .transpose()
}

fn whole(line: usize, column: &'static str, value: f64) -> Result<u32, ListingImportError> {
    if value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX) {
        Ok(value.round() as u32)
    } else {
        Err(ListingImportError::InvalidNumber {
            line,
            column,
            value: value.to_string(),
        })
    }
}
