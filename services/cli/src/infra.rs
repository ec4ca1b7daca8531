use async_trait::async_trait;
use home_triage::config::AppConfig;
use home_triage::workflows::evaluation::domain::{Address, AddressKey, EnrichmentUpdate, Property};
use home_triage::workflows::evaluation::{EvaluationPolicy, PolicyError};
use home_triage::workflows::pipeline::{
    EnrichmentProvider, PropertyResult, ProviderError, ReportPublisher,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
enum Domain {
    CountyData,
    Listing,
    Location,
    Imagery,
}

impl Domain {
    const fn label(self) -> &'static str {
        match self {
            Self::CountyData => "county data",
            Self::Listing => "listing",
            Self::Location => "location",
            Self::Imagery => "imagery",
        }
    }
}

/// Canned provider responses for one property.
#[derive(Debug, Deserialize)]
struct FixtureEntry {
    address: Address,
    #[serde(default)]
    county_data: Option<EnrichmentUpdate>,
    #[serde(default)]
    listing: Option<EnrichmentUpdate>,
    #[serde(default)]
    location: Option<EnrichmentUpdate>,
    #[serde(default)]
    imagery: Option<EnrichmentUpdate>,
}

impl FixtureEntry {
    fn update(&self, domain: Domain) -> Option<&EnrichmentUpdate> {
        match domain {
            Domain::CountyData => self.county_data.as_ref(),
            Domain::Listing => self.listing.as_ref(),
            Domain::Location => self.location.as_ref(),
            Domain::Imagery => self.imagery.as_ref(),
        }
    }
}

/// Answers provider calls from a JSON file instead of live services. Properties or
/// domains absent from the file fail permanently.
#[derive(Debug, Default)]
pub(crate) struct FixtureProvider {
    entries: HashMap<AddressKey, FixtureEntry>,
}

impl FixtureProvider {
    pub(crate) fn from_path(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub(crate) fn from_reader<R: Read>(reader: R) -> io::Result<Self> {
        let entries: Vec<FixtureEntry> = serde_json::from_reader(reader).map_err(io::Error::from)?;
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.address.key(), entry))
                .collect(),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn respond(
        &self,
        property: &Property,
        domain: Domain,
    ) -> Result<EnrichmentUpdate, ProviderError> {
        let key = property.key();
        match self.entries.get(&key).and_then(|entry| entry.update(domain)) {
            Some(update) => Ok(update.clone()),
            None => {
                debug!(address = %key, domain = domain.label(), "no fixture data");
                Err(ProviderError::Permanent(format!(
                    "no {} data for {key}",
                    domain.label()
                )))
            }
        }
    }
}

#[async_trait]
impl EnrichmentProvider for FixtureProvider {
    async fn county_data(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(property, Domain::CountyData)
    }

    async fn listing(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(property, Domain::Listing)
    }

    async fn location(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(property, Domain::Location)
    }

    async fn imagery(&self, property: &Property) -> Result<EnrichmentUpdate, ProviderError> {
        self.respond(property, Domain::Imagery)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogPublisher;

#[async_trait]
impl ReportPublisher for LogPublisher {
    async fn publish(&self, result: &PropertyResult) -> Result<(), ProviderError> {
        info!(
            address = %result.key,
            tier = result.tier_label(),
            score = ?result.total_score,
            missing = result.missing_phases.len(),
            "report published"
        );
        Ok(())
    }
}

pub(crate) fn load_policy(config: &AppConfig) -> Result<EvaluationPolicy, PolicyError> {
    match &config.policy_path {
        Some(path) => {
            info!(path = %path.display(), "loading evaluation policy");
            EvaluationPolicy::from_path(path)
        }
        None => Ok(EvaluationPolicy::standard()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"[
        {
            "address": {
                "street": "4417 E. Sunnyside Dr.",
                "city": "Phoenix",
                "state": "AZ",
                "zip": "85028"
            },
            "county_data": {
                "source": "county_records",
                "confidence": 0.9,
                "fetched_at": "2025-06-01T15:00:00Z",
                "values": [
                    { "field": "bedrooms", "value": 4 },
                    { "field": "sewer", "value": "city" }
                ]
            }
        }
    ]"#;

    fn property(street: &str) -> Property {
        Property::new(Address::new(street, "phoenix", "az", "85028"))
    }

    #[tokio::test]
    async fn fixture_matches_normalized_addresses() {
        let provider = FixtureProvider::from_reader(FIXTURE.as_bytes()).expect("fixture");

        let update = provider
            .county_data(&property("4417 e sunnyside dr"))
            .await
            .expect("county data");

        assert_eq!(provider.len(), 1);
        assert_eq!(update.source, "county_records");
        assert_eq!(update.values.len(), 2);
    }

    #[tokio::test]
    async fn missing_domains_and_properties_fail_permanently() {
        let provider = FixtureProvider::from_reader(FIXTURE.as_bytes()).expect("fixture");

        let listing = provider
            .listing(&property("4417 E Sunnyside Dr"))
            .await
            .expect_err("no listing fixture");
        let unknown = provider
            .county_data(&property("1 Nowhere Ln"))
            .await
            .expect_err("no property fixture");

        assert!(!listing.is_transient());
        assert!(listing.to_string().contains("no listing data"));
        assert!(!unknown.is_transient());
    }

    #[test]
    fn malformed_fixture_is_an_invalid_data_error() {
        let err = FixtureProvider::from_reader("{ not json".as_bytes()).expect_err("parse error");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
