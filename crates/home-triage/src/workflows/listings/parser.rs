use serde::{Deserialize, Deserializer};
use std::io::Read;

/// One listing row with cleaned text cells. Numeric cells are parsed later so
/// that range failures can name the row they came from.
#[derive(Debug, Deserialize)]
pub(crate) struct ListingRow {
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) street: Option<String>,
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) city: Option<String>,
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) state: Option<String>,
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) zip: Option<String>,
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) price: Option<String>,
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) beds: Option<String>,
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) baths: Option<String>,
    #[serde(default, deserialize_with = "cleaned")]
    pub(crate) sqft: Option<String>,
}

/// Rows paired with their 1-based line numbers (the header is line 1).
pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<(usize, ListingRow)>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: csv::StringRecord = csv_reader
        .headers()?
        .iter()
        .map(|header| normalize_cell(header).to_ascii_lowercase())
        .collect();
    csv_reader.set_headers(headers);

    let mut rows = Vec::new();
    for (index, record) in csv_reader.deserialize::<ListingRow>().enumerate() {
        rows.push((index + 2, record?));
    }

    Ok(rows)
}

pub(crate) fn normalize_cell(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips currency and thousands separators so `$425,000` parses as a number.
pub(crate) fn numeric_text(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !matches!(ch, '$' | ',' | '_'))
        .collect()
}

fn cleaned<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|value| normalize_cell(&value))
        .filter(|value| !value.is_empty()))
}
