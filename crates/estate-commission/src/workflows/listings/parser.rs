use serde::{Deserialize, Deserializer};
use std::io::Read;

/// One CSV row as exported by the listing back office, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct ListingRow {
    #[serde(rename = "Property ID")]
    pub(crate) property_id: u64,
    #[serde(rename = "Seller ID")]
    pub(crate) seller_id: u64,
    #[serde(rename = "Title")]
    pub(crate) title: String,
    #[serde(rename = "Price")]
    pub(crate) price: String,
    #[serde(
        rename = "Commission Rate",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) commission_rate: Option<String>,
    #[serde(rename = "Status", default, deserialize_with = "empty_string_as_none")]
    pub(crate) status: Option<String>,
    #[serde(
        rename = "Seller Email",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) seller_email: Option<String>,
}

pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<(u64, ListingRow)>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();

    for record in csv_reader.deserialize::<ListingRow>() {
        let row = record?;
        let line = rows.len() as u64 + 2;
        rows.push((line, row));
    }

    Ok(rows)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
