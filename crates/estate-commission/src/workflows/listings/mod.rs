//! Listing snapshots imported from the back-office CSV export.

mod parser;

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::workflows::commission::{
    CommissionRate, ListingSnapshot, ListingStatus, PropertyId, SellerId,
};

#[derive(Debug)]
pub enum ListingImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: u64, reason: String },
}

impl std::fmt::Display for ListingImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingImportError::Io(err) => write!(f, "failed to read listing export: {}", err),
            ListingImportError::Csv(err) => write!(f, "invalid listing CSV data: {}", err),
            ListingImportError::InvalidRow { line, reason } => {
                write!(f, "listing export line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for ListingImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListingImportError::Io(err) => Some(err),
            ListingImportError::Csv(err) => Some(err),
            ListingImportError::InvalidRow { .. } => None,
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

/// Counts reported by `listings check`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub total: usize,
    pub available: usize,
    /// Rows whose commission rate is outside the platform band; a sale falls back to the default.
    pub rate_out_of_range: usize,
    pub missing_seller_email: usize,
}

impl ListingSummary {
    pub fn from_listings(listings: &[ListingSnapshot]) -> Self {
        listings.iter().fold(Self::default(), |mut summary, listing| {
            summary.total += 1;
            if listing.status == ListingStatus::Available {
                summary.available += 1;
            }
            if CommissionRate::new(listing.commission_rate_percent).is_err() {
                summary.rate_out_of_range += 1;
            }
            if listing.seller_email.is_none() {
                summary.missing_seller_email += 1;
            }
            summary
        })
    }
}

pub struct ListingImporter;

impl ListingImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<ListingSnapshot>, ListingImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<ListingSnapshot>, ListingImportError> {
        let rows = parser::parse_rows(reader)?;
        let mut listings = Vec::with_capacity(rows.len());

        for (line, row) in rows {
            let invalid = |reason: String| ListingImportError::InvalidRow { line, reason };

            let price = Decimal::from_str(row.price.replace(',', "").trim())
                .map_err(|_| invalid(format!("price `{}` is not a decimal", row.price)))?;
            if price <= Decimal::ZERO {
                return Err(invalid(format!("price {price} must be positive")));
            }

            let commission_rate_percent = match row.commission_rate.as_deref() {
                None => CommissionRate::default().percent(),
                Some(raw) => raw
                    .trim_end_matches('%')
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| invalid(format!("commission rate `{raw}` is not a whole percent")))?,
            };

            let status = match row.status.as_deref() {
                None => ListingStatus::Available,
                Some(raw) => ListingStatus::parse(raw)
                    .ok_or_else(|| invalid(format!("unknown listing status `{raw}`")))?,
            };

            listings.push(ListingSnapshot {
                property_id: PropertyId(row.property_id),
                seller_id: SellerId(row.seller_id),
                title: row.title,
                price: price.round_dp(2),
                commission_rate_percent,
                status,
                seller_email: row.seller_email,
            });
        }

        Ok(listings)
    }
}
