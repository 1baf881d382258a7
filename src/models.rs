//! The price record and the parsers for its CSV field encodings.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

/// Layout of the expiration-date column: date, time, numeric offset and a
/// zone abbreviation, e.g. `2024-05-01 10:30:00 +0000 UTC`. The
/// abbreviation is consumed but not interpreted; the numeric offset wins.
pub const EXPIRATION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z %Z";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
    pub id:              String,
    pub price:           Decimal,
    pub expiration_date: DateTime<FixedOffset>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("can't parse price data={0} as a decimal number")]
    BadPrice(String),
    #[error("can't parse expiration date={0} as a timestamp")]
    BadTimestamp(String),
}

/// Exact base-10 parse; binary floats never enter the data path.
pub fn parse_price(raw: &str) -> Result<Decimal, ParseError> {
    Decimal::from_str(raw.trim()).map_err(|_| ParseError::BadPrice(raw.to_owned()))
}

pub fn parse_expiration_date(raw: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    DateTime::parse_from_str(raw.trim(), EXPIRATION_DATE_FORMAT)
        .map_err(|_| ParseError::BadTimestamp(raw.to_owned()))
}
