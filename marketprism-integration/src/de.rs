//! Serde helpers for the timestamp and decimal encodings exchanges actually
//! send over the wire: millisecond epoch integers, stringified millisecond
//! epochs, and stringified floats. Adapted from `barter-integration`'s `de`
//! module; MarketPrism additionally needs a second-precision variant for
//! Deribit's some timestamp fields.

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer};
use std::fmt;

pub fn datetime_utc_from_epoch_ms(epoch_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn datetime_utc_from_epoch_s(epoch_s: f64) -> DateTime<Utc> {
    let millis = (epoch_s * 1_000.0).round() as i64;
    datetime_utc_from_epoch_ms(millis)
}

/// Deserialize a JSON string into any `T: FromStr`, eg/ a stringified
/// decimal price or quantity field.
pub fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<T>().map_err(de::Error::custom)
}

/// Deserialize a millisecond-epoch integer (Binance's timestamp convention).
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_ms = i64::deserialize(deserializer)?;
    Ok(datetime_utc_from_epoch_ms(epoch_ms))
}

/// Deserialize a stringified millisecond-epoch integer (OKX's convention).
pub fn de_str_u64_epoch_ms_as_datetime_utc<'de, D>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let epoch_ms = s.parse::<i64>().map_err(de::Error::custom)?;
    Ok(datetime_utc_from_epoch_ms(epoch_ms))
}

/// Deserialize a second-precision float epoch (Deribit's convention for
/// some REST fields).
pub fn de_f64_epoch_s_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_s = f64::deserialize(deserializer)?;
    Ok(datetime_utc_from_epoch_s(epoch_s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize as _;

    #[derive(Debug, serde::Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
        ts: DateTime<Utc>,
    }

    #[test]
    fn parses_epoch_ms_integer() {
        let w: Wrapper = serde_json::from_str(r#"{"ts":1700000000000}"#).unwrap();
        assert_eq!(w.ts.timestamp_millis(), 1_700_000_000_000);
    }

    #[derive(Debug, serde::Deserialize)]
    struct StrWrapper {
        #[serde(deserialize_with = "de_str_u64_epoch_ms_as_datetime_utc")]
        ts: DateTime<Utc>,
    }

    #[test]
    fn parses_stringified_epoch_ms() {
        let w: StrWrapper = serde_json::from_str(r#"{"ts":"1700000000000"}"#).unwrap();
        assert_eq!(w.ts.timestamp_millis(), 1_700_000_000_000);
    }

    #[derive(Debug, serde::Deserialize)]
    struct DecimalWrapper {
        #[serde(deserialize_with = "de_str")]
        price: rust_decimal::Decimal,
    }

    #[test]
    fn parses_stringified_decimal() {
        let w: DecimalWrapper = serde_json::from_str(r#"{"price":"12345.6789"}"#).unwrap();
        assert_eq!(w.price.to_string(), "12345.6789");
    }
}
