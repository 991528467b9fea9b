use crate::books::Level;
use crate::event::{RawFundingRate, RawTrade, Side};
use chrono::{DateTime, Utc};
use marketprism_integration::de::{de_str, de_str_u64_epoch_ms_as_datetime_utc};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct OkxArg {
    pub channel: String,
    #[serde(rename = "instId")]
    pub inst_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OkxEnvelope {
    pub arg: OkxArg,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct OkxTrade {
    #[serde(rename = "tradeId")]
    pub trade_id: String,
    #[serde(rename = "px", deserialize_with = "de_str")]
    pub price: Decimal,
    #[serde(rename = "sz", deserialize_with = "de_str")]
    pub quantity: Decimal,
    pub side: String,
    #[serde(rename = "ts", deserialize_with = "de_str_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
}

impl OkxTrade {
    pub fn into_raw(self) -> RawTrade {
        let side = if self.side.eq_ignore_ascii_case("sell") {
            Side::Sell
        } else {
            Side::Buy
        };
        RawTrade {
            trade_id: self.trade_id,
            price: self.price,
            quantity: self.quantity,
            side,
            is_maker: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OkxBooksResponse {
    #[serde(default)]
    pub data: Vec<OkxBookSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct OkxBookSnapshot {
    pub bids: Vec<(Decimal, Decimal, Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal, Decimal, Decimal)>,
    #[serde(rename = "seqId")]
    pub seq_id: i64,
}

impl OkxBookSnapshot {
    pub fn bids_as_levels(&self) -> Vec<Level> {
        self.bids.iter().map(|(p, q, _, _)| Level::new(*p, *q)).collect()
    }

    pub fn asks_as_levels(&self) -> Vec<Level> {
        self.asks.iter().map(|(p, q, _, _)| Level::new(*p, *q)).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct OkxBookUpdate {
    pub bids: Vec<(Decimal, Decimal, Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal, Decimal, Decimal)>,
    #[serde(rename = "seqId")]
    pub seq_id: i64,
    #[serde(rename = "prevSeqId")]
    pub prev_seq_id: i64,
    #[serde(default, deserialize_with = "de_optional_checksum")]
    pub checksum: Option<i32>,
    #[serde(rename = "ts", deserialize_with = "de_str_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
}

impl OkxBookUpdate {
    pub fn bids_as_levels(&self) -> Vec<Level> {
        self.bids.iter().map(|(p, q, _, _)| Level::new(*p, *q)).collect()
    }

    pub fn asks_as_levels(&self) -> Vec<Level> {
        self.asks.iter().map(|(p, q, _, _)| Level::new(*p, *q)).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct OkxFundingRate {
    #[serde(rename = "fundingRate", deserialize_with = "de_str")]
    pub funding_rate: Decimal,
    #[serde(rename = "fundingTime", deserialize_with = "de_str_u64_epoch_ms_as_datetime_utc")]
    pub funding_time: DateTime<Utc>,
    #[serde(rename = "nextFundingTime", deserialize_with = "de_str_u64_epoch_ms_as_datetime_utc")]
    pub next_funding_time: DateTime<Utc>,
}

impl OkxFundingRate {
    pub fn into_raw(self) -> RawFundingRate {
        RawFundingRate {
            funding_rate: self.funding_rate,
            funding_time: self.funding_time,
            next_funding_time: self.next_funding_time,
        }
    }
}

fn de_optional_checksum<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    Ok(Option::<i32>::deserialize(deserializer).unwrap_or(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_trade_envelope() {
        let json = r#"{
            "arg": {"channel": "trades", "instId": "BTC-USDT"},
            "data": [{
                "instId": "BTC-USDT", "tradeId": "130639474", "px": "42219.9",
                "sz": "0.12060306", "side": "buy", "ts": "1630048897897"
            }]
        }"#;
        let envelope: OkxEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.arg.channel, "trades");
        let trade: OkxTrade = serde_json::from_value(envelope.data.into_iter().next().unwrap()).unwrap();
        assert_eq!(trade.trade_id, "130639474");
    }
}
