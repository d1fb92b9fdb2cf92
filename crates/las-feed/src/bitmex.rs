//! BitMEX `instrument` stream parsing.
//!
//! Format: `{"table":"instrument","action":"update","data":[{"symbol":"XBTUSD","lastPrice":6543.5,...}]}`.
//! Subscription acks and partial updates without a last price carry no tick.

use chrono::{DateTime, Utc};
use las_core::Price;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::trace;

use crate::error::{FeedError, FeedResult};
use crate::tick::PriceTick;

/// Raw instrument update.
#[derive(Debug, Deserialize)]
pub struct RawInstrumentMessage {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Vec<RawInstrument>,
}

/// Raw instrument row.
#[derive(Debug, Deserialize)]
pub struct RawInstrument {
    pub symbol: String,
    #[serde(rename = "lastPrice", default)]
    pub last_price: Option<Decimal>,
    #[serde(rename = "lastTickDirection", default)]
    pub last_tick_direction: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Turns instrument messages for one symbol into ticks for one asset.
#[derive(Debug, Clone)]
pub struct BitmexParser {
    symbol: String,
    asset: String,
}

impl BitmexParser {
    /// Parser mapping `symbol` (e.g. "XBTUSD") to `asset` (e.g. "USD").
    pub fn new(symbol: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            asset: asset.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Parse one text frame.
    ///
    /// Returns `Ok(None)` for frames that carry no usable price.
    pub fn parse(&self, text: &str) -> FeedResult<Option<PriceTick>> {
        let msg: RawInstrumentMessage = serde_json::from_str(text)
            .map_err(|e| FeedError::ParseError(format!("Invalid instrument message: {e}")))?;

        if msg.table.as_deref().is_some_and(|t| t != "instrument") {
            return Ok(None);
        }

        let Some(row) = msg.data.into_iter().find(|row| row.symbol == self.symbol) else {
            return Ok(None);
        };

        let price = match row.last_price {
            Some(p) if p > Decimal::ZERO => Price::new(p),
            _ => return Ok(None),
        };

        trace!(
            symbol = %row.symbol,
            %price,
            action = msg.action.as_deref().unwrap_or(""),
            tick_direction = row.last_tick_direction.as_deref().unwrap_or(""),
            "Instrument price"
        );

        Ok(Some(PriceTick::new(
            self.asset.clone(),
            price,
            row.timestamp.unwrap_or_else(Utc::now),
        )))
    }
}
