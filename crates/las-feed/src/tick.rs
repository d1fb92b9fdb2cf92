//! Price ticks and material-change filtering.

use chrono::{DateTime, Utc};
use las_core::Price;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One observed price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub asset: String,
    pub price: Price,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(asset: impl Into<String>, price: Price, timestamp: DateTime<Utc>) -> Self {
        Self {
            asset: asset.into(),
            price,
            timestamp,
        }
    }
}

/// Passes a tick only when it moved more than `min_change` from the last
/// tick that passed for the same asset. The first tick per asset passes.
#[derive(Debug, Clone)]
pub struct TickFilter {
    min_change: Decimal,
    last: HashMap<String, Price>,
}

impl TickFilter {
    pub fn new(min_change: Decimal) -> Self {
        Self {
            min_change,
            last: HashMap::new(),
        }
    }

    /// Returns true if the tick should be forwarded.
    pub fn accept(&mut self, tick: &PriceTick) -> bool {
        if let Some(last) = self.last.get(&tick.asset) {
            if tick.price.abs_diff(*last) <= self.min_change {
                return false;
            }
        }
        self.last.insert(tick.asset.clone(), tick.price);
        true
    }

    /// Last forwarded price for `asset`.
    pub fn last(&self, asset: &str) -> Option<Price> {
        self.last.get(asset).copied()
    }
}

impl Default for TickFilter {
    fn default() -> Self {
        Self::new(Decimal::ONE)
    }
}
