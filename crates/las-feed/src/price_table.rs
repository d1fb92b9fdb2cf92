//! Process-wide asset price table.
//!
//! Every configured asset is priced relative to one reference asset through
//! a fixed cross-rate factor (units of the asset per unit of the reference).
//! Setting any asset's price re-derives every other asset from it.
//! All access goes through one `RwLock`; readers receive copies.

use chrono::{DateTime, Utc};
use las_core::{Price, Quantity};
use las_telemetry::Metrics;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{FeedError, FeedResult};

#[derive(Debug)]
struct TableState {
    factors: BTreeMap<String, Decimal>,
    prices: BTreeMap<String, Price>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct PriceTable {
    reference: String,
    state: RwLock<TableState>,
}

impl PriceTable {
    /// Build a table from cross-rate factors.
    ///
    /// The reference asset always has factor 1 and is added if missing.
    /// Every factor must be positive.
    pub fn new(
        reference: impl Into<String>,
        factors: impl IntoIterator<Item = (String, Decimal)>,
    ) -> FeedResult<Self> {
        let reference = reference.into();
        let mut table = BTreeMap::new();
        for (asset, factor) in factors {
            if factor <= Decimal::ZERO {
                return Err(FeedError::InvalidCrossRate {
                    asset,
                    factor: factor.to_string(),
                });
            }
            table.insert(asset, factor);
        }
        match table.get(&reference) {
            Some(f) if *f != Decimal::ONE => {
                return Err(FeedError::InvalidCrossRate {
                    asset: reference,
                    factor: f.to_string(),
                });
            }
            Some(_) => {}
            None => {
                table.insert(reference.clone(), Decimal::ONE);
            }
        }

        Ok(Self {
            reference,
            state: RwLock::new(TableState {
                factors: table,
                prices: BTreeMap::new(),
                updated_at: None,
            }),
        })
    }

    /// Store `price` for `asset` and re-derive every other configured asset.
    pub fn set(&self, asset: &str, price: Price) -> FeedResult<()> {
        let mut state = self.state.write();
        let factor = *state
            .factors
            .get(asset)
            .ok_or_else(|| FeedError::UnknownAsset(asset.to_string()))?;
        if !price.is_positive() {
            return Err(FeedError::InvalidPrice {
                asset: asset.to_string(),
                price: price.to_string(),
            });
        }

        let invalid = || FeedError::InvalidPrice {
            asset: asset.to_string(),
            price: price.to_string(),
        };
        let reference_price = price.inner().checked_div(factor).ok_or_else(invalid)?;
        let mut derived = Vec::with_capacity(state.factors.len());
        for (a, f) in &state.factors {
            let p = if a == asset {
                price
            } else {
                Price::new(reference_price.checked_mul(*f).ok_or_else(invalid)?)
            };
            derived.push((a.clone(), p));
        }

        for (a, p) in derived {
            Metrics::asset_price(&a, p.inner().to_f64().unwrap_or(0.0));
            state.prices.insert(a, p);
        }
        state.updated_at = Some(Utc::now());
        debug!(asset, %price, %reference_price, "Price table updated");
        Ok(())
    }

    /// Current price of `asset`, zero if unknown or not yet priced.
    pub fn get(&self, asset: &str) -> Price {
        self.price(asset).unwrap_or(Price::ZERO)
    }

    /// Current price of `asset`, if one has been set.
    pub fn price(&self, asset: &str) -> Option<Price> {
        self.state.read().prices.get(asset).copied()
    }

    /// Convert an asset quantity into the reference asset.
    pub fn to_reference(&self, asset: &str, amount: Quantity) -> FeedResult<Quantity> {
        let state = self.state.read();
        let factor = state
            .factors
            .get(asset)
            .ok_or_else(|| FeedError::UnknownAsset(asset.to_string()))?;
        amount
            .inner()
            .checked_div(*factor)
            .map(Quantity::new)
            .ok_or_else(|| FeedError::Overflow {
                asset: asset.to_string(),
                amount: amount.to_string(),
            })
    }

    #[must_use]
    pub fn is_supported(&self, asset: &str) -> bool {
        self.state.read().factors.contains_key(asset)
    }

    /// Configured asset symbols, sorted.
    pub fn supported_assets(&self) -> Vec<String> {
        self.state.read().factors.keys().cloned().collect()
    }

    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Copy of all current prices.
    pub fn snapshot(&self) -> BTreeMap<String, Price> {
        self.state.read().prices.clone()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().updated_at
    }
}
