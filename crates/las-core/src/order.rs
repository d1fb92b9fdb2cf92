//! Order sides, rebalance directions and idempotency keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::contract::ContractId;

/// Order side on the hedge venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Direction of a collateral exchange with a contract's peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RebalanceDirection {
    /// The service holds surplus collateral and pays the peer.
    Send,
    /// The service holds too little collateral and invoices the peer.
    Receive,
}

impl RebalanceDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
        }
    }
}

impl fmt::Display for RebalanceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key identifying one logical transition of one contract.
///
/// Side effects recorded under a key (a hedge order, a collateral
/// exchange) are executed at most once per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for `transition` of `contract_id`. Format: `{contract_id}:{transition}`.
    pub fn new(contract_id: &ContractId, transition: &str) -> Self {
        Self(format!("{contract_id}:{transition}"))
    }

    /// Key for the hedge that opens a contract.
    pub fn open_hedge(contract_id: &ContractId) -> Self {
        Self::new(contract_id, "open")
    }

    /// Key for the hedge that closes a contract.
    pub fn close_hedge(contract_id: &ContractId) -> Self {
        Self::new(contract_id, "close")
    }

    /// Key for the collateral exchange that produces `update_count + 1`.
    pub fn exchange(contract_id: &ContractId, update_count: u64) -> Self {
        Self::new(contract_id, &format!("exchange-{update_count}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this key belongs to `contract_id`.
    pub fn belongs_to(&self, contract_id: &ContractId) -> bool {
        self.0
            .strip_prefix(contract_id.as_str())
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_idempotency_key_format() {
        let id = ContractId::from_string("abc".to_string());
        assert_eq!(IdempotencyKey::open_hedge(&id).as_str(), "abc:open");
        assert_eq!(IdempotencyKey::close_hedge(&id).as_str(), "abc:close");
        assert_eq!(IdempotencyKey::exchange(&id, 3).as_str(), "abc:exchange-3");
    }

    #[test]
    fn test_idempotency_key_belongs_to() {
        let id = ContractId::from_string("abc".to_string());
        let other = ContractId::from_string("ab".to_string());
        let key = IdempotencyKey::open_hedge(&id);
        assert!(key.belongs_to(&id));
        assert!(!key.belongs_to(&other));
    }

    #[test]
    fn test_direction_serde() {
        let json = serde_json::to_string(&RebalanceDirection::Receive).unwrap();
        assert_eq!(json, "\"RECEIVE\"");
    }
}
