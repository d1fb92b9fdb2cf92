//! Synthetic asset contracts.
//!
//! A contract pegs `notional_amount` units of an asset to satoshi collateral
//! held by the service. It becomes open once its upfront deposits settle;
//! only open contracts are hedged and rebalanced.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::decimal::{Quantity, Sats};
use crate::error::CoreError;

/// Unique contract identifier.
///
/// Doubles as the memo of every invoice issued for the contract, which is
/// how settlements are correlated back to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

impl ContractId {
    /// Generate a new random identifier (UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier without validation.
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Parse a caller-supplied identifier, rejecting empty input.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidContractId(
                "contract id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Default for ContractId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContractId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deposit requirements of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    /// Margin deposit plus a full initiating deposit.
    Funded,
    /// Margin deposit only.
    Unfunded,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funded => "FUNDED",
            Self::Unfunded => "UNFUNDED",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FUNDED" => Ok(Self::Funded),
            "UNFUNDED" => Ok(Self::Unfunded),
            other => Err(CoreError::InvalidContractType(format!(
                "{other:?} is not one of FUNDED, UNFUNDED"
            ))),
        }
    }
}

/// Why a contract is not open yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotOpenReason {
    MarginUnpaid,
    InitiatingUnpaid,
}

impl fmt::Display for NotOpenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarginUnpaid => write!(f, "margin unpaid"),
            Self::InitiatingUnpaid => write!(f, "initiating deposit unpaid"),
        }
    }
}

/// Whether a contract's deposit preconditions are met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Open,
    NotOpen(NotOpenReason),
}

impl Readiness {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Durable contract record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub asset: String,
    pub notional_amount: Quantity,
    pub held_sats: Sats,
    pub contract_type: ContractType,
    pub margin_pay_request: String,
    pub margin_paid: bool,
    #[serde(default)]
    pub initiating_pay_request: Option<String>,
    pub initiating_paid: bool,
    pub client_host: String,
    pub last_rebalanced_at: DateTime<Utc>,
    pub update_count: u64,
    pub created_at: DateTime<Utc>,
    /// Venue order id of the opening hedge, if one was placed.
    #[serde(default)]
    pub hedge_order_id: Option<String>,
}

impl Contract {
    /// New contract awaiting its deposits.
    ///
    /// Pay requests are attached by the caller once the invoices exist.
    /// UNFUNDED contracts have no initiating deposit, so it counts as paid.
    pub fn new(
        id: ContractId,
        asset: impl Into<String>,
        notional_amount: Quantity,
        held_sats: Sats,
        contract_type: ContractType,
        client_host: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            asset: asset.into(),
            notional_amount,
            held_sats,
            contract_type,
            margin_pay_request: String::new(),
            margin_paid: false,
            initiating_pay_request: None,
            initiating_paid: contract_type == ContractType::Unfunded,
            client_host: client_host.into(),
            last_rebalanced_at: now,
            update_count: 0,
            created_at: now,
            hedge_order_id: None,
        }
    }

    /// Deposit readiness. FUNDED needs margin and initiating, UNFUNDED margin only.
    pub fn readiness(&self) -> Readiness {
        if !self.margin_paid {
            return Readiness::NotOpen(NotOpenReason::MarginUnpaid);
        }
        if self.contract_type == ContractType::Funded && !self.initiating_paid {
            return Readiness::NotOpen(NotOpenReason::InitiatingUnpaid);
        }
        Readiness::Open
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.readiness().is_open()
    }

    /// True if the last exchange or confirmation is older than `timeout`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now.signed_duration_since(self.last_rebalanced_at) > timeout
    }

    #[must_use]
    pub fn is_margin_request(&self, pay_request: &str) -> bool {
        !self.margin_pay_request.is_empty() && self.margin_pay_request == pay_request
    }

    #[must_use]
    pub fn is_initiating_request(&self, pay_request: &str) -> bool {
        self.initiating_pay_request
            .as_deref()
            .is_some_and(|pr| !pr.is_empty() && pr == pay_request)
    }
}
