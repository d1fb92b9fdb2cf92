//! Payment audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contract::ContractId;
use crate::decimal::Sats;

/// One invoice issued or payment made on behalf of a contract.
///
/// Append-only; written for auditing and never read back by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub contract_id: ContractId,
    pub amount_sats: Sats,
    pub pay_request: String,
    /// True when the service paid out, false for invoices it issued.
    pub outbound: bool,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        contract_id: ContractId,
        amount_sats: Sats,
        pay_request: impl Into<String>,
        outbound: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            contract_id,
            amount_sats,
            pay_request: pay_request.into(),
            outbound,
            created_at: Utc::now(),
        }
    }

    pub fn inbound(contract_id: ContractId, amount_sats: Sats, pay_request: impl Into<String>) -> Self {
        Self::new(contract_id, amount_sats, pay_request, false)
    }

    pub fn outbound(contract_id: ContractId, amount_sats: Sats, pay_request: impl Into<String>) -> Self {
        Self::new(contract_id, amount_sats, pay_request, true)
    }
}
