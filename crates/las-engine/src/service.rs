//! Client request handling: contract creation, closure and queries.

use chrono::Utc;
use las_core::{expected_sats, Contract, ContractId, ContractType, Price, Quantity};
use las_feed::PriceTable;
use las_hedge::HedgeController;
use las_store::{ContractLocks, ContractRegistry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::invoices::InvoiceDesk;
use crate::rebalance::RebalanceEngine;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContractRequest {
    pub asset: String,
    pub amount: Decimal,
    /// Peer daemon address used for collateral exchanges.
    pub host: String,
    /// `FUNDED` or `UNFUNDED`.
    pub contract_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContractResponse {
    pub id: String,
    pub margin_pay_request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiating_pay_request: Option<String>,
    pub percent_margin: Decimal,
    pub asset_price: Price,
}

pub struct ContractService {
    registry: ContractRegistry,
    prices: Arc<PriceTable>,
    hedge: Arc<HedgeController>,
    desk: Arc<InvoiceDesk>,
    engine: Arc<RebalanceEngine>,
    locks: ContractLocks,
    percent_margin: Decimal,
}

impl ContractService {
    pub fn new(
        registry: ContractRegistry,
        prices: Arc<PriceTable>,
        hedge: Arc<HedgeController>,
        desk: Arc<InvoiceDesk>,
        engine: Arc<RebalanceEngine>,
        locks: ContractLocks,
        percent_margin: Decimal,
    ) -> Self {
        Self {
            registry,
            prices,
            hedge,
            desk,
            engine,
            locks,
            percent_margin,
        }
    }

    pub fn percent_margin(&self) -> Decimal {
        self.percent_margin
    }

    /// Create a contract and issue its deposit invoices.
    ///
    /// Collateral is the full notional at the current price. The margin
    /// invoice is `percent_margin`% of it; FUNDED contracts are also
    /// invoiced the full collateral. Nothing is stored when validation or
    /// invoicing fails.
    pub async fn new_contract(&self, req: NewContractRequest) -> ServiceResult<NewContractResponse> {
        if req.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "amount must be greater than 0".to_string(),
            ));
        }
        if !self.prices.is_supported(&req.asset) {
            return Err(ServiceError::Validation(format!(
                "asset {} not supported, try one of: {}",
                req.asset,
                self.prices.supported_assets().join(", ")
            )));
        }
        let contract_type: ContractType = req.contract_type.parse().map_err(|_| {
            ServiceError::Validation(format!(
                "contract type {} is not supported, expected FUNDED or UNFUNDED",
                req.contract_type
            ))
        })?;
        if req.host.trim().is_empty() {
            return Err(ServiceError::Validation("host can not be empty".to_string()));
        }

        let price = self
            .prices
            .price(&req.asset)
            .filter(Price::is_positive)
            .ok_or_else(|| ServiceError::PriceUnavailable(req.asset.clone()))?;
        let notional = Quantity::new(req.amount);
        let held_sats = expected_sats(notional, price)
            .ok_or_else(|| ServiceError::Validation("amount is too large".to_string()))?;
        let margin_sats = held_sats
            .percent(self.percent_margin)
            .ok_or_else(|| ServiceError::Validation("amount is too large".to_string()))?;

        let id = ContractId::new();
        let mut contract = Contract::new(
            id.clone(),
            req.asset.clone(),
            notional,
            held_sats,
            contract_type,
            req.host.trim(),
            Utc::now(),
        );
        contract.margin_pay_request = self.desk.issue(&id, margin_sats).await?;
        if contract_type == ContractType::Funded {
            contract.initiating_pay_request = Some(self.desk.issue(&id, held_sats).await?);
        }
        self.registry.create(&contract)?;

        info!(
            contract_id = %id,
            asset = %contract.asset,
            notional = %notional,
            %contract_type,
            held_sats = held_sats.value(),
            margin_sats = margin_sats.value(),
            "Contract created"
        );
        Ok(NewContractResponse {
            id: id.to_string(),
            margin_pay_request: contract.margin_pay_request,
            initiating_pay_request: contract.initiating_pay_request,
            percent_margin: self.percent_margin,
            asset_price: price,
        })
    }

    /// Close a contract: sell its hedge if it is open, then delete it.
    ///
    /// The record is kept when the hedge cannot be closed.
    pub async fn close_contract(&self, id: &str) -> ServiceResult<()> {
        let id = parse_id(id)?;
        let guard = self.locks.lock(&id).await;
        let contract = self.registry.get(&id)?;

        if contract.is_open() {
            let order = self.hedge.close_position(&contract).await?;
            info!(contract_id = %id, order_id = %order.order_id, "Hedge closed");
        }
        self.registry.delete(&id)?;
        drop(guard);
        self.engine.forget(&id);

        info!(contract_id = %id, was_open = contract.is_open(), "Contract closed");
        Ok(())
    }

    /// Supported asset symbols, sorted.
    pub fn list_assets(&self) -> Vec<String> {
        self.prices.supported_assets()
    }

    pub fn get_contract(&self, id: &str) -> ServiceResult<Contract> {
        Ok(self.registry.get(&parse_id(id)?)?)
    }

    /// Every stored contract, oldest first.
    pub fn list_contracts(&self) -> ServiceResult<Vec<Contract>> {
        let mut contracts: Vec<Contract> = self.registry.enumerate()?.collect();
        contracts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(contracts)
    }
}

fn parse_id(id: &str) -> ServiceResult<ContractId> {
    ContractId::parse(id)
        .map_err(|_| ServiceError::Validation("contract id can not be empty".to_string()))
}
