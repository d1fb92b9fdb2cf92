//! Peer daemon clients.
//!
//! Each contract names the host of its counterparty daemon. Collateral
//! exchanges ask that daemon either for an invoice to pay (SEND) or to pay
//! one of ours (RECEIVE).

use las_core::{BoxFuture, Sats};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{ChannelError, ChannelResult};

/// Remote side of a collateral exchange.
pub trait PeerClient: Send + Sync {
    /// Ask the peer for an invoice of exactly `amount`.
    fn request_pay_request(&self, amount: Sats) -> BoxFuture<'_, ChannelResult<String>>;

    /// Ask the peer to pay `pay_request`. Resolves once the peer accepted.
    fn request_payment(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<()>>;
}

/// Resolves a contract's client host into a peer client.
pub trait PeerConnector: Send + Sync {
    fn connect(&self, host: &str) -> ChannelResult<Arc<dyn PeerClient>>;
}

#[derive(Debug, Serialize)]
struct PayReqRequest {
    amount_sat: i64,
}

#[derive(Debug, Deserialize)]
struct PayReqResponse {
    pay_req: String,
}

#[derive(Debug, Serialize)]
struct PayRequest<'a> {
    pay_req: &'a str,
}

/// JSON-over-HTTP peer daemon client.
pub struct HttpPeerClient {
    client: Client,
    base_url: String,
}

impl HttpPeerClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn do_request_pay_request(&self, amount: Sats) -> ChannelResult<String> {
        let response = self
            .client
            .post(format!("{}/v1/payreq", self.base_url))
            .json(&PayReqRequest {
                amount_sat: amount.value(),
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Peer(format!("HTTP {status}: {body}")));
        }
        let body: PayReqResponse = response.json().await?;
        debug!(peer = %self.base_url, amount_sats = amount.value(), "Peer issued invoice");
        Ok(body.pay_req)
    }

    async fn do_request_payment(&self, pay_request: String) -> ChannelResult<()> {
        let response = self
            .client
            .post(format!("{}/v1/pay", self.base_url))
            .json(&PayRequest {
                pay_req: &pay_request,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Peer(format!("HTTP {status}: {body}")));
        }
        debug!(peer = %self.base_url, "Peer accepted payment request");
        Ok(())
    }
}

impl PeerClient for HttpPeerClient {
    fn request_pay_request(&self, amount: Sats) -> BoxFuture<'_, ChannelResult<String>> {
        Box::pin(self.do_request_pay_request(amount))
    }

    fn request_payment(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<()>> {
        Box::pin(self.do_request_payment(pay_request))
    }
}

/// Builds `HttpPeerClient`s sharing one connection pool.
pub struct HttpPeerConnector {
    client: Client,
    scheme: String,
}

impl HttpPeerConnector {
    pub fn new(scheme: impl Into<String>, timeout: Duration) -> ChannelResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            scheme: scheme.into(),
        })
    }

    fn base_url(&self, host: &str) -> ChannelResult<String> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(ChannelError::Peer("contract has no client host".to_string()));
        }
        if host.starts_with("http://") || host.starts_with("https://") {
            return Ok(host.to_string());
        }
        Ok(format!("{}://{}", self.scheme, host))
    }
}

impl PeerConnector for HttpPeerConnector {
    fn connect(&self, host: &str) -> ChannelResult<Arc<dyn PeerClient>> {
        Ok(Arc::new(HttpPeerClient {
            client: self.client.clone(),
            base_url: self.base_url(host)?,
        }))
    }
}
