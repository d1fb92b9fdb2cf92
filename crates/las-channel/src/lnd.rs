//! LND REST gateway client.
//!
//! Endpoints:
//! - `POST /v1/invoices` issue an invoice
//! - `POST /v1/channels/transactions` pay synchronously
//! - `GET /v1/payreq/{pay_req}` decode a pay request
//! - `GET /v1/invoices/subscribe` newline-delimited `{"result": Invoice}` stream
//!
//! int64 fields arrive as JSON strings.

use futures_util::StreamExt;
use las_core::{BoxFuture, Sats};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::ledger::{ChannelLedger, InvoiceState, PaymentOutcome, SettlementEvent, SettlementStream};

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// LND REST connection settings.
#[derive(Debug, Clone)]
pub struct LndConfig {
    /// Base URL, e.g. `https://localhost:8080`.
    pub rest_url: String,
    /// Hex-encoded admin macaroon.
    pub macaroon_hex: Option<String>,
    /// Accept self-signed node certificates.
    pub accept_invalid_certs: bool,
    /// Timeout for unary calls. The subscription has none.
    pub call_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct AddInvoiceRequest<'a> {
    value: i64,
    memo: &'a str,
}

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
    payment_request: String,
}

#[derive(Debug, Serialize)]
struct SendPaymentRequest<'a> {
    payment_request: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendPaymentResponse {
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    payment_hash: String,
    #[serde(default)]
    payment_preimage: String,
}

#[derive(Debug, Deserialize)]
struct DecodePayReqResponse {
    #[serde(default, deserialize_with = "i64_from_str_or_num")]
    num_satoshis: i64,
}

#[derive(Debug, Deserialize)]
struct InvoiceStreamLine {
    #[serde(default)]
    result: Option<LndInvoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LndInvoice {
    #[serde(default)]
    memo: String,
    #[serde(default)]
    payment_request: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    settled: bool,
    #[serde(default, deserialize_with = "i64_from_str_or_num")]
    amt_paid_sat: i64,
}

fn i64_from_str_or_num<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s.parse().map_err(de::Error::custom),
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("not an i64: {n}"))),
        serde_json::Value::Null => Ok(0),
        other => Err(de::Error::custom(format!("unexpected value: {other}"))),
    }
}

/// Parse one line of the invoice subscription.
///
/// Blank lines yield `None`. A gateway error object ends the subscription.
fn parse_stream_line(line: &[u8]) -> Option<ChannelResult<SettlementEvent>> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => return Some(Err(ChannelError::Malformed(format!("invalid UTF-8: {e}")))),
    };
    if text.is_empty() {
        return None;
    }
    let parsed: InvoiceStreamLine = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(e) => return Some(Err(ChannelError::Malformed(format!("{e}: {text}")))),
    };
    if let Some(error) = parsed.error {
        return Some(Err(ChannelError::StreamTerminated(error.to_string())));
    }
    let invoice = match parsed.result {
        Some(invoice) => invoice,
        None => return Some(Err(ChannelError::Malformed(text.to_string()))),
    };
    let state = match invoice.state.as_deref() {
        Some(state) => InvoiceState::from_lnd(state),
        None if invoice.settled => InvoiceState::Settled,
        None => InvoiceState::Open,
    };
    Some(Ok(SettlementEvent {
        pay_request: invoice.payment_request,
        memo: invoice.memo,
        state,
        amount_paid: Sats(invoice.amt_paid_sat),
    }))
}

pub struct LndRestLedger {
    client: Client,
    config: LndConfig,
}

impl LndRestLedger {
    pub fn new(config: LndConfig) -> ChannelResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ChannelError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.rest_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.macaroon_hex {
            Some(macaroon) => request.header(MACAROON_HEADER, macaroon),
            None => request,
        }
    }

    async fn check(response: Response) -> ChannelResult<Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rpc {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn do_add_invoice(&self, amount: Sats, memo: String) -> ChannelResult<String> {
        let request = self
            .authorize(self.client.post(self.url("/v1/invoices")))
            .timeout(self.config.call_timeout)
            .json(&AddInvoiceRequest {
                value: amount.value(),
                memo: &memo,
            });
        let response = Self::check(request.send().await?).await?;
        let body: AddInvoiceResponse = response.json().await?;
        debug!(amount_sats = amount.value(), %memo, "Invoice added");
        Ok(body.payment_request)
    }

    async fn do_pay(&self, pay_request: String) -> ChannelResult<PaymentOutcome> {
        let request = self
            .authorize(self.client.post(self.url("/v1/channels/transactions")))
            .timeout(self.config.call_timeout)
            .json(&SendPaymentRequest {
                payment_request: &pay_request,
            });
        let response = Self::check(request.send().await?).await?;
        let body: SendPaymentResponse = response.json().await?;
        if !body.payment_error.is_empty() {
            return Err(ChannelError::PaymentFailed(body.payment_error));
        }
        Ok(PaymentOutcome {
            payment_hash: body.payment_hash,
            preimage: body.payment_preimage,
        })
    }

    async fn do_decode(&self, pay_request: String) -> ChannelResult<Sats> {
        let request = self
            .authorize(self.client.get(self.url(&format!("/v1/payreq/{pay_request}"))))
            .timeout(self.config.call_timeout);
        let response = Self::check(request.send().await?).await?;
        let body: DecodePayReqResponse = response.json().await?;
        Ok(Sats(body.num_satoshis))
    }

    async fn do_subscribe(&self) -> ChannelResult<SettlementStream> {
        let request = self.authorize(self.client.get(self.url("/v1/invoices/subscribe")));
        let response = Self::check(request.send().await?).await?;
        info!(url = %self.config.rest_url, "Subscribed to invoice updates");

        let bytes = Box::pin(response.bytes_stream());
        let state = (
            bytes,
            Vec::<u8>::new(),
            VecDeque::<ChannelResult<SettlementEvent>>::new(),
            false,
        );
        let stream = futures_util::stream::unfold(
            state,
            |(mut bytes, mut buf, mut pending, mut done)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Some((item, (bytes, buf, pending, done)));
                    }
                    if done {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buf.extend_from_slice(&chunk);
                            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                                let line: Vec<u8> = buf.drain(..=pos).collect();
                                if let Some(item) = parse_stream_line(&line) {
                                    pending.push_back(item);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Invoice subscription read failed");
                            done = true;
                            pending.push_back(Err(ChannelError::StreamTerminated(e.to_string())));
                        }
                        None => {
                            done = true;
                            if let Some(item) = parse_stream_line(&buf) {
                                pending.push_back(item);
                            }
                            pending.push_back(Err(ChannelError::StreamTerminated(
                                "invoice subscription ended".to_string(),
                            )));
                        }
                    }
                }
            },
        );
        let stream: SettlementStream = Box::pin(stream);
        Ok(stream)
    }
}

impl ChannelLedger for LndRestLedger {
    fn subscribe_settlements(&self) -> BoxFuture<'_, ChannelResult<SettlementStream>> {
        Box::pin(self.do_subscribe())
    }

    fn add_invoice(&self, amount: Sats, memo: String) -> BoxFuture<'_, ChannelResult<String>> {
        Box::pin(self.do_add_invoice(amount, memo))
    }

    fn pay(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<PaymentOutcome>> {
        Box::pin(self.do_pay(pay_request))
    }

    fn decode_amount(&self, pay_request: String) -> BoxFuture<'_, ChannelResult<Sats>> {
        Box::pin(self.do_decode(pay_request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settled_invoice_line() {
        let line = br#"{"result":{"memo":"c-1","payment_request":"lnbc1","state":"SETTLED","settled":true,"amt_paid_sat":"1500"}}"#;
        let event = parse_stream_line(line).unwrap().unwrap();
        assert_eq!(event.memo, "c-1");
        assert_eq!(event.pay_request, "lnbc1");
        assert!(event.is_settled());
        assert_eq!(event.amount_paid, Sats(1500));
    }

    #[test]
    fn test_parse_legacy_settled_flag() {
        let line = br#"{"result":{"memo":"","payment_request":"lnbc2","settled":true}}"#;
        let event = parse_stream_line(line).unwrap().unwrap();
        assert_eq!(event.state, InvoiceState::Settled);

        let line = br#"{"result":{"payment_request":"lnbc3"}}"#;
        let event = parse_stream_line(line).unwrap().unwrap();
        assert_eq!(event.state, InvoiceState::Open);
    }

    #[test]
    fn test_parse_other_states() {
        let line = br#"{"result":{"payment_request":"lnbc4","state":"CANCELED"}}"#;
        let event = parse_stream_line(line).unwrap().unwrap();
        assert_eq!(event.state, InvoiceState::Other);
    }

    #[test]
    fn test_blank_and_malformed_lines() {
        assert!(parse_stream_line(b"   \n").is_none());
        assert!(parse_stream_line(b"{oops").unwrap().unwrap_err().is_malformed());
        assert!(parse_stream_line(b"{}").unwrap().unwrap_err().is_malformed());
        assert!(parse_stream_line(b"{\"result\":\xff}").unwrap().unwrap_err().is_malformed());
    }

    #[test]
    fn test_gateway_error_terminates() {
        let line = br#"{"error":{"code":2,"message":"EOF"}}"#;
        let err = parse_stream_line(line).unwrap().unwrap_err();
        assert!(matches!(err, ChannelError::StreamTerminated(_)));
    }

    #[test]
    fn test_decode_accepts_string_and_number() {
        let a: DecodePayReqResponse = serde_json::from_str(r#"{"num_satoshis":"42"}"#).unwrap();
        let b: DecodePayReqResponse = serde_json::from_str(r#"{"num_satoshis":42}"#).unwrap();
        assert_eq!(a.num_satoshis, 42);
        assert_eq!(b.num_satoshis, 42);
    }
}
