//! HTTP adapter implementations: CLOB market orders and the settlement
//! relayer client.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{
    ExecutionAdapter, MarketOrderOutcome, MarketResolution, MergeOutcome, RedeemOutcome,
    SettlementAdapter, Side, TokenPair,
};
use crate::error::{ExecutionError, SettlementError};
use crate::metrics;

/// Build the tuned HTTP client shared by the adapters.
pub fn build_http_client(timeout_ms: u64, pool_size: usize) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .connect_timeout(std::time::Duration::from_millis(500))
        .tcp_nodelay(true)
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_max_idle_per_host(pool_size)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build()
        .expect("failed to create HTTP client")
}

/// Market order request body.
#[derive(Debug, Clone, Serialize)]
struct MarketOrderRequest {
    token_id: String,
    side: Side,
    /// Quote units for buys, shares for sells.
    amount: String,
    order_type: &'static str,
}

/// Order submission result; field names vary across API versions.
#[derive(Debug, Clone, Deserialize)]
struct SubmitResult {
    #[serde(alias = "orderID", alias = "orderId", alias = "order_id", alias = "id")]
    order_id: Option<String>,
    error: Option<String>,
    success: Option<bool>,
    #[serde(alias = "transactionsHashes", alias = "transaction_hashes")]
    tx_hashes: Option<Vec<String>>,
    #[serde(alias = "makingAmount", alias = "filled_size", alias = "sizeMatched")]
    filled_shares: Option<String>,
    #[serde(alias = "avgPrice", alias = "average_price")]
    fill_price: Option<String>,
}

/// Immediate-or-cancel market orders against the CLOB REST API.
#[derive(Debug, Clone)]
pub struct ClobExecutionClient {
    http: reqwest::Client,
    clob_url: String,
}

impl ClobExecutionClient {
    /// Create a new client.
    pub fn new(http: reqwest::Client, clob_url: impl Into<String>) -> Self {
        Self {
            http,
            clob_url: clob_url.into(),
        }
    }
}

#[async_trait]
impl ExecutionAdapter for ClobExecutionClient {
    #[instrument(skip(self), fields(token = %token_id, side = %side, amount = %amount))]
    async fn market_order(
        &self,
        token_id: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<MarketOrderOutcome, ExecutionError> {
        if amount <= Decimal::ZERO {
            return Err(ExecutionError::InvalidParams(format!(
                "order amount must be positive, got {amount}"
            )));
        }

        let start = std::time::Instant::now();
        let url = format!("{}/order", self.clob_url);
        let request = MarketOrderRequest {
            token_id: token_id.to_string(),
            side,
            amount: amount.to_string(),
            order_type: "FOK",
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("http request failed: {e}")))?;

        metrics::record_order_submit_latency(start);

        if response.status().as_u16() == 429 {
            return Err(ExecutionError::RateLimited {
                retry_after_seconds: 1,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::SubmissionFailed(format!(
                "order submission failed: HTTP {status} - {body}"
            )));
        }

        let result: SubmitResult = response
            .json()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("bad order response: {e}")))?;

        if let Some(error) = &result.error {
            warn!(error = %error, "venue rejected order");
            metrics::inc_orders_failed();
            return Ok(MarketOrderOutcome {
                success: false,
                order_id: result.order_id,
                error: Some(error.clone()),
                ..Default::default()
            });
        }

        let outcome = MarketOrderOutcome {
            success: result.success.unwrap_or(true),
            order_id: result.order_id,
            tx_hashes: result.tx_hashes.unwrap_or_default(),
            filled_shares: result.filled_shares.and_then(|s| s.parse().ok()),
            fill_price: result.fill_price.and_then(|s| s.parse().ok()),
            error: None,
        };

        if outcome.success {
            metrics::inc_orders_filled();
            info!(order_id = ?outcome.order_id, "market order filled");
        } else {
            metrics::inc_orders_failed();
        }

        Ok(outcome)
    }
}

#[derive(Debug, Clone, Serialize)]
struct MergeRequest {
    condition_id: String,
    shares: String,
}

#[derive(Debug, Clone, Serialize)]
struct RedeemRequest {
    condition_id: String,
    yes_token_id: String,
    no_token_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SettlementResponse {
    success: Option<bool>,
    #[serde(alias = "txHash", alias = "transactionHash")]
    tx_hash: Option<String>,
    #[serde(alias = "usdcReceived")]
    usdc_received: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResolutionResponse {
    #[serde(alias = "isResolved")]
    is_resolved: bool,
    winner: Option<String>,
}

/// Thin client over the settlement relayer service.
#[derive(Debug, Clone)]
pub struct HttpSettlementClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSettlementClient {
    /// Create a new client.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn post_settlement<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<SettlementResponse, SettlementError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::Failed(format!("HTTP {status} - {body}")));
        }

        let parsed: SettlementResponse = response
            .json()
            .await
            .map_err(|e| SettlementError::Failed(format!("bad settlement response: {e}")))?;

        if let Some(error) = &parsed.error {
            return Err(SettlementError::Failed(error.clone()));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl SettlementAdapter for HttpSettlementClient {
    #[instrument(skip(self))]
    async fn merge_positions(
        &self,
        condition_id: &str,
        shares: Decimal,
    ) -> Result<MergeOutcome, SettlementError> {
        let response = self
            .post_settlement(
                "/merge",
                &MergeRequest {
                    condition_id: condition_id.to_string(),
                    shares: shares.to_string(),
                },
            )
            .await?;

        debug!(tx_hash = ?response.tx_hash, "merge submitted");
        Ok(MergeOutcome {
            success: response.success.unwrap_or(true),
            tx_hash: response.tx_hash,
        })
    }

    #[instrument(skip(self, tokens))]
    async fn redeem_by_token_ids(
        &self,
        condition_id: &str,
        tokens: &TokenPair,
    ) -> Result<RedeemOutcome, SettlementError> {
        let response = self
            .post_settlement(
                "/redeem",
                &RedeemRequest {
                    condition_id: condition_id.to_string(),
                    yes_token_id: tokens.yes_token_id.clone(),
                    no_token_id: tokens.no_token_id.clone(),
                },
            )
            .await?;

        Ok(RedeemOutcome {
            success: response.success.unwrap_or(true),
            usdc_received: response.usdc_received.and_then(|s| s.parse().ok()),
            tx_hash: response.tx_hash,
        })
    }

    #[instrument(skip(self))]
    async fn market_resolution(
        &self,
        condition_id: &str,
    ) -> Result<MarketResolution, SettlementError> {
        let url = format!("{}/resolution/{}", self.base_url, condition_id);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(SettlementError::Failed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let parsed: ResolutionResponse = response
            .json()
            .await
            .map_err(|e| SettlementError::Failed(format!("bad resolution response: {e}")))?;

        if !parsed.is_resolved {
            return Err(SettlementError::ResolutionPending {
                condition_id: condition_id.to_string(),
            });
        }

        Ok(MarketResolution {
            is_resolved: true,
            winner: parsed.winner.and_then(|w| w.parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_result_parses_alias_fields() {
        let result: SubmitResult = serde_json::from_value(serde_json::json!({
            "orderID": "ord-1",
            "success": true,
            "transactionsHashes": ["0xaaa"],
            "makingAmount": "20",
            "avgPrice": "0.355"
        }))
        .unwrap();

        assert_eq!(result.order_id.as_deref(), Some("ord-1"));
        assert_eq!(result.tx_hashes.unwrap(), vec!["0xaaa".to_string()]);
        assert_eq!(result.filled_shares.as_deref(), Some("20"));
        assert_eq!(result.fill_price.as_deref(), Some("0.355"));
    }

    #[test]
    fn resolution_response_parses_winner() {
        let parsed: ResolutionResponse = serde_json::from_value(serde_json::json!({
            "isResolved": true,
            "winner": "up"
        }))
        .unwrap();

        assert!(parsed.is_resolved);
        assert_eq!(parsed.winner.as_deref(), Some("up"));
    }
}
