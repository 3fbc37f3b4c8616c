//! REST snapshot acquisition for outcome pair order books.

use serde::Deserialize;
use tracing::{debug, instrument};

use super::types::{parse_levels, resolve_timestamp, NumberOrString, RawLevel, TokenBook};
use crate::error::MarketError;
use crate::market::Market;
use crate::metrics;

/// Order book response from the CLOB REST API.
#[derive(Debug, Clone, Deserialize)]
struct BookResponse {
    /// Bid levels.
    bids: Option<Vec<RawLevel>>,
    /// Ask levels.
    asks: Option<Vec<RawLevel>>,
    /// Snapshot timestamp in milliseconds.
    timestamp: Option<NumberOrString>,
}

/// Fetches and normalizes order book snapshots.
#[derive(Debug, Clone)]
pub struct OrderbookService {
    http: reqwest::Client,
    clob_url: String,
}

impl OrderbookService {
    /// Create a new service over an existing HTTP client.
    pub fn new(http: reqwest::Client, clob_url: impl Into<String>) -> Self {
        Self {
            http,
            clob_url: clob_url.into(),
        }
    }

    /// Fetch the normalized book for one token.
    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn token_book(&self, token_id: &str) -> Result<TokenBook, MarketError> {
        let start = std::time::Instant::now();
        let url = format!("{}/book", self.clob_url);

        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(MarketError::RateLimited {
                retry_after_seconds: 1,
            });
        }

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                slug: token_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let book: BookResponse = response
            .json()
            .await
            .map_err(|e| MarketError::InvalidResponse(format!("order book parse failed: {e}")))?;

        metrics::record_book_fetch_latency(start);

        let timestamp = resolve_timestamp(book.timestamp.as_ref());
        Ok(TokenBook::new(
            token_id,
            parse_levels(&book.bids.unwrap_or_default()),
            parse_levels(&book.asks.unwrap_or_default()),
            timestamp,
        ))
    }

    /// Fetch both books of a pair concurrently.
    pub async fn pair_books(&self, market: &Market) -> Result<(TokenBook, TokenBook), MarketError> {
        let (up, down) = tokio::join!(
            self.token_book(&market.up_token_id),
            self.token_book(&market.down_token_id),
        );
        let (up, down) = (up?, down?);
        if up.asks.is_empty() || down.asks.is_empty() {
            debug!(market = %market.slug, "pair books missing an ask side");
        }
        Ok((up, down))
    }
}
