//! Discovery of upcoming short-duration up/down markets.
//!
//! Market slugs are fully deterministic (`{coin}-updown-{5m|15m}-{slot}`),
//! so discovery enumerates candidate slots over the query window and asks
//! the metadata API which of them exist and are tradeable.

use futures::stream::{self, StreamExt};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::types::{compose_slug, GammaMarket, Market, MarketDuration, Underlying};
use crate::error::MarketError;

/// Parallelism for slug metadata fetches.
const FETCH_BATCH: usize = 10;

/// Attempts per market before giving up on token resolution.
const RESOLVE_ATTEMPTS: u32 = 3;

/// Backoff between token resolution attempts.
const RESOLVE_BACKOFF: Duration = Duration::from_secs(1);

/// Sort order for discovery results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarketSort {
    /// Soonest end time first.
    #[default]
    EndDate,
    /// Highest 24h volume first.
    Volume,
    /// Highest liquidity first.
    Liquidity,
}

/// Discovery query parameters.
#[derive(Debug, Clone)]
pub struct MarketQuery {
    /// Underlyings to include.
    pub underlyings: Vec<Underlying>,
    /// Duration classes to include.
    pub durations: Vec<MarketDuration>,
    /// Only markets ending at least this many minutes from now.
    pub min_minutes_until_end: i64,
    /// Only markets ending at most this many minutes from now.
    pub max_minutes_until_end: i64,
    /// Maximum number of results.
    pub limit: usize,
    /// Sort order.
    pub sort_by: MarketSort,
}

impl Default for MarketQuery {
    fn default() -> Self {
        Self {
            underlyings: vec![Underlying::Btc],
            durations: vec![MarketDuration::M15],
            min_minutes_until_end: 5,
            max_minutes_until_end: 30,
            limit: 10,
            sort_by: MarketSort::EndDate,
        }
    }
}

/// Candidate slot start times whose markets could end inside the window
/// `[now + min_end, now + max_end]`.
pub fn candidate_slots(
    now: OffsetDateTime,
    duration: MarketDuration,
    min_minutes_until_end: i64,
    max_minutes_until_end: i64,
) -> Vec<i64> {
    let interval = duration.interval_seconds();
    let min_end = now.unix_timestamp() + min_minutes_until_end * 60;
    let max_end = now.unix_timestamp() + max_minutes_until_end * 60;

    let first = ((min_end - interval) / interval) * interval;
    let last = ((max_end + interval - 1) / interval) * interval;

    (0..)
        .map(|i| first + i * interval)
        .take_while(|slot| *slot <= last)
        .collect()
}

/// Market discovery service over the metadata API.
#[derive(Debug, Clone)]
pub struct MarketDiscovery {
    http: reqwest::Client,
    gamma_url: String,
}

impl MarketDiscovery {
    /// Create a new discovery service.
    pub fn new(http: reqwest::Client, gamma_url: impl Into<String>) -> Self {
        Self {
            http,
            gamma_url: gamma_url.into(),
        }
    }

    /// Enumerate upcoming markets matching the query.
    #[instrument(skip(self))]
    pub async fn scan(&self, query: &MarketQuery) -> Result<Vec<Market>, MarketError> {
        let now = OffsetDateTime::now_utc();
        let mut slugs = Vec::new();

        for duration in &query.durations {
            for slot in candidate_slots(
                now,
                *duration,
                query.min_minutes_until_end,
                query.max_minutes_until_end,
            ) {
                for underlying in &query.underlyings {
                    slugs.push(compose_slug(*underlying, *duration, slot));
                }
            }
        }

        debug!(candidates = slugs.len(), "scanning candidate slugs");

        let mut candidates: Vec<(Market, GammaMarket)> = stream::iter(slugs)
            .map(|slug| async move { self.resolve_slug(&slug).await })
            .buffer_unordered(FETCH_BATCH)
            .filter_map(|result| async move { result })
            .collect()
            .await;

        let min_end = now + time::Duration::minutes(query.min_minutes_until_end);
        let max_end = now + time::Duration::minutes(query.max_minutes_until_end);
        candidates.retain(|(market, _)| market.end_time >= min_end && market.end_time <= max_end);

        match query.sort_by {
            MarketSort::EndDate => candidates.sort_by_key(|(market, _)| market.end_time),
            MarketSort::Volume => candidates.sort_by(|(_, a), (_, b)| {
                b.volume_24hr
                    .unwrap_or_default()
                    .cmp(&a.volume_24hr.unwrap_or_default())
            }),
            MarketSort::Liquidity => candidates.sort_by(|(_, a), (_, b)| {
                b.liquidity
                    .unwrap_or_default()
                    .cmp(&a.liquidity.unwrap_or_default())
            }),
        }

        candidates.truncate(query.limit);

        let markets: Vec<Market> = candidates.into_iter().map(|(market, _)| market).collect();
        info!(found = markets.len(), "discovery scan complete");
        Ok(markets)
    }

    /// Scan and return the soonest-ending market, excluding a slug.
    pub async fn next_market(
        &self,
        query: &MarketQuery,
        exclude_slug: Option<&str>,
    ) -> Result<Market, MarketError> {
        let markets = self.scan(query).await?;
        markets
            .into_iter()
            .find(|m| Some(m.slug.as_str()) != exclude_slug)
            .ok_or(MarketError::NotFound)
    }

    /// Fetch and validate one slug, retrying transport failures.
    ///
    /// Returns `None` for slugs that do not exist, are inactive, are
    /// closed, or cannot resolve a token pair: those are skipped, not
    /// surfaced as errors.
    async fn resolve_slug(&self, slug: &str) -> Option<(Market, GammaMarket)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_by_slug(slug).await {
                Ok(Some(gamma)) => {
                    if gamma.active == Some(false) || gamma.closed == Some(true) {
                        debug!(slug = %slug, "skipping inactive or closed market");
                        return None;
                    }
                    return match gamma.clone().into_market() {
                        Ok(market) => Some((market, gamma)),
                        Err(e) => {
                            debug!(slug = %slug, error = %e, "skipping unparseable market");
                            None
                        }
                    };
                }
                Ok(None) => return None,
                Err(e) if e.retryable() && attempt < RESOLVE_ATTEMPTS => {
                    warn!(slug = %slug, attempt, error = %e, "market fetch failed, retrying");
                    tokio::time::sleep(RESOLVE_BACKOFF).await;
                }
                Err(e) => {
                    debug!(slug = %slug, error = %e, "skipping slug after fetch failure");
                    return None;
                }
            }
        }
    }

    /// Fetch raw metadata for one slug. `Ok(None)` means the slug does
    /// not exist.
    #[instrument(skip(self))]
    pub async fn fetch_by_slug(&self, slug: &str) -> Result<Option<GammaMarket>, MarketError> {
        let url = format!("{}/markets", self.gamma_url);

        let response = self
            .http
            .get(&url)
            .query(&[("slug", slug)])
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(MarketError::RateLimited {
                retry_after_seconds: 1,
            });
        }

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                slug: slug.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let markets: Vec<GammaMarket> = response
            .json()
            .await
            .map_err(|e| MarketError::InvalidResponse(format!("markets parse failed: {e}")))?;

        Ok(markets
            .into_iter()
            .find(|m| m.slug.as_deref() == Some(slug)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_slots_cover_the_window() {
        // now on an exact boundary
        let now = OffsetDateTime::from_unix_timestamp(1_765_301_400).unwrap();
        let slots = candidate_slots(now, MarketDuration::M15, 5, 30);

        // Markets end at slot + 900s; ends must span [now+300, now+1800].
        let first_end = slots.first().unwrap() + 900;
        let last_end = slots.last().unwrap() + 900;
        assert!(first_end <= now.unix_timestamp() + 300);
        assert!(last_end >= now.unix_timestamp() + 1800);

        for window in slots.windows(2) {
            assert_eq!(window[1] - window[0], 900);
        }
    }

    #[test]
    fn candidate_slots_align_to_interval() {
        let now = OffsetDateTime::from_unix_timestamp(1_765_301_537).unwrap();
        for slot in candidate_slots(now, MarketDuration::M5, 5, 30) {
            assert_eq!(slot % 300, 0);
        }
    }

    #[test]
    fn default_query_matches_rotation_contract() {
        let query = MarketQuery::default();
        assert_eq!(query.min_minutes_until_end, 5);
        assert_eq!(query.max_minutes_until_end, 30);
        assert_eq!(query.sort_by, MarketSort::EndDate);
    }
}
