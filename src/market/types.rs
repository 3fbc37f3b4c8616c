//! Market types for short-duration up/down prediction markets.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::error::MarketError;

/// Underlying crypto asset of an up/down market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Underlying {
    /// Bitcoin.
    Btc,
    /// Ethereum.
    Eth,
    /// Solana.
    Sol,
    /// Ripple.
    Xrp,
}

impl Underlying {
    /// All supported underlyings.
    pub const ALL: [Underlying; 4] = [
        Underlying::Btc,
        Underlying::Eth,
        Underlying::Sol,
        Underlying::Xrp,
    ];

    /// Oracle stream symbol for this underlying (e.g. "BTC/USD").
    pub fn oracle_symbol(&self) -> String {
        format!("{}/USD", self.ticker())
    }

    /// Uppercase ticker.
    pub fn ticker(&self) -> &'static str {
        match self {
            Underlying::Btc => "BTC",
            Underlying::Eth => "ETH",
            Underlying::Sol => "SOL",
            Underlying::Xrp => "XRP",
        }
    }
}

/// Duration class of an up/down market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
pub enum MarketDuration {
    /// Five-minute round.
    #[serde(rename = "5m")]
    #[strum(serialize = "5M", to_string = "5m")]
    M5,
    /// Fifteen-minute round.
    #[default]
    #[serde(rename = "15m")]
    #[strum(serialize = "15M", to_string = "15m")]
    M15,
}

impl MarketDuration {
    /// Window length in seconds (also the slug slot interval).
    pub fn interval_seconds(&self) -> i64 {
        match self {
            MarketDuration::M5 => 300,
            MarketDuration::M15 => 900,
        }
    }

    /// Slug fragment ("5m" / "15m").
    pub fn slug_fragment(&self) -> &'static str {
        match self {
            MarketDuration::M5 => "5m",
            MarketDuration::M15 => "15m",
        }
    }
}

/// Outcome side of a binary market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Outcome {
    /// Price finishes above the open (YES token).
    #[strum(serialize = "yes", to_string = "up")]
    #[default]
    Up,
    /// Price finishes below the open (NO token).
    #[strum(serialize = "no", to_string = "down")]
    Down,
}

impl Outcome {
    /// Get the opposite outcome.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Up => Outcome::Down,
            Outcome::Down => Outcome::Up,
        }
    }
}

/// One tradeable up/down market. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    /// Opaque market identifier (conditional-token condition id).
    pub condition_id: String,
    /// Market slug (e.g. "btc-updown-15m-1765301400").
    pub slug: String,
    /// Underlying asset.
    pub underlying: Underlying,
    /// Round duration.
    pub duration: MarketDuration,
    /// Round start time.
    pub start_time: OffsetDateTime,
    /// Round end time (start + duration).
    pub end_time: OffsetDateTime,
    /// UP (YES) token id.
    pub up_token_id: String,
    /// DOWN (NO) token id.
    pub down_token_id: String,
}

impl Market {
    /// Get the token id for a given outcome.
    pub fn token_id(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Up => &self.up_token_id,
            Outcome::Down => &self.down_token_id,
        }
    }

    /// Map a token id back to its outcome.
    pub fn outcome_for_token(&self, token_id: &str) -> Option<Outcome> {
        if token_id == self.up_token_id {
            Some(Outcome::Up)
        } else if token_id == self.down_token_id {
            Some(Outcome::Down)
        } else {
            None
        }
    }

    /// Check if the market has ended at `now`.
    pub fn has_ended(&self, now: OffsetDateTime) -> bool {
        now >= self.end_time
    }

    /// Check if the market is closed right now.
    pub fn is_closed(&self) -> bool {
        self.has_ended(OffsetDateTime::now_utc())
    }

    /// Remaining time until market close.
    pub fn time_remaining(&self) -> Option<std::time::Duration> {
        let remaining = self.end_time - OffsetDateTime::now_utc();
        if remaining.is_positive() {
            Some(std::time::Duration::from_secs(
                remaining.whole_seconds() as u64
            ))
        } else {
            None
        }
    }

    /// Format remaining time as "Xm Ys" string.
    pub fn time_remaining_str(&self) -> String {
        match self.time_remaining() {
            Some(duration) => {
                let secs = duration.as_secs();
                format!("{}m {}s", secs / 60, secs % 60)
            }
            None => "CLOSED".to_string(),
        }
    }

    /// Check that the market carries everything the engine needs.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.condition_id.is_empty() {
            return Err("market is missing a condition id".to_string());
        }
        if self.up_token_id.is_empty() || self.down_token_id.is_empty() {
            return Err(format!("market {} is missing a token id", self.slug));
        }
        Ok(())
    }
}

/// Build the canonical slug for a market slot.
///
/// Slots start on interval boundaries: `floor(start / interval) * interval`.
pub fn compose_slug(underlying: Underlying, duration: MarketDuration, start_unix: i64) -> String {
    let interval = duration.interval_seconds();
    let slot = (start_unix / interval) * interval;
    format!("{}-updown-{}-{}", underlying, duration.slug_fragment(), slot)
}

/// Parse `{coin}-updown-{5m|15m}-{startUnixSeconds}` back into its parts.
pub fn parse_slug(slug: &str) -> Option<(Underlying, MarketDuration, i64)> {
    let pattern = Regex::new(r"^([a-z]+)-updown-(5m|15m)-(\d+)$").expect("valid regex");
    let captures = pattern.captures(slug)?;
    let underlying: Underlying = captures.get(1)?.as_str().parse().ok()?;
    let duration: MarketDuration = captures.get(2)?.as_str().parse().ok()?;
    let start: i64 = captures.get(3)?.as_str().parse().ok()?;
    Some((underlying, duration, start))
}

/// A field that arrives either as a JSON array or as a JSON-encoded string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringArray {
    /// Proper JSON array.
    List(Vec<String>),
    /// JSON array packed into a string.
    Packed(String),
}

impl StringArray {
    /// Unpack into a plain vector.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StringArray::List(items) => items,
            StringArray::Packed(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        }
    }
}

/// Market metadata from the markets API.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    /// Market slug.
    pub slug: Option<String>,
    /// Condition id.
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    /// CLOB token ids, index-aligned with `outcomes`.
    #[serde(rename = "clobTokenIds")]
    pub clob_token_ids: Option<StringArray>,
    /// Outcome names (e.g. ["Up", "Down"] or ["Yes", "No"]).
    pub outcomes: Option<StringArray>,
    /// Whether the market is active.
    pub active: Option<bool>,
    /// Whether the market is closed.
    pub closed: Option<bool>,
    /// 24h volume.
    #[serde(rename = "volume24hr")]
    pub volume_24hr: Option<Decimal>,
    /// Current liquidity.
    pub liquidity: Option<Decimal>,
}

impl GammaMarket {
    /// Convert API metadata into a [`Market`].
    ///
    /// Outcome names are matched case-insensitively against up/yes and
    /// down/no; when absent or unrecognised, index order decides
    /// (0 = UP, 1 = DOWN).
    pub fn into_market(self) -> std::result::Result<Market, MarketError> {
        let slug = self
            .slug
            .ok_or_else(|| MarketError::InvalidResponse("market has no slug".to_string()))?;
        let (underlying, duration, start_unix) = parse_slug(&slug).ok_or_else(|| {
            MarketError::InvalidResponse(format!("slug {slug} is not an up/down market"))
        })?;

        let tokens = self
            .clob_token_ids
            .map(StringArray::into_vec)
            .unwrap_or_default();
        if tokens.len() != 2 {
            return Err(MarketError::InvalidResponse(format!(
                "expected 2 token ids for {slug}, got {}",
                tokens.len()
            )));
        }

        let outcomes = self.outcomes.map(StringArray::into_vec).unwrap_or_default();
        let (up_token_id, down_token_id) = match outcomes
            .first()
            .and_then(|name| name.parse::<Outcome>().ok())
        {
            Some(Outcome::Down) => (tokens[1].clone(), tokens[0].clone()),
            _ => (tokens[0].clone(), tokens[1].clone()),
        };

        let start_time = OffsetDateTime::from_unix_timestamp(start_unix)
            .map_err(|e| MarketError::InvalidResponse(format!("bad start time: {e}")))?;

        Ok(Market {
            condition_id: self.condition_id.unwrap_or_default(),
            slug,
            underlying,
            duration,
            start_time,
            end_time: start_time + time::Duration::seconds(duration.interval_seconds()),
            up_token_id,
            down_token_id,
        })
    }
}
