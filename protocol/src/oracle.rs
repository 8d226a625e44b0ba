//! # Price Oracle
//!
//! The engine needs one number per event: how many stablecoin units one unit
//! of reserve is worth. Where that number comes from is out of scope; the
//! engine only reads it through [`PriceOracle`].
//!
//! [`FeedOracle`] is the stock implementation: the latest published rate,
//! optionally refused once it is older than a configured age.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("no rate has been published")]
    Unavailable,

    #[error("rate published at {published_at} is older than {max_age_secs}s")]
    Stale {
        published_at: DateTime<Utc>,
        max_age_secs: i64,
    },
}

/// Read side of a rate feed.
pub trait PriceOracle: Send + Sync {
    /// Stablecoin units per one reserve unit.
    fn current_rate(&self) -> Result<Amount, OracleError>;
}

/// A published rate and when it arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub rate: Amount,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FeedOracle {
    latest: RwLock<Option<PriceQuote>>,
    max_age: Option<Duration>,
}

impl FeedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `rate` already published.
    pub fn with_rate(rate: Amount) -> Self {
        let oracle = Self::new();
        oracle.publish(rate);
        oracle
    }

    /// Refuse quotes older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Replaces the current rate. No validation; the engine rejects
    /// non-positive rates when it reads them.
    pub fn publish(&self, rate: Amount) -> PriceQuote {
        self.publish_at(rate, Utc::now())
    }

    pub fn publish_at(&self, rate: Amount, published_at: DateTime<Utc>) -> PriceQuote {
        let quote = PriceQuote { rate, published_at };
        *self.latest.write() = Some(quote);
        tracing::info!(%rate, "oracle rate published");
        quote
    }

    pub fn latest(&self) -> Option<PriceQuote> {
        *self.latest.read()
    }
}

impl PriceOracle for FeedOracle {
    fn current_rate(&self) -> Result<Amount, OracleError> {
        let quote = self.latest().ok_or(OracleError::Unavailable)?;
        if let Some(max_age) = self.max_age {
            if Utc::now() - quote.published_at > max_age {
                return Err(OracleError::Stale {
                    published_at: quote.published_at,
                    max_age_secs: max_age.num_seconds(),
                });
            }
        }
        Ok(quote.rate)
    }
}
