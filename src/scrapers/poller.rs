//! Incremental polling
//!
//! One bounded-window fetch, no cursor loop. Consecutive polls are meant to
//! overlap; the store merge absorbs the duplicates.

use super::backfill::fmt_ts;
use super::feed::{FetchError, PageQuery, TradeFeed};
use crate::models::NormalizedTrade;
use crate::signals::SchemaNormalizer;
use rust_decimal::Decimal;
use tracing::{info, warn};

#[derive(Debug)]
pub struct PollOutcome {
    pub trades: Vec<NormalizedTrade>,
    pub fetched: usize,
    /// Page came back full; the window may hold more than was returned
    pub truncated: bool,
    pub fetch_error: Option<FetchError>,
}

pub struct IncrementalPoller {
    window_secs: i64,
    page_size: u32,
    min_usd: Decimal,
}

impl IncrementalPoller {
    pub fn new(window_secs: i64, page_size: u32, min_usd: Decimal) -> Self {
        Self {
            window_secs,
            page_size,
            min_usd,
        }
    }

    pub async fn poll(
        &self,
        feed: &dyn TradeFeed,
        normalizer: &mut SchemaNormalizer,
        now: i64,
    ) -> PollOutcome {
        let query = PageQuery {
            after: now - self.window_secs,
            before: None,
            min_usd: self.min_usd,
            page_size: self.page_size,
        };

        info!("🔄 Polling {} since {}", feed.name(), fmt_ts(query.after));

        let raws = match feed.fetch_page(&query).await {
            Ok(raws) => raws,
            Err(e) => {
                warn!("❌ Poll failed: {}", e);
                return PollOutcome {
                    trades: Vec::new(),
                    fetched: 0,
                    truncated: false,
                    fetch_error: Some(e),
                };
            }
        };

        let truncated = raws.len() >= self.page_size as usize;
        if truncated {
            warn!(
                "Poll returned a full page ({} records); window of {}s may be truncated, raise poll_page_size or shorten the window",
                raws.len(),
                self.window_secs
            );
        }

        let trades = normalizer.normalize_batch(&raws);
        info!("✓ Poll returned {} records ({} usable)", raws.len(), trades.len());

        PollOutcome {
            fetched: raws.len(),
            trades,
            truncated,
            fetch_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::{RawTrade, SchemaVersion};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct OnePage {
        result: Result<Vec<RawTrade>, FetchError>,
        seen: Mutex<Option<PageQuery>>,
    }

    #[async_trait]
    impl TradeFeed for OnePage {
        fn name(&self) -> &str {
            "one-page"
        }

        async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawTrade>, FetchError> {
            *self.seen.lock() = Some(query.clone());
            self.result.clone()
        }
    }

    fn deal(id: &str, ts: i64) -> RawTrade {
        json!({
            "id": id,
            "creationTimestamp": ts.to_string(),
            "title": "Market",
            "outcomeIndex": "0",
            "type": "Buy",
            "outcomeTokensAmount": "3000",
            "outcomeTokenPrice": "0.5"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn test_single_window_query() {
        let feed = OnePage {
            result: Ok(vec![deal("a", 9_900), deal("b", 9_800)]),
            seen: Mutex::new(None),
        };
        let poller = IncrementalPoller::new(3_600, 100, Decimal::from(1000));
        let mut normalizer = SchemaNormalizer::new(SchemaVersion::Deal);

        let outcome = poller.poll(&feed, &mut normalizer, 10_000).await;

        assert_eq!(outcome.trades.len(), 2);
        assert!(!outcome.truncated);
        assert!(outcome.fetch_error.is_none());

        let query = feed.seen.lock().clone().unwrap();
        assert_eq!(query.after, 10_000 - 3_600);
        assert_eq!(query.before, None);
        assert_eq!(query.page_size, 100);
    }

    #[tokio::test]
    async fn test_full_page_flags_truncation() {
        let feed = OnePage {
            result: Ok(vec![deal("a", 9_900), deal("b", 9_800)]),
            seen: Mutex::new(None),
        };
        let poller = IncrementalPoller::new(3_600, 2, Decimal::from(1000));
        let mut normalizer = SchemaNormalizer::new(SchemaVersion::Deal);

        assert!(poller.poll(&feed, &mut normalizer, 10_000).await.truncated);
    }

    #[tokio::test]
    async fn test_failure_is_an_outcome() {
        let feed = OnePage {
            result: Err(FetchError::Status {
                code: 503,
                body: "unavailable".into(),
            }),
            seen: Mutex::new(None),
        };
        let poller = IncrementalPoller::new(3_600, 100, Decimal::from(1000));
        let mut normalizer = SchemaNormalizer::new(SchemaVersion::Deal);

        let outcome = poller.poll(&feed, &mut normalizer, 10_000).await;
        assert!(outcome.trades.is_empty());
        assert!(matches!(
            outcome.fetch_error,
            Some(FetchError::Status { code: 503, .. })
        ));
    }
}
