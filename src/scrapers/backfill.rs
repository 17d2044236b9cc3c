//! Historical backfill
//!
//! Walks [window_start, now) backward one page at a time. The cursor is the
//! oldest timestamp seen so far and must strictly decrease on every page;
//! anything else trips the guard instead of looping.

use super::feed::{FetchError, PageQuery, TradeFeed};
use crate::models::NormalizedTrade;
use crate::signals::SchemaNormalizer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Why the backfill loop stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Empty page, or the window start was reached
    Exhausted,
    /// Fetch failed; whatever came before is kept
    FetchFailed { error: String },
    /// Iteration budget used up
    IterationLimit { iterations: u32 },
    /// A page did not move the cursor strictly backward
    CursorStalled { cursor: i64 },
}

impl Termination {
    pub fn is_complete(&self) -> bool {
        matches!(self, Termination::Exhausted)
    }
}

#[derive(Debug)]
pub struct BackfillOutcome {
    /// Concatenated pages, not deduplicated
    pub trades: Vec<NormalizedTrade>,
    pub pages: u32,
    pub fetched: usize,
    pub termination: Termination,
    pub fetch_error: Option<FetchError>,
}

pub struct BackfillPaginator {
    page_size: u32,
    max_iterations: u32,
    page_delay: Duration,
    min_usd: Decimal,
}

impl BackfillPaginator {
    pub fn new(page_size: u32, max_iterations: u32, page_delay: Duration, min_usd: Decimal) -> Self {
        Self {
            page_size,
            max_iterations,
            page_delay,
            min_usd,
        }
    }

    pub async fn run(
        &self,
        feed: &dyn TradeFeed,
        normalizer: &mut SchemaNormalizer,
        window_start: i64,
        now: i64,
    ) -> BackfillOutcome {
        let mut cursor = now;
        let mut trades = Vec::new();
        let mut pages = 0u32;
        let mut fetched = 0usize;

        info!(
            "⏳ Backfilling {} from {} to {}",
            feed.name(),
            fmt_ts(window_start),
            fmt_ts(now)
        );

        let termination = loop {
            if pages >= self.max_iterations {
                warn!(
                    "Backfill guard: {} iterations reached at cursor {}",
                    pages,
                    fmt_ts(cursor)
                );
                break Termination::IterationLimit { iterations: pages };
            }

            if pages > 0 && !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }

            let query = PageQuery {
                after: window_start,
                before: Some(cursor),
                min_usd: self.min_usd,
                page_size: self.page_size,
            };

            let raws = match feed.fetch_page(&query).await {
                Ok(raws) => raws,
                Err(e) => {
                    warn!(
                        "❌ Backfill page {} failed, keeping {} trades already fetched: {}",
                        pages + 1,
                        trades.len(),
                        e
                    );
                    return BackfillOutcome {
                        trades,
                        pages,
                        fetched,
                        termination: Termination::FetchFailed {
                            error: e.to_string(),
                        },
                        fetch_error: Some(e),
                    };
                }
            };
            pages += 1;

            if raws.is_empty() {
                debug!("Empty page at cursor {}, window exhausted", cursor);
                break Termination::Exhausted;
            }
            fetched += raws.len();

            let page = normalizer.normalize_batch(&raws);
            let oldest = page.iter().map(|t| t.timestamp).min();
            trades.extend(page);

            let next = match oldest {
                Some(ts) if ts < cursor => ts,
                _ => {
                    warn!(
                        "Backfill guard: page {} did not advance cursor {} ({} raw records)",
                        pages,
                        cursor,
                        raws.len()
                    );
                    break Termination::CursorStalled { cursor };
                }
            };

            debug!(
                "Page {}: {} records, cursor {} -> {}",
                pages,
                raws.len(),
                cursor,
                next
            );
            cursor = next;

            if cursor <= window_start {
                break Termination::Exhausted;
            }
        };

        info!(
            "✅ Backfill finished after {} pages: {} trades ({:?})",
            pages,
            trades.len(),
            termination
        );

        BackfillOutcome {
            trades,
            pages,
            fetched,
            termination,
            fetch_error: None,
        }
    }
}

pub(crate) fn fmt_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
